use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod api;
mod auth;
mod config;
mod dashboard;
mod db;
mod ksb;
mod models;
mod otj;
mod report;
mod validation;

use config::AppConfig;
use dashboard::{build_dashboard, Dashboard, DashboardInput};
use models::OtjLogEntry;

#[derive(Parser)]
#[command(name = "otj-tracker")]
#[command(about = "Off-the-job hours and KSB progress tracker for apprenticeships", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a sample standard, staff and learner
    Seed,
    /// Import OTJ log entries from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Show weekly OTJ totals against the learner's minimum
    Weekly {
        #[arg(long)]
        email: String,
        #[arg(long)]
        weeks: Option<usize>,
        /// Any date inside the last week to show (defaults to today)
        #[arg(long)]
        anchor: Option<NaiveDate>,
    },
    /// Show KSB progress and focus areas
    Progress {
        #[arg(long)]
        email: String,
    },
    /// Generate a markdown progress report
    Report {
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "otj-report.md")]
        out: PathBuf,
    },
    /// Serve the JSON API
    Serve,
}

fn init_tracing(log_json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn learner_dashboard(
    pool: &PgPool,
    email: &str,
    anchor: NaiveDate,
    config: &AppConfig,
) -> anyhow::Result<(Dashboard, Vec<OtjLogEntry>)> {
    let user = db::fetch_user_by_email(pool, email)
        .await?
        .with_context(|| format!("no user with email {email}"))?;
    let records = db::load_learner_records(pool, user.id).await?;
    if records.standard.is_none() {
        info!(%email, "no apprenticeship standard on record; using default minimum");
    }
    let dashboard = build_dashboard(
        DashboardInput {
            user: &user,
            profile: records.profile.as_ref(),
            standard: records.standard.as_ref(),
            entries: &records.entries,
            ksbs: &records.ksbs,
            evidence: &records.evidence,
            anchor,
        },
        config,
    )?;
    Ok((dashboard, records.entries))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::from_env()?;
    init_tracing(config.log_json);

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let summary = db::import_csv(&pool, &csv).await?;
            println!(
                "Inserted {} OTJ entries from {}.",
                summary.inserted,
                csv.display()
            );
            if summary.invalid_dates > 0 {
                println!(
                    "{} rows had unreadable dates and will be reported as data-quality warnings.",
                    summary.invalid_dates
                );
            }
        }
        Commands::Weekly {
            email,
            weeks,
            anchor,
        } => {
            if let Some(weeks) = weeks {
                config.lookback_weeks = weeks.clamp(1, otj::MAX_LOOKBACK_WEEKS);
            }
            let anchor = anchor.unwrap_or_else(|| Utc::now().date_naive());
            let (dashboard, _) = learner_dashboard(&pool, &email, anchor, &config).await?;
            let tracker = &dashboard.tracker;

            println!(
                "Weekly OTJ hours for {} (minimum {:.1}h):",
                dashboard.header.name, tracker.minimum_hours
            );
            for week in &tracker.weeks {
                println!(
                    "- week of {}: {:.1}h {}",
                    week.week_start,
                    week.total_minutes as f64 / 60.0,
                    if week.meets_minimum { "met" } else { "below minimum" }
                );
            }
            println!(
                "{} of {} weeks met the minimum ({:?}).",
                tracker.weeks_meeting_minimum(),
                tracker.weeks.len(),
                dashboard.compliance
            );
            if tracker.invalid_dates > 0 {
                println!(
                    "Warning: {} entries skipped for missing dates.",
                    tracker.invalid_dates
                );
            }
            if tracker.invalid_durations > 0 {
                println!(
                    "Warning: {} entries skipped for zero or negative durations.",
                    tracker.invalid_durations
                );
            }
        }
        Commands::Progress { email } => {
            let (dashboard, _) =
                learner_dashboard(&pool, &email, Utc::now().date_naive(), &config).await?;
            println!("KSB progress for {}:", dashboard.header.name);
            for item in &dashboard.ksb_progress.items {
                if item.is_applicable() {
                    println!(
                        "- {}: {}/{} ({:.0}%)",
                        item.ksb_type,
                        item.achieved,
                        item.total,
                        item.percent()
                    );
                } else {
                    println!("- {}: not applicable", item.ksb_type);
                }
            }

            if dashboard.ksb_progress.focus_areas.is_empty() {
                println!("No focus areas outstanding.");
            } else {
                println!("Focus areas:");
                for focus in &dashboard.ksb_progress.focus_areas {
                    println!("- {} {} ({} remaining)", focus.code, focus.name, focus.remaining);
                }
            }
        }
        Commands::Report { email, out } => {
            let (dashboard, entries) =
                learner_dashboard(&pool, &email, Utc::now().date_naive(), &config).await?;
            let report = report::build_report(&dashboard, &entries);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Serve => {
            if cfg!(feature = "dev-login") && config.enable_dev_login {
                tracing::warn!("dev login is enabled; sessions can be issued without credentials");
            }

            let bind_addr = config.bind_addr;
            let state = api::AppState {
                pool,
                config: Arc::new(config),
            };
            let listener = tokio::net::TcpListener::bind(bind_addr)
                .await
                .with_context(|| format!("failed to bind {bind_addr}"))?;
            info!(%bind_addr, "serving OTJ tracker API");
            axum::serve(listener, api::build_router(state))
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
    }

    Ok(())
}
