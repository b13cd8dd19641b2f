use std::env;
use std::net::SocketAddr;

use anyhow::Context;

use crate::ksb::DEFAULT_FOCUS_LIMIT;
use crate::otj::MAX_LOOKBACK_WEEKS;

pub const DEFAULT_LOOKBACK_WEEKS: usize = 8;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub db_max_connections: u32,
    pub lookback_weeks: usize,
    pub focus_limit: usize,
    pub log_json: bool,
    pub enable_dev_login: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            db_max_connections: 5,
            lookback_weeks: DEFAULT_LOOKBACK_WEEKS,
            focus_limit: DEFAULT_FOCUS_LIMIT,
            log_json: false,
            enable_dev_login: false,
        }
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    parse_bool(env::var(name).ok().as_deref()).unwrap_or(default)
}

fn parse_bool(raw: Option<&str>) -> Option<bool> {
    match raw? {
        "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
        "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
        _ => None,
    }
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        let database_url = env::var("DATABASE_URL")
            .context("DATABASE_URL must be set to a Postgres instance")?;
        let bind_addr = match env::var("OTJ_BIND_ADDR") {
            Ok(raw) => raw
                .parse()
                .with_context(|| format!("invalid OTJ_BIND_ADDR '{raw}'"))?,
            Err(_) => defaults.bind_addr,
        };

        Ok(Self {
            database_url,
            bind_addr,
            db_max_connections: env_usize("OTJ_DB_MAX_CONNECTIONS", 5).clamp(1, 100) as u32,
            lookback_weeks: env_usize("OTJ_LOOKBACK_WEEKS", DEFAULT_LOOKBACK_WEEKS)
                .clamp(1, MAX_LOOKBACK_WEEKS),
            focus_limit: env_usize("OTJ_FOCUS_LIMIT", DEFAULT_FOCUS_LIMIT).max(1),
            log_json: env_bool("OTJ_LOG_JSON", false),
            enable_dev_login: env_bool("OTJ_ENABLE_DEV_LOGIN", false),
        })
    }
}
