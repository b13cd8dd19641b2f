use anyhow::Context;
use chrono::{Duration, NaiveDate};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::warn;
use uuid::Uuid;

use crate::auth::{AuthContext, Role};
use crate::models::{
    ActivityType, ApprenticeshipStandard, EvidenceItem, EvidenceStatus, Ksb, LearnerProfile,
    OtjLogEntry, User,
};
use crate::otj;
use crate::validation::{ValidEvidence, ValidOtjEntry};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn user_from_row(row: &PgRow) -> anyhow::Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        email: row.try_get("email")?,
        role: row.try_get::<String, _>("role")?.parse()?,
    })
}

fn otj_from_row(row: &PgRow) -> anyhow::Result<OtjLogEntry> {
    Ok(OtjLogEntry {
        id: row.try_get("id")?,
        learner_id: row.try_get("learner_id")?,
        date: row.try_get("activity_date")?,
        duration_minutes: row.try_get("duration_minutes")?,
        activity_type: row.try_get::<String, _>("activity_type")?.parse()?,
        description: row.try_get("description")?,
        reflection: row.try_get("reflection")?,
    })
}

fn evidence_from_row(row: &PgRow) -> anyhow::Result<EvidenceItem> {
    Ok(EvidenceItem {
        id: row.try_get("id")?,
        learner_id: row.try_get("learner_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        evidence_type: row.try_get::<String, _>("evidence_type")?.parse()?,
        reflection: row.try_get("reflection")?,
        url: row.try_get("url")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        ksb_ids: row.try_get("ksb_ids")?,
        submitted_at: row.try_get("submitted_at")?,
    })
}

pub async fn fetch_user(pool: &PgPool, user_id: Uuid) -> anyhow::Result<Option<User>> {
    let row = sqlx::query(
        "SELECT id, first_name, last_name, email, role FROM otj_tracker.users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(user_from_row).transpose()
}

pub async fn fetch_user_by_email(pool: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
    let row = sqlx::query(
        "SELECT id, first_name, last_name, email, role FROM otj_tracker.users WHERE email = $1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(user_from_row).transpose()
}

#[cfg(feature = "dev-login")]
pub async fn find_user_by_role(pool: &PgPool, role: Role) -> anyhow::Result<Option<User>> {
    let row = sqlx::query(
        r#"
        SELECT id, first_name, last_name, email, role
        FROM otj_tracker.users
        WHERE role = $1
        ORDER BY created_at, email
        LIMIT 1
        "#,
    )
    .bind(role.as_str())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(user_from_row).transpose()
}

#[cfg(feature = "dev-login")]
pub async fn create_session(pool: &PgPool, user_id: Uuid) -> anyhow::Result<Uuid> {
    let token = Uuid::new_v4();
    sqlx::query("INSERT INTO otj_tracker.sessions (token, user_id) VALUES ($1, $2)")
        .bind(token)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(token)
}

pub async fn fetch_session(pool: &PgPool, token: Uuid) -> anyhow::Result<Option<AuthContext>> {
    let row = sqlx::query(
        r#"
        SELECT u.id, u.role
        FROM otj_tracker.sessions s
        JOIN otj_tracker.users u ON u.id = s.user_id
        WHERE s.token = $1
        "#,
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some(AuthContext {
            user_id: row.try_get("id")?,
            role: row.try_get::<String, _>("role")?.parse()?,
        })),
        None => Ok(None),
    }
}

pub async fn fetch_profile(pool: &PgPool, learner_id: Uuid) -> anyhow::Result<Option<LearnerProfile>> {
    let row = sqlx::query(
        r#"
        SELECT learner_id, standard_id, employer, start_date
        FROM otj_tracker.learner_profiles
        WHERE learner_id = $1
        "#,
    )
    .bind(learner_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some(LearnerProfile {
            learner_id: row.try_get("learner_id")?,
            standard_id: row.try_get("standard_id")?,
            employer: row.try_get("employer")?,
            start_date: row.try_get("start_date")?,
        })),
        None => Ok(None),
    }
}

pub async fn fetch_standard(
    pool: &PgPool,
    standard_id: Uuid,
) -> anyhow::Result<Option<ApprenticeshipStandard>> {
    let row = sqlx::query(
        r#"
        SELECT id, title, level, minimum_otj_hours
        FROM otj_tracker.apprenticeship_standards
        WHERE id = $1
        "#,
    )
    .bind(standard_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some(ApprenticeshipStandard {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            level: row.try_get("level")?,
            minimum_otj_hours: row.try_get("minimum_otj_hours")?,
        })),
        None => Ok(None),
    }
}

/// Everything the trackers need for one learner. The standard is only looked up
/// once the profile is known, and KSBs only once the standard is.
#[derive(Debug, Clone, Default)]
pub struct LearnerRecords {
    pub profile: Option<LearnerProfile>,
    pub standard: Option<ApprenticeshipStandard>,
    pub entries: Vec<OtjLogEntry>,
    pub ksbs: Vec<Ksb>,
    pub evidence: Vec<EvidenceItem>,
}

pub async fn load_learner_records(pool: &PgPool, learner_id: Uuid) -> anyhow::Result<LearnerRecords> {
    let profile = fetch_profile(pool, learner_id).await?;
    let standard = match &profile {
        Some(profile) => fetch_standard(pool, profile.standard_id).await?,
        None => None,
    };
    let ksbs = match &standard {
        Some(standard) => fetch_ksbs(pool, standard.id).await?,
        None => Vec::new(),
    };
    let entries = fetch_otj_logs(pool, learner_id).await?;
    let evidence = fetch_evidence(pool, learner_id).await?;

    Ok(LearnerRecords {
        profile,
        standard,
        entries,
        ksbs,
        evidence,
    })
}

pub async fn fetch_ksbs(pool: &PgPool, standard_id: Uuid) -> anyhow::Result<Vec<Ksb>> {
    let rows = sqlx::query(
        r#"
        SELECT id, standard_id, ksb_type, code, title, required_evidence
        FROM otj_tracker.ksbs
        WHERE standard_id = $1
        ORDER BY code
        "#,
    )
    .bind(standard_id)
    .fetch_all(pool)
    .await?;

    let mut ksbs = Vec::with_capacity(rows.len());
    for row in rows {
        ksbs.push(Ksb {
            id: row.try_get("id")?,
            standard_id: row.try_get("standard_id")?,
            ksb_type: row.try_get::<String, _>("ksb_type")?.parse()?,
            code: row.try_get("code")?,
            title: row.try_get("title")?,
            required_evidence: row.try_get("required_evidence")?,
        });
    }

    Ok(ksbs)
}

pub async fn fetch_otj_logs(pool: &PgPool, learner_id: Uuid) -> anyhow::Result<Vec<OtjLogEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT id, learner_id, activity_date, duration_minutes, activity_type, description, reflection
        FROM otj_tracker.otj_logs
        WHERE learner_id = $1
        ORDER BY activity_date NULLS LAST, created_at
        "#,
    )
    .bind(learner_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(otj_from_row).collect()
}

pub async fn insert_otj_log(
    pool: &PgPool,
    learner_id: Uuid,
    entry: &ValidOtjEntry,
) -> anyhow::Result<OtjLogEntry> {
    let id = Uuid::new_v4();
    let row = sqlx::query(
        r#"
        INSERT INTO otj_tracker.otj_logs
        (id, learner_id, activity_date, duration_minutes, activity_type, description, reflection, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id, learner_id, activity_date, duration_minutes, activity_type, description, reflection
        "#,
    )
    .bind(id)
    .bind(learner_id)
    .bind(entry.date)
    .bind(entry.duration_minutes)
    .bind(entry.activity_type.as_str())
    .bind(&entry.description)
    .bind(&entry.reflection)
    .bind(format!("api-{id}"))
    .fetch_one(pool)
    .await?;

    otj_from_row(&row)
}

const EVIDENCE_SELECT: &str = r#"
    SELECT e.id, e.learner_id, e.title, e.description, e.evidence_type, e.reflection, e.url,
           e.status, e.submitted_at,
           COALESCE(array_agg(ek.ksb_id) FILTER (WHERE ek.ksb_id IS NOT NULL), '{}') AS ksb_ids
    FROM otj_tracker.evidence_items e
    LEFT JOIN otj_tracker.evidence_ksbs ek ON ek.evidence_id = e.id
"#;

pub async fn fetch_evidence(pool: &PgPool, learner_id: Uuid) -> anyhow::Result<Vec<EvidenceItem>> {
    let query = format!(
        "{EVIDENCE_SELECT} WHERE e.learner_id = $1 GROUP BY e.id ORDER BY e.submitted_at DESC"
    );
    let rows = sqlx::query(&query).bind(learner_id).fetch_all(pool).await?;
    rows.iter().map(evidence_from_row).collect()
}

pub async fn fetch_evidence_item(pool: &PgPool, evidence_id: Uuid) -> anyhow::Result<Option<EvidenceItem>> {
    let query = format!("{EVIDENCE_SELECT} WHERE e.id = $1 GROUP BY e.id");
    let row = sqlx::query(&query)
        .bind(evidence_id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(evidence_from_row).transpose()
}

pub async fn insert_evidence(
    pool: &PgPool,
    learner_id: Uuid,
    evidence: &ValidEvidence,
) -> anyhow::Result<EvidenceItem> {
    let id = Uuid::new_v4();
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO otj_tracker.evidence_items
        (id, learner_id, title, description, evidence_type, reflection, url, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(id)
    .bind(learner_id)
    .bind(&evidence.title)
    .bind(&evidence.description)
    .bind(evidence.evidence_type.as_str())
    .bind(&evidence.reflection)
    .bind(&evidence.url)
    .bind(EvidenceStatus::Submitted.as_str())
    .execute(&mut *tx)
    .await?;

    for ksb_id in &evidence.ksb_ids {
        sqlx::query("INSERT INTO otj_tracker.evidence_ksbs (evidence_id, ksb_id) VALUES ($1, $2)")
            .bind(id)
            .bind(ksb_id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("unknown KSB {ksb_id}"))?;
    }

    tx.commit().await?;

    fetch_evidence_item(pool, id)
        .await?
        .context("evidence vanished after insert")
}

pub async fn update_evidence_status(
    pool: &PgPool,
    evidence_id: Uuid,
    status: EvidenceStatus,
) -> anyhow::Result<bool> {
    let result = sqlx::query("UPDATE otj_tracker.evidence_items SET status = $2 WHERE id = $1")
        .bind(evidence_id)
        .bind(status.as_str())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

async fn upsert_user(
    pool: &PgPool,
    first_name: &str,
    last_name: &str,
    email: &str,
    role: Role,
) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO otj_tracker.users (id, first_name, last_name, email, role)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO UPDATE
        SET first_name = EXCLUDED.first_name, last_name = EXCLUDED.last_name
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(first_name)
    .bind(last_name)
    .bind(email)
    .bind(role.as_str())
    .fetch_one(pool)
    .await?
    .get("id");
    Ok(id)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let standard_id = Uuid::parse_str("5b1f0c7e-8d0e-4a43-9a55-2f3cb1e7a901")?;
    sqlx::query(
        r#"
        INSERT INTO otj_tracker.apprenticeship_standards (id, title, level, minimum_otj_hours)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (id) DO UPDATE
        SET title = EXCLUDED.title, level = EXCLUDED.level, minimum_otj_hours = EXCLUDED.minimum_otj_hours
        "#,
    )
    .bind(standard_id)
    .bind("Software Developer")
    .bind(4)
    .bind(6.0_f64)
    .execute(pool)
    .await?;

    let ksbs = vec![
        ("K1", "knowledge", "Software development lifecycle stages"),
        ("K2", "knowledge", "Organisational security policies"),
        ("K3", "knowledge", "Roles within a development team"),
        ("S1", "skill", "Create logical and maintainable code"),
        ("S2", "skill", "Develop effective user interfaces"),
        ("S3", "skill", "Link code to data sets"),
        ("S4", "skill", "Test code and analyse results"),
        ("B1", "behavior", "Works independently and takes responsibility"),
        ("B2", "behavior", "Applies logical thinking"),
        ("B3", "behavior", "Maintains a productive working environment"),
    ];

    let mut ksb_ids = std::collections::HashMap::new();
    for (code, ksb_type, title) in ksbs {
        let id: Uuid = sqlx::query(
            r#"
            INSERT INTO otj_tracker.ksbs (id, standard_id, ksb_type, code, title)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (standard_id, code) DO UPDATE SET title = EXCLUDED.title
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(standard_id)
        .bind(ksb_type)
        .bind(code)
        .bind(title)
        .fetch_one(pool)
        .await?
        .get("id");
        ksb_ids.insert(code, id);
    }

    let staff = vec![
        ("Morgan", "Hale", "morgan.hale@otjtracker.dev", Role::Admin),
        ("Priya", "Shah", "priya.shah@otjtracker.dev", Role::Assessor),
        ("Sam", "Okafor", "sam.okafor@otjtracker.dev", Role::TrainingProvider),
        ("Rosa", "Klein", "rosa.klein@otjtracker.dev", Role::Iqa),
        ("Dev", "Mistry", "dev.mistry@otjtracker.dev", Role::Operations),
    ];
    for (first, last, email, role) in staff {
        upsert_user(pool, first, last, email, role).await?;
    }

    let learner_id = upsert_user(
        pool,
        "Avery",
        "Lee",
        "avery.lee@otjtracker.dev",
        Role::Learner,
    )
    .await?;

    sqlx::query(
        r#"
        INSERT INTO otj_tracker.learner_profiles (learner_id, standard_id, employer, start_date)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (learner_id) DO UPDATE SET standard_id = EXCLUDED.standard_id
        "#,
    )
    .bind(learner_id)
    .bind(standard_id)
    .bind("Northwind Digital")
    .bind(NaiveDate::from_ymd_opt(2026, 1, 12).context("invalid date")?)
    .execute(pool)
    .await?;

    let anchor = otj::current_week_anchor();
    let logs = vec![
        ("seed-otj-001", 0, 0, 120, ActivityType::Workshop, "Agile estimation workshop"),
        ("seed-otj-002", 1, 1, 60, ActivityType::SelfStudy, "Rust ownership reading"),
        ("seed-otj-003", 1, 3, 300, ActivityType::Lecture, "Secure coding module"),
        ("seed-otj-004", 2, 2, 150, ActivityType::Mentoring, "Code review pairing"),
        ("seed-otj-005", 3, 4, 90, ActivityType::OnlineLearning, "SQL fundamentals course"),
    ];
    for (source_key, weeks_back, weekday, minutes, activity, description) in logs {
        let date = anchor - Duration::weeks(weeks_back) + Duration::days(weekday);
        sqlx::query(
            r#"
            INSERT INTO otj_tracker.otj_logs
            (id, learner_id, activity_date, duration_minutes, activity_type, description, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(learner_id)
        .bind(date)
        .bind(minutes)
        .bind(activity.as_str())
        .bind(description)
        .bind(source_key)
        .execute(pool)
        .await?;
    }

    let evidence = vec![
        (
            Uuid::parse_str("9a2d4c61-0f7b-4f0e-8f55-7a3c2b1d0e11")?,
            "Payments API refactor",
            EvidenceStatus::Approved,
            vec!["S1", "S4", "B2"],
        ),
        (
            Uuid::parse_str("c3b7e8f2-1d2a-4e4b-9c3d-5e6f7a8b9c22")?,
            "Security awareness write-up",
            EvidenceStatus::Approved,
            vec!["K2"],
        ),
        (
            Uuid::parse_str("e1f2a3b4-c5d6-4e7f-8a9b-0c1d2e3f4a33")?,
            "Sprint demo recording",
            EvidenceStatus::Submitted,
            vec!["S2", "B1"],
        ),
    ];
    for (id, title, status, codes) in evidence {
        sqlx::query(
            r#"
            INSERT INTO otj_tracker.evidence_items
            (id, learner_id, title, description, evidence_type, status)
            VALUES ($1, $2, $3, $4, 'project', $5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(learner_id)
        .bind(title)
        .bind(format!("{title} delivered at Northwind Digital"))
        .bind(status.as_str())
        .execute(pool)
        .await?;

        for code in codes {
            let ksb_id = ksb_ids.get(code).context("seed KSB missing")?;
            sqlx::query(
                r#"
                INSERT INTO otj_tracker.evidence_ksbs (evidence_id, ksb_id)
                VALUES ($1, $2)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(id)
            .bind(ksb_id)
            .execute(pool)
            .await?;
        }
    }

    Ok(())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub inserted: usize,
    pub invalid_dates: usize,
}

/// Imports OTJ sessions from CSV. Rows whose date cannot be parsed are still
/// stored, with no date, so the weekly tracker can report them.
pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<ImportSummary> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        email: String,
        first_name: String,
        last_name: String,
        date: String,
        duration_minutes: i32,
        activity_type: String,
        description: String,
        reflection: Option<String>,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut summary = ImportSummary::default();

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result?;
        let activity: ActivityType = row
            .activity_type
            .parse()
            .with_context(|| format!("row {}", line + 1))?;

        let learner_id = match fetch_user_by_email(pool, &row.email).await? {
            Some(user) => user.id,
            None => upsert_user(pool, &row.first_name, &row.last_name, &row.email, Role::Learner).await?,
        };

        let date = NaiveDate::parse_from_str(row.date.trim(), "%Y-%m-%d").ok();
        if date.is_none() {
            warn!(row = line + 1, value = %row.date, "unreadable OTJ date; storing without a date");
            summary.invalid_dates += 1;
        }

        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let result = sqlx::query(
            r#"
            INSERT INTO otj_tracker.otj_logs
            (id, learner_id, activity_date, duration_minutes, activity_type, description, reflection, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(learner_id)
        .bind(date)
        .bind(row.duration_minutes)
        .bind(activity.as_str())
        .bind(&row.description)
        .bind(&row.reflection)
        .bind(source_key)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            summary.inserted += 1;
        }
    }

    Ok(summary)
}
