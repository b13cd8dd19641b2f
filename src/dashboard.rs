//! Learner dashboard assembled from already-fetched records.

use chrono::NaiveDate;
use serde::Serialize;

use crate::config::AppConfig;
use crate::ksb::{self, KsbProgress};
use crate::models::{
    ApprenticeshipStandard, EvidenceItem, EvidenceStatus, Ksb, LearnerProfile, OtjLogEntry, User,
};
use crate::otj::{self, ComplianceStatus, WeeklyTracker};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardHeader {
    pub name: String,
    pub role: String,
    pub standard_title: Option<String>,
    pub employer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DashboardTask {
    LogOtjHours { remaining_minutes: i64 },
    ReviseEvidence { title: String },
    FinishDraft { title: String },
    GatherEvidence { code: String, name: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub header: DashboardHeader,
    /// False when the threshold came from the default rather than the learner's standard.
    pub standard_found: bool,
    pub compliance: ComplianceStatus,
    pub tracker: WeeklyTracker,
    pub ksb_progress: KsbProgress,
    pub tasks: Vec<DashboardTask>,
}

pub struct DashboardInput<'a> {
    pub user: &'a User,
    pub profile: Option<&'a LearnerProfile>,
    pub standard: Option<&'a ApprenticeshipStandard>,
    pub entries: &'a [OtjLogEntry],
    pub ksbs: &'a [Ksb],
    pub evidence: &'a [EvidenceItem],
    pub anchor: NaiveDate,
}

/// Fails only when the anchor date is too far from the present to window.
pub fn build_dashboard(
    input: DashboardInput<'_>,
    config: &AppConfig,
) -> Result<Dashboard, otj::WindowError> {
    let minimum_hours = otj::resolve_minimum_hours(input.standard);
    let tracker = otj::aggregate_weeks(
        input.entries,
        input.anchor,
        minimum_hours,
        config.lookback_weeks,
    )?;
    let progress = ksb::compute_progress(input.ksbs, input.evidence, config.focus_limit);

    let mut tasks = Vec::new();
    if let Some(current) = tracker.weeks.last() {
        let remaining_minutes = tracker.shortfall_minutes(current);
        if remaining_minutes > 0 {
            tasks.push(DashboardTask::LogOtjHours { remaining_minutes });
        }
    }
    for item in input.evidence {
        match item.status {
            EvidenceStatus::NeedsRevision => tasks.push(DashboardTask::ReviseEvidence {
                title: item.title.clone(),
            }),
            EvidenceStatus::Draft => tasks.push(DashboardTask::FinishDraft {
                title: item.title.clone(),
            }),
            EvidenceStatus::Submitted | EvidenceStatus::Approved => {}
        }
    }
    if let Some(focus) = progress.focus_areas.first() {
        tasks.push(DashboardTask::GatherEvidence {
            code: focus.code.clone(),
            name: focus.name.clone(),
        });
    }

    Ok(Dashboard {
        header: DashboardHeader {
            name: input.user.display_name(),
            role: input.user.role.to_string(),
            standard_title: input.standard.map(|s| s.title.clone()),
            employer: input.profile.and_then(|p| p.employer.clone()),
        },
        standard_found: input.standard.is_some(),
        compliance: tracker.status(),
        tracker,
        ksb_progress: progress,
        tasks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::models::{ActivityType, EvidenceType, KsbType};
    use chrono::Utc;
    use uuid::Uuid;

    fn learner() -> User {
        User {
            id: Uuid::new_v4(),
            first_name: "Avery".to_string(),
            last_name: "Lee".to_string(),
            email: "avery.lee@example.com".to_string(),
            role: Role::Learner,
        }
    }

    #[test]
    fn missing_standard_uses_default_threshold_and_still_renders() {
        let user = learner();
        let monday = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let entries = vec![OtjLogEntry {
            id: Uuid::new_v4(),
            learner_id: user.id,
            date: Some(monday),
            duration_minutes: 300,
            activity_type: ActivityType::Lecture,
            description: "Secure coding".to_string(),
            reflection: None,
        }];
        let dashboard = build_dashboard(
            DashboardInput {
                user: &user,
                profile: None,
                standard: None,
                entries: &entries,
                ksbs: &[],
                evidence: &[],
                anchor: monday,
            },
            &AppConfig::default(),
        )
        .unwrap();

        assert!(!dashboard.standard_found);
        assert_eq!(dashboard.tracker.minimum_hours, 6.0);
        assert_eq!(dashboard.tracker.weeks.len(), 8);
        assert_eq!(dashboard.header.name, "Avery Lee");
        assert_eq!(
            dashboard.tasks,
            vec![DashboardTask::LogOtjHours {
                remaining_minutes: 60
            }]
        );
    }

    #[test]
    fn tasks_include_revisions_and_top_focus_area() {
        let user = learner();
        let ksb = Ksb {
            id: Uuid::new_v4(),
            standard_id: Uuid::nil(),
            ksb_type: KsbType::Behavior,
            code: "B1".to_string(),
            title: "Takes responsibility".to_string(),
            required_evidence: 1,
        };
        let evidence = vec![EvidenceItem {
            id: Uuid::new_v4(),
            learner_id: user.id,
            title: "Incident retro".to_string(),
            description: "Led the retro".to_string(),
            evidence_type: EvidenceType::Document,
            reflection: None,
            url: None,
            status: EvidenceStatus::NeedsRevision,
            ksb_ids: vec![ksb.id],
            submitted_at: Utc::now(),
        }];
        let standard = ApprenticeshipStandard {
            id: Uuid::nil(),
            title: "Software Developer".to_string(),
            level: 4,
            minimum_otj_hours: 0.0,
        };
        let dashboard = build_dashboard(
            DashboardInput {
                user: &user,
                profile: None,
                standard: Some(&standard),
                entries: &[],
                ksbs: std::slice::from_ref(&ksb),
                evidence: &evidence,
                anchor: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            },
            &AppConfig::default(),
        )
        .unwrap();

        assert_eq!(dashboard.compliance, ComplianceStatus::OnTrack);
        assert_eq!(
            dashboard.tasks,
            vec![
                DashboardTask::ReviseEvidence {
                    title: "Incident retro".to_string()
                },
                DashboardTask::GatherEvidence {
                    code: "B1".to_string(),
                    name: "Takes responsibility".to_string()
                },
            ]
        );
    }

    #[test]
    fn anchors_outside_the_calendar_window_are_errors() {
        let user = learner();
        let result = build_dashboard(
            DashboardInput {
                user: &user,
                profile: None,
                standard: None,
                entries: &[],
                ksbs: &[],
                evidence: &[],
                anchor: NaiveDate::MAX,
            },
            &AppConfig::default(),
        );
        assert!(matches!(result, Err(otj::WindowError::AnchorOutOfRange(_))));
    }
}
