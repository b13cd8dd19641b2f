use std::fmt::Write;

use crate::dashboard::{Dashboard, DashboardTask};
use crate::models::{ActivityType, OtjLogEntry};

#[derive(Debug, Clone, PartialEq)]
pub struct ActivitySummary {
    pub activity_type: ActivityType,
    pub sessions: usize,
    pub total_minutes: i64,
}

pub fn summarize_by_activity(entries: &[OtjLogEntry]) -> Vec<ActivitySummary> {
    let mut summaries: Vec<ActivitySummary> = Vec::new();

    for entry in entries.iter().filter(|e| e.date.is_some() && e.duration_minutes > 0) {
        match summaries
            .iter_mut()
            .find(|s| s.activity_type == entry.activity_type)
        {
            Some(summary) => {
                summary.sessions += 1;
                summary.total_minutes += i64::from(entry.duration_minutes);
            }
            None => summaries.push(ActivitySummary {
                activity_type: entry.activity_type,
                sessions: 1,
                total_minutes: i64::from(entry.duration_minutes),
            }),
        }
    }

    summaries.sort_by(|a, b| {
        b.total_minutes
            .cmp(&a.total_minutes)
            .then_with(|| a.activity_type.as_str().cmp(b.activity_type.as_str()))
    });
    summaries
}

fn hours(minutes: i64) -> f64 {
    minutes as f64 / 60.0
}

pub fn build_report(dashboard: &Dashboard, entries: &[OtjLogEntry]) -> String {
    let mut output = String::new();
    let header = &dashboard.header;
    let tracker = &dashboard.tracker;

    let _ = writeln!(output, "# OTJ Progress Report: {}", header.name);
    let _ = writeln!(
        output,
        "Standard: {}{}",
        header.standard_title.as_deref().unwrap_or("not assigned"),
        if dashboard.standard_found {
            ""
        } else {
            " (default minimum applied)"
        }
    );
    if let Some(employer) = &header.employer {
        let _ = writeln!(output, "Employer: {employer}");
    }
    let _ = writeln!(output);

    let _ = writeln!(output, "## Weekly OTJ Hours");
    let _ = writeln!(
        output,
        "Minimum {:.1}h per week; {} of {} weeks met ({:?}).",
        tracker.minimum_hours,
        tracker.weeks_meeting_minimum(),
        tracker.weeks.len(),
        dashboard.compliance
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "| Week starting | Hours | Met |");
    let _ = writeln!(output, "|---|---|---|");
    for week in &tracker.weeks {
        let _ = writeln!(
            output,
            "| {} | {:.1} | {} |",
            week.week_start,
            hours(week.total_minutes),
            if week.meets_minimum { "yes" } else { "no" }
        );
    }
    if tracker.invalid_dates > 0 {
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "Warning: {} log entries have no usable date and were not counted.",
            tracker.invalid_dates
        );
    }
    if tracker.invalid_durations > 0 {
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "Warning: {} log entries have a zero or negative duration and were not counted.",
            tracker.invalid_durations
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Activity Mix");
    let summaries = summarize_by_activity(entries);
    if summaries.is_empty() {
        let _ = writeln!(output, "No OTJ sessions logged yet.");
    } else {
        for summary in &summaries {
            let _ = writeln!(
                output,
                "- {}: {} sessions, {:.1}h",
                summary.activity_type,
                summary.sessions,
                hours(summary.total_minutes)
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## KSB Progress");
    for item in &dashboard.ksb_progress.items {
        if item.is_applicable() {
            let _ = writeln!(
                output,
                "- {}: {}/{} ({:.0}%)",
                item.ksb_type,
                item.achieved,
                item.total,
                item.percent()
            );
        } else {
            let _ = writeln!(output, "- {}: not applicable", item.ksb_type);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Focus Areas");
    if dashboard.ksb_progress.focus_areas.is_empty() {
        let _ = writeln!(output, "Every KSB has approved evidence.");
    } else {
        for focus in &dashboard.ksb_progress.focus_areas {
            let _ = writeln!(
                output,
                "- {} {} ({}): {} more approved item(s)",
                focus.code, focus.name, focus.ksb_type, focus.remaining
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Next Steps");
    if dashboard.tasks.is_empty() {
        let _ = writeln!(output, "Nothing outstanding.");
    } else {
        for task in &dashboard.tasks {
            let line = match task {
                DashboardTask::LogOtjHours { remaining_minutes } => {
                    format!("Log {:.1}h more OTJ training this week", hours(*remaining_minutes))
                }
                DashboardTask::ReviseEvidence { title } => format!("Revise evidence \"{title}\""),
                DashboardTask::FinishDraft { title } => format!("Finish draft \"{title}\""),
                DashboardTask::GatherEvidence { code, name } => {
                    format!("Gather evidence for {code} {name}")
                }
            };
            let _ = writeln!(output, "- {line}");
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::config::AppConfig;
    use crate::dashboard::{build_dashboard, DashboardInput};
    use crate::models::User;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn entry(date: Option<NaiveDate>, minutes: i32, activity_type: ActivityType) -> OtjLogEntry {
        OtjLogEntry {
            id: Uuid::new_v4(),
            learner_id: Uuid::nil(),
            date,
            duration_minutes: minutes,
            activity_type,
            description: "session".to_string(),
            reflection: None,
        }
    }

    #[test]
    fn activity_mix_orders_by_time_spent() {
        let day = NaiveDate::from_ymd_opt(2026, 10, 14);
        let entries = vec![
            entry(day, 60, ActivityType::SelfStudy),
            entry(day, 120, ActivityType::Workshop),
            entry(day, 30, ActivityType::SelfStudy),
            entry(None, 500, ActivityType::Lecture),
        ];
        let summaries = summarize_by_activity(&entries);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].activity_type, ActivityType::Workshop);
        assert_eq!(summaries[1].sessions, 2);
        assert_eq!(summaries[1].total_minutes, 90);
    }

    #[test]
    fn report_flags_default_threshold_and_bad_dates() {
        let user = User {
            id: Uuid::new_v4(),
            first_name: "Jules".to_string(),
            last_name: "Moreno".to_string(),
            email: "jules@example.com".to_string(),
            role: Role::Learner,
        };
        let entries = vec![
            entry(None, 45, ActivityType::Mentoring),
            entry(NaiveDate::from_ymd_opt(2026, 10, 20), 0, ActivityType::Lecture),
        ];
        let dashboard = build_dashboard(
            DashboardInput {
                user: &user,
                profile: None,
                standard: None,
                entries: &entries,
                ksbs: &[],
                evidence: &[],
                anchor: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            },
            &AppConfig::default(),
        )
        .unwrap();
        let report = build_report(&dashboard, &entries);

        assert!(report.starts_with("# OTJ Progress Report: Jules Moreno"));
        assert!(report.contains("(default minimum applied)"));
        assert!(report.contains("Warning: 1 log entries have no usable date"));
        assert!(report.contains("Warning: 1 log entries have a zero or negative duration"));
        assert!(report.contains("- skill: not applicable"));
        assert!(report.contains("Log 6.0h more OTJ training this week"));
    }
}
