use chrono::{Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;
use tracing::warn;

use crate::models::{ApprenticeshipStandard, OtjLogEntry};

/// Weekly threshold applied when a learner's standard cannot be found.
pub const DEFAULT_MINIMUM_OTJ_HOURS: f64 = 6.0;

pub const MAX_LOOKBACK_WEEKS: usize = 104;

/// Anchors must fall within these calendar years.
pub const MIN_ANCHOR_YEAR: i32 = 1900;
pub const MAX_ANCHOR_YEAR: i32 = 2199;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WindowError {
    #[error(
        "anchor {0} is outside the supported years {min}..={max}",
        min = MIN_ANCHOR_YEAR,
        max = MAX_ANCHOR_YEAR
    )]
    AnchorOutOfRange(NaiveDate),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklySummary {
    pub week_start: NaiveDate,
    pub total_minutes: i64,
    pub meets_minimum: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    OnTrack,
    AtRisk,
    Behind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyTracker {
    pub minimum_hours: f64,
    pub weeks: Vec<WeeklySummary>,
    /// Entries skipped because they carry no date.
    pub invalid_dates: usize,
    /// Entries skipped because their duration was zero or negative.
    pub invalid_durations: usize,
    pub outside_window: usize,
}

impl WeeklyTracker {
    pub fn total_minutes(&self) -> i64 {
        self.weeks.iter().map(|week| week.total_minutes).sum()
    }

    pub fn weeks_meeting_minimum(&self) -> usize {
        self.weeks.iter().filter(|week| week.meets_minimum).count()
    }

    pub fn compliance_rate(&self) -> f64 {
        if self.weeks.is_empty() {
            return 0.0;
        }
        self.weeks_meeting_minimum() as f64 / self.weeks.len() as f64
    }

    pub fn status(&self) -> ComplianceStatus {
        let rate = self.compliance_rate();
        if !self.weeks.is_empty() && self.weeks_meeting_minimum() == self.weeks.len() {
            ComplianceStatus::OnTrack
        } else if rate >= 0.5 {
            ComplianceStatus::AtRisk
        } else {
            ComplianceStatus::Behind
        }
    }

    pub fn shortfall_minutes(&self, week: &WeeklySummary) -> i64 {
        let required = (self.minimum_hours * 60.0).ceil() as i64;
        (required - week.total_minutes).max(0)
    }
}

/// Monday on or before `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

pub fn current_week_anchor() -> NaiveDate {
    week_start(Utc::now().date_naive())
}

pub fn resolve_minimum_hours(standard: Option<&ApprenticeshipStandard>) -> f64 {
    standard
        .map(|s| s.minimum_otj_hours)
        .filter(|hours| hours.is_finite() && *hours >= 0.0)
        .unwrap_or(DEFAULT_MINIMUM_OTJ_HOURS)
}

pub fn aggregate_weeks(
    entries: &[OtjLogEntry],
    anchor: NaiveDate,
    minimum_hours: f64,
    lookback_weeks: usize,
) -> Result<WeeklyTracker, WindowError> {
    if !(MIN_ANCHOR_YEAR..=MAX_ANCHOR_YEAR).contains(&anchor.year()) {
        return Err(WindowError::AnchorOutOfRange(anchor));
    }
    let lookback_weeks = lookback_weeks.clamp(1, MAX_LOOKBACK_WEEKS);
    let last_week = week_start(anchor);
    let first_week = last_week - Duration::weeks(lookback_weeks as i64 - 1);
    let window_end = last_week + Duration::days(7);

    let mut totals = vec![0i64; lookback_weeks];
    let mut invalid_dates = 0usize;
    let mut invalid_durations = 0usize;
    let mut outside_window = 0usize;

    for entry in entries {
        let Some(date) = entry.date else {
            invalid_dates += 1;
            continue;
        };
        if entry.duration_minutes <= 0 {
            invalid_durations += 1;
            continue;
        }

        if date < first_week || date >= window_end {
            outside_window += 1;
            continue;
        }

        let index = ((week_start(date) - first_week).num_days() / 7) as usize;
        totals[index] += i64::from(entry.duration_minutes);
    }

    if invalid_dates > 0 {
        warn!(invalid_dates, "skipped OTJ log entries with missing dates");
    }
    if invalid_durations > 0 {
        warn!(invalid_durations, "skipped OTJ log entries with non-positive durations");
    }

    let weeks = totals
        .into_iter()
        .enumerate()
        .map(|(offset, total_minutes)| WeeklySummary {
            week_start: first_week + Duration::weeks(offset as i64),
            total_minutes,
            meets_minimum: total_minutes as f64 / 60.0 >= minimum_hours,
        })
        .collect();

    Ok(WeeklyTracker {
        minimum_hours,
        weeks,
        invalid_dates,
        invalid_durations,
        outside_window,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActivityType;
    use uuid::Uuid;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn entry(date: Option<NaiveDate>, minutes: i32) -> OtjLogEntry {
        OtjLogEntry {
            id: Uuid::new_v4(),
            learner_id: Uuid::nil(),
            date,
            duration_minutes: minutes,
            activity_type: ActivityType::Workshop,
            description: "session".to_string(),
            reflection: None,
        }
    }

    #[test]
    fn week_start_is_monday() {
        // 2026-10-19 is a Monday.
        assert_eq!(week_start(day(2026, 10, 19)), day(2026, 10, 19));
        assert_eq!(week_start(day(2026, 10, 21)), day(2026, 10, 19));
        assert_eq!(week_start(day(2026, 10, 25)), day(2026, 10, 19));
        assert_eq!(week_start(day(2026, 10, 26)), day(2026, 10, 26));
    }

    #[test]
    fn sums_entries_within_the_same_week() {
        let entries = vec![
            entry(Some(day(2026, 10, 19)), 120),
            entry(Some(day(2026, 10, 21)), 60),
        ];
        let tracker = aggregate_weeks(&entries, day(2026, 10, 21), 6.0, 8).unwrap();
        let last = tracker.weeks.last().unwrap();
        assert_eq!(last.week_start, day(2026, 10, 19));
        assert_eq!(last.total_minutes, 180);
        assert!(!last.meets_minimum);
    }

    #[test]
    fn empty_log_still_yields_the_full_window() {
        let tracker = aggregate_weeks(&[], day(2026, 10, 19), 6.0, 8).unwrap();
        assert_eq!(tracker.weeks.len(), 8);
        assert!(tracker
            .weeks
            .iter()
            .all(|week| week.total_minutes == 0 && !week.meets_minimum));
        assert_eq!(tracker.weeks[0].week_start, day(2026, 8, 31));
        assert_eq!(tracker.status(), ComplianceStatus::Behind);
    }

    #[test]
    fn boundary_entries_land_in_exactly_one_week() {
        let entries = vec![
            entry(Some(day(2026, 10, 18)), 30), // Sunday, previous week
            entry(Some(day(2026, 10, 19)), 45), // Monday, current week
        ];
        let tracker = aggregate_weeks(&entries, day(2026, 10, 19), 6.0, 2).unwrap();
        assert_eq!(tracker.weeks[0].total_minutes, 30);
        assert_eq!(tracker.weeks[1].total_minutes, 45);
        assert_eq!(tracker.total_minutes(), 75);
    }

    #[test]
    fn window_total_matches_in_window_durations() {
        let anchor = day(2026, 10, 21);
        let entries: Vec<OtjLogEntry> = (0..120)
            .map(|i| entry(Some(day(2026, 6, 1) + Duration::days(i)), 15 + (i as i32 % 7) * 10))
            .chain([entry(None, 90), entry(Some(day(2026, 10, 20)), 0)])
            .collect();
        let tracker = aggregate_weeks(&entries, anchor, 6.0, 8).unwrap();

        let first = tracker.weeks[0].week_start;
        let end = week_start(anchor) + Duration::days(7);
        let expected: i64 = entries
            .iter()
            .filter(|e| e.duration_minutes > 0)
            .filter_map(|e| e.date.map(|d| (d, e.duration_minutes)))
            .filter(|(d, _)| *d >= first && *d < end)
            .map(|(_, minutes)| i64::from(minutes))
            .sum();

        assert_eq!(tracker.total_minutes(), expected);
        assert_eq!(tracker.invalid_dates, 1);
        assert_eq!(tracker.invalid_durations, 1);
        assert_eq!(
            tracker.outside_window
                + tracker.invalid_dates
                + tracker.invalid_durations
                + in_window(&entries, first, end),
            entries.len()
        );
    }

    fn in_window(entries: &[OtjLogEntry], first: NaiveDate, end: NaiveDate) -> usize {
        entries
            .iter()
            .filter(|e| e.duration_minutes > 0)
            .filter(|e| e.date.is_some_and(|d| d >= first && d < end))
            .count()
    }

    #[test]
    fn missing_standard_falls_back_to_six_hours() {
        assert_eq!(resolve_minimum_hours(None), 6.0);
        let standard = ApprenticeshipStandard {
            id: Uuid::new_v4(),
            title: "Software Developer".to_string(),
            level: 4,
            minimum_otj_hours: 7.5,
        };
        assert_eq!(resolve_minimum_hours(Some(&standard)), 7.5);
    }

    #[test]
    fn status_tracks_share_of_compliant_weeks() {
        let entries = vec![
            entry(Some(day(2026, 10, 12)), 360),
            entry(Some(day(2026, 10, 19)), 120),
        ];
        let tracker = aggregate_weeks(&entries, day(2026, 10, 19), 6.0, 2).unwrap();
        assert_eq!(tracker.weeks_meeting_minimum(), 1);
        assert_eq!(tracker.status(), ComplianceStatus::AtRisk);
        assert_eq!(tracker.shortfall_minutes(&tracker.weeks[1]), 240);
        assert_eq!(tracker.shortfall_minutes(&tracker.weeks[0]), 0);
    }

    #[test]
    fn missing_dates_and_bad_durations_are_counted_apart() {
        let entries = vec![
            entry(None, 60),
            entry(None, 30),
            entry(Some(day(2026, 10, 19)), 0),
            entry(Some(day(2026, 10, 19)), -15),
            entry(Some(day(2026, 10, 19)), 45),
        ];
        let tracker = aggregate_weeks(&entries, day(2026, 10, 19), 6.0, 1).unwrap();
        assert_eq!(tracker.invalid_dates, 2);
        assert_eq!(tracker.invalid_durations, 2);
        assert_eq!(tracker.total_minutes(), 45);
    }

    #[test]
    fn anchors_at_the_calendar_edges_are_rejected() {
        for anchor in [NaiveDate::MIN, NaiveDate::MAX, day(1899, 12, 31), day(2200, 1, 1)] {
            assert_eq!(
                aggregate_weeks(&[], anchor, 6.0, 8),
                Err(WindowError::AnchorOutOfRange(anchor))
            );
        }
        let earliest = aggregate_weeks(&[], day(1900, 1, 1), 6.0, MAX_LOOKBACK_WEEKS).unwrap();
        assert_eq!(earliest.weeks.len(), MAX_LOOKBACK_WEEKS);
    }

    #[test]
    fn oversized_lookback_is_capped() {
        let tracker = aggregate_weeks(&[], day(2026, 10, 19), 6.0, usize::MAX).unwrap();
        assert_eq!(tracker.weeks.len(), MAX_LOOKBACK_WEEKS);
        assert_eq!(tracker.weeks.last().unwrap().week_start, day(2026, 10, 19));
        let tracker = aggregate_weeks(&[], day(2026, 10, 19), 6.0, 0).unwrap();
        assert_eq!(tracker.weeks.len(), 1);
    }
}
