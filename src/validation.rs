use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ActivityType, EvidenceType};

const MAX_LONG_TEXT: usize = 5000;
const MAX_MINUTES_PER_ENTRY: i32 = 24 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    pub fields: Vec<FieldError>,
}

impl ValidationErrors {
    fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.fields.push(FieldError {
            field,
            message: message.into(),
        });
    }

    #[cfg(test)]
    pub fn has(&self, field: &str) -> bool {
        self.fields.iter().any(|error| error.field == field)
    }

    fn into_result<T>(self, value: impl FnOnce() -> T) -> Result<T, ValidationErrors> {
        if self.fields.is_empty() {
            Ok(value())
        } else {
            Err(self)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtjEntryForm {
    pub date: Option<String>,
    pub duration_minutes: Option<i32>,
    pub activity_type: Option<String>,
    #[serde(default)]
    pub description: String,
    pub reflection: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidOtjEntry {
    pub date: NaiveDate,
    pub duration_minutes: i32,
    pub activity_type: ActivityType,
    pub description: String,
    pub reflection: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub evidence_type: Option<String>,
    pub reflection: Option<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub ksb_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidEvidence {
    pub title: String,
    pub description: String,
    pub evidence_type: EvidenceType,
    pub reflection: Option<String>,
    pub url: Option<String>,
    pub ksb_ids: Vec<Uuid>,
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

fn check_length(
    errors: &mut ValidationErrors,
    field: &'static str,
    value: &str,
    min: usize,
    max: usize,
) {
    let len = value.chars().count();
    if len < min {
        if min == 1 {
            errors.push(field, "is required");
        } else {
            errors.push(field, format!("must be at least {min} characters"));
        }
    } else if len > max {
        errors.push(field, format!("must be at most {max} characters"));
    }
}

pub fn validate_otj_entry(form: &OtjEntryForm, today: NaiveDate) -> Result<ValidOtjEntry, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let date = match non_blank(form.date.as_deref()) {
        None => {
            errors.push("date", "is required");
            None
        }
        Some(raw) => match NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
            Ok(date) if date > today => {
                errors.push("date", "cannot be in the future");
                None
            }
            Ok(date) => Some(date),
            Err(_) => {
                errors.push("date", "must be a date in YYYY-MM-DD format");
                None
            }
        },
    };

    let duration_minutes = form.duration_minutes.unwrap_or(0);
    if !(1..=MAX_MINUTES_PER_ENTRY).contains(&duration_minutes) {
        errors.push(
            "durationMinutes",
            format!("must be between 1 and {MAX_MINUTES_PER_ENTRY} minutes"),
        );
    }

    let activity_type = match form.activity_type.as_deref().map(str::parse::<ActivityType>) {
        Some(Ok(activity)) => Some(activity),
        Some(Err(err)) => {
            errors.push("activityType", err.to_string());
            None
        }
        None => {
            errors.push("activityType", "is required");
            None
        }
    };

    let description = form.description.trim().to_string();
    check_length(&mut errors, "description", &description, 1, 2000);

    let reflection = non_blank(form.reflection.as_deref());
    if let Some(text) = &reflection {
        check_length(&mut errors, "reflection", text, 0, MAX_LONG_TEXT);
    }

    match (date, activity_type) {
        (Some(date), Some(activity_type)) => errors.into_result(|| ValidOtjEntry {
            date,
            duration_minutes,
            activity_type,
            description,
            reflection,
        }),
        _ => Err(errors),
    }
}

pub fn validate_evidence(form: &EvidenceForm) -> Result<ValidEvidence, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let title = form.title.trim().to_string();
    check_length(&mut errors, "title", &title, 3, 200);

    let description = form.description.trim().to_string();
    check_length(&mut errors, "description", &description, 1, MAX_LONG_TEXT);

    let reflection = non_blank(form.reflection.as_deref());
    if let Some(text) = &reflection {
        check_length(&mut errors, "reflection", text, 0, MAX_LONG_TEXT);
    }

    let evidence_type = match form.evidence_type.as_deref().map(str::parse::<EvidenceType>) {
        Some(Ok(kind)) => Some(kind),
        Some(Err(err)) => {
            errors.push("evidenceType", err.to_string());
            None
        }
        None => {
            errors.push("evidenceType", "is required");
            None
        }
    };

    let url = non_blank(form.url.as_deref());
    match &url {
        Some(raw) => match url::Url::parse(raw) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            _ => errors.push("url", "must be a valid http(s) URL"),
        },
        None if evidence_type == Some(EvidenceType::Link) => {
            errors.push("url", "is required for link evidence");
        }
        None => {}
    }

    let mut ksb_ids = form.ksb_ids.clone();
    ksb_ids.sort();
    ksb_ids.dedup();
    if ksb_ids.is_empty() {
        errors.push("ksbIds", "select at least one KSB");
    }

    match evidence_type {
        Some(evidence_type) => errors.into_result(|| ValidEvidence {
            title,
            description,
            evidence_type,
            reflection,
            url,
            ksb_ids,
        }),
        None => Err(errors),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn otj_form() -> OtjEntryForm {
        OtjEntryForm {
            date: Some("2026-10-16".to_string()),
            duration_minutes: Some(90),
            activity_type: Some("workshop".to_string()),
            description: "Agile ceremonies workshop".to_string(),
            reflection: Some("Learned how to run a retro".to_string()),
        }
    }

    fn evidence_form() -> EvidenceForm {
        EvidenceForm {
            title: "Release pipeline".to_string(),
            description: "Built the CI pipeline for the team".to_string(),
            evidence_type: Some("project".to_string()),
            reflection: None,
            url: Some("https://example.com/pipeline".to_string()),
            ksb_ids: vec![Uuid::new_v4()],
        }
    }

    #[test]
    fn accepts_a_complete_otj_entry() {
        let entry = validate_otj_entry(&otj_form(), today()).unwrap();
        assert_eq!(entry.activity_type, ActivityType::Workshop);
        assert_eq!(entry.duration_minutes, 90);
    }

    #[test]
    fn reports_every_bad_otj_field() {
        let form = OtjEntryForm {
            date: None,
            duration_minutes: Some(0),
            activity_type: Some("nap".to_string()),
            description: "   ".to_string(),
            reflection: None,
        };
        let errors = validate_otj_entry(&form, today()).unwrap_err();
        for field in ["date", "durationMinutes", "activityType", "description"] {
            assert!(errors.has(field), "missing error for {field}");
        }
    }

    #[test]
    fn rejects_future_and_malformed_dates() {
        let mut form = otj_form();
        form.date = Some("2026-10-20".to_string());
        assert!(validate_otj_entry(&form, today()).unwrap_err().has("date"));
        form.date = Some("16/10/2026".to_string());
        assert!(validate_otj_entry(&form, today()).unwrap_err().has("date"));
    }

    #[test]
    fn accepts_complete_evidence() {
        let evidence = validate_evidence(&evidence_form()).unwrap();
        assert_eq!(evidence.evidence_type, EvidenceType::Project);
    }

    #[test]
    fn evidence_needs_a_ksb_and_a_real_url() {
        let mut form = evidence_form();
        form.ksb_ids.clear();
        form.url = Some("ftp://example.com/file".to_string());
        let errors = validate_evidence(&form).unwrap_err();
        assert!(errors.has("ksbIds"));
        assert!(errors.has("url"));
    }

    #[test]
    fn link_evidence_requires_url() {
        let mut form = evidence_form();
        form.evidence_type = Some("link".to_string());
        form.url = None;
        assert!(validate_evidence(&form).unwrap_err().has("url"));
    }

    #[test]
    fn short_titles_are_rejected() {
        let mut form = evidence_form();
        form.title = "ok".to_string();
        let errors = validate_evidence(&form).unwrap_err();
        assert_eq!(errors.fields[0].message, "must be at least 3 characters");
    }
}
