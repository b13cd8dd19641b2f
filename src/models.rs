use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::Role;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
}

impl User {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnerProfile {
    pub learner_id: Uuid,
    pub standard_id: Uuid,
    pub employer: Option<String>,
    pub start_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprenticeshipStandard {
    pub id: Uuid,
    pub title: String,
    pub level: i32,
    pub minimum_otj_hours: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OtjLogEntry {
    pub id: Uuid,
    pub learner_id: Uuid,
    /// `None` when an imported row carried a date that could not be parsed.
    pub date: Option<NaiveDate>,
    pub duration_minutes: i32,
    pub activity_type: ActivityType,
    pub description: String,
    pub reflection: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ksb {
    pub id: Uuid,
    pub standard_id: Uuid,
    pub ksb_type: KsbType,
    pub code: String,
    pub title: String,
    pub required_evidence: i32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceItem {
    pub id: Uuid,
    pub learner_id: Uuid,
    pub title: String,
    pub description: String,
    pub evidence_type: EvidenceType,
    pub reflection: Option<String>,
    pub url: Option<String>,
    pub status: EvidenceStatus,
    pub ksb_ids: Vec<Uuid>,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KsbType {
    Knowledge,
    Skill,
    Behavior,
}

impl KsbType {
    pub const ALL: [KsbType; 3] = [KsbType::Knowledge, KsbType::Skill, KsbType::Behavior];

    pub fn as_str(&self) -> &'static str {
        match self {
            KsbType::Knowledge => "knowledge",
            KsbType::Skill => "skill",
            KsbType::Behavior => "behavior",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Lecture,
    Workshop,
    Shadowing,
    Mentoring,
    OnlineLearning,
    SelfStudy,
    Assignment,
    Other,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::Lecture => "lecture",
            ActivityType::Workshop => "workshop",
            ActivityType::Shadowing => "shadowing",
            ActivityType::Mentoring => "mentoring",
            ActivityType::OnlineLearning => "online_learning",
            ActivityType::SelfStudy => "self_study",
            ActivityType::Assignment => "assignment",
            ActivityType::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    Document,
    Video,
    Audio,
    Link,
    Observation,
    Project,
    Other,
}

impl EvidenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceType::Document => "document",
            EvidenceType::Video => "video",
            EvidenceType::Audio => "audio",
            EvidenceType::Link => "link",
            EvidenceType::Observation => "observation",
            EvidenceType::Project => "project",
            EvidenceType::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceStatus {
    Draft,
    Submitted,
    Approved,
    NeedsRevision,
}

impl EvidenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceStatus::Draft => "draft",
            EvidenceStatus::Submitted => "submitted",
            EvidenceStatus::Approved => "approved",
            EvidenceStatus::NeedsRevision => "needs_revision",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

// Stored as text columns; parsing mirrors the serde names.
macro_rules! text_enum {
    ($ty:ty, $kind:literal, [$($variant:expr),+ $(,)?]) => {
        impl FromStr for $ty {
            type Err = UnknownVariant;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                [$($variant),+]
                    .into_iter()
                    .find(|variant| variant.as_str() == value)
                    .ok_or_else(|| UnknownVariant {
                        kind: $kind,
                        value: value.to_string(),
                    })
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(KsbType, "ksb type", [KsbType::Knowledge, KsbType::Skill, KsbType::Behavior]);
text_enum!(
    ActivityType,
    "activity type",
    [
        ActivityType::Lecture,
        ActivityType::Workshop,
        ActivityType::Shadowing,
        ActivityType::Mentoring,
        ActivityType::OnlineLearning,
        ActivityType::SelfStudy,
        ActivityType::Assignment,
        ActivityType::Other,
    ]
);
text_enum!(
    EvidenceType,
    "evidence type",
    [
        EvidenceType::Document,
        EvidenceType::Video,
        EvidenceType::Audio,
        EvidenceType::Link,
        EvidenceType::Observation,
        EvidenceType::Project,
        EvidenceType::Other,
    ]
);
text_enum!(
    EvidenceStatus,
    "evidence status",
    [
        EvidenceStatus::Draft,
        EvidenceStatus::Submitted,
        EvidenceStatus::Approved,
        EvidenceStatus::NeedsRevision,
    ]
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_enums_parse_their_own_names() {
        assert_eq!("online_learning".parse::<ActivityType>(), Ok(ActivityType::OnlineLearning));
        assert_eq!("needs_revision".parse::<EvidenceStatus>(), Ok(EvidenceStatus::NeedsRevision));
        assert_eq!("behavior".parse::<KsbType>(), Ok(KsbType::Behavior));
        assert_eq!(EvidenceType::Link.to_string(), "link");
    }

    #[test]
    fn unknown_text_is_rejected() {
        let err = "behaviour".parse::<KsbType>().unwrap_err();
        assert_eq!(err.to_string(), "unknown ksb type 'behaviour'");
    }
}
