use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Learner,
    Admin,
    TrainingProvider,
    Assessor,
    Iqa,
    Operations,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Log OTJ hours and submit evidence for one's own record.
    SubmitOwnRecords,
    /// Read any learner's logs, evidence and progress.
    ViewLearnerRecords,
    /// Move evidence between review states.
    ReviewEvidence,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Learner,
        Role::Admin,
        Role::TrainingProvider,
        Role::Assessor,
        Role::Iqa,
        Role::Operations,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Learner => "learner",
            Role::Admin => "admin",
            Role::TrainingProvider => "training_provider",
            Role::Assessor => "assessor",
            Role::Iqa => "iqa",
            Role::Operations => "operations",
        }
    }

    pub fn can(&self, capability: Capability) -> bool {
        match (self, capability) {
            (Role::Admin, Capability::SubmitOwnRecords) => false,
            (Role::Admin, _) => true,
            (Role::Learner, Capability::SubmitOwnRecords) => true,
            (Role::Learner, _) => false,
            (_, Capability::SubmitOwnRecords) => false,
            (Role::TrainingProvider | Role::Operations, Capability::ViewLearnerRecords) => true,
            (Role::TrainingProvider | Role::Operations, Capability::ReviewEvidence) => false,
            (Role::Assessor | Role::Iqa, _) => true,
        }
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str() == value)
            .ok_or_else(|| UnknownVariant {
                kind: "role",
                value: value.to_string(),
            })
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The caller of a request, resolved from its session token and handed to
/// each handler explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthContext {
    pub fn can_view_learner(&self, learner_id: Uuid) -> bool {
        self.user_id == learner_id || self.role.can(Capability::ViewLearnerRecords)
    }

    pub fn can_submit_for(&self, learner_id: Uuid) -> bool {
        self.user_id == learner_id && self.role.can(Capability::SubmitOwnRecords)
    }

    pub fn can_review_evidence(&self) -> bool {
        self.role.can(Capability::ReviewEvidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn learners_only_reach_their_own_records() {
        let me = Uuid::new_v4();
        let ctx = AuthContext {
            user_id: me,
            role: Role::Learner,
        };
        assert!(ctx.can_view_learner(me));
        assert!(ctx.can_submit_for(me));
        assert!(!ctx.can_view_learner(Uuid::new_v4()));
        assert!(!ctx.can_review_evidence());
    }

    #[test]
    fn staff_roles_view_but_do_not_submit() {
        let learner = Uuid::new_v4();
        for role in [
            Role::Admin,
            Role::TrainingProvider,
            Role::Assessor,
            Role::Iqa,
            Role::Operations,
        ] {
            let ctx = AuthContext {
                user_id: Uuid::new_v4(),
                role,
            };
            assert!(ctx.can_view_learner(learner), "{role} should view learners");
            assert!(!ctx.can_submit_for(learner), "{role} should not submit");
        }
    }

    #[test]
    fn review_is_limited_to_assessment_roles() {
        let reviewers: Vec<Role> = Role::ALL
            .into_iter()
            .filter(|role| role.can(Capability::ReviewEvidence))
            .collect();
        assert_eq!(reviewers, vec![Role::Admin, Role::Assessor, Role::Iqa]);
    }

    #[test]
    fn roles_round_trip_through_text() {
        assert_eq!("training_provider".parse::<Role>(), Ok(Role::TrainingProvider));
        assert!("superuser".parse::<Role>().is_err());
    }
}
