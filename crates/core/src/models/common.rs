use serde::{Deserialize, Serialize};

/// Role recorded on a user's profile.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoleType {
    Student,
    Curator,
    Administrator,
}

impl RoleType {
    pub fn label(&self) -> &'static str {
        match self {
            RoleType::Student => "Student",
            RoleType::Curator => "Curator",
            RoleType::Administrator => "Administrator",
        }
    }

    /// Staff roles may manage groups and passes.
    pub fn is_staff(&self) -> bool {
        matches!(self, RoleType::Curator | RoleType::Administrator)
    }
}

/// Lifecycle of a student's pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PassStatus {
    NotFilledIn,
    NotVerify,
    Verify,
    Printed,
}

impl PassStatus {
    pub fn label(&self) -> &'static str {
        match self {
            PassStatus::NotFilledIn => "Not filled in",
            PassStatus::NotVerify => "Awaiting verification",
            PassStatus::Verify => "Verified",
            PassStatus::Printed => "Printed",
        }
    }

    /// A badge can only be produced once a curator accepted the photo.
    pub fn is_printable(&self) -> bool {
        matches!(self, PassStatus::Verify | PassStatus::Printed)
    }
}
