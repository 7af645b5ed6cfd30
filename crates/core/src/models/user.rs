use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::common::RoleType;

/// An account together with its profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
    pub profile: Profile,
}

/// Per-user data that is not part of the login record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub role: RoleType,
    pub middle_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_path: Option<String>,
    pub attempts_count: u32,
    /// Set when the account was deactivated by the login lockout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn role(&self) -> RoleType {
        self.profile.role
    }

    pub fn is_student(&self) -> bool {
        self.profile.role == RoleType::Student
    }

    pub fn is_curator(&self) -> bool {
        self.profile.role == RoleType::Curator
    }

    pub fn is_administrator(&self) -> bool {
        self.profile.role == RoleType::Administrator
    }

    /// "Last First Middle", skipping the `-` placeholder for a missing middle name.
    pub fn full_name(&self) -> String {
        let mut name = format!("{} {}", self.last_name, self.first_name);
        if self.profile.middle_name != "-" && !self.profile.middle_name.is_empty() {
            name.push(' ');
            name.push_str(&self.profile.middle_name);
        }
        name
    }
}

/// Data needed to create an account and its profile.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub middle_name: String,
    pub role: RoleType,
    pub is_active: bool,
}
