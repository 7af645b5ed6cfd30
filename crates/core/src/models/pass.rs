use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::common::PassStatus;

/// A student's badge request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pass {
    pub id: i64,
    pub user_id: i64,
    pub status: PassStatus,
    pub photo_path: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// A pass joined with the student and group it belongs to, for review and printing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PassRequest {
    pub pass: Pass,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub middle_name: String,
    pub group_id: i64,
    pub group_name: String,
}

impl PassRequest {
    /// The text printed on the badge card.
    pub fn card_text(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Number of passes in each status.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PassCounts {
    pub not_filled_in: i64,
    pub not_verify: i64,
    pub verify: i64,
    pub printed: i64,
}
