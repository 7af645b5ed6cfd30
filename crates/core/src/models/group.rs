use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::institution::Institution;
use crate::error::{Result, RollcallError};

/// A membership group. Students belong to one through `user_groups`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthGroup {
    pub id: i64,
    pub name: String,
}

/// The curator responsible for an auth group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupLeader {
    pub group_id: i64,
    pub curator_id: i64,
    pub created_at: DateTime<Utc>,
}

/// A class within an institution, kept in step with its [`AuthGroup`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrgGroup {
    /// Zero for a group that has not been saved yet.
    pub id: i64,
    pub name: String,
    pub course: u8,
    pub year: NaiveDate,
    pub curator_id: i64,
    pub institution_id: Option<i64>,
    pub auth_group_id: Option<i64>,
}

pub const MIN_GROUP_NAME_LEN: usize = 3;
pub const MAX_GROUP_NAME_LEN: usize = 50;

impl OrgGroup {
    /// An unsaved first-course group for the current year.
    pub fn new(name: impl Into<String>, curator_id: i64) -> Self {
        Self {
            id: 0,
            name: name.into(),
            course: 1,
            year: default_year(),
            curator_id,
            institution_id: None,
            auth_group_id: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let len = self.name.chars().count();
        if !(MIN_GROUP_NAME_LEN..=MAX_GROUP_NAME_LEN).contains(&len) {
            return Err(RollcallError::Validation(format!(
                "group name must be {MIN_GROUP_NAME_LEN} to {MAX_GROUP_NAME_LEN} characters"
            )));
        }
        if !(1..=6).contains(&self.course) {
            return Err(RollcallError::Validation(
                "course must be between 1 and 6".into(),
            ));
        }
        Ok(())
    }

    pub fn display_name(&self, institution: Option<&Institution>) -> String {
        match institution {
            Some(inst) => format!("{} ({})", self.name, inst.short_name),
            None => format!("{} (no institution)", self.name),
        }
    }
}

/// January 1st of the current year.
pub fn default_year() -> NaiveDate {
    let year = Utc::now().year();
    NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or_default()
}
