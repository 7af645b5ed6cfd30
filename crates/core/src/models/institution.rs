use serde::{Deserialize, Serialize};

use crate::error::{Result, RollcallError};

/// A school or college. Its administrator sees every group attached to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Institution {
    pub id: i64,
    pub name: String,
    pub short_name: String,
    pub information: String,
    pub logo_path: Option<String>,
    pub admin_id: i64,
}

const LOGO_EXTENSIONS: &[&str] = &["png", "jpg", "svg"];

impl Institution {
    pub fn validate(&self) -> Result<()> {
        let name_len = self.name.chars().count();
        let short_len = self.short_name.chars().count();

        if name_len == 0 || name_len > 255 {
            return Err(RollcallError::Validation(
                "name must be 1 to 255 characters".into(),
            ));
        }
        if short_len > 50 {
            return Err(RollcallError::Validation(
                "short name must be at most 50 characters".into(),
            ));
        }
        if short_len <= 2 {
            return Err(RollcallError::Validation(
                "short name must be longer than 2 characters".into(),
            ));
        }
        if short_len >= name_len {
            return Err(RollcallError::Validation(
                "short name must be shorter than the name".into(),
            ));
        }
        if self.information.chars().count() > 5000 {
            return Err(RollcallError::Validation(
                "information must be at most 5000 characters".into(),
            ));
        }
        if let Some(logo) = &self.logo_path {
            let ext = logo.rsplit('.').next().unwrap_or("").to_lowercase();
            if !logo.contains('.') || !LOGO_EXTENSIONS.contains(&ext.as_str()) {
                return Err(RollcallError::Validation(
                    "logo must be a png, jpg or svg file".into(),
                ));
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for Institution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.short_name)
    }
}
