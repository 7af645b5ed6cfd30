//! TOML-based configuration system for Rollcall.

use crate::error::{Result, RollcallError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level Rollcall configuration, deserialized from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollcallConfig {
    pub rollcall: RollcallSection,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub roster: RosterConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub badge: BadgeConfig,
}

/// Core instance settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollcallSection {
    pub instance_name: String,
    pub data_dir: String,
    #[serde(default)]
    pub public_url: Option<String>,
    /// Whether self-registered curators may sign in before confirming their email.
    #[serde(default)]
    pub default_user_is_active: bool,
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// SQLite database location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: Some("/var/lib/rollcall/rollcall.db".into()),
        }
    }
}

/// Login lockout and session lifetime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_lockout_reactivation_days")]
    pub lockout_reactivation_days: i64,
    #[serde(default = "default_signup_activation_hours")]
    pub signup_activation_hours: i64,
    #[serde(default = "default_session_hours")]
    pub session_hours: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            lockout_reactivation_days: default_lockout_reactivation_days(),
            signup_activation_hours: default_signup_activation_hours(),
            session_hours: default_session_hours(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_lockout_reactivation_days() -> i64 {
    7
}

fn default_signup_activation_hours() -> i64 {
    12
}

fn default_session_hours() -> i64 {
    24
}

/// Outgoing mail settings. Messages are written to an outbox directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    #[serde(default = "default_from_address")]
    pub from_address: String,
    /// Defaults to `<data_dir>/outbox`.
    #[serde(default)]
    pub outbox_dir: Option<String>,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            from_address: default_from_address(),
            outbox_dir: None,
        }
    }
}

fn default_from_address() -> String {
    "noreply@rollcall.local".into()
}

/// Limits applied to uploaded roster files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterConfig {
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
    #[serde(default = "default_max_columns")]
    pub max_columns: usize,
    #[serde(default = "default_delimiter")]
    pub default_delimiter: String,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            max_rows: default_max_rows(),
            max_columns: default_max_columns(),
            default_delimiter: default_delimiter(),
        }
    }
}

fn default_max_rows() -> usize {
    200
}

fn default_max_columns() -> usize {
    30
}

fn default_delimiter() -> String {
    ",".into()
}

/// Uploaded media storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Defaults to `<data_dir>/media`.
    #[serde(default)]
    pub root: Option<String>,
    #[serde(default = "default_max_avatar_bytes")]
    pub max_avatar_bytes: usize,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            root: None,
            max_avatar_bytes: default_max_avatar_bytes(),
        }
    }
}

fn default_max_avatar_bytes() -> usize {
    5 * 1024 * 1024
}

/// Badge card template and layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadgeConfig {
    #[serde(default)]
    pub template_path: Option<String>,
    #[serde(default)]
    pub font_path: Option<String>,
    #[serde(default = "default_circle_size")]
    pub circle_size: [u32; 2],
    #[serde(default = "default_photo_position")]
    pub photo_position: [i64; 2],
    #[serde(default = "default_text_position")]
    pub text_position: [i64; 2],
    #[serde(default = "default_font_size")]
    pub font_size: f32,
    #[serde(default = "default_text_color")]
    pub text_color: [u8; 3],
}

impl Default for BadgeConfig {
    fn default() -> Self {
        Self {
            template_path: None,
            font_path: None,
            circle_size: default_circle_size(),
            photo_position: default_photo_position(),
            text_position: default_text_position(),
            font_size: default_font_size(),
            text_color: default_text_color(),
        }
    }
}

fn default_circle_size() -> [u32; 2] {
    [250, 250]
}

fn default_photo_position() -> [i64; 2] {
    [50, 100]
}

fn default_text_position() -> [i64; 2] {
    [350, 400]
}

fn default_font_size() -> f32 {
    90.0
}

fn default_text_color() -> [u8; 3] {
    [8, 37, 103]
}

impl RollcallConfig {
    /// Load configuration from a TOML file at the given path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| RollcallError::Config(format!("failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.rollcall.instance_name.is_empty() {
            return Err(RollcallError::Config(
                "rollcall.instance_name must not be empty".into(),
            ));
        }

        if self.rollcall.data_dir.is_empty() {
            return Err(RollcallError::Config(
                "rollcall.data_dir must not be empty".into(),
            ));
        }

        if self.rollcall.database.path.is_none() {
            return Err(RollcallError::Config(
                "rollcall.database.path is required".into(),
            ));
        }

        if self.auth.max_attempts == 0 {
            return Err(RollcallError::Config(
                "auth.max_attempts must be at least 1".into(),
            ));
        }

        if self.roster.max_rows == 0 || self.roster.max_columns == 0 {
            return Err(RollcallError::Config(
                "roster.max_rows and roster.max_columns must be positive".into(),
            ));
        }

        if self.roster.delimiter_byte().is_none() {
            return Err(RollcallError::Config(
                "roster.default_delimiter must be a single ASCII character".into(),
            ));
        }

        Ok(())
    }

    /// Produce a configuration with sensible defaults, suitable for `rollcall init`.
    pub fn generate_default() -> Self {
        Self {
            rollcall: RollcallSection {
                instance_name: "Rollcall".into(),
                data_dir: "/var/lib/rollcall".into(),
                public_url: None,
                default_user_is_active: false,
                database: DatabaseConfig::default(),
            },
            auth: AuthConfig::default(),
            mail: MailConfig::default(),
            roster: RosterConfig::default(),
            media: MediaConfig::default(),
            badge: BadgeConfig::default(),
        }
    }

    pub fn media_root(&self) -> PathBuf {
        match &self.media.root {
            Some(root) => PathBuf::from(root),
            None => Path::new(&self.rollcall.data_dir).join("media"),
        }
    }

    pub fn outbox_dir(&self) -> PathBuf {
        match &self.mail.outbox_dir {
            Some(dir) => PathBuf::from(dir),
            None => Path::new(&self.rollcall.data_dir).join("outbox"),
        }
    }
}

impl RosterConfig {
    pub fn delimiter_byte(&self) -> Option<u8> {
        match self.default_delimiter.as_bytes() {
            [b] if b.is_ascii() => Some(*b),
            _ => None,
        }
    }
}
