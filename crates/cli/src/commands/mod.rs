pub mod create_user;
pub mod import;
pub mod init;
pub mod serve;
pub mod status;

use std::path::Path;

use rollcall_core::config::RollcallConfig;
use rollcall_core::db::sqlite::SqliteRepository;
use rollcall_core::db::DatabasePool;
use tracing::info;

/// Load and validate the configuration file.
pub fn load_config(config_path: &str) -> anyhow::Result<RollcallConfig> {
    let config = RollcallConfig::load(Path::new(config_path))?;
    config.validate()?;
    info!(path = %config_path, "loaded configuration");
    Ok(config)
}

/// Open (creating if needed) the configured SQLite database.
pub async fn open_repository(config: &RollcallConfig) -> anyhow::Result<SqliteRepository> {
    let path = config
        .rollcall
        .database
        .path
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("SQLite path not configured"))?;
    let connect_str = format!("sqlite:{path}?mode=rwc");
    let pool = DatabasePool::new_sqlite(&connect_str).await?;
    Ok(SqliteRepository::new(pool.into_sqlite()))
}
