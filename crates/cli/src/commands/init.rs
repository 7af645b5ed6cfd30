use std::path::Path;

use rollcall_core::config::{DatabaseConfig, MailConfig, MediaConfig, RollcallConfig};
use rollcall_core::db::DatabasePool;
use tracing::info;

pub const CONFIG_FILE_NAME: &str = "rollcall.toml";

/// Run the `init` command: create the data directories, write a default config and the database.
pub async fn run(data_dir: &str) -> anyhow::Result<()> {
    let data_path = Path::new(data_dir);
    let config_path = data_path.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        anyhow::bail!(
            "{} already exists; refusing to overwrite it",
            config_path.display()
        );
    }

    let media_dir = data_path.join("media");
    let outbox_dir = data_path.join("outbox");
    for dir in [data_path, media_dir.as_path(), outbox_dir.as_path()] {
        std::fs::create_dir_all(dir)?;
        info!(path = %dir.display(), "created directory");
    }

    let db_path = data_path.join("rollcall.db").to_string_lossy().to_string();
    let defaults = RollcallConfig::generate_default();
    let config = RollcallConfig {
        rollcall: rollcall_core::config::RollcallSection {
            data_dir: data_dir.to_string(),
            database: DatabaseConfig {
                path: Some(db_path.clone()),
            },
            ..defaults.rollcall
        },
        mail: MailConfig {
            outbox_dir: Some(outbox_dir.to_string_lossy().to_string()),
            ..defaults.mail
        },
        media: MediaConfig {
            root: Some(media_dir.to_string_lossy().to_string()),
            ..defaults.media
        },
        ..defaults
    };

    let toml_str = toml::to_string_pretty(&config)?;
    std::fs::write(&config_path, &toml_str)?;
    info!(path = %config_path.display(), "wrote configuration");

    DatabasePool::new_sqlite(&format!("sqlite:{db_path}?mode=rwc")).await?;
    info!(path = %db_path, "database initialized");

    println!("Rollcall initialized.");
    println!("  Data directory: {data_dir}");
    println!("  Configuration:  {}", config_path.display());
    println!("  Database:       {db_path}");
    println!();
    println!("Next steps:");
    println!("  1. Set rollcall.public_url and the [badge] template in {}", config_path.display());
    println!("  2. Run `rollcall create-user --role administrator ...` for the first account");
    println!("  3. Run `rollcall serve`");

    Ok(())
}
