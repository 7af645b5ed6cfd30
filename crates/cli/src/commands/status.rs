use rollcall_core::db::repository::{GroupRepository, PassRepository, UserRepository};
use rollcall_core::models::common::{PassStatus, RoleType};

use super::{load_config, open_repository};

/// Run the `status` command: print account, group and pass statistics.
pub async fn run(config_path: &str) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let repo = open_repository(&config).await?;

    let db_size = config
        .rollcall
        .database
        .path
        .as_deref()
        .and_then(|path| std::fs::metadata(path).ok())
        .map(|m| format_bytes(m.len()))
        .unwrap_or_else(|| "unknown".to_string());

    println!("Rollcall Status");
    println!("===============");
    println!("Instance: {}", config.rollcall.instance_name);
    println!("Database: SQLite ({db_size})");
    println!();

    let by_role = repo.count_users_by_role().await?;
    let count_of = |role: RoleType| {
        by_role
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    };
    println!("Users");
    println!("-----");
    for role in [RoleType::Student, RoleType::Curator, RoleType::Administrator] {
        println!("{:<15} {}", format!("{}:", role.label()), count_of(role));
    }
    println!();

    let groups = repo.list_auth_groups().await?;
    println!("Groups: {}", groups.len());
    println!();

    let passes = repo.count_passes().await?;
    println!("Passes");
    println!("------");
    for (status, count) in [
        (PassStatus::NotFilledIn, passes.not_filled_in),
        (PassStatus::NotVerify, passes.not_verify),
        (PassStatus::Verify, passes.verify),
        (PassStatus::Printed, passes.printed),
    ] {
        println!("{:<23} {}", format!("{}:", status.label()), count);
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_displays_correctly() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(3 * 1048576), "3.0 MB");
    }
}
