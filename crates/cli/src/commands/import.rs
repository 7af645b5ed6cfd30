use std::path::Path;

use rollcall_core::config::RosterConfig;
use rollcall_core::db::repository::UserRepository;
use rollcall_core::roster::{RosterImporter, NO_MIDDLE_NAME};
use tracing::{error, info};

use super::{load_config, open_repository};

/// Options of the `import` command.
pub struct ImportArgs<'a> {
    pub group: &'a str,
    pub curator: &'a str,
    pub file: &'a str,
    pub delimiter: Option<char>,
    pub dry_run: bool,
}

/// Run the `import` command: provision student accounts from a roster file.
pub async fn run(config_path: &str, args: ImportArgs<'_>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let delimiter = parse_delimiter(args.delimiter)?;

    let path = Path::new(args.file);
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let bytes = std::fs::read(path)?;
    info!(file = %path.display(), bytes = bytes.len(), "read roster");

    if args.dry_run {
        return dry_run(&config.roster, &file_name, &bytes, delimiter);
    }

    let repo = open_repository(&config).await?;
    let curator = repo
        .get_user_by_username(args.curator)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no user named {}", args.curator))?;

    let importer = RosterImporter::new(&repo, &config.roster);
    let report = match importer
        .import(args.group, &file_name, &bytes, delimiter, &curator)
        .await
    {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "import failed");
            return Err(e.into());
        }
    };

    println!(
        "Imported {} students into {}{}",
        report.students.len(),
        report.group.name,
        if report.group_created { " (new group)" } else { "" }
    );
    for student in &report.students {
        let middle = if student.middle_name == NO_MIDDLE_NAME {
            ""
        } else {
            student.middle_name.as_str()
        };
        println!(
            "  {:<20} {} {} {}",
            student.token, student.last_name, student.first_name, middle
        );
    }
    Ok(())
}

fn dry_run(
    limits: &RosterConfig,
    file_name: &str,
    bytes: &[u8],
    delimiter: Option<u8>,
) -> anyhow::Result<()> {
    let names = rollcall_core::roster::parse_roster_file(limits, file_name, bytes, delimiter)?;
    println!("Parsed {} students from {file_name}", names.len());
    let without_middle = names.iter().filter(|n| n.middle == NO_MIDDLE_NAME).count();
    if without_middle > 0 {
        println!("  {without_middle} without a middle name");
    }
    println!("Dry run mode - no data was written to the database.");
    Ok(())
}

fn parse_delimiter(delimiter: Option<char>) -> anyhow::Result<Option<u8>> {
    match delimiter {
        None => Ok(None),
        Some(c) if c.is_ascii() => Ok(Some(c as u8)),
        Some(c) => anyhow::bail!("delimiter must be an ASCII character, got {c:?}"),
    }
}
