use rollcall_core::db::repository::{AuditRepository, UserRepository};
use rollcall_core::identity::{is_email, is_valid_username, normalize_email};
use rollcall_core::models::common::RoleType;
use rollcall_core::models::user::{NewUser, User};
use rollcall_core::passwords::{hash_password, validate_password};
use tracing::info;

use super::{load_config, open_repository};

/// Options of the `create-user` command.
pub struct CreateUserArgs<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub role: &'a str,
    pub password: &'a str,
}

/// Run the `create-user` command: add an active staff account.
pub async fn run(config_path: &str, args: CreateUserArgs<'_>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let repo = open_repository(&config).await?;
    let user = create(&repo, &args).await?;
    println!(
        "Created {} account {} (id {})",
        user.role().label().to_lowercase(),
        user.username,
        user.id
    );
    Ok(())
}

async fn create<R>(repo: &R, args: &CreateUserArgs<'_>) -> anyhow::Result<User>
where
    R: UserRepository + AuditRepository,
{
    let role = parse_staff_role(args.role)?;
    let username = args.username.trim();
    if !is_valid_username(username) {
        anyhow::bail!("invalid username: letters, digits and @ . + - _ only");
    }
    if !is_email(args.email) {
        anyhow::bail!("invalid email address: {}", args.email);
    }
    let email = normalize_email(args.email);
    if repo.get_user_by_username(username).await?.is_some() {
        anyhow::bail!("a user named {username} already exists");
    }
    if repo.get_user_by_email(&email).await?.is_some() {
        anyhow::bail!("a user with email {email} already exists");
    }
    validate_password(args.password, username)?;

    let user = repo
        .create_user(&NewUser {
            username: username.to_string(),
            email: Some(email),
            password_hash: hash_password(args.password)?,
            first_name: String::new(),
            last_name: String::new(),
            middle_name: String::new(),
            role,
            is_active: true,
        })
        .await?;
    info!(username = %user.username, role = role.label(), "user created");
    repo.log_action("create_user", Some(&user.username), Some(role.label()), None)
        .await?;
    Ok(user)
}

fn parse_staff_role(role: &str) -> anyhow::Result<RoleType> {
    match role.to_ascii_lowercase().as_str() {
        "curator" => Ok(RoleType::Curator),
        "administrator" | "admin" => Ok(RoleType::Administrator),
        "student" => anyhow::bail!("students are created by importing a roster"),
        other => anyhow::bail!("unknown role: {other}. Supported: curator, administrator"),
    }
}
