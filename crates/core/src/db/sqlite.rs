use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{Result, RollcallError};
use crate::models::{
    audit::{AuditEntry, Session},
    common::{PassStatus, RoleType},
    group::{default_year, AuthGroup, GroupLeader, OrgGroup},
    institution::Institution,
    pass::{Pass, PassCounts, PassRequest},
    user::{NewUser, Profile, User},
};

use super::repository::{
    AuditRepository, GroupRepository, InstitutionRepository, OrgGroupRepository, PassRepository,
    RollcallRepository, SessionRepository, StudentRepository, UserRepository,
};

#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl RollcallRepository for SqliteRepository {}

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

const USER_SELECT: &str = "SELECT u.id, u.username, u.email, u.first_name, u.last_name, \
     u.is_active, u.date_joined, p.role, p.middle_name, p.avatar_path, p.attempts_count, \
     p.locked_at FROM users u JOIN profiles p ON p.user_id = u.id";

const ORG_GROUP_SELECT: &str = "SELECT id, name, course, year, curator_id, institution_id, \
     auth_group_id FROM org_groups";

const PASS_REQUEST_SELECT: &str = "SELECT ps.id, ps.user_id, ps.status, ps.photo_path, \
     ps.updated_at, u.username, u.first_name, u.last_name, p.middle_name, \
     g.id AS group_id, g.name AS group_name \
     FROM passes ps \
     JOIN users u ON u.id = ps.user_id \
     JOIN profiles p ON p.user_id = u.id \
     JOIN user_groups ug ON ug.user_id = u.id \
     JOIN auth_groups g ON g.id = ug.group_id";

// -- Row helpers --

fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.format(TS_FORMAT).to_string()
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(s, TS_FORMAT)
        .unwrap_or_default()
        .and_utc()
}

fn parse_opt_ts(s: Option<String>) -> Option<DateTime<Utc>> {
    s.as_deref().map(parse_ts)
}

fn parse_role_type(s: &str) -> RoleType {
    match s {
        "administrator" => RoleType::Administrator,
        "curator" => RoleType::Curator,
        _ => RoleType::Student,
    }
}

fn role_type_to_str(r: &RoleType) -> &'static str {
    match r {
        RoleType::Administrator => "administrator",
        RoleType::Curator => "curator",
        RoleType::Student => "student",
    }
}

fn parse_pass_status(s: &str) -> PassStatus {
    match s {
        "not_verify" => PassStatus::NotVerify,
        "verify" => PassStatus::Verify,
        "printed" => PassStatus::Printed,
        _ => PassStatus::NotFilledIn,
    }
}

fn pass_status_to_str(s: &PassStatus) -> &'static str {
    match s {
        PassStatus::NotFilledIn => "not_filled_in",
        PassStatus::NotVerify => "not_verify",
        PassStatus::Verify => "verify",
        PassStatus::Printed => "printed",
    }
}

fn row_to_user(r: &SqliteRow) -> User {
    let date_joined: String = r.get("date_joined");
    let role: String = r.get("role");
    let attempts: i64 = r.get("attempts_count");
    User {
        id: r.get("id"),
        username: r.get("username"),
        email: r.get("email"),
        first_name: r.get("first_name"),
        last_name: r.get("last_name"),
        is_active: r.get("is_active"),
        date_joined: parse_ts(&date_joined),
        profile: Profile {
            role: parse_role_type(&role),
            middle_name: r.get("middle_name"),
            avatar_path: r.get("avatar_path"),
            attempts_count: attempts.max(0) as u32,
            locked_at: parse_opt_ts(r.get("locked_at")),
        },
    }
}

fn row_to_org_group(r: &SqliteRow) -> OrgGroup {
    let course: i64 = r.get("course");
    let year: String = r.get("year");
    OrgGroup {
        id: r.get("id"),
        name: r.get("name"),
        course: course.clamp(1, 6) as u8,
        year: NaiveDate::parse_from_str(&year, DATE_FORMAT).unwrap_or_else(|_| default_year()),
        curator_id: r.get("curator_id"),
        institution_id: r.get("institution_id"),
        auth_group_id: r.get("auth_group_id"),
    }
}

fn row_to_auth_group(r: &SqliteRow) -> AuthGroup {
    AuthGroup {
        id: r.get("id"),
        name: r.get("name"),
    }
}

fn row_to_institution(r: &SqliteRow) -> Institution {
    Institution {
        id: r.get("id"),
        name: r.get("name"),
        short_name: r.get("short_name"),
        information: r.get("information"),
        logo_path: r.get("logo_path"),
        admin_id: r.get("admin_id"),
    }
}

fn row_to_pass(r: &SqliteRow) -> Pass {
    let status: String = r.get("status");
    let updated_at: String = r.get("updated_at");
    Pass {
        id: r.get("id"),
        user_id: r.get("user_id"),
        status: parse_pass_status(&status),
        photo_path: r.get("photo_path"),
        updated_at: parse_ts(&updated_at),
    }
}

fn row_to_pass_request(r: &SqliteRow) -> PassRequest {
    PassRequest {
        pass: row_to_pass(r),
        username: r.get("username"),
        first_name: r.get("first_name"),
        last_name: r.get("last_name"),
        middle_name: r.get("middle_name"),
        group_id: r.get("group_id"),
        group_name: r.get("group_name"),
    }
}

// -- Statements shared by several transactions --

async fn insert_user(conn: &mut SqliteConnection, user: &NewUser) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO users (username, email, password_hash, first_name, last_name, is_active, date_joined) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(user.is_active)
    .bind(fmt_ts(&Utc::now()))
    .execute(&mut *conn)
    .await?;
    let id = result.last_insert_rowid();

    sqlx::query("INSERT INTO profiles (user_id, role, middle_name) VALUES (?1, ?2, ?3)")
        .bind(id)
        .bind(role_type_to_str(&user.role))
        .bind(&user.middle_name)
        .execute(&mut *conn)
        .await?;

    Ok(id)
}

async fn get_or_create_auth_group_in(
    conn: &mut SqliteConnection,
    name: &str,
) -> Result<(AuthGroup, bool)> {
    let existing = sqlx::query("SELECT id, name FROM auth_groups WHERE name = ?1")
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;
    if let Some(r) = existing {
        return Ok((row_to_auth_group(&r), false));
    }

    let result = sqlx::query("INSERT INTO auth_groups (name) VALUES (?1)")
        .bind(name)
        .execute(&mut *conn)
        .await?;
    Ok((
        AuthGroup {
            id: result.last_insert_rowid(),
            name: name.to_string(),
        },
        true,
    ))
}

async fn fetch_org_group(conn: &mut SqliteConnection, id: i64) -> Result<Option<OrgGroup>> {
    let sql = format!("{ORG_GROUP_SELECT} WHERE id = ?1");
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.as_ref().map(row_to_org_group))
}

/// Make the auth group and its leader mirror an organization group.
async fn sync_auth_group(conn: &mut SqliteConnection, org_group_id: i64) -> Result<()> {
    let group = fetch_org_group(conn, org_group_id)
        .await?
        .ok_or_else(|| RollcallError::NotFound(format!("group {org_group_id}")))?;

    match group.auth_group_id {
        None => {
            let (auth, created) = get_or_create_auth_group_in(conn, &group.name).await?;

            let taken: Option<i64> = sqlx::query_scalar(
                "SELECT id FROM org_groups WHERE auth_group_id = ?1 AND id <> ?2",
            )
            .bind(auth.id)
            .bind(group.id)
            .fetch_optional(&mut *conn)
            .await?;
            if taken.is_some() {
                return Err(RollcallError::Conflict(format!(
                    "a group named '{}' already exists",
                    group.name
                )));
            }

            sqlx::query("UPDATE org_groups SET auth_group_id = ?1 WHERE id = ?2")
                .bind(auth.id)
                .bind(group.id)
                .execute(&mut *conn)
                .await?;

            if created {
                sqlx::query(
                    "INSERT INTO group_leaders (group_id, curator_id, created_at) VALUES (?1, ?2, ?3)",
                )
                .bind(auth.id)
                .bind(group.curator_id)
                .bind(fmt_ts(&Utc::now()))
                .execute(&mut *conn)
                .await?;
            }
            debug!(org_group = group.id, auth_group = auth.id, created, "linked auth group");
        }
        Some(auth_id) => {
            sqlx::query("UPDATE auth_groups SET name = ?1 WHERE id = ?2 AND name <> ?1")
                .bind(&group.name)
                .bind(auth_id)
                .execute(&mut *conn)
                .await?;

            sqlx::query(
                "INSERT INTO group_leaders (group_id, curator_id, created_at) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(group_id) DO UPDATE SET curator_id = excluded.curator_id",
            )
            .bind(auth_id)
            .bind(group.curator_id)
            .bind(fmt_ts(&Utc::now()))
            .execute(&mut *conn)
            .await?;
            debug!(org_group = group.id, auth_group = auth_id, "synced auth group");
        }
    }
    Ok(())
}

/// Make the organization group follow a newly appointed leader.
async fn sync_org_group_from_leader(
    conn: &mut SqliteConnection,
    auth_group_id: i64,
    auth_group_name: &str,
    curator_id: i64,
) -> Result<()> {
    let linked: Option<i64> =
        sqlx::query_scalar("SELECT id FROM org_groups WHERE auth_group_id = ?1")
            .bind(auth_group_id)
            .fetch_optional(&mut *conn)
            .await?;
    if let Some(id) = linked {
        sqlx::query("UPDATE org_groups SET curator_id = ?1 WHERE id = ?2")
            .bind(curator_id)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        return Ok(());
    }

    let unlinked: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM org_groups WHERE name = ?1 AND auth_group_id IS NULL ORDER BY id LIMIT 1",
    )
    .bind(auth_group_name)
    .fetch_optional(&mut *conn)
    .await?;

    match unlinked {
        Some(id) => {
            sqlx::query("UPDATE org_groups SET auth_group_id = ?1, curator_id = ?2 WHERE id = ?3")
                .bind(auth_group_id)
                .bind(curator_id)
                .bind(id)
                .execute(&mut *conn)
                .await?;
        }
        None => {
            sqlx::query(
                "INSERT INTO org_groups (name, course, year, curator_id, institution_id, auth_group_id) \
                 VALUES (?1, 1, ?2, ?3, NULL, ?4)",
            )
            .bind(auth_group_name)
            .bind(default_year().format(DATE_FORMAT).to_string())
            .bind(curator_id)
            .bind(auth_group_id)
            .execute(&mut *conn)
            .await?;
        }
    }
    Ok(())
}

// -- Users --

#[async_trait]
impl UserRepository for SqliteRepository {
    async fn create_user(&self, user: &NewUser) -> Result<User> {
        let mut tx = self.pool.begin().await?;
        let id = insert_user(&mut tx, user).await?;
        tx.commit().await?;

        self.get_user(id)
            .await?
            .ok_or_else(|| RollcallError::NotFound(format!("user {id}")))
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("{USER_SELECT} WHERE u.id = ?1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_user))
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let sql = format!("{USER_SELECT} WHERE u.username = ?1");
        let row = sqlx::query(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_user))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let sql = format!("{USER_SELECT} WHERE u.email = ?1 COLLATE NOCASE");
        let row = sqlx::query(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_user))
    }

    async fn get_password_hash(&self, user_id: i64) -> Result<Option<String>> {
        let hash = sqlx::query_scalar::<_, String>("SELECT password_hash FROM users WHERE id = ?1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(hash)
    }

    async fn record_failed_login(&self, user_id: i64) -> Result<u32> {
        let count: Option<i64> = sqlx::query_scalar(
            "UPDATE profiles SET attempts_count = attempts_count + 1 WHERE user_id = ?1 RETURNING attempts_count",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        count
            .map(|c| c.max(0) as u32)
            .ok_or_else(|| RollcallError::NotFound(format!("user {user_id}")))
    }

    async fn lock_user(&self, user_id: i64, at: DateTime<Utc>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE users SET is_active = 0 WHERE id = ?1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE profiles SET locked_at = ?1 WHERE user_id = ?2")
            .bind(fmt_ts(&at))
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn reset_login_attempts(&self, user_id: i64) -> Result<()> {
        sqlx::query("UPDATE profiles SET attempts_count = 0 WHERE user_id = ?1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn activate_user(&self, user_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE users SET is_active = 1 WHERE id = ?1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE profiles SET attempts_count = 0, locked_at = NULL WHERE user_id = ?1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_user(&self, user_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_users_by_role(&self) -> Result<Vec<(RoleType, i64)>> {
        let rows =
            sqlx::query("SELECT role, COUNT(*) AS total FROM profiles GROUP BY role ORDER BY role")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .iter()
            .map(|r| {
                let role: String = r.get("role");
                (parse_role_type(&role), r.get("total"))
            })
            .collect())
    }
}

// -- Auth groups and leaders --

#[async_trait]
impl GroupRepository for SqliteRepository {
    async fn get_or_create_auth_group(&self, name: &str) -> Result<(AuthGroup, bool)> {
        let mut conn = self.pool.acquire().await?;
        get_or_create_auth_group_in(&mut conn, name).await
    }

    async fn get_auth_group(&self, id: i64) -> Result<Option<AuthGroup>> {
        let row = sqlx::query("SELECT id, name FROM auth_groups WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_auth_group))
    }

    async fn get_auth_group_by_name(&self, name: &str) -> Result<Option<AuthGroup>> {
        let row = sqlx::query("SELECT id, name FROM auth_groups WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_auth_group))
    }

    async fn list_auth_groups(&self) -> Result<Vec<AuthGroup>> {
        let rows = sqlx::query("SELECT id, name FROM auth_groups ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_auth_group).collect())
    }

    async fn list_user_groups(&self, user_id: i64) -> Result<Vec<AuthGroup>> {
        let rows = sqlx::query(
            "SELECT g.id, g.name FROM auth_groups g JOIN user_groups ug ON ug.group_id = g.id \
             WHERE ug.user_id = ?1 ORDER BY g.name",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_auth_group).collect())
    }

    async fn get_group_leader(&self, group_id: i64) -> Result<Option<GroupLeader>> {
        let row = sqlx::query(
            "SELECT group_id, curator_id, created_at FROM group_leaders WHERE group_id = ?1",
        )
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| {
            let created: String = r.get("created_at");
            GroupLeader {
                group_id: r.get("group_id"),
                curator_id: r.get("curator_id"),
                created_at: parse_ts(&created),
            }
        }))
    }

    async fn create_group_leader(&self, group_id: i64, curator_id: i64) -> Result<GroupLeader> {
        let mut tx = self.pool.begin().await?;

        let name = sqlx::query_scalar::<_, String>("SELECT name FROM auth_groups WHERE id = ?1")
            .bind(group_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| RollcallError::NotFound(format!("auth group {group_id}")))?;

        let created_at = fmt_ts(&Utc::now());
        sqlx::query(
            "INSERT INTO group_leaders (group_id, curator_id, created_at) VALUES (?1, ?2, ?3)",
        )
        .bind(group_id)
        .bind(curator_id)
        .bind(&created_at)
        .execute(&mut *tx)
        .await?;

        sync_org_group_from_leader(&mut tx, group_id, &name, curator_id).await?;
        tx.commit().await?;

        Ok(GroupLeader {
            group_id,
            curator_id,
            created_at: parse_ts(&created_at),
        })
    }

    async fn list_led_groups(&self, curator_id: i64) -> Result<Vec<AuthGroup>> {
        let rows = sqlx::query(
            "SELECT g.id, g.name FROM auth_groups g JOIN group_leaders l ON l.group_id = g.id \
             WHERE l.curator_id = ?1 ORDER BY g.name",
        )
        .bind(curator_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_auth_group).collect())
    }
}

// -- Organization groups --

#[async_trait]
impl OrgGroupRepository for SqliteRepository {
    async fn save_org_group(&self, group: &OrgGroup) -> Result<OrgGroup> {
        group.validate()?;
        let year = group.year.format(DATE_FORMAT).to_string();

        let mut tx = self.pool.begin().await?;
        let id = if group.id == 0 {
            let result = sqlx::query(
                "INSERT INTO org_groups (name, course, year, curator_id, institution_id, auth_group_id) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(&group.name)
            .bind(i64::from(group.course))
            .bind(&year)
            .bind(group.curator_id)
            .bind(group.institution_id)
            .bind(group.auth_group_id)
            .execute(&mut *tx)
            .await?;
            result.last_insert_rowid()
        } else {
            let result = sqlx::query(
                "UPDATE org_groups SET name = ?1, course = ?2, year = ?3, curator_id = ?4, \
                 institution_id = ?5, auth_group_id = ?6 WHERE id = ?7",
            )
            .bind(&group.name)
            .bind(i64::from(group.course))
            .bind(&year)
            .bind(group.curator_id)
            .bind(group.institution_id)
            .bind(group.auth_group_id)
            .bind(group.id)
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() == 0 {
                return Err(RollcallError::NotFound(format!("group {}", group.id)));
            }
            group.id
        };

        sync_auth_group(&mut tx, id).await?;
        tx.commit().await?;

        self.get_org_group(id)
            .await?
            .ok_or_else(|| RollcallError::NotFound(format!("group {id}")))
    }

    async fn get_org_group(&self, id: i64) -> Result<Option<OrgGroup>> {
        let mut conn = self.pool.acquire().await?;
        fetch_org_group(&mut conn, id).await
    }

    async fn get_org_group_by_auth_group(&self, auth_group_id: i64) -> Result<Option<OrgGroup>> {
        let sql = format!("{ORG_GROUP_SELECT} WHERE auth_group_id = ?1");
        let row = sqlx::query(&sql)
            .bind(auth_group_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_org_group))
    }

    async fn list_org_groups_for_curator(&self, curator_id: i64) -> Result<Vec<OrgGroup>> {
        let sql = format!("{ORG_GROUP_SELECT} WHERE curator_id = ?1 ORDER BY name");
        let rows = sqlx::query(&sql)
            .bind(curator_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_org_group).collect())
    }

    async fn list_org_groups_for_admin(&self, admin_id: i64) -> Result<Vec<OrgGroup>> {
        let sql = format!(
            "{ORG_GROUP_SELECT} WHERE institution_id IN \
             (SELECT id FROM institutions WHERE admin_id = ?1) ORDER BY name"
        );
        let rows = sqlx::query(&sql)
            .bind(admin_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_org_group).collect())
    }

    async fn delete_org_group(&self, id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let Some(group) = fetch_org_group(&mut tx, id).await? else {
            return Ok(false);
        };

        if let Some(auth_id) = group.auth_group_id {
            sqlx::query("DELETE FROM group_leaders WHERE group_id = ?1")
                .bind(auth_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM auth_groups WHERE id = ?1")
                .bind(auth_id)
                .execute(&mut *tx)
                .await?;
        }

        let result = sqlx::query("DELETE FROM org_groups WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }
}

// -- Institutions --

#[async_trait]
impl InstitutionRepository for SqliteRepository {
    async fn create_institution(&self, institution: &Institution) -> Result<Institution> {
        institution.validate()?;
        let result = sqlx::query(
            "INSERT INTO institutions (name, short_name, information, logo_path, admin_id) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&institution.name)
        .bind(&institution.short_name)
        .bind(&institution.information)
        .bind(&institution.logo_path)
        .bind(institution.admin_id)
        .execute(&self.pool)
        .await?;
        Ok(Institution {
            id: result.last_insert_rowid(),
            ..institution.clone()
        })
    }

    async fn get_institution(&self, id: i64) -> Result<Option<Institution>> {
        let row = sqlx::query(
            "SELECT id, name, short_name, information, logo_path, admin_id FROM institutions WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_institution))
    }

    async fn list_institutions_for_admin(&self, admin_id: i64) -> Result<Vec<Institution>> {
        let rows = sqlx::query(
            "SELECT id, name, short_name, information, logo_path, admin_id FROM institutions \
             WHERE admin_id = ?1 ORDER BY short_name",
        )
        .bind(admin_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_institution).collect())
    }
}

// -- Students --

#[async_trait]
impl StudentRepository for SqliteRepository {
    async fn create_student(&self, student: &NewUser, group_id: i64) -> Result<User> {
        let mut tx = self.pool.begin().await?;
        let id = insert_user(&mut tx, student).await?;

        sqlx::query("INSERT INTO user_groups (user_id, group_id) VALUES (?1, ?2)")
            .bind(id)
            .bind(group_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO passes (user_id, status, updated_at) VALUES (?1, ?2, ?3)")
            .bind(id)
            .bind(pass_status_to_str(&PassStatus::NotFilledIn))
            .bind(fmt_ts(&Utc::now()))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        self.get_user(id)
            .await?
            .ok_or_else(|| RollcallError::NotFound(format!("user {id}")))
    }

    async fn list_group_students(&self, group_id: i64) -> Result<Vec<User>> {
        let sql = format!(
            "{USER_SELECT} JOIN user_groups ug ON ug.user_id = u.id \
             WHERE ug.group_id = ?1 AND p.role = 'student' \
             ORDER BY u.last_name, u.first_name, u.id"
        );
        let rows = sqlx::query(&sql)
            .bind(group_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_user).collect())
    }
}

// -- Passes --

#[async_trait]
impl PassRepository for SqliteRepository {
    async fn get_pass(&self, id: i64) -> Result<Option<Pass>> {
        let row = sqlx::query(
            "SELECT id, user_id, status, photo_path, updated_at FROM passes WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_pass))
    }

    async fn get_pass_for_user(&self, user_id: i64) -> Result<Option<Pass>> {
        let row = sqlx::query(
            "SELECT id, user_id, status, photo_path, updated_at FROM passes WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_pass))
    }

    async fn submit_pass_photo(&self, user_id: i64, photo_path: &str) -> Result<Pass> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE profiles SET avatar_path = ?1 WHERE user_id = ?2")
            .bind(photo_path)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO passes (user_id, status, photo_path, updated_at) VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(user_id) DO UPDATE SET status = excluded.status, \
             photo_path = excluded.photo_path, updated_at = excluded.updated_at",
        )
        .bind(user_id)
        .bind(pass_status_to_str(&PassStatus::NotVerify))
        .bind(photo_path)
        .bind(fmt_ts(&Utc::now()))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        self.get_pass_for_user(user_id)
            .await?
            .ok_or_else(|| RollcallError::NotFound(format!("pass for user {user_id}")))
    }

    async fn set_pass_status(&self, pass_id: i64, status: PassStatus) -> Result<bool> {
        let result = sqlx::query("UPDATE passes SET status = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(pass_status_to_str(&status))
            .bind(fmt_ts(&Utc::now()))
            .bind(pass_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_pass_requests_for_curator(&self, curator_id: i64) -> Result<Vec<PassRequest>> {
        let sql = format!(
            "{PASS_REQUEST_SELECT} JOIN group_leaders l ON l.group_id = g.id \
             WHERE l.curator_id = ?1 AND p.role = 'student' \
             AND ps.status IN ('not_filled_in', 'not_verify') \
             GROUP BY ps.id ORDER BY group_name, u.last_name, u.first_name"
        );
        let rows = sqlx::query(&sql)
            .bind(curator_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_pass_request).collect())
    }

    async fn get_pass_request_for_curator(
        &self,
        pass_id: i64,
        curator_id: i64,
    ) -> Result<Option<PassRequest>> {
        let sql = format!(
            "{PASS_REQUEST_SELECT} JOIN group_leaders l ON l.group_id = g.id \
             WHERE ps.id = ?1 AND l.curator_id = ?2 LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(pass_id)
            .bind(curator_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_pass_request))
    }

    async fn list_printable_passes(&self, group_id: i64) -> Result<Vec<PassRequest>> {
        let sql = format!(
            "{PASS_REQUEST_SELECT} WHERE g.id = ?1 AND p.role = 'student' \
             AND ps.status IN ('verify', 'printed') ORDER BY u.last_name, u.first_name"
        );
        let rows = sqlx::query(&sql)
            .bind(group_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_pass_request).collect())
    }

    async fn count_passes(&self) -> Result<PassCounts> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS total FROM passes GROUP BY status")
            .fetch_all(&self.pool)
            .await?;
        let mut counts = PassCounts::default();
        for r in &rows {
            let status: String = r.get("status");
            let total: i64 = r.get("total");
            match parse_pass_status(&status) {
                PassStatus::NotFilledIn => counts.not_filled_in += total,
                PassStatus::NotVerify => counts.not_verify += total,
                PassStatus::Verify => counts.verify += total,
                PassStatus::Printed => counts.printed += total,
            }
        }
        Ok(counts)
    }
}

// -- Sessions and audit --

#[async_trait]
impl SessionRepository for SqliteRepository {
    async fn create_session(&self, session: &Session) -> Result<()> {
        sqlx::query(
            "INSERT INTO sessions (token, user_id, created_at, expires_at, ip_address) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&session.token)
        .bind(session.user_id)
        .bind(fmt_ts(&session.created_at))
        .bind(fmt_ts(&session.expires_at))
        .bind(&session.ip_address)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_session(&self, token: &str) -> Result<Option<Session>> {
        let row = sqlx::query(
            "SELECT token, user_id, created_at, expires_at, ip_address FROM sessions WHERE token = ?1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| {
            let created: String = r.get("created_at");
            let expires: String = r.get("expires_at");
            Session {
                token: r.get("token"),
                user_id: r.get("user_id"),
                created_at: parse_ts(&created),
                expires_at: parse_ts(&expires),
                ip_address: r.get("ip_address"),
            }
        }))
    }

    async fn delete_session(&self, token: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE token = ?1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired_sessions(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < ?1")
            .bind(fmt_ts(&Utc::now()))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl AuditRepository for SqliteRepository {
    async fn log_action(
        &self,
        action: &str,
        username: Option<&str>,
        details: Option<&str>,
        ip_address: Option<&str>,
    ) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO audit_log (action, username, details, ip_address, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(action)
        .bind(username)
        .bind(details)
        .bind(ip_address)
        .bind(fmt_ts(&Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn list_audit_log(&self, limit: i64) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query(
            "SELECT id, action, username, details, ip_address, created_at FROM audit_log ORDER BY id DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| {
                let created: String = r.get("created_at");
                AuditEntry {
                    id: r.get("id"),
                    action: r.get("action"),
                    username: r.get("username"),
                    details: r.get("details"),
                    ip_address: r.get("ip_address"),
                    created_at: parse_ts(&created),
                }
            })
            .collect())
    }
}
