use tracing::{info, warn};

use super::{parse_roster_file, StudentName};
use crate::config::RosterConfig;
use crate::db::repository::{AuditRepository, GroupRepository, StudentRepository, UserRepository};
use crate::error::{Result, RollcallError};
use crate::models::common::RoleType;
use crate::models::group::{AuthGroup, OrgGroup};
use crate::models::user::{NewUser, User};
use crate::passwords::hash_password;
use crate::tokens::{StudentToken, MAX_TOKEN_ATTEMPTS};

/// A student's names together with the login code they were issued.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StudentCode {
    pub last_name: String,
    pub first_name: String,
    pub middle_name: String,
    pub token: String,
}

impl StudentCode {
    fn from_user(user: &User) -> Self {
        Self {
            last_name: user.last_name.clone(),
            first_name: user.first_name.clone(),
            middle_name: user.profile.middle_name.clone(),
            token: user.username.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImportReport {
    pub group: AuthGroup,
    pub group_created: bool,
    pub students: Vec<StudentCode>,
}

#[derive(Debug, Clone)]
pub struct ResetReport {
    pub student: StudentCode,
    /// Media path of the deleted account's photo, for the caller to clean up.
    pub old_avatar_path: Option<String>,
}

pub struct RosterImporter<'a, R: ?Sized> {
    repo: &'a R,
    limits: &'a RosterConfig,
}

impl<'a, R> RosterImporter<'a, R>
where
    R: UserRepository + GroupRepository + StudentRepository + AuditRepository + ?Sized,
{
    pub fn new(repo: &'a R, limits: &'a RosterConfig) -> Self {
        Self { repo, limits }
    }

    /// Read, limit-check and parse a roster without touching the database.
    pub fn parse(
        &self,
        file_name: &str,
        bytes: &[u8],
        delimiter: Option<u8>,
    ) -> Result<Vec<StudentName>> {
        parse_roster_file(self.limits, file_name, bytes, delimiter)
    }

    /// Create a student account with a login code for every row of the roster.
    ///
    /// The group is created (and led by `curator`) when missing. Importing
    /// into a group led by someone else is forbidden.
    pub async fn import(
        &self,
        group_name: &str,
        file_name: &str,
        bytes: &[u8],
        delimiter: Option<u8>,
        curator: &User,
    ) -> Result<ImportReport> {
        if !curator.role().is_staff() {
            return Err(RollcallError::Forbidden(
                "only curators can import students".into(),
            ));
        }
        let group_name = group_name.trim();
        OrgGroup::new(group_name, curator.id).validate()?;

        let names = self.parse(file_name, bytes, delimiter)?;

        let (group, group_created) = self.repo.get_or_create_auth_group(group_name).await?;
        match self.repo.get_group_leader(group.id).await? {
            Some(leader) if leader.curator_id != curator.id => {
                return Err(RollcallError::Forbidden(format!(
                    "group {} is led by another curator",
                    group.name
                )));
            }
            Some(_) => {}
            None => {
                self.repo.create_group_leader(group.id, curator.id).await?;
            }
        }

        let mut students = Vec::with_capacity(names.len());
        for name in &names {
            let user = self.provision(group.id, name).await?;
            students.push(StudentCode::from_user(&user));
        }

        info!(
            group = %group.name,
            students = students.len(),
            curator = %curator.username,
            "roster imported"
        );
        if let Err(e) = self
            .repo
            .log_action(
                "roster_import",
                Some(&curator.username),
                Some(&format!("{} students into {}", students.len(), group.name)),
                None,
            )
            .await
        {
            warn!(error = %e, "failed to write audit log");
        }

        Ok(ImportReport {
            group,
            group_created,
            students,
        })
    }

    /// Create one student in `group_id`, retrying on login-code collisions.
    pub async fn provision(&self, group_id: i64, name: &StudentName) -> Result<User> {
        for _ in 0..MAX_TOKEN_ATTEMPTS {
            let token = StudentToken::generate(group_id, &name.last);
            let student = NewUser {
                username: token.as_str().to_string(),
                email: None,
                password_hash: hash_password(token.as_str())?,
                first_name: name.first.clone(),
                last_name: name.last.clone(),
                middle_name: name.middle.clone(),
                role: RoleType::Student,
                is_active: true,
            };
            match self.repo.create_student(&student, group_id).await {
                Ok(user) => return Ok(user),
                Err(RollcallError::Conflict(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(RollcallError::Conflict(format!(
            "no free login code for group {group_id}"
        )))
    }

    /// Replace a student's account with a fresh one carrying a new login code.
    pub async fn reset_student(&self, token: &str, curator: &User) -> Result<ResetReport> {
        let not_found = || RollcallError::NotFound(format!("student {token}"));
        let student = self
            .repo
            .get_user_by_username(token.trim())
            .await?
            .filter(User::is_student)
            .ok_or_else(not_found)?;

        let led = self.repo.list_led_groups(curator.id).await?;
        let group = self
            .repo
            .list_user_groups(student.id)
            .await?
            .into_iter()
            .find(|g| led.iter().any(|l| l.id == g.id))
            .ok_or_else(not_found)?;

        let name = StudentName {
            last: student.last_name.clone(),
            first: student.first_name.clone(),
            middle: student.profile.middle_name.clone(),
        };
        let replacement = self.provision(group.id, &name).await?;
        self.repo.delete_user(student.id).await?;

        info!(old = %student.username, new = %replacement.username, group = %group.name, "student code reset");
        if let Err(e) = self
            .repo
            .log_action(
                "student_reset",
                Some(&curator.username),
                Some(&format!("{} -> {}", student.username, replacement.username)),
                None,
            )
            .await
        {
            warn!(error = %e, "failed to write audit log");
        }

        Ok(ResetReport {
            student: StudentCode::from_user(&replacement),
            old_avatar_path: student.profile.avatar_path,
        })
    }

    /// Login codes of a group's students, visible to the group's leader only.
    pub async fn group_codes(&self, group_name: &str, curator: &User) -> Result<Vec<StudentCode>> {
        let not_found = || RollcallError::NotFound(format!("group {group_name}"));
        let group = self
            .repo
            .get_auth_group_by_name(group_name)
            .await?
            .ok_or_else(not_found)?;
        let leader = self.repo.get_group_leader(group.id).await?;
        if leader.map(|l| l.curator_id) != Some(curator.id) {
            return Err(not_found());
        }

        Ok(self
            .repo
            .list_group_students(group.id)
            .await?
            .iter()
            .map(StudentCode::from_user)
            .collect())
    }
}
