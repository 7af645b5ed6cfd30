use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{
    audit::{AuditEntry, Session},
    common::{PassStatus, RoleType},
    group::{AuthGroup, GroupLeader, OrgGroup},
    institution::Institution,
    pass::{Pass, PassCounts, PassRequest},
    user::{NewUser, User},
};

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert the account and its profile together.
    async fn create_user(&self, user: &NewUser) -> Result<User>;
    async fn get_user(&self, id: i64) -> Result<Option<User>>;
    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;
    /// Case-insensitive match on the stored (normalized) address.
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn get_password_hash(&self, user_id: i64) -> Result<Option<String>>;
    /// Increment the failed-login counter and return the new value.
    async fn record_failed_login(&self, user_id: i64) -> Result<u32>;
    /// Deactivate the account and remember when the lockout happened.
    async fn lock_user(&self, user_id: i64, at: DateTime<Utc>) -> Result<()>;
    async fn reset_login_attempts(&self, user_id: i64) -> Result<()>;
    /// Mark the account active and clear lockout state.
    async fn activate_user(&self, user_id: i64) -> Result<()>;
    async fn delete_user(&self, user_id: i64) -> Result<bool>;
    async fn count_users_by_role(&self) -> Result<Vec<(RoleType, i64)>>;
}

#[async_trait]
pub trait GroupRepository: Send + Sync {
    /// Returns the group and whether it was created by this call.
    async fn get_or_create_auth_group(&self, name: &str) -> Result<(AuthGroup, bool)>;
    async fn get_auth_group(&self, id: i64) -> Result<Option<AuthGroup>>;
    async fn get_auth_group_by_name(&self, name: &str) -> Result<Option<AuthGroup>>;
    async fn list_auth_groups(&self) -> Result<Vec<AuthGroup>>;
    async fn list_user_groups(&self, user_id: i64) -> Result<Vec<AuthGroup>>;
    async fn get_group_leader(&self, group_id: i64) -> Result<Option<GroupLeader>>;
    /// Insert the leader and bring the matching organization group in line with it.
    async fn create_group_leader(&self, group_id: i64, curator_id: i64) -> Result<GroupLeader>;
    async fn list_led_groups(&self, curator_id: i64) -> Result<Vec<AuthGroup>>;
}

#[async_trait]
pub trait OrgGroupRepository: Send + Sync {
    /// Insert (id 0) or update, then re-link the auth group and its leader.
    async fn save_org_group(&self, group: &OrgGroup) -> Result<OrgGroup>;
    async fn get_org_group(&self, id: i64) -> Result<Option<OrgGroup>>;
    async fn get_org_group_by_auth_group(&self, auth_group_id: i64) -> Result<Option<OrgGroup>>;
    async fn list_org_groups_for_curator(&self, curator_id: i64) -> Result<Vec<OrgGroup>>;
    async fn list_org_groups_for_admin(&self, admin_id: i64) -> Result<Vec<OrgGroup>>;
    /// Removes the group together with its auth group and leader.
    async fn delete_org_group(&self, id: i64) -> Result<bool>;
}

#[async_trait]
pub trait InstitutionRepository: Send + Sync {
    async fn create_institution(&self, institution: &Institution) -> Result<Institution>;
    async fn get_institution(&self, id: i64) -> Result<Option<Institution>>;
    async fn list_institutions_for_admin(&self, admin_id: i64) -> Result<Vec<Institution>>;
}

#[async_trait]
pub trait StudentRepository: Send + Sync {
    /// Create a student account, its group membership and an empty pass.
    async fn create_student(&self, student: &NewUser, group_id: i64) -> Result<User>;
    /// Students of an auth group ordered by last and first name.
    async fn list_group_students(&self, group_id: i64) -> Result<Vec<User>>;
}

#[async_trait]
pub trait PassRepository: Send + Sync {
    async fn get_pass(&self, id: i64) -> Result<Option<Pass>>;
    async fn get_pass_for_user(&self, user_id: i64) -> Result<Option<Pass>>;
    /// Store the photo on the profile and the pass, and queue the pass for review.
    async fn submit_pass_photo(&self, user_id: i64, photo_path: &str) -> Result<Pass>;
    async fn set_pass_status(&self, pass_id: i64, status: PassStatus) -> Result<bool>;
    /// Passes awaiting action in the groups the curator leads.
    async fn list_pass_requests_for_curator(&self, curator_id: i64) -> Result<Vec<PassRequest>>;
    /// The pass, if its student is in a group the curator leads.
    async fn get_pass_request_for_curator(
        &self,
        pass_id: i64,
        curator_id: i64,
    ) -> Result<Option<PassRequest>>;
    async fn list_printable_passes(&self, group_id: i64) -> Result<Vec<PassRequest>>;
    async fn count_passes(&self) -> Result<PassCounts>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create_session(&self, session: &Session) -> Result<()>;
    async fn get_session(&self, token: &str) -> Result<Option<Session>>;
    async fn delete_session(&self, token: &str) -> Result<bool>;
    async fn delete_expired_sessions(&self) -> Result<u64>;
}

#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn log_action(
        &self,
        action: &str,
        username: Option<&str>,
        details: Option<&str>,
        ip_address: Option<&str>,
    ) -> Result<i64>;
    async fn list_audit_log(&self, limit: i64) -> Result<Vec<AuditEntry>>;
}

/// Everything the application needs from storage.
pub trait RollcallRepository:
    UserRepository
    + GroupRepository
    + OrgGroupRepository
    + InstitutionRepository
    + StudentRepository
    + PassRepository
    + SessionRepository
    + AuditRepository
{
}
