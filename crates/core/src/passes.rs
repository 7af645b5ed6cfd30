//! Pass review and badge-printing rules shared by the console and the CLI.

use tracing::{info, warn};

use crate::db::repository::{AuditRepository, GroupRepository, PassRepository};
use crate::error::Result;
use crate::models::common::PassStatus;
use crate::models::group::AuthGroup;
use crate::models::pass::PassRequest;
use crate::models::user::User;

/// Parse a status submitted by the review form. Only the two review
/// outcomes are accepted.
pub fn parse_review_status(value: &str) -> Option<PassStatus> {
    match value.trim() {
        "verify" => Some(PassStatus::Verify),
        "not_filled_in" => Some(PassStatus::NotFilledIn),
        _ => None,
    }
}

/// Apply a curator's decision to a pass in one of the groups they lead.
///
/// Returns `false` when the status is not a review outcome or the pass is
/// unknown or outside the curator's groups.
pub async fn review_pass<R>(
    repo: &R,
    pass_id: i64,
    status: PassStatus,
    curator: &User,
) -> Result<bool>
where
    R: PassRepository + AuditRepository + ?Sized,
{
    if !matches!(status, PassStatus::Verify | PassStatus::NotFilledIn) {
        return Ok(false);
    }
    let Some(request) = repo.get_pass_request_for_curator(pass_id, curator.id).await? else {
        return Ok(false);
    };

    let updated = repo.set_pass_status(pass_id, status).await?;
    if updated {
        info!(pass_id, student = %request.username, status = ?status, "pass reviewed");
        let details = format!("{} -> {}", request.username, status.label());
        if let Err(e) = repo
            .log_action("pass_review", Some(&curator.username), Some(&details), None)
            .await
        {
            warn!(error = %e, "failed to write audit log");
        }
    }
    Ok(updated)
}

/// Groups whose badges the user may download.
pub async fn badge_groups<R>(repo: &R, user: &User) -> Result<Vec<AuthGroup>>
where
    R: GroupRepository + ?Sized,
{
    if user.is_administrator() {
        repo.list_auth_groups().await
    } else if user.is_curator() {
        repo.list_led_groups(user.id).await
    } else {
        Ok(Vec::new())
    }
}

pub async fn can_print_group<R>(repo: &R, user: &User, group_id: i64) -> Result<bool>
where
    R: GroupRepository + ?Sized,
{
    if user.is_administrator() {
        return Ok(repo.get_auth_group(group_id).await?.is_some());
    }
    if !user.is_curator() {
        return Ok(false);
    }
    Ok(repo
        .get_group_leader(group_id)
        .await?
        .is_some_and(|leader| leader.curator_id == user.id))
}

/// Move the verified passes among `printed` to `Printed`, returning how many changed.
pub async fn mark_printed<R>(repo: &R, printed: &[PassRequest]) -> Result<usize>
where
    R: PassRepository + ?Sized,
{
    let mut changed = 0;
    for request in printed {
        if request.pass.status == PassStatus::Verify
            && repo
                .set_pass_status(request.pass.id, PassStatus::Printed)
                .await?
        {
            changed += 1;
        }
    }
    Ok(changed)
}
