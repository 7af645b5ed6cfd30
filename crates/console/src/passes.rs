//! Pass status for students and badge downloads.

use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    Extension,
};
use tracing::{info, warn};

use rollcall_core::db::repository::{AuditRepository, GroupRepository, PassRepository};
use rollcall_core::error::RollcallError;
use rollcall_core::media::MediaStore;
use rollcall_core::models::group::AuthGroup;
use rollcall_core::passes::{badge_groups, can_print_group, mark_printed};

use crate::auth::CurrentUser;
use crate::error::{AppError, AppResult};
use crate::{encode_path_segment, require_staff, require_student, AppState};

#[derive(Template)]
#[template(path = "pass/index.html")]
pub struct PassTemplate {
    pub status_label: String,
    pub photo_url: Option<String>,
    pub printable: bool,
}

#[derive(Template)]
#[template(path = "pass/groups.html")]
pub struct GroupsTemplate {
    pub groups: Vec<AuthGroup>,
}

/// GET /pass
pub async fn pass_page(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> AppResult<PassTemplate> {
    require_student(&user)?;
    let pass = state
        .repo
        .get_pass_for_user(user.id)
        .await?
        .ok_or_else(AppError::not_found)?;
    Ok(PassTemplate {
        status_label: pass.status.label().to_string(),
        photo_url: pass.photo_path.as_deref().map(MediaStore::url),
        printable: pass.status.is_printable(),
    })
}

fn attachment(content_type: &'static str, file_name: &str, body: Vec<u8>) -> Response {
    let disposition = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        file_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect::<String>(),
        encode_path_segment(file_name)
    );
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response()
}

/// GET /pass/badge - the student's own card once the photo was accepted.
pub async fn own_badge(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> AppResult<Response> {
    require_student(&user)?;
    if state.badges.is_none() {
        return Err(AppError::not_found());
    }
    let pass = state
        .repo
        .get_pass_for_user(user.id)
        .await?
        .filter(|p| p.status.is_printable())
        .ok_or_else(AppError::not_found)?;
    let photo_path = pass.photo_path.ok_or_else(AppError::not_found)?;
    let photo = state.media.read(&photo_path).await?;

    let text = format!("{} {}", user.first_name, user.last_name);
    let renderer = state.clone();
    let png = tokio::task::spawn_blocking(move || match &renderer.badges {
        Some(badges) => badges.render_png(&photo, &text),
        None => Err(RollcallError::NotFound("badge template".into())),
    })
    .await
    .map_err(|e| RollcallError::Image(format!("badge task failed: {e}")))??;

    Ok(attachment("image/png", "badge.png", png))
}

/// GET /pass/groups
pub async fn groups_page(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> AppResult<GroupsTemplate> {
    require_staff(&user)?;
    let groups = badge_groups(&state.repo, &user).await?;
    Ok(GroupsTemplate { groups })
}

/// GET /pass/groups/{id}/download - a ZIP with a card for every accepted photo.
pub async fn download_group(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(group_id): Path<i64>,
) -> AppResult<Response> {
    require_staff(&user)?;
    if state.badges.is_none() || !can_print_group(&state.repo, &user, group_id).await? {
        return Err(AppError::not_found());
    }
    let group = state
        .repo
        .get_auth_group(group_id)
        .await?
        .ok_or_else(AppError::not_found)?;

    let requests = state.repo.list_printable_passes(group_id).await?;
    let mut jobs = Vec::with_capacity(requests.len());
    let mut rendered = Vec::with_capacity(requests.len());
    for request in &requests {
        let Some(path) = &request.pass.photo_path else {
            warn!(username = %request.username, "printable pass without a photo");
            continue;
        };
        match state.media.read(path).await {
            Ok(photo) => {
                jobs.push((
                    format!("{} {}.png", request.last_name, request.first_name),
                    request.card_text(),
                    photo,
                ));
                rendered.push(request.clone());
            }
            Err(e) => warn!(username = %request.username, error = %e, "photo missing"),
        }
    }

    let renderer = state.clone();
    let archive = tokio::task::spawn_blocking(move || {
        let Some(badges) = &renderer.badges else {
            return Err(RollcallError::NotFound("badge template".into()));
        };
        let mut entries = Vec::with_capacity(jobs.len());
        for (name, text, photo) in jobs {
            entries.push((name, badges.render_png(&photo, &text)?));
        }
        rollcall_badge::write_zip(&entries)
    })
    .await
    .map_err(|e| RollcallError::Image(format!("badge task failed: {e}")))??;

    let printed = mark_printed(&state.repo, &rendered).await?;
    info!(group = %group.name, cards = rendered.len(), printed, "badges downloaded");
    if let Err(e) = state
        .repo
        .log_action(
            "badges_download",
            Some(&user.username),
            Some(&format!("{} cards for {}", rendered.len(), group.name)),
            None,
        )
        .await
    {
        warn!(error = %e, "failed to write audit log");
    }

    Ok(attachment(
        "application/zip",
        &format!("{}.zip", group.name),
        archive,
    ))
}
