//! Photo review queue for curators.

use std::sync::Arc;

use askama::Template;
use axum::{
    extract::State,
    response::Redirect,
    Extension, Form,
};
use tracing::debug;

use rollcall_core::db::repository::PassRepository;
use rollcall_core::media::MediaStore;
use rollcall_core::models::pass::PassRequest;
use rollcall_core::passes::{parse_review_status, review_pass};

use crate::auth::CurrentUser;
use crate::error::AppResult;
use crate::{require_staff, AppState};

pub struct PassRequestView {
    pub pass_id: i64,
    pub full_name: String,
    pub group_name: String,
    pub status_label: String,
    pub photo_url: Option<String>,
}

impl PassRequestView {
    fn from_model(request: &PassRequest) -> Self {
        let mut full_name = format!("{} {}", request.last_name, request.first_name);
        if request.middle_name != "-" {
            full_name.push(' ');
            full_name.push_str(&request.middle_name);
        }
        Self {
            pass_id: request.pass.id,
            full_name,
            group_name: request.group_name.clone(),
            status_label: request.pass.status.label().to_string(),
            photo_url: request.pass.photo_path.as_deref().map(MediaStore::url),
        }
    }
}

#[derive(Template)]
#[template(path = "curator/requests.html")]
pub struct RequestsTemplate {
    pub requests: Vec<PassRequestView>,
}

/// GET /curator/requests
pub async fn requests_page(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> AppResult<RequestsTemplate> {
    require_staff(&user)?;
    let requests = state
        .repo
        .list_pass_requests_for_curator(user.id)
        .await?
        .iter()
        .map(PassRequestView::from_model)
        .collect();
    Ok(RequestsTemplate { requests })
}

#[derive(serde::Deserialize)]
pub struct ReviewForm {
    pub pass_id: i64,
    pub status: String,
}

/// POST /curator/requests - accept or send back one photo.
pub async fn review_submit(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Form(form): Form<ReviewForm>,
) -> AppResult<Redirect> {
    require_staff(&user)?;
    match parse_review_status(&form.status) {
        Some(status) => {
            review_pass(&state.repo, form.pass_id, status, &user).await?;
        }
        None => debug!(status = %form.status, "ignoring unknown review status"),
    }
    Ok(Redirect::to("/curator/requests"))
}
