//! Institutions and organization groups.

use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{multipart::MultipartRejection, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Extension, Form,
};
use tracing::{info, warn};

use rollcall_core::db::repository::{
    AuditRepository, InstitutionRepository, OrgGroupRepository, StudentRepository,
};
use rollcall_core::error::RollcallError;
use rollcall_core::media::MediaStore;
use rollcall_core::models::group::OrgGroup;
use rollcall_core::models::institution::Institution;
use rollcall_core::models::user::User;

use crate::auth::CurrentUser;
use crate::error::{AppError, AppResult};
use crate::AppState;

// -- View models --

pub struct InstitutionOption {
    pub id: i64,
    pub label: String,
}

pub struct GroupView {
    pub id: i64,
    pub name: String,
    pub display_name: String,
    pub course: u8,
    pub year: String,
    pub logo_url: Option<String>,
}

impl GroupView {
    fn from_model(group: &OrgGroup, institution: Option<&Institution>) -> Self {
        Self {
            id: group.id,
            name: group.name.clone(),
            display_name: group.display_name(institution),
            course: group.course,
            year: group.year.format("%Y").to_string(),
            logo_url: institution
                .and_then(|i| i.logo_path.as_deref())
                .map(MediaStore::url),
        }
    }
}

pub struct StudentView {
    pub full_name: String,
    pub username: String,
}

impl StudentView {
    fn from_model(user: &User) -> Self {
        Self {
            full_name: user.full_name(),
            username: user.username.clone(),
        }
    }
}

// -- Templates --

#[derive(Template)]
#[template(path = "organizations/institution_create.html")]
pub struct InstitutionCreateTemplate {
    pub error: Option<String>,
    pub name: String,
    pub short_name: String,
    pub information: String,
}

#[derive(Template)]
#[template(path = "organizations/group_create.html")]
pub struct GroupCreateTemplate {
    pub error: Option<String>,
    pub name: String,
    pub institutions: Vec<InstitutionOption>,
}

#[derive(Template)]
#[template(path = "organizations/group_list.html")]
pub struct GroupListTemplate {
    pub groups: Vec<GroupView>,
}

#[derive(Template)]
#[template(path = "organizations/group_detail.html")]
pub struct GroupDetailTemplate {
    pub error: Option<String>,
    pub group: GroupView,
    pub students: Vec<StudentView>,
    pub can_edit: bool,
}

async fn institution_of(state: &AppState, group: &OrgGroup) -> AppResult<Option<Institution>> {
    match group.institution_id {
        Some(id) => Ok(state.repo.get_institution(id).await?),
        None => Ok(None),
    }
}

fn form_error(err: RollcallError) -> AppResult<String> {
    match err {
        RollcallError::Validation(message) => Ok(message),
        RollcallError::Conflict(_) => Ok("that name is already taken".into()),
        other => Err(other.into()),
    }
}

// -- Institutions --

pub async fn institution_create_page() -> InstitutionCreateTemplate {
    InstitutionCreateTemplate {
        error: None,
        name: String::new(),
        short_name: String::new(),
        information: String::new(),
    }
}

#[derive(Default)]
struct InstitutionUpload {
    name: String,
    short_name: String,
    information: String,
    /// (file name, content) of the optional `logo` field.
    logo: Option<(String, Vec<u8>)>,
}

async fn read_institution_upload(mut multipart: Multipart) -> Result<InstitutionUpload, String> {
    let mut upload = InstitutionUpload::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| format!("invalid upload: {}", e.body_text()))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name == "logo" {
            let file_name = field.file_name().unwrap_or("").to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| format!("invalid upload: {}", e.body_text()))?;
            if !file_name.is_empty() && !bytes.is_empty() {
                upload.logo = Some((file_name, bytes.to_vec()));
            }
            continue;
        }
        let text = field
            .text()
            .await
            .map_err(|e| format!("invalid upload: {}", e.body_text()))?;
        match name.as_str() {
            "name" => upload.name = text,
            "short_name" => upload.short_name = text,
            "information" => upload.information = text,
            _ => {}
        }
    }
    Ok(upload)
}

/// POST /organizations/institution/create - multipart `name`, `short_name`,
/// `information` and an optional `logo`. The creator becomes its administrator.
pub async fn institution_create_submit(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Response> {
    let upload = match multipart {
        Ok(multipart) => read_institution_upload(multipart).await,
        Err(e) => Err(e.body_text()),
    };
    let upload = match upload {
        Ok(upload) => upload,
        Err(message) => {
            return Ok((
                StatusCode::BAD_REQUEST,
                InstitutionCreateTemplate {
                    error: Some(message),
                    name: String::new(),
                    short_name: String::new(),
                    information: String::new(),
                },
            )
                .into_response())
        }
    };

    let institution = Institution {
        id: 0,
        name: upload.name.trim().to_string(),
        short_name: upload.short_name.trim().to_string(),
        information: upload.information.trim().to_string(),
        logo_path: upload
            .logo
            .as_ref()
            .map(|(file_name, _)| MediaStore::institution_logo_path(file_name)),
        admin_id: user.id,
    };
    let created = async {
        institution.validate()?;
        if let (Some(relative), Some((_, bytes))) = (&institution.logo_path, &upload.logo) {
            state.media.save(relative, bytes).await?;
        }
        state.repo.create_institution(&institution).await
    }
    .await;

    match created {
        Ok(created) => {
            info!(institution = %created, admin = %user.username, "institution created");
            if let Err(e) = state
                .repo
                .log_action("institution_create", Some(&user.username), Some(&created.name), None)
                .await
            {
                warn!(error = %e, "failed to write audit log");
            }
            Ok(Redirect::to("/organizations/group/list").into_response())
        }
        Err(e) => {
            if let Some(relative) = &institution.logo_path {
                if let Err(remove_err) = state.media.remove(relative).await {
                    warn!(path = %relative, error = %remove_err, "failed to remove orphaned logo");
                }
            }
            Ok((
                StatusCode::BAD_REQUEST,
                InstitutionCreateTemplate {
                    error: Some(form_error(e)?),
                    name: upload.name,
                    short_name: upload.short_name,
                    information: upload.information,
                },
            )
                .into_response())
        }
    }
}

// -- Groups --

/// Institutions a group may be attached to: the ones the user administers.
async fn institution_options(state: &AppState, user: &User) -> AppResult<Vec<InstitutionOption>> {
    Ok(state
        .repo
        .list_institutions_for_admin(user.id)
        .await?
        .into_iter()
        .map(|inst| InstitutionOption {
            id: inst.id,
            label: format!("{} ({})", inst.name, inst.short_name),
        })
        .collect())
}

pub async fn group_create_page(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> AppResult<GroupCreateTemplate> {
    Ok(GroupCreateTemplate {
        error: None,
        name: String::new(),
        institutions: institution_options(&state, &user).await?,
    })
}

#[derive(serde::Deserialize)]
pub struct GroupCreateForm {
    pub name: String,
    #[serde(default)]
    pub institution_id: String,
}

/// Resolve the submitted institution id. Blank means none; otherwise the
/// institution must exist and be administered by `user`.
async fn chosen_institution(
    state: &AppState,
    user: &User,
    raw: &str,
) -> Result<Option<i64>, RollcallError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    let unknown = || RollcallError::Validation("unknown institution".into());
    let id: i64 = raw.parse().map_err(|_| unknown())?;
    match state.repo.get_institution(id).await? {
        Some(institution) if institution.admin_id == user.id => Ok(Some(institution.id)),
        Some(_) => Err(RollcallError::Validation(
            "you do not administer that institution".into(),
        )),
        None => Err(unknown()),
    }
}

/// POST /organizations/group/create - a first-course group curated by the current user.
pub async fn group_create_submit(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Form(form): Form<GroupCreateForm>,
) -> AppResult<Response> {
    let saved = match chosen_institution(&state, &user, &form.institution_id).await {
        Ok(institution_id) => {
            let mut group = OrgGroup::new(form.name.trim(), user.id);
            group.institution_id = institution_id;
            state.repo.save_org_group(&group).await
        }
        Err(e) => Err(e),
    };

    match saved {
        Ok(saved) => {
            info!(group = %saved.name, curator = %user.username, "group created");
            if let Err(e) = state
                .repo
                .log_action("group_create", Some(&user.username), Some(&saved.name), None)
                .await
            {
                warn!(error = %e, "failed to write audit log");
            }
            Ok(Redirect::to(&format!("/organizations/group/{}", saved.id)).into_response())
        }
        Err(e) => Ok((
            StatusCode::BAD_REQUEST,
            GroupCreateTemplate {
                error: Some(form_error(e)?),
                name: form.name,
                institutions: institution_options(&state, &user).await?,
            },
        )
            .into_response()),
    }
}

/// GET /organizations/group/list
pub async fn group_list(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> AppResult<GroupListTemplate> {
    let groups = if user.is_administrator() {
        state.repo.list_org_groups_for_admin(user.id).await?
    } else if user.is_curator() {
        state.repo.list_org_groups_for_curator(user.id).await?
    } else {
        Vec::new()
    };

    let mut views = Vec::with_capacity(groups.len());
    for group in &groups {
        let institution = institution_of(&state, group).await?;
        views.push(GroupView::from_model(group, institution.as_ref()));
    }
    Ok(GroupListTemplate { groups: views })
}

async fn load_group(state: &AppState, id: i64) -> AppResult<OrgGroup> {
    state
        .repo
        .get_org_group(id)
        .await?
        .ok_or_else(AppError::not_found)
}

async fn render_detail(
    state: &AppState,
    user: &User,
    group: &OrgGroup,
    error: Option<String>,
) -> AppResult<GroupDetailTemplate> {
    let institution = institution_of(state, group).await?;
    let is_curator = group.curator_id == user.id;
    let is_admin =
        user.is_administrator() && institution.as_ref().is_some_and(|i| i.admin_id == user.id);
    if !is_curator && !is_admin {
        return Err(RollcallError::Forbidden(format!("group {}", group.id)).into());
    }

    let students = match group.auth_group_id {
        Some(auth_group_id) => state.repo.list_group_students(auth_group_id).await?,
        None => Vec::new(),
    };
    Ok(GroupDetailTemplate {
        error,
        group: GroupView::from_model(group, institution.as_ref()),
        students: students.iter().map(StudentView::from_model).collect(),
        can_edit: is_curator,
    })
}

/// GET /organizations/group/{id}
pub async fn group_detail(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<GroupDetailTemplate> {
    let group = load_group(&state, id).await?;
    render_detail(&state, &user, &group, None).await
}

fn require_group_curator(user: &User, group: &OrgGroup) -> AppResult<()> {
    if group.curator_id != user.id {
        return Err(RollcallError::Forbidden(format!("group {}", group.id)).into());
    }
    Ok(())
}

#[derive(serde::Deserialize)]
pub struct GroupEditForm {
    pub name: String,
    pub course: String,
}

/// POST /organizations/group/{id}/edit - rename or change course; the auth group follows.
pub async fn group_edit(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Form(form): Form<GroupEditForm>,
) -> AppResult<Response> {
    let group = load_group(&state, id).await?;
    require_group_curator(&user, &group)?;

    let mut edited = group.clone();
    edited.name = form.name.trim().to_string();
    edited.course = form.course.trim().parse().unwrap_or(0);

    match state.repo.save_org_group(&edited).await {
        Ok(saved) => {
            info!(group = %saved.name, "group updated");
            Ok(Redirect::to(&format!("/organizations/group/{}", saved.id)).into_response())
        }
        Err(e) => {
            let message = form_error(e)?;
            let page = render_detail(&state, &user, &group, Some(message)).await?;
            Ok((StatusCode::BAD_REQUEST, page).into_response())
        }
    }
}

/// POST /organizations/group/{id}/delete - removes the auth group and its memberships too.
pub async fn group_delete(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> AppResult<Redirect> {
    let group = load_group(&state, id).await?;
    require_group_curator(&user, &group)?;

    if state.repo.delete_org_group(group.id).await? {
        info!(group = %group.name, curator = %user.username, "group deleted");
        if let Err(e) = state
            .repo
            .log_action("group_delete", Some(&user.username), Some(&group.name), None)
            .await
        {
            warn!(error = %e, "failed to write audit log");
        }
    }
    Ok(Redirect::to("/organizations/group/list"))
}
