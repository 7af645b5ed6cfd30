//! Student photo upload and the curator's roster tools.

use std::io::Cursor;
use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{multipart::MultipartRejection, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Extension, Form, Json,
};
use image::ImageFormat;
use serde_json::json;
use tracing::{error, info, warn};

use rollcall_core::db::repository::{AuditRepository, PassRepository};
use rollcall_core::error::RollcallError;
use rollcall_core::media::MediaStore;
use rollcall_core::roster::{RosterImporter, StudentCode};

use crate::auth::CurrentUser;
use crate::error::{AppError, AppResult};
use crate::{encode_path_segment, require_staff, require_student, AppState};

// -- Templates --

#[derive(Template)]
#[template(path = "users/avatar.html")]
pub struct AvatarTemplate {
    pub avatar_url: Option<String>,
    pub status_label: String,
    pub max_megabytes: usize,
}

#[derive(Template)]
#[template(path = "users/upload_students.html")]
pub struct UploadStudentsTemplate {
    pub error: Option<String>,
    pub group_name: String,
}

#[derive(Template)]
#[template(path = "users/upload_result.html")]
pub struct UploadResultTemplate {
    pub group_name: String,
    pub students: Vec<StudentCode>,
}

#[derive(Template)]
#[template(path = "users/reset.html")]
pub struct ResetTemplate {
    pub error: Option<String>,
    pub result: Option<StudentCode>,
}

// -- Avatar --

/// GET /users/profile/avatar
pub async fn avatar_page(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> AppResult<AvatarTemplate> {
    require_student(&user)?;
    let pass = state.repo.get_pass_for_user(user.id).await?;
    Ok(AvatarTemplate {
        avatar_url: user.profile.avatar_path.as_deref().map(MediaStore::url),
        status_label: pass
            .map(|p| p.status.label().to_string())
            .unwrap_or_default(),
        max_megabytes: max_megabytes(&state),
    })
}

fn max_megabytes(state: &AppState) -> usize {
    state.config.media.max_avatar_bytes / (1024 * 1024)
}

fn json_status(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "status": "error", "message": message }))).into_response()
}

enum DecodedPhoto {
    NotAnImage,
    Jpeg(Vec<u8>),
}

fn reencode_as_jpeg(bytes: &[u8]) -> Result<DecodedPhoto, RollcallError> {
    let Ok(photo) = image::load_from_memory(bytes) else {
        return Ok(DecodedPhoto::NotAnImage);
    };
    let mut out = Cursor::new(Vec::new());
    photo
        .to_rgb8()
        .write_to(&mut out, ImageFormat::Jpeg)
        .map_err(|e| RollcallError::Image(format!("cannot encode avatar: {e}")))?;
    Ok(DecodedPhoto::Jpeg(out.into_inner()))
}

/// POST /users/avatar/upload/api - multipart field `avatar`, JSON reply.
pub async fn avatar_upload(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    if !user.is_student() {
        return AppError::not_found().into_response();
    }
    let too_large = format!("file too large (max {}MB)", max_megabytes(&state));

    let Ok(mut multipart) = multipart else {
        return json_status(StatusCode::BAD_REQUEST, "file not found");
    };
    let mut upload = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("avatar") => match field.bytes().await {
                Ok(bytes) => {
                    upload = Some(bytes);
                    break;
                }
                Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                    return json_status(StatusCode::BAD_REQUEST, &too_large);
                }
                Err(_) => return json_status(StatusCode::BAD_REQUEST, "file not found"),
            },
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                return json_status(StatusCode::BAD_REQUEST, &too_large);
            }
            Err(_) => break,
        }
    }

    let Some(bytes) = upload.filter(|b| !b.is_empty()) else {
        return json_status(StatusCode::BAD_REQUEST, "file not found");
    };
    if bytes.len() > state.config.media.max_avatar_bytes {
        return json_status(StatusCode::BAD_REQUEST, &too_large);
    }

    let decoded = tokio::task::spawn_blocking(move || reencode_as_jpeg(&bytes)).await;
    let jpeg = match decoded {
        Ok(Ok(DecodedPhoto::Jpeg(jpeg))) => jpeg,
        Ok(Ok(DecodedPhoto::NotAnImage)) => {
            return json_status(StatusCode::BAD_REQUEST, "not an image");
        }
        Ok(Err(e)) => {
            error!(user_id = user.id, error = %e, "avatar conversion failed");
            return json_status(StatusCode::INTERNAL_SERVER_ERROR, "server error");
        }
        Err(e) => {
            error!(user_id = user.id, error = %e, "avatar conversion task failed");
            return json_status(StatusCode::INTERNAL_SERVER_ERROR, "server error");
        }
    };

    let stored = async {
        let relative = state.media.save_avatar(user.id, &jpeg).await?;
        state.repo.submit_pass_photo(user.id, &relative).await?;
        Ok::<_, RollcallError>(relative)
    }
    .await;

    match stored {
        Ok(relative) => {
            info!(username = %user.username, path = %relative, "avatar uploaded");
            if let Err(e) = state
                .repo
                .log_action("avatar_upload", Some(&user.username), None, None)
                .await
            {
                warn!(error = %e, "failed to write audit log");
            }
            (
                StatusCode::OK,
                Json(json!({
                    "status": "success",
                    "message": "photo uploaded",
                    "avatar_url": MediaStore::url(&relative),
                })),
            )
                .into_response()
        }
        Err(e) => {
            error!(user_id = user.id, error = %e, "storing avatar failed");
            json_status(StatusCode::INTERNAL_SERVER_ERROR, "server error")
        }
    }
}

// -- Roster upload --

/// GET /users/upload-students
pub async fn upload_students_page(
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> AppResult<UploadStudentsTemplate> {
    require_staff(&user)?;
    Ok(UploadStudentsTemplate {
        error: None,
        group_name: String::new(),
    })
}

#[derive(Default)]
struct RosterUpload {
    group_name: String,
    file_name: String,
    bytes: Vec<u8>,
    delimiter: Option<u8>,
}

async fn read_roster_upload(mut multipart: Multipart) -> Result<RosterUpload, String> {
    let mut upload = RosterUpload::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| format!("invalid upload: {}", e.body_text()))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                upload.file_name = field.file_name().unwrap_or("").to_string();
                upload.bytes = field
                    .bytes()
                    .await
                    .map_err(|e| format!("invalid upload: {}", e.body_text()))?
                    .to_vec();
            }
            "group_name" | "delimiter" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| format!("invalid upload: {}", e.body_text()))?;
                if name == "group_name" {
                    upload.group_name = text.trim().to_string();
                } else {
                    upload.delimiter = match text.as_bytes() {
                        [] => None,
                        [b] => Some(*b),
                        _ => return Err("the delimiter must be a single character".into()),
                    };
                }
            }
            _ => {}
        }
    }
    if upload.bytes.is_empty() {
        return Err("choose a roster file".into());
    }
    Ok(upload)
}

/// POST /users/upload-students - multipart `group_name`, `file`, optional `delimiter`.
pub async fn upload_students_submit(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Response> {
    require_staff(&user)?;
    let rerender = |status: StatusCode, group_name: String, message: String| {
        (
            status,
            UploadStudentsTemplate {
                error: Some(message),
                group_name,
            },
        )
            .into_response()
    };

    let upload = match multipart {
        Ok(multipart) => read_roster_upload(multipart).await,
        Err(e) => Err(e.body_text()),
    };
    let upload = match upload {
        Ok(upload) => upload,
        Err(message) => return Ok(rerender(StatusCode::BAD_REQUEST, String::new(), message)),
    };

    let importer = RosterImporter::new(&state.repo, &state.config.roster);
    match importer
        .import(
            &upload.group_name,
            &upload.file_name,
            &upload.bytes,
            upload.delimiter,
            &user,
        )
        .await
    {
        Ok(report) => Ok(Redirect::to(&format!(
            "/users/upload-result/{}",
            encode_path_segment(&report.group.name)
        ))
        .into_response()),
        Err(RollcallError::Roster(message)) | Err(RollcallError::Validation(message)) => Ok(
            rerender(StatusCode::BAD_REQUEST, upload.group_name, message),
        ),
        Err(RollcallError::Forbidden(message)) => {
            Ok(rerender(StatusCode::FORBIDDEN, upload.group_name, message))
        }
        Err(e) => Err(e.into()),
    }
}

/// GET /users/upload-result/{group_name} - printable list of login codes.
pub async fn upload_result(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(group_name): Path<String>,
) -> AppResult<UploadResultTemplate> {
    require_staff(&user)?;
    let students = RosterImporter::new(&state.repo, &state.config.roster)
        .group_codes(&group_name, &user)
        .await?;
    Ok(UploadResultTemplate {
        group_name,
        students,
    })
}

// -- Reset --

/// GET /users/reset
pub async fn reset_page(
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> AppResult<ResetTemplate> {
    require_staff(&user)?;
    Ok(ResetTemplate {
        error: None,
        result: None,
    })
}

#[derive(serde::Deserialize)]
pub struct ResetForm {
    pub token: String,
}

/// POST /users/reset - issue a new login code to one student.
pub async fn reset_submit(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Form(form): Form<ResetForm>,
) -> AppResult<Response> {
    require_staff(&user)?;
    let importer = RosterImporter::new(&state.repo, &state.config.roster);
    match importer.reset_student(&form.token, &user).await {
        Ok(report) => {
            if let Some(old) = &report.old_avatar_path {
                if let Err(e) = state.media.remove(old).await {
                    warn!(path = %old, error = %e, "could not remove old avatar");
                }
            }
            Ok(ResetTemplate {
                error: None,
                result: Some(report.student),
            }
            .into_response())
        }
        Err(RollcallError::NotFound(_)) => Ok((
            StatusCode::NOT_FOUND,
            ResetTemplate {
                error: Some("No student with this code in your groups".into()),
                result: None,
            },
        )
            .into_response()),
        Err(e) => Err(e.into()),
    }
}
