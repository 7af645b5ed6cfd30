//! Rollcall Console: the web interface for students, curators and administrators.
//!
//! Server-rendered askama pages behind a session cookie, plus the JSON photo
//! upload endpoint and badge downloads.

pub mod auth;
pub mod csrf;
mod curator;
pub mod error;
mod organizations;
mod passes;
mod users;

use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{DefaultBodyLimit, State},
    middleware,
    routing::{get, post},
    Extension, Router,
};
use tower_http::services::ServeDir;

use rollcall_badge::BadgeRenderer;
use rollcall_core::config::RollcallConfig;
use rollcall_core::db::sqlite::SqliteRepository;
use rollcall_core::mail::Mailer;
use rollcall_core::media::MediaStore;
use rollcall_core::models::user::User;

use crate::auth::CurrentUser;
use crate::error::{AppError, AppResult};

/// Request bodies above this size are refused before any handler runs.
const UPLOAD_LIMIT_BYTES: usize = 16 * 1024 * 1024;

/// Shared application state for all console routes.
pub struct AppState {
    pub repo: SqliteRepository,
    pub config: RollcallConfig,
    pub mailer: Arc<dyn Mailer>,
    pub media: MediaStore,
    /// `None` when no badge template is configured; badge pages then 404.
    pub badges: Option<BadgeRenderer>,
}

/// Build the console router with all routes.
pub fn router(state: Arc<AppState>) -> Router {
    let upload_limit = UPLOAD_LIMIT_BYTES.max(state.config.media.max_avatar_bytes * 2);
    let media = ServeDir::new(state.media.root());

    Router::new()
        .route("/health", get(health))
        .route("/", get(home))
        .route(
            "/users/login/student",
            get(auth::student_login_page).post(auth::student_login_submit),
        )
        .route(
            "/users/login/curator",
            get(auth::curator_login_page).post(auth::curator_login_submit),
        )
        .route("/users/logout", post(auth::logout))
        .route(
            "/users/signup",
            get(auth::signup_page).post(auth::signup_submit),
        )
        .route("/users/activate/:username", get(auth::activate))
        .route("/users/profile/avatar", get(users::avatar_page))
        .route("/users/avatar/upload/api", post(users::avatar_upload))
        .route(
            "/users/upload-students",
            get(users::upload_students_page).post(users::upload_students_submit),
        )
        .route("/users/upload-result/:group_name", get(users::upload_result))
        .route(
            "/users/reset",
            get(users::reset_page).post(users::reset_submit),
        )
        .route(
            "/curator/requests",
            get(curator::requests_page).post(curator::review_submit),
        )
        .route("/pass", get(passes::pass_page))
        .route("/pass/badge", get(passes::own_badge))
        .route("/pass/groups", get(passes::groups_page))
        .route("/pass/groups/:id/download", get(passes::download_group))
        .route(
            "/organizations/institution/create",
            get(organizations::institution_create_page)
                .post(organizations::institution_create_submit),
        )
        .route(
            "/organizations/group/create",
            get(organizations::group_create_page).post(organizations::group_create_submit),
        )
        .route("/organizations/group/list", get(organizations::group_list))
        .route("/organizations/group/:id", get(organizations::group_detail))
        .route(
            "/organizations/group/:id/edit",
            post(organizations::group_edit),
        )
        .route(
            "/organizations/group/:id/delete",
            post(organizations::group_delete),
        )
        .nest_service("/media", media)
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ))
        .layer(middleware::from_fn(csrf::csrf_middleware))
        .with_state(state)
}

// -- Shared helpers --

/// Student-only pages look missing to everyone else.
pub(crate) fn require_student(user: &User) -> AppResult<()> {
    if user.is_student() {
        Ok(())
    } else {
        Err(AppError::not_found())
    }
}

pub(crate) fn require_staff(user: &User) -> AppResult<()> {
    if user.role().is_staff() {
        Ok(())
    } else {
        Err(AppError::not_found())
    }
}

/// Percent-encode everything outside the unreserved URL characters.
pub(crate) fn encode_path_segment(value: &str) -> String {
    value
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                (b as char).to_string()
            }
            _ => format!("%{b:02X}"),
        })
        .collect()
}

// -- Health and home --

async fn health() -> &'static str {
    "ok"
}

struct UserView {
    username: String,
    full_name: String,
    role_label: String,
    is_student: bool,
    is_staff: bool,
}

impl UserView {
    fn from_model(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            full_name: user.full_name(),
            role_label: user.role().label().to_string(),
            is_student: user.is_student(),
            is_staff: user.role().is_staff(),
        }
    }
}

#[derive(Template)]
#[template(path = "home.html")]
struct HomeTemplate {
    instance_name: String,
    user: Option<UserView>,
}

async fn home(
    State(state): State<Arc<AppState>>,
    current: Option<Extension<CurrentUser>>,
) -> HomeTemplate {
    HomeTemplate {
        instance_name: state.config.rollcall.instance_name.clone(),
        user: current.map(|Extension(CurrentUser(user))| UserView::from_model(&user)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use chrono::{Duration, Utc};
    use image::{ImageFormat, Rgba, RgbaImage};
    use rollcall_badge::BadgeLayout;
    use rollcall_core::config::RosterConfig;
    use rollcall_core::db::repository::{
        GroupRepository, InstitutionRepository, OrgGroupRepository, PassRepository,
        SessionRepository, UserRepository,
    };
    use rollcall_core::mail::MemoryMailer;
    use rollcall_core::models::audit::Session;
    use rollcall_core::models::common::{PassStatus, RoleType};
    use rollcall_core::models::institution::Institution;
    use rollcall_core::models::user::NewUser;
    use rollcall_core::passwords::hash_password;
    use rollcall_core::roster::RosterImporter;
    use std::io::Cursor;
    use tower::ServiceExt;

    const CSRF: &str = "test-csrf-token";
    const BOUNDARY: &str = "rollcall-test-boundary";

    struct TestApp {
        state: Arc<AppState>,
        mailer: Arc<MemoryMailer>,
        _media: tempfile::TempDir,
    }

    async fn test_app_with(configure: impl FnOnce(&mut RollcallConfig)) -> TestApp {
        let pool = rollcall_core::db::DatabasePool::new_sqlite_memory()
            .await
            .unwrap();
        let repo = SqliteRepository::new(pool.into_sqlite());
        let mut config = RollcallConfig::generate_default();
        configure(&mut config);
        let media_dir = tempfile::tempdir().unwrap();
        let mailer = Arc::new(MemoryMailer::new());
        let layout = BadgeLayout {
            circle_size: (20, 20),
            photo_position: (5, 5),
            ..BadgeLayout::default()
        };
        let template = RgbaImage::from_pixel(100, 60, Rgba([255, 255, 255, 255]));
        let state = Arc::new(AppState {
            repo,
            config,
            mailer: mailer.clone(),
            media: MediaStore::new(media_dir.path()),
            badges: Some(BadgeRenderer::new(layout, template, None)),
        });
        TestApp {
            state,
            mailer,
            _media: media_dir,
        }
    }

    async fn test_app() -> TestApp {
        test_app_with(|_| {}).await
    }

    async fn get_body(response: axum::http::Response<Body>) -> String {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8_lossy(&body).to_string()
    }

    async fn get_bytes(response: axum::http::Response<Body>) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    impl TestApp {
        async fn staff(&self, username: &str, role: RoleType) -> User {
            self.state
                .repo
                .create_user(&NewUser {
                    username: username.into(),
                    email: Some(format!("{username}@example.com")),
                    password_hash: hash_password("violet-Harbor-42").unwrap(),
                    first_name: "Olga".into(),
                    last_name: "Ivanova".into(),
                    middle_name: "-".into(),
                    role,
                    is_active: true,
                })
                .await
                .unwrap()
        }

        /// Import a two-student group led by `curator` and return the codes.
        async fn import(&self, curator: &User, group: &str) -> Vec<String> {
            let limits = RosterConfig::default();
            RosterImporter::new(&self.state.repo, &limits)
                .import(
                    group,
                    "roster.csv",
                    "ФИО\nOrlov Ilya\nPetrova Anna Sergeevna\n".as_bytes(),
                    None,
                    curator,
                )
                .await
                .unwrap()
                .students
                .into_iter()
                .map(|s| s.token)
                .collect()
        }

        async fn user(&self, username: &str) -> User {
            self.state
                .repo
                .get_user_by_username(username)
                .await
                .unwrap()
                .unwrap()
        }

        /// Cookie header for a signed-in user, CSRF cookie included.
        async fn login(&self, user: &User) -> String {
            let token = format!("session-{}", user.id);
            self.state
                .repo
                .create_session(&Session {
                    token: token.clone(),
                    user_id: user.id,
                    created_at: Utc::now(),
                    expires_at: Utc::now() + Duration::hours(1),
                    ip_address: None,
                })
                .await
                .unwrap();
            format!("rollcall_session={token}; rollcall_csrf={CSRF}")
        }

        async fn send(&self, req: Request<Body>) -> axum::http::Response<Body> {
            router(self.state.clone()).oneshot(req).await.unwrap()
        }

        async fn get(&self, uri: &str, cookie: Option<&str>) -> axum::http::Response<Body> {
            let mut builder = Request::builder().uri(uri);
            if let Some(cookie) = cookie {
                builder = builder.header(header::COOKIE, cookie);
            }
            self.send(builder.body(Body::empty()).unwrap()).await
        }

        async fn post_form(
            &self,
            uri: &str,
            cookie: Option<&str>,
            body: &str,
        ) -> axum::http::Response<Body> {
            let mut builder = Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .header("x-csrf-token", CSRF);
            if let Some(cookie) = cookie {
                builder = builder.header(header::COOKIE, cookie);
            }
            self.send(builder.body(Body::from(body.to_string())).unwrap())
                .await
        }

        async fn post_multipart(
            &self,
            uri: &str,
            cookie: &str,
            body: Vec<u8>,
        ) -> axum::http::Response<Body> {
            let req = Request::builder()
                .method("POST")
                .uri(uri)
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .header(header::COOKIE, cookie)
                .header("x-csrf-token", CSRF)
                .body(Body::from(body))
                .unwrap();
            self.send(req).await
        }
    }

    /// (name, optional file name, content)
    fn multipart(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, file_name, content) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match file_name {
                Some(file) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                ),
            }
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn png_bytes() -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        RgbaImage::from_pixel(40, 30, Rgba([30, 90, 200, 255]))
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn location(response: &axum::http::Response<Body>) -> String {
        response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    // -- Public pages and middleware --

    #[tokio::test]
    async fn health_returns_ok() {
        let app = test_app().await;
        let response = app.get("/health", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(get_body(response).await, "ok");
    }

    #[tokio::test]
    async fn home_for_anonymous_links_to_login() {
        let app = test_app().await;
        let response = app.get("/", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .any(|v| v.to_str().unwrap().starts_with("rollcall_csrf=")));
        let html = get_body(response).await;
        assert!(html.contains("href=\"/users/login/student\""));
    }

    #[tokio::test]
    async fn home_for_curator_shows_tools() {
        let app = test_app().await;
        let olga = app.staff("olga", RoleType::Curator).await;
        let cookie = app.login(&olga).await;
        let html = get_body(app.get("/", Some(&cookie)).await).await;
        assert!(html.contains("Signed in as <strong>olga</strong>"));
        assert!(html.contains("href=\"/users/upload-students\""));
    }

    #[tokio::test]
    async fn protected_page_redirects_to_login() {
        let app = test_app().await;
        for uri in ["/pass", "/curator/requests", "/organizations/group/list", "/media/x.jpg"] {
            let response = app.get(uri, None).await;
            assert_eq!(response.status(), StatusCode::SEE_OTHER, "{uri}");
            assert_eq!(location(&response), "/users/login/student");
        }
    }

    #[tokio::test]
    async fn expired_session_is_rejected() {
        let app = test_app().await;
        let olga = app.staff("olga", RoleType::Curator).await;
        app.state
            .repo
            .create_session(&Session {
                token: "old".into(),
                user_id: olga.id,
                created_at: Utc::now() - Duration::hours(48),
                expires_at: Utc::now() - Duration::hours(24),
                ip_address: None,
            })
            .await
            .unwrap();
        let response = app.get("/curator/requests", Some("rollcall_session=old")).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert!(app.state.repo.get_session("old").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn post_without_csrf_token_is_forbidden() {
        let app = test_app().await;
        let olga = app.staff("olga", RoleType::Curator).await;
        let cookie = app.login(&olga).await;
        let req = Request::builder()
            .method("POST")
            .uri("/users/reset")
            .header(header::COOKIE, cookie)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("token=x"))
            .unwrap();
        assert_eq!(app.send(req).await.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn csrf_token_accepted_from_query() {
        let app = test_app().await;
        let olga = app.staff("olga", RoleType::Curator).await;
        let cookie = app.login(&olga).await;
        let req = Request::builder()
            .method("POST")
            .uri(format!("/users/reset?csrf_token={CSRF}"))
            .header(header::COOKIE, cookie)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("token=0001-00000000"))
            .unwrap();
        assert_eq!(app.send(req).await.status(), StatusCode::NOT_FOUND);
    }

    // -- Sign-in, sign-up, activation --

    #[tokio::test]
    async fn student_login_with_code() {
        let app = test_app().await;
        let olga = app.staff("olga", RoleType::Curator).await;
        let codes = app.import(&olga, "IS-21").await;

        let response = app
            .post_form("/users/login/student", None, &format!("code={}", codes[0]))
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/pass");
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(cookie.starts_with("rollcall_session="));
        assert!(cookie.contains("HttpOnly"));

        let response = app
            .post_form("/users/login/student", None, "code=0001-00ffffff")
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn curator_login_locks_out_after_max_attempts() {
        let app = test_app().await;
        app.staff("olga", RoleType::Curator).await;

        let response = app
            .post_form(
                "/users/login/curator",
                None,
                "login=olga%40example.com&password=violet-Harbor-42",
            )
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/organizations/group/list");

        for _ in 0..4 {
            let response = app
                .post_form("/users/login/curator", None, "login=olga&password=wrong")
                .await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
        let response = app
            .post_form("/users/login/curator", None, "login=olga&password=wrong")
            .await;
        let html = get_body(response).await;
        assert!(html.contains("disabled"));
        assert_eq!(app.mailer.sent().len(), 1);
        assert!(!app.user("olga").await.is_active);
    }

    #[tokio::test]
    async fn signup_and_activate() {
        let app = test_app().await;
        let response = app
            .post_form(
                "/users/signup",
                None,
                "username=newbie&email=New.Bie%40gmail.com&password1=violet-Harbor-42&password2=violet-Harbor-42",
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(get_body(response).await.contains("activate your account"));
        let sent = app.mailer.sent();
        assert_eq!(sent[0].to, "newbie@gmail.com");
        assert_eq!(sent[0].subject, "Confirm your email");

        let response = app.get("/users/activate/newbie", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(app.user("newbie").await.is_active);

        let response = app.get("/users/activate/nobody", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn signup_errors_rerender_form() {
        let app = test_app().await;
        let response = app
            .post_form(
                "/users/signup",
                None,
                "username=newbie&email=a%40b.com&password1=violet-Harbor-42&password2=other",
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let html = get_body(response).await;
        assert!(html.contains("didn&#x27;t match") || html.contains("didn't match"));
        assert!(html.contains("value=\"newbie\""));
    }

    #[tokio::test]
    async fn logout_clears_session() {
        let app = test_app().await;
        let olga = app.staff("olga", RoleType::Curator).await;
        let cookie = app.login(&olga).await;

        let response = app.post_form("/users/logout", Some(&cookie), "").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(set_cookie.contains("Max-Age=0"));
        assert!(app
            .state
            .repo
            .get_session(&format!("session-{}", olga.id))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn audit_failures_do_not_fail_the_request() {
        let app = test_app().await;
        let olga = app.staff("olga", RoleType::Curator).await;
        let cookie = app.login(&olga).await;
        let response = app
            .post_form("/organizations/group/create", Some(&cookie), "name=IS-21")
            .await;
        let detail = location(&response);

        sqlx::query("DROP TABLE audit_log")
            .execute(app.state.repo.pool())
            .await
            .unwrap();

        let response = app
            .post_form(&format!("{detail}/delete"), Some(&cookie), "")
            .await;
        assert_eq!(location(&response), "/organizations/group/list");
        let response = app.post_form("/users/logout", Some(&cookie), "").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");
    }

    // -- Avatar upload --

    #[tokio::test]
    async fn avatar_upload_stores_jpeg_and_queues_review() {
        let app = test_app().await;
        let olga = app.staff("olga", RoleType::Curator).await;
        let codes = app.import(&olga, "IS-21").await;
        let student = app.user(&codes[0]).await;
        let cookie = app.login(&student).await;

        let png = png_bytes();
        let response = app
            .post_multipart(
                "/users/avatar/upload/api",
                &cookie,
                multipart(&[("avatar", Some("me.png"), &png)]),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&get_body(response).await).unwrap();
        let expected_url = format!("/media/avatars/avatar_{}.jpg", student.id);
        assert_eq!(json["status"], "success");
        assert_eq!(json["message"], "photo uploaded");
        assert_eq!(json["avatar_url"], expected_url.as_str());

        let pass = app
            .state
            .repo
            .get_pass_for_user(student.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pass.status, PassStatus::NotVerify);
        let stored = app.state.media.read(&MediaStore::avatar_path(student.id)).await.unwrap();
        assert_eq!(image::guess_format(&stored).unwrap(), ImageFormat::Jpeg);

        let response = app.get(&expected_url, Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn avatar_upload_errors() {
        let app = test_app_with(|c| c.media.max_avatar_bytes = 16).await;
        let olga = app.staff("olga", RoleType::Curator).await;
        let codes = app.import(&olga, "IS-21").await;
        let student = app.user(&codes[0]).await;
        let cookie = app.login(&student).await;

        let response = app
            .post_multipart(
                "/users/avatar/upload/api",
                &cookie,
                multipart(&[("other", None, b"x")]),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(get_body(response).await.contains("file not found"));

        let response = app
            .post_multipart(
                "/users/avatar/upload/api",
                &cookie,
                multipart(&[("avatar", Some("big.png"), &png_bytes())]),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(get_body(response).await.contains("file too large"));

        let response = app
            .post_multipart(
                "/users/avatar/upload/api",
                &cookie,
                multipart(&[("avatar", Some("notes.txt"), b"hello")]),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(get_body(response).await.contains("not an image"));
    }

    #[tokio::test]
    async fn avatar_upload_is_student_only() {
        let app = test_app().await;
        let olga = app.staff("olga", RoleType::Curator).await;
        let cookie = app.login(&olga).await;
        let response = app
            .post_multipart(
                "/users/avatar/upload/api",
                &cookie,
                multipart(&[("avatar", Some("me.png"), &png_bytes())]),
            )
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = app.get("/users/profile/avatar", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    // -- Roster tools --

    #[tokio::test]
    async fn upload_students_redirects_to_codes() {
        let app = test_app().await;
        let olga = app.staff("olga", RoleType::Curator).await;
        let pavel = app.staff("pavel", RoleType::Curator).await;
        let cookie = app.login(&olga).await;

        let roster = "Фамилия;Имя;Отчество\nОрлов;Илья;Петрович\n".as_bytes();
        let response = app
            .post_multipart(
                "/users/upload-students",
                &cookie,
                multipart(&[
                    ("group_name", None, "ИС-21".as_bytes()),
                    ("delimiter", None, b";"),
                    ("file", Some("roster.csv"), roster),
                ]),
            )
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let target = location(&response);
        assert_eq!(target, "/users/upload-result/%D0%98%D0%A1-21");

        let html = get_body(app.get(&target, Some(&cookie)).await).await;
        assert!(html.contains("Орлов"));
        assert!(html.contains("Петрович"));

        let other = app.login(&pavel).await;
        let response = app.get(&target, Some(&other)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn upload_students_reports_roster_errors() {
        let app = test_app().await;
        let olga = app.staff("olga", RoleType::Curator).await;
        let cookie = app.login(&olga).await;

        let response = app
            .post_multipart(
                "/users/upload-students",
                &cookie,
                multipart(&[
                    ("group_name", None, b"IS-21"),
                    ("file", Some("roster.csv"), b"Phone\n555\n"),
                ]),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(get_body(response).await.contains("no recognizable name columns"));

        let response = app
            .post_multipart(
                "/users/upload-students",
                &cookie,
                multipart(&[
                    ("group_name", None, b"IS-21"),
                    ("file", Some("roster.pdf"), b"%PDF"),
                ]),
            )
            .await;
        assert!(get_body(response).await.contains("unsupported file format"));
    }

    #[tokio::test]
    async fn upload_into_foreign_group_is_forbidden() {
        let app = test_app().await;
        let olga = app.staff("olga", RoleType::Curator).await;
        let pavel = app.staff("pavel", RoleType::Curator).await;
        app.import(&olga, "IS-21").await;
        let cookie = app.login(&pavel).await;

        let response = app
            .post_multipart(
                "/users/upload-students",
                &cookie,
                multipart(&[
                    ("group_name", None, b"IS-21"),
                    ("file", Some("roster.csv"), "ФИО\nOrlov Ilya\n".as_bytes()),
                ]),
            )
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn student_cannot_use_curator_tools() {
        let app = test_app().await;
        let olga = app.staff("olga", RoleType::Curator).await;
        let codes = app.import(&olga, "IS-21").await;
        let cookie = app.login(&app.user(&codes[0]).await).await;
        for uri in [
            "/users/upload-students",
            "/users/reset",
            "/curator/requests",
            "/pass/groups",
        ] {
            assert_eq!(
                app.get(uri, Some(&cookie)).await.status(),
                StatusCode::NOT_FOUND,
                "{uri}"
            );
        }
    }

    #[tokio::test]
    async fn reset_student_code() {
        let app = test_app().await;
        let olga = app.staff("olga", RoleType::Curator).await;
        let codes = app.import(&olga, "IS-21").await;
        let cookie = app.login(&olga).await;

        let response = app
            .post_form("/users/reset", Some(&cookie), &format!("token={}", codes[0]))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(get_body(response).await.contains("New code for"));
        assert!(app
            .state
            .repo
            .get_user_by_username(&codes[0])
            .await
            .unwrap()
            .is_none());

        let response = app
            .post_form("/users/reset", Some(&cookie), &format!("token={}", codes[0]))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    // -- Review and badges --

    async fn student_with_photo(app: &TestApp, curator: &User) -> (User, String) {
        let codes = app.import(curator, "IS-21").await;
        let student = app.user(&codes[0]).await;
        let cookie = app.login(&student).await;
        let png = png_bytes();
        let response = app
            .post_multipart(
                "/users/avatar/upload/api",
                &cookie,
                multipart(&[("avatar", Some("me.png"), &png)]),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        (student, cookie)
    }

    #[tokio::test]
    async fn curator_reviews_pass() {
        let app = test_app().await;
        let olga = app.staff("olga", RoleType::Curator).await;
        let (student, _) = student_with_photo(&app, &olga).await;
        let cookie = app.login(&olga).await;

        let html = get_body(app.get("/curator/requests", Some(&cookie)).await).await;
        assert!(html.contains("Orlov Ilya"));
        assert!(html.contains("Awaiting verification"));

        let pass = app
            .state
            .repo
            .get_pass_for_user(student.id)
            .await
            .unwrap()
            .unwrap();
        let response = app
            .post_form(
                "/curator/requests",
                Some(&cookie),
                &format!("pass_id={}&status=printed", pass.id),
            )
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            app.state.repo.get_pass(pass.id).await.unwrap().unwrap().status,
            PassStatus::NotVerify
        );

        let response = app
            .post_form(
                "/curator/requests",
                Some(&cookie),
                &format!("pass_id={}&status=verify", pass.id),
            )
            .await;
        assert_eq!(location(&response), "/curator/requests");
        assert_eq!(
            app.state.repo.get_pass(pass.id).await.unwrap().unwrap().status,
            PassStatus::Verify
        );
        let html = get_body(app.get("/curator/requests", Some(&cookie)).await).await;
        assert!(!html.contains("Orlov Ilya"));
    }

    #[tokio::test]
    async fn student_badge_after_verification() {
        let app = test_app().await;
        let olga = app.staff("olga", RoleType::Curator).await;
        let (student, cookie) = student_with_photo(&app, &olga).await;

        assert_eq!(
            app.get("/pass/badge", Some(&cookie)).await.status(),
            StatusCode::NOT_FOUND
        );

        let pass = app
            .state
            .repo
            .get_pass_for_user(student.id)
            .await
            .unwrap()
            .unwrap();
        app.state
            .repo
            .set_pass_status(pass.id, PassStatus::Verify)
            .await
            .unwrap();

        let html = get_body(app.get("/pass", Some(&cookie)).await).await;
        assert!(html.contains("Verified"));

        let response = app.get("/pass/badge", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        let png = get_bytes(response).await;
        let card = image::load_from_memory(&png).unwrap();
        assert_eq!((card.width(), card.height()), (100, 60));
    }

    #[tokio::test]
    async fn group_download_marks_printed() {
        let app = test_app().await;
        let olga = app.staff("olga", RoleType::Curator).await;
        let pavel = app.staff("pavel", RoleType::Curator).await;
        let (student, _) = student_with_photo(&app, &olga).await;
        let pass = app
            .state
            .repo
            .get_pass_for_user(student.id)
            .await
            .unwrap()
            .unwrap();
        app.state
            .repo
            .set_pass_status(pass.id, PassStatus::Verify)
            .await
            .unwrap();
        let group = app
            .state
            .repo
            .get_auth_group_by_name("IS-21")
            .await
            .unwrap()
            .unwrap();

        let cookie = app.login(&olga).await;
        let html = get_body(app.get("/pass/groups", Some(&cookie)).await).await;
        assert!(html.contains(&format!("/pass/groups/{}/download", group.id)));

        let other = app.login(&pavel).await;
        let response = app
            .get(&format!("/pass/groups/{}/download", group.id), Some(&other))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .get(&format!("/pass/groups/{}/download", group.id), Some(&cookie))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/zip");
        let archive = get_bytes(response).await;
        assert_eq!(&archive[..2], b"PK");
        assert_eq!(
            app.state.repo.get_pass(pass.id).await.unwrap().unwrap().status,
            PassStatus::Printed
        );
    }

    // -- Organizations --

    #[tokio::test]
    async fn group_create_edit_delete() {
        let app = test_app().await;
        let olga = app.staff("olga", RoleType::Curator).await;
        let cookie = app.login(&olga).await;

        let response = app
            .post_form("/organizations/group/create", Some(&cookie), "name=IS-21&institution_id=")
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let detail = location(&response);
        let id: i64 = detail.rsplit('/').next().unwrap().parse().unwrap();
        let group = app.state.repo.get_org_group(id).await.unwrap().unwrap();
        assert_eq!(group.course, 1);
        let auth_group_id = group.auth_group_id.unwrap();
        let leader = app
            .state
            .repo
            .get_group_leader(auth_group_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(leader.curator_id, olga.id);

        let html = get_body(app.get(&detail, Some(&cookie)).await).await;
        assert!(html.contains("IS-21 (no institution)"));

        let list = get_body(app.get("/organizations/group/list", Some(&cookie)).await).await;
        assert!(list.contains(&detail));

        let response = app
            .post_form(&format!("{detail}/edit"), Some(&cookie), "name=IS-22&course=2")
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let renamed = app
            .state
            .repo
            .get_auth_group(auth_group_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(renamed.name, "IS-22");

        let response = app
            .post_form(&format!("{detail}/edit"), Some(&cookie), "name=IS-22&course=9")
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(get_body(response).await.contains("course must be between 1 and 6"));

        let response = app
            .post_form(&format!("{detail}/delete"), Some(&cookie), "")
            .await;
        assert_eq!(location(&response), "/organizations/group/list");
        assert!(app.state.repo.get_org_group(id).await.unwrap().is_none());
        assert!(app
            .state
            .repo
            .get_auth_group(auth_group_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn group_detail_access() {
        let app = test_app().await;
        let olga = app.staff("olga", RoleType::Curator).await;
        let pavel = app.staff("pavel", RoleType::Curator).await;
        let admin = app.staff("root", RoleType::Administrator).await;
        app.import(&olga, "IS-21").await;

        let admin_cookie = app.login(&admin).await;
        let response = app
            .post_multipart(
                "/organizations/institution/create",
                &admin_cookie,
                multipart(&[
                    ("name", None, b"Lyceum Number Two"),
                    ("short_name", None, b"LN2"),
                    ("information", None, b""),
                ]),
            )
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let group = app
            .state
            .repo
            .list_org_groups_for_curator(olga.id)
            .await
            .unwrap()
            .remove(0);
        let detail = format!("/organizations/group/{}", group.id);

        let olga_cookie = app.login(&olga).await;
        let html = get_body(app.get(&detail, Some(&olga_cookie)).await).await;
        assert!(html.contains("Orlov Ilya"));
        assert!(html.contains("Petrova Anna Sergeevna"));

        let pavel_cookie = app.login(&pavel).await;
        assert_eq!(
            app.get(&detail, Some(&pavel_cookie)).await.status(),
            StatusCode::FORBIDDEN
        );
        let response = app
            .post_form(&format!("{detail}/delete"), Some(&pavel_cookie), "")
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        // The administrator sees the group only once it belongs to their institution.
        assert_eq!(
            app.get(&detail, Some(&admin_cookie)).await.status(),
            StatusCode::FORBIDDEN
        );
        let institution = app
            .state
            .repo
            .list_institutions_for_admin(admin.id)
            .await
            .unwrap()
            .remove(0);
        let mut linked = group.clone();
        linked.institution_id = Some(institution.id);
        app.state.repo.save_org_group(&linked).await.unwrap();
        assert_eq!(
            app.get(&detail, Some(&admin_cookie)).await.status(),
            StatusCode::OK
        );
        let list = get_body(app.get("/organizations/group/list", Some(&admin_cookie)).await).await;
        assert!(list.contains("IS-21 (LN2)"));
    }

    #[tokio::test]
    async fn institution_validation_errors() {
        let app = test_app().await;
        let olga = app.staff("olga", RoleType::Curator).await;
        let cookie = app.login(&olga).await;
        let response = app
            .post_multipart(
                "/organizations/institution/create",
                &cookie,
                multipart(&[("name", None, b"Lyceum"), ("short_name", None, b"LY")]),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(get_body(response).await.contains("longer than 2"));

        let response = app
            .post_multipart(
                "/organizations/institution/create",
                &cookie,
                multipart(&[
                    ("name", None, b"Lyceum"),
                    ("short_name", None, b"LYC"),
                    ("logo", Some("crest.gif"), b"GIF89a"),
                ]),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let html = get_body(response).await;
        assert!(html.contains("png, jpg or svg"));
        assert!(html.contains("value=\"LYC\""));
        assert!(app
            .state
            .repo
            .list_institutions_for_admin(olga.id)
            .await
            .unwrap()
            .is_empty());
        let logos = app.state.media.root().join("institutions");
        assert!(!logos.exists() || std::fs::read_dir(&logos).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn any_signed_in_user_may_create_an_institution() {
        let app = test_app().await;
        let olga = app.staff("olga", RoleType::Curator).await;
        let codes = app.import(&olga, "IS-21").await;
        let student = app.user(&codes[0]).await;
        let cookie = app.login(&student).await;

        for uri in [
            "/organizations/institution/create",
            "/organizations/group/create",
        ] {
            assert_eq!(app.get(uri, Some(&cookie)).await.status(), StatusCode::OK, "{uri}");
        }

        let response = app
            .post_multipart(
                "/organizations/institution/create",
                &cookie,
                multipart(&[
                    ("name", None, b"Evening School"),
                    ("short_name", None, b"EVS"),
                ]),
            )
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let created = app
            .state
            .repo
            .list_institutions_for_admin(student.id)
            .await
            .unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].short_name, "EVS");
        assert!(created[0].logo_path.is_none());
    }

    #[tokio::test]
    async fn institution_logo_is_stored_and_shown() {
        let app = test_app().await;
        let admin = app.staff("root", RoleType::Administrator).await;
        let cookie = app.login(&admin).await;
        let png = png_bytes();

        let response = app
            .post_multipart(
                "/organizations/institution/create",
                &cookie,
                multipart(&[
                    ("name", None, b"Polytechnic College"),
                    ("short_name", None, b"PTC"),
                    ("information", None, b"Founded 1961"),
                    ("logo", Some("crest.png"), &png),
                ]),
            )
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let institution = app
            .state
            .repo
            .list_institutions_for_admin(admin.id)
            .await
            .unwrap()
            .remove(0);
        let logo = institution.logo_path.clone().unwrap();
        assert!(logo.starts_with("institutions/"));
        assert!(logo.ends_with("_crest.png"));
        assert_eq!(app.state.media.read(&logo).await.unwrap(), png);

        let response = app
            .post_form(
                "/organizations/group/create",
                Some(&cookie),
                &format!("name=IS-21&institution_id={}", institution.id),
            )
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let detail = location(&response);
        let url = MediaStore::url(&logo);
        let html = get_body(app.get(&detail, Some(&cookie)).await).await;
        assert!(html.contains("IS-21 (PTC)"));
        assert!(html.contains(&url));
        let list = get_body(app.get("/organizations/group/list", Some(&cookie)).await).await;
        assert!(list.contains(&url));
    }

    #[tokio::test]
    async fn group_institution_must_exist_and_be_administered() {
        let app = test_app().await;
        let admin = app.staff("root", RoleType::Administrator).await;
        let olga = app.staff("olga", RoleType::Curator).await;
        let foreign = app
            .state
            .repo
            .create_institution(&Institution {
                id: 0,
                name: "Lyceum Number Two".into(),
                short_name: "LN2".into(),
                information: String::new(),
                logo_path: None,
                admin_id: admin.id,
            })
            .await
            .unwrap();

        let cookie = app.login(&olga).await;
        let page = get_body(app.get("/organizations/group/create", Some(&cookie)).await).await;
        assert!(!page.contains("LN2"));

        let response = app
            .post_form(
                "/organizations/group/create",
                Some(&cookie),
                "name=IS-21&institution_id=999",
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(get_body(response).await.contains("unknown institution"));

        let response = app
            .post_form(
                "/organizations/group/create",
                Some(&cookie),
                &format!("name=IS-21&institution_id={}", foreign.id),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(get_body(response)
            .await
            .contains("you do not administer that institution"));
        assert!(app
            .state
            .repo
            .list_org_groups_for_curator(olga.id)
            .await
            .unwrap()
            .is_empty());
        assert!(app
            .state
            .repo
            .list_org_groups_for_admin(admin.id)
            .await
            .unwrap()
            .is_empty());

        let admin_cookie = app.login(&admin).await;
        let page = get_body(app.get("/organizations/group/create", Some(&admin_cookie)).await).await;
        assert!(page.contains("Lyceum Number Two (LN2)"));
    }

    #[test]
    fn path_segments_are_percent_encoded() {
        assert_eq!(encode_path_segment("IS-21"), "IS-21");
        assert_eq!(encode_path_segment("a b/c"), "a%20b%2Fc");
        assert_eq!(encode_path_segment("ИС"), "%D0%98%D0%A1");
    }
}
