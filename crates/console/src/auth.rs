//! Sessions, the sign-in middleware and the account pages.
//!
//! Sessions are opaque 64-hex tokens kept in the `sessions` table and handed
//! to the browser in an `HttpOnly` cookie.

use std::sync::Arc;

use askama::Template;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Form,
};
use chrono::{Duration, Utc};
use rand::Rng;
use tracing::{info, warn};

use rollcall_core::accounts::{Authenticator, LoginOutcome, SignupForm};
use rollcall_core::db::repository::{AuditRepository, SessionRepository, UserRepository};
use rollcall_core::error::RollcallError;
use rollcall_core::models::audit::Session;
use rollcall_core::models::user::User;

use crate::error::AppResult;
use crate::AppState;

pub const SESSION_COOKIE_NAME: &str = "rollcall_session";
pub const LOGIN_PATH: &str = "/users/login/student";

/// Path prefixes reachable without signing in.
const PUBLIC_PREFIXES: &[&str] = &[
    "/health",
    "/users/login/",
    "/users/signup",
    "/users/activate/",
];

/// The signed-in user, attached to the request by [`auth_middleware`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

fn is_public_path(path: &str) -> bool {
    path == "/" || PUBLIC_PREFIXES.iter().any(|p| path.starts_with(p))
}

/// Read a cookie value from the request headers.
pub(crate) fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookie_str = headers.get(header::COOKIE)?.to_str().ok()?;
    let prefix = format!("{name}=");
    cookie_str
        .split(';')
        .map(str::trim)
        .find_map(|cookie| cookie.strip_prefix(&prefix))
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// First address of `X-Forwarded-For`. Spoofable; only used for the audit log.
pub(crate) fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

async fn session_user(state: &AppState, token: &str) -> Option<User> {
    let session = match state.repo.get_session(token).await {
        Ok(Some(session)) => session,
        Ok(None) => return None,
        Err(e) => {
            warn!(error = %e, "session lookup failed");
            return None;
        }
    };
    if session.is_expired() {
        if let Err(e) = state.repo.delete_session(token).await {
            warn!(error = %e, "failed to delete expired session");
        }
        return None;
    }
    match state.repo.get_user(session.user_id).await {
        Ok(Some(user)) if user.is_active => Some(user),
        _ => None,
    }
}

/// Attach the signed-in user to the request, or redirect protected pages to the login form.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let user = match cookie_value(req.headers(), SESSION_COOKIE_NAME) {
        Some(token) => session_user(&state, &token).await,
        None => None,
    };

    match user {
        Some(user) => {
            req.extensions_mut().insert(CurrentUser(user));
            next.run(req).await
        }
        None if is_public_path(req.uri().path()) => next.run(req).await,
        None => Redirect::to(LOGIN_PATH).into_response(),
    }
}

/// Generate a random session token (64 hex characters).
fn generate_session_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

async fn start_session(state: &AppState, user: &User, ip: Option<String>) -> AppResult<Response> {
    let token = generate_session_token();
    let hours = state.config.auth.session_hours;
    let now = Utc::now();
    state
        .repo
        .create_session(&Session {
            token: token.clone(),
            user_id: user.id,
            created_at: now,
            expires_at: now + Duration::hours(hours),
            ip_address: ip,
        })
        .await?;

    let cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}",
        hours * 3600
    );
    let landing = if user.is_student() {
        "/pass"
    } else {
        "/organizations/group/list"
    };
    Ok((
        StatusCode::SEE_OTHER,
        [
            (header::SET_COOKIE, cookie),
            (header::LOCATION, landing.to_string()),
        ],
    )
        .into_response())
}

// -- Templates --

#[derive(Template)]
#[template(path = "users/login_student.html")]
pub struct StudentLoginTemplate {
    pub error: Option<String>,
}

#[derive(Template)]
#[template(path = "users/login_curator.html")]
pub struct CuratorLoginTemplate {
    pub error: Option<String>,
    pub login: String,
}

#[derive(Template)]
#[template(path = "users/signup.html")]
pub struct SignupTemplate {
    pub error: Option<String>,
    pub username: String,
    pub email: String,
}

#[derive(Template)]
#[template(path = "users/signup_done.html")]
pub struct SignupDoneTemplate {
    pub username: String,
    pub needs_activation: bool,
}

#[derive(Template)]
#[template(path = "users/activated.html")]
pub struct ActivatedTemplate {
    pub username: String,
}

// -- Handlers --

pub async fn student_login_page() -> StudentLoginTemplate {
    StudentLoginTemplate { error: None }
}

#[derive(serde::Deserialize)]
pub struct StudentLoginForm {
    pub code: String,
}

/// POST /users/login/student - the code is both login and password.
pub async fn student_login_submit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<StudentLoginForm>,
) -> AppResult<Response> {
    let ip = client_ip(&headers);
    let code = form.code.trim();
    let auth = Authenticator::new(&state.repo, state.mailer.as_ref(), &state.config);

    match auth.authenticate(code, code, ip.as_deref()).await? {
        LoginOutcome::Success(user) if user.is_student() => start_session(&state, &user, ip).await,
        _ => Ok((
            StatusCode::UNAUTHORIZED,
            StudentLoginTemplate {
                error: Some("Unknown or inactive code".into()),
            },
        )
            .into_response()),
    }
}

pub async fn curator_login_page() -> CuratorLoginTemplate {
    CuratorLoginTemplate {
        error: None,
        login: String::new(),
    }
}

#[derive(serde::Deserialize)]
pub struct CuratorLoginForm {
    pub login: String,
    pub password: String,
}

/// POST /users/login/curator - username or email with a password.
pub async fn curator_login_submit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<CuratorLoginForm>,
) -> AppResult<Response> {
    let ip = client_ip(&headers);
    let auth = Authenticator::new(&state.repo, state.mailer.as_ref(), &state.config);

    let error = match auth
        .authenticate(&form.login, &form.password, ip.as_deref())
        .await?
    {
        LoginOutcome::Success(user) => return start_session(&state, &user, ip).await,
        LoginOutcome::Invalid => "Invalid login or password",
        LoginOutcome::LockedOut => {
            "Too many failed attempts. The account is disabled; check your email to activate it again."
        }
    };
    Ok((
        StatusCode::UNAUTHORIZED,
        CuratorLoginTemplate {
            error: Some(error.into()),
            login: form.login,
        },
    )
        .into_response())
}

/// POST /users/logout - delete the session and clear the cookie.
pub async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Some(token) = cookie_value(&headers, SESSION_COOKIE_NAME) {
        if let Err(e) = state.repo.delete_session(&token).await {
            warn!(error = %e, "failed to delete session on logout");
        }
    }
    if let Err(e) = state
        .repo
        .log_action("logout", None, None, client_ip(&headers).as_deref())
        .await
    {
        warn!(error = %e, "failed to write audit log");
    }

    let cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0");
    (
        StatusCode::SEE_OTHER,
        [
            (header::SET_COOKIE, cookie),
            (header::LOCATION, "/".to_string()),
        ],
    )
        .into_response()
}

pub async fn signup_page() -> SignupTemplate {
    SignupTemplate {
        error: None,
        username: String::new(),
        email: String::new(),
    }
}

pub async fn signup_submit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<SignupForm>,
) -> AppResult<Response> {
    let auth = Authenticator::new(&state.repo, state.mailer.as_ref(), &state.config);
    match auth.signup(&form, client_ip(&headers).as_deref()).await {
        Ok(user) => Ok(SignupDoneTemplate {
            needs_activation: !user.is_active,
            username: user.username,
        }
        .into_response()),
        Err(RollcallError::Validation(message)) => Ok((
            StatusCode::BAD_REQUEST,
            SignupTemplate {
                error: Some(message),
                username: form.username,
                email: form.email,
            },
        )
            .into_response()),
        Err(e) => Err(e.into()),
    }
}

/// GET /users/activate/{username}
pub async fn activate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(username): Path<String>,
) -> AppResult<ActivatedTemplate> {
    let auth = Authenticator::new(&state.repo, state.mailer.as_ref(), &state.config);
    let user = auth
        .activate(&username, client_ip(&headers).as_deref())
        .await?;
    info!(username = %user.username, "activation link followed");
    Ok(ActivatedTemplate {
        username: user.username,
    })
}
