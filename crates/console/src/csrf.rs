//! CSRF (Cross-Site Request Forgery) protection for the web pages.
//!
//! A double-submit token: a random value is stored in a cookie and
//! state-changing requests must echo it in the `X-CSRF-Token` header or the
//! `csrf_token` query parameter. The page script fills in the parameter on
//! every form submit.

use axum::{
    body::Body,
    http::{header, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::auth::cookie_value;

pub const CSRF_COOKIE_NAME: &str = "rollcall_csrf";
const CSRF_HEADER_NAME: &str = "x-csrf-token";
const CSRF_QUERY_PARAM: &str = "csrf_token";

/// Exact paths that skip CSRF validation.
const CSRF_EXEMPT_PATHS: &[&str] = &[
    "/health",
    "/users/login/student",
    "/users/login/curator",
    "/users/signup",
    "/users/logout",
];

/// Generate a random CSRF token (64 hex characters).
pub fn generate_csrf_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Hash a CSRF token for comparison (prevents timing attacks).
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn is_csrf_exempt(path: &str) -> bool {
    CSRF_EXEMPT_PATHS.contains(&path)
}

fn submitted_token(req: &Request<Body>) -> Option<String> {
    if let Some(value) = req
        .headers()
        .get(CSRF_HEADER_NAME)
        .and_then(|v| v.to_str().ok())
    {
        return Some(value.to_string());
    }
    let query = req.uri().query()?;
    serde_urlencoded::from_str::<Vec<(String, String)>>(query)
        .ok()?
        .into_iter()
        .find(|(key, _)| key == CSRF_QUERY_PARAM)
        .map(|(_, value)| value)
}

/// CSRF protection middleware.
///
/// For GET requests: issues a fresh CSRF cookie.
/// For POST/PUT/DELETE requests: the submitted token must match the cookie.
pub async fn csrf_middleware(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();

    if matches!(method, Method::POST | Method::PUT | Method::DELETE)
        && !is_csrf_exempt(req.uri().path())
    {
        let cookie_token = cookie_value(req.headers(), CSRF_COOKIE_NAME);
        match (cookie_token, submitted_token(&req)) {
            (Some(cookie), Some(submitted)) => {
                if hash_token(&cookie) != hash_token(&submitted) {
                    return (StatusCode::FORBIDDEN, "CSRF token mismatch").into_response();
                }
            }
            _ => {
                return (StatusCode::FORBIDDEN, "CSRF token missing").into_response();
            }
        }
    }

    let mut response = next.run(req).await;

    if method == Method::GET {
        let cookie = format!(
            "{CSRF_COOKIE_NAME}={}; Path=/; SameSite=Strict; Max-Age=86400",
            generate_csrf_token()
        );
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }

    response
}
