use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rollcall_core::error::RollcallError;
use tracing::error;

/// Error type for console handlers; converts core errors into HTTP responses.
#[derive(Debug)]
pub struct AppError(pub RollcallError);

pub type AppResult<T> = Result<T, AppError>;

impl<E> From<E> for AppError
where
    E: Into<RollcallError>,
{
    fn from(err: E) -> Self {
        AppError(err.into())
    }
}

impl AppError {
    pub fn not_found() -> Self {
        AppError(RollcallError::NotFound("page".into()))
    }

    pub fn status(&self) -> StatusCode {
        match &self.0 {
            RollcallError::NotFound(_) => StatusCode::NOT_FOUND,
            RollcallError::Forbidden(_) => StatusCode::FORBIDDEN,
            RollcallError::Validation(_) | RollcallError::Roster(_) => StatusCode::BAD_REQUEST,
            RollcallError::Auth(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match (&self.0, status) {
            (_, StatusCode::INTERNAL_SERVER_ERROR) => {
                error!(error = %self.0, "request failed");
                "Internal server error".to_string()
            }
            (RollcallError::NotFound(_), _) => "Not found".to_string(),
            (RollcallError::Forbidden(_), _) => "Forbidden".to_string(),
            (err, _) => err.to_string(),
        };
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(AppError::not_found().status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError(RollcallError::Forbidden("x".into())).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError(RollcallError::Roster("x".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError(RollcallError::Auth("x".into())).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError(RollcallError::Image("x".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_details_are_hidden() {
        let response = AppError(RollcallError::Config("secret path".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn conversion_from_core_error() {
        let err: AppError = RollcallError::NotFound("pass 3".into()).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
