//! HTTP mapping of contract errors.
//!
//! Every failure is answered with `{"error": <code>, "message": <text>}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use petpal_contracts::ContractError;

#[derive(Debug)]
pub enum AppError {
    Contract(ContractError),
    BadRequest(String),
}

impl From<ContractError> for AppError {
    fn from(err: ContractError) -> Self {
        Self::Contract(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Contract(ContractError::Persistence(err))
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Contract(err) => StatusCode::from_u16(err.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (code, message) = match &self {
            // Store details stay in the log
            Self::Contract(err @ ContractError::Persistence(_)) => {
                tracing::error!("request failed: {err:#}");
                (err.code(), "internal error".to_string())
            }
            Self::Contract(err) => (err.code(), err.to_string()),
            Self::BadRequest(msg) => ("bad_request", msg.clone()),
        };
        let body = serde_json::json!({ "error": code, "message": message });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_status_codes() {
        let not_found = AppError::from(ContractError::ContractNotFound(Uuid::nil()));
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);

        let invalid = AppError::from(ContractError::InvalidToken);
        assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);

        let store = AppError::from(anyhow::anyhow!("pool timed out"));
        assert_eq!(store.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
