//! Signing page handlers.
//!
//! GET  /sign/:token   what the signer sees
//! POST /sign/:token   confirm a signature

use axum::{
    extract::Path,
    http::{header, HeaderMap},
    Extension, Json,
};
use petpal_contracts::{SignatureSubmission, SigningView, SubmitOutcome};

use crate::error::AppError;
use crate::extract::AppJson;
use crate::state::AppState;

pub async fn open(
    Extension(state): Extension<AppState>,
    Path(token): Path<String>,
) -> Result<Json<SigningView>, AppError> {
    Ok(Json(state.signing.open(&token).await?))
}

pub async fn submit(
    Extension(state): Extension<AppState>,
    Path(token): Path<String>,
    headers: HeaderMap,
    AppJson(mut submission): AppJson<SignatureSubmission>,
) -> Result<Json<SubmitOutcome>, AppError> {
    if submission.user_agent.is_none() {
        submission.user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
    }
    Ok(Json(state.signing.submit(&token, submission).await?))
}
