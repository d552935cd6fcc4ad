use axum::{extract::State, http::StatusCode};
use service_core::error::AppError;

use crate::{
    dtos::{ErrorResponse, VerificationInCreate},
    utils::ValidatedJson,
    AppState,
};

/// Mail a verification code
///
/// Re-sending before the code expires mails the same code again.
#[utoipa::path(
    post,
    path = "/api/verification/send",
    request_body = VerificationInCreate,
    responses(
        (status = 200, description = "Verification code sent"),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 429, description = "Too many requests", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Verification"
)]
pub async fn send_verification(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<VerificationInCreate>,
) -> Result<StatusCode, AppError> {
    let code = state.verification.get_or_create(&payload.email).await?;
    state
        .mail
        .send_verification(payload.email, code, payload.action.message());
    Ok(StatusCode::OK)
}
