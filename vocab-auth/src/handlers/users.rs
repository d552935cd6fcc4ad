use axum::Json;

use crate::{dtos::ErrorResponse, middleware::AuthUser, services::AccessClaims};

/// Claims of the signed-in user
#[utoipa::path(
    get,
    path = "/api/users/me",
    responses(
        (status = 200, description = "Claims carried by the access token", body = AccessClaims),
        (status = 401, description = "Token missing, invalid or revoked", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn me(AuthUser(claims): AuthUser) -> Json<AccessClaims> {
    Json(claims)
}
