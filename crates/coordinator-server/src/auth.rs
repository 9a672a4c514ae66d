//! Bearer-token extraction for every HTTP surface (spec §6: "Authorization:
//! Bearer <token> on every call").

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use coordinator_auth::Principal;
use coordinator_core::CoordError;

use crate::response::ApiError;
use crate::state::AppState;

/// An authenticated caller, extractable directly as a handler argument.
/// Handlers that need the caller's identity or scope take `AuthenticatedPrincipal`;
/// handlers that merely require *some* valid credential can ignore the
/// extracted value.
pub struct AuthenticatedPrincipal(pub Principal);

impl FromRequestParts<AppState> for AuthenticatedPrincipal {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, app_state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| CoordError::Unauthenticated("missing Authorization header".into()))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| CoordError::Unauthenticated("Authorization header is not a bearer token".into()))?;

        let source = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        let principal = app_state.validator.validate(token, &source).map_err(CoordError::from)?;
        Ok(AuthenticatedPrincipal(principal))
    }
}
