//! Maps [`CoordError`] onto the unified `{ok, data, error}` envelope and the
//! right HTTP status (spec §6, §7).

use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use coordinator_core::{CoordError, Envelope};

/// Wraps a handler's successful payload as `{ok: true, data: T}` with a 200
/// status. Handlers return `Result<ApiResponse<T>, CoordError>`.
pub struct ApiResponse<T>(pub T);

impl<T: serde::Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(Envelope::ok(self.0)).into_response()
    }
}

pub struct ApiError(pub CoordError);

impl From<CoordError> for ApiError {
    fn from(e: CoordError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Envelope::<()>::from_error(&self.0);
        (status, Json(body)).into_response()
    }
}

/// Drop-in replacement for `axum::Json` that converts extraction failures
/// (malformed or non-JSON bodies) into the `{ok: false, error: {kind:
/// "bad_request", ...}}` envelope instead of axum's plain-text default
/// rejection (spec §6/§7: every error surfaces through the unified envelope).
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: serde::de::DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError(CoordError::BadRequest(rejection.to_string()))),
        }
    }
}
