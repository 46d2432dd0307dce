//! HTTP mapping for control plane errors.

use std::any::Any;

use axum::Json;
use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderName, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use overseer_auth::AuthError;
use serde_json::json;

pub(crate) const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Marker left on responses for internal failures so that
/// [`correlate`] can attach the request id.
#[derive(Debug, Clone)]
struct InternalFailure(String);

/// Wrapper that turns an [`AuthError`] into a JSON response.
#[derive(Debug)]
pub struct ApiError(pub AuthError);

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_class().http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if self.0.is_internal() {
            let mut response =
                (status, Json(json!({ "error": "internal_error" }))).into_response();
            response
                .extensions_mut()
                .insert(InternalFailure(self.0.to_string()));
            return response;
        }

        let body = match &self.0 {
            AuthError::Malformed(detail) => json!({ "error": self.0.code(), "detail": detail }),
            _ => json!({ "error": self.0.code() }),
        };
        (status, Json(body)).into_response()
    }
}

/// Response for a handler that panicked: an internal failure like any
/// other, so [`correlate`] logs it and hides the payload.
pub(crate) fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".into());

    let mut response = (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal_error" })),
    )
        .into_response();
    response
        .extensions_mut()
        .insert(InternalFailure(format!("handler panicked: {message}")));
    response
}

/// Log internal failures once, with the request id, and hand the id
/// back to the caller instead of any detail.
pub(crate) async fn correlate(request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(&REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("none")
        .to_string();

    let response = next.run(request).await;
    let Some(InternalFailure(detail)) = response.extensions().get::<InternalFailure>().cloned()
    else {
        return response;
    };

    tracing::error!(request_id = %request_id, error = %detail, "request failed");

    let (mut parts, _) = response.into_parts();
    parts.extensions.remove::<InternalFailure>();
    parts.headers.remove(axum::http::header::CONTENT_LENGTH);
    let body = json!({ "error": "internal_error", "correlation_id": request_id });
    Response::from_parts(parts, Body::from(body.to_string()))
}
