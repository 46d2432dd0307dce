//! Extractors whose rejections speak the API's error vocabulary: a body,
//! query string or path segment that does not decode is a 400
//! `malformed_request`, never axum's plain-text 4xx.

use axum::Json;
use axum::async_trait;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request};
use axum::http::request::Parts;
use overseer_auth::AuthError;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use super::error::ApiError;

/// JSON request body.
pub struct Body<T>(pub T);

/// Query-string parameters.
pub struct Params<T>(pub T);

/// A single UUID path segment.
pub struct Id(pub Uuid);

fn malformed(detail: String) -> ApiError {
    AuthError::Malformed(detail).into()
}

#[async_trait]
impl<S, T> FromRequest<S> for Body<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(malformed(json_detail(&rejection))),
        }
    }
}

fn json_detail(rejection: &JsonRejection) -> String {
    match rejection {
        JsonRejection::MissingJsonContentType(_) => "expected application/json".into(),
        other => other.body_text(),
    }
}

#[async_trait]
impl<S, T> FromRequestParts<S> for Params<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Query::<T>::from_request_parts(parts, state)
            .await
            .map(|Query(value)| Self(value))
            .map_err(|rejection: QueryRejection| malformed(rejection.body_text()))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Id
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Path::<Uuid>::from_request_parts(parts, state)
            .await
            .map(|Path(id)| Self(id))
            .map_err(|rejection: PathRejection| malformed(rejection.body_text()))
    }
}
