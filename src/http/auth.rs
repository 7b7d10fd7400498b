//! Authenticated shopper extraction.
//!
//! Sign-in lives in front of this service; the upstream auth layer forwards
//! the verified user id in `x-user-id`.

use axum::{async_trait, extract::FromRequestParts, http::{request::Parts, StatusCode}};
use uuid::Uuid;
use crate::domain::value_objects::UserId;

pub const USER_HEADER: &str = "x-user-id";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CurrentUser(pub UserId);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.headers.get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .map(|id| CurrentUser(UserId::from_uuid(id)))
            .ok_or((StatusCode::UNAUTHORIZED, "authentication required"))
    }
}
