use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::ApiError;

/// Caller identity asserted by the fronting identity provider. The pair is
/// trusted verbatim; this service performs no credential verification.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
    pub department: String,
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = required_header(parts, "x-user-id")?;
        let department = required_header(parts, "x-department")?;

        Ok(Self {
            user_id,
            department,
        })
    }
}

fn required_header(parts: &Parts, name: &str) -> Result<String, ApiError> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| ApiError::Unauthorized(format!("missing or empty {name} header")))
}
