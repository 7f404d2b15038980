use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use tracing::{debug, trace};

use crate::{AppState, errors::Error};

/// Extract the credential from an `Authorization: Bearer <token>` header.
/// The scheme is matched case-insensitively; everything after the single separating space is
/// returned untouched, so padded credentials never equal the secret.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    (!token.is_empty()).then_some(token)
}

/// Check the request's bearer credential against the configured secret.
pub(crate) fn authorize(headers: &HeaderMap, expected: Option<&str>) -> Result<(), Error> {
    match (bearer_token(headers), expected) {
        (Some(presented), Some(expected)) if presented == expected => Ok(()),
        (None, _) => {
            debug!("Request without bearer credential");
            Err(Error::Forbidden)
        }
        _ => {
            debug!("Bearer credential did not match");
            Err(Error::Forbidden)
        }
    }
}

/// Middleware rejecting requests without the configured bearer token.
/// Passes everything through when auth is disabled.
pub async fn require_bearer_token(State(state): State<AppState>, request: Request, next: Next) -> Result<Response, Error> {
    if state.config.auth.enabled {
        authorize(request.headers(), state.config.auth.token.as_deref())?;
        trace!("Bearer credential accepted for {}", request.uri().path());
    }
    Ok(next.run(request).await)
}
