//! Bearer token authentication.
//!
//! When `auth.enabled` is set, every `/cdn/v1/*` route requires an
//! `Authorization: Bearer <token>` header whose token equals the configured secret exactly.
//! Requests without it are rejected with `403` before any handler runs, so a rejected request
//! never reaches storage. There are no sessions, scopes or expiry; the landing page, docs and
//! health check stay public.
//!
//! The secret only ever comes from configuration (see [`crate::config::AuthConfig`]).
//!
//! # Modules
//!
//! - [`middleware`]: the route layer enforcing the check

pub mod middleware;

pub use middleware::{bearer_token, require_bearer_token};
