//! HTTP API: request handlers and their request/response models.
//!
//! All file routes live under `/cdn/v1` and share one error format (`{"detail": "..."}`, see
//! [`crate::errors`]).

pub mod handlers;
pub mod models;
