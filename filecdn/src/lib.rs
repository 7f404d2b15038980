//! # filecdn: a small file CDN over blob storage
//!
//! `filecdn` is an HTTP service that stores, serves, lists and deletes files identified only by
//! their name. Content lives in a pluggable blob store (any S3-compatible bucket, a local
//! directory, or process memory); the service itself keeps no state between requests.
//!
//! ## Routes
//!
//! | Method | Path | Purpose |
//! |---|---|---|
//! | `POST` | `/cdn/v1/uploadfile/` | Multipart upload, field `file`. The original file name is the storage key. |
//! | `GET` | `/cdn/v1/files/{filename}` | Download. Images are served inline, everything else as an attachment. |
//! | `GET` | `/cdn/v1/files/` | List every stored name, following backend pagination to the end. |
//! | `DELETE` | `/cdn/v1/files/{filename}` | Delete a stored file. |
//! | `GET` | `/` | Landing page |
//! | `GET` | `/docs`, `/openapi.json` | API documentation |
//! | `GET` | `/healthz` | Liveness |
//!
//! Uploads are checked against a size limit and an extension allow-list before anything is
//! written, and a name can only be uploaded once: re-uploading an existing name is a `409`.
//!
//! When `auth.enabled` is set every `/cdn/v1/*` route requires `Authorization: Bearer <token>`;
//! see [`auth`].
//!
//! ## Module Organization
//!
//! - [`api`]: HTTP handlers and their request/response models
//! - [`auth`]: Bearer token middleware
//! - [`config`]: YAML + environment configuration
//! - [`errors`]: Error type and its mapping to HTTP responses
//! - [`listing`]: Pagination over the storage listing
//! - [`storage`]: The [`storage::StorageClient`] trait and its backends
//! - [`telemetry`]: Tracing and optional OTLP export
//! - [`validation`]: Upload size and extension checks

pub mod api;
pub mod auth;
pub mod config;
pub mod errors;
pub mod listing;
mod openapi;
pub mod storage;
pub mod telemetry;
pub mod validation;

#[cfg(test)]
mod test_utils;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::{
    Json, Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use bon::Builder;
pub use config::Config;
use config::CorsOrigin;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::{
    auth::require_bearer_token,
    openapi::ApiDoc,
    storage::{StorageClient, create_storage},
    validation::UploadPolicy,
};

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder()
///     .storage(storage)
///     .policy(Arc::new(UploadPolicy::from_config(&config.files)))
///     .config(config)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub storage: Arc<dyn StorageClient>,
    pub config: Config,
    pub policy: Arc<UploadPolicy>,
}

fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors = &config.cors;

    let allow_origin = if cors.allowed_origins.iter().any(|o| matches!(o, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in &cors.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                // Browsers send the origin without a trailing slash
                origins.push(url.as_str().trim_end_matches('/').parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut layer = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if let Some(max_age) = cors.max_age {
        layer = layer.max_age(Duration::from_secs(max_age));
    }

    Ok(layer)
}

/// Build the application router.
///
/// File routes live under `/cdn/v1` behind the bearer token check and the upload body limit;
/// the landing page, health check and docs are always public.
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let body_limit = state.policy.max_file_size().saturating_add(MULTIPART_OVERHEAD);

    let file_routes = Router::new()
        .route("/uploadfile/", post(api::handlers::files::upload_file))
        .route("/uploadfile", post(api::handlers::files::upload_file))
        .route("/files/", get(api::handlers::files::list_files))
        .route("/files", get(api::handlers::files::list_files))
        .route(
            "/files/{filename}",
            get(api::handlers::files::download_file).delete(api::handlers::files::delete_file),
        )
        .layer(DefaultBodyLimit::max(usize::try_from(body_limit).unwrap_or(usize::MAX)))
        .route_layer(from_fn_with_state(state.clone(), require_bearer_token))
        .with_state(state.clone());

    let router = Router::new()
        .route("/", get(api::handlers::home::home))
        .route("/healthz", get(|| async { "OK" }))
        .route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .nest("/cdn/v1", file_routes)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    let router = router.layer(create_cors_layer(&state.config)?);

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create the storage backend named in the config and build the router around it
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        // Secrets are skipped when serializing
        debug!("Starting filecdn with configuration: {}", serde_json::to_string(&config)?);

        let storage = create_storage(&config.storage).await?;
        Self::with_storage(config, storage)
    }

    /// Build the application around an existing storage backend
    pub fn with_storage(config: Config, storage: Arc<dyn StorageClient>) -> anyhow::Result<Self> {
        let state = AppState::builder()
            .storage(storage)
            .policy(Arc::new(UploadPolicy::from_config(&config.files)))
            .config(config.clone())
            .build();

        let router = build_router(&state)?;
        Ok(Self { router, config })
    }

    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "filecdn listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router).with_graceful_shutdown(shutdown).await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
