//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `FILECDN_CONFIG`
//! environment variable. A missing file is not an error: every field has a default.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `FILECDN_` override YAML values
//! 3. **Storage shorthands** - `STORAGE_BUCKET`, `STORAGE_ACCOUNT` and `STORAGE_SECRET` set the S3
//!    bucket, access key id and secret access key
//! 4. **FILECDN_AUTH_TOKEN** - sets `auth.token`
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `FILECDN_STORAGE__BACKEND=local` sets the `storage.backend` field.
//!
//! ## Example
//!
//! ```yaml
//! port: 8000
//! storage:
//!   backend: s3
//!   s3:
//!     bucket: my-cdn
//!     region: eu-west-1
//! files:
//!   max_file_size: 104857600
//!   allowed_extensions: [png, jpg, jpeg, gif, ico, svg, bmp, webp, tiff, psd]
//! auth:
//!   enabled: true
//! ```
//!
//! ```bash
//! FILECDN_AUTH_TOKEN="a-long-random-secret" filecdn -f config.yaml
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

use crate::validation::{DEFAULT_MAX_FILE_SIZE, IMAGE_EXTENSIONS};

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "FILECDN_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// All fields have sensible defaults defined in the `Default` implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Where file content is kept
    pub storage: StorageConfig,
    /// Upload limits and the extension allow-list
    pub files: FilesConfig,
    /// Bearer token gate for the file routes
    pub auth: AuthConfig,
    /// Cross-origin access to the API
    pub cors: CorsConfig,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            storage: StorageConfig::default(),
            files: FilesConfig::default(),
            auth: AuthConfig::default(),
            cors: CorsConfig::default(),
            enable_otel_export: false,
        }
    }
}

/// Which storage backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// S3 or any S3-compatible object store
    S3,
    /// Files in a local directory
    Local,
    /// Process memory; contents are lost on restart
    Memory,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Maximum number of names fetched per listing request
    pub page_size: usize,
    pub s3: S3StorageConfig,
    pub local: LocalStorageConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::S3,
            page_size: 1000,
            s3: S3StorageConfig::default(),
            local: LocalStorageConfig::default(),
        }
    }
}

/// S3 bucket settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct S3StorageConfig {
    /// Bucket holding the files
    pub bucket: String,
    /// Region override; otherwise taken from the AWS environment
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible stores (MinIO, R2, ...)
    pub endpoint_url: Option<Url>,
    /// Static credentials; when unset the default AWS credential chain is used
    pub access_key_id: Option<String>,
    #[serde(skip_serializing)]
    pub secret_access_key: Option<String>,
    /// Use path-style addressing (required by most self-hosted stores)
    pub force_path_style: bool,
    /// Key prefix under which all files live
    pub prefix: Option<String>,
}

/// Local directory settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LocalStorageConfig {
    pub path: PathBuf,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/files"),
        }
    }
}

/// Upload validation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilesConfig {
    /// Maximum upload size in bytes (default: 100 MiB)
    pub max_file_size: u64,
    /// Extensions accepted on upload, compared case-insensitively
    pub allowed_extensions: Vec<String>,
    /// Also refuse downloads of names outside the allow-list
    pub restrict_downloads: bool,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            allowed_extensions: IMAGE_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            restrict_downloads: false,
        }
    }
}

/// Bearer token authentication.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// Require `Authorization: Bearer <token>` on every file route
    pub enabled: bool,
    /// The shared secret. Never logged or serialized.
    #[serde(skip_serializing)]
    pub token: Option<String>,
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests
    pub allowed_origins: Vec<CorsOrigin>,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![CorsOrigin::Wildcard],
            max_age: Some(3600),
        }
    }
}

/// CORS origin specification.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://app.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let mut config: Self = Self::figment(args).extract()?;

        config.files.allowed_extensions = config
            .files
            .allowed_extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .collect();

        config.validate().map_err(figment::Error::from)?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), String> {
        if self.auth.enabled && self.auth.token.as_deref().is_none_or(|t| t.trim().is_empty()) {
            return Err("Config validation: auth is enabled but no token is configured. \
                 Set FILECDN_AUTH_TOKEN or auth.token."
                .to_string());
        }

        if self.files.max_file_size == 0 {
            return Err("Config validation: files.max_file_size must be positive".to_string());
        }

        if self.files.allowed_extensions.iter().all(|ext| ext.is_empty()) {
            return Err("Config validation: files.allowed_extensions cannot be empty".to_string());
        }

        if self.storage.page_size == 0 {
            return Err("Config validation: storage.page_size must be positive".to_string());
        }

        if self.storage.backend == StorageBackend::S3 {
            let s3 = &self.storage.s3;
            if s3.bucket.trim().is_empty() {
                return Err("Config validation: storage.s3.bucket is required for the s3 backend. \
                     Set STORAGE_BUCKET or FILECDN_STORAGE__S3__BUCKET."
                    .to_string());
            }
            if s3.access_key_id.is_some() != s3.secret_access_key.is_some() {
                return Err(
                    "Config validation: storage.s3.access_key_id and storage.s3.secret_access_key must be set together".to_string(),
                );
            }
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can override specific values
            .merge(Env::prefixed("FILECDN_").ignore(&["CONFIG", "AUTH_TOKEN"]).split("__"))
            .merge(Env::raw().only(&["STORAGE_BUCKET"]).map(|_| "storage.s3.bucket".into()))
            .merge(Env::raw().only(&["STORAGE_ACCOUNT"]).map(|_| "storage.s3.access_key_id".into()))
            .merge(Env::raw().only(&["STORAGE_SECRET"]).map(|_| "storage.s3.secret_access_key".into()))
            .merge(Env::raw().only(&["FILECDN_AUTH_TOKEN"]).map(|_| "auth.token".into()))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn args(path: &str) -> Args {
        Args {
            config: path.to_string(),
            validate: false,
        }
    }

    #[test]
    fn test_defaults_with_bucket_from_env() {
        Jail::expect_with(|jail| {
            jail.set_env("STORAGE_BUCKET", "my-cdn");

            let config = Config::load(&args("missing.yaml"))?;

            assert_eq!(config.port, 8000);
            assert_eq!(config.storage.backend, StorageBackend::S3);
            assert_eq!(config.storage.s3.bucket, "my-cdn");
            assert_eq!(config.files.max_file_size, 100 * 1024 * 1024);
            assert_eq!(config.files.allowed_extensions.len(), IMAGE_EXTENSIONS.len());
            assert!(!config.auth.enabled);

            Ok(())
        });
    }

    #[test]
    fn test_yaml_with_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
port: 9000
storage:
  backend: local
  page_size: 50
  local:
    path: /tmp/cdn
files:
  allowed_extensions: [TXT, .pdf, png]
"#,
            )?;

            jail.set_env("FILECDN_HOST", "127.0.0.1");
            jail.set_env("FILECDN_FILES__MAX_FILE_SIZE", "2048");

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(config.host, "127.0.0.1");
            assert_eq!(config.port, 9000);
            assert_eq!(config.storage.backend, StorageBackend::Local);
            assert_eq!(config.storage.page_size, 50);
            assert_eq!(config.storage.local.path, PathBuf::from("/tmp/cdn"));
            assert_eq!(config.files.max_file_size, 2048);
            assert_eq!(config.files.allowed_extensions, vec!["txt", "pdf", "png"]);

            Ok(())
        });
    }

    #[test]
    fn test_auth_token_from_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
storage:
  backend: memory
auth:
  enabled: true
"#,
            )?;
            jail.set_env("FILECDN_AUTH_TOKEN", "s3cret");

            let config = Config::load(&args("test.yaml"))?;

            assert!(config.auth.enabled);
            assert_eq!(config.auth.token.as_deref(), Some("s3cret"));

            Ok(())
        });
    }

    #[test]
    fn test_auth_enabled_without_token_is_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
storage:
  backend: memory
auth:
  enabled: true
"#,
            )?;

            let err = Config::load(&args("test.yaml")).unwrap_err();
            assert!(err.to_string().contains("no token is configured"));

            Ok(())
        });
    }

    #[test]
    fn test_s3_backend_requires_bucket() {
        Jail::expect_with(|_jail| {
            let err = Config::load(&args("missing.yaml")).unwrap_err();
            assert!(err.to_string().contains("storage.s3.bucket"));
            Ok(())
        });
    }

    #[test]
    fn test_partial_s3_credentials_are_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("STORAGE_BUCKET", "my-cdn");
            jail.set_env("STORAGE_ACCOUNT", "AKIAEXAMPLE");

            let err = Config::load(&args("missing.yaml")).unwrap_err();
            assert!(err.to_string().contains("must be set together"));
            Ok(())
        });
    }

    #[test]
    fn test_cors_origins() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
storage:
  backend: memory
cors:
  allowed_origins: ["*", "https://app.example.com"]
"#,
            )?;

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(config.cors.allowed_origins.len(), 2);
            assert!(matches!(config.cors.allowed_origins[0], CorsOrigin::Wildcard));
            assert!(matches!(&config.cors.allowed_origins[1], CorsOrigin::Url(url) if url.as_str() == "https://app.example.com/"));

            Ok(())
        });
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "storage:\n  backend: memory\nnot_a_field: true\n")?;

            assert!(Config::load(&args("test.yaml")).is_err());
            Ok(())
        });
    }
}
