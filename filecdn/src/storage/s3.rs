//! S3-compatible storage backend using the AWS SDK.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use tracing::instrument;

use super::{ListPage, Result, StorageClient, StorageError};
use crate::config::S3StorageConfig;

/// Object store backed by a single S3 bucket, optionally under a key prefix.
pub struct S3Storage {
    client: Client,
    bucket: String,
    prefix: Option<String>,
    page_size: Option<i32>,
}

impl S3Storage {
    pub fn new(client: Client, bucket: impl Into<String>, prefix: Option<String>, page_size: Option<i32>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.map(|p| p.trim_matches('/').to_string()).filter(|p| !p.is_empty()),
            page_size,
        }
    }

    /// Build a client from configuration, falling back to the default AWS credential chain
    /// when no static credentials are configured.
    pub async fn from_config(config: &S3StorageConfig, page_size: usize) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(region) = &config.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }

        if let (Some(access_key_id), Some(secret_access_key)) = (&config.access_key_id, &config.secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(
                access_key_id.clone(),
                secret_access_key.clone(),
                None,
                None,
                "filecdn-config",
            ));
        }

        let shared_config = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared_config).force_path_style(config.force_path_style);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint.as_str().trim_end_matches('/'));
        }

        Self::new(
            Client::from_conf(builder.build()),
            config.bucket.clone(),
            config.prefix.clone(),
            // ListObjectsV2 never returns more than 1000 keys per page
            Some(page_size.min(1000) as i32),
        )
    }

    fn full_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix, key),
            None => key.to_string(),
        }
    }

    /// Strip the configured prefix from a full object key.
    fn strip_prefix<'a>(&self, full_key: &'a str) -> &'a str {
        match &self.prefix {
            Some(prefix) => full_key
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
                .unwrap_or(full_key),
            None => full_key,
        }
    }
}

fn is_not_found<E>(err: &SdkError<E>) -> bool {
    matches!(err, SdkError::ServiceError(service_err) if service_err.raw().status().as_u16() == 404)
}

/// Transport-level failures mean the bucket could not be reached; everything else is unexpected.
fn map_sdk_error<E>(err: SdkError<E>) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    match err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => StorageError::Unavailable(anyhow::Error::new(err)),
        _ => StorageError::Other(anyhow::Error::new(err)),
    }
}

#[async_trait]
impl StorageClient for S3Storage {
    #[instrument(skip(self), fields(backend = "s3"))]
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let output = match self.client.get_object().bucket(&self.bucket).key(self.full_key(key)).send().await {
            Ok(output) => output,
            Err(err) if is_not_found(&err) => return Ok(None),
            Err(err) => return Err(map_sdk_error(err)),
        };

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Unavailable(anyhow::Error::new(e).context(format!("reading body of {key}"))))?
            .into_bytes();

        Ok(Some(bytes))
    }

    #[instrument(skip(self, content), fields(backend = "s3", size = content.len()))]
    async fn put(&self, key: &str, content: Bytes) -> Result<()> {
        let content_type = mime_guess::from_path(key).first_or_octet_stream();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .content_type(content_type.essence_str())
            .body(ByteStream::from(content))
            .send()
            .await
            .map_err(map_sdk_error)?;

        Ok(())
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await
            .map_err(map_sdk_error)?;

        Ok(())
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn list(&self, cursor: Option<&str>) -> Result<ListPage> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .set_prefix(self.prefix.as_ref().map(|p| format!("{p}/")))
            .set_max_keys(self.page_size)
            .set_continuation_token(cursor.map(str::to_string))
            .send()
            .await
            .map_err(map_sdk_error)?;

        let names = output
            .contents()
            .iter()
            .filter_map(|object| object.key())
            .map(|key| self.strip_prefix(key).to_string())
            .collect();

        let next_cursor = if output.is_truncated() == Some(true) {
            output.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ListPage { names, next_cursor })
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn exists(&self, key: &str) -> Result<bool> {
        match self.client.head_object().bucket(&self.bucket).key(self.full_key(key)).send().await {
            Ok(_) => Ok(true),
            Err(err) if is_not_found(&err) => Ok(false),
            Err(err) => Err(map_sdk_error(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use crate::listing::list_all;
    use aws_sdk_s3::config::retry::RetryConfig;
    use wiremock::matchers::{method, path, path_regex, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn install_crypto() {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    }

    fn offline_client() -> Client {
        let config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(aws_config::Region::new("us-east-1"))
            .credentials_provider(Credentials::new("test", "test", None, None, "test"))
            .build();
        Client::from_conf(config)
    }

    /// Path-style client against `endpoint` that gives up after the first attempt
    fn client_for(endpoint: &str) -> Client {
        let config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(aws_config::Region::new("us-east-1"))
            .credentials_provider(Credentials::new("test", "test", None, None, "test"))
            .endpoint_url(endpoint)
            .force_path_style(true)
            .retry_config(RetryConfig::disabled())
            .build();
        Client::from_conf(config)
    }

    fn mock_config(server: &MockServer) -> S3StorageConfig {
        S3StorageConfig {
            bucket: "bucket".to_string(),
            region: Some("us-east-1".to_string()),
            endpoint_url: Some(server.uri().parse().unwrap()),
            access_key_id: Some("test".to_string()),
            secret_access_key: Some("test".to_string()),
            force_path_style: true,
            prefix: Some("cdn".to_string()),
        }
    }

    fn list_body(keys: &[&str], truncated: bool, next_token: Option<&str>) -> String {
        let contents: String = keys
            .iter()
            .map(|key| format!("<Contents><Key>{key}</Key><Size>1</Size></Contents>"))
            .collect();
        let token = next_token
            .map(|t| format!("<NextContinuationToken>{t}</NextContinuationToken>"))
            .unwrap_or_default();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/"><Name>bucket</Name><Prefix>cdn/</Prefix><KeyCount>{}</KeyCount><MaxKeys>2</MaxKeys><IsTruncated>{}</IsTruncated>{}{}</ListBucketResult>"#,
            keys.len(),
            truncated,
            contents,
            token
        )
    }

    fn xml(status: u16, body: impl Into<String>) -> ResponseTemplate {
        let body: String = body.into();
        ResponseTemplate::new(status).set_body_raw(body, "application/xml")
    }

    #[test]
    fn test_prefix_is_normalised_and_applied() {
        let storage = S3Storage::new(offline_client(), "bucket", Some("/cdn/".to_string()), None);

        assert_eq!(storage.full_key("logo.png"), "cdn/logo.png");
        assert_eq!(storage.strip_prefix("cdn/logo.png"), "logo.png");
        assert_eq!(storage.strip_prefix("other/logo.png"), "other/logo.png");
    }

    #[test]
    fn test_empty_prefix_is_ignored() {
        let storage = S3Storage::new(offline_client(), "bucket", Some("/".to_string()), None);

        assert_eq!(storage.full_key("logo.png"), "logo.png");
        assert_eq!(storage.strip_prefix("logo.png"), "logo.png");
    }

    #[test_log::test(tokio::test)]
    async fn test_list_all_follows_continuation_tokens() {
        install_crypto();
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path_regex(r"^/bucket/?$"))
            .and(query_param("list-type", "2"))
            .and(query_param("prefix", "cdn/"))
            .and(query_param("max-keys", "2"))
            .and(query_param_is_missing("continuation-token"))
            .respond_with(xml(200, list_body(&["cdn/a.png", "cdn/b.png"], true, Some("token-1"))))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path_regex(r"^/bucket/?$"))
            .and(query_param("continuation-token", "token-1"))
            .respond_with(xml(200, list_body(&["cdn/c.png"], false, None)))
            .expect(1)
            .mount(&server)
            .await;

        let storage = S3Storage::from_config(&mock_config(&server), 2).await;
        let names = list_all(&storage).await.unwrap();

        assert_eq!(names, vec!["a.png", "b.png", "c.png"]);
    }

    #[tokio::test]
    async fn test_token_without_truncation_ends_listing() {
        install_crypto();
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path_regex(r"^/bucket/?$"))
            .and(query_param("list-type", "2"))
            .respond_with(xml(200, list_body(&["cdn/a.png"], false, Some("stale-token"))))
            .mount(&server)
            .await;

        let storage = S3Storage::from_config(&mock_config(&server), 2).await;
        let page = storage.list(None).await.unwrap();

        assert_eq!(page.names, vec!["a.png"]);
        assert_eq!(page.next_cursor, None);
    }

    #[tokio::test]
    async fn test_missing_object_is_absent() {
        install_crypto();
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/bucket/cdn/missing.png"))
            .respond_with(xml(
                404,
                r#"<?xml version="1.0" encoding="UTF-8"?><Error><Code>NoSuchKey</Code><Message>The specified key does not exist.</Message></Error>"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/bucket/cdn/missing.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let storage = S3Storage::from_config(&mock_config(&server), 1000).await;

        assert_eq!(storage.get("missing.png").await.unwrap(), None);
        assert!(!storage.exists("missing.png").await.unwrap());
    }

    #[tokio::test]
    async fn test_existing_object_is_fetched() {
        install_crypto();
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/bucket/cdn/logo.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"png-bytes".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/bucket/cdn/logo.png"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let storage = S3Storage::from_config(&mock_config(&server), 1000).await;

        assert_eq!(
            storage.get("logo.png").await.unwrap(),
            Some(Bytes::from_static(b"png-bytes"))
        );
        assert!(storage.exists("logo.png").await.unwrap());
    }

    #[tokio::test]
    async fn test_access_denied_is_not_unavailable() {
        install_crypto();
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/bucket/secret.png"))
            .respond_with(xml(
                403,
                r#"<?xml version="1.0" encoding="UTF-8"?><Error><Code>AccessDenied</Code><Message>Access Denied</Message></Error>"#,
            ))
            .mount(&server)
            .await;

        let storage = S3Storage::new(client_for(&server.uri()), "bucket", None, None);
        let err = storage.get("secret.png").await.unwrap_err();

        assert!(matches!(err, StorageError::Other(_)));
        assert!(matches!(Error::from(err), Error::Unexpected(_)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_unavailable() {
        install_crypto();
        // Bind then release a port so nothing is listening on it
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let storage = S3Storage::new(client_for(&format!("http://{addr}")), "bucket", None, None);

        let err = storage.get("logo.png").await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable(_)), "unexpected error: {err:?}");
        assert!(matches!(Error::from(err), Error::BackendUnavailable(_)));

        let err = storage.list(None).await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable(_)));
    }
}
