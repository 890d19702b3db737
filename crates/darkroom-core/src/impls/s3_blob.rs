//! S3BlobStore - S3 互換のオブジェクトストア（MinIO など）を bucket として使う blob store
//!
//! - open: bucket が無ければ作る（他プロセスが先に作った場合もそのまま使う）
//! - put:  `If-None-Match: *` 付きで書く。既存の名前は 412 になり `AlreadyExists`
//! - get:  `NoSuchKey` は `NotFound`
//!
//! MinIO 向けに path-style でアクセスする。region は署名に使うだけなので固定。

use aws_sdk_s3::Client;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use tracing::{debug, info};

use crate::ports::{BlobError, BlobStore, validate_name};

const SIGNING_REGION: &str = "us-east-1";
const PRECONDITION_FAILED: u16 = 412;

/// Where and as whom to reach the object store.
#[derive(Debug, Clone)]
pub struct S3Settings {
    /// `host:port` or a full URL.
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    /// Use https when `endpoint` has no scheme.
    pub secure: bool,
}

pub struct S3BlobStore {
    client: Client,
    bucket: String,
}

fn backend(e: impl std::error::Error) -> BlobError {
    BlobError::Backend(DisplayErrorContext(e).to_string())
}

/// MinIO endpoints are usually written without a scheme (`minio:9000`).
fn endpoint_url(endpoint: &str, secure: bool) -> String {
    if endpoint.contains("://") {
        endpoint.to_string()
    } else if secure {
        format!("https://{endpoint}")
    } else {
        format!("http://{endpoint}")
    }
}

impl S3BlobStore {
    /// Connect and make sure `bucket` exists.
    pub async fn open(settings: &S3Settings, bucket: &str) -> Result<Self, BlobError> {
        validate_name(bucket)?;
        let url = endpoint_url(&settings.endpoint, settings.secure);
        let credentials = Credentials::new(
            settings.access_key.clone(),
            settings.secret_key.clone(),
            None,
            None,
            "darkroom",
        );
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(url.clone())
            .region(Region::new(SIGNING_REGION))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();
        let store = Self {
            client: Client::from_conf(config),
            bucket: bucket.to_string(),
        };
        store.ensure_bucket(&url).await?;
        Ok(store)
    }

    async fn ensure_bucket(&self, url: &str) -> Result<(), BlobError> {
        let bucket = self.bucket.as_str();
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => {
                info!(bucket, endpoint = url, "using existing bucket");
                return Ok(());
            }
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => {}
            Err(e) => return Err(backend(e)),
        }

        match self.client.create_bucket().bucket(bucket).send().await {
            Ok(_) => info!(bucket, endpoint = url, "created bucket"),
            Err(e)
                if e.as_service_error().is_some_and(|se| {
                    se.is_bucket_already_owned_by_you() || se.is_bucket_already_exists()
                }) =>
            {
                info!(bucket, endpoint = url, "bucket created concurrently; using it");
            }
            Err(e) => return Err(backend(e)),
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl BlobStore for S3BlobStore {
    async fn get(&self, name: &str) -> Result<Vec<u8>, BlobError> {
        validate_name(name)?;
        let out = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
        {
            Ok(out) => out,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_key()) => {
                return Err(BlobError::NotFound(name.to_string()));
            }
            Err(e) => return Err(backend(e)),
        };
        let body = out.body.collect().await.map_err(backend)?;
        Ok(body.into_bytes().to_vec())
    }

    async fn put(&self, name: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), BlobError> {
        validate_name(name)?;
        let size = bytes.len();
        let result = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(name)
            .if_none_match("*")
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await;
        match result {
            Ok(_) => {
                debug!(name, content_type, size, "blob stored");
                Ok(())
            }
            Err(e) if e.raw_response().map(|r| r.status().as_u16()) == Some(PRECONDITION_FAILED) => {
                Err(BlobError::AlreadyExists(name.to_string()))
            }
            Err(e) => Err(backend(e)),
        }
    }
}

/// 実 MinIO に対するテスト。
/// `MINIO_ENDPOINT=127.0.0.1:9000 cargo test -- --ignored`（認証情報は MINIO_ACCESS_KEY / MINIO_SECRET_KEY、既定 minioadmin）
#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("minio:9000", false, "http://minio:9000")]
    #[case("minio:9000", true, "https://minio:9000")]
    #[case("http://127.0.0.1:9000", true, "http://127.0.0.1:9000")]
    #[case("https://s3.example.com", false, "https://s3.example.com")]
    fn endpoint_gets_a_scheme(#[case] raw: &str, #[case] secure: bool, #[case] expected: &str) {
        assert_eq!(endpoint_url(raw, secure), expected);
    }

    fn settings() -> Option<S3Settings> {
        let endpoint = std::env::var("MINIO_ENDPOINT").ok()?;
        let key = |var: &str| std::env::var(var).unwrap_or_else(|_| "minioadmin".into());
        Some(S3Settings {
            endpoint,
            access_key: key("MINIO_ACCESS_KEY"),
            secret_key: key("MINIO_SECRET_KEY"),
            secure: false,
        })
    }

    /// Bucket names must be lowercase.
    fn scratch_bucket() -> String {
        format!("darkroom-test-{}", ulid::Ulid::new().to_string().to_lowercase())
    }

    #[tokio::test]
    #[ignore = "needs MINIO_ENDPOINT"]
    async fn open_creates_the_bucket_once() {
        let Some(settings) = settings() else { return };
        let bucket = scratch_bucket();
        let store = S3BlobStore::open(&settings, &bucket).await.unwrap();
        store.put("a.jpg", b"jpeg".to_vec(), "image/jpeg").await.unwrap();

        let again = S3BlobStore::open(&settings, &bucket).await.unwrap();
        assert_eq!(again.get("a.jpg").await.unwrap(), b"jpeg".to_vec());
    }

    #[tokio::test]
    #[ignore = "needs MINIO_ENDPOINT"]
    async fn second_put_under_same_name_fails() {
        let Some(settings) = settings() else { return };
        let store = S3BlobStore::open(&settings, &scratch_bucket()).await.unwrap();
        store.put("a.jpg", vec![1], "image/jpeg").await.unwrap();

        let err = store.put("a.jpg", vec![2], "image/jpeg").await.unwrap_err();
        assert!(matches!(err, BlobError::AlreadyExists(_)), "{err}");
        assert_eq!(store.get("a.jpg").await.unwrap(), vec![1]);
    }

    #[tokio::test]
    #[ignore = "needs MINIO_ENDPOINT"]
    async fn missing_object_is_not_found() {
        let Some(settings) = settings() else { return };
        let store = S3BlobStore::open(&settings, &scratch_bucket()).await.unwrap();
        assert!(matches!(store.get("nope.jpg").await, Err(BlobError::NotFound(_))));
    }

    #[tokio::test]
    async fn path_like_bucket_is_rejected_before_connecting() {
        let settings = S3Settings {
            endpoint: "127.0.0.1:1".into(),
            access_key: "k".into(),
            secret_key: "s".into(),
            secure: false,
        };
        assert!(matches!(
            S3BlobStore::open(&settings, "../images").await,
            Err(BlobError::InvalidName(_))
        ));
    }
}
