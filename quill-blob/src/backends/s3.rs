use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::{primitives::ByteStream as AwsByteStream, Client};
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;

use crate::config::S3Settings;
use crate::{BackendKind, BlobStore, ByteStream, PutResult, StorageError, StorageResult};

/// S3-compatible object store (AWS, MinIO, RustFS, R2...)
#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
    public_base_url: Option<String>,
}

impl std::fmt::Debug for S3Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Store")
            .field("bucket", &self.bucket)
            .field("public_base_url", &self.public_base_url)
            .finish()
    }
}

impl S3Store {
    /// Build a client from settings. Explicit credentials win over the default provider chain.
    pub async fn connect(settings: &S3Settings) -> StorageResult<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(Region::new(settings.region.clone()));

        if let (Some(access_key_id), Some(secret_access_key)) =
            (&settings.access_key_id, &settings.secret_access_key)
        {
            let credentials = Credentials::new(
                access_key_id.clone(),
                secret_access_key.clone(),
                None,
                None,
                "quill",
            );
            loader = loader.credentials_provider(credentials);
        }
        if let Some(endpoint) = &settings.endpoint {
            loader = loader.endpoint_url(endpoint.clone());
        }

        let shared = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if settings.endpoint.is_some() {
            // Self-hosted S3 implementations rarely support virtual-hosted buckets
            builder = builder.force_path_style(true);
        }

        tracing::info!(bucket = %settings.bucket, region = %settings.region, "Created S3 storage");
        Ok(Self::from_client(
            Client::from_conf(builder.build()),
            settings.bucket.clone(),
            settings.public_base_url.clone(),
        ))
    }

    pub fn from_client(client: Client, bucket: impl Into<String>, public_base_url: Option<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            public_base_url: public_base_url.map(|u| u.trim_end_matches('/').to_string()),
        }
    }

    fn reference_for(&self, key: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{base}/{key}"),
            None => format!("s3://{}/{}", self.bucket, key),
        }
    }

    fn key_for<'a>(&self, reference: &'a str) -> StorageResult<&'a str> {
        let key = match &self.public_base_url {
            Some(base) => reference.strip_prefix(base.as_str()).and_then(|r| r.strip_prefix('/')),
            None => reference
                .strip_prefix("s3://")
                .and_then(|r| r.strip_prefix(self.bucket.as_str()))
                .and_then(|r| r.strip_prefix('/')),
        };
        key.filter(|k| !k.is_empty())
            .ok_or_else(|| StorageError::invalid(format!("{reference} is not an object of bucket {}", self.bucket)))
    }

    async fn collect(mut stream: ByteStream) -> StorageResult<Bytes> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| StorageError::from_io(e, "read upload stream"))?;
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }
}

fn map_sdk_error<E, R>(err: SdkError<E, R>, context: &str) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = format!("{context}: {}", DisplayErrorContext(&err));
    match &err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => StorageError::unreachable(message),
        _ => classify_code(err.as_service_error().and_then(|e| e.code()), message),
    }
}

/// Map an S3 error code onto a storage error.
pub(crate) fn classify_code(code: Option<&str>, message: String) -> StorageError {
    match code {
        Some("QuotaExceeded" | "EntityTooLarge" | "SlowDown" | "ServiceQuotaExceeded" | "TooManyBuckets") => {
            StorageError::quota_exceeded(message)
        }
        Some(
            "InvalidArgument" | "InvalidRequest" | "PreconditionFailed" | "ConditionalRequestConflict"
            | "InvalidObjectName" | "KeyTooLongError" | "MalformedXML" | "InvalidDigest" | "BadDigest",
        ) => StorageError::invalid(message),
        _ => StorageError::unreachable(message),
    }
}

#[async_trait]
impl BlobStore for S3Store {
    #[tracing::instrument(skip(self, content_type, stream), fields(bucket = %self.bucket))]
    async fn put(
        &self,
        key: &str,
        content_type: Option<&str>,
        stream: ByteStream,
    ) -> StorageResult<PutResult> {
        let data = Self::collect(stream).await?;
        let size_bytes = data.len() as u64;

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .if_none_match("*")
            .body(AwsByteStream::from(data));

        if let Some(ct) = content_type {
            request = request.content_type(ct);
        }

        let result = request.send().await.map_err(|e| map_sdk_error(e, "put_object"))?;
        tracing::debug!(key, size_bytes, "Stored object");

        Ok(PutResult {
            reference: self.reference_for(key),
            size_bytes,
            etag: result.e_tag,
        })
    }

    async fn get(&self, reference: &str) -> StorageResult<Bytes> {
        let key = self.key_for(reference)?;
        let result = self.client.get_object().bucket(&self.bucket).key(key).send().await;
        let output = match result {
            Ok(output) => output,
            Err(err) if err.as_service_error().is_some_and(|e| e.is_no_such_key()) => {
                return Err(StorageError::not_found(reference));
            }
            Err(err) => return Err(map_sdk_error(err, "get_object")),
        };

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::unreachable(format!("get_object body: {e}")))?;
        Ok(body.into_bytes())
    }

    async fn exists(&self, reference: &str) -> StorageResult<bool> {
        let key = self.key_for(reference)?;
        match self.client.head_object().bucket(&self.bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(false),
            Err(err) => Err(map_sdk_error(err, "head_object")),
        }
    }

    #[tracing::instrument(skip(self), fields(bucket = %self.bucket))]
    async fn delete(&self, reference: &str) -> StorageResult<()> {
        let key = self.key_for(reference)?;
        // DeleteObject already succeeds for absent keys
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, "delete_object"))?;
        Ok(())
    }

    fn kind(&self) -> BackendKind {
        BackendKind::S3
    }
}
