//! CDN image service (Cloudinary-compatible upload API).
//!
//! Uploads are signed multipart posts to `{api_base}/{cloud}/image/upload`.
//! The reference kept on a post is the delivery `secure_url`; the public id
//! needed for deletion is recovered from that URL.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::config::CdnSettings;
use crate::{BackendKind, BlobStore, ByteStream, PutResult, StorageError, StorageResult};

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    #[serde(default)]
    bytes: Option<u64>,
    #[serde(default)]
    etag: Option<String>,
    #[serde(default)]
    existing: bool,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorMessage,
}

#[derive(Debug, Deserialize)]
struct ApiErrorMessage {
    message: String,
}

/// Image storage on a hosted CDN
#[derive(Clone)]
pub struct CdnImageStore {
    http: reqwest::Client,
    settings: CdnSettings,
}

impl std::fmt::Debug for CdnImageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdnImageStore")
            .field("cloud_name", &self.settings.cloud_name)
            .field("api_base", &self.settings.api_base)
            .finish()
    }
}

impl CdnImageStore {
    pub fn new(settings: CdnSettings) -> StorageResult<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| StorageError::misconfigured(format!("http client: {e}")))?;
        Ok(Self::with_client(settings, http))
    }

    pub fn with_client(settings: CdnSettings, http: reqwest::Client) -> Self {
        Self { http, settings }
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "{}/{}/image/{}",
            self.settings.api_base.trim_end_matches('/'),
            self.settings.cloud_name,
            action
        )
    }

    /// Build the signed form fields for an API call.
    fn signed_form(&self, params: BTreeMap<&'static str, String>) -> reqwest::multipart::Form {
        let signature = sign(&params, &self.settings.api_secret);
        let mut form = reqwest::multipart::Form::new();
        for (name, value) in params {
            form = form.text(name, value);
        }
        form.text("api_key", self.settings.api_key.clone())
            .text("signature_algorithm", "sha256")
            .text("signature", signature)
    }

    async fn collect(mut stream: ByteStream) -> StorageResult<Bytes> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| StorageError::from_io(e, "read upload stream"))?;
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }

    fn public_id_for(&self, reference: &str) -> StorageResult<String> {
        public_id_from_url(reference, &self.settings.cloud_name).ok_or_else(|| {
            StorageError::invalid(format!(
                "{reference} is not an image URL of cloud {}",
                self.settings.cloud_name
            ))
        })
    }
}

#[async_trait]
impl BlobStore for CdnImageStore {
    #[tracing::instrument(skip(self, content_type, stream), fields(cloud = %self.settings.cloud_name))]
    async fn put(
        &self,
        key: &str,
        content_type: Option<&str>,
        stream: ByteStream,
    ) -> StorageResult<PutResult> {
        let data = Self::collect(stream).await?;
        let size_bytes = data.len() as u64;
        let filename = key.rsplit('/').next().unwrap_or(key).to_string();

        let mut params = BTreeMap::new();
        params.insert("overwrite", "false".to_string());
        params.insert("public_id", strip_extension(key).to_string());
        params.insert("timestamp", chrono::Utc::now().timestamp().to_string());

        let mut part = reqwest::multipart::Part::bytes(data.to_vec()).file_name(filename);
        if let Some(ct) = content_type {
            part = part
                .mime_str(ct)
                .map_err(|e| StorageError::invalid(format!("content type {ct}: {e}")))?;
        }
        let form = self.signed_form(params).part("file", part);

        let response = self
            .http
            .post(self.endpoint("upload"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| StorageError::unreachable(format!("upload: {e}")))?;
        let response = check_status(response, "upload").await?;
        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| StorageError::unreachable(format!("upload response: {e}")))?;

        if uploaded.existing {
            return Err(StorageError::invalid(format!("object already exists at {key}")));
        }

        tracing::debug!(url = %uploaded.secure_url, size_bytes, "Uploaded image");
        Ok(PutResult {
            reference: uploaded.secure_url,
            size_bytes: uploaded.bytes.unwrap_or(size_bytes),
            etag: uploaded.etag,
        })
    }

    async fn get(&self, reference: &str) -> StorageResult<Bytes> {
        self.public_id_for(reference)?;
        let response = self
            .http
            .get(reference)
            .send()
            .await
            .map_err(|e| StorageError::unreachable(format!("fetch: {e}")))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::not_found(reference));
        }
        let response = check_status(response, "fetch").await?;
        response
            .bytes()
            .await
            .map_err(|e| StorageError::unreachable(format!("fetch body: {e}")))
    }

    async fn exists(&self, reference: &str) -> StorageResult<bool> {
        self.public_id_for(reference)?;
        let response = self
            .http
            .head(reference)
            .send()
            .await
            .map_err(|e| StorageError::unreachable(format!("head: {e}")))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check_status(response, "head").await?;
        Ok(true)
    }

    #[tracing::instrument(skip(self), fields(cloud = %self.settings.cloud_name))]
    async fn delete(&self, reference: &str) -> StorageResult<()> {
        let public_id = self.public_id_for(reference)?;

        let mut params = BTreeMap::new();
        params.insert("invalidate", "true".to_string());
        params.insert("public_id", public_id.clone());
        params.insert("timestamp", chrono::Utc::now().timestamp().to_string());

        let response = self
            .http
            .post(self.endpoint("destroy"))
            .multipart(self.signed_form(params))
            .send()
            .await
            .map_err(|e| StorageError::unreachable(format!("destroy: {e}")))?;
        let response = check_status(response, "destroy").await?;
        let destroyed: DestroyResponse = response
            .json()
            .await
            .map_err(|e| StorageError::unreachable(format!("destroy response: {e}")))?;

        match destroyed.result.as_str() {
            "ok" | "not found" => {
                tracing::debug!(%public_id, result = %destroyed.result, "Destroyed image");
                Ok(())
            }
            other => Err(StorageError::unreachable(format!("destroy {public_id}: {other}"))),
        }
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Cdn
    }
}

async fn check_status(response: reqwest::Response, action: &str) -> StorageResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);
    Err(classify_status(status.as_u16(), format!("{action}: HTTP {status}: {message}")))
}

/// Map an HTTP failure status onto a storage error.
pub(crate) fn classify_status(status: u16, message: String) -> StorageError {
    match status {
        402 | 420 | 429 | 507 => StorageError::quota_exceeded(message),
        400 | 413 | 415 | 422 => StorageError::invalid(message),
        _ => StorageError::unreachable(message),
    }
}

/// Hex SHA-256 over `k=v&k=v...` (keys sorted) followed by the API secret.
pub(crate) fn sign(params: &BTreeMap<&'static str, String>, api_secret: &str) -> String {
    let to_sign = params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

fn strip_extension(path: &str) -> &str {
    match path.rsplit_once('.') {
        Some((stem, ext)) if !ext.contains('/') && !stem.ends_with('/') && !stem.is_empty() => stem,
        _ => path,
    }
}

/// Recover the public id from a delivery URL such as
/// `https://res.cloudinary.com/demo/image/upload/v1712/blogs/2025/03/id-cover.png`.
pub(crate) fn public_id_from_url(url: &str, cloud_name: &str) -> Option<String> {
    let (before, after) = url.split_once("/upload/")?;
    if !before.ends_with(&format!("/{cloud_name}/image")) {
        return None;
    }
    let after = after.split(['?', '#']).next().unwrap_or_default();

    let rest = match after.split_once('/') {
        Some((first, rest))
            if first.len() > 1
                && first.starts_with('v')
                && first[1..].chars().all(|c| c.is_ascii_digit()) =>
        {
            rest
        }
        _ => after,
    };

    let public_id = strip_extension(rest);
    let valid = !public_id.is_empty() && public_id.split('/').all(|s| !s.is_empty() && s != "..");
    valid.then(|| public_id.to_string())
}
