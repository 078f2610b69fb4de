use std::path::PathBuf;
use std::time::Duration;

use quill_core::QuillConfigSnapshot;

use crate::store::normalize_namespace;
use crate::{StorageError, StorageResult};

/// Configuration for blob operations
#[derive(Debug, Clone)]
pub struct BlobConfig {
    /// Absolute max size allowed for a single blob
    pub max_blob_bytes: u64,

    /// Deadline applied to each backend call; expiry counts as `Unreachable`
    pub operation_timeout: Option<Duration>,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            max_blob_bytes: 10 * 1024 * 1024, // 10MB
            operation_timeout: None,
        }
    }
}

impl BlobConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set max blob size
    pub fn with_max_blob_bytes(mut self, bytes: u64) -> Self {
        self.max_blob_bytes = bytes;
        self
    }

    /// Bound every backend call
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }
}

/// Connection settings for the CDN image service
#[derive(Debug, Clone)]
pub struct CdnSettings {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub api_base: String,
}

/// Connection settings for an S3-compatible object store
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// When set, references are `{public_base_url}/{key}` instead of `s3://bucket/key`
    pub public_base_url: Option<String>,
}

/// The one backend a deployment stores images in
#[derive(Debug, Clone)]
pub enum BackendSettings {
    Local { root: PathBuf, public_prefix: String },
    Cdn(CdnSettings),
    S3(S3Settings),
    Memory,
}

/// Everything needed to build the deployment's blob adapter
#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub namespace: String,
    pub blob: BlobConfig,
    pub backend: BackendSettings,
}

pub const DEFAULT_NAMESPACE: &str = "blogs";
pub const DEFAULT_LOCAL_ROOT: &str = "public/uploads";
pub const DEFAULT_PUBLIC_PREFIX: &str = "/uploads";
pub const DEFAULT_CDN_API_BASE: &str = "https://api.cloudinary.com/v1_1";

impl StorageSettings {
    /// Read `storage.*` keys.
    pub fn from_config(config: &QuillConfigSnapshot) -> StorageResult<Self> {
        let raw_namespace = config
            .get_non_empty("storage.namespace")
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        let namespace = normalize_namespace(&raw_namespace).ok_or_else(|| {
            StorageError::misconfigured(format!("storage.namespace '{raw_namespace}' is not a valid prefix"))
        })?;

        let mut blob = BlobConfig::default();
        if let Some(max) = config.get("storage.maxBytes") {
            let max = max
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|m| *m > 0)
                .ok_or_else(|| StorageError::misconfigured(format!("storage.maxBytes '{max}' is not a positive integer")))?;
            blob = blob.with_max_blob_bytes(max);
        }
        if let Some(secs) = config.get("storage.timeoutSecs") {
            let secs = secs
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|s| *s > 0)
                .ok_or_else(|| {
                    StorageError::misconfigured(format!("storage.timeoutSecs '{secs}' is not a positive integer"))
                })?;
            blob = blob.with_operation_timeout(Duration::from_secs(secs));
        }

        let backend_name = config
            .get_non_empty("storage.backend")
            .unwrap_or_else(|| "local".to_string())
            .to_ascii_lowercase();

        let backend = match backend_name.as_str() {
            "local" => BackendSettings::Local {
                root: PathBuf::from(
                    config
                        .get_non_empty("storage.local.root")
                        .unwrap_or_else(|| DEFAULT_LOCAL_ROOT.to_string()),
                ),
                public_prefix: config
                    .get_non_empty("storage.local.publicPrefix")
                    .unwrap_or_else(|| DEFAULT_PUBLIC_PREFIX.to_string()),
            },
            "cdn" => BackendSettings::Cdn(CdnSettings {
                cloud_name: required(config, "storage.cdn.cloudName")?,
                api_key: required(config, "storage.cdn.apiKey")?,
                api_secret: required(config, "storage.cdn.apiSecret")?,
                api_base: config
                    .get_non_empty("storage.cdn.apiBase")
                    .unwrap_or_else(|| DEFAULT_CDN_API_BASE.to_string()),
            }),
            "s3" => {
                let access_key_id = config.get_non_empty("storage.s3.accessKeyId");
                let secret_access_key = config.get_non_empty("storage.s3.secretAccessKey");
                if access_key_id.is_some() != secret_access_key.is_some() {
                    return Err(StorageError::misconfigured(
                        "storage.s3.accessKeyId and storage.s3.secretAccessKey must be set together",
                    ));
                }
                BackendSettings::S3(S3Settings {
                    bucket: required(config, "storage.s3.bucket")?,
                    region: required(config, "storage.s3.region")?,
                    endpoint: config.get_non_empty("storage.s3.endpoint"),
                    access_key_id,
                    secret_access_key,
                    public_base_url: config.get_non_empty("storage.s3.publicBaseUrl"),
                })
            }
            "memory" => BackendSettings::Memory,
            other => {
                return Err(StorageError::misconfigured(format!(
                    "unknown storage.backend '{other}' (expected local, cdn, s3 or memory)"
                )))
            }
        };

        Ok(Self {
            namespace,
            blob,
            backend,
        })
    }
}

fn required(config: &QuillConfigSnapshot, key: &str) -> StorageResult<String> {
    config
        .get_non_empty(key)
        .ok_or_else(|| StorageError::misconfigured(format!("{key} is required")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::QuillConfig;

    #[test]
    fn defaults_to_local_backend() {
        let settings = StorageSettings::from_config(&QuillConfig::new().snapshot()).unwrap();
        assert_eq!(settings.namespace, "blogs");
        assert_eq!(settings.blob.max_blob_bytes, 10 * 1024 * 1024);
        assert!(settings.blob.operation_timeout.is_none());
        match settings.backend {
            BackendSettings::Local { root, public_prefix } => {
                assert_eq!(root, PathBuf::from("public/uploads"));
                assert_eq!(public_prefix, "/uploads");
            }
            other => panic!("unexpected backend {other:?}"),
        }
    }

    #[test]
    fn cdn_requires_credentials() {
        let mut config = QuillConfig::new();
        config.set("storage.backend", "cdn");
        config.set("storage.cdn.cloudName", "demo");
        let err = StorageSettings::from_config(&config.snapshot()).unwrap_err();
        assert!(err.to_string().contains("storage.cdn.apiKey"));

        config.set("storage.cdn.apiKey", "key");
        config.set("storage.cdn.apiSecret", "secret");
        let settings = StorageSettings::from_config(&config.snapshot()).unwrap();
        assert!(matches!(settings.backend, BackendSettings::Cdn(ref c) if c.api_base == DEFAULT_CDN_API_BASE));
    }

    #[test]
    fn s3_settings_and_limits() {
        let mut config = QuillConfig::new();
        config.set("storage.backend", "S3");
        config.set("storage.s3.bucket", "posts");
        config.set("storage.s3.region", "us-east-1");
        config.set("storage.s3.endpoint", "http://localhost:9000");
        config.set("storage.maxBytes", "4096");
        config.set("storage.timeoutSecs", "5");
        config.set("storage.namespace", "Blogs/Covers");

        let settings = StorageSettings::from_config(&config.snapshot()).unwrap();
        assert_eq!(settings.namespace, "blogs/covers");
        assert_eq!(settings.blob.max_blob_bytes, 4096);
        assert_eq!(settings.blob.operation_timeout, Some(Duration::from_secs(5)));
        match settings.backend {
            BackendSettings::S3(s3) => {
                assert_eq!(s3.bucket, "posts");
                assert_eq!(s3.endpoint.as_deref(), Some("http://localhost:9000"));
                assert!(s3.access_key_id.is_none());
            }
            other => panic!("unexpected backend {other:?}"),
        }
    }

    #[test]
    fn rejects_half_configured_credentials_and_unknown_backends() {
        let mut config = QuillConfig::new();
        config.set("storage.backend", "s3");
        config.set("storage.s3.bucket", "posts");
        config.set("storage.s3.region", "us-east-1");
        config.set("storage.s3.accessKeyId", "AKIA");
        assert!(StorageSettings::from_config(&config.snapshot()).is_err());

        let mut config = QuillConfig::new();
        config.set("storage.backend", "ftp");
        assert!(matches!(
            StorageSettings::from_config(&config.snapshot()),
            Err(StorageError::Misconfigured { .. })
        ));

        let mut config = QuillConfig::new();
        config.set("storage.maxBytes", "0");
        assert!(StorageSettings::from_config(&config.snapshot()).is_err());
    }

    #[test]
    fn rejects_bad_timeouts() {
        for bad in ["soon", "0", "-3", "1.5"] {
            let mut config = QuillConfig::new();
            config.set("storage.timeoutSecs", bad);
            let err = StorageSettings::from_config(&config.snapshot()).unwrap_err();
            assert!(matches!(err, StorageError::Misconfigured { .. }), "{bad} should be rejected");
            assert!(err.to_string().contains("storage.timeoutSecs"));
        }
    }
}
