//! Incoming file submissions.
//!
//! An [`AssetPayload`] exists for exactly one post mutation. When the web
//! layer spooled the upload to disk, the payload owns the temporary file and
//! removes it when dropped, so every exit path of a mutation (success,
//! validation failure, rollback, early return) releases it.

use std::path::Path;

use bytes::Bytes;
use futures_util::StreamExt;
use tempfile::{NamedTempFile, TempPath};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;

use crate::{ByteStream, StorageError, StorageResult};

/// A file upload handed to the post service
#[derive(Debug)]
pub struct AssetPayload {
    filename: String,
    content_type: Option<String>,
    max_bytes: Option<u64>,
    body: PayloadBody,
}

#[derive(Debug)]
pub enum PayloadBody {
    /// Fully materialized in memory
    Bytes(Bytes),
    /// Spooled to a temporary file owned by the payload
    TempFile(TempUpload),
}

/// A temporary file deleted when dropped
#[derive(Debug)]
pub struct TempUpload {
    path: TempPath,
    size_bytes: u64,
}

impl TempUpload {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }
}

impl AssetPayload {
    pub fn from_bytes<S: Into<String>, B: Into<Bytes>>(filename: S, data: B) -> Self {
        let filename = filename.into();
        Self {
            content_type: guess_content_type(&filename).map(str::to_string),
            filename,
            max_bytes: None,
            body: PayloadBody::Bytes(data.into()),
        }
    }

    /// Take ownership of an already written temporary file.
    pub fn from_temp_file<S: Into<String>>(filename: S, file: NamedTempFile) -> std::io::Result<Self> {
        let size_bytes = file.as_file().metadata()?.len();
        let filename = filename.into();
        Ok(Self {
            content_type: guess_content_type(&filename).map(str::to_string),
            filename,
            max_bytes: None,
            body: PayloadBody::TempFile(TempUpload {
                path: file.into_temp_path(),
                size_bytes,
            }),
        })
    }

    /// Copy `reader` into a fresh temporary file, refusing more than `max_bytes`.
    ///
    /// The partially written file is removed if the bound is exceeded or the
    /// reader fails.
    pub async fn spool<S, R>(filename: S, reader: R, max_bytes: u64) -> StorageResult<Self>
    where
        S: Into<String>,
        R: AsyncRead + Unpin,
    {
        let temp = NamedTempFile::new().map_err(|e| StorageError::from_io(e, "create spool file"))?;
        let (file, path) = temp.into_parts();
        let mut file = tokio::fs::File::from_std(file);

        let mut limited = reader.take(max_bytes.saturating_add(1));
        let copied = tokio::io::copy(&mut limited, &mut file)
            .await
            .map_err(|e| StorageError::from_io(e, "spool upload"))?;
        file.flush()
            .await
            .map_err(|e| StorageError::from_io(e, "flush spool file"))?;

        if copied > max_bytes {
            return Err(StorageError::invalid(format!(
                "upload exceeds the {max_bytes} byte limit"
            )));
        }

        let filename = filename.into();
        Ok(Self {
            content_type: guess_content_type(&filename).map(str::to_string),
            filename,
            max_bytes: Some(max_bytes),
            body: PayloadBody::TempFile(TempUpload {
                path,
                size_bytes: copied,
            }),
        })
    }

    pub fn with_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Per-payload size bound, checked in addition to the adapter's limit.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn max_bytes(&self) -> Option<u64> {
        self.max_bytes
    }

    pub fn size_bytes(&self) -> u64 {
        match &self.body {
            PayloadBody::Bytes(data) => data.len() as u64,
            PayloadBody::TempFile(upload) => upload.size_bytes,
        }
    }

    /// Location of the spooled file, if any.
    pub fn temp_path(&self) -> Option<&Path> {
        match &self.body {
            PayloadBody::Bytes(_) => None,
            PayloadBody::TempFile(upload) => Some(upload.path()),
        }
    }

    /// Consume the payload into a byte stream.
    ///
    /// A spooled file moves into the stream and is deleted once the stream is
    /// dropped, whether or not it was read to the end.
    pub fn into_stream(self) -> ByteStream {
        match self.body {
            PayloadBody::Bytes(data) => Box::pin(futures_util::stream::once(async move { Ok::<_, std::io::Error>(data) })),
            PayloadBody::TempFile(upload) => Box::pin(async_stream::try_stream! {
                let file = tokio::fs::File::open(upload.path()).await?;
                let mut chunks = ReaderStream::new(file);
                while let Some(chunk) = chunks.next().await {
                    yield chunk?;
                }
                drop(upload);
            }),
        }
    }
}

/// Content type for common image extensions.
pub fn guess_content_type(filename: &str) -> Option<&'static str> {
    let ext = Path::new(filename).extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "ico" => "image/x-icon",
        _ => return None,
    };
    Some(mime)
}
