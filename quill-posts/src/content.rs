//! The post record and the value types the service exchanges with a record store.

use chrono::{DateTime, Utc};
use quill_blob::AssetRef;
use quill_core::{ActorId, QuillError, QuillResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier of a post, assigned at creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    /// Mint a fresh `post:{uuid}` id.
    pub fn generate() -> Self {
        Self(format!("post:{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ContentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A blog post.
///
/// `asset_ref` is `None` for posts without an image; renderers then show the
/// fallback asset (see [`Content::display_asset`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    pub id: ContentId,
    pub title: String,
    pub description: String,
    pub body: String,
    pub asset_ref: Option<AssetRef>,
    pub author_id: ActorId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Content {
    /// The image to display: the stored asset, or `fallback` when there is none.
    pub fn display_asset<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.asset_ref.as_ref().map(AssetRef::as_str).unwrap_or(fallback)
    }
}

/// Text fields of a new post. All three are required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentFields {
    pub title: String,
    pub description: String,
    pub body: String,
}

impl ContentFields {
    pub fn new<T, D, B>(title: T, description: D, body: B) -> Self
    where
        T: Into<String>,
        D: Into<String>,
        B: Into<String>,
    {
        Self {
            title: title.into(),
            description: description.into(),
            body: body.into(),
        }
    }

    /// First blank field wins.
    pub fn validate(&self) -> QuillResult<()> {
        require("title", &self.title)?;
        require("description", &self.description)?;
        require("body", &self.body)
    }
}

/// Partial edit of a post. `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub body: Option<String>,
}

impl ContentChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title<S: Into<String>>(mut self, title: S) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_body<S: Into<String>>(mut self, body: S) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.body.is_none()
    }

    /// A provided field must not be blank.
    pub fn validate(&self) -> QuillResult<()> {
        for (field, value) in [
            ("title", &self.title),
            ("description", &self.description),
            ("body", &self.body),
        ] {
            if let Some(value) = value {
                require(field, value)?;
            }
        }
        Ok(())
    }
}

fn require(field: &str, value: &str) -> QuillResult<()> {
    if value.trim().is_empty() {
        return Err(QuillError::validation(field, format!("{field} must not be empty")));
    }
    Ok(())
}

/// What the service asks a record store to insert.
#[derive(Debug, Clone)]
pub struct NewContent {
    pub fields: ContentFields,
    pub asset_ref: Option<AssetRef>,
    pub author_id: ActorId,
}

/// What the service asks a record store to change.
///
/// `asset_ref: None` leaves the stored reference alone, so an edit without a
/// new image never writes back a reference it read earlier.
#[derive(Debug, Clone, Default)]
pub struct ContentUpdate {
    pub changes: ContentChanges,
    pub asset_ref: Option<AssetRef>,
}

impl ContentUpdate {
    /// Apply onto a stored record.
    pub fn apply_to(self, content: &mut Content) {
        if let Some(title) = self.changes.title {
            content.title = title;
        }
        if let Some(description) = self.changes.description {
            content.description = description;
        }
        if let Some(body) = self.changes.body {
            content.body = body;
        }
        if let Some(asset_ref) = self.asset_ref {
            content.asset_ref = Some(asset_ref);
        }
    }
}
