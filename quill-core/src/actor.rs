//! Identity of the caller performing a post operation.
//!
//! Quill never authenticates anyone. The web layer resolves the session and
//! hands the resulting actor to the post service.

/// Stable identifier of an authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ActorId(pub String);

impl ActorId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A signed-in caller as resolved by the session layer.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: ActorId,
    pub role: String,
}

impl Actor {
    /// Convenience constructor from strings.
    pub fn new<I: Into<String>, R: Into<String>>(id: I, role: R) -> Self {
        Self {
            id: ActorId(id.into()),
            role: role.into(),
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.role == role
    }
}
