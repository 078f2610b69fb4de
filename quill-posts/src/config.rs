use quill_blob::DEFAULT_NAMESPACE;
use quill_core::QuillConfigSnapshot;

use crate::auth::DEFAULT_ADMIN_ROLE;

pub const DEFAULT_FALLBACK_ASSET: &str = "/fallback.jpg";

/// Settings of the post service
#[derive(Debug, Clone)]
pub struct PostsConfig {
    /// Key prefix under which post images are stored
    pub namespace: String,

    /// Image shown for posts without an asset
    pub fallback_asset: String,

    /// Role allowed to mutate posts
    pub admin_role: String,

    /// Serialize updates and deletes per post id
    pub serialize_mutations: bool,
}

impl Default for PostsConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            fallback_asset: DEFAULT_FALLBACK_ASSET.to_string(),
            admin_role: DEFAULT_ADMIN_ROLE.to_string(),
            serialize_mutations: false,
        }
    }
}

impl PostsConfig {
    /// Read `posts.*` keys (and `storage.namespace`).
    pub fn from_config(config: &QuillConfigSnapshot) -> Self {
        let defaults = Self::default();
        Self {
            namespace: config.get_non_empty("storage.namespace").unwrap_or(defaults.namespace),
            fallback_asset: config
                .get_non_empty("posts.fallbackAsset")
                .unwrap_or(defaults.fallback_asset),
            admin_role: config.get_non_empty("posts.adminRole").unwrap_or(defaults.admin_role),
            serialize_mutations: config
                .get_bool("posts.serializeMutations")
                .unwrap_or(defaults.serialize_mutations),
        }
    }

    pub fn with_serialized_mutations(mut self, enabled: bool) -> Self {
        self.serialize_mutations = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::QuillConfig;

    #[test]
    fn reads_posts_keys() {
        let defaults = PostsConfig::from_config(&QuillConfig::new().snapshot());
        assert_eq!(defaults.namespace, "blogs");
        assert_eq!(defaults.fallback_asset, "/fallback.jpg");
        assert_eq!(defaults.admin_role, "ADMIN");
        assert!(!defaults.serialize_mutations);

        let mut config = QuillConfig::new();
        config.set("posts.adminRole", "EDITOR");
        config.set("posts.serializeMutations", "true");
        config.set("posts.fallbackAsset", "/img/none.png");
        let posts = PostsConfig::from_config(&config.snapshot());
        assert_eq!(posts.admin_role, "EDITOR");
        assert!(posts.serialize_mutations);
        assert_eq!(posts.fallback_asset, "/img/none.png");
    }
}
