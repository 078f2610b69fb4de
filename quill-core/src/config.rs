//! # Quill Configuration
//!
//! A minimal string key/value store. Applications set values directly or
//! fold them in from the environment, then hand an immutable snapshot to the
//! components that need it (storage backend selection, post service options).
//!
//! ```rust
//! use quill_core::QuillConfig;
//! let mut config = QuillConfig::new();
//!
//! config.set("storage.backend", "local");
//! config.set("storage.maxBytes", "1048576");
//!
//! let snapshot = config.snapshot();
//! assert_eq!(snapshot.get("storage.backend"), Some("local"));
//! assert_eq!(snapshot.get_u64("storage.maxBytes"), Some(1_048_576));
//! ```
//!
//! ## Environment overrides
//!
//! `QUILL__STORAGE__BACKEND=s3` becomes `storage.backend = s3`. Segments are
//! lowercased and converted to camelCase on single underscores, so
//! `QUILL__STORAGE__MAX_BYTES` becomes `storage.maxBytes`.

use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Default, Clone)]
pub struct QuillConfig {
    values: HashMap<String, String>,
}

impl QuillConfig {
    /// Create an empty config store.
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Set a configuration key to a string value.
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Fold environment variables starting with `{prefix}__` into the store.
    pub fn load_env(&mut self, prefix: &str) {
        self.load_vars(prefix, std::env::vars());
    }

    /// Same as [`QuillConfig::load_env`] over an explicit variable list.
    pub fn load_vars<I>(&mut self, prefix: &str, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let marker = format!("{prefix}__");
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(&marker) {
                let normalized = stripped
                    .split("__")
                    .map(camel_segment)
                    .collect::<Vec<_>>()
                    .join(".");
                if !normalized.is_empty() {
                    self.values.insert(normalized, value);
                }
            }
        }
    }

    pub fn snapshot(&self) -> QuillConfigSnapshot {
        QuillConfigSnapshot::new(self.values.clone())
    }
}

fn camel_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut upper_next = false;
    for ch in segment.chars() {
        if ch == '_' {
            upper_next = !out.is_empty();
            continue;
        }
        if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.extend(ch.to_lowercase());
        }
    }
    out
}

#[derive(Debug, Clone, Default)]
pub struct QuillConfigSnapshot {
    map: HashMap<String, String>,
}

impl QuillConfigSnapshot {
    pub(crate) fn new(map: HashMap<String, String>) -> Self {
        Self { map }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|s| s.as_str())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    /// Trimmed, non-empty string value.
    pub fn get_non_empty(&self, key: &str) -> Option<String> {
        self.get(key)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.trim().parse::<u64>().ok())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.trim().parse::<bool>().ok())
    }

    pub fn get_duration_secs(&self, key: &str) -> Option<Duration> {
        self.get_u64(key).map(Duration::from_secs)
    }
}
