//! Named content retrieval.
//!
//! This is the collaborator surface handlers fetch bodies from; it sits
//! outside the commit path and exists mostly so decisions can be
//! validated against realistic resources.

use crate::error::GzipError;
use bytes::Bytes;
use std::collections::HashMap;

/// Loads named content bodies.
pub trait ContentStore: Send + Sync {
    /// Returns the bytes for `name`, or [`GzipError::NotFound`].
    fn load(&self, name: &str) -> Result<Bytes, GzipError>;
}

/// In-memory content store keyed by resource name.
#[derive(Default)]
pub struct MemoryStore {
    entries: HashMap<String, Bytes>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a resource under `name`.
    pub fn insert(&mut self, name: impl Into<String>, data: impl Into<Bytes>) {
        self.entries.insert(name.into(), data.into());
    }
}

impl ContentStore for MemoryStore {
    fn load(&self, name: &str) -> Result<Bytes, GzipError> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| GzipError::NotFound(name.to_owned()))
    }
}

/// Maps a resource name to its content type by extension.
pub fn content_type_for(name: &str) -> Option<&'static str> {
    match name.rsplit_once('.') {
        Some((_, "txt")) => Some("text/plain"),
        Some((_, "mp3")) => Some("audio/mpeg"),
        _ => None,
    }
}

/// Weak ETag for a named resource.
pub fn weak_etag(name: &str) -> String {
    format!("W/etag-{name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_and_miss() {
        let mut store = MemoryStore::new();
        store.insert("file.txt", &b"contents"[..]);

        assert_eq!(store.load("file.txt").unwrap(), Bytes::from("contents"));
        assert!(matches!(
            store.load("absent.txt"),
            Err(GzipError::NotFound(name)) if name == "absent.txt"
        ));
    }

    #[test]
    fn test_content_type_by_extension() {
        assert_eq!(content_type_for("notes.txt"), Some("text/plain"));
        assert_eq!(content_type_for("song.mp3"), Some("audio/mpeg"));
        assert_eq!(content_type_for("archive.bin"), None);
        assert_eq!(content_type_for("no-extension"), None);
    }

    #[test]
    fn test_weak_etag_format() {
        assert_eq!(weak_etag("file-small.txt"), "W/etag-file-small.txt");
    }
}
