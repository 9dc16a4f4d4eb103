use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;

/// Image bytes fetched during extraction, keyed by source reference.
///
/// Cloning shares the underlying map, so the extractor and the document
/// backend of one export see the same entries.
#[derive(Clone, Default)]
pub struct ImageStore {
    inner: Arc<Mutex<HashMap<String, Bytes>>>,
}

impl ImageStore {
    pub fn insert(&self, src: impl Into<String>, data: Bytes) {
        self.lock().insert(src.into(), data);
    }

    pub fn get(&self, src: &str) -> Option<Bytes> {
        self.lock().get(src).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Bytes>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_entries() {
        let store = ImageStore::default();
        let shared = store.clone();
        store.insert("a.jpg", Bytes::from_static(b"abc"));
        assert_eq!(shared.get("a.jpg").as_deref(), Some(&b"abc"[..]));
        assert_eq!(shared.len(), 1);
        assert!(shared.get("missing").is_none());
    }
}
