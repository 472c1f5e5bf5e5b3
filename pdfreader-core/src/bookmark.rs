use std::sync::Arc;

use tracing::warn;

use crate::engine::{Fingerprint, PageIndex};
use crate::store::{KeyValueStore, StoreError};

pub const NO_BOOKMARK: PageIndex = 0;

/// Maps a document fingerprint to its bookmarked page.
#[derive(Clone)]
pub struct BookmarkStore {
    store: Arc<dyn KeyValueStore>,
}

impl BookmarkStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Unknown fingerprints, unreadable stores and unparsable values all
    /// read as [`NO_BOOKMARK`].
    pub fn load_bookmark(&self, fingerprint: &Fingerprint) -> PageIndex {
        match self.store.get(fingerprint.as_str()) {
            Ok(Some(raw)) => raw.trim().parse().unwrap_or_else(|err| {
                warn!(%fingerprint, value = %raw, %err, "ignoring malformed bookmark");
                NO_BOOKMARK
            }),
            Ok(None) => NO_BOOKMARK,
            Err(err) => {
                warn!(%fingerprint, ?err, "failed to read bookmark");
                NO_BOOKMARK
            }
        }
    }

    pub fn save_bookmark(
        &self,
        fingerprint: &Fingerprint,
        page: PageIndex,
    ) -> Result<(), StoreError> {
        self.store.set(fingerprint.as_str(), &page.to_string())
    }
}

/// Bookmark value after the user presses the toggle on `current_page`.
pub fn toggled_bookmark(bookmark: PageIndex, current_page: PageIndex) -> PageIndex {
    if bookmark == current_page {
        NO_BOOKMARK
    } else {
        current_page
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryKeyValueStore;

    fn store() -> (Arc<MemoryKeyValueStore>, BookmarkStore) {
        let backing = Arc::new(MemoryKeyValueStore::new());
        let bookmarks = BookmarkStore::new(backing.clone());
        (backing, bookmarks)
    }

    #[test]
    fn unknown_fingerprint_has_no_bookmark() {
        let (_, bookmarks) = store();
        let fp = Fingerprint::new("abc123");
        assert_eq!(bookmarks.load_bookmark(&fp), NO_BOOKMARK);

        bookmarks.save_bookmark(&fp, 12).unwrap();
        assert_eq!(bookmarks.load_bookmark(&fp), 12);
    }

    #[test]
    fn saved_pages_round_trip_including_zero() {
        let (backing, bookmarks) = store();
        let a = Fingerprint::new("a");
        let b = Fingerprint::new("b");
        bookmarks.save_bookmark(&a, 1).unwrap();
        bookmarks.save_bookmark(&b, 200).unwrap();
        bookmarks.save_bookmark(&a, 0).unwrap();

        assert_eq!(bookmarks.load_bookmark(&a), 0);
        assert_eq!(bookmarks.load_bookmark(&b), 200);
        assert_eq!(backing.get("b").unwrap().as_deref(), Some("200"));
    }

    #[test]
    fn malformed_values_read_as_no_bookmark() {
        let (backing, bookmarks) = store();
        backing.set("broken", "twelve").unwrap();
        assert_eq!(bookmarks.load_bookmark(&Fingerprint::new("broken")), NO_BOOKMARK);
    }

    #[test]
    fn toggle_clears_matching_page_and_sets_other() {
        assert_eq!(toggled_bookmark(7, 7), NO_BOOKMARK);
        assert_eq!(toggled_bookmark(7, 3), 3);
        assert_eq!(toggled_bookmark(NO_BOOKMARK, 1), 1);
    }
}
