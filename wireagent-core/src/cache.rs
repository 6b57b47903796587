//! On-disk document cache.
//!
//! Every document fetched from the fabric is persisted under the lib
//! directory as `{kind}.{incarnation}.xml` (manifests as
//! `{extension}.{incarnation}.manifest.xml`). Documents are immutable for a
//! given incarnation, so a restarted agent serves an unchanged goal state
//! from disk instead of re-fetching it; a new incarnation lands on new file
//! names and never collides with stale entries.

use std::fs;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::types::{DocumentKind, ProtocolError, Result};

pub struct DocumentCache {
    root: PathBuf,
}

impl DocumentCache {
    /// Opens the cache directory, creating it if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(DocumentCache { root })
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    fn entry_path(&self, kind: &DocumentKind, incarnation: u32) -> PathBuf {
        self.root.join(kind.cache_file_name(incarnation))
    }

    /// Returns the cached bytes, or `None` on a miss. A miss is not an
    /// error; the caller falls back to the network.
    pub fn get(&self, kind: &DocumentKind, incarnation: u32) -> Option<Vec<u8>> {
        fs::read(self.entry_path(kind, incarnation)).ok()
    }

    /// Stores a document. Re-putting identical content is a no-op.
    ///
    /// If the entry already exists with different content, the entry is
    /// removed and `CacheCorruption` is returned; the caller still holds the
    /// bytes it just fetched and re-puts them.
    pub fn put(&self, kind: &DocumentKind, incarnation: u32, bytes: &[u8]) -> Result<()> {
        let path = self.entry_path(kind, incarnation);
        if let Ok(existing) = fs::read(&path) {
            if existing == bytes {
                debug!(kind = %kind, incarnation, "cache entry already current");
                return Ok(());
            }
            warn!(
                kind = %kind,
                incarnation,
                "cache entry differs from fetched content, invalidating"
            );
            fs::remove_file(&path)?;
            return Err(ProtocolError::CacheCorruption {
                kind: kind.clone(),
                incarnation,
            });
        }
        fs::write(&path, bytes)?;
        Ok(())
    }

    /// Drops an entry, e.g. after the cached bytes failed to parse. Absent
    /// entries are ignored.
    pub fn invalidate(&self, kind: &DocumentKind, incarnation: u32) {
        let path = self.entry_path(kind, incarnation);
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(kind = %kind, incarnation, error = %e, "failed to drop cache entry");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn miss_then_round_trip() {
        let dir = tempdir().unwrap();
        let cache = DocumentCache::open(dir.path()).unwrap();
        let kind = DocumentKind::GoalState;

        assert!(cache.get(&kind, 1).is_none());
        cache.put(&kind, 1, b"<GoalState/>").unwrap();
        assert_eq!(cache.get(&kind, 1).unwrap(), b"<GoalState/>");
    }

    #[test]
    fn identical_put_is_idempotent() {
        let dir = tempdir().unwrap();
        let cache = DocumentCache::open(dir.path()).unwrap();
        let kind = DocumentKind::SharedConfig;

        cache.put(&kind, 3, b"<SharedConfig/>").unwrap();
        cache.put(&kind, 3, b"<SharedConfig/>").unwrap();
        assert_eq!(cache.get(&kind, 3).unwrap(), b"<SharedConfig/>");
    }

    #[test]
    fn conflicting_put_invalidates_and_reports_corruption() {
        let dir = tempdir().unwrap();
        let cache = DocumentCache::open(dir.path()).unwrap();
        let kind = DocumentKind::ExtensionsConfig;

        cache.put(&kind, 2, b"first").unwrap();
        let err = cache.put(&kind, 2, b"second").unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::CacheCorruption {
                kind: DocumentKind::ExtensionsConfig,
                incarnation: 2
            }
        ));

        // Entry is gone; the fresh bytes can now be stored.
        assert!(cache.get(&kind, 2).is_none());
        cache.put(&kind, 2, b"second").unwrap();
        assert_eq!(cache.get(&kind, 2).unwrap(), b"second");
    }

    #[test]
    fn incarnations_key_separate_entries() {
        let dir = tempdir().unwrap();
        let cache = DocumentCache::open(dir.path()).unwrap();
        let kind = DocumentKind::Certificates;

        cache.put(&kind, 1, b"one").unwrap();
        cache.put(&kind, 2, b"two").unwrap();
        assert_eq!(cache.get(&kind, 1).unwrap(), b"one");
        assert_eq!(cache.get(&kind, 2).unwrap(), b"two");
    }

    #[test]
    fn manifests_are_keyed_per_extension() {
        let dir = tempdir().unwrap();
        let cache = DocumentCache::open(dir.path()).unwrap();
        let walinux = DocumentKind::Manifest("OSTCExtensions.ExampleHandlerLinux".to_string());
        let other = DocumentKind::Manifest("Microsoft.OSTCExtensions.VMAccess".to_string());

        cache.put(&walinux, 1, b"<a/>").unwrap();
        cache.put(&other, 1, b"<b/>").unwrap();
        assert_eq!(cache.get(&walinux, 1).unwrap(), b"<a/>");
        assert_eq!(cache.get(&other, 1).unwrap(), b"<b/>");

        let name = dir
            .path()
            .join("OSTCExtensions.ExampleHandlerLinux.1.manifest.xml");
        assert!(name.exists());
    }

    #[test]
    fn invalidate_is_quiet_for_missing_entries() {
        let dir = tempdir().unwrap();
        let cache = DocumentCache::open(dir.path()).unwrap();
        cache.invalidate(&DocumentKind::GoalState, 9);

        cache.put(&DocumentKind::GoalState, 9, b"x").unwrap();
        cache.invalidate(&DocumentKind::GoalState, 9);
        assert!(cache.get(&DocumentKind::GoalState, 9).is_none());
    }
}
