use std::path::{Path, PathBuf};

use tracing::debug;
use uuid::Uuid;

use super::{FileStore, LocalBackend, LocalTierKind};
use crate::core::error::Result;

/// Session-scoped store: a uniquely named file deleted when the store drops.
pub struct SessionStore {
    inner: FileStore,
}

impl SessionStore {
    pub fn new(dir: impl AsRef<Path>, quota_bytes: usize) -> Self {
        let path = dir
            .as_ref()
            .join(format!("session-{}.json", Uuid::new_v4()));
        Self {
            inner: FileStore::with_kind(path, quota_bytes, LocalTierKind::Session),
        }
    }

    pub fn path(&self) -> &Path {
        self.inner.path()
    }
}

impl LocalBackend for SessionStore {
    fn kind(&self) -> LocalTierKind {
        LocalTierKind::Session
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key)
    }

    fn clear(&self) -> Result<()> {
        self.inner.clear()
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        let path: PathBuf = self.inner.path().to_path_buf();
        if std::fs::remove_file(&path).is_ok() {
            debug!(path = %path.display(), "Removed session store");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sessions_do_not_share_state() {
        let dir = tempfile::tempdir().unwrap();
        let first = SessionStore::new(dir.path(), 1024);
        let second = SessionStore::new(dir.path(), 1024);

        first.set("draft", "hello").unwrap();
        assert_eq!(first.get("draft").unwrap().as_deref(), Some("hello"));
        assert_eq!(second.get("draft").unwrap(), None);
        assert_ne!(first.path(), second.path());
    }

    #[test]
    fn drop_deletes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path(), 1024);
        store.set("k", "v").unwrap();
        let path = store.path().to_path_buf();
        assert!(path.exists());

        drop(store);
        assert!(!path.exists());
    }
}
