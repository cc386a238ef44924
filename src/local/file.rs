use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::{LocalBackend, LocalTierKind};
use crate::core::error::{Result, StorageFailure};

type Entries = BTreeMap<String, String>;

/// Persistent store backed by one JSON object file.
///
/// Reads go to disk every time; nothing is cached in process. Writes are
/// read-modify-write cycles serialized by `write_lock` and land through a
/// temporary file plus rename, so a reader never sees a half-written file.
pub struct FileStore {
    path: PathBuf,
    quota_bytes: usize,
    kind: LocalTierKind,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// No IO happens until the first operation.
    pub fn new(path: impl Into<PathBuf>, quota_bytes: usize) -> Self {
        Self::with_kind(path, quota_bytes, LocalTierKind::Persistent)
    }

    pub(super) fn with_kind(path: impl Into<PathBuf>, quota_bytes: usize, kind: LocalTierKind) -> Self {
        Self {
            path: path.into(),
            quota_bytes,
            kind,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn quota_bytes(&self) -> usize {
        self.quota_bytes
    }

    fn load(&self) -> Result<Entries> {
        match fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(Entries::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Entries::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn persist(&self, entries: &Entries) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string(entries)?;
        // Unique per write: other handles or processes may share this path.
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(format!(".{}.tmp", Uuid::new_v4().simple()));
        let tmp = PathBuf::from(tmp);

        let written = fs::write(&tmp, content).and_then(|()| fs::rename(&tmp, &self.path));
        if written.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        Ok(written?)
    }
}

fn usage(entries: &Entries) -> usize {
    entries.iter().map(|(k, v)| k.len() + v.len()).sum()
}

impl LocalBackend for FileStore {
    fn kind(&self) -> LocalTierKind {
        self.kind
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut entries = self.load()?;
        entries.insert(key.to_string(), value.to_string());

        let needed = usage(&entries);
        if needed > self.quota_bytes {
            return Err(StorageFailure::QuotaExceeded {
                key: key.to_string(),
                needed,
                quota: self.quota_bytes,
            });
        }

        self.persist(&entries)?;
        debug!(path = %self.path.display(), key, "Stored local value");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut entries = self.load()?;
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_survive_a_new_handle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.json");

        FileStore::new(&path, 1024).set("theme", "dark").unwrap();

        let reopened = FileStore::new(&path, 1024);
        assert_eq!(reopened.get("theme").unwrap().as_deref(), Some("dark"));
        assert_eq!(reopened.kind(), LocalTierKind::Persistent);
    }

    #[test]
    fn reads_see_external_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.json");
        let store = FileStore::new(&path, 1024);
        store.set("a", "1").unwrap();

        std::fs::write(&path, r#"{"a":"2"}"#).unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested/dir/local.json"), 1024);
        assert_eq!(store.get("anything").unwrap(), None);
        store.remove("anything").unwrap();
        store.clear().unwrap();

        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn quota_rejects_write_and_keeps_old_contents() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("local.json"), 16);
        store.set("k", "small").unwrap();

        let err = store.set("big", "0123456789abcdef").unwrap_err();
        assert!(matches!(err, StorageFailure::QuotaExceeded { quota: 16, .. }));
        assert_eq!(store.get("k").unwrap().as_deref(), Some("small"));
        assert_eq!(store.get("big").unwrap(), None);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.json");
        std::fs::write(&path, "not json").unwrap();

        let store = FileStore::new(&path, 1024);
        assert!(matches!(
            store.get("k").unwrap_err(),
            StorageFailure::Serialization(_)
        ));
    }

    #[test]
    fn unwritable_location_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();

        let store = FileStore::new(blocker.join("local.json"), 1024);
        assert!(matches!(store.set("k", "v").unwrap_err(), StorageFailure::Io(_)));
    }

    #[test]
    fn handles_sharing_a_path_write_concurrently() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.json");

        let writers: Vec<_> = (0..4)
            .map(|n| {
                let store = FileStore::new(&path, 1 << 20);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        store.set(&format!("w{n}.{i}"), "v").unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        // Last writer wins across handles, but the file stays whole.
        let store = FileStore::new(&path, 1 << 20);
        assert!(store.get("w0.0").is_ok());
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("local.json")]);
    }

    #[test]
    fn clear_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.json");
        let store = FileStore::new(&path, 1024);
        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();

        store.clear().unwrap();
        assert!(!path.exists());
        assert_eq!(store.get("a").unwrap(), None);
    }
}
