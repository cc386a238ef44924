use dashmap::DashMap;

use super::{LocalBackend, LocalTierKind};
use crate::core::error::Result;

/// Process-lifetime store; never fails.
pub struct MemoryStore {
    kind: LocalTierKind,
    entries: DashMap<String, String>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_kind(LocalTierKind::Memory)
    }

    /// Memory store reporting itself as another tier. Used to stand in for
    /// a real backend in tests.
    pub fn with_kind(kind: LocalTierKind) -> Self {
        Self {
            kind,
            entries: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl LocalBackend for MemoryStore {
    fn kind(&self) -> LocalTierKind {
        self.kind
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.entries.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_overwrites_and_remove_deletes() {
        let store = MemoryStore::new();
        store.set("tasks", "[]").unwrap();
        store.set("tasks", "[1]").unwrap();
        assert_eq!(store.get("tasks").unwrap().as_deref(), Some("[1]"));
        assert_eq!(store.len(), 1);

        store.remove("tasks").unwrap();
        assert_eq!(store.get("tasks").unwrap(), None);
        store.remove("tasks").unwrap();
    }

    #[test]
    fn clear_empties_store() {
        let store = MemoryStore::new();
        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();
        store.clear().unwrap();
        assert!(store.is_empty());
    }
}
