//! Local storage tiers and the one-time degradation ladder.
//!
//! A [`LocalBackend`] is a synchronous string key/value store. The manager
//! picks exactly one of them at construction by probing candidates in
//! priority order; the choice never changes afterwards.

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::core::error::{Result, StorageFailure};

mod file;
mod memory;
mod session;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use session::SessionStore;

/// Key written and deleted again to check that a backend accepts writes.
pub const PROBE_KEY: &str = "__dashstore_probe__";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LocalTierKind {
    /// Survives process restarts
    Persistent,
    /// Lives as long as the store handle
    Session,
    /// Lives as long as the process
    Memory,
}

impl LocalTierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Persistent => "persistent",
            Self::Session => "session",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for LocalTierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Synchronous key/value store used as the local fallback.
pub trait LocalBackend: Send + Sync {
    fn kind(&self) -> LocalTierKind;

    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    fn clear(&self) -> Result<()>;
}

/// Result of checking whether a backend accepts writes.
#[derive(Debug)]
pub enum Availability {
    Available,
    Unavailable(StorageFailure),
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }
}

/// Write and delete [`PROBE_KEY`]; any failure makes the backend unavailable.
pub fn probe(backend: &dyn LocalBackend) -> Availability {
    let outcome = backend
        .set(PROBE_KEY, PROBE_KEY)
        .and_then(|_| backend.remove(PROBE_KEY));

    match outcome {
        Ok(()) => Availability::Available,
        Err(e) => Availability::Unavailable(e),
    }
}

/// Pick the first available candidate, falling back to a fresh [`MemoryStore`].
pub fn select_local_tier(candidates: Vec<Arc<dyn LocalBackend>>) -> Arc<dyn LocalBackend> {
    for candidate in candidates {
        match probe(candidate.as_ref()) {
            Availability::Available => {
                info!(tier = %candidate.kind(), "Selected local storage tier");
                return candidate;
            }
            Availability::Unavailable(e) => {
                warn!(tier = %candidate.kind(), error = %e, "Local storage tier unavailable");
            }
        }
    }

    info!(tier = %LocalTierKind::Memory, "Selected local storage tier");
    Arc::new(MemoryStore::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Backend that rejects every operation.
    struct BrokenStore(LocalTierKind);

    impl LocalBackend for BrokenStore {
        fn kind(&self) -> LocalTierKind {
            self.0
        }

        fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(std::io::Error::other("broken").into())
        }

        fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(std::io::Error::other("broken").into())
        }

        fn remove(&self, _key: &str) -> Result<()> {
            Err(std::io::Error::other("broken").into())
        }

        fn clear(&self) -> Result<()> {
            Err(std::io::Error::other("broken").into())
        }
    }

    #[test]
    fn probe_leaves_no_sentinel_behind() {
        let store = MemoryStore::new();
        assert!(probe(&store).is_available());
        assert_eq!(store.get(PROBE_KEY).unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn probe_reports_failure() {
        let availability = probe(&BrokenStore(LocalTierKind::Persistent));
        assert!(matches!(
            availability,
            Availability::Unavailable(StorageFailure::Io(_))
        ));
    }

    #[test]
    fn selection_follows_priority_order() {
        let selected = select_local_tier(vec![
            Arc::new(BrokenStore(LocalTierKind::Persistent)) as Arc<dyn LocalBackend>,
            Arc::new(MemoryStore::with_kind(LocalTierKind::Session)),
        ]);
        assert_eq!(selected.kind(), LocalTierKind::Session);
    }

    #[test]
    fn selection_degrades_to_memory() {
        let selected = select_local_tier(vec![
            Arc::new(BrokenStore(LocalTierKind::Persistent)) as Arc<dyn LocalBackend>,
            Arc::new(BrokenStore(LocalTierKind::Session)),
        ]);
        assert_eq!(selected.kind(), LocalTierKind::Memory);
        selected.set("x", "1").unwrap();
        assert_eq!(selected.get("x").unwrap().as_deref(), Some("1"));
    }
}
