// Convenience re-exports: use dashstore::prelude::*;
pub use crate::core::{
    ConfigStore, InMemoryMetrics, Metric, MetricsSink, NoopMetrics, RemoteSettings,
    StorageFailure, StorageSettings,
};
pub use crate::local::{FileStore, LocalBackend, LocalTierKind, MemoryStore, SessionStore};
pub use crate::manager::{StorageManager, Tier};
pub use crate::remote::{ConnectionResolver, RemoteStore, RestClient};

// Re-export async_trait for RemoteStore impls
pub use async_trait::async_trait;
