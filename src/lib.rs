//! Dashstore
//!
//! Tiered key/value persistence for the dashboard: a configured remote table
//! first, then a local store chosen once by probing, with silent fallback.

#![forbid(unsafe_code)]

pub mod core;
pub mod local;
pub mod manager;
pub mod prelude;
pub mod remote;

pub use crate::core::{
    ConfigStore, Configurable, RemoteSettings, Result, StorageFailure, StorageSettings,
};
pub use local::{LocalBackend, LocalTierKind};
pub use manager::{ReadReceipt, StorageManager, StorageManagerBuilder, Tier, WriteReceipt};
pub use remote::{ConnectionConfig, ConnectionResolver, RemoteStore};
