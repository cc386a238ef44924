//! Remote database tier.
//!
//! The remote side is a single table keyed by a unique text column `key`.
//! [`RemoteStore`] is the seam the manager talks to; [`RestClient`] is the
//! production implementation and [`ConnectionResolver`] owns its lifecycle.

use async_trait::async_trait;

use crate::core::error::Result;

mod resolver;
mod rest;

pub use resolver::{
    ClientFactory, ConnectionConfig, ConnectionResolver, Credentials, REMOTE_API_KEY_KEY,
    REMOTE_URL_KEY,
};
pub use rest::RestClient;

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Select the row for `key`. Zero rows is `Ok(None)`, not an error.
    async fn fetch(&self, key: &str) -> Result<Option<String>>;

    /// Insert or update the row for `key`.
    async fn upsert(&self, key: &str, value: &str) -> Result<()>;

    /// Cheap round trip proving the table is reachable with these credentials.
    async fn ping(&self) -> Result<()>;
}
