//! Tiered storage manager.
//!
//! Every read and write tries the remote table first when one is configured,
//! then the local tier selected once at construction. Writes the local tier
//! rejects are captured in memory so the process keeps the value. Callers of
//! the facade methods never see an error; [`StorageManager::put`] and
//! [`StorageManager::fetch`] return receipts saying which tier answered and
//! why earlier tiers were skipped.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::core::config::{ConfigStore, RemoteSettings, StorageSettings};
use crate::core::error::{Result, StorageFailure};
use crate::core::observability::{Metric, MetricsSink, NoopMetrics, elapsed_ms};
use crate::local::{FileStore, LocalBackend, LocalTierKind, SessionStore, select_local_tier};
use crate::remote::ConnectionResolver;

/// Where an operation was served from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tier {
    Remote,
    Local(LocalTierKind),
    /// In-memory capture of writes the local tier rejected
    Capture,
}

impl Tier {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Local(kind) => kind.as_str(),
            Self::Capture => "capture",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of one write.
#[derive(Debug)]
pub struct WriteReceipt {
    /// Tier that accepted the value
    pub tier: Tier,
    /// Why the remote was skipped after being configured
    pub remote_failure: Option<StorageFailure>,
    /// Why the local tier did not take the value
    pub local_failure: Option<StorageFailure>,
}

impl WriteReceipt {
    pub fn fell_back(&self) -> bool {
        self.remote_failure.is_some() || self.local_failure.is_some()
    }
}

/// Outcome of one read.
#[derive(Debug)]
pub struct ReadReceipt {
    pub value: Option<String>,
    /// Tier whose answer was used, including "not found" answers
    pub tier: Tier,
    pub remote_failure: Option<StorageFailure>,
    pub local_failure: Option<StorageFailure>,
}

impl ReadReceipt {
    pub fn fell_back(&self) -> bool {
        self.remote_failure.is_some() || self.local_failure.is_some()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Collects local candidates in priority order and selects one on `build`.
pub struct StorageManagerBuilder {
    resolver: Arc<ConnectionResolver>,
    candidates: Vec<Arc<dyn LocalBackend>>,
    metrics: Arc<dyn MetricsSink>,
}

impl StorageManagerBuilder {
    /// Add the next local candidate; earlier candidates win.
    pub fn local_candidate(mut self, backend: Arc<dyn LocalBackend>) -> Self {
        self.candidates.push(backend);
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Probe the candidates and fix the local tier for the manager's lifetime.
    pub fn build(self) -> StorageManager {
        let local = select_local_tier(self.candidates);
        self.metrics
            .incr_counter(Metric::TierSelected, &[("tier", local.kind().as_str())]);

        StorageManager {
            local,
            capture: DashMap::new(),
            resolver: self.resolver,
            metrics: self.metrics,
        }
    }
}

// ============================================================================
// Storage Manager
// ============================================================================

pub struct StorageManager {
    local: Arc<dyn LocalBackend>,
    capture: DashMap<String, String>,
    resolver: Arc<ConnectionResolver>,
    metrics: Arc<dyn MetricsSink>,
}

impl StorageManager {
    pub fn builder(resolver: Arc<ConnectionResolver>) -> StorageManagerBuilder {
        StorageManagerBuilder {
            resolver,
            candidates: Vec::new(),
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// Standard ladder: persistent file, then session file, then memory.
    ///
    /// The connection settings are read from the persistent file.
    pub fn open(storage: &StorageSettings, remote: RemoteSettings) -> Self {
        let persistent = Arc::new(FileStore::new(
            storage.persistent_path(),
            storage.quota_bytes,
        ));
        let session = Arc::new(SessionStore::new(
            storage.session_dir(),
            storage.quota_bytes,
        ));
        let resolver = Arc::new(ConnectionResolver::new(persistent.clone(), remote));

        Self::builder(resolver)
            .local_candidate(persistent)
            .local_candidate(session)
            .build()
    }

    /// [`open`](Self::open) with the `[storage]` and `[remote]` sections of `config`.
    pub fn from_config(config: &ConfigStore) -> anyhow::Result<Self> {
        let storage: StorageSettings = config.get()?;
        let remote: RemoteSettings = config.get()?;
        Ok(Self::open(&storage, remote))
    }

    /// [`from_config`](Self::from_config) over layered files, later ones winning.
    ///
    /// Missing files are skipped; see [`ConfigStore::layered`].
    pub fn from_config_files<P: AsRef<Path>>(
        paths: impl IntoIterator<Item = P>,
    ) -> anyhow::Result<Self> {
        Self::from_config(&ConfigStore::layered(paths)?)
    }

    pub fn active_tier(&self) -> LocalTierKind {
        self.local.kind()
    }

    pub fn resolver(&self) -> &Arc<ConnectionResolver> {
        &self.resolver
    }

    /// Write `value`, reporting which tier took it.
    ///
    /// Only an empty key is an error; every tier failure is absorbed.
    pub async fn put(&self, key: &str, value: &str) -> Result<WriteReceipt> {
        if key.is_empty() {
            return Err(StorageFailure::InvalidKey);
        }

        let remote_failure = match self.resolver.resolve() {
            Ok(Some(remote)) => {
                let start = Instant::now();
                let outcome = remote.upsert(key, value).await;
                self.metrics.observe_duration_ms(
                    Metric::RemoteDuration,
                    elapsed_ms(start),
                    &[("op", "set")],
                );

                match outcome {
                    Ok(()) => {
                        debug!(key, "Stored value in remote tier");
                        self.capture.remove(key);
                        self.record(Metric::Writes, Tier::Remote);
                        return Ok(WriteReceipt {
                            tier: Tier::Remote,
                            remote_failure: None,
                            local_failure: None,
                        });
                    }
                    Err(e) => Some(self.remote_fallback("set", key, e)),
                }
            }
            Ok(None) => None,
            Err(e) => Some(self.remote_fallback("set", key, e)),
        };

        let receipt = match self.local.set(key, value) {
            Ok(()) => {
                self.capture.remove(key);
                WriteReceipt {
                    tier: Tier::Local(self.local.kind()),
                    remote_failure,
                    local_failure: None,
                }
            }
            Err(e) => {
                warn!(
                    key,
                    tier = %self.local.kind(),
                    error = %e,
                    "Local write failed, keeping value in memory"
                );
                self.fallback("set", self.local.kind().as_str());
                self.capture.insert(key.to_string(), value.to_string());
                WriteReceipt {
                    tier: Tier::Capture,
                    remote_failure,
                    local_failure: Some(e),
                }
            }
        };

        self.record(Metric::Writes, receipt.tier);
        Ok(receipt)
    }

    /// Read the value for `key`, reporting which tier answered.
    ///
    /// A remote "no row" answer is final; only remote errors fall back.
    /// Below the remote, a captured write is served before the local tier.
    pub async fn fetch(&self, key: &str) -> Result<ReadReceipt> {
        if key.is_empty() {
            return Err(StorageFailure::InvalidKey);
        }

        let remote_failure = match self.resolver.resolve() {
            Ok(Some(remote)) => {
                let start = Instant::now();
                let outcome = remote.fetch(key).await;
                self.metrics.observe_duration_ms(
                    Metric::RemoteDuration,
                    elapsed_ms(start),
                    &[("op", "get")],
                );

                match outcome {
                    Ok(value) => {
                        self.record(Metric::Reads, Tier::Remote);
                        return Ok(ReadReceipt {
                            value,
                            tier: Tier::Remote,
                            remote_failure: None,
                            local_failure: None,
                        });
                    }
                    Err(e) => Some(self.remote_fallback("get", key, e)),
                }
            }
            Ok(None) => None,
            Err(e) => Some(self.remote_fallback("get", key, e)),
        };

        // A captured value is newer than whatever the local tier refused to replace.
        let captured = self.capture.get(key).map(|entry| entry.value().clone());
        if captured.is_some() {
            self.record(Metric::Reads, Tier::Capture);
            return Ok(ReadReceipt {
                value: captured,
                tier: Tier::Capture,
                remote_failure,
                local_failure: None,
            });
        }

        let (value, local_failure) = match self.local.get(key) {
            Ok(value) => (value, None),
            Err(e) => {
                warn!(key, tier = %self.local.kind(), error = %e, "Local read failed");
                self.fallback("get", self.local.kind().as_str());
                (None, Some(e))
            }
        };

        let tier = Tier::Local(self.local.kind());
        self.record(Metric::Reads, tier);
        Ok(ReadReceipt {
            value,
            tier,
            remote_failure,
            local_failure,
        })
    }

    /// Store text under `key`. `false` only for an empty key.
    pub async fn set_item(&self, key: &str, value: &str) -> bool {
        match self.put(key, value).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Rejected write");
                false
            }
        }
    }

    pub async fn get_item(&self, key: &str) -> Option<String> {
        self.fetch(key).await.ok().and_then(|receipt| receipt.value)
    }

    /// Serialize `value` to JSON and store it. `false` if it cannot be serialized.
    pub async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        match serde_json::to_string(value) {
            Ok(text) => self.set_item(key, &text).await,
            Err(e) => {
                warn!(key, error = %e, "Value not serializable");
                false
            }
        }
    }

    /// Stored JSON parsed as `T`; unparseable text reads as absent.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let text = self.get_item(key).await?;
        match serde_json::from_str(&text) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(key, error = %e, "Stored value is not valid JSON for the requested type");
                None
            }
        }
    }

    /// Delete `key` from the local tier. The remote row is left alone.
    pub fn remove_item(&self, key: &str) {
        if let Err(e) = self.local.remove(key) {
            warn!(key, tier = %self.local.kind(), error = %e, "Local remove failed");
        }
        self.capture.remove(key);
    }

    /// Empty the local tier. The remote table is left alone.
    pub fn clear(&self) {
        if let Err(e) = self.local.clear() {
            warn!(tier = %self.local.kind(), error = %e, "Local clear failed");
        }
        self.capture.clear();
    }

    /// Round trip to the remote table. Fails with `NotConfigured` when no remote is set up.
    pub async fn test_connection(&self) -> Result<()> {
        let remote = self
            .resolver
            .resolve()?
            .ok_or(StorageFailure::NotConfigured)?;
        remote.ping().await
    }

    fn remote_fallback(&self, op: &'static str, key: &str, e: StorageFailure) -> StorageFailure {
        warn!(
            key,
            op,
            error = %e,
            tier = %self.local.kind(),
            "Remote storage failed, falling back to local tier"
        );
        self.fallback(op, "remote");
        self.metrics
            .incr_counter(Metric::RemoteErrors, &[("kind", e.label())]);
        e
    }

    fn fallback(&self, op: &str, from: &str) {
        self.metrics
            .incr_counter(Metric::Fallbacks, &[("op", op), ("from", from)]);
    }

    fn record(&self, metric: Metric, tier: Tier) {
        self.metrics.incr_counter(metric, &[("tier", tier.label())]);
    }
}
