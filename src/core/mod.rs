pub mod config;
pub mod error;
pub mod observability;

pub use config::{ConfigStore, Configurable, RemoteSettings, StorageSettings};
pub use error::{Result, StorageFailure};
pub use observability::{DurationStats, InMemoryMetrics, Metric, MetricsSink, NoopMetrics};
