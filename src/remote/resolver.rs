use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use super::{RemoteStore, RestClient};
use crate::core::config::RemoteSettings;
use crate::core::error::Result;
use crate::local::LocalBackend;

/// Persistent-store key holding the remote endpoint URL.
pub const REMOTE_URL_KEY: &str = "settings.remote_url";
/// Persistent-store key holding the remote access key.
pub const REMOTE_API_KEY_KEY: &str = "settings.remote_api_key";

/// Builds a remote handle from credentials.
pub type ClientFactory = Arc<dyn Fn(&Credentials) -> Result<Arc<dyn RemoteStore>> + Send + Sync>;

/// Endpoint and access key exactly as found in the persistent store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
}

/// Endpoint and access key of a configured remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub url: String,
    pub api_key: String,
}

impl ConnectionConfig {
    /// Both values present and non-blank.
    ///
    /// Values are trimmed first, so whitespace-only strings count as absent
    /// and stray whitespace around a pasted URL or key is ignored.
    pub fn credentials(&self) -> Option<Credentials> {
        let url = self.url.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let api_key = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())?;
        Some(Credentials {
            url: url.to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.credentials().is_some()
    }
}

/// Owns the lazily built remote handle.
///
/// Configuration is read from the persistent store on every call. The
/// handle built from it is cached until [`ConnectionResolver::invalidate`];
/// anything that rewrites the two configuration keys must invalidate,
/// otherwise the cached handle keeps talking to the old endpoint.
pub struct ConnectionResolver {
    config_source: Arc<dyn LocalBackend>,
    factory: ClientFactory,
    cached: Mutex<Option<Arc<dyn RemoteStore>>>,
}

impl ConnectionResolver {
    /// Resolver building [`RestClient`] handles.
    pub fn new(config_source: Arc<dyn LocalBackend>, settings: RemoteSettings) -> Self {
        let factory: ClientFactory =
            Arc::new(move |credentials: &Credentials| -> Result<Arc<dyn RemoteStore>> {
                let client = RestClient::new(credentials, &settings)?;
                Ok(Arc::new(client) as Arc<dyn RemoteStore>)
            });
        Self::with_factory(config_source, factory)
    }

    pub fn with_factory(config_source: Arc<dyn LocalBackend>, factory: ClientFactory) -> Self {
        Self {
            config_source,
            factory,
            cached: Mutex::new(None),
        }
    }

    /// Current configuration. Unreadable values count as absent.
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            url: self.read_setting(REMOTE_URL_KEY),
            api_key: self.read_setting(REMOTE_API_KEY_KEY),
        }
    }

    fn read_setting(&self, key: &str) -> Option<String> {
        match self.config_source.get(key) {
            Ok(value) => value,
            Err(e) => {
                debug!(key, error = %e, "Connection setting unreadable");
                None
            }
        }
    }

    pub fn configured(&self) -> bool {
        self.connection_config().is_configured()
    }

    /// The remote handle, or `None` when no remote is configured.
    ///
    /// Never contacts the remote; a bad endpoint surfaces on first use.
    pub fn resolve(&self) -> Result<Option<Arc<dyn RemoteStore>>> {
        let Some(credentials) = self.connection_config().credentials() else {
            return Ok(None);
        };

        let mut cached = self.cached.lock();
        if let Some(handle) = cached.as_ref() {
            return Ok(Some(handle.clone()));
        }

        let handle = (self.factory)(&credentials)?;
        info!(url = %credentials.url, "Built remote database client");
        *cached = Some(handle.clone());
        Ok(Some(handle))
    }

    /// Drop the cached handle so the next [`resolve`](Self::resolve) rebuilds it.
    pub fn invalidate(&self) {
        if self.cached.lock().take().is_some() {
            debug!("Invalidated remote database client");
        }
    }

    /// Store new connection settings and invalidate the cached handle.
    pub fn configure(&self, url: &str, api_key: &str) -> Result<()> {
        self.config_source.set(REMOTE_URL_KEY, url)?;
        self.config_source.set(REMOTE_API_KEY_KEY, api_key)?;
        self.invalidate();
        info!(url, "Remote database configured");
        Ok(())
    }

    /// Remove the connection settings and invalidate the cached handle.
    pub fn disconnect(&self) -> Result<()> {
        self.config_source.remove(REMOTE_URL_KEY)?;
        self.config_source.remove(REMOTE_API_KEY_KEY)?;
        self.invalidate();
        info!("Remote database disconnected");
        Ok(())
    }
}
