//! Client construction options.

use futures_util::future::BoxFuture;
use lodestar_core::{Catalog, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A caller-supplied replacement for the default pipeline. Receives the
/// update's cancellation context and returns the catalog to diff against
/// the current one and swap in.
pub type UpdateFn =
    Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, Result<Catalog>> + Send + Sync>;

/// Options applied at [`crate::Client::new`].
#[derive(Clone)]
pub struct ClientOptions {
    /// Start the periodic update loop at construction.
    pub auto_updates: bool,
    pub auto_update_interval: Duration,
    /// Load the initial catalog (and the local source) from this directory
    /// instead of the embedded baseline.
    pub local_path: Option<PathBuf>,
    /// Fetch a pre-reconciled catalog from a peer instead of running local
    /// sources.
    pub remote_url: Option<String>,
    pub remote_api_key: Option<String>,
    /// With a remote configured, never fall back to local sources.
    pub remote_only: bool,
    /// Cache directory handed to the sources.
    pub cache_dir: PathBuf,
    /// Replace the default pipeline entirely.
    pub update_fn: Option<UpdateFn>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            auto_updates: true,
            auto_update_interval: Duration::from_secs(60 * 60),
            local_path: None,
            remote_url: None,
            remote_api_key: None,
            remote_only: false,
            cache_dir: std::env::temp_dir().join("lodestar"),
            update_fn: None,
        }
    }
}

impl std::fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientOptions")
            .field("auto_updates", &self.auto_updates)
            .field("auto_update_interval", &self.auto_update_interval)
            .field("local_path", &self.local_path)
            .field("remote_url", &self.remote_url)
            .field("remote_only", &self.remote_only)
            .field("update_fn", &self.update_fn.is_some())
            .finish()
    }
}

impl ClientOptions {
    pub fn auto_updates(mut self, enabled: bool) -> Self {
        self.auto_updates = enabled;
        self
    }

    pub fn auto_update_interval(mut self, interval: Duration) -> Self {
        self.auto_update_interval = interval;
        self
    }

    pub fn auto_update_func(mut self, f: UpdateFn) -> Self {
        self.update_fn = Some(f);
        self
    }

    pub fn local_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_path = Some(path.into());
        self
    }

    /// Use the compiled-in baseline for the initial catalog (the default).
    pub fn embedded_catalog(mut self) -> Self {
        self.local_path = None;
        self
    }

    pub fn remote_server(mut self, url: impl Into<String>, api_key: Option<String>) -> Self {
        self.remote_url = Some(url.into());
        self.remote_api_key = api_key;
        self
    }

    pub fn remote_server_only(mut self) -> Self {
        self.remote_only = true;
        self
    }

    pub fn cache_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_dir = path.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_auto_updates_hourly() {
        let options = ClientOptions::default();
        assert!(options.auto_updates);
        assert_eq!(options.auto_update_interval, Duration::from_secs(3600));
        assert!(options.local_path.is_none());
    }

    #[test]
    fn remote_server_builder_records_credentials() {
        let options = ClientOptions::default()
            .remote_server("https://peer.example", Some("key".to_string()))
            .remote_server_only();
        assert_eq!(options.remote_url.as_deref(), Some("https://peer.example"));
        assert!(options.remote_only);
    }
}
