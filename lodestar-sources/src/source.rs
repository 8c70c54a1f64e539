//! The source capability set and the static registry.

use crate::deps::Dependency;
use crate::{EmbeddedSource, LocalSource, ModelsDevGitSource, ModelsDevHttpSource, ProviderApisSource};
use async_trait::async_trait;
use lodestar_core::{Catalog, Error, Provider, Result};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default per-request HTTP timeout at the leaf.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Stable identifiers for the known sources. The id doubles as the
/// reconciliation key in the authority table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum SourceId {
    Embedded,
    Local,
    Providers,
    ModelsDevGit,
    ModelsDevHttp,
}

impl SourceId {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::Embedded => "embedded",
            SourceId::Local => "local",
            SourceId::Providers => "providers",
            SourceId::ModelsDevGit => "models-dev-git",
            SourceId::ModelsDevHttp => "models-dev-http",
        }
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "embedded" => Ok(SourceId::Embedded),
            "local" => Ok(SourceId::Local),
            "providers" => Ok(SourceId::Providers),
            "models-dev-git" => Ok(SourceId::ModelsDevGit),
            "models-dev-http" => Ok(SourceId::ModelsDevHttp),
            other => Err(Error::Validation {
                field: "source".to_string(),
                value: other.to_string(),
                message: "unknown source id".to_string(),
            }),
        }
    }
}

/// The per-sync options a source sees during `fetch`.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Rebuild from live sources only; cached and baseline model sets do
    /// not carry over.
    pub fresh: bool,
    /// Restrict fetching to a single provider id.
    pub provider_filter: Option<String>,
    /// Override directory for the local source.
    pub sources_dir: Option<PathBuf>,
    pub http_timeout: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            fresh: false,
            provider_filter: None,
            sources_dir: None,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

/// Uniform capability set every data source implements.
///
/// Lifecycle per sync: `setup` once, `fetch` once (long-running, must honor
/// cancellation), `catalog` after fetch (may be partial when fetch errored),
/// `cleanup` always.
#[async_trait]
pub trait Source: Send + Sync {
    /// Stable identifier, used as the reconciliation key.
    fn id(&self) -> SourceId;

    /// Whether sync may proceed without this source.
    fn is_optional(&self) -> bool {
        true
    }

    /// External-tool declarations. Static; probed before fetch.
    fn dependencies(&self) -> Vec<Dependency> {
        Vec::new()
    }

    /// Receive the baseline provider configuration (endpoints, credential
    /// policies) before fetch.
    fn setup(&mut self, _providers: &[Provider]) -> Result<()> {
        Ok(())
    }

    /// Acquire data and populate the internal catalog fragment.
    async fn fetch(&mut self, ctx: CancellationToken, options: &FetchOptions) -> Result<()>;

    /// The fragment this source produced. Partial results are valid after a
    /// fetch error.
    fn catalog(&self) -> Result<Catalog>;

    /// Release temporary files and idle connections.
    fn cleanup(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Shared construction-time configuration for sources.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Cache directory for downloaded and cloned data.
    pub cache_dir: PathBuf,
    /// Directory the local source reads, when configured on the client.
    pub local_path: Option<PathBuf>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir().join("lodestar"),
            local_path: None,
        }
    }
}

/// Every known source id, in registry order.
pub fn all_source_ids() -> [SourceId; 5] {
    [
        SourceId::Embedded,
        SourceId::Local,
        SourceId::Providers,
        SourceId::ModelsDevGit,
        SourceId::ModelsDevHttp,
    ]
}

/// Construct the sources for `selected` ids. An empty selection means all.
pub fn build_sources(selected: &[SourceId], config: &SourceConfig) -> Vec<Box<dyn Source>> {
    let ids: Vec<SourceId> = if selected.is_empty() {
        all_source_ids().to_vec()
    } else {
        all_source_ids()
            .into_iter()
            .filter(|id| selected.contains(id))
            .collect()
    };
    ids.into_iter()
        .map(|id| -> Box<dyn Source> {
            match id {
                SourceId::Embedded => Box::new(EmbeddedSource::new()),
                SourceId::Local => Box::new(LocalSource::new(config.local_path.clone())),
                SourceId::Providers => Box::new(ProviderApisSource::new()),
                SourceId::ModelsDevGit => Box::new(ModelsDevGitSource::new(&config.cache_dir)),
                SourceId::ModelsDevHttp => Box::new(ModelsDevHttpSource::new(&config.cache_dir)),
            }
        })
        .collect()
}
