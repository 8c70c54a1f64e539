//! Per-sync options.

use lodestar_core::{Error, Result};
use lodestar_sources::{FetchOptions, ResolutionMode, SourceId, DEFAULT_HTTP_TIMEOUT};
use std::path::PathBuf;
use std::time::Duration;

/// Options for one sync run. Construct with [`SyncOptions::default`] and
/// chain the builder methods.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Compute the changeset without mutating any state.
    pub dry_run: bool,
    /// Apply without operator confirmation.
    pub auto_approve: bool,
    /// Promote the first source error to pipeline failure, canceling the
    /// remaining fetches.
    pub fail_fast: bool,
    /// Whole-sync timeout.
    pub timeout: Option<Duration>,
    /// Restrict to these sources. Empty means all registered sources.
    pub sources: Vec<SourceId>,
    /// Restrict fetching to a single provider id.
    pub provider: Option<String>,
    /// Rebuild from live sources only, allowing removals.
    pub fresh: bool,
    /// Rewrite persisted files even when nothing changed.
    pub reformat: bool,
    /// Run declared auto-install commands for missing dependencies.
    pub auto_install_deps: bool,
    /// Never prompt; skip optional sources whose dependencies are missing.
    pub skip_dep_prompts: bool,
    /// Abort if any selected source ends up skipped.
    pub require_all_sources: bool,
    /// Directory for the local source, overriding the client default.
    pub sources_dir: Option<PathBuf>,
    /// Persist the applied catalog to this directory.
    pub persist_to: Option<PathBuf>,
}

impl SyncOptions {
    pub fn dry_run(mut self, value: bool) -> Self {
        self.dry_run = value;
        self
    }

    pub fn auto_approve(mut self, value: bool) -> Self {
        self.auto_approve = value;
        self
    }

    pub fn fail_fast(mut self, value: bool) -> Self {
        self.fail_fast = value;
        self
    }

    pub fn timeout(mut self, value: Duration) -> Self {
        self.timeout = Some(value);
        self
    }

    pub fn sources(mut self, ids: &[SourceId]) -> Self {
        self.sources = ids.to_vec();
        self
    }

    pub fn provider(mut self, id: impl Into<String>) -> Self {
        self.provider = Some(id.into());
        self
    }

    pub fn fresh(mut self, value: bool) -> Self {
        self.fresh = value;
        self
    }

    pub fn reformat(mut self, value: bool) -> Self {
        self.reformat = value;
        self
    }

    pub fn auto_install_deps(mut self, value: bool) -> Self {
        self.auto_install_deps = value;
        self
    }

    pub fn skip_dep_prompts(mut self, value: bool) -> Self {
        self.skip_dep_prompts = value;
        self
    }

    pub fn require_all_sources(mut self, value: bool) -> Self {
        self.require_all_sources = value;
        self
    }

    pub fn sources_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources_dir = Some(path.into());
        self
    }

    pub fn persist_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.persist_to = Some(path.into());
        self
    }

    /// Validate option combinations before the pipeline starts.
    pub fn validate(&self) -> Result<()> {
        if let Some(provider) = &self.provider {
            if provider.is_empty() {
                return Err(Error::Validation {
                    field: "provider".to_string(),
                    value: String::new(),
                    message: "provider filter cannot be empty".to_string(),
                });
            }
        }
        if let Some(timeout) = self.timeout {
            if timeout.is_zero() {
                return Err(Error::Validation {
                    field: "timeout".to_string(),
                    value: "0s".to_string(),
                    message: "timeout must be positive".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn resolution_mode(&self) -> ResolutionMode {
        if self.auto_install_deps {
            ResolutionMode::AutoInstall
        } else if self.skip_dep_prompts {
            ResolutionMode::SkipPrompts
        } else {
            ResolutionMode::Interactive
        }
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            fresh: self.fresh,
            provider_filter: self.provider.clone(),
            sources_dir: self.sources_dir.clone(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}
