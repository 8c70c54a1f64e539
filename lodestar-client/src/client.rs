//! The client façade.

use crate::hooks::HookRegistry;
use crate::options::ClientOptions;
use crate::remote::fetch_remote_catalog;
use crate::{ModelHook, UpdateHook};
use lodestar_core::{Catalog, Error, Result};
use lodestar_sources::{SourceConfig, DEFAULT_HTTP_TIMEOUT};
use lodestar_sync::{diff, run_sync, Changeset, SyncOptions, SyncResult};
use once_cell::sync::OnceCell;
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{watch, Mutex as TokioMutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Timeout applied to each auto-update tick.
const TICK_TIMEOUT: Duration = Duration::from_secs(5 * 60);

struct Inner {
    catalog: RwLock<Catalog>,
    options: ClientOptions,
    source_config: SourceConfig,
    hooks: HookRegistry,
    /// Serializes syncs; a contending caller coalesces onto the holder's
    /// result instead of running the pipeline again.
    sync_slot: TokioMutex<()>,
    last_changeset: RwLock<Option<Changeset>>,
    shutdown: watch::Sender<bool>,
    ticker: StdMutex<Option<JoinHandle<()>>>,
    update_token: StdMutex<CancellationToken>,
}

/// Thread-safe owner of the authoritative catalog.
///
/// Cloning is cheap and shares the underlying state.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

impl Client {
    /// Create a client: load the baseline (embedded, or the configured
    /// local directory), then start the auto-update loop unless disabled.
    ///
    /// Must run inside a tokio runtime when auto-updates are enabled.
    pub fn new(options: ClientOptions) -> Result<Self> {
        if options.remote_only && options.remote_url.is_none() {
            return Err(Error::Config {
                component: "client".to_string(),
                message: "remote-only requires a remote server url".to_string(),
            });
        }
        let catalog = match &options.local_path {
            Some(path) => lodestar_store::load_dir(path)?,
            None => lodestar_store::embedded_catalog()?,
        };
        let source_config = SourceConfig {
            cache_dir: options.cache_dir.clone(),
            local_path: options.local_path.clone(),
        };
        let (shutdown, _) = watch::channel(false);
        let auto_updates = options.auto_updates;
        let client = Self {
            inner: Arc::new(Inner {
                catalog: RwLock::new(catalog),
                options,
                source_config,
                hooks: HookRegistry::default(),
                sync_slot: TokioMutex::new(()),
                last_changeset: RwLock::new(None),
                shutdown,
                ticker: StdMutex::new(None),
                update_token: StdMutex::new(CancellationToken::new()),
            }),
        };
        if auto_updates {
            client.auto_updates_on();
        }
        Ok(client)
    }

    /// Deep copy of the current catalog.
    pub async fn catalog(&self) -> Result<Catalog> {
        self.inner.catalog.read().await.copy()
    }

    /// Run the pipeline once and return the changeset. A sync arriving
    /// while another is in flight waits and returns that sync's result.
    pub async fn sync(&self, ctx: CancellationToken, options: SyncOptions) -> Result<Changeset> {
        self.inner.sync_inner(ctx, &options).await
    }

    /// The timer's form of sync: auto-approved, never a dry run, never
    /// interactive.
    pub async fn update(&self, ctx: CancellationToken) -> Result<Changeset> {
        let options = SyncOptions::default()
            .auto_approve(true)
            .skip_dep_prompts(true);
        self.sync(ctx, options).await
    }

    pub fn on_model_added(&self, hook: ModelHook) {
        self.inner.hooks.on_added(hook);
    }

    pub fn on_model_updated(&self, hook: UpdateHook) {
        self.inner.hooks.on_updated(hook);
    }

    pub fn on_model_removed(&self, hook: ModelHook) {
        self.inner.hooks.on_removed(hook);
    }

    /// Persist the current catalog to a directory.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let copy = self.catalog().await?;
        lodestar_store::save_dir(&copy, path)
    }

    /// Start the periodic update loop. Idempotent.
    pub fn auto_updates_on(&self) {
        let mut slot = self.inner.ticker.lock().expect("ticker slot lock");
        if slot.is_some() {
            return;
        }
        let _ = self.inner.shutdown.send(false);
        let token = CancellationToken::new();
        *self.inner.update_token.lock().expect("update token lock") = token.clone();

        let inner = Arc::clone(&self.inner);
        let mut shutdown_rx = self.inner.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(inner.options.auto_update_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // consume the immediate first tick; updates start one interval in
            ticker.tick().await;
            tracing::info!(
                interval_secs = inner.options.auto_update_interval.as_secs(),
                "auto-update loop started"
            );
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        // Ticks landing mid-sync are dropped, not queued.
                        if inner.sync_slot.try_lock().is_err() {
                            tracing::debug!("sync in progress; dropping auto-update tick");
                            continue;
                        }
                        let ctx = token.child_token();
                        let options = SyncOptions::default()
                            .auto_approve(true)
                            .skip_dep_prompts(true)
                            .timeout(TICK_TIMEOUT);
                        match inner.sync_inner(ctx, &options).await {
                            Ok(changeset) if !changeset.is_empty() => {
                                let summary = changeset.summary();
                                tracing::info!(
                                    added = summary.models_added,
                                    updated = summary.models_updated,
                                    removed = summary.models_removed,
                                    "auto-update applied"
                                );
                            }
                            Ok(_) => tracing::debug!("auto-update found no changes"),
                            Err(err) => tracing::warn!(error = %err, "auto-update failed"),
                        }
                    }
                }
            }
            tracing::info!("auto-update loop stopped");
        });
        *slot = Some(handle);
    }

    /// Stop the ticker and cancel the update context; an in-flight sync
    /// observes cancellation and returns without touching the catalog.
    pub fn auto_updates_off(&self) {
        let _ = self.inner.shutdown.send(true);
        self.inner
            .update_token
            .lock()
            .expect("update token lock")
            .cancel();
        drop(self.inner.ticker.lock().expect("ticker slot lock").take());
    }
}

impl Inner {
    async fn sync_inner(&self, ctx: CancellationToken, options: &SyncOptions) -> Result<Changeset> {
        match self.sync_slot.try_lock() {
            Ok(_guard) => {
                let result = self.sync_locked(ctx, options).await;
                if let Ok(changeset) = &result {
                    *self.last_changeset.write().await = Some(changeset.clone());
                }
                result
            }
            Err(_) => {
                tracing::debug!("sync already in flight; coalescing onto its result");
                let _guard = self.sync_slot.lock().await;
                Ok(self
                    .last_changeset
                    .read()
                    .await
                    .clone()
                    .unwrap_or_default())
            }
        }
    }

    async fn sync_locked(&self, ctx: CancellationToken, options: &SyncOptions) -> Result<Changeset> {
        let snapshot = self.catalog.read().await.copy()?;

        let result = if let Some(url) = &self.options.remote_url {
            let merged = fetch_remote_catalog(
                url,
                self.options.remote_api_key.as_deref(),
                &ctx,
                DEFAULT_HTTP_TIMEOUT,
            )
            .await?;
            let changeset = diff(&snapshot, &merged)?;
            SyncResult {
                changeset,
                merged,
                provenance: Vec::new(),
            }
        } else if let Some(update_fn) = &self.options.update_fn {
            let merged = update_fn(ctx.clone()).await?;
            let changeset = diff(&snapshot, &merged)?;
            SyncResult {
                changeset,
                merged,
                provenance: Vec::new(),
            }
        } else {
            let mut options = options.clone();
            if options.sources_dir.is_none() {
                options.sources_dir = self.options.local_path.clone();
            }
            run_sync(&snapshot, &options, ctx.clone(), &self.source_config).await?
        };

        let SyncResult {
            changeset, merged, ..
        } = result;

        if changeset.is_empty() {
            if options.reformat {
                if let Some(path) = &options.persist_to {
                    lodestar_store::save_dir(&merged, path)?;
                }
            }
            return Ok(changeset);
        }
        if options.dry_run {
            return Ok(changeset);
        }
        if ctx.is_cancelled() {
            return Err(Error::Canceled {
                operation: "sync apply".to_string(),
            });
        }

        {
            let mut guard = self.catalog.write().await;
            *guard = merged;
        }
        self.hooks.fire(&changeset);

        if let Some(path) = &options.persist_to {
            let copy = self.catalog.read().await.copy()?;
            lodestar_store::save_dir(&copy, path)?;
        }
        Ok(changeset)
    }
}

static DEFAULT_CLIENT: OnceCell<Client> = OnceCell::new();

/// The process-wide shared client, lazily created on first use without
/// auto-updates (callers opting in can switch them on). Initialization is
/// single-flight; concurrent first calls observe one instance.
pub fn default_client() -> Result<&'static Client> {
    DEFAULT_CLIENT.get_or_try_init(|| Client::new(ClientOptions::default().auto_updates(false)))
}
