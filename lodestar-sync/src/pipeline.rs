//! The staged sync pipeline.
//!
//! Strict stage order: normalize context, validate options, load baseline,
//! validate against baseline, filter sources, resolve dependencies, fetch
//! in parallel, snapshot, reconcile, diff. Fetches complete in any order;
//! everything after them is serial. Every selected source's `cleanup` runs
//! before the pipeline returns, whatever the outcome.
//!
//! Applying the result (swap, hooks, persistence) is the catalog owner's
//! job; the pipeline only computes.

use crate::{default_authority, diff, reconcile, Changeset, ProvenanceEntry, SyncOptions};
use chrono::Utc;
use futures_util::future::join_all;
use lodestar_core::{Catalog, Error, MergeStrategy, Result, SyncErrors};
use lodestar_sources::{
    build_sources, DependencyResolver, Resolution, Source, SourceConfig, SourceId,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// What one pipeline run computed.
#[derive(Debug)]
pub struct SyncResult {
    pub changeset: Changeset,
    /// The reconciled catalog the changeset leads to. Untouched by the
    /// pipeline itself; the caller decides whether to swap it in.
    pub merged: Catalog,
    pub provenance: Vec<ProvenanceEntry>,
}

type FetchRecord = (SourceId, bool, Box<dyn Source>, Result<()>);

fn cleanup_all(records: &mut [FetchRecord]) {
    for (id, _, source, _) in records.iter_mut() {
        if let Err(err) = source.cleanup() {
            tracing::warn!(source = %id, error = %err, "source cleanup failed");
        }
    }
}

/// Run stages 1–11 of a sync against `current` and compute the changeset,
/// constructing sources from the registry.
pub async fn run_sync(
    current: &Catalog,
    options: &SyncOptions,
    ctx: CancellationToken,
    config: &SourceConfig,
) -> Result<SyncResult> {
    let sources = build_sources(&options.sources, config);
    run_sync_with(current, options, ctx, sources).await
}

/// Like [`run_sync`], over caller-supplied sources. The seam the client's
/// remote mode and the test suites use.
pub async fn run_sync_with(
    current: &Catalog,
    options: &SyncOptions,
    ctx: CancellationToken,
    sources: Vec<Box<dyn Source>>,
) -> Result<SyncResult> {
    // Stage 1: normalize context. The child token observes parent
    // cancellation; a positive timeout cancels it from a watchdog.
    let child = ctx.child_token();
    let timed_out = Arc::new(AtomicBool::new(false));
    let watchdog = options.timeout.map(|timeout| {
        let child = child.clone();
        let timed_out = Arc::clone(&timed_out);
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            timed_out.store(true, Ordering::SeqCst);
            child.cancel();
        })
    });
    let result = run_stages(current, options, &ctx, &child, &timed_out, sources).await;
    if let Some(watchdog) = watchdog {
        watchdog.abort();
    }
    result
}

async fn run_stages(
    current: &Catalog,
    options: &SyncOptions,
    ctx: &CancellationToken,
    child: &CancellationToken,
    timed_out: &AtomicBool,
    sources: Vec<Box<dyn Source>>,
) -> Result<SyncResult> {
    let interruption = |operation: &str| -> Option<Error> {
        if ctx.is_cancelled() {
            Some(Error::Canceled {
                operation: operation.to_string(),
            })
        } else if timed_out.load(Ordering::SeqCst) {
            Some(Error::Timeout {
                operation: operation.to_string(),
                duration: options.timeout.unwrap_or_default(),
            })
        } else {
            None
        }
    };

    // Stage 2: option defaults and validation.
    options.validate()?;

    // Stage 3: embedded baseline, the reference for validation and setup.
    let baseline = lodestar_store::embedded_catalog()?;

    // Stage 4: options against baseline.
    if let Some(provider) = &options.provider {
        if baseline.provider(provider).is_err() {
            return Err(Error::Validation {
                field: "provider".to_string(),
                value: provider.clone(),
                message: "provider filter names a provider absent from the baseline".to_string(),
            });
        }
    }

    // Stage 5: the source list arrives already filtered by the registry
    // (or injected by the caller).
    tracing::info!(
        sources = ?sources.iter().map(|s| s.id()).collect::<Vec<_>>(),
        dry_run = options.dry_run,
        fresh = options.fresh,
        "sync starting"
    );

    // Stage 6: resolve dependencies.
    let resolver = DependencyResolver::new(options.resolution_mode());
    let mut diagnostics: Vec<String> = Vec::new();
    let mut kept: Vec<Box<dyn Source>> = Vec::new();
    for mut source in sources {
        let deps = source.dependencies();
        match resolver
            .resolve(source.id().as_str(), source.is_optional(), &deps)
            .await
        {
            Ok(Resolution::Ready) => kept.push(source),
            Ok(Resolution::Skip { reason }) => {
                let note = format!("source {} skipped: {reason}", source.id());
                tracing::warn!(source = %source.id(), reason = %reason, "source skipped");
                if options.require_all_sources {
                    return Err(Error::Config {
                        component: "sync".to_string(),
                        message: note,
                    });
                }
                diagnostics.push(note);
                let _ = source.cleanup();
            }
            Err(err) => return Err(err),
        }
    }

    // Stages 7–8: fetch in parallel; cleanup is owed from here on.
    let baseline_providers = baseline.providers()?;
    let fetch_options = options.fetch_options();
    let fail_fast = options.fail_fast;
    let tasks: Vec<_> = kept
        .into_iter()
        .map(|mut source| {
            let ctx = child.clone();
            let providers = baseline_providers.clone();
            let fetch_options = fetch_options.clone();
            tokio::spawn(async move {
                let id = source.id();
                let optional = source.is_optional();
                let result = match source.setup(&providers) {
                    Ok(()) => source.fetch(ctx.clone(), &fetch_options).await,
                    Err(err) => Err(err),
                };
                if fail_fast && result.is_err() {
                    ctx.cancel();
                }
                (id, optional, source, result)
            })
        })
        .collect();

    let mut records: Vec<FetchRecord> = Vec::new();
    for joined in join_all(tasks).await {
        match joined {
            Ok(record) => records.push(record),
            Err(err) => diagnostics.push(format!("source task panicked: {err}")),
        }
    }

    if let Some(err) = interruption("sync") {
        cleanup_all(&mut records);
        return Err(err);
    }
    if fail_fast {
        if let Some((id, _, _, result)) = records.iter_mut().find(|(_, _, _, r)| r.is_err()) {
            let err = std::mem::replace(result, Ok(())).unwrap_err();
            let id = *id;
            cleanup_all(&mut records);
            let mut errors = SyncErrors::default();
            errors.push(id.as_str(), err);
            return Err(Error::Sync(errors));
        }
    }

    // Partial-success policy: an errored source still contributes whatever
    // it produced; an errored source with nothing to show is dropped. A
    // required source's failure is fatal.
    let mut fragments: BTreeMap<SourceId, Catalog> = BTreeMap::new();
    let mut errors = SyncErrors::default();
    let mut fatal: Option<Error> = None;
    for (id, optional, source, result) in records.iter_mut() {
        let fragment = source.catalog()?;
        match std::mem::replace(result, Ok(())) {
            Ok(()) => {
                fragments.insert(*id, fragment);
            }
            Err(err) => {
                if !*optional && fatal.is_none() {
                    fatal = Some(err);
                    continue;
                }
                diagnostics.push(format!("source {id} failed: {err}"));
                if !fragment.is_empty()? {
                    tracing::warn!(source = %id, "keeping partial fragment from errored source");
                    fragments.insert(*id, fragment);
                }
                errors.push(id.as_str(), err);
            }
        }
    }
    cleanup_all(&mut records);
    if let Some(err) = fatal {
        return Err(err);
    }

    // Stage 9: snapshot the current catalog for diffing.
    let snapshot = current.copy()?;

    // Stage 10: reconcile, with the snapshot as the baseline floor. A
    // fresh sync rebuilds model sets from live sources only; the baseline
    // keeps contributing authors so references stay resolvable.
    if options.fresh {
        if let Some(embedded) = fragments.remove(&SourceId::Embedded) {
            let authors_only = Catalog::new();
            for author in embedded.authors()? {
                authors_only.set_author(author)?;
            }
            fragments.insert(SourceId::Embedded, authors_only);
        }
    } else {
        let floor = fragments
            .entry(SourceId::Embedded)
            .or_insert_with(Catalog::new);
        floor.merge(&snapshot, MergeStrategy::ReplaceAll)?;
    }

    // A provider filter narrows what live fragments may touch; the floor
    // keeps every other provider as it was.
    if let Some(filter) = &options.provider {
        for (id, fragment) in fragments.iter() {
            if *id == SourceId::Embedded && !options.fresh {
                continue;
            }
            for provider in fragment.providers()? {
                if &provider.id != filter {
                    fragment.delete_provider(&provider.id)?;
                }
            }
        }
    }

    let all_empty = {
        let mut empty = true;
        for fragment in fragments.values() {
            if !fragment.is_empty()? {
                empty = false;
                break;
            }
        }
        empty
    };
    if all_empty {
        if !errors.is_empty() {
            return Err(Error::Sync(errors));
        }
        return Ok(SyncResult {
            changeset: Changeset {
                diagnostics,
                ..Default::default()
            },
            merged: snapshot,
            provenance: Vec::new(),
        });
    }

    let reconciled = reconcile(&fragments, default_authority(), Utc::now())?;
    for warning in &reconciled.warnings {
        tracing::warn!(warning = %warning, "reconciliation warning");
    }
    diagnostics.extend(reconciled.warnings.iter().cloned());

    // Stage 11: diff against the snapshot.
    let mut changeset = diff(&snapshot, &reconciled.catalog)?;
    changeset.diagnostics = diagnostics;

    if let Some(err) = interruption("sync") {
        return Err(err);
    }

    tracing::info!(
        added = changeset.summary().models_added,
        updated = changeset.summary().models_updated,
        removed = changeset.summary().models_removed,
        "sync computed"
    );
    Ok(SyncResult {
        merged: reconciled.catalog,
        provenance: reconciled.provenance,
        changeset,
    })
}
