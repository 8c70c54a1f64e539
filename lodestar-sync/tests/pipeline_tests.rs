//! End-to-end pipeline scenarios over scriptable in-memory sources.

use lodestar_core::Catalog;
use lodestar_sources::{Source, SourceId};
use lodestar_sync::{run_sync_with, Subject, SyncOptions};
use lodestar_test_utils::{
    catalog_with_models, described_model, model, named_model, priced_model, StaticSource,
};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn boxed(sources: Vec<StaticSource>) -> Vec<Box<dyn Source>> {
    sources
        .into_iter()
        .map(|s| -> Box<dyn Source> { Box::new(s) })
        .collect()
}

fn quiet() -> SyncOptions {
    SyncOptions::default().skip_dep_prompts(true)
}

#[tokio::test]
async fn community_pricing_outranks_the_baseline() {
    // The catalog starts with pricing from the baseline; the community
    // document reports a cheaper price and wins by authority.
    let current = catalog_with_models("p1", vec![priced_model("m", 5.0)]);
    let sources = boxed(vec![
        StaticSource::new(SourceId::Embedded, Catalog::new()).required(),
        StaticSource::new(
            SourceId::ModelsDevHttp,
            catalog_with_models("p1", vec![priced_model("m", 3.0)]),
        ),
    ]);

    let result = run_sync_with(&current, &quiet(), CancellationToken::new(), sources)
        .await
        .unwrap();

    assert_eq!(
        result.merged.model("p1", "m").unwrap().pricing.unwrap().input,
        Some(3.0)
    );
    assert_eq!(result.changeset.models_updated.len(), 1);
    assert_eq!(
        result.changeset.models_updated[0].changed_fields,
        vec!["pricing.input"]
    );

    let entry = result
        .provenance
        .iter()
        .find(|e| {
            e.field_path == "pricing.input"
                && e.subject
                    == Subject::Model {
                        provider_id: "p1".to_string(),
                        model_id: "m".to_string(),
                    }
        })
        .expect("provenance for the reconciled price");
    assert_eq!(entry.source, SourceId::ModelsDevHttp);
    assert_eq!(entry.priority, 110);
}

#[tokio::test]
async fn fan_out_addition_and_local_description_override() {
    let current = catalog_with_models("p1", vec![named_model("gpt-x", "GPT X")]);
    let sources = boxed(vec![
        StaticSource::new(SourceId::Embedded, Catalog::new()).required(),
        StaticSource::new(
            SourceId::Providers,
            catalog_with_models("p1", vec![model("gpt-x"), model("gpt-y")]),
        ),
        StaticSource::new(
            SourceId::Local,
            catalog_with_models("p1", vec![described_model("gpt-x", "custom")]),
        ),
    ]);

    let result = run_sync_with(&current, &quiet(), CancellationToken::new(), sources)
        .await
        .unwrap();

    let summary = result.changeset.summary();
    assert_eq!(summary.models_added, 1);
    assert_eq!(summary.models_updated, 1);
    assert_eq!(summary.models_removed, 0);
    assert_eq!(result.changeset.models_added[0].model.id, "gpt-y");
    assert_eq!(
        result.changeset.models_updated[0].changed_fields,
        vec!["description"]
    );

    let entry = result
        .provenance
        .iter()
        .find(|e| e.field_path == "description")
        .unwrap();
    assert_eq!(entry.source, SourceId::Local);
    assert_eq!(entry.priority, 90);
    // the name survived from the snapshot floor
    assert_eq!(result.merged.model("p1", "gpt-x").unwrap().name, "GPT X");
}

#[tokio::test]
async fn fresh_sync_allows_removals() {
    let current = catalog_with_models("p1", vec![named_model("gpt-x", "GPT X")]);
    let sources = boxed(vec![
        StaticSource::new(SourceId::Providers, catalog_with_models("p1", vec![model("gpt-y")])),
    ]);

    let options = quiet().fresh(true);
    let result = run_sync_with(&current, &options, CancellationToken::new(), sources)
        .await
        .unwrap();

    let summary = result.changeset.summary();
    assert_eq!(summary.models_added, 1);
    assert_eq!(summary.models_removed, 1);
    assert_eq!(result.changeset.models_removed[0].model.id, "gpt-x");
    assert!(result.merged.model("p1", "gpt-y").is_ok());
    assert!(result.merged.model("p1", "gpt-x").is_err());
}

#[tokio::test]
async fn missing_dependency_skips_the_source_with_a_diagnostic() {
    let current = catalog_with_models("p1", vec![priced_model("m", 5.0)]);
    let git = StaticSource::new(
        SourceId::ModelsDevGit,
        catalog_with_models("p1", vec![priced_model("m", 1.0)]),
    )
    .with_dependencies(vec![StaticSource::missing_dependency()]);
    let http = StaticSource::new(
        SourceId::ModelsDevHttp,
        catalog_with_models("p1", vec![priced_model("m", 3.0)]),
    );

    let result = run_sync_with(
        &current,
        &quiet(),
        CancellationToken::new(),
        boxed(vec![git, http]),
    )
    .await
    .unwrap();

    // http carried the day; the skipped git source left a diagnostic
    assert_eq!(
        result.merged.model("p1", "m").unwrap().pricing.unwrap().input,
        Some(3.0)
    );
    assert!(result
        .changeset
        .diagnostics
        .iter()
        .any(|d| d.contains("models-dev-git") && d.contains("skipped")));
}

#[tokio::test]
async fn require_all_sources_aborts_on_any_skip() {
    let current = catalog_with_models("p1", vec![priced_model("m", 5.0)]);
    let git = StaticSource::new(SourceId::ModelsDevGit, Catalog::new())
        .with_dependencies(vec![StaticSource::missing_dependency()]);

    let options = quiet().require_all_sources(true);
    let err = run_sync_with(
        &current,
        &options,
        CancellationToken::new(),
        boxed(vec![git]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, lodestar_core::Error::Config { .. }));
}

#[tokio::test]
async fn canceled_sync_reports_cancellation_and_cleans_up() {
    let current = catalog_with_models("p1", vec![priced_model("m", 5.0)]);
    let slow = StaticSource::new(
        SourceId::ModelsDevHttp,
        catalog_with_models("p1", vec![priced_model("m", 3.0)]),
    )
    .with_delay(Duration::from_secs(30));
    let cleaned = slow.cleaned.clone();

    let ctx = CancellationToken::new();
    let handle = {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            ctx.cancel();
        })
    };

    let err = run_sync_with(&current, &quiet(), ctx, boxed(vec![slow]))
        .await
        .unwrap_err();
    handle.await.unwrap();

    assert!(err.is_canceled());
    assert!(cleaned.load(Ordering::SeqCst));
}

#[tokio::test]
async fn whole_sync_timeout_is_reported_as_timeout() {
    let current = catalog_with_models("p1", vec![priced_model("m", 5.0)]);
    let slow = StaticSource::new(SourceId::ModelsDevHttp, Catalog::new())
        .with_delay(Duration::from_secs(30));

    let options = quiet().timeout(Duration::from_millis(50));
    let err = run_sync_with(&current, &options, CancellationToken::new(), boxed(vec![slow]))
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    assert!(!err.is_canceled());
}

#[tokio::test]
async fn fail_fast_promotes_the_first_error_and_cancels_the_rest() {
    let current = catalog_with_models("p1", vec![priced_model("m", 5.0)]);
    let failing = StaticSource::new(SourceId::ModelsDevHttp, Catalog::new()).failing("boom");
    let slow = StaticSource::new(SourceId::Providers, Catalog::new())
        .with_delay(Duration::from_secs(60));
    let slow_cleaned = slow.cleaned.clone();

    let options = quiet().fail_fast(true);
    let started = std::time::Instant::now();
    let err = run_sync_with(
        &current,
        &options,
        CancellationToken::new(),
        boxed(vec![failing, slow]),
    )
    .await
    .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(30));
    assert!(matches!(err, lodestar_core::Error::Sync(_)));
    assert!(slow_cleaned.load(Ordering::SeqCst));
}

#[tokio::test]
async fn errored_source_with_partial_fragment_still_contributes() {
    let current = catalog_with_models("p1", vec![priced_model("m", 5.0)]);
    let flaky = StaticSource::new(
        SourceId::ModelsDevHttp,
        catalog_with_models("p1", vec![priced_model("m", 3.0)]),
    )
    .failing("second half of the fetch failed");

    let result = run_sync_with(&current, &quiet(), CancellationToken::new(), boxed(vec![flaky]))
        .await
        .unwrap();

    assert_eq!(
        result.merged.model("p1", "m").unwrap().pricing.unwrap().input,
        Some(3.0)
    );
    assert!(result
        .changeset
        .diagnostics
        .iter()
        .any(|d| d.contains("models-dev-http")));
}

#[tokio::test]
async fn required_source_failure_is_fatal() {
    let current = catalog_with_models("p1", vec![priced_model("m", 5.0)]);
    let broken = StaticSource::new(SourceId::Embedded, Catalog::new())
        .required()
        .failing("baseline unreadable");

    let err = run_sync_with(&current, &quiet(), CancellationToken::new(), boxed(vec![broken]))
        .await
        .unwrap_err();
    assert!(matches!(err, lodestar_core::Error::ExternalApi { .. }));
}

#[tokio::test]
async fn empty_source_set_yields_an_empty_changeset() {
    let current = catalog_with_models("p1", vec![priced_model("m", 5.0)]);
    let result = run_sync_with(&current, &quiet(), CancellationToken::new(), Vec::new())
        .await
        .unwrap();
    assert!(result.changeset.is_empty());
    assert_eq!(result.merged.model("p1", "m").unwrap().pricing.unwrap().input, Some(5.0));
}

#[tokio::test]
async fn single_empty_source_reproduces_the_snapshot() {
    let current = catalog_with_models("p1", vec![priced_model("m", 5.0), named_model("n", "N")]);
    let sources = boxed(vec![StaticSource::new(SourceId::Embedded, Catalog::new()).required()]);

    let result = run_sync_with(&current, &quiet(), CancellationToken::new(), sources)
        .await
        .unwrap();
    assert!(result.changeset.is_empty());
    assert_eq!(result.merged, current);
}

#[tokio::test]
async fn provider_filter_must_name_a_baseline_provider() {
    let current = Catalog::new();
    let options = quiet().provider("no-such-provider");
    let err = run_sync_with(&current, &options, CancellationToken::new(), Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, lodestar_core::Error::Validation { .. }));
}

#[tokio::test]
async fn provider_filter_leaves_other_providers_untouched() {
    // "openai" exists in the embedded baseline, so the filter validates.
    let current = {
        let c = catalog_with_models("openai", vec![priced_model("m-a", 5.0)]);
        let mut other = lodestar_core::Provider::new("anthropic");
        other.models.insert("m-b".to_string(), priced_model("m-b", 7.0));
        c.set_provider(other).unwrap();
        c
    };
    let sources = boxed(vec![StaticSource::new(SourceId::ModelsDevHttp, {
        let c = catalog_with_models("openai", vec![priced_model("m-a", 1.0)]);
        let mut other = lodestar_core::Provider::new("anthropic");
        other.models.insert("m-b".to_string(), priced_model("m-b", 1.0));
        c.set_provider(other).unwrap();
        c
    })]);

    let options = quiet().provider("openai");
    let result = run_sync_with(&current, &options, CancellationToken::new(), sources)
        .await
        .unwrap();

    assert_eq!(
        result.merged.model("openai", "m-a").unwrap().pricing.unwrap().input,
        Some(1.0)
    );
    // the filtered-out provider kept its old price
    assert_eq!(
        result.merged.model("anthropic", "m-b").unwrap().pricing.unwrap().input,
        Some(7.0)
    );
}
