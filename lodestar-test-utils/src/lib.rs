//! Lodestar Test Utilities
//!
//! Centralized test infrastructure for the lodestar workspace:
//! - Catalog and model fixture builders
//! - A scriptable in-memory source for pipeline tests
//! - Proptest generators for model records

use async_trait::async_trait;
use lodestar_core::{Catalog, Error, Limits, Model, Pricing, Provider, Result};
use lodestar_sources::{Dependency, FetchOptions, Source, SourceId};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// ============================================================================
// FIXTURE BUILDERS
// ============================================================================

/// A bare model with the given id.
pub fn model(id: &str) -> Model {
    Model::new(id)
}

/// A model with a display name.
pub fn named_model(id: &str, name: &str) -> Model {
    let mut m = Model::new(id);
    m.name = name.to_string();
    m
}

/// A model with an input price per million tokens.
pub fn priced_model(id: &str, input: f64) -> Model {
    let mut m = Model::new(id);
    m.pricing = Some(Pricing {
        input: Some(input),
        ..Default::default()
    });
    m
}

/// A model with a described local override.
pub fn described_model(id: &str, description: &str) -> Model {
    let mut m = Model::new(id);
    m.description = Some(description.to_string());
    m
}

/// A catalog with one provider owning the given models.
pub fn catalog_with_models(provider_id: &str, models: Vec<Model>) -> Catalog {
    let catalog = Catalog::new();
    let mut provider = Provider::new(provider_id);
    for m in models {
        provider.models.insert(m.id.clone(), m);
    }
    catalog
        .set_provider(provider)
        .expect("fresh catalog accepts provider");
    catalog
}

// ============================================================================
// SCRIPTABLE SOURCE
// ============================================================================

/// An in-memory source with scriptable behavior for pipeline tests:
/// canned fragment, optional failure, fetch delay, declared dependencies,
/// and observation counters for fetch/cleanup.
pub struct StaticSource {
    id: SourceId,
    optional: bool,
    catalog: Catalog,
    fail_message: Option<String>,
    delay: Option<Duration>,
    dependencies: Vec<Dependency>,
    pub fetch_count: Arc<AtomicUsize>,
    pub cleaned: Arc<AtomicBool>,
}

impl StaticSource {
    pub fn new(id: SourceId, catalog: Catalog) -> Self {
        Self {
            id,
            optional: true,
            catalog,
            fail_message: None,
            delay: None,
            dependencies: Vec::new(),
            fetch_count: Arc::new(AtomicUsize::new(0)),
            cleaned: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn required(mut self) -> Self {
        self.optional = false;
        self
    }

    /// Make fetch fail with an external-API error. The canned fragment is
    /// still produced, modeling partial success.
    pub fn failing(mut self, message: &str) -> Self {
        self.fail_message = Some(message.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<Dependency>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// A dependency declaration probing a binary that cannot exist.
    pub fn missing_dependency() -> Dependency {
        Dependency {
            tool: "imaginary-tool",
            display_name: "Imaginary Tool",
            required: true,
            probe_commands: &[&["lodestar-imaginary-tool-4577", "--version"]],
            min_version: None,
            install_url: "https://example.invalid",
            auto_install: None,
            rationale: "exercises the missing-dependency path",
        }
    }
}

#[async_trait]
impl Source for StaticSource {
    fn id(&self) -> SourceId {
        self.id
    }

    fn is_optional(&self) -> bool {
        self.optional
    }

    fn dependencies(&self) -> Vec<Dependency> {
        self.dependencies.clone()
    }

    async fn fetch(&mut self, ctx: CancellationToken, _options: &FetchOptions) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::select! {
                _ = ctx.cancelled() => {
                    return Err(Error::Canceled {
                        operation: format!("fetch {}", self.id),
                    })
                }
                _ = tokio::time::sleep(delay) => {}
            }
        } else if ctx.is_cancelled() {
            return Err(Error::Canceled {
                operation: format!("fetch {}", self.id),
            });
        }
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.fail_message {
            return Err(Error::ExternalApi {
                provider: self.id.to_string(),
                endpoint: "static".to_string(),
                status: 500,
                message: message.clone(),
            });
        }
        Ok(())
    }

    fn catalog(&self) -> Result<Catalog> {
        self.catalog.copy()
    }

    fn cleanup(&mut self) -> Result<()> {
        self.cleaned.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use proptest::prelude::*;

    pub fn arb_model() -> impl Strategy<Value = Model> {
        (
            "[a-z][a-z0-9-]{0,14}",
            proptest::option::of(0.0f64..200.0),
            proptest::option::of(1_024u64..2_097_152),
            proptest::option::of(".{0,40}"),
        )
            .prop_map(|(id, price, context, description)| {
                let mut m = Model::new(id);
                if let Some(p) = price {
                    m.pricing = Some(Pricing {
                        input: Some(p),
                        ..Default::default()
                    });
                }
                if let Some(c) = context {
                    m.limits = Some(Limits {
                        context_window: Some(c),
                        output_tokens: None,
                    });
                }
                m.description = description;
                m
            })
    }

    pub fn arb_catalog() -> impl Strategy<Value = Catalog> {
        proptest::collection::vec(("[a-d]", arb_model()), 0..10).prop_map(|entries| {
            let catalog = Catalog::new();
            for (provider_id, model) in entries {
                if catalog.provider(&provider_id).is_err() {
                    catalog
                        .set_provider(Provider::new(provider_id.clone()))
                        .expect("set provider");
                }
                catalog.set_model(&provider_id, model).expect("set model");
            }
            catalog
        })
    }
}
