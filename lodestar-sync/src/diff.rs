//! Structural diff of two catalogs.

use lodestar_core::{changed_model_paths, Author, Catalog, Model, Provider, Result};
use std::collections::BTreeMap;

/// A model together with the provider that owns it.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ProviderModel {
    pub provider_id: String,
    pub model: Model,
}

/// One updated model with its before/after records and the leaf paths that
/// changed.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ModelChange {
    pub provider_id: String,
    pub id: String,
    pub before: Model,
    pub after: Model,
    pub changed_fields: Vec<&'static str>,
}

/// Counts for quick display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ChangeSummary {
    pub models_added: usize,
    pub models_updated: usize,
    pub models_removed: usize,
    pub providers_added: usize,
    pub providers_removed: usize,
    pub authors_added: usize,
    pub authors_removed: usize,
}

/// The add/update/remove sets between a baseline and a candidate catalog.
///
/// `diagnostics` carries non-fatal sync notes (skipped sources, per-source
/// fetch failures) and does not affect emptiness.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Changeset {
    pub models_added: Vec<ProviderModel>,
    pub models_updated: Vec<ModelChange>,
    pub models_removed: Vec<ProviderModel>,
    pub providers_added: Vec<Provider>,
    pub providers_removed: Vec<Provider>,
    pub authors_added: Vec<Author>,
    pub authors_removed: Vec<Author>,
    pub diagnostics: Vec<String>,
}

impl Changeset {
    pub fn is_empty(&self) -> bool {
        self.models_added.is_empty()
            && self.models_updated.is_empty()
            && self.models_removed.is_empty()
            && self.providers_added.is_empty()
            && self.providers_removed.is_empty()
            && self.authors_added.is_empty()
            && self.authors_removed.is_empty()
    }

    pub fn summary(&self) -> ChangeSummary {
        ChangeSummary {
            models_added: self.models_added.len(),
            models_updated: self.models_updated.len(),
            models_removed: self.models_removed.len(),
            providers_added: self.providers_added.len(),
            providers_removed: self.providers_removed.len(),
            authors_added: self.authors_added.len(),
            authors_removed: self.authors_removed.len(),
        }
    }

    /// Apply this changeset to a catalog. `diff(x, y).apply(x)` makes the
    /// model, provider, and author id-sets of `x` equal those of `y`.
    pub fn apply(&self, catalog: &Catalog) -> Result<()> {
        for provider in &self.providers_added {
            catalog.set_provider(provider.clone())?;
        }
        for added in &self.models_added {
            if catalog.provider(&added.provider_id).is_err() {
                catalog.set_provider(Provider::new(added.provider_id.clone()))?;
            }
            catalog.set_model(&added.provider_id, added.model.clone())?;
        }
        for change in &self.models_updated {
            catalog.set_model(&change.provider_id, change.after.clone())?;
        }
        for removed in &self.models_removed {
            // tolerate targets already gone
            let _ = catalog.delete_model(&removed.provider_id, &removed.model.id);
        }
        for provider in &self.providers_removed {
            let _ = catalog.delete_provider(&provider.id);
        }
        for author in &self.authors_added {
            catalog.set_author(author.clone())?;
        }
        for author in &self.authors_removed {
            let _ = catalog.delete_author(&author.id);
        }
        Ok(())
    }
}

/// Field paths that differ between two model records, including the parts
/// the leaf tables do not enumerate.
fn changed_fields(before: &Model, after: &Model) -> Vec<&'static str> {
    let mut fields = changed_model_paths(before, after);
    if before.stale != after.stale {
        fields.push("stale");
    }
    if before.extra != after.extra {
        fields.push("extra");
    }
    fields
}

/// Produce the changeset turning `baseline` into `candidate`. Identity is
/// (provider id, model id); update detection is structural equality.
pub fn diff(baseline: &Catalog, candidate: &Catalog) -> Result<Changeset> {
    let mut changeset = Changeset::default();

    let base_providers: BTreeMap<String, Provider> = baseline
        .providers()?
        .into_iter()
        .map(|p| (p.id.clone(), p))
        .collect();
    let cand_providers: BTreeMap<String, Provider> = candidate
        .providers()?
        .into_iter()
        .map(|p| (p.id.clone(), p))
        .collect();

    for (id, cand) in &cand_providers {
        match base_providers.get(id) {
            None => {
                changeset.providers_added.push(cand.config_only());
                for model in cand.models.values() {
                    changeset.models_added.push(ProviderModel {
                        provider_id: id.clone(),
                        model: model.clone(),
                    });
                }
            }
            Some(base) => {
                for (model_id, model) in &cand.models {
                    match base.models.get(model_id) {
                        None => changeset.models_added.push(ProviderModel {
                            provider_id: id.clone(),
                            model: model.clone(),
                        }),
                        Some(before) if before != model => {
                            changeset.models_updated.push(ModelChange {
                                provider_id: id.clone(),
                                id: model_id.clone(),
                                before: before.clone(),
                                after: model.clone(),
                                changed_fields: changed_fields(before, model),
                            })
                        }
                        Some(_) => {}
                    }
                }
                for (model_id, model) in &base.models {
                    if !cand.models.contains_key(model_id) {
                        changeset.models_removed.push(ProviderModel {
                            provider_id: id.clone(),
                            model: model.clone(),
                        });
                    }
                }
            }
        }
    }
    for (id, base) in &base_providers {
        if !cand_providers.contains_key(id) {
            changeset.providers_removed.push(base.clone());
            for model in base.models.values() {
                changeset.models_removed.push(ProviderModel {
                    provider_id: id.clone(),
                    model: model.clone(),
                });
            }
        }
    }

    let base_authors: BTreeMap<String, Author> = baseline
        .authors()?
        .into_iter()
        .map(|a| (a.id.clone(), a))
        .collect();
    let cand_authors: BTreeMap<String, Author> = candidate
        .authors()?
        .into_iter()
        .map(|a| (a.id.clone(), a))
        .collect();
    for (id, author) in &cand_authors {
        if !base_authors.contains_key(id) {
            changeset.authors_added.push(author.clone());
        }
    }
    for (id, author) in &base_authors {
        if !cand_authors.contains_key(id) {
            changeset.authors_removed.push(author.clone());
        }
    }

    Ok(changeset)
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use lodestar_core::Pricing;
    use proptest::prelude::*;

    fn arb_catalog() -> impl Strategy<Value = Vec<(String, String, f64)>> {
        proptest::collection::vec(
            ("[a-c]", "[m-o][0-9]", 0.0f64..50.0),
            0..8,
        )
        .prop_map(|entries| {
            entries
                .into_iter()
                .map(|(p, m, price)| (p, m, price))
                .collect()
        })
    }

    fn build(entries: &[(String, String, f64)]) -> Catalog {
        let catalog = Catalog::new();
        for (provider_id, model_id, price) in entries {
            if catalog.provider(provider_id).is_err() {
                catalog
                    .set_provider(lodestar_core::Provider::new(provider_id.clone()))
                    .unwrap();
            }
            let mut m = Model::new(model_id.clone());
            m.pricing = Some(Pricing {
                input: Some(*price),
                ..Default::default()
            });
            catalog.set_model(provider_id, m).unwrap();
        }
        catalog
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_diff_self_is_empty(entries in arb_catalog()) {
            let x = build(&entries);
            prop_assert!(diff(&x, &x.copy().unwrap()).unwrap().is_empty());
        }

        #[test]
        fn prop_apply_reaches_candidate_id_sets(a in arb_catalog(), b in arb_catalog()) {
            let x = build(&a);
            let y = build(&b);
            let changeset = diff(&x, &y).unwrap();
            changeset.apply(&x).unwrap();

            let ids = |c: &Catalog| -> Vec<(String, String)> {
                let mut v: Vec<_> = c.models().unwrap().into_iter().map(|(p, m)| (p, m.id)).collect();
                v.sort();
                v
            };
            prop_assert_eq!(ids(&x), ids(&y));
        }
    }
}
