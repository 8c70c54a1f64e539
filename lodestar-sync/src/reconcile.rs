//! N-way field-level reconciliation of source fragments.
//!
//! For every (provider, model) pair reported by any fragment, each leaf
//! field is resolved independently: candidates are the sources that carry
//! a present value for that leaf, and the authority table picks the
//! winner. Reconciliation is total: it always produces a catalog, and it
//! collects validation problems as warnings instead of failing.

use crate::AuthorityTable;
use chrono::{DateTime, Utc};
use lodestar_core::{
    Author, Catalog, Leaf, Model, Provider, Result, AUTHOR_LEAVES, MODEL_LEAVES, PROVIDER_LEAVES,
};
use lodestar_sources::SourceId;
use std::collections::{BTreeMap, BTreeSet};

/// What a provenance entry is about.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub enum Subject {
    Provider {
        provider_id: String,
    },
    Model {
        provider_id: String,
        model_id: String,
    },
    Author {
        author_id: String,
    },
}

/// The record of one field's winning source and why.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ProvenanceEntry {
    pub subject: Subject,
    pub field_path: &'static str,
    pub source: SourceId,
    pub priority: i32,
    pub fetched_at: DateTime<Utc>,
}

/// A merged catalog plus the trail of how it was assembled.
pub struct Reconciled {
    pub catalog: Catalog,
    pub provenance: Vec<ProvenanceEntry>,
    pub warnings: Vec<String>,
}

struct Ctx<'a> {
    table: &'a AuthorityTable,
    fetched_at: DateTime<Utc>,
    provenance: Vec<ProvenanceEntry>,
    warnings: Vec<String>,
}

/// Resolve one leaf over the candidate records.
///
/// Returns the winning candidate index. Candidates whose source has no
/// matching authority rule can never win; if one of them was the only
/// holder of a value, that is reported as a warning and the field stays
/// unset.
fn resolve_leaf<T>(
    ctx: &mut Ctx<'_>,
    leaf: &Leaf<T>,
    candidates: &[(SourceId, &T)],
    describe: &dyn Fn() -> String,
) -> Option<(usize, SourceId, i32)> {
    let mut winner: Option<(usize, SourceId, i32, usize)> = None;
    let mut unranked: Vec<SourceId> = Vec::new();
    for (index, (source, record)) in candidates.iter().enumerate() {
        if !(leaf.present)(record) {
            continue;
        }
        match ctx.table.best_rule(leaf.path, *source) {
            Some((priority, rule_index)) => {
                let better = match winner {
                    None => true,
                    Some((_, _, best_priority, best_rule)) => {
                        priority > best_priority
                            || (priority == best_priority && rule_index < best_rule)
                    }
                };
                if better {
                    winner = Some((index, *source, priority, rule_index));
                }
            }
            None => unranked.push(*source),
        }
    }
    if winner.is_none() && !unranked.is_empty() {
        ctx.warnings.push(format!(
            "no authority rule matches {} for {} (reported by {:?}); leaving unset",
            leaf.path,
            describe(),
            unranked
        ));
    }
    winner.map(|(index, source, priority, _)| (index, source, priority))
}

fn merge_record<T>(
    ctx: &mut Ctx<'_>,
    leaves: &[Leaf<T>],
    candidates: &[(SourceId, &T)],
    merged: &mut T,
    subject: &Subject,
    describe: &dyn Fn() -> String,
) {
    for leaf in leaves {
        if let Some((index, source, priority)) = resolve_leaf(ctx, leaf, candidates, describe) {
            (leaf.apply)(merged, candidates[index].1);
            ctx.provenance.push(ProvenanceEntry {
                subject: subject.clone(),
                field_path: leaf.path,
                source,
                priority,
                fetched_at: ctx.fetched_at,
            });
        }
    }
}

/// Union of the candidates' unknown-field maps. The leaf tables do not
/// enumerate these, but round-trip preservation requires carrying them;
/// the earliest source in fragment order keeps a contested key.
fn merge_extra<'a, T>(
    candidates: &[(SourceId, &'a T)],
    extra_of: fn(&'a T) -> &'a serde_json::Map<String, serde_json::Value>,
) -> serde_json::Map<String, serde_json::Value> {
    let mut merged = serde_json::Map::new();
    for (_, record) in candidates {
        for (key, value) in extra_of(record) {
            merged.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
    merged
}

/// Merge the fragments into one catalog under the authority table.
pub fn reconcile(
    fragments: &BTreeMap<SourceId, Catalog>,
    table: &AuthorityTable,
    fetched_at: DateTime<Utc>,
) -> Result<Reconciled> {
    let mut ctx = Ctx {
        table,
        fetched_at,
        provenance: Vec::new(),
        warnings: Vec::new(),
    };
    if !table.has_catch_all() {
        ctx.warnings
            .push("authority table has no catch-all rule; unranked fields will be dropped".to_string());
    }

    // Snapshot each fragment's collections once, in source order.
    let mut providers_by_source: BTreeMap<SourceId, BTreeMap<String, Provider>> = BTreeMap::new();
    let mut authors_by_source: BTreeMap<SourceId, BTreeMap<String, Author>> = BTreeMap::new();
    for (source, fragment) in fragments {
        providers_by_source.insert(
            *source,
            fragment
                .providers()?
                .into_iter()
                .map(|p| (p.id.clone(), p))
                .collect(),
        );
        authors_by_source.insert(
            *source,
            fragment
                .authors()?
                .into_iter()
                .map(|a| (a.id.clone(), a))
                .collect(),
        );
    }

    let catalog = Catalog::new();

    let provider_union: BTreeSet<String> = providers_by_source
        .values()
        .flat_map(|m| m.keys().cloned())
        .collect();

    for provider_id in &provider_union {
        let candidates: Vec<(SourceId, &Provider)> = providers_by_source
            .iter()
            .filter_map(|(source, map)| map.get(provider_id).map(|p| (*source, p)))
            .collect();

        let mut merged = Provider::new(provider_id.clone());
        let subject = Subject::Provider {
            provider_id: provider_id.clone(),
        };
        merge_record(
            &mut ctx,
            PROVIDER_LEAVES,
            &candidates,
            &mut merged,
            &subject,
            &|| format!("provider {provider_id}"),
        );
        merged.extra = merge_extra(&candidates, |p| &p.extra);

        let model_union: BTreeSet<String> = candidates
            .iter()
            .flat_map(|(_, p)| p.models.keys().cloned())
            .collect();

        // Does the live fan-out speak for this provider in this run?
        let fanout_models = providers_by_source
            .get(&SourceId::Providers)
            .and_then(|m| m.get(provider_id))
            .map(|p| &p.models);

        for model_id in &model_union {
            let model_candidates: Vec<(SourceId, &Model)> = candidates
                .iter()
                .filter_map(|(source, p)| p.models.get(model_id).map(|m| (*source, m)))
                .collect();

            let mut model = Model::new(model_id.clone());
            let subject = Subject::Model {
                provider_id: provider_id.clone(),
                model_id: model_id.clone(),
            };
            merge_record(
                &mut ctx,
                MODEL_LEAVES,
                &model_candidates,
                &mut model,
                &subject,
                &|| format!("{provider_id}/{model_id}"),
            );

            model.extra = merge_extra(&model_candidates, |m| &m.extra);

            // Fan-out reports the provider but not this model while the
            // community still does: retain, flagged stale, rather than
            // guessing at removal. When the fan-out reports the model (or
            // is silent about the whole provider) the previous flag is
            // kept or cleared accordingly.
            match fanout_models {
                Some(fanout) if fanout.contains_key(model_id) => model.stale = false,
                Some(_) => {
                    let community_reports = model_candidates.iter().any(|(s, _)| {
                        matches!(s, SourceId::ModelsDevGit | SourceId::ModelsDevHttp)
                    });
                    model.stale =
                        community_reports || model_candidates.iter().any(|(_, m)| m.stale);
                }
                None => model.stale = model_candidates.iter().any(|(_, m)| m.stale),
            }

            for problem in model.validate() {
                ctx.warnings.push(format!("{provider_id}: {problem}"));
            }
            merged.models.insert(model_id.clone(), model);
        }

        catalog.set_provider(merged)?;
    }

    // Authors: set union by id, fields resolved under the same authority.
    let author_union: BTreeSet<String> = authors_by_source
        .values()
        .flat_map(|m| m.keys().cloned())
        .collect();
    for author_id in &author_union {
        let candidates: Vec<(SourceId, &Author)> = authors_by_source
            .iter()
            .filter_map(|(source, map)| map.get(author_id).map(|a| (*source, a)))
            .collect();
        let mut merged = Author::new(author_id.clone());
        let subject = Subject::Author {
            author_id: author_id.clone(),
        };
        merge_record(
            &mut ctx,
            AUTHOR_LEAVES,
            &candidates,
            &mut merged,
            &subject,
            &|| format!("author {author_id}"),
        );
        merged.extra = merge_extra(&candidates, |a| &a.extra);
        catalog.set_author(merged)?;
    }

    // Endpoints are passive records: union, first source in order wins a
    // collision.
    let mut seen_endpoints = BTreeSet::new();
    for fragment in fragments.values() {
        for endpoint in fragment.endpoints()? {
            if seen_endpoints.insert(endpoint.id.clone()) {
                catalog.set_endpoint(endpoint)?;
            }
        }
    }

    Ok(Reconciled {
        catalog,
        provenance: ctx.provenance,
        warnings: ctx.warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::default_authority;
    use lodestar_core::Pricing;

    fn fragment_with_price(provider: &str, model: &str, input: f64) -> Catalog {
        let catalog = Catalog::new();
        let mut p = Provider::new(provider);
        let mut m = Model::new(model);
        m.pricing = Some(Pricing {
            input: Some(input),
            ..Default::default()
        });
        p.models.insert(m.id.clone(), m);
        catalog.set_provider(p).unwrap();
        catalog
    }

    #[test]
    fn higher_priority_source_wins_the_field() {
        let mut fragments = BTreeMap::new();
        fragments.insert(SourceId::Embedded, fragment_with_price("p1", "m", 5.0));
        fragments.insert(SourceId::ModelsDevHttp, fragment_with_price("p1", "m", 3.0));

        let out = reconcile(&fragments, default_authority(), Utc::now()).unwrap();
        let model = out.catalog.model("p1", "m").unwrap();
        assert_eq!(model.pricing.unwrap().input, Some(3.0));

        let entry = out
            .provenance
            .iter()
            .find(|e| e.field_path == "pricing.input")
            .unwrap();
        assert_eq!(entry.source, SourceId::ModelsDevHttp);
        assert_eq!(entry.priority, 110);
    }

    #[test]
    fn absent_fields_get_no_provenance() {
        let mut fragments = BTreeMap::new();
        fragments.insert(SourceId::Embedded, fragment_with_price("p1", "m", 5.0));
        let out = reconcile(&fragments, default_authority(), Utc::now()).unwrap();
        assert!(out
            .provenance
            .iter()
            .all(|e| e.field_path != "description"));
    }

    #[test]
    fn present_with_zero_participates_in_authority() {
        let mut fragments = BTreeMap::new();
        fragments.insert(SourceId::Embedded, fragment_with_price("p1", "m", 5.0));
        // free tier: explicit zero from the higher-authority source
        fragments.insert(SourceId::ModelsDevHttp, fragment_with_price("p1", "m", 0.0));

        let out = reconcile(&fragments, default_authority(), Utc::now()).unwrap();
        assert_eq!(
            out.catalog.model("p1", "m").unwrap().pricing.unwrap().input,
            Some(0.0)
        );
    }

    #[test]
    fn reconcile_is_deterministic() {
        let mut fragments = BTreeMap::new();
        fragments.insert(SourceId::Embedded, fragment_with_price("p1", "m", 5.0));
        fragments.insert(SourceId::ModelsDevHttp, fragment_with_price("p1", "m", 3.0));
        let at = Utc::now();

        let a = reconcile(&fragments, default_authority(), at).unwrap();
        let b = reconcile(&fragments, default_authority(), at).unwrap();
        assert_eq!(a.catalog, b.catalog);
        assert_eq!(a.provenance, b.provenance);
    }

    #[test]
    fn missing_catch_all_leaves_field_unset_with_warning() {
        let table = AuthorityTable::new(vec![crate::AuthorityRule {
            pattern: "name",
            source: SourceId::Embedded,
            priority: 10,
        }]);
        let mut fragments = BTreeMap::new();
        fragments.insert(SourceId::Embedded, fragment_with_price("p1", "m", 5.0));

        let out = reconcile(&fragments, &table, Utc::now()).unwrap();
        let model = out.catalog.model("p1", "m").unwrap();
        assert!(model.pricing.is_none());
        assert!(out.warnings.iter().any(|w| w.contains("pricing.input")));
    }

    #[test]
    fn validation_problems_become_warnings_not_errors() {
        let mut fragments = BTreeMap::new();
        fragments.insert(SourceId::Embedded, fragment_with_price("p1", "m", -4.0));
        let out = reconcile(&fragments, default_authority(), Utc::now()).unwrap();
        assert!(out.warnings.iter().any(|w| w.contains("negative")));
        // the value still lands; authority resolves, validation reports
        assert_eq!(
            out.catalog.model("p1", "m").unwrap().pricing.unwrap().input,
            Some(-4.0)
        );
    }

    #[test]
    fn model_missing_from_fanout_but_in_community_is_stale() {
        let mut fragments = BTreeMap::new();
        // fan-out speaks for p1 but only knows m-new
        fragments.insert(SourceId::Providers, {
            let c = Catalog::new();
            let mut p = Provider::new("p1");
            p.models.insert("m-new".to_string(), Model::new("m-new"));
            c.set_provider(p).unwrap();
            c
        });
        fragments.insert(SourceId::ModelsDevHttp, fragment_with_price("p1", "m-old", 1.0));

        let out = reconcile(&fragments, default_authority(), Utc::now()).unwrap();
        assert!(out.catalog.model("p1", "m-old").unwrap().stale);
        assert!(!out.catalog.model("p1", "m-new").unwrap().stale);
    }

    #[test]
    fn authors_union_across_fragments() {
        let mut fragments = BTreeMap::new();
        let with_author = |id: &str, name: &str| {
            let c = Catalog::new();
            let mut a = Author::new(id);
            a.name = name.to_string();
            c.set_author(a).unwrap();
            c
        };
        fragments.insert(SourceId::Embedded, with_author("acme", "Acme (baseline)"));
        fragments.insert(SourceId::ModelsDevHttp, with_author("globex", "Globex"));

        let out = reconcile(&fragments, default_authority(), Utc::now()).unwrap();
        assert_eq!(out.catalog.authors().unwrap().len(), 2);
        assert_eq!(out.catalog.author("acme").unwrap().name, "Acme (baseline)");
    }
}
