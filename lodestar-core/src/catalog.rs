//! The catalog aggregate.
//!
//! Four keyed collections, each behind its own readers-writer lock. Every
//! read hands back a deep copy, so nothing a caller holds can alias stored
//! state. A poisoned lock surfaces as [`Error::LockPoisoned`] rather than a
//! panic.

use crate::{Author, Endpoint, Error, Model, Provider, ResourceKind, Result, MODEL_LEAVES, PROVIDER_LEAVES};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// How a two-way merge treats key collisions.
///
/// These are the simple merges used by source catalog builders. The N-way
/// authority-driven merge is the reconciler's job, not the catalog's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// The other catalog's values overwrite on key collision.
    ReplaceAll,
    /// The other catalog's values fill only leaves the receiver is missing.
    EnrichEmpty,
}

/// In-memory container of providers, authors, endpoints, and the derived
/// all-models view.
#[derive(Debug, Default)]
pub struct Catalog {
    providers: RwLock<BTreeMap<String, Provider>>,
    authors: RwLock<BTreeMap<String, Author>>,
    endpoints: RwLock<BTreeMap<String, Endpoint>>,
}

fn read<T>(lock: &RwLock<T>) -> Result<std::sync::RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| Error::LockPoisoned)
}

fn write<T>(lock: &RwLock<T>) -> Result<std::sync::RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| Error::LockPoisoned)
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Reads. All return independent deep copies.
    // ------------------------------------------------------------------

    pub fn provider(&self, id: &str) -> Result<Provider> {
        read(&self.providers)?
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found(ResourceKind::Provider, id))
    }

    pub fn author(&self, id: &str) -> Result<Author> {
        read(&self.authors)?
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found(ResourceKind::Author, id))
    }

    pub fn endpoint(&self, id: &str) -> Result<Endpoint> {
        read(&self.endpoints)?
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found(ResourceKind::Endpoint, id))
    }

    pub fn providers(&self) -> Result<Vec<Provider>> {
        Ok(read(&self.providers)?.values().cloned().collect())
    }

    pub fn authors(&self) -> Result<Vec<Author>> {
        Ok(read(&self.authors)?.values().cloned().collect())
    }

    pub fn endpoints(&self) -> Result<Vec<Endpoint>> {
        Ok(read(&self.endpoints)?.values().cloned().collect())
    }

    /// The derived all-models view, flattened across providers and keyed by
    /// owning provider id.
    pub fn models(&self) -> Result<Vec<(String, Model)>> {
        let providers = read(&self.providers)?;
        let mut out = Vec::new();
        for provider in providers.values() {
            for model in provider.models.values() {
                out.push((provider.id.clone(), model.clone()));
            }
        }
        Ok(out)
    }

    pub fn model(&self, provider_id: &str, model_id: &str) -> Result<Model> {
        let providers = read(&self.providers)?;
        let provider = providers
            .get(provider_id)
            .ok_or_else(|| Error::not_found(ResourceKind::Provider, provider_id))?;
        provider
            .models
            .get(model_id)
            .cloned()
            .ok_or_else(|| Error::not_found(ResourceKind::Model, format!("{provider_id}/{model_id}")))
    }

    // ------------------------------------------------------------------
    // Writes. Each takes the exclusive lock of the one collection mutated.
    // ------------------------------------------------------------------

    /// Insert or replace a provider.
    pub fn set_provider(&self, provider: Provider) -> Result<()> {
        write(&self.providers)?.insert(provider.id.clone(), provider);
        Ok(())
    }

    /// Insert a provider, failing if the id is already taken.
    pub fn insert_provider(&self, provider: Provider) -> Result<()> {
        let mut providers = write(&self.providers)?;
        if providers.contains_key(&provider.id) {
            return Err(Error::already_exists(ResourceKind::Provider, provider.id));
        }
        providers.insert(provider.id.clone(), provider);
        Ok(())
    }

    pub fn delete_provider(&self, id: &str) -> Result<()> {
        write(&self.providers)?
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::not_found(ResourceKind::Provider, id))
    }

    pub fn set_author(&self, author: Author) -> Result<()> {
        write(&self.authors)?.insert(author.id.clone(), author);
        Ok(())
    }

    pub fn insert_author(&self, author: Author) -> Result<()> {
        let mut authors = write(&self.authors)?;
        if authors.contains_key(&author.id) {
            return Err(Error::already_exists(ResourceKind::Author, author.id));
        }
        authors.insert(author.id.clone(), author);
        Ok(())
    }

    pub fn delete_author(&self, id: &str) -> Result<()> {
        write(&self.authors)?
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::not_found(ResourceKind::Author, id))
    }

    pub fn set_endpoint(&self, endpoint: Endpoint) -> Result<()> {
        write(&self.endpoints)?.insert(endpoint.id.clone(), endpoint);
        Ok(())
    }

    pub fn delete_endpoint(&self, id: &str) -> Result<()> {
        write(&self.endpoints)?
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::not_found(ResourceKind::Endpoint, id))
    }

    /// Insert or replace a model under an existing provider.
    pub fn set_model(&self, provider_id: &str, model: Model) -> Result<()> {
        let mut providers = write(&self.providers)?;
        let provider = providers
            .get_mut(provider_id)
            .ok_or_else(|| Error::not_found(ResourceKind::Provider, provider_id))?;
        provider.models.insert(model.id.clone(), model);
        Ok(())
    }

    pub fn delete_model(&self, provider_id: &str, model_id: &str) -> Result<()> {
        let mut providers = write(&self.providers)?;
        let provider = providers
            .get_mut(provider_id)
            .ok_or_else(|| Error::not_found(ResourceKind::Provider, provider_id))?;
        provider
            .models
            .remove(model_id)
            .map(|_| ())
            .ok_or_else(|| Error::not_found(ResourceKind::Model, format!("{provider_id}/{model_id}")))
    }

    // ------------------------------------------------------------------
    // Copy and merge
    // ------------------------------------------------------------------

    /// An independent deep copy. Mutating either catalog afterwards leaves
    /// the other unchanged.
    pub fn copy(&self) -> Result<Catalog> {
        Ok(Catalog {
            providers: RwLock::new(read(&self.providers)?.clone()),
            authors: RwLock::new(read(&self.authors)?.clone()),
            endpoints: RwLock::new(read(&self.endpoints)?.clone()),
        })
    }

    /// Two-way merge of `other` into `self`.
    pub fn merge(&self, other: &Catalog, strategy: MergeStrategy) -> Result<()> {
        {
            let other_providers = read(&other.providers)?;
            let mut providers = write(&self.providers)?;
            for (id, incoming) in other_providers.iter() {
                match providers.get_mut(id) {
                    None => {
                        providers.insert(id.clone(), incoming.clone());
                    }
                    Some(existing) => match strategy {
                        MergeStrategy::ReplaceAll => {
                            for leaf in PROVIDER_LEAVES {
                                (leaf.apply)(existing, incoming);
                            }
                            for (model_id, model) in &incoming.models {
                                existing.models.insert(model_id.clone(), model.clone());
                            }
                        }
                        MergeStrategy::EnrichEmpty => {
                            for leaf in PROVIDER_LEAVES {
                                if !(leaf.present)(existing) {
                                    (leaf.apply)(existing, incoming);
                                }
                            }
                            for (model_id, model) in &incoming.models {
                                match existing.models.entry(model_id.clone()) {
                                    Entry::Vacant(slot) => {
                                        slot.insert(model.clone());
                                    }
                                    Entry::Occupied(mut slot) => {
                                        let current = slot.get_mut();
                                        for leaf in MODEL_LEAVES {
                                            if !(leaf.present)(current) {
                                                (leaf.apply)(current, model);
                                            }
                                        }
                                    }
                                }
                            }
                        }
                    },
                }
            }
        }
        {
            let other_authors = read(&other.authors)?;
            let mut authors = write(&self.authors)?;
            for (id, incoming) in other_authors.iter() {
                let keep_existing = strategy == MergeStrategy::EnrichEmpty;
                if !keep_existing || !authors.contains_key(id) {
                    authors.insert(id.clone(), incoming.clone());
                }
            }
        }
        {
            let other_endpoints = read(&other.endpoints)?;
            let mut endpoints = write(&self.endpoints)?;
            for (id, incoming) in other_endpoints.iter() {
                let keep_existing = strategy == MergeStrategy::EnrichEmpty;
                if !keep_existing || !endpoints.contains_key(id) {
                    endpoints.insert(id.clone(), incoming.clone());
                }
            }
        }
        Ok(())
    }

    /// True when no collection holds any record.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(read(&self.providers)?.is_empty()
            && read(&self.authors)?.is_empty()
            && read(&self.endpoints)?.is_empty())
    }

    /// Author ids referenced by models but absent from the authors
    /// collection. Dangling references are tolerated on read; loaders and
    /// tests treat a non-empty result as a defect.
    pub fn dangling_author_refs(&self) -> Result<Vec<String>> {
        let authors = read(&self.authors)?;
        let providers = read(&self.providers)?;
        let mut missing = std::collections::BTreeSet::new();
        for provider in providers.values() {
            for model in provider.models.values() {
                for author_id in &model.authors {
                    if !authors.contains_key(author_id) {
                        missing.insert(author_id.clone());
                    }
                }
            }
        }
        Ok(missing.into_iter().collect())
    }
}

impl PartialEq for Catalog {
    fn eq(&self, other: &Self) -> bool {
        let (Ok(p1), Ok(p2)) = (self.providers.read(), other.providers.read()) else {
            return false;
        };
        let (Ok(a1), Ok(a2)) = (self.authors.read(), other.authors.read()) else {
            return false;
        };
        let (Ok(e1), Ok(e2)) = (self.endpoints.read(), other.endpoints.read()) else {
            return false;
        };
        *p1 == *p2 && *a1 == *a2 && *e1 == *e2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Pricing;

    fn sample() -> Catalog {
        let catalog = Catalog::new();
        let mut provider = Provider::new("acme");
        provider.name = "Acme".to_string();
        let mut model = Model::new("acme-1");
        model.name = "Acme One".to_string();
        provider.models.insert(model.id.clone(), model);
        catalog.set_provider(provider).unwrap();
        catalog.set_author(Author::new("acme-labs")).unwrap();
        catalog
    }

    #[test]
    fn reads_return_deep_copies() {
        let catalog = sample();
        let mut copy = catalog.provider("acme").unwrap();
        copy.name = "Mutated".to_string();
        copy.models.clear();
        assert_eq!(catalog.provider("acme").unwrap().name, "Acme");
        assert_eq!(catalog.provider("acme").unwrap().models.len(), 1);
    }

    #[test]
    fn unknown_ids_fail_typed() {
        let catalog = sample();
        assert!(catalog.provider("ghost").unwrap_err().is_not_found());
        assert!(catalog.model("acme", "ghost").unwrap_err().is_not_found());
        assert!(catalog.author("ghost").unwrap_err().is_not_found());
    }

    #[test]
    fn insert_rejects_duplicates() {
        let catalog = sample();
        let err = catalog.insert_provider(Provider::new("acme")).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
    }

    #[test]
    fn copy_is_independent() {
        let catalog = sample();
        let copy = catalog.copy().unwrap();
        assert_eq!(catalog, copy);
        copy.set_author(Author::new("other")).unwrap();
        assert_ne!(catalog, copy);
        assert!(catalog.author("other").is_err());
    }

    #[test]
    fn merge_replace_all_overwrites() {
        let catalog = sample();
        let other = Catalog::new();
        let mut provider = Provider::new("acme");
        provider.name = "Acme Rebranded".to_string();
        let mut model = Model::new("acme-1");
        model.pricing = Some(Pricing {
            input: Some(1.0),
            ..Default::default()
        });
        provider.models.insert(model.id.clone(), model);
        other.set_provider(provider).unwrap();

        catalog.merge(&other, MergeStrategy::ReplaceAll).unwrap();
        assert_eq!(catalog.provider("acme").unwrap().name, "Acme Rebranded");
        // replaced model loses the name it had before
        assert!(catalog.model("acme", "acme-1").unwrap().name.is_empty());
    }

    #[test]
    fn merge_enrich_empty_fills_gaps_only() {
        let catalog = sample();
        let other = Catalog::new();
        let mut provider = Provider::new("acme");
        provider.name = "Acme Rebranded".to_string();
        let mut model = Model::new("acme-1");
        model.name = "Ignored".to_string();
        model.description = Some("filled in".to_string());
        provider.models.insert(model.id.clone(), model);
        other.set_provider(provider).unwrap();

        catalog.merge(&other, MergeStrategy::EnrichEmpty).unwrap();
        let merged = catalog.model("acme", "acme-1").unwrap();
        assert_eq!(catalog.provider("acme").unwrap().name, "Acme");
        assert_eq!(merged.name, "Acme One");
        assert_eq!(merged.description.as_deref(), Some("filled in"));
    }

    #[test]
    fn set_model_requires_provider() {
        let catalog = Catalog::new();
        let err = catalog.set_model("ghost", Model::new("m")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn dangling_author_refs_reported() {
        let catalog = sample();
        let mut model = Model::new("acme-2");
        model.authors = vec!["unknown-author".to_string()];
        catalog.set_model("acme", model).unwrap();
        assert_eq!(catalog.dangling_author_refs().unwrap(), vec!["unknown-author"]);
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_model() -> impl Strategy<Value = Model> {
        (
            "[a-z][a-z0-9-]{0,12}",
            proptest::option::of(0.0f64..100.0),
            proptest::option::of(1_000u64..2_000_000),
        )
            .prop_map(|(id, input_price, context)| {
                let mut m = Model::new(id);
                if let Some(p) = input_price {
                    m.pricing = Some(Pricing {
                        input: Some(p),
                        ..Default::default()
                    });
                }
                if let Some(c) = context {
                    m.limits = Some(crate::Limits {
                        context_window: Some(c),
                        output_tokens: None,
                    });
                }
                m
            })
    }

    use crate::Pricing;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_copy_then_mutate_does_not_leak(model in arb_model()) {
            let catalog = Catalog::new();
            let mut provider = Provider::new("p");
            provider.models.insert(model.id.clone(), model.clone());
            catalog.set_provider(provider).unwrap();

            let copy = catalog.copy().unwrap();
            prop_assert_eq!(&catalog, &copy);

            copy.set_model("p", Model::new("INJECTED")).unwrap();
            prop_assert!(catalog.model("p", "INJECTED").is_err());
            prop_assert_eq!(catalog.model("p", &model.id).unwrap(), model);
        }
    }
}
