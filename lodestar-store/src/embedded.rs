//! Read-only backend over catalog files compiled into the binary.
//!
//! The embedded tree mirrors the on-disk layout byte for byte, so the same
//! YAML files can be promoted to a local override directory unchanged.

use lodestar_core::{Author, Catalog, Error, Model, Provider, Result};
use std::collections::BTreeMap;

static EMBEDDED: &[(&str, &str)] = &[
    ("authors.yaml", include_str!("../data/authors.yaml")),
    (
        "providers/anthropic/provider.yaml",
        include_str!("../data/providers/anthropic/provider.yaml"),
    ),
    (
        "providers/anthropic/models/claude-3-5-sonnet-latest.yaml",
        include_str!("../data/providers/anthropic/models/claude-3-5-sonnet-latest.yaml"),
    ),
    (
        "providers/anthropic/models/claude-3-5-haiku-latest.yaml",
        include_str!("../data/providers/anthropic/models/claude-3-5-haiku-latest.yaml"),
    ),
    (
        "providers/groq/provider.yaml",
        include_str!("../data/providers/groq/provider.yaml"),
    ),
    (
        "providers/groq/models/llama-3.3-70b-versatile.yaml",
        include_str!("../data/providers/groq/models/llama-3.3-70b-versatile.yaml"),
    ),
    (
        "providers/openai/provider.yaml",
        include_str!("../data/providers/openai/provider.yaml"),
    ),
    (
        "providers/openai/models/gpt-4o.yaml",
        include_str!("../data/providers/openai/models/gpt-4o.yaml"),
    ),
    (
        "providers/openai/models/gpt-4o-mini.yaml",
        include_str!("../data/providers/openai/models/gpt-4o-mini.yaml"),
    ),
];

fn parse_err(file: &str, err: impl std::fmt::Display) -> Error {
    Error::Parse {
        format: "yaml".to_string(),
        file: format!("embedded:{file}"),
        message: err.to_string(),
    }
}

/// Build the baseline catalog from the compiled-in snapshot.
///
/// The embedded bytes are process-global and read-only; each call returns a
/// fresh independent catalog.
pub fn embedded_catalog() -> Result<Catalog> {
    let mut providers: BTreeMap<String, Provider> = BTreeMap::new();
    let mut pending_models: Vec<(String, Model)> = Vec::new();
    let catalog = Catalog::new();

    for (path, content) in EMBEDDED {
        if *path == "authors.yaml" {
            let authors: Vec<Author> =
                serde_yaml::from_str(content).map_err(|e| parse_err(path, e))?;
            for author in authors {
                catalog.set_author(author)?;
            }
        } else if path.ends_with("/provider.yaml") {
            let provider: Provider =
                serde_yaml::from_str(content).map_err(|e| parse_err(path, e))?;
            providers.insert(provider.id.clone(), provider);
        } else {
            let provider_id = path
                .strip_prefix("providers/")
                .and_then(|rest| rest.split('/').next())
                .ok_or_else(|| parse_err(path, "unexpected embedded path"))?;
            let model: Model = serde_yaml::from_str(content).map_err(|e| parse_err(path, e))?;
            pending_models.push((provider_id.to_string(), model));
        }
    }

    for (provider_id, model) in pending_models {
        let provider = providers
            .get_mut(&provider_id)
            .ok_or_else(|| parse_err(&provider_id, "model file without provider.yaml"))?;
        provider.models.insert(model.id.clone(), model);
    }
    for provider in providers.into_values() {
        catalog.set_provider(provider)?;
    }
    Ok(catalog)
}
