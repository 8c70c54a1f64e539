//! Community metadata (models.dev) sources.
//!
//! Both variants produce the same normalized `api.json` document; the git
//! source builds it from a working tree, the http source downloads the
//! published copy. The parsed schema maps onto catalog fragments here so
//! the two fetch paths stay byte-compatible.

mod git;
mod http;

pub use git::ModelsDevGitSource;
pub use http::ModelsDevHttpSource;

use chrono::NaiveDate;
use lodestar_core::{
    Catalog, Error, Features, Limits, Modalities, Modality, Model, ModelMetadata, Pricing,
    Provider, ProviderApi, Result,
};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
struct DevProvider {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    env: Vec<String>,
    #[serde(default)]
    api: Option<String>,
    #[serde(default)]
    models: BTreeMap<String, DevModel>,
}

#[derive(Debug, Deserialize)]
struct DevModel {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    attachment: Option<bool>,
    #[serde(default)]
    reasoning: Option<bool>,
    #[serde(default)]
    temperature: Option<bool>,
    #[serde(default)]
    tool_call: Option<bool>,
    #[serde(default)]
    structured_output: Option<bool>,
    #[serde(default)]
    knowledge: Option<String>,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    last_updated: Option<String>,
    #[serde(default)]
    open_weights: Option<bool>,
    #[serde(default)]
    modalities: Option<DevModalities>,
    #[serde(default)]
    cost: Option<DevCost>,
    #[serde(default)]
    limit: Option<DevLimit>,
}

#[derive(Debug, Default, Deserialize)]
struct DevModalities {
    #[serde(default)]
    input: Vec<String>,
    #[serde(default)]
    output: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DevCost {
    #[serde(default)]
    input: Option<f64>,
    #[serde(default)]
    output: Option<f64>,
    #[serde(default)]
    cache_read: Option<f64>,
    #[serde(default)]
    cache_write: Option<f64>,
    #[serde(default)]
    reasoning: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DevLimit {
    #[serde(default)]
    context: Option<u64>,
    #[serde(default)]
    output: Option<u64>,
}

/// Dates in the document are `YYYY-MM-DD`, occasionally truncated to
/// `YYYY-MM` or `YYYY`. Truncated dates snap to the first of the period.
fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d"))
        .or_else(|_| NaiveDate::parse_from_str(&format!("{value}-01-01"), "%Y-%m-%d"))
        .ok()
}

fn parse_modality(value: &str) -> Option<Modality> {
    match value {
        "text" => Some(Modality::Text),
        "image" => Some(Modality::Image),
        "audio" => Some(Modality::Audio),
        "video" => Some(Modality::Video),
        "pdf" => Some(Modality::Pdf),
        _ => None,
    }
}

fn convert_model(dev: DevModel) -> Model {
    let mut model = Model::new(dev.id);
    if let Some(name) = dev.name {
        model.name = name;
    }

    let features = Features {
        tool_calls: dev.tool_call,
        structured_output: dev.structured_output,
        reasoning: dev.reasoning,
        attachments: dev.attachment,
        temperature: dev.temperature,
        ..Default::default()
    };
    if features != Features::default() {
        model.features = Some(features);
    }

    if let Some(modalities) = dev.modalities {
        let converted = Modalities {
            input: modalities.input.iter().filter_map(|m| parse_modality(m)).collect(),
            output: modalities.output.iter().filter_map(|m| parse_modality(m)).collect(),
        };
        if converted != Modalities::default() {
            model.modalities = Some(converted);
        }
    }

    if let Some(cost) = dev.cost {
        model.pricing = Some(Pricing {
            currency: Some("USD".to_string()),
            input: cost.input,
            output: cost.output,
            cache_read: cost.cache_read,
            cache_write: cost.cache_write,
            reasoning: cost.reasoning,
        });
    }

    if let Some(limit) = dev.limit {
        model.limits = Some(Limits {
            context_window: limit.context,
            output_tokens: limit.output,
        });
    }

    let metadata = ModelMetadata {
        release_date: dev.release_date.as_deref().and_then(parse_date),
        last_updated: dev.last_updated.as_deref().and_then(parse_date),
        knowledge_cutoff: dev.knowledge.as_deref().and_then(parse_date),
        open_weights: dev.open_weights,
        tags: Vec::new(),
    };
    if metadata != ModelMetadata::default() {
        model.metadata = Some(metadata);
    }
    model
}

/// Parse the normalized document into a catalog fragment.
pub(crate) fn parse_document(json: &str, file: &str) -> Result<Catalog> {
    let document: BTreeMap<String, DevProvider> =
        serde_json::from_str(json).map_err(|e| Error::Parse {
            format: "json".to_string(),
            file: file.to_string(),
            message: e.to_string(),
        })?;

    let catalog = Catalog::new();
    for (key, dev) in document {
        let mut provider = Provider::new(if dev.id.is_empty() { key } else { dev.id.clone() });
        if let Some(name) = dev.name {
            provider.name = name;
        }
        provider.env_keys = dev.env;
        if let Some(api) = dev.api {
            provider.api = Some(ProviderApi {
                base_url: api,
                models_path: "/v1/models".to_string(),
            });
        }
        for (_, dev_model) in dev.models {
            let model = convert_model(dev_model);
            provider.models.insert(model.id.clone(), model);
        }
        catalog.set_provider(provider)?;
    }
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "anthropic": {
            "id": "anthropic",
            "name": "Anthropic",
            "env": ["ANTHROPIC_API_KEY"],
            "api": "https://api.anthropic.com",
            "models": {
                "claude-3-5-sonnet-latest": {
                    "id": "claude-3-5-sonnet-latest",
                    "name": "Claude 3.5 Sonnet",
                    "attachment": true,
                    "reasoning": false,
                    "temperature": true,
                    "tool_call": true,
                    "knowledge": "2024-04",
                    "release_date": "2024-10-22",
                    "modalities": {"input": ["text", "image", "pdf"], "output": ["text"]},
                    "open_weights": false,
                    "cost": {"input": 3, "output": 15, "cache_read": 0.3},
                    "limit": {"context": 200000, "output": 8192}
                }
            }
        }
    }"#;

    #[test]
    fn parses_the_normalized_document() {
        let catalog = parse_document(SAMPLE, "api.json").unwrap();
        let model = catalog
            .model("anthropic", "claude-3-5-sonnet-latest")
            .unwrap();
        assert_eq!(model.name, "Claude 3.5 Sonnet");
        let features = model.features.as_ref().unwrap();
        assert_eq!(features.tool_calls, Some(true));
        assert_eq!(features.reasoning, Some(false));
        assert_eq!(model.pricing.as_ref().unwrap().input, Some(3.0));
        assert_eq!(model.limits.as_ref().unwrap().context_window, Some(200_000));
        assert_eq!(
            model.modalities.as_ref().unwrap().input,
            vec![Modality::Text, Modality::Image, Modality::Pdf]
        );
    }

    #[test]
    fn truncated_dates_snap_to_period_start() {
        assert_eq!(parse_date("2024-10-22").unwrap().to_string(), "2024-10-22");
        assert_eq!(parse_date("2024-04").unwrap().to_string(), "2024-04-01");
        assert_eq!(parse_date("2023").unwrap().to_string(), "2023-01-01");
        assert!(parse_date("soon").is_none());
    }

    #[test]
    fn explicit_false_flags_are_present_values() {
        // reasoning: false must survive as Some(false), not be dropped:
        // the reconciler distinguishes "reported false" from "unreported".
        let catalog = parse_document(SAMPLE, "api.json").unwrap();
        let model = catalog
            .model("anthropic", "claude-3-5-sonnet-latest")
            .unwrap();
        assert_eq!(model.features.as_ref().unwrap().reasoning, Some(false));
        assert_eq!(model.metadata.as_ref().unwrap().open_weights, Some(false));
    }

    #[test]
    fn malformed_document_is_a_parse_error() {
        let err = parse_document("not json", "api.json").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }
}
