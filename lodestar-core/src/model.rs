//! Model record and its nested aggregates.
//!
//! Numeric and boolean leaves where zero/false is a meaningful upstream
//! value are `Option<T>`; `Some(0.0)` is a legitimate free-tier price and
//! the reconciler treats presence, not magnitude, as "has a value".

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single input or output modality a model supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Text,
    Image,
    Audio,
    Video,
    Pdf,
}

/// Input and output modality sets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Modalities {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input: Vec<Modality>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output: Vec<Modality>,
}

/// Capability flags reported by a source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Features {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub streaming: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_output: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<bool>,
    /// Whether the temperature control is honored at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<bool>,
}

/// Inclusive floating-point parameter range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FloatRange {
    pub min: f64,
    pub max: f64,
}

/// Inclusive integer parameter range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntRange {
    pub min: u64,
    pub max: u64,
}

/// Generation-control surface of a model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<FloatRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<FloatRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<IntRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<bool>,
    /// Deterministic seed support.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<bool>,
}

/// Token limits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
}

/// Prices per million tokens, in `currency`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_read: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_write: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<f64>,
}

/// Descriptive metadata that is not a capability.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub knowledge_cutoff: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_weights: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// A model record. Identity is the pair (provider id, model id); the same
/// model id may appear under several providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Author ids referenced by this model. Resolved against the catalog's
    /// authors collection; no back-pointers exist.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Modalities>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<Features>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<Generation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limits: Option<Limits>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pricing: Option<Pricing>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ModelMetadata>,
    /// Set when the owning provider stopped reporting the model but another
    /// source still references it. Stale models are retained, not removed.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stale: bool,
    /// Unknown fields carried through round-trips untouched.
    #[serde(flatten, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Model {
    /// An otherwise-empty model with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            authors: Vec::new(),
            description: None,
            modalities: None,
            features: None,
            generation: None,
            limits: None,
            pricing: None,
            metadata: None,
            stale: false,
            extra: serde_json::Map::new(),
        }
    }

    /// Validate numeric consistency. Returns human-readable problems; an
    /// empty vec means the record is consistent.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if let Some(limits) = &self.limits {
            if let (Some(ctx), Some(out)) = (limits.context_window, limits.output_tokens) {
                if ctx > 0 && out > 0 && ctx < out {
                    problems.push(format!(
                        "model {}: context_window {} < output_tokens {}",
                        self.id, ctx, out
                    ));
                }
            }
        }
        if let Some(pricing) = &self.pricing {
            for (leaf, value) in [
                ("pricing.input", pricing.input),
                ("pricing.output", pricing.output),
                ("pricing.cache_read", pricing.cache_read),
                ("pricing.cache_write", pricing.cache_write),
                ("pricing.reasoning", pricing.reasoning),
            ] {
                if let Some(v) = value {
                    if v < 0.0 {
                        problems.push(format!("model {}: negative {leaf} {v}", self.id));
                    }
                }
            }
        }
        problems
    }
}
