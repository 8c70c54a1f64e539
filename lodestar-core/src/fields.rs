//! Field-path machinery.
//!
//! The reconciler and the differ both operate leaf-by-leaf over model,
//! provider, and author records. Each leaf is described once here: its
//! dotted path, a presence predicate, a copy operation, and an equality
//! check. Authority patterns are dotted selectors where `*` matches one
//! path segment, except that the bare pattern `*` is the catch-all and
//! matches every path.

use crate::{Author, Model, Provider};

/// One reconcilable leaf of a record of type `T`.
pub struct Leaf<T> {
    pub path: &'static str,
    /// Whether the record carries a value for this leaf. Presence, not
    /// magnitude: `Some(0.0)` is present.
    pub present: fn(&T) -> bool,
    /// Copy this leaf from `src` into `dst` if `src` has it.
    pub apply: fn(&mut T, &T),
    pub eq: fn(&T, &T) -> bool,
}

/// Top-level `String` leaf; present when non-empty.
macro_rules! string_leaf {
    ($path:literal, $field:ident) => {
        Leaf {
            path: $path,
            present: |r| !r.$field.is_empty(),
            apply: |dst, src| {
                if !src.$field.is_empty() {
                    dst.$field = src.$field.clone();
                }
            },
            eq: |a, b| a.$field == b.$field,
        }
    };
}

/// Top-level `Option` leaf.
macro_rules! opt_leaf {
    ($path:literal, $field:ident) => {
        Leaf {
            path: $path,
            present: |r| r.$field.is_some(),
            apply: |dst, src| {
                if src.$field.is_some() {
                    dst.$field = src.$field.clone();
                }
            },
            eq: |a, b| a.$field == b.$field,
        }
    };
}

/// Top-level `Vec` leaf; present when non-empty.
macro_rules! vec_leaf {
    ($path:literal, $field:ident) => {
        Leaf {
            path: $path,
            present: |r| !r.$field.is_empty(),
            apply: |dst, src| {
                if !src.$field.is_empty() {
                    dst.$field = src.$field.clone();
                }
            },
            eq: |a, b| a.$field == b.$field,
        }
    };
}

/// `Option` leaf nested inside an `Option` aggregate.
macro_rules! nested_leaf {
    ($path:literal, $agg:ident, $field:ident) => {
        Leaf {
            path: $path,
            present: |r| r.$agg.as_ref().is_some_and(|a| a.$field.is_some()),
            apply: |dst, src| {
                if let Some(a) = src.$agg.as_ref() {
                    if a.$field.is_some() {
                        dst.$agg.get_or_insert_with(Default::default).$field = a.$field.clone();
                    }
                }
            },
            eq: |x, y| {
                x.$agg.as_ref().and_then(|a| a.$field.as_ref())
                    == y.$agg.as_ref().and_then(|a| a.$field.as_ref())
            },
        }
    };
}

/// `Vec` leaf nested inside an `Option` aggregate.
macro_rules! nested_vec_leaf {
    ($path:literal, $agg:ident, $field:ident) => {
        Leaf {
            path: $path,
            present: |r| r.$agg.as_ref().is_some_and(|a| !a.$field.is_empty()),
            apply: |dst, src| {
                if let Some(a) = src.$agg.as_ref() {
                    if !a.$field.is_empty() {
                        dst.$agg.get_or_insert_with(Default::default).$field = a.$field.clone();
                    }
                }
            },
            eq: |x, y| {
                x.$agg.as_ref().map(|a| a.$field.as_slice()).unwrap_or(&[])
                    == y.$agg.as_ref().map(|a| a.$field.as_slice()).unwrap_or(&[])
            },
        }
    };
}

/// Every reconcilable leaf of [`Model`], in stable declaration order.
pub static MODEL_LEAVES: &[Leaf<Model>] = &[
    string_leaf!("name", name),
    vec_leaf!("authors", authors),
    opt_leaf!("description", description),
    nested_vec_leaf!("modalities.input", modalities, input),
    nested_vec_leaf!("modalities.output", modalities, output),
    nested_leaf!("features.streaming", features, streaming),
    nested_leaf!("features.tool_calls", features, tool_calls),
    nested_leaf!("features.tool_choice", features, tool_choice),
    nested_leaf!("features.structured_output", features, structured_output),
    nested_leaf!("features.reasoning", features, reasoning),
    nested_leaf!("features.attachments", features, attachments),
    nested_leaf!("features.temperature", features, temperature),
    nested_leaf!("generation.temperature", generation, temperature),
    nested_leaf!("generation.top_p", generation, top_p),
    nested_leaf!("generation.top_k", generation, top_k),
    nested_leaf!("generation.max_tokens", generation, max_tokens),
    nested_leaf!("generation.frequency_penalty", generation, frequency_penalty),
    nested_leaf!("generation.presence_penalty", generation, presence_penalty),
    nested_leaf!("generation.stop_sequences", generation, stop_sequences),
    nested_leaf!("generation.seed", generation, seed),
    nested_leaf!("limits.context_window", limits, context_window),
    nested_leaf!("limits.output_tokens", limits, output_tokens),
    nested_leaf!("pricing.currency", pricing, currency),
    nested_leaf!("pricing.input", pricing, input),
    nested_leaf!("pricing.output", pricing, output),
    nested_leaf!("pricing.cache_read", pricing, cache_read),
    nested_leaf!("pricing.cache_write", pricing, cache_write),
    nested_leaf!("pricing.reasoning", pricing, reasoning),
    nested_leaf!("metadata.release_date", metadata, release_date),
    nested_leaf!("metadata.last_updated", metadata, last_updated),
    nested_leaf!("metadata.knowledge_cutoff", metadata, knowledge_cutoff),
    nested_leaf!("metadata.open_weights", metadata, open_weights),
    nested_vec_leaf!("metadata.tags", metadata, tags),
];

/// Reconcilable leaves of [`Provider`] configuration. Paths carry the
/// `provider.` prefix so authority rules can target them distinctly.
pub static PROVIDER_LEAVES: &[Leaf<Provider>] = &[
    string_leaf!("provider.name", name),
    vec_leaf!("provider.aliases", aliases),
    opt_leaf!("provider.api", api),
    vec_leaf!("provider.env_keys", env_keys),
    opt_leaf!("provider.credentials_required", credentials_required),
];

/// Reconcilable leaves of [`Author`], under the `author.` prefix.
pub static AUTHOR_LEAVES: &[Leaf<Author>] = &[
    string_leaf!("author.name", name),
    opt_leaf!("author.headquarters", headquarters),
    opt_leaf!("author.url", url),
    opt_leaf!("author.description", description),
];

/// Match a dotted authority pattern against a leaf path.
///
/// `*` as a whole pattern matches everything (the catch-all). Otherwise
/// segments are compared pairwise and a `*` segment matches exactly one
/// path segment.
pub fn pattern_matches(pattern: &str, path: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    let pat: Vec<&str> = pattern.split('.').collect();
    let segs: Vec<&str> = path.split('.').collect();
    if pat.len() != segs.len() {
        return false;
    }
    pat.iter()
        .zip(segs.iter())
        .all(|(p, s)| *p == "*" || p == s)
}

/// Dotted paths of every model leaf that differs between `before` and
/// `after`, in declaration order.
pub fn changed_model_paths(before: &Model, after: &Model) -> Vec<&'static str> {
    MODEL_LEAVES
        .iter()
        .filter(|leaf| !(leaf.eq)(before, after))
        .map(|leaf| leaf.path)
        .collect()
}
