//! Lodestar Sources - Catalog Data Sources
//!
//! Uniform adapters that each produce a catalog fragment from an external
//! data origin: the compiled-in baseline, a local override directory, live
//! provider APIs fanned out concurrently, and the community metadata
//! project (models.dev) via git build or plain HTTP download.
//!
//! The reconciler, not the source, decides which fields win; a source only
//! reports what it knows.

mod deps;
mod embedded;
mod local;
mod modelsdev;
mod providers;
mod source;

pub use deps::{Dependency, DependencyResolver, ProbeOutcome, Resolution, ResolutionMode};
pub use embedded::EmbeddedSource;
pub use local::LocalSource;
pub use modelsdev::{ModelsDevGitSource, ModelsDevHttpSource};
pub use providers::ProviderApisSource;
pub use source::{
    all_source_ids, build_sources, FetchOptions, Source, SourceConfig, SourceId,
    DEFAULT_HTTP_TIMEOUT,
};
