//! Lodestar Store - Catalog Persistence
//!
//! Serializes a catalog to a human-editable directory tree and loads one
//! back, plus a read-only backend over bytes compiled into the binary.
//!
//! Layout:
//!
//! ```text
//! <root>/
//!   providers.yaml              # index of provider ids
//!   authors.yaml                # all authors
//!   providers/<id>/provider.yaml
//!   providers/<id>/models/<model-id>.yaml
//! ```
//!
//! Every file write is atomic (write to a temp file, then rename).

mod embedded;
mod fs;

pub use embedded::embedded_catalog;
pub use fs::{load_dir, save_dir};
