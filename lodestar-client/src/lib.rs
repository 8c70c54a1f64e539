//! Lodestar Client - Catalog Façade
//!
//! A long-lived, thread-safe owner of the authoritative catalog. Reads
//! hand out deep copies under a shared lock; syncs run the pipeline and
//! swap the catalog atomically; change hooks fire after a successful
//! apply; a background ticker keeps the catalog fresh.

mod client;
mod hooks;
mod options;
mod remote;

pub use client::{default_client, Client};
pub use hooks::{ModelHook, UpdateHook};
pub use options::{ClientOptions, UpdateFn};
pub use remote::CatalogDocument;

pub use lodestar_sync::{Changeset, SyncOptions};
