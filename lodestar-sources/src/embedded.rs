//! The compiled-in baseline as a source. Priority floor at reconciliation.

use crate::{FetchOptions, Source, SourceId};
use async_trait::async_trait;
use lodestar_core::{Catalog, Result};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct EmbeddedSource {
    catalog: Option<Catalog>,
}

impl EmbeddedSource {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Source for EmbeddedSource {
    fn id(&self) -> SourceId {
        SourceId::Embedded
    }

    /// The baseline is the one source sync cannot proceed without.
    fn is_optional(&self) -> bool {
        false
    }

    async fn fetch(&mut self, _ctx: CancellationToken, _options: &FetchOptions) -> Result<()> {
        self.catalog = Some(lodestar_store::embedded_catalog()?);
        Ok(())
    }

    fn catalog(&self) -> Result<Catalog> {
        match &self.catalog {
            Some(c) => c.copy(),
            None => Ok(Catalog::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_deserializes_the_baseline() {
        let mut source = EmbeddedSource::new();
        source
            .fetch(CancellationToken::new(), &FetchOptions::default())
            .await
            .unwrap();
        let catalog = source.catalog().unwrap();
        assert!(!catalog.models().unwrap().is_empty());
    }
}
