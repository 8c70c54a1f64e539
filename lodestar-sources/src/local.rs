//! Local-filesystem source: operator-edited overrides in the on-disk
//! catalog layout.

use crate::{FetchOptions, Source, SourceId};
use async_trait::async_trait;
use lodestar_core::{Catalog, Result};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct LocalSource {
    path: Option<PathBuf>,
    catalog: Option<Catalog>,
}

impl LocalSource {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            catalog: None,
        }
    }
}

#[async_trait]
impl Source for LocalSource {
    fn id(&self) -> SourceId {
        SourceId::Local
    }

    async fn fetch(&mut self, _ctx: CancellationToken, options: &FetchOptions) -> Result<()> {
        // A per-sync override directory takes precedence over the path the
        // client was constructed with.
        let path = options
            .sources_dir
            .clone()
            .or_else(|| self.path.clone());
        let Some(path) = path else {
            tracing::debug!("local source has no directory configured; producing empty fragment");
            self.catalog = Some(Catalog::new());
            return Ok(());
        };
        self.catalog = Some(lodestar_store::load_dir(&path)?);
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
    use lodestar_core::{Model, Provider};

    #[tokio::test]
    async fn unconfigured_local_source_is_empty() {
        let mut source = LocalSource::new(None);
        source
            .fetch(CancellationToken::new(), &FetchOptions::default())
            .await
            .unwrap();
        assert!(source.catalog().unwrap().is_empty().unwrap());
    }

    #[tokio::test]
    async fn reads_overrides_from_sources_dir() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::new();
        let mut provider = Provider::new("acme");
        let mut model = Model::new("m1");
        model.description = Some("local override".to_string());
        provider.models.insert(model.id.clone(), model);
        catalog.set_provider(provider).unwrap();
        lodestar_store::save_dir(&catalog, dir.path()).unwrap();

        let mut source = LocalSource::new(None);
        let options = FetchOptions {
            sources_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        source
            .fetch(CancellationToken::new(), &options)
            .await
            .unwrap();
        let fragment = source.catalog().unwrap();
        assert_eq!(
            fragment.model("acme", "m1").unwrap().description.as_deref(),
            Some("local override")
        );
    }
}
