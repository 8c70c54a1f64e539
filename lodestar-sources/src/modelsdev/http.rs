//! Download the published models.dev document with a file cache.

use crate::{FetchOptions, Source, SourceId};
use async_trait::async_trait;
use lodestar_core::{Catalog, Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const API_URL: &str = "https://models.dev/api.json";

/// Cached copies younger than this are served without a network call.
const CACHE_TTL: Duration = Duration::from_secs(60 * 60);

pub struct ModelsDevHttpSource {
    cache_path: PathBuf,
    catalog: Option<Catalog>,
}

impl ModelsDevHttpSource {
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            cache_path: cache_dir.join("models-dev").join("api.json"),
            catalog: None,
        }
    }

    fn cache_age(&self) -> Option<Duration> {
        let modified = std::fs::metadata(&self.cache_path).ok()?.modified().ok()?;
        modified.elapsed().ok()
    }

    fn read_cache(&self) -> Result<String> {
        std::fs::read_to_string(&self.cache_path)
            .map_err(|e| Error::io("read cache", &self.cache_path, e))
    }

    fn write_cache(&self, body: &str) -> Result<()> {
        if let Some(parent) = self.cache_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io("create dir", parent, e))?;
        }
        let tmp = self.cache_path.with_extension("json.tmp");
        std::fs::write(&tmp, body).map_err(|e| Error::io("write cache", &tmp, e))?;
        std::fs::rename(&tmp, &self.cache_path).map_err(|e| Error::io("rename", &self.cache_path, e))
    }

    async fn download(&self, ctx: &CancellationToken, timeout: Duration) -> Result<String> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("lodestar/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config {
                component: "http client".to_string(),
                message: e.to_string(),
            })?;
        let request = async {
            let response = http.get(API_URL).send().await.map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout {
                        operation: format!("GET {API_URL}"),
                        duration: timeout,
                    }
                } else {
                    Error::ExternalApi {
                        provider: "models.dev".to_string(),
                        endpoint: API_URL.to_string(),
                        status: e.status().map(|s| s.as_u16()).unwrap_or(0),
                        message: e.to_string(),
                    }
                }
            })?;
            let status = response.status();
            if !status.is_success() {
                return Err(Error::ExternalApi {
                    provider: "models.dev".to_string(),
                    endpoint: API_URL.to_string(),
                    status: status.as_u16(),
                    message: response.text().await.unwrap_or_default(),
                });
            }
            response.text().await.map_err(|e| Error::Parse {
                format: "json".to_string(),
                file: API_URL.to_string(),
                message: e.to_string(),
            })
        };
        tokio::select! {
            _ = ctx.cancelled() => Err(Error::Canceled {
                operation: format!("GET {API_URL}"),
            }),
            body = request => body,
        }
    }
}

#[async_trait]
impl Source for ModelsDevHttpSource {
    fn id(&self) -> SourceId {
        SourceId::ModelsDevHttp
    }

    async fn fetch(&mut self, ctx: CancellationToken, options: &FetchOptions) -> Result<()> {
        let cache_fresh = self
            .cache_age()
            .map(|age| age < CACHE_TTL)
            .unwrap_or(false);

        let body = if cache_fresh && !options.fresh {
            tracing::debug!(path = %self.cache_path.display(), "using cached models.dev document");
            self.read_cache()?
        } else {
            match self.download(&ctx, options.http_timeout).await {
                Ok(body) => {
                    self.write_cache(&body)?;
                    body
                }
                // A stale cache beats no data, but cancellation is not a
                // fallback case.
                Err(err) if !err.is_canceled() && self.cache_path.is_file() => {
                    tracing::warn!(error = %err, "models.dev download failed; serving stale cache");
                    self.read_cache()?
                }
                Err(err) => return Err(err),
            }
        };

        self.catalog = Some(super::parse_document(&body, API_URL)?);
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

    const SAMPLE: &str = r#"{"acme": {"id": "acme", "models": {"m1": {"id": "m1"}}}}"#;

    #[tokio::test]
    async fn fresh_cache_is_served_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = ModelsDevHttpSource::new(dir.path());
        source.write_cache(SAMPLE).unwrap();

        source
            .fetch(CancellationToken::new(), &FetchOptions::default())
            .await
            .unwrap();
        assert!(source.catalog().unwrap().model("acme", "m1").is_ok());
    }

    #[tokio::test]
    async fn canceled_fetch_reports_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = ModelsDevHttpSource::new(dir.path());
        let ctx = CancellationToken::new();
        ctx.cancel();
        let err = source
            .fetch(ctx, &FetchOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_canceled());
    }

    #[test]
    fn cache_age_of_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let source = ModelsDevHttpSource::new(dir.path());
        assert!(source.cache_age().is_none());
    }
}
