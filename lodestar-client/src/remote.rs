//! Pre-reconciled catalog exchange with a peer server.

use lodestar_core::{Author, Catalog, Endpoint, Error, Provider, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// The wire shape of a whole catalog, as served by a peer's HTTP API.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub providers: Vec<Provider>,
    #[serde(default)]
    pub authors: Vec<Author>,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

impl CatalogDocument {
    pub fn from_catalog(catalog: &Catalog) -> Result<Self> {
        Ok(Self {
            providers: catalog.providers()?,
            authors: catalog.authors()?,
            endpoints: catalog.endpoints()?,
        })
    }

    pub fn into_catalog(self) -> Result<Catalog> {
        let catalog = Catalog::new();
        for provider in self.providers {
            catalog.set_provider(provider)?;
        }
        for author in self.authors {
            catalog.set_author(author)?;
        }
        for endpoint in self.endpoints {
            catalog.set_endpoint(endpoint)?;
        }
        Ok(catalog)
    }
}

/// Fetch the peer's reconciled catalog.
pub(crate) async fn fetch_remote_catalog(
    url: &str,
    api_key: Option<&str>,
    ctx: &CancellationToken,
    timeout: Duration,
) -> Result<Catalog> {
    let endpoint = format!("{}/v1/catalog", url.trim_end_matches('/'));
    let http = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("lodestar/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::Config {
            component: "http client".to_string(),
            message: e.to_string(),
        })?;

    let request = async {
        let mut builder = http.get(&endpoint);
        if let Some(key) = api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await.map_err(|e| Error::ExternalApi {
            provider: "remote".to_string(),
            endpoint: endpoint.clone(),
            status: e.status().map(|s| s.as_u16()).unwrap_or(0),
            message: e.to_string(),
        })?;
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::Auth {
                provider: "remote".to_string(),
                mechanism: "bearer".to_string(),
                message: format!("status {status}"),
            });
        }
        if !status.is_success() {
            return Err(Error::ExternalApi {
                provider: "remote".to_string(),
                endpoint: endpoint.clone(),
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        let document: CatalogDocument = response.json().await.map_err(|e| Error::Parse {
            format: "json".to_string(),
            file: endpoint.clone(),
            message: e.to_string(),
        })?;
        document.into_catalog()
    };

    tokio::select! {
        _ = ctx.cancelled() => Err(Error::Canceled {
            operation: format!("GET {endpoint}"),
        }),
        catalog = request => catalog,
    }
}
