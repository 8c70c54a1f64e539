//! Shared list-models client for chat-completions-style provider APIs.
//!
//! Most providers expose `GET {base_url}{models_path}` behind a bearer
//! token and answer `{"object": "list", "data": [{"id": ...}, ...]}`. Only
//! providers whose wire format is incompatible carry a custom client.

use chrono::DateTime;
use lodestar_core::{Error, Model, ModelMetadata, Provider, Result};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ListModelsResponse {
    #[serde(default)]
    data: Vec<WireModel>,
}

#[derive(Debug, Deserialize)]
struct WireModel {
    id: String,
    #[serde(default)]
    created: Option<i64>,
    #[serde(default)]
    owned_by: Option<String>,
}

pub(crate) struct ChatCompletionsClient {
    http: reqwest::Client,
    provider_id: String,
    url: String,
    api_key: Option<String>,
}

impl ChatCompletionsClient {
    pub(crate) fn new(provider: &Provider, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let api = provider.api.as_ref().ok_or_else(|| Error::Config {
            component: format!("provider {}", provider.id),
            message: "no API endpoint configured".to_string(),
        })?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("lodestar/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config {
                component: "http client".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            http,
            provider_id: provider.id.clone(),
            url: format!("{}{}", api.base_url.trim_end_matches('/'), api.models_path),
            api_key,
        })
    }

    pub(crate) async fn list_models(&self) -> Result<Vec<Model>> {
        let mut request = self.http.get(&self.url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(Error::RateLimited {
                provider: self.provider_id.clone(),
                retry_after,
            });
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::Auth {
                provider: self.provider_id.clone(),
                mechanism: "bearer".to_string(),
                message: format!("status {status}"),
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::ExternalApi {
                provider: self.provider_id.clone(),
                endpoint: self.url.clone(),
                status: status.as_u16(),
                message,
            });
        }
        let body: ListModelsResponse = response.json().await.map_err(|e| Error::Parse {
            format: "json".to_string(),
            file: self.url.clone(),
            message: e.to_string(),
        })?;
        Ok(body.data.into_iter().map(convert_model).collect())
    }

    fn transport_error(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                operation: format!("GET {}", self.url),
                duration: Duration::ZERO,
            }
        } else {
            Error::ExternalApi {
                provider: self.provider_id.clone(),
                endpoint: self.url.clone(),
                status: err.status().map(|s| s.as_u16()).unwrap_or(0),
                message: err.to_string(),
            }
        }
    }
}

fn convert_model(wire: WireModel) -> Model {
    let mut model = Model::new(wire.id);
    if let Some(owner) = wire.owned_by {
        // "system" is a placeholder owner in several provider listings.
        if !owner.is_empty() && owner != "system" {
            model.authors = vec![owner];
        }
    }
    if let Some(created) = wire.created {
        if let Some(ts) = DateTime::from_timestamp(created, 0) {
            model.metadata = Some(ModelMetadata {
                release_date: Some(ts.date_naive()),
                ..Default::default()
            });
        }
    }
    model
}
