//! Anthropic list-models client. The wire format is close to the
//! chat-completions shape but authenticates with `x-api-key` and a pinned
//! `anthropic-version` header, and carries display names.

use lodestar_core::{Error, Model, ModelMetadata, Provider, Result};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Deserialize)]
struct ListModelsResponse {
    #[serde(default)]
    data: Vec<WireModel>,
}

#[derive(Debug, Deserialize)]
struct WireModel {
    id: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
}

pub(crate) struct AnthropicClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
}

impl AnthropicClient {
    pub(crate) fn new(provider: &Provider, api_key: String, timeout: Duration) -> Result<Self> {
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
            url: format!("{}{}", api.base_url.trim_end_matches('/'), api.models_path),
            api_key,
        })
    }

    pub(crate) async fn list_models(&self) -> Result<Vec<Model>> {
        let response = self
            .http
            .get(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout {
                        operation: format!("GET {}", self.url),
                        duration: Duration::ZERO,
                    }
                } else {
                    Error::ExternalApi {
                        provider: "anthropic".to_string(),
                        endpoint: self.url.clone(),
                        status: e.status().map(|s| s.as_u16()).unwrap_or(0),
                        message: e.to_string(),
                    }
                }
            })?;
        let status = response.status();
        match status {
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(Error::RateLimited {
                    provider: "anthropic".to_string(),
                    retry_after: None,
                })
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(Error::Auth {
                    provider: "anthropic".to_string(),
                    mechanism: "x-api-key".to_string(),
                    message: format!("status {status}"),
                })
            }
            _ if !status.is_success() => {
                let message = response.text().await.unwrap_or_default();
                return Err(Error::ExternalApi {
                    provider: "anthropic".to_string(),
                    endpoint: self.url.clone(),
                    status: status.as_u16(),
                    message,
                });
            }
            _ => {}
        }
        let body: ListModelsResponse = response.json().await.map_err(|e| Error::Parse {
            format: "json".to_string(),
            file: self.url.clone(),
            message: e.to_string(),
        })?;
        Ok(body.data.into_iter().map(convert_model).collect())
    }
}

fn convert_model(wire: WireModel) -> Model {
    let mut model = Model::new(wire.id);
    if let Some(name) = wire.display_name {
        model.name = name;
    }
    model.authors = vec!["anthropic".to_string()];
    if let Some(created) = wire.created_at {
        if let Ok(ts) = chrono::DateTime::parse_from_rfc3339(&created) {
            model.metadata = Some(ModelMetadata {
                release_date: Some(ts.date_naive()),
                ..Default::default()
            });
        }
    }
    model
}
