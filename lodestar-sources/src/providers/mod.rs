//! Concurrent fan-out over per-provider model-listing APIs.
//!
//! One task per provider; results are gathered and per-provider errors are
//! joined without discarding any. A provider whose credentials are absent
//! is skipped silently. Partial success is the norm: the fragment contains
//! whatever succeeded.

mod anthropic;
mod chat_completions;

use crate::{FetchOptions, Source, SourceId};
use anthropic::AnthropicClient;
use async_trait::async_trait;
use chat_completions::ChatCompletionsClient;
use futures_util::future::join_all;
use lodestar_core::{Catalog, Error, Model, Provider, Result, SyncErrors};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct ProviderApisSource {
    providers: Vec<Provider>,
    catalog: Option<Catalog>,
}

impl ProviderApisSource {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Source for ProviderApisSource {
    fn id(&self) -> SourceId {
        SourceId::Providers
    }

    fn setup(&mut self, providers: &[Provider]) -> Result<()> {
        self.providers = providers.to_vec();
        Ok(())
    }

    async fn fetch(&mut self, ctx: CancellationToken, options: &FetchOptions) -> Result<()> {
        let mut tasks = Vec::new();
        for provider in &self.providers {
            if let Some(filter) = &options.provider_filter {
                if &provider.id != filter {
                    continue;
                }
            }
            if provider.api.is_none() {
                continue;
            }
            let credential = provider.credential_from_env();
            if credential.is_none() && provider.credentials_required != Some(false) {
                tracing::debug!(provider = %provider.id, "no credentials in environment; skipping");
                continue;
            }

            let provider = provider.config_only();
            let ctx = ctx.clone();
            let timeout = options.http_timeout;
            tasks.push(tokio::spawn(async move {
                let result = tokio::select! {
                    _ = ctx.cancelled() => Err(Error::Canceled {
                        operation: format!("fetch provider {}", provider.id),
                    }),
                    r = fetch_provider(&provider, credential, timeout) => r,
                };
                (provider, result)
            }));
        }

        let catalog = Catalog::new();
        let mut errors = SyncErrors::default();
        for joined in join_all(tasks).await {
            let Ok((mut provider, result)) = joined else {
                // A panicking fetch task loses only its own provider.
                continue;
            };
            match result {
                Ok(models) => {
                    tracing::debug!(provider = %provider.id, count = models.len(), "provider listing fetched");
                    for model in models {
                        provider.models.insert(model.id.clone(), model);
                    }
                    catalog.set_provider(provider)?;
                }
                Err(err) => {
                    tracing::warn!(provider = %provider.id, error = %err, "provider fetch failed");
                    errors.push(format!("providers/{}", provider.id), err);
                }
            }
        }
        self.catalog = Some(catalog);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Sync(errors))
        }
    }

    fn catalog(&self) -> Result<Catalog> {
        match &self.catalog {
            Some(c) => c.copy(),
            None => Ok(Catalog::new()),
        }
    }
}

/// Providers whose wire format diverges from the chat-completions shape
/// carry dedicated clients; everything else shares one parser.
async fn fetch_provider(
    provider: &Provider,
    credential: Option<String>,
    timeout: Duration,
) -> Result<Vec<Model>> {
    match provider.id.as_str() {
        "anthropic" => {
            let key = credential.ok_or_else(|| Error::Auth {
                provider: provider.id.clone(),
                mechanism: "x-api-key".to_string(),
                message: "credential required".to_string(),
            })?;
            AnthropicClient::new(provider, key, timeout)?.list_models().await
        }
        _ => {
            ChatCompletionsClient::new(provider, credential, timeout)?
                .list_models()
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodestar_core::ProviderApi;

    fn provider_with_api(id: &str, env_key: &'static str) -> Provider {
        let mut p = Provider::new(id);
        p.api = Some(ProviderApi {
            base_url: "https://api.invalid".to_string(),
            models_path: "/v1/models".to_string(),
        });
        p.env_keys = vec![env_key.to_string()];
        p.credentials_required = Some(true);
        p
    }

    #[tokio::test]
    async fn providers_without_credentials_are_skipped_not_errors() {
        let mut source = ProviderApisSource::new();
        source
            .setup(&[provider_with_api("acme", "LODESTAR_TEST_UNSET_KEY")])
            .unwrap();
        source
            .fetch(CancellationToken::new(), &FetchOptions::default())
            .await
            .unwrap();
        assert!(source.catalog().unwrap().is_empty().unwrap());
    }

    #[tokio::test]
    async fn provider_filter_limits_the_fan_out() {
        let mut source = ProviderApisSource::new();
        source
            .setup(&[
                provider_with_api("acme", "LODESTAR_TEST_UNSET_KEY"),
                provider_with_api("globex", "LODESTAR_TEST_UNSET_KEY"),
            ])
            .unwrap();
        let options = FetchOptions {
            provider_filter: Some("acme".to_string()),
            ..Default::default()
        };
        // Both providers lack credentials, so the filtered fetch is a no-op
        // rather than a network call.
        source
            .fetch(CancellationToken::new(), &options)
            .await
            .unwrap();
        assert!(source.catalog().unwrap().is_empty().unwrap());
    }

    #[tokio::test]
    async fn cancellation_aborts_inflight_requests() {
        std::env::set_var("LODESTAR_TEST_FANOUT_KEY", "k");
        let mut source = ProviderApisSource::new();
        source
            .setup(&[provider_with_api("acme", "LODESTAR_TEST_FANOUT_KEY")])
            .unwrap();
        let ctx = CancellationToken::new();
        ctx.cancel();
        let err = source
            .fetch(ctx, &FetchOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_canceled());
        std::env::remove_var("LODESTAR_TEST_FANOUT_KEY");
    }
}
