//! Chat-completion pipeline (§4.F): resolves a route, selects a provider,
//! dispatches through the matching adapter, and retries across the
//! remaining pool on retryable failures.
//!
//! Grounded on `process_chat_completion`/`stream_chat_completion` in the
//! original service — the tried-provider set, abort-on-4xx rule, and
//! last-error surfacing follow that control flow almost exactly.

use crate::crypto;
use crate::domain::Provider;
use crate::error::{GatewayError, ProviderError};
use crate::models::{ChatRequest, ChatResponse, StreamChunk};
use crate::providers::{adapter_for, ProviderTarget};
use crate::routing::RoutingEngine;
use crate::store::Store;
use futures::stream::{self, Stream, StreamExt};
use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct ChatPipeline {
    store: Arc<Store>,
    routing: Arc<RoutingEngine>,
    http: reqwest::Client,
    api_key_secret: String,
}

/// Identifies which route to resolve and, per §4.F, whether the caller
/// passed the route name explicitly (in which case `request.model` is
/// used as a model hint) or is routing by `request.model` itself.
pub struct RouteSelector<'a> {
    pub route_name: Option<&'a str>,
}

impl<'a> RouteSelector<'a> {
    fn resolve(&self, request: &'a ChatRequest) -> (&'a str, Option<&'a str>) {
        match self.route_name {
            Some(name) => (name, Some(request.model.as_str())),
            None => (request.model.as_str(), None),
        }
    }
}

impl ChatPipeline {
    pub fn new(
        store: Arc<Store>,
        routing: Arc<RoutingEngine>,
        http: reqwest::Client,
        api_key_secret: String,
    ) -> Self {
        Self {
            store,
            routing,
            http,
            api_key_secret,
        }
    }

    pub async fn complete(
        &self,
        request: ChatRequest,
        selector: RouteSelector<'_>,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<ChatResponse, GatewayError> {
        request.validate()?;
        let (route_name, model_hint) = selector.resolve(&request);
        let rwn = self.fetch_active_route(route_name).await?;
        let all_providers = self.store.list_providers().await?;

        let mut tried: HashSet<String> = HashSet::new();
        let mut last_error: Option<GatewayError> = None;

        for attempt in 1..=max_retries {
            let (provider, model) = match self.routing.select(&rwn, &all_providers, model_hint) {
                Ok(selection) => selection,
                Err(e) => {
                    warn!("attempt {attempt} failed to select a provider: {e}");
                    last_error = Some(e);
                    continue;
                }
            };

            if tried.contains(&provider.id) {
                continue;
            }
            tried.insert(provider.id.clone());

            info!("attempt {attempt}: using provider {} with model {model}", provider.name);

            match self.call_provider(&provider, &model, &request, timeout).await {
                Ok(response) => {
                    info!("request completed via provider {}", provider.name);
                    return Ok(response);
                }
                Err(GatewayError::Provider(ref pe)) if !pe.is_retryable() => {
                    return Err(GatewayError::Provider(ProviderError::Http {
                        status: pe.status_code().unwrap_or(500),
                        message: pe.to_string(),
                    }));
                }
                Err(e) => {
                    warn!("attempt {attempt} failed: {e}");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            GatewayError::Provider(ProviderError::Http {
                status: 502,
                message: format!("all providers failed after {max_retries} attempts"),
            })
        }))
    }

    /// Streaming counterpart. Retries are only attempted before the first
    /// chunk is emitted — once a chunk has been produced, the stream is
    /// committed to that provider and a later failure surfaces as a
    /// terminal `Err` item rather than a silent failover.
    pub async fn stream(
        &self,
        request: ChatRequest,
        selector: RouteSelector<'_>,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamChunk, GatewayError>> + Send>>, GatewayError>
    {
        request.validate()?;
        let (route_name, model_hint) = selector.resolve(&request);
        let rwn = self.fetch_active_route(route_name).await?;
        let all_providers = self.store.list_providers().await?;

        let mut tried: HashSet<String> = HashSet::new();
        let mut last_error: Option<GatewayError> = None;

        for attempt in 1..=max_retries {
            let (provider, model) = match self.routing.select(&rwn, &all_providers, model_hint) {
                Ok(selection) => selection,
                Err(e) => {
                    warn!("attempt {attempt} failed to select a provider: {e}");
                    last_error = Some(e);
                    continue;
                }
            };

            if tried.contains(&provider.id) {
                continue;
            }
            tried.insert(provider.id.clone());

            info!("attempt {attempt}: streaming from provider {} with model {model}", provider.name);

            match self.open_stream(&provider, &model, &request, timeout).await {
                Ok(chunks) => return Ok(chunks),
                Err(GatewayError::Provider(ref pe)) if !pe.is_retryable() => {
                    return Err(GatewayError::Provider(ProviderError::Http {
                        status: pe.status_code().unwrap_or(500),
                        message: pe.to_string(),
                    }));
                }
                Err(e) => {
                    warn!("attempt {attempt} failed: {e}");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            GatewayError::Provider(ProviderError::Http {
                status: 502,
                message: format!("all providers failed after {max_retries} attempts"),
            })
        }))
    }

    async fn fetch_active_route(
        &self,
        route_name: &str,
    ) -> Result<crate::domain::RouteWithNodes, GatewayError> {
        let rwn = match self.store.get_route_with_nodes_by_name(route_name).await {
            Ok(rwn) => rwn,
            Err(GatewayError::NotFound { .. }) => {
                return Err(GatewayError::NotFound {
                    resource: "route".to_string(),
                    id: route_name.to_string(),
                })
            }
            Err(e) => return Err(e),
        };
        if !rwn.route.is_active {
            return Err(GatewayError::RouteInactive {
                route: rwn.route.name.clone(),
            });
        }
        Ok(rwn)
    }

    async fn call_provider(
        &self,
        provider: &Provider,
        model: &str,
        request: &ChatRequest,
        timeout: Duration,
    ) -> Result<ChatResponse, GatewayError> {
        let adapter = adapter_for(&provider.name, &provider.base_url);
        let api_key = crypto::decrypt(&self.api_key_secret, &provider.api_key_opaque)?;
        let target = ProviderTarget {
            base_url: provider.base_url.clone(),
            api_key,
            model: model.to_string(),
        };
        let response = tokio::time::timeout(timeout, adapter.call(&self.http, &target, request))
            .await
            .map_err(|_| {
                GatewayError::Provider(ProviderError::Http {
                    status: 504,
                    message: format!("provider {} timed out", provider.name),
                })
            })?
            .map_err(GatewayError::from)?;
        Ok(response)
    }

    async fn open_stream(
        &self,
        provider: &Provider,
        model: &str,
        request: &ChatRequest,
        timeout: Duration,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamChunk, GatewayError>> + Send>>, GatewayError>
    {
        let adapter = adapter_for(&provider.name, &provider.base_url);
        let api_key = crypto::decrypt(&self.api_key_secret, &provider.api_key_opaque)?;
        let target = ProviderTarget {
            base_url: provider.base_url.clone(),
            api_key,
            model: model.to_string(),
        };
        let chunks = tokio::time::timeout(timeout, adapter.stream(&self.http, &target, request))
            .await
            .map_err(|_| {
                GatewayError::Provider(ProviderError::Http {
                    status: 504,
                    message: format!("provider {} timed out opening stream", provider.name),
                })
            })?
            .map_err(GatewayError::from)?;

        Ok(Box::pin(chunks.map(|r| r.map_err(GatewayError::from))))
    }
}

/// Wraps a chunk stream into SSE `data: <json>` frames terminated by
/// `data: [DONE]`, as the HTTP layer does for every streaming response
/// (§4.F).
pub fn to_sse(
    chunks: Pin<Box<dyn Stream<Item = Result<StreamChunk, GatewayError>> + Send>>,
) -> Pin<Box<dyn Stream<Item = Result<String, GatewayError>> + Send>> {
    let body = chunks.map(|item| {
        item.map(|chunk| format!("data: {}\n\n", serde_json::to_string(&chunk).unwrap_or_default()))
    });
    Box::pin(body.chain(stream::once(async { Ok("data: [DONE]\n\n".to_string()) })))
}
