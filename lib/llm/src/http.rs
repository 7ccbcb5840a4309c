// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! HTTP boundary.
//!
//! Maps OpenAI-compatible routes onto [`LlmDeployment::dispatch`] and dispatch outcomes back onto
//! HTTP responses. Streamed outcomes are sent as server-sent events, one `data:` event per chunk
//! followed by `data: [DONE]`. Dropping the response body (client disconnect) cancels the request.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Request, State as AxumState, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use derive_builder::Builder;
use futures::StreamExt;
use llm_serve_runtime::logging::make_request_span;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::capability::Capability;
use crate::deployment::{DispatchOutcome, LlmDeployment};
use crate::engine::RequestContext;
use crate::error::ServeError;
use crate::metrics::{self, InflightGuard, Registry};
use crate::protocols::{self, ErrorResponse, Payload};
use crate::stream::ResponseStream;

/// Shared state of the HTTP service
pub struct State {
    deployment: Arc<LlmDeployment>,
    registry: Registry,
}

impl State {
    pub fn deployment(&self) -> &Arc<LlmDeployment> {
        &self.deployment
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[derive(Clone)]
pub struct HttpService {
    router: Router,
    host: String,
    port: u16,
    state: Arc<State>,
}

#[derive(Builder)]
#[builder(pattern = "owned", build_fn(private, name = "build_internal"))]
pub struct HttpServiceConfig {
    #[builder(default = "8000")]
    port: u16,

    #[builder(setter(into), default = "String::from(\"0.0.0.0\")")]
    host: String,

    deployment: Arc<LlmDeployment>,
}

impl HttpService {
    pub fn builder() -> HttpServiceConfigBuilder {
        HttpServiceConfigBuilder::default()
    }

    pub fn state(&self) -> &Arc<State> {
        &self.state
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `cancel_token` is cancelled
    pub async fn run(&self, cancel_token: CancellationToken) -> anyhow::Result<()> {
        use anyhow::Context as _;

        let address = format!("{}:{}", self.host, self.port);
        let listener = tokio::net::TcpListener::bind(&address)
            .await
            .with_context(|| format!("binding {address}"))?;
        tracing::info!(address = %listener.local_addr()?, "Starting HTTP service");

        axum::serve(listener, self.router.clone())
            .with_graceful_shutdown(async move { cancel_token.cancelled().await })
            .await
            .context("HTTP service failed")?;

        tracing::info!("HTTP service stopped");
        Ok(())
    }

    /// Run the service on a spawned task
    pub async fn spawn(
        &self,
        cancel_token: CancellationToken,
    ) -> tokio::task::JoinHandle<anyhow::Result<()>> {
        let service = self.clone();
        tokio::spawn(async move { service.run(cancel_token).await })
    }
}

impl HttpServiceConfigBuilder {
    pub fn build(self) -> anyhow::Result<HttpService> {
        let config = self.build_internal()?;

        let registry = Registry::new();
        config.deployment.metrics().register(&registry)?;

        let state = Arc::new(State {
            deployment: config.deployment,
            registry,
        });

        Ok(HttpService {
            router: router(state.clone()),
            host: config.host,
            port: config.port,
            state,
        })
    }
}

pub fn router(state: Arc<State>) -> Router {
    Router::new()
        .route("/v1/completions", post(completions))
        .route("/completions", post(completions))
        .route("/v1/chat/completions", post(chat_completions))
        .route("/chat/completions", post(chat_completions))
        .route("/v1/models", get(list_models))
        .route("/health", get(health))
        .route("/live", get(live))
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn(request_span))
        .with_state(state)
}

async fn request_span(req: Request, next: Next) -> Response {
    let span = make_request_span(&req);
    next.run(req).instrument(span).await
}

async fn completions(
    AxumState(state): AxumState<Arc<State>>,
    headers: HeaderMap,
    request: Result<Json<Payload>, JsonRejection>,
) -> Response {
    match request {
        Ok(Json(request)) => serve_request(state, Capability::Completion, headers, request).await,
        Err(rejection) => rejected_body(rejection),
    }
}

async fn chat_completions(
    AxumState(state): AxumState<Arc<State>>,
    headers: HeaderMap,
    request: Result<Json<Payload>, JsonRejection>,
) -> Response {
    match request {
        Ok(Json(request)) => serve_request(state, Capability::Chat, headers, request).await,
        Err(rejection) => rejected_body(rejection),
    }
}

/// Malformed request bodies get the same error envelope as every other failure
fn rejected_body(rejection: JsonRejection) -> Response {
    tracing::debug!(error = %rejection.body_text(), "rejected request body");
    let body = ErrorResponse::bad_request(rejection.body_text());
    (body.status(), Json(body)).into_response()
}

async fn serve_request(
    state: Arc<State>,
    capability: Capability,
    headers: HeaderMap,
    request: Payload,
) -> Response {
    let wants_stream = protocols::wants_stream(&request);
    let context = match headers
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
    {
        Some(id) => RequestContext::with_id(id),
        None => RequestContext::new(),
    };
    let model = state
        .deployment
        .metrics_model(protocols::request_model(&request))
        .to_string();

    let mut inflight =
        state
            .deployment
            .metrics()
            .create_inflight_guard(&model, capability, wants_stream);

    // Cancels the request if this future or the response body is dropped early
    let disconnect = context.token().clone().drop_guard();

    let outcome = state
        .deployment
        .dispatch(capability, request, wants_stream, context)
        .await;

    match outcome {
        Ok(DispatchOutcome::Success(payload)) => {
            disconnect.disarm();
            inflight.mark_ok();
            (StatusCode::OK, Json(payload)).into_response()
        }
        Ok(DispatchOutcome::Error(status, body)) => {
            disconnect.disarm();
            (status, Json(body)).into_response()
        }
        Ok(DispatchOutcome::Stream(stream)) => sse_response(stream, inflight, disconnect),
        Err(err) => {
            disconnect.disarm();
            serve_error_response(&err)
        }
    }
}

fn serve_error_response(err: &ServeError) -> Response {
    tracing::debug!(error = %err, "dispatch failed");
    (err.status_code(), Json(err.to_error_response())).into_response()
}

fn sse_response(
    mut stream: ResponseStream,
    mut inflight: InflightGuard,
    disconnect: tokio_util::sync::DropGuard,
) -> Response {
    let events = async_stream::stream! {
        let mut interrupted = false;
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(chunk) => yield Ok::<_, Infallible>(Event::default().data(chunk.to_string())),
                Err(err) => {
                    interrupted = true;
                    let data = json!({ "error": err.to_error_response() });
                    yield Ok(Event::default().data(data.to_string()));
                    break;
                }
            }
        }
        disconnect.disarm();
        if !interrupted {
            inflight.mark_ok();
            yield Ok(Event::default().data("[DONE]"));
        }
    };
    Sse::new(events).keep_alive(KeepAlive::default()).into_response()
}

async fn list_models(AxumState(state): AxumState<Arc<State>>) -> impl IntoResponse {
    Json(state.deployment.model_list())
}

async fn health(AxumState(state): AxumState<Arc<State>>) -> impl IntoResponse {
    let registry = state.deployment.registry();
    let capabilities = registry.capabilities();
    let ready: Vec<_> = capabilities
        .iter()
        .filter(|capability| registry.get(**capability).is_some())
        .collect();
    let models: Vec<_> = state.deployment.served_model_names().iter().collect();
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "models": models,
            "capabilities": capabilities,
            "ready": ready,
        })),
    )
}

async fn live() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "live",
            "message": "Service is live"
        })),
    )
}

async fn metrics_handler(AxumState(state): AxumState<Arc<State>>) -> Response {
    match metrics::render(&state.registry) {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics",
            )
                .into_response()
        }
    }
}
