// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use llm_serve::{
    Capability, DeploymentConfig, LlmDeployment,
    engine::{
        EngineRequest, GenerateOutput, InferenceEngine, MetricsSink, ModelConfig, RequestContext,
    },
    engines::EchoEngine,
    http::HttpService,
    metrics::{Metrics, RequestType, Status},
    protocols::ErrorResponse,
    stream::{ResponseStream, StreamStatus},
};
use parking_lot::Mutex;
use llm_serve_runtime::config::environment_names::metrics::LLM_SERVE_METRICS_PREFIX;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

#[path = "common/ports.rs"]
mod ports;
use ports::get_random_port;

const MODEL: &str = "echo-model";

fn echo_deployment(capabilities: Vec<Capability>) -> Arc<LlmDeployment> {
    let engine = Arc::new(
        EchoEngine::new(ModelConfig {
            model: "/models/echo".to_string(),
            max_model_len: Some(64),
        })
        .with_token_delay(Duration::from_millis(1)),
    );
    let config = DeploymentConfig::builder()
        .model("/models/echo")
        .served_model_name(vec![MODEL.to_string(), "echo-alias".to_string()])
        .capabilities(capabilities)
        .build()
        .unwrap();
    Arc::new(LlmDeployment::new(engine, &config, Arc::new(Metrics::new())).unwrap())
}

/// Streams `chunks` numbered chunks, failing instead at `fail_at` when set
struct ChunkedEngine {
    chunks: usize,
    fail_at: Option<usize>,
    delay: Duration,
    closes: Arc<Mutex<Vec<StreamStatus>>>,
}

impl ChunkedEngine {
    fn new(chunks: usize, fail_at: Option<usize>, delay: Duration) -> Self {
        ChunkedEngine {
            chunks,
            fail_at,
            delay,
            closes: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl InferenceEngine for ChunkedEngine {
    async fn get_model_config(&self) -> anyhow::Result<ModelConfig> {
        Ok(ModelConfig {
            model: "/models/chunked".to_string(),
            max_model_len: None,
        })
    }

    async fn generate(
        &self,
        _request: EngineRequest,
        context: RequestContext,
    ) -> Result<GenerateOutput, ErrorResponse> {
        let (chunks, fail_at, delay) = (self.chunks, self.fail_at, self.delay);
        let closes = self.closes.clone();
        let stream = async_stream::stream! {
            for index in 0..chunks {
                tokio::time::sleep(delay).await;
                if fail_at == Some(index) {
                    yield Err(anyhow::anyhow!("engine worker exited"));
                    break;
                }
                yield Ok(json!({"index": index}));
            }
        };
        Ok(GenerateOutput::Stream(
            ResponseStream::new(stream)
                .with_cancellation(context.token().clone())
                .on_close(move |status| closes.lock().push(status)),
        ))
    }

    fn add_metrics_sink(&self, _sink: Arc<dyn MetricsSink>) {}
}

fn chunked_deployment(engine: Arc<ChunkedEngine>) -> Arc<LlmDeployment> {
    let config = DeploymentConfig::builder()
        .model("/models/chunked")
        .served_model_name(vec![MODEL.to_string()])
        .build()
        .unwrap();
    Arc::new(LlmDeployment::new(engine, &config, Arc::new(Metrics::new())).unwrap())
}

struct Running {
    port: u16,
    service: HttpService,
    token: CancellationToken,
    handle: tokio::task::JoinHandle<anyhow::Result<()>>,
}

impl Running {
    fn url(&self, path: &str) -> String {
        format!("http://localhost:{}{}", self.port, path)
    }

    async fn stop(self) {
        self.token.cancel();
        let _ = self.handle.await;
    }
}

async fn start(capabilities: Vec<Capability>) -> Running {
    start_with(echo_deployment(capabilities)).await
}

async fn start_with(deployment: Arc<LlmDeployment>) -> Running {
    let port = get_random_port().await;
    let service = HttpService::builder()
        .host("127.0.0.1")
        .port(port)
        .deployment(deployment)
        .build()
        .unwrap();
    let token = CancellationToken::new();
    let handle = service.spawn(token.clone()).await;
    wait_for_ready(port).await;
    Running {
        port,
        service,
        token,
        handle,
    }
}

// Poll /live until ready or timeout
async fn wait_for_ready(port: u16) {
    let url = format!("http://localhost:{}/live", port);
    let start = tokio::time::Instant::now();
    let timeout = Duration::from_secs(5);
    loop {
        if start.elapsed() > timeout {
            panic!("Timed out waiting for HTTP service at {}", url);
        }
        match reqwest::get(&url).await {
            Ok(resp) if resp.status().is_success() => break,
            _ => tokio::time::sleep(Duration::from_millis(50)).await,
        }
    }
}

/// Payloads of the `data:` lines in an SSE body
fn sse_data(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.trim().to_string())
        .collect()
}

#[tokio::test]
async fn test_completion() {
    let running = start(Capability::all()).await;
    let client = reqwest::Client::new();

    let response = client
        .post(running.url("/v1/completions"))
        .header("x-request-id", "req-42")
        .json(&json!({"model": MODEL, "prompt": "hello from the test"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["id"], "cmpl-req-42");
    assert_eq!(body["object"], "text_completion");
    assert_eq!(body["choices"][0]["text"], "hello from the test");

    // Unprefixed route reaches the same handler
    let response = client
        .post(running.url("/completions"))
        .json(&json!({"model": "echo-alias", "prompt": "again"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    running.stop().await;
}

#[tokio::test]
async fn test_chat_stream() {
    let running = start(Capability::all()).await;

    let response = reqwest::Client::new()
        .post(running.url("/v1/chat/completions"))
        .json(&json!({
            "model": MODEL,
            "stream": true,
            "messages": [{"role": "user", "content": "one two three"}]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/event-stream"), "{content_type}");

    let body = response.text().await.unwrap();
    let data = sse_data(&body);
    assert_eq!(data.last().map(String::as_str), Some("[DONE]"));

    let chunks: Vec<Value> = data[..data.len() - 1]
        .iter()
        .map(|chunk| serde_json::from_str(chunk).unwrap())
        .collect();
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0]["object"], "chat.completion.chunk");
    assert_eq!(chunks[0]["choices"][0]["delta"]["role"], "assistant");
    let text: Vec<_> = chunks
        .iter()
        .map(|chunk| chunk["choices"][0]["delta"]["content"].as_str().unwrap())
        .collect();
    assert_eq!(text, ["one", "two", "three"]);

    running.stop().await;
}

#[tokio::test]
async fn test_client_errors() {
    let running = start(vec![Capability::Completion]).await;
    let client = reqwest::Client::new();

    let response = client
        .post(running.url("/v1/completions"))
        .json(&json!({"model": "gpt-4", "prompt": "hi"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["type"], "NotFoundError");
    assert_eq!(body["param"], "model");

    let response = client
        .post(running.url("/v1/completions"))
        .json(&json!({"prompt": "hi", "max_tokens": 1000}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    // Chat is not enabled on this deployment
    let response = client
        .post(running.url("/v1/chat/completions"))
        .json(&json!({"model": MODEL, "messages": [{"role": "user", "content": "hi"}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    running.stop().await;
}

#[tokio::test]
async fn test_models_and_health() {
    let running = start(Capability::all()).await;
    let client = reqwest::Client::new();

    let models: Value = client
        .get(running.url("/v1/models"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(models["object"], "list");
    let ids: Vec<_> = models["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|model| model["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, [MODEL, "echo-alias"]);

    let health: Value = client
        .get(running.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["ready"], json!([]));

    client
        .post(running.url("/v1/completions"))
        .json(&json!({"prompt": "warm up"}))
        .send()
        .await
        .unwrap();

    let health: Value = client
        .get(running.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["ready"], json!(["completion"]));
    assert_eq!(health["capabilities"], json!(["chat", "completion"]));

    running.stop().await;
}

#[tokio::test]
async fn test_metrics_after_requests() {
    temp_env::async_with_vars([(LLM_SERVE_METRICS_PREFIX, None::<&str>)], async {
        let running = start(Capability::all()).await;
        let client = reqwest::Client::new();

        let response = client
            .post(running.url("/v1/chat/completions"))
            .json(&json!({"model": MODEL, "messages": [{"role": "user", "content": "hi"}]}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let response = client
            .post(running.url("/v1/chat/completions"))
            .json(&json!({"model": MODEL, "messages": []}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);

        let metrics = running.service.state().deployment().metrics();
        assert_eq!(
            metrics.get_request_counter(MODEL, Capability::Chat, &RequestType::Unary, &Status::Success),
            1
        );
        assert_eq!(
            metrics.get_request_counter(MODEL, Capability::Chat, &RequestType::Unary, &Status::Error),
            1
        );
        assert_eq!(metrics.get_inflight_count(MODEL), 0);

        let body = client
            .get(running.url("/metrics"))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(body.contains("llm_serve_requests_total"));
        assert!(body.contains("llm_serve_handler_builds_total"));
        assert!(body.contains("llm_serve_engine_generation_tokens_total"));

        running.stop().await;
    })
    .await;
}

#[tokio::test]
async fn test_unserved_models_do_not_grow_metric_labels() {
    let running = start(vec![Capability::Completion]).await;
    let client = reqwest::Client::new();

    for i in 0..20 {
        let response = client
            .post(running.url("/v1/completions"))
            .json(&json!({"model": format!("bogus-{i}"), "prompt": "hi"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
    }

    let metrics = running.service.state().deployment().metrics();
    assert_eq!(
        metrics.get_request_counter(
            MODEL,
            Capability::Completion,
            &RequestType::Unary,
            &Status::Error
        ),
        20
    );

    let body = client
        .get(running.url("/metrics"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(!body.contains("bogus"));

    running.stop().await;
}

#[tokio::test]
async fn test_malformed_body_gets_error_envelope() {
    let running = start(Capability::all()).await;

    let response = reqwest::Client::new()
        .post(running.url("/v1/chat/completions"))
        .header("content-type", "application/json")
        .body("{\"messages\": [")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["object"], "error");
    assert_eq!(body["type"], "BadRequestError");
    assert_eq!(body["code"], 400);

    running.stop().await;
}

#[tokio::test]
async fn test_client_disconnect_closes_stream() {
    let engine = Arc::new(ChunkedEngine::new(1000, None, Duration::from_millis(20)));
    let running = start_with(chunked_deployment(engine.clone())).await;
    let metrics = running.service.state().deployment().metrics();

    let mut response = reqwest::Client::new()
        .post(running.url("/v1/completions"))
        .json(&json!({"model": MODEL, "prompt": "hi", "stream": true}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let first = response.chunk().await.unwrap();
    assert!(first.is_some());
    assert_eq!(metrics.get_inflight_count(MODEL), 1);
    drop(response);

    let start = tokio::time::Instant::now();
    while metrics.get_inflight_count(MODEL) != 0 || engine.closes.lock().is_empty() {
        if start.elapsed() > Duration::from_secs(5) {
            panic!("stream was not closed after the client disconnected");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(*engine.closes.lock(), vec![StreamStatus::Cancelled]);

    running.stop().await;
}

#[tokio::test]
async fn test_interrupted_stream_ends_with_error_event() {
    let engine = Arc::new(ChunkedEngine::new(10, Some(2), Duration::from_millis(1)));
    let running = start_with(chunked_deployment(engine.clone())).await;

    let response = reqwest::Client::new()
        .post(running.url("/v1/completions"))
        .json(&json!({"model": MODEL, "prompt": "hi", "stream": true}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let data = sse_data(&response.text().await.unwrap());
    assert_eq!(data.len(), 3, "{data:?}");
    assert!(!data.iter().any(|event| event == "[DONE]"));

    let chunk: Value = serde_json::from_str(&data[1]).unwrap();
    assert_eq!(chunk["index"], 1);
    let last: Value = serde_json::from_str(&data[2]).unwrap();
    assert_eq!(last["error"]["type"], "InternalServerError");
    assert!(
        last["error"]["message"]
            .as_str()
            .unwrap()
            .contains("engine worker exited")
    );
    assert_eq!(*engine.closes.lock(), vec![StreamStatus::Interrupted]);

    running.stop().await;
}
