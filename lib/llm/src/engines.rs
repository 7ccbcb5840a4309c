// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Value, json};

use crate::capability::Capability;
use crate::engine::{
    EngineRequest, EngineStats, GenerateOutput, InferenceEngine, MetricsSink, ModelConfig,
    RequestContext,
};
use crate::protocols::{ErrorResponse, Payload};
use crate::stream::ResponseStream;

/// Echos the prompt back as the response.
///
/// Completion requests echo `prompt`, chat requests echo the content of the last message. A
/// streamed response has one chunk per whitespace separated word.
pub struct EchoEngine {
    model_config: ModelConfig,
    token_delay: Option<Duration>,
    sinks: RwLock<Vec<Arc<dyn MetricsSink>>>,
    running: Arc<AtomicU64>,
}

impl EchoEngine {
    pub fn new(model_config: ModelConfig) -> Self {
        EchoEngine {
            model_config,
            token_delay: None,
            sinks: RwLock::new(Vec::new()),
            running: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Pause between streamed chunks
    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = Some(delay);
        self
    }

    fn publish(
        sinks: &[Arc<dyn MetricsSink>],
        running: &AtomicU64,
        prompt_tokens: u64,
        generation_tokens: u64,
    ) {
        let stats = EngineStats {
            num_running: running.load(Ordering::Relaxed),
            num_waiting: 0,
            prompt_tokens,
            generation_tokens,
        };
        for sink in sinks {
            sink.record(&stats);
        }
    }
}

/// Text the engine should echo for `request`
fn echo_text(request: &EngineRequest) -> Result<String, ErrorResponse> {
    let text = match request.capability {
        Capability::Completion => match request.payload.get("prompt") {
            Some(Value::String(prompt)) => Some(prompt.clone()),
            Some(Value::Array(prompts)) => prompts.first().and_then(Value::as_str).map(str::to_string),
            _ => None,
        },
        Capability::Chat => request
            .payload
            .get("messages")
            .and_then(Value::as_array)
            .and_then(|messages| messages.last())
            .and_then(|message| message.get("content"))
            .map(message_text),
    };
    text.ok_or_else(|| ErrorResponse::bad_request("nothing to echo in request"))
}

/// Message content is either a string or a list of typed parts
fn message_text(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(" "),
        _ => String::new(),
    }
}

fn full_response(request: &EngineRequest, id: &str, created: i64, text: &str) -> Payload {
    match request.capability {
        Capability::Completion => json!({
            "id": format!("cmpl-{id}"),
            "object": "text_completion",
            "created": created,
            "model": request.model,
            "choices": [{"index": 0, "text": text, "finish_reason": "stop"}],
        }),
        Capability::Chat => {
            let role = request
                .chat
                .as_ref()
                .map(|chat| chat.response_role.as_str())
                .unwrap_or("assistant");
            json!({
                "id": format!("chatcmpl-{id}"),
                "object": "chat.completion",
                "created": created,
                "model": request.model,
                "choices": [{
                    "index": 0,
                    "message": {"role": role, "content": text},
                    "finish_reason": "stop"
                }],
            })
        }
    }
}

fn chunk(request: &EngineRequest, id: &str, created: i64, word: &str, first: bool) -> Payload {
    match request.capability {
        Capability::Completion => json!({
            "id": format!("cmpl-{id}"),
            "object": "text_completion",
            "created": created,
            "model": request.model,
            "choices": [{"index": 0, "text": word, "finish_reason": null}],
        }),
        Capability::Chat => {
            let mut delta = json!({"content": word});
            if first {
                let role = request
                    .chat
                    .as_ref()
                    .map(|chat| chat.response_role.clone())
                    .unwrap_or_else(|| "assistant".to_string());
                delta["role"] = Value::String(role);
            }
            json!({
                "id": format!("chatcmpl-{id}"),
                "object": "chat.completion.chunk",
                "created": created,
                "model": request.model,
                "choices": [{"index": 0, "delta": delta, "finish_reason": null}],
            })
        }
    }
}

#[async_trait]
impl InferenceEngine for EchoEngine {
    async fn get_model_config(&self) -> anyhow::Result<ModelConfig> {
        Ok(self.model_config.clone())
    }

    async fn generate(
        &self,
        request: EngineRequest,
        context: RequestContext,
    ) -> Result<GenerateOutput, ErrorResponse> {
        let text = echo_text(&request)?;
        let id = context.id().to_string();
        let created = chrono::Utc::now().timestamp();
        let sinks = self.sinks.read().clone();
        let words: Vec<String> = text.split_whitespace().map(str::to_string).collect();
        let num_words = words.len() as u64;

        if !request.stream {
            Self::publish(&sinks, &self.running, num_words, num_words);
            return Ok(GenerateOutput::Full(full_response(
                &request, &id, created, &text,
            )));
        }

        self.running.fetch_add(1, Ordering::Relaxed);
        let running = self.running.clone();
        let delay = self.token_delay;

        let chunks = stream! {
            for (index, word) in words.iter().enumerate() {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                yield Ok(chunk(&request, &id, created, word, index == 0));
            }
        };

        Ok(GenerateOutput::Stream(
            ResponseStream::new(chunks)
                .with_cancellation(context.token().clone())
                .on_close(move |_status| {
                    running.fetch_sub(1, Ordering::Relaxed);
                    Self::publish(&sinks, &running, num_words, num_words);
                }),
        ))
    }

    fn add_metrics_sink(&self, sink: Arc<dyn MetricsSink>) {
        self.sinks.write().push(sink);
    }
}
