// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The boundary to the inference engine.
//!
//! The engine itself (token generation, KV cache, model loading) lives outside this crate. The
//! frontend only needs the model configuration, a generation call that answers with either a full
//! payload or a lazy stream of chunks, and a place to attach engine statistics sinks.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::capability::Capability;
use crate::protocols::{ChatSettings, ErrorResponse, Payload};
use crate::stream::ResponseStream;

/// Model configuration reported by the engine once it has loaded the model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model path or hub identifier
    pub model: String,

    /// Maximum sequence length the engine accepts, if bounded
    pub max_model_len: Option<u32>,
}

/// A request after the handler has validated it
#[derive(Debug, Clone)]
pub struct EngineRequest {
    pub capability: Capability,

    /// Served model name or LoRA module the request resolved to
    pub model: String,

    pub payload: Payload,

    pub stream: bool,

    /// Set for chat requests only
    pub chat: Option<ChatSettings>,
}

/// Per-request context shared between the transport and the engine
#[derive(Debug, Clone)]
pub struct RequestContext {
    id: String,
    token: CancellationToken,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        RequestContext {
            id: id.into(),
            token: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Cancelled when the caller goes away
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// What a generation call produced
#[derive(Debug)]
pub enum GenerateOutput {
    Full(Payload),
    Stream(ResponseStream),
}

/// Engine statistics published after each request
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EngineStats {
    pub num_running: u64,
    pub num_waiting: u64,
    pub prompt_tokens: u64,
    pub generation_tokens: u64,
}

/// Receives engine statistics. Attached once per deployment.
pub trait MetricsSink: Send + Sync {
    fn record(&self, stats: &EngineStats);
}

#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Suspends until the engine has loaded the model
    async fn get_model_config(&self) -> anyhow::Result<ModelConfig>;

    /// Generate a response. An `Err` is a structured error whose `code` is the HTTP status to
    /// surface; it is never retried.
    async fn generate(
        &self,
        request: EngineRequest,
        context: RequestContext,
    ) -> Result<GenerateOutput, ErrorResponse>;

    fn add_metrics_sink(&self, sink: Arc<dyn MetricsSink>);
}
