// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use async_trait::async_trait;

use super::{Handler, check_max_tokens};
use crate::capability::Capability;
use crate::engine::{EngineRequest, GenerateOutput, InferenceEngine, ModelConfig, RequestContext};
use crate::models::ServingModels;
use crate::protocols::{self, ChatSettings, ErrorResponse, Payload};

/// Serves `/v1/chat/completions`
///
/// The response role and chat template settings are fixed when the handler is built and travel
/// with every request to the engine.
pub struct ChatHandler {
    engine: Arc<dyn InferenceEngine>,
    model_config: ModelConfig,
    models: ServingModels,
    settings: ChatSettings,
}

impl ChatHandler {
    pub fn new(
        engine: Arc<dyn InferenceEngine>,
        model_config: ModelConfig,
        models: ServingModels,
        settings: ChatSettings,
    ) -> Self {
        ChatHandler {
            engine,
            model_config,
            models,
            settings,
        }
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }
}

#[async_trait]
impl Handler for ChatHandler {
    fn capability(&self) -> Capability {
        Capability::Chat
    }

    async fn handle(
        &self,
        request: Payload,
        wants_stream: bool,
        context: RequestContext,
    ) -> Result<GenerateOutput, ErrorResponse> {
        let model = self.models.resolve(protocols::request_model(&request))?;

        let has_messages = request
            .get("messages")
            .and_then(serde_json::Value::as_array)
            .is_some_and(|messages| !messages.is_empty());
        if !has_messages {
            return Err(
                ErrorResponse::bad_request("`messages` must be a non-empty array")
                    .with_param("messages"),
            );
        }
        check_max_tokens(&request, self.model_config.max_model_len)?;

        tracing::trace!(request_id = context.id(), %model, "chat request");

        self.engine
            .generate(
                EngineRequest {
                    capability: Capability::Chat,
                    model,
                    payload: request,
                    stream: wants_stream,
                    chat: Some(self.settings.clone()),
                },
                context,
            )
            .await
    }
}
