// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use async_trait::async_trait;

use super::{Handler, check_max_tokens};
use crate::capability::Capability;
use crate::engine::{EngineRequest, GenerateOutput, InferenceEngine, ModelConfig, RequestContext};
use crate::models::ServingModels;
use crate::protocols::{self, ErrorResponse, Payload};

/// Serves `/v1/completions`
pub struct CompletionHandler {
    engine: Arc<dyn InferenceEngine>,
    model_config: ModelConfig,
    models: ServingModels,
}

impl CompletionHandler {
    pub fn new(
        engine: Arc<dyn InferenceEngine>,
        model_config: ModelConfig,
        models: ServingModels,
    ) -> Self {
        CompletionHandler {
            engine,
            model_config,
            models,
        }
    }
}

#[async_trait]
impl Handler for CompletionHandler {
    fn capability(&self) -> Capability {
        Capability::Completion
    }

    async fn handle(
        &self,
        request: Payload,
        wants_stream: bool,
        context: RequestContext,
    ) -> Result<GenerateOutput, ErrorResponse> {
        let model = self.models.resolve(protocols::request_model(&request))?;

        if request.get("prompt").is_none_or(|prompt| prompt.is_null()) {
            return Err(ErrorResponse::bad_request("`prompt` is required").with_param("prompt"));
        }
        check_max_tokens(&request, self.model_config.max_model_len)?;

        tracing::trace!(request_id = context.id(), %model, "completion request");

        self.engine
            .generate(
                EngineRequest {
                    capability: Capability::Completion,
                    model,
                    payload: request,
                    stream: wants_stream,
                    chat: None,
                },
                context,
            )
            .await
    }
}
