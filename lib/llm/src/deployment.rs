// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The request dispatcher of one model deployment.
//!
//! [`LlmDeployment::dispatch`] resolves the capability handler through the
//! [`HandlerRegistry`], building it on first use from the engine's model configuration, invokes it,
//! and normalizes the result into a [`DispatchOutcome`].

use std::sync::Arc;

use axum::http::StatusCode;

use crate::capability::Capability;
use crate::config::DeploymentConfig;
use crate::engine::{GenerateOutput, InferenceEngine, RequestContext};
use crate::error::ServeError;
use crate::handlers::{ChatHandler, CompletionHandler};
use crate::metrics::{Metrics, Status};
use crate::models::{ModelList, ServedModelNames, ServingModels};
use crate::protocols::{ChatSettings, ErrorResponse, Payload};
use crate::registry::{HandlerRef, HandlerRegistry};
use crate::stream::ResponseStream;

/// Result of dispatching one request
#[derive(Debug)]
pub enum DispatchOutcome {
    Success(Payload),
    Stream(ResponseStream),
    Error(StatusCode, ErrorResponse),
}

pub struct LlmDeployment {
    engine: Arc<dyn InferenceEngine>,
    served_model_names: ServedModelNames,
    models: ServingModels,
    chat_settings: ChatSettings,
    registry: HandlerRegistry,
    metrics: Arc<Metrics>,
}

impl LlmDeployment {
    /// Set up a deployment over `engine`. No handler is built until its first request.
    ///
    /// The engine's statistics are published through `metrics`, labelled with the primary
    /// served model name.
    pub fn new(
        engine: Arc<dyn InferenceEngine>,
        config: &DeploymentConfig,
        metrics: Arc<Metrics>,
    ) -> Result<Self, ServeError> {
        let served_model_names = config.served_model_names()?;
        let models = ServingModels::new(
            &served_model_names,
            &config.model,
            config.lora_modules.clone(),
        );

        engine.add_metrics_sink(metrics.clone().engine_sink(served_model_names.primary()));

        tracing::info!(
            model = %config.model,
            served_model_name = %served_model_names.primary(),
            capabilities = ?config.capabilities,
            "deployment created"
        );

        Ok(LlmDeployment {
            engine,
            served_model_names,
            models,
            chat_settings: config.chat_settings(),
            registry: HandlerRegistry::new(config.capabilities.iter().copied()),
            metrics,
        })
    }

    pub fn served_model_names(&self) -> &ServedModelNames {
        &self.served_model_names
    }

    /// Model label for request metrics; see [`ServingModels::metrics_label`]
    pub fn metrics_model(&self, requested: Option<&str>) -> &str {
        self.models.metrics_label(requested)
    }

    pub fn model_list(&self) -> ModelList {
        self.models.model_list()
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Route by capability name; names outside the closed set are [`ServeError::UnknownCapability`]
    pub async fn dispatch_named(
        &self,
        capability: &str,
        request: Payload,
        wants_stream: bool,
        context: RequestContext,
    ) -> Result<DispatchOutcome, ServeError> {
        let capability: Capability = capability.parse()?;
        self.dispatch(capability, request, wants_stream, context)
            .await
    }

    pub async fn dispatch(
        &self,
        capability: Capability,
        request: Payload,
        wants_stream: bool,
        context: RequestContext,
    ) -> Result<DispatchOutcome, ServeError> {
        let handler = self.handler(capability).await?;
        let request_id = context.id().to_string();

        match handler.handle(request, wants_stream, context).await {
            Err(error) => {
                tracing::debug!(%request_id, %capability, %error, "request failed");
                Ok(DispatchOutcome::Error(error.status(), error))
            }
            Ok(GenerateOutput::Full(payload)) => Ok(DispatchOutcome::Success(payload)),
            Ok(GenerateOutput::Stream(stream)) if wants_stream => {
                Ok(DispatchOutcome::Stream(stream))
            }
            Ok(GenerateOutput::Stream(mut stream)) => {
                stream.close();
                tracing::warn!(
                    %request_id,
                    %capability,
                    "engine returned a stream for a non-streaming request"
                );
                let error = ErrorResponse::internal_server_error(
                    "engine returned a stream for a non-streaming request",
                );
                Ok(DispatchOutcome::Error(error.status(), error))
            }
        }
    }

    /// The handler for `capability`, built on first use
    pub async fn handler(&self, capability: Capability) -> Result<HandlerRef, ServeError> {
        if let Some(handler) = self.registry.get(capability) {
            return Ok(handler);
        }

        let engine = self.engine.clone();
        let models = self.models.clone();
        let chat_settings = self.chat_settings.clone();
        let metrics = self.metrics.clone();

        self.registry
            .get_or_build(capability, move || async move {
                let result = build_handler(capability, engine, models, chat_settings).await;
                let status = if result.is_ok() {
                    Status::Success
                } else {
                    Status::Error
                };
                metrics.inc_handler_build(capability, &status);
                result
            })
            .await
    }
}

async fn build_handler(
    capability: Capability,
    engine: Arc<dyn InferenceEngine>,
    models: ServingModels,
    chat_settings: ChatSettings,
) -> anyhow::Result<HandlerRef> {
    use anyhow::Context as _;

    let model_config = engine
        .get_model_config()
        .await
        .context("fetching model config")?;

    let handler: HandlerRef = match capability {
        Capability::Completion => Arc::new(CompletionHandler::new(engine, model_config, models)),
        Capability::Chat => Arc::new(ChatHandler::new(
            engine,
            model_config,
            models,
            chat_settings,
        )),
    };
    Ok(handler)
}
