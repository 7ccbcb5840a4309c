// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! # llm-serve Protocols
//!
//! Request and response payloads are passed through as opaque JSON. This module only holds the
//! few fields the frontend itself reads, the OpenAI-style error envelope, and the chat settings
//! forwarded to the engine.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

/// An opaque OpenAI-compatible request or response body
pub type Payload = Value;

/// OpenAI-compatible error body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub object: String,
    pub message: String,
    #[serde(rename = "type")]
    pub r#type: String,
    pub param: Option<String>,
    pub code: u16,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>, r#type: impl Into<String>, status: StatusCode) -> Self {
        ErrorResponse {
            object: "error".to_string(),
            message: message.into(),
            r#type: r#type.into(),
            param: None,
            code: status.as_u16(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(message, "BadRequestError", StatusCode::BAD_REQUEST)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(message, "NotFoundError", StatusCode::NOT_FOUND)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(message, "InternalServerError", StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.param = Some(param.into());
        self
    }

    /// HTTP status carried by this error, 500 when `code` is not a valid status
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl std::fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.r#type, self.code, self.message)
    }
}

/// How message content is rendered into the chat template
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChatTemplateContentFormat {
    #[default]
    Auto,
    String,
    Openai,
}

/// Chat settings fixed at startup and forwarded to the engine with every chat request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSettings {
    pub response_role: String,
    pub chat_template: Option<String>,
    pub chat_template_content_format: ChatTemplateContentFormat,
}

impl Default for ChatSettings {
    fn default() -> Self {
        ChatSettings {
            response_role: "assistant".to_string(),
            chat_template: None,
            chat_template_content_format: ChatTemplateContentFormat::Auto,
        }
    }
}

/// The `model` field of a request, if any
pub fn request_model(payload: &Payload) -> Option<&str> {
    payload.get("model").and_then(Value::as_str)
}

/// Whether the request asked for a streamed response
pub fn wants_stream(payload: &Payload) -> bool {
    payload
        .get("stream")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}
