// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use axum::http::StatusCode;
use thiserror::Error;

use crate::capability::Capability;
use crate::protocols::ErrorResponse;

/// Errors raised by the dispatch-and-capacity layer.
///
/// Engine failures are not part of this taxonomy: a handler returns them as an [`ErrorResponse`]
/// which the dispatcher surfaces verbatim.
///
/// The type is `Clone` so one failed handler construction can be delivered to every caller that
/// was waiting on it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ServeError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown capability: {0}")]
    UnknownCapability(String),

    #[error("failed to construct {capability} handler: {reason}")]
    HandlerConstructionFailed {
        capability: Capability,
        reason: String,
    },

    #[error("stream interrupted: {reason}")]
    StreamInterrupted { reason: String },
}

impl ServeError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        ServeError::InvalidConfig(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServeError::InvalidConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServeError::UnknownCapability(_) => StatusCode::NOT_FOUND,
            ServeError::HandlerConstructionFailed { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ServeError::StreamInterrupted { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// OpenAI-style error body for this error
    pub fn to_error_response(&self) -> ErrorResponse {
        let error_type = match self {
            ServeError::InvalidConfig(_) => "InternalServerError",
            ServeError::UnknownCapability(_) => "NotFoundError",
            ServeError::HandlerConstructionFailed { .. } => "ServiceUnavailableError",
            ServeError::StreamInterrupted { .. } => "InternalServerError",
        };
        ErrorResponse::new(self.to_string(), error_type, self.status_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ServeError::UnknownCapability("embedding".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        let err = ServeError::HandlerConstructionFailed {
            capability: Capability::Chat,
            reason: "model config unavailable".into(),
        };
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let body = err.to_error_response();
        assert_eq!(body.code, 503);
        assert_eq!(body.r#type, "ServiceUnavailableError");
        assert_eq!(
            body.message,
            "failed to construct chat handler: model config unavailable"
        );
    }
}
