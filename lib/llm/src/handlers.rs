// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Per-capability request handlers.
//!
//! A handler validates a request against the served models and the engine's model configuration,
//! then forwards it to the engine. Handlers are built once per deployment by the
//! [`crate::registry::HandlerRegistry`] and shared read-only by every request.

use async_trait::async_trait;

use crate::capability::Capability;
use crate::engine::{GenerateOutput, RequestContext};
use crate::protocols::{ErrorResponse, Payload};

mod chat;
mod completion;

pub use chat::ChatHandler;
pub use completion::CompletionHandler;

#[async_trait]
pub trait Handler: Send + Sync {
    fn capability(&self) -> Capability;

    async fn handle(
        &self,
        request: Payload,
        wants_stream: bool,
        context: RequestContext,
    ) -> Result<GenerateOutput, ErrorResponse>;
}

/// Reject requests asking for more tokens than the model accepts
fn check_max_tokens(request: &Payload, max_model_len: Option<u32>) -> Result<(), ErrorResponse> {
    let (Some(limit), Some(requested)) = (
        max_model_len,
        request.get("max_tokens").and_then(serde_json::Value::as_u64),
    ) else {
        return Ok(());
    };
    if requested > u64::from(limit) {
        return Err(ErrorResponse::bad_request(format!(
            "max_tokens ({requested}) exceeds the model's maximum context length ({limit})"
        ))
        .with_param("max_tokens"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_check_max_tokens() {
        assert!(check_max_tokens(&json!({"max_tokens": 16}), Some(32)).is_ok());
        assert!(check_max_tokens(&json!({"max_tokens": 64}), None).is_ok());
        assert!(check_max_tokens(&json!({}), Some(32)).is_ok());

        let err = check_max_tokens(&json!({"max_tokens": 64}), Some(32)).unwrap_err();
        assert_eq!(err.code, 400);
        assert_eq!(err.param.as_deref(), Some("max_tokens"));
    }
}
