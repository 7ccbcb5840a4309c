// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Environment variable name constants for centralized management across the codebase
//!
//! ## Organization
//!
//! Environment variables are organized by functional area:
//! - **Logging**: Log level, configuration file and output format
//! - **Runtime**: Tokio runtime configuration
//! - **Deployment**: Model, parallelism, resources and chat settings of the served deployment

/// Logging environment variables
pub mod logging {
    /// Log level and filter directives (e.g., "debug", "llm_serve=trace")
    pub const LLM_SERVE_LOG: &str = "LLM_SERVE_LOG";

    /// Path to logging configuration file
    pub const LLM_SERVE_LOGGING_CONFIG_PATH: &str = "LLM_SERVE_LOGGING_CONFIG_PATH";

    /// Enable JSONL logging format
    pub const LLM_SERVE_LOGGING_JSONL: &str = "LLM_SERVE_LOGGING_JSONL";

    /// Disable ANSI terminal colors in logs
    pub const LLM_SERVE_DISABLE_ANSI_LOGGING: &str = "LLM_SERVE_DISABLE_ANSI_LOGGING";

    /// Use local timezone for logging timestamps (default is UTC)
    pub const LLM_SERVE_LOG_USE_LOCAL_TZ: &str = "LLM_SERVE_LOG_USE_LOCAL_TZ";
}

/// Runtime configuration environment variables
pub mod runtime {
    /// Prefix shared by every runtime variable
    pub const PREFIX: &str = "LLM_SERVE_RUNTIME_";

    /// Number of async worker threads for Tokio runtime
    pub const LLM_SERVE_RUNTIME_NUM_WORKER_THREADS: &str = "LLM_SERVE_RUNTIME_NUM_WORKER_THREADS";

    /// Maximum number of blocking threads for Tokio runtime
    pub const LLM_SERVE_RUNTIME_MAX_BLOCKING_THREADS: &str =
        "LLM_SERVE_RUNTIME_MAX_BLOCKING_THREADS";
}

/// Deployment configuration environment variables
///
/// Every field of the deployment configuration can be set with `LLM_SERVE_<FIELD>`.
pub mod deployment {
    /// Prefix shared by every deployment variable
    pub const PREFIX: &str = "LLM_SERVE_";

    /// Path to an additional TOML deployment configuration file
    pub const LLM_SERVE_CONFIG_PATH: &str = "LLM_SERVE_CONFIG_PATH";

    /// Model path or hub identifier handed to the engine
    pub const LLM_SERVE_MODEL: &str = "LLM_SERVE_MODEL";

    /// One served model name, or a TOML list of names
    pub const LLM_SERVE_SERVED_MODEL_NAME: &str = "LLM_SERVE_SERVED_MODEL_NAME";

    /// Tensor parallel degree
    pub const LLM_SERVE_TENSOR_PARALLEL_SIZE: &str = "LLM_SERVE_TENSOR_PARALLEL_SIZE";

    /// Pipeline parallel degree
    pub const LLM_SERVE_PIPELINE_PARALLEL_SIZE: &str = "LLM_SERVE_PIPELINE_PARALLEL_SIZE";

    /// CPUs requested for every engine worker
    pub const LLM_SERVE_CPU_PER_WORKER: &str = "LLM_SERVE_CPU_PER_WORKER";

    /// GPUs requested for every engine worker
    pub const LLM_SERVE_GPU_PER_WORKER: &str = "LLM_SERVE_GPU_PER_WORKER";

    /// Placement strategy for multi-worker deployments (PACK, SPREAD, STRICT_PACK, STRICT_SPREAD)
    pub const LLM_SERVE_PLACEMENT_STRATEGY: &str = "LLM_SERVE_PLACEMENT_STRATEGY";

    /// Role of the assistant message in chat responses
    pub const LLM_SERVE_RESPONSE_ROLE: &str = "LLM_SERVE_RESPONSE_ROLE";

    /// Chat template override
    pub const LLM_SERVE_CHAT_TEMPLATE: &str = "LLM_SERVE_CHAT_TEMPLATE";

    /// Prefix for engine arguments passed through verbatim, e.g.
    /// `LLM_SERVE_ENGINE_ARG_MAX_MODEL_LEN=4096` becomes `--max-model-len 4096`
    pub const ENGINE_ARG_PREFIX: &str = "LLM_SERVE_ENGINE_ARG_";
}

/// Metrics environment variables
pub mod metrics {
    /// Override the prefix of every exported metric name
    pub const LLM_SERVE_METRICS_PREFIX: &str = "LLM_SERVE_METRICS_PREFIX";
}
