// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use derive_builder::Builder;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

pub mod environment_names;

/// Blocking threads used when the host does not report its parallelism
const DEFAULT_MAX_BLOCKING_THREADS: usize = 512;

/// Runtime configuration
/// Defines the configuration for the Tokio runtime the frontend runs on
#[derive(Serialize, Deserialize, Validate, Debug, Builder, Clone)]
#[builder(build_fn(private, name = "build_internal"), derive(Debug, Serialize))]
pub struct RuntimeConfig {
    /// Number of async worker threads
    /// If set to 1, the runtime will run in single-threaded mode
    /// Set this at runtime with environment variable LLM_SERVE_RUNTIME_NUM_WORKER_THREADS.
    /// Defaults to number of cores.
    #[validate(range(min = 1))]
    #[builder_field_attr(serde(skip_serializing_if = "Option::is_none"))]
    pub num_worker_threads: Option<usize>,

    /// Maximum number of blocking threads
    /// Blocking threads are used for blocking operations, this value must be greater than 0.
    /// Set this at runtime with environment variable LLM_SERVE_RUNTIME_MAX_BLOCKING_THREADS.
    #[validate(range(min = 1))]
    #[builder(default = "512")]
    #[builder_field_attr(serde(skip_serializing_if = "Option::is_none"))]
    pub max_blocking_threads: usize,
}

impl fmt::Display for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // If None, it defaults to "number of cores", so we indicate that.
        match self.num_worker_threads {
            Some(val) => write!(f, "num_worker_threads={val}, ")?,
            None => write!(f, "num_worker_threads=default (num_cores), ")?,
        }
        write!(f, "max_blocking_threads={}", self.max_blocking_threads)
    }
}

impl RuntimeConfig {
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::default()
    }

    pub(crate) fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(RuntimeConfig::default()))
            .merge(Toml::file("/opt/llm-serve/defaults/runtime.toml"))
            .merge(Toml::file("/opt/llm-serve/etc/runtime.toml"))
            .merge(non_empty_env(environment_names::runtime::PREFIX))
    }

    /// Load the runtime configuration from the environment and configuration files
    /// Configuration is priorities in the following order, where the last has the lowest priority:
    /// 1. Environment variables (top priority), prefixed with `LLM_SERVE_RUNTIME_`
    /// 2. /opt/llm-serve/etc/runtime.toml
    /// 3. /opt/llm-serve/defaults/runtime.toml (lowest priority)
    pub fn from_settings() -> Result<RuntimeConfig> {
        let config: RuntimeConfig = Self::figment().extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn single_threaded() -> Self {
        RuntimeConfig {
            num_worker_threads: Some(1),
            max_blocking_threads: 1,
        }
    }

    /// Build the Tokio runtime described by this configuration
    pub fn create_runtime(&self) -> std::io::Result<tokio::runtime::Runtime> {
        let worker_threads = self.num_worker_threads.unwrap_or_else(available_cores);
        if worker_threads == 1 {
            return tokio::runtime::Builder::new_current_thread()
                .max_blocking_threads(self.max_blocking_threads)
                .enable_all()
                .build();
        }
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads)
            .max_blocking_threads(self.max_blocking_threads)
            .enable_all()
            .build()
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let num_cores = available_cores();
        Self {
            num_worker_threads: Some(num_cores),
            max_blocking_threads: num_cores.max(1).min(DEFAULT_MAX_BLOCKING_THREADS),
        }
    }
}

impl RuntimeConfigBuilder {
    /// Build and validate the runtime configuration
    pub fn build(&self) -> Result<RuntimeConfig> {
        let config = self.build_internal()?;
        config.validate()?;
        Ok(config)
    }
}

fn available_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// An [`Env`] provider for `prefix` that skips variables set to the empty string.
///
/// Keys are lowercased with the prefix stripped, so `LLM_SERVE_RUNTIME_NUM_WORKER_THREADS`
/// maps onto the `num_worker_threads` field.
pub fn non_empty_env(prefix: &'static str) -> Env {
    Env::prefixed(prefix).filter_map(move |k| {
        let full_key = format!("{prefix}{}", k.as_str());
        // filters out empty environment variables
        match std::env::var(&full_key) {
            Ok(v) if !v.is_empty() => Some(k.into()),
            _ => None,
        }
    })
}

/// Check if a string is truthy
/// This will be used to evaluate environment variables or any other subjective
/// configuration parameters that can be set by the user that should be evaluated
/// as a boolean value.
pub fn is_truthy(val: &str) -> bool {
    matches!(val.to_lowercase().as_str(), "1" | "true" | "on" | "yes")
}

/// Check if a string is falsey
/// (opposite of is_truthy).
pub fn is_falsey(val: &str) -> bool {
    matches!(val.to_lowercase().as_str(), "0" | "false" | "off" | "no")
}

pub fn parse_bool(val: &str) -> anyhow::Result<bool> {
    if is_truthy(val) {
        Ok(true)
    } else if is_falsey(val) {
        Ok(false)
    } else {
        anyhow::bail!(
            "Invalid boolean value: '{}'. Expected one of: true/false, 1/0, on/off, yes/no",
            val
        )
    }
}

/// Check if an environment variable is truthy
pub fn env_is_truthy(env: &str) -> bool {
    match std::env::var(env) {
        Ok(val) => is_truthy(val.as_str()),
        Err(_) => false,
    }
}

/// Check if an environment variable is falsey
pub fn env_is_falsey(env: &str) -> bool {
    match std::env::var(env) {
        Ok(val) => is_falsey(val.as_str()),
        Err(_) => false,
    }
}

/// Check whether JSONL logging enabled
/// Set the `LLM_SERVE_LOGGING_JSONL` environment variable a [`is_truthy`] value
pub fn jsonl_logging_enabled() -> bool {
    env_is_truthy(environment_names::logging::LLM_SERVE_LOGGING_JSONL)
}

/// Check whether logging with ANSI terminal escape codes and colors is disabled.
/// Set the `LLM_SERVE_DISABLE_ANSI_LOGGING` environment variable a [`is_truthy`] value
pub fn disable_ansi_logging() -> bool {
    env_is_truthy(environment_names::logging::LLM_SERVE_DISABLE_ANSI_LOGGING)
}

/// Check whether to use local timezone for logging timestamps (default is UTC)
/// Set the `LLM_SERVE_LOG_USE_LOCAL_TZ` environment variable to a [`is_truthy`] value
pub fn use_local_timezone() -> bool {
    env_is_truthy(environment_names::logging::LLM_SERVE_LOG_USE_LOCAL_TZ)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_config_with_env_vars() -> Result<()> {
        use environment_names::runtime;
        temp_env::with_vars(
            vec![
                (runtime::LLM_SERVE_RUNTIME_NUM_WORKER_THREADS, Some("24")),
                (runtime::LLM_SERVE_RUNTIME_MAX_BLOCKING_THREADS, Some("32")),
            ],
            || {
                let config = RuntimeConfig::from_settings()?;
                assert_eq!(config.num_worker_threads, Some(24));
                assert_eq!(config.max_blocking_threads, 32);
                Ok(())
            },
        )
    }

    #[test]
    fn test_runtime_config_defaults() -> Result<()> {
        use environment_names::runtime;
        temp_env::with_vars(
            vec![
                (runtime::LLM_SERVE_RUNTIME_NUM_WORKER_THREADS, None::<&str>),
                (runtime::LLM_SERVE_RUNTIME_MAX_BLOCKING_THREADS, Some("")),
            ],
            || {
                let config = RuntimeConfig::from_settings()?;

                let default_config = RuntimeConfig::default();
                assert_eq!(config.num_worker_threads, default_config.num_worker_threads);
                assert_eq!(
                    config.max_blocking_threads,
                    default_config.max_blocking_threads
                );
                Ok(())
            },
        )
    }

    #[test]
    fn test_runtime_config_rejects_invalid_thread_count() {
        use environment_names::runtime;
        temp_env::with_vars(
            vec![
                (runtime::LLM_SERVE_RUNTIME_NUM_WORKER_THREADS, Some("0")),
                (runtime::LLM_SERVE_RUNTIME_MAX_BLOCKING_THREADS, Some("0")),
            ],
            || {
                let err = RuntimeConfig::from_settings().unwrap_err().to_string();
                assert!(err.contains("num_worker_threads"));
                assert!(err.contains("max_blocking_threads"));
            },
        )
    }

    #[test]
    fn test_builder_validates() {
        assert!(RuntimeConfig::builder().num_worker_threads(Some(0)).build().is_err());

        let config = RuntimeConfig::builder()
            .num_worker_threads(Some(2))
            .build()
            .unwrap();
        assert_eq!(config.max_blocking_threads, 512);
        assert_eq!(
            config.to_string(),
            "num_worker_threads=2, max_blocking_threads=512"
        );
    }

    #[test]
    fn test_single_threaded_runtime_builds() {
        let rt = RuntimeConfig::single_threaded().create_runtime().unwrap();
        assert_eq!(rt.block_on(async { 40 + 2 }), 42);
    }

    #[test]
    fn test_is_truthy_and_falsey() {
        assert!(is_truthy("1"));
        assert!(is_truthy("TRUE"));
        assert!(is_truthy("on"));
        assert!(is_truthy("yes"));

        assert!(is_falsey("0"));
        assert!(is_falsey("False"));
        assert!(is_falsey("off"));
        assert!(is_falsey("no"));

        assert!(!is_truthy("0"));
        assert!(!is_falsey("1"));
        assert!(!is_truthy("random"));

        assert!(parse_bool("yes").unwrap());
        assert!(!parse_bool("OFF").unwrap());
        assert!(parse_bool("maybe").is_err());

        temp_env::with_vars(vec![("LLM_SERVE_TEST_TRUTHY", Some("true"))], || {
            assert!(env_is_truthy("LLM_SERVE_TEST_TRUTHY"));
            assert!(!env_is_falsey("LLM_SERVE_TEST_TRUTHY"));
        });

        temp_env::with_vars(vec![("LLM_SERVE_TEST_MISSING", None::<&str>)], || {
            assert!(!env_is_truthy("LLM_SERVE_TEST_MISSING"));
            assert!(!env_is_falsey("LLM_SERVE_TEST_MISSING"));
        });
    }
}
