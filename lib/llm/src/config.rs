// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Deployment configuration.
//!
//! Loaded once at startup, in increasing priority:
//! 1. Built-in defaults
//! 2. `/opt/llm-serve/etc/deployment.toml`
//! 3. The TOML file named by `LLM_SERVE_CONFIG_PATH`
//! 4. A TOML file given on the command line
//! 5. `LLM_SERVE_<FIELD>` environment variables (empty values are ignored)
//!
//! Engine arguments not modelled here pass through verbatim: `LLM_SERVE_ENGINE_ARG_MAX_NUM_SEQS=64`
//! becomes `--max-num-seqs 64` on the engine command line.

use std::collections::BTreeMap;
use std::path::Path;

use derive_builder::Builder;
use figment::{
    Figment,
    providers::{Format, Serialized, Toml},
};
use llm_serve_runtime::config::environment_names::deployment as env_deployment;
use llm_serve_runtime::config::non_empty_env;
use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

use crate::capability::Capability;
use crate::error::ServeError;
use crate::models::{LoraModule, ServedModelNames};
use crate::planner::{ParallelismConfig, PlacementStrategy};
use crate::protocols::{ChatSettings, ChatTemplateContentFormat};

const DEFAULT_CONFIG_FILE: &str = "/opt/llm-serve/etc/deployment.toml";

#[derive(Serialize, Deserialize, Validate, Debug, Clone, Builder, PartialEq)]
#[builder(build_fn(private, name = "build_internal"))]
pub struct DeploymentConfig {
    /// Model path or hub identifier handed to the engine
    #[validate(length(min = 1))]
    #[builder(setter(into))]
    pub model: String,

    /// One name or a list of names; defaults to the model path
    #[serde(default, deserialize_with = "one_or_many")]
    #[builder(default, setter(strip_option))]
    pub served_model_name: Option<Vec<String>>,

    #[validate(range(min = 1))]
    #[builder(default = "1")]
    pub tensor_parallel_size: u32,

    #[validate(range(min = 1))]
    #[builder(default = "1")]
    pub pipeline_parallel_size: u32,

    /// Required; there is no sensible default for worker hardware
    #[builder(default, setter(strip_option))]
    pub cpu_per_worker: Option<u32>,

    /// Required; there is no sensible default for worker hardware
    #[builder(default, setter(strip_option))]
    pub gpu_per_worker: Option<u32>,

    #[builder(default)]
    pub placement_strategy: PlacementStrategy,

    #[builder(default = "\"assistant\".to_string()", setter(into))]
    pub response_role: String,

    #[builder(default, setter(strip_option, into))]
    pub chat_template: Option<String>,

    #[builder(default)]
    pub chat_template_content_format: ChatTemplateContentFormat,

    #[serde(default)]
    #[builder(default)]
    pub lora_modules: Vec<LoraModule>,

    /// Capabilities this deployment serves
    #[builder(default = "Capability::all()")]
    pub capabilities: Vec<Capability>,

    /// Maximum sequence length, forwarded to the engine when set
    #[builder(default, setter(strip_option))]
    pub max_model_len: Option<u32>,

    #[builder(default = "\"0.0.0.0\".to_string()", setter(into))]
    pub http_host: String,

    #[builder(default = "8000")]
    pub http_port: u16,

    /// Extra engine arguments, `name -> value`. An empty value renders as a bare flag.
    #[serde(default)]
    #[builder(default)]
    pub engine_args: BTreeMap<String, String>,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        DeploymentConfig {
            model: String::new(),
            served_model_name: None,
            tensor_parallel_size: 1,
            pipeline_parallel_size: 1,
            cpu_per_worker: None,
            gpu_per_worker: None,
            placement_strategy: PlacementStrategy::default(),
            response_role: "assistant".to_string(),
            chat_template: None,
            chat_template_content_format: ChatTemplateContentFormat::default(),
            lora_modules: Vec::new(),
            capabilities: Capability::all(),
            max_model_len: None,
            http_host: "0.0.0.0".to_string(),
            http_port: 8000,
            engine_args: BTreeMap::new(),
        }
    }
}

impl DeploymentConfigBuilder {
    /// Build and validate the deployment configuration
    pub fn build(&self) -> Result<DeploymentConfig, ServeError> {
        let config = self
            .build_internal()
            .map_err(|e| ServeError::invalid_config(e.to_string()))?;
        config.validated()
    }
}

impl DeploymentConfig {
    pub fn builder() -> DeploymentConfigBuilder {
        DeploymentConfigBuilder::default()
    }

    pub(crate) fn figment(extra_file: Option<&Path>) -> Figment {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(DeploymentConfig::default()))
            .merge(Toml::file(DEFAULT_CONFIG_FILE));
        if let Ok(path) = std::env::var(env_deployment::LLM_SERVE_CONFIG_PATH) {
            if !path.is_empty() {
                figment = figment.merge(Toml::file(path));
            }
        }
        if let Some(path) = extra_file {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(non_empty_env(env_deployment::PREFIX))
    }

    /// Load the deployment configuration from files and the environment
    pub fn from_settings() -> Result<DeploymentConfig, ServeError> {
        Self::load(None)
    }

    /// As [`DeploymentConfig::from_settings`], with `path` layered just below the environment
    pub fn from_settings_with_file(path: &Path) -> Result<DeploymentConfig, ServeError> {
        Self::load(Some(path))
    }

    fn load(extra_file: Option<&Path>) -> Result<DeploymentConfig, ServeError> {
        let mut config: DeploymentConfig = Self::figment(extra_file)
            .extract()
            .map_err(|e| ServeError::invalid_config(e.to_string()))?;
        config.engine_args.extend(engine_args_from_env());
        config.validated()
    }

    fn validated(self) -> Result<DeploymentConfig, ServeError> {
        self.validate()
            .map_err(|e| ServeError::invalid_config(e.to_string()))?;
        if self.capabilities.is_empty() {
            return Err(ServeError::invalid_config(
                "at least one capability must be enabled",
            ));
        }
        Ok(self)
    }

    pub fn served_model_names(&self) -> Result<ServedModelNames, ServeError> {
        ServedModelNames::resolve(self.served_model_name.as_deref(), &self.model)
    }

    pub fn parallelism(&self) -> Result<ParallelismConfig, ServeError> {
        let cpu_per_worker = self
            .cpu_per_worker
            .ok_or_else(|| ServeError::invalid_config("cpu_per_worker is required"))?;
        let gpu_per_worker = self
            .gpu_per_worker
            .ok_or_else(|| ServeError::invalid_config("gpu_per_worker is required"))?;
        Ok(ParallelismConfig {
            tensor_degree: self.tensor_parallel_size,
            pipeline_degree: self.pipeline_parallel_size,
            cpu_per_worker,
            gpu_per_worker,
            placement_strategy: self.placement_strategy,
        })
    }

    pub fn chat_settings(&self) -> ChatSettings {
        ChatSettings {
            response_role: self.response_role.clone(),
            chat_template: self.chat_template.clone(),
            chat_template_content_format: self.chat_template_content_format,
        }
    }

    /// Command line for launching the engine
    pub fn engine_cli_args(&self) -> Result<Vec<String>, ServeError> {
        let mut args = vec!["--model".to_string(), self.model.clone()];

        args.push("--served-model-name".to_string());
        args.extend(self.served_model_names()?.iter().map(str::to_string));

        args.push("--tensor-parallel-size".to_string());
        args.push(self.tensor_parallel_size.to_string());
        args.push("--pipeline-parallel-size".to_string());
        args.push(self.pipeline_parallel_size.to_string());

        if let Some(max_model_len) = self.max_model_len {
            if !self.engine_args.contains_key("max-model-len") {
                args.push("--max-model-len".to_string());
                args.push(max_model_len.to_string());
            }
        }

        for (name, value) in &self.engine_args {
            args.push(format!("--{name}"));
            if !value.is_empty() {
                args.push(value.clone());
            }
        }
        Ok(args)
    }
}

/// Collect `LLM_SERVE_ENGINE_ARG_<NAME>=<value>` as `name -> value`, skipping empty values
pub fn engine_args_from_env() -> BTreeMap<String, String> {
    std::env::vars()
        .filter_map(|(key, value)| {
            let name = key.strip_prefix(env_deployment::ENGINE_ARG_PREFIX)?;
            if name.is_empty() || value.is_empty() {
                return None;
            }
            Some((name.to_lowercase().replace('_', "-"), value))
        })
        .collect()
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(
        Option::<OneOrMany>::deserialize(deserializer)?.map(|names| match names {
            OneOrMany::One(name) => vec![name],
            OneOrMany::Many(names) => names,
        }),
    )
}
