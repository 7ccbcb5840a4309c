// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ServeError;
use crate::protocols::ErrorResponse;

/// The names a deployment answers to, primary first. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServedModelNames(Vec<String>);

impl ServedModelNames {
    /// Use the explicit names when given, otherwise serve the model under its path
    pub fn resolve(explicit: Option<&[String]>, model_path: &str) -> Result<Self, ServeError> {
        match explicit {
            Some([]) => Err(ServeError::invalid_config(
                "served_model_name must not be an empty list",
            )),
            Some(names) => {
                if names.iter().any(|name| name.trim().is_empty()) {
                    return Err(ServeError::invalid_config(
                        "served_model_name entries must not be blank",
                    ));
                }
                Ok(ServedModelNames(names.to_vec()))
            }
            None if model_path.trim().is_empty() => Err(ServeError::invalid_config(
                "a model path is required when no served_model_name is given",
            )),
            None => Ok(ServedModelNames(vec![model_path.to_string()])),
        }
    }

    pub fn primary(&self) -> &str {
        &self.0[0]
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|n| n == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A LoRA adapter served next to the base model, written `name=path`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LoraModule {
    pub name: String,
    pub path: String,
}

impl FromStr for LoraModule {
    type Err = ServeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((name, path)) if !name.trim().is_empty() && !path.trim().is_empty() => {
                Ok(LoraModule {
                    name: name.trim().to_string(),
                    path: path.trim().to_string(),
                })
            }
            _ => Err(ServeError::invalid_config(format!(
                "invalid LoRA module '{s}', expected name=path"
            ))),
        }
    }
}

impl TryFrom<String> for LoraModule {
    type Error = ServeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LoraModule> for String {
    fn from(module: LoraModule) -> Self {
        module.to_string()
    }
}

impl fmt::Display for LoraModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseModelPath {
    pub name: String,
    pub model_path: String,
}

/// `GET /v1/models` response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelList {
    pub object: String,
    pub data: Vec<ModelCard>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelCard {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
    pub root: Option<String>,
    pub parent: Option<String>,
}

/// Models a deployment answers for and the check applied to every request's `model` field
#[derive(Debug, Clone)]
pub struct ServingModels {
    base_model_paths: Vec<BaseModelPath>,
    lora_modules: Vec<LoraModule>,
    created: i64,
}

impl ServingModels {
    pub fn new(names: &ServedModelNames, model_path: &str, lora_modules: Vec<LoraModule>) -> Self {
        ServingModels {
            base_model_paths: names
                .iter()
                .map(|name| BaseModelPath {
                    name: name.to_string(),
                    model_path: model_path.to_string(),
                })
                .collect(),
            lora_modules,
            created: chrono::Utc::now().timestamp(),
        }
    }

    pub fn primary(&self) -> &str {
        &self.base_model_paths[0].name
    }

    pub fn is_served(&self, name: &str) -> bool {
        self.base_model_paths.iter().any(|base| base.name == name)
            || self.lora_modules.iter().any(|lora| lora.name == name)
    }

    /// Metric label for a request naming `requested`. Names that are not served collapse onto the
    /// primary name so the label set stays bounded by the configuration.
    pub fn metrics_label(&self, requested: Option<&str>) -> &str {
        requested
            .and_then(|name| {
                self.base_model_paths
                    .iter()
                    .map(|base| base.name.as_str())
                    .chain(self.lora_modules.iter().map(|lora| lora.name.as_str()))
                    .find(|served| *served == name)
            })
            .unwrap_or_else(|| self.primary())
    }

    /// The model a request targets. A request without a model goes to the primary name.
    pub fn resolve(&self, requested: Option<&str>) -> Result<String, ErrorResponse> {
        match requested {
            None => Ok(self.primary().to_string()),
            Some(name) if self.is_served(name) => Ok(name.to_string()),
            Some(name) => Err(
                ErrorResponse::not_found(format!("The model `{name}` does not exist."))
                    .with_param("model"),
            ),
        }
    }

    pub fn model_list(&self) -> ModelList {
        let base = self.base_model_paths.iter().map(|base| ModelCard {
            id: base.name.clone(),
            object: "model".to_string(),
            created: self.created,
            owned_by: "llm-serve".to_string(),
            root: Some(base.model_path.clone()),
            parent: None,
        });
        let lora = self.lora_modules.iter().map(|lora| ModelCard {
            id: lora.name.clone(),
            object: "model".to_string(),
            created: self.created,
            owned_by: "llm-serve".to_string(),
            root: Some(lora.path.clone()),
            parent: Some(self.primary().to_string()),
        });
        ModelList {
            object: "list".to_string(),
            data: base.chain(lora).collect(),
        }
    }
}
