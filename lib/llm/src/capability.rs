// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::error::ServeError;

/// The kinds of generation request a deployment can serve
#[derive(Copy, Debug, Clone, Display, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Capability {
    /// Older completions API
    Completion,
    // Chat Completions API
    Chat,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completion => "completion",
            Self::Chat => "chat",
        }
    }

    pub fn all() -> Vec<Self> {
        vec![Self::Completion, Self::Chat]
    }
}

impl FromStr for Capability {
    type Err = ServeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completion" | "completions" => Ok(Self::Completion),
            "chat" | "chat_completions" => Ok(Self::Chat),
            other => Err(ServeError::UnknownCapability(other.to_string())),
        }
    }
}
