// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! llm-serve runtime
//!
//! Process-level plumbing shared by the serving library and the launcher: logging setup,
//! Tokio runtime configuration and environment helpers.

pub use anyhow::{
    Context as ErrorContext, Error, Ok as OK, Result, anyhow as error, bail as raise,
};

pub mod config;
pub use config::RuntimeConfig;

pub mod logging;

pub use tokio_util::sync::CancellationToken;
