// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! # llm-serve
//!
//! An OpenAI-compatible frontend for a distributed inference engine. The frontend plans the
//! resources a deployment needs ([`planner`]), builds one handler per capability the first time it
//! is requested ([`registry`]), and routes every request to its handler ([`deployment`]).

pub mod capability;
pub mod config;
pub mod deployment;
pub mod engine;
pub mod engines;
pub mod error;
pub mod handlers;
pub mod http;
pub mod metrics;
pub mod models;
pub mod planner;
pub mod protocols;
pub mod registry;
pub mod stream;

pub use capability::Capability;
pub use config::DeploymentConfig;
pub use deployment::{DispatchOutcome, LlmDeployment};
pub use error::ServeError;
