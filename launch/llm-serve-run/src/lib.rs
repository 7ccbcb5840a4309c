// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use anyhow::Context as _;
use llm_serve::engine::ModelConfig;
use llm_serve::engines::EchoEngine;
use llm_serve::http::HttpService;
use llm_serve::metrics::Metrics;
use llm_serve::planner::{self, ResourcePlan};
use llm_serve::{DeploymentConfig, LlmDeployment};
use tokio_util::sync::CancellationToken;

mod flags;
pub use flags::Flags;

pub async fn run(flags: Flags, cancel_token: CancellationToken) -> anyhow::Result<()> {
    //
    // Configure
    //

    let mut config = match &flags.config {
        Some(path) => DeploymentConfig::from_settings_with_file(path),
        None => DeploymentConfig::from_settings(),
    }
    .context("loading deployment config")?;

    if let Some(host) = flags.host.clone() {
        config.http_host = host;
    }
    if let Some(port) = flags.port {
        config.http_port = port;
    }

    //
    // Plan
    //

    let plan = plan_resources(&config)?;
    let request = plan.deployment_request();
    tracing::info!(
        request = %serde_json::to_string(&request)?,
        engine_args = ?config.engine_cli_args()?,
        "deployment planned"
    );

    if flags.plan_only {
        println!("{}", serde_json::to_string_pretty(&request)?);
        return Ok(());
    }

    //
    // Serve
    //

    let engine = Arc::new(EchoEngine::new(ModelConfig {
        model: config.model.clone(),
        max_model_len: config.max_model_len,
    }));
    let deployment = LlmDeployment::new(engine, &config, Arc::new(Metrics::new()))?;

    let service = HttpService::builder()
        .host(config.http_host.clone())
        .port(config.http_port)
        .deployment(Arc::new(deployment))
        .build()?;

    let shutdown = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, shutting down");
        }
        shutdown.cancel();
    });

    service.run(cancel_token).await
}

fn plan_resources(config: &DeploymentConfig) -> anyhow::Result<ResourcePlan> {
    let parallelism = config.parallelism()?;
    let plan = planner::plan(&parallelism).context("planning deployment resources")?;
    Ok(plan)
}
