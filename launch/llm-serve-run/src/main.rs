// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use llm_serve_run::Flags;
use llm_serve_runtime::{CancellationToken, RuntimeConfig, logging};

fn main() -> anyhow::Result<()> {
    logging::init();
    let flags = Flags::parse();

    let runtime_config = RuntimeConfig::from_settings()?;
    tracing::debug!(%runtime_config, "starting runtime");
    let runtime = runtime_config.create_runtime()?;

    let result = runtime.block_on(llm_serve_run::run(flags, CancellationToken::new()));
    if let Err(err) = &result {
        tracing::error!(error = %format!("{err:#}"), "llm-serve-run failed");
    }
    result
}
