// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Flags {
    /// TOML deployment config, layered over /opt/llm-serve/etc/deployment.toml and below
    /// LLM_SERVE_* environment variables
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print the placement request as JSON and exit without serving
    #[arg(long, default_value_t = false)]
    pub plan_only: bool,

    /// HTTP host to listen on. Overrides `http_host` from the config.
    #[arg(long)]
    pub host: Option<String>,

    /// HTTP port to listen on. Overrides `http_port` from the config.
    #[arg(long)]
    pub port: Option<u16>,
}
