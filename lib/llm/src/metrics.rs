// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::{sync::Arc, time::Instant};

use llm_serve_runtime::config::environment_names::metrics as env_metrics;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts};

use crate::capability::Capability;
use crate::engine::{EngineStats, MetricsSink};

pub use prometheus::Registry;

/// Default prefix of every metric name
pub const DEFAULT_PREFIX: &str = "llm_serve";

pub struct Metrics {
    request_counter: IntCounterVec,
    inflight_gauge: IntGaugeVec,
    request_duration: HistogramVec,
    handler_builds: IntCounterVec,
    engine_running: IntGaugeVec,
    engine_waiting: IntGaugeVec,
    engine_prompt_tokens: IntCounterVec,
    engine_generation_tokens: IntCounterVec,
}

/// RAII object for inflight gauge and request counters
/// If this object is dropped without calling `mark_ok`, then the request will increment
/// the request counter with the `status` label with `error`; otherwise, it will increment
/// the counter with `status` label `success`
pub struct InflightGuard {
    metrics: Arc<Metrics>,
    model: String,
    capability: Capability,
    request_type: RequestType,
    status: Status,
    timer: Instant,
}

pub enum RequestType {
    /// SingleIn / SingleOut
    Unary,

    /// SingleIn / ManyOut
    Stream,
}

#[derive(PartialEq)]
pub enum Status {
    Success,
    Error,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Unary => "unary",
            RequestType::Stream => "stream",
        }
    }
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Error => "error",
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create Metrics with the [`DEFAULT_PREFIX`] or a custom prefix from `LLM_SERVE_METRICS_PREFIX`.
    ///
    /// - `{prefix}_requests_total` - requests by model, capability, request type and status
    /// - `{prefix}_inflight_requests` - requests currently being served, by model
    /// - `{prefix}_request_duration_seconds` - request duration, by model
    /// - `{prefix}_handler_builds_total` - handler constructions by capability and status
    /// - `{prefix}_engine_*` - statistics reported by the engine, by model
    pub fn new() -> Self {
        let raw_prefix = std::env::var(env_metrics::LLM_SERVE_METRICS_PREFIX)
            .unwrap_or_else(|_| DEFAULT_PREFIX.to_string());
        let prefix = sanitize_prefix(&raw_prefix);
        if prefix != raw_prefix {
            tracing::warn!(
                raw = %raw_prefix,
                sanitized = %prefix,
                env = %env_metrics::LLM_SERVE_METRICS_PREFIX,
                "Sanitized metrics prefix"
            );
        }
        let metric_name = |suffix: &str| format!("{prefix}_{suffix}");

        let request_counter = IntCounterVec::new(
            Opts::new(
                metric_name("requests_total"),
                "Total number of LLM requests processed",
            ),
            &["model", "capability", "request_type", "status"],
        )
        .unwrap();

        let inflight_gauge = IntGaugeVec::new(
            Opts::new(
                metric_name("inflight_requests"),
                "Number of inflight requests",
            ),
            &["model"],
        )
        .unwrap();

        let buckets = vec![0.0, 1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0, 256.0];

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                metric_name("request_duration_seconds"),
                "Duration of LLM requests",
            )
            .buckets(buckets),
            &["model"],
        )
        .unwrap();

        let handler_builds = IntCounterVec::new(
            Opts::new(
                metric_name("handler_builds_total"),
                "Number of capability handler constructions",
            ),
            &["capability", "status"],
        )
        .unwrap();

        let engine_running = IntGaugeVec::new(
            Opts::new(
                metric_name("engine_running_requests"),
                "Requests currently running in the engine",
            ),
            &["model"],
        )
        .unwrap();

        let engine_waiting = IntGaugeVec::new(
            Opts::new(
                metric_name("engine_waiting_requests"),
                "Requests waiting to be scheduled by the engine",
            ),
            &["model"],
        )
        .unwrap();

        let engine_prompt_tokens = IntCounterVec::new(
            Opts::new(
                metric_name("engine_prompt_tokens_total"),
                "Prompt tokens processed by the engine",
            ),
            &["model"],
        )
        .unwrap();

        let engine_generation_tokens = IntCounterVec::new(
            Opts::new(
                metric_name("engine_generation_tokens_total"),
                "Tokens generated by the engine",
            ),
            &["model"],
        )
        .unwrap();

        Metrics {
            request_counter,
            inflight_gauge,
            request_duration,
            handler_builds,
            engine_running,
            engine_waiting,
            engine_prompt_tokens,
            engine_generation_tokens,
        }
    }

    /// Get the number of requests for the given dimensions:
    /// - model
    /// - capability (completion/chat)
    /// - request type (unary/stream)
    /// - status (success/error)
    pub fn get_request_counter(
        &self,
        model: &str,
        capability: Capability,
        request_type: &RequestType,
        status: &Status,
    ) -> u64 {
        self.request_counter
            .with_label_values(&[
                model,
                capability.as_str(),
                request_type.as_str(),
                status.as_str(),
            ])
            .get()
    }

    fn inc_request_counter(
        &self,
        model: &str,
        capability: Capability,
        request_type: &RequestType,
        status: &Status,
    ) {
        self.request_counter
            .with_label_values(&[
                model,
                capability.as_str(),
                request_type.as_str(),
                status.as_str(),
            ])
            .inc()
    }

    /// Get the number if inflight requests for the given model
    pub fn get_inflight_count(&self, model: &str) -> i64 {
        self.inflight_gauge.with_label_values(&[model]).get()
    }

    fn inc_inflight_gauge(&self, model: &str) {
        self.inflight_gauge.with_label_values(&[model]).inc()
    }

    fn dec_inflight_gauge(&self, model: &str) {
        self.inflight_gauge.with_label_values(&[model]).dec()
    }

    /// Count one handler construction attempt
    pub fn inc_handler_build(&self, capability: Capability, status: &Status) {
        self.handler_builds
            .with_label_values(&[capability.as_str(), status.as_str()])
            .inc()
    }

    pub fn get_handler_builds(&self, capability: Capability, status: &Status) -> u64 {
        self.handler_builds
            .with_label_values(&[capability.as_str(), status.as_str()])
            .get()
    }

    pub fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.request_counter.clone()))?;
        registry.register(Box::new(self.inflight_gauge.clone()))?;
        registry.register(Box::new(self.request_duration.clone()))?;
        registry.register(Box::new(self.handler_builds.clone()))?;
        registry.register(Box::new(self.engine_running.clone()))?;
        registry.register(Box::new(self.engine_waiting.clone()))?;
        registry.register(Box::new(self.engine_prompt_tokens.clone()))?;
        registry.register(Box::new(self.engine_generation_tokens.clone()))?;
        Ok(())
    }

    /// Create a new [`InflightGuard`] for the given model and annotate if its a streaming request,
    /// and the capability that was hit
    pub fn create_inflight_guard(
        self: Arc<Self>,
        model: &str,
        capability: Capability,
        streaming: bool,
    ) -> InflightGuard {
        let request_type = if streaming {
            RequestType::Stream
        } else {
            RequestType::Unary
        };

        InflightGuard::new(
            self.clone(),
            model.to_string().to_lowercase(),
            capability,
            request_type,
        )
    }

    /// A sink that publishes engine statistics labelled with `model`
    pub fn engine_sink(self: Arc<Self>, model: &str) -> Arc<dyn MetricsSink> {
        Arc::new(EngineStatsSink {
            metrics: self,
            model: model.to_string(),
        })
    }
}

impl InflightGuard {
    fn new(
        metrics: Arc<Metrics>,
        model: String,
        capability: Capability,
        request_type: RequestType,
    ) -> Self {
        let timer = Instant::now();

        metrics.inc_inflight_gauge(&model);

        InflightGuard {
            metrics,
            model,
            capability,
            request_type,
            status: Status::Error,
            timer,
        }
    }

    pub fn mark_ok(&mut self) {
        self.status = Status::Success;
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        let duration = self.timer.elapsed().as_secs_f64();

        self.metrics.dec_inflight_gauge(&self.model);

        self.metrics.inc_request_counter(
            &self.model,
            self.capability,
            &self.request_type,
            &self.status,
        );

        self.metrics
            .request_duration
            .with_label_values(&[&self.model])
            .observe(duration);
    }
}

struct EngineStatsSink {
    metrics: Arc<Metrics>,
    model: String,
}

impl MetricsSink for EngineStatsSink {
    fn record(&self, stats: &EngineStats) {
        let labels = [self.model.as_str()];
        let m = &self.metrics;
        m.engine_running
            .with_label_values(&labels)
            .set(clamp_u64_to_i64(stats.num_running));
        m.engine_waiting
            .with_label_values(&labels)
            .set(clamp_u64_to_i64(stats.num_waiting));
        m.engine_prompt_tokens
            .with_label_values(&labels)
            .inc_by(stats.prompt_tokens);
        m.engine_generation_tokens
            .with_label_values(&labels)
            .inc_by(stats.generation_tokens);
    }
}

fn clamp_u64_to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Replace characters Prometheus does not allow in metric names
fn sanitize_prefix(raw: &str) -> String {
    let mut sanitized: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == ':' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() || sanitized.starts_with(|c: char| c.is_ascii_digit()) {
        sanitized.insert(0, '_');
    }
    sanitized
}

/// Render `registry` in the Prometheus text format
pub fn render(registry: &Registry) -> anyhow::Result<String> {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = vec![];
    encoder.encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
