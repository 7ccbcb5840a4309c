// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Resource planning for a deployment.
//!
//! A deployment runs one head process plus `tensor_degree * pipeline_degree` engine workers. The
//! planner turns the parallelism settings into the list of resource bundles the scheduler must
//! reserve: the head bundle first, then one identical bundle per worker. With a single worker the
//! deployment runs as a single replica; otherwise the bundles are reserved together as a placement
//! group using the configured strategy.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::ServeError;

/// Scheduler hint for how the bundles of a placement group are co-located
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum PlacementStrategy {
    #[default]
    Pack,
    Spread,
    StrictPack,
    StrictSpread,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParallelismConfig {
    pub tensor_degree: u32,
    pub pipeline_degree: u32,
    pub cpu_per_worker: u32,
    pub gpu_per_worker: u32,
    pub placement_strategy: PlacementStrategy,
}

/// Whole CPU/GPU units requested for one process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceBundle {
    #[serde(rename = "CPU")]
    pub cpu: u32,
    #[serde(rename = "GPU")]
    pub gpu: u32,
}

impl ResourceBundle {
    /// The head process needs one CPU and no accelerator
    pub const HEAD: ResourceBundle = ResourceBundle { cpu: 1, gpu: 0 };

    pub const fn new(cpu: u32, gpu: u32) -> Self {
        ResourceBundle { cpu, gpu }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourcePlan {
    bundles: Vec<ResourceBundle>,
    strategy: PlacementStrategy,
}

/// What the scheduler is asked to run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeploymentRequest {
    SingleReplica {
        head: ResourceBundle,
        worker: ResourceBundle,
    },
    PlacementGroup {
        bundles: Vec<ResourceBundle>,
        strategy: PlacementStrategy,
    },
}

/// Compute the resource plan for `config`.
///
/// Per-worker quantities are used verbatim and there is no feasibility check against the cluster.
/// A worker count whose bundle list cannot be allocated is [`ServeError::InvalidConfig`].
pub fn plan(config: &ParallelismConfig) -> Result<ResourcePlan, ServeError> {
    if config.tensor_degree < 1 {
        return Err(ServeError::invalid_config(format!(
            "tensor parallel degree must be at least 1, got {}",
            config.tensor_degree
        )));
    }
    if config.pipeline_degree < 1 {
        return Err(ServeError::invalid_config(format!(
            "pipeline parallel degree must be at least 1, got {}",
            config.pipeline_degree
        )));
    }

    let num_workers = (config.tensor_degree as usize)
        .checked_mul(config.pipeline_degree as usize)
        .ok_or_else(|| too_many_workers(config))?;
    let worker = ResourceBundle::new(config.cpu_per_worker, config.gpu_per_worker);

    let mut bundles: Vec<ResourceBundle> = Vec::new();
    num_workers
        .checked_add(1)
        .and_then(|len| bundles.try_reserve_exact(len).ok())
        .ok_or_else(|| too_many_workers(config))?;
    bundles.push(ResourceBundle::HEAD);
    bundles.extend(std::iter::repeat_n(worker, num_workers));

    tracing::debug!(
        num_workers,
        strategy = %config.placement_strategy,
        "planned deployment resources"
    );

    Ok(ResourcePlan {
        bundles,
        strategy: config.placement_strategy,
    })
}

fn too_many_workers(config: &ParallelismConfig) -> ServeError {
    ServeError::invalid_config(format!(
        "cannot plan {} x {} workers",
        config.tensor_degree, config.pipeline_degree
    ))
}

impl ResourcePlan {
    /// Head bundle followed by one bundle per worker
    pub fn bundles(&self) -> &[ResourceBundle] {
        &self.bundles
    }

    pub fn head(&self) -> ResourceBundle {
        self.bundles[0]
    }

    pub fn workers(&self) -> &[ResourceBundle] {
        &self.bundles[1..]
    }

    pub fn num_workers(&self) -> usize {
        self.bundles.len() - 1
    }

    pub fn strategy(&self) -> PlacementStrategy {
        self.strategy
    }

    pub fn is_single_replica(&self) -> bool {
        self.num_workers() == 1
    }

    pub fn deployment_request(&self) -> DeploymentRequest {
        if self.is_single_replica() {
            DeploymentRequest::SingleReplica {
                head: self.head(),
                worker: self.workers()[0],
            }
        } else {
            DeploymentRequest::PlacementGroup {
                bundles: self.bundles.clone(),
                strategy: self.strategy,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;
    use rstest::rstest;
    use serde_json::json;

    fn config(tp: u32, pp: u32) -> ParallelismConfig {
        ParallelismConfig {
            tensor_degree: tp,
            pipeline_degree: pp,
            cpu_per_worker: 4,
            gpu_per_worker: 1,
            placement_strategy: PlacementStrategy::Pack,
        }
    }

    #[test]
    fn test_two_by_two() {
        let plan = plan(&config(2, 2)).unwrap();
        let worker = ResourceBundle::new(4, 1);
        assert_eq!(
            plan.bundles(),
            &[ResourceBundle::new(1, 0), worker, worker, worker, worker]
        );
        assert_eq!(plan.strategy(), PlacementStrategy::Pack);
        assert!(!plan.is_single_replica());
    }

    #[rstest]
    #[case(1, 1, 1)]
    #[case(2, 1, 2)]
    #[case(1, 4, 4)]
    #[case(8, 2, 16)]
    fn test_worker_count(#[case] tp: u32, #[case] pp: u32, #[case] workers: usize) {
        let plan = plan(&config(tp, pp)).unwrap();
        assert_eq!(plan.num_workers(), workers);
        assert_eq!(plan.head(), ResourceBundle::HEAD);
    }

    #[rstest]
    #[case(0, 1)]
    #[case(1, 0)]
    #[case(0, 0)]
    fn test_invalid_degree(#[case] tp: u32, #[case] pp: u32) {
        assert_matches!(plan(&config(tp, pp)), Err(ServeError::InvalidConfig(_)));
    }

    #[test]
    fn test_unplannable_worker_count() {
        assert_matches!(
            plan(&config(u32::MAX, u32::MAX)),
            Err(ServeError::InvalidConfig(msg)) if msg.contains("workers")
        );
    }

    #[test]
    fn test_single_replica_request() {
        let request = plan(&config(1, 1)).unwrap().deployment_request();
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "kind": "single_replica",
                "head": {"CPU": 1, "GPU": 0},
                "worker": {"CPU": 4, "GPU": 1}
            })
        );
    }

    #[test]
    fn test_placement_group_request() {
        let mut cfg = config(2, 1);
        cfg.placement_strategy = PlacementStrategy::StrictSpread;
        let request = plan(&cfg).unwrap().deployment_request();
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "kind": "placement_group",
                "bundles": [
                    {"CPU": 1, "GPU": 0},
                    {"CPU": 4, "GPU": 1},
                    {"CPU": 4, "GPU": 1}
                ],
                "strategy": "STRICT_SPREAD"
            })
        );
    }

    #[test]
    fn test_strategy_names() {
        assert_eq!(PlacementStrategy::StrictPack.to_string(), "STRICT_PACK");
        assert_eq!(
            "spread".parse::<PlacementStrategy>().unwrap(),
            PlacementStrategy::Spread
        );
    }

    proptest! {
        #[test]
        fn prop_head_first_then_workers(tp in 1u32..=16, pp in 1u32..=16, cpu in 0u32..64, gpu in 0u32..8) {
            let cfg = ParallelismConfig {
                tensor_degree: tp,
                pipeline_degree: pp,
                cpu_per_worker: cpu,
                gpu_per_worker: gpu,
                placement_strategy: PlacementStrategy::Spread,
            };
            let plan = plan(&cfg).unwrap();
            prop_assert_eq!(plan.bundles().len(), 1 + (tp * pp) as usize);
            prop_assert_eq!(plan.bundles()[0], ResourceBundle::HEAD);
            for bundle in plan.workers() {
                prop_assert_eq!(*bundle, ResourceBundle::new(cpu, gpu));
            }
        }
    }
}
