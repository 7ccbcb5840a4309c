// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Lazy, build-once storage for capability handlers.
//!
//! Each enabled capability owns one slot. The first caller to find a slot empty installs a shared
//! build future and every concurrent caller awaits that same future, so the builder runs at most
//! once per successful construction even though it suspends (fetching the model configuration).
//! The first caller to observe the result publishes it. A failure is delivered to every waiter and
//! resets the slot, so a later call builds again. Once built, a handler is returned under a read
//! lock without suspending.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::RwLock;

use crate::capability::Capability;
use crate::error::ServeError;
use crate::handlers::Handler;

pub type HandlerRef = Arc<dyn Handler>;

type BuildFuture = Shared<BoxFuture<'static, Result<HandlerRef, ServeError>>>;

enum SlotState {
    Empty,
    Building { generation: u64, build: BuildFuture },
    Ready(HandlerRef),
}

struct Slot {
    state: RwLock<SlotState>,
    generations: AtomicU64,
}

impl Slot {
    fn new() -> Self {
        Slot {
            state: RwLock::new(SlotState::Empty),
            generations: AtomicU64::new(0),
        }
    }
}

pub struct HandlerRegistry {
    slots: HashMap<Capability, Slot>,
}

impl HandlerRegistry {
    /// A registry that can hold handlers for `capabilities`; every other capability is unknown
    pub fn new(capabilities: impl IntoIterator<Item = Capability>) -> Self {
        HandlerRegistry {
            slots: capabilities
                .into_iter()
                .map(|capability| (capability, Slot::new()))
                .collect(),
        }
    }

    pub fn capabilities(&self) -> Vec<Capability> {
        let mut capabilities: Vec<_> = self.slots.keys().copied().collect();
        capabilities.sort_by_key(|capability| capability.as_str());
        capabilities
    }

    pub fn is_enabled(&self, capability: Capability) -> bool {
        self.slots.contains_key(&capability)
    }

    /// The handler for `capability` if it has been built
    pub fn get(&self, capability: Capability) -> Option<HandlerRef> {
        let slot = self.slots.get(&capability)?;
        match &*slot.state.read() {
            SlotState::Ready(handler) => Some(handler.clone()),
            _ => None,
        }
    }

    /// Return the handler for `capability`, running `builder` if nobody has built it yet.
    ///
    /// Concurrent callers share one construction and observe the same instance. A builder error
    /// reaches every caller waiting on that construction as
    /// [`ServeError::HandlerConstructionFailed`]. `builder` is dropped without being called when
    /// the handler exists or is already being built.
    pub async fn get_or_build<F, Fut>(
        &self,
        capability: Capability,
        builder: F,
    ) -> Result<HandlerRef, ServeError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<HandlerRef>> + Send + 'static,
    {
        let slot = self
            .slots
            .get(&capability)
            .ok_or_else(|| ServeError::UnknownCapability(capability.to_string()))?;

        if let SlotState::Ready(handler) = &*slot.state.read() {
            return Ok(handler.clone());
        }

        let (generation, build) = {
            let mut state = slot.state.write();
            let in_flight = match &*state {
                SlotState::Ready(handler) => return Ok(handler.clone()),
                SlotState::Building { generation, build } => Some((*generation, build.clone())),
                SlotState::Empty => None,
            };
            match in_flight {
                Some(in_flight) => in_flight,
                None => {
                    let generation = slot.generations.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(%capability, generation, "building handler");
                    let build = async move {
                        builder()
                            .await
                            .map_err(|err| ServeError::HandlerConstructionFailed {
                                capability,
                                reason: format!("{err:#}"),
                            })
                    }
                    .boxed()
                    .shared();
                    *state = SlotState::Building {
                        generation,
                        build: build.clone(),
                    };
                    (generation, build)
                }
            }
        };

        let result = build.await;

        let mut state = slot.state.write();
        let current =
            matches!(&*state, SlotState::Building { generation: g, .. } if *g == generation);
        if current {
            match &result {
                Ok(handler) => {
                    tracing::info!(%capability, "handler ready");
                    *state = SlotState::Ready(handler.clone());
                }
                Err(err) => {
                    tracing::warn!(%capability, error = %err, "handler construction failed");
                    *state = SlotState::Empty;
                }
            }
        }
        result
    }
}
