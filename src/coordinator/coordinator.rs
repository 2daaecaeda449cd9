//! Coordination Loop
//!
//! Polls the priority queues on a fixed tick and handles at most one event
//! per tick: `high` first, `normal` only when `high` is empty. Queue reads
//! race the shutdown token; once an event is out of the queue its handler
//! runs to completion.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::config::CoordinatorConfig;
use super::event::EventDecoder;
use super::handlers::HandlerOutcome;
use super::metrics::{LoopMetrics, LoopState};
use super::router::EventRouter;
use super::Blackboard;
use crate::coordination::ShutdownToken;
use crate::error::CoordinatorError;
use crate::persistence::ShipmentStore;
use crate::queue::{PriorityClass, PriorityQueueClient};

/// Result of one tick
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Both queues empty
    Idle,
    /// One event dequeued and handled
    Processed {
        class: PriorityClass,
        outcome: HandlerOutcome,
    },
    /// One event dequeued and discarded
    Dropped { class: PriorityClass, reason: String },
    /// Queue backend errored; retried next tick
    QueueUnavailable,
    /// Shutdown requested while waiting on the queue
    Cancelled,
}

pub struct CoordinationLoop {
    config: CoordinatorConfig,
    queue: PriorityQueueClient,
    router: EventRouter,
    store: Option<Arc<dyn ShipmentStore>>,
    metrics: Arc<LoopMetrics>,
}

impl CoordinationLoop {
    pub fn new(config: CoordinatorConfig, queue: PriorityQueueClient, router: EventRouter) -> Self {
        Self {
            config,
            queue,
            router,
            store: None,
            metrics: Arc::new(LoopMetrics::new()),
        }
    }

    /// Write every mutated shipment through to `store`
    pub fn with_store(mut self, store: Arc<dyn ShipmentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Share counters with another component (status server)
    pub fn with_metrics(mut self, metrics: Arc<LoopMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> Arc<LoopMetrics> {
        self.metrics.clone()
    }

    pub fn blackboard(&self) -> Arc<Blackboard> {
        self.router.context().blackboard.clone()
    }

    /// Main loop - returns once `shutdown` fires
    pub async fn run(self, shutdown: ShutdownToken) {
        info!(
            tick_ms = self.config.tick_ms,
            backend = self.queue.backend_name(),
            handlers = ?self.router.registered_types(),
            "coordination loop starting"
        );

        let mut ticker = tokio::time::interval(self.config.tick_interval());
        // Don't burst-fire missed ticks
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                signal = shutdown.cancelled() => {
                    info!(%signal, "coordination loop: shutdown signal received");
                    break;
                }

                _ = ticker.tick() => {
                    if self.tick(&shutdown).await == TickOutcome::Cancelled {
                        info!("coordination loop: cancelled during queue read");
                        break;
                    }
                }
            }
        }

        self.metrics.set_state(LoopState::Waiting);
        info!("coordination loop exited");
    }

    /// One poll: drain at most one event, highest priority first
    pub async fn tick(&self, shutdown: &ShutdownToken) -> TickOutcome {
        LoopMetrics::inc(&self.metrics.ticks);
        let outcome = self.poll_queues(shutdown).await;
        self.metrics.set_state(LoopState::Waiting);

        match &outcome {
            TickOutcome::Idle => LoopMetrics::inc(&self.metrics.idle_ticks),
            TickOutcome::Processed { outcome, .. } => {
                LoopMetrics::inc(&self.metrics.events_processed);
                LoopMetrics::add(&self.metrics.tasks_delegated, outcome.delegated.len());
                LoopMetrics::add(
                    &self.metrics.delegation_failures,
                    outcome.delegation_failures.len(),
                );
            }
            TickOutcome::Dropped { .. } => LoopMetrics::inc(&self.metrics.events_dropped),
            TickOutcome::QueueUnavailable => LoopMetrics::inc(&self.metrics.queue_errors),
            TickOutcome::Cancelled => {}
        }
        outcome
    }

    async fn poll_queues(&self, shutdown: &ShutdownToken) -> TickOutcome {
        for class in PriorityClass::ALL {
            self.metrics.set_state(match class {
                PriorityClass::High => LoopState::DrainingHigh,
                PriorityClass::Normal => LoopState::DrainingNormal,
            });

            let popped = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return TickOutcome::Cancelled,
                popped = self.queue.dequeue(class) => popped,
            };

            match popped {
                Ok(Some(raw)) => {
                    self.metrics.mark_event();
                    return self.process(class, &raw, shutdown).await;
                }
                Ok(None) => continue,
                Err(e) => {
                    warn!(queue = %class, error = %e, "queue read failed, waiting for next tick");
                    return TickOutcome::QueueUnavailable;
                }
            }
        }

        TickOutcome::Idle
    }

    async fn process(&self, class: PriorityClass, raw: &[u8], shutdown: &ShutdownToken) -> TickOutcome {
        let event = match EventDecoder::decode(raw) {
            Ok(event) => event,
            Err(e) => {
                warn!(queue = %class, bytes = raw.len(), error = %e, "dropping undecodable event");
                return TickOutcome::Dropped {
                    class,
                    reason: e.to_string(),
                };
            }
        };

        debug!(queue = %class, event_type = %event.event_type(), "processing event");

        match self.router.route(&event).await {
            Ok(outcome) => {
                self.persist(&outcome.updated, shutdown).await;
                TickOutcome::Processed { class, outcome }
            }
            Err(e) => {
                if e.is_per_event() {
                    warn!(
                        queue = %class,
                        event_type = %event.event_type(),
                        error = %e,
                        "dropping event"
                    );
                } else {
                    error!(
                        queue = %class,
                        event_type = %event.event_type(),
                        error = %e,
                        "handler failed, dropping event"
                    );
                }
                TickOutcome::Dropped {
                    class,
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Write-through of `shipments`; abandoned once shutdown is requested
    async fn persist(&self, shipments: &[String], shutdown: &ShutdownToken) {
        let Some(store) = &self.store else {
            return;
        };

        let blackboard = &self.router.context().blackboard;
        for id in shipments {
            let Some(state) = blackboard.snapshot(id) else {
                continue;
            };

            let written = tokio::select! {
                biased;
                result = store.upsert(&state) => result,
                _ = shutdown.cancelled() => Err(CoordinatorError::Cancelled),
            };

            match written {
                Ok(()) => {}
                Err(CoordinatorError::Cancelled) => {
                    warn!(shipment_id = %id, "write-through abandoned on shutdown");
                    LoopMetrics::inc(&self.metrics.store_failures);
                    return;
                }
                Err(e) => {
                    warn!(shipment_id = %id, error = %e, "write-through failed; blackboard unaffected");
                    LoopMetrics::inc(&self.metrics.store_failures);
                }
            }
        }
    }
}
