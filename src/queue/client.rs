//! Priority Queue Client - per-class event lanes over a queue backend

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::backend::QueueBackend;
use crate::error::{CoordinatorError, Result};

pub const HIGH_PRIORITY_QUEUE: &str = "event:queue:high_priority";
pub const NORMAL_PRIORITY_QUEUE: &str = "event:queue:normal_priority";

/// Event lane. Consumption order is strict: every `High` item is taken
/// before any `Normal` item is considered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityClass {
    High,
    Normal,
}

impl PriorityClass {
    /// Classes in consumption order
    pub const ALL: [PriorityClass; 2] = [PriorityClass::High, PriorityClass::Normal];

    pub fn queue_name(&self) -> &'static str {
        match self {
            PriorityClass::High => HIGH_PRIORITY_QUEUE,
            PriorityClass::Normal => NORMAL_PRIORITY_QUEUE,
        }
    }
}

impl std::fmt::Display for PriorityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriorityClass::High => write!(f, "high"),
            PriorityClass::Normal => write!(f, "normal"),
        }
    }
}

impl std::str::FromStr for PriorityClass {
    type Err = CoordinatorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(PriorityClass::High),
            "normal" => Ok(PriorityClass::Normal),
            other => Err(CoordinatorError::InvalidConfig(format!(
                "unknown priority class '{other}' (expected high or normal)"
            ))),
        }
    }
}

/// Pending items per lane
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QueueDepths {
    pub high: usize,
    pub normal: usize,
}

impl std::fmt::Display for QueueDepths {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Queues[H={}/N={}]", self.high, self.normal)
    }
}

/// Clonable client over a shared queue backend
#[derive(Clone)]
pub struct PriorityQueueClient {
    backend: Arc<dyn QueueBackend>,
}

impl PriorityQueueClient {
    pub fn new(backend: Arc<dyn QueueBackend>) -> Self {
        Self { backend }
    }

    /// Append a payload to the tail of the class queue
    pub async fn enqueue(&self, class: PriorityClass, payload: &[u8]) -> Result<()> {
        debug!(%class, bytes = payload.len(), "enqueue event");
        self.backend.push(class.queue_name(), payload).await
    }

    /// Remove the head of the class queue; `None` means empty
    pub async fn dequeue(&self, class: PriorityClass) -> Result<Option<Vec<u8>>> {
        self.backend.pop(class.queue_name()).await
    }

    /// Append to an arbitrary named queue (downstream agent lanes)
    pub async fn push(&self, queue: &str, payload: &[u8]) -> Result<()> {
        self.backend.push(queue, payload).await
    }

    pub async fn depth(&self, class: PriorityClass) -> Result<usize> {
        self.backend.len(class.queue_name()).await
    }

    pub async fn depths(&self) -> Result<QueueDepths> {
        Ok(QueueDepths {
            high: self.depth(PriorityClass::High).await?,
            normal: self.depth(PriorityClass::Normal).await?,
        })
    }

    pub async fn ping(&self) -> Result<()> {
        self.backend.ping().await
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }
}
