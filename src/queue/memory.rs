//! In-memory queue backend

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::backend::QueueBackend;
use crate::error::Result;

/// Process-local queue backend.
///
/// Each queue name maps to a `VecDeque`; pushes go to the back and pops take
/// from the front. Cloning shares the same underlying lists.
#[derive(Clone, Default)]
pub struct MemoryQueue {
    queues: Arc<Mutex<HashMap<String, VecDeque<Vec<u8>>>>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything waiting in `queue`, head first
    pub async fn contents(&self, queue: &str) -> Vec<Vec<u8>> {
        self.queues
            .lock()
            .await
            .get(queue)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl QueueBackend for MemoryQueue {
    async fn push(&self, queue: &str, payload: &[u8]) -> Result<()> {
        self.queues
            .lock()
            .await
            .entry(queue.to_string())
            .or_default()
            .push_back(payload.to_vec());
        Ok(())
    }

    async fn pop(&self, queue: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .queues
            .lock()
            .await
            .get_mut(queue)
            .and_then(|q| q.pop_front()))
    }

    async fn len(&self, queue: &str) -> Result<usize> {
        Ok(self.queues.lock().await.get(queue).map_or(0, |q| q.len()))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
