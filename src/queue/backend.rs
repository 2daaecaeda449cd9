//! Queue backend trait - raw named FIFO lists

use async_trait::async_trait;

use crate::error::Result;

/// Storage for named FIFO lists of opaque payloads.
///
/// Implementations must make a pushed payload visible to the next `pop` on
/// the same queue name, and must never hand the same payload to two `pop`
/// callers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Append a payload to the tail of `queue`
    async fn push(&self, queue: &str, payload: &[u8]) -> Result<()>;

    /// Remove and return the head of `queue`, `None` when empty
    async fn pop(&self, queue: &str) -> Result<Option<Vec<u8>>>;

    /// Number of payloads currently waiting in `queue`
    async fn len(&self, queue: &str) -> Result<usize>;

    /// Round-trip check used at startup
    async fn ping(&self) -> Result<()>;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}
