//! Event transport
//!
//! Named FIFO queues behind the [`QueueBackend`] trait, with the
//! [`PriorityQueueClient`] mapping priority classes onto queue names.

pub mod backend;
pub mod client;
pub mod memory;
pub mod postgres;

pub use backend::QueueBackend;
pub use client::{
    PriorityClass, PriorityQueueClient, QueueDepths, HIGH_PRIORITY_QUEUE, NORMAL_PRIORITY_QUEUE,
};
pub use memory::MemoryQueue;
pub use postgres::PostgresQueue;

#[cfg(test)]
pub use backend::MockQueueBackend;
