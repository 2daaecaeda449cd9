pub mod cli;
pub mod config;
pub mod coordination;
pub mod coordinator;
pub mod error;
pub mod persistence;
pub mod queue;
pub mod services;

pub use config::AppConfig;
pub use coordination::{GracefulShutdown, ShutdownSignal, ShutdownToken};
pub use coordinator::{
    Blackboard, CoordinationLoop, DelegationEmitter, EventRouter, HandlerContext, ShipmentState,
    ShipmentStatus, TickOutcome,
};
pub use error::{CoordinatorError, Result};
pub use persistence::{PostgresShipmentStore, ShipmentStore};
pub use queue::{MemoryQueue, PostgresQueue, PriorityClass, PriorityQueueClient, QueueBackend};
pub use services::{StatusServer, StatusState};
