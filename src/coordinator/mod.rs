//! Event Coordinator
//!
//! Central orchestrator for the logistics agents. Events arrive on two
//! priority queues, are routed by type to a handler, land on the shared
//! shipment blackboard, and may be delegated onward to agent task queues.

pub mod blackboard;
pub mod config;
pub mod coordinator;
pub mod delegation;
pub mod event;
pub mod handlers;
pub mod metrics;
pub mod router;
pub mod state;

pub use blackboard::Blackboard;
pub use config::CoordinatorConfig;
pub use coordinator::{CoordinationLoop, TickOutcome};
pub use delegation::{AgentKind, DelegatedTask, DelegationEmitter, TaskType, AGENT_TASK_PREFIX};
pub use event::{EventDecoder, EventEnvelope, HIGH_RISK_DETECTED, WEATHER_ALERT};
pub use handlers::{
    should_replan, AffectedShipments, EventHandler, HandlerContext, HandlerOutcome,
    HighRiskHandler, NamedInPayload, UnhandledEvent, WeatherAlertHandler, ROUTE_REPLAN_THRESHOLD,
};
pub use metrics::{LoopMetrics, LoopMetricsSnapshot, LoopState};
pub use router::EventRouter;
pub use state::{ShipmentState, ShipmentStatus};
