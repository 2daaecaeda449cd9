//! Delegation - hand follow-up work to downstream agents
//!
//! Tasks are written to `agent:task:<agent_name>` and forgotten: there is no
//! acknowledgment and no retry, so delivery is at-most-once.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use crate::coordination::ShutdownToken;
use crate::error::{CoordinatorError, Result};
use crate::queue::PriorityQueueClient;

pub const AGENT_TASK_PREFIX: &str = "agent:task:";

/// Downstream agents that consume delegated tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentKind {
    RoutePlanner,
    CarbonAuditor,
    RiskScout,
    RagEngine,
}

impl AgentKind {
    pub fn name(&self) -> &'static str {
        match self {
            AgentKind::RoutePlanner => "route_planner",
            AgentKind::CarbonAuditor => "carbon_audit",
            AgentKind::RiskScout => "risk_scout",
            AgentKind::RagEngine => "rag_engine",
        }
    }

    pub fn queue_name(&self) -> String {
        format!("{AGENT_TASK_PREFIX}{}", self.name())
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Capability requested from a downstream agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    PlanNewRoute,
}

/// Self-contained task record; the receiving agent never needs to consult
/// the blackboard to act on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegatedTask {
    pub task_type: TaskType,
    pub shipment_id: String,
    /// The triggering event, verbatim
    pub reason: Value,
    #[serde(with = "rfc3339_seconds")]
    pub created_at: DateTime<Utc>,
}

impl DelegatedTask {
    pub fn new(task_type: TaskType, shipment_id: &str, reason: Value) -> Self {
        Self {
            task_type,
            shipment_id: shipment_id.to_string(),
            reason,
            created_at: Utc::now(),
        }
    }

    pub fn plan_new_route(shipment_id: &str, reason: Value) -> Self {
        Self::new(TaskType::PlanNewRoute, shipment_id, reason)
    }
}

mod rfc3339_seconds {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Writes delegated tasks to agent queues
#[derive(Clone)]
pub struct DelegationEmitter {
    queue: PriorityQueueClient,
    shutdown: Option<ShutdownToken>,
}

impl DelegationEmitter {
    pub fn new(queue: PriorityQueueClient) -> Self {
        Self {
            queue,
            shutdown: None,
        }
    }

    /// Abandon in-flight writes once shutdown is requested
    pub fn with_shutdown(mut self, token: ShutdownToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    /// Delegate `task` to `agent`'s queue
    pub async fn delegate(&self, agent: AgentKind, task: &DelegatedTask) -> Result<()> {
        self.delegate_to(&agent.queue_name(), task).await
    }

    /// Delegate `task` to an explicitly named queue
    pub async fn delegate_to(&self, queue: &str, task: &DelegatedTask) -> Result<()> {
        let failure = |reason: String| CoordinatorError::DelegationFailure {
            queue: queue.to_string(),
            reason,
        };

        let payload = serde_json::to_vec(task).map_err(|e| {
            error!(queue, error = %e, "failed to serialize delegated task");
            failure(format!("serialize: {e}"))
        })?;

        let write = self.queue.push(queue, &payload);
        let written = match &self.shutdown {
            Some(token) => {
                tokio::select! {
                    biased;
                    result = write => result,
                    _ = token.cancelled() => Err(CoordinatorError::Cancelled),
                }
            }
            None => write.await,
        };

        written.map_err(|e| {
            error!(queue, shipment_id = %task.shipment_id, error = %e, "failed to push delegated task");
            failure(e.to_string())
        })?;

        info!(
            queue,
            shipment_id = %task.shipment_id,
            task_type = ?task.task_type,
            "delegated task"
        );
        Ok(())
    }
}
