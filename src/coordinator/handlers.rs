//! Event handlers - per-type domain logic
//!
//! Each handler decodes its own payload from the envelope, applies the
//! blackboard mutation, then decides on delegation. The mutation is complete
//! before any delegation starts, and a failed delegation never touches the
//! blackboard again.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::blackboard::Blackboard;
use super::delegation::{AgentKind, DelegatedTask, DelegationEmitter};
use super::event::{named_shipments, EventEnvelope, HighRiskSignal, WeatherAlert};
use super::state::ShipmentStatus;
use crate::error::Result;

/// Risk above which a shipment is handed to the route planner. Strict: a
/// score of exactly 0.7 does not trigger a replan.
pub const ROUTE_REPLAN_THRESHOLD: f64 = 0.7;

pub fn should_replan(risk_score: f64) -> bool {
    risk_score > ROUTE_REPLAN_THRESHOLD
}

/// What the handler did with one event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandlerOutcome {
    /// Shipments whose blackboard entry was written
    pub updated: Vec<String>,
    /// Shipments for which a task was written to an agent queue
    pub delegated: Vec<String>,
    /// Shipments whose delegation was attempted and dropped
    pub delegation_failures: Vec<String>,
    /// No handler acted on the event
    pub ignored: bool,
}

impl HandlerOutcome {
    pub fn ignored() -> Self {
        Self {
            ignored: true,
            ..Default::default()
        }
    }

    pub fn updated(shipments: Vec<String>) -> Self {
        Self {
            updated: shipments,
            ..Default::default()
        }
    }
}

/// Everything a handler may touch
#[derive(Clone)]
pub struct HandlerContext {
    pub blackboard: Arc<Blackboard>,
    pub emitter: DelegationEmitter,
}

impl HandlerContext {
    pub fn new(blackboard: Arc<Blackboard>, emitter: DelegationEmitter) -> Self {
        Self {
            blackboard,
            emitter,
        }
    }

    /// Delegate and record the result; failures are logged by the emitter
    /// and never propagated.
    async fn delegate(&self, agent: AgentKind, task: &DelegatedTask, outcome: &mut HandlerOutcome) {
        match self.emitter.delegate(agent, task).await {
            Ok(()) => outcome.delegated.push(task.shipment_id.clone()),
            Err(e) => {
                warn!(shipment_id = %task.shipment_id, error = %e, "delegation dropped");
                outcome.delegation_failures.push(task.shipment_id.clone());
            }
        }
    }
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &EventEnvelope, ctx: &HandlerContext) -> Result<HandlerOutcome>;
}

/// `HIGH_RISK_DETECTED`: mark the shipment at risk and replan above the
/// threshold
pub struct HighRiskHandler;

#[async_trait]
impl EventHandler for HighRiskHandler {
    fn name(&self) -> &'static str {
        "high_risk"
    }

    async fn handle(&self, event: &EventEnvelope, ctx: &HandlerContext) -> Result<HandlerOutcome> {
        let signal = HighRiskSignal::try_from(event)?;
        let last_updated = signal.detected_at.unwrap_or_else(Utc::now);

        let state = ctx.blackboard.update(&signal.shipment_id, |s| {
            s.status = ShipmentStatus::AtRisk;
            s.risk_score = signal.risk_score;
            s.last_updated = last_updated;
            if let Some(factors) = &signal.risk_factors {
                s.risk_factors = factors.clone();
            }
        });

        info!(
            shipment_id = %state.id,
            risk_score = state.risk_score,
            revision = state.revision,
            "blackboard updated for shipment"
        );

        let mut outcome = HandlerOutcome::updated(vec![state.id.clone()]);
        if should_replan(signal.risk_score) {
            info!(shipment_id = %state.id, "risk critical, delegating to route planner");
            let task = DelegatedTask::plan_new_route(&state.id, event.to_value());
            ctx.delegate(AgentKind::RoutePlanner, &task, &mut outcome).await;
        }

        Ok(outcome)
    }
}

/// Decides which shipments a weather alert concerns
pub trait AffectedShipments: Send + Sync {
    fn resolve(&self, event: &EventEnvelope, blackboard: &Blackboard) -> Vec<String>;
}

/// Takes the shipments the alert names (`shipment_id`, `affected_shipments`)
pub struct NamedInPayload;

impl AffectedShipments for NamedInPayload {
    fn resolve(&self, event: &EventEnvelope, _blackboard: &Blackboard) -> Vec<String> {
        named_shipments(event)
    }
}

/// `WEATHER_ALERT`: mark affected shipments at risk; severe alerts also
/// replan each of them
pub struct WeatherAlertHandler {
    resolver: Arc<dyn AffectedShipments>,
}

impl WeatherAlertHandler {
    pub fn new(resolver: Arc<dyn AffectedShipments>) -> Self {
        Self { resolver }
    }
}

impl Default for WeatherAlertHandler {
    fn default() -> Self {
        Self::new(Arc::new(NamedInPayload))
    }
}

#[async_trait]
impl EventHandler for WeatherAlertHandler {
    fn name(&self) -> &'static str {
        "weather_alert"
    }

    async fn handle(&self, event: &EventEnvelope, ctx: &HandlerContext) -> Result<HandlerOutcome> {
        let shipments = self.resolver.resolve(event, &ctx.blackboard);
        if shipments.is_empty() {
            info!("weather alert affects no tracked shipments");
            return Ok(HandlerOutcome::ignored());
        }

        let alert = WeatherAlert::from(event);
        let last_updated = alert.detected_at.unwrap_or_else(Utc::now);

        for id in &shipments {
            ctx.blackboard.update(id, |s| {
                s.status = ShipmentStatus::AtRisk;
                s.last_updated = last_updated;
            });
        }
        info!(
            count = shipments.len(),
            severity = alert.severity.as_deref().unwrap_or("unknown"),
            "weather alert applied to shipments"
        );

        let mut outcome = HandlerOutcome::updated(shipments.clone());
        if alert.is_severe() {
            let reason = event.to_value();
            for id in &shipments {
                let task = DelegatedTask::plan_new_route(id, reason.clone());
                ctx.delegate(AgentKind::RoutePlanner, &task, &mut outcome).await;
            }
        }

        Ok(outcome)
    }
}

/// Fallback for event types this deployment does not act on
pub struct UnhandledEvent;

#[async_trait]
impl EventHandler for UnhandledEvent {
    fn name(&self) -> &'static str {
        "unhandled"
    }

    async fn handle(&self, event: &EventEnvelope, _ctx: &HandlerContext) -> Result<HandlerOutcome> {
        debug!(fields = event.fields().len(), "event payload ignored");
        info!(event_type = %event.event_type(), "unhandled event type");
        Ok(HandlerOutcome::ignored())
    }
}
