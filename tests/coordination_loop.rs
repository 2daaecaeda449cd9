//! End-to-end behaviour of the coordination loop over the in-memory backend

use async_trait::async_trait;
use ecologistix::coordination::{GracefulShutdown, ShutdownSignal};
use ecologistix::coordinator::{
    Blackboard, CoordinationLoop, CoordinatorConfig, DelegatedTask, DelegationEmitter,
    EventEnvelope, EventHandler, EventRouter, HandlerContext, HandlerOutcome, ShipmentStatus,
    TaskType, TickOutcome,
};
use ecologistix::coordinator::ShipmentState;
use ecologistix::error::Result;
use ecologistix::persistence::ShipmentStore;
use ecologistix::queue::{MemoryQueue, PriorityClass, PriorityQueueClient, QueueBackend};
use std::sync::Arc;
use std::time::Duration;

const ROUTE_PLANNER: &str = "agent:task:route_planner";

struct Harness {
    backend: MemoryQueue,
    client: PriorityQueueClient,
    blackboard: Arc<Blackboard>,
    shutdown: GracefulShutdown,
}

impl Harness {
    fn new() -> Self {
        let backend = MemoryQueue::new();
        Self {
            client: PriorityQueueClient::new(Arc::new(backend.clone())),
            backend,
            blackboard: Arc::new(Blackboard::new()),
            shutdown: GracefulShutdown::with_defaults(),
        }
    }

    fn router(&self) -> EventRouter {
        let ctx = HandlerContext::new(self.blackboard.clone(), DelegationEmitter::new(self.client.clone()));
        EventRouter::with_default_handlers(ctx)
    }

    fn coordination(&self, tick_ms: u64) -> CoordinationLoop {
        self.coordination_with(tick_ms, self.router())
    }

    fn coordination_with(&self, tick_ms: u64, router: EventRouter) -> CoordinationLoop {
        CoordinationLoop::new(CoordinatorConfig { tick_ms }, self.client.clone(), router)
    }

    async fn enqueue(&self, class: PriorityClass, raw: &str) {
        self.client.enqueue(class, raw.as_bytes()).await.unwrap();
    }

    async fn tasks(&self) -> Vec<DelegatedTask> {
        self.backend
            .contents(ROUTE_PLANNER)
            .await
            .iter()
            .map(|raw| serde_json::from_slice(raw).unwrap())
            .collect()
    }
}

fn high_risk(shipment: &str, score: f64) -> String {
    serde_json::json!({
        "event_type": "HIGH_RISK_DETECTED",
        "shipment_id": shipment,
        "risk_score": score,
        "detected_at": "2024-01-01T00:00:00Z",
    })
    .to_string()
}

#[tokio::test]
async fn high_risk_above_threshold_marks_and_delegates() {
    let h = Harness::new();
    let coordination = h.coordination(1000);
    h.enqueue(PriorityClass::High, &high_risk("SHIP-1", 0.85)).await;

    let outcome = coordination.tick(&h.shutdown.token()).await;
    assert!(matches!(outcome, TickOutcome::Processed { class: PriorityClass::High, .. }));

    let state = h.blackboard.snapshot("SHIP-1").unwrap();
    assert_eq!(state.status, ShipmentStatus::AtRisk);
    assert_eq!(state.risk_score, 0.85);

    let tasks = h.tasks().await;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].shipment_id, "SHIP-1");
    assert_eq!(tasks[0].task_type, TaskType::PlanNewRoute);
    assert_eq!(tasks[0].reason["risk_score"], 0.85);
}

#[tokio::test]
async fn moderate_risk_updates_without_delegating() {
    let h = Harness::new();
    let coordination = h.coordination(1000);
    h.enqueue(PriorityClass::High, &high_risk("SHIP-1", 0.5)).await;

    coordination.tick(&h.shutdown.token()).await;

    let state = h.blackboard.snapshot("SHIP-1").unwrap();
    assert_eq!(state.status, ShipmentStatus::AtRisk);
    assert_eq!(state.risk_score, 0.5);
    assert!(h.tasks().await.is_empty());
}

#[tokio::test]
async fn delegation_threshold_is_exclusive() {
    let h = Harness::new();
    let coordination = h.coordination(1000);
    h.enqueue(PriorityClass::Normal, &high_risk("AT", 0.7)).await;
    h.enqueue(PriorityClass::Normal, &high_risk("ABOVE", 0.70001)).await;

    let token = h.shutdown.token();
    coordination.tick(&token).await;
    coordination.tick(&token).await;

    let tasks = h.tasks().await;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].shipment_id, "ABOVE");
}

#[tokio::test]
async fn malformed_event_does_not_stop_later_events() {
    let h = Harness::new();
    let coordination = h.coordination(1000);
    h.enqueue(PriorityClass::High, "\u{0}garbage").await;
    h.enqueue(PriorityClass::High, &high_risk("SHIP-2", 0.3)).await;

    let token = h.shutdown.token();
    assert!(matches!(coordination.tick(&token).await, TickOutcome::Dropped { .. }));
    assert!(h.blackboard.is_empty());

    assert!(matches!(coordination.tick(&token).await, TickOutcome::Processed { .. }));
    assert_eq!(h.blackboard.snapshot("SHIP-2").unwrap().risk_score, 0.3);
}

#[tokio::test]
async fn event_without_type_changes_nothing() {
    let h = Harness::new();
    let coordination = h.coordination(1000);
    h.enqueue(
        PriorityClass::High,
        r#"{"type":"HIGH_RISK_DETECTED","shipment_id":"SHIP-1","risk_score":0.99}"#,
    )
    .await;

    let outcome = coordination.tick(&h.shutdown.token()).await;
    assert!(matches!(outcome, TickOutcome::Dropped { .. }));
    assert!(h.blackboard.is_empty());
    assert!(h.tasks().await.is_empty());
}

#[tokio::test]
async fn high_priority_is_processed_first() {
    let h = Harness::new();
    let coordination = h.coordination(1000);
    h.enqueue(PriorityClass::Normal, &high_risk("NORMAL", 0.2)).await;
    h.enqueue(PriorityClass::High, &high_risk("HIGH", 0.2)).await;

    let token = h.shutdown.token();
    coordination.tick(&token).await;
    assert!(h.blackboard.snapshot("HIGH").is_some());
    assert!(h.blackboard.snapshot("NORMAL").is_none());

    coordination.tick(&token).await;
    let high = h.blackboard.snapshot("HIGH").unwrap();
    let normal = h.blackboard.snapshot("NORMAL").unwrap();
    assert!(high.revision < normal.revision);
}

#[tokio::test]
async fn strict_priority_for_any_interleaving() {
    let interleavings: [&[PriorityClass]; 4] = [
        &[PriorityClass::Normal, PriorityClass::Normal, PriorityClass::High, PriorityClass::High],
        &[PriorityClass::High, PriorityClass::Normal, PriorityClass::High, PriorityClass::Normal],
        &[PriorityClass::Normal, PriorityClass::High, PriorityClass::Normal, PriorityClass::High],
        &[PriorityClass::High, PriorityClass::High, PriorityClass::Normal, PriorityClass::Normal],
    ];

    for order in interleavings {
        let h = Harness::new();
        let coordination = h.coordination(1000);
        for (i, class) in order.iter().enumerate() {
            h.enqueue(*class, &format!(r#"{{"event_type":"NOOP","seq":{i}}}"#)).await;
        }

        let token = h.shutdown.token();
        let mut seen = Vec::new();
        loop {
            match coordination.tick(&token).await {
                TickOutcome::Processed { class, .. } => seen.push(class),
                TickOutcome::Idle => break,
                other => panic!("unexpected tick outcome: {other:?}"),
            }
        }

        assert_eq!(
            seen,
            vec![
                PriorityClass::High,
                PriorityClass::High,
                PriorityClass::Normal,
                PriorityClass::Normal
            ]
        );
    }
}

#[tokio::test]
async fn run_processes_events_and_stops_on_shutdown() {
    let h = Harness::new();
    let coordination = h.coordination(10);
    let metrics = coordination.metrics();
    h.enqueue(PriorityClass::High, &high_risk("SHIP-1", 0.9)).await;

    let handle = tokio::spawn(coordination.run(h.shutdown.token()));

    tokio::time::timeout(Duration::from_secs(2), async {
        while h.blackboard.snapshot("SHIP-1").is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("event was not processed");

    h.shutdown.request_shutdown(ShutdownSignal::Graceful);
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("loop did not stop")
        .unwrap();

    assert_eq!(metrics.snapshot().events_processed, 1);
    assert_eq!(h.tasks().await.len(), 1);
}

#[tokio::test]
async fn shutdown_interrupts_idle_wait() {
    let h = Harness::new();
    // Long interval: the loop is parked between ticks when the signal arrives
    let coordination = h.coordination(60_000);
    let handle = tokio::spawn(coordination.run(h.shutdown.token()));

    tokio::time::sleep(Duration::from_millis(20)).await;
    h.shutdown.request_shutdown(ShutdownSignal::Graceful);

    tokio::time::timeout(Duration::from_millis(500), handle)
        .await
        .expect("loop did not stop within one tick")
        .unwrap();
}

struct NeverReturns;

#[async_trait]
impl EventHandler for NeverReturns {
    fn name(&self) -> &'static str {
        "never_returns"
    }

    async fn handle(&self, _event: &EventEnvelope, _ctx: &HandlerContext) -> Result<HandlerOutcome> {
        std::future::pending::<()>().await;
        Ok(HandlerOutcome::default())
    }
}

#[tokio::test]
async fn stalled_handler_blocks_the_loop() {
    let h = Harness::new();
    let mut router = h.router();
    router.register("STALL", Arc::new(NeverReturns));
    let coordination = h.coordination_with(10, router);

    h.enqueue(PriorityClass::High, r#"{"event_type":"STALL"}"#).await;
    h.enqueue(PriorityClass::High, &high_risk("SHIP-1", 0.9)).await;

    let handle = tokio::spawn(coordination.run(h.shutdown.token()));
    tokio::time::sleep(Duration::from_millis(200)).await;

    // No per-event timeout: the second event is never reached
    assert!(h.blackboard.snapshot("SHIP-1").is_none());

    // Handlers are not preempted, so shutdown cannot complete either
    h.shutdown.request_shutdown(ShutdownSignal::Graceful);
    let stopped = tokio::time::timeout(Duration::from_millis(200), async {
        while !handle.is_finished() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(stopped.is_err());

    handle.abort();
}

#[tokio::test]
async fn padded_tags_and_ids_are_taken_as_sent() {
    let h = Harness::new();
    let coordination = h.coordination(1000);
    let padded_tag = r#"{"event_type":" HIGH_RISK_DETECTED ","shipment_id":"SHIP-1","risk_score":0.9}"#;
    let padded_id = r#"{"event_type":"HIGH_RISK_DETECTED","shipment_id":" SHIP-1","risk_score":0.9}"#;
    h.enqueue(PriorityClass::High, padded_tag).await;
    h.enqueue(PriorityClass::High, padded_id).await;
    h.enqueue(PriorityClass::High, &high_risk("SHIP-1", 0.2)).await;

    let token = h.shutdown.token();
    match coordination.tick(&token).await {
        TickOutcome::Processed { outcome, .. } => assert!(outcome.ignored),
        other => panic!("unexpected tick outcome: {other:?}"),
    }
    assert!(h.blackboard.is_empty());

    coordination.tick(&token).await;
    coordination.tick(&token).await;

    let ids: Vec<String> = h.blackboard.snapshot_all().into_iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![" SHIP-1".to_string(), "SHIP-1".to_string()]);

    let tasks = h.tasks().await;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].shipment_id, " SHIP-1");
    let sent: serde_json::Value = serde_json::from_str(padded_id).unwrap();
    assert_eq!(tasks[0].reason, sent);
}

/// Backend whose reads never complete
struct StuckReads;

#[async_trait]
impl QueueBackend for StuckReads {
    async fn push(&self, _queue: &str, _payload: &[u8]) -> Result<()> {
        Ok(())
    }

    async fn pop(&self, _queue: &str) -> Result<Option<Vec<u8>>> {
        std::future::pending::<()>().await;
        Ok(None)
    }

    async fn len(&self, _queue: &str) -> Result<usize> {
        Ok(0)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "stuck"
    }
}

#[tokio::test]
async fn shutdown_interrupts_blocked_dequeue() {
    let shutdown = GracefulShutdown::with_defaults();
    let client = PriorityQueueClient::new(Arc::new(StuckReads));
    let ctx = HandlerContext::new(Arc::new(Blackboard::new()), DelegationEmitter::new(client.clone()));
    let coordination = CoordinationLoop::new(
        CoordinatorConfig { tick_ms: 10 },
        client,
        EventRouter::with_default_handlers(ctx),
    );
    let metrics = coordination.metrics();

    let handle = tokio::spawn(coordination.run(shutdown.token()));
    tokio::time::sleep(Duration::from_millis(50)).await;
    // The first tick is still parked inside the high-priority read
    assert_eq!(metrics.snapshot().ticks, 1);

    shutdown.request_shutdown(ShutdownSignal::Graceful);
    tokio::time::timeout(Duration::from_millis(200), handle)
        .await
        .expect("blocked dequeue delayed shutdown")
        .unwrap();
}

/// Store whose writes never complete
struct StuckWrites;

#[async_trait]
impl ShipmentStore for StuckWrites {
    async fn upsert(&self, _state: &ShipmentState) -> Result<()> {
        std::future::pending::<()>().await;
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<ShipmentState>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn shutdown_interrupts_stalled_write_through() {
    let h = Harness::new();
    let coordination = h.coordination(10).with_store(Arc::new(StuckWrites));
    let metrics = coordination.metrics();
    h.enqueue(PriorityClass::High, &high_risk("SHIP-1", 0.3)).await;

    let handle = tokio::spawn(coordination.run(h.shutdown.token()));
    tokio::time::timeout(Duration::from_secs(2), async {
        while h.blackboard.snapshot("SHIP-1").is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("event was not processed");

    h.shutdown.request_shutdown(ShutdownSignal::Graceful);
    tokio::time::timeout(Duration::from_millis(200), handle)
        .await
        .expect("stalled write-through delayed shutdown")
        .unwrap();

    assert_eq!(metrics.snapshot().store_failures, 1);
    assert_eq!(h.blackboard.snapshot("SHIP-1").unwrap().risk_score, 0.3);
}
