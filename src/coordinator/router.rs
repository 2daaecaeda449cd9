//! Event Router - dispatch by `event_type`
//!
//! The registration table is filled once at startup and read-only after
//! that. Tags without an entry go to the fallback handler, which logs and
//! ignores them.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::event::{EventEnvelope, HIGH_RISK_DETECTED, WEATHER_ALERT};
use super::handlers::{
    EventHandler, HandlerContext, HandlerOutcome, HighRiskHandler, UnhandledEvent,
    WeatherAlertHandler,
};
use crate::error::Result;

pub struct EventRouter {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
    fallback: Arc<dyn EventHandler>,
    ctx: HandlerContext,
}

impl EventRouter {
    /// Router with an empty table
    pub fn new(ctx: HandlerContext) -> Self {
        Self {
            handlers: HashMap::new(),
            fallback: Arc::new(UnhandledEvent),
            ctx,
        }
    }

    /// Router with the standard handler set
    pub fn with_default_handlers(ctx: HandlerContext) -> Self {
        let mut router = Self::new(ctx);
        router.register(HIGH_RISK_DETECTED, Arc::new(HighRiskHandler));
        router.register(WEATHER_ALERT, Arc::new(WeatherAlertHandler::default()));
        router
    }

    /// Register (or replace) the handler for `event_type`
    pub fn register(&mut self, event_type: &str, handler: Arc<dyn EventHandler>) {
        info!(event_type, handler = handler.name(), "registering event handler");
        self.handlers.insert(event_type.to_string(), handler);
    }

    /// Replace the handler for unregistered tags
    pub fn set_fallback(&mut self, handler: Arc<dyn EventHandler>) {
        self.fallback = handler;
    }

    /// Registered tags, sorted
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn context(&self) -> &HandlerContext {
        &self.ctx
    }

    /// Hand `event` to the handler registered for its type
    pub async fn route(&self, event: &EventEnvelope) -> Result<HandlerOutcome> {
        let handler = self
            .handlers
            .get(event.event_type())
            .unwrap_or(&self.fallback);

        debug!(
            event_type = %event.event_type(),
            handler = handler.name(),
            "routing event"
        );
        handler.handle(event, &self.ctx).await
    }
}
