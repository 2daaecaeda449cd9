//! Shutdown signalling
//!
//! One [`GracefulShutdown`] per process; every long-running task holds a
//! [`ShutdownToken`] and races its blocking waits against
//! [`ShutdownToken::cancelled`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Shutdown signal types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Normal graceful shutdown (SIGTERM, SIGINT)
    Graceful,
    /// Urgent shutdown (SIGQUIT) - skip the grace period
    Urgent,
    /// Signal source vanished
    Emergency,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownSignal::Graceful => write!(f, "graceful"),
            ShutdownSignal::Urgent => write!(f, "urgent"),
            ShutdownSignal::Emergency => write!(f, "emergency"),
        }
    }
}

/// Configuration for graceful shutdown
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// How long to wait for tasks to return after a graceful signal
    pub grace_period_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: 10,
        }
    }
}

/// Process-wide shutdown switch
pub struct GracefulShutdown {
    config: ShutdownConfig,
    shutdown_requested: AtomicBool,
    signal_tx: watch::Sender<Option<ShutdownSignal>>,
}

impl GracefulShutdown {
    pub fn new(config: ShutdownConfig) -> Self {
        let (signal_tx, _) = watch::channel(None);
        Self {
            config,
            shutdown_requested: AtomicBool::new(false),
            signal_tx,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ShutdownConfig::default())
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    /// Request shutdown; only the first request is delivered
    pub fn request_shutdown(&self, signal: ShutdownSignal) {
        if self.shutdown_requested.swap(true, Ordering::SeqCst) {
            warn!("Shutdown already requested, ignoring duplicate signal: {}", signal);
            return;
        }

        info!("Shutdown requested: {}", signal);
        self.signal_tx.send_replace(Some(signal));
    }

    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            signal_rx: self.signal_tx.subscribe(),
        }
    }

    /// Grace period that applies to `signal`
    pub fn grace_period(&self, signal: ShutdownSignal) -> Duration {
        match signal {
            ShutdownSignal::Graceful => Duration::from_secs(self.config.grace_period_secs),
            ShutdownSignal::Urgent | ShutdownSignal::Emergency => Duration::ZERO,
        }
    }
}

/// Cancellation handle for async tasks
#[derive(Clone)]
pub struct ShutdownToken {
    signal_rx: watch::Receiver<Option<ShutdownSignal>>,
}

impl ShutdownToken {
    pub fn is_cancelled(&self) -> bool {
        self.signal_rx.borrow().is_some()
    }

    /// Resolves once shutdown is requested (immediately if it already was)
    pub async fn cancelled(&self) -> ShutdownSignal {
        match self.signal_rx.clone().wait_for(Option::is_some).await {
            Ok(current) => current.unwrap_or(ShutdownSignal::Graceful),
            // Channel closed = emergency
            Err(_) => ShutdownSignal::Emergency,
        }
    }
}

/// Install OS signal handlers that feed `shutdown`
pub fn install_signal_handlers(shutdown: Arc<GracefulShutdown>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let handlers = [
            (SignalKind::terminate(), "SIGTERM", ShutdownSignal::Graceful),
            (SignalKind::interrupt(), "SIGINT", ShutdownSignal::Graceful),
            (SignalKind::quit(), "SIGQUIT", ShutdownSignal::Urgent),
        ];

        for (kind, name, kind_signal) in handlers {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                match signal(kind) {
                    Ok(mut stream) => {
                        stream.recv().await;
                        info!("Received {}", name);
                        shutdown.request_shutdown(kind_signal);
                    }
                    Err(e) => warn!("Failed to install {} handler: {}", name, e),
                }
            });
        }
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl+C");
                    shutdown.request_shutdown(ShutdownSignal::Graceful);
                }
                Err(e) => warn!("Failed to install Ctrl+C handler: {}", e),
            }
        });
    }
}
