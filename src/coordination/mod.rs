//! Process lifecycle coordination

pub mod shutdown;

pub use shutdown::{
    install_signal_handlers, GracefulShutdown, ShutdownConfig, ShutdownSignal, ShutdownToken,
};
