use clap::{Parser, Subcommand};
use tracing::info;

use crate::coordinator::EventDecoder;
use crate::error::Result;
use crate::queue::{PriorityClass, PriorityQueueClient};

#[derive(Parser)]
#[command(name = "ecologistix")]
#[command(author = "Ecologistix Team")]
#[command(version = "0.1.0")]
#[command(about = "Shipment event coordinator", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config directory
    #[arg(short, long, default_value = "config", env = "ECOLOGISTIX_CONFIG_DIR")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the coordination loop (default)
    Run,
    /// Enqueue one event
    Publish {
        /// Priority lane (high or normal)
        #[arg(short, long, default_value = "normal")]
        priority: PriorityClass,
        /// Event JSON, or @path to read it from a file
        payload: String,
    },
    /// Apply database migrations and exit
    Migrate,
}

/// Resolve a `publish` argument to raw bytes
pub fn load_payload(arg: &str) -> Result<Vec<u8>> {
    match arg.strip_prefix('@') {
        Some(path) => Ok(std::fs::read(path)?),
        None => Ok(arg.as_bytes().to_vec()),
    }
}

/// Check and enqueue one event
pub async fn publish(client: &PriorityQueueClient, priority: PriorityClass, payload: &[u8]) -> Result<()> {
    let event = EventDecoder::decode(payload)?;
    client.enqueue(priority, payload).await?;
    info!(event_type = %event.event_type(), queue = %priority, "event published");
    Ok(())
}
