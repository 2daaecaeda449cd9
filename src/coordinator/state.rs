//! Shipment State - the blackboard's value type

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coordinator view of a shipment's condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentStatus {
    #[default]
    Normal,
    AtRisk,
}

impl ShipmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentStatus::Normal => "NORMAL",
            ShipmentStatus::AtRisk => "AT_RISK",
        }
    }
}

impl std::fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ShipmentStatus {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "NORMAL" => Ok(ShipmentStatus::Normal),
            "AT_RISK" => Ok(ShipmentStatus::AtRisk),
            other => Err(format!("unknown shipment status: {other}")),
        }
    }
}

/// One tracked shipment.
///
/// `id` never changes after creation. `revision` is stamped by the
/// blackboard on every write and increases across all shipments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentState {
    pub id: String,
    pub status: ShipmentStatus,
    pub risk_score: f64,
    #[serde(default)]
    pub risk_factors: Vec<String>,
    pub last_updated: DateTime<Utc>,
    pub revision: u64,
}

impl ShipmentState {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            status: ShipmentStatus::default(),
            risk_score: 0.0,
            risk_factors: Vec::new(),
            last_updated: Utc::now(),
            revision: 0,
        }
    }

    pub fn is_at_risk(&self) -> bool {
        self.status == ShipmentStatus::AtRisk
    }
}
