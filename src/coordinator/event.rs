//! Event envelopes and the payloads handlers decode out of them
//!
//! Wire shape: `{"event_type": "...", ...type-specific fields}`. The decoder
//! only insists on `event_type`; each handler turns the remaining fields into
//! its own typed payload and rejects what it cannot use.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{CoordinatorError, Result};

pub const HIGH_RISK_DETECTED: &str = "HIGH_RISK_DETECTED";
pub const WEATHER_ALERT: &str = "WEATHER_ALERT";

/// Risk score used when an event carries none, or one that is not numeric
pub const NEUTRAL_RISK_SCORE: f64 = 0.0;

/// A decoded queue item: the routing tag plus the object exactly as it
/// arrived. Neither the tag nor any field value is normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope {
    event_type: String,
    fields: Map<String, Value>,
}

impl EventEnvelope {
    pub fn new(event_type: &str, fields: Map<String, Value>) -> Self {
        let mut fields = fields;
        fields.insert(
            "event_type".to_string(),
            Value::String(event_type.to_string()),
        );
        Self {
            event_type: event_type.to_string(),
            fields,
        }
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// String field as sent; empty strings count as absent
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.field(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// The full event as it arrived, `event_type` included
    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

/// Parses raw queue payloads into envelopes
pub struct EventDecoder;

impl EventDecoder {
    /// Decode one queued payload.
    ///
    /// Fails with `MalformedPayload` when the bytes are not a JSON object and
    /// with `MissingField("event_type")` when the tag is absent, empty or not
    /// a string. The tag is kept byte for byte; routing matches it exactly.
    pub fn decode(raw: &[u8]) -> Result<EventEnvelope> {
        let value: Value = serde_json::from_slice(raw)
            .map_err(|e| CoordinatorError::MalformedPayload(e.to_string()))?;

        let Value::Object(fields) = value else {
            return Err(CoordinatorError::MalformedPayload(
                "expected a JSON object".to_string(),
            ));
        };

        let event_type = match fields.get("event_type") {
            Some(Value::String(tag)) if !tag.is_empty() => tag.clone(),
            _ => return Err(CoordinatorError::missing_field("event_type")),
        };

        Ok(EventEnvelope { event_type, fields })
    }
}

/// Lenient numeric read: numbers and numeric strings are accepted, anything
/// else falls back to the neutral score.
pub fn coerce_risk_score(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(score) if score.is_finite() => score,
        _ => {
            if value.is_some() {
                debug!(?value, "risk_score is not numeric, using neutral score");
            }
            NEUTRAL_RISK_SCORE
        }
    }
}

/// RFC3339 strings or unix seconds
pub fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0)),
        _ => None,
    }
}

fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    let items = value?.as_array()?;
    Some(
        items
            .iter()
            .filter_map(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

/// Payload of `HIGH_RISK_DETECTED`
#[derive(Debug, Clone, PartialEq)]
pub struct HighRiskSignal {
    pub shipment_id: String,
    pub risk_score: f64,
    pub risk_factors: Option<Vec<String>>,
    pub detected_at: Option<DateTime<Utc>>,
}

impl TryFrom<&EventEnvelope> for HighRiskSignal {
    type Error = CoordinatorError;

    fn try_from(event: &EventEnvelope) -> Result<Self> {
        let shipment_id = event
            .str_field("shipment_id")
            .ok_or_else(|| CoordinatorError::missing_field("shipment_id"))?
            .to_string();

        Ok(Self {
            shipment_id,
            risk_score: coerce_risk_score(event.field("risk_score")),
            risk_factors: string_list(event.field("risk_factors")),
            detected_at: parse_timestamp(event.field("detected_at")),
        })
    }
}

/// Payload of `WEATHER_ALERT`
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherAlert {
    pub severity: Option<String>,
    pub detected_at: Option<DateTime<Utc>>,
}

impl WeatherAlert {
    pub fn is_severe(&self) -> bool {
        self.severity
            .as_deref()
            .map(|s| s.eq_ignore_ascii_case("HIGH") || s.eq_ignore_ascii_case("CRITICAL"))
            .unwrap_or(false)
    }
}

impl From<&EventEnvelope> for WeatherAlert {
    fn from(event: &EventEnvelope) -> Self {
        Self {
            severity: event.str_field("severity").map(str::to_string),
            detected_at: parse_timestamp(event.field("detected_at")),
        }
    }
}

/// Shipments named directly by an event, via `shipment_id` and/or
/// `affected_shipments`, de-duplicated in first-seen order
pub fn named_shipments(event: &EventEnvelope) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    if let Some(id) = event.str_field("shipment_id") {
        ids.push(id.to_string());
    }
    for id in string_list(event.field("affected_shipments")).unwrap_or_default() {
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}
