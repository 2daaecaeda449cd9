//! Shipment Store
//!
//! Mirrors Blackboard entries into `shipment_state`. The Blackboard stays
//! the source of truth while the process runs; the table only seeds it on
//! the next start.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::Row;
use tracing::{debug, info, instrument};

use crate::coordinator::{ShipmentState, ShipmentStatus};
use crate::error::{CoordinatorError, Result};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ShipmentStore: Send + Sync {
    /// Insert or replace `state`; older revisions never overwrite newer ones
    async fn upsert(&self, state: &ShipmentState) -> Result<()>;

    /// Every persisted shipment
    async fn load_all(&self) -> Result<Vec<ShipmentState>>;
}

#[derive(Clone)]
pub struct PostgresShipmentStore {
    pool: PgPool,
}

impl PostgresShipmentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn store_error(err: sqlx::Error) -> CoordinatorError {
    CoordinatorError::Store(err.to_string())
}

#[async_trait]
impl ShipmentStore for PostgresShipmentStore {
    #[instrument(skip(self, state), fields(shipment_id = %state.id, revision = state.revision))]
    async fn upsert(&self, state: &ShipmentState) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO shipment_state (id, status, risk_score, risk_factors, revision, last_updated)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                risk_score = EXCLUDED.risk_score,
                risk_factors = EXCLUDED.risk_factors,
                revision = EXCLUDED.revision,
                last_updated = EXCLUDED.last_updated
            WHERE shipment_state.revision < EXCLUDED.revision
            "#,
        )
        .bind(&state.id)
        .bind(state.status.as_str())
        .bind(state.risk_score)
        .bind(&state.risk_factors)
        .bind(state.revision as i64)
        .bind(state.last_updated)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        debug!("shipment state persisted");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn load_all(&self) -> Result<Vec<ShipmentState>> {
        let rows = sqlx::query(
            r#"
            SELECT id, status, risk_score, risk_factors, revision, last_updated
            FROM shipment_state
            ORDER BY revision ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        let mut states = Vec::with_capacity(rows.len());
        for row in rows {
            let status: String = row.get("status");
            let revision: i64 = row.get("revision");
            let last_updated: DateTime<Utc> = row.get("last_updated");
            states.push(ShipmentState {
                id: row.get("id"),
                status: ShipmentStatus::try_from(status.as_str()).map_err(CoordinatorError::Store)?,
                risk_score: row.get("risk_score"),
                risk_factors: row.get("risk_factors"),
                revision: revision.max(0) as u64,
                last_updated,
            });
        }

        info!(count = states.len(), "loaded persisted shipment state");
        Ok(states)
    }
}
