//! PostgreSQL persistence for vitals records
//!
//! Inserts are idempotent on the record id because the upstream transport
//! delivers at least once; a redelivered record is a no-op success.

use crate::config::DatabaseSection;
use crate::health::HealthProbe;
use crate::protocol::VitalsRecord;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

/// Datastore errors
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Database connection failed: {0}")]
    Connection(#[source] sqlx::Error),
    #[error("Insert failed: {0}")]
    Insert(#[source] sqlx::Error),
}

/// Seam for the pipeline's idempotent record storage
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Store a record; storing the same `id` twice must be a no-op success
    async fn insert(&self, record: &VitalsRecord) -> Result<(), PersistenceError>;
}

#[async_trait]
impl<T: RecordStore + ?Sized> RecordStore for Arc<T> {
    async fn insert(&self, record: &VitalsRecord) -> Result<(), PersistenceError> {
        (**self).insert(record).await
    }
}

const INSERT_SQL: &str = r#"
INSERT INTO vitals (
    id,
    patient_id,
    recorded_at,
    heart_rate,
    blood_pressure_systolic,
    blood_pressure_diastolic,
    temperature,
    oxygen_saturation,
    device_id
) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
ON CONFLICT (id) DO NOTHING
"#;

/// Pooled PostgreSQL client
///
/// Cheap to clone; the pool is shared between clones, so the pipeline and
/// the health aggregator can hold the same handle.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
    connected: Arc<AtomicBool>,
}

impl Database {
    /// Build the pool and verify it with a round trip
    pub async fn connect(config: &DatabaseSection) -> Result<Self, PersistenceError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .idle_timeout(Duration::from_millis(config.idle_timeout_ms))
            .acquire_timeout(Duration::from_millis(config.connect_timeout_ms))
            .connect(&config.url)
            .await
            .map_err(PersistenceError::Connection)?;

        sqlx::query("SELECT NOW()")
            .execute(&pool)
            .await
            .map_err(PersistenceError::Connection)?;

        info!("Database connected");
        Ok(Self {
            pool,
            connected: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Round-trip probe; never errors out
    pub async fn is_healthy(&self) -> bool {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => true,
            Err(e) => {
                error!(error = %e, "Database health check failed");
                false
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed) && !self.pool.is_closed()
    }

    pub async fn close(&self) {
        self.pool.close().await;
        self.connected.store(false, Ordering::Relaxed);
        info!("Database connection closed");
    }
}

#[async_trait]
impl RecordStore for Database {
    async fn insert(&self, record: &VitalsRecord) -> Result<(), PersistenceError> {
        sqlx::query(INSERT_SQL)
            .bind(record.id)
            .bind(record.patient_id)
            .bind(record.recorded_at)
            .bind(record.heart_rate)
            .bind(record.blood_pressure.map(|bp| bp.systolic))
            .bind(record.blood_pressure.map(|bp| bp.diastolic))
            .bind(record.temperature)
            .bind(record.oxygen_saturation)
            .bind(record.device_id.as_deref())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!(vitals_id = %record.id, error = %e, "Failed to insert vitals");
                PersistenceError::Insert(e)
            })?;

        debug!(
            vitals_id = %record.id,
            patient_id = %record.patient_id,
            "Vitals inserted"
        );
        Ok(())
    }
}

#[async_trait]
impl HealthProbe for Database {
    async fn is_healthy(&self) -> bool {
        Database::is_healthy(self).await
    }

    fn is_connected(&self) -> bool {
        Database::is_connected(self)
    }
}
