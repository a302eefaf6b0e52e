//! Postgres 持久化网关实现

use crate::connection::{PoolSettings, connect_pool};
use crate::error::StorageError;
use crate::traits::PersistenceGateway;
use domain::SensorRecord;
use serde_json::Value;
use sqlx::PgPool;
use std::sync::RwLock;
use tracing::{info, warn};

pub struct PgGateway {
    pool: RwLock<PgPool>,
    database_url: String,
    settings: PoolSettings,
}

impl PgGateway {
    pub fn new(pool: PgPool, database_url: impl Into<String>, settings: PoolSettings) -> Self {
        Self {
            pool: RwLock::new(pool),
            database_url: database_url.into(),
            settings,
        }
    }

    pub async fn connect(database_url: &str, settings: PoolSettings) -> Result<Self, StorageError> {
        let pool = connect_pool(database_url, &settings).await?;
        Ok(Self::new(pool, database_url, settings))
    }

    /// 当前连接池（克隆句柄，避免跨 await 持锁）
    pub fn pool(&self) -> Result<PgPool, StorageError> {
        self.pool
            .read()
            .map(|pool| pool.clone())
            .map_err(|_| StorageError::new("lock failed"))
    }

    /// 关闭当前连接池
    pub async fn close(&self) {
        if let Ok(pool) = self.pool() {
            pool.close().await;
        }
    }
}

#[async_trait::async_trait]
impl PersistenceGateway for PgGateway {
    async fn store_raw(&self, topic: &str, payload: &[u8]) -> Result<(), StorageError> {
        let pool = self.pool()?;
        sqlx::query("insert into mqtt_messages (topic, payload) values ($1, $2)")
            .bind(topic)
            .bind(payload)
            .execute(&pool)
            .await?;
        Ok(())
    }

    async fn store_sensor_records(
        &self,
        station_name: &str,
        table_name: &str,
        records: &[SensorRecord],
    ) -> Result<(), StorageError> {
        if records.is_empty() {
            return Ok(());
        }
        let pool = self.pool()?;
        let mut tx = pool.begin().await?;
        for record in records {
            let data = serde_json::to_string(&record.values)?;
            sqlx::query(
                "insert into sensor_records \
                 (station_name, table_name, timestamp, record_number, data) \
                 values ($1, $2, $3::timestamp, $4, $5::jsonb)",
            )
            .bind(station_name)
            .bind(table_name)
            .bind(record.timestamp.as_deref())
            .bind(record.sequence_number)
            .bind(data)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn store_status(
        &self,
        station_name: &str,
        status_payload: &Value,
    ) -> Result<(), StorageError> {
        let pool = self.pool()?;
        let status_data = serde_json::to_string(status_payload)?;
        sqlx::query(
            "insert into status_snapshots (station_name, status_data) values ($1, $2::jsonb)",
        )
        .bind(station_name)
        .bind(status_data)
        .execute(&pool)
        .await?;
        Ok(())
    }

    async fn is_usable(&self) -> bool {
        let Ok(pool) = self.pool() else {
            return false;
        };
        if pool.is_closed() {
            return false;
        }
        match sqlx::query("select 1").execute(&pool).await {
            Ok(_) => true,
            Err(err) => {
                warn!(target: "metbridge.storage", error = %err, "database_probe_failed");
                false
            }
        }
    }

    async fn reconnect(&self) -> Result<(), StorageError> {
        let fresh = connect_pool(&self.database_url, &self.settings).await?;
        let stale = {
            let mut guard = self
                .pool
                .write()
                .map_err(|_| StorageError::new("lock failed"))?;
            std::mem::replace(&mut *guard, fresh)
        };
        stale.close().await;
        info!(target: "metbridge.storage", "database_reconnected");
        Ok(())
    }
}
