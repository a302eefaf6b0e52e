//! 表结构初始化
//!
//! 三张只追加的表：
//! - `mqtt_messages`：原始消息（payload 为 bytea，非 JSON 也能原样保存）
//! - `sensor_records`：采样记录（values 为 jsonb）
//! - `status_snapshots`：状态快照（status_data 为 jsonb）

use crate::error::StorageError;
use sqlx::PgPool;

const SCHEMA_STATEMENTS: &[&str] = &[
    "create table if not exists mqtt_messages ( \
        id bigserial primary key, \
        topic varchar(255) not null, \
        payload bytea not null, \
        received_at timestamptz not null default now() \
     )",
    "create index if not exists idx_mqtt_messages_topic on mqtt_messages (topic)",
    "create index if not exists idx_mqtt_messages_received_at on mqtt_messages (received_at)",
    "create table if not exists sensor_records ( \
        id bigserial primary key, \
        station_name varchar(100) not null, \
        table_name varchar(100) not null, \
        timestamp timestamp, \
        record_number bigint, \
        data jsonb not null, \
        received_at timestamptz not null default now() \
     )",
    "create index if not exists idx_sensor_records_station on sensor_records (station_name)",
    "create index if not exists idx_sensor_records_timestamp on sensor_records (timestamp)",
    "create table if not exists status_snapshots ( \
        id bigserial primary key, \
        station_name varchar(100) not null, \
        status_data jsonb not null, \
        received_at timestamptz not null default now() \
     )",
    "create index if not exists idx_status_snapshots_station on status_snapshots (station_name)",
];

/// 幂等建表（可重复执行）
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StorageError> {
    let mut tx = pool.begin().await?;
    for statement in SCHEMA_STATEMENTS {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    Ok(())
}
