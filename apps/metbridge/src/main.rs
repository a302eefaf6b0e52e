//! MQTT 数据记录仪遥测 -> PostgreSQL 桥接服务。

mod ingest;

use metbridge_config::BridgeConfig;
use metbridge_pipeline::{IngestRouter, RouterConfig};
use metbridge_storage::{PgGateway, PoolSettings, ensure_schema};
use metbridge_telemetry::{init_tracing, metrics};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    let config = BridgeConfig::from_env()?;
    init_tracing();

    // 启动时连不上数据库直接退出
    let settings = PoolSettings {
        max_connections: config.db_max_connections,
        connect_timeout: config.db_connect_timeout,
    };
    let gateway = match PgGateway::connect(&config.database_url, settings).await {
        Ok(gateway) => Arc::new(gateway),
        Err(err) => {
            error!(target: "metbridge.storage", error = %err, "database_connect_failed");
            return Err(err.into());
        }
    };
    ensure_schema(&gateway.pool()?).await?;
    info!(target: "metbridge.storage", "database_schema_ready");

    let router = IngestRouter::with_config(
        gateway.clone(),
        RouterConfig {
            max_retries: config.store_max_retries,
            retry_backoff: config.store_retry_backoff,
        },
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut ingest_task = ingest::spawn_ingest(&config, router, shutdown_rx);

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(err) = signal {
                warn!(target: "metbridge.ingest", error = %err, "ctrl_c_listen_failed");
            }
            info!(target: "metbridge.ingest", "shutdown_requested");
            let _ = shutdown_tx.send(true);
            // 等待当前消息处理完成
            if let Err(err) = (&mut ingest_task).await {
                warn!(target: "metbridge.ingest", error = %err, "ingest_task_join_failed");
            }
        }
        joined = &mut ingest_task => {
            if let Err(err) = joined {
                warn!(target: "metbridge.ingest", error = %err, "ingest_task_join_failed");
            }
        }
    }

    gateway.close().await;
    let snapshot = metrics().snapshot();
    info!(
        target: "metbridge.pipeline",
        messages_received = snapshot.messages_received,
        raw_stored = snapshot.raw_stored,
        raw_store_failures = snapshot.raw_store_failures,
        sensor_records_stored = snapshot.sensor_records_stored,
        status_stored = snapshot.status_stored,
        unclassified = snapshot.unclassified,
        storage_failures = snapshot.storage_failures,
        gateway_unavailable = snapshot.gateway_unavailable,
        "bridge_stopped"
    );
    Ok(())
}
