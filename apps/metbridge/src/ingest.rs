//! 采集链路装配：MQTT 采集源 -> 入站消息路由。

use metbridge_config::BridgeConfig;
use metbridge_ingest::{MqttSource, MqttSourceConfig, Source};
use metbridge_pipeline::IngestRouter;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// 由桥接配置生成 MQTT 采集源配置。
pub fn source_config(config: &BridgeConfig) -> MqttSourceConfig {
    MqttSourceConfig {
        host: config.mqtt.host.clone(),
        port: config.mqtt.port,
        username: config.mqtt.username.clone(),
        password: config.mqtt.password.clone(),
        client_id: config.mqtt_client_id.clone(),
        topic_filter: config.mqtt_topic.clone(),
        qos: config.mqtt_qos,
        keep_alive: config.mqtt.keep_alive,
        reconnect_delay: config.mqtt_reconnect_delay,
    }
}

/// 启动采集任务，`shutdown` 置为 true 后任务在当前消息处理完成后结束。
pub fn spawn_ingest(
    config: &BridgeConfig,
    router: IngestRouter,
    shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    let mqtt_config = source_config(config);
    info!(
        target: "metbridge.ingest",
        host = %mqtt_config.host,
        port = mqtt_config.port,
        topic_filter = %mqtt_config.topic_filter,
        client_id = %mqtt_config.client_id,
        "ingest_source_mqtt"
    );
    let source: Arc<dyn Source> = Arc::new(MqttSource::new(mqtt_config));

    tokio::spawn(async move {
        if let Err(err) = source.run(Arc::new(router), shutdown).await {
            warn!(target: "metbridge.ingest", error = %err, "ingest_stopped");
        }
    })
}
