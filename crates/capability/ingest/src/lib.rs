//! MQTT 采集源：将 (topic, payload) 顺序投递给处理器。
//!
//! 连接、订阅、保活与重连都在这里完成，处理器只看到已投递的原始消息。

use async_trait::async_trait;
use domain::{RawMessage, now_epoch_ms};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// 停机时等待 DISCONNECT 发出的上限。
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// 采集错误。
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("handler error: {0}")]
    Handler(String),
    #[error("source error: {0}")]
    Source(String),
}

/// RawMessage 处理器。
///
/// 同一连接上的调用是严格顺序的：上一条返回前不会投递下一条。
#[async_trait]
pub trait RawMessageHandler: Send + Sync {
    async fn handle(&self, message: RawMessage) -> Result<(), IngestError>;
}

/// 采集源抽象。
///
/// `shutdown` 变为 true 后，采集源在当前消息处理完成后退出。
#[async_trait]
pub trait Source: Send + Sync {
    async fn run(
        &self,
        handler: Arc<dyn RawMessageHandler>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), IngestError>;
}

/// 占位源（用于接线与测试）。
#[derive(Debug, Default)]
pub struct NoopSource;

#[async_trait]
impl Source for NoopSource {
    async fn run(
        &self,
        _handler: Arc<dyn RawMessageHandler>,
        _shutdown: watch::Receiver<bool>,
    ) -> Result<(), IngestError> {
        Ok(())
    }
}

/// MQTT 采集源配置。
#[derive(Debug, Clone)]
pub struct MqttSourceConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
    pub topic_filter: String,
    pub qos: u8,
    pub keep_alive: Duration,
    pub reconnect_delay: Duration,
}

/// MQTT 采集源。
#[derive(Debug, Clone)]
pub struct MqttSource {
    config: MqttSourceConfig,
}

impl MqttSource {
    pub fn new(config: MqttSourceConfig) -> Self {
        Self { config }
    }

    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(
            self.config.client_id.clone(),
            self.config.host.clone(),
            self.config.port,
        );
        options.set_keep_alive(self.config.keep_alive);
        if let (Some(username), Some(password)) =
            (self.config.username.as_ref(), self.config.password.as_ref())
        {
            options.set_credentials(username, password);
        }
        options
    }
}

#[async_trait]
impl Source for MqttSource {
    async fn run(
        &self,
        handler: Arc<dyn RawMessageHandler>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), IngestError> {
        let (client, mut eventloop) = AsyncClient::new(self.options(), 10);
        let qos = qos_from_u8(self.config.qos);
        let mut connected = false;

        loop {
            if *shutdown.borrow() {
                break;
            }
            let event = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                event = eventloop.poll() => event,
            };

            match event {
                // 每次（重新）连接后都要订阅，clean session 下订阅不会保留
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    connected = true;
                    info!(
                        target: "metbridge.ingest",
                        host = %self.config.host,
                        port = self.config.port,
                        "mqtt_connected"
                    );
                    client
                        .subscribe(self.config.topic_filter.clone(), qos)
                        .await
                        .map_err(|err| IngestError::Source(err.to_string()))?;
                    info!(
                        target: "metbridge.ingest",
                        topic_filter = %self.config.topic_filter,
                        qos = self.config.qos,
                        "mqtt_subscribed"
                    );
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let message =
                        RawMessage::new(publish.topic, publish.payload.to_vec(), now_epoch_ms());
                    // 处理完成前不再 poll，保证顺序投递
                    if let Err(err) = handler.handle(message).await {
                        warn!(target: "metbridge.ingest", error = %err, "raw_message_handler_failed");
                    }
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    connected = false;
                    warn!(target: "metbridge.ingest", "mqtt_disconnected_by_broker");
                }
                Ok(_) => {}
                Err(err) => {
                    connected = false;
                    warn!(
                        target: "metbridge.ingest",
                        error = %err,
                        retry_in_ms = self.config.reconnect_delay.as_millis() as u64,
                        "mqtt_connection_error"
                    );
                    tokio::select! {
                        _ = shutdown.changed() => {}
                        _ = tokio::time::sleep(self.config.reconnect_delay) => {}
                    }
                }
            }
        }

        debug!(target: "metbridge.ingest", "mqtt_source_stopping");
        if connected {
            disconnect(&client, &mut eventloop).await;
        }
        info!(target: "metbridge.ingest", "mqtt_source_stopped");
        Ok(())
    }
}

/// 发送 DISCONNECT 并继续驱动事件循环，直到报文真正写出或连接结束。
async fn disconnect(client: &AsyncClient, eventloop: &mut EventLoop) {
    if let Err(err) = client.disconnect().await {
        warn!(target: "metbridge.ingest", error = %err, "mqtt_disconnect_request_failed");
        return;
    }
    let drained = tokio::time::timeout(DISCONNECT_TIMEOUT, async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Disconnect)) => return Ok(()),
                Ok(_) => {}
                Err(err) => return Err(err),
            }
        }
    })
    .await;
    match drained {
        Ok(Ok(())) => info!(target: "metbridge.ingest", "mqtt_disconnected"),
        Ok(Err(err)) => {
            warn!(target: "metbridge.ingest", error = %err, "mqtt_disconnect_failed")
        }
        Err(_) => warn!(target: "metbridge.ingest", "mqtt_disconnect_timed_out"),
    }
}

fn qos_from_u8(value: u8) -> QoS {
    match value {
        0 => QoS::AtMostOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}
