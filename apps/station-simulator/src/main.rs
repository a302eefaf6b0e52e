//! CR6 站点模拟器：向 MQTT 发布若干数据表报文和一条状态报文。

mod messages;

use chrono::Utc;
use metbridge_config::{ConfigError, SimulatorConfig};
use metbridge_telemetry::init_tracing;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rumqttc::{AsyncClient, ClientError, Event, MqttOptions, Outgoing, Packet, QoS};
use serde_json::Value;
use tracing::{info, warn};

/// 模拟器错误。
#[derive(Debug, thiserror::Error)]
enum SimulatorError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("mqtt publish error: {0}")]
    Publish(#[from] ClientError),
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    run().await?;
    Ok(())
}

async fn run() -> Result<(), SimulatorError> {
    let config = SimulatorConfig::from_env()?;
    init_tracing();

    let mut options = MqttOptions::new(
        format!("{}_simulator", config.station),
        config.mqtt.host.clone(),
        config.mqtt.port,
    );
    options.set_keep_alive(config.mqtt.keep_alive);
    if let (Some(username), Some(password)) =
        (config.mqtt.username.as_ref(), config.mqtt.password.as_ref())
    {
        options.set_credentials(username, password);
    }
    info!(
        target: "metbridge.simulator",
        host = %config.mqtt.host,
        port = config.mqtt.port,
        station = %config.station,
        base_topic = %config.base_topic,
        "simulator_starting"
    );

    let (client, mut eventloop) = AsyncClient::new(options, 10);
    // 事件循环负责真正的网络收发，发出 Disconnect 后结束
    let network = tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!(target: "metbridge.simulator", "mqtt_connected");
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                Ok(_) => {}
                Err(err) => {
                    warn!(target: "metbridge.simulator", error = %err, "mqtt_connection_error");
                    break;
                }
            }
        }
    });

    let mut rng = StdRng::from_entropy();
    let data_topic = config.data_topic();
    for index in 1..=config.messages {
        let message =
            messages::data_table_message(&config.station, &config.table, Utc::now(), &mut rng);
        publish(&client, &data_topic, &message).await?;
        info!(
            target: "metbridge.simulator",
            topic = %data_topic,
            index = index,
            total = config.messages,
            "data_table_published"
        );
        tokio::time::sleep(config.interval).await;
    }

    let status_topic = config.status_topic();
    publish(&client, &status_topic, &messages::status_message(&mut rng)).await?;
    info!(target: "metbridge.simulator", topic = %status_topic, "status_published");

    client.disconnect().await?;
    let _ = network.await;
    info!(target: "metbridge.simulator", "simulator_finished");
    Ok(())
}

async fn publish(client: &AsyncClient, topic: &str, message: &Value) -> Result<(), SimulatorError> {
    let payload = serde_json::to_vec(message)?;
    client
        .publish(topic, QoS::AtMostOnce, false, payload)
        .await?;
    Ok(())
}
