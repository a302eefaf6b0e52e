//! 应用运行配置加载。

use std::env;
use std::time::Duration;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// MQTT 连接配置（桥接服务与模拟器共用）。
#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive: Duration,
}

impl MqttConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("BRIDGE_MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = read_u16_with_default("BRIDGE_MQTT_PORT", 1883)?;
        let username = read_optional("BRIDGE_MQTT_USERNAME");
        let password = read_optional("BRIDGE_MQTT_PASSWORD");
        let keep_alive_seconds = read_u64_with_default("BRIDGE_MQTT_KEEP_ALIVE_SECONDS", 60)?;
        Ok(Self {
            host,
            port,
            username,
            password,
            keep_alive: Duration::from_secs(keep_alive_seconds.max(1)),
        })
    }
}

/// 桥接服务运行配置。
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_connect_timeout: Duration,
    pub mqtt: MqttConfig,
    pub mqtt_topic: String,
    pub mqtt_client_id: String,
    pub mqtt_qos: u8,
    pub mqtt_reconnect_delay: Duration,
    pub store_max_retries: usize,
    pub store_retry_backoff: Duration,
}

impl BridgeConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("BRIDGE_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("BRIDGE_DATABASE_URL".to_string()))?;
        let db_max_connections = read_u32_with_default("BRIDGE_DB_MAX_CONNECTIONS", 2)?;
        let db_connect_timeout_seconds =
            read_u64_with_default("BRIDGE_DB_CONNECT_TIMEOUT_SECONDS", 10)?;
        let mqtt = MqttConfig::from_env()?;
        let mqtt_topic = env::var("BRIDGE_MQTT_TOPIC").unwrap_or_else(|_| "cs/v1/#".to_string());
        let mqtt_client_id = env::var("BRIDGE_MQTT_CLIENT_ID")
            .unwrap_or_else(|_| "mqtt_postgres_bridge".to_string());
        let mqtt_qos = read_u8_with_default("BRIDGE_MQTT_QOS", 0)?;
        if mqtt_qos > 2 {
            return Err(ConfigError::Invalid(
                "BRIDGE_MQTT_QOS".to_string(),
                mqtt_qos.to_string(),
            ));
        }
        let mqtt_reconnect_delay_ms =
            read_u64_with_default("BRIDGE_MQTT_RECONNECT_DELAY_MS", 1000)?;
        let store_max_retries = read_u64_with_default("BRIDGE_STORE_MAX_RETRIES", 0)? as usize;
        let store_retry_backoff_ms = read_u64_with_default("BRIDGE_STORE_RETRY_BACKOFF_MS", 200)?;

        Ok(Self {
            database_url,
            db_max_connections,
            db_connect_timeout: Duration::from_secs(db_connect_timeout_seconds),
            mqtt,
            mqtt_topic,
            mqtt_client_id,
            mqtt_qos,
            mqtt_reconnect_delay: Duration::from_millis(mqtt_reconnect_delay_ms),
            store_max_retries,
            store_retry_backoff: Duration::from_millis(store_retry_backoff_ms),
        })
    }
}

/// 站点模拟器配置。
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub mqtt: MqttConfig,
    pub base_topic: String,
    pub station: String,
    pub table: String,
    pub messages: u32,
    pub interval: Duration,
}

impl SimulatorConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let mqtt = MqttConfig::from_env()?;
        let base_topic = env::var("BRIDGE_SIM_BASE_TOPIC").unwrap_or_else(|_| "cs/v1".to_string());
        let station = env::var("BRIDGE_SIM_STATION").unwrap_or_else(|_| "CR6_12345".to_string());
        let table = env::var("BRIDGE_SIM_TABLE").unwrap_or_else(|_| "Five_Min".to_string());
        let messages = read_u32_with_default("BRIDGE_SIM_MESSAGES", 5)?;
        let interval_ms = read_u64_with_default("BRIDGE_SIM_INTERVAL_MS", 2000)?;
        Ok(Self {
            mqtt,
            base_topic: base_topic.trim_end_matches('/').to_string(),
            station,
            table,
            messages,
            interval: Duration::from_millis(interval_ms),
        })
    }

    /// 数据表 topic：`<base>/<station>/datatables/<table>`
    pub fn data_topic(&self) -> String {
        format!("{}/{}/datatables/{}", self.base_topic, self.station, self.table)
    }

    /// 状态 topic：`<base>/<station>/statusInfo`
    pub fn status_topic(&self) -> String {
        format!("{}/{}/statusInfo", self.base_topic, self.station)
    }
}

fn read_u32_with_default(key: &str, default: u32) -> Result<u32, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u32>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u16_with_default(key: &str, default: u16) -> Result<u16, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u16>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u8_with_default(key: &str, default: u8) -> Result<u8, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u8>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}
