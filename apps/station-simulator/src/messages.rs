//! 模拟 CR6 数据记录仪的报文生成。

use chrono::{DateTime, Utc};
use rand::Rng;
use serde_json::{Value, json};

const MODEL: &str = "CR6";
const SERIAL_NO: &str = "12345";
const OS_VERSION: &str = "CR6.Std.11.00";
const PROGRAM_NAME: &str = "TestProgram.CR6";

/// 生成一条单行 CSIJSON 数据表报文。
///
/// 记录号取 `now` 的秒级时间戳对 10000 取模。
pub fn data_table_message<R: Rng>(
    station_name: &str,
    table_name: &str,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Value {
    let timestamp = now.format("%Y-%m-%dT%H:%M:%S").to_string();
    let record_number = now.timestamp().rem_euclid(10_000);

    json!({
        "head": {
            "transaction": 0,
            "signature": 12345,
            "environment": {
                "station_name": station_name,
                "table_name": table_name,
                "model": MODEL,
                "serial_no": SERIAL_NO,
                "os_version": OS_VERSION,
                "prog_name": format!("CPU:{PROGRAM_NAME}"),
            },
            "fields": [
                {"name": "TIMESTAMP", "type": "xsd:dateTime", "units": ""},
                {"name": "RECORD", "type": "xsd:long", "units": ""},
                {"name": "Temp_C_Avg", "type": "xsd:float", "units": "Deg C"},
                {"name": "Humidity_Avg", "type": "xsd:float", "units": "%"},
                {"name": "BattV_Min", "type": "xsd:float", "units": "Volts"},
                {"name": "WindSpeed_Avg", "type": "xsd:float", "units": "m/s"},
                {"name": "WindDir_Avg", "type": "xsd:float", "units": "degrees"},
            ],
        },
        "data": [[
            timestamp,
            record_number,
            reading(rng, 20.0, 30.0, 2),
            reading(rng, 40.0, 80.0, 2),
            reading(rng, 12.5, 13.2, 2),
            reading(rng, 0.0, 15.0, 2),
            reading(rng, 0.0, 360.0, 1),
        ]],
    })
}

/// 生成一条设备状态报文。
pub fn status_message<R: Rng>(rng: &mut R) -> Value {
    json!({
        "battery_voltage": reading(rng, 12.5, 13.2, 2),
        "panel_temp": reading(rng, 20.0, 35.0, 2),
        "program_name": PROGRAM_NAME,
        "os_version": OS_VERSION,
        "compile_time": "2025-12-01 10:00:00",
        "memory_free": rng.gen_range(50_000..=100_000),
        "uptime_seconds": rng.gen_range(10_000..=1_000_000),
    })
}

fn reading<R: Rng>(rng: &mut R, low: f64, high: f64, digits: i32) -> f64 {
    let scale = 10f64.powi(digits);
    (rng.gen_range(low..=high) * scale).round() / scale
}
