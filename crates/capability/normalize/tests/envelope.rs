use domain::MessageCategory;
use metbridge_normalize::{
    DecodeError, classify_message, decode_envelope, envelope_records, parse_payload,
};
use serde_json::{Value, json};

fn five_min_payload(rows: Value) -> Value {
    json!({
        "head": {
            "transaction": 0,
            "signature": 12345,
            "environment": {
                "station_name": "ST1",
                "table_name": "Five_Min",
                "model": "CR6"
            },
            "fields": [
                {"name": "TIMESTAMP", "type": "xsd:dateTime", "units": ""},
                {"name": "RECORD", "type": "xsd:long", "units": ""},
                {"name": "Temp_C_Avg", "type": "xsd:float", "units": "Deg C"},
                {"name": "Humidity_Avg", "type": "xsd:float", "units": "%"}
            ]
        },
        "data": rows
    })
}

#[test]
fn decode_single_row_envelope() {
    let payload = parse_payload(
        br#"{"head":{"environment":{"station_name":"ST1","table_name":"Five_Min"},"fields":[{"name":"TIMESTAMP"},{"name":"RECORD"},{"name":"Temp_C_Avg"}]},"data":[["2024-01-01T00:00:00",1,21.5]]}"#,
    )
    .expect("json");
    let envelope = decode_envelope(&payload).expect("envelope");
    let records = envelope_records(&envelope);

    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.station_name, "ST1");
    assert_eq!(record.table_name, "Five_Min");
    assert_eq!(record.timestamp.as_deref(), Some("2024-01-01T00:00:00"));
    assert_eq!(record.sequence_number, Some(1));
    assert_eq!(record.values.len(), 1);
    assert_eq!(record.values.get("Temp_C_Avg"), Some(&json!(21.5)));
}

#[test]
fn decode_keeps_metadata_and_descriptors() {
    let envelope = decode_envelope(&five_min_payload(json!([]))).expect("envelope");

    assert_eq!(envelope.environment.get("model"), Some(&json!("CR6")));
    assert_eq!(envelope.field_descriptors.len(), 4);
    assert_eq!(envelope.field_descriptors[2].name.as_deref(), Some("Temp_C_Avg"));
    assert_eq!(envelope.field_descriptors[2].data_type, "xsd:float");
    assert_eq!(envelope.field_descriptors[2].units, "Deg C");
    assert!(envelope_records(&envelope).is_empty());
}

#[test]
fn every_usable_row_yields_one_record_in_order() {
    let rows = json!([
        ["2024-01-01T00:00:00", 1, 21.5, 60.1],
        ["2024-01-01T00:05:00", 2, 21.7],
        ["2024-01-01T00:10:00", 3, 21.9, 61.0, 99.9]
    ]);
    let envelope = decode_envelope(&five_min_payload(rows)).expect("envelope");
    let records = envelope_records(&envelope);

    assert_eq!(records.len(), 3);
    let sequence: Vec<_> = records.iter().map(|r| r.sequence_number).collect();
    assert_eq!(sequence, vec![Some(1), Some(2), Some(3)]);
    // min(len(fields) - 2, len(row) - 2)
    let widths: Vec<_> = records.iter().map(|r| r.values.len()).collect();
    assert_eq!(widths, vec![2, 1, 2]);
}

#[test]
fn short_rows_are_skipped() {
    let rows = json!([
        ["2024-01-01T00:00:00"],
        [],
        "not a row",
        ["2024-01-01T00:05:00", 2]
    ]);
    let envelope = decode_envelope(&five_min_payload(rows)).expect("envelope");
    let records = envelope_records(&envelope);

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].sequence_number, Some(2));
    assert!(records[0].values.is_empty());
}

#[test]
fn missing_fields_yield_records_without_values() {
    let payload = json!({
        "head": {"environment": {"station_name": "ST1"}},
        "data": [["2024-01-01T00:00:00", 1, 21.5]]
    });
    let envelope = decode_envelope(&payload).expect("envelope");
    let records = envelope_records(&envelope);

    assert_eq!(envelope.table_name, "unknown");
    assert_eq!(records.len(), 1);
    assert!(records[0].values.is_empty());
}

#[test]
fn missing_head_or_data_is_not_an_envelope() {
    for payload in [
        json!({"data": []}),
        json!({"head": {}}),
        json!({"battery_voltage": 12.9}),
        json!({"head": {}, "data": {}}),
    ] {
        let err = decode_envelope(&payload).expect_err("not an envelope");
        assert!(matches!(err, DecodeError::NotAnEnvelope(_)), "{payload}");
    }
}

#[test]
fn non_object_payload_is_malformed() {
    let err = decode_envelope(&json!([1, 2, 3])).expect_err("malformed");
    assert!(matches!(err, DecodeError::MalformedPayload(_)));

    let err = parse_payload(b"not json").expect_err("malformed");
    assert!(matches!(err, DecodeError::MalformedPayload(_)));
}

#[test]
fn envelope_wins_over_status_topic() {
    let payload = five_min_payload(json!([["2024-01-01T00:00:00", 1, 21.5]]));
    let category = classify_message("cs/v1/ST1/statusInfo", &payload).expect("category");
    assert!(matches!(category, MessageCategory::SensorTable(_)));
}

#[test]
fn status_topic_classifies_non_envelope() {
    let payload = json!({"battery_voltage": 12.9});
    let category = classify_message("cs/v1/ST1/statusInfo", &payload).expect("category");
    match category {
        MessageCategory::DeviceStatus {
            station_name,
            payload: status,
        } => {
            assert_eq!(station_name, "ST1");
            assert_eq!(status, json!({"battery_voltage": 12.9}));
        }
        other => panic!("unexpected category: {other:?}"),
    }
}

#[test]
fn other_topics_are_unclassified() {
    let payload = json!({"hello": "world"});
    let category = classify_message("some/topic", &payload).expect("category");
    assert!(matches!(category, MessageCategory::Unclassified));
}

#[test]
fn classify_reports_malformed_payload() {
    let err = classify_message("cs/v1/ST1/statusInfo", &json!(12.9)).expect_err("malformed");
    assert!(matches!(err, DecodeError::MalformedPayload(_)));
}

#[test]
fn null_timestamp_row_keeps_its_values() {
    let envelope = decode_envelope(&five_min_payload(json!([
        [null, 1, 21.5, 60.0],
        ["2024-01-01T00:05:00", 2, 21.7, 61.0]
    ])))
    .expect("envelope");
    let records = envelope_records(&envelope);

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].timestamp, None);
    assert_eq!(records[0].sequence_number, Some(1));
    assert_eq!(records[0].values.get("Temp_C_Avg"), Some(&json!(21.5)));
    assert_eq!(records[1].timestamp.as_deref(), Some("2024-01-01T00:05:00"));
}
