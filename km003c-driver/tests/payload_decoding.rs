//! Tests for chained payload decoding

mod common;

use common::*;
use km003c_driver::decode_payload;

#[test]
fn test_zero_queue_entry_decodes_to_zero() {
    let entry = AdcQueueEntry::decode(&[0u8; 20]).unwrap();
    assert_eq!(entry, AdcQueueEntry::default());
}

#[test]
fn test_queue_entry_short_input() {
    assert!(matches!(
        AdcQueueEntry::decode(&[0u8; 19]),
        Err(KMError::TruncatedRecord { expected: 20, actual: 19 })
    ));
}

#[test]
fn test_chained_queue_chunks() {
    let first: Vec<u8> = [queue_entry(100), queue_entry(101)]
        .iter()
        .flat_map(|e| e.to_bytes())
        .collect();
    let second = queue_entry(102).to_bytes();

    let mut payload = chunk(Attribute::AdcQueue, true, 2, 20, &first);
    payload.extend(chunk(Attribute::AdcQueue, false, 1, 20, &second));

    let records = decode_payload(&payload).unwrap();
    assert_eq!(
        records,
        vec![
            PayloadRecord::AdcQueue(vec![queue_entry(100), queue_entry(101)]),
            PayloadRecord::AdcQueue(vec![queue_entry(102)]),
        ]
    );
}

#[test]
fn test_trailing_bytes_after_last_chunk_are_ignored() {
    let mut payload = chunk(Attribute::AdcQueue, false, 1, 20, &queue_entry(5).to_bytes());
    payload.extend_from_slice(&[0xAA; 12]);

    let records = decode_payload(&payload).unwrap();
    assert_eq!(records, vec![PayloadRecord::AdcQueue(vec![queue_entry(5)])]);
}

#[test]
fn test_declared_chunk_larger_than_buffer() {
    // Real AdcQueue capture cut after two samples while the header announces 39
    let frame = hex_to_bytes(
        "411d8230020027054e003c00a98b4d00d20000004300a30c000000004f003c00a98b4d00d20000004300a50c00000000",
    );
    match decode_payload(&frame[4..]) {
        Err(KMError::TruncatedFrame {
            offset,
            needed,
            available,
        }) => {
            assert_eq!(offset, 0);
            assert_eq!(needed, 39 * 20);
            assert_eq!(available, 40);
        }
        other => panic!("expected TruncatedFrame, got {:?}", other),
    }
}

#[test]
fn test_truncated_second_chunk() {
    let mut payload = chunk(Attribute::AdcQueue, true, 1, 20, &queue_entry(1).to_bytes());
    payload.extend(chunk(Attribute::AdcQueue, false, 3, 20, &[0u8; 40]));

    assert!(matches!(
        decode_payload(&payload),
        Err(KMError::TruncatedFrame {
            offset: 24,
            needed: 60,
            available: 40
        })
    ));
}

#[test]
fn test_unknown_attribute_keeps_raw_bytes() {
    let body = [1u8, 2, 3, 4, 5, 6, 7, 8];
    let mut payload = chunk(Attribute::PdPacket, true, 0, 8, &body);
    payload.extend(chunk(Attribute::AdcQueue, false, 0, 20, &queue_entry(9).to_bytes()));

    let records = decode_payload(&payload).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(
        records[0],
        PayloadRecord::Unknown {
            attribute: 0x10,
            data: Bytes::copy_from_slice(&body),
        }
    );
    assert_eq!(records[1], PayloadRecord::AdcQueue(vec![queue_entry(9)]));
}

#[test]
fn test_captured_adc_snapshot() {
    let frame = hex_to_bytes(
        "410c82020100000be08d4d001e000000218e4d00eaffffff278e4d00480000001c0c9502737e000001007b7e0080a40c00000000",
    );
    let records = decode_payload(&frame[4..]).unwrap();
    let snapshot = match records.as_slice() {
        [PayloadRecord::Adc(snapshot)] => *snapshot,
        other => panic!("expected one ADC record, got {:?}", other),
    };

    assert_eq!(snapshot.vbus_uv, 5_082_592);
    assert_eq!(snapshot.ibus_ua, 30);
    assert_eq!(snapshot.vbus_avg_uv, 5_082_657);
    assert_eq!(snapshot.ibus_avg_ua, -22);
    assert_eq!(snapshot.temp_raw, 0x0C1C);
    assert_eq!(snapshot.temperature_c(), 24.21875);
    assert_eq!(snapshot.sample_rate, SampleRate::Sps2);
    assert!((snapshot.vbus_v() - 5.0826).abs() < 0.0001);
}

#[test]
fn test_adc_snapshot_temperature_vector() {
    let snapshot = AdcSnapshot {
        vbus_uv: 0,
        ibus_ua: 0,
        vbus_avg_uv: 0,
        ibus_avg_ua: 0,
        vbus_ori_avg_uv: 0,
        ibus_ori_avg_ua: 0,
        temp_raw: 0x1234,
        vcc1_tenth_mv: 0,
        vcc2_tenth_mv: 0,
        vdp_mv: 0,
        vdm_mv: 0,
        vdd_mv: 3300,
        sample_rate: SampleRate::Sps1000,
    };
    let decoded = AdcSnapshot::decode(&snapshot.to_bytes()).unwrap();
    assert_eq!(decoded, snapshot);
    assert_eq!(decoded.temperature_c(), 36.40625);
}

#[test]
fn test_adc_chunk_smaller_than_record() {
    let payload = chunk(Attribute::Adc, false, 0, 32, &[0u8; 32]);
    assert!(matches!(
        decode_payload(&payload),
        Err(KMError::TruncatedRecord { expected: 40, actual: 32 })
    ));
}
