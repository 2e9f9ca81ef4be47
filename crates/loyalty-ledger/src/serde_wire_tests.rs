//! Tests for decoding webhook events from their JSON wire form.
//!
//! These pin the exact field names and shapes the event source sends, and
//! check that malformed envelopes never reach the ledger.

use crate::{EntityName, EventBody, EventKind, LedgerEvent, WireError};
use chrono::{TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;

const CUSTOMER: &str = "814e496d-c6d1-49d5-b30b-359b4f83fa48";
const ORDER: &str = "671eac98-7d4d-47fb-bd07-dee2c3a14d11";

fn decode(value: serde_json::Value) -> Result<LedgerEvent, WireError> {
    LedgerEvent::from_json(&value.to_string())
}

// ============================================================================
// Accepted shapes
// ============================================================================

#[test]
fn test_order_placed_decodes_with_offset_time() {
    let event = decode(json!({
        "EventTime": "2023-11-16T12:24:45+01:00",
        "EventName": "OrderPlaced",
        "EntityName": "Order",
        "Sequence": 10,
        "Payload": {
            "OrderId": ORDER,
            "CustomerId": CUSTOMER,
            "TotalOrderAmount": 50
        }
    }))
    .unwrap();

    assert_eq!(event.kind(), EventKind::OrderPlaced);
    assert_eq!(event.sequence, 10);
    // Offsets are normalised to UTC
    assert_eq!(
        event.event_time,
        Utc.with_ymd_and_hms(2023, 11, 16, 11, 24, 45).unwrap()
    );

    let EventBody::OrderPlaced(payload) = event.body else {
        panic!("expected OrderPlaced body");
    };
    assert_eq!(payload.customer_id, Uuid::parse_str(CUSTOMER).unwrap());
    assert_eq!(payload.order_id, Uuid::parse_str(ORDER).unwrap());
    assert_eq!(payload.total_order_amount, 50);
}

#[test]
fn test_customer_events_decode() {
    for name in ["CustomerCreated", "CustomerDeleted"] {
        let event = decode(json!({
            "EventTime": "2023-11-13T21:03:10Z",
            "EventName": name,
            "EntityName": "Customer",
            "Sequence": 1,
            "Payload": { "CustomerId": CUSTOMER }
        }))
        .unwrap();

        assert_eq!(event.kind().as_str(), name);
        assert_eq!(event.kind().entity(), EntityName::Customer);
    }
}

#[test]
fn test_cancel_and_return_share_payload_shape() {
    let canceled = decode(json!({
        "EventTime": "2023-11-14T09:57:52+01:00",
        "EventName": "OrderCanceled",
        "EntityName": "Order",
        "Sequence": 2,
        "Payload": { "OrderId": ORDER }
    }))
    .unwrap();
    let returned = decode(json!({
        "EventTime": "2023-11-14T09:57:52+01:00",
        "EventName": "OrderReturned",
        "EntityName": "Order",
        "Sequence": 2,
        "Payload": { "OrderId": ORDER }
    }))
    .unwrap();

    match (canceled.body, returned.body) {
        (EventBody::OrderCanceled(a), EventBody::OrderReturned(b)) => assert_eq!(a, b),
        other => panic!("unexpected bodies: {other:?}"),
    }
}

#[test]
fn test_negative_amount_is_left_for_the_ledger() {
    let event = decode(json!({
        "EventTime": "2023-11-16T12:24:45Z",
        "EventName": "OrderPlaced",
        "EntityName": "Order",
        "Sequence": 3,
        "Payload": {
            "OrderId": ORDER,
            "CustomerId": CUSTOMER,
            "TotalOrderAmount": -5
        }
    }))
    .unwrap();

    assert!(matches!(
        event.body,
        EventBody::OrderPlaced(ref p) if p.total_order_amount == -5
    ));
}

#[test]
fn test_serde_deserialize_matches_from_json() {
    let value = json!({
        "EventTime": "2023-11-13T21:03:10Z",
        "EventName": "CustomerDeleted",
        "EntityName": "Customer",
        "Sequence": 4,
        "Payload": { "CustomerId": CUSTOMER }
    });

    let via_serde: LedgerEvent = serde_json::from_value(value.clone()).unwrap();
    assert_eq!(via_serde, decode(value).unwrap());
}

// ============================================================================
// Rejected shapes
// ============================================================================

#[test]
fn test_zero_sequence_is_rejected() {
    let err = decode(json!({
        "EventTime": "2023-11-13T21:03:10Z",
        "EventName": "CustomerDeleted",
        "EntityName": "Customer",
        "Sequence": 0,
        "Payload": { "CustomerId": CUSTOMER }
    }))
    .unwrap_err();

    assert!(matches!(err, WireError::ZeroSequence));
}

#[test]
fn test_negative_sequence_is_malformed() {
    let err = decode(json!({
        "EventTime": "2023-11-13T21:03:10Z",
        "EventName": "CustomerDeleted",
        "EntityName": "Customer",
        "Sequence": -1,
        "Payload": { "CustomerId": CUSTOMER }
    }))
    .unwrap_err();

    assert!(matches!(err, WireError::Json(_)));
}

#[test]
fn test_entity_must_match_event() {
    let err = decode(json!({
        "EventTime": "2023-11-13T21:03:10Z",
        "EventName": "OrderCanceled",
        "EntityName": "Customer",
        "Sequence": 5,
        "Payload": { "OrderId": ORDER }
    }))
    .unwrap_err();

    assert!(matches!(
        err,
        WireError::EntityMismatch {
            event: EventKind::OrderCanceled,
            expected: EntityName::Order,
            actual: EntityName::Customer,
        }
    ));
}

#[test]
fn test_payload_is_typed_against_event_name() {
    let err = decode(json!({
        "EventTime": "2023-11-16T12:24:45Z",
        "EventName": "OrderPlaced",
        "EntityName": "Order",
        "Sequence": 6,
        "Payload": { "OrderId": ORDER }
    }))
    .unwrap_err();

    assert!(matches!(
        err,
        WireError::Payload {
            event: EventKind::OrderPlaced,
            ..
        }
    ));
}

#[test]
fn test_unknown_event_name_is_rejected() {
    let err = decode(json!({
        "EventTime": "2023-11-16T12:24:45Z",
        "EventName": "OrderShipped",
        "EntityName": "Order",
        "Sequence": 7,
        "Payload": { "OrderId": ORDER }
    }))
    .unwrap_err();

    assert!(matches!(err, WireError::Json(_)));
}
