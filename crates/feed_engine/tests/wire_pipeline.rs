mod support;

use chrono::{TimeZone, Utc};
use feed_core::{
    update, AppState, FeedEvent, Identity, InboundEvent, Msg, Settings, SortType, Tier,
};
use feed_engine::{decode_frame, encode_request, OutboundRequest, WireError};
use pretty_assertions::assert_eq;
use serde_json::Value;
use support::init_logging;

fn feed(state: AppState, frame: &str, secs: i64) -> AppState {
    let event = decode_frame(frame).unwrap();
    let received_at = Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap();
    let (state, _) = update(state, Msg::Feed(InboundEvent::new(event, received_at)));
    state
}

fn settings() -> Settings {
    Settings {
        identity: "client-1".to_string(),
        region_code: Some("com".to_string()),
        sort_type: SortType::PriceDesc,
        ..Settings::default()
    }
}

#[test]
fn empty_etv_strings_stay_unknown_until_a_value_arrives() {
    init_logging();
    let state = AppState::new(settings());

    let state = feed(
        state,
        r#"{"event":"newItem","data":{"id":"A1","title":"Lamp","etvMin":"","etvMax":""}}"#,
        0,
    );
    let record = state.catalog().get("A1").unwrap();
    assert_eq!(record.estimated_value_min, None);
    assert_eq!(record.estimated_value_max, None);

    let state = feed(state, r#"{"event":"newETV","data":{"id":"A1","etv":5}}"#, 1);
    let record = state.catalog().get("A1").unwrap();
    assert_eq!(record.estimated_value_min, Some(5.0));
    assert_eq!(record.estimated_value_max, Some(5.0));
}

#[test]
fn unknown_price_sinks_below_free_listings() {
    init_logging();
    let state = AppState::new(settings());
    let state = feed(
        state,
        r#"{"event":"newItem","data":{"id":"unknown","etvMin":null}}"#,
        0,
    );
    let state = feed(
        state,
        r#"{"event":"newItem","data":{"id":"free","etvMin":"0","etvMax":"0"}}"#,
        1,
    );
    let state = feed(
        state,
        r#"{"event":"newItem","data":{"id":"pricey","etvMin":"49.99","etvMax":"60"}}"#,
        2,
    );

    assert_eq!(
        state.catalog().sorted_ids(),
        ["pricey".to_string(), "free".to_string(), "unknown".to_string()]
    );
}

#[test]
fn decodes_every_inbound_event_name() {
    assert!(matches!(
        decode_frame(r#"{"event":"last100Item","data":{"id":"B1","tier":"Gold"}}"#),
        Ok(FeedEvent::BulkSnapshotItem { ref id, ref fields }) if id == "B1" && fields.tier == Some(Tier::Gold)
    ));
    assert_eq!(
        decode_frame(r#"{"event":"last100Complete"}"#).unwrap(),
        FeedEvent::BulkSnapshotEnd
    );
    assert_eq!(
        decode_frame(r#"{"event":"newTier","data":{"id":"B1","tier":"silver"}}"#).unwrap(),
        FeedEvent::TierUpdate {
            id: "B1".to_string(),
            tier: Tier::Silver
        }
    );
    match decode_frame(
        r#"{"event":"newVariants","data":{"id":"B1","variants":[{"id":"v1","title":"Red"},{"id":"v2"}]}}"#,
    )
    .unwrap()
    {
        FeedEvent::VariantUpdate { id, variants } => {
            assert_eq!(id, "B1");
            assert_eq!(variants.len(), 2);
            assert_eq!(variants[0].label.as_deref(), Some("Red"));
            assert_eq!(variants[1].label, None);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(
        decode_frame(r#"{"event":"unavailableItem","data":{"id":"B1","reason":""}}"#).unwrap(),
        FeedEvent::Unavailable {
            id: "B1".to_string(),
            reason: None
        }
    );
    assert_eq!(
        decode_frame(r#"{"event":"reloadPage","data":{"queue":"potluck","page":2}}"#).unwrap(),
        FeedEvent::ReloadRequest {
            queue_class: Some("potluck".to_string()),
            page: Some(2)
        }
    );
    assert_eq!(
        decode_frame(r#"{"event":"connectionError","data":"banned"}"#).unwrap(),
        FeedEvent::ConnectionError {
            message: "banned".to_string()
        }
    );
}

#[test]
fn malformed_frames_are_errors() {
    assert!(matches!(
        decode_frame(r#"{"event":"sparkle","data":{}}"#),
        Err(WireError::UnknownEvent(name)) if name == "sparkle"
    ));
    assert!(matches!(
        decode_frame(r#"{"event":"newETV","data":{"id":"A1","etv":""}}"#),
        Err(WireError::MissingField("etv"))
    ));
    assert!(matches!(decode_frame("{not json"), Err(WireError::Json(_))));
}

#[test]
fn outbound_requests_carry_identity_and_region() {
    let identity = Identity {
        identity: "client-1".to_string(),
        region_code: Some("com".to_string()),
    };
    let frame = encode_request(&OutboundRequest::ReloadEligibility { identity }).unwrap();
    let value: Value = serde_json::from_str(&frame).unwrap();

    assert_eq!(value["event"], "reloadRequest");
    assert_eq!(value["data"]["uuid"], "client-1");
    assert_eq!(value["data"]["countryCode"], "com");
}
