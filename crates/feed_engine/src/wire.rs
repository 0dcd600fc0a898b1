//! JSON text frames: `{"event": <name>, "data": {...}}`.
//!
//! Every quirk of the wire format (lenient numbers, empty strings, date
//! flavours) is resolved here so the core only sees typed optionals.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use feed_core::{FeedEvent, ListingFields, Tier, Variant};
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use thiserror::Error;

use crate::OutboundRequest;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown event {0:?}")]
    UnknownEvent(String),
    #[error("missing field {0}")]
    MissingField(&'static str),
}

#[derive(Deserialize)]
struct Frame {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemPayload {
    id: String,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    date_added: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "non_empty_string")]
    title: Option<String>,
    #[serde(default, deserialize_with = "non_empty_string")]
    image_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    etv_min: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    etv_max: Option<f64>,
    #[serde(default, deserialize_with = "non_empty_string")]
    reason: Option<String>,
    #[serde(default, deserialize_with = "non_empty_string")]
    queue: Option<String>,
    #[serde(default, deserialize_with = "lenient_tier")]
    tier: Option<Tier>,
    #[serde(default, deserialize_with = "lenient_bool")]
    is_parent_listing: Option<bool>,
    #[serde(default, deserialize_with = "lenient_bool")]
    is_pre_release: Option<bool>,
    #[serde(default, deserialize_with = "non_empty_string")]
    enrollment_id: Option<String>,
}

impl ItemPayload {
    fn into_parts(self) -> (String, ListingFields) {
        let fields = ListingFields {
            title: self.title,
            sortable_date: self.date,
            date_added: self.date_added,
            image_ref: self.image_url,
            estimated_value_min: self.etv_min,
            estimated_value_max: self.etv_max,
            reason: self.reason,
            queue_class: self.queue,
            tier: self.tier,
            is_parent_listing: self.is_parent_listing,
            is_pre_release: self.is_pre_release,
            enrollment_id: self.enrollment_id,
        };
        (self.id, fields)
    }
}

#[derive(Deserialize)]
struct ValuePayload {
    id: String,
    #[serde(default, deserialize_with = "lenient_number")]
    etv: Option<f64>,
}

#[derive(Deserialize)]
struct TierPayload {
    id: String,
    #[serde(default, deserialize_with = "lenient_tier")]
    tier: Option<Tier>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VariantPayload {
    id: String,
    #[serde(default, deserialize_with = "non_empty_string")]
    title: Option<String>,
    #[serde(default, deserialize_with = "non_empty_string")]
    image_url: Option<String>,
}

#[derive(Deserialize)]
struct VariantsPayload {
    id: String,
    #[serde(default)]
    variants: Vec<VariantPayload>,
}

#[derive(Deserialize)]
struct UnavailablePayload {
    id: String,
    #[serde(default, deserialize_with = "non_empty_string")]
    reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct ReloadPayload {
    #[serde(default, deserialize_with = "non_empty_string")]
    queue: Option<String>,
    #[serde(default)]
    page: Option<u32>,
}

/// Decodes one inbound text frame into the domain vocabulary.
pub fn decode_frame(text: &str) -> Result<FeedEvent, WireError> {
    let frame: Frame = serde_json::from_str(text)?;
    let data = frame.data;
    let event = match frame.event.as_str() {
        "newItem" => {
            let (id, fields) = serde_json::from_value::<ItemPayload>(data)?.into_parts();
            FeedEvent::NewItem { id, fields }
        }
        "last100Item" => {
            let (id, fields) = serde_json::from_value::<ItemPayload>(data)?.into_parts();
            FeedEvent::BulkSnapshotItem { id, fields }
        }
        "last100Complete" => FeedEvent::BulkSnapshotEnd,
        "newETV" => {
            let payload: ValuePayload = serde_json::from_value(data)?;
            let value = payload.etv.ok_or(WireError::MissingField("etv"))?;
            FeedEvent::ValueUpdate {
                id: payload.id,
                value,
            }
        }
        "newTier" => {
            let payload: TierPayload = serde_json::from_value(data)?;
            FeedEvent::TierUpdate {
                id: payload.id,
                tier: payload.tier.unwrap_or_default(),
            }
        }
        "newVariants" => {
            let payload: VariantsPayload = serde_json::from_value(data)?;
            FeedEvent::VariantUpdate {
                id: payload.id,
                variants: payload
                    .variants
                    .into_iter()
                    .map(|variant| Variant {
                        id: variant.id,
                        label: variant.title,
                        image_ref: variant.image_url,
                    })
                    .collect(),
            }
        }
        "unavailableItem" => {
            let payload: UnavailablePayload = serde_json::from_value(data)?;
            FeedEvent::Unavailable {
                id: payload.id,
                reason: payload.reason,
            }
        }
        "reloadPage" => {
            let payload: ReloadPayload = if data.is_null() {
                ReloadPayload::default()
            } else {
                serde_json::from_value(data)?
            };
            FeedEvent::ReloadRequest {
                queue_class: payload.queue,
                page: payload.page,
            }
        }
        "connectionError" => {
            let message = match &data {
                Value::String(message) => message.clone(),
                Value::Object(map) => map
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("connection error")
                    .to_string(),
                _ => "connection error".to_string(),
            };
            FeedEvent::ConnectionError { message }
        }
        other => return Err(WireError::UnknownEvent(other.to_string())),
    };
    Ok(event)
}

/// Encodes an outbound request as a text frame.
pub fn encode_request(request: &OutboundRequest) -> Result<String, WireError> {
    let frame = match request {
        OutboundRequest::BulkSnapshot { identity, limit } => json!({
            "event": "getLast100",
            "data": {
                "uuid": identity.identity,
                "countryCode": identity.region_code,
                "limit": limit,
            },
        }),
        OutboundRequest::ReloadEligibility { identity } => json!({
            "event": "reloadRequest",
            "data": {
                "uuid": identity.identity,
                "countryCode": identity.region_code,
            },
        }),
    };
    Ok(serde_json::to_string(&frame)?)
}

/// Numbers may arrive as numbers, numeric strings, empty strings or null.
/// Empty and non-finite values mean "unknown", never zero.
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(number_from_value))
}

fn number_from_value(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => {
            let text = text.trim();
            if text.is_empty() {
                None
            } else {
                text.parse::<f64>().ok()
            }
        }
        _ => None,
    };
    number.filter(|number| number.is_finite())
}

fn non_empty_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|text| !text.trim().is_empty()))
}

fn lenient_tier<'de, D>(deserializer: D) -> Result<Option<Tier>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(tier_from_value))
}

/// Any string is a tier, unknown ones unset. Other shapes carry no tier.
fn tier_from_value(value: &Value) -> Option<Tier> {
    let Value::String(tier) = value else {
        return None;
    };
    Some(match tier.trim().to_ascii_lowercase().as_str() {
        "gold" => Tier::Gold,
        "silver" => Tier::Silver,
        _ => Tier::Unset,
    })
}

/// Flags may arrive as booleans, 0/1 or their string forms.
fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(bool_from_value))
}

fn bool_from_value(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::Number(number) => number.as_f64().map(|number| number != 0.0),
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC) or epoch milliseconds.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(timestamp_from_value))
}

fn timestamp_from_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        Value::String(text) => {
            let text = text.trim();
            if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
                return Some(parsed.with_timezone(&Utc));
            }
            NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_are_lenient() {
        assert_eq!(number_from_value(&json!(5)), Some(5.0));
        assert_eq!(number_from_value(&json!("12.50")), Some(12.5));
        assert_eq!(number_from_value(&json!("0")), Some(0.0));
        assert_eq!(number_from_value(&json!("")), None);
        assert_eq!(number_from_value(&json!("  ")), None);
        assert_eq!(number_from_value(&json!("NaN")), None);
        assert_eq!(number_from_value(&json!(null)), None);
    }

    #[test]
    fn timestamps_accept_several_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        assert_eq!(
            timestamp_from_value(&json!("2024-05-01T12:30:00Z")),
            Some(expected)
        );
        assert_eq!(
            timestamp_from_value(&json!("2024-05-01 12:30:00")),
            Some(expected)
        );
        assert_eq!(
            timestamp_from_value(&json!(expected.timestamp_millis())),
            Some(expected)
        );
        assert_eq!(timestamp_from_value(&json!("yesterday")), None);
    }

    #[test]
    fn flags_accept_numbers_and_strings() {
        assert_eq!(bool_from_value(&json!(true)), Some(true));
        assert_eq!(bool_from_value(&json!(1)), Some(true));
        assert_eq!(bool_from_value(&json!(0)), Some(false));
        assert_eq!(bool_from_value(&json!("TRUE")), Some(true));
        assert_eq!(bool_from_value(&json!("0")), Some(false));
        assert_eq!(bool_from_value(&json!("maybe")), None);
        assert_eq!(bool_from_value(&json!(null)), None);
    }

    #[test]
    fn tiers_ignore_non_string_shapes() {
        assert_eq!(tier_from_value(&json!("Gold")), Some(Tier::Gold));
        assert_eq!(tier_from_value(&json!("bronze")), Some(Tier::Unset));
        assert_eq!(tier_from_value(&json!(2)), None);
        assert_eq!(tier_from_value(&json!({"name": "gold"})), None);
    }

    #[test]
    fn numeric_flags_and_tier_do_not_drop_the_listing() {
        let event = decode_frame(
            r#"{"event":"newItem","data":{"id":"A1","isParentListing":1,"isPreRelease":"false","tier":2}}"#,
        )
        .unwrap();

        let FeedEvent::NewItem { id, fields } = event else {
            panic!("expected a new item, got {event:?}");
        };
        assert_eq!(id, "A1");
        assert_eq!(fields.is_parent_listing, Some(true));
        assert_eq!(fields.is_pre_release, Some(false));
        assert_eq!(fields.tier, None);
    }
}
