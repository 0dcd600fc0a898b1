use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bulk::ResyncSentinel;

pub type ListingId = String;

/// Reward-eligibility classification of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Unset,
    Silver,
    Gold,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub id: String,
    pub label: Option<String>,
    pub image_ref: Option<String>,
}

/// Partial listing payload. `None` means the field was absent on the wire.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListingFields {
    pub title: Option<String>,
    pub sortable_date: Option<DateTime<Utc>>,
    pub date_added: Option<DateTime<Utc>>,
    pub image_ref: Option<String>,
    pub estimated_value_min: Option<f64>,
    pub estimated_value_max: Option<f64>,
    pub reason: Option<String>,
    pub queue_class: Option<String>,
    pub tier: Option<Tier>,
    pub is_parent_listing: Option<bool>,
    pub is_pre_release: Option<bool>,
    pub enrollment_id: Option<String>,
}

/// Normalized domain vocabulary, independent of the wire format.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    NewItem {
        id: ListingId,
        fields: ListingFields,
    },
    BulkSnapshotItem {
        id: ListingId,
        fields: ListingFields,
    },
    BulkSnapshotEnd,
    ValueUpdate {
        id: ListingId,
        value: f64,
    },
    TierUpdate {
        id: ListingId,
        tier: Tier,
    },
    VariantUpdate {
        id: ListingId,
        variants: Vec<Variant>,
    },
    Unavailable {
        id: ListingId,
        reason: Option<String>,
    },
    ReloadRequest {
        queue_class: Option<String>,
        page: Option<u32>,
    },
    ConnectionError {
        message: String,
    },
}

impl FeedEvent {
    /// Event kind label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            FeedEvent::NewItem { .. } => "newItem",
            FeedEvent::BulkSnapshotItem { .. } => "bulkSnapshotItem",
            FeedEvent::BulkSnapshotEnd => "bulkSnapshotEnd",
            FeedEvent::ValueUpdate { .. } => "valueUpdate",
            FeedEvent::TierUpdate { .. } => "tierUpdate",
            FeedEvent::VariantUpdate { .. } => "variantUpdate",
            FeedEvent::Unavailable { .. } => "unavailable",
            FeedEvent::ReloadRequest { .. } => "reloadRequest",
            FeedEvent::ConnectionError { .. } => "connectionError",
        }
    }
}

/// A feed event stamped with its local arrival time.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub event: FeedEvent,
    pub received_at: DateTime<Utc>,
}

impl InboundEvent {
    pub fn new(event: FeedEvent, received_at: DateTime<Utc>) -> Self {
        Self { event, received_at }
    }
}

impl ResyncSentinel for InboundEvent {
    fn is_resync_end(&self) -> bool {
        matches!(self.event, FeedEvent::BulkSnapshotEnd)
    }
}
