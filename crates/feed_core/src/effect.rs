use crate::{ListingId, ListingRecord, PauseReason, Tier, Variant};

/// Who the client is when talking to the feed server.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Identity {
    pub identity: String,
    pub region_code: Option<String>,
}

/// OS notification payload, built from the catalog's view of a new listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: ListingId,
    pub title: Option<String>,
    pub estimated_value_min: Option<f64>,
    pub estimated_value_max: Option<f64>,
    pub image_ref: Option<String>,
}

impl From<&ListingRecord> for Notification {
    fn from(record: &ListingRecord) -> Self {
        Self {
            id: record.id.clone(),
            title: record.title.clone(),
            estimated_value_min: record.estimated_value_min,
            estimated_value_max: record.estimated_value_max,
            image_ref: record.image_ref.clone(),
        }
    }
}

/// Events delivered to every display surface.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    ConnectionOpen,
    ConnectionClosed {
        reason: String,
    },
    ConnectionError {
        message: String,
    },
    ItemAdded {
        record: ListingRecord,
        position: usize,
        created: bool,
        duplicate_image: bool,
    },
    /// Whole catalog after a resync batch was applied, in sorted order.
    SnapshotLoaded {
        records: Vec<ListingRecord>,
    },
    ValueChanged {
        id: ListingId,
        min: Option<f64>,
        max: Option<f64>,
        position: usize,
    },
    TierChanged {
        id: ListingId,
        tier: Tier,
        position: usize,
    },
    VariantsChanged {
        id: ListingId,
        variants: Vec<Variant>,
    },
    ItemUnavailable {
        id: ListingId,
        reason: Option<String>,
    },
    ItemEvicted {
        id: ListingId,
    },
    Reordered {
        ids: Vec<ListingId>,
    },
    ReloadSurface {
        queue_class: Option<String>,
        page: Option<u32>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Connect(Identity),
    Disconnect,
    RequestBulkSnapshot { identity: Identity, limit: u32 },
    /// Start the external watchdog that ends an unanswered resync.
    ArmResyncWatchdog,
    Broadcast(SurfaceEvent),
    Notify(Notification),
    SuspendReload(PauseReason),
}
