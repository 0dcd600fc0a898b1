//! Item feed core: catalog, resync buffering and the pure dispatch state machine.
mod bulk;
mod catalog;
mod effect;
mod event;
mod msg;
mod reload;
mod settings;
mod state;
mod update;
mod view_model;

pub use bulk::{BulkBuffer, Delivery, ResyncSentinel};
pub use catalog::{
    AddOutcome, BindingOutcome, Catalog, CatalogError, DisplayHandle, DuplicateImageIndex,
    ListingRecord,
};
pub use effect::{Effect, Identity, Notification, SurfaceEvent};
pub use event::{FeedEvent, InboundEvent, ListingFields, ListingId, Tier, Variant};
pub use msg::Msg;
pub use reload::{
    jitter_bounds, parse_hhmm, PauseReason, ReloadWindow, WindowError, MIN_WINDOW_SPAN_MINUTES,
    OUTSIDE_WINDOW_RETRY,
};
pub use settings::{AutoloadSettings, AutoloadWindow, JitterRange, Settings, SortType};
pub use state::{AppState, ConnectionState};
pub use update::update;
pub use view_model::{AppViewModel, ItemRowView};
