use crate::{DisplayHandle, InboundEvent, ListingId, Settings};

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// Transport opened.
    Connected,
    /// Transport closed or failed.
    Disconnected { reason: String },
    /// A connect attempt was refused before reaching the transport.
    ConnectRejected { reason: String },
    /// Normalized inbound feed event.
    Feed(InboundEvent),
    /// A surface asked for a full resync.
    ResyncRequested,
    /// The resync watchdog expired before the sentinel arrived.
    ResyncTimedOut,
    /// The renderer created the element for a listing.
    DisplayBindingReady {
        id: ListingId,
        handle: DisplayHandle,
    },
    /// Retention policy dropped a listing.
    EvictRequested { id: ListingId },
    /// Configuration was re-read.
    SettingsChanged(Settings),
    /// Periodic reconnection alarm.
    ReconnectAlarm,
    /// A surface hit a login, verification or decoy page.
    AutomationChallenge { decoy: bool },
}
