use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use feed_core::{ConnectionState, Identity, InboundEvent};

/// What the engine reports back to the dispatch loop.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Connected,
    Disconnected { reason: String },
    ConnectRejected { reason: String },
    Feed(InboundEvent),
}

/// Fire-and-forget requests sent over an open connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundRequest {
    BulkSnapshot { identity: Identity, limit: u32 },
    ReloadEligibility { identity: Identity },
}

impl OutboundRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundRequest::BulkSnapshot { .. } => "bulkSnapshot",
            OutboundRequest::ReloadEligibility { .. } => "reloadEligibility",
        }
    }
}

/// Connection state readable from other threads; written only by the connection manager.
#[derive(Debug, Clone, Default)]
pub struct SharedConnectionState(Arc<AtomicU8>);

impl SharedConnectionState {
    pub fn get(&self) -> ConnectionState {
        match self.0.load(Ordering::Acquire) {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }

    pub(crate) fn set(&self, state: ConnectionState) {
        let raw = match state {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
        };
        self.0.store(raw, Ordering::Release);
    }
}
