//! Connection lifecycle: `disconnected -> connecting -> connected -> disconnected`.
//!
//! The manager never retries on its own. Reconnection is driven from outside
//! by calling `connect` again, which is a no-op while an attempt is live.

use chrono::{DateTime, Utc};
use feed_core::{ConnectionState, FeedEvent, Identity, InboundEvent};
use feed_logging::{feed_debug, feed_info, feed_warn};
use thiserror::Error;
use url::Url;

use crate::wire::{decode_frame, encode_request};
use crate::{
    AttemptId, EngineEvent, OutboundRequest, SharedConnectionState, Transport, TransportError,
    TransportEvent, TransportEventKind,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("not connected")]
    NotConnected,
    #[error("failed to encode request: {0}")]
    Encode(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectAttempt {
    Started(AttemptId),
    AlreadyActive,
}

/// Subscribe URL: the endpoint with region, identity and app version as query parameters.
pub fn connect_url(endpoint: &Url, identity: &str, region_code: &str, app_version: &str) -> Url {
    let mut url = endpoint.clone();
    url.query_pairs_mut()
        .append_pair("countryCode", region_code)
        .append_pair("uuid", identity)
        .append_pair("app_version", app_version);
    url
}

pub struct ConnectionManager<T> {
    transport: T,
    endpoint: Url,
    app_version: String,
    state: SharedConnectionState,
    attempt: AttemptId,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(transport: T, endpoint: Url, app_version: impl Into<String>) -> Self {
        Self::with_state(
            transport,
            endpoint,
            app_version,
            SharedConnectionState::default(),
        )
    }

    pub fn with_state(
        transport: T,
        endpoint: Url,
        app_version: impl Into<String>,
        state: SharedConnectionState,
    ) -> Self {
        state.set(ConnectionState::Disconnected);
        Self {
            transport,
            endpoint,
            app_version: app_version.into(),
            state,
            attempt: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn shared_state(&self) -> SharedConnectionState {
        self.state.clone()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn connect(&mut self, identity: &Identity) -> Result<ConnectAttempt, ConnectError> {
        if self.state() != ConnectionState::Disconnected {
            feed_debug!("Connect ignored while {:?}", self.state());
            return Ok(ConnectAttempt::AlreadyActive);
        }

        let region_code = identity
            .region_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .ok_or_else(|| {
                ConnectError::InvalidConfiguration("region code is not resolved".to_string())
            })?;
        if identity.identity.trim().is_empty() {
            return Err(ConnectError::InvalidConfiguration(
                "client identity is empty".to_string(),
            ));
        }

        self.attempt += 1;
        let url = connect_url(
            &self.endpoint,
            &identity.identity,
            region_code,
            &self.app_version,
        );
        feed_info!("Connecting to {} (attempt {})", self.endpoint, self.attempt);
        self.state.set(ConnectionState::Connecting);
        self.transport.open(&url, self.attempt);
        Ok(ConnectAttempt::Started(self.attempt))
    }

    pub fn handle_transport_event(
        &mut self,
        event: TransportEvent,
        received_at: DateTime<Utc>,
    ) -> Vec<EngineEvent> {
        if event.attempt != self.attempt {
            feed_debug!(
                "Dropping transport event from stale attempt {} (current {})",
                event.attempt,
                self.attempt
            );
            return Vec::new();
        }

        match event.kind {
            TransportEventKind::Opened => {
                if self.state() != ConnectionState::Connecting {
                    return Vec::new();
                }
                feed_info!("Connected (attempt {})", self.attempt);
                self.state.set(ConnectionState::Connected);
                vec![EngineEvent::Connected]
            }
            TransportEventKind::Frame(text) => match decode_frame(&text) {
                Ok(event) => vec![EngineEvent::Feed(InboundEvent::new(event, received_at))],
                Err(err) => {
                    feed_warn!("Dropping undecodable frame: {}", err);
                    Vec::new()
                }
            },
            TransportEventKind::Closed { reason } => self.drop_connection(reason, received_at, false),
            TransportEventKind::Failed { message } => {
                self.drop_connection(message, received_at, true)
            }
        }
    }

    /// Sends a request over the open connection. Results come back as inbound events.
    pub fn send(&mut self, request: &OutboundRequest) -> Result<(), ConnectError> {
        if self.state() != ConnectionState::Connected {
            return Err(ConnectError::NotConnected);
        }
        let frame = encode_request(request).map_err(|err| ConnectError::Encode(err.to_string()))?;
        self.transport.send(frame)?;
        feed_debug!("Sent {} request", request.kind());
        Ok(())
    }

    pub fn disconnect(&mut self) -> Vec<EngineEvent> {
        if self.state() == ConnectionState::Disconnected {
            return Vec::new();
        }
        self.transport.close();
        // Anything the old socket still reports belongs to a dead attempt.
        self.attempt += 1;
        self.state.set(ConnectionState::Disconnected);
        feed_info!("Disconnected by client");
        vec![EngineEvent::Disconnected {
            reason: "closed by client".to_string(),
        }]
    }

    fn drop_connection(
        &mut self,
        reason: String,
        received_at: DateTime<Utc>,
        is_error: bool,
    ) -> Vec<EngineEvent> {
        if self.state() == ConnectionState::Disconnected {
            return Vec::new();
        }
        self.transport.close();
        self.state.set(ConnectionState::Disconnected);
        feed_warn!("Connection lost: {}", reason);

        let mut events = Vec::with_capacity(2);
        if is_error {
            events.push(EngineEvent::Feed(InboundEvent::new(
                FeedEvent::ConnectionError {
                    message: reason.clone(),
                },
                received_at,
            )));
        }
        events.push(EngineEvent::Disconnected { reason });
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct MockTransport {
        opened: Vec<(String, AttemptId)>,
        sent: Vec<String>,
        closes: usize,
    }

    impl Transport for MockTransport {
        fn open(&mut self, url: &Url, attempt: AttemptId) {
            self.opened.push((url.to_string(), attempt));
        }

        fn send(&mut self, frame: String) -> Result<(), TransportError> {
            self.sent.push(frame);
            Ok(())
        }

        fn close(&mut self) {
            self.closes += 1;
        }
    }

    fn manager() -> ConnectionManager<MockTransport> {
        let endpoint = Url::parse("ws://feed.test/socket").unwrap();
        ConnectionManager::new(MockTransport::default(), endpoint, "1.2.3")
    }

    fn identity() -> Identity {
        Identity {
            identity: "client-1".to_string(),
            region_code: Some("com".to_string()),
        }
    }

    fn event(attempt: AttemptId, kind: TransportEventKind) -> TransportEvent {
        TransportEvent::new(attempt, kind)
    }

    #[test]
    fn connect_while_connecting_opens_once() {
        let mut manager = manager();
        let first = manager.connect(&identity()).unwrap();
        let second = manager.connect(&identity()).unwrap();

        assert_eq!(first, ConnectAttempt::Started(1));
        assert_eq!(second, ConnectAttempt::AlreadyActive);
        assert_eq!(manager.transport().opened.len(), 1);
        assert_eq!(manager.state(), ConnectionState::Connecting);
    }

    #[test]
    fn connect_url_carries_identity_region_and_version() {
        let mut manager = manager();
        manager.connect(&identity()).unwrap();

        let (url, _) = &manager.transport().opened[0];
        assert_eq!(
            url,
            "ws://feed.test/socket?countryCode=com&uuid=client-1&app_version=1.2.3"
        );
    }

    #[test]
    fn missing_region_fails_fast_without_opening() {
        let mut manager = manager();
        let mut identity = identity();
        identity.region_code = None;

        let err = manager.connect(&identity).unwrap_err();

        assert!(matches!(err, ConnectError::InvalidConfiguration(_)));
        assert!(manager.transport().opened.is_empty());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn open_then_frame_then_close() {
        let mut manager = manager();
        manager.connect(&identity()).unwrap();
        let now = Utc::now();

        let opened = manager.handle_transport_event(event(1, TransportEventKind::Opened), now);
        assert_eq!(opened, vec![EngineEvent::Connected]);
        assert_eq!(manager.state(), ConnectionState::Connected);

        let frame = r#"{"event":"last100Complete"}"#.to_string();
        let fed = manager.handle_transport_event(event(1, TransportEventKind::Frame(frame)), now);
        assert_eq!(
            fed,
            vec![EngineEvent::Feed(InboundEvent::new(
                FeedEvent::BulkSnapshotEnd,
                now
            ))]
        );

        let closed = manager.handle_transport_event(
            event(
                1,
                TransportEventKind::Closed {
                    reason: "closed by server".to_string(),
                },
            ),
            now,
        );
        assert_eq!(
            closed,
            vec![EngineEvent::Disconnected {
                reason: "closed by server".to_string()
            }]
        );
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn failure_surfaces_error_then_disconnect() {
        let mut manager = manager();
        manager.connect(&identity()).unwrap();
        let now = Utc::now();

        let events = manager.handle_transport_event(
            event(
                1,
                TransportEventKind::Failed {
                    message: "refused".to_string(),
                },
            ),
            now,
        );

        assert_eq!(
            events,
            vec![
                EngineEvent::Feed(InboundEvent::new(
                    FeedEvent::ConnectionError {
                        message: "refused".to_string()
                    },
                    now
                )),
                EngineEvent::Disconnected {
                    reason: "refused".to_string()
                },
            ]
        );
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn stale_attempt_events_are_ignored() {
        let mut manager = manager();
        manager.connect(&identity()).unwrap();
        manager.disconnect();
        manager.connect(&identity()).unwrap();
        let now = Utc::now();

        let stale = manager.handle_transport_event(event(1, TransportEventKind::Opened), now);

        assert!(stale.is_empty());
        assert_eq!(manager.state(), ConnectionState::Connecting);
    }

    #[test]
    fn undecodable_frames_are_dropped() {
        let mut manager = manager();
        manager.connect(&identity()).unwrap();
        let now = Utc::now();
        manager.handle_transport_event(event(1, TransportEventKind::Opened), now);

        let events = manager.handle_transport_event(
            event(1, TransportEventKind::Frame("not json".to_string())),
            now,
        );

        assert!(events.is_empty());
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[test]
    fn send_requires_an_open_connection() {
        let mut manager = manager();
        let request = OutboundRequest::BulkSnapshot {
            identity: identity(),
            limit: 100,
        };

        assert_eq!(manager.send(&request), Err(ConnectError::NotConnected));

        manager.connect(&identity()).unwrap();
        manager.handle_transport_event(event(1, TransportEventKind::Opened), Utc::now());
        manager.send(&request).unwrap();

        assert_eq!(manager.transport().sent.len(), 1);
        assert!(manager.transport().sent[0].contains("getLast100"));
    }

    #[test]
    fn disconnect_reports_once() {
        let mut manager = manager();
        manager.connect(&identity()).unwrap();

        assert_eq!(manager.disconnect().len(), 1);
        assert!(manager.disconnect().is_empty());
        assert_eq!(manager.transport().closes, 1);
    }
}
