use std::io;
use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use feed_core::{ConnectionState, Identity};
use feed_logging::{feed_debug, feed_info, feed_warn};
use url::Url;

use crate::{
    ConnectionManager, Dialer, EngineEvent, OutboundRequest, ReloadLink, SharedConnectionState,
    SocketTransport, TransportEvent, TransportSink, WsDialer,
};

const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(12);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub endpoint: Url,
    pub app_version: String,
    pub dial_timeout: Duration,
}

impl EngineSettings {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
        }
    }
}

enum EngineCommand {
    Connect(Identity),
    Send(OutboundRequest),
    Disconnect,
    Shutdown,
}

enum Inbox {
    Command(EngineCommand),
    Transport(TransportEvent),
}

struct InboxSink(mpsc::Sender<Inbox>);

impl TransportSink for InboxSink {
    fn emit(&self, event: TransportEvent) {
        let _ = self.0.send(Inbox::Transport(event));
    }
}

/// Owns the connection on a dedicated thread with its own tokio runtime.
///
/// Commands and transport callbacks share one inbox, so the connection
/// manager sees them strictly in arrival order.
#[derive(Clone)]
pub struct EngineHandle {
    inbox_tx: mpsc::Sender<Inbox>,
    event_rx: Arc<Mutex<mpsc::Receiver<EngineEvent>>>,
    state: SharedConnectionState,
}

impl EngineHandle {
    pub fn new(settings: EngineSettings) -> io::Result<Self> {
        Self::with_dialer(settings, WsDialer)
    }

    pub fn with_dialer<D: Dialer + 'static>(
        settings: EngineSettings,
        dialer: D,
    ) -> io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("feed-io")
            .enable_all()
            .build()?;
        let (inbox_tx, inbox_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let state = SharedConnectionState::default();
        let sink: Arc<dyn TransportSink> = Arc::new(InboxSink(inbox_tx.clone()));

        let transport = SocketTransport::new(
            Arc::new(dialer),
            runtime.handle().clone(),
            sink,
            settings.dial_timeout,
        );
        let manager = ConnectionManager::with_state(
            transport,
            settings.endpoint,
            settings.app_version,
            state.clone(),
        );

        thread::Builder::new()
            .name("feed-engine".to_string())
            .spawn(move || {
                run_engine(manager, inbox_rx, event_tx);
                runtime.shutdown_timeout(Duration::from_secs(1));
                feed_info!("Engine stopped");
            })?;

        Ok(Self {
            inbox_tx,
            event_rx: Arc::new(Mutex::new(event_rx)),
            state,
        })
    }

    pub fn connect(&self, identity: Identity) {
        self.command(EngineCommand::Connect(identity));
    }

    pub fn send(&self, request: OutboundRequest) {
        self.command(EngineCommand::Send(request));
    }

    pub fn disconnect(&self) {
        self.command(EngineCommand::Disconnect);
    }

    pub fn shutdown(&self) {
        self.command(EngineCommand::Shutdown);
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.receiver().try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<EngineEvent> {
        self.receiver().recv_timeout(timeout).ok()
    }

    fn receiver(&self) -> std::sync::MutexGuard<'_, mpsc::Receiver<EngineEvent>> {
        self.event_rx.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn command(&self, command: EngineCommand) {
        if self.inbox_tx.send(Inbox::Command(command)).is_err() {
            feed_warn!("Engine thread is gone, command dropped");
        }
    }
}

fn run_engine<D: Dialer + 'static>(
    mut manager: ConnectionManager<SocketTransport<D>>,
    inbox_rx: mpsc::Receiver<Inbox>,
    event_tx: mpsc::Sender<EngineEvent>,
) {
    while let Ok(message) = inbox_rx.recv() {
        let events = match message {
            Inbox::Command(EngineCommand::Connect(identity)) => match manager.connect(&identity) {
                Ok(attempt) => {
                    feed_debug!("Connect: {:?}", attempt);
                    Vec::new()
                }
                Err(err) => {
                    feed_warn!("Connect rejected: {}", err);
                    vec![EngineEvent::ConnectRejected {
                        reason: err.to_string(),
                    }]
                }
            },
            Inbox::Command(EngineCommand::Send(request)) => {
                if let Err(err) = manager.send(&request) {
                    feed_warn!("Dropping {} request: {}", request.kind(), err);
                }
                Vec::new()
            }
            Inbox::Command(EngineCommand::Disconnect) => manager.disconnect(),
            Inbox::Command(EngineCommand::Shutdown) => {
                manager.disconnect();
                return;
            }
            Inbox::Transport(event) => manager.handle_transport_event(event, Utc::now()),
        };
        for event in events {
            if event_tx.send(event).is_err() {
                return;
            }
        }
    }
}

/// `ReloadLink` backed by the engine, with the identity fixed at startup.
#[derive(Clone)]
pub struct EngineReloadLink {
    engine: EngineHandle,
    identity: Identity,
}

impl EngineReloadLink {
    pub fn new(engine: EngineHandle, identity: Identity) -> Self {
        Self { engine, identity }
    }
}

impl ReloadLink for EngineReloadLink {
    fn is_connected(&self) -> bool {
        self.engine.connection_state() == ConnectionState::Connected
    }

    fn request_reload_eligibility(&self) {
        self.engine.send(OutboundRequest::ReloadEligibility {
            identity: self.identity.clone(),
        });
    }
}
