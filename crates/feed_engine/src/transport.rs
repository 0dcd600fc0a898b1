use std::sync::Arc;
use std::time::Duration;

use feed_logging::feed_debug;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Identifies one connection attempt so late events from an old socket can be ignored.
pub type AttemptId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("dial failed: {0}")]
    Dial(String),
    #[error("read failed: {0}")]
    Read(String),
    #[error("connection closed")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    Opened,
    Frame(String),
    Closed { reason: String },
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    pub attempt: AttemptId,
    pub kind: TransportEventKind,
}

impl TransportEvent {
    pub fn new(attempt: AttemptId, kind: TransportEventKind) -> Self {
        Self { attempt, kind }
    }
}

pub trait TransportSink: Send + Sync {
    fn emit(&self, event: TransportEvent);
}

/// Bidirectional text channel with asynchronous open.
///
/// `open` must not block: the outcome is reported through the sink as
/// `Opened`, or `Failed`/`Closed`, tagged with the given attempt.
pub trait Transport: Send {
    fn open(&mut self, url: &Url, attempt: AttemptId);
    fn send(&mut self, frame: String) -> Result<(), TransportError>;
    fn close(&mut self);
}

/// A dialed connection as a pair of text frame channels.
/// The connection ends when `incoming` is exhausted.
pub struct FrameChannel {
    pub outgoing: mpsc::UnboundedSender<String>,
    pub incoming: mpsc::UnboundedReceiver<Result<String, TransportError>>,
}

#[async_trait::async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, url: &Url) -> Result<FrameChannel, TransportError>;
}

struct ActiveSocket {
    outgoing: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
}

/// `Transport` that runs each connection as a task on a tokio runtime.
pub struct SocketTransport<D> {
    dialer: Arc<D>,
    runtime: Handle,
    sink: Arc<dyn TransportSink>,
    dial_timeout: Duration,
    active: Option<ActiveSocket>,
}

impl<D: Dialer + 'static> SocketTransport<D> {
    pub fn new(
        dialer: Arc<D>,
        runtime: Handle,
        sink: Arc<dyn TransportSink>,
        dial_timeout: Duration,
    ) -> Self {
        Self {
            dialer,
            runtime,
            sink,
            dial_timeout,
            active: None,
        }
    }
}

impl<D: Dialer + 'static> Transport for SocketTransport<D> {
    fn open(&mut self, url: &Url, attempt: AttemptId) {
        self.close();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        self.runtime.spawn(run_socket(
            self.dialer.clone(),
            url.clone(),
            attempt,
            outgoing_rx,
            cancel.clone(),
            self.sink.clone(),
            self.dial_timeout,
        ));
        self.active = Some(ActiveSocket {
            outgoing: outgoing_tx,
            cancel,
        });
    }

    fn send(&mut self, frame: String) -> Result<(), TransportError> {
        let active = self.active.as_ref().ok_or(TransportError::Closed)?;
        active
            .outgoing
            .send(frame)
            .map_err(|_| TransportError::Closed)
    }

    fn close(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
        }
    }
}

async fn run_socket<D: Dialer>(
    dialer: Arc<D>,
    url: Url,
    attempt: AttemptId,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
    sink: Arc<dyn TransportSink>,
    dial_timeout: Duration,
) {
    let dialed = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        dialed = tokio::time::timeout(dial_timeout, dialer.dial(&url)) => dialed,
    };
    let mut channel = match dialed {
        Ok(Ok(channel)) => channel,
        Ok(Err(err)) => {
            sink.emit(TransportEvent::new(
                attempt,
                TransportEventKind::Failed {
                    message: err.to_string(),
                },
            ));
            return;
        }
        Err(_) => {
            sink.emit(TransportEvent::new(
                attempt,
                TransportEventKind::Failed {
                    message: format!("dial timed out after {:?}", dial_timeout),
                },
            ));
            return;
        }
    };
    sink.emit(TransportEvent::new(attempt, TransportEventKind::Opened));

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                feed_debug!("Socket for attempt {} closed locally", attempt);
                return;
            }
            frame = outgoing.recv() => match frame {
                Some(frame) => {
                    if channel.outgoing.send(frame).is_err() {
                        sink.emit(TransportEvent::new(
                            attempt,
                            TransportEventKind::Closed { reason: "writer stopped".to_string() },
                        ));
                        return;
                    }
                }
                None => return,
            },
            incoming = channel.incoming.recv() => match incoming {
                Some(Ok(text)) => sink.emit(TransportEvent::new(attempt, TransportEventKind::Frame(text))),
                Some(Err(err)) => {
                    sink.emit(TransportEvent::new(
                        attempt,
                        TransportEventKind::Failed { message: err.to_string() },
                    ));
                    return;
                }
                None => {
                    sink.emit(TransportEvent::new(
                        attempt,
                        TransportEventKind::Closed { reason: "closed by server".to_string() },
                    ));
                    return;
                }
            },
        }
    }
}
