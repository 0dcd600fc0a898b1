//! Item feed engine: transport, connection lifecycle, reload timers and fan-out.
mod connection;
mod engine;
mod fanout;
mod scheduler;
mod transport;
mod types;
mod wire;
mod ws;

pub use connection::{connect_url, ConnectAttempt, ConnectError, ConnectionManager};
pub use engine::{EngineHandle, EngineReloadLink, EngineSettings};
pub use fanout::{ChannelSurface, FanOut, LogNotifier, LogSurface, Notifier, SharedFanOut, Surface};
pub use scheduler::{
    Clock, FireOutcome, ReloadLink, ReloadScheduler, SchedulerState, SurfaceOracle, SystemClock,
};
pub use transport::{
    AttemptId, Dialer, FrameChannel, SocketTransport, Transport, TransportError, TransportEvent,
    TransportEventKind, TransportSink,
};
pub use types::{EngineEvent, OutboundRequest, SharedConnectionState};
pub use wire::{decode_frame, encode_request, WireError};
pub use ws::WsDialer;
