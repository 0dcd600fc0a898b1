#![allow(dead_code)]

use std::sync::{mpsc, Once};

use feed_engine::{Dialer, FrameChannel, TransportError};
use tokio::sync::mpsc as tokio_mpsc;
use url::Url;

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(feed_logging::initialize_for_tests);
}

/// Server end of one in-memory connection.
pub struct ServerSide {
    pub url: Url,
    pub from_client: tokio_mpsc::UnboundedReceiver<String>,
    pub to_client: tokio_mpsc::UnboundedSender<Result<String, TransportError>>,
}

/// Hands every dialed connection to the test through a channel.
pub struct MemoryDialer {
    servers: mpsc::Sender<ServerSide>,
    refuse: bool,
}

impl MemoryDialer {
    pub fn new() -> (Self, mpsc::Receiver<ServerSide>) {
        let (servers, accepted) = mpsc::channel();
        (
            Self {
                servers,
                refuse: false,
            },
            accepted,
        )
    }

    pub fn refusing() -> Self {
        let (servers, _) = mpsc::channel();
        Self {
            servers,
            refuse: true,
        }
    }
}

#[async_trait::async_trait]
impl Dialer for MemoryDialer {
    async fn dial(&self, url: &Url) -> Result<FrameChannel, TransportError> {
        if self.refuse {
            return Err(TransportError::Dial("connection refused".to_string()));
        }
        let (outgoing, from_client) = tokio_mpsc::unbounded_channel();
        let (to_client, incoming) = tokio_mpsc::unbounded_channel();
        self.servers
            .send(ServerSide {
                url: url.clone(),
                from_client,
                to_client,
            })
            .map_err(|_| TransportError::Closed)?;
        Ok(FrameChannel { outgoing, incoming })
    }
}
