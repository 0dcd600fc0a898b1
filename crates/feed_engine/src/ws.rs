use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::{Dialer, FrameChannel, TransportError};

/// Dials websocket endpoints and pumps text frames through channels.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsDialer;

#[async_trait::async_trait]
impl Dialer for WsDialer {
    async fn dial(&self, url: &Url) -> Result<FrameChannel, TransportError> {
        let (stream, _response) = connect_async(url.as_str())
            .await
            .map_err(|err| TransportError::Dial(err.to_string()))?;
        let (mut write, mut read) = stream.split();
        let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<String>();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(frame) = outgoing_rx.recv().await {
                if write.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            let _ = write.close().await;
        });

        tokio::spawn(async move {
            while let Some(message) = read.next().await {
                let forwarded = match message {
                    Ok(Message::Text(text)) => Ok(text.as_str().to_owned()),
                    Ok(Message::Close(_)) => break,
                    // Control and binary frames carry nothing for the feed.
                    Ok(_) => continue,
                    Err(err) => Err(TransportError::Read(err.to_string())),
                };
                let failed = forwarded.is_err();
                if incoming_tx.send(forwarded).is_err() || failed {
                    break;
                }
            }
        });

        Ok(FrameChannel {
            outgoing: outgoing_tx,
            incoming: incoming_rx,
        })
    }
}
