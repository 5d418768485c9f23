//! Native socket transport using tokio-tungstenite.

use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use super::{Transport, TransportEvent, TransportEvents, TransportHandle};
use crate::error::TransportError;

/// Opens each connection on its own tokio task.
///
/// Must be used from within a tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteTransport;

impl TungsteniteTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for TungsteniteTransport {
    fn open(
        &self,
        url: &Url,
        events: TransportEvents,
    ) -> Result<Box<dyn TransportHandle>, TransportError> {
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(TransportError::Open(format!(
                "unsupported scheme `{}`",
                url.scheme()
            )));
        }

        let (sender, receiver) = unbounded();
        tokio::spawn(run_socket(url.to_string(), receiver, events));
        Ok(Box::new(TungsteniteHandle { sender }))
    }
}

enum Outgoing {
    Text(String),
    Close,
}

struct TungsteniteHandle {
    sender: UnboundedSender<Outgoing>,
}

impl TransportHandle for TungsteniteHandle {
    fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.sender
            .unbounded_send(Outgoing::Text(text))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&self) {
        let _ = self.sender.unbounded_send(Outgoing::Close);
        self.sender.close_channel();
    }
}

/// Drive one socket from handshake to close, reporting through `events`.
async fn run_socket(url: String, mut outgoing: UnboundedReceiver<Outgoing>, events: TransportEvents) {
    let generation = events.generation();

    let ws_stream = match connect_async(url.as_str()).await {
        Ok((ws_stream, _response)) => ws_stream,
        Err(e) => {
            crate::log_warn!(generation, error = %e, "Socket handshake failed");
            events.emit(TransportEvent::Error(e.to_string()));
            events.emit(TransportEvent::abnormal_close(e.to_string()));
            return;
        }
    };

    crate::log_debug!(generation, "Socket handshake complete");
    if !events.emit(TransportEvent::Open) {
        return;
    }

    let (mut write, mut read) = ws_stream.split();

    let close = loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    events.emit(TransportEvent::Message(text.to_string()));
                }
                Some(Ok(Message::Close(frame))) => {
                    crate::log_debug!(generation, ?frame, "Server closed socket");
                    let (code, reason) = frame
                        .map(|f| (Some(u16::from(f.code)), f.reason.to_string()))
                        .unwrap_or((None, String::new()));
                    break TransportEvent::Close { clean: true, code, reason };
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    // Pong is handled automatically by tungstenite
                }
                Some(Ok(_)) => {
                    // Binary frames are not part of the protocol
                }
                Some(Err(e)) => {
                    crate::log_warn!(generation, error = %e, "Socket read error");
                    events.emit(TransportEvent::Error(e.to_string()));
                    break TransportEvent::abnormal_close(e.to_string());
                }
                None => {
                    break TransportEvent::abnormal_close("stream ended without close frame");
                }
            },
            cmd = outgoing.next() => match cmd {
                Some(Outgoing::Text(text)) => {
                    if let Err(e) = write.send(Message::text(text)).await {
                        crate::log_warn!(generation, error = %e, "Socket write failed");
                        events.emit(TransportEvent::Error(e.to_string()));
                        break TransportEvent::abnormal_close(e.to_string());
                    }
                }
                Some(Outgoing::Close) | None => {
                    let _ = write.send(Message::Close(None)).await;
                    break TransportEvent::Close {
                        clean: true,
                        code: Some(1000),
                        reason: String::new(),
                    };
                }
            },
        }
    };

    let _ = write.close().await;
    events.emit(close);
}
