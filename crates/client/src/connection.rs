//! Shared-connection plumbing: a duplex of text frames.

use {
    crate::Error,
    async_trait::async_trait,
    futures::{SinkExt, StreamExt},
    tokio::{net::TcpStream, sync::mpsc},
    tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message},
    tracing::{debug, info, warn},
};

/// An open connection as seen by the client: frames to send and frames
/// received.
///
/// The inbound receiver yields `None` once the connection is gone, whatever
/// the reason.
pub struct Duplex {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<String>,
}

impl Duplex {
    /// A connected pair of duplexes, for in-process peers.
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            Self {
                outbound: a_tx,
                inbound: b_rx,
            },
            Self {
                outbound: b_tx,
                inbound: a_rx,
            },
        )
    }
}

/// Opens the shared connection.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<Duplex, Error>;
}

/// Connects to a push gateway over WebSocket.
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<Duplex, Error> {
        info!(url = %self.url, "connecting to gateway");
        let (ws_stream, _response) = connect_async(self.url.as_str()).await?;

        let (outbound, write_rx) = mpsc::unbounded_channel::<String>();
        let (read_tx, inbound) = mpsc::unbounded_channel::<String>();
        let url = self.url.clone();

        tokio::spawn(async move {
            match forward_frames(ws_stream, write_rx, read_tx).await {
                Ok(()) => debug!(url = %url, "connection closed"),
                Err(e) => warn!(url = %url, error = %e, "connection failed"),
            }
        });

        Ok(Duplex { outbound, inbound })
    }
}

/// Pump frames both ways until either side closes.
async fn forward_frames(
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut write_rx: mpsc::UnboundedReceiver<String>,
    read_tx: mpsc::UnboundedSender<String>,
) -> Result<(), Error> {
    let (mut ws_sink, mut ws_reader) = ws_stream.split();

    loop {
        tokio::select! {
            msg = ws_reader.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if read_tx.send(text.to_string()).is_err() {
                            // Nobody reads anymore.
                            let _ = ws_sink.send(Message::Close(None)).await;
                            return Ok(());
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("WebSocket closed by server");
                        return Ok(());
                    },
                    Some(Ok(Message::Ping(data))) => {
                        ws_sink.send(Message::Pong(data)).await?;
                    },
                    Some(Ok(_)) => {},
                    Some(Err(e)) => return Err(Error::WebSocket(e)),
                }
            },
            json = write_rx.recv() => {
                match json {
                    Some(text) => {
                        ws_sink.send(Message::Text(text.into())).await?;
                    },
                    None => {
                        // Client dropped.
                        let _ = ws_sink.send(Message::Close(None)).await;
                        return Ok(());
                    },
                }
            },
        }
    }
}
