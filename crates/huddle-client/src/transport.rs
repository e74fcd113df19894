//! WebSocket transport for the client.
//!
//! Provides [`ConnectedClient`], which moves text frames between channels and
//! a WebSocket. Protocol logic stays in the sans-IO [`crate::Client`]; this
//! layer only reports [`TransportEvent`]s.

use futures_util::{SinkExt, StreamExt};
use huddle_core::SessionToken;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        self, Message,
        client::IntoClientRequest,
        http::{HeaderValue, StatusCode, header::AUTHORIZATION},
    },
};

use crate::event::TransportEvent;

/// Frames buffered in each direction.
const CHANNEL_CAPACITY: usize = 64;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Server refused the credential.
    #[error("handshake rejected: {0}")]
    Rejected(String),

    /// Connection could not be established.
    #[error("connection failed: {0}")]
    Connection(String),
}

impl TransportError {
    /// Event to feed back into the client.
    pub fn into_event(self) -> TransportEvent {
        match self {
            Self::Rejected(reason) => TransportEvent::Rejected { reason },
            Self::Connection(reason) => TransportEvent::Closed { reason },
        }
    }
}

/// Handle to an open WebSocket.
///
/// Text frames are written through `to_server`; inbound frames and the final
/// close arrive on `from_server` as [`TransportEvent`]s.
pub struct ConnectedClient {
    /// Send text frames to the server.
    pub to_server: mpsc::Sender<String>,
    /// Receive frames and the close notification.
    pub from_server: mpsc::Receiver<TransportEvent>,
    /// Abort handle to stop the connection task.
    abort_handle: tokio::task::AbortHandle,
}

impl ConnectedClient {
    /// Stop the connection.
    pub fn stop(&self) {
        self.abort_handle.abort();
    }
}

impl Drop for ConnectedClient {
    fn drop(&mut self) {
        self.abort_handle.abort();
    }
}

/// Connect to a relay at `url`, authenticating with `token`.
///
/// HTTP 401 or 403 on the upgrade is reported as
/// [`TransportError::Rejected`].
pub async fn connect(url: &str, token: &SessionToken) -> Result<ConnectedClient, TransportError> {
    let mut request = url
        .into_client_request()
        .map_err(|e| TransportError::Connection(format!("invalid url: {e}")))?;
    let bearer = HeaderValue::from_str(&format!("Bearer {}", token.expose()))
        .map_err(|e| TransportError::Rejected(format!("token not sendable: {e}")))?;
    request.headers_mut().insert(AUTHORIZATION, bearer);

    let (socket, _response) = connect_async(request).await.map_err(classify)?;
    tracing::info!(%url, "websocket open");

    let (to_server_tx, to_server_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);
    let (from_server_tx, from_server_rx) = mpsc::channel::<TransportEvent>(CHANNEL_CAPACITY);

    let handle = tokio::spawn(run_connection(socket, to_server_rx, from_server_tx));

    Ok(ConnectedClient {
        to_server: to_server_tx,
        from_server: from_server_rx,
        abort_handle: handle.abort_handle(),
    })
}

fn classify(err: tungstenite::Error) -> TransportError {
    match err {
        tungstenite::Error::Http(response)
            if matches!(response.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) =>
        {
            TransportError::Rejected(response.status().to_string())
        },
        other => TransportError::Connection(other.to_string()),
    }
}

/// Bridge between the channels and the socket until either side closes.
async fn run_connection<S>(
    socket: S,
    mut to_server: mpsc::Receiver<String>,
    from_server: mpsc::Sender<TransportEvent>,
) where
    S: futures_util::Stream<Item = Result<Message, tungstenite::Error>>
        + futures_util::Sink<Message, Error = tungstenite::Error>
        + Send
        + 'static,
{
    let (mut sink, mut stream) = socket.split();

    let reader_tx = from_server.clone();
    let reader = tokio::spawn(async move {
        let reason = loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    if reader_tx.send(TransportEvent::Frame(text)).await.is_err() {
                        break "client dropped".to_owned();
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    break frame.map_or_else(|| "closed".to_owned(), |f| f.reason.into_owned());
                },
                Some(Ok(_)) => {},
                Some(Err(e)) => break e.to_string(),
                None => break "stream ended".to_owned(),
            }
        };
        tracing::info!(%reason, "websocket closed");
        let _ = reader_tx.send(TransportEvent::Closed { reason }).await;
    });

    while let Some(text) = to_server.recv().await {
        if let Err(e) = sink.send(Message::Text(text)).await {
            tracing::warn!(error = %e, "websocket write failed");
            break;
        }
    }

    let _ = sink.close().await;
    // Let the reader deliver the close event before the task ends.
    let _ = reader.await;
}
