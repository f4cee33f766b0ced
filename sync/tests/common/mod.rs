//! Scripted WebSocket server for channel integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

/// How long a test waits for an expected frame or connection.
pub const WAIT: Duration = Duration::from_secs(5);

/// A local WebSocket server that hands each accepted connection to the test.
pub struct TestServer {
    /// Base URL for `ChannelConfig`.
    pub base_url: String,
    sessions: mpsc::UnboundedReceiver<ServerSession>,
    open: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

/// One accepted client connection.
pub struct ServerSession {
    /// Request path and query.
    pub uri: String,
    outgoing: Option<mpsc::UnboundedSender<Message>>,
    incoming: mpsc::UnboundedReceiver<String>,
}

impl TestServer {
    /// Binds to an ephemeral port and starts accepting.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let (session_tx, sessions) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (open_count, peak_count) = (Arc::clone(&open), Arc::clone(&peak));

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let uri = Arc::new(Mutex::new(String::new()));
                let captured = Arc::clone(&uri);
                let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    *captured.lock().expect("lock") = req.uri().to_string();
                    Ok(resp)
                };

                let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                    continue;
                };
                let now = open_count.fetch_add(1, Ordering::SeqCst) + 1;
                peak_count.fetch_max(now, Ordering::SeqCst);
                let still_open = Arc::clone(&open_count);

                let (mut sink, mut source) = ws.split();
                let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
                let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();

                tokio::spawn(async move {
                    while let Some(message) = out_rx.recv().await {
                        if sink.send(message).await.is_err() {
                            return;
                        }
                    }
                    let _ = sink.send(Message::Close(None)).await;
                });

                tokio::spawn(async move {
                    while let Some(Ok(frame)) = source.next().await {
                        match frame {
                            Message::Text(text) => {
                                let _ = in_tx.send(text.as_str().to_string());
                            }
                            Message::Close(_) => break,
                            _ => {}
                        }
                    }
                    still_open.fetch_sub(1, Ordering::SeqCst);
                    drop(in_tx);
                    // Keep reading so the close reply is flushed.
                    while let Some(Ok(_)) = source.next().await {}
                });

                let uri = uri.lock().expect("lock").clone();
                let session = ServerSession {
                    uri,
                    outgoing: Some(out_tx),
                    incoming: in_rx,
                };
                if session_tx.send(session).is_err() {
                    break;
                }
            }
        });

        Self {
            base_url: format!("ws://{}", addr),
            sessions,
            open,
            peak,
        }
    }

    /// Waits for the next client connection.
    pub async fn next_session(&mut self) -> ServerSession {
        tokio::time::timeout(WAIT, self.sessions.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("server stopped")
    }

    /// Returns the number of connections currently open.
    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Returns the most connections that were ever open at once.
    pub fn peak_connections(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Returns a session if one arrives within `within`.
    pub async fn try_next_session(&mut self, within: Duration) -> Option<ServerSession> {
        tokio::time::timeout(within, self.sessions.recv())
            .await
            .ok()
            .flatten()
    }
}

impl ServerSession {
    /// Pushes a text frame to the client.
    pub fn send_text(&self, text: &str) {
        if let Some(ref tx) = self.outgoing {
            tx.send(Message::Text(text.to_string().into())).expect("session writer");
        }
    }

    /// Waits for the next text frame from the client.
    pub async fn recv_text(&mut self) -> Option<String> {
        tokio::time::timeout(WAIT, self.incoming.recv())
            .await
            .expect("timed out waiting for a frame")
    }

    /// Waits for the next frame whose `type` is not `ping`.
    pub async fn recv_non_ping(&mut self) -> Option<String> {
        loop {
            let text = self.recv_text().await?;
            if !text.contains(r#""type":"ping""#) {
                return Some(text);
            }
        }
    }

    /// Closes the connection from the server side.
    pub fn close(&mut self) {
        self.outgoing = None;
    }
}
