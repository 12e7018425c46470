//! Document store client speaking JSON frames over a WebSocket.
//!
//! Client frames: `subscribe {id, collection, constraints}` and
//! `unsubscribe {id}`. Server frames: `snapshot {id, documents}` carrying the
//! full result set, and `error {id, message}` which terminates that listener.
//! After a reconnect every live listener is subscribed again.

use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use super::{DocumentStore, ListenerRegistration, SnapshotEvent, SnapshotSink};
use crate::config::StoreConfig;
use crate::domain::{CollectionQuery, Constraint, LiveRecord};
use crate::error::{Result, SyncError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const PING_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame<'a> {
    Subscribe {
        id: &'a str,
        collection: &'a str,
        constraints: &'a [Constraint],
    },
    Unsubscribe {
        id: &'a str,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerFrame {
    Snapshot {
        id: String,
        #[serde(default)]
        documents: Vec<LiveRecord>,
    },
    Error {
        id: String,
        message: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug)]
enum Command {
    Subscribe(String),
    Unsubscribe(String),
}

struct ActiveListener {
    query: CollectionQuery,
    sink: SnapshotSink,
}

/// Listener table shared by the store, its registrations and the session loop
#[derive(Default)]
struct Router {
    listeners: DashMap<String, ActiveListener>,
}

impl Router {
    /// Route one server frame. Returns `true` when a listener received data.
    fn handle_text(&self, text: &str) -> bool {
        let frame = match serde_json::from_str::<ServerFrame>(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(
                    "Unparseable store frame ({}): {}",
                    e,
                    text.chars().take(200).collect::<String>()
                );
                return false;
            }
        };

        match frame {
            ServerFrame::Snapshot { id, documents } => {
                // Clone the sink out of the map before invoking it.
                let sink = self.listeners.get(&id).map(|l| Arc::clone(&l.sink));
                match sink {
                    Some(sink) => {
                        debug!("snapshot for {}: {} documents", id, documents.len());
                        sink(SnapshotEvent::Snapshot(Arc::new(documents)));
                        true
                    }
                    None => {
                        debug!("snapshot for unknown listener {}", id);
                        false
                    }
                }
            }
            ServerFrame::Error { id, message } => {
                if let Some((_, listener)) = self.listeners.remove(&id) {
                    warn!(
                        "store terminated listener {} on '{}': {}",
                        id, listener.query.collection, message
                    );
                    (listener.sink)(SnapshotEvent::Error(SyncError::subscription(
                        &listener.query.collection,
                        message,
                    )));
                    true
                } else {
                    false
                }
            }
            ServerFrame::Unknown => false,
        }
    }

    fn subscribe_frame(&self, id: &str) -> Option<String> {
        let listener = self.listeners.get(id)?;
        let frame = ClientFrame::Subscribe {
            id,
            collection: &listener.query.collection,
            constraints: &listener.query.constraints,
        };
        serde_json::to_string(&frame).ok()
    }
}

pub struct WsDocumentStore {
    ws_url: String,
    router: Arc<Router>,
    commands: mpsc::UnboundedSender<Command>,
    connected: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl WsDocumentStore {
    /// Connect once, then keep the session alive in the background.
    ///
    /// The first connection must succeed; later drops reconnect with
    /// linear backoff capped at `max_reconnect_delay_ms`.
    pub async fn connect(cfg: &StoreConfig) -> Result<Arc<Self>> {
        let url = Url::parse(&cfg.ws_url)
            .map_err(|e| SyncError::Validation(format!("Invalid store WebSocket URL: {}", e)))?;

        info!("Connecting to document store: {}", url);
        let stream = open_stream(&url).await?;
        info!("Document store connected");

        let router = Arc::new(Router::default());
        let connected = Arc::new(AtomicBool::new(true));
        let (commands, command_rx) = mpsc::unbounded_channel();

        let session = Session {
            url,
            router: Arc::clone(&router),
            connected: Arc::clone(&connected),
            reconnect_delay: Duration::from_millis(cfg.reconnect_delay_ms),
            max_reconnect_delay: Duration::from_millis(cfg.max_reconnect_delay_ms),
        };
        let task = tokio::spawn(session.run(stream, command_rx));

        Ok(Arc::new(Self {
            ws_url: cfg.ws_url.clone(),
            router,
            commands,
            connected,
            task: Some(task),
        }))
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn listener_count(&self) -> usize {
        self.router.listeners.len()
    }
}

impl Drop for WsDocumentStore {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl DocumentStore for WsDocumentStore {
    fn name(&self) -> &str {
        "websocket"
    }

    fn listen(
        &self,
        query: &CollectionQuery,
        sink: SnapshotSink,
    ) -> Result<Box<dyn ListenerRegistration>> {
        let id = Uuid::new_v4().to_string();
        self.router.listeners.insert(
            id.clone(),
            ActiveListener {
                query: query.clone(),
                sink,
            },
        );

        if self.commands.send(Command::Subscribe(id.clone())).is_err() {
            self.router.listeners.remove(&id);
            return Err(SyncError::WebSocket(
                "document store session has stopped".to_string(),
            ));
        }

        debug!("listener {} opened on {}", id, query.key());
        Ok(Box::new(WsRegistration {
            id,
            router: Arc::clone(&self.router),
            commands: self.commands.clone(),
            removed: false,
        }))
    }
}

struct WsRegistration {
    id: String,
    router: Arc<Router>,
    commands: mpsc::UnboundedSender<Command>,
    removed: bool,
}

impl ListenerRegistration for WsRegistration {
    fn remove(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;
        self.router.listeners.remove(&self.id);
        // Session may already be gone; nothing left to release then.
        let _ = self.commands.send(Command::Unsubscribe(self.id.clone()));
    }
}

struct Session {
    url: Url,
    router: Arc<Router>,
    connected: Arc<AtomicBool>,
    reconnect_delay: Duration,
    max_reconnect_delay: Duration,
}

impl Session {
    async fn run(self, first: WsStream, mut commands: mpsc::UnboundedReceiver<Command>) {
        let mut stream = Some(first);
        let mut attempt: u32 = 0;

        loop {
            let ws = match stream.take() {
                Some(ws) => ws,
                None => match open_stream(&self.url).await {
                    Ok(ws) => {
                        info!("Document store reconnected");
                        ws
                    }
                    Err(e) => {
                        attempt = attempt.saturating_add(1);
                        let delay = (self.reconnect_delay * attempt).min(self.max_reconnect_delay);
                        error!(
                            "Document store connection failed (attempt {}): {}; retrying in {:?}",
                            attempt, e, delay
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                },
            };

            attempt = 0;
            self.connected.store(true, Ordering::SeqCst);
            let outcome = self.serve(ws, &mut commands).await;
            self.connected.store(false, Ordering::SeqCst);

            match outcome {
                Ok(true) => {
                    info!("Document store connection closed, reconnecting...");
                }
                Ok(false) => {
                    info!("Document store client dropped, session ending");
                    return;
                }
                Err(e) => {
                    warn!("Document store session error: {}", e);
                    tokio::time::sleep(self.reconnect_delay).await;
                }
            }
        }
    }

    /// Serve one connection. `Ok(true)` means reconnect, `Ok(false)` means
    /// every command sender is gone.
    async fn serve(
        &self,
        ws: WsStream,
        commands: &mut mpsc::UnboundedReceiver<Command>,
    ) -> Result<bool> {
        let (mut write, mut read) = ws.split();
        let mut sent: HashSet<String> = HashSet::new();

        // Fresh connection: replay every live listener.
        let ids: Vec<String> = self
            .router
            .listeners
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for id in ids {
            if let Some(frame) = self.router.subscribe_frame(&id) {
                write.send(Message::Text(frame)).await?;
                sent.insert(id);
            }
        }
        if !sent.is_empty() {
            info!("Resubscribed {} listeners", sent.len());
        }

        let mut ping_interval = interval(PING_INTERVAL);
        ping_interval.tick().await;

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.router.handle_text(&text);
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) => {
                            info!("Received close frame");
                            return Ok(true);
                        }
                        Some(Err(e)) => {
                            return Err(e.into());
                        }
                        None => {
                            return Ok(true);
                        }
                        _ => {}
                    }
                }
                command = commands.recv() => {
                    match command {
                        Some(Command::Subscribe(id)) => {
                            if sent.contains(&id) {
                                continue;
                            }
                            if let Some(frame) = self.router.subscribe_frame(&id) {
                                write.send(Message::Text(frame)).await?;
                                sent.insert(id);
                            }
                        }
                        Some(Command::Unsubscribe(id)) => {
                            if sent.remove(&id) {
                                let frame = serde_json::to_string(&ClientFrame::Unsubscribe { id: &id })?;
                                write.send(Message::Text(frame)).await?;
                            }
                        }
                        None => {
                            let _ = write.send(Message::Close(None)).await;
                            return Ok(false);
                        }
                    }
                }
                _ = ping_interval.tick() => {
                    write.send(Message::Ping(vec![])).await?;
                    debug!("Sent ping");
                }
            }
        }
    }
}

async fn open_stream(url: &Url) -> Result<WsStream> {
    let (ws_stream, _) = timeout(CONNECT_TIMEOUT, connect_async(url.as_str()))
        .await
        .map_err(|_| SyncError::WebSocket("WebSocket connection timeout".to_string()))??;
    Ok(ws_stream)
}
