/// WebSocket event channel to the client.
///
/// The client pushes every JSON API change over a WAMP-style socket.  After
/// the handshake we send `[5, "OnJsonApiEvent"]` to subscribe to everything,
/// then route each inbound `[opcode, eventName, {uri, data, eventType}]`
/// frame to the callbacks registered for its `uri`.
///
/// The socket is owned by whoever opened it.  Errors and closure are reported
/// through [`LeagueSocket::on_error`] / [`LeagueSocket::on_close`]; nothing
/// reconnects automatically.
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::stream::{SplitSink, StreamExt};
use futures_util::{Sink, SinkExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::{Error, Result};
use crate::lockfile::{Credentials, ADDRESS, USERNAME};
use crate::tls;

/// Opcode of the WAMP "subscribe" control message.
pub const OPCODE_SUBSCRIBE: u8 = 5;
/// Event name carrying every JSON API change.
pub const JSON_API_EVENT: &str = "OnJsonApiEvent";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Payload of a JSON API event frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JsonApiEvent {
    pub uri: String,
    #[serde(default)]
    pub data: Value,
    #[serde(rename = "eventType", default)]
    pub event_type: Option<String>,
}

pub type EventCallback = Arc<dyn Fn(&Value, &JsonApiEvent) + Send + Sync>;
type OpenFn = Arc<dyn Fn() + Send + Sync>;
type ErrorFn = Arc<dyn Fn(&Error) + Send + Sync>;
type CloseFn = Arc<dyn Fn() + Send + Sync>;

/// `/` followed by `path` with every leading `/` removed.
pub fn normalize_topic(path: &str) -> String {
    format!("/{}", path.trim_start_matches('/'))
}

/// Best-effort decode of an inbound frame.
///
/// The socket also carries frames that are not JSON API events (welcome
/// messages, other event names, plain text).  Those return `None` and are
/// dropped without being treated as errors.
pub fn decode_frame(text: &str) -> Option<JsonApiEvent> {
    let (_opcode, _name, payload): (Value, Value, JsonApiEvent) = serde_json::from_str(text).ok()?;
    Some(payload)
}

/// Topic → callbacks, in registration order.
#[derive(Default)]
pub struct SubscriptionTable {
    topics: HashMap<String, Vec<EventCallback>>,
}

impl SubscriptionTable {
    pub fn subscribe(&mut self, path: &str, callback: EventCallback) {
        self.topics
            .entry(normalize_topic(path))
            .or_default()
            .push(callback);
    }

    /// Drops every callback registered for the topic.
    pub fn unsubscribe(&mut self, path: &str) -> bool {
        self.topics.remove(&normalize_topic(path)).is_some()
    }

    pub fn callbacks(&self, uri: &str) -> Option<Vec<EventCallback>> {
        self.topics.get(uri).cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.topics.contains_key(&normalize_topic(path))
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

#[derive(Default)]
struct Handlers {
    open: Option<OpenFn>,
    error: Vec<ErrorFn>,
    close: Vec<CloseFn>,
}

struct Inner {
    subscriptions: Mutex<SubscriptionTable>,
    handlers: Mutex<Handlers>,
}

impl Inner {
    fn subscriptions(&self) -> MutexGuard<'_, SubscriptionTable> {
        self.subscriptions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handlers(&self) -> MutexGuard<'_, Handlers> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decodes `text` and invokes the matching callbacks.  Returns how many
    /// callbacks ran.
    fn dispatch(&self, text: &str) -> usize {
        let Some(event) = decode_frame(text) else {
            return 0;
        };
        // Snapshot so callbacks may subscribe/unsubscribe without deadlocking.
        let callbacks = self.subscriptions().callbacks(&event.uri);
        let Some(callbacks) = callbacks else {
            return 0;
        };
        for cb in &callbacks {
            cb(&event.data, &event);
        }
        callbacks.len()
    }

    /// Sends the catch-all subscription.  A failed send is reported to the
    /// error handlers as well as returned.
    async fn subscribe_all<S>(&self, sink: &mut S) -> Result<()>
    where
        S: Sink<Message> + Unpin,
        Error: From<S::Error>,
    {
        let frame = serde_json::json!([OPCODE_SUBSCRIBE, JSON_API_EVENT]).to_string();
        sink.send(Message::Text(frame.into())).await.map_err(|e| {
            let err = Error::from(e);
            self.emit_error(&err);
            err
        })
    }

    // Handlers are cloned out of the lock so they may register more handlers.

    fn emit_open(&self) {
        let open = self.handlers().open.clone();
        if let Some(open) = open {
            open();
        }
    }

    fn emit_error(&self, error: &Error) {
        let handlers = self.handlers().error.clone();
        for cb in &handlers {
            cb(error);
        }
    }

    fn emit_close(&self) {
        let handlers = self.handlers().close.clone();
        for cb in &handlers {
            cb();
        }
    }
}

/// An event-subscription connection to the client.
pub struct LeagueSocket {
    credentials: Credentials,
    inner: Arc<Inner>,
    sink: Arc<tokio::sync::Mutex<Option<WsSink>>>,
    reader: Option<JoinHandle<()>>,
}

impl LeagueSocket {
    /// Creates an unopened socket for `credentials`.  Register callbacks, then
    /// call [`LeagueSocket::open`].
    pub fn new(credentials: &Credentials) -> Self {
        Self {
            credentials: credentials.clone(),
            inner: Arc::new(Inner {
                subscriptions: Mutex::new(SubscriptionTable::default()),
                handlers: Mutex::new(Handlers::default()),
            }),
            sink: Arc::new(tokio::sync::Mutex::new(None)),
            reader: None,
        }
    }

    /// `wss://riot:<password>@127.0.0.1:<port>`
    pub fn endpoint(&self) -> String {
        format!(
            "wss://{USERNAME}:{}@{ADDRESS}:{}",
            self.credentials.password, self.credentials.port
        )
    }

    /// Sets the callback run once the handshake completes.  Replaces any
    /// previously registered one.
    pub fn on_socket_open<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.handlers().open = Some(Arc::new(f));
    }

    pub fn on_error<F>(&self, f: F)
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.inner.handlers().error.push(Arc::new(f));
    }

    pub fn on_close<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.handlers().close.push(Arc::new(f));
    }

    /// Adds `callback` for `path`.  `"a/b"`, `"/a/b"` and `"//a/b"` are the
    /// same topic.
    pub fn subscribe<F>(&self, path: &str, callback: F)
    where
        F: Fn(&Value, &JsonApiEvent) + Send + Sync + 'static,
    {
        self.inner.subscriptions().subscribe(path, Arc::new(callback));
    }

    /// Removes every callback for `path`.
    pub fn unsubscribe(&self, path: &str) {
        self.inner.subscriptions().unsubscribe(path);
    }

    pub fn is_open(&self) -> bool {
        self.reader.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Connects, runs the open callback and subscribes to all JSON API events.
    pub async fn open(&mut self) -> Result<()> {
        let mut request = format!("wss://{ADDRESS}:{}", self.credentials.port)
            .into_client_request()
            .map_err(Error::from)?;
        let auth = HeaderValue::from_str(&self.credentials.authorization_header())
            .map_err(|e| Error::Connection(format!("invalid authorization header: {e}")))?;
        request.headers_mut().insert("Authorization", auth);

        let connector = tls::localhost_connector()?;
        let (stream, _response) = tokio_tungstenite::connect_async_tls_with_config(
            request,
            None,
            false,
            Some(tokio_tungstenite::Connector::Rustls(connector)),
        )
        .await
        .map_err(|e| {
            let err = Error::from(e);
            self.inner.emit_error(&err);
            err
        })?;
        tracing::info!(target: "socket", "Connected to {ADDRESS}:{}", self.credentials.port);

        let (mut sink, mut source) = stream.split();

        self.inner.emit_open();

        self.inner.subscribe_all(&mut sink).await?;
        *self.sink.lock().await = Some(sink);

        let inner = Arc::clone(&self.inner);
        self.reader = Some(tokio::spawn(async move {
            while let Some(next) = source.next().await {
                let text = match next {
                    Ok(Message::Text(text)) => text.as_str().to_owned(),
                    Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => text,
                        Err(_) => continue,
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        let err = Error::from(e);
                        tracing::warn!(target: "socket", "Read error: {err}");
                        inner.emit_error(&err);
                        break;
                    }
                };
                inner.dispatch(&text);
            }
            tracing::info!(target: "socket", "Closed");
            inner.emit_close();
        }));

        Ok(())
    }

    /// Sends a raw text frame.
    pub async fn send(&self, text: impl Into<String>) -> Result<()> {
        let mut sink = self.sink.lock().await;
        let sink = sink.as_mut().ok_or(Error::ConnectionClosed)?;
        sink.send(Message::Text(text.into().into())).await?;
        Ok(())
    }

    /// Sends a close frame and waits for the reader to finish.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(mut sink) = self.sink.lock().await.take() {
            let _ = sink.send(Message::Close(None)).await;
            let _ = sink.close().await;
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.await;
        }
        Ok(())
    }
}

impl Drop for LeagueSocket {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Creates a socket for `credentials` and opens it.
pub async fn connect(credentials: &Credentials) -> Result<LeagueSocket> {
    let mut socket = LeagueSocket::new(credentials);
    socket.open().await?;
    Ok(socket)
}
