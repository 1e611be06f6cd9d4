//! One websocket session to the realtime backend.
//!
//! Outbound events are framed with a generated `event_id` and pushed onto a
//! queue drained by a single writer task, so send order is the queue order
//! and a dead writer shows up as a `Connection` error on the next send.
//! A listener task parses every inbound frame and dispatches it on the
//! [`EventBus`] under its `type`.

use crate::{
    error::{RealtimeError, Result},
    event_bus::EventBus,
    utils::{self, DEFAULT_ID_LENGTH},
};
use futures_util::{SinkExt, StreamExt, stream::Stream};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value, json};
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicU64, Ordering},
};
use std::time::Duration;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        self, client::IntoClientRequest, http::HeaderValue, protocol::Message as WsMessage,
    },
};
use tracing::{debug, error, info, trace, warn};

pub const DEFAULT_URL: &str = "wss://api.openai.com/v1/realtime";
pub const DEFAULT_MODEL: &str = "gpt-4o-realtime-preview-2024-10-01";

const EVENT_ID_PREFIX: &str = "evt_";
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

struct Link {
    id: u64,
    outbound: mpsc::UnboundedSender<WsMessage>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

struct Inner {
    url: String,
    api_key: Option<SecretString>,
    bus: EventBus,
    link: Mutex<Option<Link>>,
    next_link_id: AtomicU64,
}

/// Handle to a realtime session. Clones share the same connection and bus.
#[derive(Clone)]
pub struct RealtimeApi {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RealtimeApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeApi")
            .field("url", &self.inner.url)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl RealtimeApi {
    pub fn new(api_key: Option<SecretString>) -> Self {
        Self::with_url(DEFAULT_URL, api_key)
    }

    pub fn with_url(url: impl Into<String>, api_key: Option<SecretString>) -> Self {
        Self {
            inner: Arc::new(Inner {
                url: url.into(),
                api_key,
                bus: EventBus::new(),
                link: Mutex::new(None),
                next_link_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// The bus every inbound event (and every sent `client.*` event) lands on.
    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    fn link(&self) -> MutexGuard<'_, Option<Link>> {
        self.inner.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_connected(&self) -> bool {
        self.link()
            .as_ref()
            .is_some_and(|link| !link.outbound.is_closed())
    }

    /// Opens the websocket and starts the writer and listener tasks.
    pub async fn connect(&self, model: &str) -> Result<()> {
        if self.is_connected() {
            return Err(RealtimeError::Connection("Already connected".to_string()));
        }
        let url = &self.inner.url;
        if self.inner.api_key.is_none() && url == DEFAULT_URL {
            warn!(%url, "No api key provided for connection");
        }

        let endpoint = format!("{}?model={}", url, model);
        let mut request = endpoint.as_str().into_client_request().map_err(|e| {
            RealtimeError::Connection(format!("Invalid endpoint \"{}\": {}", endpoint, e))
        })?;
        if let Some(api_key) = &self.inner.api_key {
            let bearer = HeaderValue::from_str(&format!("Bearer {}", api_key.expose_secret()))
                .map_err(|e| RealtimeError::Connection(format!("Invalid api key: {}", e)))?;
            let headers = request.headers_mut();
            headers.insert("Authorization", bearer);
            headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));
        }

        let (ws_stream, _) = connect_async(request).await.map_err(|e| {
            warn!(%url, error = %e, "Could not connect");
            RealtimeError::Connection(format!("Could not connect to \"{}\": {}", url, e))
        })?;
        let (mut sink, stream) = ws_stream.split();
        let (outbound, mut queue) = mpsc::unbounded_channel::<WsMessage>();
        let id = self.inner.next_link_id.fetch_add(1, Ordering::Relaxed);

        // Spawn under the lock so the listener cannot observe a half-stored link.
        let mut slot = self.link();
        if slot.as_ref().is_some_and(|link| !link.outbound.is_closed()) {
            return Err(RealtimeError::Connection("Already connected".to_string()));
        }

        let writer = tokio::spawn(async move {
            while let Some(message) = queue.recv().await {
                let closing = matches!(message, WsMessage::Close(_));
                if let Err(e) = sink.send(message).await {
                    error!(error = %e, "Failed to write realtime frame");
                    break;
                }
                if closing {
                    break;
                }
            }
            let _ = sink.close().await;
        });
        let api = self.clone();
        let reader = tokio::spawn(async move { api.listen(stream, id).await });

        *slot = Some(Link {
            id,
            outbound,
            writer,
            reader,
        });
        info!(%url, model, "Connected to realtime endpoint");
        Ok(())
    }

    async fn listen<S>(self, mut stream: S, link_id: u64)
    where
        S: Stream<Item = Result<WsMessage, tungstenite::Error>> + Unpin,
    {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => self.handle_message(text.as_str()),
                Ok(WsMessage::Close(frame)) => {
                    debug!(?frame, "Realtime endpoint sent close frame");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "Realtime socket error");
                    break;
                }
            }
        }

        let dropped = {
            let mut slot = self.link();
            if slot.as_ref().is_some_and(|link| link.id == link_id) {
                slot.take()
            } else {
                None
            }
        };
        // `None` means disconnect() got here first and already reported it.
        if dropped.is_some() {
            info!(url = %self.inner.url, "Disconnected from realtime endpoint");
            self.inner.bus.dispatch("close", &json!({ "error": true }));
        }
    }

    fn handle_message(&self, text: &str) {
        let event: Value = match serde_json::from_str(text) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Failed to parse realtime frame");
                return;
            }
        };
        match event.get("type").and_then(Value::as_str) {
            Some(event_type) => {
                trace!(event_type, "received");
                let event_type = event_type.to_owned();
                self.inner.bus.dispatch(&event_type, &event);
            }
            None => warn!("Realtime frame has no \"type\""),
        }
    }

    /// Frames and queues one client event, returning the framed event.
    ///
    /// `payload` must be a JSON object (or `null` for no fields). The event
    /// is also dispatched locally as `client.<event_type>`.
    pub fn send(&self, event_type: &str, payload: Value) -> Result<Value> {
        let event = {
            let slot = self.link();
            let link = slot.as_ref().ok_or_else(|| {
                RealtimeError::Connection("RealtimeApi is not connected".to_string())
            })?;

            let fields = match payload {
                Value::Object(fields) => fields,
                Value::Null => Map::new(),
                _ => {
                    return Err(RealtimeError::Validation(
                        "data must be a JSON object".to_string(),
                    ));
                }
            };
            let mut event = fields;
            event.insert(
                "event_id".to_string(),
                utils::generate_id(EVENT_ID_PREFIX, DEFAULT_ID_LENGTH)?.into(),
            );
            event.insert("type".to_string(), event_type.into());
            let event = Value::Object(event);

            let text = serde_json::to_string(&event)?;
            link.outbound
                .send(WsMessage::Text(text.into()))
                .map_err(|_| {
                    RealtimeError::Connection("Realtime writer has stopped".to_string())
                })?;
            event
        };

        debug!(event_type, "sent");
        self.inner
            .bus
            .dispatch(&format!("client.{}", event_type), &event);
        Ok(event)
    }

    /// Closes the session. Returns `false` when there was nothing to close.
    pub async fn disconnect(&self) -> bool {
        let link = self.link().take();
        let Some(Link {
            outbound,
            mut writer,
            reader,
            ..
        }) = link
        else {
            return false;
        };

        let _ = outbound.send(WsMessage::Close(None));
        drop(outbound);
        if tokio::time::timeout(CLOSE_TIMEOUT, &mut writer).await.is_err() {
            warn!("Timed out flushing realtime socket");
            writer.abort();
        }
        reader.abort();

        info!(url = %self.inner.url, "Disconnected from realtime endpoint");
        self.inner.bus.dispatch("close", &json!({ "error": false }));
        true
    }
}
