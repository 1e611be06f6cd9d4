//! Publish/subscribe registry keyed by event name.
//!
//! Handlers are plain synchronous callbacks. Persistent handlers run on every
//! dispatch; one-shot handlers run on the next dispatch only. Dispatch works
//! on a snapshot of both lists, so a handler may register or remove handlers
//! (including itself) without deadlocking the bus.

use crate::error::{RealtimeError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

/// A registered callback. Keep the returned clone to remove it later.
pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

/// An event captured by [`EventBus::forward`].
#[derive(Debug, Clone)]
pub struct BusEvent {
    pub name: String,
    pub payload: Value,
}

#[derive(Default)]
struct Registry {
    handlers: HashMap<String, Vec<Handler>>,
    next_handlers: HashMap<String, Vec<Handler>>,
}

#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry();
        f.debug_struct("EventBus")
            .field("events", &registry.handlers.keys().collect::<Vec<_>>())
            .field("next_events", &registry.next_handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a persistent handler for `event_name`.
    pub fn on<F>(&self, event_name: &str, callback: F) -> Handler
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(callback);
        self.registry()
            .handlers
            .entry(event_name.to_owned())
            .or_default()
            .push(handler.clone());
        handler
    }

    /// Registers a handler that runs on the next `event_name` dispatch only.
    pub fn on_next<F>(&self, event_name: &str, callback: F) -> Handler
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(callback);
        self.registry()
            .next_handlers
            .entry(event_name.to_owned())
            .or_default()
            .push(handler.clone());
        handler
    }

    /// Removes one persistent handler, or all of them when `handler` is `None`.
    pub fn off(&self, event_name: &str, handler: Option<&Handler>) -> Result<()> {
        let mut registry = self.registry();
        remove_handler(&mut registry.handlers, event_name, handler).map_err(|()| {
            RealtimeError::NotFound(format!(
                "Could not turn off specified event listener for \"{}\": not found as a listener",
                event_name
            ))
        })
    }

    /// Removes one one-shot handler, or all of them when `handler` is `None`.
    pub fn off_next(&self, event_name: &str, handler: Option<&Handler>) -> Result<()> {
        let mut registry = self.registry();
        remove_handler(&mut registry.next_handlers, event_name, handler).map_err(|()| {
            RealtimeError::NotFound(format!(
                "Could not turn off specified next event listener for \"{}\": not found as a listener",
                event_name
            ))
        })
    }

    pub fn clear(&self) {
        let mut registry = self.registry();
        registry.handlers.clear();
        registry.next_handlers.clear();
    }

    /// Invokes persistent handlers, then one-shot handlers, in registration order.
    ///
    /// The one-shot handlers that ran are discarded afterwards; one-shot
    /// handlers registered while dispatching wait for the next event.
    pub fn dispatch(&self, event_name: &str, event: &Value) {
        let (handlers, next_handlers) = {
            let registry = self.registry();
            (
                registry.handlers.get(event_name).cloned().unwrap_or_default(),
                registry
                    .next_handlers
                    .get(event_name)
                    .cloned()
                    .unwrap_or_default(),
            )
        };
        trace!(
            event_name,
            handlers = handlers.len(),
            next_handlers = next_handlers.len(),
            "dispatch"
        );

        for handler in &handlers {
            handler(event);
        }
        for handler in &next_handlers {
            handler(event);
        }

        if !next_handlers.is_empty() {
            let mut registry = self.registry();
            if let Some(list) = registry.next_handlers.get_mut(event_name) {
                list.retain(|h| !next_handlers.iter().any(|ran| Arc::ptr_eq(h, ran)));
                if list.is_empty() {
                    registry.next_handlers.remove(event_name);
                }
            }
        }
    }

    /// Resolves with the next `event_name` payload, or `None` on timeout.
    ///
    /// The one-shot handler is registered before this returns, so an event
    /// dispatched between the call and the first poll is not missed. It is
    /// removed again on timeout or when the future is dropped unresolved.
    pub fn wait_for_next(
        &self,
        event_name: &str,
        timeout: Option<Duration>,
    ) -> impl Future<Output = Option<Value>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));
        let handler = self.on_next(event_name, move |event| {
            if let Some(tx) = slot.lock().unwrap_or_else(PoisonError::into_inner).take() {
                let _ = tx.send(event.clone());
            }
        });

        let guard = PendingWait {
            bus: self.clone(),
            event_name: event_name.to_owned(),
            handler,
        };
        async move {
            let _guard = guard;
            match timeout {
                None => rx.await.ok(),
                Some(limit) => tokio::time::timeout(limit, rx).await.ok().and_then(Result::ok),
            }
        }
    }

    /// Pipes every dispatch of the given events into a channel, in order.
    pub fn forward(&self, event_names: &[&str]) -> mpsc::UnboundedReceiver<BusEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        for name in event_names {
            let tx = tx.clone();
            let owned = (*name).to_owned();
            self.on(name, move |payload| {
                let _ = tx.send(BusEvent {
                    name: owned.clone(),
                    payload: payload.clone(),
                });
            });
        }
        rx
    }
}

/// Unregisters a waiter's one-shot handler when the wait ends.
struct PendingWait {
    bus: EventBus,
    event_name: String,
    handler: Handler,
}

impl Drop for PendingWait {
    fn drop(&mut self) {
        // NotFound once the event fired; dispatch already removed it.
        let _ = self.bus.off_next(&self.event_name, Some(&self.handler));
    }
}

fn remove_handler(
    lists: &mut HashMap<String, Vec<Handler>>,
    event_name: &str,
    handler: Option<&Handler>,
) -> std::result::Result<(), ()> {
    let Some(handler) = handler else {
        lists.remove(event_name);
        return Ok(());
    };
    let list = lists.get_mut(event_name).ok_or(())?;
    let position = list
        .iter()
        .position(|h| Arc::ptr_eq(h, handler))
        .ok_or(())?;
    list.remove(position);
    if list.is_empty() {
        lists.remove(event_name);
    }
    Ok(())
}
