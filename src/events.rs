use crate::error::HandlerResult;
use crate::mirror::NodeId;
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

pub type EventHandler = Rc<dyn Fn(&Value) -> HandlerResult>;

#[derive(Default)]
struct BusState {
    next_id: u64,
    subscribers: HashMap<String, Vec<(u64, EventHandler)>>,
}

#[derive(Clone, Default)]
pub struct GlobalEventBus {
    state: Rc<RefCell<BusState>>,
}

/// Returned by `subscribe`; removes exactly that registration.
#[must_use = "dropping the token keeps the handler subscribed"]
pub struct Unsubscribe {
    state: Weak<RefCell<BusState>>,
    event: String,
    id: u64,
}

impl Unsubscribe {
    /// Safe to call after the bus was cleared or dropped.
    pub fn unsubscribe(self) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        let mut state = state.borrow_mut();
        if let Some(handlers) = state.subscribers.get_mut(&self.event) {
            handlers.retain(|(id, _)| *id != self.id);
            if handlers.is_empty() {
                state.subscribers.remove(&self.event);
            }
        }
    }
}

impl GlobalEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, event: impl Into<String>, handler: F) -> Unsubscribe
    where
        F: Fn(&Value) -> HandlerResult + 'static,
    {
        let event = event.into();
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = state.next_id;
        state
            .subscribers
            .entry(event.clone())
            .or_default()
            .push((id, Rc::new(handler)));

        Unsubscribe {
            state: Rc::downgrade(&self.state),
            event,
            id,
        }
    }

    pub fn subscriber_count(&self, event: &str) -> usize {
        self.state
            .borrow()
            .subscribers
            .get(event)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Parses `raw` and runs every handler registered for `event`, in
    /// registration order. Returns how many handlers ran without error.
    pub fn publish(&self, event: &str, raw: &str) -> usize {
        let payload = parse_payload(raw);
        // Snapshot so handlers may subscribe or unsubscribe while we iterate.
        let handlers: Vec<EventHandler> = match self.state.borrow().subscribers.get(event) {
            Some(handlers) => handlers.iter().map(|(_, handler)| handler.clone()).collect(),
            None => return 0,
        };

        let mut succeeded = 0;
        for handler in handlers {
            match handler(&payload) {
                Ok(()) => succeeded += 1,
                Err(err) => {
                    tracing::error!(event, error = %err, "global event handler failed");
                }
            }
        }
        succeeded
    }

    pub fn clear(&self) {
        self.state.borrow_mut().subscribers.clear();
    }
}

fn parse_payload(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Object(Map::new());
    }

    match serde_json::from_str::<Value>(raw) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(error = %err, "unparseable global event payload; using empty record");
            Value::Object(Map::new())
        }
    }
}

#[derive(Default)]
pub struct NodeEventTable {
    handlers: HashMap<(NodeId, String), EventHandler>,
}

impl NodeEventTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the node previously had no handler for `event`.
    pub fn register(&mut self, node: NodeId, event: &str, handler: EventHandler) -> bool {
        self.handlers
            .insert((node, event.to_string()), handler)
            .is_none()
    }

    pub fn deregister(&mut self, node: NodeId, event: &str) -> bool {
        self.handlers.remove(&(node, event.to_string())).is_some()
    }

    pub fn remove_node(&mut self, node: NodeId) -> usize {
        let before = self.handlers.len();
        self.handlers.retain(|(owner, _), _| *owner != node);
        before - self.handlers.len()
    }

    pub fn handler(&self, node: NodeId, event: &str) -> Option<EventHandler> {
        self.handlers.get(&(node, event.to_string())).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    /// Runs the handler for a host-dispatched node event. A missing handler
    /// is not an error: the host may race a deregistration.
    pub fn dispatch(&self, node: NodeId, event: &str, payload: &Value) -> bool {
        let Some(handler) = self.handler(node, event) else {
            tracing::debug!(node = %node, event, "no handler registered for node event");
            return false;
        };

        match handler(payload) {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(node = %node, event, error = %err, "node event handler failed");
                false
            }
        }
    }
}
