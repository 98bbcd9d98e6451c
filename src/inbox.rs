use crate::mirror::NodeId;
use serde_json::Value;
use std::sync::mpsc::{self, Receiver, SendError, Sender};

#[derive(Debug, Clone)]
pub enum Inbound {
    Resolve {
        callback_id: u64,
        result: Value,
        error: Option<String>,
    },
    NodeEvent {
        node_id: NodeId,
        event: String,
        payload: Value,
    },
    GlobalEvent {
        event: String,
        payload: String,
    },
}

/// Sending half handed to the host's threads. The bridge drains the other
/// half in `Bridge::pump`, so bridge state only ever has one writer.
#[derive(Debug, Clone)]
pub struct Inbox {
    tx: Sender<Inbound>,
}

impl Inbox {
    pub fn channel() -> (Self, Receiver<Inbound>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, message: Inbound) -> Result<(), SendError<Inbound>> {
        self.tx.send(message)
    }

    pub fn resolve(&self, callback_id: u64, result: Value, error: Option<String>) {
        self.post(Inbound::Resolve {
            callback_id,
            result,
            error,
        });
    }

    pub fn node_event(&self, node_id: NodeId, event: impl Into<String>, payload: Value) {
        self.post(Inbound::NodeEvent {
            node_id,
            event: event.into(),
            payload,
        });
    }

    pub fn global_event(&self, event: impl Into<String>, payload: impl Into<String>) {
        self.post(Inbound::GlobalEvent {
            event: event.into(),
            payload: payload.into(),
        });
    }

    fn post(&self, message: Inbound) {
        if self.tx.send(message).is_err() {
            tracing::warn!("bridge inbox closed; dropping host message");
        }
    }
}
