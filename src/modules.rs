use crate::error::BridgeError;
use serde_json::Value;
use std::cell::Cell;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::time::{Duration, Instant};

pub trait Clock {
    fn now(&self) -> Duration;
}

#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }
}

pub type CallResult = Result<Value, BridgeError>;

#[derive(Debug)]
pub enum CallState {
    Pending,
    Resolved(Value),
    Rejected(BridgeError),
    /// The call was discarded without an answer (bridge reset), or its
    /// outcome was already taken.
    Abandoned,
}

#[derive(Debug)]
pub struct CallHandle {
    callback_id: u64,
    rx: Receiver<CallResult>,
}

impl CallHandle {
    pub fn callback_id(&self) -> u64 {
        self.callback_id
    }

    /// Takes the outcome if it has arrived. A settled outcome is returned
    /// once; later calls report `Abandoned`.
    pub fn try_settle(&self) -> CallState {
        match self.rx.try_recv() {
            Ok(Ok(value)) => CallState::Resolved(value),
            Ok(Err(err)) => CallState::Rejected(err),
            Err(TryRecvError::Empty) => CallState::Pending,
            Err(TryRecvError::Disconnected) => CallState::Abandoned,
        }
    }
}

#[derive(Debug)]
struct PendingCallback {
    module: String,
    method: String,
    settle: Sender<CallResult>,
    timer: Option<Timer>,
}

#[derive(Debug, Clone, Copy)]
struct Timer {
    deadline: Duration,
    timeout: Duration,
}

#[derive(Debug)]
pub struct CallbackTable {
    pending: HashMap<u64, PendingCallback>,
    deadlines: BTreeSet<(Duration, u64)>,
    next_id: u64,
    max_id: u64,
}

impl CallbackTable {
    pub fn new(max_id: u64) -> Self {
        Self {
            pending: HashMap::new(),
            deadlines: BTreeSet::new(),
            next_id: 1,
            max_id: max_id.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn is_pending(&self, callback_id: u64) -> bool {
        self.pending.contains_key(&callback_id)
    }

    pub fn register(
        &mut self,
        module: &str,
        method: &str,
        timeout: Option<Duration>,
        now: Duration,
    ) -> CallHandle {
        let callback_id = self.allocate_id();
        if self.take(callback_id).is_some() {
            tracing::warn!(callback_id, "callback ids exhausted; abandoning oldest call");
        }
        let (settle, rx) = mpsc::channel();
        let timer = timeout.map(|timeout| Timer {
            deadline: now + timeout,
            timeout,
        });

        if let Some(timer) = timer {
            self.deadlines.insert((timer.deadline, callback_id));
        }

        self.pending.insert(
            callback_id,
            PendingCallback {
                module: module.to_string(),
                method: method.to_string(),
                settle,
                timer,
            },
        );

        CallHandle { callback_id, rx }
    }

    /// Settles a pending call. Unknown ids (late, duplicate or never issued)
    /// are logged and ignored. Returns whether a call was settled.
    pub fn resolve(&mut self, callback_id: u64, result: Value, error: Option<String>) -> bool {
        let Some(entry) = self.take(callback_id) else {
            tracing::warn!(callback_id, "resolution for unknown callback id; ignoring");
            return false;
        };

        let outcome = match error {
            None => Ok(result),
            Some(message) => Err(BridgeError::Native(message)),
        };
        deliver(callback_id, &entry, outcome);
        true
    }

    pub fn expire(&mut self, now: Duration) -> usize {
        let mut expired = 0;

        while let Some(&(deadline, callback_id)) = self.deadlines.first() {
            if deadline > now {
                break;
            }
            let Some(entry) = self.take(callback_id) else {
                self.deadlines.remove(&(deadline, callback_id));
                continue;
            };

            let timeout_ms = entry
                .timer
                .map(|timer| u64::try_from(timer.timeout.as_millis()).unwrap_or(u64::MAX))
                .unwrap_or(0);
            tracing::warn!(
                callback_id,
                module = %entry.module,
                method = %entry.method,
                timeout_ms,
                "native module call timed out"
            );
            let error = BridgeError::Timeout {
                module: entry.module.clone(),
                method: entry.method.clone(),
                timeout_ms,
            };
            deliver(callback_id, &entry, Err(error));
            expired += 1;
        }

        expired
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.deadlines.first().map(|(deadline, _)| *deadline)
    }

    /// Drops every pending call without settling it and restarts ids at 1.
    pub fn reset(&mut self) {
        if !self.pending.is_empty() {
            tracing::debug!(discarded = self.pending.len(), "discarding pending callbacks");
        }
        self.pending.clear();
        self.deadlines.clear();
        self.next_id = 1;
    }

    fn take(&mut self, callback_id: u64) -> Option<PendingCallback> {
        let entry = self.pending.remove(&callback_id)?;
        if let Some(timer) = entry.timer {
            self.deadlines.remove(&(timer.deadline, callback_id));
        }
        Some(entry)
    }

    fn allocate_id(&mut self) -> u64 {
        loop {
            let id = self.next_id;
            self.next_id = if id >= self.max_id { 1 } else { id + 1 };
            if !self.pending.contains_key(&id) || self.pending.len() as u64 >= self.max_id {
                return id;
            }
        }
    }
}

fn deliver(callback_id: u64, entry: &PendingCallback, outcome: CallResult) {
    if entry.settle.send(outcome).is_err() {
        tracing::debug!(callback_id, "call handle dropped before settlement");
    }
}
