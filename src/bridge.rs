use crate::config::BridgeConfig;
use crate::error::HandlerResult;
use crate::events::{GlobalEventBus, NodeEventTable, Unsubscribe};
use crate::inbox::{Inbound, Inbox};
use crate::mirror::{NodeId, NodeMirror};
use crate::modules::{CallHandle, CallbackTable, Clock, SystemClock};
use crate::protocol::Operation;
use crate::queue::{NativeHost, OperationQueue, QueueStats};
use serde_json::Value;
use std::sync::mpsc::Receiver;
use std::time::Duration;

pub struct Bridge {
    pub(crate) config: BridgeConfig,
    pub(crate) mirror: NodeMirror,
    pub(crate) queue: OperationQueue,
    pub(crate) callbacks: CallbackTable,
    pub(crate) node_events: NodeEventTable,
    pub(crate) global_events: GlobalEventBus,
    clock: Box<dyn Clock>,
    inbox: Inbox,
    inbox_rx: Receiver<Inbound>,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self::with_clock(config, Box::new(SystemClock::default()))
    }

    pub fn with_clock(config: BridgeConfig, clock: Box<dyn Clock>) -> Self {
        let (inbox, inbox_rx) = Inbox::channel();
        Self {
            callbacks: CallbackTable::new(config.max_callback_id),
            config,
            mirror: NodeMirror::new(),
            queue: OperationQueue::new(),
            node_events: NodeEventTable::new(),
            global_events: GlobalEventBus::new(),
            clock,
            inbox,
            inbox_rx,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn attach_host(&mut self, host: Box<dyn NativeHost>) {
        self.queue.attach_host(host);
    }

    pub fn detach_host(&mut self) -> Option<Box<dyn NativeHost>> {
        self.queue.detach_host()
    }

    pub fn inbox(&self) -> Inbox {
        self.inbox.clone()
    }

    pub fn mirror(&self) -> &NodeMirror {
        &self.mirror
    }

    pub fn pending_operations(&self) -> &[Operation] {
        self.queue.pending()
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    pub fn pending_calls(&self) -> usize {
        self.callbacks.len()
    }

    pub fn registered_node_events(&self) -> usize {
        self.node_events.len()
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.callbacks.next_deadline()
    }

    /// End of the current synchronous turn: runs the flush scheduled by
    /// this turn's first enqueue, if there was one.
    pub fn end_turn(&mut self) {
        self.queue.run_scheduled();
    }

    pub fn flush_sync(&mut self) {
        self.queue.flush();
    }

    /// Applies everything the host posted to the inbox, one turn per
    /// message, then fires due timeouts and closes the turn.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;

        while let Ok(message) = self.inbox_rx.try_recv() {
            self.apply_inbound(message);
            self.end_turn();
            handled += 1;
        }

        self.fire_timers();
        self.end_turn();
        handled
    }

    /// Blocks on the inbox until a host message arrives, the earliest call
    /// deadline passes, or `max` elapses, then drains like [`Bridge::pump`].
    /// With no deadline armed and no `max` it waits for the next message.
    pub fn wait(&mut self, max: Option<Duration>) -> usize {
        let now = self.clock.now();
        let until_deadline = self
            .next_deadline()
            .map(|deadline| deadline.saturating_sub(now));
        let timeout = match (until_deadline, max) {
            (Some(deadline), Some(max)) => Some(deadline.min(max)),
            (deadline, max) => deadline.or(max),
        };

        let first = match timeout {
            Some(timeout) => self.inbox_rx.recv_timeout(timeout).ok(),
            None => self.inbox_rx.recv().ok(),
        };

        let mut handled = 0;
        if let Some(message) = first {
            self.apply_inbound(message);
            self.end_turn();
            handled += 1;
        }
        handled + self.pump()
    }

    pub fn fire_timers(&mut self) -> usize {
        let now = self.clock.now();
        self.callbacks.expire(now)
    }

    fn apply_inbound(&mut self, message: Inbound) {
        match message {
            Inbound::Resolve {
                callback_id,
                result,
                error,
            } => self.resolve_callback(callback_id, result, error),
            Inbound::NodeEvent {
                node_id,
                event,
                payload,
            } => self.handle_native_event(node_id, &event, payload),
            Inbound::GlobalEvent { event, payload } => self.handle_global_event(&event, &payload),
        }
    }

    /// Calls `module.method` on the host. `timeout` falls back to the
    /// configured default; with neither, the call waits indefinitely.
    pub fn invoke(
        &mut self,
        module: &str,
        method: &str,
        args: Value,
        timeout: Option<Duration>,
    ) -> CallHandle {
        let timeout = timeout.or(self.config.default_call_timeout);
        let handle = self
            .callbacks
            .register(module, method, timeout, self.clock.now());

        self.queue.enqueue(Operation::InvokeNativeModule(
            module.to_string(),
            method.to_string(),
            args,
            handle.callback_id(),
        ));
        handle
    }

    /// Best-effort synchronous call. Pending operations are flushed first so
    /// the host answers against the current tree. `None` when the host is
    /// absent or cannot answer synchronously.
    pub fn invoke_sync(&mut self, module: &str, method: &str, args: &Value) -> Option<Value> {
        self.queue.flush();
        let host = self.queue.host_mut()?;
        host.call_sync(module, method, args)
    }

    pub fn resolve_callback(&mut self, callback_id: u64, result: Value, error: Option<String>) {
        self.callbacks.resolve(callback_id, result, error);
    }

    pub fn handle_native_event(&mut self, node: NodeId, event: &str, payload: Value) {
        self.node_events.dispatch(node, event, &payload);
    }

    pub fn handle_global_event(&mut self, event: &str, payload: &str) {
        self.global_events.publish(event, payload);
    }

    pub fn subscribe<F>(&self, event: impl Into<String>, handler: F) -> Unsubscribe
    where
        F: Fn(&Value) -> HandlerResult + 'static,
    {
        self.global_events.subscribe(event, handler)
    }

    pub fn global_events(&self) -> &GlobalEventBus {
        &self.global_events
    }

    /// Tears down per-connection state. Pending calls are dropped without
    /// being settled; their handles report `Abandoned`. Unapplied inbox
    /// messages are discarded. The node mirror is left as is.
    pub fn reset(&mut self) {
        self.callbacks.reset();
        self.queue.clear();
        self.node_events.clear();
        self.global_events.clear();
        while self.inbox_rx.try_recv().is_ok() {}
        tracing::debug!("bridge reset");
    }
}
