use crate::config::BridgeConfig;
use crate::error::HostError;
use crate::protocol::{Operation, encode_operations, write_frame};
use serde_json::Value;
use std::io::Write;

/// The host side of the boundary. `ingest` is the single entry point that
/// receives every flushed batch.
pub trait NativeHost {
    fn ingest(&mut self, payload: &str) -> Result<(), HostError>;

    /// Synchronous module call for hosts that can answer without crossing an
    /// asynchronous boundary. `None` means unsupported.
    fn call_sync(&mut self, _module: &str, _method: &str, _args: &Value) -> Option<Value> {
        None
    }
}

pub struct FramedHost<W: Write> {
    writer: W,
    max_frame_bytes: usize,
}

impl<W: Write> FramedHost<W> {
    pub fn new(writer: W, config: &BridgeConfig) -> Self {
        Self {
            writer,
            max_frame_bytes: config.max_frame_bytes,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> NativeHost for FramedHost<W> {
    fn ingest(&mut self, payload: &str) -> Result<(), HostError> {
        write_frame(&mut self.writer, payload.as_bytes(), self.max_frame_bytes)?;
        self.writer.flush()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub flushes: u64,
    pub delivered_ops: u64,
    pub dropped_ops: u64,
}

#[derive(Default)]
pub struct OperationQueue {
    pending: Vec<Operation>,
    flush_scheduled: bool,
    stats: QueueStats,
    host: Option<Box<dyn NativeHost>>,
}

impl OperationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(host: Box<dyn NativeHost>) -> Self {
        Self {
            host: Some(host),
            ..Self::default()
        }
    }

    pub fn attach_host(&mut self, host: Box<dyn NativeHost>) {
        self.host = Some(host);
    }

    pub fn detach_host(&mut self) -> Option<Box<dyn NativeHost>> {
        self.host.take()
    }

    pub fn has_host(&self) -> bool {
        self.host.is_some()
    }

    pub fn host_mut(&mut self) -> Option<&mut (dyn NativeHost + 'static)> {
        self.host.as_deref_mut()
    }

    pub fn enqueue(&mut self, op: Operation) {
        tracing::trace!(op = op.name(), pending = self.pending.len(), "enqueue");
        self.pending.push(op);
        self.flush_scheduled = true;
    }

    pub fn is_flush_scheduled(&self) -> bool {
        self.flush_scheduled
    }

    pub fn pending(&self) -> &[Operation] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn stats(&self) -> QueueStats {
        self.stats
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.flush_scheduled = false;
    }

    pub fn run_scheduled(&mut self) {
        if self.flush_scheduled {
            self.flush();
        }
    }

    /// Ships everything pending as one payload.
    pub fn flush(&mut self) {
        // Cleared before the host runs; reentrant enqueues start the next batch.
        let ops = std::mem::take(&mut self.pending);
        self.flush_scheduled = false;

        if ops.is_empty() {
            return;
        }

        let count = ops.len() as u64;
        let Some(host) = self.host.as_mut() else {
            tracing::warn!(dropped = count, "native host not ready; dropping operations");
            self.stats.dropped_ops += count;
            return;
        };

        let payload = match encode_operations(&ops) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(error = %err, dropped = count, "failed to encode operations");
                self.stats.dropped_ops += count;
                return;
            }
        };

        tracing::debug!(ops = count, bytes = payload.len(), "flushing operations");
        self.stats.flushes += 1;

        match host.ingest(&payload) {
            Ok(()) => self.stats.delivered_ops += count,
            Err(err) => {
                tracing::error!(error = %err, ops = count, "native host failed to ingest operations");
                self.stats.dropped_ops += count;
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::mirror::NodeId;
    use crate::protocol::{DEFAULT_MAX_FRAME_BYTES, decode_operations, read_frame};
    use std::cell::RefCell;
    use std::io::Cursor;
    use std::fmt;
    use std::rc::Rc;
    use std::sync::{Arc, Mutex};
    use tracing::field::{Field, Visit};
    use tracing::{Event, Level, Metadata, Subscriber, span};

    #[derive(Clone, Default)]
    pub(crate) struct RecordingHost {
        pub batches: Rc<RefCell<Vec<Vec<Operation>>>>,
        pub fail: bool,
        pub sync_reply: Option<Value>,
    }

    impl RecordingHost {
        pub fn batch_count(&self) -> usize {
            self.batches.borrow().len()
        }

        pub fn all_ops(&self) -> Vec<Operation> {
            self.batches.borrow().iter().flatten().cloned().collect()
        }

        pub fn last_batch(&self) -> Vec<Operation> {
            self.batches.borrow().last().cloned().unwrap_or_default()
        }
    }

    impl NativeHost for RecordingHost {
        fn ingest(&mut self, payload: &str) -> Result<(), HostError> {
            let ops = decode_operations(payload).expect("payload decodes");
            self.batches.borrow_mut().push(ops);
            if self.fail {
                Err(HostError::new("host exploded"))
            } else {
                Ok(())
            }
        }

        fn call_sync(&mut self, _module: &str, _method: &str, _args: &Value) -> Option<Value> {
            self.sync_reply.clone()
        }
    }

    /// Collects the level and message of every event emitted while
    /// installed as the thread's default subscriber.
    #[derive(Clone, Default)]
    pub(crate) struct LogCapture {
        events: Arc<Mutex<Vec<(Level, String)>>>,
    }

    impl LogCapture {
        pub fn during<T>(f: impl FnOnce() -> T) -> (T, Self) {
            let capture = LogCapture::default();
            let out = tracing::subscriber::with_default(capture.clone(), f);
            (out, capture)
        }

        pub fn warnings(&self) -> Vec<String> {
            self.events
                .lock()
                .expect("log capture lock")
                .iter()
                .filter(|(level, _)| *level == Level::WARN)
                .map(|(_, message)| message.clone())
                .collect()
        }
    }

    struct MessageVisitor(String);

    impl Visit for MessageVisitor {
        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            if field.name() == "message" {
                self.0 = format!("{value:?}");
            }
        }
    }

    impl Subscriber for LogCapture {
        fn enabled(&self, _: &Metadata<'_>) -> bool {
            true
        }

        fn new_span(&self, _: &span::Attributes<'_>) -> span::Id {
            span::Id::from_u64(1)
        }

        fn record(&self, _: &span::Id, _: &span::Record<'_>) {}

        fn record_follows_from(&self, _: &span::Id, _: &span::Id) {}

        fn event(&self, event: &Event<'_>) {
            let mut visitor = MessageVisitor(String::new());
            event.record(&mut visitor);
            self.events
                .lock()
                .expect("log capture lock")
                .push((*event.metadata().level(), visitor.0));
        }

        fn enter(&self, _: &span::Id) {}

        fn exit(&self, _: &span::Id) {}
    }

    #[test]
    fn enqueue_schedules_once_and_flush_clears() {
        let host = RecordingHost::default();
        let mut queue = OperationQueue::with_host(Box::new(host.clone()));

        queue.enqueue(Operation::Create(NodeId(1), "view".to_string()));
        queue.enqueue(Operation::Create(NodeId(2), "view".to_string()));
        assert!(queue.is_flush_scheduled());

        queue.run_scheduled();
        assert!(!queue.is_flush_scheduled());
        assert!(queue.is_empty());

        queue.run_scheduled();
        assert_eq!(host.batch_count(), 1);
        assert_eq!(host.last_batch().len(), 2);
    }

    #[test]
    fn missing_host_drops_without_failing() {
        let mut queue = OperationQueue::new();
        queue.enqueue(Operation::RemoveChild(NodeId(4)));

        let ((), logs) = LogCapture::during(|| queue.flush());

        assert_eq!(
            logs.warnings(),
            vec!["native host not ready; dropping operations".to_string()]
        );
        assert!(queue.is_empty());
        assert_eq!(queue.stats().dropped_ops, 1);
        assert_eq!(queue.stats().flushes, 0);
    }

    #[test]
    fn failing_host_counts_flush_as_complete() {
        let host = RecordingHost {
            fail: true,
            ..RecordingHost::default()
        };
        let mut queue = OperationQueue::with_host(Box::new(host.clone()));
        queue.enqueue(Operation::RemoveChild(NodeId(4)));

        queue.flush();

        assert!(queue.is_empty());
        assert!(!queue.is_flush_scheduled());
        assert_eq!(queue.stats().flushes, 1);
        assert_eq!(queue.stats().dropped_ops, 1);

        queue.flush();
        assert_eq!(host.batch_count(), 1);
    }

    #[test]
    fn empty_flush_ships_nothing() {
        let host = RecordingHost::default();
        let mut queue = OperationQueue::with_host(Box::new(host.clone()));
        queue.flush();
        assert_eq!(host.batch_count(), 0);
    }

    #[test]
    fn framed_host_writes_one_frame_per_batch() {
        let mut host = FramedHost::new(Vec::new(), &BridgeConfig::default());
        host.ingest(r#"[{"op":"removeChild","args":[1]}]"#)
            .expect("ingest");

        let mut cursor = Cursor::new(host.into_inner());
        let frame = read_frame(&mut cursor, DEFAULT_MAX_FRAME_BYTES).expect("frame");
        let ops = decode_operations(std::str::from_utf8(&frame).expect("utf8")).expect("ops");
        assert_eq!(ops, vec![Operation::RemoveChild(NodeId(1))]);
    }
}
