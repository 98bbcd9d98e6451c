use crate::bridge::Bridge;
use crate::error::{BridgeError, HandlerResult};
use crate::events::EventHandler;
use crate::mirror::NodeId;
use crate::protocol::Operation;
use crate::style::{diff_style, style_map};
use serde_json::Value;
use std::fmt;
use std::rc::Rc;

pub const STYLE_PROP: &str = "style";
const EVENT_PREFIX: &str = "on";

pub trait Renderer {
    fn create_element(&mut self, kind: &str) -> NodeId;
    fn create_text(&mut self, text: &str) -> NodeId;
    fn create_comment(&mut self, text: &str) -> NodeId;
    fn set_text(&mut self, node: NodeId, text: &str);
    fn set_element_text(&mut self, node: NodeId, text: &str);
    fn patch_prop(&mut self, node: NodeId, key: &str, prev: Option<&Prop>, next: Option<&Prop>);
    fn insert(&mut self, child: NodeId, parent: NodeId, anchor: Option<NodeId>);
    fn remove(&mut self, child: NodeId);
    fn parent_node(&self, node: NodeId) -> Option<NodeId>;
    fn next_sibling(&self, node: NodeId) -> Option<NodeId>;
}

#[derive(Clone)]
pub enum Prop {
    Value(Value),
    Handler(EventHandler),
}

impl Prop {
    pub fn handler<F>(handler: F) -> Self
    where
        F: Fn(&Value) -> HandlerResult + 'static,
    {
        Prop::Handler(Rc::new(handler))
    }

    fn as_value(&self) -> Option<&Value> {
        match self {
            Prop::Value(value) => Some(value),
            Prop::Handler(_) => None,
        }
    }
}

impl From<Value> for Prop {
    fn from(value: Value) -> Self {
        Prop::Value(value)
    }
}

impl fmt::Debug for Prop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prop::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Prop::Handler(_) => f.write_str("Handler(..)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropKind<'a> {
    Event(String),
    Style,
    Generic(&'a str),
}

/// `onPress` -> `Event("press")`, `style` -> `Style`, anything else is
/// forwarded as is.
pub fn classify_prop(key: &str) -> PropKind<'_> {
    if key == STYLE_PROP {
        return PropKind::Style;
    }

    if let Some(rest) = key.strip_prefix(EVENT_PREFIX) {
        let mut chars = rest.chars();
        if let Some(first) = chars.next().filter(char::is_ascii_uppercase) {
            let mut event = String::with_capacity(rest.len());
            event.push(first.to_ascii_lowercase());
            event.push_str(chars.as_str());
            return PropKind::Event(event);
        }
    }

    PropKind::Generic(key)
}

impl Bridge {
    /// Drops `root`, its descendants and their node event handlers.
    fn destroy_subtree(&mut self, root: NodeId) -> bool {
        let dropped = self.mirror.destroy(root);
        for node in &dropped {
            self.node_events.remove_node(*node);
        }
        !dropped.is_empty()
    }

    fn host_target(&self, node: NodeId) -> Result<(), BridgeError> {
        match self.mirror.kind(node) {
            None => Err(BridgeError::UnknownNode(node)),
            Some(kind) if kind.is_comment() => Err(BridgeError::CommentTarget(node)),
            Some(_) => Ok(()),
        }
    }

    fn apply_prop(
        &mut self,
        node: NodeId,
        key: &str,
        prev: Option<&Prop>,
        next: Option<&Prop>,
    ) -> Result<(), BridgeError> {
        self.host_target(node)?;

        match classify_prop(key) {
            PropKind::Event(event) => {
                self.patch_event(node, &event, next);
                Ok(())
            }
            PropKind::Style => {
                self.patch_style(node, prev, next);
                Ok(())
            }
            PropKind::Generic(key) => self.patch_generic(node, key, next),
        }
    }

    fn patch_event(&mut self, node: NodeId, event: &str, next: Option<&Prop>) {
        if self.node_events.deregister(node, event) {
            self.queue
                .enqueue(Operation::RemoveEventListener(node, event.to_string()));
        }

        if let Some(Prop::Handler(handler)) = next {
            self.node_events.register(node, event, handler.clone());
            self.queue
                .enqueue(Operation::AddEventListener(node, event.to_string()));
        }
    }

    fn patch_style(&mut self, node: NodeId, prev: Option<&Prop>, next: Option<&Prop>) {
        let prev = style_map(prev.and_then(Prop::as_value));
        let next = style_map(next.and_then(Prop::as_value));
        let patch = diff_style(&prev, &next);

        if !patch.is_empty() {
            self.queue.enqueue(Operation::UpdateStyle(node, patch));
        }
    }

    fn patch_generic(
        &mut self,
        node: NodeId,
        key: &str,
        next: Option<&Prop>,
    ) -> Result<(), BridgeError> {
        let value = match next {
            None => Value::Null,
            Some(Prop::Value(value)) => value.clone(),
            Some(Prop::Handler(_)) => {
                return Err(BridgeError::InvalidProp {
                    key: key.to_string(),
                    reason: "handlers are only accepted on event props".to_string(),
                });
            }
        };

        self.queue
            .enqueue(Operation::UpdateProp(node, key.to_string(), value));
        Ok(())
    }
}

impl Renderer for Bridge {
    fn create_element(&mut self, kind: &str) -> NodeId {
        let id = self.mirror.create_element(kind);
        self.queue.enqueue(Operation::Create(id, kind.to_string()));
        id
    }

    fn create_text(&mut self, text: &str) -> NodeId {
        let id = self.mirror.create_text(text);
        self.queue.enqueue(Operation::CreateText(id, text.to_string()));
        id
    }

    fn create_comment(&mut self, text: &str) -> NodeId {
        self.mirror.create_comment(text)
    }

    fn set_text(&mut self, node: NodeId, text: &str) {
        if !self.mirror.set_text(node, text) {
            tracing::warn!(node = %node, "set_text on unknown node");
            return;
        }
        if !self.mirror.is_comment(node) {
            self.queue.enqueue(Operation::SetText(node, text.to_string()));
        }
    }

    fn set_element_text(&mut self, node: NodeId, text: &str) {
        let replaced = self.mirror.children(node).to_vec();
        if !self.mirror.set_element_text(node, text) {
            tracing::warn!(node = %node, "set_element_text on unknown node");
            return;
        }
        for child in replaced {
            self.destroy_subtree(child);
        }
        if !self.mirror.is_comment(node) {
            self.queue
                .enqueue(Operation::SetElementText(node, text.to_string()));
        }
    }

    fn patch_prop(&mut self, node: NodeId, key: &str, prev: Option<&Prop>, next: Option<&Prop>) {
        if let Err(err) = self.apply_prop(node, key, prev, next) {
            tracing::error!(node = %node, key, error = %err, "prop patch failed");
        }
    }

    fn insert(&mut self, child: NodeId, parent: NodeId, anchor: Option<NodeId>) {
        let anchor = anchor.filter(|anchor| *anchor != child);

        if !self.mirror.insert(child, parent, anchor) {
            tracing::error!(
                child = %child,
                parent = %parent,
                "insert with unknown node or into own subtree; mirror unchanged"
            );
            return;
        }

        if self.mirror.is_comment(child) || self.mirror.is_comment(parent) {
            return;
        }

        let op = match self.mirror.host_anchor(parent, anchor) {
            Some(anchor) => Operation::InsertBefore(parent, child, anchor),
            None => Operation::AppendChild(parent, child),
        };
        self.queue.enqueue(op);
    }

    fn remove(&mut self, child: NodeId) {
        let attached = self.mirror.parent_node(child).is_some();
        let comment = self.mirror.is_comment(child);

        if !self.destroy_subtree(child) {
            tracing::debug!(child = %child, "remove on unknown node");
            return;
        }

        if attached && !comment {
            self.queue.enqueue(Operation::RemoveChild(child));
        }
    }

    fn parent_node(&self, node: NodeId) -> Option<NodeId> {
        self.mirror.parent_node(node)
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.mirror.next_sibling(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::queue::tests::RecordingHost;
    use serde_json::json;
    use std::cell::Cell;

    fn bridge_with_host() -> (Bridge, RecordingHost) {
        let host = RecordingHost::default();
        let mut bridge = Bridge::new(BridgeConfig::default());
        bridge.attach_host(Box::new(host.clone()));
        (bridge, host)
    }

    fn style(value: Value) -> Prop {
        Prop::Value(value)
    }

    #[test]
    fn classifies_event_style_and_generic_keys() {
        assert_eq!(classify_prop("onPress"), PropKind::Event("press".to_string()));
        assert_eq!(
            classify_prop("onLongPress"),
            PropKind::Event("longPress".to_string())
        );
        assert_eq!(classify_prop("style"), PropKind::Style);
        assert_eq!(classify_prop("once"), PropKind::Generic("once"));
        assert_eq!(classify_prop("on"), PropKind::Generic("on"));
        assert_eq!(classify_prop("onpress"), PropKind::Generic("onpress"));
    }

    #[test]
    fn three_creates_in_one_turn_make_one_batch() {
        let (mut bridge, host) = bridge_with_host();

        let a = bridge.create_element("view");
        let b = bridge.create_element("text");
        let c = bridge.create_element("image");
        assert_eq!(host.batch_count(), 0);

        bridge.end_turn();

        assert_eq!(host.batch_count(), 1);
        assert_eq!(
            host.last_batch(),
            vec![
                Operation::Create(a, "view".to_string()),
                Operation::Create(b, "text".to_string()),
                Operation::Create(c, "image".to_string()),
            ]
        );
    }

    #[test]
    fn comments_stay_out_of_host_batches() {
        let (mut bridge, host) = bridge_with_host();
        let root = bridge.create_element("view");
        let marker = bridge.create_comment("v-if");
        let label = bridge.create_text("hello");

        bridge.insert(marker, root, None);
        bridge.insert(label, root, Some(marker));
        bridge.set_text(marker, "v-else");
        bridge.remove(marker);
        bridge.flush_sync();

        let ops = host.all_ops();
        assert_eq!(
            ops,
            vec![
                Operation::Create(root, "view".to_string()),
                Operation::CreateText(label, "hello".to_string()),
                Operation::AppendChild(root, label),
            ]
        );
        assert_eq!(bridge.parent_node(label), Some(root));
        assert_eq!(bridge.parent_node(marker), None);
    }

    #[test]
    fn comment_anchor_resolves_to_next_real_sibling() {
        let (mut bridge, host) = bridge_with_host();
        let root = bridge.create_element("view");
        let start = bridge.create_comment("fragment-start");
        let tail = bridge.create_element("footer");
        bridge.insert(start, root, None);
        bridge.insert(tail, root, None);
        bridge.flush_sync();

        let item = bridge.create_element("item");
        bridge.insert(item, root, Some(start));
        bridge.flush_sync();

        assert_eq!(
            host.last_batch(),
            vec![
                Operation::Create(item, "item".to_string()),
                Operation::InsertBefore(root, item, tail),
            ]
        );
        assert_eq!(bridge.next_sibling(item), Some(start));
        assert_eq!(bridge.next_sibling(start), Some(tail));
    }

    #[test]
    fn reparent_emits_single_append_to_new_parent() {
        let (mut bridge, host) = bridge_with_host();
        let x = bridge.create_element("view");
        let y = bridge.create_element("view");
        let child = bridge.create_element("text");
        bridge.insert(child, x, None);
        bridge.flush_sync();

        bridge.insert(child, y, None);
        bridge.flush_sync();

        assert_eq!(host.last_batch(), vec![Operation::AppendChild(y, child)]);
        assert!(bridge.mirror().children(x).is_empty());
        assert_eq!(bridge.mirror().children(y), &[child]);
        assert_eq!(bridge.parent_node(child), Some(y));
    }

    #[test]
    fn set_element_text_unlinks_children_and_forwards_text() {
        let (mut bridge, host) = bridge_with_host();
        let label = bridge.create_element("text");
        let run = bridge.create_text("old");
        bridge.insert(run, label, None);
        bridge.flush_sync();

        bridge.set_element_text(label, "new");
        bridge.flush_sync();

        assert_eq!(
            host.last_batch(),
            vec![Operation::SetElementText(label, "new".to_string())]
        );
        assert_eq!(bridge.parent_node(run), None);
        assert!(!bridge.mirror().contains(run));
        assert!(bridge.mirror().children(label).is_empty());
    }

    #[test]
    fn style_patch_is_one_coalesced_update() {
        let (mut bridge, host) = bridge_with_host();
        let node = bridge.create_element("view");
        bridge.flush_sync();

        bridge.patch_prop(
            node,
            "style",
            Some(&style(json!({"a": 1, "b": 2}))),
            Some(&style(json!({"b": 2, "c": 3}))),
        );
        bridge.flush_sync();

        let batch = host.last_batch();
        assert_eq!(batch.len(), 1);
        match &batch[0] {
            Operation::UpdateStyle(id, patch) => {
                assert_eq!(*id, node);
                assert_eq!(Value::Object(patch.clone()), json!({"a": null, "c": 3}));
            }
            other => panic!("expected style update, got {other:?}"),
        }
    }

    #[test]
    fn unchanged_style_emits_nothing() {
        let (mut bridge, _host) = bridge_with_host();
        let node = bridge.create_element("view");
        bridge.flush_sync();

        let same = style(json!({"flex": 1}));
        bridge.patch_prop(node, "style", Some(&same), Some(&same));

        assert!(bridge.pending_operations().is_empty());
    }

    #[test]
    fn generic_prop_removal_sends_null() {
        let (mut bridge, host) = bridge_with_host();
        let node = bridge.create_element("image");
        bridge.patch_prop(node, "source", None, Some(&json!("a.png").into()));
        bridge.patch_prop(node, "source", Some(&json!("a.png").into()), None);
        bridge.flush_sync();

        let ops = host.all_ops();
        assert_eq!(
            &ops[1..],
            &[
                Operation::UpdateProp(node, "source".to_string(), json!("a.png")),
                Operation::UpdateProp(node, "source".to_string(), Value::Null),
            ]
        );
    }

    #[test]
    fn handler_swap_deregisters_before_registering() {
        let (mut bridge, host) = bridge_with_host();
        let node = bridge.create_element("button");
        let first_hits = Rc::new(Cell::new(0));
        let second_hits = Rc::new(Cell::new(0));
        let first = {
            let hits = first_hits.clone();
            Prop::handler(move |_| {
                hits.set(hits.get() + 1);
                Ok(())
            })
        };
        let second = {
            let hits = second_hits.clone();
            Prop::handler(move |_| {
                hits.set(hits.get() + 1);
                Ok(())
            })
        };

        bridge.patch_prop(node, "onPress", None, Some(&first));
        bridge.patch_prop(node, "onPress", Some(&first), Some(&second));
        bridge.flush_sync();

        let ops = host.all_ops();
        assert_eq!(
            &ops[1..],
            &[
                Operation::AddEventListener(node, "press".to_string()),
                Operation::RemoveEventListener(node, "press".to_string()),
                Operation::AddEventListener(node, "press".to_string()),
            ]
        );

        bridge.handle_native_event(node, "press", json!({}));
        assert_eq!(first_hits.get(), 0);
        assert_eq!(second_hits.get(), 1);
        assert_eq!(bridge.registered_node_events(), 1);
    }

    #[test]
    fn removed_subtree_is_destroyed_with_its_handlers() {
        let (mut bridge, host) = bridge_with_host();
        let root = bridge.create_element("view");
        let row = bridge.create_element("row");
        let button = bridge.create_element("button");
        bridge.insert(row, root, None);
        bridge.insert(button, row, None);
        let hits = Rc::new(Cell::new(0));
        let handler = {
            let hits = hits.clone();
            Prop::handler(move |_| {
                hits.set(hits.get() + 1);
                Ok(())
            })
        };
        bridge.patch_prop(button, "onPress", None, Some(&handler));
        bridge.flush_sync();

        bridge.remove(row);
        bridge.flush_sync();

        assert_eq!(host.last_batch(), vec![Operation::RemoveChild(row)]);
        assert_eq!(bridge.mirror().len(), 1);
        assert_eq!(bridge.registered_node_events(), 0);

        bridge.handle_native_event(button, "press", json!({}));
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn insert_into_own_subtree_is_rejected() {
        let (mut bridge, host) = bridge_with_host();
        let outer = bridge.create_element("view");
        let inner = bridge.create_element("view");
        bridge.insert(inner, outer, None);
        bridge.flush_sync();

        bridge.insert(outer, inner, None);
        bridge.flush_sync();

        assert_eq!(host.batch_count(), 1);
        assert_eq!(bridge.parent_node(outer), None);
        assert_eq!(bridge.parent_node(inner), Some(outer));
    }

    #[test]
    fn removing_handler_prop_deregisters() {
        let (mut bridge, host) = bridge_with_host();
        let node = bridge.create_element("button");
        let handler = Prop::handler(|_| Ok(()));

        bridge.patch_prop(node, "onPress", None, Some(&handler));
        bridge.patch_prop(node, "onPress", Some(&handler), None);
        bridge.flush_sync();

        assert_eq!(
            host.all_ops().last(),
            Some(&Operation::RemoveEventListener(node, "press".to_string()))
        );
        assert_eq!(bridge.registered_node_events(), 0);
    }

    #[test]
    fn failed_patch_is_contained() {
        let (mut bridge, _host) = bridge_with_host();
        let node = bridge.create_element("view");
        let marker = bridge.create_comment("anchor");
        bridge.flush_sync();

        bridge.patch_prop(NodeId(9_999), "title", None, Some(&json!("x").into()));
        bridge.patch_prop(marker, "title", None, Some(&json!("x").into()));
        bridge.patch_prop(node, "title", None, Some(&Prop::handler(|_| Ok(()))));

        assert!(bridge.pending_operations().is_empty());
        assert!(bridge.mirror().contains(node));
    }

    #[test]
    fn insert_with_unknown_parent_leaves_mirror_alone() {
        let (mut bridge, _host) = bridge_with_host();
        let node = bridge.create_element("view");
        bridge.flush_sync();

        bridge.insert(node, NodeId(4_242), None);

        assert_eq!(bridge.parent_node(node), None);
        assert!(bridge.pending_operations().is_empty());
    }
}
