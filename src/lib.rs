pub mod bridge;
pub mod config;
pub mod error;
pub mod events;
pub mod inbox;
pub mod mirror;
pub mod modules;
pub mod protocol;
pub mod queue;
pub mod renderer;
pub mod style;
pub mod virtual_list;

pub use crate::bridge::Bridge;
pub use crate::config::BridgeConfig;
pub use crate::error::{BridgeError, HandlerError, HandlerResult, HostError};
pub use crate::events::{EventHandler, GlobalEventBus, Unsubscribe};
pub use crate::inbox::{Inbound, Inbox};
pub use crate::mirror::{NodeId, NodeKind, NodeMirror};
pub use crate::modules::{CallHandle, CallState, Clock, ManualClock, SystemClock};
pub use crate::protocol::{HostEnvelope, Operation};
pub use crate::queue::{FramedHost, NativeHost, QueueStats};
pub use crate::renderer::{Prop, PropKind, Renderer, classify_prop};
pub use crate::style::{StyleMap, diff_style};
pub use crate::virtual_list::{ItemHeights, VirtualList, Window, WindowParams, compute_window};
pub use serde_json;
