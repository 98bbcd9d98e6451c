use crate::protocol::DEFAULT_MAX_FRAME_BYTES;
use std::time::Duration;

pub const DEFAULT_MAX_CALLBACK_ID: u64 = 2_147_483_647;

const CALL_TIMEOUT_ENV: &str = "UI_BRIDGE_CALL_TIMEOUT_MS";
const MAX_CALLBACK_ID_ENV: &str = "UI_BRIDGE_MAX_CALLBACK_ID";
const MAX_FRAME_BYTES_ENV: &str = "UI_BRIDGE_MAX_FRAME_BYTES";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub default_call_timeout: Option<Duration>,
    pub max_callback_id: u64,
    pub max_frame_bytes: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            default_call_timeout: None,
            max_callback_id: DEFAULT_MAX_CALLBACK_ID,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

impl BridgeConfig {
    /// Defaults overridden by `UI_BRIDGE_*` variables. Unparseable or zero
    /// values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            default_call_timeout: parse_positive::<u64>(lookup(CALL_TIMEOUT_ENV))
                .map(Duration::from_millis)
                .or(defaults.default_call_timeout),
            max_callback_id: parse_positive(lookup(MAX_CALLBACK_ID_ENV))
                .unwrap_or(defaults.max_callback_id),
            max_frame_bytes: parse_positive(lookup(MAX_FRAME_BYTES_ENV))
                .unwrap_or(defaults.max_frame_bytes),
        }
    }
}

fn parse_positive<T>(raw: Option<String>) -> Option<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    raw.and_then(|raw| raw.trim().parse::<T>().ok())
        .filter(|value| *value > T::default())
}
