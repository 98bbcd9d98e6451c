use serde_json::{Map, Value};

pub type StyleMap = Map<String, Value>;

/// Keys that changed between `prev` and `next`. Keys dropped from `next`
/// come back as `null` so the host can reset them to their default.
pub fn diff_style(prev: &StyleMap, next: &StyleMap) -> StyleMap {
    let mut patch = StyleMap::new();

    for (key, value) in next {
        if prev.get(key) != Some(value) {
            patch.insert(key.clone(), value.clone());
        }
    }

    for key in prev.keys() {
        if !next.contains_key(key) {
            patch.insert(key.clone(), Value::Null);
        }
    }

    patch
}

pub fn style_map(value: Option<&Value>) -> StyleMap {
    match value {
        Some(Value::Object(map)) => map.clone(),
        _ => StyleMap::new(),
    }
}
