use serde_json::Value;
use std::collections::HashMap;

/// Receiver-side record of pinned events: name → arguments of the latest pin.
#[derive(Debug, Default, Clone)]
pub struct PinStore {
    entries: HashMap<String, Vec<Value>>,
}

impl PinStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `args` as the pinned arguments for `name`, replacing any
    /// previous snapshot.
    pub fn pin(&mut self, name: impl Into<String>, args: Vec<Value>) {
        self.entries.insert(name.into(), args);
    }

    /// Returns `true` if a pin was removed.
    pub fn unpin(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&[Value]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pin_overwrites_snapshot() {
        let mut pins = PinStore::new();
        pins.pin("ready", vec![json!(1)]);
        pins.pin("ready", vec![json!(2), json!(3)]);

        assert_eq!(pins.get("ready"), Some(&[json!(2), json!(3)][..]));
        assert_eq!(pins.len(), 1);
    }

    #[test]
    fn test_empty_args_still_pinned() {
        let mut pins = PinStore::new();
        pins.pin("ready", vec![]);

        assert!(pins.contains("ready"));
        assert_eq!(pins.get("ready"), Some(&[][..]));
    }

    #[test]
    fn test_unpin() {
        let mut pins = PinStore::new();
        pins.pin("ready", vec![json!("x")]);

        assert!(pins.unpin("ready"));
        assert!(!pins.unpin("ready"));
        assert!(pins.get("ready").is_none());
        assert!(pins.is_empty());
    }
}
