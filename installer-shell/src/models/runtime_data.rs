// Shared run data
//
// Key/value data shared between dialogs and the engine's custom actions. It is persisted as one
// JSON string in the engine's store slot on every dialog transition and merged back once at
// shell start (client handlers may have changed it).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuntimeData {
    values: BTreeMap<String, String>,
}

impl RuntimeData {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Overwrites existing keys with the values found in `serialized`; keys absent from it are
    /// kept.
    pub fn merge_replace(&mut self, serialized: &str) -> Result<usize, serde_json::Error> {
        if serialized.trim().is_empty() {
            return Ok(0);
        }
        let incoming: RuntimeData = serde_json::from_str(serialized)?;
        let count = incoming.values.len();
        self.values.extend(incoming.values);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_replace_overwrites_and_keeps() {
        let mut data = RuntimeData::default();
        data.set("INSTALLDIR", "C:\\Old");
        data.set("KEEP", "1");

        let merged = data
            .merge_replace(r#"{"INSTALLDIR":"D:\\New","EXTRA":"x"}"#)
            .unwrap();

        assert_eq!(merged, 2);
        assert_eq!(data.get("INSTALLDIR"), Some("D:\\New"));
        assert_eq!(data.get("KEEP"), Some("1"));
        assert_eq!(data.get("EXTRA"), Some("x"));
    }

    #[test]
    fn merge_replace_ignores_blank_input() {
        let mut data = RuntimeData::default();
        assert_eq!(data.merge_replace("   ").unwrap(), 0);
        assert!(data.is_empty());
    }

    #[test]
    fn merge_replace_rejects_garbage() {
        let mut data = RuntimeData::default();
        assert!(data.merge_replace("not json").is_err());
    }

    #[test]
    fn serialized_form_is_a_flat_json_object() {
        let mut data = RuntimeData::default();
        data.set("A", "1");
        assert_eq!(data.to_json().unwrap(), r#"{"A":"1"}"#);
    }
}
