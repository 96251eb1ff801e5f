//! Client-side replay of synchronization frames.
//!
//! [`Mirror`] keeps the receiving end's copy of the model as a
//! `serde_json::Value` and applies `{"m": ...}` frames to it the same way the
//! browser client does. New-node markers are stripped from the stored value.

use crate::config::ProtocolConfig;
use crate::error::{Result, TetherError};
use serde_json::{Map, Value};

/// The receiving end's copy of a synchronized model.
#[derive(Debug, Clone, Default)]
pub struct Mirror {
    root: Value,
    frames: usize,
}

impl Mirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Number of synchronization frames applied so far.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Apply one frame given as JSON text.
    pub fn apply_frame(&mut self, frame: &str) -> Result<()> {
        let message: Value = serde_json::from_str(frame)?;
        self.apply_message(&message)
    }

    /// Apply one parsed `{"m": ...}` message.
    pub fn apply_message(&mut self, message: &Value) -> Result<()> {
        let diff = message
            .get("m")
            .ok_or_else(|| TetherError::malformed("frame has no \"m\" key"))?;
        self.frames += 1;
        if self.frames > 1 && diff.is_null() {
            // Nothing changed.
            return Ok(());
        }
        apply_diff(&mut self.root, diff)
    }
}

fn apply_diff(slot: &mut Value, diff: &Value) -> Result<()> {
    match diff {
        Value::Object(object) if object.contains_key(ProtocolConfig::LIST_DIFF_KEY) => {
            apply_list(slot, object)
        }
        Value::Object(object) if object.contains_key(ProtocolConfig::NEW_NODE_MARKER) => {
            *slot = materialize(diff);
            Ok(())
        }
        Value::Object(object) => {
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            let Value::Object(target) = slot else {
                return Err(TetherError::malformed("object patch target vanished"));
            };
            for (key, value) in object {
                let entry = target.entry(key.clone()).or_insert(Value::Null);
                apply_diff(entry, value)?;
            }
            Ok(())
        }
        other => {
            *slot = materialize(other);
            Ok(())
        }
    }
}

/// Copy a value, dropping new-node markers.
fn materialize(value: &Value) -> Value {
    match value {
        Value::Object(object) => Value::Object(
            object
                .iter()
                .filter(|(key, _)| key.as_str() != ProtocolConfig::NEW_NODE_MARKER)
                .map(|(key, value)| (key.clone(), materialize(value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(materialize).collect()),
        other => other.clone(),
    }
}

fn count(token: &Value, what: &str) -> Result<usize> {
    token
        .as_u64()
        .map(|n| n as usize)
        .ok_or_else(|| TetherError::malformed(format!("{} is not a count: {}", what, token)))
}

fn apply_list(slot: &mut Value, diff: &Map<String, Value>) -> Result<()> {
    let tokens = diff
        .get(ProtocolConfig::LIST_DIFF_KEY)
        .and_then(Value::as_array)
        .ok_or_else(|| TetherError::malformed("list diff without token array"))?;
    let length = diff
        .get(ProtocolConfig::LIST_LENGTH_KEY)
        .ok_or_else(|| TetherError::malformed("list diff without length"))
        .and_then(|l| count(l, "list length"))?;
    let array = slot
        .as_array_mut()
        .ok_or_else(|| TetherError::malformed("list diff applied to a non-array"))?;
    if array.len() < length {
        return Err(TetherError::malformed(format!(
            "list diff keeps {} elements of {}",
            length,
            array.len()
        )));
    }
    array.truncate(length);

    let underflow = || TetherError::malformed("list diff steps past the start");
    let mut pos = array.len();
    let mut insert_count = 0usize;
    for token in tokens.iter().rev() {
        match token {
            Value::Number(_) => {
                pos = pos.checked_sub(count(token, "skip")?).ok_or_else(underflow)?;
            }
            Value::Object(object) if object.contains_key(ProtocolConfig::DELETE_KEY) => {
                let n = count(&object[ProtocolConfig::DELETE_KEY], "delete")?;
                pos = pos.checked_sub(n).ok_or_else(underflow)?;
                array.drain(pos..pos + n);
            }
            Value::Object(object) if object.contains_key(ProtocolConfig::INSERT_KEY) => {
                insert_count = count(&object[ProtocolConfig::INSERT_KEY], "insert")?;
            }
            value if insert_count > 0 => {
                array.insert(pos, materialize(value));
                insert_count -= 1;
            }
            value => {
                pos = pos.checked_sub(1).ok_or_else(underflow)?;
                apply_diff(&mut array[pos], value)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mirror_of(snapshot: Value) -> Mirror {
        let mut mirror = Mirror::new();
        mirror.apply_message(&json!({ "m": snapshot })).unwrap();
        mirror
    }

    #[test]
    fn test_snapshot_strips_markers() {
        let mirror = mirror_of(json!({"$m": 1, "Age": 42, "Details": {"$m": 1, "Name": "Joe"}}));
        assert_eq!(mirror.root(), &json!({"Age": 42, "Details": {"Name": "Joe"}}));
    }

    #[test]
    fn test_object_patch_keeps_other_keys() {
        let mut mirror = mirror_of(json!({"$m": 1, "Age": 42, "Name": "Joe"}));
        mirror.apply_frame(r#"{"m":{"Age":30}}"#).unwrap();
        assert_eq!(mirror.root(), &json!({"Age": 30, "Name": "Joe"}));

        mirror.apply_frame(r#"{"m":null}"#).unwrap();
        assert_eq!(mirror.root(), &json!({"Age": 30, "Name": "Joe"}));
        assert_eq!(mirror.frames(), 3);
    }

    #[test]
    fn test_list_insert_and_delete() {
        let mut mirror = mirror_of(json!({"$m": 1, "List": ["A", "B"]}));

        mirror
            .apply_frame(r#"{"m":{"List":{"$a":[0,"X","A2",{"$i":1},1,"Y","Z",{"$i":2}],"$l":2}}}"#)
            .unwrap();
        assert_eq!(mirror.root()["List"], json!(["X", "A2", "B", "Y", "Z"]));

        mirror
            .apply_frame(r#"{"m":{"List":{"$a":[0,{"$d":1},4],"$l":5}}}"#)
            .unwrap();
        assert_eq!(mirror.root()["List"], json!(["A2", "B", "Y", "Z"]));
    }

    #[test]
    fn test_list_patch_in_place() {
        let mut mirror = mirror_of(json!({"List": [{"Name": "a"}, {"Name": "b"}]}));
        mirror
            .apply_frame(r#"{"m":{"List":{"$a":[0,1,{"Name":"B"}],"$l":2}}}"#)
            .unwrap();
        assert_eq!(mirror.root()["List"], json!([{"Name": "a"}, {"Name": "B"}]));
    }

    #[test]
    fn test_malformed_list_diff() {
        let mut mirror = mirror_of(json!({"List": [1]}));
        let err = mirror
            .apply_frame(r#"{"m":{"List":{"$a":[0,5],"$l":1}}}"#)
            .unwrap_err();
        assert!(matches!(err, TetherError::MalformedDiff { .. }));

        let err = mirror.apply_frame(r#"{"x":1}"#).unwrap_err();
        assert!(matches!(err, TetherError::MalformedDiff { .. }));
    }
}
