//! Wire messages exchanged with the client.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client request: `{"n": name, "v": [args...], "id": n}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    #[serde(rename = "n")]
    pub name: String,
    #[serde(rename = "v", default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub id: i64,
}

impl Invocation {
    pub fn new(name: impl Into<String>, args: Vec<Value>, id: i64) -> Self {
        Self {
            name: name.into(),
            args,
            id,
        }
    }
}

/// Response to one invocation: `{"v": value?, "a": [values]?, "e": error?, "id": n}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultMessage {
    #[serde(rename = "v", default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(rename = "a", default, skip_serializing_if = "Option::is_none")]
    pub array: Option<Vec<Value>>,
    #[serde(rename = "e", default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub id: i64,
}

impl ResultMessage {
    /// Success with the operation's return values. One value goes in `v`,
    /// several go in `a`, none leaves both out.
    pub fn success(id: i64, mut values: Vec<Value>) -> Self {
        let (value, array) = match values.len() {
            0 => (None, None),
            1 => (values.pop(), None),
            _ => (None, Some(values)),
        };
        Self {
            value,
            array,
            error: None,
            id,
        }
    }

    pub fn failure(id: i64, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            id,
            ..Self::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Server-pushed event: `{"ev": payload, "n": name}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    #[serde(rename = "ev")]
    pub payload: Value,
    #[serde(rename = "n")]
    pub name: String,
}

/// Server-requested client function call: `{"a": [args...], "f": name}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallMessage {
    #[serde(rename = "a")]
    pub args: Vec<Value>,
    #[serde(rename = "f")]
    pub function: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_invocation_defaults() {
        let inv: Invocation = serde_json::from_str(r#"{"n":"goui:gui_terminated"}"#).unwrap();
        assert_eq!(inv.name, "goui:gui_terminated");
        assert!(inv.args.is_empty());
        assert_eq!(inv.id, 0);

        let inv: Invocation = serde_json::from_str(r#"{"n":"FooArr","v":[1,"x"],"id":7}"#).unwrap();
        assert_eq!(inv.args, vec![json!(1), json!("x")]);
        assert_eq!(inv.id, 7);
    }

    #[test]
    fn test_result_shapes() {
        let one = ResultMessage::success(0, vec![json!(10)]);
        assert_eq!(serde_json::to_string(&one).unwrap(), r#"{"v":10,"id":0}"#);

        let many = ResultMessage::success(3, vec![json!(1), json!(2)]);
        assert_eq!(serde_json::to_string(&many).unwrap(), r#"{"a":[1,2],"id":3}"#);

        let none = ResultMessage::success(4, Vec::new());
        assert_eq!(serde_json::to_string(&none).unwrap(), r#"{"id":4}"#);

        let null = ResultMessage::success(5, vec![Value::Null]);
        assert_eq!(serde_json::to_string(&null).unwrap(), r#"{"v":null,"id":5}"#);

        let err = ResultMessage::failure(0, "Value is negative");
        assert_eq!(
            serde_json::to_string(&err).unwrap(),
            r#"{"e":"Value is negative","id":0}"#
        );
        assert!(err.is_error());
    }

    #[test]
    fn test_push_messages() {
        let event = EventMessage {
            payload: json!({"x": 1}),
            name: "tick".into(),
        };
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"ev":{"x":1},"n":"tick"}"#
        );

        let call = CallMessage {
            args: vec![json!("hi")],
            function: "alert".into(),
        };
        assert_eq!(serde_json::to_string(&call).unwrap(), r#"{"a":["hi"],"f":"alert"}"#);
    }
}
