//! Protocol envelopes and their wire representation.
//!
//! Every envelope is a record tagged with `"type": "ipc-event-emitter"` so it
//! can share a channel with unrelated traffic:
//!
//! ```text
//! { "type": "ipc-event-emitter", "emit": [name, ...args] }
//! { "type": "ipc-event-emitter", "emit": [name, ...args], "pin": true }
//! { "type": "ipc-event-emitter", "unpin": name }
//! ```
//!
//! Peers may send a number or `true` as the `unpin` name; it is taken as its
//! string form (`5` unpins `"5"`). An array or object there makes the record
//! foreign.

use serde_json::{Map, Value};

use crate::codec::Codec;
use crate::error::Result;

/// Marker value distinguishing this protocol's records from foreign traffic.
pub const PROTOCOL_TYPE: &str = "ipc-event-emitter";

/// Event name that can never be pinned.
pub const ERROR_EVENT: &str = "error";

const TYPE_FIELD: &str = "type";
const EMIT_FIELD: &str = "emit";
const PIN_FIELD: &str = "pin";
const UNPIN_FIELD: &str = "unpin";

#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Emit { name: String, args: Vec<Value> },
    Pin { name: String, args: Vec<Value> },
    Unpin { name: String },
}

impl Envelope {
    pub fn name(&self) -> &str {
        match self {
            Envelope::Emit { name, .. } | Envelope::Pin { name, .. } | Envelope::Unpin { name } => {
                name
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Emit { .. } => "emit",
            Envelope::Pin { .. } => "pin",
            Envelope::Unpin { .. } => "unpin",
        }
    }

    /// Build the protocol record for this envelope.
    pub fn to_value(&self) -> Value {
        let mut record = Map::new();
        record.insert(TYPE_FIELD.into(), Value::from(PROTOCOL_TYPE));

        match self {
            Envelope::Emit { name, args } => {
                record.insert(EMIT_FIELD.into(), emit_array(name, args));
            }
            Envelope::Pin { name, args } => {
                record.insert(EMIT_FIELD.into(), emit_array(name, args));
                record.insert(PIN_FIELD.into(), Value::Bool(true));
            }
            Envelope::Unpin { name } => {
                record.insert(UNPIN_FIELD.into(), Value::from(name.as_str()));
            }
        }

        Value::Object(record)
    }

    /// Interpret a decoded record.
    ///
    /// Returns `None` for anything that is not a well-formed envelope of this
    /// protocol. A truthy `unpin` takes precedence over `emit`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let record = value.as_object()?;

        if record.get(TYPE_FIELD)?.as_str()? != PROTOCOL_TYPE {
            return None;
        }

        if let Some(unpin) = record.get(UNPIN_FIELD).filter(|v| is_truthy(v)) {
            return Some(Envelope::Unpin {
                name: unpin_name(unpin)?,
            });
        }

        let (first, rest) = record.get(EMIT_FIELD)?.as_array()?.split_first()?;
        let name = first.as_str().filter(|name| !name.is_empty())?.to_string();
        let args = rest.to_vec();

        if record.get(PIN_FIELD).is_some_and(is_truthy) {
            Some(Envelope::Pin { name, args })
        } else {
            Some(Envelope::Emit { name, args })
        }
    }

    pub fn encode<C: Codec>(&self, codec: &C) -> Result<Vec<u8>> {
        codec.encode(&self.to_value())
    }

    /// Decode a channel payload, or `None` if it is not one of ours.
    pub fn decode<C: Codec>(codec: &C, data: &[u8]) -> Option<Self> {
        let value: Value = codec.decode(data).ok()?;
        Self::from_value(&value)
    }
}

fn emit_array(name: &str, args: &[Value]) -> Value {
    let mut emit = Vec::with_capacity(args.len() + 1);
    emit.push(Value::from(name));
    emit.extend(args.iter().cloned());
    Value::Array(emit)
}

fn unpin_name(value: &Value) -> Option<String> {
    match value {
        Value::String(name) => Some(name.clone()),
        Value::Number(n) => Some(match (n.as_i64(), n.as_f64()) {
            (Some(int), _) => int.to_string(),
            (None, Some(float)) if float.fract() == 0.0 && float.abs() < 1e21 => {
                format!("{}", float as i64)
            }
            _ => n.to_string(),
        }),
        Value::Bool(true) => Some("true".to_string()),
        _ => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use serde_json::json;

    #[test]
    fn test_wire_shapes() {
        let emit = Envelope::Emit {
            name: "downloaded".into(),
            args: vec![json!("http://example.com/file.txt")],
        };
        assert_eq!(
            emit.to_value(),
            json!({"type": "ipc-event-emitter", "emit": ["downloaded", "http://example.com/file.txt"]})
        );

        let pin = Envelope::Pin {
            name: "ready".into(),
            args: vec![json!(1), json!(2)],
        };
        assert_eq!(
            pin.to_value(),
            json!({"type": "ipc-event-emitter", "emit": ["ready", 1, 2], "pin": true})
        );

        let unpin = Envelope::Unpin {
            name: "ready".into(),
        };
        assert_eq!(
            unpin.to_value(),
            json!({"type": "ipc-event-emitter", "unpin": "ready"})
        );
    }

    #[test]
    fn test_decode_through_codec() {
        let pin = Envelope::Pin {
            name: "ready".into(),
            args: vec![json!({"port": 8080}), json!(null)],
        };
        let bytes = pin.encode(&JsonCodec).unwrap();
        assert_eq!(Envelope::decode(&JsonCodec, &bytes), Some(pin));
    }

    #[test]
    fn test_pin_without_args() {
        let value = json!({"type": "ipc-event-emitter", "emit": ["ready"], "pin": true});
        assert_eq!(
            Envelope::from_value(&value),
            Some(Envelope::Pin {
                name: "ready".into(),
                args: vec![],
            })
        );
    }

    #[test]
    fn test_foreign_traffic_is_rejected() {
        let foreign = [
            json!("hello"),
            json!(42),
            json!({"emit": ["ready"]}),
            json!({"type": "something-else", "emit": ["ready"]}),
            json!({"type": "ipc-event-emitter"}),
            json!({"type": "ipc-event-emitter", "emit": []}),
            json!({"type": "ipc-event-emitter", "emit": [""]}),
            json!({"type": "ipc-event-emitter", "emit": [7, "x"]}),
            json!({"type": "ipc-event-emitter", "emit": "ready"}),
            json!({"type": "ipc-event-emitter", "unpin": ["ready"]}),
            json!({"type": "ipc-event-emitter", "unpin": {"name": "ready"}}),
        ];

        for value in &foreign {
            assert_eq!(Envelope::from_value(value), None, "accepted {value}");
        }

        assert_eq!(Envelope::decode(&JsonCodec, b"{not json"), None);
    }

    #[test]
    fn test_scalar_unpin_names_are_stringified() {
        let cases = [
            (json!(5), "5"),
            (json!(5.0), "5"),
            (json!(-2), "-2"),
            (json!(1.5), "1.5"),
            (json!(true), "true"),
        ];

        for (unpin, expected) in cases {
            let value = json!({"type": "ipc-event-emitter", "unpin": unpin});
            assert_eq!(
                Envelope::from_value(&value),
                Some(Envelope::Unpin {
                    name: expected.into()
                }),
                "{unpin}"
            );
        }
    }

    #[test]
    fn test_unpin_takes_precedence() {
        let value = json!({"type": "ipc-event-emitter", "unpin": "ready", "emit": ["ready"], "pin": true});
        assert_eq!(
            Envelope::from_value(&value),
            Some(Envelope::Unpin {
                name: "ready".into()
            })
        );

        // a falsy unpin falls through to emit
        let value = json!({"type": "ipc-event-emitter", "unpin": "", "emit": ["ready", 1]});
        assert_eq!(
            Envelope::from_value(&value),
            Some(Envelope::Emit {
                name: "ready".into(),
                args: vec![json!(1)],
            })
        );
    }
}
