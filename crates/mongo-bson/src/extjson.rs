//! Relaxed extended JSON rendering, used by `bson-dump` and for diagnostics.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::SecondsFormat;
use serde_json::{json, Map, Value};

use crate::document::Document;
use crate::value::Bson;

impl Bson {
    /// Converts to relaxed extended JSON: numbers and strings stay native,
    /// other BSON types become `$`-prefixed wrapper objects.
    pub fn to_relaxed_extjson(&self) -> Value {
        match self {
            Bson::Null => Value::Null,
            Bson::Boolean(b) => Value::Bool(*b),
            Bson::Int32(v) => json!(v),
            Bson::Int64(v) => json!(v),
            Bson::Double(v) if v.is_finite() => json!(v),
            Bson::Double(v) => {
                let repr = if v.is_nan() {
                    "NaN"
                } else if *v > 0.0 {
                    "Infinity"
                } else {
                    "-Infinity"
                };
                json!({ "$numberDouble": repr })
            }
            Bson::String(s) => Value::String(s.clone()),
            Bson::Document(d) => d.to_relaxed_extjson(),
            Bson::Array(items) => Value::Array(items.iter().map(Bson::to_relaxed_extjson).collect()),
            Bson::Binary(binary) => json!({
                "$binary": {
                    "base64": STANDARD.encode(&binary.bytes),
                    "subType": format!("{:02x}", u8::from(binary.subtype)),
                }
            }),
            Bson::Uuid(uuid) => json!({ "$uuid": uuid.hyphenated().to_string() }),
            Bson::ObjectId(id) => json!({ "$oid": id.to_hex() }),
            Bson::DateTime(date) => json!({ "$date": date.to_rfc3339_opts(SecondsFormat::Millis, true) }),
            Bson::RegularExpression(regex) => json!({
                "$regularExpression": { "pattern": regex.pattern, "options": regex.options }
            }),
            Bson::JavaScriptCode(code) => json!({ "$code": code }),
            Bson::JavaScriptCodeWithScope(cws) => json!({
                "$code": cws.code,
                "$scope": cws.scope.to_relaxed_extjson(),
            }),
            Bson::MinKey => json!({ "$minKey": 1 }),
            Bson::MaxKey => json!({ "$maxKey": 1 }),
        }
    }
}

impl Document {
    pub fn to_relaxed_extjson(&self) -> Value {
        let mut map = Map::with_capacity(self.len());
        for (key, value) in self {
            map.insert(key.clone(), value.to_relaxed_extjson());
        }
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;
    use crate::object_id::ObjectId;
    use crate::value::{Binary, BinarySubtype};

    #[test]
    fn native_values_stay_native() {
        let d = doc! { "a" => 1, "b" => "x", "c" => 2.5, "d" => Bson::Null, "e" => vec![true] };
        assert_eq!(
            d.to_relaxed_extjson(),
            json!({ "a": 1, "b": "x", "c": 2.5, "d": null, "e": [true] })
        );
    }

    #[test]
    fn wrapped_values() {
        let id: ObjectId = "4a7067c30a57000000008ecb".parse().unwrap();
        let d = doc! {
            "_id" => id,
            "bin" => Binary { subtype: BinarySubtype::Md5, bytes: vec![1, 2, 3] },
            "nan" => f64::NAN,
        };
        assert_eq!(
            d.to_relaxed_extjson(),
            json!({
                "_id": { "$oid": "4a7067c30a57000000008ecb" },
                "bin": { "$binary": { "base64": "AQID", "subType": "05" } },
                "nan": { "$numberDouble": "NaN" },
            })
        );
    }

    #[test]
    fn key_order_is_kept() {
        let d = doc! { "z" => 1, "a" => 2 };
        let rendered = serde_json::to_string(&d.to_relaxed_extjson()).unwrap();
        assert_eq!(rendered, r#"{"z":1,"a":2}"#);
    }
}
