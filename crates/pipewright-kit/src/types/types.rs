use indexmap::IndexMap;
use serde_json::{Map, Value as JsonValue};

/// Runtime representation of an input value, a data source response fragment,
/// or anything else flowing through a resolution pass.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i128),
    Float(f64),
    String(String),
    Array(Box<Vec<Value>>),
    Object(IndexMap<String, Value>),
}

impl PartialEq<Value> for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(lhs), Value::Bool(rhs)) => lhs == rhs,
            (Value::Integer(lhs), Value::Integer(rhs)) => lhs == rhs,
            (Value::Float(lhs), Value::Float(rhs)) => lhs == rhs,
            (Value::String(lhs), Value::String(rhs)) => lhs == rhs,
            (Value::Array(lhs), Value::Array(rhs)) => {
                lhs.len() == rhs.len() && lhs.iter().zip(rhs.iter()).all(|(l, r)| l == r)
            }
            (Value::Object(lhs), Value::Object(rhs)) => {
                lhs.len() == rhs.len()
                    && lhs.iter().all(|(k, v)| rhs.get(k).map(|r| v == r).unwrap_or(false))
            }
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Value {
    pub fn null() -> Value {
        Value::Null
    }

    pub fn bool(value: bool) -> Value {
        Value::Bool(value)
    }

    pub fn integer(value: i128) -> Value {
        Value::Integer(value)
    }

    pub fn float(value: f64) -> Value {
        Value::Float(value)
    }

    pub fn string(value: String) -> Value {
        Value::String(value)
    }

    pub fn array(values: Vec<Value>) -> Value {
        Value::Array(Box::new(values))
    }

    pub fn object(values: IndexMap<String, Value>) -> Value {
        Value::Object(values)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Object(values) => Some(values),
            _ => None,
        }
    }

    /// Flattens the value into the string form used by template interpolation
    /// and string comparisons. Strings render without quotes; compound values
    /// render as compact JSON.
    pub fn encode_to_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(value) => value.to_string(),
            Value::Integer(value) => value.to_string(),
            Value::Float(value) => value.to_string(),
            Value::String(value) => value.clone(),
            Value::Array(_) | Value::Object(_) => self.to_json().to_string(),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(value) => JsonValue::Bool(*value),
            Value::Integer(value) => JsonValue::Number(serde_json::Number::from(*value as i64)),
            Value::Float(value) => serde_json::Number::from_f64(*value)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::String(value) => JsonValue::String(value.clone()),
            Value::Array(values) => {
                JsonValue::Array(values.iter().map(|v| v.to_json()).collect::<Vec<JsonValue>>())
            }
            Value::Object(values) => JsonValue::Object(
                values
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<Map<String, JsonValue>>(),
            ),
        }
    }

    pub fn from_json(value: &JsonValue) -> Value {
        match value {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(value) => Value::Bool(*value),
            JsonValue::Number(value) => {
                if let Some(int) = value.as_i64() {
                    Value::Integer(int as i128)
                } else {
                    Value::Float(value.as_f64().unwrap_or_default())
                }
            }
            JsonValue::String(value) => Value::String(value.clone()),
            JsonValue::Array(values) => Value::array(values.iter().map(Value::from_json).collect()),
            JsonValue::Object(values) => Value::Object(
                values.iter().map(|(k, v)| (k.clone(), Value::from_json(v))).collect(),
            ),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.encode_to_string())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_to_string_renders_strings_unquoted() {
        assert_eq!(Value::string("eastus".into()).encode_to_string(), "eastus");
        assert_eq!(Value::integer(42).encode_to_string(), "42");
        assert_eq!(Value::null().encode_to_string(), "");
    }

    #[test]
    fn json_round_trip_preserves_object_order() {
        let json: JsonValue =
            serde_json::from_str(r#"{"z": 1, "a": {"nested": true}, "m": [1, 2]}"#).unwrap();
        let value = Value::from_json(&json);
        assert_eq!(value.to_json(), json);
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }
}
