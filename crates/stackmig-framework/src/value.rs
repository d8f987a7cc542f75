//! Tri-state attribute values
//!
//! Every attribute the host hands to a resource is either known, explicitly
//! null, or unknown (to be computed during apply).

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Value<T> {
    Known(T),
    #[default]
    Null,
    Unknown,
}

impl<T> Value<T> {
    pub fn known(value: impl Into<T>) -> Self {
        Value::Known(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_known(&self) -> Option<&T> {
        match self {
            Value::Known(v) => Some(v),
            _ => None,
        }
    }
}

impl<T> From<Option<T>> for Value<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Value::Known(v),
            None => Value::Null,
        }
    }
}

impl Value<String> {
    pub fn as_str(&self) -> Option<&str> {
        self.as_known().map(String::as_str)
    }
}

impl<T: std::fmt::Display> std::fmt::Display for Value<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Known(v) => write!(f, "{}", v),
            Value::Null => write!(f, "null"),
            Value::Unknown => write!(f, "(known after apply)"),
        }
    }
}

// Unknown never reaches persisted state; it serializes as null.
impl<T: Serialize> Serialize for Value<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Known(v) => serializer.serialize_some(v),
            Value::Null | Value::Unknown => serializer.serialize_none(),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Value<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Value::from)
    }
}
