/*!
 * Core data types for thingbridge.
 *
 * This module defines the identifier and value types that cross the
 * driver boundary: device identifiers (UDNs), service-state values,
 * and raw device metadata.
 */
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unique identifier for thingbridge resources, most prominently the
/// unique device name (UDN) that keys the device registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Id(String);

impl Id {
    /// Create a new ID with a random UUID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create an ID from a string
    pub fn from_string<S: AsRef<str>>(s: S) -> Self {
        Self(s.as_ref().to_string())
    }

    /// Get the string representation of the ID
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Self::from_string(s)
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Self::from_string(s)
    }
}

impl From<Uuid> for Id {
    fn from(uuid: Uuid) -> Self {
        Self::from_string(uuid.to_string())
    }
}

/// A value crossing the driver boundary: a device metadata field, an
/// action argument, or an entry in a service state map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Integer(i64),
    /// Floating-point value
    Float(f64),
    /// String value
    String(String),
    /// Array of values
    Array(Vec<Value>),
    /// Map of string keys to values
    Object(HashMap<String, Value>),
}

impl Value {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if the value is a boolean
    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    /// Check if the value is an integer
    pub fn is_integer(&self) -> bool {
        matches!(self, Value::Integer(_))
    }

    /// Check if the value is a float
    pub fn is_float(&self) -> bool {
        matches!(self, Value::Float(_))
    }

    /// Check if the value is numeric (integer or float)
    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// Check if the value is a string
    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    /// Check if the value is an array
    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    /// Check if the value is an object
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    /// Check if the value is a scalar: a string, number, or boolean.
    ///
    /// Device metadata surfaces (`meta()`, identity expansion) only carry
    /// scalar top-level fields; arrays and objects stay behind.
    pub fn is_scalar(&self) -> bool {
        self.is_string() || self.is_numeric() || self.is_bool()
    }

    /// Try to get a boolean value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get an integer value
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Float(f) if *f == (*f as i64) as f64 => Some(*f as i64),
            _ => None,
        }
    }

    /// Try to get a float value
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get an array value
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Try to get an object value
    pub fn as_object(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i as i64)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(a: Vec<Value>) -> Self {
        Value::Array(a)
    }
}

impl From<HashMap<String, Value>> for Value {
    fn from(o: HashMap<String, Value>) -> Self {
        Value::Object(o)
    }
}

/// Raw device metadata: top-level fields as reported by the transport
pub type Metadata = HashMap<String, Value>;

/// A map of state-variable or action-argument names to values
pub type ValueMap = HashMap<String, Value>;

/// A reference-counted value
pub type SharedValue = Arc<Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_creation() {
        let id = Id::new();
        assert!(!id.as_str().is_empty());

        let id = Id::from_string("uuid:device-1");
        assert_eq!(id.as_str(), "uuid:device-1");

        let id: Id = "uuid:device-2".into();
        assert_eq!(id.as_str(), "uuid:device-2");

        let id: Id = String::from("uuid:device-3").into();
        assert_eq!(id.as_str(), "uuid:device-3");
    }

    #[test]
    fn test_id_display() {
        let id = Id::from_string("uuid:device-1");
        assert_eq!(format!("{}", id), "uuid:device-1");
    }

    #[test]
    fn test_value_type_checks() {
        assert!(Value::Null.is_null());
        assert!(Value::Bool(true).is_bool());

        let v = Value::Integer(42);
        assert!(v.is_integer());
        assert!(v.is_numeric());

        let v = Value::Float(3.14);
        assert!(v.is_float());
        assert!(v.is_numeric());

        assert!(Value::String("hello".to_string()).is_string());
        assert!(Value::Array(vec![Value::Integer(1)]).is_array());

        let mut map = HashMap::new();
        map.insert("key".to_string(), Value::String("value".to_string()));
        assert!(Value::Object(map).is_object());
    }

    #[test]
    fn test_value_scalars() {
        assert!(Value::String("s".to_string()).is_scalar());
        assert!(Value::Integer(1).is_scalar());
        assert!(Value::Float(1.5).is_scalar());
        assert!(Value::Bool(false).is_scalar());

        assert!(!Value::Null.is_scalar());
        assert!(!Value::Array(vec![]).is_scalar());
        assert!(!Value::Object(HashMap::new()).is_scalar());
    }

    #[test]
    fn test_value_serializes_untagged() {
        assert_eq!(
            serde_json::to_value(Value::from("hello")).unwrap(),
            serde_json::json!("hello")
        );
        assert_eq!(
            serde_json::to_value(Value::from(42i64)).unwrap(),
            serde_json::json!(42)
        );

        let mut map = HashMap::new();
        map.insert("Status".to_string(), Value::from("ON"));
        assert_eq!(
            serde_json::to_value(Value::Object(map)).unwrap(),
            serde_json::json!({"Status": "ON"})
        );
    }

    #[test]
    fn test_value_conversions() {
        let v: Value = true.into();
        assert_eq!(v.as_bool(), Some(true));

        let v: Value = 42i64.into();
        assert_eq!(v.as_integer(), Some(42));
        assert_eq!(v.as_float(), Some(42.0));

        let v: Value = 3.14f64.into();
        assert_eq!(v.as_float(), Some(3.14));
        assert_eq!(v.as_integer(), None);

        let v: Value = "hello".into();
        assert_eq!(v.as_str(), Some("hello"));

        let array = vec![Value::Integer(1), Value::Integer(2)];
        let v: Value = array.clone().into();
        assert_eq!(v.as_array().unwrap(), &array[..]);

        let mut map = HashMap::new();
        map.insert("key".to_string(), Value::String("value".to_string()));
        let v: Value = map.clone().into();
        assert_eq!(v.as_object().unwrap(), &map);
    }
}
