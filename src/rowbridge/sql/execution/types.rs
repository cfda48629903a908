//! Core runtime value types.
//!
//! This module contains the fundamental data types used throughout the
//! dataflow core:
//! - [`Value`] - The tagged value union bridging host types and SQL row streams
//! - [`ValueType`] - The fixed numeric type-tag system
//!
//! Tag numbers are part of the external wire contract and must not be
//! renumbered or reused.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use log::warn;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// Data type tags for [`Value`].
///
/// The numeric values are a stable wire contract (tags are persisted and
/// exchanged with drivers), so the discriminants are written out explicitly
/// rather than derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueType {
    Nil = 0,
    Error = 1,
    Unknown = 2,
    Number = 10,
    Int = 11,
    Bool = 12,
    Time = 13,
    ByteSlice = 14,
    String = 20,
    Strings = 21,
    Map = 30,
    MapInt = 31,
    MapString = 32,
    MapFloat = 33,
    Slice = 40,
    Struct = 50,
}

impl ValueType {
    /// Numeric wire tag for this type.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Inverse of [`ValueType::tag`]. Unrecognised tags resolve to `Nil`
    /// with a warning; intended for debugging, not dispatch.
    pub fn from_tag(tag: u8) -> ValueType {
        match tag {
            0 => ValueType::Nil,
            1 => ValueType::Error,
            2 => ValueType::Unknown,
            10 => ValueType::Number,
            11 => ValueType::Int,
            12 => ValueType::Bool,
            13 => ValueType::Time,
            14 => ValueType::ByteSlice,
            20 => ValueType::String,
            21 => ValueType::Strings,
            30 => ValueType::Map,
            31 => ValueType::MapInt,
            32 => ValueType::MapString,
            33 => ValueType::MapFloat,
            40 => ValueType::Slice,
            50 => ValueType::Struct,
            _ => {
                warn!("unrecognized value type tag {}", tag);
                ValueType::Nil
            }
        }
    }

    /// Lower-case type name for diagnostics and error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            ValueType::Nil => "nil",
            ValueType::Error => "error",
            ValueType::Unknown => "unknown",
            ValueType::Number => "number",
            ValueType::Int => "int",
            ValueType::Bool => "bool",
            ValueType::Time => "time",
            ValueType::ByteSlice => "bytes",
            ValueType::String => "string",
            ValueType::Strings => "strings",
            ValueType::Map => "map",
            ValueType::MapInt => "map_int",
            ValueType::MapString => "map_string",
            ValueType::MapFloat => "map_float",
            ValueType::Slice => "slice",
            ValueType::Struct => "struct",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A value in a SQL row stream
///
/// This enum represents every value shape the runtime exchanges between
/// operators. Variants carry their minimal payload; there is no retained
/// reflection or type descriptor beyond the tag itself.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL / absent value
    Nil,
    /// Evaluation error carrying a message; never coerces
    Error(String),
    /// 64-bit floating point number
    Number(f64),
    /// 64-bit signed integer
    Int(i64),
    /// Boolean value
    Bool(bool),
    /// Point in time; numeric form is milliseconds since the Unix epoch
    Time(DateTime<Utc>),
    /// UTF-8 string
    String(String),
    /// List of strings
    Strings(Vec<String>),
    /// Map of nested values
    Map(HashMap<String, Value>),
    /// Map of integers
    MapInt(HashMap<String, i64>),
    /// Map of strings
    MapString(HashMap<String, String>),
    /// Map of floats
    MapFloat(HashMap<String, f64>),
    /// List of nested values
    Slice(Vec<Value>),
    /// Opaque structured payload; never coerces
    Struct(serde_json::Value),
}

// Process-wide singletons. Values are immutable so sharing them is safe;
// the ones whose payloads cannot be built in const context live behind
// OnceLock accessors below.
pub const NIL: Value = Value::Nil;
pub const BOOL_TRUE: Value = Value::Bool(true);
pub const BOOL_FALSE: Value = Value::Bool(false);
pub const NUMBER_NAN: Value = Value::Number(f64::NAN);
pub const EMPTY_STRING: Value = Value::String(String::new());
pub const EMPTY_STRINGS: Value = Value::Strings(Vec::new());
pub const ERR_EMPTY: Value = Value::Error(String::new());
pub const NIL_STRUCT: Value = Value::Struct(serde_json::Value::Null);
pub const TIME_ZERO: Value = Value::Time(DateTime::<Utc>::MIN_UTC);

/// The empty `MapInt` singleton.
pub fn empty_map_int() -> &'static Value {
    static EMPTY_MAP_INT: OnceLock<Value> = OnceLock::new();
    EMPTY_MAP_INT.get_or_init(|| Value::MapInt(HashMap::new()))
}

impl Value {
    /// The type tag of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Nil => ValueType::Nil,
            Value::Error(_) => ValueType::Error,
            Value::Number(_) => ValueType::Number,
            Value::Int(_) => ValueType::Int,
            Value::Bool(_) => ValueType::Bool,
            Value::Time(_) => ValueType::Time,
            Value::String(_) => ValueType::String,
            Value::Strings(_) => ValueType::Strings,
            Value::Map(_) => ValueType::Map,
            Value::MapInt(_) => ValueType::MapInt,
            Value::MapString(_) => ValueType::MapString,
            Value::MapFloat(_) => ValueType::MapFloat,
            Value::Slice(_) => ValueType::Slice,
            Value::Struct(_) => ValueType::Struct,
        }
    }

    /// Type name for error messages and debugging.
    pub fn type_name(&self) -> &'static str {
        self.value_type().as_str()
    }

    /// Structural nil check: the empty form of each variant is nil, not
    /// just the `Nil` variant itself. Numeric zero is NOT nil.
    pub fn is_nil(&self) -> bool {
        match self {
            Value::Nil => true,
            Value::String(s) => s.is_empty(),
            Value::Strings(v) => v.is_empty(),
            Value::Map(m) => m.is_empty(),
            Value::MapInt(m) => m.is_empty(),
            Value::MapString(m) => m.is_empty(),
            Value::MapFloat(m) => m.is_empty(),
            Value::Slice(v) => v.is_empty(),
            Value::Time(t) => *t == DateTime::<Utc>::MIN_UTC,
            Value::Error(_)
            | Value::Number(_)
            | Value::Int(_)
            | Value::Bool(_)
            | Value::Struct(_) => false,
        }
    }

    /// True only for the error variant.
    pub fn is_err(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// Check if this value supports the numeric capability set.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Number(_) | Value::Int(_) | Value::Time(_))
    }

    /// Widened numeric form. `Some` exactly for Number, Int and Time;
    /// a time's numeric value is milliseconds since the Unix epoch.
    pub fn float_value(&self) -> Option<f64> {
        match self {
            Value::Number(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::Time(t) => Some(t.timestamp_millis() as f64),
            _ => None,
        }
    }

    /// Integer numeric form. Numbers truncate toward zero; times are
    /// milliseconds since the Unix epoch.
    pub fn int_value(&self) -> Option<i64> {
        match self {
            Value::Number(f) => Some(*f as i64),
            Value::Int(i) => Some(*i),
            Value::Time(t) => Some(t.timestamp_millis()),
            _ => None,
        }
    }

    /// De-duplicated, case-preserving set view of a `Strings` value.
    /// Any other variant yields the empty set.
    pub fn string_set(&self) -> HashSet<String> {
        match self {
            Value::Strings(v) => v.iter().cloned().collect(),
            _ => HashSet::new(),
        }
    }

    /// Whether this value's kind may be coerced to `to`. Struct, Error and
    /// Nil never coerce; every other variant delegates with the
    /// representative kind it converts through.
    pub fn can_coerce(&self, to: ValueType) -> bool {
        let exemplar = match self {
            Value::Struct(_) | Value::Error(_) | Value::Nil => return false,
            Value::Number(_) | Value::Int(_) => ValueType::Int,
            Value::Bool(_) => ValueType::Bool,
            Value::String(_) | Value::Strings(_) => ValueType::String,
            Value::Time(_) => ValueType::Time,
            Value::MapInt(_) => ValueType::MapInt,
            Value::Map(_) | Value::MapString(_) | Value::MapFloat(_) | Value::Slice(_) => {
                return to == ValueType::String
            }
        };
        can_convert(exemplar, to)
    }

    /// JSON encoding of this value. `Nil` encodes as the empty byte
    /// sequence; callers treat that as omission.
    pub fn json_bytes(&self) -> Vec<u8> {
        if matches!(self, Value::Nil) {
            return Vec::new();
        }
        match serde_json::to_vec(self) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("could not encode {} value: {}", self.type_name(), e);
                Vec::new()
            }
        }
    }

    /// Lift a dynamic JSON payload into the value union. Shapes with no
    /// corresponding variant come back as `Nil` with a diagnostic.
    pub fn from_json(raw: serde_json::Value) -> Value {
        match raw {
            serde_json::Value::Null => Value::Nil,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(f) = n.as_f64() {
                    Value::Number(f)
                } else {
                    warn!("unrepresentable number {}", n);
                    Value::Nil
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                if items.iter().all(|v| v.is_string()) {
                    Value::Strings(
                        items
                            .into_iter()
                            .filter_map(|v| match v {
                                serde_json::Value::String(s) => Some(s),
                                _ => None,
                            })
                            .collect(),
                    )
                } else {
                    Value::Slice(items.into_iter().map(Value::from_json).collect())
                }
            }
            serde_json::Value::Object(map) => {
                if map.values().all(|v| v.as_i64().is_some()) {
                    Value::MapInt(
                        map.into_iter()
                            .filter_map(|(k, v)| v.as_i64().map(|i| (k, i)))
                            .collect(),
                    )
                } else {
                    Value::Map(
                        map.into_iter()
                            .map(|(k, v)| (k, Value::from_json(v)))
                            .collect(),
                    )
                }
            }
        }
    }
}

/// Shared coercion matrix. `from` is the representative kind a value
/// converts through, per [`Value::can_coerce`]. String targets are always
/// allowed for coercible kinds; string sources are permitted at the type
/// level even though a given string may still fail to parse.
fn can_convert(from: ValueType, to: ValueType) -> bool {
    use ValueType::*;
    match (from, to) {
        (_, String) => true,
        (Int, Int | Number | Bool | Time) => true,
        (Bool, Bool | Int | Number) => true,
        (String, Int | Number | Bool | Time | Strings) => true,
        (Time, Time | Int | Number) => true,
        (MapInt, MapInt) => true,
        _ => false,
    }
}

/// Total string form: never fails, never panics. Error and Nil render as
/// the empty string; numbers use the shortest round-tripping decimal.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => Ok(()),
            Value::Error(_) => Ok(()),
            Value::Number(n) => write!(f, "{}", n),
            Value::Int(i) => write!(f, "{}", i),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Time(t) => write!(f, "{}", t.timestamp_millis()),
            Value::String(s) => write!(f, "{}", s),
            Value::Strings(v) => write!(f, "{}", v.join(",")),
            Value::Map(m) => write!(f, "{:?}", m),
            Value::MapInt(m) => write!(f, "{:?}", m),
            Value::MapString(m) => write!(f, "{:?}", m),
            Value::MapFloat(m) => write!(f, "{:?}", m),
            Value::Slice(v) => {
                write!(f, "[")?;
                for (i, item) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Struct(s) => write!(f, "{}", s),
        }
    }
}

/// Custom Serialize implementation for Value
///
/// Encodes each variant as its natural JSON shape. Times serialize
/// numerically as Unix milliseconds; non-finite numbers become JSON null
/// (JSON has no NaN literal). `Nil` serializes as null here; the
/// empty-bytes contract for bare nils lives in [`Value::json_bytes`].
impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Nil => serializer.serialize_unit(),
            Value::Error(msg) => serializer.serialize_str(msg),
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Time(t) => serializer.serialize_i64(t.timestamp_millis()),
            Value::String(s) => serializer.serialize_str(s),
            Value::Strings(v) => {
                let mut seq = serializer.serialize_seq(Some(v.len()))?;
                for s in v {
                    seq.serialize_element(s)?;
                }
                seq.end()
            }
            Value::Map(m) => {
                let mut map = serializer.serialize_map(Some(m.len()))?;
                for (k, v) in m {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Value::MapInt(m) => {
                let mut map = serializer.serialize_map(Some(m.len()))?;
                for (k, v) in m {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Value::MapString(m) => {
                let mut map = serializer.serialize_map(Some(m.len()))?;
                for (k, v) in m {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Value::MapFloat(m) => {
                let mut map = serializer.serialize_map(Some(m.len()))?;
                for (k, v) in m {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Value::Slice(v) => {
                let mut seq = serializer.serialize_seq(Some(v.len()))?;
                for item in v {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Struct(s) => s.serialize(serializer),
        }
    }
}

// Lifts from host primitives. These cover every raw input the dynamic
// entry point accepts; genuinely dynamic payloads go through
// `Value::from_json` instead.

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Number(v as f64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::Strings(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Time(v)
    }
}

impl From<Option<DateTime<Utc>>> for Value {
    fn from(v: Option<DateTime<Utc>>) -> Self {
        match v {
            Some(t) => Value::Time(t),
            None => Value::Nil,
        }
    }
}

impl From<HashMap<String, i64>> for Value {
    fn from(v: HashMap<String, i64>) -> Self {
        Value::MapInt(v)
    }
}

impl From<HashMap<String, i32>> for Value {
    fn from(v: HashMap<String, i32>) -> Self {
        Value::MapInt(v.into_iter().map(|(k, i)| (k, i as i64)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_type_tags_are_stable() {
        assert_eq!(ValueType::Nil.tag(), 0);
        assert_eq!(ValueType::Error.tag(), 1);
        assert_eq!(ValueType::Unknown.tag(), 2);
        assert_eq!(ValueType::Number.tag(), 10);
        assert_eq!(ValueType::Int.tag(), 11);
        assert_eq!(ValueType::Bool.tag(), 12);
        assert_eq!(ValueType::Time.tag(), 13);
        assert_eq!(ValueType::ByteSlice.tag(), 14);
        assert_eq!(ValueType::String.tag(), 20);
        assert_eq!(ValueType::Strings.tag(), 21);
        assert_eq!(ValueType::Map.tag(), 30);
        assert_eq!(ValueType::MapInt.tag(), 31);
        assert_eq!(ValueType::MapString.tag(), 32);
        assert_eq!(ValueType::MapFloat.tag(), 33);
        assert_eq!(ValueType::Slice.tag(), 40);
        assert_eq!(ValueType::Struct.tag(), 50);
    }

    #[test]
    fn test_from_tag_round_trip() {
        for vt in [
            ValueType::Nil,
            ValueType::Error,
            ValueType::Unknown,
            ValueType::Number,
            ValueType::Int,
            ValueType::Bool,
            ValueType::Time,
            ValueType::ByteSlice,
            ValueType::String,
            ValueType::Strings,
            ValueType::Map,
            ValueType::MapInt,
            ValueType::MapString,
            ValueType::MapFloat,
            ValueType::Slice,
            ValueType::Struct,
        ] {
            assert_eq!(ValueType::from_tag(vt.tag()), vt);
        }
        // unknown tags resolve to Nil
        assert_eq!(ValueType::from_tag(99), ValueType::Nil);
    }

    #[test]
    fn test_nil_semantics() {
        assert!(NIL.is_nil());
        assert!(EMPTY_STRING.is_nil());
        assert!(EMPTY_STRINGS.is_nil());
        assert!(empty_map_int().is_nil());
        assert!(TIME_ZERO.is_nil());
        assert!(Value::Slice(Vec::new()).is_nil());

        // numeric zero and false are values, not nil
        assert!(!Value::Int(0).is_nil());
        assert!(!Value::Number(0.0).is_nil());
        assert!(!BOOL_FALSE.is_nil());
        assert!(!ERR_EMPTY.is_nil());
        assert!(!NIL_STRUCT.is_nil());
        assert!(!Value::String("x".into()).is_nil());
    }

    #[test]
    fn test_err_only_for_error_variant() {
        assert!(ERR_EMPTY.is_err());
        assert!(Value::Error("boom".into()).is_err());
        assert!(!NIL.is_err());
        assert!(!NUMBER_NAN.is_err());
    }

    #[test]
    fn test_to_string_totality() {
        let samples = vec![
            NIL,
            ERR_EMPTY,
            Value::Number(1.5),
            NUMBER_NAN,
            Value::Int(-3),
            BOOL_TRUE,
            TIME_ZERO,
            Value::String("hi".into()),
            Value::Strings(vec!["a".into(), "b".into()]),
            Value::Map(HashMap::new()),
            Value::MapInt(HashMap::new()),
            Value::MapString(HashMap::new()),
            Value::MapFloat(HashMap::new()),
            Value::Slice(vec![Value::Int(1)]),
            NIL_STRUCT,
        ];
        for v in samples {
            // must not panic; Error and Nil render empty
            let s = v.to_string();
            match v {
                Value::Nil | Value::Error(_) => assert_eq!(s, ""),
                _ => {}
            }
        }
        assert_eq!(NUMBER_NAN.to_string(), "NaN");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
        assert_eq!(Value::Bool(false).to_string(), "false");
        assert_eq!(
            Value::Strings(vec!["x".into(), "y".into()]).to_string(),
            "x,y"
        );
    }

    #[test]
    fn test_time_value_numeric() {
        let t = Utc.timestamp_millis_opt(1234).unwrap();
        let v = Value::from(t);
        assert_eq!(v.int_value(), Some(1234));
        assert_eq!(v.float_value(), Some(1234.0));
        assert_eq!(v.to_string(), "1234");
    }

    #[test]
    fn test_number_int_truncates_toward_zero() {
        assert_eq!(Value::Number(2.9).int_value(), Some(2));
        assert_eq!(Value::Number(-2.9).int_value(), Some(-2));
        assert_eq!(Value::Int(7).float_value(), Some(7.0));
    }

    #[test]
    fn test_json_round_trip_primitives() {
        let samples = vec![
            Value::Int(42),
            Value::Number(1.25),
            Value::Bool(true),
            Value::String("hello".into()),
            Value::Strings(vec!["a".into(), "b".into()]),
            Value::MapInt(HashMap::from([("k".to_string(), 9_i64)])),
        ];
        for v in samples {
            let bytes = v.json_bytes();
            let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(Value::from_json(parsed), v);
        }
    }

    #[test]
    fn test_nil_json_is_empty() {
        assert!(NIL.json_bytes().is_empty());
        assert!(!Value::Int(0).json_bytes().is_empty());
    }

    #[test]
    fn test_from_json_unsupported_number_is_nil() {
        // u64 beyond i64 range widens to float rather than Nil
        let v = Value::from_json(serde_json::json!(u64::MAX));
        assert_eq!(v.value_type(), ValueType::Number);
    }

    #[test]
    fn test_string_set_dedupes_and_preserves_case() {
        let v = Value::Strings(vec!["Ann".into(), "ann".into(), "Ann".into()]);
        let set = v.string_set();
        assert_eq!(set.len(), 2);
        assert!(set.contains("Ann"));
        assert!(set.contains("ann"));
        assert!(Value::Int(1).string_set().is_empty());
    }

    #[test]
    fn test_coercion() {
        assert!(Value::Int(1).can_coerce(ValueType::Number));
        assert!(Value::Number(1.0).can_coerce(ValueType::Int));
        assert!(Value::Time(Utc::now()).can_coerce(ValueType::Int));
        assert!(Value::Bool(true).can_coerce(ValueType::String));
        assert!(!NIL_STRUCT.can_coerce(ValueType::String));
        assert!(!ERR_EMPTY.can_coerce(ValueType::String));
        assert!(!NIL.can_coerce(ValueType::String));
        assert!(!Value::MapInt(HashMap::new()).can_coerce(ValueType::Int));
    }

    #[test]
    fn test_lifts() {
        assert_eq!(Value::from(1.5_f64).value_type(), ValueType::Number);
        assert_eq!(Value::from(1.5_f32).value_type(), ValueType::Number);
        assert_eq!(Value::from(1_i32), Value::Int(1));
        assert_eq!(Value::from(1_i64), Value::Int(1));
        assert_eq!(Value::from("s"), Value::String("s".into()));
        assert_eq!(Value::from(true), BOOL_TRUE);
        assert_eq!(Value::from(None::<DateTime<Utc>>), NIL);
        let m = HashMap::from([("a".to_string(), 1_i32)]);
        assert_eq!(
            Value::from(m),
            Value::MapInt(HashMap::from([("a".to_string(), 1_i64)]))
        );
    }
}
