//! Runtime values carried in engine rows.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::key::Key;

/// A single cell or a whole row (rows are nested [`Value::Tuple`]s).
///
/// Floats compare and hash by bit pattern so `Value` can be used as a map key
/// (group keys, join keys, deduplication instances).
#[derive(Clone, Debug)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(Arc<str>),
    Bytes(Arc<[u8]>),
    Pointer(Key),
    Tuple(Arc<[Value]>),
    Json(Arc<serde_json::Value>),
    /// Nanoseconds since the epoch, no timezone.
    DateTimeNaive(i64),
    /// Nanoseconds since the epoch, UTC.
    DateTimeUtc(i64),
    /// Nanoseconds.
    Duration(i64),
    /// Sentinel for a row-level failure.
    Error,
}

impl Value {
    pub fn from_tuple(values: impl IntoIterator<Item = Value>) -> Value {
        Value::Tuple(values.into_iter().collect())
    }

    pub fn json(value: serde_json::Value) -> Value {
        Value::Json(Arc::new(value))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of the value; integers widen.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<Key> {
        match self {
            Value::Pointer(k) => Some(*k),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[Value]> {
        match self {
            Value::Tuple(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Json(j) => Some(j),
            _ => None,
        }
    }

    /// Short name of the variant, used in row error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::None => "None",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::Bytes(_) => "Bytes",
            Value::Pointer(_) => "Pointer",
            Value::Tuple(_) => "Tuple",
            Value::Json(_) => "Json",
            Value::DateTimeNaive(_) => "DateTimeNaive",
            Value::DateTimeUtc(_) => "DateTimeUtc",
            Value::Duration(_) => "Duration",
            Value::Error => "Error",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::None => 0,
            Value::Bool(_) => 1,
            Value::Int(_) => 2,
            Value::Float(_) => 3,
            Value::String(_) => 4,
            Value::Bytes(_) => 5,
            Value::Pointer(_) => 6,
            Value::Tuple(_) => 7,
            Value::Json(_) => 8,
            Value::DateTimeNaive(_) => 9,
            Value::DateTimeUtc(_) => 10,
            Value::Duration(_) => 11,
            Value::Error => 12,
        }
    }

    /// Feed a stable byte encoding of the value into `sink`.
    ///
    /// Used for key derivation, so the encoding must not depend on process
    /// state.
    pub fn write_stable_bytes(&self, sink: &mut impl FnMut(&[u8])) {
        sink(&[self.rank()]);
        match self {
            Value::None | Value::Error => {}
            Value::Bool(b) => sink(&[*b as u8]),
            Value::Int(i)
            | Value::DateTimeNaive(i)
            | Value::DateTimeUtc(i)
            | Value::Duration(i) => sink(&i.to_le_bytes()),
            Value::Float(f) => sink(&f.to_bits().to_le_bytes()),
            Value::String(s) => {
                sink(&(s.len() as u64).to_le_bytes());
                sink(s.as_bytes());
            }
            Value::Bytes(b) => {
                sink(&(b.len() as u64).to_le_bytes());
                sink(b);
            }
            Value::Pointer(k) => sink(&k.0.to_le_bytes()),
            Value::Tuple(items) => {
                sink(&(items.len() as u64).to_le_bytes());
                for item in items.iter() {
                    item.write_stable_bytes(sink);
                }
            }
            Value::Json(j) => {
                let text = j.to_string();
                sink(&(text.len() as u64).to_le_bytes());
                sink(text.as_bytes());
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            (Value::Pointer(a), Value::Pointer(b)) => a.cmp(b),
            (Value::Tuple(a), Value::Tuple(b)) => a.iter().cmp(b.iter()),
            (Value::Json(a), Value::Json(b)) => a.to_string().cmp(&b.to_string()),
            (Value::DateTimeNaive(a), Value::DateTimeNaive(b))
            | (Value::DateTimeUtc(a), Value::DateTimeUtc(b))
            | (Value::Duration(a), Value::Duration(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.write_stable_bytes(&mut |bytes| state.write(bytes));
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "{b:?}"),
            Value::Pointer(k) => write!(f, "{k}"),
            Value::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Value::Json(j) => write!(f, "{j}"),
            Value::DateTimeNaive(ns) | Value::DateTimeUtc(ns) => write!(f, "{ns}ns"),
            Value::Duration(ns) => write!(f, "{ns}ns"),
            Value::Error => write!(f, "Error"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<Key> for Value {
    fn from(k: Key) -> Self {
        Value::Pointer(k)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Tuple(Arc::from(items))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::None, Into::into)
    }
}
