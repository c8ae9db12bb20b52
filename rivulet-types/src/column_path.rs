//! Position of a column inside a physical engine row.

use std::fmt;

use rivulet_result::{Error, Result};

use crate::key::Key;
use crate::value::Value;

/// Where a column's value lives inside an engine row.
///
/// Every engine row is `(Key, Value)`. [`ColumnPath::Key`] addresses the row
/// key itself; [`ColumnPath::ValuePath`] is a sequence of tuple indices into
/// the value. The empty value path addresses the whole value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ColumnPath {
    Key,
    ValuePath(Vec<usize>),
}

impl ColumnPath {
    /// The whole row value.
    pub const EMPTY: ColumnPath = ColumnPath::ValuePath(Vec::new());

    pub fn new(path: impl Into<Vec<usize>>) -> ColumnPath {
        ColumnPath::ValuePath(path.into())
    }

    pub fn is_key(&self) -> bool {
        matches!(self, ColumnPath::Key)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ColumnPath::ValuePath(p) if p.is_empty())
    }

    /// Prepend `index`, placing this path under position `index` of a wider
    /// row. The key path is unaffected because zipped rows share their key.
    pub fn prefixed(&self, index: usize) -> ColumnPath {
        match self {
            ColumnPath::Key => ColumnPath::Key,
            ColumnPath::ValuePath(path) => {
                let mut out = Vec::with_capacity(path.len() + 1);
                out.push(index);
                out.extend_from_slice(path);
                ColumnPath::ValuePath(out)
            }
        }
    }

    /// Append `index` to a value path.
    pub fn extended(&self, index: usize) -> ColumnPath {
        match self {
            ColumnPath::Key => ColumnPath::Key,
            ColumnPath::ValuePath(path) => {
                let mut out = path.clone();
                out.push(index);
                ColumnPath::ValuePath(out)
            }
        }
    }

    /// Read the addressed value out of a row.
    ///
    /// Walking into `None` yields `None` (outer join padding), and walking
    /// into the error sentinel yields the sentinel.
    pub fn extract(&self, key: &Key, value: &Value) -> Result<Value> {
        match self {
            ColumnPath::Key => Ok(Value::Pointer(*key)),
            ColumnPath::ValuePath(_) => self.extract_from_value(value),
        }
    }

    /// Like [`extract`](Self::extract), for paths known not to address the key.
    pub fn extract_from_value(&self, value: &Value) -> Result<Value> {
        let ColumnPath::ValuePath(path) = self else {
            return Err(Error::Internal(
                "cannot extract the key path from a bare value".into(),
            ));
        };
        let mut current = value;
        for &index in path {
            match current {
                Value::None | Value::Error => break,
                Value::Tuple(items) => {
                    current = items.get(index).ok_or_else(|| {
                        Error::Internal(format!(
                            "column path {self} out of range for tuple of length {}",
                            items.len()
                        ))
                    })?;
                }
                other => {
                    return Err(Error::Internal(format!(
                        "column path {self} walks into non-tuple value {}",
                        other.kind_name()
                    )));
                }
            }
        }
        Ok(current.clone())
    }
}

impl fmt::Display for ColumnPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnPath::Key => write!(f, "KEY"),
            ColumnPath::ValuePath(path) => write!(f, "{path:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> Value {
        Value::from(vec![
            Value::Int(1),
            Value::from(vec![Value::from("a"), Value::Float(2.0)]),
            Value::None,
        ])
    }

    #[test]
    fn extract_nested() {
        let key = Key(7);
        let path = ColumnPath::new([1, 0]);
        assert_eq!(path.extract(&key, &row()).expect("extract"), Value::from("a"));
        assert_eq!(
            ColumnPath::Key.extract(&key, &row()).expect("key"),
            Value::Pointer(key)
        );
        assert_eq!(ColumnPath::EMPTY.extract(&key, &row()).expect("all"), row());
    }

    #[test]
    fn extract_through_none_is_none() {
        let path = ColumnPath::new([2, 5, 1]);
        assert_eq!(path.extract_from_value(&row()).expect("none"), Value::None);
    }

    #[test]
    fn extract_out_of_range_fails() {
        let path = ColumnPath::new([9]);
        assert!(matches!(
            path.extract_from_value(&row()),
            Err(Error::Internal(_))
        ));
        let path = ColumnPath::new([0, 0]);
        assert!(path.extract_from_value(&row()).is_err());
    }

    #[test]
    fn prefixing() {
        assert_eq!(ColumnPath::EMPTY.prefixed(3), ColumnPath::new([3]));
        assert_eq!(ColumnPath::new([1]).prefixed(0), ColumnPath::new([0, 1]));
        assert_eq!(ColumnPath::Key.prefixed(2), ColumnPath::Key);
        assert_eq!(ColumnPath::new([1]).extended(4), ColumnPath::new([1, 4]));
    }
}
