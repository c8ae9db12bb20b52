//! Logical data types.
//!
//! [`DType`] is a closed sum type. Construction of optionals goes through
//! [`DType::optional`], which keeps the representation normalized:
//! `Optional(Optional(T))` collapses to `Optional(T)`, and `Any`/`None` are
//! never wrapped.

use std::fmt;

use crate::value::Value;

/// Logical type of a column or expression.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DType {
    /// Compatible with everything, carries no static guarantee.
    Any,
    /// The type of the `None` literal (bottom of every optional).
    None,
    Bool,
    Int,
    Float,
    Str,
    Bytes,
    /// Reference to a row identity.
    Pointer,
    /// Semi-structured JSON document.
    Json,
    DateTimeNaive,
    DateTimeUtc,
    Duration,
    Optional(Box<DType>),
    List(Box<DType>),
    Tuple(Vec<DType>),
}

impl DType {
    /// Wrap `inner` in an optional, normalizing nested optionals.
    pub fn optional(inner: DType) -> DType {
        match inner {
            DType::Any | DType::None | DType::Optional(_) => inner,
            other => DType::Optional(Box::new(other)),
        }
    }

    pub fn list(inner: DType) -> DType {
        DType::List(Box::new(inner))
    }

    pub fn tuple(items: impl IntoIterator<Item = DType>) -> DType {
        DType::Tuple(items.into_iter().collect())
    }

    /// `true` only for an explicit `Optional(_)` wrapper.
    pub fn is_optional(&self) -> bool {
        matches!(self, DType::Optional(_))
    }

    /// `true` when a `None` value inhabits this type.
    pub fn accepts_none(&self) -> bool {
        matches!(self, DType::Optional(_) | DType::None | DType::Any)
    }

    /// Strip one optional wrapper, if present.
    pub fn unoptionalize(&self) -> &DType {
        match self {
            DType::Optional(inner) => inner,
            other => other,
        }
    }

    /// Numeric types participate in widening.
    pub fn is_numeric(&self) -> bool {
        matches!(self, DType::Int | DType::Float)
    }

    /// Sequence types are indexed positionally by `Get`.
    pub fn is_sequence(&self) -> bool {
        matches!(self, DType::List(_) | DType::Tuple(_))
    }

    /// Structural equivalence after normalizing optional wrappers.
    pub fn equivalent_to(&self, other: &DType) -> bool {
        normalize(self) == normalize(other)
    }

    /// Partial order used for implicit casts.
    ///
    /// Numeric widening (`Int <: Float`), optional lifting (`T <: Optional(T)`,
    /// `None <: Optional(T)`), covariance of containers, and `T <: Any`.
    pub fn is_subtype_of(&self, other: &DType) -> bool {
        if self.equivalent_to(other) {
            return true;
        }
        match (self, other) {
            (_, DType::Any) => true,
            (DType::None, DType::Optional(_)) => true,
            (DType::Optional(a), DType::Optional(b)) => a.is_subtype_of(b),
            (a, DType::Optional(b)) => a.is_subtype_of(b),
            (DType::Int, DType::Float) => true,
            (DType::List(a), DType::List(b)) => a.is_subtype_of(b),
            (DType::Tuple(a), DType::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.is_subtype_of(y))
            }
            (DType::Tuple(items), DType::List(b)) => items.iter().all(|x| x.is_subtype_of(b)),
            _ => false,
        }
    }

    /// Least common supertype of two types. Falls back to [`DType::Any`].
    pub fn common_supertype(a: &DType, b: &DType) -> DType {
        if a.is_subtype_of(b) {
            return b.clone();
        }
        if b.is_subtype_of(a) {
            return a.clone();
        }
        match (a, b) {
            (DType::None, other) | (other, DType::None) => DType::optional(other.clone()),
            (DType::Optional(_), _) | (_, DType::Optional(_)) => DType::optional(
                DType::common_supertype(a.unoptionalize(), b.unoptionalize()),
            ),
            (DType::List(x), DType::List(y)) => DType::list(DType::common_supertype(x, y)),
            (DType::Tuple(xs), DType::Tuple(ys)) if xs.len() == ys.len() => DType::Tuple(
                xs.iter()
                    .zip(ys)
                    .map(|(x, y)| DType::common_supertype(x, y))
                    .collect(),
            ),
            (DType::Tuple(xs), DType::List(y)) | (DType::List(y), DType::Tuple(xs)) => {
                let element = xs
                    .iter()
                    .fold((**y).clone(), |acc, x| DType::common_supertype(&acc, x));
                DType::list(element)
            }
            _ => DType::Any,
        }
    }

    /// Unoptionalize both operands of a binary operator.
    pub fn unoptionalize_pair(left: &DType, right: &DType) -> (DType, DType) {
        (left.unoptionalize().clone(), right.unoptionalize().clone())
    }

    /// Runtime check that `value` inhabits this type.
    pub fn is_value_compatible(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Error) => false,
            (DType::Any, _) => true,
            (DType::None, Value::None) => true,
            (DType::Optional(_), Value::None) => true,
            (DType::Optional(inner), v) => inner.is_value_compatible(v),
            (DType::Bool, Value::Bool(_)) => true,
            (DType::Int, Value::Int(_)) => true,
            (DType::Float, Value::Float(_) | Value::Int(_)) => true,
            (DType::Str, Value::String(_)) => true,
            (DType::Bytes, Value::Bytes(_)) => true,
            (DType::Pointer, Value::Pointer(_)) => true,
            (DType::Json, Value::Json(_)) => true,
            (DType::DateTimeNaive, Value::DateTimeNaive(_)) => true,
            (DType::DateTimeUtc, Value::DateTimeUtc(_)) => true,
            (DType::Duration, Value::Duration(_)) => true,
            (DType::List(inner), Value::Tuple(items)) => {
                items.iter().all(|item| inner.is_value_compatible(item))
            }
            (DType::Tuple(types), Value::Tuple(items)) => {
                types.len() == items.len()
                    && types
                        .iter()
                        .zip(items.iter())
                        .all(|(t, item)| t.is_value_compatible(item))
            }
            _ => false,
        }
    }
}

fn normalize(dtype: &DType) -> DType {
    match dtype {
        DType::Optional(inner) => DType::optional(normalize(inner)),
        DType::List(inner) => DType::list(normalize(inner)),
        DType::Tuple(items) => DType::Tuple(items.iter().map(normalize).collect()),
        other => other.clone(),
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::Any => write!(f, "ANY"),
            DType::None => write!(f, "NONE"),
            DType::Bool => write!(f, "BOOL"),
            DType::Int => write!(f, "INT"),
            DType::Float => write!(f, "FLOAT"),
            DType::Str => write!(f, "STR"),
            DType::Bytes => write!(f, "BYTES"),
            DType::Pointer => write!(f, "POINTER"),
            DType::Json => write!(f, "JSON"),
            DType::DateTimeNaive => write!(f, "DATE_TIME_NAIVE"),
            DType::DateTimeUtc => write!(f, "DATE_TIME_UTC"),
            DType::Duration => write!(f, "DURATION"),
            DType::Optional(inner) => write!(f, "Optional({inner})"),
            DType::List(inner) => write!(f, "List({inner})"),
            DType::Tuple(items) => {
                write!(f, "Tuple(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_is_normalized() {
        let once = DType::optional(DType::Int);
        let twice = DType::optional(once.clone());
        assert_eq!(once, twice);
        assert_eq!(DType::optional(DType::Any), DType::Any);
        assert_eq!(DType::optional(DType::None), DType::None);
    }

    #[test]
    fn subtyping_rules() {
        assert!(DType::Int.is_subtype_of(&DType::Float));
        assert!(!DType::Float.is_subtype_of(&DType::Int));
        assert!(DType::Int.is_subtype_of(&DType::optional(DType::Int)));
        assert!(DType::None.is_subtype_of(&DType::optional(DType::Str)));
        assert!(DType::Str.is_subtype_of(&DType::Any));
        assert!(!DType::Bool.is_subtype_of(&DType::Int));
        assert!(
            DType::tuple([DType::Int, DType::Int]).is_subtype_of(&DType::list(DType::Float))
        );
    }

    #[test]
    fn common_supertype_promotes_and_lifts() {
        assert_eq!(
            DType::common_supertype(&DType::Int, &DType::Float),
            DType::Float
        );
        assert_eq!(
            DType::common_supertype(&DType::optional(DType::Int), &DType::Float),
            DType::optional(DType::Float)
        );
        assert_eq!(
            DType::common_supertype(&DType::None, &DType::Int),
            DType::optional(DType::Int)
        );
        assert_eq!(DType::common_supertype(&DType::Str, &DType::Int), DType::Any);
    }

    #[test]
    fn value_compatibility() {
        assert!(DType::optional(DType::Int).is_value_compatible(&Value::None));
        assert!(!DType::Int.is_value_compatible(&Value::None));
        assert!(DType::Float.is_value_compatible(&Value::Int(3)));
        assert!(!DType::Int.is_value_compatible(&Value::from("x")));
        assert!(!DType::Any.is_value_compatible(&Value::Error));
        let pair = Value::from(vec![Value::Int(1), Value::from("a")]);
        assert!(DType::tuple([DType::Int, DType::Str]).is_value_compatible(&pair));
        assert!(!DType::list(DType::Int).is_value_compatible(&pair));
    }
}
