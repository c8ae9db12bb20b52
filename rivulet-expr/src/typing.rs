//! Static typing rules shared by expression construction and lowering.
//!
//! Expression constructors use these to compute a node's type; the lowering
//! layer uses the same tables to decide which primitive to emit, so the two
//! can never disagree about what an operator returns.

use rivulet_engine::{BinaryOperator, Method, UnaryOperator};
use rivulet_types::{DType, Value};

/// Type of a literal.
pub fn const_dtype(value: &Value) -> DType {
    match value {
        Value::None => DType::None,
        Value::Bool(_) => DType::Bool,
        Value::Int(_) => DType::Int,
        Value::Float(_) => DType::Float,
        Value::String(_) => DType::Str,
        Value::Bytes(_) => DType::Bytes,
        Value::Pointer(_) => DType::Pointer,
        Value::Tuple(items) => DType::Tuple(items.iter().map(const_dtype).collect()),
        Value::Json(_) => DType::Json,
        Value::DateTimeNaive(_) => DType::DateTimeNaive,
        Value::DateTimeUtc(_) => DType::DateTimeUtc,
        Value::Duration(_) => DType::Duration,
        Value::Error => DType::Any,
    }
}

/// Result type of a unary primitive, without optional lifting.
pub fn unary_signature(op: UnaryOperator, operand: &DType) -> Option<DType> {
    use DType as T;
    use UnaryOperator as U;
    match (op, operand) {
        (U::Neg, T::Int) => Some(T::Int),
        (U::Neg, T::Float) => Some(T::Float),
        (U::Neg, T::Duration) => Some(T::Duration),
        (U::Not, T::Bool) => Some(T::Bool),
        (U::Inv, T::Bool) => Some(T::Bool),
        (U::Inv, T::Int) => Some(T::Int),
        (_, T::Any) => Some(T::Any),
        _ => None,
    }
}

/// Common operand type both sides are cast to before dispatch.
///
/// `Int` mixed with `Float` widens to `Float` (lifted to optional when either
/// side is optional). Equality additionally unifies any pair with a common
/// supertype other than `Any`.
pub fn binary_operand_type(op: BinaryOperator, left: &DType, right: &DType) -> Option<DType> {
    if left.equivalent_to(right) {
        return None;
    }
    let (ul, ur) = DType::unoptionalize_pair(left, right);
    let lifted = left.accepts_none() || right.accepts_none();
    if ul.is_numeric() && ur.is_numeric() && ul != ur {
        return Some(if lifted {
            DType::optional(DType::Float)
        } else {
            DType::Float
        });
    }
    if matches!(op, BinaryOperator::Eq | BinaryOperator::Ne) {
        let common = DType::common_supertype(left, right);
        if common != DType::Any {
            return Some(common);
        }
    }
    None
}

fn is_orderable(dtype: &DType) -> bool {
    matches!(
        dtype,
        DType::Int
            | DType::Float
            | DType::Str
            | DType::Bool
            | DType::Bytes
            | DType::Pointer
            | DType::DateTimeNaive
            | DType::DateTimeUtc
            | DType::Duration
            | DType::Tuple(_)
    )
}

fn numeric_elements(dtype: &DType) -> Option<bool> {
    match dtype {
        DType::List(inner) => inner.is_numeric().then(|| **inner == DType::Int),
        DType::Tuple(items) => items
            .iter()
            .all(DType::is_numeric)
            .then(|| items.iter().all(|i| *i == DType::Int)),
        _ => None,
    }
}

/// Result type of a binary primitive on exactly these operand types.
pub fn binary_signature(op: BinaryOperator, left: &DType, right: &DType) -> Option<DType> {
    use BinaryOperator as B;
    use DType as T;
    match (op, left, right) {
        (B::Eq | B::Ne, l, r) if l.equivalent_to(r) => Some(T::Bool),
        (B::Eq | B::Ne, l, r) if l.is_numeric() && r.is_numeric() => Some(T::Bool),
        (B::Lt | B::Le | B::Gt | B::Ge, l, r) if l.equivalent_to(r) && is_orderable(l) => {
            Some(T::Bool)
        }

        (B::Add | B::Sub | B::Mul | B::FloorDiv | B::Mod | B::Pow, T::Int, T::Int) => Some(T::Int),
        (B::Add | B::Sub | B::Mul | B::FloorDiv | B::Mod | B::Pow, T::Float, T::Float) => {
            Some(T::Float)
        }
        (B::TrueDiv, T::Int, T::Int) | (B::TrueDiv, T::Float, T::Float) => Some(T::Float),

        (B::Add, T::Str, T::Str) => Some(T::Str),
        (B::Add, T::Tuple(a), T::Tuple(b)) => Some(T::Tuple(a.iter().chain(b).cloned().collect())),
        (B::Mul, T::Str, T::Int) | (B::Mul, T::Int, T::Str) => Some(T::Str),

        (B::Add | B::Sub, T::Duration, T::Duration) => Some(T::Duration),
        (B::Mul, T::Duration, T::Int) | (B::Mul, T::Int, T::Duration) => Some(T::Duration),
        (B::FloorDiv, T::Duration, T::Int) => Some(T::Duration),
        (B::TrueDiv, T::Duration, T::Duration) => Some(T::Float),
        (B::Add | B::Sub, T::DateTimeNaive, T::Duration) => Some(T::DateTimeNaive),
        (B::Add | B::Sub, T::DateTimeUtc, T::Duration) => Some(T::DateTimeUtc),
        (B::Add, T::Duration, T::DateTimeNaive) => Some(T::DateTimeNaive),
        (B::Add, T::Duration, T::DateTimeUtc) => Some(T::DateTimeUtc),
        (B::Sub, T::DateTimeNaive, T::DateTimeNaive) | (B::Sub, T::DateTimeUtc, T::DateTimeUtc) => {
            Some(T::Duration)
        }

        (B::And | B::Or | B::Xor, T::Bool, T::Bool) => Some(T::Bool),
        (B::And | B::Or | B::Xor, T::Int, T::Int) => Some(T::Int),

        (B::MatMul, l, r) => match (numeric_elements(l), numeric_elements(r)) {
            (Some(true), Some(true)) => Some(T::Int),
            (Some(_), Some(_)) => Some(T::Float),
            _ => None,
        },
        _ => None,
    }
}

/// How a binary node is compiled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BinaryPlan {
    /// A primitive exists for the (promoted) operand types.
    Direct(DType),
    /// A primitive exists for the unoptionalized operands; the result is
    /// `None` whenever either side is `None`.
    NoneGuarded(DType),
    /// At least one operand is `Any`; the engine dispatches per value.
    Dynamic(DType),
}

impl BinaryPlan {
    pub fn dtype(&self) -> &DType {
        match self {
            BinaryPlan::Direct(t) | BinaryPlan::NoneGuarded(t) | BinaryPlan::Dynamic(t) => t,
        }
    }
}

/// Resolve a binary operator after operand promotion. `None` means the pair
/// is unsupported.
pub fn binary_plan(op: BinaryOperator, left: &DType, right: &DType) -> Option<BinaryPlan> {
    let (left, right) = match binary_operand_type(op, left, right) {
        Some(common) => (common.clone(), common),
        None => (left.clone(), right.clone()),
    };
    if let Some(result) = binary_signature(op, &left, &right) {
        return Some(BinaryPlan::Direct(result));
    }
    let (ul, ur) = DType::unoptionalize_pair(&left, &right);
    if ul != left || ur != right {
        if let Some(result) = binary_signature(op, &ul, &ur) {
            return Some(BinaryPlan::NoneGuarded(DType::optional(result)));
        }
    }
    if ul == DType::Any || ur == DType::Any {
        let result = if op.is_comparison() {
            DType::Bool
        } else {
            DType::Any
        };
        return Some(BinaryPlan::Dynamic(result));
    }
    None
}

/// One signature of a built-in method.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodOverload {
    pub params: Vec<DType>,
    pub ret: DType,
}

impl MethodOverload {
    fn new(params: impl IntoIterator<Item = DType>, ret: DType) -> Self {
        Self {
            params: params.into_iter().collect(),
            ret,
        }
    }
}

/// Overloads in resolution order.
pub fn method_overloads(method: Method) -> Vec<MethodOverload> {
    use DType as T;
    match method {
        Method::Lower | Method::Upper => vec![MethodOverload::new([T::Str], T::Str)],
        Method::Len => vec![
            MethodOverload::new([T::Str], T::Int),
            MethodOverload::new([T::Bytes], T::Int),
            MethodOverload::new([T::Json], T::Int),
            MethodOverload::new([T::list(T::Any)], T::Int),
        ],
        Method::Abs => vec![
            MethodOverload::new([T::Int], T::Int),
            MethodOverload::new([T::Float], T::Float),
            MethodOverload::new([T::Duration], T::Duration),
        ],
        Method::Round => vec![
            MethodOverload::new([T::Float], T::Float),
            MethodOverload::new([T::Float, T::Int], T::Float),
        ],
        Method::ToString => vec![MethodOverload::new([T::Any], T::Str)],
        Method::ParseInt => vec![MethodOverload::new([T::Str], T::Int)],
        Method::ParseFloat => vec![MethodOverload::new([T::Str], T::Float)],
    }
}

/// First overload whose parameters accept `args` by subtyping.
pub fn resolve_method(method: Method, args: &[DType]) -> Option<MethodOverload> {
    method_overloads(method).into_iter().find(|overload| {
        overload.params.len() == args.len()
            && args
                .iter()
                .zip(&overload.params)
                .all(|(arg, param)| arg.is_subtype_of(param))
    })
}

/// `true` when `Cast(target)` on a `source` value compiles to nothing.
pub fn cast_is_noop(source: &DType, target: &DType) -> bool {
    target.equivalent_to(source)
        || target.equivalent_to(&DType::optional(source.clone()))
        || (*source == DType::None && target.is_optional())
        || *target == DType::Any
}
