//! Which engine primitive implements an operator for given static types.
//!
//! The signature tables live in `rivulet_expr::typing` and are shared with
//! expression construction. This module turns a successful lookup into an
//! [`EngineExpr`] and a failed one into [`Error::TypeError`].

use rivulet_engine::{BinaryOperator, EngineExpr, UnaryOperator};
use rivulet_expr::typing::{BinaryPlan, binary_plan, cast_is_noop, unary_signature};
use rivulet_result::{Error, Result};
use rivulet_types::{DType, Value};

pub fn unary(op: UnaryOperator, operand: EngineExpr, dtype: &DType) -> Result<EngineExpr> {
    match unary_signature(op, dtype) {
        Some(_) => Ok(EngineExpr::unary(op, operand)),
        None => Err(Error::type_error(format!(
            "unsupported operand type for unary {op}: {dtype}"
        ))),
    }
}

/// Lower `left op right`, where both sides were already cast to their common
/// operand type (if any).
pub fn binary(
    op: BinaryOperator,
    left: EngineExpr,
    right: EngineExpr,
    left_dtype: &DType,
    right_dtype: &DType,
) -> Result<EngineExpr> {
    match binary_plan(op, left_dtype, right_dtype) {
        Some(BinaryPlan::Direct(_) | BinaryPlan::Dynamic(_)) => {
            Ok(EngineExpr::binary(op, left, right))
        }
        Some(BinaryPlan::NoneGuarded(_)) => Ok(none_guarded(op, left, right)),
        None => Err(Error::type_error(format!(
            "unsupported operand types for {op}: {left_dtype} and {right_dtype}"
        ))),
    }
}

/// `None` if either side is `None`, otherwise the primitive.
fn none_guarded(op: BinaryOperator, left: EngineExpr, right: EngineExpr) -> EngineExpr {
    let apply = EngineExpr::binary(op, left.clone(), right.clone());
    EngineExpr::if_else(
        EngineExpr::is_none(left),
        EngineExpr::constant(Value::None),
        EngineExpr::if_else(
            EngineExpr::is_none(right),
            EngineExpr::constant(Value::None),
            apply,
        ),
    )
}

/// Conversions the engine's `cast` implements, on unoptionalized types.
pub fn cast_supported(source: &DType, target: &DType) -> bool {
    use DType as T;
    match (source.unoptionalize(), target.unoptionalize()) {
        (s, t) if s.equivalent_to(t) => true,
        (T::Any, _) | (_, T::Any) => true,
        (T::Int, T::Float) | (T::Float, T::Int) => true,
        (T::Bool, T::Int | T::Float) | (T::Int | T::Float, T::Bool) => true,
        (_, T::Str) => true,
        (T::Tuple(s), T::Tuple(t)) => {
            s.len() == t.len() && s.iter().zip(t).all(|(a, b)| cast_supported(a, b))
        }
        (T::Tuple(s), T::List(t)) => s.iter().all(|a| cast_supported(a, t)),
        (T::List(s), T::List(t)) => cast_supported(s, t),
        _ => false,
    }
}

pub fn cast(operand: EngineExpr, source: &DType, target: &DType) -> Result<EngineExpr> {
    if cast_is_noop(source, target) {
        return Ok(operand);
    }
    if cast_supported(source, target) {
        return Ok(EngineExpr::cast(operand, source.clone(), target.clone()));
    }
    Err(Error::type_error(format!("cannot cast {source} to {target}")))
}

fn convert_supported(source: &DType, target: &DType) -> bool {
    matches!(source.unoptionalize(), DType::Json | DType::Any)
        && matches!(
            target.unoptionalize(),
            DType::Bool | DType::Int | DType::Float | DType::Str | DType::Json
        )
}

/// Like [`cast`], but a JSON source is parsed into the target type.
pub fn convert(operand: EngineExpr, source: &DType, target: &DType) -> Result<EngineExpr> {
    if cast_is_noop(source, target) {
        return Ok(operand);
    }
    if convert_supported(source, target) || cast_supported(source, target) {
        return Ok(EngineExpr::convert(operand, source.clone(), target.clone()));
    }
    Err(Error::type_error(format!("cannot convert {source} to {target}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_arithmetic_is_guarded() {
        let opt = DType::optional(DType::Int);
        let e = binary(
            BinaryOperator::Add,
            EngineExpr::argument(0),
            EngineExpr::argument(1),
            &opt,
            &DType::Int,
        )
        .expect("supported");
        assert!(matches!(e, EngineExpr::IfElse { .. }));
    }

    #[test]
    fn unsupported_pairs_are_type_errors() {
        let err = binary(
            BinaryOperator::Sub,
            EngineExpr::argument(0),
            EngineExpr::argument(1),
            &DType::Str,
            &DType::Int,
        )
        .expect_err("no primitive");
        assert!(matches!(err, Error::TypeError(ref m) if m.contains("STR")));
        assert!(unary(UnaryOperator::Neg, EngineExpr::argument(0), &DType::Str).is_err());
    }

    #[test]
    fn cast_table() {
        let arg = EngineExpr::argument(0);
        assert!(cast(arg.clone(), &DType::Int, &DType::Int).is_ok_and(|e| e.same_as(&arg)));
        assert!(matches!(
            cast(arg.clone(), &DType::Int, &DType::Float),
            Ok(EngineExpr::Cast { .. })
        ));
        assert!(cast(arg.clone(), &DType::Pointer, &DType::Int).is_err());
        assert!(cast_supported(
            &DType::tuple([DType::Int, DType::Int]),
            &DType::list(DType::Float)
        ));
    }

    #[test]
    fn convert_parses_json() {
        let arg = EngineExpr::argument(0);
        assert!(matches!(
            convert(arg.clone(), &DType::Json, &DType::Int),
            Ok(EngineExpr::Convert { .. })
        ));
        assert!(convert(arg, &DType::Bytes, &DType::Int).is_err());
    }
}
