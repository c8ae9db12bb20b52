//! Per-row interpretation of [`EngineExpr`].
//!
//! `Ok(Value::Error)` is an upstream error flowing through silently;
//! `Err(message)` is a new row error the caller logs.

use rivulet_types::{DType, Key, Value};

use crate::expression::{EngineExpr, ItemAccess};
use crate::ops::{BinaryOperator, Method, UnaryOperator};

pub(crate) type RowResult = Result<Value, String>;

macro_rules! propagate_error {
    ($($v:expr),+) => {
        $(if $v.is_error() { return Ok(Value::Error); })+
    };
}

pub(crate) fn eval(expr: &EngineExpr, args: &[Value]) -> RowResult {
    match expr {
        EngineExpr::Argument(i) => args
            .get(*i)
            .cloned()
            .ok_or_else(|| format!("argument {i} out of range")),
        EngineExpr::Const(v) => Ok(v.clone()),
        EngineExpr::Unary { op, operand } => {
            let v = eval(operand, args)?;
            propagate_error!(v);
            eval_unary(*op, &v)
        }
        EngineExpr::Binary { op, left, right } => {
            let l = eval(left, args)?;
            let r = eval(right, args)?;
            propagate_error!(l, r);
            eval_binary(*op, &l, &r)
        }
        EngineExpr::Cast {
            operand,
            source,
            target,
        } => {
            let v = eval(operand, args)?;
            propagate_error!(v);
            cast(&v, source, target)
        }
        EngineExpr::Convert {
            operand,
            source,
            target,
        } => {
            let v = eval(operand, args)?;
            propagate_error!(v);
            convert(&v, source, target)
        }
        EngineExpr::IfElse {
            cond,
            then,
            otherwise,
        } => {
            let c = eval(cond, args)?;
            propagate_error!(c);
            match c {
                Value::Bool(true) => eval(then, args),
                Value::Bool(false) => eval(otherwise, args),
                other => Err(format!("if_else condition is {}, not Bool", other.kind_name())),
            }
        }
        EngineExpr::IsNone(operand) => {
            let v = eval(operand, args)?;
            propagate_error!(v);
            Ok(Value::Bool(v.is_none()))
        }
        EngineExpr::PointerFrom {
            args: parts,
            instance,
            optional,
        } => {
            let mut values = eval_all(parts, args)?;
            if let Some(instance) = instance {
                values.push(eval(instance, args)?);
            }
            if values.iter().any(Value::is_error) {
                return Ok(Value::Error);
            }
            if *optional && values.iter().any(Value::is_none) {
                return Ok(Value::None);
            }
            Ok(Value::Pointer(Key::for_values(&values)))
        }
        EngineExpr::MakeTuple(items) => Ok(Value::from(eval_all(items, args)?)),
        EngineExpr::GetItem {
            access,
            object,
            index,
            default,
        } => {
            let o = eval(object, args)?;
            let i = eval(index, args)?;
            propagate_error!(o, i);
            let default = match default {
                Some(d) => Some(eval(d, args)?),
                None => None,
            };
            get_item(*access, &o, &i, default)
        }
        EngineExpr::Unwrap(operand) => {
            let v = eval(operand, args)?;
            match v {
                Value::None => Err("cannot unwrap None".to_string()),
                other => Ok(other),
            }
        }
        EngineExpr::FillError {
            operand,
            replacement,
        } => match eval(operand, args) {
            Ok(Value::Error) | Err(_) => eval(replacement, args),
            ok => ok,
        },
        EngineExpr::Method {
            method,
            args: method_args,
        } => {
            let values = eval_all(method_args, args)?;
            if values.iter().any(Value::is_error) {
                return Ok(Value::Error);
            }
            eval_method(*method, &values)
        }
        EngineExpr::Apply {
            func,
            args: call_args,
            propagate_none,
        } => {
            let values = eval_all(call_args, args)?;
            if values.iter().any(Value::is_error) {
                return Ok(Value::Error);
            }
            if *propagate_none && values.iter().any(Value::is_none) {
                return Ok(Value::None);
            }
            func.call(&values)
                .map_err(|e| format!("{} failed: {e}", func.name()))
        }
    }
}

fn eval_all(exprs: &[EngineExpr], args: &[Value]) -> Result<Vec<Value>, String> {
    exprs.iter().map(|e| eval(e, args)).collect()
}

fn unsupported(op: impl std::fmt::Display, values: &[&Value]) -> String {
    let kinds: Vec<&str> = values.iter().map(|v| v.kind_name()).collect();
    format!("unsupported operand types for {op}: {}", kinds.join(", "))
}

fn eval_unary(op: UnaryOperator, v: &Value) -> RowResult {
    match (op, v) {
        (UnaryOperator::Neg, Value::Int(i)) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| "integer overflow".to_string()),
        (UnaryOperator::Neg, Value::Float(x)) => Ok(Value::Float(-x)),
        (UnaryOperator::Neg, Value::Duration(d)) => Ok(Value::Duration(-d)),
        (UnaryOperator::Not | UnaryOperator::Inv, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOperator::Inv, Value::Int(i)) => Ok(Value::Int(!i)),
        _ => Err(unsupported(op, &[v])),
    }
}

fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        Some(q - 1)
    } else {
        Some(q)
    }
}

fn floor_mod(a: i64, b: i64) -> Option<i64> {
    let r = a.checked_rem(b)?;
    if r != 0 && ((r < 0) != (b < 0)) {
        Some(r + b)
    } else {
        Some(r)
    }
}

fn overflow() -> String {
    "integer overflow".to_string()
}

fn div_by_zero() -> String {
    "division by zero".to_string()
}

fn eval_binary(op: BinaryOperator, l: &Value, r: &Value) -> RowResult {
    use BinaryOperator as B;
    use Value as V;

    if op.is_comparison() {
        return compare(op, l, r);
    }
    match (op, l, r) {
        (B::Add, V::Int(a), V::Int(b)) => a.checked_add(*b).map(V::Int).ok_or_else(overflow),
        (B::Sub, V::Int(a), V::Int(b)) => a.checked_sub(*b).map(V::Int).ok_or_else(overflow),
        (B::Mul, V::Int(a), V::Int(b)) => a.checked_mul(*b).map(V::Int).ok_or_else(overflow),
        (B::TrueDiv, V::Int(_), V::Int(0)) | (B::FloorDiv, V::Int(_), V::Int(0)) => {
            Err(div_by_zero())
        }
        (B::Mod, V::Int(_), V::Int(0)) => Err(div_by_zero()),
        (B::TrueDiv, V::Int(a), V::Int(b)) => Ok(V::Float(*a as f64 / *b as f64)),
        (B::FloorDiv, V::Int(a), V::Int(b)) => floor_div(*a, *b).map(V::Int).ok_or_else(overflow),
        (B::Mod, V::Int(a), V::Int(b)) => floor_mod(*a, *b).map(V::Int).ok_or_else(overflow),
        (B::Pow, V::Int(a), V::Int(b)) => {
            let exp = u32::try_from(*b).map_err(|_| "negative exponent".to_string())?;
            a.checked_pow(exp).map(V::Int).ok_or_else(overflow)
        }
        (B::And, V::Int(a), V::Int(b)) => Ok(V::Int(a & b)),
        (B::Or, V::Int(a), V::Int(b)) => Ok(V::Int(a | b)),
        (B::Xor, V::Int(a), V::Int(b)) => Ok(V::Int(a ^ b)),

        (B::Add, V::Float(a), V::Float(b)) => Ok(V::Float(a + b)),
        (B::Sub, V::Float(a), V::Float(b)) => Ok(V::Float(a - b)),
        (B::Mul, V::Float(a), V::Float(b)) => Ok(V::Float(a * b)),
        (B::TrueDiv | B::FloorDiv | B::Mod, V::Float(_), V::Float(b)) if *b == 0.0 => {
            Err(div_by_zero())
        }
        (B::TrueDiv, V::Float(a), V::Float(b)) => Ok(V::Float(a / b)),
        (B::FloorDiv, V::Float(a), V::Float(b)) => Ok(V::Float((a / b).floor())),
        (B::Mod, V::Float(a), V::Float(b)) => Ok(V::Float(a - b * (a / b).floor())),
        (B::Pow, V::Float(a), V::Float(b)) => Ok(V::Float(a.powf(*b))),

        (B::And, V::Bool(a), V::Bool(b)) => Ok(V::Bool(*a && *b)),
        (B::Or, V::Bool(a), V::Bool(b)) => Ok(V::Bool(*a || *b)),
        (B::Xor, V::Bool(a), V::Bool(b)) => Ok(V::Bool(a ^ b)),

        (B::Add, V::String(a), V::String(b)) => Ok(V::from(format!("{a}{b}"))),
        (B::Mul, V::String(s), V::Int(n)) | (B::Mul, V::Int(n), V::String(s)) => {
            Ok(V::from(s.repeat(usize::try_from(*n).unwrap_or(0))))
        }
        (B::Add, V::Tuple(a), V::Tuple(b)) => {
            Ok(V::from_tuple(a.iter().chain(b.iter()).cloned()))
        }

        (B::Add, V::Duration(a), V::Duration(b)) => {
            a.checked_add(*b).map(V::Duration).ok_or_else(overflow)
        }
        (B::Sub, V::Duration(a), V::Duration(b)) => {
            a.checked_sub(*b).map(V::Duration).ok_or_else(overflow)
        }
        (B::Mul, V::Duration(d), V::Int(n)) | (B::Mul, V::Int(n), V::Duration(d)) => {
            d.checked_mul(*n).map(V::Duration).ok_or_else(overflow)
        }
        (B::TrueDiv, V::Duration(_), V::Duration(0)) => Err(div_by_zero()),
        (B::TrueDiv, V::Duration(a), V::Duration(b)) => Ok(V::Float(*a as f64 / *b as f64)),
        (B::Add, V::DateTimeNaive(t), V::Duration(d))
        | (B::Add, V::Duration(d), V::DateTimeNaive(t)) => {
            t.checked_add(*d).map(V::DateTimeNaive).ok_or_else(overflow)
        }
        (B::Add, V::DateTimeUtc(t), V::Duration(d))
        | (B::Add, V::Duration(d), V::DateTimeUtc(t)) => {
            t.checked_add(*d).map(V::DateTimeUtc).ok_or_else(overflow)
        }
        (B::Sub, V::DateTimeNaive(t), V::Duration(d)) => {
            t.checked_sub(*d).map(V::DateTimeNaive).ok_or_else(overflow)
        }
        (B::Sub, V::DateTimeUtc(t), V::Duration(d)) => {
            t.checked_sub(*d).map(V::DateTimeUtc).ok_or_else(overflow)
        }
        (B::Sub, V::DateTimeNaive(a), V::DateTimeNaive(b))
        | (B::Sub, V::DateTimeUtc(a), V::DateTimeUtc(b)) => {
            a.checked_sub(*b).map(V::Duration).ok_or_else(overflow)
        }

        (B::MatMul, V::Tuple(a), V::Tuple(b)) => dot(a, b),
        _ => Err(unsupported(op, &[l, r])),
    }
}

fn dot(a: &[Value], b: &[Value]) -> RowResult {
    if a.len() != b.len() {
        return Err(format!(
            "matmul operands have different lengths: {} and {}",
            a.len(),
            b.len()
        ));
    }
    let all_int = a.iter().chain(b).all(|v| matches!(v, Value::Int(_)));
    if all_int {
        let mut acc: i64 = 0;
        for (x, y) in a.iter().zip(b) {
            let (Some(x), Some(y)) = (x.as_int(), y.as_int()) else {
                return Err(unsupported(BinaryOperator::MatMul, &[x, y]));
            };
            acc = x
                .checked_mul(y)
                .and_then(|p| acc.checked_add(p))
                .ok_or_else(overflow)?;
        }
        return Ok(Value::Int(acc));
    }
    let mut acc = 0.0;
    for (x, y) in a.iter().zip(b) {
        let (Some(x), Some(y)) = (x.as_float(), y.as_float()) else {
            return Err(unsupported(BinaryOperator::MatMul, &[x, y]));
        };
        acc += x * y;
    }
    Ok(Value::Float(acc))
}

fn compare(op: BinaryOperator, l: &Value, r: &Value) -> RowResult {
    let ordering = match (l, r) {
        (Value::Int(_), Value::Float(_)) | (Value::Float(_), Value::Int(_)) => {
            let (Some(a), Some(b)) = (l.as_float(), r.as_float()) else {
                return Err(unsupported(op, &[l, r]));
            };
            a.total_cmp(&b)
        }
        _ => {
            let comparable = std::mem::discriminant(l) == std::mem::discriminant(r);
            if !comparable && !matches!(op, BinaryOperator::Eq | BinaryOperator::Ne) {
                return Err(unsupported(op, &[l, r]));
            }
            l.cmp(r)
        }
    };
    let result = match op {
        BinaryOperator::Eq => ordering.is_eq(),
        BinaryOperator::Ne => ordering.is_ne(),
        BinaryOperator::Lt => ordering.is_lt(),
        BinaryOperator::Le => ordering.is_le(),
        BinaryOperator::Gt => ordering.is_gt(),
        BinaryOperator::Ge => ordering.is_ge(),
        _ => return Err(unsupported(op, &[l, r])),
    };
    Ok(Value::Bool(result))
}

fn cast(value: &Value, source: &DType, target: &DType) -> RowResult {
    if value.is_none() {
        return Ok(Value::None);
    }
    let target = target.unoptionalize();
    match (value, target) {
        (_, DType::Any) => Ok(value.clone()),
        (Value::Int(i), DType::Float) => Ok(Value::Float(*i as f64)),
        (Value::Float(x), DType::Int) => {
            if x.is_finite() {
                Ok(Value::Int(x.trunc() as i64))
            } else {
                Err(format!("cannot cast {x} to INT"))
            }
        }
        (Value::Bool(b), DType::Int) => Ok(Value::Int(i64::from(*b))),
        (Value::Bool(b), DType::Float) => Ok(Value::Float(f64::from(u8::from(*b)))),
        (Value::Int(i), DType::Bool) => Ok(Value::Bool(*i != 0)),
        (Value::Float(x), DType::Bool) => Ok(Value::Bool(*x != 0.0)),
        (Value::String(_), DType::Str) => Ok(value.clone()),
        (_, DType::Str) => Ok(Value::from(value.to_string())),
        (Value::Tuple(items), DType::Tuple(types)) if items.len() == types.len() => {
            let source_items = match source.unoptionalize() {
                DType::Tuple(s) if s.len() == items.len() => s.clone(),
                _ => vec![DType::Any; items.len()],
            };
            let cast_items = items
                .iter()
                .zip(source_items.iter().zip(types))
                .map(|(item, (s, t))| cast(item, s, t))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::from(cast_items))
        }
        (Value::Tuple(items), DType::List(element)) => {
            let cast_items = items
                .iter()
                .map(|item| cast(item, &DType::Any, element))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::from(cast_items))
        }
        _ if target.is_value_compatible(value) => Ok(value.clone()),
        _ => Err(format!(
            "cannot cast {} value from {source} to {target}",
            value.kind_name()
        )),
    }
}

fn convert(value: &Value, source: &DType, target: &DType) -> RowResult {
    let Value::Json(json) = value else {
        return cast(value, source, target);
    };
    let target = target.unoptionalize();
    let mismatch = || format!("cannot convert JSON {json} to {target}");
    match (json.as_ref(), target) {
        (serde_json::Value::Null, _) => Ok(Value::None),
        (_, DType::Json | DType::Any) => Ok(value.clone()),
        (serde_json::Value::Bool(b), DType::Bool) => Ok(Value::Bool(*b)),
        (serde_json::Value::Number(n), DType::Int) => {
            n.as_i64().map(Value::Int).ok_or_else(mismatch)
        }
        (serde_json::Value::Number(n), DType::Float) => {
            n.as_f64().map(Value::Float).ok_or_else(mismatch)
        }
        (serde_json::Value::String(s), DType::Str) => Ok(Value::from(s.as_str())),
        _ => Err(mismatch()),
    }
}

fn get_item(access: ItemAccess, object: &Value, index: &Value, default: Option<Value>) -> RowResult {
    let found = match (access, object) {
        (_, Value::None) => None,
        (ItemAccess::Json, Value::Json(json)) => {
            let item = match (json.as_ref(), index) {
                (serde_json::Value::Object(map), Value::String(k)) => map.get(k.as_ref()),
                (serde_json::Value::Array(items), Value::Int(i)) => {
                    usize::try_from(*i).ok().and_then(|i| items.get(i))
                }
                _ => None,
            };
            item.map(|j| Value::json(j.clone()))
        }
        (ItemAccess::Sequence, Value::Tuple(items)) => {
            let Some(i) = index.as_int() else {
                return Err(format!("sequence index must be Int, got {}", index.kind_name()));
            };
            let len = items.len() as i64;
            let i = if i < 0 { i + len } else { i };
            usize::try_from(i).ok().and_then(|i| items.get(i)).cloned()
        }
        (_, other) => {
            return Err(format!("cannot index into {}", other.kind_name()));
        }
    };
    match (found, default) {
        (Some(v), _) => Ok(v),
        (None, Some(default)) => Ok(default),
        (None, None) => Err(format!("index {index} not found in {object}")),
    }
}

fn eval_method(method: Method, args: &[Value]) -> RowResult {
    let bad_args = || {
        let kinds: Vec<&str> = args.iter().map(Value::kind_name).collect();
        format!("{method} does not accept ({})", kinds.join(", "))
    };
    match (method, args) {
        (Method::Lower, [Value::String(s)]) => Ok(Value::from(s.to_lowercase())),
        (Method::Upper, [Value::String(s)]) => Ok(Value::from(s.to_uppercase())),
        (Method::Len, [Value::String(s)]) => Ok(Value::Int(s.chars().count() as i64)),
        (Method::Len, [Value::Bytes(b)]) => Ok(Value::Int(b.len() as i64)),
        (Method::Len, [Value::Tuple(items)]) => Ok(Value::Int(items.len() as i64)),
        (Method::Len, [Value::Json(j)]) => match j.as_ref() {
            serde_json::Value::Array(a) => Ok(Value::Int(a.len() as i64)),
            serde_json::Value::Object(o) => Ok(Value::Int(o.len() as i64)),
            serde_json::Value::String(s) => Ok(Value::Int(s.chars().count() as i64)),
            _ => Err(bad_args()),
        },
        (Method::Abs, [Value::Int(i)]) => i.checked_abs().map(Value::Int).ok_or_else(overflow),
        (Method::Abs, [Value::Float(x)]) => Ok(Value::Float(x.abs())),
        (Method::Round, [Value::Float(x)]) => Ok(Value::Float(x.round())),
        (Method::Round, [Value::Float(x), Value::Int(digits)]) => {
            let scale = 10f64.powi(i32::try_from(*digits).map_err(|_| bad_args())?);
            Ok(Value::Float((x * scale).round() / scale))
        }
        (Method::ToString, [Value::String(_)]) => Ok(args[0].clone()),
        (Method::ToString, [v]) => Ok(Value::from(v.to_string())),
        (Method::ParseInt, [Value::String(s)]) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|e| format!("parse_int({s:?}): {e}")),
        (Method::ParseFloat, [Value::String(s)]) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|e| format!("parse_float({s:?}): {e}")),
        _ => Err(bad_args()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(i: i64) -> EngineExpr {
        EngineExpr::constant(Value::Int(i))
    }

    #[test]
    fn python_style_integer_division() {
        let e = EngineExpr::binary(BinaryOperator::FloorDiv, int(-7), int(2));
        assert_eq!(eval(&e, &[]), Ok(Value::Int(-4)));
        let e = EngineExpr::binary(BinaryOperator::Mod, int(-7), int(2));
        assert_eq!(eval(&e, &[]), Ok(Value::Int(1)));
        let e = EngineExpr::binary(BinaryOperator::TrueDiv, int(1), int(0));
        assert!(eval(&e, &[]).is_err());
    }

    #[test]
    fn errors_propagate_silently_and_fill_error_catches() {
        let e = EngineExpr::binary(
            BinaryOperator::Add,
            EngineExpr::argument(0),
            int(1),
        );
        assert_eq!(eval(&e, &[Value::Error]), Ok(Value::Error));
        let failing = EngineExpr::binary(BinaryOperator::FloorDiv, int(1), int(0));
        let filled = EngineExpr::fill_error(failing, int(-1));
        assert_eq!(eval(&filled, &[]), Ok(Value::Int(-1)));
    }

    #[test]
    fn casts() {
        let e = EngineExpr::cast(int(3), DType::Int, DType::Float);
        assert_eq!(eval(&e, &[]), Ok(Value::Float(3.0)));
        let e = EngineExpr::cast(
            EngineExpr::constant(Value::Float(-2.7)),
            DType::Float,
            DType::Int,
        );
        assert_eq!(eval(&e, &[]), Ok(Value::Int(-2)));
        let e = EngineExpr::cast(EngineExpr::constant(Value::None), DType::None, DType::Float);
        assert_eq!(eval(&e, &[]), Ok(Value::None));
    }

    #[test]
    fn json_and_sequence_access() {
        let doc = Value::json(serde_json::json!({"a": [10, 20]}));
        let get_a = EngineExpr::json_get_item_unchecked(
            EngineExpr::argument(0),
            EngineExpr::constant(Value::from("a")),
        );
        let get_a1 = EngineExpr::json_get_item_unchecked(get_a.clone(), int(1));
        assert_eq!(
            eval(&get_a1, std::slice::from_ref(&doc)),
            Ok(Value::json(serde_json::json!(20)))
        );
        let missing = EngineExpr::json_get_item_checked(
            EngineExpr::argument(0),
            EngineExpr::constant(Value::from("b")),
            EngineExpr::constant(Value::None),
        );
        assert_eq!(eval(&missing, std::slice::from_ref(&doc)), Ok(Value::None));

        let tuple = Value::from(vec![Value::Int(1), Value::Int(2)]);
        let last = EngineExpr::sequence_get_item_unchecked(EngineExpr::argument(0), int(-1));
        assert_eq!(eval(&last, std::slice::from_ref(&tuple)), Ok(Value::Int(2)));
        let oob = EngineExpr::sequence_get_item_unchecked(EngineExpr::argument(0), int(5));
        assert!(eval(&oob, &[tuple]).is_err());
    }

    #[test]
    fn methods() {
        let e = EngineExpr::method(Method::Upper, vec![EngineExpr::constant(Value::from("ab"))]);
        assert_eq!(eval(&e, &[]), Ok(Value::from("AB")));
        let e = EngineExpr::method(Method::ParseInt, vec![EngineExpr::constant(Value::from("x"))]);
        assert!(eval(&e, &[]).is_err());
    }
}
