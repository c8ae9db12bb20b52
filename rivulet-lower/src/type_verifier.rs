//! Runtime type verification.
//!
//! With runtime type checking enabled, every computed rowwise column is
//! rewritten so each intermediate value is checked against its static type.
//! A mismatch becomes a row-level error naming the value and the type.

use std::sync::Arc;

use rivulet_engine::Callable;
use rivulet_expr::{ApplyExpr, ColumnExpr, ExprKind};
use rivulet_types::{DType, Value};

/// Returns its single argument when it inhabits `dtype`.
struct TypeCheck {
    dtype: DType,
    name: String,
}

impl TypeCheck {
    fn new(dtype: DType) -> Self {
        let name = format!("check_type[{dtype}]");
        Self { dtype, name }
    }
}

impl Callable for TypeCheck {
    fn call(&self, args: &[Value]) -> Result<Value, String> {
        let [value] = args else {
            return Err(format!("{} expects one argument, got {}", self.name, args.len()));
        };
        if self.dtype.is_value_compatible(value) {
            Ok(value.clone())
        } else {
            Err(format!("value {value} is not of type {}", self.dtype))
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Wrap every node of `expr` in a deterministic check of its static type.
///
/// Constants are left alone, as are references to columns whose producer
/// guarantees their type.
pub fn verify(expr: &ColumnExpr) -> ColumnExpr {
    match expr.kind() {
        ExprKind::Const(_) => expr.clone(),
        ExprKind::ColumnRef(column) if column.trusted_dtype() => expr.clone(),
        _ => {
            let children: Vec<ColumnExpr> = expr.children().into_iter().map(verify).collect();
            let rebuilt = if children.is_empty() {
                expr.clone()
            } else {
                expr.with_children(children)
            };
            wrap(rebuilt)
        }
    }
}

fn wrap(expr: ColumnExpr) -> ColumnExpr {
    let dtype = expr.dtype().clone();
    // Any is satisfied by every value but an error, which never reaches
    // the callable.
    if dtype == DType::Any {
        return expr;
    }
    let check = ApplyExpr::new(Arc::new(TypeCheck::new(dtype.clone())), dtype)
        .arg(expr)
        .deterministic(true)
        .propagate_none(false);
    ColumnExpr::apply(check)
}
