//! Column expressions.
//!
//! Nodes are immutable and cheap to clone (children are shared behind an
//! `Arc`). Every node carries its static [`DType`], computed once at
//! construction. When a rule cannot type a node the type falls back to
//! [`DType::Any`]; the lowering pass reports the actual error with the
//! operand types in the message.

use std::fmt;
use std::sync::Arc;

use rivulet_engine::{BinaryOperator, CallableRef, Method, UnaryOperator};
use rivulet_types::{DType, Value};

use crate::column::Column;
use crate::reducers::ReducerKind;
use crate::typing;

/// A user function application together with its call-site flags.
#[derive(Clone)]
pub struct ApplyExpr {
    pub func: CallableRef,
    pub args: Vec<ColumnExpr>,
    pub kwargs: Vec<(String, ColumnExpr)>,
    pub return_type: DType,
    pub deterministic: bool,
    pub propagate_none: bool,
}

impl ApplyExpr {
    pub fn new(func: CallableRef, return_type: DType) -> Self {
        Self {
            func,
            args: Vec::new(),
            kwargs: Vec::new(),
            return_type,
            deterministic: false,
            propagate_none: false,
        }
    }

    pub fn arg(mut self, arg: ColumnExpr) -> Self {
        self.args.push(arg);
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = ColumnExpr>) -> Self {
        self.args.extend(args);
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, arg: ColumnExpr) -> Self {
        self.kwargs.push((name.into(), arg));
        self
    }

    pub fn deterministic(mut self, deterministic: bool) -> Self {
        self.deterministic = deterministic;
        self
    }

    pub fn propagate_none(mut self, propagate_none: bool) -> Self {
        self.propagate_none = propagate_none;
        self
    }

    fn dtype(&self) -> DType {
        let none_possible = self
            .args
            .iter()
            .chain(self.kwargs.iter().map(|(_, e)| e))
            .any(|e| e.dtype().accepts_none());
        if self.propagate_none && none_possible {
            DType::optional(self.return_type.clone())
        } else {
            self.return_type.clone()
        }
    }

    fn all_args(&self) -> impl Iterator<Item = &ColumnExpr> {
        self.args.iter().chain(self.kwargs.iter().map(|(_, e)| e))
    }

    fn with_args(&self, next: &mut impl FnMut() -> ColumnExpr) -> ApplyExpr {
        ApplyExpr {
            func: self.func.clone(),
            args: self.args.iter().map(|_| next()).collect(),
            kwargs: self.kwargs.iter().map(|(name, _)| (name.clone(), next())).collect(),
            return_type: self.return_type.clone(),
            deterministic: self.deterministic,
            propagate_none: self.propagate_none,
        }
    }
}

#[derive(Clone)]
pub enum ExprKind {
    ColumnRef(Column),
    Const(Value),
    Unary {
        op: UnaryOperator,
        operand: ColumnExpr,
    },
    Binary {
        op: BinaryOperator,
        left: ColumnExpr,
        right: ColumnExpr,
    },
    Cast {
        target: DType,
        operand: ColumnExpr,
    },
    Convert {
        target: DType,
        operand: ColumnExpr,
    },
    /// Override the static type without any runtime effect.
    Declare {
        target: DType,
        operand: ColumnExpr,
    },
    /// First non-`None` argument.
    Coalesce(Vec<ColumnExpr>),
    /// `value` unless any guard is `None`.
    Require {
        value: ColumnExpr,
        guards: Vec<ColumnExpr>,
    },
    IfElse {
        cond: ColumnExpr,
        then: ColumnExpr,
        otherwise: ColumnExpr,
    },
    IsNone(ColumnExpr),
    IsNotNone(ColumnExpr),
    Reducer {
        kind: ReducerKind,
        args: Vec<ColumnExpr>,
    },
    PointerFrom {
        args: Vec<ColumnExpr>,
        instance: Option<ColumnExpr>,
        optional: bool,
    },
    MakeTuple(Vec<ColumnExpr>),
    Get {
        object: ColumnExpr,
        index: ColumnExpr,
        default: ColumnExpr,
        check_exists: bool,
    },
    MethodCall {
        method: Method,
        args: Vec<ColumnExpr>,
    },
    Unwrap(ColumnExpr),
    FillError {
        operand: ColumnExpr,
        replacement: ColumnExpr,
    },
    Apply(ApplyExpr),
    AsyncApply(ApplyExpr),
    /// Calling a column as a function. Planners desugar this away before
    /// lowering.
    Call {
        callee: ColumnExpr,
        args: Vec<ColumnExpr>,
    },
}

struct ExprNode {
    kind: ExprKind,
    dtype: DType,
}

#[derive(Clone)]
pub struct ColumnExpr(Arc<ExprNode>);

impl ColumnExpr {
    fn new(kind: ExprKind, dtype: DType) -> Self {
        ColumnExpr(Arc::new(ExprNode { kind, dtype }))
    }

    pub fn kind(&self) -> &ExprKind {
        &self.0.kind
    }

    pub fn dtype(&self) -> &DType {
        &self.0.dtype
    }

    /// `true` if both handles point at the same node.
    pub fn ptr_eq(&self, other: &ColumnExpr) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn column(column: &Column) -> Self {
        ColumnExpr::new(ExprKind::ColumnRef(column.clone()), column.dtype().clone())
    }

    pub fn constant(value: impl Into<Value>) -> Self {
        let value = value.into();
        let dtype = typing::const_dtype(&value);
        ColumnExpr::new(ExprKind::Const(value), dtype)
    }

    pub fn none() -> Self {
        ColumnExpr::constant(Value::None)
    }

    pub fn unary(op: UnaryOperator, operand: ColumnExpr) -> Self {
        let dtype = typing::unary_signature(op, operand.dtype()).unwrap_or(DType::Any);
        ColumnExpr::new(ExprKind::Unary { op, operand }, dtype)
    }

    pub fn binary(op: BinaryOperator, left: ColumnExpr, right: ColumnExpr) -> Self {
        let dtype = typing::binary_plan(op, left.dtype(), right.dtype())
            .map(|plan| plan.dtype().clone())
            .unwrap_or(DType::Any);
        ColumnExpr::new(ExprKind::Binary { op, left, right }, dtype)
    }

    pub fn cast(target: DType, operand: ColumnExpr) -> Self {
        let dtype = if !target.accepts_none()
            && operand.dtype().accepts_none()
            && *operand.dtype() != DType::Any
        {
            DType::optional(target.clone())
        } else {
            target.clone()
        };
        ColumnExpr::new(ExprKind::Cast { target, operand }, dtype)
    }

    /// Convert a semi-structured value. JSON and optional sources may
    /// produce `None`, so the result is optional for them.
    pub fn convert(target: DType, operand: ColumnExpr) -> Self {
        let source = operand.dtype();
        let dtype = if *source.unoptionalize() == DType::Json || source.is_optional() {
            DType::optional(target.clone())
        } else {
            target.clone()
        };
        ColumnExpr::new(ExprKind::Convert { target, operand }, dtype)
    }

    pub fn declare(target: DType, operand: ColumnExpr) -> Self {
        ColumnExpr::new(
            ExprKind::Declare {
                target: target.clone(),
                operand,
            },
            target,
        )
    }

    /// # Panics
    ///
    /// If `args` is empty.
    pub fn coalesce(args: Vec<ColumnExpr>) -> Self {
        assert!(!args.is_empty(), "coalesce needs at least one argument");
        let mut dtype = args[0].dtype().clone();
        for arg in &args[1..] {
            dtype = DType::common_supertype(&dtype, arg.dtype());
        }
        if args.iter().any(|a| !a.dtype().accepts_none()) {
            dtype = dtype.unoptionalize().clone();
        }
        ColumnExpr::new(ExprKind::Coalesce(args), dtype)
    }

    pub fn require(value: ColumnExpr, guards: Vec<ColumnExpr>) -> Self {
        let dtype = DType::optional(value.dtype().clone());
        ColumnExpr::new(ExprKind::Require { value, guards }, dtype)
    }

    pub fn if_else(cond: ColumnExpr, then: ColumnExpr, otherwise: ColumnExpr) -> Self {
        let dtype = DType::common_supertype(then.dtype(), otherwise.dtype());
        ColumnExpr::new(
            ExprKind::IfElse {
                cond,
                then,
                otherwise,
            },
            dtype,
        )
    }

    pub fn is_none(operand: ColumnExpr) -> Self {
        ColumnExpr::new(ExprKind::IsNone(operand), DType::Bool)
    }

    pub fn is_not_none(operand: ColumnExpr) -> Self {
        ColumnExpr::new(ExprKind::IsNotNone(operand), DType::Bool)
    }

    pub fn reducer(kind: ReducerKind, args: Vec<ColumnExpr>) -> Self {
        let arg_types: Vec<DType> = args.iter().map(|a| a.dtype().clone()).collect();
        let dtype = kind.return_type(&arg_types);
        ColumnExpr::new(ExprKind::Reducer { kind, args }, dtype)
    }

    pub fn pointer_from(args: Vec<ColumnExpr>, instance: Option<ColumnExpr>, optional: bool) -> Self {
        let dtype = if optional {
            DType::optional(DType::Pointer)
        } else {
            DType::Pointer
        };
        ColumnExpr::new(
            ExprKind::PointerFrom {
                args,
                instance,
                optional,
            },
            dtype,
        )
    }

    pub fn make_tuple(args: Vec<ColumnExpr>) -> Self {
        let dtype = DType::Tuple(args.iter().map(|a| a.dtype().clone()).collect());
        ColumnExpr::new(ExprKind::MakeTuple(args), dtype)
    }

    /// Index into a JSON document or a sequence.
    ///
    /// With `check_exists` a missing item yields `default` (or `None`);
    /// without it a missing item is a row error.
    pub fn get(
        object: ColumnExpr,
        index: ColumnExpr,
        default: Option<ColumnExpr>,
        check_exists: bool,
    ) -> Self {
        let default = default.unwrap_or_else(ColumnExpr::none);
        let dtype = get_dtype(&object, &index, &default, check_exists);
        ColumnExpr::new(
            ExprKind::Get {
                object,
                index,
                default,
                check_exists,
            },
            dtype,
        )
    }

    pub fn method_call(method: Method, args: Vec<ColumnExpr>) -> Self {
        let arg_types: Vec<DType> = args.iter().map(|a| a.dtype().clone()).collect();
        let dtype = typing::resolve_method(method, &arg_types)
            .map(|overload| overload.ret)
            .unwrap_or(DType::Any);
        ColumnExpr::new(ExprKind::MethodCall { method, args }, dtype)
    }

    pub fn unwrap(operand: ColumnExpr) -> Self {
        let dtype = operand.dtype().unoptionalize().clone();
        ColumnExpr::new(ExprKind::Unwrap(operand), dtype)
    }

    pub fn fill_error(operand: ColumnExpr, replacement: ColumnExpr) -> Self {
        let dtype = DType::common_supertype(operand.dtype(), replacement.dtype());
        ColumnExpr::new(
            ExprKind::FillError {
                operand,
                replacement,
            },
            dtype,
        )
    }

    pub fn apply(apply: ApplyExpr) -> Self {
        let dtype = apply.dtype();
        ColumnExpr::new(ExprKind::Apply(apply), dtype)
    }

    pub fn async_apply(apply: ApplyExpr) -> Self {
        let dtype = apply.dtype();
        ColumnExpr::new(ExprKind::AsyncApply(apply), dtype)
    }

    pub fn call(callee: ColumnExpr, args: Vec<ColumnExpr>) -> Self {
        ColumnExpr::new(ExprKind::Call { callee, args }, DType::Any)
    }

    /// Direct children in evaluation order.
    pub fn children(&self) -> Vec<&ColumnExpr> {
        match self.kind() {
            ExprKind::ColumnRef(_) | ExprKind::Const(_) => Vec::new(),
            ExprKind::Unary { operand, .. }
            | ExprKind::Cast { operand, .. }
            | ExprKind::Convert { operand, .. }
            | ExprKind::Declare { operand, .. }
            | ExprKind::IsNone(operand)
            | ExprKind::IsNotNone(operand)
            | ExprKind::Unwrap(operand) => vec![operand],
            ExprKind::Binary { left, right, .. } => vec![left, right],
            ExprKind::Coalesce(args)
            | ExprKind::MakeTuple(args)
            | ExprKind::Reducer { args, .. }
            | ExprKind::MethodCall { args, .. } => args.iter().collect(),
            ExprKind::Require { value, guards } => std::iter::once(value).chain(guards).collect(),
            ExprKind::IfElse {
                cond,
                then,
                otherwise,
            } => vec![cond, then, otherwise],
            ExprKind::PointerFrom { args, instance, .. } => {
                args.iter().chain(instance.as_ref()).collect()
            }
            ExprKind::Get {
                object,
                index,
                default,
                ..
            } => vec![object, index, default],
            ExprKind::FillError {
                operand,
                replacement,
            } => vec![operand, replacement],
            ExprKind::Apply(apply) | ExprKind::AsyncApply(apply) => apply.all_args().collect(),
            ExprKind::Call { callee, args } => std::iter::once(callee).chain(args).collect(),
        }
    }

    /// Same node with its children replaced, in [`ColumnExpr::children`]
    /// order. The node keeps its static type.
    ///
    /// # Panics
    ///
    /// If `children` has a different length than the node's children.
    pub fn with_children(&self, children: Vec<ColumnExpr>) -> ColumnExpr {
        assert_eq!(
            children.len(),
            self.children().len(),
            "child count mismatch rebuilding {}",
            self.variant_name()
        );
        let mut it = children.into_iter();
        let mut next = || it.next().expect("length checked above");
        let kind = match self.kind() {
            ExprKind::ColumnRef(_) | ExprKind::Const(_) => self.kind().clone(),
            ExprKind::Unary { op, .. } => ExprKind::Unary {
                op: *op,
                operand: next(),
            },
            ExprKind::Binary { op, .. } => ExprKind::Binary {
                op: *op,
                left: next(),
                right: next(),
            },
            ExprKind::Cast { target, .. } => ExprKind::Cast {
                target: target.clone(),
                operand: next(),
            },
            ExprKind::Convert { target, .. } => ExprKind::Convert {
                target: target.clone(),
                operand: next(),
            },
            ExprKind::Declare { target, .. } => ExprKind::Declare {
                target: target.clone(),
                operand: next(),
            },
            ExprKind::Coalesce(args) => ExprKind::Coalesce(args.iter().map(|_| next()).collect()),
            ExprKind::Require { guards, .. } => ExprKind::Require {
                value: next(),
                guards: guards.iter().map(|_| next()).collect(),
            },
            ExprKind::IfElse { .. } => ExprKind::IfElse {
                cond: next(),
                then: next(),
                otherwise: next(),
            },
            ExprKind::IsNone(_) => ExprKind::IsNone(next()),
            ExprKind::IsNotNone(_) => ExprKind::IsNotNone(next()),
            ExprKind::Reducer { kind, args } => ExprKind::Reducer {
                kind: kind.clone(),
                args: args.iter().map(|_| next()).collect(),
            },
            ExprKind::PointerFrom {
                args,
                instance,
                optional,
            } => ExprKind::PointerFrom {
                args: args.iter().map(|_| next()).collect(),
                instance: instance.as_ref().map(|_| next()),
                optional: *optional,
            },
            ExprKind::MakeTuple(args) => ExprKind::MakeTuple(args.iter().map(|_| next()).collect()),
            ExprKind::Get { check_exists, .. } => ExprKind::Get {
                object: next(),
                index: next(),
                default: next(),
                check_exists: *check_exists,
            },
            ExprKind::MethodCall { method, args } => ExprKind::MethodCall {
                method: *method,
                args: args.iter().map(|_| next()).collect(),
            },
            ExprKind::Unwrap(_) => ExprKind::Unwrap(next()),
            ExprKind::FillError { .. } => ExprKind::FillError {
                operand: next(),
                replacement: next(),
            },
            ExprKind::Apply(apply) => ExprKind::Apply(apply.with_args(&mut next)),
            ExprKind::AsyncApply(apply) => ExprKind::AsyncApply(apply.with_args(&mut next)),
            ExprKind::Call { args, .. } => ExprKind::Call {
                callee: next(),
                args: args.iter().map(|_| next()).collect(),
            },
        };
        ColumnExpr::new(kind, self.dtype().clone())
    }

    /// Every column referenced in the tree, first occurrence first.
    pub fn columns(&self) -> Vec<Column> {
        let mut out: Vec<Column> = Vec::new();
        let mut stack = vec![self];
        while let Some(expr) = stack.pop() {
            if let ExprKind::ColumnRef(column) = expr.kind() {
                if !out.contains(column) {
                    out.push(column.clone());
                }
            }
            let children = expr.children();
            stack.extend(children.into_iter().rev());
        }
        out
    }

    /// The referenced column if this is a bare column reference.
    pub fn as_column(&self) -> Option<&Column> {
        match self.kind() {
            ExprKind::ColumnRef(column) => Some(column),
            _ => None,
        }
    }

    pub fn variant_name(&self) -> &'static str {
        match self.kind() {
            ExprKind::ColumnRef(_) => "ColumnRef",
            ExprKind::Const(_) => "Const",
            ExprKind::Unary { .. } => "UnaryOp",
            ExprKind::Binary { .. } => "BinaryOp",
            ExprKind::Cast { .. } => "Cast",
            ExprKind::Convert { .. } => "Convert",
            ExprKind::Declare { .. } => "Declare",
            ExprKind::Coalesce(_) => "Coalesce",
            ExprKind::Require { .. } => "Require",
            ExprKind::IfElse { .. } => "IfElse",
            ExprKind::IsNone(_) => "IsNone",
            ExprKind::IsNotNone(_) => "IsNotNone",
            ExprKind::Reducer { .. } => "Reducer",
            ExprKind::PointerFrom { .. } => "PointerFrom",
            ExprKind::MakeTuple(_) => "MakeTuple",
            ExprKind::Get { .. } => "Get",
            ExprKind::MethodCall { .. } => "MethodCall",
            ExprKind::Unwrap(_) => "Unwrap",
            ExprKind::FillError { .. } => "FillError",
            ExprKind::Apply(_) => "Apply",
            ExprKind::AsyncApply(_) => "AsyncApply",
            ExprKind::Call { .. } => "Call",
        }
    }
}

fn get_dtype(object: &ColumnExpr, index: &ColumnExpr, default: &ColumnExpr, check_exists: bool) -> DType {
    let element = match object.dtype().unoptionalize() {
        DType::Json => return DType::Json,
        DType::List(inner) => (**inner).clone(),
        DType::Tuple(items) => {
            let constant = match index.kind() {
                ExprKind::Const(Value::Int(i)) => Some(*i),
                _ => None,
            };
            let len = items.len() as i64;
            match constant {
                Some(i) if (-len..len).contains(&i) => {
                    items[i.rem_euclid(len.max(1)) as usize].clone()
                }
                _ => items
                    .iter()
                    .skip(1)
                    .fold(items.first().cloned().unwrap_or(DType::Any), |acc, t| {
                        DType::common_supertype(&acc, t)
                    }),
            }
        }
        _ => DType::Any,
    };
    if check_exists {
        DType::common_supertype(&element, default.dtype())
    } else {
        element
    }
}

impl fmt::Debug for ColumnExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ExprKind::ColumnRef(column) => write!(f, "{column:?}"),
            ExprKind::Const(value) => write!(f, "Const({value})"),
            _ => {
                let mut tuple = f.debug_tuple(self.variant_name());
                for child in self.children() {
                    tuple.field(child);
                }
                tuple.finish()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::universe::Universe;
    use rivulet_engine::callable_fn;

    fn col(dtype: DType) -> Column {
        Column::materialized(Universe::new(), dtype)
    }

    #[test]
    fn coalesce_drops_optional_when_a_branch_is_total() {
        let e = ColumnExpr::coalesce(vec![
            ColumnExpr::none(),
            ColumnExpr::none(),
            ColumnExpr::constant(7_i64),
        ]);
        assert_eq!(e.dtype(), &DType::Int);

        let opt = col(DType::optional(DType::Int));
        let e = ColumnExpr::coalesce(vec![ColumnExpr::column(&opt), ColumnExpr::none()]);
        assert_eq!(e.dtype(), &DType::optional(DType::Int));
    }

    #[test]
    fn binary_promotes_numeric_operands() {
        let a = col(DType::Int);
        let e = ColumnExpr::binary(
            BinaryOperator::Add,
            ColumnExpr::column(&a),
            ColumnExpr::constant(1.5),
        );
        assert_eq!(e.dtype(), &DType::Float);
        let cmp = ColumnExpr::binary(
            BinaryOperator::Lt,
            ColumnExpr::column(&col(DType::optional(DType::Int))),
            ColumnExpr::constant(3_i64),
        );
        assert_eq!(cmp.dtype(), &DType::optional(DType::Bool));
    }

    #[test]
    fn get_types_follow_the_object() {
        let j = col(DType::Json);
        let e = ColumnExpr::get(ColumnExpr::column(&j), ColumnExpr::constant("a"), None, true);
        assert_eq!(e.dtype(), &DType::Json);

        let t = col(DType::tuple([DType::Int, DType::Str]));
        let e = ColumnExpr::get(ColumnExpr::column(&t), ColumnExpr::constant(-1_i64), None, false);
        assert_eq!(e.dtype(), &DType::Str);

        let l = col(DType::list(DType::Int));
        let e = ColumnExpr::get(ColumnExpr::column(&l), ColumnExpr::constant(0_i64), None, true);
        assert_eq!(e.dtype(), &DType::optional(DType::Int));
    }

    #[test]
    fn apply_lifts_return_type_when_propagating_none() {
        let f = callable_fn("id", |args| Ok(args[0].clone()));
        let opt = col(DType::optional(DType::Int));
        let e = ColumnExpr::apply(
            ApplyExpr::new(f.clone(), DType::Int)
                .arg(ColumnExpr::column(&opt))
                .propagate_none(true),
        );
        assert_eq!(e.dtype(), &DType::optional(DType::Int));
        let e = ColumnExpr::apply(ApplyExpr::new(f, DType::Int).arg(ColumnExpr::column(&opt)));
        assert_eq!(e.dtype(), &DType::Int);
    }

    #[test]
    fn columns_are_deduplicated_in_order() {
        let a = col(DType::Int);
        let b = col(DType::Int);
        let e = ColumnExpr::binary(
            BinaryOperator::Add,
            ColumnExpr::binary(BinaryOperator::Mul, ColumnExpr::column(&a), ColumnExpr::column(&b)),
            ColumnExpr::column(&a),
        );
        assert_eq!(e.columns(), vec![a, b]);
    }
}
