//! Row-level expression IR understood by the engine.

use rivulet_types::{DType, Value};

use crate::callable::CallableRef;
use crate::ops::{BinaryOperator, Method, UnaryOperator};

/// Which accessor family a `GetItem` node uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemAccess {
    Json,
    Sequence,
}

/// Compiled per-row expression.
///
/// `Argument(i)` reads the `i`-th dependency of the enclosing
/// `expression_table` call. Everything else is built with the associated
/// constructor functions, mirroring the primitive builders an engine exposes.
#[derive(Clone, Debug)]
pub enum EngineExpr {
    Argument(usize),
    Const(Value),
    Unary {
        op: UnaryOperator,
        operand: Box<EngineExpr>,
    },
    Binary {
        op: BinaryOperator,
        left: Box<EngineExpr>,
        right: Box<EngineExpr>,
    },
    Cast {
        operand: Box<EngineExpr>,
        source: DType,
        target: DType,
    },
    Convert {
        operand: Box<EngineExpr>,
        source: DType,
        target: DType,
    },
    IfElse {
        cond: Box<EngineExpr>,
        then: Box<EngineExpr>,
        otherwise: Box<EngineExpr>,
    },
    IsNone(Box<EngineExpr>),
    PointerFrom {
        args: Vec<EngineExpr>,
        instance: Option<Box<EngineExpr>>,
        optional: bool,
    },
    MakeTuple(Vec<EngineExpr>),
    /// `checked` accessors return `default` for a missing item; unchecked
    /// ones raise a row error.
    GetItem {
        access: ItemAccess,
        object: Box<EngineExpr>,
        index: Box<EngineExpr>,
        default: Option<Box<EngineExpr>>,
    },
    Unwrap(Box<EngineExpr>),
    FillError {
        operand: Box<EngineExpr>,
        replacement: Box<EngineExpr>,
    },
    Method {
        method: Method,
        args: Vec<EngineExpr>,
    },
    Apply {
        func: CallableRef,
        args: Vec<EngineExpr>,
        propagate_none: bool,
    },
}

impl EngineExpr {
    pub fn argument(index: usize) -> Self {
        EngineExpr::Argument(index)
    }

    pub fn constant(value: Value) -> Self {
        EngineExpr::Const(value)
    }

    pub fn unary(op: UnaryOperator, operand: EngineExpr) -> Self {
        EngineExpr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn binary(op: BinaryOperator, left: EngineExpr, right: EngineExpr) -> Self {
        EngineExpr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn cast(operand: EngineExpr, source: DType, target: DType) -> Self {
        EngineExpr::Cast {
            operand: Box::new(operand),
            source,
            target,
        }
    }

    pub fn convert(operand: EngineExpr, source: DType, target: DType) -> Self {
        EngineExpr::Convert {
            operand: Box::new(operand),
            source,
            target,
        }
    }

    pub fn if_else(cond: EngineExpr, then: EngineExpr, otherwise: EngineExpr) -> Self {
        EngineExpr::IfElse {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    pub fn is_none(operand: EngineExpr) -> Self {
        EngineExpr::IsNone(Box::new(operand))
    }

    pub fn pointer_from(args: Vec<EngineExpr>, instance: Option<EngineExpr>, optional: bool) -> Self {
        EngineExpr::PointerFrom {
            args,
            instance: instance.map(Box::new),
            optional,
        }
    }

    pub fn make_tuple(args: Vec<EngineExpr>) -> Self {
        EngineExpr::MakeTuple(args)
    }

    pub fn json_get_item_checked(object: EngineExpr, index: EngineExpr, default: EngineExpr) -> Self {
        Self::get_item(ItemAccess::Json, object, index, Some(default))
    }

    pub fn json_get_item_unchecked(object: EngineExpr, index: EngineExpr) -> Self {
        Self::get_item(ItemAccess::Json, object, index, None)
    }

    pub fn sequence_get_item_checked(
        object: EngineExpr,
        index: EngineExpr,
        default: EngineExpr,
    ) -> Self {
        Self::get_item(ItemAccess::Sequence, object, index, Some(default))
    }

    pub fn sequence_get_item_unchecked(object: EngineExpr, index: EngineExpr) -> Self {
        Self::get_item(ItemAccess::Sequence, object, index, None)
    }

    fn get_item(
        access: ItemAccess,
        object: EngineExpr,
        index: EngineExpr,
        default: Option<EngineExpr>,
    ) -> Self {
        EngineExpr::GetItem {
            access,
            object: Box::new(object),
            index: Box::new(index),
            default: default.map(Box::new),
        }
    }

    pub fn unwrap(operand: EngineExpr) -> Self {
        EngineExpr::Unwrap(Box::new(operand))
    }

    pub fn fill_error(operand: EngineExpr, replacement: EngineExpr) -> Self {
        EngineExpr::FillError {
            operand: Box::new(operand),
            replacement: Box::new(replacement),
        }
    }

    pub fn method(method: Method, args: Vec<EngineExpr>) -> Self {
        EngineExpr::Method { method, args }
    }

    pub fn apply(func: CallableRef, args: Vec<EngineExpr>, propagate_none: bool) -> Self {
        EngineExpr::Apply {
            func,
            args,
            propagate_none,
        }
    }

    /// Structural equality, comparing callables by pointer identity.
    ///
    /// Used to check that two lowerings produced the same compiled code.
    pub fn same_as(&self, other: &EngineExpr) -> bool {
        use EngineExpr as E;
        fn all_same(a: &[EngineExpr], b: &[EngineExpr]) -> bool {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_as(y))
        }
        match (self, other) {
            (E::Argument(a), E::Argument(b)) => a == b,
            (E::Const(a), E::Const(b)) => a == b,
            (E::Unary { op: o1, operand: a }, E::Unary { op: o2, operand: b }) => {
                o1 == o2 && a.same_as(b)
            }
            (
                E::Binary { op: o1, left: l1, right: r1 },
                E::Binary { op: o2, left: l2, right: r2 },
            ) => o1 == o2 && l1.same_as(l2) && r1.same_as(r2),
            (
                E::Cast { operand: a, source: s1, target: t1 },
                E::Cast { operand: b, source: s2, target: t2 },
            )
            | (
                E::Convert { operand: a, source: s1, target: t1 },
                E::Convert { operand: b, source: s2, target: t2 },
            ) => s1 == s2 && t1 == t2 && a.same_as(b),
            (
                E::IfElse { cond: c1, then: t1, otherwise: e1 },
                E::IfElse { cond: c2, then: t2, otherwise: e2 },
            ) => c1.same_as(c2) && t1.same_as(t2) && e1.same_as(e2),
            (E::IsNone(a), E::IsNone(b)) | (E::Unwrap(a), E::Unwrap(b)) => a.same_as(b),
            (
                E::PointerFrom { args: a1, instance: i1, optional: o1 },
                E::PointerFrom { args: a2, instance: i2, optional: o2 },
            ) => {
                o1 == o2
                    && all_same(a1, a2)
                    && match (i1, i2) {
                        (Some(x), Some(y)) => x.same_as(y),
                        (None, None) => true,
                        _ => false,
                    }
            }
            (E::MakeTuple(a), E::MakeTuple(b)) => all_same(a, b),
            (
                E::GetItem { access: k1, object: o1, index: x1, default: d1 },
                E::GetItem { access: k2, object: o2, index: x2, default: d2 },
            ) => {
                k1 == k2
                    && o1.same_as(o2)
                    && x1.same_as(x2)
                    && match (d1, d2) {
                        (Some(x), Some(y)) => x.same_as(y),
                        (None, None) => true,
                        _ => false,
                    }
            }
            (
                E::FillError { operand: a, replacement: r1 },
                E::FillError { operand: b, replacement: r2 },
            ) => a.same_as(b) && r1.same_as(r2),
            (E::Method { method: m1, args: a1 }, E::Method { method: m2, args: a2 }) => {
                m1 == m2 && all_same(a1, a2)
            }
            (
                E::Apply { func: f1, args: a1, propagate_none: p1 },
                E::Apply { func: f2, args: a2, propagate_none: p2 },
            ) => std::sync::Arc::ptr_eq(f1, f2) && p1 == p2 && all_same(a1, a2),
            _ => false,
        }
    }

    /// Every argument index read by this expression, in visit order.
    pub fn arguments(&self) -> Vec<usize> {
        let mut out = Vec::new();
        self.collect_arguments(&mut out);
        out
    }

    fn collect_arguments(&self, out: &mut Vec<usize>) {
        match self {
            EngineExpr::Argument(i) => out.push(*i),
            EngineExpr::Const(_) => {}
            EngineExpr::Unary { operand, .. }
            | EngineExpr::Cast { operand, .. }
            | EngineExpr::Convert { operand, .. }
            | EngineExpr::IsNone(operand)
            | EngineExpr::Unwrap(operand) => operand.collect_arguments(out),
            EngineExpr::Binary { left, right, .. } => {
                left.collect_arguments(out);
                right.collect_arguments(out);
            }
            EngineExpr::IfElse {
                cond,
                then,
                otherwise,
            } => {
                cond.collect_arguments(out);
                then.collect_arguments(out);
                otherwise.collect_arguments(out);
            }
            EngineExpr::PointerFrom { args, instance, .. } => {
                args.iter().for_each(|a| a.collect_arguments(out));
                if let Some(instance) = instance {
                    instance.collect_arguments(out);
                }
            }
            EngineExpr::MakeTuple(args)
            | EngineExpr::Method { args, .. }
            | EngineExpr::Apply { args, .. } => {
                args.iter().for_each(|a| a.collect_arguments(out));
            }
            EngineExpr::GetItem {
                object,
                index,
                default,
                ..
            } => {
                object.collect_arguments(out);
                index.collect_arguments(out);
                if let Some(default) = default {
                    default.collect_arguments(out);
                }
            }
            EngineExpr::FillError {
                operand,
                replacement,
            } => {
                operand.collect_arguments(out);
                replacement.collect_arguments(out);
            }
        }
    }
}
