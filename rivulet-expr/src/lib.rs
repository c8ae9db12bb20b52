//! Logical side of the lowering layer.
//!
//! A [`ColumnExpr`] is an immutable, typed expression tree computed per row.
//! Leaves reference [`Column`]s, which live in a [`Universe`] (a row-identity
//! domain) and optionally belong to a [`TableRef`]. The static type of every
//! node is resolved at construction by the rules in [`typing`].
#![forbid(unsafe_code)]

pub mod column;
pub mod expr;
pub mod reducers;
pub mod table;
pub mod typing;
pub mod universe;

pub use column::{Column, ColumnBuilder, ColumnId, ColumnKind};
pub use expr::{ApplyExpr, ColumnExpr, ExprKind};
pub use reducers::{ContextArgument, ReducerKind};
pub use rivulet_engine::{BinaryOperator, Method, UnaryOperator};
pub use table::{TableId, TableRef};
pub use universe::Universe;
