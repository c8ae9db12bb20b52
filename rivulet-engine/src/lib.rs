//! Engine interface for the lowering layer.
//!
//! The [`Engine`] trait lists every primitive the lowering layer issues. A
//! production engine maintains its tables incrementally; [`mem::MemEngine`]
//! is a snapshot implementation that materializes each primitive eagerly and
//! is what the workspace tests run against.
//!
//! Row-level computations are described with [`EngineExpr`], a small
//! expression IR whose leaves are positional [`EngineExpr::Argument`]s into the
//! dependency vector of an `expression_table` call.
#![forbid(unsafe_code)]

pub mod callable;
pub mod engine;
pub mod expression;
pub mod index;
pub mod mem;
pub mod ops;
pub mod reducer;

pub use callable::{Callable, CallableRef, StateFold, callable_fn};
pub use engine::{Engine, JoinOptions, TableHandle};
pub use expression::{EngineExpr, ItemAccess};
pub use index::{ExternalIndex, ExternalIndexData, ExternalIndexFactory, ExternalIndexQuery};
pub use mem::{MemEngine, MemEngineOptions, RowError};
pub use ops::{BinaryOperator, Method, UnaryOperator};
pub use reducer::{EngineReducer, ReducerData};
