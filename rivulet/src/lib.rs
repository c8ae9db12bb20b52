//! Rivulet: lowering of typed table expressions into an incremental engine
//!
//! This crate is the entrypoint of the workspace. It re-exports the lowering
//! driver together with the types a planner needs to describe its operators.
//!
//! # Quick Start
//!
//! Register a source table, then lower a rowwise context computing `a + 1`:
//!
//! ```rust
//! use rivulet::{
//!     BinaryOperator, Column, ColumnExpr, Context, DType, Engine, Key, LowerOptions,
//!     Lowering, MemEngine, Storage, TableProperties, TableRef, Universe, Value, layout,
//! };
//! use rivulet::contexts::RowwiseContext;
//!
//! let mut lowering = Lowering::new(MemEngine::new(), LowerOptions::default());
//! let table = TableRef::materialized(Universe::new(), [("a", DType::Int)]);
//! let u = table.universe();
//! let input = Storage::flat(u, [table.column("a").clone()]);
//! let rows = vec![(Key(1), Value::from(vec![Value::Int(41)]))];
//! let handle = lowering
//!     .engine_mut()
//!     .static_table(rows, TableProperties::Empty)
//!     .unwrap();
//! lowering.register_source(input.clone(), handle);
//!
//! let answer = Column::expression(
//!     u,
//!     ColumnExpr::binary(
//!         BinaryOperator::Add,
//!         ColumnExpr::column(table.column("a")),
//!         ColumnExpr::constant(1_i64),
//!     ),
//! );
//! let output = layout::rowwise(u, Some(&input), std::slice::from_ref(&answer));
//! let path = output.get_path(&answer).clone();
//! let result = lowering
//!     .lower_one(&Context::Rowwise(RowwiseContext { universe: u }), output)
//!     .unwrap();
//! assert_eq!(lowering.engine().column(result, &path).unwrap(), vec![Value::Int(42)]);
//! ```
//!
//! # Architecture
//!
//! - **Types** (`rivulet-types`): static types, runtime values, row keys and column paths.
//! - **Expressions** (`rivulet-expr`): typed expression trees, columns, universes and tables.
//! - **Engine** (`rivulet-engine`): the `Engine` trait and the in-memory `MemEngine`.
//! - **Plan** (`rivulet-plan`): operator contexts, storages and the scope state.
//! - **Lowering** (`rivulet-lower`): evaluators, operator mapping and the driver.

pub use rivulet_engine::{
    Callable, CallableRef, Engine, EngineExpr, ExternalIndex, ExternalIndexFactory, MemEngine,
    MemEngineOptions, RowError, TableHandle, callable_fn,
};
pub use rivulet_expr::{
    ApplyExpr, BinaryOperator, Column, ColumnExpr, ColumnKind, Method, ReducerKind, TableRef,
    UnaryOperator, Universe,
};
pub use rivulet_lower::{LowerOptions, Lowering};
pub use rivulet_plan::{Context, ScopeState, Storage, layout};
pub use rivulet_types::{ColumnPath, ColumnProperties, DType, Key, TableProperties, Value};

pub mod contexts {
    //! One descriptor per operator kind, wrapped by [`Context`](crate::Context).

    pub use rivulet_plan::context::*;
}

// Re-export result types for error handling
pub use rivulet_result::{Error, Result};
