//! Lowering of operator contexts and typed expressions into engine calls.
//!
//! The [`Lowering`] driver walks planner [`Context`](rivulet_plan::Context)s
//! in topological order. Each context is dispatched to its evaluator, which
//! issues engine primitives and returns the physical table of the context's
//! universe. Rowwise expressions are compiled by [`rowwise`] into
//! [`EngineExpr`](rivulet_engine::EngineExpr) trees over a deduplicated
//! dependency list; asynchronous calls are materialized first and spliced back
//! as ordinary columns.
#![forbid(unsafe_code)]

pub mod ctx;
pub mod dispatch;
pub mod evaluators;
pub mod lowering;
pub mod operator_mapping;
pub mod options;
pub mod rowwise;
pub mod type_verifier;

pub use ctx::LowerCtx;
pub use dispatch::lower_context;
pub use lowering::Lowering;
pub use options::LowerOptions;
pub use rowwise::{PendingMaterialization, RowwiseEvalState, RowwisePass};
