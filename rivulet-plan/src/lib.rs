//! Planner-facing structures consumed by lowering: operator [`Context`]s,
//! column [`Storage`]s and the [`ScopeState`] that threads physical tables
//! between operators.
#![forbid(unsafe_code)]

pub mod context;
pub mod layout;
pub mod state;
pub mod storage;

pub use context::*;
pub use state::ScopeState;
pub use storage::{Storage, StorageId};
