//! One evaluator per operator kind, all sharing the `LowerCtx` signature.

pub mod broadcast;
pub mod deduplicate;
pub mod gating;
pub mod grouped;
pub mod index;
pub mod join;
pub mod reshape;
