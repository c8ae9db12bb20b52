//! Error types and result definitions for the rivulet lowering layer.
//!
//! Every crate in the workspace returns [`Result<T>`], whose error variant is
//! the single [`Error`] enum. Failures propagate with `?` and are matched on
//! by variant where callers need to distinguish them.
//!
//! # Error Categories
//!
//! Lowering distinguishes three kinds of failure, and only the first one is
//! represented by this crate:
//!
//! - **Compile-time errors** ([`Error::TypeError`], [`Error::InvalidExpression`]):
//!   an operator, cast or method that has no implementation for the given
//!   types, or an expression shape the context cannot lower. These abort the
//!   whole build before any data flows.
//! - **Row-level errors**: represented as the `Value::Error` sentinel inside
//!   the data and recorded in the engine's error log. They never surface as
//!   an [`Error`] unless the engine is configured to terminate on error
//!   ([`Error::Engine`]).
//! - **Contract violations**: a missing column path, an unregistered
//!   universe, a column-call that survived desugaring. These are defects and
//!   panic instead of returning an error.

pub mod error;
pub mod result;

pub use error::Error;
pub use result::Result;
