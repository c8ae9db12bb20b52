//! Types shared by every rivulet crate.
//!
//! - [`DType`]: the closed logical type model with equivalence, subtyping and
//!   common-supertype rules.
//! - [`Value`]: the runtime value carried in engine rows, including the
//!   [`Value::Error`] sentinel for row-level failures.
//! - [`Key`]: 128-bit row identity.
//! - [`ColumnPath`]: position of a column inside a physical row.
//! - [`ColumnProperties`] / [`TableProperties`]: metadata attached to engine
//!   tables.
#![forbid(unsafe_code)]

pub mod column_path;
pub mod dtype;
pub mod key;
pub mod properties;
pub mod value;

pub use column_path::ColumnPath;
pub use dtype::DType;
pub use key::Key;
pub use properties::{ColumnProperties, TableProperties};
pub use value::Value;
