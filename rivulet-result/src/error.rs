use std::fmt;
use thiserror::Error;

/// Unified error type for all rivulet operations.
///
/// `Error` is `Send + Sync`, so it can cross into whatever executor drives the
/// engine after lowering.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No implementation exists for an operation on the given types.
    ///
    /// Raised while lowering when:
    /// - a binary or unary operator has no primitive for the operand types
    /// - a cast or convert between two types is not registered
    /// - a method call has no overload matching its argument types
    ///
    /// The message names the operation and the offending types.
    #[error("type error: {0}")]
    TypeError(String),

    /// An expression has a shape the surrounding context cannot lower.
    ///
    /// Examples:
    /// - an arbitrary expression inside a grouped context (only column
    ///   references and reducers are allowed there)
    /// - a column reference in a table-restricted context pointing outside
    ///   its declared table
    #[error("invalid expression: {0}")]
    InvalidExpression(String),

    /// The engine was handed a table handle it never produced.
    #[error("invalid table handle")]
    InvalidTableHandle,

    /// Invalid argument passed to an engine primitive or a public API.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Failure reported by the engine while executing a primitive.
    ///
    /// With a terminating error policy, the first row-level error also
    /// surfaces here.
    #[error("engine error: {0}")]
    Engine(String),

    /// Internal error indicating a bug or unexpected state that could still
    /// be reported without panicking.
    #[error("an internal operation failed: {0}")]
    Internal(String),
}

impl Error {
    /// Create a type error from any displayable message.
    ///
    /// # Examples
    ///
    /// ```
    /// use rivulet_result::Error;
    ///
    /// let err = Error::type_error("cannot add Str and Int");
    /// assert!(matches!(err, Error::TypeError(msg) if msg.contains("Str")));
    /// ```
    #[inline]
    pub fn type_error<E: fmt::Display>(err: E) -> Self {
        Error::TypeError(err.to_string())
    }

    /// Create an invalid-expression error from any displayable message.
    #[inline]
    pub fn invalid_expression<E: fmt::Display>(err: E) -> Self {
        Error::InvalidExpression(err.to_string())
    }

    /// Create an engine error from any displayable message.
    #[inline]
    pub fn engine<E: fmt::Display>(err: E) -> Self {
        Error::Engine(err.to_string())
    }

    /// Returns `true` for errors raised while compiling expressions, before
    /// any engine primitive was invoked.
    pub fn is_compile_time(&self) -> bool {
        matches!(self, Error::TypeError(_) | Error::InvalidExpression(_))
    }
}
