//! Lowering configuration.

use std::env;

use rivulet_engine::MemEngineOptions;

/// Environment variable enabling runtime type verification.
pub const RUNTIME_TYPECHECKING_ENV: &str = "RIVULET_RUNTIME_TYPECHECKING";
/// Environment variable making the first row error fatal.
pub const TERMINATE_ON_ERROR_ENV: &str = "RIVULET_TERMINATE_ON_ERROR";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LowerOptions {
    /// Wrap every computed rowwise column in a runtime type check.
    pub runtime_typechecking: bool,
    /// Ask the engine to abort on the first row-level error.
    pub terminate_on_error: bool,
}

impl LowerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_runtime_typechecking(mut self, enabled: bool) -> Self {
        self.runtime_typechecking = enabled;
        self
    }

    pub fn with_terminate_on_error(mut self, enabled: bool) -> Self {
        self.terminate_on_error = enabled;
        self
    }

    /// Defaults overridden by `RIVULET_RUNTIME_TYPECHECKING` and
    /// `RIVULET_TERMINATE_ON_ERROR` (`1`, `true` or `yes`).
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Options for a [`rivulet_engine::MemEngine`] honoring these settings.
    pub fn engine_options(&self) -> MemEngineOptions {
        MemEngineOptions::default().with_terminate_on_error(self.terminate_on_error)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |name: &str| lookup(name).is_some_and(|v| parse_flag(&v));
        Self {
            runtime_typechecking: flag(RUNTIME_TYPECHECKING_ENV),
            terminate_on_error: flag(TERMINATE_ON_ERROR_ENV),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}
