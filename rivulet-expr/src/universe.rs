use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_UNIVERSE: AtomicU64 = AtomicU64::new(0);

/// Opaque row-identity domain.
///
/// Two tables in the same universe have row-for-row comparable keys.
/// Relationships between universes are the planner's business.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Universe(u64);

impl Universe {
    /// A fresh universe, distinct from every other.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Universe(NEXT_UNIVERSE.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Universe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "universe#{}", self.0)
    }
}
