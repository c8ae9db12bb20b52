//! Opaque user functions.

use std::fmt;
use std::sync::Arc;

use rivulet_types::Value;

/// A user-defined function invoked per row.
///
/// Scheduling is the caller's concern; the lowering layer only records
/// whether a call is sync or async and whether it is deterministic. An `Err`
/// becomes a row-level error.
pub trait Callable: Send + Sync {
    fn call(&self, args: &[Value]) -> Result<Value, String>;

    /// Call with keyword arguments. Functions without keyword parameters
    /// keep the default, which rejects any.
    fn call_with_kwargs(&self, args: &[Value], kwargs: &[(&str, Value)]) -> Result<Value, String> {
        if kwargs.is_empty() {
            self.call(args)
        } else {
            Err(format!("{} takes no keyword arguments", self.name()))
        }
    }

    fn name(&self) -> &str {
        "<callable>"
    }
}

pub type CallableRef = Arc<dyn Callable>;

impl fmt::Debug for dyn Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callable({})", self.name())
    }
}

struct FnCallable<F> {
    name: String,
    f: F,
}

impl<F> Callable for FnCallable<F>
where
    F: Fn(&[Value]) -> Result<Value, String> + Send + Sync,
{
    fn call(&self, args: &[Value]) -> Result<Value, String> {
        (self.f)(args)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Wrap a closure as a [`CallableRef`].
pub fn callable_fn<F>(name: impl Into<String>, f: F) -> CallableRef
where
    F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
{
    Arc::new(FnCallable {
        name: name.into(),
        f,
    })
}

type FoldFn = dyn Fn(Option<Value>, &[(Value, i64)]) -> Option<Value> + Send + Sync;

/// Fold over a batch of `(row, diff)` changes, seeded with the previous state.
///
/// Used by deduplication and by stateful reducers.
#[derive(Clone)]
pub struct StateFold(Arc<FoldFn>);

impl StateFold {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Option<Value>, &[(Value, i64)]) -> Option<Value> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn apply(&self, state: Option<Value>, batch: &[(Value, i64)]) -> Option<Value> {
        (self.0)(state, batch)
    }
}

impl fmt::Debug for StateFold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StateFold")
    }
}
