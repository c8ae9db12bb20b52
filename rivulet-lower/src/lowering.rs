//! The lowering driver.

use rivulet_engine::{Engine, TableHandle};
use rivulet_expr::Universe;
use rivulet_plan::{Context, ScopeState, Storage};
use rivulet_result::Result;
use tracing::info;

use crate::ctx::LowerCtx;
use crate::dispatch::lower_context;
use crate::options::LowerOptions;

/// Owns an engine and the scope state of one lowering run.
///
/// Sources are registered first; contexts are then lowered in topological
/// order, each one reading the tables of the universes it depends on.
pub struct Lowering<E: Engine> {
    engine: E,
    state: ScopeState,
    options: LowerOptions,
}

impl<E: Engine> Lowering<E> {
    pub fn new(engine: E, options: LowerOptions) -> Self {
        Self {
            engine,
            state: ScopeState::new(),
            options,
        }
    }

    /// Register an already-built table, such as an input connector's output.
    pub fn register_source(&mut self, storage: Storage, table: TableHandle) {
        self.state.set_table(storage, table);
    }

    /// Lower one context and register its table under `output`.
    ///
    /// # Panics
    ///
    /// If `output` belongs to a different universe than `context`.
    pub fn lower_one(&mut self, context: &Context, output: Storage) -> Result<TableHandle> {
        assert_eq!(
            output.universe(),
            context.universe(),
            "output storage of {} context belongs to another universe",
            context.kind_name()
        );
        let mut ctx = LowerCtx::new(&mut self.engine, &mut self.state, &self.options);
        let table = lower_context(&mut ctx, context, &output)?;
        ctx.state.set_table(output.clone(), table);
        ctx.flatten_table_storage_if_needed(&output)?;
        Ok(table)
    }

    /// Lower `contexts` in order. Returns the table of the last one, if any.
    pub fn lower(
        &mut self,
        contexts: impl IntoIterator<Item = (Context, Storage)>,
    ) -> Result<Option<TableHandle>> {
        let mut last = None;
        let mut lowered = 0usize;
        for (context, output) in contexts {
            last = Some(self.lower_one(&context, output)?);
            lowered += 1;
        }
        info!(contexts = lowered, "lowering finished");
        Ok(last)
    }

    /// Physical table of a lowered universe.
    ///
    /// # Panics
    ///
    /// If `universe` was never lowered or registered.
    pub fn table(&self, universe: Universe) -> TableHandle {
        self.state.get_table(universe)
    }

    pub fn state(&self) -> &ScopeState {
        &self.state
    }

    pub fn options(&self) -> &LowerOptions {
        &self.options
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn into_parts(self) -> (E, ScopeState) {
        (self.engine, self.state)
    }
}
