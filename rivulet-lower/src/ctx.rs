//! State shared by every evaluator while one context is lowered.

use rivulet_engine::{Engine, TableHandle};
use rivulet_expr::{Column, ColumnKind, Universe};
use rivulet_plan::{ScopeState, Storage};
use rivulet_result::Result;
use rivulet_types::{ColumnPath, ColumnProperties, TableProperties};
use tracing::trace;

use crate::options::LowerOptions;

/// Borrowed view of the engine, the scope state and the options.
///
/// Evaluators are free functions taking `&mut LowerCtx`; nothing survives
/// between contexts except what they write into [`ScopeState`].
pub struct LowerCtx<'a> {
    pub engine: &'a mut dyn Engine,
    pub state: &'a mut ScopeState,
    pub options: &'a LowerOptions,
}

impl<'a> LowerCtx<'a> {
    pub fn new(
        engine: &'a mut dyn Engine,
        state: &'a mut ScopeState,
        options: &'a LowerOptions,
    ) -> Self {
        Self {
            engine,
            state,
            options,
        }
    }

    /// Cloned storage of `universe`, so the state can be mutated while it
    /// is in use.
    pub fn storage(&self, universe: Universe) -> Storage {
        self.state.get_storage(universe).clone()
    }

    pub fn table(&self, universe: Universe) -> TableHandle {
        self.state.get_table(universe)
    }

    /// Engine properties of every non-external column of `storage`, keyed by
    /// its path.
    pub fn table_properties(&self, storage: &Storage) -> TableProperties {
        TableProperties::from_paths(
            storage
                .iter()
                .filter(|(column, _)| !matches!(column.kind(), ColumnKind::ExternalMaterialized))
                .map(|(column, path)| (path.clone(), column_properties(column))),
        )
    }

    /// Pack the columns of `output` into a row-major table, reading them
    /// from the registered table of `input`.
    pub fn flatten_table_storage(&mut self, output: &Storage, input: &Storage) -> Result<TableHandle> {
        let paths: Vec<ColumnPath> = output
            .columns()
            .iter()
            .map(|column| input.get_path(column).clone())
            .collect();
        let table = self.state.get_table(input.universe());
        trace!(%table, columns = paths.len(), "flatten_table_storage");
        self.engine.flatten_table_storage(table, &paths)
    }

    /// Input tables of a multi-input operator, flattened first when the
    /// output asks for it.
    ///
    /// # Panics
    ///
    /// If the output lists a different number of flattened inputs.
    pub fn flatten_tables(&mut self, output: &Storage, inputs: &[Universe]) -> Result<Vec<TableHandle>> {
        let Some(flattened) = output.flattened_inputs() else {
            return Ok(self.state.get_tables(inputs));
        };
        assert_eq!(
            flattened.len(),
            inputs.len(),
            "storage of {} lists {} flattened inputs for {} inputs",
            output.universe(),
            flattened.len(),
            inputs.len()
        );
        let mut tables = Vec::with_capacity(inputs.len());
        for (universe, layout) in inputs.iter().zip(flattened) {
            let input = self.storage(*universe);
            tables.push(self.flatten_table_storage(layout, &input)?);
        }
        Ok(tables)
    }

    /// Produce and register the row-major copy `output` requests, if any.
    /// Call after the table of `output` is registered.
    pub fn flatten_table_storage_if_needed(&mut self, output: &Storage) -> Result<()> {
        if let Some(flattened) = output.flattened_output() {
            let table = self.flatten_table_storage(flattened, output)?;
            self.state.set_temporary_table(flattened, table);
        }
        Ok(())
    }
}

pub fn column_properties(column: &Column) -> ColumnProperties {
    column.properties().clone()
}
