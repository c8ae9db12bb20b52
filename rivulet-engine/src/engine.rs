//! The engine contract.

use std::fmt;

use rivulet_result::Result;
use rivulet_types::{ColumnPath, Key, TableProperties, Value};

use crate::callable::{CallableRef, StateFold};
use crate::expression::EngineExpr;
use crate::index::{ExternalIndexData, ExternalIndexFactory, ExternalIndexQuery};
use crate::reducer::ReducerData;

/// Opaque handle to a physical table owned by an engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableHandle(pub u32);

impl fmt::Display for TableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table#{}", self.0)
    }
}

/// Flags of a `join_tables` call.
///
/// Outer variants are expressed only through the ear flags: an ear keeps the
/// unmatched rows of its side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct JoinOptions {
    pub left_ear: bool,
    pub right_ear: bool,
    /// Reuse the left row identity instead of deriving a fresh one.
    pub assign_id: bool,
    /// The last key column is an instance (sharding) column.
    pub last_column_is_instance: bool,
}

impl JoinOptions {
    pub fn inner() -> Self {
        Self::default()
    }

    pub fn left() -> Self {
        Self {
            left_ear: true,
            ..Self::default()
        }
    }

    pub fn right() -> Self {
        Self {
            right_ear: true,
            ..Self::default()
        }
    }

    pub fn outer() -> Self {
        Self {
            left_ear: true,
            right_ear: true,
            ..Self::default()
        }
    }

    pub fn with_assign_id(mut self, assign_id: bool) -> Self {
        self.assign_id = assign_id;
        self
    }

    pub fn with_instance(mut self, last_column_is_instance: bool) -> Self {
        self.last_column_is_instance = last_column_is_instance;
        self
    }
}

/// Primitives the lowering layer issues.
///
/// Each call consumes physical tables and column paths into their rows and
/// returns a new table. Row layouts of the results are part of the contract:
///
/// - `expression_table`: `(e_0, .., e_n)`
/// - `join_tables`: `(left_id, left_row, right_id, right_row)`
/// - `group_by_table`: `(r_0, .., r_n)`, one entry per reducer
/// - `deduplicate`: the retained fold state
/// - `update_cells_table`: `(row, cell_0, .., cell_n)`
/// - `flatten_table`, `gradual_broadcast`, `use_external_index_as_of_now`:
///   `(row, new_cell)`
/// - `ix_table`: `(key_row, indexed_row)`
/// - `sort_table`: `(prev, next)`
/// - `zip_tables`: `(row_0, .., row_n)`
/// - `flatten_table_storage`: `(v_0, .., v_n)`
///
/// All other primitives keep the row value unchanged.
pub trait Engine {
    /// Materialize a table from explicit rows.
    fn static_table(&mut self, rows: Vec<(Key, Value)>, properties: TableProperties)
    -> Result<TableHandle>;

    /// Properties recorded for the subtree of `table` at `path`.
    fn table_properties(&self, table: TableHandle, path: &ColumnPath) -> Result<TableProperties>;

    fn expression_table(
        &mut self,
        table: TableHandle,
        column_paths: &[ColumnPath],
        expressions: Vec<(EngineExpr, TableProperties)>,
        deterministic: bool,
    ) -> Result<TableHandle>;

    fn filter_table(
        &mut self,
        table: TableHandle,
        path: &ColumnPath,
        properties: TableProperties,
    ) -> Result<TableHandle>;

    fn forget(
        &mut self,
        table: TableHandle,
        threshold_path: &ColumnPath,
        time_path: &ColumnPath,
        mark_forgetting_records: bool,
        properties: TableProperties,
    ) -> Result<TableHandle>;

    fn forget_immediately(
        &mut self,
        table: TableHandle,
        properties: TableProperties,
    ) -> Result<TableHandle>;

    fn filter_out_results_of_forgetting(
        &mut self,
        table: TableHandle,
        properties: TableProperties,
    ) -> Result<TableHandle>;

    fn freeze(
        &mut self,
        table: TableHandle,
        threshold_path: &ColumnPath,
        time_path: &ColumnPath,
        properties: TableProperties,
    ) -> Result<TableHandle>;

    fn buffer(
        &mut self,
        table: TableHandle,
        threshold_path: &ColumnPath,
        time_path: &ColumnPath,
        properties: TableProperties,
    ) -> Result<TableHandle>;

    #[allow(clippy::too_many_arguments)]
    fn join_tables(
        &mut self,
        left: TableHandle,
        right: TableHandle,
        left_paths: &[ColumnPath],
        right_paths: &[ColumnPath],
        options: JoinOptions,
        properties: TableProperties,
    ) -> Result<TableHandle>;

    fn group_by_table(
        &mut self,
        table: TableHandle,
        grouping_paths: &[ColumnPath],
        last_column_is_instance: bool,
        reducers: Vec<ReducerData>,
        set_id: bool,
        properties: TableProperties,
    ) -> Result<TableHandle>;

    fn deduplicate(
        &mut self,
        table: TableHandle,
        instance_paths: &[ColumnPath],
        value_paths: &[ColumnPath],
        fold: StateFold,
        persistent_id: Option<&str>,
        properties: TableProperties,
    ) -> Result<TableHandle>;

    fn update_rows_table(
        &mut self,
        table: TableHandle,
        update: TableHandle,
        properties: TableProperties,
    ) -> Result<TableHandle>;

    fn update_cells_table(
        &mut self,
        table: TableHandle,
        update: TableHandle,
        column_paths: &[ColumnPath],
        update_paths: &[ColumnPath],
        properties: TableProperties,
    ) -> Result<TableHandle>;

    fn concat_tables(
        &mut self,
        tables: &[TableHandle],
        properties: TableProperties,
    ) -> Result<TableHandle>;

    fn flatten_table(
        &mut self,
        table: TableHandle,
        path: &ColumnPath,
        properties: TableProperties,
    ) -> Result<TableHandle>;

    fn sort_table(
        &mut self,
        table: TableHandle,
        key_path: &ColumnPath,
        instance_path: &ColumnPath,
        properties: TableProperties,
    ) -> Result<TableHandle>;

    /// Borrow rows of `to_ix` under the identities of `key_table`.
    ///
    /// `optional` forwards `None` keys as `None` rows; `strict` turns a
    /// missing key into a row error instead of dropping the row.
    fn ix_table(
        &mut self,
        to_ix: TableHandle,
        key_table: TableHandle,
        key_path: &ColumnPath,
        optional: bool,
        strict: bool,
        properties: TableProperties,
    ) -> Result<TableHandle>;

    fn restrict_table(
        &mut self,
        table: TableHandle,
        universe_table: TableHandle,
        properties: TableProperties,
    ) -> Result<TableHandle>;

    fn reindex_table(
        &mut self,
        table: TableHandle,
        pointer_path: &ColumnPath,
        properties: TableProperties,
    ) -> Result<TableHandle>;

    fn intersect_tables(
        &mut self,
        table: TableHandle,
        others: &[TableHandle],
        properties: TableProperties,
    ) -> Result<TableHandle>;

    fn subtract_table(
        &mut self,
        left: TableHandle,
        right: TableHandle,
        properties: TableProperties,
    ) -> Result<TableHandle>;

    /// Same rows as `table`, declared to live in the universe of
    /// `universe_table`.
    fn override_table_universe(
        &mut self,
        table: TableHandle,
        universe_table: TableHandle,
        properties: TableProperties,
    ) -> Result<TableHandle>;

    /// Row-wise zip of tables sharing one universe.
    fn zip_tables(
        &mut self,
        table: TableHandle,
        others: &[TableHandle],
        properties: TableProperties,
    ) -> Result<TableHandle>;

    fn flatten_table_storage(
        &mut self,
        table: TableHandle,
        column_paths: &[ColumnPath],
    ) -> Result<TableHandle>;

    fn remove_errors_from_table(
        &mut self,
        table: TableHandle,
        column_paths: &[ColumnPath],
        properties: TableProperties,
    ) -> Result<TableHandle>;

    fn remove_retractions_from_table(
        &mut self,
        table: TableHandle,
        properties: TableProperties,
    ) -> Result<TableHandle>;

    #[allow(clippy::too_many_arguments)]
    fn gradual_broadcast(
        &mut self,
        table: TableHandle,
        threshold_table: TableHandle,
        lower_path: &ColumnPath,
        value_path: &ColumnPath,
        upper_path: &ColumnPath,
        properties: TableProperties,
    ) -> Result<TableHandle>;

    fn use_external_index_as_of_now(
        &mut self,
        index: ExternalIndexData,
        query: ExternalIndexQuery,
        properties: TableProperties,
        factory: &dyn ExternalIndexFactory,
    ) -> Result<TableHandle>;

    /// Apply `func` to the arguments at `column_paths`, producing a table
    /// whose row value is the result.
    #[allow(clippy::too_many_arguments)]
    fn async_apply_table(
        &mut self,
        table: TableHandle,
        column_paths: &[ColumnPath],
        func: CallableRef,
        propagate_none: bool,
        deterministic: bool,
        properties: TableProperties,
    ) -> Result<TableHandle>;
}
