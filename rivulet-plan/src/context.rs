//! Operator descriptors.
//!
//! The planner builds one [`Context`] per table-producing operator, before
//! lowering starts. Lowering only reads them.

use std::fmt;
use std::sync::Arc;

use rivulet_engine::ExternalIndexFactory;
use rivulet_expr::{Column, TableRef, Universe};
use rivulet_types::Value;

/// `acceptor(candidate, current)`: should `candidate` replace the retained
/// value?
pub type Acceptor = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;

pub type IndexFactoryRef = Arc<dyn ExternalIndexFactory + Send + Sync>;

// ============================================================================
// Rowwise family
// ============================================================================

#[derive(Clone, Debug)]
pub struct RowwiseContext {
    pub universe: Universe,
}

/// Rowwise computation whose expressions may only reference `table`.
#[derive(Clone, Debug)]
pub struct TableRestrictedRowwiseContext {
    pub universe: Universe,
    pub table: TableRef,
}

/// Rowwise computation over the universe of a join.
#[derive(Clone, Debug)]
pub struct JoinRowwiseContext {
    pub universe: Universe,
}

// ============================================================================
// Gating
// ============================================================================

#[derive(Clone, Debug)]
pub struct FilterContext {
    pub universe: Universe,
    pub input: Universe,
    pub filtering_column: Column,
}

#[derive(Clone, Debug)]
pub struct ForgetContext {
    pub universe: Universe,
    pub input: Universe,
    pub threshold_column: Column,
    pub time_column: Column,
    pub mark_forgetting_records: bool,
}

#[derive(Clone, Debug)]
pub struct ForgetImmediatelyContext {
    pub universe: Universe,
    pub input: Universe,
}

#[derive(Clone, Debug)]
pub struct FilterOutForgettingContext {
    pub universe: Universe,
    pub input: Universe,
}

#[derive(Clone, Debug)]
pub struct FreezeContext {
    pub universe: Universe,
    pub input: Universe,
    pub threshold_column: Column,
    pub time_column: Column,
}

#[derive(Clone, Debug)]
pub struct BufferContext {
    pub universe: Universe,
    pub input: Universe,
    pub threshold_column: Column,
    pub time_column: Column,
}

#[derive(Clone, Debug)]
pub struct RemoveErrorsContext {
    pub universe: Universe,
    pub input: Universe,
}

#[derive(Clone, Debug)]
pub struct RemoveRetractionsContext {
    pub universe: Universe,
    pub input: Universe,
}

// ============================================================================
// Join, group, deduplicate
// ============================================================================

#[derive(Clone, Debug)]
pub struct JoinContext {
    /// Universe of the joined rows.
    pub universe: Universe,
    pub left_table: TableRef,
    pub right_table: TableRef,
    pub on_left: Vec<Column>,
    pub on_right: Vec<Column>,
    /// Reuse the left row's identity instead of deriving a new one.
    pub assign_id: bool,
    pub left_ear: bool,
    pub right_ear: bool,
    pub last_column_is_instance: bool,
}

#[derive(Clone, Debug)]
pub struct GroupedContext {
    pub universe: Universe,
    /// Universe of the rows being grouped.
    pub inner_universe: Universe,
    /// Id column of the rows being grouped.
    pub inner_id_column: Column,
    pub grouping_columns: Vec<Column>,
    pub sort_by: Option<Column>,
    pub set_id: bool,
    pub last_column_is_instance: bool,
    pub skip_errors: bool,
}

#[derive(Clone)]
pub struct DeduplicateContext {
    pub universe: Universe,
    pub input: Universe,
    pub value: Column,
    pub instance: Vec<Column>,
    pub acceptor: Acceptor,
    pub persistent_id: Option<String>,
}

impl fmt::Debug for DeduplicateContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeduplicateContext")
            .field("universe", &self.universe)
            .field("input", &self.input)
            .field("value", &self.value)
            .field("instance", &self.instance)
            .field("persistent_id", &self.persistent_id)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Reshaping
// ============================================================================

/// Adds prev/next pointers; the universe is unchanged.
#[derive(Clone, Debug)]
pub struct SortingContext {
    pub universe: Universe,
    pub key_column: Column,
    pub instance_column: Column,
}

#[derive(Clone, Debug)]
pub struct FlattenContext {
    pub universe: Universe,
    pub orig_universe: Universe,
    pub flatten_column: Column,
}

#[derive(Clone, Debug)]
pub struct IntersectContext {
    pub universe: Universe,
    /// The table being filtered comes first.
    pub inputs: Vec<Universe>,
}

#[derive(Clone, Debug)]
pub struct DifferenceContext {
    pub universe: Universe,
    pub left: Universe,
    pub right: Universe,
}

/// Rows of `orig_universe` restricted to the keys of `universe`.
#[derive(Clone, Debug)]
pub struct RestrictContext {
    pub universe: Universe,
    pub orig_universe: Universe,
}

#[derive(Clone, Debug)]
pub struct ReindexContext {
    pub universe: Universe,
    pub input: Universe,
    pub reindex_column: Column,
}

/// Rows of `orig_universe` looked up by `key_column`, a pointer column of
/// the key table living in `universe`.
#[derive(Clone, Debug)]
pub struct IxContext {
    pub universe: Universe,
    pub orig_universe: Universe,
    pub key_column: Column,
    pub optional: bool,
}

#[derive(Clone, Debug)]
pub struct PromiseSameUniverseContext {
    pub universe: Universe,
    pub orig_universe: Universe,
}

/// Rows of `orig_universe` whose ids appear in `key_column`; missing keys
/// are dropped.
#[derive(Clone, Debug)]
pub struct HavingContext {
    pub universe: Universe,
    pub orig_universe: Universe,
    pub key_column: Column,
}

#[derive(Clone, Debug)]
pub struct UpdateRowsContext {
    pub universe: Universe,
    pub orig_universe: Universe,
    pub updates_universe: Universe,
}

#[derive(Clone, Debug)]
pub struct UpdateCellsContext {
    pub universe: Universe,
    pub left: Universe,
    pub right: Universe,
    /// Column of the left table and the right column that overrides it.
    pub updates: Vec<(Column, Column)>,
}

#[derive(Clone, Debug)]
pub struct ConcatUnsafeContext {
    pub universe: Universe,
    pub inputs: Vec<Universe>,
}

#[derive(Clone, Debug)]
pub struct SetSchemaContext {
    pub universe: Universe,
}

// ============================================================================
// Broadcast and external index
// ============================================================================

#[derive(Clone, Debug)]
pub struct GradualBroadcastContext {
    pub universe: Universe,
    pub input: Universe,
    pub lower_column: Column,
    pub value_column: Column,
    pub upper_column: Column,
}

#[derive(Clone)]
pub struct ExternalIndexAsOfNowContext {
    pub universe: Universe,
    pub index_universe: Universe,
    pub index_column: Column,
    pub index_filter_data_column: Option<Column>,
    pub query_universe: Universe,
    pub query_column: Column,
    pub query_response_limit_column: Option<Column>,
    pub query_filter_column: Option<Column>,
    pub index_factory: IndexFactoryRef,
}

impl fmt::Debug for ExternalIndexAsOfNowContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalIndexAsOfNowContext")
            .field("universe", &self.universe)
            .field("index_universe", &self.index_universe)
            .field("query_universe", &self.query_universe)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Context
// ============================================================================

/// One logical operator. Closed: lowering dispatches with a `match`.
#[derive(Clone, Debug)]
pub enum Context {
    Rowwise(RowwiseContext),
    TableRestrictedRowwise(TableRestrictedRowwiseContext),
    JoinRowwise(JoinRowwiseContext),
    Filter(FilterContext),
    Join(JoinContext),
    Grouped(GroupedContext),
    Deduplicate(DeduplicateContext),
    Sorting(SortingContext),
    Flatten(FlattenContext),
    Forget(ForgetContext),
    ForgetImmediately(ForgetImmediatelyContext),
    FilterOutForgetting(FilterOutForgettingContext),
    Freeze(FreezeContext),
    Buffer(BufferContext),
    Intersect(IntersectContext),
    Difference(DifferenceContext),
    Restrict(RestrictContext),
    Reindex(ReindexContext),
    Ix(IxContext),
    PromiseSameUniverse(PromiseSameUniverseContext),
    Having(HavingContext),
    UpdateRows(UpdateRowsContext),
    UpdateCells(UpdateCellsContext),
    ConcatUnsafe(ConcatUnsafeContext),
    GradualBroadcast(GradualBroadcastContext),
    ExternalIndexAsOfNow(ExternalIndexAsOfNowContext),
    SetSchema(SetSchemaContext),
    RemoveErrors(RemoveErrorsContext),
    RemoveRetractions(RemoveRetractionsContext),
}

impl Context {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Context::Rowwise(_) => "rowwise",
            Context::TableRestrictedRowwise(_) => "table_restricted_rowwise",
            Context::JoinRowwise(_) => "join_rowwise",
            Context::Filter(_) => "filter",
            Context::Join(_) => "join",
            Context::Grouped(_) => "grouped",
            Context::Deduplicate(_) => "deduplicate",
            Context::Sorting(_) => "sorting",
            Context::Flatten(_) => "flatten",
            Context::Forget(_) => "forget",
            Context::ForgetImmediately(_) => "forget_immediately",
            Context::FilterOutForgetting(_) => "filter_out_forgetting",
            Context::Freeze(_) => "freeze",
            Context::Buffer(_) => "buffer",
            Context::Intersect(_) => "intersect",
            Context::Difference(_) => "difference",
            Context::Restrict(_) => "restrict",
            Context::Reindex(_) => "reindex",
            Context::Ix(_) => "ix",
            Context::PromiseSameUniverse(_) => "promise_same_universe",
            Context::Having(_) => "having",
            Context::UpdateRows(_) => "update_rows",
            Context::UpdateCells(_) => "update_cells",
            Context::ConcatUnsafe(_) => "concat_unsafe",
            Context::GradualBroadcast(_) => "gradual_broadcast",
            Context::ExternalIndexAsOfNow(_) => "external_index_as_of_now",
            Context::SetSchema(_) => "set_schema",
            Context::RemoveErrors(_) => "remove_errors",
            Context::RemoveRetractions(_) => "remove_retractions",
        }
    }

    /// Universe of the rows this operator produces.
    pub fn universe(&self) -> Universe {
        match self {
            Context::Rowwise(c) => c.universe,
            Context::TableRestrictedRowwise(c) => c.universe,
            Context::JoinRowwise(c) => c.universe,
            Context::Filter(c) => c.universe,
            Context::Join(c) => c.universe,
            Context::Grouped(c) => c.universe,
            Context::Deduplicate(c) => c.universe,
            Context::Sorting(c) => c.universe,
            Context::Flatten(c) => c.universe,
            Context::Forget(c) => c.universe,
            Context::ForgetImmediately(c) => c.universe,
            Context::FilterOutForgetting(c) => c.universe,
            Context::Freeze(c) => c.universe,
            Context::Buffer(c) => c.universe,
            Context::Intersect(c) => c.universe,
            Context::Difference(c) => c.universe,
            Context::Restrict(c) => c.universe,
            Context::Reindex(c) => c.universe,
            Context::Ix(c) => c.universe,
            Context::PromiseSameUniverse(c) => c.universe,
            Context::Having(c) => c.universe,
            Context::UpdateRows(c) => c.universe,
            Context::UpdateCells(c) => c.universe,
            Context::ConcatUnsafe(c) => c.universe,
            Context::GradualBroadcast(c) => c.universe,
            Context::ExternalIndexAsOfNow(c) => c.universe,
            Context::SetSchema(c) => c.universe,
            Context::RemoveErrors(c) => c.universe,
            Context::RemoveRetractions(c) => c.universe,
        }
    }

    /// The single universe whose rows flow in, for operators that have one.
    pub fn input_universe(&self) -> Option<Universe> {
        match self {
            Context::Rowwise(c) => Some(c.universe),
            Context::TableRestrictedRowwise(c) => Some(c.universe),
            Context::JoinRowwise(c) => Some(c.universe),
            Context::Sorting(c) => Some(c.universe),
            Context::SetSchema(c) => Some(c.universe),
            Context::Filter(c) => Some(c.input),
            Context::Forget(c) => Some(c.input),
            Context::ForgetImmediately(c) => Some(c.input),
            Context::FilterOutForgetting(c) => Some(c.input),
            Context::Freeze(c) => Some(c.input),
            Context::Buffer(c) => Some(c.input),
            Context::RemoveErrors(c) => Some(c.input),
            Context::RemoveRetractions(c) => Some(c.input),
            Context::Deduplicate(c) => Some(c.input),
            Context::Reindex(c) => Some(c.input),
            Context::GradualBroadcast(c) => Some(c.input),
            Context::Grouped(c) => Some(c.inner_universe),
            Context::Flatten(c) => Some(c.orig_universe),
            Context::Restrict(c) => Some(c.orig_universe),
            Context::Ix(c) => Some(c.orig_universe),
            Context::PromiseSameUniverse(c) => Some(c.orig_universe),
            Context::Having(c) => Some(c.orig_universe),
            Context::Join(_)
            | Context::Intersect(_)
            | Context::Difference(_)
            | Context::UpdateRows(_)
            | Context::UpdateCells(_)
            | Context::ConcatUnsafe(_)
            | Context::ExternalIndexAsOfNow(_) => None,
        }
    }

    /// Every universe whose table must be lowered before this one.
    pub fn universe_dependencies(&self) -> Vec<Universe> {
        match self {
            Context::Join(c) => vec![c.left_table.universe(), c.right_table.universe()],
            Context::Intersect(c) => c.inputs.clone(),
            Context::ConcatUnsafe(c) => c.inputs.clone(),
            Context::Difference(c) => vec![c.left, c.right],
            Context::UpdateRows(c) => vec![c.orig_universe, c.updates_universe],
            Context::UpdateCells(c) => vec![c.left, c.right],
            Context::Restrict(c) => vec![c.orig_universe, c.universe],
            Context::PromiseSameUniverse(c) => vec![c.orig_universe, c.universe],
            Context::Ix(c) => vec![c.orig_universe, c.key_column.universe()],
            Context::Having(c) => vec![c.orig_universe, c.key_column.universe()],
            Context::GradualBroadcast(c) => vec![c.input, c.value_column.universe()],
            Context::ExternalIndexAsOfNow(c) => vec![c.index_universe, c.query_universe],
            other => other.input_universe().into_iter().collect(),
        }
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind_name(), self.universe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rivulet_types::DType;

    #[test]
    fn join_depends_on_both_sides() {
        let left = TableRef::materialized(Universe::new(), [("a", DType::Int)]);
        let right = TableRef::materialized(Universe::new(), [("a", DType::Int)]);
        let universe = Universe::new();
        let ctx = Context::Join(JoinContext {
            universe,
            on_left: vec![left.column("a").clone()],
            on_right: vec![right.column("a").clone()],
            left_table: left.clone(),
            right_table: right.clone(),
            assign_id: false,
            left_ear: false,
            right_ear: false,
            last_column_is_instance: false,
        });
        assert_eq!(ctx.universe(), universe);
        assert_eq!(ctx.input_universe(), None);
        assert_eq!(
            ctx.universe_dependencies(),
            vec![left.universe(), right.universe()]
        );
    }

    #[test]
    fn gating_contexts_have_one_input() {
        let input = Universe::new();
        let universe = Universe::new();
        let ctx = Context::RemoveRetractions(RemoveRetractionsContext { universe, input });
        assert_eq!(ctx.input_universe(), Some(input));
        assert_eq!(ctx.universe_dependencies(), vec![input]);
        assert_eq!(ctx.to_string(), format!("remove_retractions({universe})"));
    }
}
