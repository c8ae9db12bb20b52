//! Operators that change which rows exist or how they are keyed.

use rivulet_engine::TableHandle;
use rivulet_plan::{
    ConcatUnsafeContext, DifferenceContext, FlattenContext, HavingContext, IntersectContext,
    IxContext, PromiseSameUniverseContext, ReindexContext, RestrictContext, SetSchemaContext,
    SortingContext, Storage, UpdateCellsContext, UpdateRowsContext,
};
use rivulet_result::Result;
use rivulet_types::ColumnPath;

use crate::ctx::LowerCtx;
use crate::evaluators::gating::reference_target;

pub fn sorting(ctx: &mut LowerCtx<'_>, context: &SortingContext, output: &Storage) -> Result<TableHandle> {
    let input = ctx.storage(context.universe);
    let key = input.get_path(&context.key_column).clone();
    let instance = input.get_path(&context.instance_column).clone();
    let properties = ctx.table_properties(output);
    let table = ctx.table(input.universe());
    ctx.engine.sort_table(table, &key, &instance, properties)
}

pub fn flatten(ctx: &mut LowerCtx<'_>, context: &FlattenContext, output: &Storage) -> Result<TableHandle> {
    let input = ctx.storage(context.orig_universe);
    let path = input.get_path(&context.flatten_column).clone();
    let properties = ctx.table_properties(output);
    let table = ctx.table(input.universe());
    ctx.engine.flatten_table(table, &path, properties)
}

pub fn restrict(ctx: &mut LowerCtx<'_>, context: &RestrictContext, output: &Storage) -> Result<TableHandle> {
    let properties = ctx.table_properties(output);
    let table = ctx.table(context.orig_universe);
    let universe_table = ctx.table(context.universe);
    ctx.engine.restrict_table(table, universe_table, properties)
}

pub fn reindex(ctx: &mut LowerCtx<'_>, context: &ReindexContext, output: &Storage) -> Result<TableHandle> {
    let input = ctx.storage(context.input);
    let path = input.get_path(&context.reindex_column).clone();
    let properties = ctx.table_properties(output);
    let table = ctx.table(input.universe());
    ctx.engine.reindex_table(table, &path, properties)
}

/// Missing keys are row errors; `None` keys pass through when the context
/// is optional.
pub fn ix(ctx: &mut LowerCtx<'_>, context: &IxContext, output: &Storage) -> Result<TableHandle> {
    let keys = ctx.storage(context.key_column.universe());
    let key_path = keys.get_path(&context.key_column).clone();
    let properties = ctx.table_properties(output);
    let to_ix = ctx.table(context.orig_universe);
    let key_table = ctx.table(keys.universe());
    ctx.engine
        .ix_table(to_ix, key_table, &key_path, context.optional, true, properties)
}

/// Like [`ix`], but rows with missing keys are dropped.
pub fn having(ctx: &mut LowerCtx<'_>, context: &HavingContext, output: &Storage) -> Result<TableHandle> {
    let keys = ctx.storage(context.key_column.universe());
    let key_path = keys.get_path(&context.key_column).clone();
    let properties = ctx.table_properties(output);
    let to_ix = ctx.table(context.orig_universe);
    let key_table = ctx.table(keys.universe());
    ctx.engine
        .ix_table(to_ix, key_table, &key_path, false, false, properties)
}

pub fn promise_same_universe(
    ctx: &mut LowerCtx<'_>,
    context: &PromiseSameUniverseContext,
    output: &Storage,
) -> Result<TableHandle> {
    let properties = ctx.table_properties(output);
    let table = ctx.table(context.orig_universe);
    let universe_table = ctx.table(context.universe);
    ctx.engine
        .override_table_universe(table, universe_table, properties)
}

/// # Panics
///
/// If the context has no inputs.
pub fn intersect(ctx: &mut LowerCtx<'_>, context: &IntersectContext, output: &Storage) -> Result<TableHandle> {
    let tables = ctx.state.get_tables(&context.inputs);
    let (first, others) = tables
        .split_first()
        .expect("intersection needs at least one input");
    let properties = ctx.table_properties(output);
    ctx.engine.intersect_tables(*first, others, properties)
}

pub fn difference(ctx: &mut LowerCtx<'_>, context: &DifferenceContext, output: &Storage) -> Result<TableHandle> {
    let properties = ctx.table_properties(output);
    let left = ctx.table(context.left);
    let right = ctx.table(context.right);
    ctx.engine.subtract_table(left, right, properties)
}

pub fn update_rows(ctx: &mut LowerCtx<'_>, context: &UpdateRowsContext, output: &Storage) -> Result<TableHandle> {
    let tables = ctx.flatten_tables(output, &[context.orig_universe, context.updates_universe])?;
    let properties = ctx.table_properties(output);
    ctx.engine.update_rows_table(tables[0], tables[1], properties)
}

/// Output columns that reference an updated column read the override from
/// the right side.
pub fn update_cells(ctx: &mut LowerCtx<'_>, context: &UpdateCellsContext, output: &Storage) -> Result<TableHandle> {
    let left = ctx.storage(context.left);
    let right = ctx.storage(context.right);
    let mut paths: Vec<ColumnPath> = Vec::new();
    let mut update_paths: Vec<ColumnPath> = Vec::new();
    for column in output.columns() {
        if left.has_column(column) {
            continue;
        }
        let target = reference_target(column);
        if let Some((_, update)) = context.updates.iter().find(|(c, _)| c == target) {
            paths.push(left.get_path(target).clone());
            update_paths.push(right.get_path(update).clone());
        }
    }
    let properties = ctx.table_properties(output);
    let table = ctx.table(left.universe());
    let update = ctx.table(right.universe());
    ctx.engine
        .update_cells_table(table, update, &paths, &update_paths, properties)
}

pub fn concat_unsafe(
    ctx: &mut LowerCtx<'_>,
    context: &ConcatUnsafeContext,
    output: &Storage,
) -> Result<TableHandle> {
    let tables = ctx.flatten_tables(output, &context.inputs)?;
    let properties = ctx.table_properties(output);
    ctx.engine.concat_tables(&tables, properties)
}

/// Types are static only; the table is unchanged.
pub fn set_schema(ctx: &mut LowerCtx<'_>, context: &SetSchemaContext, _output: &Storage) -> Result<TableHandle> {
    Ok(ctx.table(context.universe))
}
