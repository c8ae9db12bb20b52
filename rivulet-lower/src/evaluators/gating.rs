//! Operators that keep or drop whole rows without computing anything.

use rivulet_engine::TableHandle;
use rivulet_expr::{Column, ColumnKind};
use rivulet_plan::{
    BufferContext, FilterContext, FilterOutForgettingContext, ForgetContext,
    ForgetImmediatelyContext, FreezeContext, RemoveErrorsContext, RemoveRetractionsContext, Storage,
};
use rivulet_result::Result;
use rivulet_types::ColumnPath;

use crate::ctx::LowerCtx;

pub fn filter(ctx: &mut LowerCtx<'_>, context: &FilterContext, output: &Storage) -> Result<TableHandle> {
    let input = ctx.storage(context.input);
    let path = input.get_path(&context.filtering_column).clone();
    let properties = ctx.table_properties(output);
    let table = ctx.table(input.universe());
    ctx.engine.filter_table(table, &path, properties)
}

pub fn forget(ctx: &mut LowerCtx<'_>, context: &ForgetContext, output: &Storage) -> Result<TableHandle> {
    let input = ctx.storage(context.input);
    let threshold = input.get_path(&context.threshold_column).clone();
    let time = input.get_path(&context.time_column).clone();
    let properties = ctx.table_properties(output);
    let table = ctx.table(input.universe());
    ctx.engine.forget(
        table,
        &threshold,
        &time,
        context.mark_forgetting_records,
        properties,
    )
}

pub fn forget_immediately(
    ctx: &mut LowerCtx<'_>,
    context: &ForgetImmediatelyContext,
    output: &Storage,
) -> Result<TableHandle> {
    let properties = ctx.table_properties(output);
    let table = ctx.table(context.input);
    ctx.engine.forget_immediately(table, properties)
}

pub fn filter_out_forgetting(
    ctx: &mut LowerCtx<'_>,
    context: &FilterOutForgettingContext,
    output: &Storage,
) -> Result<TableHandle> {
    let properties = ctx.table_properties(output);
    let table = ctx.table(context.input);
    ctx.engine.filter_out_results_of_forgetting(table, properties)
}

pub fn freeze(ctx: &mut LowerCtx<'_>, context: &FreezeContext, output: &Storage) -> Result<TableHandle> {
    let input = ctx.storage(context.input);
    let threshold = input.get_path(&context.threshold_column).clone();
    let time = input.get_path(&context.time_column).clone();
    let properties = ctx.table_properties(output);
    let table = ctx.table(input.universe());
    ctx.engine.freeze(table, &threshold, &time, properties)
}

pub fn buffer(ctx: &mut LowerCtx<'_>, context: &BufferContext, output: &Storage) -> Result<TableHandle> {
    let input = ctx.storage(context.input);
    let threshold = input.get_path(&context.threshold_column).clone();
    let time = input.get_path(&context.time_column).clone();
    let properties = ctx.table_properties(output);
    let table = ctx.table(input.universe());
    ctx.engine.buffer(table, &threshold, &time, properties)
}

/// Rows with an error in any column `output` re-exposes are dropped.
///
/// # Panics
///
/// If an output column is not a reference.
pub fn remove_errors(
    ctx: &mut LowerCtx<'_>,
    context: &RemoveErrorsContext,
    output: &Storage,
) -> Result<TableHandle> {
    let input = ctx.storage(context.input);
    let paths: Vec<ColumnPath> = output
        .columns()
        .iter()
        .map(|column| input.get_path(reference_target(column)).clone())
        .collect();
    let properties = ctx.table_properties(output);
    let table = ctx.table(input.universe());
    ctx.engine.remove_errors_from_table(table, &paths, properties)
}

pub fn remove_retractions(
    ctx: &mut LowerCtx<'_>,
    context: &RemoveRetractionsContext,
    output: &Storage,
) -> Result<TableHandle> {
    let properties = ctx.table_properties(output);
    let table = ctx.table(context.input);
    ctx.engine.remove_retractions_from_table(table, properties)
}

/// The column a reference output column re-exposes.
///
/// # Panics
///
/// If `column` is not a reference.
pub(crate) fn reference_target(column: &Column) -> &Column {
    match column.kind() {
        ColumnKind::Reference(target) => target,
        _ => panic!("output column {column:?} must reference an input column"),
    }
}
