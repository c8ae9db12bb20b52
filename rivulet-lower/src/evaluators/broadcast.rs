use rivulet_engine::TableHandle;
use rivulet_plan::{GradualBroadcastContext, Storage};
use rivulet_result::Result;

use crate::ctx::LowerCtx;

/// Bounds and value are read from the single-row threshold table that owns
/// `value_column`.
pub fn gradual_broadcast(
    ctx: &mut LowerCtx<'_>,
    context: &GradualBroadcastContext,
    output: &Storage,
) -> Result<TableHandle> {
    let threshold = ctx.storage(context.value_column.universe());
    let lower = threshold.get_path(&context.lower_column).clone();
    let value = threshold.get_path(&context.value_column).clone();
    let upper = threshold.get_path(&context.upper_column).clone();
    let properties = ctx.table_properties(output);
    let table = ctx.table(context.input);
    let threshold_table = ctx.table(threshold.universe());
    ctx.engine.gradual_broadcast(
        table,
        threshold_table,
        &lower,
        &value,
        &upper,
        properties,
    )
}
