//! Context dispatch.

use rivulet_engine::TableHandle;
use rivulet_plan::{Context, Storage};
use rivulet_result::Result;
use rivulet_types::ColumnPath;
use tracing::debug;

use crate::ctx::LowerCtx;
use crate::evaluators::{broadcast, deduplicate, gating, grouped, index, join, reshape};
use crate::rowwise::{RowwisePass, run_rowwise};

/// Lower one context into the engine and return the table holding `output`.
///
/// The caller registers the result in the scope state.
pub fn lower_context(ctx: &mut LowerCtx<'_>, context: &Context, output: &Storage) -> Result<TableHandle> {
    debug!(
        kind = context.kind_name(),
        universe = %context.universe(),
        columns = output.len(),
        "lowering context"
    );
    match context {
        Context::Rowwise(c) => run_rowwise(
            ctx,
            RowwisePass::new(c.universe),
            output,
            Some(ColumnPath::EMPTY),
            false,
        ),
        Context::TableRestrictedRowwise(c) => run_rowwise(
            ctx,
            RowwisePass::restricted(c.universe, &c.table),
            output,
            Some(ColumnPath::EMPTY),
            false,
        ),
        Context::JoinRowwise(c) => run_rowwise(
            ctx,
            RowwisePass::new(c.universe),
            output,
            Some(ColumnPath::EMPTY),
            false,
        ),
        Context::Filter(c) => gating::filter(ctx, c, output),
        Context::Forget(c) => gating::forget(ctx, c, output),
        Context::ForgetImmediately(c) => gating::forget_immediately(ctx, c, output),
        Context::FilterOutForgetting(c) => gating::filter_out_forgetting(ctx, c, output),
        Context::Freeze(c) => gating::freeze(ctx, c, output),
        Context::Buffer(c) => gating::buffer(ctx, c, output),
        Context::RemoveErrors(c) => gating::remove_errors(ctx, c, output),
        Context::RemoveRetractions(c) => gating::remove_retractions(ctx, c, output),
        Context::Join(c) => join::join(ctx, c, output),
        Context::Grouped(c) => grouped::grouped(ctx, c, output),
        Context::Deduplicate(c) => deduplicate::deduplicate(ctx, c, output),
        Context::Sorting(c) => reshape::sorting(ctx, c, output),
        Context::Flatten(c) => reshape::flatten(ctx, c, output),
        Context::Intersect(c) => reshape::intersect(ctx, c, output),
        Context::Difference(c) => reshape::difference(ctx, c, output),
        Context::Restrict(c) => reshape::restrict(ctx, c, output),
        Context::Reindex(c) => reshape::reindex(ctx, c, output),
        Context::Ix(c) => reshape::ix(ctx, c, output),
        Context::PromiseSameUniverse(c) => reshape::promise_same_universe(ctx, c, output),
        Context::Having(c) => reshape::having(ctx, c, output),
        Context::UpdateRows(c) => reshape::update_rows(ctx, c, output),
        Context::UpdateCells(c) => reshape::update_cells(ctx, c, output),
        Context::ConcatUnsafe(c) => reshape::concat_unsafe(ctx, c, output),
        Context::SetSchema(c) => reshape::set_schema(ctx, c, output),
        Context::GradualBroadcast(c) => broadcast::gradual_broadcast(ctx, c, output),
        Context::ExternalIndexAsOfNow(c) => index::external_index_as_of_now(ctx, c, output),
    }
}
