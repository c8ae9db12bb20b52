//! As-of-now queries against an external index.

use rivulet_engine::{ExternalIndexData, ExternalIndexQuery, TableHandle};
use rivulet_plan::{ExternalIndexAsOfNowContext, Storage};
use rivulet_result::Result;

use crate::ctx::LowerCtx;

pub fn external_index_as_of_now(
    ctx: &mut LowerCtx<'_>,
    context: &ExternalIndexAsOfNowContext,
    output: &Storage,
) -> Result<TableHandle> {
    let index_storage = ctx.storage(context.index_universe);
    let queries = ctx.storage(context.query_universe);

    let index = ExternalIndexData {
        table: ctx.table(context.index_universe),
        data_path: index_storage.get_path(&context.index_column).clone(),
        filter_data_path: context
            .index_filter_data_column
            .as_ref()
            .map(|c| index_storage.get_path(c).clone()),
    };
    let query = ExternalIndexQuery {
        table: ctx.table(context.query_universe),
        query_path: queries.get_path(&context.query_column).clone(),
        limit_path: context
            .query_response_limit_column
            .as_ref()
            .map(|c| queries.get_path(c).clone()),
        filter_path: context
            .query_filter_column
            .as_ref()
            .map(|c| queries.get_path(c).clone()),
    };

    let properties = ctx.table_properties(output);
    ctx.engine.use_external_index_as_of_now(
        index,
        query,
        properties,
        context.index_factory.as_ref(),
    )
}
