//! Grouped reduction.
//!
//! Every output column of a grouped context is either a reducer over
//! columns of the grouped rows or a bare reference to one. A bare reference
//! reads the group's single value through the `Unique` reducer; groups where
//! it is not constant get a row error.

use rivulet_engine::{EngineReducer, ReducerData, TableHandle};
use rivulet_expr::{Column, ColumnExpr, ColumnKind, ContextArgument, ExprKind};
use rivulet_plan::{GroupedContext, Storage};
use rivulet_result::{Error, Result};
use rivulet_types::{ColumnPath, DType};

use crate::ctx::LowerCtx;

/// An engine reducer and the input columns it reads, in argument order.
#[derive(Debug)]
struct GroupedReducer {
    reducer: EngineReducer,
    inputs: Vec<Column>,
}

pub fn grouped(ctx: &mut LowerCtx<'_>, context: &GroupedContext, output: &Storage) -> Result<TableHandle> {
    let input = ctx.storage(context.inner_universe);
    let mut reducers = Vec::with_capacity(output.len());
    for column in output.columns() {
        let expr = match column.kind() {
            ColumnKind::Expression(expr) => expr.clone(),
            ColumnKind::Reference(target) => ColumnExpr::column(target),
            _ => panic!(
                "output column {column:?} of a grouped context is neither computed nor a reference"
            ),
        };
        let reduced = lower_grouped(context, &expr)?;
        let paths: Vec<ColumnPath> = reduced
            .inputs
            .iter()
            .map(|c| input.get_path(c).clone())
            .collect();
        reducers.push(ReducerData::new(reduced.reducer, paths).with_skip_errors(context.skip_errors));
    }

    let grouping_paths: Vec<ColumnPath> = context
        .grouping_columns
        .iter()
        .map(|c| input.get_path(c).clone())
        .collect();
    let properties = ctx.table_properties(output);
    let table = ctx.table(input.universe());
    ctx.engine.group_by_table(
        table,
        &grouping_paths,
        context.last_column_is_instance,
        reducers,
        context.set_id,
        properties,
    )
}

fn lower_grouped(context: &GroupedContext, expr: &ColumnExpr) -> Result<GroupedReducer> {
    match expr.kind() {
        ExprKind::ColumnRef(column) => Ok(GroupedReducer {
            reducer: EngineReducer::Unique,
            inputs: vec![column.clone()],
        }),
        ExprKind::Reducer { kind, args } => {
            let mut inputs = Vec::with_capacity(args.len() + 1);
            for arg in args {
                let Some(column) = arg.as_column() else {
                    return Err(Error::invalid_expression(format!(
                        "argument of {} must be a column reference, got {}",
                        kind.name(),
                        arg.variant_name()
                    )));
                };
                inputs.push(column.clone());
            }
            match kind.context_argument() {
                ContextArgument::None => {}
                ContextArgument::InnerId => inputs.push(context.inner_id_column.clone()),
                ContextArgument::SortKeyOrId => inputs.push(
                    context
                        .sort_by
                        .clone()
                        .unwrap_or_else(|| context.inner_id_column.clone()),
                ),
            }
            let dtypes: Vec<DType> = args.iter().map(|a| a.dtype().clone()).collect();
            Ok(GroupedReducer {
                reducer: kind.engine_reducer(&dtypes)?,
                inputs,
            })
        }
        _ => Err(Error::invalid_expression(format!(
            "grouped context in {} accepts only column references and reducers, got {}",
            context.universe,
            expr.variant_name()
        ))),
    }
}
