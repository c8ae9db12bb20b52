//! Joins.
//!
//! The engine join yields rows shaped `(left_id, left_row, right_id,
//! right_row)`. That table is registered under the join universe, then a
//! rowwise pass computes the columns the output asks for.

use rivulet_engine::{JoinOptions, TableHandle};
use rivulet_expr::Universe;
use rivulet_plan::{JoinContext, Storage};
use rivulet_result::Result;
use rivulet_types::ColumnPath;
use tracing::debug;

use crate::ctx::LowerCtx;
use crate::rowwise::{RowwisePass, run_rowwise};

/// Where every column of both sides lives in a joined row.
///
/// Columns of the right table are taken only from the right input, and the
/// left side contributes everything else it holds.
pub fn join_storage(
    universe: Universe,
    context: &JoinContext,
    left_input: &Storage,
    right_input: &Storage,
) -> Storage {
    let left_id = Storage::new(
        context.left_table.universe(),
        [(context.left_table.id_column().clone(), ColumnPath::EMPTY)],
    );
    let right_id = Storage::new(
        context.right_table.universe(),
        [(context.right_table.id_column().clone(), ColumnPath::EMPTY)],
    );
    Storage::merge_storages(
        universe,
        &[
            &left_id,
            &left_input.remove_columns_from_table(&context.right_table),
            &right_id,
            &right_input.restrict_to_table(&context.right_table),
        ],
    )
}

fn run_join(ctx: &mut LowerCtx<'_>, context: &JoinContext) -> Result<()> {
    let left_input = ctx.storage(context.left_table.universe());
    let right_input = ctx.storage(context.right_table.universe());
    let storage = join_storage(context.universe, context, &left_input, &right_input);

    let left_paths: Vec<ColumnPath> = context
        .on_left
        .iter()
        .map(|c| left_input.get_path(c).clone())
        .collect();
    let right_paths: Vec<ColumnPath> = context
        .on_right
        .iter()
        .map(|c| right_input.get_path(c).clone())
        .collect();
    let options = JoinOptions {
        left_ear: context.left_ear,
        right_ear: context.right_ear,
        assign_id: context.assign_id,
        last_column_is_instance: context.last_column_is_instance,
    };
    debug!(universe = %context.universe, keys = left_paths.len(), ?options, "join");

    let properties = ctx.table_properties(&storage);
    let left = ctx.table(left_input.universe());
    let right = ctx.table(right_input.universe());
    let table = ctx
        .engine
        .join_tables(left, right, &left_paths, &right_paths, options, properties)?;
    ctx.state.set_table(storage, table);
    Ok(())
}

pub fn join(ctx: &mut LowerCtx<'_>, context: &JoinContext, output: &Storage) -> Result<TableHandle> {
    run_join(ctx, context)?;
    // With a reused left identity the left row is carried along as is.
    let old_path = context.assign_id.then(|| ColumnPath::new(vec![1]));
    run_rowwise(ctx, RowwisePass::new(context.universe), output, old_path, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use rivulet_expr::{BinaryOperator, Column, ColumnExpr, TableRef};
    use rivulet_test_utils::seeded_rng;
    use rivulet_types::DType;

    fn context(left: &TableRef, right: &TableRef) -> JoinContext {
        JoinContext {
            universe: Universe::new(),
            left_table: left.clone(),
            right_table: right.clone(),
            on_left: Vec::new(),
            on_right: Vec::new(),
            assign_id: false,
            left_ear: false,
            right_ear: false,
            last_column_is_instance: false,
        }
    }

    fn path(p: &[usize]) -> ColumnPath {
        ColumnPath::new(p.to_vec())
    }

    fn block(path: &ColumnPath) -> usize {
        match path {
            ColumnPath::ValuePath(p) => p[0],
            ColumnPath::Key => panic!("joined columns never live at the key"),
        }
    }

    #[test]
    fn right_columns_come_only_from_the_right_input() {
        let left = TableRef::materialized(Universe::new(), [("a", DType::Int), ("x", DType::Str)]);
        let right = TableRef::materialized(Universe::new(), [("b", DType::Int), ("c", DType::Int)]);
        let plus_one = Column::expression(
            left.universe(),
            ColumnExpr::binary(
                BinaryOperator::Add,
                ColumnExpr::column(left.column("a")),
                ColumnExpr::constant(1_i64),
            ),
        );
        let nested = Column::materialized(left.universe(), DType::Int);
        let left_input = Storage::new(
            left.universe(),
            [
                (left.id_column().clone(), ColumnPath::Key),
                (left.column("a").clone(), path(&[0])),
                (left.column("x").clone(), path(&[1])),
                (right.column("b").clone(), path(&[2])),
                (plus_one.clone(), path(&[3])),
                (nested.clone(), path(&[4, 0])),
            ],
        );
        let right_only = Column::materialized(right.universe(), DType::Int);
        let right_input = Storage::new(
            right.universe(),
            [
                (right.id_column().clone(), ColumnPath::Key),
                (right.column("b").clone(), path(&[0])),
                (right.column("c").clone(), path(&[1])),
                (right_only.clone(), path(&[2])),
            ],
        );
        let context = context(&left, &right);

        let storage = join_storage(context.universe, &context, &left_input, &right_input);
        assert_eq!(storage.universe(), context.universe);
        assert_eq!(storage.get_path(left.id_column()), &path(&[0]));
        assert_eq!(storage.get_path(left.column("a")), &path(&[1, 0]));
        assert_eq!(storage.get_path(left.column("x")), &path(&[1, 1]));
        assert_eq!(storage.get_path(&plus_one), &path(&[1, 3]));
        assert_eq!(storage.get_path(&nested), &path(&[1, 4, 0]));
        assert_eq!(storage.get_path(right.id_column()), &path(&[2]));
        assert_eq!(storage.get_path(right.column("b")), &path(&[3, 0]));
        assert_eq!(storage.get_path(right.column("c")), &path(&[3, 1]));
        assert!(storage.try_get_path(&right_only).is_none());
    }

    #[test]
    fn every_column_lands_in_the_block_of_its_side() {
        let mut rng = seeded_rng(0x10_1e_f7);
        for _ in 0..50 {
            let left = TableRef::materialized(Universe::new(), [("a", DType::Int)]);
            let right_width = rng.random_range(1..5);
            let names: Vec<String> = (0..right_width).map(|i| format!("r{i}")).collect();
            let right = TableRef::materialized(
                Universe::new(),
                names.iter().map(|n| (n.as_str(), DType::Int)),
            );

            let mut left_entries = vec![
                (left.id_column().clone(), ColumnPath::Key),
                (left.column("a").clone(), path(&[0])),
            ];
            let mut derived = Vec::new();
            for _ in 0..rng.random_range(0..4) {
                let column = Column::expression(
                    left.universe(),
                    ColumnExpr::column(left.column("a")),
                );
                derived.push(column.clone());
                left_entries.push((column, path(&[left_entries.len()])));
            }
            for column in right.columns() {
                if rng.random_bool(0.5) {
                    left_entries.push((column.clone(), path(&[left_entries.len()])));
                }
            }
            let left_input = Storage::new(left.universe(), left_entries);
            let right_input = Storage::new(
                right.universe(),
                std::iter::once((right.id_column().clone(), ColumnPath::Key)).chain(
                    right
                        .columns()
                        .iter()
                        .enumerate()
                        .map(|(i, c)| (c.clone(), path(&[i]))),
                ),
            );
            let context = context(&left, &right);

            let storage = join_storage(context.universe, &context, &left_input, &right_input);
            assert_eq!(block(storage.get_path(left.id_column())), 0);
            assert_eq!(block(storage.get_path(right.id_column())), 2);
            assert_eq!(block(storage.get_path(left.column("a"))), 1);
            for column in &derived {
                assert_eq!(block(storage.get_path(column)), 1);
            }
            for (i, column) in right.columns().iter().enumerate() {
                assert_eq!(storage.get_path(column), &path(&[3, i]));
            }
        }
    }
}
