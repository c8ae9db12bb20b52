mod common;

use std::sync::Arc;

use common::{ints, keys, lowering, source, values};
use rivulet_expr::{BinaryOperator, Column, ColumnExpr, ReducerKind, Universe};
use rivulet_lower::evaluators::deduplicate::dedup_fold;
use rivulet_plan::{
    Acceptor, Context, DeduplicateContext, GroupedContext, JoinContext, RowwiseContext, Storage,
    layout,
};
use rivulet_test_utils::init_tracing_for_tests;
use rivulet_types::{ColumnPath, DType, Key, Value};

#[test]
fn add_one_to_every_row() {
    init_tracing_for_tests();
    let mut lowering = lowering();
    let src = source(
        &mut lowering,
        &[("a", DType::Int)],
        vec![(1, ints(&[1])), (2, ints(&[2])), (3, ints(&[3]))],
    );
    let u = src.universe();
    let plus_one = Column::expression(
        u,
        ColumnExpr::binary(
            BinaryOperator::Add,
            ColumnExpr::column(src.table.column("a")),
            ColumnExpr::constant(1_i64),
        ),
    );
    let output = layout::rowwise(u, Some(&src.storage), std::slice::from_ref(&plus_one));
    let path = output.get_path(&plus_one).clone();
    let table = lowering
        .lower_one(&Context::Rowwise(RowwiseContext { universe: u }), output)
        .expect("lowered");

    assert_eq!(values(&lowering, table, &path), ints(&[2, 3, 4]));
    assert!(lowering.engine().error_log().is_empty());
}

fn join_scenario(left_ear: bool) -> Vec<(Value, Value)> {
    let mut lowering = lowering();
    let left = source(
        &mut lowering,
        &[("a", DType::Int)],
        vec![(1, ints(&[10])), (2, ints(&[20]))],
    );
    let right = source(
        &mut lowering,
        &[("k", DType::Int), ("b", DType::Str)],
        vec![(7, vec![Value::Int(10), Value::from("x")])],
    );
    let joined = Universe::new();
    let a = Column::reference(joined, left.table.column("a"));
    let b = Column::reference(joined, right.table.column("b"));
    let context = JoinContext {
        universe: joined,
        left_table: left.table.clone(),
        right_table: right.table.clone(),
        on_left: vec![left.table.column("a").clone()],
        on_right: vec![right.table.column("k").clone()],
        assign_id: false,
        left_ear,
        right_ear: false,
        last_column_is_instance: false,
    };
    let output = layout::rowwise(joined, None, &[a.clone(), b.clone()]);
    let (a_path, b_path) = (output.get_path(&a).clone(), output.get_path(&b).clone());
    let table = lowering
        .lower_one(&Context::Join(context), output)
        .expect("lowered");

    let mut rows: Vec<(Value, Value)> = values(&lowering, table, &a_path)
        .into_iter()
        .zip(values(&lowering, table, &b_path))
        .collect();
    rows.sort_by(|l, r| l.0.partial_cmp(&r.0).expect("comparable"));
    rows
}

#[test]
fn inner_join_keeps_matching_rows_only() {
    assert_eq!(
        join_scenario(false),
        vec![(Value::Int(10), Value::from("x"))]
    );
}

#[test]
fn left_join_pads_missing_right_rows_with_none() {
    assert_eq!(
        join_scenario(true),
        vec![
            (Value::Int(10), Value::from("x")),
            (Value::Int(20), Value::None)
        ]
    );
}

#[test]
fn join_with_assigned_ids_keeps_the_left_row_and_key() {
    let mut lowering = lowering();
    let left = source(
        &mut lowering,
        &[("a", DType::Int), ("tag", DType::Str)],
        vec![
            (1, vec![Value::Int(10), Value::from("p")]),
            (2, vec![Value::Int(20), Value::from("q")]),
        ],
    );
    let right = source(
        &mut lowering,
        &[("k", DType::Int), ("b", DType::Str)],
        vec![(7, vec![Value::Int(20), Value::from("y")])],
    );
    let joined = Universe::new();
    let b = Column::reference(joined, right.table.column("b"));
    let context = JoinContext {
        universe: joined,
        left_table: left.table.clone(),
        right_table: right.table.clone(),
        on_left: vec![left.table.column("a").clone()],
        on_right: vec![right.table.column("k").clone()],
        assign_id: true,
        left_ear: false,
        right_ear: false,
        last_column_is_instance: false,
    };
    let output = layout::rowwise(joined, Some(&left.storage), std::slice::from_ref(&b));
    let tag_path = output.get_path(left.table.column("tag")).clone();
    let b_path = output.get_path(&b).clone();
    assert_eq!(tag_path, ColumnPath::new(vec![0, 1]));

    let table = lowering
        .lower_one(&Context::Join(context), output)
        .expect("lowered");
    assert_eq!(keys(&lowering, table), vec![Key(2)]);
    assert_eq!(values(&lowering, table, &tag_path), vec![Value::from("q")]);
    assert_eq!(values(&lowering, table, &b_path), vec![Value::from("y")]);
}

#[test]
fn grouped_reference_reads_the_group_value() {
    let mut lowering = lowering();
    let src = source(
        &mut lowering,
        &[("g", DType::Int), ("v", DType::Int)],
        vec![(1, ints(&[1, 5])), (2, ints(&[1, 7])), (3, ints(&[2, 3]))],
    );
    let grouped = Universe::new();
    let g = Column::reference(grouped, src.table.column("g"));
    let total = Column::expression(
        grouped,
        ColumnExpr::reducer(
            ReducerKind::Sum,
            vec![ColumnExpr::column(src.table.column("v"))],
        ),
    );
    let context = GroupedContext {
        universe: grouped,
        inner_universe: src.universe(),
        inner_id_column: src.table.id_column().clone(),
        grouping_columns: vec![src.table.column("g").clone()],
        sort_by: None,
        set_id: false,
        last_column_is_instance: false,
        skip_errors: false,
    };
    let output = Storage::flat(grouped, [g.clone(), total.clone()]);
    let (g_path, total_path) = (output.get_path(&g).clone(), output.get_path(&total).clone());
    let table = lowering
        .lower_one(&Context::Grouped(context), output)
        .expect("lowered");

    let mut rows: Vec<(Value, Value)> = values(&lowering, table, &g_path)
        .into_iter()
        .zip(values(&lowering, table, &total_path))
        .collect();
    rows.sort();
    assert_eq!(
        rows,
        vec![
            (Value::Int(1), Value::Int(12)),
            (Value::Int(2), Value::Int(3))
        ]
    );
    assert!(lowering.engine().error_log().is_empty());
}

#[test]
fn grouped_reference_to_a_varying_column_is_a_row_error() {
    let mut lowering = lowering();
    let src = source(
        &mut lowering,
        &[("g", DType::Int), ("v", DType::Int)],
        vec![(1, ints(&[1, 5])), (2, ints(&[1, 7])), (3, ints(&[2, 3]))],
    );
    let grouped = Universe::new();
    let v = Column::reference(grouped, src.table.column("v"));
    let context = GroupedContext {
        universe: grouped,
        inner_universe: src.universe(),
        inner_id_column: src.table.id_column().clone(),
        grouping_columns: vec![src.table.column("g").clone()],
        sort_by: None,
        set_id: false,
        last_column_is_instance: false,
        skip_errors: false,
    };
    let output = Storage::flat(grouped, [v.clone()]);
    let path = output.get_path(&v).clone();
    let table = lowering
        .lower_one(&Context::Grouped(context), output)
        .expect("lowered");

    let cells = values(&lowering, table, &path);
    assert!(cells.contains(&Value::Int(3)));
    assert!(cells.contains(&Value::Error));
    assert_eq!(lowering.engine().error_log().len(), 1);
}

#[test]
fn grouped_sum_per_key() {
    let mut lowering = lowering();
    let src = source(
        &mut lowering,
        &[("g", DType::Int), ("v", DType::Int)],
        vec![(1, ints(&[1, 5])), (2, ints(&[1, 7])), (3, ints(&[2, 3]))],
    );
    let grouped = Universe::new();
    let g = Column::expression(grouped, ColumnExpr::column(src.table.column("g")));
    let total = Column::expression(
        grouped,
        ColumnExpr::reducer(
            ReducerKind::Sum,
            vec![ColumnExpr::column(src.table.column("v"))],
        ),
    );
    let context = GroupedContext {
        universe: grouped,
        inner_universe: src.universe(),
        inner_id_column: src.table.id_column().clone(),
        grouping_columns: vec![src.table.column("g").clone()],
        sort_by: None,
        set_id: false,
        last_column_is_instance: false,
        skip_errors: false,
    };
    let output = Storage::flat(grouped, [g.clone(), total.clone()]);
    let (g_path, total_path) = (output.get_path(&g).clone(), output.get_path(&total).clone());
    let table = lowering
        .lower_one(&Context::Grouped(context), output)
        .expect("lowered");

    let mut rows: Vec<(Value, Value)> = values(&lowering, table, &g_path)
        .into_iter()
        .zip(values(&lowering, table, &total_path))
        .collect();
    rows.sort_by(|l, r| l.0.partial_cmp(&r.0).expect("comparable"));
    assert_eq!(
        rows,
        vec![
            (Value::Int(1), Value::Int(12)),
            (Value::Int(2), Value::Int(3))
        ]
    );
}

fn prefer_larger() -> Acceptor {
    Arc::new(|candidate: &Value, current: &Value| candidate > current)
}

#[test]
fn deduplicate_prefers_larger_values() {
    let mut lowering = lowering();
    let src = source(
        &mut lowering,
        &[("instance", DType::Int), ("v", DType::Int)],
        vec![(1, ints(&[0, 5])), (2, ints(&[0, 3])), (3, ints(&[1, 4]))],
    );
    let deduped = Universe::new();
    let v = Column::reference(deduped, src.table.column("v"));
    let context = DeduplicateContext {
        universe: deduped,
        input: src.universe(),
        value: src.table.column("v").clone(),
        instance: vec![src.table.column("instance").clone()],
        acceptor: prefer_larger(),
        persistent_id: None,
    };
    let output = Storage::flat_from(deduped, [v.clone()], 1);
    let path = output.get_path(&v).clone();
    let table = lowering
        .lower_one(&Context::Deduplicate(context), output)
        .expect("lowered");

    let mut kept = values(&lowering, table, &path);
    kept.sort_by(|l, r| l.partial_cmp(r).expect("comparable"));
    assert_eq!(kept, ints(&[4, 5]));
}

#[test]
fn deduplicate_ignores_retraction_of_the_retained_value() {
    let fold = dedup_fold(prefer_larger());
    let row = |v: i64| Value::from_tuple([Value::Int(v)]);
    let mut state = None;
    for change in [(row(5), 1), (row(3), 1), (row(5), -1)] {
        state = fold.apply(state, &[change]);
    }
    assert_eq!(state, Some(row(5)));
}

#[test]
fn coalesce_picks_the_first_present_value() {
    let mut lowering = lowering();
    let src = source(&mut lowering, &[("a", DType::Int)], vec![(1, ints(&[0]))]);
    let u = src.universe();
    let first = Column::expression(
        u,
        ColumnExpr::coalesce(vec![
            ColumnExpr::none(),
            ColumnExpr::none(),
            ColumnExpr::constant(7_i64),
        ]),
    );
    assert_eq!(*first.dtype(), DType::Int);
    let output = layout::rowwise(u, None, std::slice::from_ref(&first));
    let path = output.get_path(&first).clone();
    let table = lowering
        .lower_one(&Context::Rowwise(RowwiseContext { universe: u }), output)
        .expect("lowered");

    assert_eq!(values(&lowering, table, &path), ints(&[7]));
}
