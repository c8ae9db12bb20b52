mod common;

use std::sync::Arc;

use common::{ints, keys, lowering, lowering_with, source, values};
use rand::Rng;
use rivulet_engine::{ExternalIndex, ExternalIndexFactory, callable_fn};
use rivulet_expr::{
    ApplyExpr, BinaryOperator, Column, ColumnExpr, Method, TableRef, Universe,
};
use rivulet_lower::LowerOptions;
use rivulet_plan::{
    ConcatUnsafeContext, Context, DifferenceContext, ExternalIndexAsOfNowContext,
    GradualBroadcastContext, IxContext, RowwiseContext, Storage, TableRestrictedRowwiseContext,
    layout,
};
use rivulet_result::{Error, Result};
use rivulet_test_utils::{init_tracing_for_tests, seeded_rng};
use rivulet_types::{ColumnPath, DType, Key, Value};

fn rowwise(u: Universe) -> Context {
    Context::Rowwise(RowwiseContext { universe: u })
}

#[test]
fn references_only_reuse_the_input_table() {
    let mut lowering = lowering();
    let src = source(&mut lowering, &[("a", DType::Int)], vec![(1, ints(&[1]))]);
    let u = src.universe();
    let alias = Column::reference(u, src.table.column("a"));
    let output = layout::references(u, &src.storage, &[alias]);
    let tables_before = lowering.engine().table_count();

    let table = lowering.lower_one(&rowwise(u), output).expect("lowered");
    assert_eq!(table, src.handle);
    assert_eq!(lowering.engine().table_count(), tables_before);
}

#[test]
fn restricted_context_rejects_foreign_columns() {
    let mut lowering = lowering();
    let src = source(&mut lowering, &[("a", DType::Int)], vec![(1, ints(&[1]))]);
    let u = src.universe();
    let foreign = TableRef::materialized(u, [("b", DType::Int)]);
    let sum = Column::expression(
        u,
        ColumnExpr::binary(
            BinaryOperator::Add,
            ColumnExpr::column(src.table.column("a")),
            ColumnExpr::column(foreign.column("b")),
        ),
    );
    let output = layout::rowwise(u, None, &[sum]);
    let context = Context::TableRestrictedRowwise(TableRestrictedRowwiseContext {
        universe: u,
        table: src.table.clone(),
    });

    let err = lowering.lower_one(&context, output).expect_err("rejected");
    assert!(matches!(err, Error::InvalidExpression(_)), "{err}");
}

#[test]
fn unsupported_operators_and_methods_are_type_errors() {
    let mut lowering = lowering();
    let src = source(
        &mut lowering,
        &[("s", DType::Str), ("n", DType::Int)],
        vec![(1, vec![Value::from("x"), Value::Int(1)])],
    );
    let u = src.universe();
    let s = ColumnExpr::column(src.table.column("s"));
    let n = ColumnExpr::column(src.table.column("n"));

    let minus = Column::expression(u, ColumnExpr::binary(BinaryOperator::Sub, s.clone(), s));
    let err = lowering
        .lower_one(&rowwise(u), layout::rowwise(u, None, &[minus]))
        .expect_err("no subtraction on strings");
    assert!(matches!(&err, Error::TypeError(msg) if msg.contains("STR")), "{err}");

    let lower = Column::expression(u, ColumnExpr::method_call(Method::Lower, vec![n]));
    let err = lowering
        .lower_one(&rowwise(u), layout::rowwise(u, None, &[lower]))
        .expect_err("no lower() on ints");
    assert!(matches!(&err, Error::TypeError(msg) if msg.contains("lower")), "{err}");
}

#[test]
fn runtime_typechecking_turns_bad_values_into_row_errors() {
    init_tracing_for_tests();
    let mut lowering = lowering_with(LowerOptions::default().with_runtime_typechecking(true));
    let src = source(
        &mut lowering,
        &[("a", DType::Str)],
        vec![(1, vec![Value::from("x")])],
    );
    let u = src.universe();
    let a = ColumnExpr::column(src.table.column("a"));
    let as_int = Column::expression(u, ColumnExpr::declare(DType::Int, a.clone()));
    let as_str = Column::expression(u, ColumnExpr::declare(DType::Str, a));
    let output = layout::rowwise(u, None, &[as_int.clone(), as_str.clone()]);
    let (int_path, str_path) = (
        output.get_path(&as_int).clone(),
        output.get_path(&as_str).clone(),
    );

    let table = lowering.lower_one(&rowwise(u), output).expect("lowered");
    assert_eq!(values(&lowering, table, &int_path), vec![Value::Error]);
    assert_eq!(values(&lowering, table, &str_path), vec![Value::from("x")]);
    assert_eq!(lowering.engine().error_log().len(), 1);
    assert!(lowering.engine().error_log()[0].message.contains("INT"));
}

#[test]
fn async_results_are_spliced_back_as_columns() {
    let mut lowering = lowering();
    let src = source(
        &mut lowering,
        &[("a", DType::Int)],
        vec![(1, ints(&[1])), (2, ints(&[2])), (3, ints(&[3]))],
    );
    let u = src.universe();
    let a = ColumnExpr::column(src.table.column("a"));
    let double = callable_fn("double", |args: &[Value]| {
        args[0]
            .as_int()
            .map(|v| Value::Int(v * 2))
            .ok_or_else(|| "expected an int".to_string())
    });
    let doubled = ColumnExpr::async_apply(
        ApplyExpr::new(double, DType::Int)
            .arg(a.clone())
            .deterministic(true),
    );
    let plus = Column::expression(u, ColumnExpr::binary(BinaryOperator::Add, doubled, a));
    let output = layout::rowwise(u, Some(&src.storage), std::slice::from_ref(&plus));
    let path = output.get_path(&plus).clone();

    let table = lowering.lower_one(&rowwise(u), output).expect("lowered");
    assert_eq!(values(&lowering, table, &path), ints(&[3, 6, 9]));
    assert!(lowering.engine().error_log().is_empty());
}

#[test]
fn flattened_output_is_registered_as_a_temporary_table() {
    let mut lowering = lowering();
    let src = source(
        &mut lowering,
        &[("a", DType::Int)],
        vec![(1, ints(&[1])), (2, ints(&[2]))],
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
    let flat = Storage::flat(u, [plus_one.clone()]);
    let output = layout::rowwise(u, Some(&src.storage), std::slice::from_ref(&plus_one))
        .with_flattened_output(flat.clone());

    lowering.lower_one(&rowwise(u), output).expect("lowered");
    let flattened = lowering.state().get_temporary_table(&flat);
    assert_eq!(
        values(&lowering, flattened, &ColumnPath::new(vec![0])),
        ints(&[2, 3])
    );
}

#[test]
fn difference_drops_rows_present_on_the_right() {
    let mut lowering = lowering();
    let left = source(
        &mut lowering,
        &[("a", DType::Int)],
        vec![(1, ints(&[1])), (2, ints(&[2])), (3, ints(&[3]))],
    );
    let right = source(&mut lowering, &[("b", DType::Int)], vec![(2, ints(&[0]))]);
    let out = Universe::new();
    let context = Context::Difference(DifferenceContext {
        universe: out,
        left: left.universe(),
        right: right.universe(),
    });
    let table = lowering
        .lower_one(&context, layout::passthrough(out, &left.storage))
        .expect("lowered");
    assert_eq!(keys(&lowering, table), vec![Key(1), Key(3)]);
}

#[test]
fn ix_reads_rows_through_a_pointer_column() {
    let mut lowering = lowering();
    let values_table = source(
        &mut lowering,
        &[("v", DType::Str)],
        vec![(1, vec![Value::from("one")]), (2, vec![Value::from("two")])],
    );
    let pointers = source(
        &mut lowering,
        &[("ptr", DType::Pointer)],
        vec![
            (10, vec![Value::Pointer(Key(2))]),
            (11, vec![Value::Pointer(Key(1))]),
        ],
    );
    let u = pointers.universe();
    let v = Column::reference(u, values_table.table.column("v"));
    let output = Storage::new(u, [(v.clone(), ColumnPath::new(vec![1, 0]))]);
    let context = Context::Ix(IxContext {
        universe: u,
        orig_universe: values_table.universe(),
        key_column: pointers.table.column("ptr").clone(),
        optional: false,
    });

    let table = lowering.lower_one(&context, output).expect("lowered");
    assert_eq!(
        values(&lowering, table, &ColumnPath::new(vec![1, 0])),
        vec![Value::from("two"), Value::from("one")]
    );
}

#[test]
fn concat_packs_inputs_with_different_layouts() {
    let mut lowering = lowering();
    let first = source(
        &mut lowering,
        &[("a", DType::Int)],
        vec![(1, ints(&[1])), (2, ints(&[2]))],
    );
    let second = source(
        &mut lowering,
        &[("x", DType::Str), ("a", DType::Int)],
        vec![(3, vec![Value::from("ignored"), Value::Int(3)])],
    );
    let out = Universe::new();
    let a = Column::materialized(out, DType::Int);
    let output = Storage::flat(out, [a.clone()]).with_flattened_inputs(vec![
        Storage::flat(out, [first.table.column("a").clone()]),
        Storage::flat(out, [second.table.column("a").clone()]),
    ]);
    let path = output.get_path(&a).clone();
    let context = Context::ConcatUnsafe(ConcatUnsafeContext {
        universe: out,
        inputs: vec![first.universe(), second.universe()],
    });

    let table = lowering.lower_one(&context, output).expect("lowered");
    assert_eq!(values(&lowering, table, &path), ints(&[1, 2, 3]));
}

#[test]
fn gradual_broadcast_is_monotone_in_the_threshold_value() {
    let mut lowering = lowering();
    let rows = (1..=40).map(|k| (k, ints(&[k as i64]))).collect();
    let input = source(&mut lowering, &[("a", DType::Int)], rows);

    let mut rng = seeded_rng(0xb40adca5);
    let mut levels: Vec<f64> = (0..8).map(|_| rng.random_range(0.0..10.0)).collect();
    levels.sort_by(|a, b| a.total_cmp(b));

    let mut previous: Option<Vec<f64>> = None;
    for (i, level) in levels.into_iter().enumerate() {
        let threshold = source(
            &mut lowering,
            &[
                ("lower", DType::Float),
                ("value", DType::Float),
                ("upper", DType::Float),
            ],
            vec![(
                1000 + i as u128,
                vec![Value::Float(0.0), Value::Float(level), Value::Float(10.0)],
            )],
        );
        let out = Universe::new();
        let apx = Column::materialized(out, DType::Float);
        let output = layout::appended(out, &input.storage, std::slice::from_ref(&apx));
        let path = output.get_path(&apx).clone();
        let context = Context::GradualBroadcast(GradualBroadcastContext {
            universe: out,
            input: input.universe(),
            lower_column: threshold.table.column("lower").clone(),
            value_column: threshold.table.column("value").clone(),
            upper_column: threshold.table.column("upper").clone(),
        });
        let table = lowering.lower_one(&context, output).expect("lowered");

        let current: Vec<f64> = values(&lowering, table, &path)
            .iter()
            .map(|v| v.as_float().expect("float"))
            .collect();
        assert!(current.iter().all(|&v| v == 0.0 || v == 10.0));
        if let Some(previous) = &previous {
            for (before, after) in previous.iter().zip(&current) {
                assert!(before <= after, "level {level} lowered a row");
            }
        }
        previous = Some(current);
    }
}

struct ExactIndex {
    entries: Vec<(Key, Value)>,
}

impl ExternalIndex for ExactIndex {
    fn add(&mut self, key: Key, data: &Value, _filter_data: Option<&Value>) -> Result<()> {
        self.entries.push((key, data.clone()));
        Ok(())
    }

    fn remove(&mut self, key: Key) -> Result<()> {
        self.entries.retain(|(k, _)| *k != key);
        Ok(())
    }

    fn search(
        &self,
        query: &Value,
        limit: Option<usize>,
        _filter: Option<&Value>,
    ) -> Result<Vec<(Key, f64)>> {
        let mut hits: Vec<(Key, f64)> = self
            .entries
            .iter()
            .filter(|(_, v)| v == query)
            .map(|(k, _)| (*k, 1.0))
            .collect();
        if let Some(limit) = limit {
            hits.truncate(limit);
        }
        Ok(hits)
    }
}

struct ExactIndexFactory;

impl ExternalIndexFactory for ExactIndexFactory {
    fn make_instance(&self) -> Result<Box<dyn ExternalIndex>> {
        Ok(Box::new(ExactIndex {
            entries: Vec::new(),
        }))
    }
}

#[test]
fn external_index_answers_each_query_with_limited_matches() {
    let mut lowering = lowering();
    let docs = source(
        &mut lowering,
        &[("text", DType::Str)],
        vec![
            (1, vec![Value::from("cat")]),
            (2, vec![Value::from("dog")]),
            (3, vec![Value::from("cat")]),
        ],
    );
    let queries = source(
        &mut lowering,
        &[("q", DType::Str), ("limit", DType::Int)],
        vec![
            (10, vec![Value::from("cat"), Value::Int(1)]),
            (11, vec![Value::from("dog"), Value::Int(5)]),
        ],
    );
    let out = Universe::new();
    let answers = Column::materialized(out, DType::Any);
    let output = layout::appended(out, &queries.storage, std::slice::from_ref(&answers));
    let path = output.get_path(&answers).clone();
    let context = Context::ExternalIndexAsOfNow(ExternalIndexAsOfNowContext {
        universe: out,
        index_universe: docs.universe(),
        index_column: docs.table.column("text").clone(),
        index_filter_data_column: None,
        query_universe: queries.universe(),
        query_column: queries.table.column("q").clone(),
        query_response_limit_column: Some(queries.table.column("limit").clone()),
        query_filter_column: None,
        index_factory: Arc::new(ExactIndexFactory),
    });

    let table = lowering.lower_one(&context, output).expect("lowered");
    let hit = |k: u128| Value::from(vec![Value::Pointer(Key(k)), Value::Float(1.0)]);
    assert_eq!(
        values(&lowering, table, &path),
        vec![Value::from_tuple([hit(1)]), Value::from_tuple([hit(2)])]
    );
}

#[test]
fn json_fields_are_read_and_converted() {
    let mut lowering = lowering();
    let src = source(
        &mut lowering,
        &[("doc", DType::Json)],
        vec![
            (1, vec![Value::json(serde_json::json!({"a": 3}))]),
            (2, vec![Value::json(serde_json::json!({"b": 1}))]),
        ],
    );
    let u = src.universe();
    let field = ColumnExpr::get(
        ColumnExpr::column(src.table.column("doc")),
        ColumnExpr::constant("a"),
        None,
        true,
    );
    let a = Column::expression(u, ColumnExpr::convert(DType::Int, field));
    assert_eq!(*a.dtype(), DType::optional(DType::Int));
    let output = layout::rowwise(u, None, std::slice::from_ref(&a));
    let path = output.get_path(&a).clone();

    let table = lowering.lower_one(&rowwise(u), output).expect("lowered");
    assert_eq!(values(&lowering, table, &path), vec![Value::Int(3), Value::None]);
}
