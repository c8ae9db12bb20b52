use rivulet_expr::{BinaryOperator, ColumnExpr, ColumnKind, Method, ReducerKind, TableRef, Universe};
use rivulet_types::DType;

#[test]
fn expression_columns_take_their_type_from_the_tree() {
    let mut table = TableRef::materialized(Universe::new(), [("a", DType::Int), ("s", DType::Str)]);
    let a = table.column("a").clone();
    let s = table.column("s").clone();

    let doubled = table.add_expression(
        "half",
        ColumnExpr::binary(
            BinaryOperator::TrueDiv,
            ColumnExpr::column(&a),
            ColumnExpr::constant(2_i64),
        ),
    );
    assert_eq!(doubled.dtype(), &DType::Float);
    assert!(matches!(doubled.kind(), ColumnKind::Expression(_)));
    assert!(table.owns(&doubled));

    let upper = ColumnExpr::method_call(Method::Upper, vec![ColumnExpr::column(&s)]);
    assert_eq!(upper.dtype(), &DType::Str);
    let bad = ColumnExpr::method_call(Method::Upper, vec![ColumnExpr::column(&a)]);
    assert_eq!(bad.dtype(), &DType::Any);
}

#[test]
fn reducers_and_conditionals() {
    let table = TableRef::materialized(
        Universe::new(),
        [("v", DType::Float), ("o", DType::optional(DType::Int))],
    );
    let v = ColumnExpr::column(table.column("v"));
    let o = ColumnExpr::column(table.column("o"));

    assert_eq!(ColumnExpr::reducer(ReducerKind::Sum, vec![v.clone()]).dtype(), &DType::Float);
    assert_eq!(ColumnExpr::reducer(ReducerKind::Count, vec![]).dtype(), &DType::Int);

    let pick = ColumnExpr::if_else(ColumnExpr::is_none(o.clone()), v.clone(), o.clone());
    assert_eq!(pick.dtype(), &DType::optional(DType::Float));
    assert_eq!(ColumnExpr::unwrap(o.clone()).dtype(), &DType::Int);
    assert_eq!(ColumnExpr::require(v, vec![o]).dtype(), &DType::optional(DType::Float));
}

#[test]
fn json_conversion_is_optional() {
    let table = TableRef::materialized(Universe::new(), [("j", DType::Json)]);
    let j = ColumnExpr::column(table.column("j"));
    let field = ColumnExpr::get(j, ColumnExpr::constant("n"), None, true);
    let n = ColumnExpr::convert(DType::Int, field);
    assert_eq!(n.dtype(), &DType::optional(DType::Int));
}
