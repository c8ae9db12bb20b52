#![allow(dead_code)]

use rivulet_engine::{Engine, MemEngine, TableHandle};
use rivulet_expr::{TableRef, Universe};
use rivulet_lower::{LowerOptions, Lowering};
use rivulet_plan::Storage;
use rivulet_types::{ColumnPath, Key, TableProperties, Value};

pub struct Source {
    pub table: TableRef,
    pub storage: Storage,
    pub handle: TableHandle,
}

impl Source {
    pub fn universe(&self) -> Universe {
        self.table.universe()
    }
}

pub fn lowering() -> Lowering<MemEngine> {
    lowering_with(LowerOptions::default())
}

pub fn lowering_with(options: LowerOptions) -> Lowering<MemEngine> {
    Lowering::new(MemEngine::with_options(options.engine_options()), options)
}

/// Register a table whose data columns sit flat at `(0)`, `(1)`, ... and
/// whose id column is the row key.
pub fn source(
    lowering: &mut Lowering<MemEngine>,
    columns: &[(&str, rivulet_types::DType)],
    rows: Vec<(u128, Vec<Value>)>,
) -> Source {
    source_in(lowering, Universe::new(), columns, rows)
}

pub fn source_in(
    lowering: &mut Lowering<MemEngine>,
    universe: Universe,
    columns: &[(&str, rivulet_types::DType)],
    rows: Vec<(u128, Vec<Value>)>,
) -> Source {
    let table = TableRef::materialized(universe, columns.iter().map(|(n, d)| (*n, d.clone())));
    let storage = Storage::new(
        universe,
        std::iter::once((table.id_column().clone(), ColumnPath::Key)).chain(
            table
                .columns()
                .iter()
                .enumerate()
                .map(|(i, c)| (c.clone(), ColumnPath::new(vec![i]))),
        ),
    );
    let rows = rows
        .into_iter()
        .map(|(k, vs)| (Key(k), Value::from(vs)))
        .collect();
    let handle = lowering
        .engine_mut()
        .static_table(rows, TableProperties::Empty)
        .expect("static table");
    lowering.register_source(storage.clone(), handle);
    Source {
        table,
        storage,
        handle,
    }
}

/// Values at `path`, ordered by row key.
pub fn values(lowering: &Lowering<MemEngine>, table: TableHandle, path: &ColumnPath) -> Vec<Value> {
    lowering
        .engine()
        .sorted_rows(table)
        .expect("rows")
        .iter()
        .map(|(k, v)| path.extract(k, v).expect("extract"))
        .collect()
}

pub fn keys(lowering: &Lowering<MemEngine>, table: TableHandle) -> Vec<Key> {
    lowering
        .engine()
        .sorted_rows(table)
        .expect("rows")
        .into_iter()
        .map(|(k, _)| k)
        .collect()
}

pub fn ints(values: &[i64]) -> Vec<Value> {
    values.iter().map(|&v| Value::Int(v)).collect()
}
