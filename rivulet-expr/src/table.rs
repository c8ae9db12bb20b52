use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use rivulet_types::DType;

use crate::column::{Column, ColumnKind};
use crate::universe::Universe;

static NEXT_TABLE: AtomicU64 = AtomicU64::new(0);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(u64);

impl TableId {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        TableId(NEXT_TABLE.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table#{}", self.0)
    }
}

/// A logical table: an identity column plus named data columns, all in one
/// universe and all tagged with the table's id.
#[derive(Clone, Debug)]
pub struct TableRef {
    id: TableId,
    universe: Universe,
    id_column: Column,
    columns: Vec<Column>,
}

impl TableRef {
    /// A table over `universe` with no data columns yet.
    pub fn new(universe: Universe) -> Self {
        let id = TableId::new();
        let id_column = Column::builder(universe, ColumnKind::Id, DType::Pointer)
            .name("id")
            .table(id)
            .trusted_dtype(true)
            .build();
        Self {
            id,
            universe,
            id_column,
            columns: Vec::new(),
        }
    }

    /// A table whose columns are all materialized, in the given order.
    pub fn materialized<'a>(
        universe: Universe,
        columns: impl IntoIterator<Item = (&'a str, DType)>,
    ) -> Self {
        let mut table = TableRef::new(universe);
        for (name, dtype) in columns {
            table.add_column(name, ColumnKind::Materialized, dtype);
        }
        table
    }

    /// Create a column owned by this table and return it.
    pub fn add_column(&mut self, name: &str, kind: ColumnKind, dtype: DType) -> Column {
        let column = Column::builder(self.universe, kind, dtype)
            .name(name)
            .table(self.id)
            .build();
        self.columns.push(column.clone());
        column
    }

    /// Add an expression column computed in this table's universe.
    pub fn add_expression(&mut self, name: &str, expr: crate::expr::ColumnExpr) -> Column {
        let dtype = expr.dtype().clone();
        self.add_column(name, ColumnKind::Expression(expr), dtype)
    }

    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn universe(&self) -> Universe {
        self.universe
    }

    pub fn id_column(&self) -> &Column {
        &self.id_column
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Data column by name.
    ///
    /// # Panics
    ///
    /// If the table has no such column.
    pub fn column(&self, name: &str) -> &Column {
        self.columns
            .iter()
            .find(|c| c.name() == Some(name))
            .unwrap_or_else(|| panic!("table {} has no column {name:?}", self.id))
    }

    /// `true` for the id column and every data column of this table.
    pub fn owns(&self, column: &Column) -> bool {
        column.table() == Some(self.id)
    }
}
