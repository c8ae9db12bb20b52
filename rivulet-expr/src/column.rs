//! Columns: reference-identity handles for logical attributes.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rivulet_types::{ColumnProperties, DType};

use crate::expr::ColumnExpr;
use crate::table::TableId;
use crate::universe::Universe;

static NEXT_COLUMN: AtomicU64 = AtomicU64::new(0);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnId(u64);

impl ColumnId {
    fn fresh() -> Self {
        ColumnId(NEXT_COLUMN.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "col#{}", self.0)
    }
}

/// How a column gets its values.
#[derive(Clone, Debug)]
pub enum ColumnKind {
    /// Present in a physical table already (source, placeholder or
    /// temporary).
    Materialized,
    /// The row identity of a table.
    Id,
    /// Computed from an expression over other columns of the same universe.
    Expression(ColumnExpr),
    /// Alias of another column; resolves to the target's path.
    Reference(Column),
    /// Materialized outside the engine's property tracking.
    ExternalMaterialized,
}

struct ColumnInner {
    id: ColumnId,
    name: Option<Arc<str>>,
    universe: Universe,
    properties: ColumnProperties,
    table: Option<TableId>,
    kind: ColumnKind,
    trusted_dtype: bool,
}

/// A logical column. Equality and hashing are by identity, never by name.
#[derive(Clone)]
pub struct Column(Arc<ColumnInner>);

impl Column {
    pub fn builder(universe: Universe, kind: ColumnKind, dtype: DType) -> ColumnBuilder {
        ColumnBuilder {
            universe,
            kind,
            properties: ColumnProperties::new(dtype),
            name: None,
            table: None,
            trusted_dtype: false,
        }
    }

    pub fn materialized(universe: Universe, dtype: DType) -> Column {
        Column::builder(universe, ColumnKind::Materialized, dtype).build()
    }

    pub fn id(universe: Universe) -> Column {
        Column::builder(universe, ColumnKind::Id, DType::Pointer)
            .trusted_dtype(true)
            .build()
    }

    pub fn expression(universe: Universe, expr: ColumnExpr) -> Column {
        let dtype = expr.dtype().clone();
        Column::builder(universe, ColumnKind::Expression(expr), dtype).build()
    }

    /// An alias of `target` visible in `universe`.
    pub fn reference(universe: Universe, target: &Column) -> Column {
        Column::builder(
            universe,
            ColumnKind::Reference(target.clone()),
            target.dtype().clone(),
        )
        .append_only(target.properties().append_only)
        .trusted_dtype(target.trusted_dtype())
        .build()
    }

    pub fn column_id(&self) -> ColumnId {
        self.0.id
    }

    pub fn name(&self) -> Option<&str> {
        self.0.name.as_deref()
    }

    pub fn universe(&self) -> Universe {
        self.0.universe
    }

    pub fn dtype(&self) -> &DType {
        &self.0.properties.dtype
    }

    pub fn properties(&self) -> &ColumnProperties {
        &self.0.properties
    }

    pub fn table(&self) -> Option<TableId> {
        self.0.table
    }

    pub fn kind(&self) -> &ColumnKind {
        &self.0.kind
    }

    /// Values are type-correct by construction; runtime verification is
    /// skipped for references to this column.
    pub fn trusted_dtype(&self) -> bool {
        self.0.trusted_dtype
    }

    pub fn is_id(&self) -> bool {
        matches!(self.0.kind, ColumnKind::Id)
    }

    pub fn expression_ref(&self) -> Option<&ColumnExpr> {
        match &self.0.kind {
            ColumnKind::Expression(e) => Some(e),
            _ => None,
        }
    }

    /// Follow `Reference` aliases to the column that owns the data.
    pub fn resolve(&self) -> &Column {
        let mut current = self;
        while let ColumnKind::Reference(target) = current.kind() {
            current = target;
        }
        current
    }

    /// A column reference expression for this column.
    pub fn reference_expr(&self) -> ColumnExpr {
        ColumnExpr::column(self)
    }
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Column {}

impl Hash for Column {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind() {
            ColumnKind::Materialized => "materialized",
            ColumnKind::Id => "id",
            ColumnKind::Expression(_) => "expression",
            ColumnKind::Reference(_) => "reference",
            ColumnKind::ExternalMaterialized => "external",
        };
        match self.name() {
            Some(name) => write!(f, "Column({}, {name:?}, {kind}, {})", self.0.id, self.dtype()),
            None => write!(f, "Column({}, {kind}, {})", self.0.id, self.dtype()),
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{}", self.0.id),
        }
    }
}

pub struct ColumnBuilder {
    universe: Universe,
    kind: ColumnKind,
    properties: ColumnProperties,
    name: Option<Arc<str>>,
    table: Option<TableId>,
    trusted_dtype: bool,
}

impl ColumnBuilder {
    pub fn name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn table(mut self, table: TableId) -> Self {
        self.table = Some(table);
        self
    }

    pub fn append_only(mut self, append_only: bool) -> Self {
        self.properties.append_only = append_only;
        self
    }

    pub fn trace(mut self, trace: impl Into<Arc<str>>) -> Self {
        self.properties.trace = Some(trace.into());
        self
    }

    pub fn trusted_dtype(mut self, trusted: bool) -> Self {
        self.trusted_dtype = trusted;
        self
    }

    pub fn build(self) -> Column {
        Column(Arc::new(ColumnInner {
            id: ColumnId::fresh(),
            name: self.name,
            universe: self.universe,
            properties: self.properties,
            table: self.table,
            kind: self.kind,
            trusted_dtype: self.trusted_dtype,
        }))
    }
}
