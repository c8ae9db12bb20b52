//! Logical column to physical path bookkeeping.

use std::sync::atomic::{AtomicU64, Ordering};

use rivulet_expr::{Column, ColumnKind, TableRef, Universe};
use rivulet_types::ColumnPath;
use rustc_hash::FxHashMap;

static NEXT_STORAGE: AtomicU64 = AtomicU64::new(0);

/// Identity of a [`Storage`] value, used to key transient tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageId(u64);

impl StorageId {
    fn fresh() -> Self {
        StorageId(NEXT_STORAGE.fetch_add(1, Ordering::Relaxed))
    }
}

/// Where each logical column of a universe lives inside one physical table.
///
/// Column order is insertion order. When a column is inserted twice the first
/// path is kept.
#[derive(Clone, Debug)]
pub struct Storage {
    id: StorageId,
    universe: Universe,
    columns: Vec<Column>,
    paths: FxHashMap<Column, ColumnPath>,
    flattened_inputs: Option<Vec<Storage>>,
    flattened_output: Option<Box<Storage>>,
    has_only_references: bool,
    has_only_new_columns: bool,
}

impl Storage {
    pub fn new(universe: Universe, entries: impl IntoIterator<Item = (Column, ColumnPath)>) -> Self {
        let mut storage = Storage {
            id: StorageId::fresh(),
            universe,
            columns: Vec::new(),
            paths: FxHashMap::default(),
            flattened_inputs: None,
            flattened_output: None,
            has_only_references: false,
            has_only_new_columns: false,
        };
        for (column, path) in entries {
            storage.insert(column, path);
        }
        storage
    }

    /// One column per top-level position, in order.
    pub fn flat(universe: Universe, columns: impl IntoIterator<Item = Column>) -> Self {
        Storage::flat_from(universe, columns, 0)
    }

    /// Like [`Storage::flat`] with positions starting at `offset`.
    pub fn flat_from(universe: Universe, columns: impl IntoIterator<Item = Column>, offset: usize) -> Self {
        Storage::new(
            universe,
            columns
                .into_iter()
                .enumerate()
                .map(|(i, c)| (c, ColumnPath::new(vec![offset + i]))),
        )
    }

    /// Disjoint union: the `i`-th storage's paths are prefixed with `i`.
    pub fn merge_storages(universe: Universe, storages: &[&Storage]) -> Self {
        let mut merged = Storage::new(universe, std::iter::empty());
        for (i, storage) in storages.iter().enumerate() {
            for column in &storage.columns {
                merged.insert(column.clone(), storage.paths[column].prefixed(i));
            }
        }
        merged
    }

    fn insert(&mut self, column: Column, path: ColumnPath) {
        if !self.paths.contains_key(&column) {
            self.columns.push(column.clone());
            self.paths.insert(column, path);
        }
    }

    pub fn with_only_references(mut self, value: bool) -> Self {
        self.has_only_references = value;
        self
    }

    pub fn with_only_new_columns(mut self, value: bool) -> Self {
        self.has_only_new_columns = value;
        self
    }

    /// Inputs must be packed row-major in these layouts before the engine
    /// call.
    pub fn with_flattened_inputs(mut self, inputs: Vec<Storage>) -> Self {
        self.flattened_inputs = Some(inputs);
        self
    }

    /// After the engine call, also produce this row-major layout.
    pub fn with_flattened_output(mut self, output: Storage) -> Self {
        self.flattened_output = Some(Box::new(output));
        self
    }

    pub fn id(&self) -> StorageId {
        self.id
    }

    pub fn universe(&self) -> Universe {
        self.universe
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn flattened_inputs(&self) -> Option<&[Storage]> {
        self.flattened_inputs.as_deref()
    }

    pub fn flattened_output(&self) -> Option<&Storage> {
        self.flattened_output.as_deref()
    }

    /// Every column is an existing column re-exposed; nothing is computed.
    pub fn has_only_references(&self) -> bool {
        self.has_only_references
    }

    /// No pre-existing column needs to be carried along.
    pub fn has_only_new_columns(&self) -> bool {
        self.has_only_new_columns
    }

    pub fn has_column(&self, column: &Column) -> bool {
        self.paths.contains_key(column)
    }

    /// Path of `column`, following `Reference` aliases.
    pub fn try_get_path(&self, column: &Column) -> Option<&ColumnPath> {
        let mut current = column;
        loop {
            if let Some(path) = self.paths.get(current) {
                return Some(path);
            }
            match current.kind() {
                ColumnKind::Reference(target) => current = target,
                _ => return None,
            }
        }
    }

    /// # Panics
    ///
    /// If the column (or the column it aliases) has no path here.
    pub fn get_path(&self, column: &Column) -> &ColumnPath {
        self.try_get_path(column).unwrap_or_else(|| {
            panic!(
                "column {column:?} has no path in storage of {}",
                self.universe
            )
        })
    }

    /// Only the columns owned by `table`.
    pub fn restrict_to_table(&self, table: &TableRef) -> Storage {
        self.filtered(|c| table.owns(c))
    }

    /// Every column except those owned by `table`.
    pub fn remove_columns_from_table(&self, table: &TableRef) -> Storage {
        self.filtered(|c| !table.owns(c))
    }

    fn filtered(&self, keep: impl Fn(&Column) -> bool) -> Storage {
        Storage::new(
            self.universe,
            self.columns
                .iter()
                .filter(|c| keep(c))
                .map(|c| (c.clone(), self.paths[c].clone())),
        )
    }

    /// Copy with some paths replaced or added.
    pub fn with_updated_paths(&self, updates: impl IntoIterator<Item = (Column, ColumnPath)>) -> Storage {
        let mut updated = self.clone();
        updated.id = StorageId::fresh();
        for (column, path) in updates {
            if updated.paths.insert(column.clone(), path).is_none() {
                updated.columns.push(column);
            }
        }
        updated
    }

    /// Same paths, different universe.
    pub fn rebased(&self, universe: Universe) -> Storage {
        Storage::new(
            universe,
            self.columns
                .iter()
                .map(|c| (c.clone(), self.paths[c].clone())),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Column, &ColumnPath)> {
        self.columns.iter().map(|c| (c, &self.paths[c]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rivulet_types::DType;

    fn path(p: &[usize]) -> ColumnPath {
        ColumnPath::new(p.to_vec())
    }

    #[test]
    fn merge_prefixes_by_position() {
        let u = Universe::new();
        let a = Column::materialized(u, DType::Int);
        let b = Column::materialized(u, DType::Int);
        let left = Storage::flat(u, [a.clone()]);
        let right = Storage::new(u, [(b.clone(), ColumnPath::EMPTY)]);
        let merged = Storage::merge_storages(u, &[&left, &right]);
        assert_eq!(merged.get_path(&a), &path(&[0, 0]));
        assert_eq!(merged.get_path(&b), &path(&[1]));
        assert_eq!(merged.columns(), &[a, b]);
    }

    #[test]
    fn merge_keeps_first_occurrence() {
        let u = Universe::new();
        let a = Column::materialized(u, DType::Int);
        let first = Storage::new(u, [(a.clone(), ColumnPath::EMPTY)]);
        let second = Storage::flat(u, [a.clone()]);
        let merged = Storage::merge_storages(u, &[&first, &second]);
        assert_eq!(merged.get_path(&a), &path(&[0]));
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn references_resolve_through_aliases() {
        let u = Universe::new();
        let a = Column::materialized(u, DType::Str);
        let alias = Column::reference(u, &a);
        let storage = Storage::flat(u, [a]);
        assert_eq!(storage.get_path(&alias), &path(&[0]));
        assert!(!storage.has_column(&alias));
    }

    #[test]
    #[should_panic(expected = "has no path")]
    fn missing_column_panics() {
        let u = Universe::new();
        let storage = Storage::flat(u, std::iter::empty());
        storage.get_path(&Column::materialized(u, DType::Int));
    }

    #[test]
    fn table_restriction() {
        let u = Universe::new();
        let left = TableRef::materialized(u, [("a", DType::Int)]);
        let right = TableRef::materialized(u, [("b", DType::Int)]);
        let storage = Storage::flat(u, [left.column("a").clone(), right.column("b").clone()]);
        let only_right = storage.restrict_to_table(&right);
        assert_eq!(only_right.columns(), &[right.column("b").clone()]);
        assert_eq!(only_right.get_path(right.column("b")), &path(&[1]));
        let without_right = storage.remove_columns_from_table(&right);
        assert_eq!(without_right.columns(), &[left.column("a").clone()]);
    }

    #[test]
    fn updated_paths_get_a_new_identity() {
        let u = Universe::new();
        let a = Column::materialized(u, DType::Int);
        let b = Column::materialized(u, DType::Any);
        let storage = Storage::flat(u, [a.clone()]);
        let updated = storage.with_updated_paths([(b.clone(), ColumnPath::EMPTY)]);
        assert_ne!(storage.id(), updated.id());
        assert_eq!(updated.get_path(&b), &ColumnPath::EMPTY);
        assert_eq!(updated.get_path(&a), &path(&[0]));
    }
}
