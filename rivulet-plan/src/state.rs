//! Compile-time environment of a lowering run.

use rivulet_engine::TableHandle;
use rivulet_expr::Universe;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::storage::{Storage, StorageId};

/// Maps every lowered universe to its storage and physical table, plus
/// transient tables produced mid-lowering.
///
/// Lookups of entries that were never set are contract violations and panic.
#[derive(Debug, Default)]
pub struct ScopeState {
    storages: FxHashMap<Universe, Storage>,
    tables: FxHashMap<Universe, TableHandle>,
    temporary: FxHashMap<StorageId, TableHandle>,
}

impl ScopeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `table` as the physical table of `storage`'s universe.
    pub fn set_table(&mut self, storage: Storage, table: TableHandle) {
        let universe = storage.universe();
        trace!(%universe, %table, columns = storage.len(), "set_table");
        self.storages.insert(universe, storage);
        self.tables.insert(universe, table);
    }

    pub fn contains(&self, universe: Universe) -> bool {
        self.tables.contains_key(&universe)
    }

    pub fn try_get_table(&self, universe: Universe) -> Option<TableHandle> {
        self.tables.get(&universe).copied()
    }

    /// # Panics
    ///
    /// If `universe` has not been lowered yet.
    pub fn get_table(&self, universe: Universe) -> TableHandle {
        self.try_get_table(universe)
            .unwrap_or_else(|| panic!("no table registered for {universe}"))
    }

    /// # Panics
    ///
    /// If `universe` has not been lowered yet.
    pub fn get_storage(&self, universe: Universe) -> &Storage {
        self.storages
            .get(&universe)
            .unwrap_or_else(|| panic!("no storage registered for {universe}"))
    }

    pub fn get_tables(&self, universes: &[Universe]) -> Vec<TableHandle> {
        universes.iter().map(|&u| self.get_table(u)).collect()
    }

    pub fn get_storages(&self, universes: &[Universe]) -> Vec<&Storage> {
        universes.iter().map(|&u| self.get_storage(u)).collect()
    }

    pub fn set_temporary_table(&mut self, storage: &Storage, table: TableHandle) {
        trace!(storage = ?storage.id(), %table, "set_temporary_table");
        self.temporary.insert(storage.id(), table);
    }

    /// # Panics
    ///
    /// If no transient table was registered for `storage`.
    pub fn get_temporary_table(&self, storage: &Storage) -> TableHandle {
        *self
            .temporary
            .get(&storage.id())
            .unwrap_or_else(|| panic!("no temporary table for storage {:?}", storage.id()))
    }

    pub fn universes(&self) -> impl Iterator<Item = Universe> + '_ {
        self.tables.keys().copied()
    }
}
