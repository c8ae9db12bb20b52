//! In-memory snapshot engine.
//!
//! Every primitive is evaluated eagerly over fully materialized rows. There is
//! no notion of processing time, so time-based operators take their snapshot
//! meaning:
//!
//! - `forget` drops rows whose threshold is not above the largest time value
//!   present; `forget_immediately` yields an empty table.
//! - `freeze`, `buffer`, `filter_out_results_of_forgetting` and
//!   `remove_retractions_from_table` keep every row.
//! - `deduplicate` delivers each instance's rows to the fold as one batch of
//!   insertions, in table order.
//!
//! Row-level failures become [`Value::Error`] cells and are recorded in the
//! error log, unless [`MemEngineOptions::terminate_on_error`] is set, in which
//! case the first one aborts the call.

mod eval;
mod join;
mod reduce;

use std::sync::Arc;

use rivulet_result::{Error, Result};
use rivulet_types::{ColumnPath, Key, TableProperties, Value};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use crate::callable::{CallableRef, StateFold};
use crate::engine::{Engine, JoinOptions, TableHandle};
use crate::expression::EngineExpr;
use crate::index::{ExternalIndexData, ExternalIndexFactory, ExternalIndexQuery};
use crate::reducer::ReducerData;

pub(crate) type RowErrors = Vec<(Option<Key>, String)>;

type Rows = Arc<Vec<(Key, Value)>>;

/// A row-level error recorded by [`MemEngine`].
#[derive(Clone, Debug, PartialEq)]
pub struct RowError {
    pub operator: &'static str,
    pub key: Option<Key>,
    pub message: String,
}

/// Options controlling [`MemEngine`] behavior.
#[derive(Clone, Debug, Default)]
pub struct MemEngineOptions {
    /// Abort the current primitive with [`Error::Engine`] on the first row
    /// error instead of logging it.
    pub terminate_on_error: bool,
}

impl MemEngineOptions {
    pub fn with_terminate_on_error(mut self, terminate_on_error: bool) -> Self {
        self.terminate_on_error = terminate_on_error;
        self
    }
}

struct MemTable {
    rows: Rows,
    properties: TableProperties,
}

/// Snapshot implementation of [`Engine`] used for tests.
pub struct MemEngine {
    options: MemEngineOptions,
    next_handle: u32,
    tables: FxHashMap<TableHandle, MemTable>,
    errors: Vec<RowError>,
}

impl Default for MemEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemEngine {
    pub fn new() -> Self {
        Self::with_options(MemEngineOptions::default())
    }

    pub fn with_options(options: MemEngineOptions) -> Self {
        Self {
            options,
            next_handle: 0,
            tables: FxHashMap::default(),
            errors: Vec::new(),
        }
    }

    /// Rows of a table, in engine order.
    pub fn rows(&self, table: TableHandle) -> Result<Rows> {
        self.tables
            .get(&table)
            .map(|t| Arc::clone(&t.rows))
            .ok_or(Error::InvalidTableHandle)
    }

    /// Rows of a table sorted by key.
    pub fn sorted_rows(&self, table: TableHandle) -> Result<Vec<(Key, Value)>> {
        let mut rows = self.rows(table)?.as_ref().clone();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(rows)
    }

    /// Values at `path` across all rows of `table`, in engine order.
    pub fn column(&self, table: TableHandle, path: &ColumnPath) -> Result<Vec<Value>> {
        self.rows(table)?
            .iter()
            .map(|(k, v)| path.extract(k, v))
            .collect()
    }

    pub fn error_log(&self) -> &[RowError] {
        &self.errors
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    fn emit(&mut self, rows: Vec<(Key, Value)>, properties: TableProperties) -> TableHandle {
        self.emit_shared(Arc::new(rows), properties)
    }

    fn emit_shared(&mut self, rows: Rows, properties: TableProperties) -> TableHandle {
        let handle = TableHandle(self.next_handle);
        self.next_handle += 1;
        trace!(%handle, rows = rows.len(), "materialized table");
        self.tables.insert(handle, MemTable { rows, properties });
        handle
    }

    fn row_error(
        &mut self,
        operator: &'static str,
        key: Option<Key>,
        message: impl Into<String>,
    ) -> Result<()> {
        let message = message.into();
        debug!(operator, ?key, %message, "row error");
        if self.options.terminate_on_error {
            return Err(Error::engine(format!("{operator}: {message}")));
        }
        self.errors.push(RowError {
            operator,
            key,
            message,
        });
        Ok(())
    }

    fn row_errors(&mut self, operator: &'static str, errors: RowErrors) -> Result<()> {
        for (key, message) in errors {
            self.row_error(operator, key, message)?;
        }
        Ok(())
    }

    fn extract_all(key: &Key, value: &Value, paths: &[ColumnPath]) -> Result<Vec<Value>> {
        paths.iter().map(|p| p.extract(key, value)).collect()
    }

    /// Largest time value of a table, compared with the engine's value order.
    fn max_time(rows: &[(Key, Value)], time_path: &ColumnPath) -> Result<Option<Value>> {
        let mut max: Option<Value> = None;
        for (k, v) in rows {
            let t = time_path.extract(k, v)?;
            if t.is_none() || t.is_error() {
                continue;
            }
            if max.as_ref().is_none_or(|m| t > *m) {
                max = Some(t);
            }
        }
        Ok(max)
    }

    fn key_set(&self, table: TableHandle) -> Result<FxHashSet<Key>> {
        Ok(self.rows(table)?.iter().map(|(k, _)| *k).collect())
    }
}

impl Engine for MemEngine {
    fn static_table(
        &mut self,
        rows: Vec<(Key, Value)>,
        properties: TableProperties,
    ) -> Result<TableHandle> {
        let mut seen = FxHashSet::default();
        for (key, _) in &rows {
            if !seen.insert(*key) {
                return Err(Error::InvalidArgument(format!(
                    "duplicate key {key} in static table"
                )));
            }
        }
        Ok(self.emit(rows, properties))
    }

    fn table_properties(&self, table: TableHandle, path: &ColumnPath) -> Result<TableProperties> {
        let t = self.tables.get(&table).ok_or(Error::InvalidTableHandle)?;
        Ok(t.properties.subtree(path))
    }

    fn expression_table(
        &mut self,
        table: TableHandle,
        column_paths: &[ColumnPath],
        expressions: Vec<(EngineExpr, TableProperties)>,
        deterministic: bool,
    ) -> Result<TableHandle> {
        trace!(%table, columns = expressions.len(), deterministic, "expression_table");
        let rows = self.rows(table)?;
        let mut out = Vec::with_capacity(rows.len());
        for (key, value) in rows.iter() {
            let args = Self::extract_all(key, value, column_paths)?;
            let mut cells = Vec::with_capacity(expressions.len());
            for (expr, _) in &expressions {
                match eval::eval(expr, &args) {
                    Ok(v) => cells.push(v),
                    Err(message) => {
                        self.row_error("expression", Some(*key), message)?;
                        cells.push(Value::Error);
                    }
                }
            }
            out.push((*key, Value::from(cells)));
        }
        let properties = TableProperties::Table(expressions.into_iter().map(|(_, p)| p).collect());
        Ok(self.emit(out, properties))
    }

    fn filter_table(
        &mut self,
        table: TableHandle,
        path: &ColumnPath,
        properties: TableProperties,
    ) -> Result<TableHandle> {
        let rows = self.rows(table)?;
        let mut out = Vec::new();
        for (key, value) in rows.iter() {
            match path.extract(key, value)? {
                Value::Bool(true) => out.push((*key, value.clone())),
                Value::Bool(false) => {}
                Value::Error => self.row_error("filter", Some(*key), "error value in filter")?,
                other => self.row_error(
                    "filter",
                    Some(*key),
                    format!("filter predicate is {}, not Bool", other.kind_name()),
                )?,
            }
        }
        Ok(self.emit(out, properties))
    }

    fn forget(
        &mut self,
        table: TableHandle,
        threshold_path: &ColumnPath,
        time_path: &ColumnPath,
        mark_forgetting_records: bool,
        properties: TableProperties,
    ) -> Result<TableHandle> {
        trace!(%table, mark_forgetting_records, "forget");
        let rows = self.rows(table)?;
        let Some(now) = Self::max_time(&rows, time_path)? else {
            return Ok(self.emit_shared(rows, properties));
        };
        let mut out = Vec::new();
        for (key, value) in rows.iter() {
            if threshold_path.extract(key, value)? > now {
                out.push((*key, value.clone()));
            }
        }
        Ok(self.emit(out, properties))
    }

    fn forget_immediately(
        &mut self,
        table: TableHandle,
        properties: TableProperties,
    ) -> Result<TableHandle> {
        self.rows(table)?;
        Ok(self.emit(Vec::new(), properties))
    }

    fn filter_out_results_of_forgetting(
        &mut self,
        table: TableHandle,
        properties: TableProperties,
    ) -> Result<TableHandle> {
        let rows = self.rows(table)?;
        Ok(self.emit_shared(rows, properties))
    }

    fn freeze(
        &mut self,
        table: TableHandle,
        _threshold_path: &ColumnPath,
        _time_path: &ColumnPath,
        properties: TableProperties,
    ) -> Result<TableHandle> {
        let rows = self.rows(table)?;
        Ok(self.emit_shared(rows, properties))
    }

    fn buffer(
        &mut self,
        table: TableHandle,
        _threshold_path: &ColumnPath,
        _time_path: &ColumnPath,
        properties: TableProperties,
    ) -> Result<TableHandle> {
        let rows = self.rows(table)?;
        Ok(self.emit_shared(rows, properties))
    }

    fn join_tables(
        &mut self,
        left: TableHandle,
        right: TableHandle,
        left_paths: &[ColumnPath],
        right_paths: &[ColumnPath],
        options: JoinOptions,
        properties: TableProperties,
    ) -> Result<TableHandle> {
        if left_paths.len() != right_paths.len() {
            return Err(Error::InvalidArgument(format!(
                "join key arity mismatch: {} vs {}",
                left_paths.len(),
                right_paths.len()
            )));
        }
        trace!(%left, %right, ?options, "join_tables");
        let left_rows = self.rows(left)?;
        let right_rows = self.rows(right)?;
        let output = join::hash_join(&left_rows, &right_rows, left_paths, right_paths, options)?;
        self.row_errors("join", output.errors)?;
        Ok(self.emit(output.rows, properties))
    }

    fn group_by_table(
        &mut self,
        table: TableHandle,
        grouping_paths: &[ColumnPath],
        last_column_is_instance: bool,
        reducers: Vec<ReducerData>,
        set_id: bool,
        properties: TableProperties,
    ) -> Result<TableHandle> {
        trace!(%table, reducers = reducers.len(), set_id, last_column_is_instance, "group_by_table");
        let rows = self.rows(table)?;
        let mut order: Vec<Vec<Value>> = Vec::new();
        let mut groups: FxHashMap<Vec<Value>, Vec<usize>> = FxHashMap::default();
        for (idx, (key, value)) in rows.iter().enumerate() {
            let group = Self::extract_all(key, value, grouping_paths)?;
            let members = groups.entry(group.clone()).or_default();
            if members.is_empty() {
                order.push(group);
            }
            members.push(idx);
        }

        let mut out = Vec::with_capacity(order.len());
        for group in order {
            let output_key = if set_id {
                match group.first() {
                    Some(Value::Pointer(k)) if group.len() == 1 => *k,
                    _ => {
                        self.row_error(
                            "group_by",
                            None,
                            "set_id requires grouping by a single pointer column",
                        )?;
                        continue;
                    }
                }
            } else {
                Key::for_values(&group)
            };
            let members = groups.get(&group).map(Vec::as_slice).unwrap_or_default();
            let mut cells = Vec::with_capacity(reducers.len());
            for data in &reducers {
                let group_rows = members
                    .iter()
                    .map(|&idx| {
                        let (key, value) = &rows[idx];
                        Self::extract_all(key, value, &data.column_paths).map(|args| (*key, args))
                    })
                    .collect::<Result<Vec<_>>>()?;
                match reduce::reduce(&data.reducer, &group_rows, data.skip_errors) {
                    Ok(v) => cells.push(v),
                    Err(message) => {
                        self.row_error(
                            "group_by",
                            Some(output_key),
                            format!("{}: {message}", data.reducer.name()),
                        )?;
                        cells.push(Value::Error);
                    }
                }
            }
            out.push((output_key, Value::from(cells)));
        }
        Ok(self.emit(out, properties))
    }

    fn deduplicate(
        &mut self,
        table: TableHandle,
        instance_paths: &[ColumnPath],
        value_paths: &[ColumnPath],
        fold: StateFold,
        persistent_id: Option<&str>,
        properties: TableProperties,
    ) -> Result<TableHandle> {
        trace!(%table, ?persistent_id, "deduplicate");
        let rows = self.rows(table)?;
        let mut order: Vec<Vec<Value>> = Vec::new();
        let mut batches: FxHashMap<Vec<Value>, Vec<(Value, i64)>> = FxHashMap::default();
        for (key, value) in rows.iter() {
            let instance = Self::extract_all(key, value, instance_paths)?;
            let values = Self::extract_all(key, value, value_paths)?;
            let batch = batches.entry(instance.clone()).or_default();
            if batch.is_empty() {
                order.push(instance);
            }
            batch.push((Value::from(values), 1));
        }
        let mut out = Vec::new();
        for instance in order {
            let batch = batches.get(&instance).map(Vec::as_slice).unwrap_or_default();
            if let Some(state) = fold.apply(None, batch) {
                out.push((Key::for_values(&instance), state));
            }
        }
        Ok(self.emit(out, properties))
    }

    fn update_rows_table(
        &mut self,
        table: TableHandle,
        update: TableHandle,
        properties: TableProperties,
    ) -> Result<TableHandle> {
        let base = self.rows(table)?;
        let updates = self.rows(update)?;
        let updated: FxHashMap<Key, &Value> = updates.iter().map(|(k, v)| (*k, v)).collect();
        let mut out = Vec::with_capacity(base.len() + updates.len());
        let mut seen = FxHashSet::default();
        for (key, value) in base.iter() {
            seen.insert(*key);
            let value = updated.get(key).map_or_else(|| value.clone(), |v| (*v).clone());
            out.push((*key, value));
        }
        for (key, value) in updates.iter() {
            if !seen.contains(key) {
                out.push((*key, value.clone()));
            }
        }
        Ok(self.emit(out, properties))
    }

    fn update_cells_table(
        &mut self,
        table: TableHandle,
        update: TableHandle,
        column_paths: &[ColumnPath],
        update_paths: &[ColumnPath],
        properties: TableProperties,
    ) -> Result<TableHandle> {
        if column_paths.len() != update_paths.len() {
            return Err(Error::InvalidArgument(format!(
                "update_cells arity mismatch: {} vs {}",
                column_paths.len(),
                update_paths.len()
            )));
        }
        let base = self.rows(table)?;
        let updates = self.rows(update)?;
        let updated: FxHashMap<Key, &Value> = updates.iter().map(|(k, v)| (*k, v)).collect();
        let mut out = Vec::with_capacity(base.len());
        for (key, value) in base.iter() {
            let cells = match updated.get(key) {
                Some(update_row) => Self::extract_all(key, update_row, update_paths)?,
                None => Self::extract_all(key, value, column_paths)?,
            };
            let mut row = Vec::with_capacity(cells.len() + 1);
            row.push(value.clone());
            row.extend(cells);
            out.push((*key, Value::from(row)));
        }
        let base_keys: FxHashSet<Key> = base.iter().map(|(k, _)| *k).collect();
        for (key, _) in updates.iter() {
            if !base_keys.contains(key) {
                self.row_error("update_cells", Some(*key), "update for a key missing from the base table")?;
            }
        }
        Ok(self.emit(out, properties))
    }

    fn concat_tables(
        &mut self,
        tables: &[TableHandle],
        properties: TableProperties,
    ) -> Result<TableHandle> {
        let mut out = Vec::new();
        let mut seen = FxHashSet::default();
        for &table in tables {
            let rows = self.rows(table)?;
            for (key, value) in rows.iter() {
                if seen.insert(*key) {
                    out.push((*key, value.clone()));
                } else {
                    self.row_error("concat", Some(*key), "duplicate key in concatenation")?;
                }
            }
        }
        Ok(self.emit(out, properties))
    }

    fn flatten_table(
        &mut self,
        table: TableHandle,
        path: &ColumnPath,
        properties: TableProperties,
    ) -> Result<TableHandle> {
        let rows = self.rows(table)?;
        let mut out = Vec::new();
        for (key, value) in rows.iter() {
            let container = path.extract(key, value)?;
            let elements: Vec<Value> = match &container {
                Value::Tuple(items) => items.to_vec(),
                Value::String(s) => s.chars().map(|c| Value::from(c.to_string())).collect(),
                Value::Json(j) => match j.as_ref() {
                    serde_json::Value::Array(items) => {
                        items.iter().map(|i| Value::json(i.clone())).collect()
                    }
                    _ => {
                        self.row_error("flatten", Some(*key), "cannot flatten a non-array JSON value")?;
                        continue;
                    }
                },
                Value::Error => continue,
                other => {
                    self.row_error(
                        "flatten",
                        Some(*key),
                        format!("cannot flatten {}", other.kind_name()),
                    )?;
                    continue;
                }
            };
            for (i, element) in elements.into_iter().enumerate() {
                let new_key = Key::for_values(&[Value::Pointer(*key), Value::Int(i as i64)]);
                out.push((new_key, Value::from(vec![value.clone(), element])));
            }
        }
        Ok(self.emit(out, properties))
    }

    fn sort_table(
        &mut self,
        table: TableHandle,
        key_path: &ColumnPath,
        instance_path: &ColumnPath,
        properties: TableProperties,
    ) -> Result<TableHandle> {
        let rows = self.rows(table)?;
        let mut entries = Vec::with_capacity(rows.len());
        for (key, value) in rows.iter() {
            let instance = instance_path.extract(key, value)?;
            let sort_key = key_path.extract(key, value)?;
            entries.push((instance, sort_key, *key));
        }
        entries.sort();
        let mut out = Vec::with_capacity(entries.len());
        for (i, (instance, _, key)) in entries.iter().enumerate() {
            let prev = i
                .checked_sub(1)
                .map(|p| &entries[p])
                .filter(|e| e.0 == *instance)
                .map_or(Value::None, |e| Value::Pointer(e.2));
            let next = entries
                .get(i + 1)
                .filter(|e| e.0 == *instance)
                .map_or(Value::None, |e| Value::Pointer(e.2));
            out.push((*key, Value::from(vec![prev, next])));
        }
        Ok(self.emit(out, properties))
    }

    fn ix_table(
        &mut self,
        to_ix: TableHandle,
        key_table: TableHandle,
        key_path: &ColumnPath,
        optional: bool,
        strict: bool,
        properties: TableProperties,
    ) -> Result<TableHandle> {
        trace!(%to_ix, %key_table, optional, strict, "ix_table");
        let source = self.rows(to_ix)?;
        let lookup: FxHashMap<Key, &Value> = source.iter().map(|(k, v)| (*k, v)).collect();
        let keys = self.rows(key_table)?;
        let mut out = Vec::with_capacity(keys.len());
        for (key, value) in keys.iter() {
            let pointer = key_path.extract(key, value)?;
            let indexed = match pointer {
                Value::Pointer(p) => match lookup.get(&p) {
                    Some(row) => (*row).clone(),
                    None if strict => {
                        self.row_error("ix", Some(*key), format!("key {p} missing in indexed table"))?;
                        Value::Error
                    }
                    None => continue,
                },
                Value::None if optional => Value::None,
                Value::Error => Value::Error,
                other => {
                    self.row_error(
                        "ix",
                        Some(*key),
                        format!("ix key is {}, not Pointer", other.kind_name()),
                    )?;
                    Value::Error
                }
            };
            out.push((*key, Value::from(vec![value.clone(), indexed])));
        }
        Ok(self.emit(out, properties))
    }

    fn restrict_table(
        &mut self,
        table: TableHandle,
        universe_table: TableHandle,
        properties: TableProperties,
    ) -> Result<TableHandle> {
        let keep = self.key_set(universe_table)?;
        let rows = self.rows(table)?;
        let out = rows.iter().filter(|(k, _)| keep.contains(k)).cloned().collect();
        Ok(self.emit(out, properties))
    }

    fn reindex_table(
        &mut self,
        table: TableHandle,
        pointer_path: &ColumnPath,
        properties: TableProperties,
    ) -> Result<TableHandle> {
        let rows = self.rows(table)?;
        let mut out = Vec::with_capacity(rows.len());
        let mut seen = FxHashSet::default();
        for (key, value) in rows.iter() {
            match pointer_path.extract(key, value)? {
                Value::Pointer(new_key) if seen.insert(new_key) => {
                    out.push((new_key, value.clone()));
                }
                Value::Pointer(new_key) => {
                    self.row_error("reindex", Some(*key), format!("duplicate key {new_key}"))?;
                }
                other => self.row_error(
                    "reindex",
                    Some(*key),
                    format!("reindex key is {}, not Pointer", other.kind_name()),
                )?,
            }
        }
        Ok(self.emit(out, properties))
    }

    fn intersect_tables(
        &mut self,
        table: TableHandle,
        others: &[TableHandle],
        properties: TableProperties,
    ) -> Result<TableHandle> {
        let sets = others
            .iter()
            .map(|&t| self.key_set(t))
            .collect::<Result<Vec<_>>>()?;
        let rows = self.rows(table)?;
        let out = rows
            .iter()
            .filter(|(k, _)| sets.iter().all(|s| s.contains(k)))
            .cloned()
            .collect();
        Ok(self.emit(out, properties))
    }

    fn subtract_table(
        &mut self,
        left: TableHandle,
        right: TableHandle,
        properties: TableProperties,
    ) -> Result<TableHandle> {
        let drop = self.key_set(right)?;
        let rows = self.rows(left)?;
        let out = rows.iter().filter(|(k, _)| !drop.contains(k)).cloned().collect();
        Ok(self.emit(out, properties))
    }

    fn override_table_universe(
        &mut self,
        table: TableHandle,
        universe_table: TableHandle,
        properties: TableProperties,
    ) -> Result<TableHandle> {
        self.rows(universe_table)?;
        let rows = self.rows(table)?;
        Ok(self.emit_shared(rows, properties))
    }

    fn zip_tables(
        &mut self,
        table: TableHandle,
        others: &[TableHandle],
        properties: TableProperties,
    ) -> Result<TableHandle> {
        let lookups = others
            .iter()
            .map(|&t| {
                self.rows(t)
                    .map(|rows| rows.iter().cloned().collect::<FxHashMap<Key, Value>>())
            })
            .collect::<Result<Vec<_>>>()?;
        let rows = self.rows(table)?;
        let mut out = Vec::with_capacity(rows.len());
        for (key, value) in rows.iter() {
            let mut parts = Vec::with_capacity(others.len() + 1);
            parts.push(value.clone());
            for lookup in &lookups {
                match lookup.get(key) {
                    Some(v) => parts.push(v.clone()),
                    None => {
                        self.row_error("zip", Some(*key), "key missing from zipped table")?;
                        parts.push(Value::Error);
                    }
                }
            }
            out.push((*key, Value::from(parts)));
        }
        Ok(self.emit(out, properties))
    }

    fn flatten_table_storage(
        &mut self,
        table: TableHandle,
        column_paths: &[ColumnPath],
    ) -> Result<TableHandle> {
        let rows = self.rows(table)?;
        let source_properties = self
            .tables
            .get(&table)
            .map(|t| t.properties.clone())
            .unwrap_or_default();
        let properties = TableProperties::Table(
            column_paths
                .iter()
                .map(|p| source_properties.subtree(p))
                .collect(),
        );
        let out = rows
            .iter()
            .map(|(key, value)| {
                Self::extract_all(key, value, column_paths).map(|cells| (*key, Value::from(cells)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(self.emit(out, properties))
    }

    fn remove_errors_from_table(
        &mut self,
        table: TableHandle,
        column_paths: &[ColumnPath],
        properties: TableProperties,
    ) -> Result<TableHandle> {
        let rows = self.rows(table)?;
        let mut out = Vec::with_capacity(rows.len());
        for (key, value) in rows.iter() {
            let cells = Self::extract_all(key, value, column_paths)?;
            if !cells.iter().any(Value::is_error) {
                out.push((*key, value.clone()));
            }
        }
        Ok(self.emit(out, properties))
    }

    fn remove_retractions_from_table(
        &mut self,
        table: TableHandle,
        properties: TableProperties,
    ) -> Result<TableHandle> {
        let rows = self.rows(table)?;
        Ok(self.emit_shared(rows, properties))
    }

    fn gradual_broadcast(
        &mut self,
        table: TableHandle,
        threshold_table: TableHandle,
        lower_path: &ColumnPath,
        value_path: &ColumnPath,
        upper_path: &ColumnPath,
        properties: TableProperties,
    ) -> Result<TableHandle> {
        let thresholds = self.rows(threshold_table)?;
        let threshold = match thresholds.first() {
            Some((key, row)) => {
                let read = |path: &ColumnPath| -> Result<Option<f64>> {
                    Ok(path.extract(key, row)?.as_float())
                };
                match (read(lower_path)?, read(value_path)?, read(upper_path)?) {
                    (Some(lower), Some(level), Some(upper)) => Some((lower, level, upper)),
                    _ => {
                        self.row_error(
                            "gradual_broadcast",
                            Some(*key),
                            "threshold row is not numeric",
                        )?;
                        None
                    }
                }
            }
            None => None,
        };
        if thresholds.len() > 1 {
            self.row_error(
                "gradual_broadcast",
                None,
                "threshold table has more than one row; using the first",
            )?;
        }
        let rows = self.rows(table)?;
        let out = rows
            .iter()
            .map(|(key, value)| {
                let cell = match threshold {
                    Some((lower, level, upper)) => {
                        let cut = lower + key.unit_interval() * (upper - lower);
                        Value::Float(if level > cut { upper } else { lower })
                    }
                    None => Value::None,
                };
                (*key, Value::from(vec![value.clone(), cell]))
            })
            .collect();
        Ok(self.emit(out, properties))
    }

    fn use_external_index_as_of_now(
        &mut self,
        index: ExternalIndexData,
        query: ExternalIndexQuery,
        properties: TableProperties,
        factory: &dyn ExternalIndexFactory,
    ) -> Result<TableHandle> {
        let mut instance = factory.make_instance()?;
        let data_rows = self.rows(index.table)?;
        for (key, value) in data_rows.iter() {
            let data = index.data_path.extract(key, value)?;
            let filter_data = index
                .filter_data_path
                .as_ref()
                .map(|p| p.extract(key, value))
                .transpose()?;
            if let Err(e) = instance.add(*key, &data, filter_data.as_ref()) {
                self.row_error("external_index", Some(*key), e.to_string())?;
            }
        }

        let query_rows = self.rows(query.table)?;
        let mut out = Vec::with_capacity(query_rows.len());
        for (key, value) in query_rows.iter() {
            let query_value = query.query_path.extract(key, value)?;
            let limit = match &query.limit_path {
                Some(p) => p
                    .extract(key, value)?
                    .as_int()
                    .and_then(|l| usize::try_from(l).ok()),
                None => None,
            };
            let filter = query
                .filter_path
                .as_ref()
                .map(|p| p.extract(key, value))
                .transpose()?;
            let cell = match instance.search(&query_value, limit, filter.as_ref()) {
                Ok(matches) => Value::from_tuple(matches.into_iter().map(|(k, score)| {
                    Value::from(vec![Value::Pointer(k), Value::Float(score)])
                })),
                Err(e) => {
                    self.row_error("external_index", Some(*key), e.to_string())?;
                    Value::Error
                }
            };
            out.push((*key, Value::from(vec![value.clone(), cell])));
        }
        Ok(self.emit(out, properties))
    }

    fn async_apply_table(
        &mut self,
        table: TableHandle,
        column_paths: &[ColumnPath],
        func: CallableRef,
        propagate_none: bool,
        deterministic: bool,
        properties: TableProperties,
    ) -> Result<TableHandle> {
        trace!(%table, func = func.name(), deterministic, "async_apply_table");
        let rows = self.rows(table)?;
        let mut out = Vec::with_capacity(rows.len());
        for (key, value) in rows.iter() {
            let args = Self::extract_all(key, value, column_paths)?;
            let result = if args.iter().any(Value::is_error) {
                Value::Error
            } else if propagate_none && args.iter().any(Value::is_none) {
                Value::None
            } else {
                match func.call(&args) {
                    Ok(v) => v,
                    Err(message) => {
                        self.row_error("async_apply", Some(*key), format!("{} failed: {message}", func.name()))?;
                        Value::Error
                    }
                }
            };
            out.push((*key, result));
        }
        Ok(self.emit(out, properties))
    }
}
