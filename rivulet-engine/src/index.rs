//! Pluggable external index used by `use_external_index_as_of_now`.

use rivulet_result::Result;
use rivulet_types::{ColumnPath, Key, Value};

use crate::engine::TableHandle;

/// A mutable index answering nearest-match queries.
///
/// Queries are answered against the state at query time only; later index
/// changes do not revisit earlier answers.
pub trait ExternalIndex: Send {
    fn add(&mut self, key: Key, data: &Value, filter_data: Option<&Value>) -> Result<()>;

    fn remove(&mut self, key: Key) -> Result<()>;

    /// Matching keys with their scores, best first.
    fn search(
        &self,
        query: &Value,
        limit: Option<usize>,
        filter: Option<&Value>,
    ) -> Result<Vec<(Key, f64)>>;
}

pub trait ExternalIndexFactory {
    fn make_instance(&self) -> Result<Box<dyn ExternalIndex>>;
}

/// The index-population side.
#[derive(Clone, Debug)]
pub struct ExternalIndexData {
    pub table: TableHandle,
    pub data_path: ColumnPath,
    pub filter_data_path: Option<ColumnPath>,
}

/// The query side.
#[derive(Clone, Debug)]
pub struct ExternalIndexQuery {
    pub table: TableHandle,
    pub query_path: ColumnPath,
    pub limit_path: Option<ColumnPath>,
    pub filter_path: Option<ColumnPath>,
}
