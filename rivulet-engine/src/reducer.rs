use rivulet_types::ColumnPath;

use crate::callable::StateFold;

/// Engine-level reducer, already specialized by argument type.
#[derive(Clone, Debug)]
pub enum EngineReducer {
    Count,
    IntSum,
    FloatSum,
    /// Element-wise sum of equal-length tuples.
    ArraySum,
    /// The group's single distinct value; more than one is a row error.
    Unique,
    Min,
    /// Arguments: `[value, id]`.
    ArgMin,
    Max,
    /// Arguments: `[value, id]`.
    ArgMax,
    SortedTuple {
        skip_nones: bool,
    },
    /// Arguments: `[value, sort_key]`.
    Tuple {
        skip_nones: bool,
    },
    /// An arbitrary but deterministic member of the group.
    Any,
    /// User fold over `(row, diff)` batches; each row is the tuple of arguments.
    Stateful {
        combine: StateFold,
    },
}

impl EngineReducer {
    pub fn name(&self) -> &'static str {
        match self {
            EngineReducer::Count => "count",
            EngineReducer::IntSum => "int_sum",
            EngineReducer::FloatSum => "float_sum",
            EngineReducer::ArraySum => "array_sum",
            EngineReducer::Unique => "unique",
            EngineReducer::Min => "min",
            EngineReducer::ArgMin => "argmin",
            EngineReducer::Max => "max",
            EngineReducer::ArgMax => "argmax",
            EngineReducer::SortedTuple { .. } => "sorted_tuple",
            EngineReducer::Tuple { .. } => "tuple",
            EngineReducer::Any => "any",
            EngineReducer::Stateful { .. } => "stateful",
        }
    }
}

/// One reducer column of a `group_by_table` call.
#[derive(Clone, Debug)]
pub struct ReducerData {
    pub reducer: EngineReducer,
    pub skip_errors: bool,
    pub column_paths: Vec<ColumnPath>,
}

impl ReducerData {
    pub fn new(reducer: EngineReducer, column_paths: Vec<ColumnPath>) -> Self {
        Self {
            reducer,
            skip_errors: false,
            column_paths,
        }
    }

    pub fn with_skip_errors(mut self, skip_errors: bool) -> Self {
        self.skip_errors = skip_errors;
        self
    }
}
