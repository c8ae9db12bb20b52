//! Reducer kinds usable in grouped contexts.

use std::fmt;

use rivulet_engine::{EngineReducer, StateFold};
use rivulet_result::{Error, Result};
use rivulet_types::DType;

/// Extra argument a reducer takes from its grouped context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextArgument {
    None,
    /// The id of the row inside the group.
    InnerId,
    /// The context's sort key if it has one, otherwise the inner id.
    SortKeyOrId,
}

#[derive(Clone)]
pub enum ReducerKind {
    Count,
    Sum,
    Min,
    Max,
    ArgMin,
    ArgMax,
    /// Value that is constant across the group.
    Unique,
    Any,
    Tuple { skip_nones: bool },
    SortedTuple { skip_nones: bool },
    Stateful { combine: StateFold, dtype: DType },
}

impl ReducerKind {
    pub fn name(&self) -> &'static str {
        match self {
            ReducerKind::Count => "count",
            ReducerKind::Sum => "sum",
            ReducerKind::Min => "min",
            ReducerKind::Max => "max",
            ReducerKind::ArgMin => "argmin",
            ReducerKind::ArgMax => "argmax",
            ReducerKind::Unique => "unique",
            ReducerKind::Any => "any",
            ReducerKind::Tuple { .. } => "tuple",
            ReducerKind::SortedTuple { .. } => "sorted_tuple",
            ReducerKind::Stateful { .. } => "stateful",
        }
    }

    pub fn return_type(&self, args: &[DType]) -> DType {
        let first = args.first().cloned().unwrap_or(DType::Any);
        match self {
            ReducerKind::Count => DType::Int,
            ReducerKind::ArgMin | ReducerKind::ArgMax => DType::Pointer,
            ReducerKind::Sum
            | ReducerKind::Min
            | ReducerKind::Max
            | ReducerKind::Unique
            | ReducerKind::Any => first,
            ReducerKind::Tuple { skip_nones } | ReducerKind::SortedTuple { skip_nones } => {
                if *skip_nones {
                    DType::list(first.unoptionalize().clone())
                } else {
                    DType::list(first)
                }
            }
            ReducerKind::Stateful { dtype, .. } => dtype.clone(),
        }
    }

    pub fn context_argument(&self) -> ContextArgument {
        match self {
            ReducerKind::ArgMin | ReducerKind::ArgMax => ContextArgument::InnerId,
            ReducerKind::Tuple { .. } => ContextArgument::SortKeyOrId,
            _ => ContextArgument::None,
        }
    }

    /// Pick the engine implementation for the given static argument types.
    pub fn engine_reducer(&self, args: &[DType]) -> Result<EngineReducer> {
        Ok(match self {
            ReducerKind::Count => EngineReducer::Count,
            ReducerKind::Sum => {
                let arg = args
                    .first()
                    .ok_or_else(|| Error::invalid_expression("sum needs an argument"))?;
                match arg.unoptionalize() {
                    DType::Int => EngineReducer::IntSum,
                    DType::Float => EngineReducer::FloatSum,
                    DType::List(_) | DType::Tuple(_) => EngineReducer::ArraySum,
                    other => {
                        return Err(Error::type_error(format!("cannot sum values of type {other}")));
                    }
                }
            }
            ReducerKind::Min => EngineReducer::Min,
            ReducerKind::Max => EngineReducer::Max,
            ReducerKind::ArgMin => EngineReducer::ArgMin,
            ReducerKind::ArgMax => EngineReducer::ArgMax,
            ReducerKind::Unique => EngineReducer::Unique,
            ReducerKind::Any => EngineReducer::Any,
            ReducerKind::Tuple { skip_nones } => EngineReducer::Tuple {
                skip_nones: *skip_nones,
            },
            ReducerKind::SortedTuple { skip_nones } => EngineReducer::SortedTuple {
                skip_nones: *skip_nones,
            },
            ReducerKind::Stateful { combine, .. } => EngineReducer::Stateful {
                combine: combine.clone(),
            },
        })
    }
}

impl fmt::Debug for ReducerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
