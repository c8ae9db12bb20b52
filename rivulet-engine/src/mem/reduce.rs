//! Group reducers.

use std::cmp::Ordering;

use rivulet_types::{Key, Value};

use crate::reducer::EngineReducer;

/// One group member: its key and the reducer's argument values.
pub(crate) type GroupRow = (Key, Vec<Value>);

fn numeric_cmp(a: &Value, b: &Value) -> Ordering {
    match (a.as_float(), b.as_float()) {
        (Some(x), Some(y)) if std::mem::discriminant(a) != std::mem::discriminant(b) => {
            x.total_cmp(&y)
        }
        _ => a.cmp(b),
    }
}

fn first_arg(args: &[Value]) -> Result<&Value, String> {
    args.first()
        .ok_or_else(|| "reducer expects at least one argument".to_string())
}

fn second_arg(args: &[Value]) -> Result<&Value, String> {
    args.get(1)
        .ok_or_else(|| "reducer expects two arguments".to_string())
}

/// Reduce one group.
///
/// `Ok(Value::Error)` means an error value flowed in; `Err` is a new row
/// error for the group.
pub(crate) fn reduce(
    reducer: &EngineReducer,
    rows: &[GroupRow],
    skip_errors: bool,
) -> Result<Value, String> {
    let has_error = |(_, args): &&GroupRow| args.iter().any(Value::is_error);
    if !skip_errors && rows.iter().any(|r| has_error(&r)) {
        return Ok(Value::Error);
    }
    let rows: Vec<&GroupRow> = rows.iter().filter(|r| !has_error(r)).collect();

    match reducer {
        EngineReducer::Count => Ok(Value::Int(rows.len() as i64)),
        EngineReducer::IntSum => {
            let mut acc: i64 = 0;
            for (_, args) in &rows {
                let v = first_arg(args)?;
                let i = v
                    .as_int()
                    .ok_or_else(|| format!("int_sum got {}", v.kind_name()))?;
                acc = acc.checked_add(i).ok_or_else(|| "integer overflow".to_string())?;
            }
            Ok(Value::Int(acc))
        }
        EngineReducer::FloatSum => {
            let mut acc = 0.0;
            for (_, args) in &rows {
                let v = first_arg(args)?;
                acc += v
                    .as_float()
                    .ok_or_else(|| format!("float_sum got {}", v.kind_name()))?;
            }
            Ok(Value::Float(acc))
        }
        EngineReducer::ArraySum => array_sum(&rows),
        EngineReducer::Unique => {
            let mut distinct: Option<&Value> = None;
            for (_, args) in &rows {
                let v = first_arg(args)?;
                match distinct {
                    None => distinct = Some(v),
                    Some(d) if d == v => {}
                    Some(d) => {
                        return Err(format!("more than one distinct value in group: {d} and {v}"));
                    }
                }
            }
            Ok(distinct.cloned().unwrap_or(Value::None))
        }
        EngineReducer::Min | EngineReducer::Max => {
            let want = if matches!(reducer, EngineReducer::Min) {
                Ordering::Less
            } else {
                Ordering::Greater
            };
            let mut best: Option<&Value> = None;
            for (_, args) in &rows {
                let v = first_arg(args)?;
                if best.is_none_or(|b| numeric_cmp(v, b) == want) {
                    best = Some(v);
                }
            }
            Ok(best.cloned().unwrap_or(Value::None))
        }
        EngineReducer::ArgMin | EngineReducer::ArgMax => {
            let want = if matches!(reducer, EngineReducer::ArgMin) {
                Ordering::Less
            } else {
                Ordering::Greater
            };
            let mut best: Option<(&Value, &Value)> = None;
            for (_, args) in &rows {
                let v = first_arg(args)?;
                let id = second_arg(args)?;
                let better = match best {
                    None => true,
                    Some((bv, bid)) => match numeric_cmp(v, bv) {
                        Ordering::Equal => id < bid,
                        ord => ord == want,
                    },
                };
                if better {
                    best = Some((v, id));
                }
            }
            Ok(best.map(|(_, id)| id.clone()).unwrap_or(Value::None))
        }
        EngineReducer::SortedTuple { skip_nones } => {
            let mut values = Vec::with_capacity(rows.len());
            for (_, args) in &rows {
                let v = first_arg(args)?;
                if !(*skip_nones && v.is_none()) {
                    values.push(v.clone());
                }
            }
            values.sort_by(numeric_cmp);
            Ok(Value::from(values))
        }
        EngineReducer::Tuple { skip_nones } => {
            let mut pairs = Vec::with_capacity(rows.len());
            for (key, args) in &rows {
                let v = first_arg(args)?;
                let sort_key = args.get(1).cloned().unwrap_or(Value::Pointer(*key));
                if !(*skip_nones && v.is_none()) {
                    pairs.push((sort_key, v.clone()));
                }
            }
            pairs.sort_by(|a, b| a.0.cmp(&b.0));
            Ok(Value::from_tuple(pairs.into_iter().map(|(_, v)| v)))
        }
        EngineReducer::Any => {
            let chosen = rows.iter().min_by_key(|(key, _)| *key);
            match chosen {
                Some((_, args)) => first_arg(args).cloned(),
                None => Ok(Value::None),
            }
        }
        EngineReducer::Stateful { combine } => {
            let batch: Vec<(Value, i64)> = rows
                .iter()
                .map(|(_, args)| (Value::from(args.clone()), 1))
                .collect();
            Ok(combine.apply(None, &batch).unwrap_or(Value::None))
        }
    }
}

fn array_sum(rows: &[&GroupRow]) -> Result<Value, String> {
    let mut acc: Option<Vec<Value>> = None;
    for (_, args) in rows {
        let v = first_arg(args)?;
        let items = v
            .as_tuple()
            .ok_or_else(|| format!("array_sum got {}", v.kind_name()))?;
        match acc.as_mut() {
            None => acc = Some(items.to_vec()),
            Some(sum) => {
                if sum.len() != items.len() {
                    return Err(format!(
                        "array_sum over arrays of different lengths: {} and {}",
                        sum.len(),
                        items.len()
                    ));
                }
                for (s, x) in sum.iter_mut().zip(items) {
                    *s = match (&*s, x) {
                        (Value::Int(a), Value::Int(b)) => Value::Int(
                            a.checked_add(*b)
                                .ok_or_else(|| "integer overflow".to_string())?,
                        ),
                        (a, b) => match (a.as_float(), b.as_float()) {
                            (Some(a), Some(b)) => Value::Float(a + b),
                            _ => return Err(format!("array_sum got {}", b.kind_name())),
                        },
                    };
                }
            }
        }
    }
    Ok(acc.map(Value::from).unwrap_or(Value::None))
}
