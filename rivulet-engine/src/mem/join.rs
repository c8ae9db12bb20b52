//! Hash join over materialized rows.
//!
//! Builds a hash table on the right side keyed by the join values and looks up
//! every left row in it. Outer variants come from the ear flags only.

use rivulet_result::Result;
use rivulet_types::{ColumnPath, Key, Value};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::engine::JoinOptions;

use super::RowErrors;

pub(crate) struct JoinOutput {
    pub rows: Vec<(Key, Value)>,
    pub errors: RowErrors,
}

fn join_values(key: &Key, value: &Value, paths: &[ColumnPath]) -> Result<Vec<Value>> {
    paths.iter().map(|p| p.extract(key, value)).collect()
}

fn joined_row(left: Option<(&Key, &Value)>, right: Option<(&Key, &Value)>) -> Value {
    let (left_id, left_row) = match left {
        Some((k, v)) => (Value::Pointer(*k), v.clone()),
        None => (Value::None, Value::None),
    };
    let (right_id, right_row) = match right {
        Some((k, v)) => (Value::Pointer(*k), v.clone()),
        None => (Value::None, Value::None),
    };
    Value::from(vec![left_id, left_row, right_id, right_row])
}

pub(crate) fn hash_join(
    left: &[(Key, Value)],
    right: &[(Key, Value)],
    left_paths: &[ColumnPath],
    right_paths: &[ColumnPath],
    options: JoinOptions,
) -> Result<JoinOutput> {
    let mut errors = RowErrors::new();

    let mut build: FxHashMap<Vec<Value>, Vec<usize>> = FxHashMap::default();
    for (idx, (key, value)) in right.iter().enumerate() {
        let values = join_values(key, value, right_paths)?;
        if values.iter().any(Value::is_error) {
            errors.push((Some(*key), "error value in join key".to_string()));
            continue;
        }
        build.entry(values).or_default().push(idx);
    }

    let mut rows = Vec::new();
    let mut matched_right: FxHashSet<usize> = FxHashSet::default();
    let mut emitted: FxHashSet<Key> = FxHashSet::default();
    let mut emit = |key: Key, value: Value, errors: &mut RowErrors| {
        if emitted.insert(key) {
            rows.push((key, value));
        } else {
            errors.push((Some(key), "duplicate key in join output".to_string()));
        }
    };

    for (left_key, left_value) in left {
        let values = join_values(left_key, left_value, left_paths)?;
        if values.iter().any(Value::is_error) {
            errors.push((Some(*left_key), "error value in join key".to_string()));
            continue;
        }
        match build.get(&values) {
            Some(matches) => {
                for &idx in matches {
                    matched_right.insert(idx);
                    let (right_key, right_value) = &right[idx];
                    let key = if options.assign_id {
                        *left_key
                    } else {
                        Key::for_values(&[Value::Pointer(*left_key), Value::Pointer(*right_key)])
                    };
                    let value =
                        joined_row(Some((left_key, left_value)), Some((right_key, right_value)));
                    emit(key, value, &mut errors);
                }
            }
            None if options.left_ear => {
                let key = if options.assign_id {
                    *left_key
                } else {
                    Key::for_values(&[Value::Pointer(*left_key), Value::None])
                };
                emit(key, joined_row(Some((left_key, left_value)), None), &mut errors);
            }
            None => {}
        }
    }

    if options.right_ear {
        for (idx, (right_key, right_value)) in right.iter().enumerate() {
            if matched_right.contains(&idx) {
                continue;
            }
            let key = Key::for_values(&[Value::None, Value::Pointer(*right_key)]);
            emit(key, joined_row(None, Some((right_key, right_value))), &mut errors);
        }
    }

    Ok(JoinOutput { rows, errors })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[(u128, i64)]) -> Vec<(Key, Value)> {
        rows.iter()
            .map(|&(k, v)| (Key(k), Value::from(vec![Value::Int(v)])))
            .collect()
    }

    #[test]
    fn inner_and_outer_variants() {
        let left = table(&[(1, 10), (2, 20)]);
        let right = table(&[(7, 10)]);
        let paths = [ColumnPath::new([0])];

        let inner = hash_join(&left, &right, &paths, &paths, JoinOptions::inner()).expect("join");
        assert_eq!(inner.rows.len(), 1);

        let outer = hash_join(&left, &right, &paths, &paths, JoinOptions::outer()).expect("join");
        assert_eq!(outer.rows.len(), 2);
        let unmatched = &outer.rows[1].1;
        assert_eq!(
            ColumnPath::new([2]).extract_from_value(unmatched).expect("right id"),
            Value::None
        );
    }

    #[test]
    fn assign_id_reuses_left_key() {
        let left = table(&[(1, 10)]);
        let right = table(&[(7, 10)]);
        let paths = [ColumnPath::new([0])];
        let out = hash_join(
            &left,
            &right,
            &paths,
            &paths,
            JoinOptions::inner().with_assign_id(true),
        )
        .expect("join");
        assert_eq!(out.rows[0].0, Key(1));
    }

    #[test]
    fn assign_id_with_many_matches_reports_duplicates() {
        let left = table(&[(1, 10)]);
        let right = table(&[(7, 10), (8, 10)]);
        let paths = [ColumnPath::new([0])];
        let out = hash_join(
            &left,
            &right,
            &paths,
            &paths,
            JoinOptions::inner().with_assign_id(true),
        )
        .expect("join");
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.errors.len(), 1);
    }
}
