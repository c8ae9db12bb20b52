//! Deduplication with a caller-supplied acceptor.

use rivulet_engine::{StateFold, TableHandle};
use rivulet_plan::{Acceptor, DeduplicateContext, Storage};
use rivulet_result::Result;
use rivulet_types::{ColumnPath, Value};

use crate::ctx::LowerCtx;
use crate::evaluators::gating::reference_target;

/// Per-instance fold over `[value, aux..]` rows.
///
/// Retractions and rows whose value is an error are ignored. An insertion
/// replaces the retained row when nothing is retained yet, when the retained
/// value is `None`, or when the acceptor prefers it over the retained value.
pub fn dedup_fold(acceptor: Acceptor) -> StateFold {
    StateFold::new(move |state, batch| {
        let mut state = state;
        for (row, diff) in batch {
            if *diff <= 0 {
                continue;
            }
            let Some(candidate) = row.as_tuple().and_then(<[Value]>::first) else {
                continue;
            };
            if candidate.is_error() {
                continue;
            }
            let current = state
                .as_ref()
                .and_then(Value::as_tuple)
                .and_then(<[Value]>::first);
            let replace = match current {
                None => true,
                Some(current) if current.is_none() => true,
                Some(current) => acceptor(candidate, current),
            };
            if replace {
                state = Some(row.clone());
            }
        }
        state
    })
}

/// The retained row holds the deduplicated value first, then one cell per
/// output column.
///
/// # Panics
///
/// If an output column is not a reference into the input.
pub fn deduplicate(
    ctx: &mut LowerCtx<'_>,
    context: &DeduplicateContext,
    output: &Storage,
) -> Result<TableHandle> {
    let input = ctx.storage(context.input);
    let instance_paths: Vec<ColumnPath> = context
        .instance
        .iter()
        .map(|c| input.get_path(c).clone())
        .collect();
    let mut value_paths = vec![input.get_path(&context.value).clone()];
    value_paths.extend(
        output
            .columns()
            .iter()
            .map(|c| input.get_path(reference_target(c)).clone()),
    );

    let properties = ctx.table_properties(output);
    let table = ctx.table(input.universe());
    ctx.engine.deduplicate(
        table,
        &instance_paths,
        &value_paths,
        dedup_fold(context.acceptor.clone()),
        context.persistent_id.as_deref(),
        properties,
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use rand::Rng;
    use rivulet_test_utils::seeded_rng;

    fn prefer_larger() -> Acceptor {
        Arc::new(|candidate: &Value, current: &Value| candidate > current)
    }

    fn row(v: i64) -> Value {
        Value::from_tuple([Value::Int(v)])
    }

    #[test]
    fn acceptor_decides_replacement() {
        let fold = dedup_fold(prefer_larger());
        let state = fold.apply(None, &[(row(5), 1), (row(3), 1), (row(7), 1)]);
        assert_eq!(state, Some(row(7)));
    }

    #[test]
    fn retraction_of_the_retained_value_is_ignored() {
        let fold = dedup_fold(prefer_larger());
        let state = fold.apply(None, &[(row(5), 1), (row(3), 1), (row(5), -1)]);
        assert_eq!(state, Some(row(5)));
    }

    #[test]
    fn a_retained_none_is_always_replaced() {
        let never: Acceptor = Arc::new(|_: &Value, _: &Value| false);
        let fold = dedup_fold(never);
        let none_row = Value::from_tuple([Value::None]);
        let state = fold.apply(None, &[(none_row.clone(), 1)]);
        assert_eq!(state, Some(none_row));
        let state = fold.apply(state, &[(row(3), 1), (row(9), 1)]);
        assert_eq!(state, Some(row(3)));
    }

    #[test]
    fn skipped_rows_never_change_the_state() {
        let fold = dedup_fold(prefer_larger());
        let mut rng = seeded_rng(0x5eed);
        for _ in 0..200 {
            let initial = rng.random_bool(0.5).then(|| row(rng.random_range(-50..50)));
            let batch: Vec<(Value, i64)> = (0..rng.random_range(1..8))
                .map(|_| {
                    if rng.random_bool(0.5) {
                        (row(rng.random_range(-50..50)), rng.random_range(-3..=0))
                    } else {
                        (Value::from_tuple([Value::Error]), rng.random_range(1..3))
                    }
                })
                .collect();
            assert_eq!(fold.apply(initial.clone(), &batch), initial);
        }
    }
}
