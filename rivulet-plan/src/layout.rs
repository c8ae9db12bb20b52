//! Output storages for the row layouts engine primitives produce.
//!
//! Planners use these to describe where an operator's columns end up; the
//! layouts mirror the row shapes documented on the `Engine` trait.

use rivulet_expr::{Column, Universe};
use rivulet_types::ColumnPath;

use crate::storage::Storage;

/// Same row, new universe (filter, forget, restrict, reindex, ...).
pub fn passthrough(universe: Universe, input: &Storage) -> Storage {
    input.rebased(universe)
}

/// Output of a rowwise pass.
///
/// With `previous`, the whole previous row is kept at position 0 and the
/// new columns follow; without it the row holds only the new columns.
pub fn rowwise(universe: Universe, previous: Option<&Storage>, new_columns: &[Column]) -> Storage {
    match previous {
        Some(previous) => {
            let new = Storage::flat_from(universe, new_columns.iter().cloned(), 1);
            let mut entries: Vec<(Column, ColumnPath)> = previous
                .iter()
                .map(|(c, p)| (c.clone(), p.prefixed(0)))
                .collect();
            entries.extend(new.iter().map(|(c, p)| (c.clone(), p.clone())));
            Storage::new(universe, entries)
        }
        None => Storage::flat(universe, new_columns.iter().cloned()).with_only_new_columns(true),
    }
}

/// `(row, c0, c1, ...)`: the input row followed by new cells
/// (flatten, update cells, gradual broadcast, external index answers).
pub fn appended(universe: Universe, input: &Storage, columns: &[Column]) -> Storage {
    rowwise(universe, Some(input), columns)
}

/// Re-expose existing columns without computing anything.
pub fn references(universe: Universe, input: &Storage, columns: &[Column]) -> Storage {
    Storage::new(
        universe,
        columns
            .iter()
            .map(|c| (c.clone(), input.get_path(c).clone())),
    )
    .with_only_references(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rivulet_types::DType;

    #[test]
    fn rowwise_keeps_previous_row_at_zero() {
        let u = Universe::new();
        let a = Column::materialized(u, DType::Int);
        let b = Column::materialized(u, DType::Int);
        let input = Storage::flat(u, [a.clone()]);
        let out = rowwise(u, Some(&input), std::slice::from_ref(&b));
        assert_eq!(out.get_path(&a), &ColumnPath::new(vec![0, 0]));
        assert_eq!(out.get_path(&b), &ColumnPath::new(vec![1]));
        assert!(!out.has_only_new_columns());

        let fresh = rowwise(u, None, &[b.clone()]);
        assert_eq!(fresh.get_path(&b), &ColumnPath::new(vec![0]));
        assert!(fresh.has_only_new_columns());
    }
}
