use std::sync::Arc;

use crate::column_path::ColumnPath;
use crate::dtype::DType;

/// Metadata the engine keeps per column.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnProperties {
    pub dtype: DType,
    pub append_only: bool,
    /// Where the column was defined, for error messages.
    pub trace: Option<Arc<str>>,
}

impl ColumnProperties {
    pub fn new(dtype: DType) -> Self {
        Self {
            dtype,
            append_only: false,
            trace: None,
        }
    }

    pub fn with_append_only(mut self, append_only: bool) -> Self {
        self.append_only = append_only;
        self
    }

    pub fn with_trace(mut self, trace: impl Into<Arc<str>>) -> Self {
        self.trace = Some(trace.into());
        self
    }
}

/// Tree of column properties mirroring the shape of a table's rows.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum TableProperties {
    #[default]
    Empty,
    Column(ColumnProperties),
    Table(Vec<TableProperties>),
}

impl TableProperties {
    /// Build a property tree from `(path, properties)` pairs.
    ///
    /// Key paths are skipped; the key is not part of the row value.
    pub fn from_paths(entries: impl IntoIterator<Item = (ColumnPath, ColumnProperties)>) -> Self {
        let mut root = TableProperties::Empty;
        for (path, props) in entries {
            if let ColumnPath::ValuePath(indices) = path {
                root.insert(&indices, props);
            }
        }
        root
    }

    fn insert(&mut self, path: &[usize], props: ColumnProperties) {
        let Some((&first, rest)) = path.split_first() else {
            *self = TableProperties::Column(props);
            return;
        };
        if !matches!(self, TableProperties::Table(_)) {
            *self = TableProperties::Table(Vec::new());
        }
        if let TableProperties::Table(children) = self {
            if children.len() <= first {
                children.resize(first + 1, TableProperties::Empty);
            }
            children[first].insert(rest, props);
        }
    }

    /// Properties at `path`, if any were recorded there.
    pub fn at(&self, path: &ColumnPath) -> Option<&ColumnProperties> {
        let ColumnPath::ValuePath(indices) = path else {
            return None;
        };
        let mut node = self;
        for &i in indices {
            match node {
                TableProperties::Table(children) => node = children.get(i)?,
                _ => return None,
            }
        }
        match node {
            TableProperties::Column(props) => Some(props),
            _ => None,
        }
    }

    /// The subtree rooted at `path`; [`TableProperties::Empty`] if nothing was
    /// recorded there.
    pub fn subtree(&self, path: &ColumnPath) -> TableProperties {
        let ColumnPath::ValuePath(indices) = path else {
            return TableProperties::Empty;
        };
        let mut node = self;
        for &i in indices {
            match node {
                TableProperties::Table(children) => match children.get(i) {
                    Some(child) => node = child,
                    None => return TableProperties::Empty,
                },
                _ => return TableProperties::Empty,
            }
        }
        node.clone()
    }

    /// `true` when every recorded column is append-only.
    pub fn append_only(&self) -> bool {
        match self {
            TableProperties::Empty => true,
            TableProperties::Column(props) => props.append_only,
            TableProperties::Table(children) => children.iter().all(Self::append_only),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_paths_builds_nested_tree() {
        let props = TableProperties::from_paths([
            (ColumnPath::new([0, 1]), ColumnProperties::new(DType::Int)),
            (ColumnPath::new([1]), ColumnProperties::new(DType::Str)),
            (ColumnPath::Key, ColumnProperties::new(DType::Pointer)),
        ]);
        assert_eq!(
            props.at(&ColumnPath::new([0, 1])).map(|p| &p.dtype),
            Some(&DType::Int)
        );
        assert_eq!(
            props.at(&ColumnPath::new([1])).map(|p| &p.dtype),
            Some(&DType::Str)
        );
        assert!(props.at(&ColumnPath::new([0, 0])).is_none());
        assert!(props.at(&ColumnPath::Key).is_none());
        assert!(!props.append_only());
        assert!(matches!(
            props.subtree(&ColumnPath::new([0])),
            TableProperties::Table(_)
        ));
        assert_eq!(props.subtree(&ColumnPath::new([7])), TableProperties::Empty);
    }
}
