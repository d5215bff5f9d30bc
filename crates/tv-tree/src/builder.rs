use std::collections::HashSet;

use tv_runtime::{Defect, DefectCollector};
use tv_types::{FieldType, NodeId, Nullable, Value};

use crate::{NewNode, NodeIdx, Tree, TreeError};

/// Declaration of one column handed to [`TreeBuilder::add_column`].
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub field_type: FieldType,
    pub nullable: Nullable,
    pub unique: bool,
}

impl ColumnSpec {
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: Nullable::forbidden(),
            unique: false,
        }
    }

    #[must_use]
    pub fn nullable(mut self, nullable: Nullable) -> Self {
        self.nullable = nullable;
        self
    }

    /// Mark the column as a unique key. Repeated values are reported and the
    /// repeating cell is hidden.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

#[derive(Debug)]
struct BuilderColumn {
    idx: NodeIdx,
    index: u32,
    spec: ColumnSpec,
    seen: HashSet<String>,
}

/// Populates a [`Tree`] from already-decoded rows.
///
/// Columns get indices from 1 in declaration order and rows get indices from
/// 1 in push order. Null cells and cells that fail their column's declared
/// type are stored hidden; data problems go to the defect collector and only
/// structural problems are returned as errors.
#[derive(Debug)]
pub struct TreeBuilder<'d> {
    tree: Tree,
    columns: Vec<BuilderColumn>,
    next_row: u32,
    defects: &'d DefectCollector,
}

impl<'d> TreeBuilder<'d> {
    #[must_use]
    pub fn new(defects: &'d DefectCollector) -> Self {
        Self {
            tree: Tree::new(None),
            columns: Vec::new(),
            next_row: 1,
            defects,
        }
    }

    pub fn add_column(&mut self, spec: ColumnSpec) -> Result<NodeIdx, TreeError> {
        if self.columns.iter().any(|c| c.spec.name == spec.name) {
            return Err(TreeError::DuplicateColumn(spec.name));
        }
        let index = u32::try_from(self.columns.len() + 1).map_err(|_| TreeError::RowLimit)?;
        let idx = self.tree.add(
            NodeIdx::ROOT,
            NewNode::column(index, spec.name.clone(), spec.field_type, spec.nullable.clone()),
            false,
        )?;
        self.columns.push(BuilderColumn {
            idx,
            index,
            spec,
            seen: HashSet::new(),
        });
        Ok(idx)
    }

    /// Add one row, one value per declared column. Returns the row index.
    pub fn push_row(&mut self, values: Vec<Value>) -> Result<u32, TreeError> {
        if values.len() != self.columns.len() {
            return Err(TreeError::RowWidth {
                expected: self.columns.len(),
                found: values.len(),
            });
        }
        let row = self.next_row;
        self.next_row = row.checked_add(1).ok_or(TreeError::RowLimit)?;

        let mut cells = Vec::with_capacity(values.len());
        for (column, value) in self.columns.iter_mut().zip(values) {
            let id = NodeId::new(column.index, row);
            let value = checked_value(self.defects, column, row, value);
            let mut hidden = value.is_null();

            if value.is_null() && !column.spec.nullable.allowed {
                self.defects.log(
                    Defect::new("null value found in non-null field").at(column.index, row),
                );
            }

            if column.spec.unique && !value.is_null() {
                let key = value.to_string();
                if column.seen.contains(&key) {
                    self.defects.log(
                        Defect::new(format!("duplicate id [{key}]"))
                            .at(column.index, row)
                            .with_key(column.spec.name.clone(), key),
                    );
                    hidden = true;
                } else {
                    column.seen.insert(key);
                }
            }

            let cell = NewNode::cell(id, value).with_type(column.spec.field_type);
            cells.push(self.tree.add(column.idx, cell, hidden)?);
        }

        for pair in cells.windows(2) {
            self.tree.link_next(pair[0], pair[1])?;
            self.tree.link_prev(pair[1], pair[0])?;
        }
        Ok(row)
    }

    #[must_use]
    pub fn row_count(&self) -> u32 {
        self.next_row - 1
    }

    #[must_use]
    pub fn finish(self) -> Tree {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            columns = self.columns.len(),
            rows = self.row_count(),
            "tree built"
        );
        self.tree
    }
}

fn checked_value(defects: &DefectCollector, column: &BuilderColumn, row: u32, value: Value) -> Value {
    if value.is_null() || value.conforms_to(column.spec.field_type) {
        return value;
    }
    defects.log(
        Defect::new(format!(
            "{}: expected {} but found {}",
            column.spec.name,
            column.spec.field_type,
            value.field_type()
        ))
        .at(column.index, row),
    );
    Value::Null
}
