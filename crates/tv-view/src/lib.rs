#![forbid(unsafe_code)]

use thiserror::Error;
use tv_expr::{EvalContext, ExprError, Operator, RowMap};
use tv_runtime::{DefectCollector, EvalPolicy};
use tv_tree::{NodeRef, TreeError};
use tv_types::{FieldType, Value};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ViewError {
    #[error("root node has already been set")]
    FromAlreadySet,
    #[error("where clause expressions must evaluate to boolean(s)")]
    WhereNotBoolean,
    #[error("view [From] must be defined")]
    MissingFrom,
    #[error("can not create a view without one or more selected nodes")]
    NoSelection,
    #[error("selected field {0} could not be found")]
    UnknownField(String),
    #[error(transparent)]
    Expr(#[from] ExprError),
    #[error(transparent)]
    Tree(#[from] TreeError),
}

#[derive(Debug, Clone)]
pub enum ViewOption<'t> {
    From(NodeRef<'t>),
    Select(Vec<String>),
    Where(Operator),
}

/// Source tree of the view. Only one `from` is accepted.
#[must_use]
pub fn from(node: NodeRef<'_>) -> ViewOption<'_> {
    ViewOption::From(node)
}

/// Columns to show, by name. Repeated `select` options accumulate.
#[must_use]
pub fn select<'t, I, S>(names: I) -> ViewOption<'t>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ViewOption::Select(names.into_iter().map(Into::into).collect())
}

/// Row predicate; must evaluate to booleans.
#[must_use]
pub fn where_<'t>(operator: Operator) -> ViewOption<'t> {
    ViewOption::Where(operator)
}

/// Collects view options before a view is realized.
#[derive(Debug, Default)]
pub struct ViewBuilder<'t> {
    from: Option<NodeRef<'t>>,
    select: Vec<String>,
    filter: Option<Operator>,
}

impl<'t> ViewBuilder<'t> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            from: None,
            select: Vec::new(),
            filter: None,
        }
    }

    pub fn apply(&mut self, option: ViewOption<'t>) -> Result<&mut Self, ViewError> {
        match option {
            ViewOption::From(node) => {
                if self.from.is_some() {
                    return Err(ViewError::FromAlreadySet);
                }
                self.from = Some(node);
            }
            ViewOption::Select(names) => self.select.extend(names),
            ViewOption::Where(operator) => self.filter = Some(operator),
        }
        Ok(self)
    }

    /// Fork the source tree and make the selected columns, and the rows the
    /// predicate accepts, visible in the new version.
    ///
    /// Every selected column is resolved before forking, so a missing column
    /// leaves the tree's active version untouched.
    pub fn build(&self, ctx: &EvalContext<'_>) -> Result<View<'t>, ViewError> {
        let root = self.from.ok_or(ViewError::MissingFrom)?;
        if self.select.is_empty() {
            return Err(ViewError::NoSelection);
        }

        let filter = match &self.filter {
            Some(operator) => {
                let applied = operator.apply_with(root.tree(), ctx)?;
                if applied.field_type != FieldType::Bool {
                    return Err(ViewError::WhereNotBoolean);
                }
                Some(applied.rows)
            }
            None => None,
        };

        let columns = self
            .select
            .iter()
            .map(|name| {
                root.find(name.as_str())
                    .ok_or_else(|| ViewError::UnknownField(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let layer = root.fork();
        for column in &columns {
            layer.toggle(column.id(), false)?;
            if let Some(filter) = &filter {
                reveal_rows(*column, filter);
            }
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(
            version = layer.version(),
            columns = columns.len(),
            filtered = filter.is_some(),
            "view created"
        );

        Ok(View {
            root,
            version: layer.version(),
            columns,
        })
    }
}

fn reveal_rows(column: NodeRef<'_>, filter: &RowMap) {
    #[cfg(feature = "tracing")]
    for (row, _) in filter.iter() {
        if column.find_by_id(column.id().with_row(row)).is_none() {
            tracing::debug!(column = column.name(), row, "where row has no cell");
        }
    }
    for cell in column.children() {
        if let Some(Value::Bool(keep)) = filter.get(cell.row()) {
            column.toggle(cell.id(), !keep);
        }
    }
}

/// Evaluate the options with the default policy and realize the view.
pub fn new_view<'t>(
    options: impl IntoIterator<Item = ViewOption<'t>>,
) -> Result<View<'t>, ViewError> {
    let defects = DefectCollector::new();
    new_view_with(options, &EvalContext::new(EvalPolicy::default(), &defects))
}

pub fn new_view_with<'t>(
    options: impl IntoIterator<Item = ViewOption<'t>>,
    ctx: &EvalContext<'_>,
) -> Result<View<'t>, ViewError> {
    let mut builder = ViewBuilder::new();
    for option in options {
        builder.apply(option)?;
    }
    builder.build(ctx)
}

/// A realized view: the forked version it lives in and its columns.
#[derive(Debug, Clone)]
pub struct View<'t> {
    root: NodeRef<'t>,
    version: usize,
    columns: Vec<NodeRef<'t>>,
}

impl<'t> View<'t> {
    #[must_use]
    pub fn root(&self) -> NodeRef<'t> {
        self.root
    }

    #[must_use]
    pub fn version(&self) -> usize {
        self.version
    }

    #[must_use]
    pub fn columns(&self) -> &[NodeRef<'t>] {
        &self.columns
    }

    /// Rows whose cell is visible in the first selected column.
    #[must_use]
    pub fn visible_rows(&self) -> Vec<u32> {
        let Some(first) = self.columns.first() else {
            return Vec::new();
        };
        first
            .null()
            .into_iter()
            .filter(|(_, hidden)| !hidden)
            .map(|(id, _)| id.row())
            .collect()
    }
}
