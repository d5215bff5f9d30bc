#![forbid(unsafe_code)]

//! Non-destructive filtered views over tabular data.
//!
//! Data lives in a [`Tree`] of columns and cells built once (see
//! [`TreeBuilder`]). [`Operator`]s evaluate predicates and arithmetic over it,
//! and [`new_view`] forks a fresh visibility version showing only the selected
//! columns and matching rows. Resetting the tree discards every view.

pub use tv_expr::{
    Applied, EvalContext, ExprError, ExpressionTypeError, Operand, Operator, RowMap, parse_expr,
};
pub use tv_runtime::{CancelToken, Defect, DefectCollector, EvalMode, EvalPolicy, RuntimeError};
pub use tv_tree::{
    ColumnSpec, ForkedLayer, Lookup, NewNode, Nilmap, NodeIdx, NodeRef, Tree, TreeBuilder,
    TreeError,
};
pub use tv_types::{FieldType, NodeId, Nullable, TypeError, Value, cast_value, parse_timestamp};
pub use tv_view::{
    View, ViewBuilder, ViewError, ViewOption, from, new_view, new_view_with, select, where_,
};
