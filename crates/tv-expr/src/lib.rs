#![forbid(unsafe_code)]

//! Row-wise expressions over a [`Tree`].
//!
//! Every [`Operator`] evaluates to an [`Applied`]: a row -> value map plus the
//! type of its values. Comparisons and arithmetic scan a column; logical
//! operators and `If` fan their operands out to one worker thread each and
//! join the results over rendezvous channels.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::Instant;

use chrono::DateTime;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use thiserror::Error;
use tv_runtime::{CancelToken, Defect, DefectCollector, EvalPolicy, RuntimeError};
use tv_tree::{Nilmap, NodeIdx, NodeRef, Tree, TreeError};
use tv_types::{FieldType, NodeId, TypeError, Value, cast_value, resolve_common_type};

mod parse;

pub use parse::parse_expr;

const ORDERED: &[FieldType] = &[
    FieldType::UInt8,
    FieldType::UInt16,
    FieldType::UInt32,
    FieldType::UInt64,
    FieldType::Int8,
    FieldType::Int16,
    FieldType::Int32,
    FieldType::Int64,
    FieldType::Timestamp,
    FieldType::Float32,
    FieldType::Float64,
    FieldType::Date,
    FieldType::Utf8,
];

const EQUATABLE: &[FieldType] = &[
    FieldType::UInt8,
    FieldType::UInt16,
    FieldType::UInt32,
    FieldType::UInt64,
    FieldType::Int8,
    FieldType::Int16,
    FieldType::Int32,
    FieldType::Int64,
    FieldType::Timestamp,
    FieldType::Float32,
    FieldType::Float64,
    FieldType::Date,
    FieldType::Utf8,
    FieldType::Bool,
];

const ADDITIVE: &[FieldType] = &[
    FieldType::UInt8,
    FieldType::UInt16,
    FieldType::UInt32,
    FieldType::UInt64,
    FieldType::Int8,
    FieldType::Int16,
    FieldType::Int32,
    FieldType::Int64,
    FieldType::Float32,
    FieldType::Float64,
    FieldType::Timestamp,
    FieldType::Date,
    FieldType::Utf8,
];

const SUBTRACTIVE: &[FieldType] = &[
    FieldType::UInt8,
    FieldType::UInt16,
    FieldType::UInt32,
    FieldType::UInt64,
    FieldType::Int8,
    FieldType::Int16,
    FieldType::Int32,
    FieldType::Int64,
    FieldType::Float32,
    FieldType::Float64,
    FieldType::Timestamp,
    FieldType::Date,
];

const CHECKPOINT_EVERY: usize = 256;

/// Contract violations that make a whole expression meaningless.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExpressionTypeError {
    #[error(transparent)]
    Resolve(#[from] TypeError),
    #[error("{operator} operands must evaluate to boolean(s), found {found}")]
    NotBoolean {
        operator: &'static str,
        found: FieldType,
    },
    #[error("{operator} requires a column on the left-hand side")]
    LiteralOnLeft { operator: &'static str },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExprError {
    #[error("expression type error: {0}")]
    Type(#[from] ExpressionTypeError),
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error("unknown column: {0}")]
    UnknownColumn(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("evaluation cancelled")]
    Cancelled,
    #[error("evaluation exceeded its deadline")]
    DeadlineExceeded,
    #[error("{0} operand worker panicked")]
    WorkerPanicked(&'static str),
}

impl From<TypeError> for ExprError {
    fn from(err: TypeError) -> Self {
        Self::Type(ExpressionTypeError::Resolve(err))
    }
}

impl From<RuntimeError> for ExprError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::Cancelled => Self::Cancelled,
        }
    }
}

/// One side of a comparison or arithmetic operator: a column of the tree, or
/// a detached fixed value applied to every row.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Column(NodeIdx),
    Literal { value: Value, field_type: FieldType },
}

impl Operand {
    #[must_use]
    pub fn column(node: NodeRef<'_>) -> Self {
        Self::Column(node.idx())
    }

    /// Fixed value whose declared type follows its runtime tag.
    #[must_use]
    pub fn literal(value: impl Into<Value>) -> Self {
        let value = value.into();
        let field_type = value.field_type();
        Self::Literal { value, field_type }
    }

    /// Fixed value with an explicit declared type; cast at evaluation time.
    #[must_use]
    pub fn typed(value: impl Into<Value>, field_type: FieldType) -> Self {
        Self::Literal {
            value: value.into(),
            field_type,
        }
    }

    /// The null marker `Eq` uses for is-null checks.
    #[must_use]
    pub fn null() -> Self {
        Self::Literal {
            value: Value::Null,
            field_type: FieldType::Null,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(
            self,
            Self::Literal {
                value: Value::Null,
                ..
            }
        )
    }

    fn field_type(&self, tree: &Tree) -> Result<FieldType, ExprError> {
        match self {
            Self::Column(idx) => Ok(tree.node(*idx)?.field_type()),
            Self::Literal { field_type, .. } => Ok(*field_type),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    Lt {
        left: Operand,
        right: Operand,
    },
    Gt {
        left: Operand,
        right: Operand,
    },
    Eq {
        left: Operand,
        right: Operand,
    },
    Ge {
        left: Operand,
        right: Operand,
    },
    Le {
        left: Operand,
        right: Operand,
    },
    /// `Ne(column, null)` is the is-not-null check.
    Ne {
        left: Operand,
        right: Operand,
    },
    Add {
        left: Operand,
        right: Operand,
    },
    Subtract {
        left: Operand,
        right: Operand,
    },
    Not {
        expr: Box<Operator>,
    },
    And {
        left: Box<Operator>,
        right: Box<Operator>,
    },
    Or {
        left: Box<Operator>,
        right: Box<Operator>,
    },
    If {
        cond: Box<Operator>,
        then: Box<Operator>,
        otherwise: Box<Operator>,
    },
    True,
    False,
}

/// Per-row results. A constant applies to every row without an entry of its
/// own; `True`/`False` produce nothing else.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowMap {
    rows: BTreeMap<u32, Value>,
    constant: Option<Value>,
}

impl RowMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn constant(value: Value) -> Self {
        Self {
            rows: BTreeMap::new(),
            constant: Some(value),
        }
    }

    pub fn insert(&mut self, row: u32, value: Value) {
        self.rows.insert(row, value);
    }

    /// Value for `row`, falling back to the constant.
    #[must_use]
    pub fn get(&self, row: u32) -> Option<&Value> {
        self.rows.get(&row).or(self.constant.as_ref())
    }

    #[must_use]
    pub fn bool_at(&self, row: u32) -> Option<bool> {
        self.get(row).and_then(Value::as_bool)
    }

    #[must_use]
    pub fn rows(&self) -> &BTreeMap<u32, Value> {
        &self.rows
    }

    #[must_use]
    pub fn constant_value(&self) -> Option<&Value> {
        self.constant.as_ref()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &Value)> {
        self.rows.iter().map(|(row, value)| (*row, value))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl FromIterator<(u32, Value)> for RowMap {
    fn from_iter<I: IntoIterator<Item = (u32, Value)>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
            constant: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub rows: RowMap,
    pub field_type: FieldType,
}

impl Applied {
    fn constant(value: bool) -> Self {
        Self {
            rows: RowMap::constant(Value::Bool(value)),
            field_type: FieldType::Bool,
        }
    }

    fn require_bool(&self, operator: &'static str) -> Result<(), ExpressionTypeError> {
        if self.field_type == FieldType::Bool {
            Ok(())
        } else {
            Err(ExpressionTypeError::NotBoolean {
                operator,
                found: self.field_type,
            })
        }
    }
}

/// Everything an evaluation shares across its workers.
#[derive(Debug, Clone)]
pub struct EvalContext<'c> {
    policy: EvalPolicy,
    cancel: CancelToken,
    deadline: Option<Instant>,
    defects: &'c DefectCollector,
}

impl<'c> EvalContext<'c> {
    /// The policy's deadline, if any, starts counting now.
    #[must_use]
    pub fn new(policy: EvalPolicy, defects: &'c DefectCollector) -> Self {
        Self {
            deadline: policy.deadline_from(Instant::now()),
            policy,
            cancel: CancelToken::new(),
            defects,
        }
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn policy(&self) -> &EvalPolicy {
        &self.policy
    }

    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    #[must_use]
    pub fn defects(&self) -> &'c DefectCollector {
        self.defects
    }

    fn checkpoint(&self) -> Result<(), ExprError> {
        self.cancel.check()?;
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                self.cancel.cancel();
                return Err(ExprError::DeadlineExceeded);
            }
        }
        Ok(())
    }

    fn row_defect(&self, column: Option<u32>, row: u32, message: String) {
        #[cfg(feature = "tracing")]
        tracing::warn!(column = ?column, row, "{message}");
        if self.policy.record_row_defects {
            let defect = Defect::new(message).at_row(row);
            self.defects.log(match column {
                Some(column) => defect.at(column, row),
                None => defect,
            });
        }
    }
}

impl Operator {
    /// Evaluate with the default policy, discarding per-row defects.
    pub fn apply(&self, tree: &Tree) -> Result<Applied, ExprError> {
        let defects = DefectCollector::new();
        self.apply_with(tree, &EvalContext::new(EvalPolicy::default(), &defects))
    }

    pub fn apply_with(&self, tree: &Tree, ctx: &EvalContext<'_>) -> Result<Applied, ExprError> {
        ctx.checkpoint()?;
        match self {
            Self::True => Ok(Applied::constant(true)),
            Self::False => Ok(Applied::constant(false)),
            Self::Lt { left, right } => scan(tree, ctx, Binary::Lt, left, right),
            Self::Gt { left, right } => scan(tree, ctx, Binary::Gt, left, right),
            Self::Eq { left, right } if right.is_null() => null_check(tree, left, true),
            Self::Eq { left, right } => scan(tree, ctx, Binary::Eq, left, right),
            Self::Ge { left, right } => scan(tree, ctx, Binary::Ge, left, right),
            Self::Le { left, right } => scan(tree, ctx, Binary::Le, left, right),
            Self::Ne { left, right } if right.is_null() => null_check(tree, left, false),
            Self::Ne { left, right } => scan(tree, ctx, Binary::Ne, left, right),
            Self::Add { left, right } => scan(tree, ctx, Binary::Add, left, right),
            Self::Subtract { left, right } => scan(tree, ctx, Binary::Subtract, left, right),
            Self::Not { expr } => {
                let inner = expr.apply_with(tree, ctx)?;
                inner.require_bool("not")?;
                Ok(negate(inner))
            }
            Self::And { left, right } => logical(tree, ctx, Logic::And, left, right),
            Self::Or { left, right } => logical(tree, ctx, Logic::Or, left, right),
            Self::If {
                cond,
                then,
                otherwise,
            } => conditional(tree, ctx, cond, then, otherwise),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binary {
    Lt,
    Gt,
    Eq,
    Ge,
    Le,
    Ne,
    Add,
    Subtract,
}

impl Binary {
    fn name(self) -> &'static str {
        match self {
            Self::Lt => "lt",
            Self::Gt => "gt",
            Self::Eq => "eq",
            Self::Ge => "ge",
            Self::Le => "le",
            Self::Ne => "ne",
            Self::Add => "add",
            Self::Subtract => "subtract",
        }
    }

    fn allowed(self) -> &'static [FieldType] {
        match self {
            Self::Lt | Self::Gt | Self::Ge | Self::Le => ORDERED,
            Self::Eq | Self::Ne => EQUATABLE,
            Self::Add => ADDITIVE,
            Self::Subtract => SUBTRACTIVE,
        }
    }

    fn is_comparison(self) -> bool {
        !matches!(self, Self::Add | Self::Subtract)
    }

    fn result_type(self, resolved: FieldType) -> FieldType {
        if self.is_comparison() {
            FieldType::Bool
        } else if resolved.is_numeric() {
            FieldType::Float64
        } else if resolved.is_temporal() {
            FieldType::Timestamp
        } else {
            resolved
        }
    }

    /// Value for rows that are excluded, hidden, or unmatched.
    fn skipped(self) -> Value {
        if self.is_comparison() {
            Value::Bool(false)
        } else {
            Value::Null
        }
    }

    /// Unordered pairs (NaN) compare false under every comparison.
    fn eval(self, left: &Value, right: &Value) -> Result<Value, TypeError> {
        let ordering = match self {
            Self::Add => return add_values(left, right),
            Self::Subtract => return subtract_values(left, right),
            _ => left.partial_order(right)?,
        };
        Ok(Value::Bool(match self {
            Self::Lt => matches!(ordering, Some(Ordering::Less)),
            Self::Gt => matches!(ordering, Some(Ordering::Greater)),
            Self::Eq => matches!(ordering, Some(Ordering::Equal)),
            Self::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
            Self::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
            Self::Ne => matches!(ordering, Some(Ordering::Less | Ordering::Greater)),
            Self::Add | Self::Subtract => false,
        }))
    }
}

fn add_values(left: &Value, right: &Value) -> Result<Value, TypeError> {
    match (left, right) {
        (Value::Utf8(a), Value::Utf8(b)) => Ok(Value::Utf8(format!("{a}{b}"))),
        (Value::Timestamp(a), Value::Timestamp(b)) => {
            Ok(from_epoch(a.timestamp().checked_add(b.timestamp())))
        }
        _ => Ok(Value::Float64(left.to_f64()? + right.to_f64()?)),
    }
}

fn subtract_values(left: &Value, right: &Value) -> Result<Value, TypeError> {
    match (left, right) {
        (Value::Timestamp(a), Value::Timestamp(b)) => {
            Ok(from_epoch(a.timestamp().checked_sub(b.timestamp())))
        }
        _ => Ok(Value::Float64(left.to_f64()? - right.to_f64()?)),
    }
}

fn from_epoch(seconds: Option<i64>) -> Value {
    seconds
        .and_then(|s| DateTime::from_timestamp(s, 0))
        .map_or(Value::Null, Value::Timestamp)
}

enum RightSide<'t> {
    Fixed(Value),
    Column { node: NodeRef<'t>, nilmap: Nilmap },
}

impl<'t> RightSide<'t> {
    fn new(tree: &'t Tree, operand: &Operand, resolved: FieldType) -> Result<Self, ExprError> {
        match operand {
            Operand::Column(idx) => {
                let node = tree.node(*idx)?;
                Ok(Self::Column {
                    nilmap: node.null(),
                    node,
                })
            }
            Operand::Literal { value, .. } => Ok(Self::Fixed(cast_value(value, resolved)?)),
        }
    }

    /// The row-matched right value, or `None` when that cell is hidden or
    /// missing.
    fn value_at(&self, row: u32) -> Option<&Value> {
        match self {
            Self::Fixed(value) => Some(value),
            Self::Column { node, nilmap } => {
                let id = NodeId::new(node.column(), row);
                if nilmap.get(&id).copied().unwrap_or(true) {
                    return None;
                }
                node.find_by_id(id).map(|cell| cell.value())
            }
        }
    }
}

fn scan(
    tree: &Tree,
    ctx: &EvalContext<'_>,
    kind: Binary,
    left: &Operand,
    right: &Operand,
) -> Result<Applied, ExprError> {
    let Operand::Column(left_idx) = left else {
        return Err(ExpressionTypeError::LiteralOnLeft {
            operator: kind.name(),
        }
        .into());
    };
    let column = tree.node(*left_idx)?;
    let resolved = resolve_common_type(kind.allowed(), column.field_type(), right.field_type(tree)?)?;
    let right = RightSide::new(tree, right, resolved)?;

    let excludes = column.excludes();
    let nilmap = column.null();
    let mut rows = RowMap::new();
    for (n, cell) in column.children().enumerate() {
        if n % CHECKPOINT_EVERY == 0 {
            ctx.checkpoint()?;
        }
        let row = cell.row();
        let excluded = excludes.get(row as usize).copied().unwrap_or(false);
        let hidden = nilmap.get(&cell.id()).copied().unwrap_or(true);
        let rhs = match right.value_at(row) {
            Some(rhs) if !excluded && !hidden => rhs,
            _ => {
                rows.insert(row, kind.skipped());
                continue;
            }
        };

        let lhs = cell.value();
        let value = if !lhs.conforms_to(resolved) || !rhs.conforms_to(resolved) {
            ctx.row_defect(
                Some(cell.column()),
                row,
                format!(
                    "{}: expected {resolved} but found {} and {}",
                    kind.name(),
                    lhs.field_type(),
                    rhs.field_type()
                ),
            );
            Value::Null
        } else {
            kind.eval(lhs, rhs).unwrap_or_else(|err| {
                ctx.row_defect(Some(cell.column()), row, format!("{}: {err}", kind.name()));
                Value::Null
            })
        };
        rows.insert(row, value);
    }

    Ok(Applied {
        rows,
        field_type: kind.result_type(resolved),
    })
}

/// `Eq(column, null)`: the column's active nilmap keyed by row. `Ne` gets
/// the same map negated.
fn null_check(tree: &Tree, left: &Operand, want_hidden: bool) -> Result<Applied, ExprError> {
    let Operand::Column(idx) = left else {
        let operator = if want_hidden { "eq" } else { "ne" };
        return Err(ExpressionTypeError::LiteralOnLeft { operator }.into());
    };
    let rows = tree
        .node(*idx)?
        .null()
        .into_iter()
        .map(|(id, hidden)| (id.row(), Value::Bool(hidden == want_hidden)))
        .collect();
    Ok(Applied {
        rows,
        field_type: FieldType::Bool,
    })
}

fn negate(applied: Applied) -> Applied {
    let flip = |value: Value| match value {
        Value::Bool(b) => Value::Bool(!b),
        other => other,
    };
    Applied {
        rows: RowMap {
            rows: applied
                .rows
                .rows
                .into_iter()
                .map(|(row, value)| (row, flip(value)))
                .collect(),
            constant: applied.rows.constant.map(flip),
        },
        field_type: FieldType::Bool,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Logic {
    And,
    Or,
}

impl Logic {
    fn name(self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
        }
    }

    fn combine(self, left: bool, right: bool) -> bool {
        match self {
            Self::And => left && right,
            Self::Or => left || right,
        }
    }
}

fn logical(
    tree: &Tree,
    ctx: &EvalContext<'_>,
    kind: Logic,
    left: &Operator,
    right: &Operator,
) -> Result<Applied, ExprError> {
    let [l, r] = join(tree, ctx, [("l", left), ("r", right)])?;
    l.require_bool(kind.name())?;
    r.require_bool(kind.name())?;

    // Excluded rows are false whatever either side says, constants included.
    let excludes = tree.root().excludes();
    let excluded_rows = excludes
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, excluded)| **excluded)
        .filter_map(|(row, _)| u32::try_from(row).ok());
    let keys: BTreeSet<u32> = l
        .rows
        .rows
        .keys()
        .chain(r.rows.rows.keys())
        .copied()
        .chain(excluded_rows)
        .collect();
    let mut rows: RowMap = keys
        .into_iter()
        .map(|row| {
            if excludes.get(row as usize).copied().unwrap_or(false) {
                return (row, Value::Bool(false));
            }
            let a = l.rows.bool_at(row).unwrap_or(false);
            let b = r.rows.bool_at(row).unwrap_or(false);
            (row, Value::Bool(kind.combine(a, b)))
        })
        .collect();
    let constants = (
        l.rows.constant.as_ref().and_then(Value::as_bool),
        r.rows.constant.as_ref().and_then(Value::as_bool),
    );
    if let (Some(a), Some(b)) = constants {
        rows.constant = Some(Value::Bool(kind.combine(a, b)));
    }

    Ok(Applied {
        rows,
        field_type: FieldType::Bool,
    })
}

fn conditional(
    tree: &Tree,
    ctx: &EvalContext<'_>,
    cond: &Operator,
    then: &Operator,
    otherwise: &Operator,
) -> Result<Applied, ExprError> {
    let [c, t, e] = join(tree, ctx, [("cond", cond), ("then", then), ("else", otherwise)])?;
    c.require_bool("if")?;
    if t.field_type != e.field_type {
        return Err(TypeError::Mismatch {
            left: t.field_type,
            right: e.field_type,
        }
        .into());
    }

    if c.rows.is_empty() {
        if let Some(choice) = c.rows.constant.as_ref().and_then(Value::as_bool) {
            return Ok(if choice { t } else { e });
        }
    }

    let mut rows = RowMap::new();
    for (row, value) in c.rows.iter() {
        let (name, branch) = if value.as_bool() == Some(true) {
            ("then", &t)
        } else {
            ("else", &e)
        };
        let chosen = match branch.rows.get(row) {
            Some(value) => value.clone(),
            None => {
                ctx.row_defect(None, row, format!("row {row} missing from {name} branch"));
                Value::Bool(false)
            }
        };
        rows.insert(row, chosen);
    }

    Ok(Applied {
        rows,
        field_type: t.field_type,
    })
}

type Delivery = (usize, Result<Applied, ExprError>);

/// Evaluate each operand on its own scoped worker and wait for all of them.
/// The first failure cancels the rest and is the only error returned.
fn join<const N: usize>(
    tree: &Tree,
    ctx: &EvalContext<'_>,
    operands: [(&'static str, &Operator); N],
) -> Result<[Applied; N], ExprError> {
    let (tx, rx) = crossbeam_channel::bounded::<Delivery>(0);
    thread::scope(|scope| {
        for (slot, (name, operator)) in operands.into_iter().enumerate() {
            let tx = tx.clone();
            scope.spawn(move || {
                let result = guarded(name, || operator.apply_with(tree, ctx));
                // A closed receiver means the join already gave up.
                let _ = tx.send((slot, result));
            });
        }
        drop(tx);
        gather(rx, ctx)
    })
}

/// Run one operand's work, turning a panic into [`ExprError::WorkerPanicked`].
fn guarded(
    name: &'static str,
    work: impl FnOnce() -> Result<Applied, ExprError>,
) -> Result<Applied, ExprError> {
    panic::catch_unwind(AssertUnwindSafe(work)).unwrap_or(Err(ExprError::WorkerPanicked(name)))
}

fn gather<const N: usize>(
    rx: Receiver<Delivery>,
    ctx: &EvalContext<'_>,
) -> Result<[Applied; N], ExprError> {
    let mut slots: [Option<Applied>; N] = std::array::from_fn(|_| None);
    for _ in 0..N {
        let received = match ctx.deadline {
            Some(deadline) => rx.recv_deadline(deadline),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        let outcome = match received {
            Ok((slot, result)) => result.map(|applied| slots[slot] = Some(applied)),
            Err(RecvTimeoutError::Timeout) => Err(ExprError::DeadlineExceeded),
            Err(RecvTimeoutError::Disconnected) => Err(ExprError::Cancelled),
        };
        if let Err(err) = outcome {
            ctx.cancel.cancel();
            #[cfg(feature = "tracing")]
            tracing::debug!(error = %err, "operand join aborted");
            return Err(err);
        }
    }

    let filled: Vec<Applied> = slots.into_iter().flatten().collect();
    filled.try_into().map_err(|_| ExprError::Cancelled)
}
