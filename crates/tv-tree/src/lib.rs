#![forbid(unsafe_code)]

//! Column/cell tree with versioned visibility.
//!
//! A tree is a root whose children are columns (row 0 ids) whose children are
//! cells (row >= 1 ids). Values never change after ingestion; what changes is
//! which cells are *hidden*. Every node keeps an array of nilmaps (child id ->
//! hidden) and the tree keeps a single active version index into all of them,
//! so [`NodeRef::fork`] can open a fresh, all-hidden layer for a view without
//! copying any cell data, and [`NodeRef::reset`] returns to the parsed state.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use thiserror::Error;
use tv_types::{FieldType, NodeId, Nullable, Value};

mod builder;

pub use builder::{ColumnSpec, TreeBuilder};

/// Child id -> hidden, for one version of one node.
pub type Nilmap = BTreeMap<NodeId, bool>;

/// Position of a node in its tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIdx(usize);

impl NodeIdx {
    pub const ROOT: Self = Self(0);

    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("id {0} does not exist in node")]
    UnknownId(NodeId),
    #[error("node index {0} is not part of this tree")]
    UnknownNode(usize),
    #[error("node {parent} already has a child with id {id}")]
    DuplicateId { parent: NodeId, id: NodeId },
    #[error("column {0:?} is already defined")]
    DuplicateColumn(String),
    #[error("row has {found} fields but {expected} columns are defined")]
    RowWidth { expected: usize, found: usize },
    #[error("row index space exhausted")]
    RowLimit,
    #[error("visibility layer {version} no longer exists")]
    StaleLayer { version: usize },
}

/// Everything a node carries besides its links and visibility.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNode {
    pub id: NodeId,
    pub name: String,
    pub value: Value,
    pub field_type: FieldType,
    pub nullable: Nullable,
}

impl NewNode {
    #[must_use]
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            name: String::new(),
            value: Value::Null,
            field_type: FieldType::Unknown,
            nullable: Nullable::forbidden(),
        }
    }

    #[must_use]
    pub fn column(index: u32, name: impl Into<String>, field_type: FieldType, nullable: Nullable) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable,
            ..Self::new(NodeId::column_header(index))
        }
    }

    #[must_use]
    pub fn cell(id: NodeId, value: Value) -> Self {
        Self {
            value,
            ..Self::new(id)
        }
    }

    #[must_use]
    pub fn with_type(mut self, field_type: FieldType) -> Self {
        self.field_type = field_type;
        self
    }
}

#[derive(Debug)]
struct Node {
    id: NodeId,
    name: String,
    value: Value,
    field_type: FieldType,
    nullable: Nullable,
    parent: Option<NodeIdx>,
    children: BTreeMap<NodeId, NodeIdx>,
    min: u32,
    max: u32,
    next: Option<NodeIdx>,
    prev: Option<NodeIdx>,
}

#[derive(Debug)]
struct Visibility {
    version: usize,
    /// Indexed by arena position; every inner array has the same length.
    layers: Vec<Vec<Nilmap>>,
}

impl Visibility {
    fn active(&self, idx: NodeIdx) -> &Nilmap {
        &self.layers[idx.0][self.version]
    }

    fn active_mut(&mut self, idx: NodeIdx) -> &mut Nilmap {
        let version = self.version;
        &mut self.layers[idx.0][version]
    }
}

/// Arena-backed tree. Cell data is immutable once added; visibility lives
/// behind one tree-wide reader-writer lock.
#[derive(Debug)]
pub struct Tree {
    nodes: Vec<Node>,
    visibility: RwLock<Visibility>,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Tree {
    #[must_use]
    pub fn new(root_id: Option<NodeId>) -> Self {
        let root = Node {
            id: root_id.unwrap_or(NodeId::from_raw(0)),
            name: String::new(),
            value: Value::Null,
            field_type: FieldType::Unknown,
            nullable: Nullable::forbidden(),
            parent: None,
            children: BTreeMap::new(),
            min: 0,
            max: 0,
            next: None,
            prev: None,
        };
        Self {
            nodes: vec![root],
            visibility: RwLock::new(Visibility {
                version: 0,
                layers: vec![vec![Nilmap::new()]],
            }),
        }
    }

    #[must_use]
    pub fn root(&self) -> NodeRef<'_> {
        NodeRef {
            tree: self,
            idx: NodeIdx::ROOT,
        }
    }

    pub fn node(&self, idx: NodeIdx) -> Result<NodeRef<'_>, TreeError> {
        if idx.0 < self.nodes.len() {
            Ok(NodeRef { tree: self, idx })
        } else {
            Err(TreeError::UnknownNode(idx.0))
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Active version, shared by every node.
    #[must_use]
    pub fn version(&self) -> usize {
        self.visibility.read_recursive().version
    }

    /// Number of nilmaps each node currently holds.
    #[must_use]
    pub fn version_count(&self) -> usize {
        self.visibility.read_recursive().layers[0].len()
    }

    /// Highest row index across all columns of the root.
    #[must_use]
    pub fn max_row(&self) -> u32 {
        self.nodes[0]
            .children
            .values()
            .map(|col| self.nodes[col.0].max)
            .max()
            .unwrap_or(0)
    }

    /// Insert `node` under `parent`, recording `hidden` for it in the parent's
    /// active nilmap. The new node starts with as many (empty) nilmaps as
    /// every other node so version arrays stay aligned.
    pub fn add(&mut self, parent: NodeIdx, node: NewNode, hidden: bool) -> Result<NodeIdx, TreeError> {
        let parent_node = self
            .nodes
            .get(parent.0)
            .ok_or(TreeError::UnknownNode(parent.0))?;
        if parent_node.children.contains_key(&node.id) {
            return Err(TreeError::DuplicateId {
                parent: parent_node.id,
                id: node.id,
            });
        }

        let idx = NodeIdx(self.nodes.len());
        let id = node.id;
        self.nodes.push(Node {
            id,
            name: node.name,
            value: node.value,
            field_type: node.field_type,
            nullable: node.nullable,
            parent: Some(parent),
            children: BTreeMap::new(),
            min: 0,
            max: 0,
            next: None,
            prev: None,
        });

        let row = id.row();
        let parent_node = &mut self.nodes[parent.0];
        if parent_node.children.is_empty() {
            parent_node.min = row;
            parent_node.max = row;
        } else {
            parent_node.min = parent_node.min.min(row);
            parent_node.max = parent_node.max.max(row);
        }
        parent_node.children.insert(id, idx);

        let visibility = self.visibility.get_mut();
        let depth = visibility.layers[0].len();
        visibility.layers.push(vec![Nilmap::new(); depth]);
        visibility.active_mut(parent).insert(id, hidden);
        Ok(idx)
    }

    /// Set `node`'s next link unless it is already set. Returns the link in
    /// effect afterwards.
    pub fn link_next(&mut self, node: NodeIdx, next: NodeIdx) -> Result<NodeIdx, TreeError> {
        self.check(next)?;
        let slot = &mut self.nodes.get_mut(node.0).ok_or(TreeError::UnknownNode(node.0))?.next;
        Ok(*slot.get_or_insert(next))
    }

    /// Set `node`'s prev link unless it is already set. Returns the link in
    /// effect afterwards.
    pub fn link_prev(&mut self, node: NodeIdx, prev: NodeIdx) -> Result<NodeIdx, TreeError> {
        self.check(prev)?;
        let slot = &mut self.nodes.get_mut(node.0).ok_or(TreeError::UnknownNode(node.0))?.prev;
        Ok(*slot.get_or_insert(prev))
    }

    /// Run `f` while holding the tree's shared lock, so no fork or reset can
    /// interleave with it. `f` may read freely but must not fork, reset or
    /// toggle: those need the exclusive lock and would deadlock.
    pub fn lock_while<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.visibility.read();
        f()
    }

    /// Same-row cells reachable from `cell` through prev/next links, in
    /// column order.
    pub fn row_cells(&self, cell: NodeIdx) -> Result<Vec<NodeRef<'_>>, TreeError> {
        self.check(cell)?;
        let limit = self.nodes.len();
        let mut first = cell;
        let mut steps = 0;
        while let Some(prev) = self.nodes[first.0].prev {
            steps += 1;
            if steps > limit {
                break;
            }
            first = prev;
        }

        let mut out = Vec::new();
        let mut cursor = Some(first);
        while let Some(idx) = cursor {
            if out.len() >= limit {
                break;
            }
            out.push(NodeRef { tree: self, idx });
            cursor = self.nodes[idx.0].next;
        }
        Ok(out)
    }

    fn check(&self, idx: NodeIdx) -> Result<(), TreeError> {
        if idx.0 < self.nodes.len() {
            Ok(())
        } else {
            Err(TreeError::UnknownNode(idx.0))
        }
    }

    fn root_of(&self, mut idx: NodeIdx) -> NodeIdx {
        while let Some(parent) = self.nodes[idx.0].parent {
            idx = parent;
        }
        idx
    }

    fn fork_node(&self, visibility: &mut Visibility, idx: NodeIdx, next_version: usize) {
        let fresh: Nilmap = visibility.active(idx).keys().map(|id| (*id, true)).collect();
        let layers = &mut visibility.layers[idx.0];
        layers.truncate(next_version);
        layers.push(fresh);
        for child in self.nodes[idx.0].children.values() {
            self.fork_node(visibility, *child, next_version);
        }
    }
}

/// Key accepted by [`NodeRef::find`]: a display name or a packed id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'k> {
    Name(&'k str),
    Id(NodeId),
}

impl<'k> From<&'k str> for Lookup<'k> {
    fn from(name: &'k str) -> Self {
        Self::Name(name)
    }
}

impl From<NodeId> for Lookup<'_> {
    fn from(id: NodeId) -> Self {
        Self::Id(id)
    }
}

/// Borrowed handle on one node of a [`Tree`]. This is the read contract
/// output writers and expressions consume, plus the visibility edits views
/// need.
#[derive(Debug, Clone, Copy)]
pub struct NodeRef<'a> {
    tree: &'a Tree,
    idx: NodeIdx,
}

impl PartialEq for NodeRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.tree, other.tree) && self.idx == other.idx
    }
}

impl<'a> NodeRef<'a> {
    fn node(&self) -> &'a Node {
        &self.tree.nodes[self.idx.0]
    }

    fn wrap(&self, idx: NodeIdx) -> NodeRef<'a> {
        NodeRef {
            tree: self.tree,
            idx,
        }
    }

    #[must_use]
    pub fn tree(&self) -> &'a Tree {
        self.tree
    }

    #[must_use]
    pub fn idx(&self) -> NodeIdx {
        self.idx
    }

    #[must_use]
    pub fn id(&self) -> NodeId {
        self.node().id
    }

    #[must_use]
    pub fn column(&self) -> u32 {
        self.id().column()
    }

    #[must_use]
    pub fn row(&self) -> u32 {
        self.id().row()
    }

    #[must_use]
    pub fn name(&self) -> &'a str {
        &self.node().name
    }

    #[must_use]
    pub fn value(&self) -> &'a Value {
        &self.node().value
    }

    /// Declared field type.
    #[must_use]
    pub fn field_type(&self) -> FieldType {
        self.node().field_type
    }

    #[must_use]
    pub fn nullable(&self) -> &'a Nullable {
        &self.node().nullable
    }

    #[must_use]
    pub fn min(&self) -> u32 {
        self.node().min
    }

    #[must_use]
    pub fn max(&self) -> u32 {
        self.node().max
    }

    #[must_use]
    pub fn parent(&self) -> Option<NodeRef<'a>> {
        self.node().parent.map(|idx| self.wrap(idx))
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.node().parent.is_none()
    }

    /// Children in id order.
    pub fn children(&self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        let tree = self.tree;
        self.node()
            .children
            .values()
            .map(move |idx| NodeRef { tree, idx: *idx })
    }

    #[must_use]
    pub fn child_count(&self) -> usize {
        self.node().children.len()
    }

    /// Find a child by display name (linear scan) or by id (direct lookup).
    pub fn find<'k>(&self, key: impl Into<Lookup<'k>>) -> Option<NodeRef<'a>> {
        match key.into() {
            Lookup::Id(id) => self.find_by_id(id),
            Lookup::Name(name) => self.children().find(|child| child.name() == name),
        }
    }

    #[must_use]
    pub fn find_by_id(&self, id: NodeId) -> Option<NodeRef<'a>> {
        self.node().children.get(&id).map(|idx| self.wrap(*idx))
    }

    #[must_use]
    pub fn next(&self) -> Option<NodeRef<'a>> {
        self.node().next.map(|idx| self.wrap(idx))
    }

    #[must_use]
    pub fn prev(&self) -> Option<NodeRef<'a>> {
        self.node().prev.map(|idx| self.wrap(idx))
    }

    /// Snapshot of the active nilmap.
    #[must_use]
    pub fn null(&self) -> Nilmap {
        self.tree.visibility.read_recursive().active(self.idx).clone()
    }

    /// Active hidden bit for a child id, if the id is known to this nilmap.
    #[must_use]
    pub fn is_hidden(&self, id: NodeId) -> Option<bool> {
        self.tree
            .visibility
            .read_recursive()
            .active(self.idx)
            .get(&id)
            .copied()
    }

    pub fn excluded(&self, id: NodeId) -> Result<bool, TreeError> {
        self.is_hidden(id).ok_or(TreeError::UnknownId(id))
    }

    /// Overwrite one entry of the active nilmap.
    pub fn toggle(&self, id: NodeId, hidden: bool) {
        self.tree
            .visibility
            .write()
            .active_mut(self.idx)
            .insert(id, hidden);
    }

    /// One flag per row (`max_row + 1` long): true when some visible,
    /// non-nullable column of the root hides that row's cell.
    #[must_use]
    pub fn excludes(&self) -> Vec<bool> {
        let tree = self.tree;
        let root = tree.root_of(self.idx);
        let visibility = tree.visibility.read_recursive();
        let mut out = vec![false; tree.max_row() as usize + 1];

        let root_map = visibility.active(root);
        for (col_id, col_idx) in &tree.nodes[root.0].children {
            if root_map.get(col_id).copied().unwrap_or(false) {
                continue;
            }
            let column = &tree.nodes[col_idx.0];
            if column.nullable.allowed {
                continue;
            }
            let nilmap = visibility.active(*col_idx);
            for cell_id in column.children.keys() {
                if nilmap.get(cell_id).copied().unwrap_or(false) {
                    if let Some(slot) = out.get_mut(cell_id.row() as usize) {
                        *slot = true;
                    }
                }
            }
        }
        out
    }

    /// Open a new visibility version on every node of this node's tree, every
    /// known id defaulting to hidden. Layers left over from before a reset
    /// are discarded first, so the new version is always `current + 1`.
    pub fn fork(&self) -> ForkedLayer<'a> {
        let tree = self.tree;
        let root = tree.root_of(self.idx);
        let mut visibility = tree.visibility.write();
        let next_version = visibility.version + 1;
        tree.fork_node(&mut visibility, root, next_version);
        visibility.version = next_version;
        #[cfg(feature = "tracing")]
        tracing::debug!(version = next_version, "tree forked");
        ForkedLayer {
            tree,
            idx: self.idx,
            version: next_version,
        }
    }

    /// Point every node of this node's tree back at its parse-time nilmap.
    pub fn reset(&self) {
        let mut visibility = self.tree.visibility.write();
        #[cfg(feature = "tracing")]
        tracing::debug!(from = visibility.version, "tree reset");
        visibility.version = 0;
    }

    pub fn lock_while<R>(&self, f: impl FnOnce() -> R) -> R {
        self.tree.lock_while(f)
    }
}

/// Handle on the nilmap a fork created for one node. Writes always land in
/// that version, even if it is no longer the active one.
#[derive(Debug, Clone, Copy)]
pub struct ForkedLayer<'a> {
    tree: &'a Tree,
    idx: NodeIdx,
    version: usize,
}

impl<'a> ForkedLayer<'a> {
    #[must_use]
    pub fn version(&self) -> usize {
        self.version
    }

    #[must_use]
    pub fn node(&self) -> NodeRef<'a> {
        NodeRef {
            tree: self.tree,
            idx: self.idx,
        }
    }

    pub fn toggle(&self, id: NodeId, hidden: bool) -> Result<(), TreeError> {
        let mut visibility = self.tree.visibility.write();
        let layer = visibility.layers[self.idx.0]
            .get_mut(self.version)
            .ok_or(TreeError::StaleLayer {
                version: self.version,
            })?;
        layer.insert(id, hidden);
        Ok(())
    }

    pub fn snapshot(&self) -> Result<Nilmap, TreeError> {
        self.tree.visibility.read_recursive().layers[self.idx.0]
            .get(self.version)
            .cloned()
            .ok_or(TreeError::StaleLayer {
                version: self.version,
            })
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use tv_runtime::DefectCollector;
    use tv_types::{FieldType, NodeId, Nullable, Value};

    use super::{ColumnSpec, NewNode, NodeIdx, Tree, TreeBuilder, TreeError};

    fn two_column_tree(defects: &DefectCollector) -> Tree {
        let mut builder = TreeBuilder::new(defects);
        builder
            .add_column(ColumnSpec::new("A", FieldType::Utf8))
            .expect("column A");
        builder
            .add_column(ColumnSpec::new("B", FieldType::Utf8).nullable(Nullable::allowed()))
            .expect("column B");
        builder
            .push_row(vec![Value::from("Test"), Value::from("One")])
            .expect("row 1");
        builder
            .push_row(vec![Value::Null, Value::from("Two")])
            .expect("row 2");
        builder
            .push_row(vec![Value::from("Bar"), Value::Null])
            .expect("row 3");
        builder.finish()
    }

    #[test]
    fn add_tracks_parent_bounds_and_nilmap() {
        let mut tree = Tree::new(None);
        let col = tree
            .add(
                NodeIdx::ROOT,
                NewNode::column(1, "A", FieldType::Int32, Nullable::forbidden()),
                false,
            )
            .expect("column");
        tree.add(col, NewNode::cell(NodeId::new(1, 4), Value::Int32(4)), false)
            .expect("row 4");
        tree.add(col, NewNode::cell(NodeId::new(1, 2), Value::Null), true)
            .expect("row 2");

        let column = tree.node(col).expect("column ref");
        assert_eq!(column.max(), 4);
        assert_eq!(column.min(), 2);
        assert_eq!(column.excluded(NodeId::new(1, 2)), Ok(true));
        assert_eq!(column.excluded(NodeId::new(1, 4)), Ok(false));
        assert_eq!(
            column.find_by_id(NodeId::new(1, 4)).expect("cell").parent(),
            Some(column)
        );

        let err = tree
            .add(col, NewNode::cell(NodeId::new(1, 4), Value::Int32(9)), false)
            .expect_err("duplicate id");
        assert!(matches!(err, TreeError::DuplicateId { .. }));
    }

    #[test]
    fn find_resolves_names_and_ids() {
        let defects = DefectCollector::new();
        let tree = two_column_tree(&defects);
        let root = tree.root();
        let b = root.find("B").expect("B by name");
        assert_eq!(b.id(), NodeId::column_header(2));
        assert_eq!(root.find(NodeId::column_header(2)), Some(b));
        assert!(root.find("C").is_none());
        assert_eq!(
            b.find(NodeId::new(2, 2)).expect("cell").value(),
            &Value::from("Two")
        );
    }

    #[test]
    fn excluded_reports_unknown_ids() {
        let defects = DefectCollector::new();
        let tree = two_column_tree(&defects);
        let a = tree.root().find("A").expect("A");
        assert_eq!(
            a.excluded(NodeId::new(1, 9)),
            Err(TreeError::UnknownId(NodeId::new(1, 9)))
        );
        a.toggle(NodeId::new(1, 1), true);
        assert_eq!(a.excluded(NodeId::new(1, 1)), Ok(true));
        a.toggle(NodeId::new(1, 1), false);
        assert_eq!(a.excluded(NodeId::new(1, 1)), Ok(false));
    }

    #[test]
    fn excludes_only_counts_required_visible_columns() {
        let defects = DefectCollector::new();
        let tree = two_column_tree(&defects);
        let root = tree.root();

        // A is required and hides row 2; B is nullable so row 3 is kept.
        assert_eq!(root.excludes(), vec![false, false, true, false]);

        root.toggle(NodeId::column_header(1), true);
        assert_eq!(root.excludes(), vec![false; 4]);
    }

    #[test]
    fn fork_hides_everything_and_reset_restores_parse_state() {
        let defects = DefectCollector::new();
        let tree = two_column_tree(&defects);
        let root = tree.root();
        let a = root.find("A").expect("A");
        let parsed = a.null();

        let layer = a.fork();
        assert_eq!(layer.version(), 1);
        assert_eq!(tree.version(), 1);
        assert!(a.null().values().all(|hidden| *hidden));
        assert_eq!(
            a.null().keys().collect::<Vec<_>>(),
            parsed.keys().collect::<Vec<_>>()
        );
        assert!(root.null().values().all(|hidden| *hidden));

        layer
            .toggle(NodeId::new(1, 1), false)
            .expect("layer is live");
        assert_eq!(a.excluded(NodeId::new(1, 1)), Ok(false));

        root.reset();
        assert_eq!(tree.version(), 0);
        assert_eq!(a.null(), parsed);

        let again = root.fork();
        assert_eq!(again.version(), 1);
        assert_eq!(tree.version_count(), 2);
        assert_eq!(
            layer.snapshot().expect("slot reused").get(&NodeId::new(1, 1)),
            Some(&true)
        );
    }

    #[test]
    fn stale_layer_is_reported() {
        let defects = DefectCollector::new();
        let tree = two_column_tree(&defects);
        let root = tree.root();
        root.fork();
        let second = root.fork();
        root.reset();
        root.fork();
        assert_eq!(
            second.toggle(NodeId::column_header(1), false),
            Err(TreeError::StaleLayer { version: 2 })
        );
    }

    #[test]
    fn next_and_prev_are_first_write_wins() {
        let defects = DefectCollector::new();
        let mut tree = two_column_tree(&defects);
        let (a1, b1, b2) = {
            let root = tree.root();
            let a = root.find("A").expect("A");
            let b = root.find("B").expect("B");
            (
                a.find_by_id(NodeId::new(1, 1)).expect("a1").idx(),
                b.find_by_id(NodeId::new(2, 1)).expect("b1").idx(),
                b.find_by_id(NodeId::new(2, 2)).expect("b2").idx(),
            )
        };
        assert_eq!(tree.link_next(a1, b2), Ok(b1));

        let row = tree.row_cells(b1).expect("row");
        let values: Vec<_> = row.iter().map(|cell| cell.value().clone()).collect();
        assert_eq!(values, vec![Value::from("Test"), Value::from("One")]);
        assert!(row[0].prev().is_none());
        assert!(row[1].next().is_none());
    }

    #[test]
    fn lock_while_allows_nested_reads() {
        let defects = DefectCollector::new();
        let tree = two_column_tree(&defects);
        let excluded = tree.lock_while(|| tree.root().excludes());
        assert_eq!(excluded.len(), 4);
    }

    proptest! {
        #[test]
        fn fork_preserves_keys_and_aligns_versions(
            hidden in proptest::collection::vec(any::<bool>(), 1..24),
            forks in 1_usize..5,
        ) {
            let mut tree = Tree::new(None);
            let col = tree
                .add(
                    NodeIdx::ROOT,
                    NewNode::column(1, "X", FieldType::Bool, Nullable::forbidden()),
                    false,
                )
                .expect("column");
            for (i, h) in hidden.iter().enumerate() {
                let id = NodeId::new(1, i as u32 + 1);
                tree.add(col, NewNode::cell(id, Value::Bool(*h)), *h).expect("cell");
            }
            let column = tree.node(col).expect("column ref");
            let parsed = column.null();

            for n in 1..=forks {
                let before = column.null();
                column.fork();
                prop_assert_eq!(tree.version(), n);
                let after = column.null();
                prop_assert_eq!(after.keys().collect::<Vec<_>>(), before.keys().collect::<Vec<_>>());
                prop_assert!(after.values().all(|h| *h));
                prop_assert_eq!(tree.root().null().len(), 1);
            }
            prop_assert_eq!(tree.version_count(), forks + 1);
            prop_assert_eq!(tree.root().excludes().len(), hidden.len() + 1);

            tree.root().reset();
            prop_assert_eq!(tree.version(), 0);
            prop_assert_eq!(column.null(), parsed);
        }
    }
}
