//! Named node subsets over a graph batch.
//!
//! A [`PartitionedGraphBatch`] extends [`GraphBatch`] with named, ordered node subsets
//! ("kinds"), similar to node types in a heterogeneous graph. Operations can be
//! restricted to one subset by selecting a [`PartitionView`]:
//!
//! ```rust
//! use nodegraph_core::{PartitionView, PartitionedGraphBatch};
//!
//! let mut g = PartitionedGraphBatch::new();
//! let atom = g.add_kind("atom");
//! g.add_kind("bond");
//!
//! let c = g.add_node(&[1.0], "atom").unwrap();
//! let b = g.add_node(&[0.5], "bond").unwrap();
//! g.add_edge(c, b).unwrap();
//!
//! let view = g.view(atom).unwrap();
//! assert_eq!(view.active_nodes(), vec![c]);
//! assert!(g.view(PartitionView::None).unwrap().active_nodes().is_empty());
//! ```

use crate::error::{check_index, Error, Result};
use crate::{GraphBatch, GraphDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Which nodes of a partitioned batch an operation touches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PartitionView {
    /// Every node in the batch.
    #[default]
    All,
    /// No node at all.
    None,
    /// The nodes of one registered partition.
    Named(String),
}

impl PartitionView {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }
}

/// How partition maps are combined when two batches are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePolicy {
    /// Union of both name sets; a name missing on one side counts as empty.
    #[default]
    Union,
    /// Both operands must register exactly the same partition names.
    RequireMatching,
}

/// A graph batch with named node partitions.
///
/// Serializes as a [`GraphDescriptor`] carrying the partition map; deserialization
/// validates partition indices like [`PartitionedGraphBatch::from_descriptor`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "GraphDescriptor", into = "GraphDescriptor")]
pub struct PartitionedGraphBatch {
    batch: GraphBatch,
    partitions: BTreeMap<String, Vec<usize>>,
}

impl PartitionedGraphBatch {
    /// Create a batch holding a single empty graph and no partitions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing batch with an empty partition map.
    pub fn from_batch(batch: GraphBatch) -> Self {
        Self {
            batch,
            partitions: BTreeMap::new(),
        }
    }

    /// Build from an exchange descriptor; a missing partition map means no partitions.
    pub fn from_descriptor(desc: &GraphDescriptor) -> Result<Self> {
        let batch = GraphBatch::from_descriptor(desc)?;
        let partitions = desc.partition.clone().unwrap_or_default();
        for nodes in partitions.values() {
            for &node in nodes {
                check_index(node, batch.node_count())?;
            }
        }
        Ok(Self { batch, partitions })
    }

    pub fn to_descriptor(&self) -> GraphDescriptor {
        self.batch
            .to_descriptor()
            .with_partition(self.partitions.clone())
    }

    /// The underlying batch.
    pub fn batch(&self) -> &GraphBatch {
        &self.batch
    }

    pub fn into_inner(self) -> GraphBatch {
        self.batch
    }

    pub(crate) fn batch_mut(&mut self) -> &mut GraphBatch {
        &mut self.batch
    }

    /// Register partition `name` and return its selector.
    ///
    /// Registering a name twice keeps the nodes already assigned to it.
    pub fn add_kind(&mut self, name: impl Into<String>) -> PartitionView {
        let name = name.into();
        self.partitions.entry(name.clone()).or_default();
        PartitionView::Named(name)
    }

    /// Registered partition names, sorted.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.partitions.keys().map(String::as_str)
    }

    /// Node indices of one partition, in insertion order.
    pub fn partition(&self, name: &str) -> Result<&[usize]> {
        self.partitions
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::UnknownPartition(name.to_string()))
    }

    /// Append a node and record it in partition `kind`.
    pub fn add_node(&mut self, feature: &[f32], kind: &str) -> Result<usize> {
        if !self.partitions.contains_key(kind) {
            return Err(Error::UnknownPartition(kind.to_string()));
        }
        let node = self.batch.add_node(feature)?;
        self.partitions.entry(kind.to_string()).or_default().push(node);
        Ok(node)
    }

    pub fn add_edge(&mut self, source: usize, target: usize) -> Result<usize> {
        self.batch.add_edge(source, target)
    }

    /// Merge `other` after this batch, taking the union of both partition maps.
    pub fn append(&mut self, other: &PartitionedGraphBatch) -> Result<()> {
        self.append_with(other, MergePolicy::Union)
    }

    /// Merge `other` after this batch under the given partition policy.
    ///
    /// Indices coming from `other` are shifted by the pre-merge node count, exactly like
    /// its adjacency. On error the batch is left unchanged.
    pub fn append_with(&mut self, other: &PartitionedGraphBatch, policy: MergePolicy) -> Result<()> {
        let ours: BTreeSet<&String> = self.partitions.keys().collect();
        let theirs: BTreeSet<&String> = other.partitions.keys().collect();
        if policy == MergePolicy::RequireMatching && ours != theirs {
            return Err(Error::View(format!(
                "partition names differ: {:?} vs {:?}",
                ours, theirs
            )));
        }

        let shift = self.batch.node_count();
        let mut merged = self.partitions.clone();
        for (name, nodes) in &other.partitions {
            merged
                .entry(name.clone())
                .or_default()
                .extend(nodes.iter().map(|&n| n + shift));
        }

        self.batch.append(&other.batch)?;
        tracing::debug!(
            partitions = merged.len(),
            shift,
            "merged partition maps"
        );
        self.partitions = merged;
        Ok(())
    }

    /// Nodes selected by `selector`, ascending for `All`.
    pub fn active_nodes(&self, selector: &PartitionView) -> Result<Vec<usize>> {
        match selector {
            PartitionView::All => Ok((0..self.batch.node_count()).collect()),
            PartitionView::None => Ok(Vec::new()),
            PartitionView::Named(name) => self.partition(name).map(<[usize]>::to_vec),
        }
    }

    /// Read-only view restricted to `selector`.
    pub fn view(&self, selector: PartitionView) -> Result<PartitionedView<'_>> {
        let nodes = self.active_nodes(&selector)?;
        Ok(PartitionedView {
            root: self,
            selector,
            nodes,
        })
    }

    /// Writable view restricted to `selector`.
    pub fn view_mut(&mut self, selector: PartitionView) -> Result<PartitionedViewMut<'_>> {
        let nodes = self.active_nodes(&selector)?;
        Ok(PartitionedViewMut {
            root: self,
            selector,
            nodes,
        })
    }

    /// View over every node.
    pub fn all(&self) -> PartitionedView<'_> {
        PartitionedView {
            root: self,
            selector: PartitionView::All,
            nodes: (0..self.batch.node_count()).collect(),
        }
    }

    /// View over no node.
    pub fn none(&self) -> PartitionedView<'_> {
        PartitionedView {
            root: self,
            selector: PartitionView::None,
            nodes: Vec::new(),
        }
    }
}

impl TryFrom<GraphDescriptor> for PartitionedGraphBatch {
    type Error = Error;

    fn try_from(desc: GraphDescriptor) -> Result<Self> {
        Self::from_descriptor(&desc)
    }
}

impl From<PartitionedGraphBatch> for GraphDescriptor {
    fn from(batch: PartitionedGraphBatch) -> Self {
        batch.to_descriptor()
    }
}

/// Read-only window onto the nodes of one partition selector.
#[derive(Debug, Clone)]
pub struct PartitionedView<'a> {
    root: &'a PartitionedGraphBatch,
    selector: PartitionView,
    nodes: Vec<usize>,
}

impl<'a> PartitionedView<'a> {
    pub fn selector(&self) -> &PartitionView {
        &self.selector
    }

    pub fn root(&self) -> &'a PartitionedGraphBatch {
        self.root
    }

    /// Nodes this view touches.
    pub fn active_nodes(&self) -> Vec<usize> {
        self.nodes.clone()
    }

    /// Feature rows of the active nodes, in partition order.
    pub fn node_rows(&self) -> Vec<&'a [f32]> {
        let batch = self.root.batch();
        self.nodes
            .iter()
            .filter_map(|&n| batch.node_row(n).ok())
            .collect()
    }
}

/// Writable window onto the nodes of one partition selector.
///
/// Feature writes go to the root storage; structural mutation is refused.
#[derive(Debug)]
pub struct PartitionedViewMut<'a> {
    root: &'a mut PartitionedGraphBatch,
    selector: PartitionView,
    nodes: Vec<usize>,
}

impl<'a> PartitionedViewMut<'a> {
    pub fn selector(&self) -> &PartitionView {
        &self.selector
    }

    pub fn active_nodes(&self) -> Vec<usize> {
        self.nodes.clone()
    }

    pub(crate) fn root(&self) -> &PartitionedGraphBatch {
        &*self.root
    }

    pub(crate) fn root_mut(&mut self) -> &mut PartitionedGraphBatch {
        &mut *self.root
    }

    /// Overwrite the active rows with consecutive rows of `values`.
    pub fn set_node_features(&mut self, values: &[f32]) -> Result<()> {
        let nodes = self.nodes.clone();
        self.root.batch_mut().set_rows(&nodes, values)
    }

    pub fn add_node(&mut self, _feature: &[f32]) -> Result<usize> {
        Err(Error::View(format!(
            "add_node is not allowed on partition view {:?}",
            self.selector
        )))
    }

    pub fn append(&mut self, _other: &PartitionedGraphBatch) -> Result<()> {
        Err(Error::View(format!(
            "append is not allowed on partition view {:?}",
            self.selector
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn molecule() -> PartitionedGraphBatch {
        let mut g = PartitionedGraphBatch::new();
        g.add_kind("atom");
        g.add_kind("bond");
        let a = g.add_node(&[1.0, 0.0], "atom").unwrap();
        let b = g.add_node(&[0.0, 1.0], "bond").unwrap();
        let c = g.add_node(&[1.0, 1.0], "atom").unwrap();
        g.add_edge(a, b).unwrap();
        g.add_edge(b, c).unwrap();
        g
    }

    #[test]
    fn test_add_node_records_kind() {
        let g = molecule();
        assert_eq!(g.partition("atom").unwrap(), &[0, 2]);
        assert_eq!(g.partition("bond").unwrap(), &[1]);
        assert_eq!(g.batch().graph_node_counts(), &[3]);
    }

    #[test]
    fn test_add_node_unknown_kind_is_atomic() {
        let mut g = molecule();
        let before = g.clone();
        assert_eq!(
            g.add_node(&[0.0, 0.0], "ring"),
            Err(Error::UnknownPartition("ring".to_string()))
        );
        assert_eq!(g, before);
    }

    #[test]
    fn test_add_kind_twice_keeps_nodes() {
        let mut g = molecule();
        let sel = g.add_kind("atom");
        assert_eq!(sel, PartitionView::named("atom"));
        assert_eq!(g.partition("atom").unwrap(), &[0, 2]);
    }

    #[test]
    fn test_append_rebases_partitions() {
        let mut a = molecule();
        let mut b = PartitionedGraphBatch::new();
        b.add_kind("atom");
        b.add_kind("charge");
        b.add_node(&[2.0, 2.0], "charge").unwrap();
        b.add_node(&[3.0, 3.0], "atom").unwrap();

        a.append(&b).unwrap();
        assert_eq!(a.partition("atom").unwrap(), &[0, 2, 4]);
        assert_eq!(a.partition("bond").unwrap(), &[1]);
        assert_eq!(a.partition("charge").unwrap(), &[3]);
        assert_eq!(a.batch().graph_node_counts(), &[3, 2]);
    }

    #[test]
    fn test_append_require_matching() {
        let mut a = molecule();
        let mut b = PartitionedGraphBatch::new();
        b.add_kind("atom");
        b.add_node(&[0.0, 0.0], "atom").unwrap();

        let before = a.clone();
        assert!(matches!(
            a.append_with(&b, MergePolicy::RequireMatching),
            Err(Error::View(_))
        ));
        assert_eq!(a, before);

        b.add_kind("bond");
        a.append_with(&b, MergePolicy::RequireMatching).unwrap();
        assert_eq!(a.partition("atom").unwrap(), &[0, 2, 3]);
    }

    #[test]
    fn test_views_select_nodes() {
        let g = molecule();
        assert_eq!(g.all().active_nodes(), vec![0, 1, 2]);
        assert!(g.none().active_nodes().is_empty());

        let bonds = g.view(PartitionView::named("bond")).unwrap();
        assert_eq!(bonds.node_rows(), vec![&[0.0f32, 1.0][..]]);
        assert!(matches!(
            g.view(PartitionView::named("ring")),
            Err(Error::UnknownPartition(_))
        ));
    }

    #[test]
    fn test_view_mut_writes_partition_rows() {
        let mut g = molecule();
        {
            let mut atoms = g.view_mut(PartitionView::named("atom")).unwrap();
            atoms.set_node_features(&[9.0, 9.0, 8.0, 8.0]).unwrap();
            assert!(matches!(atoms.add_node(&[0.0, 0.0]), Err(Error::View(_))));
        }
        assert_eq!(g.batch().node_row(0).unwrap(), &[9.0, 9.0]);
        assert_eq!(g.batch().node_row(1).unwrap(), &[0.0, 1.0]);
        assert_eq!(g.batch().node_row(2).unwrap(), &[8.0, 8.0]);
    }

    #[test]
    fn test_descriptor_roundtrip() {
        let g = molecule();
        let back = PartitionedGraphBatch::from_descriptor(&g.to_descriptor()).unwrap();
        assert_eq!(back, g);
    }

    #[test]
    fn test_descriptor_rejects_bad_partition_index() {
        let mut desc = molecule().to_descriptor();
        if let Some(p) = desc.partition.as_mut() {
            p.insert("ghost".to_string(), vec![7]);
        }
        assert_eq!(
            PartitionedGraphBatch::from_descriptor(&desc),
            Err(Error::Index { index: 7, len: 3 })
        );
    }

    #[test]
    fn test_serde_roundtrip() {
        let g = molecule();
        let json = serde_json::to_string(&g).unwrap();
        let back: PartitionedGraphBatch = serde_json::from_str(&json).unwrap();
        assert_eq!(back, g);
    }

    #[test]
    fn test_deserialize_rejects_bad_partition_index() {
        let json = r#"{"graph_count":1,"graph_node_counts":[1],"adjacency":[[]],"node_features":[[0.5]],"partition":{"a":[99]}}"#;
        let err = serde_json::from_str::<PartitionedGraphBatch>(json).unwrap_err();
        assert!(err.to_string().contains("99"), "{err}");
    }
}
