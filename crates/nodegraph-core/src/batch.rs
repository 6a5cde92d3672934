use crate::error::{check_index, Error, Result};
use crate::GraphDescriptor;
use petgraph::graph::UnGraph;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Many graphs of different sizes packed into one flat store.
///
/// Nodes are identified by their row in the feature array. Graph `g` owns the
/// contiguous row range that follows the rows of graphs `0..g`. Adjacency lists use
/// global row indices, so a view onto one graph still sees global neighbour ids.
///
/// Invariants:
/// - `graph_node_counts.iter().sum() == node_count()`
/// - every adjacency entry is in `[0, node_count())`
/// - edges inserted through [`GraphBatch::add_edge`] are symmetric
///
/// Serde goes through [`GraphDescriptor`], so a deserialized batch is validated exactly
/// like one built with [`GraphBatch::from_descriptor`].
///
/// # Example
///
/// ```rust
/// use nodegraph_core::GraphBatch;
///
/// let mut g = GraphBatch::new();
/// let a = g.add_node(&[1.0, 0.0]).unwrap();
/// let b = g.add_node(&[0.0, 1.0]).unwrap();
/// g.add_edge(a, b).unwrap();
///
/// assert_eq!(g.node_count(), 2);
/// assert_eq!(g.graph_node_counts(), &[2]);
/// assert_eq!(g.neighbours(b).unwrap(), &[a]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GraphDescriptor", into = "GraphDescriptor")]
pub struct GraphBatch {
    /// Row-major node features, `node_count() * feature_dim` values.
    features: Vec<f32>,
    feature_dim: usize,
    graph_node_counts: Vec<usize>,
    adjacency: Vec<Vec<usize>>,
}

impl Default for GraphBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBatch {
    /// Create a batch holding a single empty graph.
    pub fn new() -> Self {
        Self {
            features: Vec::new(),
            feature_dim: 0,
            graph_node_counts: vec![0],
            adjacency: Vec::new(),
        }
    }

    /// Build a batch from its exchange descriptor.
    ///
    /// Rejects the descriptor eagerly if the declared sizes disagree with the arrays;
    /// nothing is truncated.
    pub fn from_descriptor(desc: &GraphDescriptor) -> Result<Self> {
        if desc.graph_count != desc.graph_node_counts.len() {
            return Err(Error::Construction(format!(
                "graph_count is {} but {} node counts were given",
                desc.graph_count,
                desc.graph_node_counts.len()
            )));
        }

        let feature_dim = desc.node_features.first().map_or(0, Vec::len);
        let mut features = Vec::with_capacity(desc.node_features.len() * feature_dim);
        for (i, row) in desc.node_features.iter().enumerate() {
            if row.len() != feature_dim {
                return Err(Error::Construction(format!(
                    "feature row {i} has width {}, expected {feature_dim}",
                    row.len()
                )));
            }
            features.extend_from_slice(row);
        }

        Self::from_parts(
            desc.graph_node_counts.clone(),
            desc.adjacency.clone(),
            features,
            feature_dim,
        )
    }

    /// Build a batch from raw parts, validating every invariant.
    pub fn from_parts(
        graph_node_counts: Vec<usize>,
        adjacency: Vec<Vec<usize>>,
        features: Vec<f32>,
        feature_dim: usize,
    ) -> Result<Self> {
        let rows = if feature_dim == 0 {
            adjacency.len()
        } else {
            if features.len() % feature_dim != 0 {
                return Err(Error::Construction(format!(
                    "{} feature values do not divide into rows of width {feature_dim}",
                    features.len()
                )));
            }
            features.len() / feature_dim
        };
        if feature_dim == 0 && !features.is_empty() {
            return Err(Error::Construction(
                "feature values given with zero feature width".to_string(),
            ));
        }

        let total: usize = graph_node_counts.iter().sum();
        if total != rows {
            return Err(Error::Construction(format!(
                "graph node counts sum to {total} but there are {rows} feature rows"
            )));
        }
        if adjacency.len() != rows {
            return Err(Error::Construction(format!(
                "{} adjacency lists for {rows} nodes",
                adjacency.len()
            )));
        }
        for neighbours in &adjacency {
            for &j in neighbours {
                check_index(j, rows)?;
            }
        }

        Ok(Self {
            features,
            feature_dim,
            graph_node_counts,
            adjacency,
        })
    }

    /// Export the batch as an exchange descriptor.
    pub fn to_descriptor(&self) -> GraphDescriptor {
        GraphDescriptor {
            graph_count: self.graph_count(),
            graph_node_counts: self.graph_node_counts.clone(),
            adjacency: self.adjacency.clone(),
            node_features: self.rows().map(<[f32]>::to_vec).collect(),
            partition: None,
        }
    }

    /// Total number of nodes across all graphs.
    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Number of graphs in the batch.
    pub fn graph_count(&self) -> usize {
        self.graph_node_counts.len()
    }

    /// Width of every feature row.
    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    /// Node count of each graph, in batch order.
    pub fn graph_node_counts(&self) -> &[usize] {
        &self.graph_node_counts
    }

    /// Neighbour lists of all nodes.
    pub fn adjacency(&self) -> &[Vec<usize>] {
        &self.adjacency
    }

    /// Neighbours of one node.
    pub fn neighbours(&self, node: usize) -> Result<&[usize]> {
        check_index(node, self.node_count())?;
        Ok(self.adjacency[node].as_slice())
    }

    /// The flat row-major feature array.
    pub fn node_features(&self) -> &[f32] {
        &self.features
    }

    /// Feature row of one node.
    pub fn node_row(&self, node: usize) -> Result<&[f32]> {
        check_index(node, self.node_count())?;
        Ok(self.row_unchecked(node))
    }

    fn row_unchecked(&self, node: usize) -> &[f32] {
        &self.features[node * self.feature_dim..(node + 1) * self.feature_dim]
    }

    /// Iterate over feature rows in node order.
    pub fn rows(&self) -> impl Iterator<Item = &[f32]> + '_ {
        (0..self.node_count()).map(move |i| self.row_unchecked(i))
    }

    /// Global row range owned by graph `graph`.
    pub fn graph_range(&self, graph: usize) -> Result<Range<usize>> {
        let len = self.graph_count();
        if graph >= len {
            return Err(Error::View(format!(
                "graph {graph} out of range for a batch of {len} graphs"
            )));
        }
        Ok(self.range_unchecked(graph))
    }

    fn range_unchecked(&self, graph: usize) -> Range<usize> {
        let start: usize = self.graph_node_counts[..graph].iter().sum();
        start..start + self.graph_node_counts[graph]
    }

    /// Owning graph of every node.
    pub fn graph_ids(&self) -> Vec<usize> {
        self.graph_node_counts
            .iter()
            .enumerate()
            .flat_map(|(g, &count)| std::iter::repeat(g).take(count))
            .collect()
    }

    /// Append a node to the (single) graph, returning its index.
    ///
    /// Only legal on a batch holding exactly one graph. The first node of an empty
    /// batch fixes the feature width.
    pub fn add_node(&mut self, feature: &[f32]) -> Result<usize> {
        if self.graph_count() != 1 {
            return Err(Error::View(format!(
                "add_node requires a single-graph batch, this one holds {} graphs",
                self.graph_count()
            )));
        }
        if self.node_count() > 0 && feature.len() != self.feature_dim {
            return Err(Error::Construction(format!(
                "node feature has width {}, batch width is {}",
                feature.len(),
                self.feature_dim
            )));
        }
        if self.node_count() == 0 {
            self.feature_dim = feature.len();
        }

        let index = self.node_count();
        self.features.extend_from_slice(feature);
        self.adjacency.push(Vec::new());
        self.graph_node_counts[0] += 1;
        Ok(index)
    }

    /// Insert an undirected edge, returning the slot of `target` in `source`'s list.
    pub fn add_edge(&mut self, source: usize, target: usize) -> Result<usize> {
        let len = self.node_count();
        check_index(source, len)?;
        check_index(target, len)?;

        let slot = self.adjacency[source].len();
        self.adjacency[source].push(target);
        self.adjacency[target].push(source);
        Ok(slot)
    }

    /// Append another batch after this one.
    ///
    /// `other`'s adjacency indices are shifted by the current node count, then features,
    /// adjacency and graph node counts are concatenated.
    pub fn append(&mut self, other: &GraphBatch) -> Result<()> {
        if self.node_count() > 0 && other.node_count() > 0 && self.feature_dim != other.feature_dim
        {
            return Err(Error::Construction(format!(
                "cannot append width-{} features to a width-{} batch",
                other.feature_dim, self.feature_dim
            )));
        }

        let shift = self.node_count();
        tracing::debug!(
            shift,
            graphs = other.graph_count(),
            nodes = other.node_count(),
            "appending graph batch"
        );

        if self.node_count() == 0 {
            self.feature_dim = other.feature_dim;
        }
        self.adjacency.extend(
            other
                .adjacency
                .iter()
                .map(|neighbours| neighbours.iter().map(|&j| j + shift).collect::<Vec<_>>()),
        );
        self.features.extend_from_slice(&other.features);
        self.graph_node_counts
            .extend_from_slice(&other.graph_node_counts);
        Ok(())
    }

    /// Split the batch back into standalone single-graph batches with local adjacency.
    pub fn split(&self) -> Vec<GraphBatch> {
        (0..self.graph_count())
            .map(|graph| {
                GraphView {
                    batch: self,
                    graph,
                    range: self.range_unchecked(graph),
                }
                .to_batch()
            })
            .collect()
    }

    /// Read-only window onto one graph.
    pub fn view(&self, graph: usize) -> Result<GraphView<'_>> {
        let range = self.graph_range(graph)?;
        Ok(GraphView {
            batch: self,
            graph,
            range,
        })
    }

    /// Writable window onto one graph; writes land in this batch's storage.
    pub fn view_mut(&mut self, graph: usize) -> Result<GraphViewMut<'_>> {
        let range = self.graph_range(graph)?;
        Ok(GraphViewMut {
            batch: self,
            graph,
            range,
        })
    }

    /// Replace the whole feature matrix. The width may change, the row count may not.
    pub fn set_node_features(&mut self, features: Vec<f32>, feature_dim: usize) -> Result<()> {
        let rows = self.node_count();
        if features.len() != rows * feature_dim {
            return Err(Error::Construction(format!(
                "{} values cannot form {rows} rows of width {feature_dim}",
                features.len()
            )));
        }
        self.features = features;
        self.feature_dim = feature_dim;
        Ok(())
    }

    /// Overwrite the feature rows of `nodes` with consecutive rows of `values`.
    pub fn set_rows(&mut self, nodes: &[usize], values: &[f32]) -> Result<()> {
        let dim = self.feature_dim;
        if values.len() != nodes.len() * dim {
            return Err(Error::Construction(format!(
                "{} values cannot fill {} rows of width {dim}",
                values.len(),
                nodes.len()
            )));
        }
        for &node in nodes {
            check_index(node, self.node_count())?;
        }
        for (k, &node) in nodes.iter().enumerate() {
            self.features[node * dim..(node + 1) * dim]
                .copy_from_slice(&values[k * dim..(k + 1) * dim]);
        }
        Ok(())
    }

    /// Export the whole batch as an undirected petgraph graph.
    pub fn to_petgraph(&self) -> UnGraph<usize, ()> {
        export_petgraph(&self.adjacency, 0..self.node_count())
    }
}

/// Build an undirected petgraph over `range`, node weights being global indices.
///
/// Each symmetric pair becomes one edge; a one-sided entry still yields an edge.
/// `add_edge(i, i)` stores `i` twice in its own list, so self entries count in pairs.
fn export_petgraph(adjacency: &[Vec<usize>], range: Range<usize>) -> UnGraph<usize, ()> {
    let mut graph = UnGraph::with_capacity(range.len(), 0);
    let nodes: Vec<_> = range.clone().map(|i| graph.add_node(i)).collect();
    for i in range.clone() {
        let mut unpaired_self = false;
        for &j in &adjacency[i] {
            if !range.contains(&j) {
                continue;
            }
            if i == j {
                unpaired_self = !unpaired_self;
                if unpaired_self {
                    graph.add_edge(nodes[i - range.start], nodes[i - range.start], ());
                }
                continue;
            }
            let mirrored = adjacency[j].contains(&i);
            if i < j || !mirrored {
                graph.add_edge(nodes[i - range.start], nodes[j - range.start], ());
            }
        }
    }
    graph
}

impl TryFrom<GraphDescriptor> for GraphBatch {
    type Error = Error;

    fn try_from(desc: GraphDescriptor) -> Result<Self> {
        Self::from_descriptor(&desc)
    }
}

impl From<GraphBatch> for GraphDescriptor {
    fn from(batch: GraphBatch) -> Self {
        batch.to_descriptor()
    }
}

/// Read-only window selecting one graph of a batch by position.
#[derive(Debug, Clone)]
pub struct GraphView<'a> {
    batch: &'a GraphBatch,
    graph: usize,
    range: Range<usize>,
}

impl<'a> GraphView<'a> {
    /// Position of the viewed graph in the batch.
    pub fn offset(&self) -> usize {
        self.graph
    }

    /// Global row range of the viewed graph.
    pub fn node_range(&self) -> Range<usize> {
        self.range.clone()
    }

    pub fn node_count(&self) -> usize {
        self.range.len()
    }

    /// The batch this view borrows from.
    pub fn root(&self) -> &'a GraphBatch {
        self.batch
    }

    /// Feature rows of this graph only.
    pub fn node_features(&self) -> &'a [f32] {
        let dim = self.batch.feature_dim;
        &self.batch.features[self.range.start * dim..self.range.end * dim]
    }

    /// Neighbour lists of this graph's nodes, holding global indices.
    pub fn adjacency(&self) -> &'a [Vec<usize>] {
        &self.batch.adjacency[self.range.clone()]
    }

    /// Neighbour lists re-based to graph-local indices.
    ///
    /// Entries pointing outside this graph are dropped.
    pub fn local_adjacency(&self) -> Vec<Vec<usize>> {
        let range = self.range.clone();
        self.adjacency()
            .iter()
            .map(|neighbours| {
                neighbours
                    .iter()
                    .filter(|j| range.contains(j))
                    .map(|&j| j - range.start)
                    .collect()
            })
            .collect()
    }

    /// Copy the viewed graph out into a standalone batch.
    pub fn to_batch(&self) -> GraphBatch {
        GraphBatch {
            features: self.node_features().to_vec(),
            feature_dim: self.batch.feature_dim,
            graph_node_counts: vec![self.node_count()],
            adjacency: self.local_adjacency(),
        }
    }

    /// Export the viewed graph as an undirected petgraph graph.
    pub fn to_petgraph(&self) -> UnGraph<usize, ()> {
        export_petgraph(&self.batch.adjacency, self.range.clone())
    }
}

/// Writable window selecting one graph of a batch by position.
///
/// Feature writes go straight to the root storage. Structural mutation is refused.
#[derive(Debug)]
pub struct GraphViewMut<'a> {
    batch: &'a mut GraphBatch,
    graph: usize,
    range: Range<usize>,
}

impl<'a> GraphViewMut<'a> {
    pub fn offset(&self) -> usize {
        self.graph
    }

    pub fn node_range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// Reborrow as a read-only view.
    pub fn as_view(&self) -> GraphView<'_> {
        GraphView {
            batch: &*self.batch,
            graph: self.graph,
            range: self.range.clone(),
        }
    }

    pub(crate) fn root_mut(&mut self) -> &mut GraphBatch {
        &mut *self.batch
    }

    pub(crate) fn root(&self) -> &GraphBatch {
        &*self.batch
    }

    /// Mutable feature rows of this graph only.
    pub fn node_features_mut(&mut self) -> &mut [f32] {
        let dim = self.batch.feature_dim;
        &mut self.batch.features[self.range.start * dim..self.range.end * dim]
    }

    /// Overwrite this graph's feature rows.
    pub fn set_node_features(&mut self, values: &[f32]) -> Result<()> {
        let nodes: Vec<usize> = self.range.clone().collect();
        self.batch.set_rows(&nodes, values)
    }

    pub fn add_node(&mut self, _feature: &[f32]) -> Result<usize> {
        Err(self.refuse("add_node"))
    }

    pub fn add_edge(&mut self, _source: usize, _target: usize) -> Result<usize> {
        Err(self.refuse("add_edge"))
    }

    pub fn append(&mut self, _other: &GraphBatch) -> Result<()> {
        Err(self.refuse("append"))
    }

    fn refuse(&self, op: &str) -> Error {
        Error::View(format!(
            "{op} is not allowed on a view of graph {}; mutate the root batch",
            self.graph
        ))
    }
}
