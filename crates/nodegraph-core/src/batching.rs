//! Merging independent batches into one.

use crate::error::{Error, Result};
use crate::{GraphBatch, PartitionedGraphBatch};

/// A batch that can absorb another batch of the same kind.
pub trait Batch: Clone {
    /// Append `other` after `self`, re-basing its node indices.
    fn append_batch(&mut self, other: &Self) -> Result<()>;
}

impl Batch for GraphBatch {
    fn append_batch(&mut self, other: &Self) -> Result<()> {
        self.append(other)
    }
}

impl Batch for PartitionedGraphBatch {
    fn append_batch(&mut self, other: &Self) -> Result<()> {
        self.append(other)
    }
}

/// Concatenate `graphs` into one batch, in order.
///
/// The first batch is copied, so no input is modified. Node `i` of `graphs[k]` ends up
/// at global index `i + sum(node counts of graphs[..k])`.
///
/// # Example
///
/// ```rust
/// use nodegraph_core::{batch_graphs, GraphBatch};
///
/// let mut g1 = GraphBatch::new();
/// g1.add_node(&[0.0]).unwrap();
/// let mut g2 = GraphBatch::new();
/// g2.add_node(&[1.0]).unwrap();
/// g2.add_node(&[2.0]).unwrap();
/// g2.add_edge(0, 1).unwrap();
///
/// let batch = batch_graphs(&[g1, g2]).unwrap();
/// assert_eq!(batch.graph_node_counts(), &[1, 2]);
/// assert_eq!(batch.neighbours(1).unwrap(), &[2]);
/// ```
pub fn batch_graphs<B: Batch>(graphs: &[B]) -> Result<B> {
    let (first, rest) = graphs
        .split_first()
        .ok_or_else(|| Error::Construction("cannot batch an empty list of graphs".to_string()))?;

    let mut result = first.clone();
    for graph in rest {
        result.append_batch(graph)?;
    }
    tracing::debug!(inputs = graphs.len(), "batched graphs");
    Ok(result)
}
