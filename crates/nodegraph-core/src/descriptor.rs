//! Exchange descriptor for batches handed over by the surrounding framework.
//!
//! A descriptor is the plain-data form of a [`GraphBatch`](crate::GraphBatch) or
//! [`PartitionedGraphBatch`](crate::PartitionedGraphBatch):
//!
//! ```text
//! { graph_count, graph_node_counts, adjacency, node_features [, partition] }
//! ```
//!
//! It derives serde traits so callers can move it through whatever format they already
//! use. Validation happens when a batch is built from it, never here.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Plain-data description of a graph batch.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphDescriptor {
    /// Number of graphs packed in the batch.
    pub graph_count: usize,
    /// Node count per graph, in batch order.
    pub graph_node_counts: Vec<usize>,
    /// Neighbour list per node, using global node indices.
    pub adjacency: Vec<Vec<usize>>,
    /// One feature row per node.
    pub node_features: Vec<Vec<f32>>,
    /// Named node subsets (partitioned batches only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<BTreeMap<String, Vec<usize>>>,
}

impl GraphDescriptor {
    /// Descriptor for a single graph.
    pub fn single(adjacency: Vec<Vec<usize>>, node_features: Vec<Vec<f32>>) -> Self {
        Self {
            graph_count: 1,
            graph_node_counts: vec![node_features.len()],
            adjacency,
            node_features,
            partition: None,
        }
    }

    /// Attach a partition map.
    pub fn with_partition(mut self, partition: BTreeMap<String, Vec<usize>>) -> Self {
        self.partition = Some(partition);
        self
    }
}
