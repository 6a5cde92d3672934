//! The active node set an operation runs over.
//!
//! Layers do not care whether they are handed a whole batch, one graph of it, or one
//! partition: they ask for the root storage plus the list of nodes to touch.

use crate::error::Result;
use crate::{GraphBatch, GraphView, GraphViewMut, PartitionedGraphBatch, PartitionedView, PartitionedViewMut};

/// Read access to a batch together with the nodes an operation should touch.
pub trait NodeSelection {
    /// Root storage. Adjacency and feature rows use its global indices.
    fn graph(&self) -> &GraphBatch;

    /// Nodes in scope, in processing order.
    fn active_nodes(&self) -> Vec<usize>;
}

/// Feature write-back for a [`NodeSelection`].
///
/// Only feature values can change through this trait, never structure.
pub trait NodeSelectionMut: NodeSelection {
    /// Replace the feature matrix of the root batch. Width may change.
    fn replace_features(&mut self, features: Vec<f32>, feature_dim: usize) -> Result<()>;

    /// Overwrite the active rows, in `active_nodes()` order.
    fn set_active_rows(&mut self, values: &[f32]) -> Result<()> {
        let nodes = self.active_nodes();
        let mut features = self.graph().node_features().to_vec();
        let dim = self.graph().feature_dim();
        if values.len() != nodes.len() * dim {
            return Err(crate::Error::Construction(format!(
                "{} values cannot fill {} rows of width {dim}",
                values.len(),
                nodes.len()
            )));
        }
        for (k, &node) in nodes.iter().enumerate() {
            features[node * dim..(node + 1) * dim].copy_from_slice(&values[k * dim..(k + 1) * dim]);
        }
        self.replace_features(features, dim)
    }
}

impl NodeSelection for GraphBatch {
    fn graph(&self) -> &GraphBatch {
        self
    }

    fn active_nodes(&self) -> Vec<usize> {
        (0..self.node_count()).collect()
    }
}

impl NodeSelectionMut for GraphBatch {
    fn replace_features(&mut self, features: Vec<f32>, feature_dim: usize) -> Result<()> {
        self.set_node_features(features, feature_dim)
    }
}

impl NodeSelection for GraphView<'_> {
    fn graph(&self) -> &GraphBatch {
        self.root()
    }

    fn active_nodes(&self) -> Vec<usize> {
        self.node_range().collect()
    }
}

impl NodeSelection for GraphViewMut<'_> {
    fn graph(&self) -> &GraphBatch {
        self.root()
    }

    fn active_nodes(&self) -> Vec<usize> {
        self.node_range().collect()
    }
}

impl NodeSelectionMut for GraphViewMut<'_> {
    fn replace_features(&mut self, features: Vec<f32>, feature_dim: usize) -> Result<()> {
        self.root_mut().set_node_features(features, feature_dim)
    }
}

impl NodeSelection for PartitionedGraphBatch {
    fn graph(&self) -> &GraphBatch {
        self.batch()
    }

    fn active_nodes(&self) -> Vec<usize> {
        (0..self.batch().node_count()).collect()
    }
}

impl NodeSelectionMut for PartitionedGraphBatch {
    fn replace_features(&mut self, features: Vec<f32>, feature_dim: usize) -> Result<()> {
        self.batch_mut().set_node_features(features, feature_dim)
    }
}

impl NodeSelection for PartitionedView<'_> {
    fn graph(&self) -> &GraphBatch {
        self.root().batch()
    }

    fn active_nodes(&self) -> Vec<usize> {
        PartitionedView::active_nodes(self)
    }
}

impl NodeSelection for PartitionedViewMut<'_> {
    fn graph(&self) -> &GraphBatch {
        self.root().batch()
    }

    fn active_nodes(&self) -> Vec<usize> {
        PartitionedViewMut::active_nodes(self)
    }
}

impl NodeSelectionMut for PartitionedViewMut<'_> {
    fn replace_features(&mut self, features: Vec<f32>, feature_dim: usize) -> Result<()> {
        self.root_mut().batch_mut().set_node_features(features, feature_dim)
    }
}
