//! Batched variable-size graphs with neighbourhood message passing and pooling.
//!
//! `nodegraph` packs many small attributed graphs into one flat store and runs
//! message passing over them without ever letting information cross a graph boundary:
//!
//! - Pack graphs of different sizes into one [`GraphBatch`]
//! - Select one graph ([`GraphView`]) or one named node kind ([`PartitionedGraphBatch`])
//! - Discover depth-bounded neighbourhoods ([`Traversal`])
//! - Aggregate neighbours with interchangeable strategies ([`AggregationStrategy`])
//! - Pool each graph into one embedding ([`AttentionPool`])
//!
//! # Crate Structure
//!
//! - [`nodegraph_core`] - Storage, views, partitions, batching, traversal
//! - [`nodegraph_nn`] - Aggregation strategies, neighbourhood module, segment ops, pooling
//!
//! # Example
//!
//! ```rust
//! use nodegraph::{batch_graphs, GraphBatch, NeighbourhoodConfig, NeighbourhoodModule, Reduction, UpdateMode};
//!
//! let mut triangle = GraphBatch::new();
//! for x in [1.0, 2.0, 3.0] {
//!     triangle.add_node(&[x]).unwrap();
//! }
//! triangle.add_edge(0, 1).unwrap();
//! triangle.add_edge(1, 2).unwrap();
//! triangle.add_edge(2, 0).unwrap();
//!
//! let mut pair = GraphBatch::new();
//! pair.add_node(&[10.0]).unwrap();
//! pair.add_node(&[20.0]).unwrap();
//! pair.add_edge(0, 1).unwrap();
//!
//! let mut batch = batch_graphs(&[triangle, pair]).unwrap();
//! let module = NeighbourhoodModule::new(Reduction::Sum, NeighbourhoodConfig::default());
//! module.forward(&mut batch, UpdateMode::Augment).unwrap();
//!
//! // Original column kept, neighbourhood sum appended.
//! assert_eq!(batch.node_row(0).unwrap(), &[1.0, 6.0]);
//! assert_eq!(batch.node_row(3).unwrap(), &[10.0, 30.0]);
//! ```
//!
//! # Pooling
//!
//! ```rust
//! use nodegraph::candle_core::{DType, Device};
//! use nodegraph::candle_nn::{VarBuilder, VarMap};
//! use nodegraph::{batch_graphs, AttentionPool, GraphBatch, PoolingConfig};
//!
//! let mut a = GraphBatch::new();
//! a.add_node(&[0.5, 1.0]).unwrap();
//! a.add_node(&[1.5, 0.0]).unwrap();
//! let mut b = GraphBatch::new();
//! b.add_node(&[2.0, 2.0]).unwrap();
//! let batch = batch_graphs(&[a, b]).unwrap();
//!
//! let varmap = VarMap::new();
//! let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
//! let pool = AttentionPool::new(PoolingConfig::new(2, 4), vb).unwrap();
//! let embeddings = pool.pool_batch(&batch).unwrap();
//! assert_eq!(embeddings.dims(), &[2, 4]);
//! ```

pub use nodegraph_core;
pub use nodegraph_nn;

// Re-export commonly used types
pub use nodegraph_core::{
    batch_graphs, petgraph, Batch, GraphBatch, GraphDescriptor, GraphView, GraphViewMut, MergePolicy,
    NodeSelection, NodeSelectionMut, PartitionView, PartitionedGraphBatch, PartitionedView,
    PartitionedViewMut, Traversal,
};
pub use nodegraph_nn::{
    candle_core, candle_nn, neighbourhood_adjacency, segment_softmax, segment_sum, Aggregate,
    AdjacencyAttention, AggregationStrategy, AttentionPool, AttentionScore, GraphResBlock, NeighbourAssignment,
    NeighbourAttention, NeighbourDotAttention, NeighbourLinear, NeighbourhoodConfig,
    NeighbourhoodModule, NodeLinear, PoolingConfig, Reduction, TensorFeatures, UpdateMode,
};

/// Error from the storage layer.
pub use nodegraph_core::Error as GraphError;
/// Error from the numeric layer; wraps [`GraphError`].
pub use nodegraph_nn::Error;
/// Result type alias for the numeric layer.
pub use nodegraph_nn::Result;
