// Allow minor clippy style warnings at crate level
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]

//! Flat storage for batches of variable-size attributed graphs.
//!
//! This crate provides the structural layer for message passing over many small graphs
//! at once:
//!
//! - [`GraphBatch`] - node features, per-graph node counts and adjacency in one flat store
//! - [`GraphView`] / [`GraphViewMut`] - windows onto one graph, sharing the root storage
//! - [`PartitionedGraphBatch`] - named node subsets and [`PartitionView`] selection
//! - [`batch_graphs`] - concatenate independent batches, re-basing node indices
//! - [`Traversal`] - depth-bounded neighbourhood discovery
//! - [`GraphDescriptor`] - plain-data exchange form
//!
//! Numeric work (aggregation, pooling) lives in `nodegraph-nn`.
//!
//! # Example
//!
//! ```rust
//! use nodegraph_core::{batch_graphs, GraphBatch, Traversal};
//!
//! let mut g1 = GraphBatch::new();
//! for x in [0.0, 1.0, 2.0] {
//!     g1.add_node(&[x]).unwrap();
//! }
//! g1.add_edge(0, 1).unwrap();
//! g1.add_edge(1, 2).unwrap();
//!
//! let mut g2 = GraphBatch::new();
//! g2.add_node(&[3.0]).unwrap();
//! g2.add_node(&[4.0]).unwrap();
//! g2.add_edge(0, 1).unwrap();
//!
//! let batch = batch_graphs(&[g1, g2]).unwrap();
//! assert_eq!(batch.graph_node_counts(), &[3, 2]);
//!
//! let hood = Traversal::new(1).neighbourhood(batch.adjacency(), 3).unwrap();
//! assert_eq!(hood, vec![3, 4]);
//! ```

mod batch;
mod batching;
mod descriptor;
mod error;
pub mod partition;
mod selection;
pub mod traversal;

pub use batch::{GraphBatch, GraphView, GraphViewMut};
pub use batching::{batch_graphs, Batch};
pub use descriptor::GraphDescriptor;
pub use error::{Error, Result};
pub use partition::{MergePolicy, PartitionView, PartitionedGraphBatch, PartitionedView, PartitionedViewMut};
pub use selection::{NodeSelection, NodeSelectionMut};
pub use traversal::Traversal;

// Re-export petgraph for callers of `to_petgraph`
pub use petgraph;
