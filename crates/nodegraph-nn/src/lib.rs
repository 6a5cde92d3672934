// Allow minor clippy style warnings at crate level
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::many_single_char_names)]

//! Message passing and pooling over batched graphs using Candle.
//!
//! Builds on the flat storage of `nodegraph-core`:
//!
//! - [`Aggregate`] and the [`AggregationStrategy`] family (linear, soft assignment,
//!   attention, dot attention, plain reducers)
//! - [`NeighbourhoodModule`] - traversal plus aggregation with explicit
//!   [`UpdateMode::Augment`] / [`UpdateMode::Replace`] write-back
//! - [`NodeLinear`] and [`GraphResBlock`] - node-wise and residual updates
//! - [`AdjacencyAttention`] - whole-batch attention over a dense neighbourhood adjacency
//! - [`segment_softmax`] / [`segment_sum`] - grouped tensor ops
//! - [`AttentionPool`] - gated multi-head attention pooling, one row per group
//!
//! Every layer works on any [`NodeSelectionMut`](nodegraph_core::NodeSelectionMut): a
//! whole batch, one graph view, or one partition view.

pub mod aggregate;
mod error;
mod features;
pub mod neighbourhood;
pub mod pool;
pub mod segment;

pub use aggregate::{
    Aggregate, AggregationStrategy, AttentionScore, NeighbourAssignment, NeighbourAttention,
    NeighbourDotAttention, NeighbourLinear, Reduction,
};
pub use error::{Error, Result};
pub use features::TensorFeatures;
pub use neighbourhood::{
    neighbourhood_adjacency, AdjacencyAttention, GraphResBlock, NeighbourhoodConfig, NeighbourhoodModule, NodeLinear,
    NodeOrder, UpdateMode,
};
pub use pool::{AttentionPool, PoolingConfig};
pub use segment::{group_members, segment_softmax, segment_sum};

// Re-export candle for callers building layers
pub use candle_core;
pub use candle_nn;
