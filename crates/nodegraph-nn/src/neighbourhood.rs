//! Neighbourhood message passing over a node selection.
//!
//! [`NeighbourhoodModule`] gathers each active node's neighbourhood with a
//! [`Traversal`], hands the node's own row and its neighbours' rows to an
//! [`AggregationStrategy`], and writes the result back in one of two explicit modes:
//!
//! - [`UpdateMode::Augment`]: append the result as new columns (inactive nodes get zeros)
//! - [`UpdateMode::Replace`]: overwrite the active rows
//!
//! # Example
//!
//! ```rust
//! use nodegraph_core::GraphBatch;
//! use nodegraph_nn::{NeighbourhoodConfig, NeighbourhoodModule, Reduction, UpdateMode};
//!
//! let mut g = GraphBatch::new();
//! for x in [1.0, 2.0, 3.0] {
//!     g.add_node(&[x]).unwrap();
//! }
//! g.add_edge(0, 1).unwrap();
//! g.add_edge(1, 2).unwrap();
//!
//! let module = NeighbourhoodModule::new(Reduction::Sum, NeighbourhoodConfig::default());
//! module.forward(&mut g, UpdateMode::Replace).unwrap();
//! assert_eq!(g.node_features(), &[3.0, 6.0, 5.0]);
//! ```

use crate::aggregate::{Aggregate, AggregationStrategy};
use crate::error::{Error, Result};
use crate::features::{augment_rows, replace_rows, select_rows, TensorFeatures};
use candle_core::{Device, Tensor};
use candle_nn::{linear, Init, Linear, Module, VarBuilder};
use nodegraph_core::{GraphBatch, NodeSelectionMut, Traversal};

/// How aggregated features are written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Keep the original block, append the result as extra columns.
    Augment,
    /// Overwrite the active rows with the result.
    Replace,
}

/// Neighbourhood gathering configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighbourhoodConfig {
    /// Traversal depth (default: 1).
    pub depth: usize,
    /// Whether a node's own row is part of its message sequence (default: true).
    pub include_self: bool,
}

impl Default for NeighbourhoodConfig {
    fn default() -> Self {
        Self {
            depth: 1,
            include_self: true,
        }
    }
}

impl NeighbourhoodConfig {
    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_include_self(mut self, include_self: bool) -> Self {
        self.include_self = include_self;
        self
    }
}

/// Reorders a traversal result: `(graph, start_node, neighbourhood) -> neighbourhood`.
pub type NodeOrder = Box<dyn Fn(&GraphBatch, usize, Vec<usize>) -> Vec<usize> + Send + Sync>;

/// Traversal plus aggregation over the active nodes of a selection.
pub struct NeighbourhoodModule {
    strategy: AggregationStrategy,
    traversal: Traversal,
    include_self: bool,
    order: Option<NodeOrder>,
    device: Device,
}

impl NeighbourhoodModule {
    pub fn new(strategy: impl Into<AggregationStrategy>, config: NeighbourhoodConfig) -> Self {
        Self {
            strategy: strategy.into(),
            traversal: Traversal::new(config.depth),
            include_self: config.include_self,
            order: None,
            device: Device::Cpu,
        }
    }

    /// Apply `order` to every neighbourhood before aggregation.
    pub fn with_order<F>(mut self, order: F) -> Self
    where
        F: Fn(&GraphBatch, usize, Vec<usize>) -> Vec<usize> + Send + Sync + 'static,
    {
        self.order = Some(Box::new(order));
        self
    }

    /// Device the feature tensors are built on (default: CPU).
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn strategy(&self) -> &AggregationStrategy {
        &self.strategy
    }

    pub fn depth(&self) -> usize {
        self.traversal.depth()
    }

    /// Width of the aggregated block for inputs of width `input_dim`.
    pub fn output_dim(&self, input_dim: usize) -> usize {
        self.strategy.output_dim(input_dim)
    }

    /// Message sources for each of `nodes`, after `include_self` and ordering.
    pub fn neighbourhoods(&self, graph: &GraphBatch, nodes: &[usize]) -> Result<Vec<Vec<usize>>> {
        let hoods = self.traversal.neighbourhoods(graph.adjacency(), nodes)?;
        Ok(nodes
            .iter()
            .zip(hoods)
            .map(|(&node, mut hood)| {
                if !self.include_self {
                    hood.retain(|&n| n != node);
                }
                match &self.order {
                    Some(order) => order(graph, node, hood),
                    None => hood,
                }
            })
            .collect())
    }

    /// Aggregate `x` `(N, F)` for `nodes`, one row per node in order.
    ///
    /// Returns `None` when `nodes` is empty.
    pub fn aggregate(&self, x: &Tensor, nodes: &[usize], hoods: &[Vec<usize>]) -> Result<Option<Tensor>> {
        if nodes.len() != hoods.len() {
            return Err(Error::Computation(format!(
                "{} nodes but {} neighbourhoods",
                nodes.len(),
                hoods.len()
            )));
        }
        if nodes.is_empty() {
            return Ok(None);
        }

        let mut rows = Vec::with_capacity(nodes.len());
        for (&node, hood) in nodes.iter().zip(hoods) {
            let own = x.get(node)?;
            let messages = hood
                .iter()
                .map(|&j| x.get(j))
                .collect::<candle_core::Result<Vec<_>>>()?;
            rows.push(self.strategy.reduce(&own, &messages)?);
        }
        Ok(Some(Tensor::stack(&rows, 0)?))
    }

    /// Aggregated rows for the active nodes of `graph`.
    pub(crate) fn aggregate_active(&self, graph: &GraphBatch, active: &[usize]) -> Result<Option<Tensor>> {
        let x = graph.node_tensor(&self.device)?;
        let hoods = self.neighbourhoods(graph, active)?;
        self.aggregate(&x, active, &hoods)
    }

    /// Run one message-passing step over `selection`.
    ///
    /// A batch with no nodes is left unchanged.
    pub fn forward<S>(&self, selection: &mut S, mode: UpdateMode) -> Result<()>
    where
        S: NodeSelectionMut + ?Sized,
    {
        let active = selection.active_nodes();
        let graph = selection.graph();
        if graph.node_count() == 0 {
            return Ok(());
        }
        let in_dim = graph.feature_dim();
        let out_dim = self.output_dim(in_dim);
        tracing::debug!(
            strategy = self.strategy.name(),
            nodes = active.len(),
            in_dim,
            out_dim,
            ?mode,
            "neighbourhood update"
        );

        let rows = self.aggregate_active(graph, &active)?;
        match (mode, rows) {
            (UpdateMode::Augment, rows) => augment_rows(selection, &active, rows.as_ref(), out_dim),
            (UpdateMode::Replace, Some(rows)) => replace_rows(selection, &active, &rows, out_dim),
            (UpdateMode::Replace, None) => Ok(()),
        }
    }
}

/// Linear map applied to each active node's row; replace semantics.
pub struct NodeLinear {
    linear: Linear,
    in_dim: usize,
    out_dim: usize,
    device: Device,
}

impl NodeLinear {
    pub fn new(in_dim: usize, out_dim: usize, vb: VarBuilder) -> Result<Self> {
        let device = vb.device().clone();
        Ok(Self {
            linear: linear(in_dim, out_dim, vb)?,
            in_dim,
            out_dim,
            device,
        })
    }

    pub fn forward<S>(&self, selection: &mut S) -> Result<()>
    where
        S: NodeSelectionMut + ?Sized,
    {
        let active = selection.active_nodes();
        let graph = selection.graph();
        if active.is_empty() {
            return Ok(());
        }
        if graph.feature_dim() != self.in_dim {
            return Err(Error::Computation(format!(
                "node linear expects width {}, batch has {}",
                self.in_dim,
                graph.feature_dim()
            )));
        }
        let x = select_rows(&graph.node_tensor(&self.device)?, &active)?;
        let y = self.linear.forward(&x)?;
        replace_rows(selection, &active, &y, self.out_dim)
    }
}

/// Residual block: `relu(linear([x, aggregate(x)]) + x)` over the active rows.
pub struct GraphResBlock {
    module: NeighbourhoodModule,
    linear: Linear,
    width: usize,
    device: Device,
}

impl GraphResBlock {
    /// # Arguments
    /// - `module`: neighbourhood aggregation producing the extra block
    /// - `width`: node feature width (unchanged by the block)
    /// - `vb`: Variable builder
    pub fn new(module: NeighbourhoodModule, width: usize, vb: VarBuilder) -> Result<Self> {
        let device = vb.device().clone();
        let augmented = width + module.output_dim(width);
        let linear = linear(augmented, width, vb)?;
        let module = module.with_device(device.clone());
        Ok(Self {
            module,
            linear,
            width,
            device,
        })
    }

    pub fn forward<S>(&self, selection: &mut S) -> Result<()>
    where
        S: NodeSelectionMut + ?Sized,
    {
        let active = selection.active_nodes();
        let graph = selection.graph();
        if graph.feature_dim() != self.width {
            return Err(Error::Computation(format!(
                "residual block expects width {}, batch has {}",
                self.width,
                graph.feature_dim()
            )));
        }
        let Some(aggregated) = self.module.aggregate_active(graph, &active)? else {
            return Ok(());
        };

        let x = select_rows(&graph.node_tensor(&self.device)?, &active)?;
        let augmented = Tensor::cat(&[&x, &aggregated], 1)?;
        let y = self.linear.forward(&augmented)?.add(&x)?.relu()?;
        replace_rows(selection, &active, &y, self.width)
    }
}

/// Dense symmetric 0/1 adjacency `(n, n)` in which row `i` marks `neighbourhoods[i]`.
pub fn neighbourhood_adjacency(neighbourhoods: &[Vec<usize>], n: usize, device: &Device) -> Result<Tensor> {
    if neighbourhoods.len() > n {
        return Err(Error::Computation(format!(
            "{} neighbourhoods for {n} nodes",
            neighbourhoods.len()
        )));
    }
    let mut dense = vec![0.0f32; n * n];
    for (i, hood) in neighbourhoods.iter().enumerate() {
        for &j in hood {
            if j >= n {
                return Err(nodegraph_core::Error::Index { index: j, len: n }.into());
            }
            dense[i * n + j] = 1.0;
            dense[j * n + i] = 1.0;
        }
    }
    Ok(Tensor::from_vec(dense, (n, n), device)?)
}

/// Whole-batch neighbourhood attention driven by a dense neighbourhood adjacency.
///
/// ```text
/// e   = W x + b
/// out = l ⊙ e + A (r ⊙ e)
/// ```
///
/// `A` is [`neighbourhood_adjacency`] of every node's neighbourhood, so each node adds
/// the neighbour-scored embeddings of all nodes within `depth` hops in one matmul.
pub struct AdjacencyAttention {
    embedding: Linear,
    local: Tensor,
    neighbour: Tensor,
    traversal: Traversal,
    include_self: bool,
    size: usize,
    device: Device,
}

impl AdjacencyAttention {
    /// # Arguments
    /// - `size`: node feature width (unchanged by the layer)
    /// - `config`: traversal depth and self inclusion
    /// - `vb`: Variable builder
    pub fn new(size: usize, config: NeighbourhoodConfig, vb: VarBuilder) -> Result<Self> {
        let scores = Init::Randn {
            mean: 0.0,
            stdev: 1.0,
        };
        Ok(Self {
            embedding: linear(size, size, vb.pp("embedding"))?,
            local: vb.get_with_hints(size, "local", scores)?,
            neighbour: vb.get_with_hints(size, "neighbour", scores)?,
            traversal: Traversal::new(config.depth),
            include_self: config.include_self,
            size,
            device: vb.device().clone(),
        })
    }

    /// Apply the layer to `x` `(N, size)` under a dense `(N, N)` adjacency.
    pub fn attend(&self, x: &Tensor, adjacency: &Tensor) -> Result<Tensor> {
        let e = self.embedding.forward(x)?;
        let local = e.broadcast_mul(&self.local)?;
        let neighbour = e.broadcast_mul(&self.neighbour)?;
        Ok(local.add(&adjacency.matmul(&neighbour)?)?)
    }

    pub fn forward<S>(&self, selection: &mut S, mode: UpdateMode) -> Result<()>
    where
        S: NodeSelectionMut + ?Sized,
    {
        let active = selection.active_nodes();
        let graph = selection.graph();
        let n = graph.node_count();
        if n == 0 {
            return Ok(());
        }
        if graph.feature_dim() != self.size {
            return Err(Error::Computation(format!(
                "adjacency attention expects width {}, batch has {}",
                self.size,
                graph.feature_dim()
            )));
        }

        let nodes: Vec<usize> = (0..n).collect();
        let mut hoods = self.traversal.neighbourhoods(graph.adjacency(), &nodes)?;
        if !self.include_self {
            for (node, hood) in hoods.iter_mut().enumerate() {
                hood.retain(|&m| m != node);
            }
        }
        let adjacency = neighbourhood_adjacency(&hoods, n, &self.device)?;
        let out = self.attend(&graph.node_tensor(&self.device)?, &adjacency)?;
        tracing::debug!(nodes = active.len(), total = n, ?mode, "adjacency attention");

        if active.is_empty() {
            return match mode {
                UpdateMode::Augment => augment_rows(selection, &active, None, self.size),
                UpdateMode::Replace => Ok(()),
            };
        }
        let rows = select_rows(&out, &active)?;
        match mode {
            UpdateMode::Augment => augment_rows(selection, &active, Some(&rows), self.size),
            UpdateMode::Replace => replace_rows(selection, &active, &rows, self.size),
        }
    }
}
