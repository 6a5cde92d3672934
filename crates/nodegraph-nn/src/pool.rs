//! Gated multi-head attention pooling.
//!
//! Reduces node features to one embedding per group (graph or partition):
//!
//! ```text
//! g    = tanh(K x) ⊙ sigmoid(G x)              (N, A)
//! a    = segment_softmax(Q g, groups)          (N, H)
//! v    = V x                                   (N, H, A)
//! out  = O concat_h( sum_{i in group} a_ih v_ih )
//! ```
//!
//! Attention weights are normalised within each group only, so nodes of one graph never
//! compete with nodes of another.
//!
//! # Reference
//!
//! Ilse et al., "Attention-based Deep Multiple Instance Learning", ICML 2018.

use crate::error::{Error, Result};
use crate::features::TensorFeatures;
use crate::segment::{segment_softmax, segment_sum};
use candle_core::Tensor;
use candle_nn::{linear, Linear, Module, VarBuilder};
use nodegraph_core::GraphBatch;

/// Pooling layer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolingConfig {
    /// Node feature width.
    pub in_dim: usize,
    /// Pooled embedding width.
    pub out_dim: usize,
    /// Width of the gated attention space (default: 32).
    pub attention_dim: usize,
    /// Number of attention heads (default: 1).
    pub heads: usize,
}

impl PoolingConfig {
    pub fn new(in_dim: usize, out_dim: usize) -> Self {
        Self {
            in_dim,
            out_dim,
            attention_dim: 32,
            heads: 1,
        }
    }

    pub fn with_attention_dim(mut self, attention_dim: usize) -> Self {
        self.attention_dim = attention_dim;
        self
    }

    pub fn with_heads(mut self, heads: usize) -> Self {
        self.heads = heads;
        self
    }
}

/// Gated multi-head attention pooling over grouped node features.
pub struct AttentionPool {
    key: Linear,
    gate: Linear,
    query: Linear,
    value: Linear,
    out: Linear,
    config: PoolingConfig,
}

impl AttentionPool {
    pub fn new(config: PoolingConfig, vb: VarBuilder) -> Result<Self> {
        if config.heads == 0 || config.attention_dim == 0 {
            return Err(Error::InvalidConfig(format!(
                "pooling needs at least one head and a non-empty attention space, got heads={} attention_dim={}",
                config.heads, config.attention_dim
            )));
        }
        let att = config.attention_dim;
        let heads = config.heads;
        Ok(Self {
            key: linear(config.in_dim, att, vb.pp("key"))?,
            gate: linear(config.in_dim, att, vb.pp("gate"))?,
            query: linear(att, heads, vb.pp("query"))?,
            value: linear(config.in_dim, heads * att, vb.pp("value"))?,
            out: linear(heads * att, config.out_dim, vb.pp("out"))?,
            config,
        })
    }

    pub fn config(&self) -> &PoolingConfig {
        &self.config
    }

    fn check_input(&self, x: &Tensor, groups: &[usize]) -> Result<usize> {
        let (rows, width) = x.dims2()?;
        if width != self.config.in_dim {
            return Err(Error::Computation(format!(
                "pooling expects width {}, got {width}",
                self.config.in_dim
            )));
        }
        if rows != groups.len() {
            return Err(Error::Computation(format!(
                "{rows} nodes but {} group ids",
                groups.len()
            )));
        }
        Ok(rows)
    }

    /// Per-head attention weights `(N, heads)`, normalised within each group.
    pub fn attention_weights(&self, x: &Tensor, groups: &[usize]) -> Result<Tensor> {
        self.check_input(x, groups)?;
        let key = self.key.forward(x)?.tanh()?;
        let gate = candle_nn::ops::sigmoid(&self.gate.forward(x)?)?;
        let logits = self.query.forward(&key.mul(&gate)?)?;
        segment_softmax(&logits, groups)
    }

    /// Pool `x` `(N, in_dim)` into `(G, out_dim)`, one row per non-empty group in
    /// ascending group id order.
    pub fn pool(&self, x: &Tensor, groups: &[usize]) -> Result<Tensor> {
        let rows = self.check_input(x, groups)?;
        let (heads, att) = (self.config.heads, self.config.attention_dim);
        if rows == 0 {
            return Ok(Tensor::zeros((0, self.config.out_dim), x.dtype(), x.device())?);
        }

        let weights = self.attention_weights(x, groups)?;
        let values = self.value.forward(x)?.reshape((rows, heads, att))?;
        let weighted = values
            .broadcast_mul(&weights.unsqueeze(2)?)?
            .reshape((rows, heads * att))?;
        let (ids, pooled) = segment_sum(&weighted, groups)?;
        tracing::debug!(nodes = rows, groups = ids.len(), heads, "attention pooling");

        Ok(self.out.forward(&pooled)?)
    }

    /// Pool every graph of `batch` into one row, in graph order; empty graphs are skipped.
    pub fn pool_batch(&self, batch: &GraphBatch) -> Result<Tensor> {
        let x = batch.node_tensor(self.key.weight().device())?;
        self.pool(&x, &batch.graph_ids())
    }
}
