//! Neighbourhood aggregation strategies.
//!
//! Every strategy implements one contract:
//!
//! ```text
//! reduce(own, messages) -> new_feature
//! ```
//!
//! where `own` is the node's feature vector `(F,)` and `messages` is the ordered,
//! possibly empty, sequence of its neighbours' feature vectors.
//!
//! | Strategy | Update |
//! |----------|--------|
//! | [`NeighbourLinear`] | `own + relu(W · mean(messages) + b)` |
//! | [`NeighbourAssignment`] | soft assignment over K linear maps (FeaStNet) |
//! | [`NeighbourAttention`] | externally scored weighted sum of messages |
//! | [`NeighbourDotAttention`] | learned per-side scores, softmax over neighbours |
//! | [`Reduction`] | mean / sum / min / max / median of messages |
//!
//! # Empty neighbourhoods
//!
//! Plain statistics (and the soft assignment average) return a zero vector of the output
//! width. Attention variants and the linear residual return `own` unchanged: there is
//! nothing to normalise over, so no update is applied.
//!
//! # Reference
//!
//! Verma et al., "FeaStNet: Feature-Steered Graph Convolutions for 3D Shape Analysis",
//! CVPR 2018.

use crate::error::{Error, Result};
use candle_core::{Tensor, D};
use candle_nn::{linear, Linear, Module, VarBuilder};

/// A reduction of a node's own state and its neighbours' messages.
pub trait Aggregate {
    /// Combine `own` `(F,)` with `messages` (each `(F_msg,)`) into a new feature vector.
    fn reduce(&self, own: &Tensor, messages: &[Tensor]) -> Result<Tensor>;

    /// Width of the result for inputs of width `input_dim`.
    fn output_dim(&self, input_dim: usize) -> usize;
}

/// Stack 1-D messages into `(k, F)`, checking that all share one width.
fn stack_messages(messages: &[Tensor]) -> Result<Tensor> {
    let width = vector_len(&messages[0])?;
    for (i, m) in messages.iter().enumerate() {
        let w = vector_len(m)?;
        if w != width {
            return Err(Error::Computation(format!(
                "message {i} has width {w}, expected {width}"
            )));
        }
    }
    Ok(Tensor::stack(messages, 0)?)
}

fn vector_len(t: &Tensor) -> Result<usize> {
    match t.dims() {
        [n] => Ok(*n),
        dims => Err(Error::Computation(format!(
            "expected a feature vector, got shape {dims:?}"
        ))),
    }
}

fn expect_width(t: &Tensor, expected: usize, what: &str) -> Result<()> {
    let got = vector_len(t)?;
    if got == expected {
        Ok(())
    } else {
        Err(Error::Computation(format!(
            "{what} has width {got}, expected {expected}"
        )))
    }
}

// ============================================================================
// Linear
// ============================================================================

/// Residual linear update: `own + relu(linear(mean(messages)))`.
pub struct NeighbourLinear {
    linear: Linear,
    in_dim: usize,
    out_dim: usize,
}

impl NeighbourLinear {
    /// Create the layer.
    ///
    /// # Arguments
    /// - `source_channels`: message width
    /// - `target_channels`: own feature width (and output width)
    /// - `vb`: Variable builder
    pub fn new(source_channels: usize, target_channels: usize, vb: VarBuilder) -> Result<Self> {
        let linear = linear(source_channels, target_channels, vb)?;
        Ok(Self {
            linear,
            in_dim: source_channels,
            out_dim: target_channels,
        })
    }
}

impl Aggregate for NeighbourLinear {
    fn reduce(&self, own: &Tensor, messages: &[Tensor]) -> Result<Tensor> {
        expect_width(own, self.out_dim, "own feature")?;
        if messages.is_empty() {
            return Ok(own.clone());
        }
        let stacked = stack_messages(messages)?;
        expect_width(&messages[0], self.in_dim, "message")?;

        let mean = stacked.mean_keepdim(0)?;
        let update = self.linear.forward(&mean)?.relu()?.squeeze(0)?;
        Ok(own.add(&update)?)
    }

    fn output_dim(&self, _input_dim: usize) -> usize {
        self.out_dim
    }
}

// ============================================================================
// Soft assignment
// ============================================================================

/// Feature-steered aggregation with `size` candidate linear maps.
///
/// For each message `m` with own feature `h`:
///
/// ```text
/// q   = softmax(U m + V h + c)          (size,)
/// y_m = sum_k q_k (W_k m + b_k)         (out,)
/// out = mean_m y_m
/// ```
pub struct NeighbourAssignment {
    linears: Vec<Linear>,
    source: Linear,
    target: Linear,
    source_channels: usize,
    target_channels: usize,
    out_channels: usize,
}

impl NeighbourAssignment {
    /// Create the layer.
    ///
    /// # Arguments
    /// - `source_channels`: message width
    /// - `target_channels`: own feature width
    /// - `out_channels`: output width
    /// - `size`: number of candidate weight matrices (kernel size)
    /// - `vb`: Variable builder
    pub fn new(
        source_channels: usize,
        target_channels: usize,
        out_channels: usize,
        size: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        if size == 0 {
            return Err(Error::InvalidConfig(
                "soft assignment needs at least one weight matrix".to_string(),
            ));
        }
        let linears = (0..size)
            .map(|k| linear(source_channels, out_channels, vb.pp(format!("lin{k}"))))
            .collect::<candle_core::Result<Vec<_>>>()?;
        let source = linear(source_channels, size, vb.pp("source"))?;
        let target = linear(target_channels, size, vb.pp("target"))?;

        Ok(Self {
            linears,
            source,
            target,
            source_channels,
            target_channels,
            out_channels,
        })
    }

    pub fn size(&self) -> usize {
        self.linears.len()
    }
}

impl Aggregate for NeighbourAssignment {
    fn reduce(&self, own: &Tensor, messages: &[Tensor]) -> Result<Tensor> {
        expect_width(own, self.target_channels, "own feature")?;
        if messages.is_empty() {
            return Ok(Tensor::zeros(self.out_channels, own.dtype(), own.device())?);
        }
        let stacked = stack_messages(messages)?;
        expect_width(&messages[0], self.source_channels, "message")?;

        // (k, size)
        let logits = self
            .source
            .forward(&stacked)?
            .broadcast_add(&self.target.forward(&own.unsqueeze(0)?)?)?;
        let assignment = candle_nn::ops::softmax(&logits, D::Minus1)?;

        // (k, size, out)
        let candidates = self
            .linears
            .iter()
            .map(|lin| lin.forward(&stacked))
            .collect::<candle_core::Result<Vec<_>>>()?;
        let candidates = Tensor::stack(&candidates, 1)?;

        let steered = candidates
            .broadcast_mul(&assignment.unsqueeze(2)?)?
            .sum(1)?;
        Ok(steered.mean(0)?)
    }

    fn output_dim(&self, _input_dim: usize) -> usize {
        self.out_channels
    }
}

// ============================================================================
// Attention
// ============================================================================

/// Scoring function for [`NeighbourAttention`].
///
/// Given `own` `(F,)` and stacked `messages` `(k, F)`, return one weight per neighbour,
/// shaped `(k,)` or `(k, 1)`.
pub trait AttentionScore: Send + Sync {
    fn score(&self, own: &Tensor, messages: &Tensor) -> candle_core::Result<Tensor>;
}

impl<F> AttentionScore for F
where
    F: Fn(&Tensor, &Tensor) -> candle_core::Result<Tensor> + Send + Sync,
{
    fn score(&self, own: &Tensor, messages: &Tensor) -> candle_core::Result<Tensor> {
        self(own, messages)
    }
}

/// Weighted sum of messages under an externally supplied attention mechanism.
pub struct NeighbourAttention {
    attention: Box<dyn AttentionScore>,
}

impl NeighbourAttention {
    pub fn new(attention: impl AttentionScore + 'static) -> Self {
        Self {
            attention: Box::new(attention),
        }
    }
}

impl Aggregate for NeighbourAttention {
    fn reduce(&self, own: &Tensor, messages: &[Tensor]) -> Result<Tensor> {
        if messages.is_empty() {
            return Ok(own.clone());
        }
        let stacked = stack_messages(messages)?;
        let k = messages.len();

        let weights = self.attention.score(own, &stacked)?;
        if weights.elem_count() != k {
            return Err(Error::Computation(format!(
                "attention produced {} weights for {k} neighbours",
                weights.elem_count()
            )));
        }
        let weights = weights.reshape((k, 1))?;
        Ok(stacked.broadcast_mul(&weights)?.sum(0)?)
    }

    fn output_dim(&self, input_dim: usize) -> usize {
        input_dim
    }
}

/// Pairwise attention with a shared embedding and one scalar score per side.
///
/// ```text
/// e    = W x + b
/// a_ij = softmax_j(l · e_i + n · e_j)
/// out  = sum_j a_ij x_j
/// ```
pub struct NeighbourDotAttention {
    embedding: Linear,
    attention_local: Linear,
    attention_neighbour: Linear,
    size: usize,
}

impl NeighbourDotAttention {
    /// Create the layer with attention embedding width `size` (= feature width).
    pub fn new(size: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            embedding: linear(size, size, vb.pp("embedding"))?,
            attention_local: linear(size, 1, vb.pp("local"))?,
            attention_neighbour: linear(size, 1, vb.pp("neighbour"))?,
            size,
        })
    }

    /// Normalised attention of `own` over `messages`, shaped `(k, 1)`.
    pub fn attention(&self, own: &Tensor, messages: &Tensor) -> Result<Tensor> {
        let local = self
            .attention_local
            .forward(&self.embedding.forward(&own.unsqueeze(0)?)?)?;
        let neighbour = self
            .attention_neighbour
            .forward(&self.embedding.forward(messages)?)?;
        Ok(candle_nn::ops::softmax(&neighbour.broadcast_add(&local)?, 0)?)
    }
}

impl Aggregate for NeighbourDotAttention {
    fn reduce(&self, own: &Tensor, messages: &[Tensor]) -> Result<Tensor> {
        expect_width(own, self.size, "own feature")?;
        if messages.is_empty() {
            return Ok(own.clone());
        }
        let stacked = stack_messages(messages)?;
        expect_width(&messages[0], self.size, "message")?;

        let weights = self.attention(own, &stacked)?;
        Ok(stacked.broadcast_mul(&weights)?.sum(0)?)
    }

    fn output_dim(&self, _input_dim: usize) -> usize {
        self.size
    }
}

// ============================================================================
// Plain statistics
// ============================================================================

/// Element-wise statistic over the messages, ignoring the node's own feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    Mean,
    Sum,
    Min,
    Max,
    /// Lower median for an even number of messages.
    Median,
}

impl Aggregate for Reduction {
    fn reduce(&self, own: &Tensor, messages: &[Tensor]) -> Result<Tensor> {
        if messages.is_empty() {
            let width = vector_len(own)?;
            return Ok(Tensor::zeros(width, own.dtype(), own.device())?);
        }
        let stacked = stack_messages(messages)?;
        let reduced = match self {
            Self::Mean => stacked.mean(0)?,
            Self::Sum => stacked.sum(0)?,
            Self::Min => stacked.min(0)?,
            Self::Max => stacked.max(0)?,
            Self::Median => {
                let k = messages.len();
                let (sorted, _) = stacked.t()?.contiguous()?.sort_last_dim(true)?;
                sorted.narrow(1, (k - 1) / 2, 1)?.squeeze(1)?
            }
        };
        Ok(reduced)
    }

    fn output_dim(&self, input_dim: usize) -> usize {
        input_dim
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// One aggregation strategy, selected at construction.
pub enum AggregationStrategy {
    Linear(NeighbourLinear),
    SoftAssignment(NeighbourAssignment),
    Attention(NeighbourAttention),
    DotAttention(NeighbourDotAttention),
    Reducer(Reduction),
}

impl AggregationStrategy {
    /// Short name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Linear(_) => "linear",
            Self::SoftAssignment(_) => "soft_assignment",
            Self::Attention(_) => "attention",
            Self::DotAttention(_) => "dot_attention",
            Self::Reducer(Reduction::Mean) => "mean",
            Self::Reducer(Reduction::Sum) => "sum",
            Self::Reducer(Reduction::Min) => "min",
            Self::Reducer(Reduction::Max) => "max",
            Self::Reducer(Reduction::Median) => "median",
        }
    }
}

impl Aggregate for AggregationStrategy {
    fn reduce(&self, own: &Tensor, messages: &[Tensor]) -> Result<Tensor> {
        match self {
            Self::Linear(s) => s.reduce(own, messages),
            Self::SoftAssignment(s) => s.reduce(own, messages),
            Self::Attention(s) => s.reduce(own, messages),
            Self::DotAttention(s) => s.reduce(own, messages),
            Self::Reducer(s) => s.reduce(own, messages),
        }
    }

    fn output_dim(&self, input_dim: usize) -> usize {
        match self {
            Self::Linear(s) => s.output_dim(input_dim),
            Self::SoftAssignment(s) => s.output_dim(input_dim),
            Self::Attention(s) => s.output_dim(input_dim),
            Self::DotAttention(s) => s.output_dim(input_dim),
            Self::Reducer(s) => s.output_dim(input_dim),
        }
    }
}

impl From<NeighbourLinear> for AggregationStrategy {
    fn from(s: NeighbourLinear) -> Self {
        Self::Linear(s)
    }
}

impl From<NeighbourAssignment> for AggregationStrategy {
    fn from(s: NeighbourAssignment) -> Self {
        Self::SoftAssignment(s)
    }
}

impl From<NeighbourAttention> for AggregationStrategy {
    fn from(s: NeighbourAttention) -> Self {
        Self::Attention(s)
    }
}

impl From<NeighbourDotAttention> for AggregationStrategy {
    fn from(s: NeighbourDotAttention) -> Self {
        Self::DotAttention(s)
    }
}

impl From<Reduction> for AggregationStrategy {
    fn from(s: Reduction) -> Self {
        Self::Reducer(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;
    use std::collections::HashMap;

    fn vecs(rows: &[&[f32]], device: &Device) -> Vec<Tensor> {
        rows.iter()
            .map(|r| Tensor::new(*r, device).unwrap())
            .collect()
    }

    fn values(t: &Tensor) -> Vec<f32> {
        t.to_vec1::<f32>().unwrap()
    }

    fn assert_close(got: &[f32], want: &[f32]) {
        assert_eq!(got.len(), want.len());
        for (g, w) in got.iter().zip(want) {
            assert!((g - w).abs() < 1e-5, "got {got:?}, want {want:?}");
        }
    }

    #[test]
    fn test_reducers() {
        let device = Device::Cpu;
        let own = Tensor::new(&[100f32, 100.0], &device).unwrap();
        let msgs = vecs(&[&[1.0, 6.0], &[3.0, 2.0], &[2.0, 4.0], &[8.0, 0.0]], &device);

        let cases = [
            (Reduction::Mean, vec![3.5, 3.0]),
            (Reduction::Sum, vec![14.0, 12.0]),
            (Reduction::Min, vec![1.0, 0.0]),
            (Reduction::Max, vec![8.0, 6.0]),
            (Reduction::Median, vec![2.0, 2.0]),
        ];
        for (reduction, want) in cases {
            let out = reduction.reduce(&own, &msgs).unwrap();
            assert_close(&values(&out), &want);
        }
    }

    #[test]
    fn test_median_odd() {
        let device = Device::Cpu;
        let own = Tensor::new(&[0f32], &device).unwrap();
        let msgs = vecs(&[&[5.0], &[1.0], &[3.0]], &device);
        let out = Reduction::Median.reduce(&own, &msgs).unwrap();
        assert_close(&values(&out), &[3.0]);
    }

    #[test]
    fn test_reducers_empty_give_zeros() {
        let device = Device::Cpu;
        let own = Tensor::new(&[4f32, 5.0, 6.0], &device).unwrap();
        for reduction in [
            Reduction::Mean,
            Reduction::Sum,
            Reduction::Min,
            Reduction::Max,
            Reduction::Median,
        ] {
            let out = reduction.reduce(&own, &[]).unwrap();
            assert_close(&values(&out), &[0.0, 0.0, 0.0]);
        }
    }

    #[test]
    fn test_mismatched_messages() {
        let device = Device::Cpu;
        let own = Tensor::new(&[0f32, 0.0], &device).unwrap();
        let msgs = vecs(&[&[1.0, 2.0], &[1.0]], &device);
        assert!(matches!(
            Reduction::Sum.reduce(&own, &msgs),
            Err(Error::Computation(_))
        ));
    }

    #[test]
    fn test_linear_known_weights() {
        let device = Device::Cpu;
        let mut tensors = HashMap::new();
        tensors.insert(
            "weight".to_string(),
            Tensor::new(&[[1f32, 0.0], [0.0, 1.0]], &device).unwrap(),
        );
        tensors.insert("bias".to_string(), Tensor::zeros(2, DType::F32, &device).unwrap());
        let vb = VarBuilder::from_tensors(tensors, DType::F32, &device);
        let layer = NeighbourLinear::new(2, 2, vb).unwrap();

        let own = Tensor::new(&[1f32, 1.0], &device).unwrap();
        let msgs = vecs(&[&[1.0, -2.0], &[3.0, -4.0]], &device);
        let out = layer.reduce(&own, &msgs).unwrap();
        // mean = [2, -3], relu -> [2, 0]
        assert_close(&values(&out), &[3.0, 1.0]);
    }

    #[test]
    fn test_linear_empty_passes_through() {
        let device = Device::Cpu;
        let vb = VarBuilder::zeros(DType::F32, &device);
        let layer = NeighbourLinear::new(3, 2, vb).unwrap();
        let own = Tensor::new(&[1f32, 2.0], &device).unwrap();
        assert_close(&values(&layer.reduce(&own, &[]).unwrap()), &[1.0, 2.0]);
    }

    #[test]
    fn test_soft_assignment_shape() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let layer = NeighbourAssignment::new(4, 3, 5, 2, vb).unwrap();
        assert_eq!(layer.size(), 2);

        let own = Tensor::randn(0f32, 1f32, 3, &device).unwrap();
        let msgs: Vec<Tensor> = (0..6)
            .map(|_| Tensor::randn(0f32, 1f32, 4, &device).unwrap())
            .collect();
        let out = layer.reduce(&own, &msgs).unwrap();
        assert_eq!(out.dims(), &[5]);

        let empty = layer.reduce(&own, &[]).unwrap();
        assert_close(&values(&empty), &[0.0; 5]);
    }

    #[test]
    fn test_soft_assignment_single_kernel_is_linear_mean() {
        // With one kernel the assignment is always 1.
        let device = Device::Cpu;
        let mut tensors = HashMap::new();
        tensors.insert(
            "lin0.weight".to_string(),
            Tensor::new(&[[2f32, 0.0], [0.0, 1.0]], &device).unwrap(),
        );
        tensors.insert("lin0.bias".to_string(), Tensor::zeros(2, DType::F32, &device).unwrap());
        tensors.insert("source.weight".to_string(), Tensor::ones((1, 2), DType::F32, &device).unwrap());
        tensors.insert("source.bias".to_string(), Tensor::zeros(1, DType::F32, &device).unwrap());
        tensors.insert("target.weight".to_string(), Tensor::ones((1, 2), DType::F32, &device).unwrap());
        tensors.insert("target.bias".to_string(), Tensor::zeros(1, DType::F32, &device).unwrap());
        let vb = VarBuilder::from_tensors(tensors, DType::F32, &device);
        let layer = NeighbourAssignment::new(2, 2, 2, 1, vb).unwrap();

        let own = Tensor::new(&[0f32, 0.0], &device).unwrap();
        let msgs = vecs(&[&[1.0, 1.0], &[3.0, 5.0]], &device);
        let out = layer.reduce(&own, &msgs).unwrap();
        assert_close(&values(&out), &[4.0, 3.0]);
    }

    #[test]
    fn test_soft_assignment_zero_size() {
        let device = Device::Cpu;
        let vb = VarBuilder::zeros(DType::F32, &device);
        assert!(matches!(
            NeighbourAssignment::new(2, 2, 2, 0, vb),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_attention_external_score() {
        let device = Device::Cpu;
        let att = NeighbourAttention::new(|_own: &Tensor, msgs: &Tensor| {
            let k = msgs.dim(0)?;
            Tensor::ones(k, DType::F32, msgs.device())? / k as f64
        });
        let own = Tensor::new(&[9f32, 9.0], &device).unwrap();
        let msgs = vecs(&[&[1.0, 2.0], &[3.0, 4.0]], &device);
        let out = att.reduce(&own, &msgs).unwrap();
        assert_close(&values(&out), &[2.0, 3.0]);

        let passthrough = att.reduce(&own, &[]).unwrap();
        assert_close(&values(&passthrough), &[9.0, 9.0]);
    }

    #[test]
    fn test_attention_wrong_weight_count() {
        let device = Device::Cpu;
        let att = NeighbourAttention::new(|_own: &Tensor, msgs: &Tensor| {
            Tensor::ones(3, DType::F32, msgs.device())
        });
        let own = Tensor::new(&[0f32], &device).unwrap();
        let msgs = vecs(&[&[1.0], &[2.0]], &device);
        assert!(matches!(att.reduce(&own, &msgs), Err(Error::Computation(_))));
    }

    #[test]
    fn test_dot_attention_weights_normalised() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let layer = NeighbourDotAttention::new(4, vb).unwrap();

        let own = Tensor::randn(0f32, 1f32, 4, &device).unwrap();
        let msgs = Tensor::randn(0f32, 1f32, (5, 4), &device).unwrap();
        let weights = layer.attention(&own, &msgs).unwrap();
        assert_eq!(weights.dims(), &[5, 1]);
        let total: f32 = weights.sum_all().unwrap().to_scalar().unwrap();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_dot_attention_identical_messages() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let layer = NeighbourDotAttention::new(3, vb).unwrap();

        let own = Tensor::new(&[0.5f32, -1.0, 2.0], &device).unwrap();
        let row: &[f32] = &[1.0, 2.0, 3.0];
        let msgs = vecs(&[row, row, row, row], &device);
        let out = layer.reduce(&own, &msgs).unwrap();
        assert_close(&values(&out), &[1.0, 2.0, 3.0]);

        let passthrough = layer.reduce(&own, &[]).unwrap();
        assert_close(&values(&passthrough), &[0.5, -1.0, 2.0]);
    }

    #[test]
    fn test_strategy_dispatch() {
        let device = Device::Cpu;
        let strategy = AggregationStrategy::from(Reduction::Max);
        assert_eq!(strategy.name(), "max");
        assert_eq!(strategy.output_dim(7), 7);

        let own = Tensor::new(&[0f32], &device).unwrap();
        let msgs = vecs(&[&[1.0], &[4.0]], &device);
        assert_close(&values(&strategy.reduce(&own, &msgs).unwrap()), &[4.0]);
    }
}
