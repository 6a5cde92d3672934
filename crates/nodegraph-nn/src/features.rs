//! Moving node features between batch storage and candle tensors.

use crate::error::{Error, Result};
use candle_core::{DType, Device, Tensor};
use nodegraph_core::{GraphBatch, NodeSelectionMut};

/// Tensor access to a batch's node features.
pub trait TensorFeatures {
    /// Node features as an `(N, F)` tensor.
    fn node_tensor(&self, device: &Device) -> Result<Tensor>;

    /// Replace node features with an `(N, F')` tensor; `F'` may differ from `F`.
    fn set_node_tensor(&mut self, features: &Tensor) -> Result<()>;
}

impl TensorFeatures for GraphBatch {
    fn node_tensor(&self, device: &Device) -> Result<Tensor> {
        let shape = (self.node_count(), self.feature_dim());
        Ok(Tensor::from_vec(self.node_features().to_vec(), shape, device)?)
    }

    fn set_node_tensor(&mut self, features: &Tensor) -> Result<()> {
        let (rows, dim) = features.dims2()?;
        if rows != self.node_count() {
            return Err(Error::Computation(format!(
                "tensor has {rows} rows, batch has {} nodes",
                self.node_count()
            )));
        }
        let values = flatten(features)?;
        self.set_node_features(values, dim)?;
        Ok(())
    }
}

/// Row-major `f32` copy of a tensor.
pub(crate) fn flatten(t: &Tensor) -> Result<Vec<f32>> {
    Ok(t.flatten_all()?.to_dtype(DType::F32)?.to_vec1::<f32>()?)
}

/// Rows `nodes` of `x`, in order.
pub(crate) fn select_rows(x: &Tensor, nodes: &[usize]) -> Result<Tensor> {
    let ids: Vec<u32> = nodes.iter().map(|&n| n as u32).collect();
    let ids = Tensor::from_vec(ids, nodes.len(), x.device())?;
    Ok(x.index_select(&ids, 0)?)
}

/// Write `rows` (one per active node, width `out_dim`) back into `selection`.
///
/// If the width is unchanged the active rows are overwritten in place. A width change
/// is only possible when the selection covers every node, otherwise the batch would end
/// up with rows of mixed width.
pub(crate) fn replace_rows<S>(
    selection: &mut S,
    active: &[usize],
    rows: &Tensor,
    out_dim: usize,
) -> Result<()>
where
    S: NodeSelectionMut + ?Sized,
{
    let values = flatten(rows)?;
    let graph = selection.graph();
    let (n, dim) = (graph.node_count(), graph.feature_dim());

    if out_dim == dim {
        selection.set_active_rows(&values)?;
        return Ok(());
    }

    let mut covered = vec![false; n];
    for &node in active {
        covered[node] = true;
    }
    if active.len() != n || covered.iter().any(|c| !c) {
        return Err(Error::Computation(format!(
            "replacing {} of {n} rows would change their width from {dim} to {out_dim}",
            active.len()
        )));
    }

    let mut features = vec![0.0f32; n * out_dim];
    for (k, &node) in active.iter().enumerate() {
        features[node * out_dim..(node + 1) * out_dim]
            .copy_from_slice(&values[k * out_dim..(k + 1) * out_dim]);
    }
    selection.replace_features(features, out_dim)?;
    Ok(())
}

/// Append `rows` (one per active node, width `extra_dim`) as new feature columns.
///
/// Inactive nodes receive zero columns.
pub(crate) fn augment_rows<S>(
    selection: &mut S,
    active: &[usize],
    rows: Option<&Tensor>,
    extra_dim: usize,
) -> Result<()>
where
    S: NodeSelectionMut + ?Sized,
{
    let values = match rows {
        Some(t) => flatten(t)?,
        None => Vec::new(),
    };
    let graph = selection.graph();
    let (n, dim) = (graph.node_count(), graph.feature_dim());

    let mut extra = vec![0.0f32; n * extra_dim];
    for (k, &node) in active.iter().enumerate() {
        extra[node * extra_dim..(node + 1) * extra_dim]
            .copy_from_slice(&values[k * extra_dim..(k + 1) * extra_dim]);
    }

    let width = dim + extra_dim;
    let mut features = Vec::with_capacity(n * width);
    for (node, row) in graph.rows().enumerate() {
        features.extend_from_slice(row);
        features.extend_from_slice(&extra[node * extra_dim..(node + 1) * extra_dim]);
    }
    selection.replace_features(features, width)?;
    Ok(())
}
