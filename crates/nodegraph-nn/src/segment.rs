//! Grouped (segment) tensor operations.
//!
//! A segment is the set of rows sharing one group id. Groups need not be contiguous
//! or sorted; results for grouped reductions come back in ascending group id order.

use crate::error::{Error, Result};
use crate::features::select_rows;
use candle_core::Tensor;
use std::collections::BTreeMap;

/// Row indices of each group, keyed by ascending group id.
pub fn group_members(groups: &[usize]) -> BTreeMap<usize, Vec<usize>> {
    let mut members: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (row, &group) in groups.iter().enumerate() {
        members.entry(group).or_default().push(row);
    }
    members
}

fn check_rows(t: &Tensor, groups: &[usize]) -> Result<usize> {
    let rows = t.dim(0)?;
    if rows != groups.len() {
        return Err(Error::Computation(format!(
            "{rows} rows but {} group ids",
            groups.len()
        )));
    }
    Ok(rows)
}

/// Softmax over dim 0 computed independently inside each group.
///
/// `logits` is `(N,)` or `(N, H)`; each column is normalised on its own, so within
/// every group the weights of each head sum to 1.
pub fn segment_softmax(logits: &Tensor, groups: &[usize]) -> Result<Tensor> {
    let rows = check_rows(logits, groups)?;
    if rows == 0 {
        return Ok(logits.clone());
    }
    let vector = logits.rank() == 1;
    let logits = if vector { logits.unsqueeze(1)? } else { logits.clone() };

    let members = group_members(groups);
    let mut parts = Vec::with_capacity(members.len());
    let mut order = Vec::with_capacity(rows);
    for rows_of_group in members.values() {
        let part = select_rows(&logits, rows_of_group)?;
        parts.push(candle_nn::ops::softmax(&part, 0)?);
        order.extend_from_slice(rows_of_group);
    }

    // `order[k]` is the original row of concatenated row k; invert it.
    let mut inverse = vec![0usize; rows];
    for (k, &row) in order.iter().enumerate() {
        inverse[row] = k;
    }
    let normalised = select_rows(&Tensor::cat(&parts, 0)?, &inverse)?;

    if vector {
        Ok(normalised.squeeze(1)?)
    } else {
        Ok(normalised)
    }
}

/// Sum the rows of `values` `(N, F)` within each group.
///
/// Returns the non-empty group ids in ascending order and a `(G, F)` tensor with one
/// row per id.
pub fn segment_sum(values: &Tensor, groups: &[usize]) -> Result<(Vec<usize>, Tensor)> {
    let (rows, width) = values.dims2()?;
    check_rows(values, groups)?;
    if rows == 0 {
        return Ok((Vec::new(), Tensor::zeros((0, width), values.dtype(), values.device())?));
    }

    let members = group_members(groups);
    let mut ids = Vec::with_capacity(members.len());
    let mut sums = Vec::with_capacity(members.len());
    for (&group, rows_of_group) in &members {
        ids.push(group);
        sums.push(select_rows(values, rows_of_group)?.sum_keepdim(0)?);
    }
    Ok((ids, Tensor::cat(&sums, 0)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_softmax_within_groups() {
        let device = Device::Cpu;
        let logits = Tensor::new(&[0f32, 5.0, 0.0, 5.0, 1.0], &device).unwrap();
        let groups = [0, 1, 0, 1, 2];
        let w = segment_softmax(&logits, &groups).unwrap().to_vec1::<f32>().unwrap();

        assert!((w[0] - 0.5).abs() < 1e-6);
        assert!((w[2] - 0.5).abs() < 1e-6);
        assert!((w[1] - 0.5).abs() < 1e-6);
        assert!((w[3] - 0.5).abs() < 1e-6);
        assert!((w[4] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_softmax_per_head() {
        let device = Device::Cpu;
        let logits = Tensor::new(&[[1f32, 0.0], [1.0, 3.0], [2.0, 2.0]], &device).unwrap();
        let groups = [4, 4, 1];
        let w = segment_softmax(&logits, &groups).unwrap().to_vec2::<f32>().unwrap();

        assert!((w[0][0] - 0.5).abs() < 1e-6);
        assert!((w[0][1] + w[1][1] - 1.0).abs() < 1e-6);
        assert!(w[1][1] > w[0][1]);
        assert_eq!(w[2], vec![1.0, 1.0]);
    }

    #[test]
    fn test_softmax_group_mismatch() {
        let device = Device::Cpu;
        let logits = Tensor::new(&[0f32, 1.0], &device).unwrap();
        assert!(matches!(
            segment_softmax(&logits, &[0]),
            Err(Error::Computation(_))
        ));
    }

    #[test]
    fn test_sum_ascending_ids() {
        let device = Device::Cpu;
        let values = Tensor::new(&[[1f32, 1.0], [2.0, 2.0], [4.0, 4.0]], &device).unwrap();
        let (ids, sums) = segment_sum(&values, &[7, 3, 7]).unwrap();
        assert_eq!(ids, vec![3, 7]);
        assert_eq!(
            sums.to_vec2::<f32>().unwrap(),
            vec![vec![2.0, 2.0], vec![5.0, 5.0]]
        );
    }

    #[test]
    fn test_group_members() {
        let members = group_members(&[2, 0, 2]);
        assert_eq!(members.keys().copied().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(members[&2], vec![0, 2]);
    }
}
