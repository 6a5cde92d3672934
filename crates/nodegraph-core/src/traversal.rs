//! Depth-bounded neighbourhood discovery.
//!
//! The neighbourhood of node `v` at depth `d` is every node whose hop distance from `v`
//! is at most `d`, `v` included:
//!
//! ```text
//! N_0(v) = {v}
//! N_d(v) = {v} ∪ adj(v) ∪ ⋃_{u ∈ adj(v), u ≠ v} N_{d-1}(u)
//! ```
//!
//! Expansion is breadth-first over an explicit frontier, so neither depth nor branching
//! factor grows the call stack. Results are sets, returned in ascending node order.

use crate::error::{check_index, Result};
use std::collections::{BTreeSet, VecDeque};

/// Breadth-first neighbourhood expansion up to a fixed depth.
///
/// # Example
///
/// ```rust
/// use nodegraph_core::Traversal;
///
/// // path 0 - 1 - 2 - 3 - 4
/// let adjacency = vec![vec![1], vec![0, 2], vec![1, 3], vec![2, 4], vec![3]];
///
/// assert_eq!(Traversal::new(0).neighbourhood(&adjacency, 2).unwrap(), vec![2]);
/// assert_eq!(Traversal::new(1).neighbourhood(&adjacency, 2).unwrap(), vec![1, 2, 3]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Traversal {
    depth: usize,
}

impl Default for Traversal {
    fn default() -> Self {
        Self { depth: 1 }
    }
}

impl Traversal {
    pub fn new(depth: usize) -> Self {
        Self { depth }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Nodes within `depth` hops of `start`, ascending.
    ///
    /// Fails with an index error if `start` or any neighbour reached on the way is not
    /// a valid row of `adjacency`.
    pub fn neighbourhood(&self, adjacency: &[Vec<usize>], start: usize) -> Result<Vec<usize>> {
        let len = adjacency.len();
        check_index(start, len)?;

        let mut visited = BTreeSet::new();
        visited.insert(start);
        let mut frontier = VecDeque::new();
        frontier.push_back((start, 0usize));

        while let Some((node, hops)) = frontier.pop_front() {
            if hops == self.depth {
                continue;
            }
            for &next in &adjacency[node] {
                check_index(next, len)?;
                if visited.insert(next) {
                    frontier.push_back((next, hops + 1));
                }
            }
        }

        Ok(visited.into_iter().collect())
    }

    /// Neighbourhood of every node in `nodes`, in the same order.
    pub fn neighbourhoods(&self, adjacency: &[Vec<usize>], nodes: &[usize]) -> Result<Vec<Vec<usize>>> {
        nodes
            .iter()
            .map(|&node| self.neighbourhood(adjacency, node))
            .collect()
    }
}
