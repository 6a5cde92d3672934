//! Property-based tests for batch storage and traversal.
//!
//! These verify invariants that should hold for any batch:
//! - Node counts and feature rows stay consistent
//! - Edges are symmetric
//! - Batching shifts indices by exactly the preceding node count, and splits back
//! - Traversal results do not depend on neighbour enumeration order

use nodegraph_core::{batch_graphs, GraphBatch, Traversal};
use proptest::prelude::*;

const DIM: usize = 3;

/// Generate a single graph with up to `max_nodes` nodes and random edges.
fn arb_graph(max_nodes: usize) -> impl Strategy<Value = GraphBatch> {
    (1..=max_nodes).prop_flat_map(|n| {
        (
            prop::collection::vec(prop::collection::vec(-5.0f32..5.0, DIM), n),
            prop::collection::vec((0..n, 0..n), 0..3 * n),
        )
            .prop_map(|(rows, edges)| {
                let mut g = GraphBatch::new();
                for row in &rows {
                    g.add_node(row).unwrap();
                }
                for (i, j) in edges {
                    g.add_edge(i, j).unwrap();
                }
                g
            })
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn add_node_counts(rows in prop::collection::vec(prop::collection::vec(0.0f32..1.0, DIM), 0..20)) {
        let mut g = GraphBatch::new();
        for row in &rows {
            g.add_node(row).unwrap();
        }
        prop_assert_eq!(g.graph_node_counts(), &[rows.len()]);
        prop_assert_eq!(g.node_count(), rows.len());
        prop_assert_eq!(g.node_features().len(), rows.len() * DIM);
    }

    #[test]
    fn edges_are_symmetric(g in arb_graph(10)) {
        for (i, neighbours) in g.adjacency().iter().enumerate() {
            for &j in neighbours {
                prop_assert!(g.adjacency()[j].contains(&i), "edge {} -> {} has no mirror", i, j);
            }
        }
    }

    #[test]
    fn append_shifts_by_node_count(a in arb_graph(8), b in arb_graph(8)) {
        let merged = batch_graphs(&[a.clone(), b.clone()]).unwrap();
        let shift = a.node_count();

        let mut features = a.node_features().to_vec();
        features.extend_from_slice(b.node_features());
        prop_assert_eq!(merged.node_features(), features.as_slice());

        let mut counts = a.graph_node_counts().to_vec();
        counts.extend_from_slice(b.graph_node_counts());
        prop_assert_eq!(merged.graph_node_counts(), counts.as_slice());

        for (i, neighbours) in b.adjacency().iter().enumerate() {
            let shifted: Vec<usize> = neighbours.iter().map(|&j| j + shift).collect();
            prop_assert_eq!(&merged.adjacency()[i + shift], &shifted);
        }
    }

    #[test]
    fn split_roundtrip(graphs in prop::collection::vec(arb_graph(6), 1..5)) {
        let merged = batch_graphs(&graphs).unwrap();
        prop_assert_eq!(merged.graph_count(), graphs.len());
        prop_assert_eq!(merged.split(), graphs);
    }

    #[test]
    fn traversal_order_independent(g in arb_graph(10), depth in 0usize..4) {
        let traversal = Traversal::new(depth);
        let reversed: Vec<Vec<usize>> = g
            .adjacency()
            .iter()
            .map(|n| n.iter().rev().copied().collect())
            .collect();

        for node in 0..g.node_count() {
            let forward = traversal.neighbourhood(g.adjacency(), node).unwrap();
            let backward = traversal.neighbourhood(&reversed, node).unwrap();
            prop_assert_eq!(&forward, &backward);
            prop_assert!(forward.contains(&node));
        }
    }

    #[test]
    fn traversal_stays_in_graph(graphs in prop::collection::vec(arb_graph(6), 1..4), depth in 0usize..5) {
        let merged = batch_graphs(&graphs).unwrap();
        let ids = merged.graph_ids();
        for node in 0..merged.node_count() {
            let hood = Traversal::new(depth).neighbourhood(merged.adjacency(), node).unwrap();
            prop_assert!(hood.iter().all(|&n| ids[n] == ids[node]));
        }
    }

    #[test]
    fn deeper_traversal_is_superset(g in arb_graph(10), depth in 0usize..4) {
        for node in 0..g.node_count() {
            let near = Traversal::new(depth).neighbourhood(g.adjacency(), node).unwrap();
            let far = Traversal::new(depth + 1).neighbourhood(g.adjacency(), node).unwrap();
            prop_assert!(near.iter().all(|n| far.contains(n)));
        }
    }
}

#[test]
fn descriptor_scenario() {
    let mut g1 = GraphBatch::new();
    for x in 0..3 {
        g1.add_node(&[x as f32, 0.0, 0.0]).unwrap();
    }
    g1.add_edge(0, 1).unwrap();
    g1.add_edge(1, 2).unwrap();
    let mut g2 = GraphBatch::new();
    g2.add_node(&[10.0, 0.0, 0.0]).unwrap();
    g2.add_node(&[11.0, 0.0, 0.0]).unwrap();
    g2.add_edge(0, 1).unwrap();

    let merged = batch_graphs(&[g1, g2]).unwrap();
    let desc = merged.to_descriptor();
    assert_eq!(desc.graph_count, 2);
    assert_eq!(desc.graph_node_counts, vec![3, 2]);
    assert_eq!(desc.adjacency[3], vec![4]);
    assert_eq!(desc.node_features[4], vec![11.0, 0.0, 0.0]);
}
