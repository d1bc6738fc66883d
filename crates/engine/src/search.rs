//! Layer search
//!
//! Beam search over one layer of the graph. The frontier is a min-heap
//! (nearest candidate expanded first) and the result window a max-heap (the
//! worst result on top for eviction).
//!
//! Tombstoned elements are traversed like any other element. They are only
//! kept out of the window's count when a skip marker is active, so repairs
//! still collect `ef` live candidates.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use rustc_hash::FxHashSet;

use pagehnsw_core::Result;

use crate::backing::Backing;
use crate::distance::Query;
use crate::graph::{Candidate, ElementId, Graph};

/// Search layer `lc` for the `ef` elements nearest to `query`.
///
/// Returns the window farthest-first. Neighbor selection consumes that order
/// from the back without re-sorting.
pub fn search_layer<B: Backing>(
    graph: &mut Graph,
    backing: &B,
    query: &Query<'_>,
    entry_points: Vec<Candidate>,
    ef: usize,
    lc: usize,
    skip: Option<ElementId>,
) -> Result<Vec<Candidate>> {
    let mut visited: FxHashSet<ElementId> = FxHashSet::default();
    let mut frontier: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();
    let mut window: BinaryHeap<Candidate> = BinaryHeap::new();
    let mut kept = 0usize;

    for ep in entry_points {
        if !visited.insert(ep.id) {
            continue;
        }
        frontier.push(Reverse(ep));
        window.push(ep);
        if counts(graph, ep.id, skip) {
            kept += 1;
        }
    }

    while let Some(Reverse(c)) = frontier.pop() {
        match window.peek() {
            Some(worst) if c.distance > worst.distance => break,
            _ => {}
        }

        backing.load_neighbors(graph, c.id)?;
        let neighbors: Vec<ElementId> = match graph.get(c.id).layer(lc) {
            Some(array) => array.items.iter().map(|n| n.id).collect(),
            None => continue,
        };

        for e in neighbors {
            if !visited.insert(e) {
                continue;
            }

            let worst = window.peek().map(|w| w.distance).unwrap_or(f32::INFINITY);
            let distance = backing.distance_to(graph, e, query)?;

            // neighbor tuples can outlive a level change
            if graph.get(e).level < lc {
                continue;
            }

            if distance < worst || kept < ef {
                let candidate = Candidate::new(e, distance);
                frontier.push(Reverse(candidate));
                window.push(candidate);

                if counts(graph, e, skip) {
                    kept += 1;
                    if kept > ef {
                        window.pop();
                    }
                }
            }
        }
    }

    let mut result = window.into_sorted_vec();
    result.reverse();
    Ok(result)
}

fn counts(graph: &Graph, id: ElementId, skip: Option<ElementId>) -> bool {
    skip.is_none() || !graph.get(id).is_tombstoned()
}

/// Greedy descent with `ef = 1` through layers `top` down to `bottom + 1`.
///
/// Returns the entry points for layer `bottom`.
pub fn descend<B: Backing>(
    graph: &mut Graph,
    backing: &B,
    query: &Query<'_>,
    mut ep: Vec<Candidate>,
    top: usize,
    bottom: usize,
    skip: Option<ElementId>,
) -> Result<Vec<Candidate>> {
    for lc in ((bottom + 1)..=top).rev() {
        ep = search_layer(graph, backing, query, ep, 1, lc, skip)?;
    }
    Ok(ep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backing::InMemory;
    use crate::distance::DistanceEngine;
    use crate::graph::{Element, NeighborEntry, Payload};
    use pagehnsw_core::{HnswOptions, ItemPointer, PageId};

    /// Points on a line, each linked to its two nearest on layer 0
    fn line_graph(n: usize) -> Graph {
        let mut graph = Graph::new();
        for i in 0..n {
            graph.push(Element::new(
                0,
                ItemPointer::new(PageId::new(i as u32 + 100), 1),
                Payload::vector(vec![i as f32]),
                2,
            ));
        }
        for i in 0..n {
            let id = ElementId::new(i);
            let mut links = Vec::new();
            if i > 0 {
                links.push(i - 1);
            }
            if i + 1 < n {
                links.push(i + 1);
            }
            let layer = graph.layer_mut(id, 0).unwrap();
            for j in links {
                layer.items.push(NeighborEntry {
                    id: ElementId::new(j),
                    distance: Some(1.0),
                    closer: false,
                });
            }
        }
        graph
    }

    fn run(graph: &mut Graph, target: f32, ef: usize) -> Vec<Candidate> {
        let engine = DistanceEngine::new(&HnswOptions::new(1));
        let backing = InMemory::new(&engine);
        let q = [target];
        let query = Query::Keys {
            vector: &q,
            keys: &[],
        };
        let ep = backing.entry_candidate(graph, ElementId::new(0), &query).unwrap();
        search_layer(graph, &backing, &query, vec![ep], ef, 0, None).unwrap()
    }

    #[test]
    fn test_walks_to_nearest() {
        let mut graph = line_graph(20);
        let result = run(&mut graph, 15.2, 3);
        assert_eq!(result.len(), 3);
        // farthest first
        let ids: Vec<usize> = result.iter().map(|c| c.id.index()).collect();
        assert_eq!(ids, vec![14, 16, 15]);
        assert!(result.windows(2).all(|w| w[0].distance >= w[1].distance));
    }

    #[test]
    fn test_window_never_exceeds_ef() {
        let mut graph = line_graph(50);
        for ef in 1..10 {
            let result = run(&mut graph, 30.0, ef);
            assert!(result.len() <= ef);
        }
    }

    #[test]
    fn test_ef_one_is_greedy() {
        let mut graph = line_graph(10);
        let result = run(&mut graph, 7.0, 1);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id.index(), 7);
        assert_eq!(result[0].distance, 0.0);
    }

    #[test]
    fn test_tombstones_route_but_do_not_count_with_skip() {
        let mut graph = line_graph(10);
        for i in 1..4 {
            graph.get_mut(ElementId::new(i)).deleted = true;
        }
        let engine = DistanceEngine::new(&HnswOptions::new(1));
        let backing = InMemory::new(&engine);
        let q = [9.0f32];
        let query = Query::Keys {
            vector: &q,
            keys: &[],
        };
        let ep = backing.entry_candidate(&mut graph, ElementId::new(0), &query).unwrap();
        let skip = Some(ElementId::new(9));
        let result = search_layer(&mut graph, &backing, &query, vec![ep], 2, 0, skip).unwrap();
        let nearest = result.last().unwrap();
        assert_eq!(nearest.id.index(), 9);
        assert!(result.iter().all(|c| !graph.get(c.id).is_tombstoned()));
    }

    #[test]
    fn test_descend_stops_above_bottom() {
        let mut graph = line_graph(5);
        let engine = DistanceEngine::new(&HnswOptions::new(1));
        let backing = InMemory::new(&engine);
        let q = [4.0f32];
        let query = Query::Keys {
            vector: &q,
            keys: &[],
        };
        let ep = backing.entry_candidate(&mut graph, ElementId::new(0), &query).unwrap();
        // top == bottom: nothing to descend
        let out = descend(&mut graph, &backing, &query, vec![ep], 0, 0, None).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id.index(), 0);
    }
}
