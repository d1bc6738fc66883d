//! Insertion and connection maintenance
//!
//! [`insert_element`] finds an element's neighbors on every layer it
//! belongs to; [`update_connection`] makes one of those neighbors point back
//! at it, evicting an existing connection when the neighbor's array is full.
//! Both run unchanged on the in-memory build graph and against pages.

use pagehnsw_core::{layer_capacity, Result, HEAPTIDS};

use crate::backing::Backing;
use crate::distance::Query;
use crate::graph::{Candidate, ElementId, Graph, NeighborEntry};
use crate::search::{descend, search_layer};
use crate::select::select_neighbors;

/// What happened to a neighbor array when a new element was offered to it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionUpdate {
    /// The array had room; the new element was appended
    Appended,
    /// The entry at this index was replaced by the new element
    Replaced(usize),
    /// The new element was not selected
    Unchanged,
}

/// Find and record the neighbors of `element` on layers `0..=level`.
///
/// With `existing` set the element is already part of the graph: it is used
/// as the skip marker and the beam is widened by one to make room for it.
/// The entry point is not updated here.
pub fn insert_element<B: Backing>(
    graph: &mut Graph,
    backing: &B,
    element: ElementId,
    entry_point: Option<ElementId>,
    ef_construction: usize,
    m: usize,
    existing: bool,
) -> Result<()> {
    let entry_point = match entry_point {
        Some(ep) => ep,
        None => return Ok(()),
    };

    let payload = graph.get(element).payload()?.clone();
    let query = Query::Tuple(&payload);
    let skip = if existing { Some(element) } else { None };

    let mut ep = vec![backing.entry_candidate(graph, entry_point, &query)?];
    let entry_level = graph.get(entry_point).level;
    let level = graph.get(element).level;

    // 1st phase: greedy search down to the element's level
    ep = descend(graph, backing, &query, ep, entry_level, level, skip)?;

    let level = level.min(entry_level);
    let ef = if existing {
        ef_construction + 1
    } else {
        ef_construction
    };

    // 2nd phase: beam search and selection per layer
    for lc in (0..=level).rev() {
        let lm = layer_capacity(m, lc);
        let w = search_layer(graph, backing, &query, ep, ef, lc, skip)?;

        let mut lw = w.clone();
        if !backing.in_memory() {
            remove_elements(graph, &mut lw, element);
        }

        let selection =
            select_neighbors(graph, backing.engine(), lw, lm, lc, element, None, false)?;
        add_connections(graph, element, &selection.kept, lc)?;

        ep = w;
    }

    Ok(())
}

/// Drop the element itself and tombstoned elements from a candidate list.
///
/// Tombstoned elements help the search but are never selected.
pub fn remove_elements(graph: &Graph, candidates: &mut Vec<Candidate>, element: ElementId) {
    candidates.retain(|c| c.id != element && !graph.get(c.id).is_tombstoned());
}

fn add_connections(
    graph: &mut Graph,
    element: ElementId,
    neighbors: &[Candidate],
    lc: usize,
) -> Result<()> {
    let array = graph.layer_mut(element, lc)?;
    array.items = neighbors.iter().map(NeighborEntry::from_candidate).collect();
    Ok(())
}

/// Offer `new` to `neighbor`'s array at layer `lc`.
///
/// `distance` is the distance between the two elements. A full array never
/// grows: with paged storage the first tombstoned entry is evicted, otherwise
/// the selection heuristic over the current entries plus `new` picks the
/// entry to replace.
pub fn update_connection<B: Backing>(
    graph: &mut Graph,
    backing: &B,
    new: ElementId,
    distance: f32,
    neighbor: ElementId,
    lm: usize,
    lc: usize,
) -> Result<ConnectionUpdate> {
    let new_entry = NeighborEntry {
        id: new,
        distance: Some(distance),
        closer: false,
    };

    let array = graph.layer_mut(neighbor, lc)?;
    if array.len() < lm {
        array.items.push(new_entry);
        return Ok(ConnectionUpdate::Appended);
    }

    let mut victim: Option<ElementId> = None;
    let mut new_closer = false;

    if !backing.in_memory() {
        let target = graph.get(neighbor).payload()?.clone();
        let query = Query::Tuple(&target);
        let items: Vec<ElementId> = graph.layer_mut(neighbor, lc)?.items.iter().map(|n| n.id).collect();
        for (i, id) in items.into_iter().enumerate() {
            let d = backing.distance_to(graph, id, &query)?;
            graph.layer_mut(neighbor, lc)?.items[i].distance = Some(d);
            if graph.get(id).is_tombstoned() {
                victim = Some(id);
                break;
            }
        }
    }

    if victim.is_none() {
        let mut candidates: Vec<Candidate> = graph
            .layer_mut(neighbor, lc)?
            .items
            .iter()
            .map(|n| Candidate {
                id: n.id,
                distance: n.distance.unwrap_or(f32::INFINITY),
                closer: n.closer,
            })
            .collect();
        candidates.push(Candidate::new(new, distance));

        let selection = select_neighbors(
            graph,
            backing.engine(),
            candidates,
            lm,
            lc,
            neighbor,
            Some(new),
            true,
        )?;

        for item in graph.layer_mut(neighbor, lc)?.items.iter_mut() {
            if let Some(closer) = selection.closer_of(item.id) {
                item.closer = closer;
            }
        }
        new_closer = selection.closer_of(new).unwrap_or(false);
        victim = selection.pruned.map(|c| c.id);
    }

    let victim = match victim {
        Some(v) => v,
        None => return Ok(ConnectionUpdate::Unchanged),
    };

    let array = graph.layer_mut(neighbor, lc)?;
    match array.position(victim) {
        Some(i) => {
            array.items[i] = NeighborEntry {
                closer: new_closer,
                ..new_entry
            };
            Ok(ConnectionUpdate::Replaced(i))
        }
        None => Ok(ConnectionUpdate::Unchanged),
    }
}

/// Make every neighbor of `element` point back at it
pub fn connect_back<B: Backing>(
    graph: &mut Graph,
    backing: &B,
    element: ElementId,
    m: usize,
) -> Result<()> {
    let level = graph.get(element).level;
    for lc in (0..=level).rev() {
        let lm = layer_capacity(m, lc);
        let neighbors: Vec<NeighborEntry> = match graph.get(element).layer(lc) {
            Some(array) => array.items.clone(),
            None => continue,
        };
        for hc in neighbors {
            let distance = hc.distance.unwrap_or(f32::INFINITY);
            update_connection(graph, backing, element, distance, hc.id, lm, lc)?;
        }
    }
    Ok(())
}

/// Layer-0 neighbors holding exactly the same vector as `element`, nearest
/// first, stopping at the first that differs.
///
/// The list is walked in distance order whether or not selection had to
/// reorder it.
///
/// Multi-column indexes never fold duplicates.
pub fn identical_neighbors(graph: &Graph, element: ElementId, multi_column: bool) -> Vec<ElementId> {
    let mut out = Vec::new();
    if multi_column {
        return out;
    }
    let e = graph.get(element);
    let vector = match &e.payload {
        Some(p) => &p.vector,
        None => return out,
    };
    let layer0 = match e.layer(0) {
        Some(array) => array,
        None => return out,
    };
    let mut ordered: Vec<Candidate> = layer0
        .items
        .iter()
        .map(|n| Candidate::new(n.id, n.distance.unwrap_or(f32::INFINITY)))
        .collect();
    ordered.sort();

    for n in ordered {
        let same = graph
            .get(n.id)
            .payload
            .as_ref()
            .map(|p| bit_identical(&p.vector, vector))
            .unwrap_or(false);
        if !same {
            break;
        }
        out.push(n.id);
    }
    out
}

/// First identical layer-0 neighbor that still has room for a row reference
pub fn find_duplicate(graph: &Graph, element: ElementId, multi_column: bool) -> Option<ElementId> {
    identical_neighbors(graph, element, multi_column)
        .into_iter()
        .find(|&id| {
            let e = graph.get(id);
            !e.deleted && e.heaptids.len() < HEAPTIDS
        })
}

fn bit_identical(a: &[f32], b: &[f32]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
}
