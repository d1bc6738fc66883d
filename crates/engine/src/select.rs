//! Neighbor selection
//!
//! The HNSW "closer" heuristic: walk candidates nearest-first and keep one
//! only if it is closer to the owner than to every neighbor kept so far.
//! Discarded candidates backfill any remaining capacity, nearest first.
//!
//! ## Closer caching
//!
//! Each candidate carries the outcome of its last closer check. When the
//! owner's array was produced by a deterministically sorted selection
//! (`closer_set`), a re-run over the same candidates plus one new candidate
//! only recomputes what the new candidate can have changed:
//!
//! - before anything new was kept, only the new candidate is checked
//! - after that, previously closer candidates are checked against the newly
//!   kept ones
//! - once any candidate stopped being closer, previously rejected candidates
//!   are checked again against everything kept

use pagehnsw_core::Result;

use crate::distance::DistanceEngine;
use crate::graph::{Candidate, ElementId, Graph};

/// Outcome of one selection run
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Selected neighbors in selection order, at most the layer capacity
    pub kept: Vec<Candidate>,
    /// Candidates that failed the closer check, nearest first, with their
    /// updated closer flags. Backfilled ones appear in `kept` too.
    pub discarded: Vec<Candidate>,
    /// Candidate to evict when the owner's array is full
    pub pruned: Option<Candidate>,
}

impl Selection {
    /// Closer flag computed for `id` in this run, if it was considered
    pub fn closer_of(&self, id: ElementId) -> Option<bool> {
        self.kept
            .iter()
            .chain(self.discarded.iter())
            .find(|c| c.id == id)
            .map(|c| c.closer)
    }
}

/// Select at most `lm` neighbors for `owner` at layer `lc`.
///
/// `candidates` must be ordered farthest-first unless `sort` is set, in
/// which case they are sorted by distance then handle. Every candidate must
/// be hydrated.
#[allow(clippy::too_many_arguments)]
pub fn select_neighbors(
    graph: &mut Graph,
    engine: &DistanceEngine,
    candidates: Vec<Candidate>,
    lm: usize,
    lc: usize,
    owner: ElementId,
    new_candidate: Option<ElementId>,
    sort: bool,
) -> Result<Selection> {
    let mut w = candidates;
    if w.len() <= lm {
        return Ok(Selection {
            kept: w,
            ..Selection::default()
        });
    }

    let must_calculate = !graph
        .get(owner)
        .layer(lc)
        .map(|a| a.closer_set)
        .unwrap_or(false);

    if sort {
        w.sort_by(|a, b| b.cmp(a));
    }

    let mut r: Vec<Candidate> = Vec::with_capacity(lm);
    let mut wd: Vec<Candidate> = Vec::new();
    let mut added: Vec<Candidate> = Vec::new();
    let mut removed_any = false;

    while r.len() < lm {
        let mut e = match w.pop() {
            Some(e) => e,
            None => break,
        };

        if must_calculate {
            e.closer = is_closer(graph, engine, &e, &r, lc)?;
        } else if !added.is_empty() {
            if e.closer {
                e.closer = is_closer(graph, engine, &e, &added, lc)?;
                if !e.closer {
                    removed_any = true;
                }
            } else if removed_any {
                e.closer = is_closer(graph, engine, &e, &r, lc)?;
                if e.closer {
                    added.push(e);
                }
            }
        } else if Some(e.id) == new_candidate {
            e.closer = is_closer(graph, engine, &e, &r, lc)?;
            if e.closer {
                added.push(e);
            }
        }

        if e.closer {
            r.push(e);
        } else {
            wd.push(e);
        }
    }

    if let Some(array) = graph.get_mut(owner).layer_mut(lc) {
        array.closer_set = sort;
    }

    // backfill with the nearest rejected candidates
    let backfill = (lm - r.len()).min(wd.len());
    r.extend(wd.iter().take(backfill).copied());

    let pruned = if backfill < wd.len() {
        Some(wd[backfill])
    } else {
        w.first().copied()
    };

    Ok(Selection {
        kept: r,
        discarded: wd,
        pruned,
    })
}

/// True if `e` is strictly closer to the owner than to every element of `r`
fn is_closer(
    graph: &Graph,
    engine: &DistanceEngine,
    e: &Candidate,
    r: &[Candidate],
    lc: usize,
) -> Result<bool> {
    for ri in r {
        let d = cached_distance(graph, engine, e.id, ri.id, lc)?;
        if d <= e.distance {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Distance between two elements, reusing a distance stored in either
/// element's neighbor array at layer `lc`
pub fn cached_distance(
    graph: &Graph,
    engine: &DistanceEngine,
    a: ElementId,
    b: ElementId,
    lc: usize,
) -> Result<f32> {
    for (owner, other) in [(a, b), (b, a)] {
        let stored = graph
            .get(owner)
            .layer(lc)
            .and_then(|array| array.items.iter().find(|n| n.id == other))
            .and_then(|n| n.distance);
        if let Some(d) = stored {
            return Ok(d);
        }
    }
    Ok(engine.between(graph.get(a).payload()?, graph.get(b).payload()?))
}
