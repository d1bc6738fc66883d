//! Distance engine
//!
//! All distances are "lower = closer". A single-column index uses the
//! vector metric directly. A multi-column index blends the vector distance
//! with an attribute mismatch term:
//!
//! ```text
//! distance = weight * vector_distance + attribute_bias(e)
//! attribute_bias(e) = bias - 1 / log10(e + 1)   (e > 0)
//!                   = 0                          (e = 0)
//! ```
//!
//! `e` sums the per-attribute mismatches. A null paired with a value, or two
//! unequal values whose own distance is zero, contributes the penalty.
//!
//! Arithmetic is done in `f64` and the result stored as `f32`, the width
//! kept in candidates.

use pagehnsw_core::{
    AttributeKind, AttributeWeights, Datum, DistanceMetric, Error, HnswOptions, Result,
};

use crate::graph::Payload;

/// Comparison against one attribute column
#[derive(Debug, Clone, PartialEq)]
pub struct ScanKey {
    /// 1-based index column number; attributes start at 2
    pub attno: usize,
    /// Value to compare against; `None` matches NULL
    pub value: Option<Datum>,
}

impl ScanKey {
    /// Key on index column `attno`
    pub fn new(attno: usize, value: Option<Datum>) -> Self {
        ScanKey { attno, value }
    }
}

/// The side of a distance computation that is not a stored element
#[derive(Debug, Clone, Copy)]
pub enum Query<'a> {
    /// A literal query vector with optional attribute keys
    Keys {
        /// Query vector
        vector: &'a [f32],
        /// Attribute keys; columns without a key do not contribute
        keys: &'a [ScanKey],
    },
    /// Another element's stored tuple, every attribute compared
    Tuple(&'a Payload),
}

impl<'a> Query<'a> {
    /// Query vector
    pub fn vector(&self) -> &'a [f32] {
        match self {
            Query::Keys { vector, .. } => vector,
            Query::Tuple(p) => &p.vector,
        }
    }
}

/// Primary metric plus attribute blend for one index
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceEngine {
    metric: DistanceMetric,
    attributes: Vec<AttributeKind>,
    weights: AttributeWeights,
}

impl DistanceEngine {
    /// Engine for the given index options
    pub fn new(options: &HnswOptions) -> Self {
        DistanceEngine {
            metric: options.metric,
            attributes: options.attributes.clone(),
            weights: options.attribute_weights,
        }
    }

    /// Vector metric
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// True when attributes contribute to the distance
    pub fn is_multi_column(&self) -> bool {
        !self.attributes.is_empty()
    }

    /// Check that every key names an attribute column.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a key on the vector column or a
    /// column the index does not have.
    pub fn validate_keys(&self, keys: &[ScanKey]) -> Result<()> {
        for key in keys {
            if key.attno < 2 || key.attno > self.attributes.len() + 1 {
                return Err(Error::input(format!(
                    "scan key on column {} does not name an attribute column",
                    key.attno
                )));
            }
        }
        Ok(())
    }

    /// Distance between a stored element and the query
    pub fn distance(&self, target: &Payload, query: &Query<'_>) -> f32 {
        let g = vector_distance(self.metric, &target.vector, query.vector());
        if !self.is_multi_column() {
            return g as f32;
        }

        let mut e = 0.0;
        match query {
            // a keyless scan ranks by the vector metric alone
            Query::Keys { keys, .. } if keys.is_empty() => return g as f32,
            Query::Keys { keys, .. } => {
                for key in keys.iter() {
                    let i = match key.attno.checked_sub(2) {
                        Some(i) if i < self.attributes.len() => i,
                        _ => continue,
                    };
                    let stored = target.attributes.get(i).and_then(|v| v.as_ref());
                    e += self.mismatch(self.attributes[i], stored, key.value.as_ref());
                }
            }
            Query::Tuple(other) => {
                for (i, kind) in self.attributes.iter().enumerate() {
                    let stored = target.attributes.get(i).and_then(|v| v.as_ref());
                    let value = other.attributes.get(i).and_then(|v| v.as_ref());
                    e += self.mismatch(*kind, stored, value);
                }
            }
        }

        (self.weights.weight * g + self.attribute_bias(e)) as f32
    }

    /// Distance between two stored elements
    pub fn between(&self, a: &Payload, b: &Payload) -> f32 {
        self.distance(a, &Query::Tuple(b))
    }

    /// `bias - 1 / log10(e + 1)` for a positive mismatch, else 0
    pub fn attribute_bias(&self, e: f64) -> f64 {
        if e > 0.0 {
            self.weights.bias - 1.0 / (e + 1.0).log10()
        } else {
            0.0
        }
    }

    fn mismatch(&self, kind: AttributeKind, a: Option<&Datum>, b: Option<&Datum>) -> f64 {
        match (a, b) {
            (None, None) => 0.0,
            (None, Some(_)) | (Some(_), None) => self.weights.penalty,
            (Some(a), Some(b)) if a == b => 0.0,
            (Some(a), Some(b)) => {
                let d = attribute_distance(kind, a, b).abs();
                // unequal but zero apart
                if d > 0.0 {
                    d
                } else {
                    self.weights.penalty
                }
            }
        }
    }
}

/// Column distance between two attribute values of the same kind.
///
/// Values of a different kind than the column are zero apart, which the
/// caller turns into the penalty.
pub fn attribute_distance(kind: AttributeKind, a: &Datum, b: &Datum) -> f64 {
    match (kind, a, b) {
        (AttributeKind::Int, Datum::Int(x), Datum::Int(y)) => (*x as f64 - *y as f64).abs(),
        (AttributeKind::Float, Datum::Float(x), Datum::Float(y)) => (x - y).abs(),
        (AttributeKind::Text, Datum::Text(x), Datum::Text(y)) => {
            (x.len() as f64 - y.len() as f64).abs()
        }
        _ => 0.0,
    }
}

/// Vector distance under `metric`
pub fn vector_distance(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f64 {
    debug_assert_eq!(a.len(), b.len(), "Dimension mismatch in distance computation");

    match metric {
        DistanceMetric::L2 => l2_distance(a, b),
        DistanceMetric::InnerProduct => -dot_product(a, b),
        DistanceMetric::Cosine => cosine_distance(a, b),
        DistanceMetric::L1 => l1_distance(a, b),
    }
}

/// Euclidean distance
pub fn l2_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = *x as f64 - *y as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

/// Inner product
pub fn dot_product(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| *x as f64 * *y as f64)
        .sum()
}

/// `1 - cosine similarity`; a zero vector has similarity 0
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    let similarity = (dot_product(a, b) / (norm_a * norm_b)).clamp(-1.0, 1.0);
    1.0 - similarity
}

/// Manhattan distance
pub fn l1_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64 - *y as f64).abs())
        .sum()
}

fn l2_norm(v: &[f32]) -> f64 {
    v.iter().map(|x| *x as f64 * *x as f64).sum::<f64>().sqrt()
}

/// Unit-length copy of `v`, or `None` for a zero vector
pub fn normalize(v: &[f32]) -> Option<Vec<f32>> {
    let norm = l2_norm(v);
    if norm == 0.0 || !norm.is_finite() {
        return None;
    }
    Some(v.iter().map(|x| (*x as f64 / norm) as f32).collect())
}
