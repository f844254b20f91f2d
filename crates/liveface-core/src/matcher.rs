//! Embedding comparison against the gallery.

use crate::gallery::Gallery;

/// Default distance tolerance for a positive match.
pub const DEFAULT_TOLERANCE: f32 = 0.5;

/// Fixed-length identity vector produced by the external face encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }
}

/// Outcome of comparing a query embedding against the gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    /// Distance to the nearest gallery entry; infinite for an empty gallery.
    pub distance: f32,
    /// Label of the nearest entry, when one exists.
    pub label: Option<String>,
}

impl MatchResult {
    fn no_match() -> Self {
        Self {
            matched: false,
            distance: f32::INFINITY,
            label: None,
        }
    }
}

pub trait Matcher {
    fn compare(&self, query: &Embedding, gallery: &Gallery, tolerance: f32) -> MatchResult;
}

/// Euclidean-distance matcher — the distance convention of the upstream
/// face-encoding library the gallery format comes from.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(&self, query: &Embedding, gallery: &Gallery, tolerance: f32) -> MatchResult {
        let mut best = MatchResult::no_match();

        for entry in gallery.entries() {
            if entry.embedding.values.len() != query.values.len() {
                // Encoder/gallery dimension drift: skip rather than guess.
                continue;
            }
            let distance = euclidean(&query.values, &entry.embedding.values);
            if distance < best.distance {
                best.distance = distance;
                best.label = Some(entry.label.clone());
            }
        }

        best.matched = best.distance <= tolerance;
        best
    }
}

fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}
