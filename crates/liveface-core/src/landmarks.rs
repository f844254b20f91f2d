//! Facial landmark data model.
//!
//! A [`LandmarkSet`] is one frame's worth of face-mesh output: 468 points
//! in normalized image coordinates, in the fixed order the mesh model
//! emits them. The extractor either produces a full set or nothing — a
//! partial set is a contract violation, rejected at construction.

use thiserror::Error;

/// Number of points in the face mesh this crate is built around.
pub const MESH_POINTS: usize = 468;

#[derive(Error, Debug)]
pub enum LandmarkError {
    #[error("expected {MESH_POINTS} landmarks, got {0}")]
    WrongCardinality(usize),
    #[error("non-finite coordinate at landmark {0}")]
    NonFinite(usize),
    #[error("degenerate eye geometry: zero corner-to-corner width")]
    DegenerateEye,
}

/// One 3D mesh point. `x`/`y` are normalized to the frame, `z` is the
/// model's relative depth estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance in the image plane (x/y only).
    pub fn planar_distance(&self, other: &Landmark) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// An ordered, fixed-cardinality set of mesh points for one face in one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    points: Vec<Landmark>,
}

impl LandmarkSet {
    /// Build a set from raw points, enforcing the mesh cardinality.
    pub fn new(points: Vec<Landmark>) -> Result<Self, LandmarkError> {
        if points.len() != MESH_POINTS {
            return Err(LandmarkError::WrongCardinality(points.len()));
        }
        Ok(Self { points })
    }

    /// Build a set from `(x, y, z)` triples, enforcing the mesh cardinality.
    pub fn from_triples(triples: &[[f32; 3]]) -> Result<Self, LandmarkError> {
        Self::new(
            triples
                .iter()
                .map(|t| Landmark::new(t[0], t[1], t[2]))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Landmark> {
        self.points.iter()
    }

    /// Checked access that also rejects non-finite coordinates, so the
    /// analyzers surface malformed model output as an error instead of
    /// propagating NaN through the decision policy.
    pub fn point(&self, index: usize) -> Result<&Landmark, LandmarkError> {
        let p = self
            .points
            .get(index)
            .ok_or(LandmarkError::WrongCardinality(self.points.len()))?;
        if !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()) {
            return Err(LandmarkError::NonFinite(index));
        }
        Ok(p)
    }
}
