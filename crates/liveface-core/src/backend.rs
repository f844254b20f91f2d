//! Trait seams for the external model collaborators.
//!
//! Landmark extraction and face embedding run in an external inference
//! service; this crate only defines the contracts. Implementations are
//! constructed once by the caller and passed by reference — no lazily
//! initialized globals. `Ok(None)` uniformly means "no face in this
//! image", which is an expected outcome, not an error.

use image::RgbImage;
use thiserror::Error;

use crate::landmarks::LandmarkSet;
use crate::matcher::Embedding;

/// Failure reaching or interpreting an inference backend.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct BackendError {
    message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Produces the face-mesh landmark set for the tracked face in a frame.
pub trait LandmarkExtractor: Send {
    fn extract(&mut self, frame: &RgbImage) -> Result<Option<LandmarkSet>, BackendError>;
}

/// Produces an identity embedding for the face in an image.
pub trait FaceEncoder: Send {
    fn encode(&mut self, image: &RgbImage) -> Result<Option<Embedding>, BackendError>;
}
