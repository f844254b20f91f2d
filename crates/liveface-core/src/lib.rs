//! Liveness core for the liveface facial-authentication service.
//!
//! The interesting part lives in [`liveness`]: a per-session state machine
//! that combines blink detection, landmark movement and image-quality
//! statistics into a per-frame liveness verdict. Landmark extraction and
//! face embedding are external collaborators reached through the trait
//! seams in [`backend`]; everything in this crate is synchronous and
//! model-free.

pub mod backend;
pub mod ear;
pub mod gallery;
pub mod landmarks;
pub mod liveness;
pub mod matcher;
pub mod movement;
pub mod quality;
pub mod remote;

pub use backend::{BackendError, FaceEncoder, LandmarkExtractor};
pub use gallery::{Gallery, GalleryError};
pub use landmarks::{Landmark, LandmarkError, LandmarkSet};
pub use liveness::{LivenessSession, LivenessVerdict, RejectReason};
pub use matcher::{Embedding, EuclideanMatcher, MatchResult, Matcher};
pub use remote::RemoteInference;
