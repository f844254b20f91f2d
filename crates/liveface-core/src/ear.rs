//! Eye-aspect-ratio (EAR) estimation from face-mesh landmarks.
//!
//! EAR is the classic blink signal: the ratio of eyelid opening to eye
//! width. It stays roughly constant while the eye is open and collapses
//! toward zero during a blink, independent of face scale and distance to
//! the camera.

use crate::landmarks::{LandmarkError, LandmarkSet};

/// EAR below this classifies the frame as eyes-closed.
pub const CLOSED_THRESHOLD: f32 = 0.3;

/// Face-mesh contour of the left eye, ordered from the inner corner.
const LEFT_EYE: [usize; 16] = [
    362, 382, 381, 380, 374, 373, 390, 249, 263, 466, 388, 387, 386, 385, 384, 398,
];
/// Face-mesh contour of the right eye, ordered from the outer corner.
const RIGHT_EYE: [usize; 16] = [
    33, 7, 163, 144, 145, 153, 154, 155, 133, 173, 157, 158, 159, 160, 161, 246,
];

/// Positions within a 16-point contour: the two corners and two
/// upper/lower lid pairs used for the openness distances.
const CORNER_A: usize = 0;
const CORNER_B: usize = 8;
const LID_PAIRS: [(usize, usize); 2] = [(13, 3), (11, 5)];

fn single_eye_ratio(landmarks: &LandmarkSet, contour: &[usize; 16]) -> Result<f32, LandmarkError> {
    let corner_a = landmarks.point(contour[CORNER_A])?;
    let corner_b = landmarks.point(contour[CORNER_B])?;
    let width = corner_a.planar_distance(corner_b);
    if width <= f32::EPSILON {
        return Err(LandmarkError::DegenerateEye);
    }

    let mut vertical = 0.0;
    for (upper, lower) in LID_PAIRS {
        let top = landmarks.point(contour[upper])?;
        let bottom = landmarks.point(contour[lower])?;
        vertical += top.planar_distance(bottom);
    }

    Ok(vertical / (2.0 * width))
}

/// Average eye-aspect ratio across both eyes.
///
/// Fails on malformed landmark data (non-finite coordinates, collapsed eye
/// corners); the session boundary is responsible for catching this.
pub fn eye_aspect_ratio(landmarks: &LandmarkSet) -> Result<f32, LandmarkError> {
    let left = single_eye_ratio(landmarks, &LEFT_EYE)?;
    let right = single_eye_ratio(landmarks, &RIGHT_EYE)?;
    Ok((left + right) / 2.0)
}

/// Convenience classification against [`CLOSED_THRESHOLD`].
pub fn eyes_closed(landmarks: &LandmarkSet) -> Result<bool, LandmarkError> {
    Ok(eye_aspect_ratio(landmarks)? < CLOSED_THRESHOLD)
}
