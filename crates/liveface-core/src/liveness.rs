//! Per-session liveness decision state machine.
//!
//! One [`LivenessSession`] lives for one authentication attempt and is fed
//! every processed frame. It combines three signals — image quality
//! ([`crate::quality`]), blink detection ([`crate::ear`]) and smoothed
//! landmark movement ([`crate::movement`]) — into a per-frame verdict,
//! carrying a consecutive-failure counter so that a transient detector
//! miss is tolerated while a sustained negative signal becomes a sticky
//! rejection.
//!
//! Sessions are deliberately NOT shared: concurrent authentication
//! attempts each get their own instance, threaded explicitly through
//! calls. [`LivenessSession::process_frame`] is total — analyzer failures
//! are converted into a verdict at this boundary and never propagate.

use std::collections::HashMap;
use std::fmt;

use image::RgbImage;

use crate::ear;
use crate::landmarks::{LandmarkError, LandmarkSet};
use crate::movement::MovementTracker;
use crate::quality;

/// Frames accepted unconditionally while the session warms up.
pub const WARMUP_FRAMES: u64 = 15;
/// Minimum frames observed before movement/blink evidence is required.
pub const MIN_FRAMES_FOR_DECISION: u64 = 30;
/// Consecutive negative signals that turn a soft failure into a rejection.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 5;
/// Minimum smoothed movement magnitude for a live subject.
pub const MOVEMENT_THRESHOLD: f32 = 0.1;

/// Why a frame was classified as not live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    NoFace,
    SuspiciousQuality,
    InsufficientMovement,
    NoBlink,
    Internal(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::NoFace => write!(f, "no face detected"),
            RejectReason::SuspiciousQuality => write!(f, "suspicious image quality"),
            RejectReason::InsufficientMovement => write!(f, "insufficient movement"),
            RejectReason::NoBlink => write!(f, "no blink detected"),
            RejectReason::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

/// Per-frame liveness verdict. `reason` is `Some` exactly when `live` is
/// false, so callers can tell a rejection from an analyzer error without
/// string matching.
#[derive(Debug, Clone, PartialEq)]
pub struct LivenessVerdict {
    pub live: bool,
    pub reason: Option<RejectReason>,
}

impl LivenessVerdict {
    fn accept() -> Self {
        Self {
            live: true,
            reason: None,
        }
    }

    fn reject(reason: RejectReason) -> Self {
        Self {
            live: false,
            reason: Some(reason),
        }
    }
}

/// Diagnostic value in the session's observability side channel.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum DebugValue {
    Number(f64),
    Text(String),
}

/// Mutable per-attempt liveness state.
#[derive(Debug, Default)]
pub struct LivenessSession {
    frame_count: u64,
    previous_landmarks: Option<LandmarkSet>,
    movement: MovementTracker,
    blink_count: u32,
    last_blink_state: bool,
    consecutive_failures: u32,
    debug_info: HashMap<String, DebugValue>,
}

impl LivenessSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn blink_count(&self) -> u32 {
        self.blink_count
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Last-computed diagnostics (metrics, counters, rejection reason).
    /// Observability only — never an input to the decision policy.
    pub fn debug_info(&self) -> &HashMap<String, DebugValue> {
        &self.debug_info
    }

    /// Evaluate one frame and update the session state.
    ///
    /// Total function: always returns a verdict. During the warm-up window
    /// every frame is accepted (landmarks only seed the displacement
    /// baseline); afterwards the checks run in order — face presence,
    /// image quality, blink, movement — each able to short-circuit the
    /// rest of the chain.
    pub fn process_frame(
        &mut self,
        frame: &RgbImage,
        landmarks: Option<&LandmarkSet>,
    ) -> LivenessVerdict {
        self.frame_count += 1;

        if self.frame_count < WARMUP_FRAMES {
            if let Some(current) = landmarks {
                self.previous_landmarks = Some(current.clone());
            }
            return LivenessVerdict::accept();
        }

        match self.evaluate(frame, landmarks) {
            Ok(verdict) => verdict,
            Err(err) => {
                tracing::warn!(error = %err, frame = self.frame_count, "liveness analyzer failed");
                self.rejected(RejectReason::Internal(err.to_string()))
            }
        }
    }

    fn evaluate(
        &mut self,
        frame: &RgbImage,
        landmarks: Option<&LandmarkSet>,
    ) -> Result<LivenessVerdict, LandmarkError> {
        // 1. Face presence. A momentary detector miss is expected; only a
        //    run of them rejects.
        let Some(current) = landmarks else {
            self.consecutive_failures += 1;
            if self.consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                return Ok(self.rejected(RejectReason::NoFace));
            }
            return Ok(LivenessVerdict::accept());
        };

        // 2. Image quality. A pass is a positive signal and clears the
        //    failure counter.
        let metrics = quality::assess(&quality::luminance(frame));
        self.note("laplacian_variance", metrics.laplacian_variance);
        self.note("uniformity", metrics.uniformity);
        self.note("contrast", metrics.contrast);
        if !metrics.looks_live() {
            self.consecutive_failures += 1;
            if self.consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                return Ok(self.rejected(RejectReason::SuspiciousQuality));
            }
            return Ok(LivenessVerdict::accept());
        }
        self.consecutive_failures = 0;

        // 3. Blink. The open→closed transition is strong liveness evidence
        //    and forgives prior soft failures.
        let ratio = ear::eye_aspect_ratio(current)?;
        self.note("ear", ratio as f64);
        let closed = ratio < ear::CLOSED_THRESHOLD;
        if closed && !self.last_blink_state {
            self.blink_count += 1;
            self.consecutive_failures = 0;
        }
        self.last_blink_state = closed;
        self.note("blink_count", self.blink_count as f64);

        // 4. Movement, smoothed over the recent window.
        let movement = self
            .movement
            .update(current, self.previous_landmarks.as_ref());
        self.previous_landmarks = Some(current.clone());
        self.note("movement", movement as f64);

        // 5. With enough history, demand both movement and at least one
        //    recorded blink.
        if self.frame_count >= MIN_FRAMES_FOR_DECISION {
            if movement <= MOVEMENT_THRESHOLD {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                    return Ok(self.rejected(RejectReason::InsufficientMovement));
                }
                return Ok(LivenessVerdict::accept());
            }
            if self.blink_count == 0 {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                    return Ok(self.rejected(RejectReason::NoBlink));
                }
                return Ok(LivenessVerdict::accept());
            }
            self.consecutive_failures = 0;
        }

        Ok(LivenessVerdict::accept())
    }

    fn note(&mut self, key: &str, value: f64) {
        self.debug_info
            .insert(key.to_string(), DebugValue::Number(value));
    }

    fn rejected(&mut self, reason: RejectReason) -> LivenessVerdict {
        self.debug_info
            .insert("reason".to_string(), DebugValue::Text(reason.to_string()));
        LivenessVerdict::reject(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ear::tests::{closed_eyes_mesh, open_eyes_mesh};
    use crate::landmarks::Landmark;

    /// High-detail frame that passes every quality check.
    fn good_frame() -> RgbImage {
        RgbImage::from_fn(64, 64, |x, y| {
            let v = ((x as u64 * 7919 + y as u64 * 104_729 + 37) % 256) as u8;
            image::Rgb([v, v, v])
        })
    }

    /// Solid gray frame: zero sharpness, flat histogram, zero contrast.
    fn flat_frame() -> RgbImage {
        RgbImage::from_pixel(64, 64, image::Rgb([128, 128, 128]))
    }

    fn translated(set: &LandmarkSet, dx: f32) -> LandmarkSet {
        LandmarkSet::new(
            set.iter()
                .map(|p| Landmark::new(p.x + dx, p.y, p.z))
                .collect(),
        )
        .unwrap()
    }

    /// Open-eyes mesh for frame `i`, alternating a 0.6 x-translation so the
    /// mean per-coordinate displacement (0.2) clears the movement threshold.
    fn moving_mesh(i: u64) -> LandmarkSet {
        let base = open_eyes_mesh();
        if i % 2 == 0 {
            translated(&base, 0.6)
        } else {
            base
        }
    }

    #[test]
    fn warmup_accepts_everything() {
        let mut session = LivenessSession::new();
        let frame = flat_frame();
        for _ in 0..14 {
            let verdict = session.process_frame(&frame, None);
            assert!(verdict.live);
            assert_eq!(verdict.reason, None);
        }
        assert_eq!(session.frame_count(), 14);
        assert_eq!(session.consecutive_failures(), 0);
    }

    #[test]
    fn warmup_seeds_previous_landmarks() {
        let mut session = LivenessSession::new();
        let mesh = open_eyes_mesh();
        session.process_frame(&flat_frame(), Some(&mesh));
        assert_eq!(session.previous_landmarks.as_ref(), Some(&mesh));
    }

    #[test]
    fn sustained_no_face_rejects_after_five_misses() {
        let mut session = LivenessSession::new();
        let frame = good_frame();
        for _ in 0..14 {
            assert!(session.process_frame(&frame, None).live);
        }
        // Frames 15-18: misses accumulate but are tolerated.
        for expected in 1..=4u32 {
            let verdict = session.process_frame(&frame, None);
            assert!(verdict.live);
            assert_eq!(session.consecutive_failures(), expected);
        }
        // Frame 19: fifth consecutive miss.
        let verdict = session.process_frame(&frame, None);
        assert!(!verdict.live);
        assert_eq!(verdict.reason, Some(RejectReason::NoFace));
        match session.debug_info().get("reason") {
            Some(DebugValue::Text(msg)) => assert!(!msg.is_empty()),
            other => panic!("missing rejection reason: {other:?}"),
        }
    }

    #[test]
    fn static_photo_rejected_on_quality_before_decision_threshold() {
        let mut session = LivenessSession::new();
        let frame = flat_frame();
        let mesh = open_eyes_mesh();
        for _ in 0..14 {
            assert!(session.process_frame(&frame, Some(&mesh)).live);
        }
        // Frames 15-18 still accepted while the counter climbs.
        for _ in 0..4 {
            assert!(session.process_frame(&frame, Some(&mesh)).live);
        }
        // Frame 19: verdict flips before the 30-frame threshold is reached.
        let verdict = session.process_frame(&frame, Some(&mesh));
        assert!(!verdict.live);
        assert_eq!(verdict.reason, Some(RejectReason::SuspiciousQuality));
        assert!(session.frame_count() < MIN_FRAMES_FOR_DECISION);
    }

    #[test]
    fn quality_pass_resets_failure_counter() {
        let mut session = LivenessSession::new();
        for _ in 0..14 {
            session.process_frame(&good_frame(), None);
        }
        // Three misses, then a clean frame with a face.
        for _ in 0..3 {
            session.process_frame(&good_frame(), None);
        }
        assert_eq!(session.consecutive_failures(), 3);
        let verdict = session.process_frame(&good_frame(), Some(&open_eyes_mesh()));
        assert!(verdict.live);
        assert_eq!(session.consecutive_failures(), 0);
    }

    #[test]
    fn blink_sequence_counts_exactly_once() {
        let mut session = LivenessSession::new();
        let frame = good_frame();
        let open = open_eyes_mesh();
        let closed = closed_eyes_mesh();
        for _ in 0..14 {
            session.process_frame(&frame, Some(&open));
        }
        session.process_frame(&frame, Some(&open));
        assert_eq!(session.blink_count(), 0);
        // open → closed → closed → open: one blink, counted at the
        // closing transition.
        session.process_frame(&frame, Some(&closed));
        assert_eq!(session.blink_count(), 1);
        assert_eq!(session.consecutive_failures(), 0);
        session.process_frame(&frame, Some(&closed));
        assert_eq!(session.blink_count(), 1);
        session.process_frame(&frame, Some(&open));
        assert_eq!(session.blink_count(), 1);
    }

    #[test]
    fn decision_threshold_requires_blink() {
        let mut session = LivenessSession::new();
        let frame = good_frame();
        // 29 frames with movement but no blink.
        for i in 0..29 {
            let verdict = session.process_frame(&frame, Some(&moving_mesh(i)));
            assert!(verdict.live);
        }
        // Frame 30: movement is fine but no blink was ever seen. The frame
        // is still tolerated; the counter records the negative signal.
        let verdict = session.process_frame(&frame, Some(&moving_mesh(29)));
        assert!(verdict.live);
        assert_eq!(session.consecutive_failures(), 1);

        // A blink arrives; subsequent frames fully satisfy the policy.
        session.process_frame(&frame, Some(&closed_eyes_mesh()));
        assert_eq!(session.blink_count(), 1);
        for i in 31..40 {
            let verdict = session.process_frame(&frame, Some(&moving_mesh(i)));
            assert!(verdict.live);
            assert_eq!(verdict.reason, None);
        }
        assert_eq!(session.consecutive_failures(), 0);
    }

    #[test]
    fn static_landmarks_flag_insufficient_movement() {
        let mut session = LivenessSession::new();
        let frame = good_frame();
        let mesh = open_eyes_mesh();
        for _ in 0..29 {
            session.process_frame(&frame, Some(&mesh));
        }
        assert_eq!(session.frame_count(), 29);
        let verdict = session.process_frame(&frame, Some(&mesh));
        assert!(verdict.live);
        assert_eq!(session.consecutive_failures(), 1);
        match session.debug_info().get("movement") {
            Some(DebugValue::Number(m)) => assert_eq!(*m, 0.0),
            other => panic!("missing movement diagnostic: {other:?}"),
        }
    }

    #[test]
    fn malformed_landmarks_accepted_in_warmup() {
        let mut session = LivenessSession::new();
        // Collapsed mesh: zero eye width, which the EAR estimator rejects.
        let degenerate =
            LandmarkSet::new(vec![Landmark::new(0.5, 0.5, 0.0); crate::landmarks::MESH_POINTS])
                .unwrap();
        let verdict = session.process_frame(&good_frame(), Some(&degenerate));
        assert!(verdict.live);
    }

    #[test]
    fn malformed_landmarks_reject_when_active() {
        let mut session = LivenessSession::new();
        let degenerate =
            LandmarkSet::new(vec![Landmark::new(0.5, 0.5, 0.0); crate::landmarks::MESH_POINTS])
                .unwrap();
        for _ in 0..14 {
            session.process_frame(&good_frame(), Some(&degenerate));
        }
        let verdict = session.process_frame(&good_frame(), Some(&degenerate));
        assert!(!verdict.live);
        match verdict.reason {
            Some(RejectReason::Internal(msg)) => assert!(!msg.is_empty()),
            other => panic!("expected internal rejection, got {other:?}"),
        }
    }

    #[test]
    fn diagnostics_track_quality_metrics() {
        let mut session = LivenessSession::new();
        for _ in 0..15 {
            session.process_frame(&good_frame(), Some(&open_eyes_mesh()));
        }
        let info = session.debug_info();
        for key in ["laplacian_variance", "uniformity", "contrast", "ear", "movement"] {
            assert!(info.contains_key(key), "missing diagnostic {key}");
        }
    }
}
