//! Image-quality analysis for photo-spoof screening.
//!
//! A printed photograph or a re-photographed screen loses high-frequency
//! detail and dynamic range compared to a directly captured face. Three
//! cheap statistics over the luminance channel catch most of it:
//!
//! - Laplacian variance: second-derivative response collapses on blurry or
//!   low-detail prints.
//! - Histogram uniformity: sum of squared normalized bin counts; a flat,
//!   quantized print concentrates mass in few bins.
//! - Contrast: intensity standard deviation; spoof captures tend to be
//!   under- or over-exposed.
//!
//! Everything here is a pure function of pixel data — the session state
//! machine owns the failure-counter side effects.

use image::{GrayImage, RgbImage};

/// Minimum Laplacian variance for a frame to count as detailed enough.
pub const LAPLACIAN_THRESHOLD: f64 = 30.0;
/// Maximum histogram uniformity before a frame counts as unnaturally flat.
pub const UNIFORMITY_THRESHOLD: f64 = 0.5;
/// Acceptable intensity standard deviation range.
pub const CONTRAST_RANGE: (f64, f64) = (20.0, 200.0);

/// Raw quality metrics for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityMetrics {
    pub laplacian_variance: f64,
    pub uniformity: f64,
    pub contrast: f64,
}

impl QualityMetrics {
    /// Whether the metrics look like a live capture. Not-live if ANY of
    /// the three checks trips.
    pub fn looks_live(&self) -> bool {
        self.laplacian_variance >= LAPLACIAN_THRESHOLD
            && self.uniformity <= UNIFORMITY_THRESHOLD
            && self.contrast >= CONTRAST_RANGE.0
            && self.contrast <= CONTRAST_RANGE.1
    }
}

/// Convert an RGB frame to 8-bit luminance with Rec.601 weights.
pub fn luminance(frame: &RgbImage) -> GrayImage {
    GrayImage::from_fn(frame.width(), frame.height(), |x, y| {
        let p = frame.get_pixel(x, y);
        let luma = 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32;
        image::Luma([luma.round().clamp(0.0, 255.0) as u8])
    })
}

/// Compute the quality metrics for a luminance frame.
///
/// Degenerate frames (smaller than the Laplacian kernel) produce zeroed
/// metrics, which fail the sharpness check — the caller never sees a panic.
pub fn assess(gray: &GrayImage) -> QualityMetrics {
    let (w, h) = gray.dimensions();
    if w < 3 || h < 3 {
        return QualityMetrics {
            laplacian_variance: 0.0,
            uniformity: 0.0,
            contrast: 0.0,
        };
    }

    QualityMetrics {
        laplacian_variance: laplacian_variance(gray),
        uniformity: histogram_uniformity(gray),
        contrast: intensity_stddev(gray),
    }
}

/// Variance of the 4-neighbor Laplacian over interior pixels.
fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (w, h) = gray.dimensions();
    let at = |x: u32, y: u32| gray.get_pixel(x, y)[0] as f64;

    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    let count = ((w - 2) * (h - 2)) as f64;

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let response =
                at(x - 1, y) + at(x + 1, y) + at(x, y - 1) + at(x, y + 1) - 4.0 * at(x, y);
            sum += response;
            sum_sq += response * response;
        }
    }

    let mean = sum / count;
    sum_sq / count - mean * mean
}

/// Sum of squares of the normalized 256-bin intensity histogram.
fn histogram_uniformity(gray: &GrayImage) -> f64 {
    let mut bins = [0u64; 256];
    for p in gray.pixels() {
        bins[p[0] as usize] += 1;
    }
    let total = gray.pixels().len() as f64;
    bins.iter()
        .map(|&n| {
            let frac = n as f64 / total;
            frac * frac
        })
        .sum()
}

/// Standard deviation of pixel intensity.
fn intensity_stddev(gray: &GrayImage) -> f64 {
    let total = gray.pixels().len() as f64;
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for p in gray.pixels() {
        let v = p[0] as f64;
        sum += v;
        sum_sq += v * v;
    }
    let mean = sum / total;
    (sum_sq / total - mean * mean).max(0.0).sqrt()
}
