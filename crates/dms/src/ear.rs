//! Eye Aspect Ratio (EAR)
//!
//! `EAR = (|p1 - p5| + |p2 - p4|) / (2 * |p0 - p3|)` per eye, averaged
//! over both eyes. Open eyes sit around 0.25–0.35, closed eyes approach 0.

use crate::landmarks::{Landmarks, Point};

/// EAR reported when the geometry is unusable (treated as "eyes open")
pub const FALLBACK_EAR: f32 = 0.3;

/// EAR of a single eye given its six ordered points.
///
/// Returns `FALLBACK_EAR` for fewer than six points, a zero-width eye or a
/// non-finite result.
pub fn eye_aspect_ratio(eye: &[Point]) -> f32 {
    if eye.len() < 6 {
        return FALLBACK_EAR;
    }

    let vertical_a = eye[1].distance(&eye[5]);
    let vertical_b = eye[2].distance(&eye[4]);
    let horizontal = eye[0].distance(&eye[3]);

    if horizontal <= f32::EPSILON {
        return FALLBACK_EAR;
    }

    let ear = (vertical_a + vertical_b) / (2.0 * horizontal);
    if ear.is_finite() {
        ear
    } else {
        FALLBACK_EAR
    }
}

/// Mean EAR of both eyes. Never fails.
pub fn compute_ear(landmarks: &Landmarks) -> f32 {
    match (landmarks.left_eye(), landmarks.right_eye()) {
        (Some(left), Some(right)) => (eye_aspect_ratio(left) + eye_aspect_ratio(right)) / 2.0,
        _ => FALLBACK_EAR,
    }
}
