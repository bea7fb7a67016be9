//! Progress presentation helpers.
//!
//! The status mapper reports raw `done/total` percentages without
//! clamping; clamping is a presentation concern applied at the API
//! boundary, where daemon anomalies (`bytes done > bytes total`) must
//! never leak out of the 0–100 range.

/// Clamp a raw progress percentage into `[0, 100]` for display.
pub fn clamp_progress(raw: f64) -> f64 {
    raw.clamp(0.0, 100.0)
}
