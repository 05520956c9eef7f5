//! Recovery-based multiplier applied to the day's aggregate score.
//!
//! Sleep and recovery arrive as 0-100 percentages. HRV arrives in
//! milliseconds and is mapped onto the same scale with 50 ms = 100%.

use crate::db::models::ExternalReading;

pub const NEUTRAL_MODIFIER: f64 = 1.0;
pub const MIN_MODIFIER: f64 = 0.5;
pub const MAX_MODIFIER: f64 = 2.0;

/// Average reading that maps to a neutral 1.0x.
pub const BASELINE_PERCENT: f64 = 70.0;

const HRV_REFERENCE_MS: f64 = 50.0;

/// HRV milliseconds as a percentage, capped at 100.
pub fn hrv_percentage(hrv_ms: f64) -> f64 {
    (hrv_ms / HRV_REFERENCE_MS * 100.0).min(100.0)
}

/// Present readings on the 0-100 scale, HRV already rescaled.
fn percentages(sleep: Option<f64>, hrv: Option<f64>, recovery: Option<f64>) -> Vec<f64> {
    [sleep, hrv.map(hrv_percentage), recovery]
        .into_iter()
        .flatten()
        .filter(|v| v.is_finite())
        .collect()
}

/// Modifier from individual readings; missing ones are left out of the
/// average rather than counted as zero.
pub fn modifier_from_readings(sleep: Option<f64>, hrv: Option<f64>, recovery: Option<f64>) -> f64 {
    let values = percentages(sleep, hrv, recovery);
    if values.is_empty() {
        return NEUTRAL_MODIFIER;
    }

    let average = values.iter().sum::<f64>() / values.len() as f64;
    (average / BASELINE_PERCENT).clamp(MIN_MODIFIER, MAX_MODIFIER)
}

/// Modifier for a day, 1.0 if there is no reading.
pub fn external_modifier(reading: Option<&ExternalReading>) -> f64 {
    reading.map_or(NEUTRAL_MODIFIER, |r| {
        modifier_from_readings(r.sleep, r.hrv, r.recovery)
    })
}
