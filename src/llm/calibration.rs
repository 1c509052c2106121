//! Confidence calibration for LLM results.
//!
//! Models report systematically skewed confidences for some intents; a
//! per-action-code offset table corrects the worst offenders before a
//! result is committed. Both the original and calibrated values travel
//! in the result metadata.

use ahash::AHashMap;

use crate::taxonomy::ActionCode;

/// Per-code additive offsets plus a global scale.
#[derive(Debug, Clone)]
pub struct ConfidenceCalibrator {
    scale: f32,
    offsets: AHashMap<String, f32>,
}

impl Default for ConfidenceCalibrator {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offsets: AHashMap::new(),
        }
    }
}

impl ConfidenceCalibrator {
    /// Build a calibrator from offsets, with a global scale applied first.
    pub fn new(scale: f32, offsets: AHashMap<String, f32>) -> Self {
        Self { scale, offsets }
    }

    /// Calibrate a reported confidence, clamped to [0, 1].
    pub fn calibrate(&self, action_code: &ActionCode, confidence: f32) -> f32 {
        let offset = self
            .offsets
            .get(action_code.as_str())
            .copied()
            .unwrap_or(0.0);
        (confidence * self.scale + offset).clamp(0.0, 1.0)
    }
}
