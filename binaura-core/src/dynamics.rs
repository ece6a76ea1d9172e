//! Stereo-linked dynamics compression for the substrate's compressor node.
//!
//! Feed-forward design: a shared peak envelope follower drives a soft-knee
//! gain computer; both channels receive the same gain so the stereo image is
//! preserved. Threshold/ratio/attack/release arrive per sample because the
//! engine automates them.

use crate::dsp::{db_to_lin, lin_to_db, one_pole_coeff};

/// Soft-knee width in dB, matching the host-graph convention the engine
/// was written against.
const KNEE_DB: f32 = 30.0;

/// Control values for one processed sample.
#[derive(Copy, Clone, Debug)]
pub struct CompressorParams {
    pub threshold_db: f32,
    pub ratio: f32,
    pub attack_s: f32,
    pub release_s: f32,
}

impl Default for CompressorParams {
    fn default() -> Self {
        Self {
            threshold_db: -24.0,
            ratio: 12.0,
            attack_s: 0.003,
            release_s: 0.25,
        }
    }
}

/// Stereo compressor state.
#[derive(Copy, Clone, Debug)]
pub struct Compressor {
    sr: f32,
    envelope: f32,
}

impl Compressor {
    pub fn new(sr: f32) -> Self {
        Self { sr: sr.max(1.0), envelope: 0.0 }
    }

    pub fn reset(&mut self) {
        self.envelope = 0.0;
    }

    /// Gain reduction in dB for an input level in dB (negative or zero).
    fn gain_reduction_db(level_db: f32, threshold_db: f32, ratio: f32) -> f32 {
        let ratio = ratio.max(1.0);
        let slope = 1.0 - 1.0 / ratio;
        let half_knee = KNEE_DB * 0.5;
        if level_db <= threshold_db - half_knee {
            0.0
        } else if level_db >= threshold_db + half_knee {
            (threshold_db - level_db) * slope
        } else {
            // Quadratic interpolation through the knee region.
            let x = level_db - threshold_db + half_knee;
            -slope * x * x / (2.0 * KNEE_DB)
        }
    }

    /// Process one stereo sample pair.
    #[inline]
    pub fn process(&mut self, left: f32, right: f32, params: &CompressorParams) -> (f32, f32) {
        let level = left.abs().max(right.abs());

        let coeff = if level > self.envelope {
            one_pole_coeff(params.attack_s.max(1e-4), self.sr)
        } else {
            one_pole_coeff(params.release_s.max(1e-3), self.sr)
        };
        self.envelope = coeff * self.envelope + (1.0 - coeff) * level;

        let reduction = Self::gain_reduction_db(
            lin_to_db(self.envelope),
            params.threshold_db,
            params.ratio,
        );
        let gain = db_to_lin(reduction);
        (left * gain, right * gain)
    }
}

// ------------------------------------ Tests --------------------------------------
