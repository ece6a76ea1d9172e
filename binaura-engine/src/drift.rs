//! Slow beat-frequency drift: one automation cycle per period, re-armed by a
//! one-shot timer.
//!
//! Each cycle reads the left oscillator's *current* frequency, so base-tone
//! updates made while drifting are picked up at the next re-arm. Cancellation
//! is deterministic: stopping takes the pending timer handle and clears the
//! in-flight curve; the liveness flag is the safety net for a callback that
//! was already queued when the session went down.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::graph::{lock, AudioGraph, AudioParam};
use crate::timeline::ParamTimeline;

/// Sample count of one raised-cosine drift cycle.
pub const DRIFT_CURVE_POINTS: usize = 128;

/// Shape of the beat-frequency sweep.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DriftShape {
    /// Raised cosine: smooth, seamless at the cycle boundary.
    Sine,
    /// Symmetric triangular sweep from min to max and back.
    Triangle,
}

impl DriftShape {
    pub fn as_str(self) -> &'static str {
        match self {
            DriftShape::Sine => "sine",
            DriftShape::Triangle => "triangle",
        }
    }
}

impl std::fmt::Display for DriftShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A drift-waveform name outside the supported set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDriftShapeError {
    pub input: String,
}

impl std::fmt::Display for ParseDriftShapeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown drift waveform: {:?}", self.input)
    }
}

impl std::error::Error for ParseDriftShapeError {}

impl FromStr for DriftShape {
    type Err = ParseDriftShapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sine" => Ok(DriftShape::Sine),
            "triangle" => Ok(DriftShape::Triangle),
            other => Err(ParseDriftShapeError { input: other.to_string() }),
        }
    }
}

/// Validated drift parameters.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DriftConfig {
    pub period: f64,
    pub min_beat: f64,
    pub max_beat: f64,
    pub shape: DriftShape,
}

/// One raised-cosine cycle over `[0, 1]` inclusive: first and last samples
/// both sit at `base + min`, so back-to-back cycles join seamlessly.
pub(crate) fn raised_cosine_cycle(base: f64, min: f64, max: f64, points: usize) -> Vec<f32> {
    let span = (max - min) * 0.5;
    (0..points)
        .map(|k| {
            let phase = k as f64 / (points - 1) as f64;
            let value = base + min + span * (1.0 - (std::f64::consts::TAU * phase).cos());
            value as f32
        })
        .collect()
}

/// An active drift session. Owned by the engine behind an `Arc` that the
/// re-arm callback shares.
pub(crate) struct DriftSession<G: AudioGraph> {
    graph: G,
    base: G::Param,
    beat: ParamTimeline<G::Param>,
    config: DriftConfig,
    timer: Mutex<Option<G::Timer>>,
    active: AtomicBool,
}

impl<G: AudioGraph> DriftSession<G> {
    /// Schedule the first cycle immediately and arm the re-schedule timer.
    pub(crate) fn start(graph: G, base: G::Param, beat: G::Param, config: DriftConfig) -> Arc<Self> {
        let session = Arc::new(Self {
            graph,
            base,
            beat: ParamTimeline::new(beat),
            config,
            timer: Mutex::new(None),
            active: AtomicBool::new(true),
        });
        session.schedule_cycle();
        Self::arm(&session);
        debug!(
            period = config.period,
            min = config.min_beat,
            max = config.max_beat,
            shape = config.shape.as_str(),
            "drift started"
        );
        session
    }

    /// Lay down one full cycle starting now, on top of the current base tone.
    fn schedule_cycle(&self) {
        let now = self.graph.now();
        let base = self.base.value();
        let DriftConfig { period, min_beat, max_beat, shape } = self.config;
        match shape {
            DriftShape::Sine => {
                let curve = raised_cosine_cycle(base, min_beat, max_beat, DRIFT_CURVE_POINTS);
                self.beat.curve_cycle(&curve, now, period);
            }
            DriftShape::Triangle => {
                self.beat.ramp_pair(
                    base + min_beat,
                    (base + max_beat, now + period * 0.5),
                    (base + min_beat, now + period),
                    now,
                );
            }
        }
    }

    fn arm(this: &Arc<Self>) {
        let session = Arc::clone(this);
        let timer = this.graph.defer(
            this.config.period,
            Box::new(move || {
                if !session.active.load(Ordering::SeqCst) {
                    return;
                }
                session.schedule_cycle();
                Self::arm(&session);
            }),
        );
        *lock(&this.timer) = Some(timer);
    }

    /// Cancel the pending re-arm and clear the in-flight cycle. Idempotent.
    pub(crate) fn stop(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(timer) = lock(&self.timer).take() {
            self.graph.cancel_timer(&timer);
        }
        self.beat.cancel_pending(self.graph.now());
        debug!("drift stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drift_shape_parses() {
        assert_eq!(DriftShape::from_str("sine"), Ok(DriftShape::Sine));
        assert_eq!(DriftShape::from_str("triangle"), Ok(DriftShape::Triangle));
        assert!(DriftShape::from_str("sawtooth").is_err());
    }

    #[test]
    fn raised_cosine_wraps_seamlessly() {
        let curve = raised_cosine_cycle(100.0, 3.0, 7.0, DRIFT_CURVE_POINTS);
        assert_eq!(curve.len(), DRIFT_CURVE_POINTS);
        assert!((curve[0] - 103.0).abs() < 1e-4, "first={}", curve[0]);
        assert!((curve[DRIFT_CURVE_POINTS - 1] - 103.0).abs() < 1e-4);
        // Peak at the middle of the cycle.
        let peak = curve.iter().cloned().fold(f32::MIN, f32::max);
        assert!((peak - 107.0).abs() < 0.01, "peak={peak}");
    }

    #[test]
    fn raised_cosine_stays_inside_the_band() {
        let curve = raised_cosine_cycle(200.0, 0.0, 10.0, DRIFT_CURVE_POINTS);
        for v in curve {
            assert!((200.0..=210.001).contains(&v), "v={v}");
        }
    }
}
