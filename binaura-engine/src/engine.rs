//! The engine orchestrator: owns the oscillator pair and the persistent
//! filter/compressor/gain chain, validates every input, and composes the
//! transition policy with the drift and isochronic modulators.
//!
//! Lifecycle: `Idle ── start ──▶ Running ── stop ──▶ Idle`. `start` tears down
//! and rebuilds the pair (restart is a restart, not a resume); `stop` leaves
//! the persistent nodes connected for the next session. Teardown never fails:
//! cleanup errors are logged and swallowed.

use std::sync::Arc;

use tracing::{debug, warn};

use binaura_core::filters::FilterKind;
use binaura_core::wave::WaveShape;

use crate::drift::{DriftConfig, DriftSession, DriftShape};
use crate::error::EngineError;
use crate::graph::{
    AudioGraph, AudioParam, CompressorNode, FilterNode, GainNode, GraphError, OscillatorNode,
};
use crate::isochronic::IsoSession;
use crate::timeline::{ParamClass, ParamTimeline};

/// Upper bound of the carrier (base) frequency in Hz.
pub const MAX_BASE_FREQ_HZ: f64 = 20_000.0;
/// Upper bound of the beat offset in Hz.
pub const MAX_BEAT_FREQ_HZ: f64 = 100.0;
/// Upper bound of the isochronic pulse rate in Hz.
pub const MAX_ISO_RATE_HZ: f64 = 100.0;

/// How far in the future the oscillator stop is scheduled, so the volume
/// ramp finishes audibly before silence.
const STOP_DELAY_SECS: f64 = 0.1;

/// Total length of the wave-shape crossfade (fade out + fade in).
const CROSSFADE_SECS: f64 = 0.05;

/// Engine lifecycle state.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
}

/// Persistent filter stage settings.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FilterSettings {
    pub kind: FilterKind,
    pub frequency: f64,
    pub q: f64,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self { kind: FilterKind::Lowpass, frequency: 12_000.0, q: 1.0 }
    }
}

/// Persistent compressor stage settings.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CompressorSettings {
    pub threshold: f64,
    pub ratio: f64,
    pub attack: f64,
    pub release: f64,
}

impl Default for CompressorSettings {
    fn default() -> Self {
        Self { threshold: -24.0, ratio: 12.0, attack: 0.003, release: 0.25 }
    }
}

/// Partial compressor update: provided fields glide, omitted fields stay.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CompressorUpdate {
    pub threshold: Option<f64>,
    pub ratio: Option<f64>,
    pub attack: Option<f64>,
    pub release: Option<f64>,
}

/// Initial settings for the persistent chain.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineConfig {
    pub filter: FilterSettings,
    pub compressor: CompressorSettings,
}

/// The oscillator pair and its channel merger; exists only while Running.
struct OscPair<G: AudioGraph> {
    left: OscillatorNode<G>,
    right: OscillatorNode<G>,
    merger: G::Node,
}

/// The binaural-beat engine. Generic over the host graph so any substrate —
/// the recording mock, the offline renderer, a real audio stack — can carry
/// it.
pub struct Engine<G: AudioGraph> {
    graph: G,
    state: EngineState,
    wave: WaveShape,
    volume: f64,
    base_freq: f64,
    beat_freq: f64,
    master: GainNode<G>,
    filter: FilterNode<G>,
    compressor: CompressorNode<G>,
    iso_gain: GainNode<G>,
    pair: Option<OscPair<G>>,
    drift: Option<Arc<DriftSession<G>>>,
    iso: Option<IsoSession<G>>,
    crossfade: Option<G::Timer>,
}

fn validate_base(base: f64) -> Result<(), EngineError> {
    if !base.is_finite() || base <= 0.0 || base > MAX_BASE_FREQ_HZ {
        return Err(EngineError::invalid("base frequency", base));
    }
    Ok(())
}

fn validate_beat(beat: f64) -> Result<(), EngineError> {
    if !beat.is_finite() || !(0.0..=MAX_BEAT_FREQ_HZ).contains(&beat) {
        return Err(EngineError::invalid("beat frequency", beat));
    }
    Ok(())
}

fn validate_volume(volume: f64) -> Result<(), EngineError> {
    if !volume.is_finite() || !(0.0..=1.0).contains(&volume) {
        return Err(EngineError::invalid("volume", volume));
    }
    Ok(())
}

impl<G: AudioGraph> Engine<G> {
    /// Build the persistent chain with default settings.
    pub fn new(graph: G) -> Result<Self, EngineError> {
        Self::with_config(graph, EngineConfig::default())
    }

    /// Build the persistent chain: filter → compressor → isochronic gain →
    /// master gain → destination. Oscillators come and go per session; this
    /// chain lives for the engine's whole life.
    pub fn with_config(graph: G, config: EngineConfig) -> Result<Self, EngineError> {
        let master = graph.create_gain().map_err(EngineError::InitializationFailed)?;
        let filter = graph.create_filter().map_err(EngineError::InitializationFailed)?;
        let compressor = graph.create_compressor().map_err(EngineError::InitializationFailed)?;
        let iso_gain = graph.create_gain().map_err(EngineError::InitializationFailed)?;

        graph.connect(&filter.node, &compressor.node);
        graph.connect(&compressor.node, &iso_gain.node);
        graph.connect(&iso_gain.node, &master.node);
        graph.connect(&master.node, &graph.destination());

        graph.set_filter_kind(&filter.node, config.filter.kind);
        filter.frequency.set_value(config.filter.frequency);
        filter.q.set_value(config.filter.q);

        compressor.threshold.set_value(config.compressor.threshold);
        compressor.ratio.set_value(config.compressor.ratio);
        compressor.attack.set_value(config.compressor.attack);
        compressor.release.set_value(config.compressor.release);

        iso_gain.gain.set_value(1.0);

        Ok(Self {
            graph,
            state: EngineState::Idle,
            wave: WaveShape::Sine,
            volume: 1.0,
            base_freq: 0.0,
            beat_freq: 0.0,
            master,
            filter,
            compressor,
            iso_gain,
            pair: None,
            drift: None,
            iso: None,
            crossfade: None,
        })
    }

    // -- accessors -----------------------------------------------------------

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == EngineState::Running
    }

    pub fn wave_type(&self) -> WaveShape {
        self.wave
    }

    pub fn base_frequency(&self) -> f64 {
        self.base_freq
    }

    pub fn beat_frequency(&self) -> f64 {
        self.beat_freq
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn graph(&self) -> &G {
        &self.graph
    }

    // -- lifecycle -----------------------------------------------------------

    /// Start (or restart) the oscillator pair: left at `base`, right at
    /// `base + beat`, both through a 2-channel merge into the shared chain.
    /// The master gain ramps up from zero so the onset is click-free.
    pub fn start(
        &mut self,
        base: f64,
        beat: f64,
        volume: f64,
        wave: WaveShape,
    ) -> Result<(), EngineError> {
        validate_base(base)?;
        validate_beat(beat)?;
        validate_volume(volume)?;

        self.stop();

        let pair = self.build_pair(base, beat, wave).map_err(EngineError::StartFailed)?;
        self.pair = Some(pair);
        self.wave = wave;
        self.base_freq = base;
        self.beat_freq = beat;

        let now = self.graph.now();
        let master = ParamTimeline::new(self.master.gain.clone());
        master.set_now(0.0, now);
        master.glide(ParamClass::Amplitude, volume, now);
        self.volume = volume;

        self.state = EngineState::Running;
        debug!(base, beat, volume, wave = wave.as_str(), "engine started");
        Ok(())
    }

    fn build_pair(&self, base: f64, beat: f64, wave: WaveShape) -> Result<OscPair<G>, GraphError> {
        let graph = &self.graph;
        let left = graph.create_oscillator()?;
        let right = match graph.create_oscillator() {
            Ok(o) => o,
            Err(e) => {
                let _ = graph.disconnect(&left.node);
                return Err(e);
            }
        };
        let merger = match graph.create_merger(2) {
            Ok(m) => m,
            Err(e) => {
                let _ = graph.disconnect(&left.node);
                let _ = graph.disconnect(&right.node);
                return Err(e);
            }
        };

        graph.set_oscillator_shape(&left.node, wave);
        graph.set_oscillator_shape(&right.node, wave);
        left.frequency.set_value(base);
        right.frequency.set_value(base + beat);

        graph.connect_to_input(&left.node, &merger, 0);
        graph.connect_to_input(&right.node, &merger, 1);
        graph.connect(&merger, &self.filter.node);

        graph.start_oscillator(&left.node);
        graph.start_oscillator(&right.node);
        Ok(OscPair { left, right, merger })
    }

    /// Retune the running pair. Either value may be omitted; the right
    /// oscillator only moves when a beat value is supplied.
    pub fn update(&mut self, base: Option<f64>, beat: Option<f64>) -> Result<(), EngineError> {
        if self.state != EngineState::Running {
            return Err(EngineError::NotRunning);
        }
        if let Some(b) = base {
            validate_base(b)?;
        }
        if let Some(b) = beat {
            validate_beat(b)?;
        }
        let Some(pair) = &self.pair else {
            return Err(EngineError::NotRunning);
        };

        let now = self.graph.now();
        if let Some(b) = base {
            ParamTimeline::new(pair.left.frequency.clone()).glide(ParamClass::Frequency, b, now);
            self.base_freq = b;
        }
        if let Some(b) = beat {
            let target = self.base_freq + b;
            ParamTimeline::new(pair.right.frequency.clone()).glide(ParamClass::Frequency, target, now);
            self.beat_freq = b;
        }
        Ok(())
    }

    /// Glide the master gain to `volume`. Allowed while idle — the gain node
    /// is persistent.
    pub fn set_volume(&mut self, volume: f64) -> Result<(), EngineError> {
        validate_volume(volume)?;
        let now = self.graph.now();
        ParamTimeline::new(self.master.gain.clone()).glide(ParamClass::Amplitude, volume, now);
        self.volume = volume;
        Ok(())
    }

    /// Change the oscillator shape. A no-op when unchanged; applied directly
    /// while idle; crossfaded while running (fade out, swap both shapes at
    /// the midpoint, fade back to the previous level) so the waveform
    /// discontinuity is inaudible.
    pub fn set_wave_type(&mut self, wave: WaveShape) {
        if wave == self.wave {
            return;
        }
        self.wave = wave;
        let Some(pair) = &self.pair else {
            return;
        };

        let now = self.graph.now();
        if let Some(timer) = self.crossfade.take() {
            self.graph.cancel_timer(&timer);
        }

        let half = CROSSFADE_SECS * 0.5;
        ParamTimeline::new(self.master.gain.clone())
            .glide_over(ParamClass::Amplitude, 0.0, now, half);

        let graph = self.graph.clone();
        let left = pair.left.node.clone();
        let right = pair.right.node.clone();
        let gain = self.master.gain.clone();
        let level = self.volume;
        let timer = self.graph.defer(
            half,
            Box::new(move || {
                graph.set_oscillator_shape(&left, wave);
                graph.set_oscillator_shape(&right, wave);
                ParamTimeline::new(gain.clone()).glide_over(
                    ParamClass::Amplitude,
                    level,
                    graph.now(),
                    half,
                );
            }),
        );
        self.crossfade = Some(timer);
        debug!(wave = wave.as_str(), "wave shape crossfade scheduled");
    }

    /// Set the filter mode and glide cutoff/resonance. `Allpass` is the
    /// bypass mode; its cutoff and Q are left alone.
    pub fn set_filter(&mut self, kind: FilterKind, frequency: Option<f64>, q: Option<f64>) {
        self.graph.set_filter_kind(&self.filter.node, kind);
        if kind == FilterKind::Allpass {
            return;
        }
        let now = self.graph.now();
        if let Some(fc) = frequency {
            ParamTimeline::new(self.filter.frequency.clone()).glide(ParamClass::Frequency, fc, now);
        }
        if let Some(q) = q {
            ParamTimeline::new(self.filter.q.clone()).glide(ParamClass::Amplitude, q, now);
        }
    }

    /// Glide each provided compressor field independently.
    pub fn set_compressor(&mut self, update: CompressorUpdate) {
        let now = self.graph.now();
        let fields = [
            (update.threshold, &self.compressor.threshold),
            (update.ratio, &self.compressor.ratio),
            (update.attack, &self.compressor.attack),
            (update.release, &self.compressor.release),
        ];
        for (value, param) in fields {
            if let Some(v) = value {
                ParamTimeline::new(param.clone()).glide(ParamClass::Amplitude, v, now);
            }
        }
    }

    // -- modulators ----------------------------------------------------------

    /// Start isochronic pulsing at `rate` Hz with the given depth. Replaces
    /// any active session.
    pub fn start_isochronic(&mut self, rate: f64, depth: f64) -> Result<(), EngineError> {
        if !rate.is_finite() || rate <= 0.0 || rate > MAX_ISO_RATE_HZ {
            return Err(EngineError::invalid("isochronic rate", rate));
        }
        if !depth.is_finite() || !(0.0..=1.0).contains(&depth) {
            return Err(EngineError::invalid("isochronic depth", depth));
        }
        self.stop_isochronic();
        let session = IsoSession::start(&self.graph, &self.iso_gain, rate, depth)
            .map_err(EngineError::InitializationFailed)?;
        self.iso = Some(session);
        Ok(())
    }

    /// Tear down the isochronic session and restore the gain baseline to 1.
    /// Idempotent; never fails.
    pub fn stop_isochronic(&mut self) {
        if let Some(session) = self.iso.take() {
            session.stop(&self.iso_gain);
        }
    }

    /// Start beat-frequency drift between `min` and `max` Hz over `period`
    /// seconds per cycle. Replaces any active drift.
    pub fn start_drift(
        &mut self,
        period: f64,
        min: f64,
        max: f64,
        shape: DriftShape,
    ) -> Result<(), EngineError> {
        if self.state != EngineState::Running {
            return Err(EngineError::NotRunning);
        }
        if !period.is_finite() || period <= 0.0 {
            return Err(EngineError::invalid("drift period", period));
        }
        if !min.is_finite() || !(0.0..=MAX_BEAT_FREQ_HZ).contains(&min) {
            return Err(EngineError::invalid("drift minimum", min));
        }
        if !max.is_finite() || max < min || max > MAX_BEAT_FREQ_HZ {
            return Err(EngineError::invalid("drift maximum", max));
        }
        let (base_param, beat_param) = match &self.pair {
            Some(pair) => (pair.left.frequency.clone(), pair.right.frequency.clone()),
            None => return Err(EngineError::NotRunning),
        };

        self.stop_drift();
        let config = DriftConfig { period, min_beat: min, max_beat: max, shape };
        self.drift = Some(DriftSession::start(self.graph.clone(), base_param, beat_param, config));
        Ok(())
    }

    /// Cancel the drift re-arm timer and the in-flight cycle. Idempotent.
    pub fn stop_drift(&mut self) {
        if let Some(session) = self.drift.take() {
            session.stop();
        }
    }

    /// Stop everything: modulators, crossfade, pair. The volume ramps to
    /// zero and the oscillators are stopped slightly later so the fade is
    /// audible. Idempotent, and never fails — cleanup errors are logged and
    /// swallowed.
    pub fn stop(&mut self) {
        self.stop_drift();
        self.stop_isochronic();
        if let Some(timer) = self.crossfade.take() {
            self.graph.cancel_timer(&timer);
        }

        let now = self.graph.now();
        ParamTimeline::new(self.master.gain.clone()).glide(ParamClass::Amplitude, 0.0, now);
        self.volume = 0.0;

        if let Some(pair) = self.pair.take() {
            let stop_at = now + STOP_DELAY_SECS;
            for osc in [&pair.left, &pair.right] {
                osc.frequency.cancel_scheduled_values(now);
                if let Err(e) = self.graph.stop_oscillator_at(&osc.node, stop_at) {
                    warn!("stop: scheduling oscillator stop: {e}");
                }
                if let Err(e) = self.graph.disconnect(&osc.node) {
                    warn!("stop: releasing oscillator: {e}");
                }
            }
            if let Err(e) = self.graph.disconnect(&pair.merger) {
                warn!("stop: releasing channel merger: {e}");
            }
            debug!("oscillator pair released");
        }

        self.state = EngineState::Idle;
    }
}
