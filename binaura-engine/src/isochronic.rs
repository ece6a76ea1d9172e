//! Isochronic amplitude pulsing.
//!
//! A modulation oscillator running the band-limited pulse wave feeds a
//! low-pass smoother and a `depth/2` gain, and that signal is added onto the
//! shared isochronic gain *parameter*, whose baseline is dropped to
//! `1 - depth/2`. The audible gain therefore swings between `1 - depth` and
//! `1`: depth 0 is a constant 1, depth 1 is full on/off pulsing. The carrier
//! pair is untouched — the pulsing rides on the mixed signal.

use tracing::{debug, warn};

use binaura_core::filters::FilterKind;
use binaura_core::wave::PeriodicWave;

use crate::graph::{AudioGraph, AudioParam, FilterNode, GainNode, GraphError, OscillatorNode};

/// Harmonic count of the pulse waveform (odd harmonics only).
pub const ISO_HARMONICS: usize = 32;

/// Smoothing filter cutoff as a multiple of the pulse rate. Suppresses
/// harmonics above the audible pulse envelope.
const SMOOTHING_CUTOFF_RATIO: f64 = 4.0;

/// An active isochronic session: the modulation chain feeding the shared
/// isochronic gain parameter.
pub(crate) struct IsoSession<G: AudioGraph> {
    graph: G,
    osc: OscillatorNode<G>,
    filter: FilterNode<G>,
    depth_gain: GainNode<G>,
}

impl<G: AudioGraph> IsoSession<G> {
    /// Build and start the modulation chain. `target` is the persistent
    /// isochronic gain stage; its baseline is set to `1 - depth/2`.
    pub(crate) fn start(
        graph: &G,
        target: &GainNode<G>,
        rate: f64,
        depth: f64,
    ) -> Result<Self, GraphError> {
        let osc = graph.create_oscillator()?;
        let filter = match graph.create_filter() {
            Ok(f) => f,
            Err(e) => {
                let _ = graph.disconnect(&osc.node);
                return Err(e);
            }
        };
        let depth_gain = match graph.create_gain() {
            Ok(g) => g,
            Err(e) => {
                let _ = graph.disconnect(&osc.node);
                let _ = graph.disconnect(&filter.node);
                return Err(e);
            }
        };

        graph.set_periodic_wave(&osc.node, &PeriodicWave::odd_harmonic_pulse(ISO_HARMONICS));
        osc.frequency.set_value(rate);

        graph.set_filter_kind(&filter.node, FilterKind::Lowpass);
        filter.frequency.set_value(rate * SMOOTHING_CUTOFF_RATIO);

        depth_gain.gain.set_value(depth * 0.5);

        graph.connect(&osc.node, &filter.node);
        graph.connect(&filter.node, &depth_gain.node);
        graph.connect_to_param(&depth_gain.node, &target.gain);

        target.gain.set_value(1.0 - depth * 0.5);
        graph.start_oscillator(&osc.node);
        debug!(rate, depth, "isochronic modulation started");

        Ok(Self {
            graph: graph.clone(),
            osc,
            filter,
            depth_gain,
        })
    }

    /// Tear the chain down and restore the target gain to neutral. Cleanup
    /// failures are logged, never surfaced — teardown always succeeds from
    /// the caller's perspective.
    pub(crate) fn stop(self, target: &GainNode<G>) {
        let now = self.graph.now();
        if let Err(e) = self.graph.stop_oscillator_at(&self.osc.node, now) {
            warn!("isochronic teardown: stopping modulation oscillator: {e}");
        }
        let nodes = [
            (&self.osc.node, "modulation oscillator"),
            (&self.filter.node, "smoothing filter"),
            (&self.depth_gain.node, "depth gain"),
        ];
        for (node, label) in nodes {
            if let Err(e) = self.graph.disconnect(node) {
                warn!("isochronic teardown: releasing {label}: {e}");
            }
        }
        target.gain.cancel_scheduled_values(now);
        target.gain.set_value(1.0);
        debug!("isochronic modulation stopped");
    }
}
