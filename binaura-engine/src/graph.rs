//! The audio-graph substrate boundary.
//!
//! The engine never renders audio itself: it drives a host-owned graph of
//! oscillator/gain/filter/compressor nodes through the operations below, and
//! schedules value changes on their parameters. Anything implementing
//! [`AudioGraph`] can host the engine — the in-crate [`crate::mock`] records
//! every operation for tests, [`crate::synth`] executes them sample-accurately.
//!
//! Handles are cheap clones referring into the substrate. A released node
//! stays a valid handle; substrates treat operations on it as no-ops, which is
//! the safety net for timers firing concurrently with teardown.

use std::sync::{Mutex, MutexGuard, PoisonError};

use binaura_core::filters::FilterKind;
use binaura_core::wave::{PeriodicWave, WaveShape};

/// One-shot deferred callback, fired by the substrate's clock.
pub type TimerCallback = Box<dyn FnMut() + Send + 'static>;

/// A substrate failure while constructing or releasing nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The substrate could not construct a node of the named kind.
    NodeCreation { kind: &'static str },
    /// An operation addressed a node that was already released.
    NodeReleased,
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphError::NodeCreation { kind } => write!(f, "could not create {kind} node"),
            GraphError::NodeReleased => write!(f, "node was already released"),
        }
    }
}

impl std::error::Error for GraphError {}

/// A numeric node parameter supporting scheduled automation.
///
/// Methods mirror the host-graph primitives: immediate set, timed set, linear
/// and exponential ramps, sampled curves, and cancellation. Scheduling calls
/// take absolute times on the substrate clock.
pub trait AudioParam: Clone + Send + Sync + 'static {
    /// Current value, with any scheduled automation evaluated at the
    /// substrate's current time.
    fn value(&self) -> f64;

    fn set_value(&self, value: f64);
    fn set_value_at_time(&self, value: f64, at: f64);
    fn linear_ramp_to_value_at_time(&self, target: f64, end_time: f64);
    fn exponential_ramp_to_value_at_time(&self, target: f64, end_time: f64);
    fn set_value_curve_at_time(&self, curve: &[f32], start_time: f64, duration: f64);

    /// Drop every scheduled change at-or-after `from` (in-flight curves
    /// included).
    fn cancel_scheduled_values(&self, from: f64);

    /// Whether the ramp/curve primitives are actually available. Minimal
    /// hosts may answer `false`; callers then degrade to immediate sets.
    fn automation_supported(&self) -> bool {
        true
    }
}

/// Oscillator handle with its frequency parameter.
#[derive(Clone)]
pub struct OscillatorNode<G: AudioGraph> {
    pub node: G::Node,
    pub frequency: G::Param,
}

/// Gain handle with its gain parameter.
#[derive(Clone)]
pub struct GainNode<G: AudioGraph> {
    pub node: G::Node,
    pub gain: G::Param,
}

/// Biquad filter handle with cutoff and resonance parameters.
#[derive(Clone)]
pub struct FilterNode<G: AudioGraph> {
    pub node: G::Node,
    pub frequency: G::Param,
    pub q: G::Param,
}

/// Dynamics compressor handle with its four control parameters.
#[derive(Clone)]
pub struct CompressorNode<G: AudioGraph> {
    pub node: G::Node,
    pub threshold: G::Param,
    pub ratio: G::Param,
    pub attack: G::Param,
    pub release: G::Param,
}

/// The host-owned audio graph the engine exclusively drives.
///
/// All handles are clones into shared substrate state, so the trait takes
/// `&self` throughout; the substrate owns whatever interior mutability it
/// needs. `Clone` on the graph itself is handle semantics, not a deep copy.
pub trait AudioGraph: Clone + Send + Sync + 'static {
    type Node: Clone + Send + Sync + 'static;
    type Param: AudioParam;
    type Timer: Send + 'static;

    /// Monotonic current time in seconds.
    fn now(&self) -> f64;

    // -- node factories ------------------------------------------------------

    fn create_oscillator(&self) -> Result<OscillatorNode<Self>, GraphError>;
    fn create_gain(&self) -> Result<GainNode<Self>, GraphError>;
    fn create_filter(&self) -> Result<FilterNode<Self>, GraphError>;
    fn create_compressor(&self) -> Result<CompressorNode<Self>, GraphError>;
    fn create_merger(&self, channels: usize) -> Result<Self::Node, GraphError>;

    /// The terminal mix node.
    fn destination(&self) -> Self::Node;

    // -- wiring --------------------------------------------------------------

    fn connect(&self, from: &Self::Node, to: &Self::Node);

    /// Connect into a specific input of a multi-input node (merger channels).
    fn connect_to_input(&self, from: &Self::Node, to: &Self::Node, input: usize);

    /// Feed a node's output into a parameter (modulation routing).
    fn connect_to_param(&self, from: &Self::Node, param: &Self::Param);

    /// Detach and release a node. Further operations on it are no-ops.
    fn disconnect(&self, node: &Self::Node) -> Result<(), GraphError>;

    // -- oscillator ops ------------------------------------------------------

    fn set_oscillator_shape(&self, osc: &Self::Node, shape: WaveShape);
    fn set_periodic_wave(&self, osc: &Self::Node, wave: &PeriodicWave);
    fn start_oscillator(&self, osc: &Self::Node);
    fn stop_oscillator_at(&self, osc: &Self::Node, when: f64) -> Result<(), GraphError>;

    // -- filter ops ----------------------------------------------------------

    fn set_filter_kind(&self, filter: &Self::Node, kind: FilterKind);

    // -- deferred callbacks --------------------------------------------------

    /// Arrange for `callback` to fire once, `delay_secs` from now. The
    /// returned handle cancels it.
    fn defer(&self, delay_secs: f64, callback: TimerCallback) -> Self::Timer;

    fn cancel_timer(&self, timer: &Self::Timer);
}

/// Lock a substrate mutex, recovering the guard from a poisoned lock.
/// Teardown paths must keep working even after a panicked thread.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_error_messages() {
        let e = GraphError::NodeCreation { kind: "oscillator" };
        assert_eq!(e.to_string(), "could not create oscillator node");
        assert_eq!(GraphError::NodeReleased.to_string(), "node was already released");
    }
}
