//! Offline reference substrate: executes scheduled automation sample-accurately.
//!
//! This is a real host for the engine — the same boundary the mock records is
//! rendered here with `binaura-core` DSP: oscillators (fixed shapes and
//! periodic waves), a 2-channel merger, stereo biquad filtering, a linked
//! compressor, gain stages, parameter-input modulation, and timer dispatch
//! woven into the render loop. [`SynthGraph::render`] pulls stereo frames; the
//! clock is the frame counter, so automation and deferred callbacks land on
//! exact samples.
//!
//! Timer callbacks run with the substrate lock released, between frames, so a
//! callback can freely schedule more automation or re-arm itself.

use std::sync::{Arc, Mutex};

use binaura_core::automation::{self, AutomationEvent};
use binaura_core::dynamics::{Compressor, CompressorParams};
use binaura_core::filters::{Biquad, FilterKind};
use binaura_core::wave::{Osc, OscSource, PeriodicWave, WaveShape};

use crate::graph::{
    lock, AudioGraph, AudioParam, CompressorNode, FilterNode, GainNode, GraphError,
    OscillatorNode, TimerCallback,
};

struct ParamSlot {
    default: f64,
    events: Vec<AutomationEvent>,
    /// Nodes whose output is added onto this parameter (modulation routing).
    inputs: Vec<usize>,
}

enum NodeState {
    Destination,
    Oscillator { osc: Osc, started: bool, stop_at: Option<f64> },
    Gain,
    Filter { kind: FilterKind, left: Biquad, right: Biquad },
    Compressor { comp: Compressor },
    Merger,
}

struct NodeSlot {
    alive: bool,
    state: NodeState,
    /// (source node, input index). The index selects a merger channel and is
    /// ignored by single-input nodes.
    inputs: Vec<(usize, usize)>,
    param_ids: Vec<usize>,
}

struct TimerSlot {
    at: f64,
    callback: Option<TimerCallback>,
    cancelled: bool,
}

struct Inner {
    sample_rate: f64,
    frame: u64,
    nodes: Vec<NodeSlot>,
    params: Vec<ParamSlot>,
    timers: Vec<TimerSlot>,
    outputs: Vec<(f32, f32)>,
}

impl Inner {
    fn now(&self) -> f64 {
        self.frame as f64 / self.sample_rate
    }

    fn add_param(&mut self, default: f64) -> usize {
        self.params.push(ParamSlot { default, events: Vec::new(), inputs: Vec::new() });
        self.params.len() - 1
    }

    fn add_node(&mut self, state: NodeState, param_defaults: &[f64]) -> usize {
        let param_ids = param_defaults.iter().map(|&d| self.add_param(d)).collect();
        self.nodes.push(NodeSlot { alive: true, state, inputs: Vec::new(), param_ids });
        self.nodes.len() - 1
    }

    /// Dependency order over the current wiring: a node comes after every
    /// node feeding its inputs or its parameters.
    fn topo_order(&self) -> Vec<usize> {
        let n = self.nodes.len();
        let mut indegree = vec![0usize; n];
        let mut edges: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (id, node) in self.nodes.iter().enumerate() {
            for &(from, _) in &node.inputs {
                edges[from].push(id);
                indegree[id] += 1;
            }
            for &pid in &node.param_ids {
                for &from in &self.params[pid].inputs {
                    edges[from].push(id);
                    indegree[id] += 1;
                }
            }
        }
        let mut ready: Vec<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(id) = ready.pop() {
            order.push(id);
            for &to in &edges[id] {
                indegree[to] -= 1;
                if indegree[to] == 0 {
                    ready.push(to);
                }
            }
        }
        order
    }

    fn collect_due(&mut self, t: f64, out: &mut Vec<(f64, TimerCallback)>) {
        for slot in &mut self.timers {
            if !slot.cancelled && slot.at <= t {
                if let Some(cb) = slot.callback.take() {
                    out.push((slot.at, cb));
                }
            }
        }
        out.sort_by(|a, b| a.0.total_cmp(&b.0));
    }

    fn process_frame(&mut self, order: &[usize], t: f64) -> (f32, f32) {
        let sr = self.sample_rate as f32;
        let Inner { nodes, params, outputs, .. } = self;
        outputs.clear();
        outputs.resize(nodes.len(), (0.0, 0.0));

        let mut frame_out = (0.0, 0.0);
        for &id in order {
            let alive = nodes[id].alive;
            let pids = nodes[id].param_ids.clone();
            let (in_l, in_r) = sum_inputs(&nodes[id], outputs);

            let out = if !alive {
                (0.0, 0.0)
            } else {
                match &mut nodes[id].state {
                    NodeState::Destination => {
                        frame_out = (in_l, in_r);
                        (in_l, in_r)
                    }
                    NodeState::Oscillator { osc, started, stop_at } => {
                        if !*started || stop_at.is_some_and(|s| t >= s) {
                            (0.0, 0.0)
                        } else {
                            let freq = param_value(params, outputs, pids[0], t) as f32;
                            let s = osc.next(freq, sr);
                            (s, s)
                        }
                    }
                    NodeState::Gain => {
                        let g = param_value(params, outputs, pids[0], t) as f32;
                        (in_l * g, in_r * g)
                    }
                    NodeState::Filter { kind, left, right } => {
                        let fc = param_value(params, outputs, pids[0], t) as f32;
                        let q = param_value(params, outputs, pids[1], t) as f32;
                        left.set_kind(*kind);
                        right.set_kind(*kind);
                        left.tune(fc, q);
                        right.tune(fc, q);
                        (left.process(in_l), right.process(in_r))
                    }
                    NodeState::Compressor { comp } => {
                        let cp = CompressorParams {
                            threshold_db: param_value(params, outputs, pids[0], t) as f32,
                            ratio: param_value(params, outputs, pids[1], t) as f32,
                            attack_s: param_value(params, outputs, pids[2], t) as f32,
                            release_s: param_value(params, outputs, pids[3], t) as f32,
                        };
                        comp.process(in_l, in_r, &cp)
                    }
                    NodeState::Merger => (in_l, in_r),
                }
            };
            outputs[id] = out;
        }
        frame_out
    }
}

/// Sum a node's inputs. Mergers route each source, folded to mono, onto the
/// channel its input index names; everything else sums both channels.
fn sum_inputs(node: &NodeSlot, outputs: &[(f32, f32)]) -> (f32, f32) {
    let mut l = 0.0;
    let mut r = 0.0;
    if matches!(node.state, NodeState::Merger) {
        for &(from, input) in &node.inputs {
            let mono = 0.5 * (outputs[from].0 + outputs[from].1);
            match input {
                0 => l += mono,
                1 => r += mono,
                _ => {}
            }
        }
    } else {
        for &(from, _) in &node.inputs {
            l += outputs[from].0;
            r += outputs[from].1;
        }
    }
    (l, r)
}

/// Timeline value plus any node outputs feeding the parameter.
fn param_value(params: &[ParamSlot], outputs: &[(f32, f32)], id: usize, t: f64) -> f64 {
    let slot = &params[id];
    let mut v = automation::evaluate(slot.default, &slot.events, t);
    for &from in &slot.inputs {
        v += 0.5 * f64::from(outputs[from].0 + outputs[from].1);
    }
    v
}

/// Shared-handle offline substrate.
#[derive(Clone)]
pub struct SynthGraph {
    inner: Arc<Mutex<Inner>>,
}

/// Node handle into a [`SynthGraph`].
#[derive(Clone)]
pub struct SynthNodeRef {
    inner: Arc<Mutex<Inner>>,
    id: usize,
}

/// Parameter handle into a [`SynthGraph`].
#[derive(Clone)]
pub struct SynthParamRef {
    inner: Arc<Mutex<Inner>>,
    id: usize,
}

/// Cancellable one-shot timer handle.
pub struct SynthTimer {
    id: usize,
}

impl SynthGraph {
    pub fn new(sample_rate: f64) -> Self {
        let mut inner = Inner {
            sample_rate: sample_rate.max(1.0),
            frame: 0,
            nodes: Vec::new(),
            params: Vec::new(),
            timers: Vec::new(),
            outputs: Vec::new(),
        };
        inner.add_node(NodeState::Destination, &[]);
        Self { inner: Arc::new(Mutex::new(inner)) }
    }

    pub fn sample_rate(&self) -> f64 {
        lock(&self.inner).sample_rate
    }

    /// Render stereo frames into `left`/`right`, advancing the clock and
    /// firing due timers on their exact frames.
    pub fn render(&self, left: &mut [f32], right: &mut [f32]) {
        let frames = left.len().min(right.len());
        let mut i = 0;
        let mut due: Vec<(f64, TimerCallback)> = Vec::new();
        while i < frames {
            {
                let mut guard = lock(&self.inner);
                let order = guard.topo_order();
                while i < frames {
                    let t = guard.now();
                    guard.collect_due(t, &mut due);
                    if !due.is_empty() {
                        break;
                    }
                    let (l, r) = guard.process_frame(&order, t);
                    left[i] = l;
                    right[i] = r;
                    guard.frame += 1;
                    i += 1;
                }
            }
            if due.is_empty() {
                break;
            }
            // Run callbacks unlocked; the wiring may change, so the
            // dependency order is rebuilt on re-entry.
            for (_, mut callback) in due.drain(..) {
                callback();
            }
        }
    }

    /// Render into an interleaved buffer with the given channel count:
    /// channel 0 left, channel 1 right, extra channels the mono fold.
    pub fn render_interleaved(&self, out: &mut [f32], channels: usize) {
        if channels == 0 {
            return;
        }
        let mut left = [0.0f32; 256];
        let mut right = [0.0f32; 256];
        for chunk in out.chunks_mut(256 * channels) {
            let frames = chunk.len() / channels;
            self.render(&mut left[..frames], &mut right[..frames]);
            for (f, frame) in chunk.chunks_mut(channels).enumerate() {
                match frame.len() {
                    1 => frame[0] = 0.5 * (left[f] + right[f]),
                    _ => {
                        frame[0] = left[f];
                        frame[1] = right[f];
                        for ch in frame.iter_mut().skip(2) {
                            *ch = 0.5 * (left[f] + right[f]);
                        }
                    }
                }
            }
        }
    }

    fn node_ref(&self, id: usize) -> SynthNodeRef {
        SynthNodeRef { inner: Arc::clone(&self.inner), id }
    }

    fn param_ref(&self, id: usize) -> SynthParamRef {
        SynthParamRef { inner: Arc::clone(&self.inner), id }
    }
}

impl AudioParam for SynthParamRef {
    fn value(&self) -> f64 {
        let guard = lock(&self.inner);
        let slot = &guard.params[self.id];
        automation::evaluate(slot.default, &slot.events, guard.now())
    }

    fn set_value(&self, value: f64) {
        let mut guard = lock(&self.inner);
        let time = guard.now();
        let events = &mut guard.params[self.id].events;
        automation::insert_event(events, AutomationEvent::SetValue { value, time });
    }

    fn set_value_at_time(&self, value: f64, at: f64) {
        let mut guard = lock(&self.inner);
        let events = &mut guard.params[self.id].events;
        automation::insert_event(events, AutomationEvent::SetValue { value, time: at });
    }

    fn linear_ramp_to_value_at_time(&self, target: f64, end_time: f64) {
        let mut guard = lock(&self.inner);
        let events = &mut guard.params[self.id].events;
        automation::insert_event(events, AutomationEvent::LinearRamp { target, end_time });
    }

    fn exponential_ramp_to_value_at_time(&self, target: f64, end_time: f64) {
        let mut guard = lock(&self.inner);
        let events = &mut guard.params[self.id].events;
        automation::insert_event(events, AutomationEvent::ExponentialRamp { target, end_time });
    }

    fn set_value_curve_at_time(&self, curve: &[f32], start_time: f64, duration: f64) {
        let mut guard = lock(&self.inner);
        let events = &mut guard.params[self.id].events;
        automation::insert_event(
            events,
            AutomationEvent::ValueCurve { curve: curve.to_vec(), start_time, duration },
        );
    }

    fn cancel_scheduled_values(&self, from: f64) {
        let mut guard = lock(&self.inner);
        automation::cancel_from(&mut guard.params[self.id].events, from);
    }
}

impl AudioGraph for SynthGraph {
    type Node = SynthNodeRef;
    type Param = SynthParamRef;
    type Timer = SynthTimer;

    fn now(&self) -> f64 {
        lock(&self.inner).now()
    }

    fn create_oscillator(&self) -> Result<OscillatorNode<Self>, GraphError> {
        let mut guard = lock(&self.inner);
        let id = guard.add_node(
            NodeState::Oscillator {
                osc: Osc::new(OscSource::Shape(WaveShape::Sine)),
                started: false,
                stop_at: None,
            },
            &[440.0],
        );
        let freq = guard.nodes[id].param_ids[0];
        drop(guard);
        Ok(OscillatorNode { node: self.node_ref(id), frequency: self.param_ref(freq) })
    }

    fn create_gain(&self) -> Result<GainNode<Self>, GraphError> {
        let mut guard = lock(&self.inner);
        let id = guard.add_node(NodeState::Gain, &[1.0]);
        let gain = guard.nodes[id].param_ids[0];
        drop(guard);
        Ok(GainNode { node: self.node_ref(id), gain: self.param_ref(gain) })
    }

    fn create_filter(&self) -> Result<FilterNode<Self>, GraphError> {
        let mut guard = lock(&self.inner);
        let sr = guard.sample_rate as f32;
        let id = guard.add_node(
            NodeState::Filter {
                kind: FilterKind::Lowpass,
                left: Biquad::new(FilterKind::Lowpass, 350.0, 1.0, sr),
                right: Biquad::new(FilterKind::Lowpass, 350.0, 1.0, sr),
            },
            &[350.0, 1.0],
        );
        let frequency = guard.nodes[id].param_ids[0];
        let q = guard.nodes[id].param_ids[1];
        drop(guard);
        Ok(FilterNode {
            node: self.node_ref(id),
            frequency: self.param_ref(frequency),
            q: self.param_ref(q),
        })
    }

    fn create_compressor(&self) -> Result<CompressorNode<Self>, GraphError> {
        let mut guard = lock(&self.inner);
        let sr = guard.sample_rate as f32;
        let id = guard.add_node(
            NodeState::Compressor { comp: Compressor::new(sr) },
            &[-24.0, 12.0, 0.003, 0.25],
        );
        let ids = guard.nodes[id].param_ids.clone();
        drop(guard);
        Ok(CompressorNode {
            node: self.node_ref(id),
            threshold: self.param_ref(ids[0]),
            ratio: self.param_ref(ids[1]),
            attack: self.param_ref(ids[2]),
            release: self.param_ref(ids[3]),
        })
    }

    fn create_merger(&self, _channels: usize) -> Result<Self::Node, GraphError> {
        let mut guard = lock(&self.inner);
        let id = guard.add_node(NodeState::Merger, &[]);
        drop(guard);
        Ok(self.node_ref(id))
    }

    fn destination(&self) -> Self::Node {
        self.node_ref(0)
    }

    fn connect(&self, from: &Self::Node, to: &Self::Node) {
        lock(&self.inner).nodes[to.id].inputs.push((from.id, 0));
    }

    fn connect_to_input(&self, from: &Self::Node, to: &Self::Node, input: usize) {
        lock(&self.inner).nodes[to.id].inputs.push((from.id, input));
    }

    fn connect_to_param(&self, from: &Self::Node, param: &Self::Param) {
        lock(&self.inner).params[param.id].inputs.push(from.id);
    }

    fn disconnect(&self, node: &Self::Node) -> Result<(), GraphError> {
        let mut guard = lock(&self.inner);
        if !guard.nodes[node.id].alive {
            return Err(GraphError::NodeReleased);
        }
        let id = node.id;
        guard.nodes[id].alive = false;
        guard.nodes[id].inputs.clear();
        for other in &mut guard.nodes {
            other.inputs.retain(|&(from, _)| from != id);
        }
        for param in &mut guard.params {
            param.inputs.retain(|&from| from != id);
        }
        Ok(())
    }

    fn set_oscillator_shape(&self, osc: &Self::Node, shape: WaveShape) {
        let mut guard = lock(&self.inner);
        let node = &mut guard.nodes[osc.id];
        if node.alive {
            if let NodeState::Oscillator { osc, .. } = &mut node.state {
                osc.set_source(OscSource::Shape(shape));
            }
        }
    }

    fn set_periodic_wave(&self, osc: &Self::Node, wave: &PeriodicWave) {
        let mut guard = lock(&self.inner);
        let node = &mut guard.nodes[osc.id];
        if node.alive {
            if let NodeState::Oscillator { osc, .. } = &mut node.state {
                osc.set_source(OscSource::Periodic(wave.clone()));
            }
        }
    }

    fn start_oscillator(&self, osc: &Self::Node) {
        let mut guard = lock(&self.inner);
        let node = &mut guard.nodes[osc.id];
        if node.alive {
            if let NodeState::Oscillator { started, .. } = &mut node.state {
                *started = true;
            }
        }
    }

    fn stop_oscillator_at(&self, osc: &Self::Node, when: f64) -> Result<(), GraphError> {
        let mut guard = lock(&self.inner);
        let node = &mut guard.nodes[osc.id];
        if !node.alive {
            return Err(GraphError::NodeReleased);
        }
        if let NodeState::Oscillator { stop_at, .. } = &mut node.state {
            *stop_at = Some(when);
        }
        Ok(())
    }

    fn set_filter_kind(&self, filter: &Self::Node, kind: FilterKind) {
        let mut guard = lock(&self.inner);
        let node = &mut guard.nodes[filter.id];
        if node.alive {
            if let NodeState::Filter { kind: k, .. } = &mut node.state {
                *k = kind;
            }
        }
    }

    fn defer(&self, delay_secs: f64, callback: TimerCallback) -> Self::Timer {
        let mut guard = lock(&self.inner);
        let at = guard.now() + delay_secs.max(0.0);
        guard.timers.push(TimerSlot { at, callback: Some(callback), cancelled: false });
        SynthTimer { id: guard.timers.len() - 1 }
    }

    fn cancel_timer(&self, timer: &Self::Timer) {
        let mut guard = lock(&self.inner);
        let slot = &mut guard.timers[timer.id];
        slot.cancelled = true;
        slot.callback = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Estimate a tone's frequency by zero-crossing counting.
    fn estimate_hz(samples: &[f32], sr: f64) -> f64 {
        let mut crossings = 0;
        for w in samples.windows(2) {
            if (w[0] <= 0.0) != (w[1] <= 0.0) {
                crossings += 1;
            }
        }
        crossings as f64 / 2.0 * sr / samples.len() as f64
    }

    #[test]
    fn oscillator_renders_its_frequency() {
        let sr = 48_000.0;
        let graph = SynthGraph::new(sr);
        let osc = graph.create_oscillator().unwrap();
        osc.frequency.set_value(220.0);
        graph.connect(&osc.node, &graph.destination());
        graph.start_oscillator(&osc.node);

        let mut left = vec![0.0; sr as usize];
        let mut right = vec![0.0; sr as usize];
        graph.render(&mut left, &mut right);
        let hz = estimate_hz(&left, sr);
        assert!((hz - 220.0).abs() < 3.0, "hz={hz}");
        assert_eq!(left, right);
    }

    #[test]
    fn gain_parameter_modulation_shapes_the_envelope() {
        let sr = 48_000.0;
        let graph = SynthGraph::new(sr);
        let carrier = graph.create_oscillator().unwrap();
        carrier.frequency.set_value(440.0);
        let gain = graph.create_gain().unwrap();
        let lfo = graph.create_oscillator().unwrap();
        lfo.frequency.set_value(2.0);

        graph.connect(&carrier.node, &gain.node);
        graph.connect(&gain.node, &graph.destination());
        // Gain swings 0..1 around a 0.5 baseline.
        gain.gain.set_value(0.5);
        graph.connect_to_param(&lfo.node, &gain.gain);
        graph.start_oscillator(&carrier.node);
        graph.start_oscillator(&lfo.node);

        let frames = sr as usize;
        let mut left = vec![0.0; frames];
        let mut right = vec![0.0; frames];
        graph.render(&mut left, &mut right);

        let window = frames / 16;
        let peaks: Vec<f32> = left
            .chunks(window)
            .map(|c| c.iter().fold(0.0f32, |m, &s| m.max(s.abs())))
            .collect();
        let hi = peaks.iter().cloned().fold(f32::MIN, f32::max);
        let lo = peaks.iter().cloned().fold(f32::MAX, f32::min);
        assert!(hi > 0.9, "hi={hi}");
        assert!(lo < 0.5, "lo={lo}");
    }

    #[test]
    fn scheduled_ramp_lands_on_time() {
        let sr = 1_000.0;
        let graph = SynthGraph::new(sr);
        let gain = graph.create_gain().unwrap();
        gain.gain.set_value(0.0);
        gain.gain.linear_ramp_to_value_at_time(1.0, 0.5);

        let mut left = vec![0.0; 600];
        let mut right = vec![0.0; 600];
        graph.render(&mut left, &mut right);
        // Half a second in, the ramp is done.
        assert!((gain.gain.value() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn timer_fires_on_its_frame() {
        let sr = 1_000.0;
        let graph = SynthGraph::new(sr);
        let seen = Arc::new(Mutex::new(None));
        let g2 = graph.clone();
        let s2 = Arc::clone(&seen);
        graph.defer(0.25, Box::new(move || {
            *lock(&s2) = Some(g2.now());
        }));

        let mut left = vec![0.0; 500];
        let mut right = vec![0.0; 500];
        graph.render(&mut left, &mut right);
        let fired_at = lock(&seen).expect("timer should have fired");
        assert!((fired_at - 0.25).abs() < 2.0 / sr, "fired_at={fired_at}");
    }

    #[test]
    fn stopped_oscillator_goes_silent() {
        let sr = 8_000.0;
        let graph = SynthGraph::new(sr);
        let osc = graph.create_oscillator().unwrap();
        graph.connect(&osc.node, &graph.destination());
        graph.start_oscillator(&osc.node);
        graph.stop_oscillator_at(&osc.node, 0.5).unwrap();

        let frames = sr as usize;
        let mut left = vec![0.0; frames];
        let mut right = vec![0.0; frames];
        graph.render(&mut left, &mut right);
        let tail = &left[(frames / 2) + 1..];
        assert!(tail.iter().all(|&s| s == 0.0));
    }
}
