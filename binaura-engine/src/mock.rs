//! A recording substrate for tests: every node, connection, automation event,
//! and timer is captured, and the clock only moves when [`MockGraph::advance`]
//! is called. Parameter reads evaluate the recorded timeline at the current
//! time, so transition anchoring and drift base-frequency reads behave like a
//! real host.
//!
//! [`MockGraph::degraded`] models a minimal host without ramp primitives;
//! [`MockGraph::fail_creates`] induces node-construction failures.

use std::sync::{Arc, Mutex};

use binaura_core::automation::{self, AutomationEvent};
use binaura_core::filters::FilterKind;
use binaura_core::wave::{PeriodicWave, WaveShape};

use crate::graph::{
    lock, AudioGraph, AudioParam, CompressorNode, FilterNode, GainNode, GraphError,
    OscillatorNode, TimerCallback,
};

/// What a recorded node is.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Destination,
    Oscillator,
    Gain,
    Filter,
    Compressor,
    Merger,
}

/// Where a recorded connection lands.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConnectionTarget {
    Node(usize),
    Param(usize),
}

/// One recorded connection.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Connection {
    pub from: usize,
    pub to: ConnectionTarget,
    /// Input index for multi-input targets (merger channels).
    pub input: Option<usize>,
}

struct ParamSlot {
    default: f64,
    events: Vec<AutomationEvent>,
}

struct NodeSlot {
    kind: NodeKind,
    alive: bool,
    started: bool,
    stop_time: Option<f64>,
    shape: Option<WaveShape>,
    periodic_wave: Option<PeriodicWave>,
    filter_kind: Option<FilterKind>,
    channels: usize,
    params: Vec<(&'static str, usize)>,
}

struct TimerSlot {
    at: f64,
    callback: Option<TimerCallback>,
    cancelled: bool,
}

struct Inner {
    now: f64,
    ramps: bool,
    fail_creates: usize,
    nodes: Vec<NodeSlot>,
    params: Vec<ParamSlot>,
    timers: Vec<TimerSlot>,
    connections: Vec<Connection>,
}

impl Inner {
    fn add_param(&mut self, default: f64) -> usize {
        self.params.push(ParamSlot { default, events: Vec::new() });
        self.params.len() - 1
    }

    fn add_node(&mut self, kind: NodeKind, params: Vec<(&'static str, f64)>) -> usize {
        let ids: Vec<(&'static str, usize)> = params
            .into_iter()
            .map(|(name, default)| (name, self.add_param(default)))
            .collect();
        self.nodes.push(NodeSlot {
            kind,
            alive: true,
            started: false,
            stop_time: None,
            shape: None,
            periodic_wave: None,
            filter_kind: None,
            channels: 0,
            params: ids,
        });
        self.nodes.len() - 1
    }

    fn take_failure(&mut self, kind: &'static str) -> Result<(), GraphError> {
        if self.fail_creates > 0 {
            self.fail_creates -= 1;
            return Err(GraphError::NodeCreation { kind });
        }
        Ok(())
    }
}

/// Shared-handle mock graph.
#[derive(Clone)]
pub struct MockGraph {
    inner: Arc<Mutex<Inner>>,
}

/// Node handle into a [`MockGraph`].
#[derive(Clone)]
pub struct MockNodeRef {
    inner: Arc<Mutex<Inner>>,
    id: usize,
}

impl MockNodeRef {
    pub fn id(&self) -> usize {
        self.id
    }
}

/// Parameter handle into a [`MockGraph`].
#[derive(Clone)]
pub struct MockParamRef {
    inner: Arc<Mutex<Inner>>,
    id: usize,
}

impl MockParamRef {
    pub fn id(&self) -> usize {
        self.id
    }
}

/// Cancellable one-shot timer handle.
pub struct MockTimer {
    id: usize,
}

/// Read-only view of a recorded node.
#[derive(Clone, Debug)]
pub struct NodeSnapshot {
    pub id: usize,
    pub kind: NodeKind,
    pub alive: bool,
    pub started: bool,
    pub stop_time: Option<f64>,
    pub shape: Option<WaveShape>,
    pub has_periodic_wave: bool,
    pub filter_kind: Option<FilterKind>,
    pub channels: usize,
    params: Vec<(&'static str, usize)>,
}

impl NodeSnapshot {
    /// Parameter id by name ("frequency", "gain", "q", "threshold", ...).
    pub fn param(&self, name: &str) -> Option<usize> {
        self.params.iter().find(|(n, _)| *n == name).map(|(_, id)| *id)
    }
}

impl MockGraph {
    pub fn new() -> Self {
        Self::with_ramps(true)
    }

    /// A minimal host without ramp/curve primitives.
    pub fn degraded() -> Self {
        Self::with_ramps(false)
    }

    fn with_ramps(ramps: bool) -> Self {
        let mut inner = Inner {
            now: 0.0,
            ramps,
            fail_creates: 0,
            nodes: Vec::new(),
            params: Vec::new(),
            timers: Vec::new(),
            connections: Vec::new(),
        };
        inner.add_node(NodeKind::Destination, Vec::new());
        Self { inner: Arc::new(Mutex::new(inner)) }
    }

    /// Make the next `n` node creations fail.
    pub fn fail_creates(&self, n: usize) {
        lock(&self.inner).fail_creates = n;
    }

    /// Move the clock forward, firing due timers in chronological order.
    /// Callbacks run with the lock released, so re-arming works; a timer
    /// re-armed inside the window fires in the same call.
    pub fn advance(&self, dt: f64) {
        let target = lock(&self.inner).now + dt;
        loop {
            let mut guard = lock(&self.inner);
            let due = guard
                .timers
                .iter()
                .enumerate()
                .filter(|(_, t)| !t.cancelled && t.callback.is_some() && t.at <= target)
                .min_by(|a, b| a.1.at.total_cmp(&b.1.at))
                .map(|(i, _)| i);
            let Some(idx) = due else {
                guard.now = target;
                return;
            };
            let at = guard.timers[idx].at;
            if at > guard.now {
                guard.now = at;
            }
            if let Some(mut callback) = guard.timers[idx].callback.take() {
                drop(guard);
                callback();
            }
        }
    }

    // -- introspection -------------------------------------------------------

    pub fn nodes(&self) -> Vec<NodeSnapshot> {
        let guard = lock(&self.inner);
        guard
            .nodes
            .iter()
            .enumerate()
            .map(|(id, n)| NodeSnapshot {
                id,
                kind: n.kind,
                alive: n.alive,
                started: n.started,
                stop_time: n.stop_time,
                shape: n.shape,
                has_periodic_wave: n.periodic_wave.is_some(),
                filter_kind: n.filter_kind,
                channels: n.channels,
                params: n.params.clone(),
            })
            .collect()
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<NodeSnapshot> {
        self.nodes().into_iter().filter(|n| n.kind == kind).collect()
    }

    /// Recorded automation events for a parameter id.
    pub fn events(&self, param_id: usize) -> Vec<AutomationEvent> {
        lock(&self.inner).params[param_id].events.clone()
    }

    /// Evaluate a parameter at the current mock time.
    pub fn param_value(&self, param_id: usize) -> f64 {
        let guard = lock(&self.inner);
        let slot = &guard.params[param_id];
        automation::evaluate(slot.default, &slot.events, guard.now)
    }

    pub fn connections(&self) -> Vec<Connection> {
        lock(&self.inner).connections.clone()
    }

    /// Timers that are armed and not yet fired.
    pub fn live_timer_count(&self) -> usize {
        lock(&self.inner)
            .timers
            .iter()
            .filter(|t| !t.cancelled && t.callback.is_some())
            .count()
    }

    fn node_ref(&self, id: usize) -> MockNodeRef {
        MockNodeRef { inner: Arc::clone(&self.inner), id }
    }

    fn param_ref(&self, id: usize) -> MockParamRef {
        MockParamRef { inner: Arc::clone(&self.inner), id }
    }

    fn with_node<R>(&self, id: usize, f: impl FnOnce(&mut NodeSlot) -> R) -> Option<R> {
        let mut guard = lock(&self.inner);
        let node = &mut guard.nodes[id];
        if node.alive { Some(f(node)) } else { None }
    }
}

impl Default for MockGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioParam for MockParamRef {
    fn value(&self) -> f64 {
        let guard = lock(&self.inner);
        let slot = &guard.params[self.id];
        automation::evaluate(slot.default, &slot.events, guard.now)
    }

    fn set_value(&self, value: f64) {
        let mut guard = lock(&self.inner);
        let time = guard.now;
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

    fn automation_supported(&self) -> bool {
        lock(&self.inner).ramps
    }
}

impl AudioGraph for MockGraph {
    type Node = MockNodeRef;
    type Param = MockParamRef;
    type Timer = MockTimer;

    fn now(&self) -> f64 {
        lock(&self.inner).now
    }

    fn create_oscillator(&self) -> Result<OscillatorNode<Self>, GraphError> {
        let mut guard = lock(&self.inner);
        guard.take_failure("oscillator")?;
        let id = guard.add_node(NodeKind::Oscillator, vec![("frequency", 440.0)]);
        let freq = guard.nodes[id].params[0].1;
        drop(guard);
        Ok(OscillatorNode { node: self.node_ref(id), frequency: self.param_ref(freq) })
    }

    fn create_gain(&self) -> Result<GainNode<Self>, GraphError> {
        let mut guard = lock(&self.inner);
        guard.take_failure("gain")?;
        let id = guard.add_node(NodeKind::Gain, vec![("gain", 1.0)]);
        let gain = guard.nodes[id].params[0].1;
        drop(guard);
        Ok(GainNode { node: self.node_ref(id), gain: self.param_ref(gain) })
    }

    fn create_filter(&self) -> Result<FilterNode<Self>, GraphError> {
        let mut guard = lock(&self.inner);
        guard.take_failure("filter")?;
        let id = guard.add_node(NodeKind::Filter, vec![("frequency", 350.0), ("q", 1.0)]);
        let frequency = guard.nodes[id].params[0].1;
        let q = guard.nodes[id].params[1].1;
        guard.nodes[id].filter_kind = Some(FilterKind::Lowpass);
        drop(guard);
        Ok(FilterNode {
            node: self.node_ref(id),
            frequency: self.param_ref(frequency),
            q: self.param_ref(q),
        })
    }

    fn create_compressor(&self) -> Result<CompressorNode<Self>, GraphError> {
        let mut guard = lock(&self.inner);
        guard.take_failure("compressor")?;
        let id = guard.add_node(
            NodeKind::Compressor,
            vec![("threshold", -24.0), ("ratio", 12.0), ("attack", 0.003), ("release", 0.25)],
        );
        let ids: Vec<usize> = guard.nodes[id].params.iter().map(|(_, p)| *p).collect();
        drop(guard);
        Ok(CompressorNode {
            node: self.node_ref(id),
            threshold: self.param_ref(ids[0]),
            ratio: self.param_ref(ids[1]),
            attack: self.param_ref(ids[2]),
            release: self.param_ref(ids[3]),
        })
    }

    fn create_merger(&self, channels: usize) -> Result<Self::Node, GraphError> {
        let mut guard = lock(&self.inner);
        guard.take_failure("merger")?;
        let id = guard.add_node(NodeKind::Merger, Vec::new());
        guard.nodes[id].channels = channels;
        drop(guard);
        Ok(self.node_ref(id))
    }

    fn destination(&self) -> Self::Node {
        self.node_ref(0)
    }

    fn connect(&self, from: &Self::Node, to: &Self::Node) {
        lock(&self.inner).connections.push(Connection {
            from: from.id,
            to: ConnectionTarget::Node(to.id),
            input: None,
        });
    }

    fn connect_to_input(&self, from: &Self::Node, to: &Self::Node, input: usize) {
        lock(&self.inner).connections.push(Connection {
            from: from.id,
            to: ConnectionTarget::Node(to.id),
            input: Some(input),
        });
    }

    fn connect_to_param(&self, from: &Self::Node, param: &Self::Param) {
        lock(&self.inner).connections.push(Connection {
            from: from.id,
            to: ConnectionTarget::Param(param.id),
            input: None,
        });
    }

    fn disconnect(&self, node: &Self::Node) -> Result<(), GraphError> {
        let mut guard = lock(&self.inner);
        if !guard.nodes[node.id].alive {
            return Err(GraphError::NodeReleased);
        }
        guard.nodes[node.id].alive = false;
        let id = node.id;
        guard
            .connections
            .retain(|c| c.from != id && c.to != ConnectionTarget::Node(id));
        Ok(())
    }

    fn set_oscillator_shape(&self, osc: &Self::Node, shape: WaveShape) {
        self.with_node(osc.id, |n| n.shape = Some(shape));
    }

    fn set_periodic_wave(&self, osc: &Self::Node, wave: &PeriodicWave) {
        self.with_node(osc.id, |n| n.periodic_wave = Some(wave.clone()));
    }

    fn start_oscillator(&self, osc: &Self::Node) {
        self.with_node(osc.id, |n| n.started = true);
    }

    fn stop_oscillator_at(&self, osc: &Self::Node, when: f64) -> Result<(), GraphError> {
        self.with_node(osc.id, |n| n.stop_time = Some(when))
            .ok_or(GraphError::NodeReleased)
    }

    fn set_filter_kind(&self, filter: &Self::Node, kind: FilterKind) {
        self.with_node(filter.id, |n| n.filter_kind = Some(kind));
    }

    fn defer(&self, delay_secs: f64, callback: TimerCallback) -> Self::Timer {
        let mut guard = lock(&self.inner);
        let at = guard.now + delay_secs.max(0.0);
        guard.timers.push(TimerSlot { at, callback: Some(callback), cancelled: false });
        MockTimer { id: guard.timers.len() - 1 }
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
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn timers_fire_in_order_and_once() {
        let graph = MockGraph::new();
        let fired = Arc::new(Mutex::new(Vec::new()));

        for (label, delay) in [("b", 0.2), ("a", 0.1), ("c", 0.3)] {
            let fired = Arc::clone(&fired);
            graph.defer(delay, Box::new(move || lock(&fired).push(label)));
        }
        graph.advance(0.25);
        assert_eq!(*lock(&fired), vec!["a", "b"]);
        graph.advance(0.25);
        assert_eq!(*lock(&fired), vec!["a", "b", "c"]);
        assert_eq!(graph.live_timer_count(), 0);
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let graph = MockGraph::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let timer = graph.defer(0.1, Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        graph.cancel_timer(&timer);
        graph.advance(1.0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn rearmed_timer_fires_within_one_advance() {
        let graph = MockGraph::new();
        let count = Arc::new(AtomicUsize::new(0));
        let g2 = graph.clone();
        let c = Arc::clone(&count);
        graph.defer(0.1, Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
            let c2 = Arc::clone(&c);
            g2.defer(0.1, Box::new(move || {
                c2.fetch_add(1, Ordering::SeqCst);
            }));
        }));
        graph.advance(0.25);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn released_nodes_ignore_operations() {
        let graph = MockGraph::new();
        let osc = graph.create_oscillator().unwrap();
        graph.disconnect(&osc.node).unwrap();
        graph.set_oscillator_shape(&osc.node, WaveShape::Square);
        assert!(graph.stop_oscillator_at(&osc.node, 1.0).is_err());
        let snap = &graph.nodes_of_kind(NodeKind::Oscillator)[0];
        assert!(!snap.alive);
        assert_eq!(snap.shape, None);
        assert!(matches!(graph.disconnect(&osc.node), Err(GraphError::NodeReleased)));
    }

    #[test]
    fn induced_creation_failure() {
        let graph = MockGraph::new();
        graph.fail_creates(1);
        assert!(graph.create_oscillator().is_err());
        assert!(graph.create_oscillator().is_ok());
    }
}
