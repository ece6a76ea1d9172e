//! Click-free scheduling discipline for a single parameter.
//!
//! Every externally visible parameter change goes through [`ParamTimeline`]:
//! capture the current value, cancel whatever was pending, anchor, then
//! schedule the new ramp or curve. Changes therefore never stack or conflict.
//!
//! The transition policy is fixed: frequency-like parameters glide on an
//! exponential ramp (perceptually uniform pitch motion), amplitude-like
//! parameters on a linear one, both over [`TRANSITION_SECS`]. Hosts without
//! ramp primitives degrade to an immediate set — correct, just not click-free.

use crate::graph::AudioParam;

/// Fixed transition window for click-free parameter changes.
pub const TRANSITION_SECS: f64 = 0.015;

/// Floor for exponential-ramp endpoints; geometric ramps cannot cross zero.
const EXP_FLOOR: f64 = 1e-4;

/// Which ramp family a parameter takes under the transition policy.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ParamClass {
    /// Oscillator frequency, filter cutoff: exponential ramps.
    Frequency,
    /// Gain, Q, compressor fields: linear ramps.
    Amplitude,
}

/// Scheduling wrapper around one substrate parameter.
#[derive(Clone)]
pub struct ParamTimeline<P: AudioParam> {
    param: P,
}

impl<P: AudioParam> ParamTimeline<P> {
    pub fn new(param: P) -> Self {
        Self { param }
    }

    pub fn param(&self) -> &P {
        &self.param
    }

    pub fn value(&self) -> f64 {
        self.param.value()
    }

    /// Cancel pending automation and jump to `value` immediately.
    pub fn set_now(&self, value: f64, now: f64) {
        self.param.cancel_scheduled_values(now);
        self.param.set_value(value);
    }

    /// Cancel anything not yet reached.
    pub fn cancel_pending(&self, now: f64) {
        self.param.cancel_scheduled_values(now);
    }

    /// Glide to `target` over the standard transition window.
    pub fn glide(&self, class: ParamClass, target: f64, now: f64) {
        self.glide_over(class, target, now, TRANSITION_SECS);
    }

    /// Glide to `target` over an explicit window.
    pub fn glide_over(&self, class: ParamClass, target: f64, now: f64, duration: f64) {
        if !self.param.automation_supported() {
            self.param.set_value(target);
            return;
        }
        let current = self.param.value();
        self.param.cancel_scheduled_values(now);
        match class {
            ParamClass::Amplitude => {
                self.param.set_value_at_time(current, now);
                self.param.linear_ramp_to_value_at_time(target, now + duration);
            }
            ParamClass::Frequency => {
                self.param.set_value_at_time(current.max(EXP_FLOOR), now);
                self.param
                    .exponential_ramp_to_value_at_time(target.max(EXP_FLOOR), now + duration);
            }
        }
    }

    /// Replace pending automation with one sampled curve spanning
    /// `[now, now + duration]`. Used for the drift modulator's raised-cosine
    /// cycle; `samples` must begin at the intended current value.
    pub fn curve_cycle(&self, samples: &[f32], now: f64, duration: f64) {
        if samples.is_empty() || duration <= 0.0 {
            return;
        }
        if !self.param.automation_supported() {
            self.param.set_value(f64::from(samples[0]));
            return;
        }
        self.param.cancel_scheduled_values(now);
        self.param.set_value_curve_at_time(samples, now, duration);
    }

    /// Replace pending automation with an anchored pair of linear ramps:
    /// `start` now, `mid.0` at `mid.1`, `end.0` at `end.1`. Used for the
    /// drift modulator's triangular cycle.
    pub fn ramp_pair(&self, start: f64, mid: (f64, f64), end: (f64, f64), now: f64) {
        if !self.param.automation_supported() {
            self.param.set_value(start);
            return;
        }
        self.param.cancel_scheduled_values(now);
        self.param.set_value_at_time(start, now);
        self.param.linear_ramp_to_value_at_time(mid.0, mid.1);
        self.param.linear_ramp_to_value_at_time(end.0, end.1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::AudioGraph;
    use crate::mock::MockGraph;
    use binaura_core::automation::AutomationEvent;

    fn gain_timeline(graph: &MockGraph) -> (ParamTimeline<crate::mock::MockParamRef>, usize) {
        let gain = graph.create_gain().unwrap();
        let nodes = graph.nodes();
        let id = nodes.last().unwrap().param("gain").unwrap();
        (ParamTimeline::new(gain.gain), id)
    }

    #[test]
    fn linear_glide_anchors_then_ramps() {
        let graph = MockGraph::new();
        let (timeline, param) = gain_timeline(&graph);

        timeline.glide(ParamClass::Amplitude, 0.25, graph.now());
        let events = graph.events(param);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], AutomationEvent::SetValue { value: 1.0, time: 0.0 });
        assert_eq!(
            events[1],
            AutomationEvent::LinearRamp { target: 0.25, end_time: TRANSITION_SECS }
        );
    }

    #[test]
    fn frequency_glide_uses_exponential_ramp() {
        let graph = MockGraph::new();
        let osc = graph.create_oscillator().unwrap();
        let timeline = ParamTimeline::new(osc.frequency);
        let param = graph.nodes().last().unwrap().param("frequency").unwrap();

        timeline.set_now(100.0, graph.now());
        timeline.glide(ParamClass::Frequency, 110.0, graph.now());
        let events = graph.events(param);
        assert!(matches!(
            events.last(),
            Some(AutomationEvent::ExponentialRamp { target, .. }) if *target == 110.0
        ));
    }

    #[test]
    fn new_glide_cancels_pending_ramp() {
        let graph = MockGraph::new();
        let (timeline, param) = gain_timeline(&graph);

        timeline.glide(ParamClass::Amplitude, 0.2, graph.now());
        timeline.glide(ParamClass::Amplitude, 0.8, graph.now());
        let ramps = graph
            .events(param)
            .into_iter()
            .filter(|e| matches!(e, AutomationEvent::LinearRamp { .. }))
            .count();
        assert_eq!(ramps, 1, "conflicting ramps must not stack");
    }

    #[test]
    fn degraded_host_falls_back_to_immediate_set() {
        let graph = MockGraph::degraded();
        let (timeline, param) = gain_timeline(&graph);

        timeline.glide(ParamClass::Amplitude, 0.4, graph.now());
        let events = graph.events(param);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], AutomationEvent::SetValue { value, .. } if value == 0.4));
        assert!((timeline.value() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn mid_ramp_value_feeds_the_next_glide() {
        let graph = MockGraph::new();
        let (timeline, param) = gain_timeline(&graph);

        timeline.glide(ParamClass::Amplitude, 0.0, graph.now());
        graph.advance(TRANSITION_SECS / 3.0);
        timeline.glide(ParamClass::Amplitude, 0.9, graph.now());

        // The second glide anchors at the partially ramped value, not at 1.0.
        let events = graph.events(param);
        let anchor = events
            .iter()
            .rev()
            .find_map(|e| match e {
                AutomationEvent::SetValue { value, .. } => Some(*value),
                _ => None,
            })
            .unwrap();
        assert!(anchor > 0.5 && anchor < 0.8, "anchor={anchor}");
    }
}
