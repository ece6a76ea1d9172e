//! Scheduled parameter automation: the event model and its evaluator.
//!
//! A parameter's timeline is an ordered list of [`AutomationEvent`]s over a
//! monotonic clock in seconds. [`evaluate`] computes the value at any instant;
//! [`cancel_from`] removes not-yet-reached events. Hosts execute these
//! timelines sample-accurately; the engine only schedules them.
//!
//! Semantics follow the usual audio-parameter rules:
//! - A ramp is anchored at the value/time of the event before it.
//! - Linear ramps interpolate arithmetically, exponential ramps geometrically
//!   (both endpoints must be positive and nonzero, otherwise the ramp
//!   degrades to linear).
//! - A value curve spans `[start_time, start_time + duration]`, linearly
//!   interpolated between samples, holding its last sample afterwards.

use alloc::vec::Vec;

/// One scheduled change on a parameter.
#[derive(Clone, Debug, PartialEq)]
pub enum AutomationEvent {
    SetValue { value: f64, time: f64 },
    LinearRamp { target: f64, end_time: f64 },
    ExponentialRamp { target: f64, end_time: f64 },
    ValueCurve { curve: Vec<f32>, start_time: f64, duration: f64 },
}

impl AutomationEvent {
    /// The scheduling anchor used for ordering and cancellation.
    pub fn time(&self) -> f64 {
        match self {
            AutomationEvent::SetValue { time, .. } => *time,
            AutomationEvent::LinearRamp { end_time, .. } => *end_time,
            AutomationEvent::ExponentialRamp { end_time, .. } => *end_time,
            AutomationEvent::ValueCurve { start_time, .. } => *start_time,
        }
    }
}

/// Insert `event` keeping the list ordered by [`AutomationEvent::time`].
/// Events with equal anchors keep insertion order.
pub fn insert_event(events: &mut Vec<AutomationEvent>, event: AutomationEvent) {
    let at = event.time();
    let idx = events.partition_point(|e| e.time() <= at);
    events.insert(idx, event);
}

/// Remove every event anchored at-or-after `t`, plus any value curve whose
/// span contains `t` (an in-flight curve is clearable; the drift modulator
/// relies on this when it is stopped mid-cycle).
pub fn cancel_from(events: &mut Vec<AutomationEvent>, t: f64) {
    events.retain(|e| {
        if e.time() >= t {
            return false;
        }
        if let AutomationEvent::ValueCurve { start_time, duration, .. } = e {
            if *start_time < t && t < *start_time + *duration {
                return false;
            }
        }
        true
    });
}

/// Evaluate the timeline at time `t`, starting from `initial`.
pub fn evaluate(initial: f64, events: &[AutomationEvent], t: f64) -> f64 {
    let mut v0 = initial;
    let mut t0 = f64::NEG_INFINITY;

    for event in events {
        match event {
            AutomationEvent::SetValue { value, time } => {
                if *time > t {
                    return v0;
                }
                v0 = *value;
                t0 = *time;
            }
            AutomationEvent::LinearRamp { target, end_time } => {
                if *end_time <= t {
                    v0 = *target;
                    t0 = *end_time;
                    continue;
                }
                return ramp_value(v0, t0, *target, *end_time, t, false);
            }
            AutomationEvent::ExponentialRamp { target, end_time } => {
                if *end_time <= t {
                    v0 = *target;
                    t0 = *end_time;
                    continue;
                }
                return ramp_value(v0, t0, *target, *end_time, t, true);
            }
            AutomationEvent::ValueCurve { curve, start_time, duration } => {
                if curve.is_empty() || *duration <= 0.0 {
                    continue;
                }
                if *start_time > t {
                    return v0;
                }
                let end = *start_time + *duration;
                if end <= t {
                    v0 = f64::from(curve[curve.len() - 1]);
                    t0 = end;
                    continue;
                }
                return curve_value(curve, *start_time, *duration, t);
            }
        }
    }
    v0
}

#[inline]
fn ramp_value(v0: f64, t0: f64, target: f64, end: f64, t: f64, exponential: bool) -> f64 {
    if !t0.is_finite() || end <= t0 || t <= t0 {
        // No usable anchor before the ramp: hold until the ramp's end.
        return v0;
    }
    let frac = (t - t0) / (end - t0);
    if exponential && v0 > 0.0 && target > 0.0 {
        v0 * crate::dsp::pow64(target / v0, frac)
    } else {
        v0 + (target - v0) * frac
    }
}

#[inline]
fn curve_value(curve: &[f32], start: f64, duration: f64, t: f64) -> f64 {
    let n = curve.len();
    if n == 1 {
        return f64::from(curve[0]);
    }
    let pos = (t - start) / duration * (n - 1) as f64;
    let idx = pos as usize;
    if idx >= n - 1 {
        return f64::from(curve[n - 1]);
    }
    let frac = pos - idx as f64;
    f64::from(curve[idx]) + (f64::from(curve[idx + 1]) - f64::from(curve[idx])) * frac
}

// ------------------------------------ Tests --------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn set(value: f64, time: f64) -> AutomationEvent {
        AutomationEvent::SetValue { value, time }
    }

    #[test]
    fn empty_timeline_holds_initial() {
        assert_eq!(evaluate(0.5, &[], 10.0), 0.5);
    }

    #[test]
    fn set_value_applies_at_its_time() {
        let events = vec![set(2.0, 1.0)];
        assert_eq!(evaluate(0.0, &events, 0.5), 0.0);
        assert_eq!(evaluate(0.0, &events, 1.0), 2.0);
        assert_eq!(evaluate(0.0, &events, 5.0), 2.0);
    }

    #[test]
    fn linear_ramp_interpolates_from_anchor() {
        let mut events = Vec::new();
        insert_event(&mut events, set(1.0, 0.0));
        insert_event(&mut events, AutomationEvent::LinearRamp { target: 3.0, end_time: 2.0 });
        assert_eq!(evaluate(0.0, &events, 0.0), 1.0);
        assert!((evaluate(0.0, &events, 1.0) - 2.0).abs() < 1e-12);
        assert_eq!(evaluate(0.0, &events, 2.0), 3.0);
        assert_eq!(evaluate(0.0, &events, 9.0), 3.0);
    }

    #[test]
    fn exponential_ramp_is_geometric() {
        let mut events = Vec::new();
        insert_event(&mut events, set(100.0, 0.0));
        insert_event(&mut events, AutomationEvent::ExponentialRamp { target: 400.0, end_time: 2.0 });
        // Geometric midpoint of 100 → 400 is 200.
        assert!((evaluate(0.0, &events, 1.0) - 200.0).abs() < 1e-9);
        assert_eq!(evaluate(0.0, &events, 2.0), 400.0);
    }

    #[test]
    fn exponential_ramp_with_zero_endpoint_degrades_to_linear() {
        let mut events = Vec::new();
        insert_event(&mut events, set(0.0, 0.0));
        insert_event(&mut events, AutomationEvent::ExponentialRamp { target: 4.0, end_time: 2.0 });
        assert!((evaluate(0.0, &events, 1.0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn curve_interpolates_and_holds_tail() {
        let events = vec![AutomationEvent::ValueCurve {
            curve: vec![1.0, 3.0, 1.0],
            start_time: 1.0,
            duration: 2.0,
        }];
        assert_eq!(evaluate(0.0, &events, 0.5), 0.0);
        assert_eq!(evaluate(0.0, &events, 1.0), 1.0);
        assert!((evaluate(0.0, &events, 1.5) - 2.0).abs() < 1e-12);
        assert_eq!(evaluate(0.0, &events, 2.0), 3.0);
        assert_eq!(evaluate(0.0, &events, 3.0), 1.0);
        assert_eq!(evaluate(0.0, &events, 7.0), 1.0);
    }

    #[test]
    fn cancel_removes_future_events_and_inflight_curves() {
        let mut events = Vec::new();
        insert_event(&mut events, set(1.0, 0.0));
        insert_event(&mut events, AutomationEvent::LinearRamp { target: 2.0, end_time: 5.0 });
        insert_event(&mut events, AutomationEvent::ValueCurve {
            curve: vec![0.0, 1.0],
            start_time: 1.0,
            duration: 4.0,
        });
        cancel_from(&mut events, 3.0);
        // The in-flight ramp (ends at 5) and in-flight curve (1..5) both go;
        // the past set-value survives.
        assert_eq!(events, vec![set(1.0, 0.0)]);
    }

    #[test]
    fn insert_keeps_events_ordered() {
        let mut events = Vec::new();
        insert_event(&mut events, set(2.0, 2.0));
        insert_event(&mut events, set(1.0, 1.0));
        insert_event(&mut events, set(3.0, 3.0));
        let times: Vec<f64> = events.iter().map(AutomationEvent::time).collect();
        assert_eq!(times, vec![1.0, 2.0, 3.0]);
    }
}
