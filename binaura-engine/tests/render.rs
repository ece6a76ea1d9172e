//! End-to-end checks: the engine driving the offline substrate, with the
//! scheduled automation rendered to actual samples.

use binaura_engine::engine::Engine;
use binaura_engine::synth::SynthGraph;
use binaura_engine::{DriftShape, WaveShape};

const SR: f64 = 48_000.0;

fn render(graph: &SynthGraph, seconds: f64) -> (Vec<f32>, Vec<f32>) {
    let frames = (seconds * SR) as usize;
    let mut left = vec![0.0; frames];
    let mut right = vec![0.0; frames];
    graph.render(&mut left, &mut right);
    (left, right)
}

fn estimate_hz(samples: &[f32]) -> f64 {
    let mut crossings = 0;
    for w in samples.windows(2) {
        if (w[0] <= 0.0) != (w[1] <= 0.0) {
            crossings += 1;
        }
    }
    crossings as f64 / 2.0 * SR / samples.len() as f64
}

fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |m, &s| m.max(s.abs()))
}

#[test]
fn started_engine_renders_the_beat_offset() {
    let graph = SynthGraph::new(SR);
    let mut engine = Engine::new(graph.clone()).unwrap();
    engine.start(220.0, 6.0, 0.5, WaveShape::Sine).unwrap();

    let (left, right) = render(&graph, 1.0);
    // Skip the attack so ramps and the compressor have settled.
    let tail = left.len() / 2..;
    let left_hz = estimate_hz(&left[tail.clone()]);
    let right_hz = estimate_hz(&right[tail]);

    assert!((left_hz - 220.0).abs() < 3.0, "left={left_hz}");
    assert!((right_hz - 226.0).abs() < 3.0, "right={right_hz}");
    assert!(right_hz > left_hz, "the right channel carries the beat offset");
}

#[test]
fn output_is_bounded_and_fades_in() {
    let graph = SynthGraph::new(SR);
    let mut engine = Engine::new(graph.clone()).unwrap();
    engine.start(300.0, 4.0, 0.8, WaveShape::Sine).unwrap();

    let (left, right) = render(&graph, 0.5);
    assert!(peak(&left) > 0.05, "non-silent");
    assert!(peak(&left) <= 1.0 && peak(&right) <= 1.0, "bounded");

    // The first millisecond sits inside the fade-in from zero.
    let first_ms = &left[..(SR / 1000.0) as usize];
    assert!(peak(first_ms) < 0.1, "click-free onset, peak={}", peak(first_ms));
}

#[test]
fn stop_runs_down_to_silence() {
    let graph = SynthGraph::new(SR);
    let mut engine = Engine::new(graph.clone()).unwrap();
    engine.start(250.0, 5.0, 0.6, WaveShape::Sine).unwrap();
    let _ = render(&graph, 0.25);

    engine.stop();
    let (left, _) = render(&graph, 0.5);
    // Volume ramp (15 ms) then the scheduled oscillator stop at +100 ms;
    // leave some slack for the filter tail.
    let tail = &left[(0.2 * SR) as usize..];
    assert!(peak(tail) < 1e-3, "silent after stop, peak={}", peak(tail));
}

#[test]
fn isochronic_pulsing_modulates_the_envelope() {
    let graph = SynthGraph::new(SR);
    let mut engine = Engine::new(graph.clone()).unwrap();
    engine.start(300.0, 4.0, 0.8, WaveShape::Sine).unwrap();
    engine.start_isochronic(4.0, 1.0).unwrap();

    let (left, _) = render(&graph, 1.0);
    // At depth 1 the gain swings between 0 and 1: window peaks must spread.
    let window = left.len() / 16;
    let peaks: Vec<f32> = left.chunks(window).map(peak).collect();
    let hi = peaks.iter().cloned().fold(f32::MIN, f32::max);
    let lo = peaks.iter().cloned().fold(f32::MAX, f32::min);
    assert!(hi > 0.05, "hi={hi}");
    assert!(lo < 0.5 * hi, "pulsing should gate the signal: lo={lo} hi={hi}");
}

#[test]
fn frequency_update_stays_click_free() {
    let graph = SynthGraph::new(SR);
    let mut engine = Engine::new(graph.clone()).unwrap();
    engine.start(200.0, 0.0, 0.6, WaveShape::Sine).unwrap();
    let (mut left, _) = render(&graph, 0.2);

    engine.update(Some(400.0), None).unwrap();
    let (more, _) = render(&graph, 0.2);
    left.extend(more);

    let max_step = left
        .windows(2)
        .map(|w| (w[1] - w[0]).abs())
        .fold(0.0f32, f32::max);
    // A 400 Hz sine moves ~0.016 per sample at this level; a click would
    // jump an order of magnitude more.
    assert!(max_step < 0.08, "max_step={max_step}");
}

#[test]
fn drift_survives_many_rearm_cycles_while_rendering() {
    let graph = SynthGraph::new(SR);
    let mut engine = Engine::new(graph.clone()).unwrap();
    engine.start(150.0, 3.0, 0.5, WaveShape::Sine).unwrap();
    engine.start_drift(0.1, 3.0, 7.0, DriftShape::Triangle).unwrap();

    let (left, right) = render(&graph, 1.0);
    assert!(peak(&left) > 0.02 && peak(&right) > 0.02);
    assert!(peak(&left) <= 1.0 && peak(&right) <= 1.0);

    engine.stop_drift();
    engine.stop();
    let (left, _) = render(&graph, 0.5);
    let tail = &left[(0.2 * SR) as usize..];
    assert!(peak(tail) < 1e-3);
}

#[test]
fn wave_crossfade_renders_through_the_swap() {
    let graph = SynthGraph::new(SR);
    let mut engine = Engine::new(graph.clone()).unwrap();
    engine.start(200.0, 4.0, 0.5, WaveShape::Sine).unwrap();
    let _ = render(&graph, 0.1);

    engine.set_wave_type(WaveShape::Square);
    let (left, _) = render(&graph, 0.5);
    // The fade bottoms out around the swap (25 ms in) and comes back up.
    let around_swap = &left[(0.02 * SR) as usize..(0.03 * SR) as usize];
    let later = &left[(0.2 * SR) as usize..];
    assert!(peak(around_swap) < 0.5 * peak(later), "fade dip then recovery");
    assert!(peak(later) > 0.02);
}
