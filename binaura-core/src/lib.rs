#![cfg_attr(not(feature = "std"), no_std)]
//! Binaura Core — no_std-ready automation and DSP primitives for the Binaura
//! beat engine.
//!
//! Features
//! - `std`      : (default) use the Rust standard library
//! - `no-std`   : build with `#![no_std]` and the `libm` math backend
//! - `fast-math`: polynomial trig approximations on the waveform hot path
//! - `serde`    : serde derives on the public shape enums
//!
//! Modules
//! - [`dsp`]        : math backend, utils (db/lin, smoothing coefficients, fast trig)
//! - [`wave`]       : fixed oscillator shapes, Fourier-series periodic waves
//! - [`automation`] : scheduled parameter-change events and their evaluator
//! - [`filters`]    : RBJ biquad (lowpass/highpass/bandpass/notch/allpass)
//! - [`dynamics`]   : stereo-linked soft-knee compressor
//!
//! Design
//! - Allocations only at configuration time (event lists, harmonic tables);
//!   evaluation and per-sample processing never allocate
//! - Clear separation between math helpers and the automation model

extern crate alloc;

pub mod automation;
pub mod dsp;
pub mod dynamics;
pub mod filters;
pub mod wave;

/// Commonly used types/functions for convenience:
pub mod prelude {
    pub use crate::automation::{cancel_from, evaluate, insert_event, AutomationEvent};
    pub use crate::dsp::{db_to_lin, lerp, lin_to_db, one_pole_coeff, wrap_phase01, TAU};
    pub use crate::dynamics::{Compressor, CompressorParams};
    pub use crate::filters::{Biquad, FilterKind};
    pub use crate::wave::{Osc, OscSource, PeriodicWave, WaveShape};
}

#[cfg(test)]
mod smoke {

    #[test]
    fn prelude_exists() {
        use crate::prelude::*;
        let _ = db_to_lin(-6.0);
        let wave = PeriodicWave::odd_harmonic_pulse(32);
        let _ = wave.sample(0.25);
        let mut lp = Biquad::new(FilterKind::Lowpass, 1000.0, 0.707, 48000.0);
        let _ = lp.process(0.1);
        assert_eq!(evaluate(1.0, &[], 0.0), 1.0);
    }
}
