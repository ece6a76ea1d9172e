//! Waveform synthesis: fixed oscillator shapes and Fourier-series periodic waves.
//!
//! Contents:
//! - `WaveShape`    : the four fixed oscillator shapes, with a string surface
//! - `PeriodicWave` : arbitrary harmonic series, peak-normalized on build
//! - `Osc`          : phase-accumulator oscillator over either source
//!
//! The shapes are deliberately naive (no band-limiting); the engine runs them
//! at carrier frequencies far below Nyquist or as sub-audio modulators.

use alloc::string::String;
use alloc::vec::Vec;

use crate::dsp::{fast_cos, fast_sin, wrap_phase01, TAU};

/// Resolution used to find the normalization peak of a periodic wave.
const NORM_RESOLUTION: usize = 2048;

/// Fixed oscillator shape.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum WaveShape {
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

impl WaveShape {
    pub fn as_str(self) -> &'static str {
        match self {
            WaveShape::Sine => "sine",
            WaveShape::Square => "square",
            WaveShape::Sawtooth => "sawtooth",
            WaveShape::Triangle => "triangle",
        }
    }
}

impl core::fmt::Display for WaveShape {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A wave-shape name outside the fixed set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseShapeError {
    pub input: String,
}

impl core::fmt::Display for ParseShapeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "unknown wave shape: {:?}", self.input)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ParseShapeError {}

impl core::str::FromStr for WaveShape {
    type Err = ParseShapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sine" => Ok(WaveShape::Sine),
            "square" => Ok(WaveShape::Square),
            "sawtooth" => Ok(WaveShape::Sawtooth),
            "triangle" => Ok(WaveShape::Triangle),
            other => Err(ParseShapeError { input: String::from(other) }),
        }
    }
}

/// Sample a fixed shape at `phase01` in [0, 1). Output is in [-1, 1].
#[inline]
pub fn shape_sample(phase01: f32, shape: WaveShape) -> f32 {
    match shape {
        WaveShape::Sine => fast_sin(TAU * phase01),
        WaveShape::Square => {
            if phase01 < 0.5 { 1.0 } else { -1.0 }
        }
        WaveShape::Sawtooth => 2.0 * phase01 - 1.0,
        WaveShape::Triangle => 4.0 * (phase01 - 0.5).abs() - 1.0,
    }
}

/// A periodic waveform built from a finite harmonic series.
///
/// `real[k]`/`imag[k]` are the cosine/sine coefficients of harmonic `k`
/// (index 0 is the DC term and is ignored). The waveform is peak-normalized
/// at construction so its maximum magnitude is 1.
#[derive(Clone, Debug)]
pub struct PeriodicWave {
    real: Vec<f32>,
    imag: Vec<f32>,
    inv_peak: f32,
}

impl PeriodicWave {
    pub fn new(real: Vec<f32>, imag: Vec<f32>) -> Self {
        let mut wave = Self { real, imag, inv_peak: 1.0 };
        let mut peak = 0.0_f32;
        for i in 0..NORM_RESOLUTION {
            let s = wave.sample_raw(i as f32 / NORM_RESOLUTION as f32).abs();
            if s > peak {
                peak = s;
            }
        }
        if peak > 0.0 {
            wave.inv_peak = 1.0 / peak;
        }
        wave
    }

    /// The band-limited square-wave approximation used as the isochronic
    /// pulse: odd harmonics `i` with sine amplitude `1/i`, everything else
    /// (DC and even harmonics) zero.
    pub fn odd_harmonic_pulse(harmonics: usize) -> Self {
        let mut real = Vec::new();
        let mut imag = Vec::new();
        real.resize(harmonics + 1, 0.0);
        imag.resize(harmonics + 1, 0.0);
        let mut i = 1;
        while i <= harmonics {
            imag[i] = 1.0 / i as f32;
            i += 2;
        }
        Self::new(real, imag)
    }

    /// Number of harmonic slots (including the ignored DC slot).
    pub fn len(&self) -> usize {
        self.real.len().max(self.imag.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    /// Coefficient pair for harmonic `k` (zero when out of range).
    pub fn coefficient(&self, k: usize) -> (f32, f32) {
        (
            self.real.get(k).copied().unwrap_or(0.0),
            self.imag.get(k).copied().unwrap_or(0.0),
        )
    }

    #[inline]
    fn sample_raw(&self, phase01: f32) -> f32 {
        let n = self.len();
        let mut acc = 0.0;
        for k in 1..n {
            let (re, im) = self.coefficient(k);
            if re == 0.0 && im == 0.0 {
                continue;
            }
            let arg = TAU * k as f32 * phase01;
            acc += re * fast_cos(arg) + im * fast_sin(arg);
        }
        acc
    }

    /// Sample the normalized waveform at `phase01` in [0, 1).
    #[inline]
    pub fn sample(&self, phase01: f32) -> f32 {
        self.sample_raw(phase01) * self.inv_peak
    }
}

/// What an oscillator plays.
#[derive(Clone, Debug)]
pub enum OscSource {
    Shape(WaveShape),
    Periodic(PeriodicWave),
}

/// Free-running oscillator over a fixed shape or a periodic wave.
///
/// Frequency is supplied per sample so the caller can automate it.
#[derive(Clone, Debug)]
pub struct Osc {
    phase: f32,
    source: OscSource,
}

impl Osc {
    pub fn new(source: OscSource) -> Self {
        Self { phase: 0.0, source }
    }

    pub fn set_source(&mut self, source: OscSource) {
        self.source = source;
    }

    /// Advance one sample at `freq_hz` and return the oscillator sample.
    #[inline]
    pub fn next(&mut self, freq_hz: f32, sr: f32) -> f32 {
        let s = match &self.source {
            OscSource::Shape(shape) => shape_sample(self.phase, *shape),
            OscSource::Periodic(wave) => wave.sample(self.phase),
        };
        self.phase = wrap_phase01(self.phase + freq_hz / sr);
        s
    }
}

// ------------------------------------ Tests --------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use core::str::FromStr;

    #[test]
    fn shape_names_roundtrip() {
        for shape in [WaveShape::Sine, WaveShape::Square, WaveShape::Sawtooth, WaveShape::Triangle] {
            assert_eq!(WaveShape::from_str(shape.as_str()), Ok(shape));
        }
        assert!(WaveShape::from_str("cosine").is_err());
        assert!(WaveShape::from_str("").is_err());
    }

    #[test]
    fn pulse_has_only_odd_sine_harmonics() {
        let wave = PeriodicWave::odd_harmonic_pulse(32);
        assert_eq!(wave.len(), 33);
        for k in 1..wave.len() {
            let (re, im) = wave.coefficient(k);
            assert_eq!(re, 0.0, "cosine term {k} should be zero");
            if k % 2 == 0 {
                assert_eq!(im, 0.0, "even harmonic {k} should be zero");
            } else {
                assert!((im - 1.0 / k as f32).abs() < 1e-6, "harmonic {k}");
            }
        }
    }

    #[test]
    fn pulse_peak_is_normalized() {
        let wave = PeriodicWave::odd_harmonic_pulse(32);
        let mut peak = 0.0_f32;
        for i in 0..4096 {
            peak = peak.max(wave.sample(i as f32 / 4096.0).abs());
        }
        assert!((peak - 1.0).abs() < 0.01, "peak={peak}");
    }

    #[test]
    fn square_alternates_sign() {
        assert_eq!(shape_sample(0.25, WaveShape::Square), 1.0);
        assert_eq!(shape_sample(0.75, WaveShape::Square), -1.0);
    }

    #[test]
    fn osc_completes_one_cycle() {
        let sr = 48_000.0;
        let mut osc = Osc::new(OscSource::Shape(WaveShape::Sine));
        let mut last = 0.0;
        // 480 samples at 100 Hz is exactly one cycle.
        for _ in 0..480 {
            last = osc.next(100.0, sr);
        }
        // Back near the zero crossing at the cycle boundary.
        assert!(last.abs() < 0.05, "last={last}");
    }
}
