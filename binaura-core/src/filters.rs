//! Biquad filters for the substrate's filter node and the isochronic smoother.
//!
//! The [`Biquad`] uses the RBJ audio-EQ-cookbook coefficients, which cover the
//! full mode set the engine exposes — including the allpass used as the
//! "no filtering" bypass. Coefficients are cached and recomputed only when a
//! parameter changes, so per-sample modulation stays cheap.

use alloc::string::String;

use crate::dsp::{cosf, kill_denormals, sinf, TAU};

/// Filter response selection. `Allpass` is the bypass mode (flat magnitude).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum FilterKind {
    Lowpass,
    Highpass,
    Bandpass,
    Notch,
    Allpass,
}

impl FilterKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FilterKind::Lowpass => "lowpass",
            FilterKind::Highpass => "highpass",
            FilterKind::Bandpass => "bandpass",
            FilterKind::Notch => "notch",
            FilterKind::Allpass => "allpass",
        }
    }
}

impl core::fmt::Display for FilterKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A filter name outside the supported set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFilterError {
    pub input: String,
}

impl core::fmt::Display for ParseFilterError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "unknown filter kind: {:?}", self.input)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ParseFilterError {}

impl core::str::FromStr for FilterKind {
    type Err = ParseFilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            // "none" requests the bypass mode.
            "none" | "allpass" => Ok(FilterKind::Allpass),
            "lowpass" => Ok(FilterKind::Lowpass),
            "highpass" => Ok(FilterKind::Highpass),
            "bandpass" => Ok(FilterKind::Bandpass),
            "notch" => Ok(FilterKind::Notch),
            other => Err(ParseFilterError { input: String::from(other) }),
        }
    }
}

/// RBJ biquad, transposed direct form II.
#[derive(Copy, Clone, Debug)]
pub struct Biquad {
    sr: f32,
    kind: FilterKind,
    fc: f32,
    q: f32,
    // normalized coefficients
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    // states
    z1: f32,
    z2: f32,
}

impl Biquad {
    pub fn new(kind: FilterKind, cut_hz: f32, q: f32, sr: f32) -> Self {
        let mut s = Self {
            sr: sr.max(1.0),
            kind,
            fc: cut_hz.max(0.0),
            q: q.max(1e-4),
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
        };
        s.recalc();
        s
    }

    #[inline] pub fn kind(&self) -> FilterKind { self.kind }

    #[inline]
    pub fn set_sample_rate(&mut self, sr: f32) {
        self.sr = sr.max(1.0);
        self.recalc();
    }

    #[inline]
    pub fn set_kind(&mut self, kind: FilterKind) {
        if kind != self.kind {
            self.kind = kind;
            self.recalc();
        }
    }

    /// Update cutoff and Q together; recomputes only when either changed.
    #[inline]
    pub fn tune(&mut self, cut_hz: f32, q: f32) {
        let fc = cut_hz.max(0.0);
        let q = q.max(1e-4);
        if fc != self.fc || q != self.q {
            self.fc = fc;
            self.q = q;
            self.recalc();
        }
    }

    fn recalc(&mut self) {
        // RBJ cookbook. Cutoff is clamped below Nyquist for stability.
        let fc = self.fc.min(0.49 * self.sr);
        let w0 = TAU * fc / self.sr;
        let (sw, cw) = (sinf(w0), cosf(w0));
        let alpha = sw / (2.0 * self.q);

        let (b0, b1, b2, a0, a1, a2) = match self.kind {
            FilterKind::Lowpass => {
                let k = (1.0 - cw) * 0.5;
                (k, 1.0 - cw, k, 1.0 + alpha, -2.0 * cw, 1.0 - alpha)
            }
            FilterKind::Highpass => {
                let k = (1.0 + cw) * 0.5;
                (k, -(1.0 + cw), k, 1.0 + alpha, -2.0 * cw, 1.0 - alpha)
            }
            FilterKind::Bandpass => {
                (alpha, 0.0, -alpha, 1.0 + alpha, -2.0 * cw, 1.0 - alpha)
            }
            FilterKind::Notch => {
                (1.0, -2.0 * cw, 1.0, 1.0 + alpha, -2.0 * cw, 1.0 - alpha)
            }
            FilterKind::Allpass => {
                (1.0 - alpha, -2.0 * cw, 1.0 + alpha, 1.0 + alpha, -2.0 * cw, 1.0 - alpha)
            }
        };

        let inv_a0 = 1.0 / a0;
        self.b0 = b0 * inv_a0;
        self.b1 = b1 * inv_a0;
        self.b2 = b2 * inv_a0;
        self.a1 = a1 * inv_a0;
        self.a2 = a2 * inv_a0;
    }

    #[inline]
    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }

    /// Process one sample.
    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let y = self.b0 * x + self.z1;
        self.z1 = self.b1 * x - self.a1 * y + self.z2;
        self.z2 = self.b2 * x - self.a2 * y;
        kill_denormals(y)
    }
}

// ------------------------------------ Tests --------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use core::str::FromStr;

    fn sine_amplitude_through(filter: &mut Biquad, freq: f32, sr: f32) -> f32 {
        let mut peak = 0.0_f32;
        let n = (sr as usize) / 2;
        for i in 0..n {
            let x = (TAU * freq * i as f32 / sr).sin();
            let y = filter.process(x);
            // Skip the settling transient.
            if i > n / 2 {
                peak = peak.max(y.abs());
            }
        }
        peak
    }

    #[test]
    fn filter_names_parse() {
        assert_eq!(FilterKind::from_str("none"), Ok(FilterKind::Allpass));
        assert_eq!(FilterKind::from_str("lowpass"), Ok(FilterKind::Lowpass));
        assert!(FilterKind::from_str("comb").is_err());
    }

    #[test]
    fn lowpass_separates_bands() {
        let sr = 48_000.0;
        let mut lp = Biquad::new(FilterKind::Lowpass, 1_000.0, 0.707, sr);
        let low = sine_amplitude_through(&mut lp, 100.0, sr);
        lp.reset();
        let high = sine_amplitude_through(&mut lp, 10_000.0, sr);
        assert!(low > 0.9, "low={low}");
        assert!(high < 0.1, "high={high}");
    }

    #[test]
    fn notch_rejects_center() {
        let sr = 48_000.0;
        let mut notch = Biquad::new(FilterKind::Notch, 1_000.0, 5.0, sr);
        let center = sine_amplitude_through(&mut notch, 1_000.0, sr);
        assert!(center < 0.1, "center={center}");
    }

    #[test]
    fn allpass_is_flat() {
        let sr = 48_000.0;
        let mut ap = Biquad::new(FilterKind::Allpass, 1_000.0, 0.707, sr);
        for freq in [100.0, 1_000.0, 8_000.0] {
            ap.reset();
            let amp = sine_amplitude_through(&mut ap, freq, sr);
            assert!((amp - 1.0).abs() < 0.05, "freq={freq} amp={amp}");
        }
    }

    #[test]
    fn retune_keeps_filter_stable() {
        let sr = 48_000.0;
        let mut lp = Biquad::new(FilterKind::Lowpass, 500.0, 0.707, sr);
        let mut peak = 0.0_f32;
        for i in 0..48_000 {
            // Sweep the cutoff while processing.
            lp.tune(500.0 + i as f32 / 10.0, 0.707);
            let x = (TAU * 440.0 * i as f32 / sr).sin();
            peak = peak.max(lp.process(x).abs());
        }
        assert!(peak < 2.0, "peak={peak}");
    }
}
