//! Math backend selection and small DSP helpers.
//!
//! Conventions:
//! - `std` builds use the Rust intrinsics; `no-std` builds route through `libm`.
//! - `fast-math` swaps exact trig for polynomial approximations on the
//!   waveform-sampling hot path.
//! - Argument and return domains are documented per function.

#![allow(clippy::excessive_precision)]

use core::f32::consts::PI;

use cfg_if::cfg_if;

// ----------------------------- Math backend selection -----------------------------

cfg_if! {
    // libm (C math) in no_std
    if #[cfg(feature = "no-std")] {
        #[inline] pub(crate) fn sinf(x: f32) -> f32 { libm::sinf(x) }
        #[inline] pub(crate) fn cosf(x: f32) -> f32 { libm::cosf(x) }
        #[inline] pub(crate) fn expf(x: f32) -> f32 { libm::expf(x) }
        #[inline] pub(crate) fn logf(x: f32) -> f32 { libm::logf(x) }
        #[inline] pub(crate) fn pow64(x: f64, y: f64) -> f64 { libm::pow(x, y) }
    // std backend
    } else {
        #[inline] pub(crate) fn sinf(x: f32) -> f32 { x.sin() }
        #[inline] pub(crate) fn cosf(x: f32) -> f32 { x.cos() }
        #[inline] pub(crate) fn expf(x: f32) -> f32 { x.exp() }
        #[inline] pub(crate) fn logf(x: f32) -> f32 { x.ln() }
        #[inline] pub(crate) fn pow64(x: f64, y: f64) -> f64 { x.powf(y) }
    }
}

// --------------------------------- Constants -------------------------------------

/// 2π (commonly useful)
pub const TAU: f32 = 2.0 * PI;

/// A very small epsilon used in denormal handling and safe divisions.
pub const EPS_SMALL: f32 = 1.0e-20;

// --------------------------------- Utilities -------------------------------------

#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Wrap phase into [0, 1).
#[inline]
pub fn wrap_phase01(p: f32) -> f32 {
    let w = p - (p as i64 as f32);
    if w < 0.0 { w + 1.0 } else { w }
}

/// Kill denormal/subnormal values. Returns 0.0 if |x| < EPS_SMALL.
#[inline]
pub fn kill_denormals(x: f32) -> f32 {
    if x.abs() < EPS_SMALL { 0.0 } else { x }
}

// --------------------------------- dB / linear -----------------------------------

/// Convert dB to linear gain: lin = 10^(db/20).
#[inline]
pub fn db_to_lin(db: f32) -> f32 {
    if db <= -120.0 { 0.0 } else { expf(0.11512925464970229_f32 * db) } // ln(10)/20
}

/// Convert linear gain to dB: db = 20*log10(lin).
#[inline]
pub fn lin_to_db(lin: f32) -> f32 {
    if lin <= EPS_SMALL { -120.0 } else { 8.685889638065036553_f32 * logf(lin) } // 20/ln(10)
}

// --------------------------------- Fast trig -------------------------------------

/// Sine with optional `fast-math` path: range reduction into [-π, π] plus a
/// 5th-order odd polynomial. Max abs error ~1e-3, fine for control curves.
#[inline]
pub fn fast_sin(x: f32) -> f32 {
    cfg_if! {
        if #[cfg(feature = "fast-math")] {
            let mut xr = x;
            let k = (xr / TAU).round();
            xr -= k * TAU;

            // sin(x) ≈ x * (a + b x^2 + c x^4)
            let x2 = xr * xr;
            xr * (0.999_979_313_3 + x2 * (-0.166_624_432_0 + x2 * 0.008_308_978_98))
        } else {
            sinf(x)
        }
    }
}

#[inline]
pub fn fast_cos(x: f32) -> f32 {
    cfg_if! {
        if #[cfg(feature = "fast-math")] {
            // cos(x) = sin(x + π/2)
            fast_sin(x + core::f32::consts::PI * 0.5)
        } else {
            cosf(x)
        }
    }
}

// --------------------------------- Smoothing coefficients -------------------------

/// One-pole smoothing coefficient for a time constant `t_s` (seconds):
/// `a = exp(-1/(tau * sr))` for the `y += (1 - a) * (x - y)` form.
#[inline]
pub fn one_pole_coeff(t_s: f32, sr: f32) -> f32 {
    if t_s <= 0.0 { return 0.0; }
    expf(-1.0 / (t_s * sr))
}

/// Convert a cutoff in Hz to the same one-pole form: `exp(-2π fc / sr)`.
#[inline]
pub fn one_pole_coeff_hz(cut_hz: f32, sr: f32) -> f32 {
    let fc = cut_hz.max(0.0).min(0.499 * sr);
    expf(-2.0 * PI * fc / sr)
}

// --------------------------------- Tests (std only) ------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_lin_roundtrip() {
        for db in [-60.0, -20.0, -6.0, 0.0, 6.0, 12.0, 24.0] {
            let lin = db_to_lin(db);
            let back = lin_to_db(lin);
            assert!((db - back).abs() < 0.1, "db={}, back={}", db, back);
        }
    }

    #[test]
    fn phase_wrap_stays_in_range() {
        for p in [-1.75, -0.25, 0.0, 0.4, 1.0, 2.3, 17.9] {
            let w = wrap_phase01(p);
            assert!((0.0..1.0).contains(&w), "p={} w={}", p, w);
        }
    }

    #[test]
    fn fast_sin_tracks_sin() {
        for i in 0..64 {
            let x = (i as f32 / 64.0 - 0.5) * 2.0 * TAU;
            assert!((fast_sin(x) - x.sin()).abs() < 2e-3, "x={x}");
        }
    }

    #[test]
    fn one_pole_coeff_bounds() {
        let a = one_pole_coeff(0.015, 48000.0);
        assert!(a > 0.99 && a < 1.0, "a={a}");
        assert_eq!(one_pole_coeff(0.0, 48000.0), 0.0);
    }
}
