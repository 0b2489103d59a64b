//! Post-synaptic potential template
//!
//! Before `xoffset` the trace sits at `yoffset`. After onset (`x = t - xoffset`):
//!
//! ```text
//! y = yoffset + amp / peak · (1 − e^(−x/τr))^p · e^(−x/τd)
//! ```
//!
//! `rise_time` is the onset-to-peak time; the rise time constant `τr` is
//! solved from it so that `τr · ln(1 + τd·p/τr) = rise_time`. `peak` is the
//! unscaled curve value at `rise_time`, so `amp` is the peak amplitude.

/// Box constraints for `[yoffset, amp, rise_time, decay_tau]`.
pub const PSP_BOUNDS: [(f64, f64); 4] = [(-1.0, 1.0), (-1.0, 1.0), (0.1e-3, 20e-3), (1e-3, 200e-3)];

/// Default onset time of the template (seconds).
pub const DEFAULT_XOFFSET: f64 = 0.01;

/// Default exponent of the rising phase.
pub const DEFAULT_RISE_POWER: f64 = 2.0;

const BISECT_ITERATIONS: usize = 200;

fn inner(x: f64, rise_tau: f64, decay_tau: f64, rise_power: f64) -> f64 {
    (1.0 - (-x / rise_tau).exp()).powf(rise_power) * (-x / decay_tau).exp()
}

fn peak_time(rise_tau: f64, decay_tau: f64, rise_power: f64) -> f64 {
    rise_tau * (decay_tau * rise_power / rise_tau).ln_1p()
}

/// Solve for the rise time constant that places the peak at `rise_time`.
///
/// Peak time increases monotonically with `τr` and approaches `τd·p`; when
/// `rise_time` is at or beyond that limit the largest searched `τr` is used.
#[must_use]
pub fn rise_tau(rise_time: f64, decay_tau: f64, rise_power: f64) -> f64 {
    let mut lo = rise_time * 1e-9;
    let mut hi = rise_time.max(decay_tau) * 1e6;
    if peak_time(hi, decay_tau, rise_power) <= rise_time {
        return hi;
    }
    for _ in 0..BISECT_ITERATIONS {
        let mid = 0.5 * (lo + hi);
        if peak_time(mid, decay_tau, rise_power) < rise_time {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo <= f64::EPSILON * hi {
            break;
        }
    }
    0.5 * (lo + hi)
}

/// Evaluate the template for `[yoffset, amp, rise_time, decay_tau]`.
#[must_use]
pub fn evaluate(params: &[f64], times: &[f64], xoffset: f64, rise_power: f64) -> Vec<f64> {
    let (yoffset, amp, rise_time, decay_tau) = (params[0], params[1], params[2], params[3]);
    if !(rise_time > 0.0 && decay_tau > 0.0) {
        return vec![f64::NAN; times.len()];
    }
    let tau_r = rise_tau(rise_time, decay_tau, rise_power);
    let peak = inner(rise_time, tau_r, decay_tau, rise_power);
    let scale = if peak > 0.0 && peak.is_finite() {
        amp / peak
    } else {
        0.0
    };
    times
        .iter()
        .map(|&t| {
            let x = t - xoffset;
            if x < 0.0 {
                yoffset
            } else {
                scale.mul_add(inner(x, tau_r, decay_tau, rise_power), yoffset)
            }
        })
        .collect()
}
