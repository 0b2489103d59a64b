//! Projected BFGS minimizer
//!
//! Quasi-Newton minimization with an inverse-Hessian BFGS update and Armijo
//! backtracking. Box constraints are handled by projecting every trial point
//! onto the box and freezing components that sit on an active bound.
//!
//! The minimizer never fails: when it runs out of iterations or the line
//! search cannot make progress it reports `success = false` together with the
//! best point found.

use serde::{Deserialize, Serialize};

/// Objective function type.
pub type Objective<'a> = dyn Fn(&[f64]) -> f64 + 'a;

/// Gradient function type.
pub type Gradient<'a> = dyn Fn(&[f64]) -> Vec<f64> + 'a;

const ARMIJO_C1: f64 = 1e-4;
const MAX_BACKTRACKS: usize = 60;

/// Stopping criteria for [`minimize`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinimizeOptions {
    /// Maximum number of quasi-Newton iterations.
    pub max_iterations: usize,
    /// Stop when the projected gradient's largest component falls below this.
    pub gtol: f64,
    /// Stop when the relative reduction of the objective falls below this.
    pub ftol: f64,
}

impl Default for MinimizeOptions {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            gtol: 1e-12,
            ftol: 1e-12,
        }
    }
}

/// Outcome of a minimization.
#[derive(Debug, Clone, PartialEq)]
pub struct MinimizeReport {
    /// Best point found.
    pub x: Vec<f64>,
    /// Objective value at `x`.
    pub fun: f64,
    /// Quasi-Newton iterations performed.
    pub iterations: usize,
    /// Objective evaluations, including those spent on finite differences.
    pub evaluations: usize,
    /// Whether a convergence criterion was met.
    pub success: bool,
    /// Why the minimizer stopped.
    pub message: &'static str,
}

struct Problem<'a> {
    f: &'a Objective<'a>,
    grad: Option<&'a Gradient<'a>>,
    bounds: Option<&'a [(f64, f64)]>,
    evaluations: usize,
}

impl Problem<'_> {
    fn value(&mut self, x: &[f64]) -> f64 {
        self.evaluations += 1;
        let v = (self.f)(x);
        if v.is_nan() {
            f64::INFINITY
        } else {
            v
        }
    }

    fn gradient(&mut self, x: &[f64]) -> Vec<f64> {
        if let Some(grad) = self.grad {
            return grad(x);
        }
        // Central differences with a step relative to the parameter scale
        let step = f64::EPSILON.cbrt();
        let mut g = vec![0.0; x.len()];
        let mut probe = x.to_vec();
        for i in 0..x.len() {
            let h = step * x[i].abs().max(1e-8);
            probe[i] = x[i] + h;
            let plus = self.value(&probe);
            probe[i] = x[i] - h;
            let minus = self.value(&probe);
            probe[i] = x[i];
            g[i] = (plus - minus) / (2.0 * h);
            if !g[i].is_finite() {
                g[i] = 0.0;
            }
        }
        g
    }

    fn project(&self, x: &mut [f64]) {
        if let Some(bounds) = self.bounds {
            for (xi, &(lo, hi)) in x.iter_mut().zip(bounds) {
                *xi = xi.clamp(lo, hi);
            }
        }
    }

    /// Components pinned at a bound with the gradient pushing outward.
    fn active(&self, x: &[f64], g: &[f64]) -> Vec<bool> {
        match self.bounds {
            None => vec![false; x.len()],
            Some(bounds) => x
                .iter()
                .zip(g)
                .zip(bounds)
                .map(|((&xi, &gi), &(lo, hi))| (xi <= lo && gi > 0.0) || (xi >= hi && gi < 0.0))
                .collect(),
        }
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn identity(n: usize) -> Vec<Vec<f64>> {
    (0..n)
        .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect()
}

fn mat_vec(m: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    m.iter().map(|row| dot(row, v)).collect()
}

/// Inverse-Hessian BFGS update: `H ← (I − ρ s yᵀ) H (I − ρ y sᵀ) + ρ s sᵀ`.
fn bfgs_update(h: &mut [Vec<f64>], s: &[f64], y: &[f64], rho: f64) {
    let n = s.len();
    let hy = mat_vec(h, y);
    let yhy = dot(y, &hy);
    for i in 0..n {
        for j in 0..n {
            h[i][j] += rho * (1.0 + rho * yhy) * s[i] * s[j] - rho * (hy[i] * s[j] + s[i] * hy[j]);
        }
    }
}

/// Minimize `f` starting from `x0`.
///
/// `grad` is used when supplied, otherwise central finite differences are
/// taken. `bounds`, when given, must have one `(lower, upper)` pair per
/// parameter; `x0` is projected onto the box before the first evaluation.
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn minimize(
    f: &Objective<'_>,
    grad: Option<&Gradient<'_>>,
    x0: &[f64],
    bounds: Option<&[(f64, f64)]>,
    options: &MinimizeOptions,
) -> MinimizeReport {
    let n = x0.len();
    let mut problem = Problem {
        f,
        grad,
        bounds,
        evaluations: 0,
    };

    let mut x = x0.to_vec();
    problem.project(&mut x);
    let mut fx = problem.value(&x);
    let mut g = problem.gradient(&x);
    let mut h = identity(n);
    let mut fresh_hessian = true;
    let mut iterations = 0;

    let finish = |x: Vec<f64>, fun, iterations, evaluations, success, message| MinimizeReport {
        x,
        fun,
        iterations,
        evaluations,
        success,
        message,
    };

    if !fx.is_finite() {
        return finish(x, fx, 0, problem.evaluations, false, "objective not finite at start");
    }

    while iterations < options.max_iterations {
        let active = problem.active(&x, &g);
        let free_grad: Vec<f64> = g
            .iter()
            .zip(&active)
            .map(|(&gi, &a)| if a { 0.0 } else { gi })
            .collect();
        let pg_max = free_grad.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        if pg_max <= options.gtol {
            return finish(x, fx, iterations, problem.evaluations, true, "projected gradient below tolerance");
        }

        let mut direction: Vec<f64> = mat_vec(&h, &free_grad).iter().map(|v| -v).collect();
        for (d, &a) in direction.iter_mut().zip(&active) {
            if a {
                *d = 0.0;
            }
        }
        if dot(&direction, &free_grad) >= 0.0 {
            h = identity(n);
            fresh_hessian = true;
            direction = free_grad.iter().map(|v| -v).collect();
        }

        // First steepest-descent step is scaled so no component moves by more than 1
        let mut alpha = if fresh_hessian {
            (1.0 / pg_max).min(1.0)
        } else {
            1.0
        };

        let mut accepted = None;
        for _ in 0..MAX_BACKTRACKS {
            let mut trial: Vec<f64> = x
                .iter()
                .zip(&direction)
                .map(|(xi, di)| alpha.mul_add(*di, *xi))
                .collect();
            problem.project(&mut trial);
            let step: Vec<f64> = trial.iter().zip(&x).map(|(a, b)| a - b).collect();
            let f_trial = problem.value(&trial);
            let target = ARMIJO_C1.mul_add(dot(&g, &step), fx);
            if f_trial <= target && f_trial <= fx {
                accepted = Some((trial, f_trial, step));
                break;
            }
            alpha *= 0.5;
        }

        iterations += 1;
        let Some((x_new, f_new, s)) = accepted else {
            if fresh_hessian {
                return finish(x, fx, iterations, problem.evaluations, false, "line search failed");
            }
            // Retry from steepest descent before giving up
            h = identity(n);
            fresh_hessian = true;
            continue;
        };

        let g_new = problem.gradient(&x_new);
        let reduction = (fx - f_new) / fx.abs().max(f_new.abs()).max(f64::MIN_POSITIVE);

        let y: Vec<f64> = g_new.iter().zip(&g).map(|(a, b)| a - b).collect();
        let sy = dot(&s, &y);
        if sy > f64::EPSILON * dot(&s, &s).sqrt() * dot(&y, &y).sqrt() {
            if fresh_hessian {
                // Scale the initial inverse Hessian to the observed curvature
                let scale = sy / dot(&y, &y);
                for (i, row) in h.iter_mut().enumerate() {
                    row[i] = scale;
                }
            }
            bfgs_update(&mut h, &s, &y, 1.0 / sy);
            fresh_hessian = false;
        }

        x = x_new;
        fx = f_new;
        g = g_new;

        if reduction <= options.ftol {
            return finish(x, fx, iterations, problem.evaluations, true, "relative reduction below tolerance");
        }
    }

    finish(x, fx, iterations, problem.evaluations, false, "maximum iterations reached")
}
