//! Numerical minimisation of likelihood deviances.
//!
//! The joint fit minimises a total Wstat deviance over a handful of scaled
//! spectral parameters. The objective is cheap to evaluate, so we use a
//! Levenberg–Marquardt damped Newton iteration with finite-difference
//! derivatives:
//!
//! - gradient by central differences
//! - Hessian by second differences (also reused for the covariance)
//! - steps solved with the SVD helper from `ols`
//! - non-finite objective values are treated as infeasible and rejected
//!
//! One-dimensional problems (normalisation scans) use golden-section search and
//! bisection for likelihood-profile crossings.

use nalgebra::{DMatrix, DVector};

use crate::math::solve_least_squares;

/// Iteration controls.
#[derive(Debug, Clone)]
pub struct MinimizeOptions {
    pub max_iter: usize,
    /// Stop when an accepted step improves the objective by less than this.
    pub tolerance: f64,
    /// Gradient norm below which the point is accepted as a minimum.
    pub gradient_tolerance: f64,
    pub gradient_step: f64,
    pub hessian_step: f64,
    pub initial_lambda: f64,
}

impl Default for MinimizeOptions {
    fn default() -> Self {
        Self {
            max_iter: 200,
            tolerance: 1e-7,
            gradient_tolerance: 1e-3,
            gradient_step: 1e-6,
            hessian_step: 1e-3,
            initial_lambda: 1e-3,
        }
    }
}

/// Outcome of a minimisation.
#[derive(Debug, Clone)]
pub struct Minimum {
    pub x: Vec<f64>,
    pub fval: f64,
    pub converged: bool,
    pub n_iter: usize,
    pub n_fev: usize,
    pub message: String,
    /// Finite-difference Hessian at `x` (objective units).
    pub hessian: Option<DMatrix<f64>>,
}

struct Counted<'a> {
    f: &'a dyn Fn(&[f64]) -> f64,
    n: std::cell::Cell<usize>,
}

impl Counted<'_> {
    fn eval(&self, x: &[f64]) -> f64 {
        self.n.set(self.n.get() + 1);
        let v = (self.f)(x);
        if v.is_finite() { v } else { f64::INFINITY }
    }
}

/// Minimise `f` starting from `x0`.
///
/// `bounds` is one `(lo, hi)` pair per coordinate; use infinities for none.
pub fn minimize(
    f: &dyn Fn(&[f64]) -> f64,
    x0: &[f64],
    bounds: &[(f64, f64)],
    opts: &MinimizeOptions,
) -> Minimum {
    let obj = Counted {
        f,
        n: std::cell::Cell::new(0),
    };
    let n = x0.len();
    let mut x: Vec<f64> = x0
        .iter()
        .enumerate()
        .map(|(i, &v)| clamp_to(bounds, i, v))
        .collect();
    let mut fx = obj.eval(&x);

    if !fx.is_finite() {
        return Minimum {
            x,
            fval: fx,
            converged: false,
            n_iter: 0,
            n_fev: obj.n.get(),
            message: "Objective is not finite at the starting point.".to_string(),
            hessian: None,
        };
    }
    if n == 0 {
        return Minimum {
            x,
            fval: fx,
            converged: true,
            n_iter: 0,
            n_fev: obj.n.get(),
            message: "No free parameters.".to_string(),
            hessian: None,
        };
    }

    let mut lambda = opts.initial_lambda;
    let mut converged = false;
    let mut message = format!("Maximum number of iterations ({}) reached.", opts.max_iter);
    let mut n_iter = 0;

    while n_iter < opts.max_iter {
        n_iter += 1;
        let g = gradient(&obj, &x, opts.gradient_step);
        let mut h = hessian(&obj, &x, fx, opts.hessian_step);

        if !g.iter().all(|v| v.is_finite()) {
            message = "Gradient is not finite.".to_string();
            break;
        }
        if !h.iter().all(|v| v.is_finite()) {
            // Next to an infeasible region: fall back to damped gradient descent.
            h = DMatrix::identity(n, n);
        }
        if g.norm() < opts.gradient_tolerance {
            converged = true;
            message = "Gradient below tolerance.".to_string();
            break;
        }

        let neg_g = -g.clone();
        let mut accepted = None;
        while lambda < 1e12 {
            let mut a = h.clone();
            for i in 0..n {
                a[(i, i)] += lambda * h[(i, i)].abs().max(1e-8);
            }
            let Some(delta) = solve_least_squares(&a, &neg_g) else {
                lambda *= 10.0;
                continue;
            };
            let xn: Vec<f64> = (0..n)
                .map(|i| clamp_to(bounds, i, x[i] + delta[i]))
                .collect();
            let fn_ = obj.eval(&xn);
            if fn_ < fx {
                accepted = Some((xn, fn_));
                lambda = (lambda / 10.0).max(1e-12);
                break;
            }
            lambda *= 10.0;
        }

        match accepted {
            Some((xn, fn_)) => {
                let improvement = fx - fn_;
                x = xn;
                fx = fn_;
                if improvement < opts.tolerance {
                    converged = true;
                    message = "Objective change below tolerance.".to_string();
                    break;
                }
            }
            None => {
                // No descent direction left at machine precision.
                converged = g.norm() < opts.gradient_tolerance * 1e3;
                message = if converged {
                    "No further improvement possible.".to_string()
                } else {
                    "Line search failed to find a descent step.".to_string()
                };
                break;
            }
        }
    }

    let hess = hessian(&obj, &x, fx, opts.hessian_step);
    Minimum {
        x,
        fval: fx,
        converged,
        n_iter,
        n_fev: obj.n.get(),
        message,
        hessian: hess.iter().all(|v| v.is_finite()).then_some(hess),
    }
}

fn clamp_to(bounds: &[(f64, f64)], i: usize, v: f64) -> f64 {
    match bounds.get(i) {
        Some(&(lo, hi)) => v.clamp(lo, hi),
        None => v,
    }
}

fn gradient(obj: &Counted<'_>, x: &[f64], h: f64) -> DVector<f64> {
    let mut g = DVector::zeros(x.len());
    let mut xp = x.to_vec();
    for i in 0..x.len() {
        let xi = x[i];
        xp[i] = xi + h;
        let fp = obj.eval(&xp);
        xp[i] = xi - h;
        let fm = obj.eval(&xp);
        xp[i] = xi;
        g[i] = (fp - fm) / (2.0 * h);
    }
    g
}

fn hessian(obj: &Counted<'_>, x: &[f64], fx: f64, h: f64) -> DMatrix<f64> {
    let n = x.len();
    let mut m = DMatrix::zeros(n, n);
    let mut xp = x.to_vec();
    for i in 0..n {
        let xi = x[i];
        xp[i] = xi + h;
        let fp = obj.eval(&xp);
        xp[i] = xi - h;
        let fm = obj.eval(&xp);
        xp[i] = xi;
        m[(i, i)] = (fp - 2.0 * fx + fm) / (h * h);

        for j in (i + 1)..n {
            let xj = x[j];
            let mut corner = |si: f64, sj: f64| {
                xp[i] = xi + si * h;
                xp[j] = xj + sj * h;
                obj.eval(&xp)
            };
            let fpp = corner(1.0, 1.0);
            let fpm = corner(1.0, -1.0);
            let fmp = corner(-1.0, 1.0);
            let fmm = corner(-1.0, -1.0);
            xp[i] = xi;
            xp[j] = xj;
            let v = (fpp - fpm - fmp + fmm) / (4.0 * h * h);
            m[(i, j)] = v;
            m[(j, i)] = v;
        }
    }
    m
}

/// Golden-section search for the minimum of `f` on `[a, b]`.
pub fn golden_section(f: impl Fn(f64) -> f64, mut a: f64, mut b: f64, tol: f64) -> (f64, f64) {
    const INV_PHI: f64 = 0.618_033_988_749_894_8;
    let eval = |x: f64| {
        let v = f(x);
        if v.is_finite() { v } else { f64::INFINITY }
    };

    let mut c = b - INV_PHI * (b - a);
    let mut d = a + INV_PHI * (b - a);
    let mut fc = eval(c);
    let mut fd = eval(d);
    let mut iter = 0;
    while (b - a).abs() > tol && iter < 200 {
        iter += 1;
        if fc < fd {
            b = d;
            d = c;
            fd = fc;
            c = b - INV_PHI * (b - a);
            fc = eval(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + INV_PHI * (b - a);
            fd = eval(d);
        }
    }
    let x = 0.5 * (a + b);
    (x, eval(x))
}

/// Find `x` in `[lo, hi]` with `f(x) == target`, assuming `f(lo) - target`
/// and `f(hi) - target` have opposite signs.
pub fn bisect_crossing(f: impl Fn(f64) -> f64, mut lo: f64, mut hi: f64, target: f64, tol: f64) -> Option<f64> {
    let g = |x: f64| f(x) - target;
    let mut glo = g(lo);
    let ghi = g(hi);
    if !(glo.is_finite() || ghi.is_finite()) {
        return None;
    }
    // Infeasible (infinite) values count as "above target".
    let sign = |v: f64| if v.is_nan() { 1.0 } else { v.signum() };
    if sign(glo) == sign(ghi) {
        return None;
    }
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        let gm = g(mid);
        if sign(gm) == sign(glo) {
            lo = mid;
            glo = gm;
        } else {
            hi = mid;
        }
        if (hi - lo).abs() < tol {
            break;
        }
    }
    Some(0.5 * (lo + hi))
}
