//! Special functions and quadrature used by the response folding.

/// Complementary error function.
///
/// Chebyshev fit from Numerical Recipes (`erfcc`), fractional error < 1.2e-7,
/// which is far below the precision of any IRF table.
pub fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -z * z - 1.265_512_23
        + t * (1.000_023_68
            + t * (0.374_091_96
                + t * (0.096_784_18
                    + t * (-0.186_288_06
                        + t * (0.278_868_07
                            + t * (-1.135_203_98
                                + t * (1.488_515_87 + t * (-0.822_152_23 + t * 0.170_872_77))))))));
    let ans = t * poly.exp();
    if x >= 0.0 { ans } else { 2.0 - ans }
}

/// Standard normal cumulative distribution.
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / std::f64::consts::SQRT_2)
}

/// Integrate `f` over `[a, b]` with composite Simpson in `ln E`.
///
/// Spectra are close to power laws, so `∫ f dE = ∫ f(E)·E d(ln E)` is very
/// smooth in log space. `n` is rounded up to an even number of intervals.
pub fn integrate_log_simpson(f: impl Fn(f64) -> f64, a: f64, b: f64, n: usize) -> f64 {
    if !(a > 0.0 && b > a) {
        return 0.0;
    }
    let n = (n.max(2) + 1) & !1;
    let la = a.ln();
    let h = (b.ln() - la) / n as f64;
    let g = |u: f64| {
        let e = u.exp();
        f(e) * e
    };

    let mut sum = g(la) + g(la + h * n as f64);
    for i in 1..n {
        let w = if i % 2 == 1 { 4.0 } else { 2.0 };
        sum += w * g(la + h * i as f64);
    }
    sum * h / 3.0
}

/// `x·ln(x)` with the `x → 0` limit.
pub fn xlogx(x: f64) -> f64 {
    if x > 0.0 { x * x.ln() } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_cdf_reference_values() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-7);
        assert!((normal_cdf(1.0) - 0.841_344_746).abs() < 1e-6);
        assert!((normal_cdf(-2.0) - 0.022_750_132).abs() < 1e-6);
    }

    #[test]
    fn log_simpson_integrates_power_law() {
        // ∫_1^10 E^-2 dE = 0.9
        let v = integrate_log_simpson(|e| e.powf(-2.0), 1.0, 10.0, 32);
        assert!((v - 0.9).abs() < 1e-6, "got {v}");
    }
}
