//! Point-like instrument response tables.
//!
//! Both tables are tabulated on energy nodes (TeV) and interpolated in
//! `ln E`. The energy dispersion is modelled as a Gaussian in `ln E_reco`
//! around `ln(E_true·(1 + bias))`, which is enough to fold smooth spectra.

use serde::{Deserialize, Serialize};

use crate::math::normal_cdf;

/// Effective area versus true energy, at the run's target offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveAreaTable {
    pub energy_tev: Vec<f64>,
    pub area_m2: Vec<f64>,
}

impl EffectiveAreaTable {
    /// Effective area in cm², log-log interpolated; zero outside the table.
    pub fn evaluate_cm2(&self, energy_tev: f64) -> f64 {
        let e = &self.energy_tev;
        let a = &self.area_m2;
        if e.len() < 2 || energy_tev < e[0] || energy_tev > e[e.len() - 1] {
            return 0.0;
        }
        let i = segment(e, energy_tev);
        let (a0, a1) = (a[i], a[i + 1]);
        let area = if a0 > 0.0 && a1 > 0.0 {
            let t = (energy_tev.ln() - e[i].ln()) / (e[i + 1].ln() - e[i].ln());
            (a0.ln() + t * (a1.ln() - a0.ln())).exp()
        } else {
            let t = (energy_tev - e[i]) / (e[i + 1] - e[i]);
            a0 + t * (a1 - a0)
        };
        area.max(0.0) * 1e4
    }

    /// Largest tabulated area (m²).
    pub fn peak_m2(&self) -> f64 {
        self.area_m2.iter().copied().fold(0.0, f64::max)
    }
}

/// Energy bias and resolution versus true energy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyDispersionTable {
    pub energy_tev: Vec<f64>,
    /// Fractional bias `(E_reco - E_true) / E_true`.
    pub bias: Vec<f64>,
    /// Standard deviation of `ln E_reco`.
    pub resolution: Vec<f64>,
}

impl EnergyDispersionTable {
    pub fn bias_at(&self, energy_tev: f64) -> f64 {
        interp_log_x(&self.energy_tev, &self.bias, energy_tev)
    }

    pub fn resolution_at(&self, energy_tev: f64) -> f64 {
        interp_log_x(&self.energy_tev, &self.resolution, energy_tev)
    }

    /// Probability that an event of true energy `e_true` is reconstructed in
    /// `[e_lo, e_hi)`.
    pub fn migration_probability(&self, e_true: f64, e_lo: f64, e_hi: f64) -> f64 {
        let bias = self.bias_at(e_true).max(-0.99);
        let sigma = self.resolution_at(e_true).max(1e-3);
        let mu = e_true.ln() + (1.0 + bias).ln();
        let p = normal_cdf((e_hi.ln() - mu) / sigma) - normal_cdf((e_lo.ln() - mu) / sigma);
        p.max(0.0)
    }
}

fn segment(x: &[f64], v: f64) -> usize {
    let i = x.partition_point(|&xi| xi <= v);
    i.saturating_sub(1).min(x.len().saturating_sub(2))
}

/// Linear in `y`, logarithmic in `x`, clamped to the end values.
fn interp_log_x(x: &[f64], y: &[f64], v: f64) -> f64 {
    match x.len() {
        0 => 0.0,
        1 => y[0],
        n => {
            if v <= x[0] {
                return y[0];
            }
            if v >= x[n - 1] {
                return y[n - 1];
            }
            let i = segment(x, v);
            let t = (v.ln() - x[i].ln()) / (x[i + 1].ln() - x[i].ln());
            y[i] + t * (y[i + 1] - y[i])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aeff_is_log_log_interpolated_and_zero_outside() {
        let aeff = EffectiveAreaTable {
            energy_tev: vec![0.1, 1.0, 10.0],
            area_m2: vec![1e3, 1e5, 1e5],
        };
        assert!((aeff.evaluate_cm2(10f64.powf(-0.5)) / 1e8 - 1.0).abs() < 1e-9);
        assert!((aeff.evaluate_cm2(3.0) / 1e9 - 1.0).abs() < 1e-9);
        assert_eq!(aeff.evaluate_cm2(0.05), 0.0);
        assert_eq!(aeff.evaluate_cm2(20.0), 0.0);
        assert_eq!(aeff.peak_m2(), 1e5);
    }

    #[test]
    fn migration_probabilities_sum_to_one() {
        let edisp = EnergyDispersionTable {
            energy_tev: vec![0.1, 10.0],
            bias: vec![0.1, 0.0],
            resolution: vec![0.2, 0.1],
        };
        let edges: Vec<f64> = (0..=40).map(|i| 0.01 * 10f64.powf(i as f64 * 0.1)).collect();
        let total: f64 = edges
            .windows(2)
            .map(|w| edisp.migration_probability(1.0, w[0], w[1]))
            .sum();
        assert!((total - 1.0).abs() < 1e-6, "{total}");
        assert!((edisp.bias_at(1.0) - 0.05).abs() < 1e-12);
    }
}
