//! Synthetic observations for demos and tests.
//!
//! Each run gets:
//!
//! - a power-law point source at the target, thinned by the effective area and
//!   smeared by a Gaussian energy dispersion and PSF
//! - isotropic background in a disc around the wobble pointing
//! - a single GTI covering the run
//!
//! Everything is drawn from one seeded `StdRng`, so a config always produces
//! the same event lists.

use std::path::Path;

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::{Normal, Poisson};
use serde::{Deserialize, Serialize};

use crate::domain::{ObservationRecord, SkyCoord};
use crate::error::AppError;
use crate::math::integrate_log_simpson;
use crate::store::{
    EffectiveAreaTable, EnergyDispersionTable, Event, Gti, InMemoryStore, JsonDataStore, RunData,
};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// True-energy range of simulated source photons (TeV).
const SOURCE_E_MIN: f64 = 0.05;
const SOURCE_E_MAX: f64 = 100.0;

/// Reconstructed-energy range and spectral index of the background.
const BKG_E_MIN: f64 = 0.08;
const BKG_E_MAX: f64 = 100.0;
const BKG_INDEX: f64 = 3.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub seed: u64,
    pub object_name: String,
    pub target: SkyCoord,
    pub n_runs: usize,
    pub start_mjd: f64,
    pub run_spacing_days: f64,
    pub livetime_s: f64,
    pub deadc: f64,
    pub wobble_offset_deg: f64,
    /// Source spectrum: `amplitude·(E / 1 TeV)^-index`, cm⁻² s⁻¹ TeV⁻¹.
    pub index: f64,
    pub amplitude: f64,
    /// Background events per deg² per hour of livetime.
    pub background_per_deg2_h: f64,
    pub background_radius_deg: f64,
    pub psf_sigma_deg: f64,
    pub rad_max_deg: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            object_name: "Crab".to_string(),
            target: SkyCoord::new(83.633, 22.0145),
            n_runs: 3,
            start_mjd: 60310.0,
            run_spacing_days: 1.0,
            livetime_s: 1200.0,
            deadc: 0.94,
            wobble_offset_deg: 0.5,
            index: 2.5,
            amplitude: 3.5e-11,
            background_per_deg2_h: 1500.0,
            background_radius_deg: 1.5,
            psf_sigma_deg: 0.04,
            rad_max_deg: 0.1,
        }
    }
}

/// Effective area used for every simulated run.
pub fn default_aeff() -> EffectiveAreaTable {
    EffectiveAreaTable {
        energy_tev: vec![0.05, 0.1, 0.3, 1.0, 10.0, 200.0],
        area_m2: vec![1e2, 2e3, 3e4, 1e5, 2e5, 2e5],
    }
}

/// Energy dispersion used for every simulated run.
pub fn default_edisp() -> EnergyDispersionTable {
    EnergyDispersionTable {
        energy_tev: vec![0.05, 0.1, 0.3, 1.0, 200.0],
        bias: vec![0.3, 0.15, 0.03, 0.0, 0.0],
        resolution: vec![0.25, 0.2, 0.15, 0.12, 0.12],
    }
}

fn validate(cfg: &SimulationConfig) -> Result<(), AppError> {
    if cfg.n_runs == 0 {
        return Err(AppError::configuration("Simulation needs at least one run."));
    }
    let positive = [
        ("livetime", cfg.livetime_s),
        ("deadc", cfg.deadc),
        ("psf sigma", cfg.psf_sigma_deg),
        ("rad_max", cfg.rad_max_deg),
        ("background radius", cfg.background_radius_deg),
    ];
    for (name, v) in positive {
        if !(v.is_finite() && v > 0.0) {
            return Err(AppError::configuration(format!("Simulation {name} must be > 0 (got {v}).")));
        }
    }
    if !(cfg.amplitude >= 0.0 && cfg.background_per_deg2_h >= 0.0 && cfg.index > 1.0) {
        return Err(AppError::configuration(
            "Simulation needs amplitude >= 0, background >= 0 and index > 1.",
        ));
    }
    Ok(())
}

/// Simulate `cfg.n_runs` runs into an in-memory store.
pub fn simulate_observations(cfg: &SimulationConfig) -> Result<InMemoryStore, AppError> {
    validate(cfg)?;
    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let normal = Normal::new(0.0, 1.0).map_err(|e| AppError::numerical(format!("Noise distribution error: {e}")))?;
    let aeff = default_aeff();
    let edisp = default_edisp();
    let peak_cm2 = aeff.peak_m2() * 1e4;

    let mut store = InMemoryStore::new();
    for k in 0..cfg.n_runs {
        let obs_id = 1000 + k as u64;
        let ontime_s = cfg.livetime_s / cfg.deadc;
        let tstart = cfg.start_mjd + k as f64 * cfg.run_spacing_days;
        let tstop = tstart + ontime_s / SECONDS_PER_DAY;
        // Wobble around the target in four directions.
        let pointing = cfg
            .target
            .offset_by(k as f64 * std::f64::consts::FRAC_PI_2, cfg.wobble_offset_deg);

        let mut events = Vec::new();
        let draw_time = |rng: &mut StdRng| rng.gen_range(tstart..tstop);

        // Source: propose from the bare power law at peak area, thin by aeff.
        let n_prop = cfg.amplitude
            * peak_cm2
            * cfg.livetime_s
            * integrate_log_simpson(|e| e.powf(-cfg.index), SOURCE_E_MIN, SOURCE_E_MAX, 128);
        for _ in 0..poisson(&mut rng, n_prop)? {
            let e_true = sample_power_law(&mut rng, cfg.index, SOURCE_E_MIN, SOURCE_E_MAX);
            if rng.r#gen::<f64>() * peak_cm2 > aeff.evaluate_cm2(e_true) {
                continue;
            }
            let bias = edisp.bias_at(e_true).max(-0.99);
            let ln_reco = e_true.ln() + (1.0 + bias).ln() + edisp.resolution_at(e_true) * normal.sample(&mut rng);
            let sep = cfg.psf_sigma_deg * (-2.0 * (1.0 - rng.r#gen::<f64>()).ln()).sqrt();
            let pos = cfg.target.offset_by(rng.gen_range(0.0..std::f64::consts::TAU), sep);
            events.push(Event {
                time_mjd: draw_time(&mut rng),
                energy_tev: ln_reco.exp(),
                ra: pos.ra,
                dec: pos.dec,
            });
        }

        // Background: flat in a disc around the pointing.
        let area = std::f64::consts::PI * cfg.background_radius_deg.powi(2);
        let n_bkg = cfg.background_per_deg2_h * area * cfg.livetime_s / 3600.0;
        for _ in 0..poisson(&mut rng, n_bkg)? {
            let sep = cfg.background_radius_deg * rng.r#gen::<f64>().sqrt();
            let pos = pointing.offset_by(rng.gen_range(0.0..std::f64::consts::TAU), sep);
            events.push(Event {
                time_mjd: draw_time(&mut rng),
                energy_tev: sample_power_law(&mut rng, BKG_INDEX, BKG_E_MIN, BKG_E_MAX),
                ra: pos.ra,
                dec: pos.dec,
            });
        }
        events.sort_by(|a, b| a.time_mjd.total_cmp(&b.time_mjd));

        let record = ObservationRecord {
            obs_id,
            object: cfg.object_name.clone(),
            tstart_mjd: tstart,
            tstop_mjd: tstop,
            livetime_s: cfg.livetime_s,
            ontime_s,
            deadc: cfg.deadc,
            pointing,
            target: cfg.target,
        };
        let data = RunData {
            obs_id,
            events,
            gtis: vec![Gti {
                start_mjd: tstart,
                stop_mjd: tstop,
            }],
            rad_max_deg: Some(cfg.rad_max_deg),
            aeff: aeff.clone(),
            edisp: edisp.clone(),
        };
        tracing::debug!(obs_id, n_events = data.events.len(), "simulated run");
        store.insert(record, data);
    }
    Ok(store)
}

/// Simulate and write a `JsonDataStore` to `dir`.
pub fn write_simulated_store(cfg: &SimulationConfig, dir: &Path) -> Result<InMemoryStore, AppError> {
    let store = simulate_observations(cfg)?;
    let runs: Vec<(ObservationRecord, RunData)> = store
        .runs()
        .map(|(r, d)| (r.clone(), d.clone()))
        .collect();
    JsonDataStore::write(dir, &runs)?;
    Ok(store)
}

fn poisson(rng: &mut StdRng, mean: f64) -> Result<usize, AppError> {
    if mean <= 0.0 {
        return Ok(0);
    }
    let dist = Poisson::new(mean).map_err(|e| AppError::numerical(format!("Poisson distribution error: {e}")))?;
    let n: f64 = dist.sample(rng);
    Ok(n as usize)
}

/// Inverse-CDF draw from `E^-index` on `[e_min, e_max]` (index ≠ 1).
fn sample_power_law(rng: &mut StdRng, index: f64, e_min: f64, e_max: f64) -> f64 {
    let g = 1.0 - index;
    let (a, b) = (e_min.powf(g), e_max.powf(g));
    let u: f64 = rng.r#gen();
    (a + u * (b - a)).powf(1.0 / g)
}
