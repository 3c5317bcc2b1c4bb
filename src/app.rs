//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - initialises console logging
//! - builds the analysis configuration once
//! - runs the analysis pipeline or the simulator
//! - prints a short summary

use std::path::Path;

use chrono::NaiveDate;
use clap::Parser;

use crate::cli::{AnalyseArgs, Command, SimulateArgs};
use crate::domain::{
    AnalysisConfig, BackgroundMethod, EnergyAxisOptions, FluxPointOptions, GeometryOptions, LightCurveOptions,
    OutputOptions, ReductionOptions, SafeMaskOptions, SelectionOptions, TimeBinOptions,
};
use crate::error::AppError;
use crate::geometry::{BrightStarCatalog, CsvStarCatalog, VizierCatalog};
use crate::io::OutputLayout;
use crate::models::ModelParameterConfig;
use crate::report::FileReporter;
use crate::sim::{SimulationConfig, write_simulated_store};
use crate::store::JsonDataStore;

pub mod pipeline;

/// MJD 0 is 1858-11-17.
const MJD_EPOCH: (i32, u32, u32) = (1858, 11, 17);

/// Entry point for the `dl5` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();
    crate::telemetry::init_tracing(cli.log_json, cli.log_level.as_level());

    match cli.command {
        Command::Analyse(args) => handle_analyse(&args),
        Command::Simulate(args) => handle_simulate(&args),
    }
}

fn handle_analyse(args: &AnalyseArgs) -> Result<(), AppError> {
    let config = analysis_config_from_args(args)?;
    let prepared = pipeline::preflight(&config)?;
    let store = JsonDataStore::open(&config.dl3_path)?;
    let catalog: Box<dyn BrightStarCatalog> = match &config.geometry.star_catalog_file {
        Some(path) => Box::new(CsvStarCatalog::open(path)?),
        None => Box::new(VizierCatalog::from_env()),
    };

    let layout = OutputLayout::new(&config.output.analysis_dir);
    let mut reporter = FileReporter::open(&layout.log())?;
    tracing::info!(report = %reporter.path().display(), "analysis started");

    let output = pipeline::run_prepared(&config, prepared, &store, catalog.as_ref(), &mut reporter)?;

    println!("{}", crate::report::format_fit_result(&output.spectrum.fit));
    println!("{}", crate::report::format_integral_flux(&output.spectrum.integral_flux));
    println!("{}", crate::report::format_flux_points(&output.spectrum.flux_points));
    if !output.light_curve.is_empty() {
        println!("{}", crate::report::format_light_curve(&output.light_curve));
    }
    if !output.variability.is_empty() {
        println!("{}", crate::report::format_variability(&output.variability));
    }
    println!("Products written to {}", layout.root().display());
    Ok(())
}

fn handle_simulate(args: &SimulateArgs) -> Result<(), AppError> {
    let cfg = SimulationConfig {
        seed: args.seed,
        object_name: args.object_name.clone(),
        target: args.target,
        n_runs: args.n_runs,
        start_mjd: args.start_mjd,
        run_spacing_days: args.run_spacing_days,
        livetime_s: args.livetime,
        index: args.index,
        amplitude: args.amplitude,
        ..SimulationConfig::default()
    };
    let store = write_simulated_store(&cfg, &args.out)?;
    let n_events: usize = store.runs().map(|(_, d)| d.events.len()).sum();
    println!(
        "Wrote {} runs ({n_events} events) to {}",
        store.runs().count(),
        args.out.display()
    );
    Ok(())
}

/// Convert CLI flags into the immutable analysis configuration.
pub fn analysis_config_from_args(args: &AnalyseArgs) -> Result<AnalysisConfig, AppError> {
    let model_parameters = match &args.model_parameters {
        Some(path) => read_model_parameters(path)?,
        None => ModelParameterConfig::default(),
    };

    Ok(AnalysisConfig {
        dl3_path: args.dl3_path.clone(),
        selection: SelectionOptions {
            object_name: args.object_name.clone(),
            run_list: args.run_list.clone(),
            run_exclude_list: args.run_exclude_list.clone(),
            from_mjd: Some(date_to_mjd(args.from_date)?),
            // Whole end day is included.
            to_mjd: Some(date_to_mjd(args.to_date)? + 1.0),
            include_nearby: args.nearby,
            nearby_radius_deg: args.nearby_radius,
        },
        energy: EnergyAxisOptions {
            energy_min_tev: args.energy_axis_min,
            energy_max_tev: args.energy_axis_max,
            n_bins: args.energy_axis_bins,
        },
        geometry: GeometryOptions {
            target: args.target,
            on_region_radius_deg: args.on_region_radius,
            exclusion_file: args.exclusion_file.clone(),
            star_catalog_file: args.star_catalog.clone(),
        },
        reduction: ReductionOptions {
            background: BackgroundMethod::from_kind(args.background),
            safe_mask: SafeMaskOptions {
                offset_max_deg: args.safe_offset_max,
                aeff_percent: args.safe_aeff_percent,
                bias_percent: args.safe_bias_percent,
            },
        },
        spectral_model: args.spectral_model.clone(),
        model_parameters,
        flux_points: FluxPointOptions {
            norm_min: args.norm_min,
            norm_max: args.norm_max,
            norm_n_values: args.norm_n_values,
            n_sigma: args.n_sigma,
            n_sigma_ul: args.n_sigma_ul,
            sqrt_ts_threshold_ul: args.sqrt_ts_threshold_ul,
        },
        integral_flux_min_energy_tev: args.integral_flux_min_energy,
        light_curve: LightCurveOptions {
            enabled: args.light_curve,
            bin_duration_days: args.light_curve_bin_days,
            start_mjd: None,
            energy_min_tev: args.light_curve_min_energy,
            energy_max_tev: args.light_curve_max_energy,
            n_sigma_ul: args.light_curve_n_sigma_ul,
        },
        time_bins: TimeBinOptions {
            time_bin_file: args.time_bin_file.clone(),
            time_bin_days: args.time_bin_days,
        },
        output: OutputOptions {
            analysis_dir: args.analysis_dir.clone(),
            plots: !args.no_plots,
            debug: args.debug,
        },
    })
}

fn read_model_parameters(path: &Path) -> Result<ModelParameterConfig, AppError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        AppError::configuration(format!("Failed to read model parameters '{}': {e}", path.display()))
    })?;
    serde_json::from_str(&text).map_err(|e| {
        AppError::configuration(format!("Invalid model parameters '{}': {e}", path.display()))
    })
}

/// Modified Julian Date at 00:00 UTC of `date`.
pub fn date_to_mjd(date: NaiveDate) -> Result<f64, AppError> {
    let (y, m, d) = MJD_EPOCH;
    let epoch = NaiveDate::from_ymd_opt(y, m, d)
        .ok_or_else(|| AppError::numerical("Invalid MJD epoch."))?;
    Ok(date.signed_duration_since(epoch).num_days() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;

    fn analyse_args(extra: &[&str]) -> AnalyseArgs {
        let mut argv = vec!["dl5", "analyse", "--object", "Crab"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Command::Analyse(args) => args,
            Command::Simulate(_) => panic!("expected analyse"),
        }
    }

    #[test]
    fn mjd_of_known_dates() {
        assert_eq!(date_to_mjd(NaiveDate::from_ymd_opt(1858, 11, 17).unwrap()).unwrap(), 0.0);
        assert_eq!(date_to_mjd(NaiveDate::from_ymd_opt(2000, 1, 1).unwrap()).unwrap(), 51544.0);
    }

    #[test]
    fn config_carries_flags_into_component_options() {
        let args = analyse_args(&["--from-date", "2024-01-01", "--to-date", "2024-01-31", "--no-plots"]);
        let cfg = analysis_config_from_args(&args).unwrap();
        assert_eq!(cfg.selection.from_mjd, Some(60310.0));
        assert_eq!(cfg.selection.to_mjd, Some(60341.0));
        assert_eq!(cfg.energy.n_bins, 10);
        assert!(!cfg.output.plots);
        assert_eq!(cfg.model_parameters, ModelParameterConfig::default());
    }

    #[test]
    fn partial_model_parameter_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        std::fs::write(&path, r#"{"power_law": {"index": 2.7, "amplitude": 3e-11, "reference": 1.0}}"#).unwrap();
        let arg = path.to_string_lossy().to_string();
        let cfg = analysis_config_from_args(&analyse_args(&["--model-parameters", &arg])).unwrap();
        assert_eq!(cfg.model_parameters.power_law.index, 2.7);
        assert_eq!(
            cfg.model_parameters.log_parabola,
            ModelParameterConfig::default().log_parabola
        );
    }

    #[test]
    fn unreadable_model_parameters_are_configuration_errors() {
        let args = analyse_args(&["--model-parameters", "/nonexistent/params.json"]);
        let err = analysis_config_from_args(&args).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
