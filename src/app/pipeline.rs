//! Shared analysis chain.
//!
//! One place owns the DL3 -> DL5 workflow:
//! run selection -> energy axes + geometry -> per-run datasets -> significance
//! -> joint fit -> flux points -> integral flux -> light curve -> time bins.
//!
//! The same `run_interval` sub-chain serves the all-data spectrum and every
//! spectral-variability time bin, so both always agree on the same data.

use std::path::Path;

use crate::domain::{AnalysisConfig, CircleRegion, ObservationRecord, TimeBin};
use crate::error::AppError;
use crate::fit::{
    FitResult, FluxPoint, INTEGRAL_FLUX_MAX_ENERGY_TEV, IntegralFlux, LightCurvePoint, estimate_flux_points,
    estimate_light_curve, fit_joint, integral_flux, light_curve_intervals, mean_flux, report_fit,
    report_flux_points,
};
use crate::geometry::{BrightStarCatalog, EnergyAxes, Geometry, build_energy_axes, build_geometry, read_exclusion_file};
use crate::io::{OutputLayout, SpectrumPaths, ensure_dir, write_csv, write_json, write_variability_csv};
use crate::math::MinimizeOptions;
use crate::models::{SpectralModel, build_spectral_model, parse_model_expr};
use crate::reduction::{DatasetCollection, DatasetMaker};
use crate::report::{Reporter, format_fit_result, format_info_table, format_run_diagnostics, should_emit_detail};
use crate::selection::{RunFilter, select_runs, target_from_table};
use crate::stats::{InfoRow, RunDiagnostics, cumulative_info_table, per_run_info_table, run_diagnostics};
use crate::store::{DataStore, ObservationSet};
use crate::timebins::{VariabilityRow, auto_time_bins, orchestrate, parameter_correlation, parameter_drift, read_time_bin_file};

const STAGE: &str = "pipeline";

/// Products of one interval (all data, or one time bin).
#[derive(Debug, Clone)]
pub struct IntervalOutput {
    pub info_not_safe: Vec<InfoRow>,
    pub info_safe: Vec<InfoRow>,
    pub fit: FitResult,
    pub flux_points: Vec<FluxPoint>,
    pub integral_flux: IntegralFlux,
    /// Safe-masked datasets with the fitted model attached.
    pub collection: DatasetCollection,
}

/// Everything a full analysis produced.
#[derive(Debug, Clone)]
pub struct AnalysisOutput {
    pub selected: Vec<ObservationRecord>,
    pub diagnostics: Option<RunDiagnostics>,
    pub spectrum: IntervalOutput,
    pub light_curve: Vec<LightCurvePoint>,
    pub variability: Vec<VariabilityRow>,
}

/// Inputs derived from configuration alone, validated before any data is read.
#[derive(Debug, Clone)]
pub struct Preflight {
    pub model: SpectralModel,
    pub axes: EnergyAxes,
    pub user_regions: Vec<CircleRegion>,
    pub time_bins: Option<Vec<TimeBin>>,
}

/// Check every configuration-only input; fails with a configuration error.
pub fn preflight(cfg: &AnalysisConfig) -> Result<Preflight, AppError> {
    let expr = parse_model_expr(&cfg.spectral_model)?;
    let model = build_spectral_model(&expr, &cfg.model_parameters, &cfg.selection.object_name)?;
    let axes = build_energy_axes(&cfg.energy)?;
    let user_regions = match &cfg.geometry.exclusion_file {
        Some(path) => read_exclusion_file(path)?,
        None => Vec::new(),
    };
    let time_bins = resolve_time_bins_file(cfg)?;
    Ok(Preflight {
        model,
        axes,
        user_regions,
        time_bins,
    })
}

/// Run the complete analysis and write every product under the analysis directory.
pub fn run_analysis(
    cfg: &AnalysisConfig,
    store: &dyn DataStore,
    catalog: &dyn BrightStarCatalog,
    reporter: &mut dyn Reporter,
) -> Result<AnalysisOutput, AppError> {
    let prepared = preflight(cfg)?;
    run_prepared(cfg, prepared, store, catalog, reporter)
}

/// Same as [`run_analysis`] with the configuration already checked.
pub fn run_prepared(
    cfg: &AnalysisConfig,
    prepared: Preflight,
    store: &dyn DataStore,
    catalog: &dyn BrightStarCatalog,
    reporter: &mut dyn Reporter,
) -> Result<AnalysisOutput, AppError> {
    let Preflight {
        model,
        axes,
        user_regions,
        time_bins,
    } = prepared;

    let layout = OutputLayout::new(&cfg.output.analysis_dir);
    ensure_dir(layout.root())?;

    let table = store.observation_table();
    let target = cfg
        .geometry
        .target
        .or_else(|| target_from_table(&table, &cfg.selection.object_name))
        .ok_or_else(|| {
            AppError::resolution(format!(
                "No sky position for '{}': give --target or select an object present in the run table.",
                cfg.selection.object_name
            ))
        })?;
    reporter.record(STAGE, "target", &target.to_string());

    let filter = RunFilter::from_options(&cfg.selection, Some(target))?;
    let selected = select_runs(&table, &filter, reporter)?;
    let diagnostics = run_diagnostics(&selected);
    if let Some(d) = &diagnostics {
        reporter.block("runs", &format_run_diagnostics(d));
    }

    let observations = ObservationSet::load(store, &selected)?;
    reporter.record(
        STAGE,
        "energy axes",
        &format!(
            "reco {:.3}-{:.3} TeV ({} bins), true {:.3}-{:.3} TeV ({} bins)",
            axes.reco.e_min(),
            axes.reco.e_max(),
            axes.reco.n_bins(),
            axes.true_energy.e_min(),
            axes.true_energy.e_max(),
            axes.true_energy.n_bins()
        ),
    );
    let geometry = build_geometry(target, &cfg.geometry, axes, &user_regions, &observations, catalog, reporter)?;
    write_json(&layout.config(), cfg)?;

    let spectrum_paths = SpectrumPaths::new(layout.spectrum_dir());
    let spectrum = run_interval(cfg, &geometry, &model, &observations, &spectrum_paths, "all data", reporter)?;

    write_csv(&layout.on_off_counts(), &per_run_info_table(&spectrum.collection))?;
    if cfg.output.plots {
        plot_run_diagnostics(cfg, &layout, &geometry, &observations, &spectrum, reporter)?;
    }

    let light_curve = if cfg.light_curve.enabled {
        run_light_curve(cfg, &layout, &selected, &spectrum, reporter)?
    } else {
        Vec::new()
    };

    let bins = match time_bins {
        Some(bins) => bins,
        None => match cfg.time_bins.time_bin_days {
            Some(days) => {
                let starts: Vec<f64> = selected.iter().map(|r| r.tstart_mjd).collect();
                auto_time_bins(&starts, days)?
            }
            None => Vec::new(),
        },
    };
    let variability = if bins.is_empty() {
        Vec::new()
    } else {
        run_time_bins(cfg, &layout, &geometry, &model, &observations, &bins, reporter)?
    };

    Ok(AnalysisOutput {
        selected,
        diagnostics,
        spectrum,
        light_curve,
        variability,
    })
}

fn resolve_time_bins_file(cfg: &AnalysisConfig) -> Result<Option<Vec<TimeBin>>, AppError> {
    cfg.time_bins
        .time_bin_file
        .as_deref()
        .map(read_time_bin_file)
        .transpose()
}

/// Reduce, fit and estimate flux points for one set of runs; writes the
/// interval's tables under `paths`.
pub fn run_interval(
    cfg: &AnalysisConfig,
    geometry: &Geometry,
    model: &SpectralModel,
    observations: &ObservationSet,
    paths: &SpectrumPaths,
    label: &str,
    reporter: &mut dyn Reporter,
) -> Result<IntervalOutput, AppError> {
    ensure_dir(&paths.dir)?;
    let maker = DatasetMaker::new(geometry, &cfg.reduction);

    // Two independent passes: statistics before and after the safe mask.
    let not_safe = maker.make_collection(observations, false, reporter)?;
    let mut safe = maker.make_collection(observations, true, reporter)?;

    let info_not_safe = cumulative_info_table(&not_safe);
    let info_safe = cumulative_info_table(&safe);
    write_csv(&paths.significance_not_safe(), &info_not_safe)?;
    write_csv(&paths.significance_safe(), &info_safe)?;
    reporter.block(STAGE, &format!("{label} significance (no safe mask):\n{}", format_info_table(&info_not_safe)));
    reporter.block(STAGE, &format!("{label} significance (safe mask):\n{}", format_info_table(&info_safe)));
    if let Some(last) = info_safe.last() {
        reporter.record(
            STAGE,
            &format!("{label} significance"),
            &format!("{:.2} sigma, excess {:.1}", last.sqrt_ts, last.excess),
        );
    }

    let fit = fit_joint(&mut safe, model, &MinimizeOptions::default())?;
    report_fit(&fit, label, reporter);
    reporter.block(STAGE, &format_fit_result(&fit));
    write_json(&paths.fit_result(), &fit)?;

    let flux_points = estimate_flux_points(&safe, &fit, &cfg.flux_points);
    report_flux_points(&flux_points, reporter);
    write_csv(&paths.flux_points(), &flux_points)?;

    let integral = integral_flux(&fit, cfg.integral_flux_min_energy_tev, INTEGRAL_FLUX_MAX_ENERGY_TEV);
    reporter.record(
        STAGE,
        &format!("{label} integral flux"),
        &crate::report::format_integral_flux(&integral),
    );

    if cfg.output.plots {
        let title = format!("{} ({label})", model.source_name);
        warn_on_plot_error(
            crate::plot::plot_flux_points(&paths.plot("flux_points"), &flux_points, &fit.model, &title),
            reporter,
        );
        warn_on_plot_error(
            crate::plot::plot_significance(&paths.plot("significance_not_safe"), &info_not_safe, "No safe mask"),
            reporter,
        );
        warn_on_plot_error(
            crate::plot::plot_significance(&paths.plot("significance_safe"), &info_safe, "Safe mask"),
            reporter,
        );
    }

    Ok(IntervalOutput {
        info_not_safe,
        info_safe,
        fit,
        flux_points,
        integral_flux: integral,
        collection: safe,
    })
}

/// Per-run region maps and predicted-vs-excess plots for the first runs.
fn plot_run_diagnostics(
    cfg: &AnalysisConfig,
    layout: &OutputLayout,
    geometry: &Geometry,
    observations: &ObservationSet,
    spectrum: &IntervalOutput,
    reporter: &mut dyn Reporter,
) -> Result<(), AppError> {
    let dir = layout.diagnostics_dir();
    ensure_dir(&dir)?;
    let datasets = &spectrum.collection.datasets;
    for (i, (ds, obs)) in datasets.iter().zip(&observations.observations).enumerate() {
        if !should_emit_detail(i, cfg.output.debug) {
            reporter.record(
                STAGE,
                "diagnostic plots",
                &format!("limited to the first {i} runs (use --debug for all)"),
            );
            break;
        }
        warn_on_plot_error(
            crate::plot::plot_regions(
                &dir.join(format!("regions_{}.svg", ds.obs_id)),
                geometry.target,
                obs.record.pointing,
                &ds.on_region,
                &ds.off_regions,
                &geometry.exclusion_regions,
            ),
            reporter,
        );
        if let Some(npred) = spectrum.fit.npred.get(i) {
            warn_on_plot_error(
                crate::plot::plot_excess_vs_npred(
                    &dir.join(format!("npred_{}.svg", ds.obs_id)),
                    ds,
                    npred,
                    &spectrum.collection.axes,
                ),
                reporter,
            );
        }
    }
    Ok(())
}

fn run_light_curve(
    cfg: &AnalysisConfig,
    layout: &OutputLayout,
    selected: &[ObservationRecord],
    spectrum: &IntervalOutput,
    reporter: &mut dyn Reporter,
) -> Result<Vec<LightCurvePoint>, AppError> {
    let intervals = light_curve_intervals(selected, &cfg.light_curve)?;
    let e_min = cfg.light_curve.energy_min_tev.unwrap_or(cfg.energy.energy_min_tev);
    let points = estimate_light_curve(
        &spectrum.collection,
        &spectrum.fit,
        &intervals,
        e_min,
        cfg.light_curve.energy_max_tev,
        &cfg.light_curve,
        &cfg.flux_points,
    );

    ensure_dir(&layout.light_curve_dir())?;
    write_csv(&layout.light_curve(), &points)?;
    let mean = mean_flux(&points);
    reporter.record(
        "light curve",
        "intervals",
        &format!(
            "{} ({} upper limits)",
            points.len(),
            points.iter().filter(|p| p.is_ul).count()
        ),
    );
    reporter.record(
        "light curve",
        "mean flux",
        &mean.map(|m| format!("{m:.4e} cm-2 s-1")).unwrap_or_else(|| "-".to_string()),
    );
    reporter.block("light curve", &crate::report::format_light_curve(&points));
    if cfg.output.plots {
        warn_on_plot_error(
            crate::plot::plot_light_curve(&layout.light_curve_dir().join("light_curve.svg"), &points, mean),
            reporter,
        );
    }
    Ok(points)
}

fn run_time_bins(
    cfg: &AnalysisConfig,
    layout: &OutputLayout,
    geometry: &Geometry,
    model: &SpectralModel,
    observations: &ObservationSet,
    bins: &[TimeBin],
    reporter: &mut dyn Reporter,
) -> Result<Vec<VariabilityRow>, AppError> {
    ensure_dir(&layout.variability_dir())?;
    let outcomes = orchestrate(bins, observations, reporter, |bin, subset, rep| {
        let paths = SpectrumPaths::new(layout.time_bin_dir(bin));
        run_interval(cfg, geometry, model, subset, &paths, &bin.label(), rep).map(|out| out.fit)
    })?;

    let rows = parameter_drift(&outcomes);
    write_variability_csv(&layout.variability(), &rows)?;
    reporter.block("time bins", &crate::report::format_variability(&rows));

    if cfg.output.plots && !rows.is_empty() {
        let names: Vec<String> = rows[0].values.iter().map(|v| v.name.clone()).collect();
        for name in &names {
            warn_on_plot_error(
                crate::plot::plot_parameter_drift(&plot_path(&layout.variability_dir(), name), &rows, name),
                reporter,
            );
        }
        for (a, b) in names.iter().zip(names.iter().skip(1)) {
            let r = parameter_correlation(&rows, a, b);
            if let Some(r) = r {
                reporter.record("time bins", &format!("correlation {a} / {b}"), &format!("{r:.3}"));
            }
            warn_on_plot_error(
                crate::plot::plot_parameter_scatter(
                    &plot_path(&layout.variability_dir(), &format!("{a}_vs_{b}")),
                    &rows,
                    a,
                    b,
                    r,
                ),
                reporter,
            );
        }
    }
    Ok(rows)
}

fn plot_path(dir: &Path, name: &str) -> std::path::PathBuf {
    let safe: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    dir.join(format!("{safe}.svg"))
}

/// Plots never abort an analysis.
fn warn_on_plot_error(result: Result<(), AppError>, reporter: &mut dyn Reporter) {
    if let Err(e) = result {
        reporter.warn("plots", e.message());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        BackgroundKind, BackgroundMethod, EnergyAxisOptions, FluxPointOptions, GeometryOptions, LightCurveOptions,
        OutputOptions, ReductionOptions, SafeMaskOptions, SelectionOptions, TimeBinOptions,
    };
    use crate::geometry::CsvStarCatalog;
    use crate::models::ModelParameterConfig;
    use crate::report::MemoryReporter;
    use crate::sim::{SimulationConfig, simulate_observations};

    fn config(adir: &Path, sim: &SimulationConfig) -> AnalysisConfig {
        AnalysisConfig {
            dl3_path: adir.join("unused"),
            selection: SelectionOptions {
                object_name: sim.object_name.clone(),
                run_list: None,
                run_exclude_list: None,
                from_mjd: None,
                to_mjd: None,
                include_nearby: false,
                nearby_radius_deg: 2.0,
            },
            energy: EnergyAxisOptions {
                energy_min_tev: 0.3,
                energy_max_tev: 30.0,
                n_bins: 6,
            },
            geometry: GeometryOptions {
                target: None,
                on_region_radius_deg: None,
                exclusion_file: None,
                star_catalog_file: None,
            },
            reduction: ReductionOptions {
                background: BackgroundMethod::from_kind(BackgroundKind::ReflectedRegions),
                safe_mask: SafeMaskOptions::default(),
            },
            spectral_model: "PowerLaw".to_string(),
            model_parameters: ModelParameterConfig::default(),
            flux_points: FluxPointOptions::default(),
            integral_flux_min_energy_tev: 0.3,
            light_curve: LightCurveOptions {
                enabled: false,
                bin_duration_days: None,
                start_mjd: None,
                energy_min_tev: None,
                energy_max_tev: 30.0,
                n_sigma_ul: 2.0,
            },
            time_bins: TimeBinOptions {
                time_bin_file: None,
                time_bin_days: None,
            },
            output: OutputOptions {
                analysis_dir: adir.to_path_buf(),
                plots: false,
                debug: false,
            },
        }
    }

    #[test]
    fn single_time_bin_over_all_runs_reproduces_the_full_fit() {
        let sim = SimulationConfig::default();
        let store = simulate_observations(&sim).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), &sim);
        // One bin wide enough to hold all three runs.
        cfg.time_bins.time_bin_days = Some(10.0);

        let mut reporter = MemoryReporter::new();
        let out = run_analysis(&cfg, &store, &CsvStarCatalog::default(), &mut reporter).unwrap();

        assert_eq!(out.selected.len(), 3);
        assert!(out.spectrum.fit.success, "{}", out.spectrum.fit.message);
        assert_eq!(out.variability.len(), 1);
        let row = &out.variability[0];
        assert_eq!(row.n_runs, 3);
        for v in &row.values {
            let full = out.spectrum.fit.value(&v.name).unwrap();
            assert!(
                ((v.value - full) / full).abs() < 1e-6,
                "{}: bin {} vs full {}",
                v.name,
                v.value,
                full
            );
        }

        let index = out.spectrum.fit.value("index").unwrap();
        assert!((index - sim.index).abs() < 0.3, "index {index}");

        let layout = OutputLayout::new(dir.path());
        let spectrum = SpectrumPaths::new(layout.spectrum_dir());
        for path in [
            layout.config(),
            layout.on_off_counts(),
            layout.variability(),
            spectrum.flux_points(),
            spectrum.significance_not_safe(),
            spectrum.significance_safe(),
            spectrum.fit_result(),
        ] {
            assert!(path.exists(), "missing {}", path.display());
        }
        let bin_dir = layout.time_bin_dir(&TimeBin::new(sim.start_mjd, sim.start_mjd + 10.0));
        assert!(SpectrumPaths::new(bin_dir).flux_points().exists());
    }

    #[test]
    fn safe_mask_never_adds_counts() {
        let sim = SimulationConfig::default();
        let store = simulate_observations(&sim).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), &sim);
        let mut reporter = MemoryReporter::new();
        let out = run_analysis(&cfg, &store, &CsvStarCatalog::default(), &mut reporter).unwrap();

        let before = out.spectrum.info_not_safe.last().unwrap();
        let after = out.spectrum.info_safe.last().unwrap();
        assert!(after.counts <= before.counts);
        assert!(before.sqrt_ts > 5.0);
        assert_eq!(out.spectrum.flux_points.len(), 6);
        assert!(reporter.value(STAGE, "all data significance").is_some());
    }

    #[test]
    fn light_curve_has_one_point_per_run_without_bin_duration() {
        let sim = SimulationConfig::default();
        let store = simulate_observations(&sim).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), &sim);
        cfg.light_curve.enabled = true;
        cfg.output.plots = true;
        let mut reporter = MemoryReporter::new();
        let out = run_analysis(&cfg, &store, &CsvStarCatalog::default(), &mut reporter).unwrap();

        assert_eq!(out.light_curve.len(), 3);
        assert!(out.light_curve.iter().all(|p| p.n_runs == 1));
        let layout = OutputLayout::new(dir.path());
        assert!(layout.light_curve().exists());
        assert!(SpectrumPaths::new(layout.spectrum_dir()).plot("flux_points").exists());
    }

    #[test]
    fn zero_selected_runs_is_degenerate() {
        let sim = SimulationConfig::default();
        let store = simulate_observations(&sim).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), &sim);
        cfg.selection.object_name = "Nothing".to_string();
        cfg.geometry.target = Some(sim.target);
        let mut reporter = MemoryReporter::new();
        let err = run_analysis(&cfg, &store, &CsvStarCatalog::default(), &mut reporter).unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert!(!reporter.warnings().is_empty());
    }

    #[test]
    fn invalid_model_fails_before_touching_data() {
        let sim = SimulationConfig::default();
        let store = simulate_observations(&sim).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), &sim);
        cfg.spectral_model = "PowerLaw*LogParabola".to_string();
        let mut reporter = MemoryReporter::new();
        let err = run_analysis(&cfg, &store, &CsvStarCatalog::default(), &mut reporter).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(!OutputLayout::new(dir.path()).config().exists());
    }

    #[test]
    fn bad_energy_axis_is_a_configuration_error_even_without_runs() {
        let sim = SimulationConfig::default();
        let store = simulate_observations(&sim).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), &sim);
        cfg.selection.object_name = "Nothing".to_string();
        cfg.energy.energy_min_tev = 30.0;
        cfg.energy.energy_max_tev = 0.3;
        let mut reporter = MemoryReporter::new();
        let err = run_analysis(&cfg, &store, &CsvStarCatalog::default(), &mut reporter).unwrap_err();
        assert_eq!(err.exit_code(), 2, "{err}");
        assert!(reporter.warnings().is_empty());
    }

    #[test]
    fn missing_exclusion_file_fails_before_any_output() {
        let sim = SimulationConfig::default();
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), &sim);
        cfg.geometry.exclusion_file = Some(dir.path().join("no_such_regions.csv"));
        let err = preflight(&cfg).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(!OutputLayout::new(dir.path()).config().exists());
    }
}
