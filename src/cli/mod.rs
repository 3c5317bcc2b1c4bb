//! Command-line parsing for the DL3 -> DL5 pipeline.
//!
//! Argument parsing and command dispatch stay separate from the reduction and
//! fitting code: `app::analysis_config_from_args` converts these flags once
//! into an `AnalysisConfig`.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};

use crate::domain::{BackgroundKind, SkyCoord};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "dl5", version, about = "Gamma-ray DL3 to DL5 analysis (spectra, light curves, variability)")]
pub struct Cli {
    /// Console log verbosity (`RUST_LOG` takes precedence).
    #[arg(long, value_enum, default_value_t = LogLevel::Info, global = true)]
    pub log_level: LogLevel,

    /// Emit console logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Select runs, reduce them, fit the spectrum and write all products.
    Analyse(AnalyseArgs),
    /// Write a synthetic observation store for demos and tests.
    Simulate(SimulateArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_level(self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Options for a full analysis.
#[derive(Debug, Parser, Clone)]
pub struct AnalyseArgs {
    /// Only accept runs with this object name; also resolves the target position.
    #[arg(long = "object")]
    pub object_name: String,

    /// Observation store directory (contains `obs-index.json`).
    #[arg(long = "dl3", env = "DL5_DL3_PATH", default_value = "./DL3")]
    pub dl3_path: PathBuf,

    /// Analysis output directory.
    #[arg(long = "adir", default_value = "./")]
    pub analysis_dir: PathBuf,

    /// File of run ids to include (one per line).
    #[arg(long)]
    pub run_list: Option<PathBuf>,

    /// File of run ids to exclude (one per line).
    #[arg(long)]
    pub run_exclude_list: Option<PathBuf>,

    /// Only accept runs starting on or after this date (YYYY-MM-DD).
    #[arg(long, default_value = "2007-01-01")]
    pub from_date: NaiveDate,

    /// Only accept runs starting on or before this date (YYYY-MM-DD).
    #[arg(long, default_value = "2030-01-01")]
    pub to_date: NaiveDate,

    /// Also accept runs of other objects pointed within `--nearby-radius` of the target.
    #[arg(long)]
    pub nearby: bool,

    /// Cone radius (deg) for `--nearby`; at most 5.
    #[arg(long, default_value_t = 2.0)]
    pub nearby_radius: f64,

    /// Target position as "ra,dec" in degrees; otherwise taken from the run table.
    #[arg(long, value_parser = parse_sky_coord)]
    pub target: Option<SkyCoord>,

    /// On-region radius (deg); otherwise the IRF `rad_max` value.
    #[arg(long)]
    pub on_region_radius: Option<f64>,

    /// Extra exclusion regions: CSV `ra,dec,radius[,name]`.
    #[arg(long)]
    pub exclusion_file: Option<PathBuf>,

    /// Offline bright-star catalog (CSV `ra,dec,mag[,name]`) instead of a live query.
    #[arg(long)]
    pub star_catalog: Option<PathBuf>,

    /// Minimum of the reconstructed energy axis (TeV).
    #[arg(long, default_value_t = 0.1)]
    pub energy_axis_min: f64,

    /// Maximum of the reconstructed energy axis (TeV).
    #[arg(long, default_value_t = 100.0)]
    pub energy_axis_max: f64,

    /// Number of reconstructed energy bins.
    #[arg(long, default_value_t = 10)]
    pub energy_axis_bins: usize,

    /// Background estimator.
    #[arg(long, value_enum, default_value_t = BackgroundKind::ReflectedRegions)]
    pub background: BackgroundKind,

    /// Runs pointed further than this from the target are fully masked (deg).
    #[arg(long, default_value_t = 1.75)]
    pub safe_offset_max: f64,

    /// Safe range: minimum effective area in percent of its peak.
    #[arg(long, default_value_t = 5.0)]
    pub safe_aeff_percent: f64,

    /// Safe range: maximum absolute energy bias in percent.
    #[arg(long, default_value_t = 5.0)]
    pub safe_bias_percent: f64,

    /// Spectral model, e.g. `PowerLaw` or `PowerLaw+LogParabola`.
    #[arg(long, default_value = "PowerLaw")]
    pub spectral_model: String,

    /// JSON file with starting parameter values per model kind.
    #[arg(long)]
    pub model_parameters: Option<PathBuf>,

    /// Flux points: lower end of the norm scan (relative to the best fit).
    #[arg(long, default_value_t = -100.0, allow_hyphen_values = true)]
    pub norm_min: f64,

    /// Flux points: upper end of the norm scan.
    #[arg(long, default_value_t = 100.0)]
    pub norm_max: f64,

    /// Flux points: number of scan values.
    #[arg(long, default_value_t = 201)]
    pub norm_n_values: usize,

    /// Sigma level of flux-point errors.
    #[arg(long, default_value_t = 1.0)]
    pub n_sigma: f64,

    /// Sigma level of flux-point upper limits.
    #[arg(long, default_value_t = 2.0)]
    pub n_sigma_ul: f64,

    /// Points below this significance are reported as upper limits.
    #[arg(long, default_value_t = 2.0)]
    pub sqrt_ts_threshold_ul: f64,

    /// Lower bound (TeV) of the reported integral flux.
    #[arg(long, default_value_t = 0.2)]
    pub integral_flux_min_energy: f64,

    /// Compute a light curve.
    #[arg(long)]
    pub light_curve: bool,

    /// Light-curve bin duration in days; one bin per run when omitted.
    #[arg(long)]
    pub light_curve_bin_days: Option<f64>,

    /// Light-curve minimum energy (TeV); defaults to the energy axis minimum.
    #[arg(long)]
    pub light_curve_min_energy: Option<f64>,

    /// Light-curve maximum energy (TeV).
    #[arg(long, default_value_t = 30.0)]
    pub light_curve_max_energy: f64,

    /// Sigma level of light-curve upper limits.
    #[arg(long, default_value_t = 2.0)]
    pub light_curve_n_sigma_ul: f64,

    /// Time bins for the spectral-variability study ("start end" MJD per line).
    #[arg(long)]
    pub time_bin_file: Option<PathBuf>,

    /// Contiguous variability bins of this many days (when no time-bin file).
    #[arg(long, conflicts_with = "time_bin_file")]
    pub time_bin_days: Option<f64>,

    /// Skip the SVG diagnostic plots.
    #[arg(long)]
    pub no_plots: bool,

    /// Emit per-run detail for every run, not only the first few.
    #[arg(long)]
    pub debug: bool,
}

/// Options for the simulator.
#[derive(Debug, Parser, Clone)]
pub struct SimulateArgs {
    /// Output directory for the synthetic store.
    #[arg(long)]
    pub out: PathBuf,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[arg(long = "object", default_value = "Crab")]
    pub object_name: String,

    /// Source position as "ra,dec" in degrees.
    #[arg(long, value_parser = parse_sky_coord, default_value = "83.633,22.0145")]
    pub target: SkyCoord,

    #[arg(long, default_value_t = 3)]
    pub n_runs: usize,

    /// Start of the first run (MJD).
    #[arg(long, default_value_t = 60310.0)]
    pub start_mjd: f64,

    #[arg(long, default_value_t = 1.0)]
    pub run_spacing_days: f64,

    /// Livetime per run (s).
    #[arg(long, default_value_t = 1200.0)]
    pub livetime: f64,

    /// Source spectral index.
    #[arg(long, default_value_t = 2.5)]
    pub index: f64,

    /// Source amplitude at 1 TeV (cm-2 s-1 TeV-1).
    #[arg(long, default_value_t = 3.5e-11)]
    pub amplitude: f64,
}

/// Parse "ra,dec" (degrees).
fn parse_sky_coord(s: &str) -> Result<SkyCoord, String> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 2 {
        return Err("Coordinates must be in format 'ra,dec'".to_string());
    }
    let ra = parts[0]
        .trim()
        .parse::<f64>()
        .map_err(|_| "Invalid RA value".to_string())?;
    let dec = parts[1]
        .trim()
        .parse::<f64>()
        .map_err(|_| "Invalid Dec value".to_string())?;
    if !(-90.0..=90.0).contains(&dec) {
        return Err(format!("Dec {dec} outside [-90, 90]"));
    }
    Ok(SkyCoord::new(ra, dec))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyse_defaults_match_the_documented_values() {
        let cli = Cli::parse_from(["dl5", "analyse", "--object", "Crab"]);
        let Command::Analyse(args) = cli.command else {
            panic!("expected analyse");
        };
        assert_eq!(args.energy_axis_bins, 10);
        assert_eq!(args.background, BackgroundKind::ReflectedRegions);
        assert_eq!(args.from_date, NaiveDate::from_ymd_opt(2007, 1, 1).unwrap());
        assert_eq!(args.norm_min, -100.0);
        assert!(!args.no_plots);
        assert_eq!(cli.log_level, LogLevel::Info);
    }

    #[test]
    fn parses_target_and_background_kind() {
        let cli = Cli::parse_from([
            "dl5",
            "--log-level",
            "debug",
            "analyse",
            "--object",
            "Mrk421",
            "--target",
            "166.11,38.21",
            "--background",
            "RingBackground",
        ]);
        let Command::Analyse(args) = cli.command else {
            panic!("expected analyse");
        };
        assert_eq!(args.target, Some(SkyCoord::new(166.11, 38.21)));
        assert_eq!(args.background, BackgroundKind::RingBackground);
        assert_eq!(cli.log_level, LogLevel::Debug);
    }

    #[test]
    fn rejects_malformed_coordinates() {
        assert!(parse_sky_coord("10").is_err());
        assert!(parse_sky_coord("10,95").is_err());
        assert!(Cli::try_parse_from(["dl5", "analyse", "--object", "X", "--time-bin-file", "a", "--time-bin-days", "1"]).is_err());
    }
}
