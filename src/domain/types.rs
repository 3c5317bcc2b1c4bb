//! Shared domain types.
//!
//! These types are kept lightweight and serializable so they can be:
//!
//! - passed between pipeline stages in memory
//! - written to `config.json` / result files
//! - reloaded from the JSON data store

use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::math::sky;
use crate::models::ModelParameterConfig;

/// A sky position in the ICRS frame, in degrees.
///
/// All regions of one analysis share this frame; there is no frame conversion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkyCoord {
    pub ra: f64,
    pub dec: f64,
}

impl SkyCoord {
    pub fn new(ra: f64, dec: f64) -> Self {
        Self { ra, dec }
    }

    /// Great-circle separation in degrees.
    pub fn separation(&self, other: &SkyCoord) -> f64 {
        sky::angular_separation(self.ra, self.dec, other.ra, other.dec)
    }

    /// Position angle (radians, east of north) of `other` as seen from `self`.
    pub fn position_angle(&self, other: &SkyCoord) -> f64 {
        sky::position_angle(self.ra, self.dec, other.ra, other.dec)
    }

    /// Point at `separation_deg` from `self` along position angle `pa_rad`.
    pub fn offset_by(&self, pa_rad: f64, separation_deg: f64) -> SkyCoord {
        let (ra, dec) = sky::offset_by(self.ra, self.dec, pa_rad, separation_deg);
        SkyCoord { ra, dec }
    }

    pub fn is_finite(&self) -> bool {
        self.ra.is_finite() && self.dec.is_finite()
    }
}

impl std::fmt::Display for SkyCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(ra={:.4}, dec={:.4}) deg", self.ra, self.dec)
    }
}

/// Why a region exists. Used for logging and plotting only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RegionSource {
    Target,
    BrightStar { name: Option<String>, magnitude: f64 },
    User { name: Option<String> },
    On,
    Off,
}

/// A circular sky region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircleRegion {
    pub center: SkyCoord,
    pub radius_deg: f64,
    pub source: RegionSource,
}

impl CircleRegion {
    pub fn new(center: SkyCoord, radius_deg: f64, source: RegionSource) -> Self {
        Self {
            center,
            radius_deg,
            source,
        }
    }

    pub fn contains(&self, coord: &SkyCoord) -> bool {
        self.center.separation(coord) <= self.radius_deg
    }

    /// True if the two circles share any area.
    pub fn overlaps(&self, other: &CircleRegion) -> bool {
        self.center.separation(&other.center) < self.radius_deg + other.radius_deg
    }

    /// Flat-sky area in square degrees (regions are always small).
    pub fn area_deg2(&self) -> f64 {
        std::f64::consts::PI * self.radius_deg * self.radius_deg
    }
}

impl std::fmt::Display for CircleRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match &self.source {
            RegionSource::Target => "target".to_string(),
            RegionSource::BrightStar { name, magnitude } => format!(
                "star {} (mag {magnitude:.2})",
                name.as_deref().unwrap_or("-")
            ),
            RegionSource::User { name } => format!("user {}", name.as_deref().unwrap_or("-")),
            RegionSource::On => "on".to_string(),
            RegionSource::Off => "off".to_string(),
        };
        write!(f, "circle {} r={:.4} deg [{tag}]", self.center, self.radius_deg)
    }
}

/// One telescope run as listed in the observation index.
///
/// Immutable once loaded; run selection filters but never mutates records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub obs_id: u64,
    /// Target (object) name the run was taken on.
    pub object: String,
    /// Run start, MJD.
    pub tstart_mjd: f64,
    /// Run stop, MJD.
    pub tstop_mjd: f64,
    pub livetime_s: f64,
    pub ontime_s: f64,
    /// Deadtime-correction factor (livetime / ontime).
    pub deadc: f64,
    pub pointing: SkyCoord,
    pub target: SkyCoord,
}

impl ObservationRecord {
    /// Angular distance between pointing and target.
    pub fn pointing_offset_deg(&self) -> f64 {
        self.pointing.separation(&self.target)
    }
}

/// A user- or auto-defined time interval (MJD).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeBin {
    pub start: f64,
    pub end: f64,
}

impl TimeBin {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn mid(&self) -> f64 {
        0.5 * (self.start + self.end)
    }

    pub fn label(&self) -> String {
        format!("{}_{}", self.start, self.end)
    }
}

impl std::fmt::Display for TimeBin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}] MJD", self.start, self.end)
    }
}

/// Background estimator name as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum BackgroundKind {
    #[value(name = "ReflectedRegions")]
    ReflectedRegions,
    #[value(name = "RingBackground")]
    RingBackground,
}

impl BackgroundKind {
    pub fn display_name(self) -> &'static str {
        match self {
            BackgroundKind::ReflectedRegions => "ReflectedRegions",
            BackgroundKind::RingBackground => "RingBackground",
        }
    }
}

impl std::str::FromStr for BackgroundKind {
    type Err = crate::error::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ReflectedRegions" => Ok(BackgroundKind::ReflectedRegions),
            "RingBackground" => Ok(BackgroundKind::RingBackground),
            other => Err(crate::error::AppError::configuration(format!(
                "Unknown background maker: {other}. Choose 'ReflectedRegions' or 'RingBackground'."
            ))),
        }
    }
}

/// Reflected-regions estimator settings (angles in radians).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectedRegionsOptions {
    /// Rotation step when a candidate region is rejected.
    pub angle_increment_rad: f64,
    /// Extra gap between two accepted off regions.
    pub min_distance_rad: f64,
    /// Extra gap between the on region and the first/last off region.
    pub min_distance_input_rad: f64,
    pub max_region_number: usize,
}

impl Default for ReflectedRegionsOptions {
    fn default() -> Self {
        Self {
            angle_increment_rad: 0.1,
            min_distance_rad: 0.0,
            min_distance_input_rad: 0.1,
            max_region_number: 10_000,
        }
    }
}

/// Ring estimator settings (radii around the target, degrees).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingOptions {
    pub r_in_deg: f64,
    pub r_out_deg: f64,
}

impl Default for RingOptions {
    fn default() -> Self {
        Self {
            r_in_deg: 0.2,
            r_out_deg: 0.4,
        }
    }
}

/// Background estimation strategy with its typed settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "method")]
pub enum BackgroundMethod {
    ReflectedRegions(ReflectedRegionsOptions),
    RingBackground(RingOptions),
}

impl BackgroundMethod {
    pub fn from_kind(kind: BackgroundKind) -> Self {
        match kind {
            BackgroundKind::ReflectedRegions => {
                BackgroundMethod::ReflectedRegions(ReflectedRegionsOptions::default())
            }
            BackgroundKind::RingBackground => BackgroundMethod::RingBackground(RingOptions::default()),
        }
    }

    pub fn kind(&self) -> BackgroundKind {
        match self {
            BackgroundMethod::ReflectedRegions(_) => BackgroundKind::ReflectedRegions,
            BackgroundMethod::RingBackground(_) => BackgroundKind::RingBackground,
        }
    }
}

/// Safe energy range criteria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafeMaskOptions {
    /// Runs whose target offset exceeds this are fully masked.
    pub offset_max_deg: f64,
    /// Minimum effective area, in percent of the peak.
    pub aeff_percent: f64,
    /// Maximum absolute energy bias, in percent.
    pub bias_percent: f64,
}

impl Default for SafeMaskOptions {
    fn default() -> Self {
        Self {
            offset_max_deg: 1.75,
            aeff_percent: 5.0,
            bias_percent: 5.0,
        }
    }
}

/// Run selection inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionOptions {
    pub object_name: String,
    pub run_list: Option<PathBuf>,
    pub run_exclude_list: Option<PathBuf>,
    /// Inclusive start, MJD.
    pub from_mjd: Option<f64>,
    /// Inclusive end, MJD.
    pub to_mjd: Option<f64>,
    pub include_nearby: bool,
    /// Cone radius for nearby runs; never wider than 5 degrees.
    pub nearby_radius_deg: f64,
}

/// Energy binning inputs (TeV).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnergyAxisOptions {
    pub energy_min_tev: f64,
    pub energy_max_tev: f64,
    pub n_bins: usize,
}

/// Geometry inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeometryOptions {
    /// Explicit target position; otherwise taken from the run table.
    pub target: Option<SkyCoord>,
    /// Explicit on-region radius; wins over IRF metadata.
    pub on_region_radius_deg: Option<f64>,
    pub exclusion_file: Option<PathBuf>,
    /// Offline bright-star catalog; live Tycho-2 query otherwise.
    pub star_catalog_file: Option<PathBuf>,
}

/// Per-run reduction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReductionOptions {
    pub background: BackgroundMethod,
    pub safe_mask: SafeMaskOptions,
}

/// Flux point estimation settings (normalisation is relative to the best fit).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FluxPointOptions {
    pub norm_min: f64,
    pub norm_max: f64,
    /// Number of points in the coarse normalisation scan.
    pub norm_n_values: usize,
    pub n_sigma: f64,
    pub n_sigma_ul: f64,
    /// Points with `sqrt_ts` below this are reported as upper limits.
    pub sqrt_ts_threshold_ul: f64,
}

impl Default for FluxPointOptions {
    fn default() -> Self {
        Self {
            norm_min: -100.0,
            norm_max: 100.0,
            norm_n_values: 201,
            n_sigma: 1.0,
            n_sigma_ul: 2.0,
            sqrt_ts_threshold_ul: 2.0,
        }
    }
}

/// Light curve settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightCurveOptions {
    pub enabled: bool,
    /// Interval length in days; one interval per run when absent.
    pub bin_duration_days: Option<f64>,
    pub start_mjd: Option<f64>,
    /// Defaults to the analysis energy minimum.
    pub energy_min_tev: Option<f64>,
    pub energy_max_tev: f64,
    pub n_sigma_ul: f64,
}

/// Time-binned (spectral variability) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeBinOptions {
    pub time_bin_file: Option<PathBuf>,
    pub time_bin_days: Option<f64>,
}

/// Outputs and presentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputOptions {
    pub analysis_dir: PathBuf,
    pub plots: bool,
    /// Emit every per-run detail plot instead of the first few.
    pub debug: bool,
}

/// A full analysis configuration, built once from CLI flags and passed down.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub dl3_path: PathBuf,
    pub selection: SelectionOptions,
    pub energy: EnergyAxisOptions,
    pub geometry: GeometryOptions,
    pub reduction: ReductionOptions,
    /// Model expression, e.g. `PowerLaw` or `PowerLaw+LogParabola`.
    pub spectral_model: String,
    pub model_parameters: ModelParameterConfig,
    pub flux_points: FluxPointOptions,
    pub integral_flux_min_energy_tev: f64,
    pub light_curve: LightCurveOptions,
    pub time_bins: TimeBinOptions,
    pub output: OutputOptions,
}
