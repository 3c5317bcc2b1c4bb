//! Analysis geometry: target, on-region, exclusion regions and mask, energy axes.
//!
//! Built once per analysis and shared read-only by every dataset.

use crate::domain::{CircleRegion, GeometryOptions, RegionSource, SkyCoord};
use crate::error::AppError;
use crate::report::Reporter;
use crate::store::ObservationSet;

pub mod catalog;
pub mod energy;
pub mod exclusion;

pub use catalog::*;
pub use energy::*;
pub use exclusion::*;

const STAGE: &str = "geometry";

#[derive(Debug, Clone)]
pub struct Geometry {
    pub target: SkyCoord,
    pub on_region: CircleRegion,
    pub exclusion_regions: Vec<CircleRegion>,
    pub exclusion_mask: ExclusionMask,
    pub axes: EnergyAxes,
}

/// Explicit radius wins; otherwise the first run carrying a `rad_max` value.
pub fn resolve_on_region_radius(explicit: Option<f64>, observations: &ObservationSet) -> Result<f64, AppError> {
    if let Some(r) = explicit {
        if !(r.is_finite() && r > 0.0) {
            return Err(AppError::configuration(format!("Invalid on-region radius: {r} deg.")));
        }
        return Ok(r);
    }
    observations
        .observations
        .iter()
        .find_map(|o| o.data.rad_max_deg.filter(|r| r.is_finite() && *r > 0.0))
        .ok_or_else(|| {
            AppError::resolution(
                "No on-region radius: none configured and no run provides a rad_max value in its IRFs.",
            )
        })
}

pub fn build_on_region(target: SkyCoord, radius_deg: f64) -> CircleRegion {
    CircleRegion::new(target, radius_deg, RegionSource::On)
}

/// Resolve the on-region, exclusion regions and mask for `target`.
///
/// `user_regions` are the already parsed `--exclusion-file` entries.
pub fn build_geometry(
    target: SkyCoord,
    opts: &GeometryOptions,
    axes: EnergyAxes,
    user_regions: &[CircleRegion],
    observations: &ObservationSet,
    catalog: &dyn BrightStarCatalog,
    reporter: &mut dyn Reporter,
) -> Result<Geometry, AppError> {
    let radius = resolve_on_region_radius(opts.on_region_radius_deg, observations)?;
    let on_region = build_on_region(target, radius);
    reporter.record(STAGE, "on region", &on_region.to_string());

    let exclusion_regions = build_exclusion_regions(target, catalog, user_regions)?;
    reporter.record(
        STAGE,
        "bright star definition",
        &format!(
            "Tycho-2 BTmag < {STAR_MAGNITUDE_LIMIT} within {STAR_SEARCH_RADIUS_DEG} deg; \
             {STAR_EXCLUSION_RADIUS_DEG} deg per star, {TARGET_EXCLUSION_RADIUS_DEG} deg around the target"
        ),
    );
    let lines: Vec<String> = exclusion_regions.iter().map(|r| format!("  {r}")).collect();
    reporter.block(STAGE, &format!("exclusion regions ({}):\n{}", lines.len(), lines.join("\n")));

    let exclusion_mask = build_exclusion_mask(target, &exclusion_regions);
    reporter.record(
        STAGE,
        "excluded mask fraction",
        &format!("{:.4}", exclusion_mask.excluded_fraction()),
    );

    Ok(Geometry {
        target,
        on_region,
        exclusion_regions,
        exclusion_mask,
        axes,
    })
}
