//! Exclusion regions and the rasterised keep-mask.
//!
//! The mask grid is a square in an azimuthal-equidistant projection centred on
//! the target: pixel offsets are `(sep·sin(pa), sep·cos(pa))`, so distances
//! from the target are exact and the target sits in the middle of the grid.

use std::path::Path;

use rayon::prelude::*;
use serde::Deserialize;

use crate::domain::{CircleRegion, RegionSource, SkyCoord};
use crate::error::AppError;
use crate::geometry::BrightStarCatalog;

pub const TARGET_EXCLUSION_RADIUS_DEG: f64 = 0.3;
pub const STAR_SEARCH_RADIUS_DEG: f64 = 4.0;
/// Stars brighter (smaller magnitude) than this are excluded.
pub const STAR_MAGNITUDE_LIMIT: f64 = 6.0;
pub const STAR_EXCLUSION_RADIUS_DEG: f64 = 0.1;

pub const MASK_WIDTH_DEG: f64 = 6.0;
pub const MASK_BINSZ_DEG: f64 = 0.01;

/// Target circle, then catalog stars, then user regions.
pub fn build_exclusion_regions(
    target: SkyCoord,
    catalog: &dyn BrightStarCatalog,
    user_regions: &[CircleRegion],
) -> Result<Vec<CircleRegion>, AppError> {
    let mut regions = vec![CircleRegion::new(
        target,
        TARGET_EXCLUSION_RADIUS_DEG,
        RegionSource::Target,
    )];

    let stars = catalog.query_cone(target, STAR_SEARCH_RADIUS_DEG)?;
    regions.extend(
        stars
            .into_iter()
            .filter(|s| s.magnitude < STAR_MAGNITUDE_LIMIT)
            .map(|s| {
                CircleRegion::new(
                    s.position,
                    STAR_EXCLUSION_RADIUS_DEG,
                    RegionSource::BrightStar {
                        name: s.name,
                        magnitude: s.magnitude,
                    },
                )
            }),
    );

    regions.extend(user_regions.iter().cloned());
    Ok(regions)
}

#[derive(Debug, Deserialize)]
struct UserRegionRow {
    ra: f64,
    dec: f64,
    radius: String,
    #[serde(default)]
    name: Option<String>,
}

/// Read user exclusion regions: CSV with `ra,dec,radius[,name]`.
pub fn read_exclusion_file(path: &Path) -> Result<Vec<CircleRegion>, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(|e| AppError::configuration(format!("Failed to open exclusion file '{}': {e}", path.display())))?;

    let mut regions = Vec::new();
    for (i, row) in reader.deserialize::<UserRegionRow>().enumerate() {
        let bad = |msg: String| {
            AppError::configuration(format!("Invalid exclusion file '{}' row {}: {msg}", path.display(), i + 1))
        };
        let row = row.map_err(|e| bad(e.to_string()))?;
        let radius = parse_angle_deg(&row.radius).ok_or_else(|| bad(format!("bad radius '{}'", row.radius)))?;
        if !(row.ra.is_finite() && row.dec.is_finite() && radius > 0.0) {
            return Err(bad("non-finite position or non-positive radius".to_string()));
        }
        regions.push(CircleRegion::new(
            SkyCoord::new(row.ra, row.dec),
            radius,
            RegionSource::User {
                name: row.name.filter(|n| !n.is_empty()),
            },
        ));
    }
    Ok(regions)
}

/// Parse `0.2`, `0.2 deg`, `12arcmin` or `30 arcsec` into degrees.
pub fn parse_angle_deg(s: &str) -> Option<f64> {
    let s = s.trim();
    if let Ok(v) = s.parse::<f64>() {
        return Some(v).filter(|v| v.is_finite());
    }
    let split = s
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(s.len());
    let value: f64 = s[..split].trim().parse().ok()?;
    let factor = match s[split..].trim() {
        "" | "deg" | "d" => 1.0,
        "arcmin" => 1.0 / 60.0,
        "arcsec" => 1.0 / 3600.0,
        _ => return None,
    };
    Some(value * factor).filter(|v| v.is_finite())
}

/// Keep-mask at the reference scale around `target`.
pub fn build_exclusion_mask(target: SkyCoord, regions: &[CircleRegion]) -> ExclusionMask {
    ExclusionMask::around(target, regions)
}

/// Boolean keep-mask around the target (`true` = usable for background).
#[derive(Debug, Clone)]
pub struct ExclusionMask {
    center: SkyCoord,
    width_deg: f64,
    binsz_deg: f64,
    npix: usize,
    keep: Vec<bool>,
}

impl ExclusionMask {
    /// Rasterise `regions` on an `npix × npix` grid; a pixel is excluded when
    /// its center lies inside any region.
    pub fn rasterize(center: SkyCoord, width_deg: f64, binsz_deg: f64, regions: &[CircleRegion]) -> Self {
        let npix = ((width_deg / binsz_deg).round() as usize).max(1);
        let mut mask = Self {
            center,
            width_deg,
            binsz_deg,
            npix,
            keep: Vec::new(),
        };
        mask.keep = (0..npix * npix)
            .into_par_iter()
            .map(|k| {
                let p = mask.pixel_center(k % npix, k / npix);
                !regions.iter().any(|r| r.contains(&p))
            })
            .collect();
        mask
    }

    /// Reference-scale mask: 6°×6° at 0.01°.
    pub fn around(center: SkyCoord, regions: &[CircleRegion]) -> Self {
        Self::rasterize(center, MASK_WIDTH_DEG, MASK_BINSZ_DEG, regions)
    }

    pub fn npix(&self) -> usize {
        self.npix
    }

    pub fn binsz_deg(&self) -> f64 {
        self.binsz_deg
    }

    pub fn center(&self) -> SkyCoord {
        self.center
    }

    /// Projected offsets (deg) of a sky position from the grid center.
    pub fn project(&self, coord: &SkyCoord) -> (f64, f64) {
        let sep = self.center.separation(coord);
        if sep == 0.0 {
            return (0.0, 0.0);
        }
        let pa = self.center.position_angle(coord);
        (sep * pa.sin(), sep * pa.cos())
    }

    pub fn pixel_center(&self, ix: usize, iy: usize) -> SkyCoord {
        let half = 0.5 * self.width_deg;
        let x = (ix as f64 + 0.5) * self.binsz_deg - half;
        let y = (iy as f64 + 0.5) * self.binsz_deg - half;
        let sep = x.hypot(y);
        if sep == 0.0 {
            return self.center;
        }
        self.center.offset_by(x.atan2(y), sep)
    }

    fn pixel_index(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let half = 0.5 * self.width_deg;
        let fx = ((x + half) / self.binsz_deg).floor();
        let fy = ((y + half) / self.binsz_deg).floor();
        let n = self.npix as f64;
        (fx >= 0.0 && fy >= 0.0 && fx < n && fy < n).then(|| (fx as usize, fy as usize))
    }

    fn keep_at(&self, ix: usize, iy: usize) -> bool {
        self.keep[iy * self.npix + ix]
    }

    /// Mask value at a sky position; positions off the grid count as kept.
    pub fn is_kept(&self, coord: &SkyCoord) -> bool {
        let (x, y) = self.project(coord);
        self.pixel_index(x, y).is_none_or(|(ix, iy)| self.keep_at(ix, iy))
    }

    /// `(kept, total)` pixel counts with centers inside `region`.
    pub fn count_within(&self, region: &CircleRegion) -> (usize, usize) {
        let (cx, cy) = self.project(&region.center);
        // The projection stretches slightly away from the grid center.
        let reach = 1.1 * region.radius_deg + self.binsz_deg;
        let half = 0.5 * self.width_deg;
        let to_idx = |v: f64| ((v + half) / self.binsz_deg).floor().clamp(0.0, self.npix as f64 - 1.0) as usize;
        let (x0, x1) = (to_idx(cx - reach), to_idx(cx + reach));
        let (y0, y1) = (to_idx(cy - reach), to_idx(cy + reach));

        let mut kept = 0;
        let mut total = 0;
        for iy in y0..=y1 {
            for ix in x0..=x1 {
                if region.contains(&self.pixel_center(ix, iy)) {
                    total += 1;
                    if self.keep_at(ix, iy) {
                        kept += 1;
                    }
                }
            }
        }
        (kept, total)
    }

    /// True when no excluded pixel lies inside `region`.
    pub fn all_kept_within(&self, region: &CircleRegion) -> bool {
        let (kept, total) = self.count_within(region);
        kept == total
    }

    pub fn excluded_fraction(&self) -> f64 {
        let excluded = self.keep.iter().filter(|k| !**k).count();
        excluded as f64 / self.keep.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{CsvStarCatalog, Star};

    fn crab() -> SkyCoord {
        SkyCoord::new(83.633, 22.0145)
    }

    #[test]
    fn regions_keep_insertion_order_and_magnitude_cut() {
        let catalog = CsvStarCatalog::from_stars(vec![
            Star {
                name: Some("bright".into()),
                position: crab().offset_by(1.0, 1.0),
                magnitude: 3.0,
            },
            Star {
                name: Some("faint".into()),
                position: crab().offset_by(2.0, 1.0),
                magnitude: 7.5,
            },
            Star {
                name: Some("far".into()),
                position: crab().offset_by(2.0, 6.0),
                magnitude: 1.0,
            },
        ]);
        let user = [CircleRegion::new(crab().offset_by(0.0, 2.0), 0.25, RegionSource::User { name: None })];
        let regions = build_exclusion_regions(crab(), &catalog, &user).unwrap();
        assert_eq!(regions.len(), 3);
        assert_eq!(regions[0].source, RegionSource::Target);
        assert_eq!(regions[0].radius_deg, 0.3);
        assert!(matches!(regions[1].source, RegionSource::BrightStar { .. }));
        assert_eq!(regions[1].radius_deg, 0.1);
        assert!(matches!(regions[2].source, RegionSource::User { .. }));
    }

    struct FailingCatalog;

    impl BrightStarCatalog for FailingCatalog {
        fn query_cone(&self, _: SkyCoord, _: f64) -> Result<Vec<Star>, AppError> {
            Err(AppError::external("catalog offline"))
        }
    }

    #[test]
    fn catalog_failure_propagates() {
        let err = build_exclusion_regions(crab(), &FailingCatalog, &[]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::External);
    }

    #[test]
    fn target_pixel_is_always_excluded() {
        let regions = build_exclusion_regions(crab(), &CsvStarCatalog::default(), &[]).unwrap();
        let mask = ExclusionMask::rasterize(crab(), 2.0, 0.02, &regions);
        assert!(!mask.is_kept(&crab()));
        assert!(!mask.is_kept(&crab().offset_by(0.3, 0.25)));
        assert!(mask.is_kept(&crab().offset_by(0.3, 0.5)));
        // Off the grid.
        assert!(mask.is_kept(&crab().offset_by(0.0, 3.0)));
    }

    #[test]
    fn region_pixel_counts() {
        let regions = vec![CircleRegion::new(crab(), 0.3, RegionSource::Target)];
        let mask = ExclusionMask::rasterize(crab(), 2.0, 0.01, &regions);
        let probe = CircleRegion::new(crab().offset_by(1.0, 0.5), 0.1, RegionSource::Off);
        let (kept, total) = mask.count_within(&probe);
        assert_eq!(kept, total);
        // Area ≈ π·0.1² / 0.01² ≈ 314 pixels.
        assert!((total as f64 - 314.0).abs() < 20.0, "{total}");
        let overlapping = CircleRegion::new(crab().offset_by(1.0, 0.35), 0.1, RegionSource::Off);
        assert!(!mask.all_kept_within(&overlapping));
    }

    #[test]
    fn user_region_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("excl.csv");
        std::fs::write(&path, "ra,dec,radius,name\n84.0,22.0,0.2 deg,blob\n85.0,23.0,30arcmin,\n").unwrap();
        let regions = read_exclusion_file(&path).unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].radius_deg, 0.2);
        assert!((regions[1].radius_deg - 0.5).abs() < 1e-12);

        std::fs::write(&path, "ra,dec,radius\n84.0,22.0,big\n").unwrap();
        assert_eq!(
            read_exclusion_file(&path).unwrap_err().kind(),
            crate::error::ErrorKind::Configuration
        );
    }
}
