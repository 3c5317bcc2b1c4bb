//! Background estimators.
//!
//! - reflected regions: copies of the on-region rotated around the pointing
//!   position, skipping any candidate that touches an excluded pixel
//! - ring: an annulus around the target, restricted to kept mask pixels

use std::f64::consts::TAU;

use crate::domain::{CircleRegion, ReflectedRegionsOptions, RegionSource, RingOptions, SkyCoord};
use crate::geometry::ExclusionMask;
use crate::store::Event;

/// Off counts per reconstructed bin, the on/off ratio and the regions used.
#[derive(Debug, Clone)]
pub struct BackgroundEstimate {
    pub counts_off: Vec<f64>,
    pub alpha: f64,
    pub off_regions: Vec<CircleRegion>,
}

/// Find reflected off-regions for `on_region` around `pointing`.
pub fn find_reflected_regions(
    on_region: &CircleRegion,
    pointing: SkyCoord,
    mask: &ExclusionMask,
    opts: &ReflectedRegionsOptions,
) -> Vec<CircleRegion> {
    let offset = pointing.separation(&on_region.center);
    // The pointing inside the on region leaves nothing to reflect.
    if offset <= on_region.radius_deg {
        return Vec::new();
    }

    // Position-angle step at which two circles on the offset ring just touch.
    let extent = spherical_extent(on_region.radius_deg, offset);
    let start_pa = pointing.position_angle(&on_region.center);
    let mut angle = start_pa + extent + opts.min_distance_input_rad;
    let stop = start_pa + TAU - extent - opts.min_distance_input_rad;

    let mut regions = Vec::new();
    while angle < stop && regions.len() < opts.max_region_number {
        let candidate = CircleRegion::new(
            pointing.offset_by(angle, offset),
            on_region.radius_deg,
            RegionSource::Off,
        );
        if mask.all_kept_within(&candidate) {
            regions.push(candidate);
            angle += extent + opts.min_distance_rad;
        } else {
            angle += opts.angle_increment_rad;
        }
    }
    regions
}

/// `2 asin(sin r / sin d)`: full opening angle around the pointing of a
/// circle of radius `r` centred `d` away, both in degrees.
fn spherical_extent(radius_deg: f64, offset_deg: f64) -> f64 {
    let ratio = radius_deg.to_radians().sin() / offset_deg.to_radians().sin();
    2.0 * ratio.min(1.0).asin()
}

/// Reflected-regions estimate: events in any off region, `alpha = 1 / n_off`.
pub fn reflected_regions_background<'a>(
    on_region: &CircleRegion,
    pointing: SkyCoord,
    events: impl Iterator<Item = &'a Event>,
    bin_of: impl Fn(f64) -> Option<usize>,
    n_bins: usize,
    mask: &ExclusionMask,
    opts: &ReflectedRegionsOptions,
) -> BackgroundEstimate {
    let off_regions = find_reflected_regions(on_region, pointing, mask, opts);
    let mut counts_off = vec![0.0; n_bins];
    if !off_regions.is_empty() {
        for ev in events {
            let pos = SkyCoord::new(ev.ra, ev.dec);
            if off_regions.iter().any(|r| r.contains(&pos)) {
                if let Some(i) = bin_of(ev.energy_tev) {
                    counts_off[i] += 1.0;
                }
            }
        }
    }
    let alpha = if off_regions.is_empty() {
        0.0
    } else {
        1.0 / off_regions.len() as f64
    };
    BackgroundEstimate {
        counts_off,
        alpha,
        off_regions,
    }
}

/// Ring estimate around the target; `alpha` is the on-region pixel area over
/// the kept ring pixel area.
pub fn ring_background<'a>(
    on_region: &CircleRegion,
    events: impl Iterator<Item = &'a Event>,
    bin_of: impl Fn(f64) -> Option<usize>,
    n_bins: usize,
    mask: &ExclusionMask,
    opts: &RingOptions,
) -> BackgroundEstimate {
    let center = on_region.center;
    let outer = CircleRegion::new(center, opts.r_out_deg, RegionSource::Off);
    let inner = CircleRegion::new(center, opts.r_in_deg, RegionSource::Off);

    let (_, on_pix) = mask.count_within(on_region);
    let ring_kept = mask.count_within(&outer).0.saturating_sub(mask.count_within(&inner).0);

    let mut counts_off = vec![0.0; n_bins];
    if ring_kept > 0 {
        for ev in events {
            let pos = SkyCoord::new(ev.ra, ev.dec);
            let sep = center.separation(&pos);
            if sep > opts.r_in_deg && sep <= opts.r_out_deg && mask.is_kept(&pos) {
                if let Some(i) = bin_of(ev.energy_tev) {
                    counts_off[i] += 1.0;
                }
            }
        }
    }
    let alpha = if ring_kept > 0 {
        on_pix as f64 / ring_kept as f64
    } else {
        0.0
    };
    BackgroundEstimate {
        counts_off,
        alpha,
        off_regions: vec![outer],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> SkyCoord {
        SkyCoord::new(83.633, 22.0145)
    }

    fn on() -> CircleRegion {
        CircleRegion::new(target(), 0.1, RegionSource::On)
    }

    fn target_mask(radius: f64) -> ExclusionMask {
        let regions = [CircleRegion::new(target(), radius, RegionSource::Target)];
        ExclusionMask::rasterize(target(), 4.0, 0.01, &regions)
    }

    #[test]
    fn reflected_regions_avoid_the_on_region_and_each_other() {
        let pointing = target().offset_by(0.0, 0.5);
        let mask = target_mask(0.3);
        let regions = find_reflected_regions(&on(), pointing, &mask, &ReflectedRegionsOptions::default());
        assert!(regions.len() >= 5, "{}", regions.len());
        for (k, r) in regions.iter().enumerate() {
            assert!((pointing.separation(&r.center) - 0.5).abs() < 1e-9);
            assert!(!r.overlaps(&on()));
            assert!(mask.all_kept_within(r));
            for other in &regions[k + 1..] {
                assert!(r.center.separation(&other.center) >= 0.2 - 1e-9);
            }
        }
    }

    #[test]
    fn wide_regions_far_from_the_pointing_stay_disjoint() {
        let on = CircleRegion::new(target(), 0.3, RegionSource::On);
        let pointing = target().offset_by(1.0, 2.0);
        let mask = ExclusionMask::rasterize(target(), 4.0, 0.01, &[]);
        let regions = find_reflected_regions(&on, pointing, &mask, &ReflectedRegionsOptions::default());
        assert!(regions.len() >= 5, "{}", regions.len());
        for (k, r) in regions.iter().enumerate() {
            assert!(!r.overlaps(&on));
            for other in &regions[k + 1..] {
                assert!(r.center.separation(&other.center) >= 0.6 - 1e-9);
            }
        }
    }

    #[test]
    fn no_reflected_regions_when_pointing_at_the_target() {
        let mask = target_mask(0.3);
        assert!(
            find_reflected_regions(&on(), target(), &mask, &ReflectedRegionsOptions::default()).is_empty()
        );
    }

    #[test]
    fn reflected_alpha_and_counts() {
        let pointing = target().offset_by(0.0, 0.5);
        let mask = target_mask(0.3);
        let opts = ReflectedRegionsOptions::default();
        let regions = find_reflected_regions(&on(), pointing, &mask, &opts);
        let events: Vec<Event> = regions
            .iter()
            .map(|r| Event {
                time_mjd: 60000.0,
                energy_tev: 1.0,
                ra: r.center.ra,
                dec: r.center.dec,
            })
            .collect();
        let est = reflected_regions_background(&on(), pointing, events.iter(), |_| Some(0), 1, &mask, &opts);
        assert_eq!(est.counts_off[0], regions.len() as f64);
        assert!((est.alpha - 1.0 / regions.len() as f64).abs() < 1e-15);
    }

    #[test]
    fn ring_alpha_uses_kept_area() {
        let opts = RingOptions::default();
        // No exclusion inside the ring: alpha ≈ r_on² / (r_out² - r_in²) = 0.01 / 0.12.
        let open = target_mask(0.05);
        let est = ring_background(&on(), std::iter::empty(), |_| Some(0), 1, &open, &opts);
        assert!((est.alpha - 0.01 / 0.12).abs() < 0.01, "{}", est.alpha);

        // Excluding the inner 0.3 deg shrinks the ring to 0.3..0.4: alpha ≈ 0.01 / 0.07.
        let masked = target_mask(0.3);
        let est = ring_background(&on(), std::iter::empty(), |_| Some(0), 1, &masked, &opts);
        assert!((est.alpha - 0.01 / 0.07).abs() < 0.02, "{}", est.alpha);
    }
}
