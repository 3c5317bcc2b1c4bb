//! Spherical geometry helpers (degrees in, degrees out unless noted).
//!
//! Separations use the Vincenty form, which is stable for both tiny and
//! antipodal separations.

/// Great-circle distance between two positions, in degrees.
pub fn angular_separation(ra1: f64, dec1: f64, ra2: f64, dec2: f64) -> f64 {
    let (ra1, dec1, ra2, dec2) = (
        ra1.to_radians(),
        dec1.to_radians(),
        ra2.to_radians(),
        dec2.to_radians(),
    );
    let d_ra = ra2 - ra1;
    let (sin_d, cos_d) = d_ra.sin_cos();
    let (sin1, cos1) = dec1.sin_cos();
    let (sin2, cos2) = dec2.sin_cos();

    let num1 = cos2 * sin_d;
    let num2 = cos1 * sin2 - sin1 * cos2 * cos_d;
    let denom = sin1 * sin2 + cos1 * cos2 * cos_d;
    num1.hypot(num2).atan2(denom).to_degrees()
}

/// Position angle of the second point as seen from the first, radians east of north.
pub fn position_angle(ra1: f64, dec1: f64, ra2: f64, dec2: f64) -> f64 {
    let (ra1, dec1, ra2, dec2) = (
        ra1.to_radians(),
        dec1.to_radians(),
        ra2.to_radians(),
        dec2.to_radians(),
    );
    let d_ra = ra2 - ra1;
    let y = d_ra.sin() * dec2.cos();
    let x = dec1.cos() * dec2.sin() - dec1.sin() * dec2.cos() * d_ra.cos();
    y.atan2(x)
}

/// Move from `(ra, dec)` by `separation_deg` along position angle `pa_rad`.
pub fn offset_by(ra: f64, dec: f64, pa_rad: f64, separation_deg: f64) -> (f64, f64) {
    let ra1 = ra.to_radians();
    let dec1 = dec.to_radians();
    let r = separation_deg.to_radians();

    let (sin_r, cos_r) = r.sin_cos();
    let (sin_pa, cos_pa) = pa_rad.sin_cos();
    let (sin_d1, cos_d1) = dec1.sin_cos();

    let sin_d2 = (sin_d1 * cos_r + cos_d1 * sin_r * cos_pa).clamp(-1.0, 1.0);
    let dec2 = sin_d2.asin();
    let d_ra = (sin_pa * sin_r * cos_d1).atan2(cos_r - sin_d1 * sin_d2);

    (wrap_ra((ra1 + d_ra).to_degrees()), dec2.to_degrees())
}

/// Wrap a right ascension into `[0, 360)`.
pub fn wrap_ra(ra: f64) -> f64 {
    let r = ra.rem_euclid(360.0);
    if r >= 360.0 { 0.0 } else { r }
}

/// Signed RA difference `ra - ra0` folded into `(-180, 180]`.
pub fn delta_ra(ra: f64, ra0: f64) -> f64 {
    let mut d = (ra - ra0).rem_euclid(360.0);
    if d > 180.0 {
        d -= 360.0;
    }
    d
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separation_along_equator_and_meridian() {
        assert!((angular_separation(10.0, 0.0, 11.0, 0.0) - 1.0).abs() < 1e-9);
        assert!((angular_separation(10.0, 20.0, 10.0, 22.5) - 2.5).abs() < 1e-9);
        assert!((angular_separation(359.5, 0.0, 0.5, 0.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn offset_round_trips_through_separation_and_angle() {
        let (ra0, dec0) = (83.63, 22.01);
        for &pa in &[0.0, 0.7, 2.0, -1.3] {
            let (ra, dec) = offset_by(ra0, dec0, pa, 0.5);
            assert!((angular_separation(ra0, dec0, ra, dec) - 0.5).abs() < 1e-9);
            let back = position_angle(ra0, dec0, ra, dec);
            let diff = (back - pa).rem_euclid(std::f64::consts::TAU);
            assert!(diff < 1e-9 || (std::f64::consts::TAU - diff) < 1e-9);
        }
    }

    #[test]
    fn delta_ra_folds_across_zero() {
        assert!((delta_ra(0.5, 359.5) - 1.0).abs() < 1e-12);
        assert!((delta_ra(359.5, 0.5) + 1.0).abs() < 1e-12);
    }
}
