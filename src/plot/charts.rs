//! SVG diagnostic charts.
//!
//! Each chart validates its axis limits first: degenerate inputs (no finite
//! values, e.g. a spectrum where every bin is an upper limit with no value)
//! come back as a `Numerical` error so callers can log and carry on.

use std::error::Error;
use std::f64::consts::TAU;
use std::path::Path;

use plotters::prelude::*;

use crate::domain::{CircleRegion, SkyCoord};
use crate::fit::{FluxPoint, LightCurvePoint};
use crate::geometry::EnergyAxes;
use crate::models::SpectralModel;
use crate::reduction::SpectrumDatasetOnOff;
use crate::stats::InfoRow;
use crate::timebins::VariabilityRow;

const SIZE: (u32, u32) = (900, 600);
const MODEL_COLOR: RGBColor = RGBColor(200, 40, 40);
const DATA_COLOR: RGBColor = RGBColor(30, 80, 200);
const UL_COLOR: RGBColor = RGBColor(120, 120, 120);

type DrawResult = Result<(), Box<dyn Error>>;

fn render(path: &Path, draw: impl FnOnce() -> DrawResult) -> Result<(), crate::error::AppError> {
    draw().map_err(|e| crate::error::AppError::numerical(format!("Failed to render '{}': {e}", path.display())))
}

/// Finite (and, for log axes, positive) range of `values`, padded.
pub fn axis_limits(values: impl IntoIterator<Item = f64>, log: bool) -> Result<(f64, f64), crate::error::AppError> {
    let (lo, hi) = values
        .into_iter()
        .filter(|v| v.is_finite() && (!log || *v > 0.0))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !(lo.is_finite() && hi.is_finite()) {
        return Err(crate::error::AppError::numerical("Non-finite axis limits."));
    }
    Ok(if log {
        (lo / 2.0, hi * 2.0)
    } else if hi > lo {
        let pad = 0.05 * (hi - lo);
        (lo - pad, hi + pad)
    } else {
        let pad = if lo == 0.0 { 1.0 } else { 0.1 * lo.abs() };
        (lo - pad, hi + pad)
    })
}

fn vertical(x: f64, y0: f64, y1: f64, color: RGBColor) -> PathElement<(f64, f64)> {
    PathElement::new(vec![(x, y0), (x, y1)], color.stroke_width(1))
}

/// Flux points (`E² dN/dE`) over the best-fit model, log-log.
pub fn plot_flux_points(
    path: &Path,
    points: &[FluxPoint],
    model: &SpectralModel,
    title: &str,
) -> Result<(), crate::error::AppError> {
    let e2 = |e: f64, v: f64| e * e * v;
    let (x0, x1) = axis_limits(points.iter().flat_map(|p| [p.e_min, p.e_max]), true)?;
    let (y0, y1) = axis_limits(
        points
            .iter()
            .filter_map(|p| p.plotted_dnde().map(|v| e2(p.e_ref, v)))
            .chain(points.iter().map(|p| e2(p.e_ref, p.ref_dnde))),
        true,
    )?;
    let curve: Vec<(f64, f64)> = (0..=100)
        .map(|k| {
            let e = x0 * (x1 / x0).powf(k as f64 / 100.0);
            (e, e2(e, model.dnde(e)))
        })
        .filter(|(_, y)| y.is_finite() && *y > 0.0)
        .collect();

    render(path, || {
        let root = SVGBackend::new(path, SIZE).into_drawing_area();
        root.fill(&WHITE)?;
        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 20))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(70)
            .build_cartesian_2d((x0..x1).log_scale(), (y0..y1).log_scale())?;
        chart
            .configure_mesh()
            .x_desc("Energy [TeV]")
            .y_desc("E² dN/dE [TeV cm⁻² s⁻¹]")
            .y_label_formatter(&|v| format!("{v:.1e}"))
            .draw()?;

        chart
            .draw_series(LineSeries::new(curve, &MODEL_COLOR))?
            .label(model.expression())
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], MODEL_COLOR));

        for p in points {
            let Some(v) = p.plotted_dnde() else { continue };
            let y = e2(p.e_ref, v);
            if p.is_ul {
                chart.draw_series(std::iter::once(vertical(p.e_ref, y / 2.0, y, UL_COLOR)))?;
                chart.draw_series(std::iter::once(TriangleMarker::new((p.e_ref, y / 2.0), 5, UL_COLOR.filled())))?;
            } else {
                chart.draw_series(std::iter::once(PathElement::new(
                    vec![(p.e_min, y), (p.e_max, y)],
                    DATA_COLOR.stroke_width(1),
                )))?;
                if let Some(err) = p.dnde_err {
                    let lo = e2(p.e_ref, (v - err).max(v * 1e-3));
                    chart.draw_series(std::iter::once(vertical(p.e_ref, lo, e2(p.e_ref, v + err), DATA_COLOR)))?;
                }
                chart.draw_series(std::iter::once(Circle::new((p.e_ref, y), 4, DATA_COLOR.filled())))?;
            }
        }
        chart
            .configure_series_labels()
            .border_style(BLACK)
            .background_style(WHITE.mix(0.8))
            .draw()?;
        root.present()?;
        Ok(())
    })
}

/// Cumulative significance and excess versus livetime.
pub fn plot_significance(path: &Path, rows: &[InfoRow], title: &str) -> Result<(), crate::error::AppError> {
    let hours: Vec<f64> = rows.iter().map(|r| r.livetime_s / 3600.0).collect();
    let (x0, x1) = axis_limits(hours.iter().copied().chain(std::iter::once(0.0)), false)?;
    let (y0, y1) = axis_limits(rows.iter().map(|r| r.sqrt_ts).chain(std::iter::once(0.0)), false)?;

    render(path, || {
        let root = SVGBackend::new(path, SIZE).into_drawing_area();
        root.fill(&WHITE)?;
        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 20))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d(x0..x1, y0..y1)?;
        chart
            .configure_mesh()
            .x_desc("Livetime [h]")
            .y_desc("Significance [σ]")
            .draw()?;
        let series: Vec<(f64, f64)> = hours.iter().zip(rows).map(|(h, r)| (*h, r.sqrt_ts)).collect();
        chart.draw_series(LineSeries::new(series.clone(), &DATA_COLOR))?;
        chart.draw_series(series.into_iter().map(|p| Circle::new(p, 3, DATA_COLOR.filled())))?;
        root.present()?;
        Ok(())
    })
}

/// Observed excess against predicted signal counts for one run.
pub fn plot_excess_vs_npred(
    path: &Path,
    dataset: &SpectrumDatasetOnOff,
    npred: &[f64],
    axes: &EnergyAxes,
) -> Result<(), crate::error::AppError> {
    let bins: Vec<usize> = (0..dataset.n_bins()).filter(|&i| dataset.mask(i)).collect();
    let (x0, x1) = axis_limits(bins.iter().flat_map(|&i| [axes.reco.lo(i), axes.reco.hi(i)]), true)?;
    let (y0, y1) = axis_limits(
        bins.iter()
            .flat_map(|&i| [dataset.excess(i), npred[i]])
            .chain(std::iter::once(0.0)),
        false,
    )?;

    render(path, || {
        let root = SVGBackend::new(path, SIZE).into_drawing_area();
        root.fill(&WHITE)?;
        let mut chart = ChartBuilder::on(&root)
            .caption(format!("Run {}", dataset.obs_id), ("sans-serif", 20))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d((x0..x1).log_scale(), y0..y1)?;
        chart
            .configure_mesh()
            .x_desc("Energy [TeV]")
            .y_desc("Counts")
            .draw()?;
        for &i in &bins {
            let (lo, hi, c) = (axes.reco.lo(i), axes.reco.hi(i), axes.reco.center(i));
            chart.draw_series(std::iter::once(PathElement::new(
                vec![(lo, npred[i]), (hi, npred[i])],
                MODEL_COLOR.stroke_width(2),
            )))?;
            let err = (dataset.counts[i] + dataset.alpha[i].powi(2) * dataset.counts_off[i]).sqrt();
            let ex = dataset.excess(i);
            chart.draw_series(std::iter::once(vertical(c, ex - err, ex + err, DATA_COLOR)))?;
            chart.draw_series(std::iter::once(Circle::new((c, ex), 3, DATA_COLOR.filled())))?;
        }
        root.present()?;
        Ok(())
    })
}

/// On, off and exclusion regions around the target, in a tangent-plane
/// projection (degrees).
pub fn plot_regions(
    path: &Path,
    center: SkyCoord,
    pointing: SkyCoord,
    on: &CircleRegion,
    off: &[CircleRegion],
    exclusion: &[CircleRegion],
) -> Result<(), crate::error::AppError> {
    let project = |c: &SkyCoord| {
        let sep = center.separation(c);
        let pa = center.position_angle(c);
        // East to the left, as on the sky.
        (-sep * pa.sin(), sep * pa.cos())
    };
    let outline = |r: &CircleRegion| -> Vec<(f64, f64)> {
        (0..=64)
            .map(|k| project(&r.center.offset_by(TAU * k as f64 / 64.0, r.radius_deg)))
            .collect()
    };
    let all: Vec<(f64, f64)> = std::iter::once(on)
        .chain(off)
        .chain(exclusion)
        .flat_map(&outline)
        .chain(std::iter::once(project(&pointing)))
        .collect();
    let (x0, x1) = axis_limits(all.iter().map(|p| p.0), false)?;
    let (y0, y1) = axis_limits(all.iter().map(|p| p.1), false)?;
    let half = 0.5 * (x1 - x0).max(y1 - y0);
    let (cx, cy) = (0.5 * (x0 + x1), 0.5 * (y0 + y1));

    render(path, || {
        let root = SVGBackend::new(path, (700, 700)).into_drawing_area();
        root.fill(&WHITE)?;
        let mut chart = ChartBuilder::on(&root)
            .caption("Regions", ("sans-serif", 20))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d((cx - half)..(cx + half), (cy - half)..(cy + half))?;
        chart
            .configure_mesh()
            .x_desc("ΔRA [deg]")
            .y_desc("ΔDec [deg]")
            .draw()?;
        for r in exclusion {
            chart.draw_series(std::iter::once(PathElement::new(outline(r), UL_COLOR.stroke_width(1))))?;
        }
        for r in off {
            chart.draw_series(std::iter::once(PathElement::new(outline(r), DATA_COLOR.stroke_width(2))))?;
        }
        chart.draw_series(std::iter::once(PathElement::new(outline(on), MODEL_COLOR.stroke_width(2))))?;
        chart.draw_series(std::iter::once(Cross::new(project(&pointing), 6, BLACK.stroke_width(2))))?;
        root.present()?;
        Ok(())
    })
}

/// Integral flux per interval; upper limits as open triangles.
pub fn plot_light_curve(path: &Path, points: &[LightCurvePoint], mean: Option<f64>) -> Result<(), crate::error::AppError> {
    let value = |p: &LightCurvePoint| if p.is_ul { p.flux_ul } else { p.flux };
    let (x0, x1) = axis_limits(points.iter().flat_map(|p| [p.time_min, p.time_max]), false)?;
    let (y0, y1) = axis_limits(
        points
            .iter()
            .filter_map(|p| value(p).map(|v| v + p.flux_err.unwrap_or(0.0)))
            .chain(std::iter::once(0.0)),
        false,
    )?;

    render(path, || {
        let root = SVGBackend::new(path, SIZE).into_drawing_area();
        root.fill(&WHITE)?;
        let mut chart = ChartBuilder::on(&root)
            .caption("Light curve", ("sans-serif", 20))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(70)
            .build_cartesian_2d(x0..x1, y0..y1)?;
        chart
            .configure_mesh()
            .x_desc("Time [MJD]")
            .y_desc("Flux [cm⁻² s⁻¹]")
            .y_label_formatter(&|v| format!("{v:.1e}"))
            .draw()?;
        if let Some(m) = mean {
            chart.draw_series(LineSeries::new(vec![(x0, m), (x1, m)], &MODEL_COLOR))?;
        }
        for p in points {
            let Some(v) = value(p) else { continue };
            let t = 0.5 * (p.time_min + p.time_max);
            let color = if p.is_ul { UL_COLOR } else { DATA_COLOR };
            chart.draw_series(std::iter::once(PathElement::new(
                vec![(p.time_min, v), (p.time_max, v)],
                color.stroke_width(1),
            )))?;
            if p.is_ul {
                chart.draw_series(std::iter::once(TriangleMarker::new((t, v), 5, color)))?;
            } else {
                if let Some(err) = p.flux_err {
                    chart.draw_series(std::iter::once(vertical(t, v - err, v + err, color)))?;
                }
                chart.draw_series(std::iter::once(Circle::new((t, v), 3, color.filled())))?;
            }
        }
        root.present()?;
        Ok(())
    })
}

/// Drift of one parameter across time bins.
pub fn plot_parameter_drift(path: &Path, rows: &[VariabilityRow], name: &str) -> Result<(), crate::error::AppError> {
    let series: Vec<(f64, f64, f64)> = rows
        .iter()
        .filter_map(|r| {
            let v = r.values.iter().find(|v| v.name == name)?;
            Some((0.5 * (r.start + r.end), v.value, v.error.unwrap_or(0.0)))
        })
        .collect();
    let (x0, x1) = axis_limits(rows.iter().flat_map(|r| [r.start, r.end]), false)?;
    let (y0, y1) = axis_limits(series.iter().flat_map(|&(_, v, e)| [v - e, v + e]), false)?;

    render(path, || {
        let root = SVGBackend::new(path, SIZE).into_drawing_area();
        root.fill(&WHITE)?;
        let mut chart = ChartBuilder::on(&root)
            .caption(format!("{name} per time bin"), ("sans-serif", 20))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(70)
            .build_cartesian_2d(x0..x1, y0..y1)?;
        chart
            .configure_mesh()
            .x_desc("Time [MJD]")
            .y_desc(name)
            .y_label_formatter(&|v| format!("{v:.3e}"))
            .draw()?;
        for &(t, v, e) in &series {
            chart.draw_series(std::iter::once(vertical(t, v - e, v + e, DATA_COLOR)))?;
            chart.draw_series(std::iter::once(Circle::new((t, v), 3, DATA_COLOR.filled())))?;
        }
        root.present()?;
        Ok(())
    })
}

/// Scatter of two parameters across time bins.
pub fn plot_parameter_scatter(
    path: &Path,
    rows: &[VariabilityRow],
    x_name: &str,
    y_name: &str,
    correlation: Option<f64>,
) -> Result<(), crate::error::AppError> {
    let pick = |r: &VariabilityRow, n: &str| r.values.iter().find(|v| v.name == n).map(|v| v.value);
    let pairs: Vec<(f64, f64)> = rows
        .iter()
        .filter_map(|r| Some((pick(r, x_name)?, pick(r, y_name)?)))
        .collect();
    let (x0, x1) = axis_limits(pairs.iter().map(|p| p.0), false)?;
    let (y0, y1) = axis_limits(pairs.iter().map(|p| p.1), false)?;
    let caption = match correlation {
        Some(r) => format!("{y_name} vs {x_name} (r = {r:.2})"),
        None => format!("{y_name} vs {x_name}"),
    };

    render(path, || {
        let root = SVGBackend::new(path, (700, 700)).into_drawing_area();
        root.fill(&WHITE)?;
        let mut chart = ChartBuilder::on(&root)
            .caption(caption, ("sans-serif", 20))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(70)
            .build_cartesian_2d(x0..x1, y0..y1)?;
        chart
            .configure_mesh()
            .x_desc(x_name)
            .y_desc(y_name)
            .x_label_formatter(&|v| format!("{v:.3e}"))
            .y_label_formatter(&|v| format!("{v:.3e}"))
            .draw()?;
        chart.draw_series(pairs.iter().map(|&p| Circle::new(p, 4, DATA_COLOR.filled())))?;
        root.present()?;
        Ok(())
    })
}
