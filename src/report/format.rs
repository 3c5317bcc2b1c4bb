//! Text tables for the analysis report.
//!
//! We keep formatting code in one place so:
//! - the statistics and fitting code stays free of presentation
//! - report layout changes are localized

use crate::fit::{FitResult, FluxPoint, IntegralFlux, LightCurvePoint};
use crate::stats::{InfoRow, RunDiagnostics};
use crate::timebins::VariabilityRow;

/// Run-table summary.
pub fn format_run_diagnostics(d: &RunDiagnostics) -> String {
    let mut out = String::new();
    out.push_str(&format!("Runs: {}\n", d.n_runs));
    out.push_str(&format!(
        "Livetime: {:.2} h | Ontime: {:.2} h | ratio: {:.3}\n",
        d.livetime_h, d.ontime_h, d.livetime_fraction
    ));
    out.push_str(&format!(
        "Deadtime correction: min={:.3} mean={:.3} max={:.3}\n",
        d.deadc_min, d.deadc_mean, d.deadc_max
    ));
    out.push_str(&format!(
        "Pointing offset: mean={:.3} deg std={:.3} deg\n",
        d.offset_mean_deg, d.offset_std_deg
    ));
    out
}

/// On/off statistics table (cumulative or per run).
pub fn format_info_table(rows: &[InfoRow]) -> String {
    let mut out = String::new();
    push_line(
        &mut out,
        format!(
            "{:<10} {:>10} {:>9} {:>9} {:>8} {:>10} {:>10} {:>8}",
            "run", "livetime_h", "on", "off", "alpha", "background", "excess", "sqrt_ts"
        ),
    );
    push_line(
        &mut out,
        format!(
            "{:-<10} {:-<10} {:-<9} {:-<9} {:-<8} {:-<10} {:-<10} {:-<8}",
            "", "", "", "", "", "", "", ""
        ),
    );
    for r in rows {
        push_line(
            &mut out,
            format!(
                "{:<10} {:>10.3} {:>9.0} {:>9.0} {:>8.4} {:>10.2} {:>10.2} {:>8.2}",
                truncate(&r.name, 10),
                r.livetime_s / 3600.0,
                r.counts,
                r.counts_off,
                r.alpha,
                r.background,
                r.excess,
                r.sqrt_ts
            ),
        );
    }
    out
}

/// Fitted parameters, one per line.
pub fn format_fit_result(fit: &FitResult) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Model: {} | success={} | stat={:.3} | bins={}\n",
        fit.model.expression(),
        fit.success,
        fit.total_stat,
        fit.n_bins
    ));
    for p in &fit.parameters {
        push_line(
            &mut out,
            format!(
                "  {:<16} {:>14} {:>12}{}",
                p.name,
                format!("{:.4e}", p.value),
                opt_sci(p.error),
                if p.frozen { "  frozen" } else { "" }
            ),
        );
    }
    out
}

pub fn format_integral_flux(flux: &IntegralFlux) -> String {
    format!(
        "F({:.2} - {:.0} TeV) = {:.4e} +/- {} cm-2 s-1",
        flux.e_min,
        flux.e_max,
        flux.flux,
        opt_sci(flux.flux_err).trim()
    )
}

pub fn format_flux_points(points: &[FluxPoint]) -> String {
    let mut out = String::new();
    push_line(
        &mut out,
        format!(
            "{:>9} {:>9} {:>12} {:>12} {:>12} {:>7} {:>5} {:>7}",
            "e_min", "e_max", "dnde", "dnde_err", "dnde_ul", "sqrt_ts", "ul", "success"
        ),
    );
    for p in points {
        push_line(
            &mut out,
            format!(
                "{:>9.3} {:>9.3} {:>12} {:>12} {:>12} {:>7.2} {:>5} {:>7}",
                p.e_min,
                p.e_max,
                opt_sci(p.dnde),
                opt_sci(p.dnde_err),
                opt_sci(p.dnde_ul),
                p.sqrt_ts,
                p.is_ul,
                p.success
            ),
        );
    }
    out
}

pub fn format_variability(rows: &[VariabilityRow]) -> String {
    let mut out = String::new();
    for r in rows {
        let values: Vec<String> = r
            .values
            .iter()
            .map(|v| format!("{}={:.4e}+/-{}", v.name, v.value, opt_sci(v.error).trim()))
            .collect();
        push_line(
            &mut out,
            format!(
                "[{:.4}, {:.4}] runs={} success={} {}",
                r.start,
                r.end,
                r.n_runs,
                r.success,
                values.join(" ")
            ),
        );
    }
    out
}

pub fn format_light_curve(points: &[LightCurvePoint]) -> String {
    let mut out = String::new();
    push_line(
        &mut out,
        format!(
            "{:>12} {:>12} {:>5} {:>12} {:>12} {:>12} {:>7}",
            "time_min", "time_max", "runs", "flux", "flux_err", "flux_ul", "sqrt_ts"
        ),
    );
    for p in points {
        push_line(
            &mut out,
            format!(
                "{:>12.4} {:>12.4} {:>5} {:>12} {:>12} {:>12} {:>7.2}",
                p.time_min,
                p.time_max,
                p.n_runs,
                opt_sci(p.flux),
                opt_sci(p.flux_err),
                opt_sci(p.flux_ul),
                p.sqrt_ts
            ),
        );
    }
    out
}

fn push_line(out: &mut String, line: String) {
    out.push_str(line.trim_end());
    out.push('\n');
}

fn opt_sci(v: Option<f64>) -> String {
    match v {
        Some(x) => format!("{x:.3e}"),
        None => "-".to_string(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
