//! Run selection.
//!
//! Filters are applied in a fixed order:
//!
//! 1. allow-list (if given)
//! 2. deny-list (if given)
//! 3. object name, OR pointing inside the nearby cone (when enabled)
//! 4. date range, inclusive, on run start
//!
//! The count after each stage goes to the report as an audit trail.

use std::path::Path;

use crate::domain::{ObservationRecord, SelectionOptions, SkyCoord};
use crate::error::AppError;
use crate::report::Reporter;

/// Widest cone accepted for nearby runs.
pub const MAX_NEARBY_RADIUS_DEG: f64 = 5.0;

const STAGE: &str = "selection";

/// Resolved run filter (lists already read from disk).
#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub object_name: String,
    pub allow: Option<Vec<u64>>,
    pub deny: Option<Vec<u64>>,
    pub from_mjd: Option<f64>,
    pub to_mjd: Option<f64>,
    /// Cone center and radius for nearby runs.
    pub nearby: Option<(SkyCoord, f64)>,
}

impl RunFilter {
    /// Build a filter, reading allow/deny files. `target` centres the nearby cone.
    pub fn from_options(opts: &SelectionOptions, target: Option<SkyCoord>) -> Result<Self, AppError> {
        let allow = opts.run_list.as_deref().map(read_run_list).transpose()?;
        let deny = opts.run_exclude_list.as_deref().map(read_run_list).transpose()?;

        if let (Some(from), Some(to)) = (opts.from_mjd, opts.to_mjd) {
            if from > to {
                return Err(AppError::configuration(format!(
                    "Invalid date range: start MJD {from} is after end MJD {to}."
                )));
            }
        }

        let nearby = if opts.include_nearby {
            let center = target.ok_or_else(|| {
                AppError::resolution(format!(
                    "Cannot select nearby runs: no sky position known for '{}'.",
                    opts.object_name
                ))
            })?;
            Some((center, opts.nearby_radius_deg.clamp(0.0, MAX_NEARBY_RADIUS_DEG)))
        } else {
            None
        };

        Ok(Self {
            object_name: opts.object_name.clone(),
            allow,
            deny,
            from_mjd: opts.from_mjd,
            to_mjd: opts.to_mjd,
            nearby,
        })
    }

    /// Apply all stages; returns the surviving records and per-stage counts.
    pub fn apply(&self, table: &[ObservationRecord]) -> (Vec<ObservationRecord>, Vec<(&'static str, usize)>) {
        let mut audit = vec![("runs in catalog", table.len())];
        let mut runs: Vec<ObservationRecord> = table.to_vec();

        if let Some(allow) = &self.allow {
            runs.retain(|r| allow.contains(&r.obs_id));
            audit.push(("after run list", runs.len()));
        }
        if let Some(deny) = &self.deny {
            runs.retain(|r| !deny.contains(&r.obs_id));
            audit.push(("after exclude list", runs.len()));
        }

        runs.retain(|r| {
            let by_name = r.object == self.object_name;
            let by_cone = self
                .nearby
                .as_ref()
                .is_some_and(|(center, radius)| r.pointing.separation(center) <= *radius);
            by_name || by_cone
        });
        audit.push((
            if self.nearby.is_some() {
                "after object/nearby cone"
            } else {
                "after object name"
            },
            runs.len(),
        ));

        if self.from_mjd.is_some() || self.to_mjd.is_some() {
            let from = self.from_mjd.unwrap_or(f64::NEG_INFINITY);
            let to = self.to_mjd.unwrap_or(f64::INFINITY);
            runs.retain(|r| r.tstart_mjd >= from && r.tstart_mjd <= to);
            audit.push(("after date range", runs.len()));
        }

        (runs, audit)
    }
}

/// Select runs and record the audit trail. Zero surviving runs is an error.
pub fn select_runs(
    table: &[ObservationRecord],
    filter: &RunFilter,
    reporter: &mut dyn Reporter,
) -> Result<Vec<ObservationRecord>, AppError> {
    let (runs, audit) = filter.apply(table);
    for (stage, n) in &audit {
        reporter.record(STAGE, stage, &n.to_string());
    }

    if runs.is_empty() {
        let msg = format!("No runs selected for '{}'.", filter.object_name);
        reporter.warn(STAGE, &msg);
        return Err(AppError::degenerate(msg));
    }

    let ids: Vec<String> = runs.iter().map(|r| r.obs_id.to_string()).collect();
    reporter.record(STAGE, "selected runs", &ids.join(" "));
    Ok(runs)
}

/// Target position for an object: the target coordinate of its first run.
pub fn target_from_table(table: &[ObservationRecord], object_name: &str) -> Option<SkyCoord> {
    table
        .iter()
        .find(|r| r.object == object_name)
        .map(|r| r.target)
}

/// Read a flat list of run ids (one per line; blank lines and `#` comments skipped).
pub fn read_run_list(path: &Path) -> Result<Vec<u64>, AppError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| AppError::configuration(format!("Failed to read run list '{}': {e}", path.display())))?;
    parse_run_list(&text)
        .map_err(|e| AppError::configuration(format!("Invalid run list '{}': {}", path.display(), e.message())))
}

pub fn parse_run_list(text: &str) -> Result<Vec<u64>, AppError> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i, line.split('#').next().unwrap_or("").trim()))
        .filter(|(_, line)| !line.is_empty())
        .map(|(i, line)| {
            line.parse::<u64>()
                .map_err(|_| AppError::configuration(format!("line {}: '{line}' is not a run id", i + 1)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::MemoryReporter;

    fn rec(obs_id: u64, object: &str, tstart: f64, pointing: SkyCoord) -> ObservationRecord {
        ObservationRecord {
            obs_id,
            object: object.to_string(),
            tstart_mjd: tstart,
            tstop_mjd: tstart + 0.02,
            livetime_s: 1500.0,
            ontime_s: 1600.0,
            deadc: 0.9375,
            pointing,
            target: pointing,
        }
    }

    fn table() -> Vec<ObservationRecord> {
        let crab = SkyCoord::new(83.63, 22.01);
        vec![
            rec(1, "Crab", 60000.0, crab.offset_by(0.0, 0.5)),
            rec(2, "Crab", 60001.0, crab.offset_by(1.0, 0.5)),
            rec(3, "Crab", 60002.0, crab.offset_by(2.0, 0.5)),
            rec(4, "Geminga", 60003.0, crab.offset_by(3.0, 3.0)),
            rec(5, "Mrk421", 60004.0, SkyCoord::new(166.11, 38.21)),
        ]
    }

    fn ids(runs: &[ObservationRecord]) -> Vec<u64> {
        runs.iter().map(|r| r.obs_id).collect()
    }

    #[test]
    fn filters_apply_in_order() {
        let filter = RunFilter {
            object_name: "Crab".to_string(),
            allow: Some(vec![1, 2, 3, 5]),
            deny: Some(vec![2]),
            from_mjd: Some(60000.5),
            to_mjd: Some(60010.0),
            nearby: None,
        };
        let (runs, audit) = filter.apply(&table());
        assert_eq!(ids(&runs), [3]);
        let counts: Vec<usize> = audit.iter().map(|(_, n)| *n).collect();
        assert_eq!(counts, [5, 4, 3, 2, 1]);
    }

    #[test]
    fn nearby_cone_extends_the_name_match() {
        let crab = SkyCoord::new(83.63, 22.01);
        let filter = RunFilter {
            object_name: "Crab".to_string(),
            nearby: Some((crab, 5.0)),
            ..Default::default()
        };
        let (runs, _) = filter.apply(&table());
        assert_eq!(ids(&runs), [1, 2, 3, 4]);
    }

    #[test]
    fn nearby_radius_is_capped() {
        let opts = SelectionOptions {
            object_name: "Crab".to_string(),
            run_list: None,
            run_exclude_list: None,
            from_mjd: None,
            to_mjd: None,
            include_nearby: true,
            nearby_radius_deg: 12.0,
        };
        let filter = RunFilter::from_options(&opts, Some(SkyCoord::new(0.0, 0.0))).unwrap();
        assert_eq!(filter.nearby.map(|(_, r)| r), Some(MAX_NEARBY_RADIUS_DEG));
        assert!(RunFilter::from_options(&opts, None).is_err());
    }

    #[test]
    fn allow_list_is_idempotent() {
        let filter = RunFilter {
            object_name: "Crab".to_string(),
            allow: Some(vec![1, 3, 4]),
            deny: Some(vec![4]),
            ..Default::default()
        };
        let (once, _) = filter.apply(&table());
        let (twice, _) = filter.apply(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn zero_runs_is_reported_and_fails() {
        let filter = RunFilter {
            object_name: "Vela".to_string(),
            ..Default::default()
        };
        let mut reporter = MemoryReporter::new();
        let err = select_runs(&table(), &filter, &mut reporter).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::DegenerateData);
        assert_eq!(reporter.warnings().len(), 1);
        assert_eq!(reporter.value(STAGE, "after object name"), Some("0"));
    }

    #[test]
    fn run_list_parsing() {
        assert_eq!(parse_run_list("101\n\n# comment\n 102 # trailing\n").unwrap(), [101, 102]);
        assert!(parse_run_list("101\nabc\n").is_err());
    }
}
