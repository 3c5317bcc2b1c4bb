//! Files and directories of an analysis output directory.

use std::path::{Path, PathBuf};

use crate::domain::TimeBin;
use crate::error::AppError;

/// Paths under the analysis directory.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn log(&self) -> PathBuf {
        self.root.join("log.txt")
    }

    pub fn config(&self) -> PathBuf {
        self.root.join("config.json")
    }

    pub fn on_off_counts(&self) -> PathBuf {
        self.root.join("OnOffCounts.csv")
    }

    pub fn spectrum_dir(&self) -> PathBuf {
        self.root.join("Spectrum")
    }

    pub fn diagnostics_dir(&self) -> PathBuf {
        self.root.join("Diagnostics")
    }

    pub fn variability_dir(&self) -> PathBuf {
        self.root.join("SpectralVariability")
    }

    pub fn variability(&self) -> PathBuf {
        self.variability_dir().join("variability.csv")
    }

    pub fn time_bin_dir(&self, bin: &TimeBin) -> PathBuf {
        self.variability_dir()
            .join(format!("TimeBin_{}_{}", bin.start, bin.end))
    }

    pub fn light_curve_dir(&self) -> PathBuf {
        self.root.join("LightCurve")
    }

    pub fn light_curve(&self) -> PathBuf {
        self.light_curve_dir().join("light_curve.csv")
    }
}

/// Per-interval spectrum outputs (all data, or one time bin).
#[derive(Debug, Clone)]
pub struct SpectrumPaths {
    pub dir: PathBuf,
}

impl SpectrumPaths {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn flux_points(&self) -> PathBuf {
        self.dir.join("flux_points.csv")
    }

    pub fn significance_not_safe(&self) -> PathBuf {
        self.dir.join("significance_not_safe.csv")
    }

    pub fn significance_safe(&self) -> PathBuf {
        self.dir.join("significance_safe.csv")
    }

    pub fn fit_result(&self) -> PathBuf {
        self.dir.join("fit_result.json")
    }

    pub fn plot(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.svg"))
    }
}

pub fn ensure_dir(dir: &Path) -> Result<(), AppError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| AppError::external(format!("Failed to create directory '{}': {e}", dir.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_bin_directories_are_labelled_by_edges() {
        let layout = OutputLayout::new(Path::new("/tmp/adir"));
        let dir = layout.time_bin_dir(&TimeBin::new(60000.0, 60001.5));
        assert_eq!(dir, Path::new("/tmp/adir/SpectralVariability/TimeBin_60000_60001.5"));
        let spectrum = SpectrumPaths::new(layout.spectrum_dir());
        assert_eq!(spectrum.flux_points(), Path::new("/tmp/adir/Spectrum/flux_points.csv"));
    }
}
