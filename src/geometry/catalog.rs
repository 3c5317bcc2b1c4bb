//! Bright-star catalog lookups.
//!
//! The live backend queries Tycho-2 (`I/259/tyc2`) through the VizieR ASU-TSV
//! interface. Offline runs and tests use a CSV file (`ra,dec,mag[,name]`).
//! Failures are never swallowed: a missing star list would silently corrupt
//! the background estimate.

use std::path::Path;

use reqwest::blocking::Client;
use serde::Deserialize;

use crate::domain::SkyCoord;
use crate::error::AppError;

const DEFAULT_VIZIER_URL: &str = "https://vizier.cds.unistra.fr/viz-bin/asu-tsv";
const TYCHO2: &str = "I/259/tyc2";
const ROW_LIMIT: usize = 100_000;

/// A catalog star.
#[derive(Debug, Clone, PartialEq)]
pub struct Star {
    pub name: Option<String>,
    pub position: SkyCoord,
    pub magnitude: f64,
}

/// Cone search over a star catalog.
pub trait BrightStarCatalog {
    fn query_cone(&self, center: SkyCoord, radius_deg: f64) -> Result<Vec<Star>, AppError>;
}

/// Live Tycho-2 queries.
pub struct VizierCatalog {
    client: Client,
    url: String,
}

impl VizierCatalog {
    /// Endpoint from `DL5_VIZIER_URL` (via `.env` if present), else the CDS mirror.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let url = std::env::var("DL5_VIZIER_URL").unwrap_or_else(|_| DEFAULT_VIZIER_URL.to_string());
        Self {
            client: Client::new(),
            url,
        }
    }
}

impl BrightStarCatalog for VizierCatalog {
    fn query_cone(&self, center: SkyCoord, radius_deg: f64) -> Result<Vec<Star>, AppError> {
        let resp = self
            .client
            .get(&self.url)
            .query(&[
                ("-source", TYCHO2.to_string()),
                ("-c", format!("{:.6} {:+.6}", center.ra, center.dec)),
                ("-c.rd", format!("{radius_deg}")),
                ("-oc.form", "d".to_string()),
                ("-out", "TYC1,TYC2,TYC3,RA(ICRS),DE(ICRS),BTmag".to_string()),
                ("-out.max", ROW_LIMIT.to_string()),
            ])
            .send()
            .map_err(|e| AppError::external(format!("Bright-star catalog query failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(AppError::external(format!(
                "Bright-star catalog query failed with status {}.",
                resp.status()
            )));
        }
        let body = resp
            .text()
            .map_err(|e| AppError::external(format!("Failed to read catalog response: {e}")))?;
        let stars = parse_vizier_tsv(&body)?;
        tracing::debug!(n = stars.len(), "tycho-2 cone query");
        Ok(stars)
    }
}

/// Parse a VizieR ASU-TSV response.
///
/// Layout: `#` comment lines, a header line, a units line, a dashes line, rows.
/// Rows whose position or magnitude is blank are skipped (Tycho-2 has stars
/// without a BT magnitude).
pub fn parse_vizier_tsv(body: &str) -> Result<Vec<Star>, AppError> {
    let mut lines = body
        .lines()
        .filter(|l| !l.starts_with('#') && !l.trim().is_empty());

    let header: Vec<&str> = lines
        .next()
        .ok_or_else(|| AppError::external("Empty catalog response."))?
        .split('\t')
        .map(str::trim)
        .collect();
    let col = |names: &[&str]| {
        header
            .iter()
            .position(|h| names.contains(h))
            .ok_or_else(|| AppError::external(format!("Catalog response lacks column {}.", names[0])))
    };
    let i_ra = col(&["RA(ICRS)", "RA_ICRS_", "RAmdeg"])?;
    let i_dec = col(&["DE(ICRS)", "DE_ICRS_", "DEmdeg"])?;
    let i_mag = col(&["BTmag"])?;
    let tyc: Vec<Option<usize>> = ["TYC1", "TYC2", "TYC3"]
        .iter()
        .map(|n| header.iter().position(|h| h == n))
        .collect();

    let mut stars = Vec::new();
    for line in lines {
        let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
        let num = |i: usize| fields.get(i).and_then(|s| s.parse::<f64>().ok());
        let (Some(ra), Some(dec), Some(mag)) = (num(i_ra), num(i_dec), num(i_mag)) else {
            continue;
        };
        let parts: Option<Vec<&str>> = tyc.iter().map(|i| i.and_then(|i| fields.get(i).copied())).collect();
        let name = parts.map(|p| format!("TYC {}", p.join("-")));
        stars.push(Star {
            name,
            position: SkyCoord::new(ra, dec),
            magnitude: mag,
        });
    }
    Ok(stars)
}

#[derive(Debug, Deserialize)]
struct StarRow {
    ra: f64,
    dec: f64,
    mag: f64,
    #[serde(default)]
    name: Option<String>,
}

/// Star list read from CSV, searched locally.
#[derive(Debug, Clone, Default)]
pub struct CsvStarCatalog {
    stars: Vec<Star>,
}

impl CsvStarCatalog {
    pub fn from_stars(stars: Vec<Star>) -> Self {
        Self { stars }
    }

    pub fn open(path: &Path) -> Result<Self, AppError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_path(path)
            .map_err(|e| AppError::external(format!("Failed to open star catalog '{}': {e}", path.display())))?;
        let mut stars = Vec::new();
        for (i, row) in reader.deserialize::<StarRow>().enumerate() {
            let row = row.map_err(|e| {
                AppError::configuration(format!("Invalid star catalog '{}' row {}: {e}", path.display(), i + 1))
            })?;
            stars.push(Star {
                name: row.name.filter(|n| !n.is_empty()),
                position: SkyCoord::new(row.ra, row.dec),
                magnitude: row.mag,
            });
        }
        Ok(Self { stars })
    }
}

impl BrightStarCatalog for CsvStarCatalog {
    fn query_cone(&self, center: SkyCoord, radius_deg: f64) -> Result<Vec<Star>, AppError> {
        Ok(self
            .stars
            .iter()
            .filter(|s| s.position.separation(&center) <= radius_deg)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TSV: &str = "#\n# VizieR Astronomical Server\n#Column\tTYC1\n\
TYC1\tTYC2\tTYC3\tRA(ICRS)\tDE(ICRS)\tBTmag\n\
\t\t\tdeg\tdeg\tmag\n\
----\t-----\t-\t------------\t------------\t------\n\
1300\t1281\t1\t84.41118\t21.14255\t3.215\n\
1301\t10\t1\t83.10000\t22.50000\t\n\
1302\t77\t1\t82.90000\t23.10000\t9.8\n";

    #[test]
    fn parses_tsv_and_skips_rows_without_magnitude() {
        let stars = parse_vizier_tsv(TSV).unwrap();
        assert_eq!(stars.len(), 2);
        assert_eq!(stars[0].name.as_deref(), Some("TYC 1300-1281-1"));
        assert!((stars[0].position.ra - 84.41118).abs() < 1e-9);
        assert!((stars[0].magnitude - 3.215).abs() < 1e-9);
    }

    #[test]
    fn missing_columns_fail() {
        assert!(parse_vizier_tsv("a\tb\n1\t2\n").is_err());
        assert!(parse_vizier_tsv("# only comments\n").is_err());
    }

    #[test]
    fn csv_catalog_cone_search() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stars.csv");
        std::fs::write(&path, "ra,dec,mag,name\n84.41,21.14,3.0,zeta Tau\n100.0,0.0,1.0,\n").unwrap();
        let cat = CsvStarCatalog::open(&path).unwrap();
        let stars = cat.query_cone(SkyCoord::new(83.63, 22.01), 4.0).unwrap();
        assert_eq!(stars.len(), 1);
        assert_eq!(stars[0].name.as_deref(), Some("zeta Tau"));
    }
}
