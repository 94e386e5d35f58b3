//! Location crosswalk and source namespacing.
//!
//! The crosswalk enumerates the hub's prediction-target geographies. Keys
//! from supplementary surveillance sources are prefixed before pooling so the
//! same raw geography code seen through two sources never silently merges
//! (state FIPS "11" and HSA NCI ID "11" are different places).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::warn;

use crate::sources::Source;

/// One row of `auxiliary-data/locations.csv`.
#[derive(Debug, Clone, Deserialize)]
pub struct CrosswalkRow {
    pub location: String,
    #[serde(default)]
    pub location_name: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub state_abb: String,
    #[serde(default)]
    pub original_location_code: String,
    #[serde(default)]
    pub location_type: String,
    #[serde(default)]
    pub population: Option<f64>,
}

/// Canonical geography records keyed by hub location slug.
#[derive(Debug, Clone)]
pub struct Crosswalk {
    rows: Vec<CrosswalkRow>,
    by_location: HashMap<String, usize>,
}

impl Crosswalk {
    pub fn load(hub_root: &Path) -> Result<Self> {
        let path = hub_root.join("auxiliary-data").join("locations.csv");
        let mut rdr = csv::Reader::from_path(&path)
            .with_context(|| format!("opening crosswalk at {}", path.display()))?;

        let mut rows = Vec::new();
        for result in rdr.deserialize() {
            let row: CrosswalkRow = result.context("parsing crosswalk row")?;
            rows.push(row);
        }
        Ok(Self::from_rows(rows))
    }

    pub fn from_rows(rows: Vec<CrosswalkRow>) -> Self {
        let by_location = rows
            .iter()
            .enumerate()
            .map(|(i, r)| (r.location.clone(), i))
            .collect();
        Self { rows, by_location }
    }

    pub fn get(&self, location: &str) -> Option<&CrosswalkRow> {
        self.by_location.get(location).map(|&i| &self.rows[i])
    }

    pub fn contains(&self, location: &str) -> bool {
        self.by_location.contains_key(location)
    }

    /// All hub location slugs, in file order.
    pub fn locations(&self) -> Vec<String> {
        self.rows.iter().map(|r| r.location.clone()).collect()
    }

    pub fn population(&self, location: &str) -> Option<f64> {
        self.get(location).and_then(|r| r.population)
    }

    /// Geography aggregation level for a hub location. States are flagged in
    /// the crosswalk with `original_location_code == "All"`; sub-state rows
    /// carry their level in `location_type`.
    pub fn geo_type(&self, location: &str) -> Option<&'static str> {
        let row = self.get(location)?;
        if row.original_location_code == "All" {
            return Some("state");
        }
        match row.location_type.as_str() {
            "hsa_nci_id" => Some("hsa"),
            "nc_flu_region_id" => Some("nc_region"),
            _ => None,
        }
    }
}

/// Applies the source-specific prefixing rule to a raw location key.
///
/// Primary hub keys pass through unchanged. NSSP additionally embeds the
/// aggregation level because its state FIPS codes and HSA NCI IDs collide
/// numerically; other sources use a bare source prefix.
pub fn namespace_key(source: Source, agg_level: &str, raw: &str) -> String {
    match source {
        Source::Mchub => raw.to_string(),
        Source::Nssp => format!("nssp_{agg_level}_{raw}"),
        other => format!("{}_{raw}", other.as_str()),
    }
}

/// Tracks crosswalk misses so each unknown location warns once per run.
#[derive(Debug, Default)]
pub struct CrosswalkGate {
    seen: HashSet<String>,
    pub dropped: usize,
}

impl CrosswalkGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the location is covered; otherwise records the drop.
    /// Crosswalk coverage evolves over time, so a miss is a quality gate, not
    /// a fatal condition.
    pub fn admit(&mut self, crosswalk: &Crosswalk, location: &str) -> bool {
        if crosswalk.contains(location) {
            return true;
        }
        self.dropped += 1;
        if self.seen.insert(location.to_string()) {
            warn!(location, "Location missing from crosswalk, dropping observations");
        }
        false
    }
}
