//! Primary hub target-series loader.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use tracing::{debug, info};

use super::{Observation, Source, github};
use crate::config::RunConfig;
use crate::epiweek::{date_to_season, date_to_season_week};
use crate::fetch::{HttpClient, fetch_text};
use crate::locations::{Crosswalk, CrosswalkGate};

/// Hub repository publishing the target data.
pub const MCHUB_REPO: &str = "reichlab/flu-metrocast";
/// Path of the target-data file within the hub repository.
pub const MCHUB_TARGET_DATA_PATH: &str = "target-data/latest-data.csv";

fn raw_url() -> String {
    format!("https://raw.githubusercontent.com/{MCHUB_REPO}/main/{MCHUB_TARGET_DATA_PATH}")
}

/// How the primary series is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetMode {
    /// Current published file (operational runs, quick iteration).
    Latest,
    /// Local cache under the hub root (offline / reproducible runs).
    Local,
    /// File contents pinned to the newest commit on or before the reference
    /// date (retrospective runs).
    Versioned,
}

/// Raw row of `latest-data.csv`.
#[derive(Debug, Deserialize)]
struct TargetRow {
    location: String,
    target_end_date: NaiveDate,
    observation: Option<f64>,
    #[serde(default)]
    target: String,
}

/// Loads and normalizes the primary target series. Any failure here is fatal
/// to the run.
#[tracing::instrument(skip(client, crosswalk, run), fields(ref_date = %run.ref_date))]
pub async fn load_target_data<C: HttpClient>(
    client: &C,
    crosswalk: &Crosswalk,
    run: &RunConfig,
    mode: TargetMode,
) -> Result<Vec<Observation>> {
    let text = match mode {
        TargetMode::Local => {
            let path = run.hub_root.join(MCHUB_TARGET_DATA_PATH);
            fs::read_to_string(&path)
                .with_context(|| format!("reading local target data at {}", path.display()))?
        }
        TargetMode::Latest => fetch_text(client, &raw_url())
            .await
            .context("downloading latest target data")?,
        TargetMode::Versioned => {
            let sha = github::commit_on_or_before(
                client,
                run.github_token.as_deref(),
                MCHUB_REPO,
                MCHUB_TARGET_DATA_PATH,
                run.ref_date,
            )
            .await?;
            debug!(%sha, "Pinned target data to commit");
            github::file_at_commit(client, MCHUB_REPO, MCHUB_TARGET_DATA_PATH, &sha).await?
        }
    };

    parse_target_csv(&text, crosswalk)
}

/// Parses the target CSV into observations: first occurrence per
/// `(location, week, target)` wins, and locations without a crosswalk entry
/// are dropped through the quality gate.
pub fn parse_target_csv(text: &str, crosswalk: &Crosswalk) -> Result<Vec<Observation>> {
    let mut rdr = csv::Reader::from_reader(text.as_bytes());
    let mut seen: HashSet<(String, NaiveDate, String)> = HashSet::new();
    let mut gate = CrosswalkGate::new();
    let mut out = Vec::new();

    for result in rdr.deserialize() {
        let row: TargetRow = result.context("parsing target data row")?;
        let Some(inc) = row.observation.filter(|v| v.is_finite()) else {
            continue;
        };
        if !seen.insert((row.location.clone(), row.target_end_date, row.target.clone())) {
            continue;
        }
        if !gate.admit(crosswalk, &row.location) {
            continue;
        }

        let geo_type = crosswalk.geo_type(&row.location).unwrap_or("other").to_string();
        out.push(Observation {
            source: Source::Mchub,
            location: row.location,
            geo_type,
            wk_end_date: row.target_end_date,
            season: date_to_season(row.target_end_date),
            season_week: date_to_season_week(row.target_end_date),
            inc,
        });
    }

    if gate.dropped > 0 {
        info!(dropped = gate.dropped, "Dropped target rows without crosswalk coverage");
    }
    Ok(out)
}
