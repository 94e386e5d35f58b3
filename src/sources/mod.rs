//! Source loaders.
//!
//! Each loader yields normalized long-format observations. The primary hub
//! series is required; supplementary surveillance sources degrade gracefully
//! when unavailable.

pub mod github;
pub mod supplementary;
pub mod target;

pub use target::TargetMode;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::fmt;
use tracing::{info, warn};

use crate::config::{ModelConfig, RunConfig};
use crate::fetch::HttpClient;
use crate::locations::Crosswalk;

/// Data source an observation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    /// Primary hub target series.
    Mchub,
    Ilinet,
    Flusurvnet,
    Nhsn,
    Nssp,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Mchub => "mchub",
            Source::Ilinet => "ilinet",
            Source::Flusurvnet => "flusurvnet",
            Source::Nhsn => "nhsn",
            Source::Nssp => "nssp",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized weekly observation, ready for pooling across sources.
#[derive(Debug, Clone)]
pub struct Observation {
    pub source: Source,
    /// Namespaced location key (bare hub slug for the primary source).
    pub location: String,
    /// Geography aggregation level: state, hsa, nc_region, national, ...
    pub geo_type: String,
    /// Saturday ending the observation week.
    pub wk_end_date: NaiveDate,
    pub season: String,
    pub season_week: u32,
    /// Incidence value (ED visit percentage).
    pub inc: f64,
}

/// Loads the primary series plus every supplementary source the variant
/// enables, then applies season exclusion and the reference-date cutoff.
///
/// The primary source failing is fatal; a supplementary source failing is
/// logged and skipped.
#[tracing::instrument(skip_all, fields(model = %model.model_name, ref_date = %run.ref_date))]
pub async fn load_all_data<C: HttpClient>(
    client: &C,
    model: &ModelConfig,
    run: &RunConfig,
    crosswalk: &Crosswalk,
    mode: TargetMode,
) -> Result<Vec<Observation>> {
    let mut rows = target::load_target_data(client, crosswalk, run, mode)
        .await
        .context("primary target source unavailable")?;
    info!(rows = rows.len(), "Primary target series loaded");

    let supplementary = [
        (model.use_ilinet, Source::Ilinet),
        (model.use_flusurvnet, Source::Flusurvnet),
        (model.use_nhsn, Source::Nhsn),
        (model.use_nssp_extra, Source::Nssp),
    ];
    for (enabled, source) in supplementary {
        if !enabled {
            continue;
        }
        match supplementary::load_supplementary(client, source, run.ref_date).await {
            Ok(extra) => {
                info!(%source, rows = extra.len(), "Supplementary source loaded");
                rows.extend(extra);
            }
            Err(e) => {
                warn!(%source, error = %e, "Supplementary source unavailable, proceeding without it");
            }
        }
    }

    let before = rows.len();
    rows.retain(|r| !model.drop_seasons.contains(&r.season));
    if rows.len() < before {
        info!(dropped = before - rows.len(), "Excluded configured seasons from training data");
    }

    // Leakage guard: nothing dated after the reference Saturday enters the
    // training frame, whatever the loader mode was.
    rows.retain(|r| r.wk_end_date <= run.ref_date);

    Ok(rows)
}
