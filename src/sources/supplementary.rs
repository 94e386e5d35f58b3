//! Supplementary surveillance-source loaders (ILINet, FluSurv-NET, NHSN,
//! NSSP).
//!
//! All four share one endpoint shape: a long-format CSV of
//! `agg_level, location, wk_end_date, inc, as_of` rows. Revisions are routed
//! through the versioned table so retrospective runs only see what was
//! knowable by the reference date.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;

use super::{Observation, Source};
use crate::epiweek::{date_to_season, date_to_season_week};
use crate::fetch::{HttpClient, fetch_text};
use crate::locations::namespace_key;
use crate::versioned::VersionedTable;

const DEFAULT_BASE_URL: &str = "https://iddata.reichlab.io/v1";

/// ILINet locations with known data-quality problems, excluded before
/// namespacing.
const ILINET_DROP_LOCATIONS: [&str; 3] = ["Virgin Islands", "Puerto Rico", "District of Columbia"];

fn base_url() -> String {
    std::env::var("IDDATA_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
}

#[derive(Debug, Deserialize)]
struct SupplementaryRow {
    agg_level: String,
    location: String,
    wk_end_date: NaiveDate,
    inc: Option<f64>,
    /// Date this revision became known. Rows published without one are
    /// treated as known at the end of their observation week.
    as_of: Option<NaiveDate>,
}

/// Fetches one supplementary source restricted to revisions knowable by
/// `as_of_cutoff`. Errors here are recoverable at the pipeline level.
#[tracing::instrument(skip(client), fields(%source, %as_of_cutoff))]
pub async fn load_supplementary<C: HttpClient>(
    client: &C,
    source: Source,
    as_of_cutoff: NaiveDate,
) -> Result<Vec<Observation>> {
    let url = format!("{}/{}.csv", base_url(), source.as_str());
    let text = fetch_text(client, &url)
        .await
        .with_context(|| format!("fetching {source} data"))?;
    parse_supplementary_csv(source, &text, as_of_cutoff)
}

/// Parses, namespaces, and point-in-time-filters one supplementary CSV.
pub fn parse_supplementary_csv(
    source: Source,
    text: &str,
    as_of_cutoff: NaiveDate,
) -> Result<Vec<Observation>> {
    let mut rdr = csv::Reader::from_reader(text.as_bytes());
    let mut table = VersionedTable::new();
    let mut geo_types: HashMap<String, String> = HashMap::new();

    for result in rdr.deserialize() {
        let row: SupplementaryRow =
            result.with_context(|| format!("parsing {source} data row"))?;
        let Some(inc) = row.inc.filter(|v| v.is_finite()) else {
            continue;
        };
        if source == Source::Ilinet && ILINET_DROP_LOCATIONS.contains(&row.location.as_str()) {
            continue;
        }

        let key = namespace_key(source, &row.agg_level, &row.location);
        geo_types.entry(key.clone()).or_insert(row.agg_level);
        let as_of = row.as_of.unwrap_or(row.wk_end_date);
        table.insert(&key, row.wk_end_date, as_of, inc);
    }

    let out = table
        .snapshot(Some(as_of_cutoff))
        .into_iter()
        .map(|pit| Observation {
            source,
            geo_type: geo_types.get(&pit.location).cloned().unwrap_or_default(),
            season: date_to_season(pit.date),
            season_week: date_to_season_week(pit.date),
            location: pit.location,
            wk_end_date: pit.date,
            inc: pit.value,
        })
        .collect();

    Ok(out)
}
