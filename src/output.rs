//! Hub-format forecast file writing.
//!
//! Rows are sorted into a canonical order, quantile crossings are repaired,
//! and the file is refused outright if any (location, horizon, level) cell
//! is missing or duplicated.

use anyhow::{bail, Result};
use chrono::NaiveDate;
use csv::WriterBuilder;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::{RunConfig, QUANTILE_LEVELS};

/// One line of the submission file. Field order matches the hub column order.
#[derive(Debug, Clone, Serialize)]
pub struct ForecastRow {
    pub reference_date: NaiveDate,
    pub location: String,
    pub horizon: i64,
    pub target: String,
    pub target_end_date: NaiveDate,
    pub output_type: String,
    pub output_type_id: String,
    pub value: f64,
}

impl ForecastRow {
    pub fn quantile(
        reference_date: NaiveDate,
        location: &str,
        horizon: i64,
        target: &str,
        target_end_date: NaiveDate,
        level_label: &str,
        value: f64,
    ) -> Self {
        Self {
            reference_date,
            location: location.to_string(),
            horizon,
            target: target.to_string(),
            target_end_date,
            output_type: "quantile".to_string(),
            output_type_id: level_label.to_string(),
            value,
        }
    }
}

/// Re-sorts each prediction group's values so they are non-decreasing in the
/// quantile level. Crossings from independently fitted per-level models are
/// repaired by reassigning the sorted values to the sorted levels.
pub fn enforce_quantile_order(rows: &mut [ForecastRow]) {
    let mut groups: HashMap<(String, i64), Vec<usize>> = HashMap::new();
    for (i, row) in rows.iter().enumerate() {
        groups
            .entry((row.location.clone(), row.horizon))
            .or_default()
            .push(i);
    }
    for indices in groups.values() {
        let mut pairs: Vec<(f64, usize)> = indices
            .iter()
            .map(|&i| (level_of(&rows[i].output_type_id), i))
            .collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        let mut values: Vec<f64> = indices.iter().map(|&i| rows[i].value).collect();
        values.sort_by(f64::total_cmp);
        for ((_, i), v) in pairs.into_iter().zip(values) {
            rows[i].value = v;
        }
    }
}

fn level_of(label: &str) -> f64 {
    label.parse().unwrap_or(f64::NAN)
}

/// Every expected location must carry every expected (horizon, level) cell
/// exactly once; violations abort the write before any file is created.
///
/// The expected sets come from the run configuration, not from the rows, so
/// a location or horizon that fell out of the pipeline entirely still trips
/// the gate instead of producing a silently partial submission.
fn check_completeness(
    rows: &[ForecastRow],
    expected_locations: &[String],
    expected_horizons: &[i64],
) -> Result<()> {
    if expected_locations.is_empty() {
        bail!("no forecastable locations configured");
    }

    let mut counts: HashMap<(&str, i64, &str), usize> = HashMap::new();
    for row in rows {
        *counts
            .entry((row.location.as_str(), row.horizon, row.output_type_id.as_str()))
            .or_default() += 1;
    }

    for loc in expected_locations {
        for &h in expected_horizons {
            for (_, label) in QUANTILE_LEVELS {
                match counts.get(&(loc.as_str(), h, label)).copied().unwrap_or(0) {
                    1 => {}
                    0 => bail!(
                        "incomplete forecast: location {loc} horizon {h} missing level {label}"
                    ),
                    n => bail!(
                        "duplicate forecast: location {loc} horizon {h} level {label} appears {n} times"
                    ),
                }
            }
        }
    }

    let expected_count =
        expected_locations.len() * expected_horizons.len() * QUANTILE_LEVELS.len();
    if rows.len() != expected_count {
        bail!(
            "forecast has {} rows outside the expected {} cells",
            rows.len() - expected_count,
            expected_count
        );
    }
    Ok(())
}

pub fn output_path(run: &RunConfig, model_name: &str) -> PathBuf {
    let dir = run.output_root.join(format!("UMass-{model_name}"));
    dir.join(format!("{}-UMass-{}.csv", run.ref_date, model_name))
}

/// Validates, orders, and writes the forecast file, returning its path.
pub fn write_forecast_file(
    run: &RunConfig,
    model_name: &str,
    expected_locations: &[String],
    expected_horizons: &[i64],
    mut rows: Vec<ForecastRow>,
) -> Result<PathBuf> {
    enforce_quantile_order(&mut rows);
    check_completeness(&rows, expected_locations, expected_horizons)?;

    rows.sort_by(|a, b| {
        (&a.location, a.horizon, level_of(&a.output_type_id))
            .partial_cmp(&(&b.location, b.horizon, level_of(&b.output_type_id)))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let path = output_path(run, model_name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = WriterBuilder::new().from_path(&path)?;
    for row in &rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    info!(path = %path.display(), rows = rows.len(), "Forecast file written");
    Ok(path)
}

/// Reads back a written file's header, for sanity checks in calling code.
pub fn read_header(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_path(path)?;
    Ok(reader
        .headers()?
        .iter()
        .map(|h| h.to_string())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn run_config(name: &str) -> RunConfig {
        let out = env::temp_dir().join(format!("metrocast_gbqr_{name}"));
        RunConfig::new(
            NaiveDate::from_ymd_opt(2025, 12, 27).unwrap(),
            PathBuf::from("."),
            out,
        )
    }

    fn full_rows(location: &str, value: impl Fn(usize) -> f64) -> Vec<ForecastRow> {
        let ref_date = NaiveDate::from_ymd_opt(2025, 12, 27).unwrap();
        QUANTILE_LEVELS
            .iter()
            .enumerate()
            .map(|(i, (_, label))| {
                ForecastRow::quantile(
                    ref_date,
                    location,
                    1,
                    "Flu ED visits pct",
                    ref_date + chrono::Days::new(7),
                    label,
                    value(i),
                )
            })
            .collect()
    }

    #[test]
    fn test_crossed_quantiles_are_repaired() {
        // Values descending in level: fully crossed.
        let mut rows = full_rows("austin", |i| (9 - i) as f64);
        enforce_quantile_order(&mut rows);
        let mut by_level: Vec<(f64, f64)> = rows
            .iter()
            .map(|r| (level_of(&r.output_type_id), r.value))
            .collect();
        by_level.sort_by(|a, b| a.0.total_cmp(&b.0));
        for pair in by_level.windows(2) {
            assert!(pair[0].1 <= pair[1].1);
        }
    }

    #[test]
    fn test_monotone_quantiles_unchanged() {
        let mut rows = full_rows("austin", |i| i as f64 * 0.5);
        let before: Vec<f64> = rows.iter().map(|r| r.value).collect();
        enforce_quantile_order(&mut rows);
        let after: Vec<f64> = rows.iter().map(|r| r.value).collect();
        assert_eq!(before, after);
    }

    fn expected(locations: &[&str]) -> (Vec<String>, Vec<i64>) {
        (locations.iter().map(|s| s.to_string()).collect(), vec![1])
    }

    #[test]
    fn test_missing_cell_is_fatal() {
        let run = run_config("missing_cell");
        let (locs, horizons) = expected(&["austin"]);
        let mut rows = full_rows("austin", |i| i as f64);
        rows.pop();
        let err = write_forecast_file(&run, "gbqr", &locs, &horizons, rows).unwrap_err();
        assert!(err.to_string().contains("missing level"));
    }

    #[test]
    fn test_missing_location_is_fatal() {
        // Rows for one location only must not pass when two are expected.
        let run = run_config("missing_location");
        let (locs, horizons) = expected(&["austin", "dallas"]);
        let rows = full_rows("austin", |i| i as f64);
        let err = write_forecast_file(&run, "gbqr", &locs, &horizons, rows).unwrap_err();
        assert!(err.to_string().contains("dallas"));
    }

    #[test]
    fn test_missing_horizon_is_fatal() {
        let run = run_config("missing_horizon");
        let (locs, _) = expected(&["austin"]);
        let rows = full_rows("austin", |i| i as f64);
        let err = write_forecast_file(&run, "gbqr", &locs, &[1, 2], rows).unwrap_err();
        assert!(err.to_string().contains("horizon 2"));
    }

    #[test]
    fn test_unexpected_rows_are_fatal() {
        let run = run_config("unexpected_rows");
        let (locs, horizons) = expected(&["austin"]);
        let mut rows = full_rows("austin", |i| i as f64);
        rows.extend(full_rows("atlantis", |i| i as f64));
        let err = write_forecast_file(&run, "gbqr", &locs, &horizons, rows).unwrap_err();
        assert!(err.to_string().contains("outside the expected"));
    }

    #[test]
    fn test_duplicate_cell_is_fatal() {
        let run = run_config("dup_cell");
        let (locs, horizons) = expected(&["austin"]);
        let mut rows = full_rows("austin", |i| i as f64);
        rows.push(rows[0].clone());
        let err = write_forecast_file(&run, "gbqr", &locs, &horizons, rows).unwrap_err();
        assert!(err.to_string().contains("duplicate forecast"));
    }

    #[test]
    fn test_writes_hub_columns_and_naming() {
        let run = run_config("write_ok");
        let _ = fs::remove_dir_all(&run.output_root);

        let (locs, horizons) = expected(&["austin"]);
        let rows = full_rows("austin", |i| i as f64);
        let path = write_forecast_file(&run, "gbqr", &locs, &horizons, rows).unwrap();

        assert_eq!(
            path,
            run.output_root.join("UMass-gbqr").join("2025-12-27-UMass-gbqr.csv")
        );
        let header = read_header(&path).unwrap();
        assert_eq!(
            header,
            vec![
                "reference_date",
                "location",
                "horizon",
                "target",
                "target_end_date",
                "output_type",
                "output_type_id",
                "value"
            ]
        );
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1 + QUANTILE_LEVELS.len());
        assert!(content.contains("2025-12-27,austin,1,Flu ED visits pct,2026-01-03,quantile,0.025,"));

        fs::remove_dir_all(&run.output_root).unwrap();
    }
}
