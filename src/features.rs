//! Supervised frame construction: lag/difference features and delta targets.
//!
//! Each row is one `(series, week, horizon)` combination. The target is the
//! change in normalized transformed incidence between the feature week and
//! the week `horizon` weeks later; predictions are therefore deltas that get
//! added back onto the current value before inverse transformation.

use chrono::{Duration, NaiveDate};
use std::collections::HashMap;

use crate::locations::Crosswalk;
use crate::sources::Source;
use crate::transforms::TransformedFrame;

/// Training weeks are restricted to the surveillance season proper.
const SEASON_WEEK_RANGE: (u32, u32) = (5, 45);

/// One supervised row.
#[derive(Debug, Clone)]
pub struct FeatureRow {
    pub source: Source,
    pub location: String,
    pub wk_end_date: NaiveDate,
    pub season: String,
    pub season_week: u32,
    /// Current normalized value, added back onto the predicted delta.
    pub inc_trans_cs: f64,
    pub horizon: u32,
    pub features: Vec<f64>,
    /// Observed delta at `wk_end_date + 7 * horizon`; `None` for the
    /// forecast frontier.
    pub delta_target: Option<f64>,
}

/// Feature matrix with column names, split-ready.
#[derive(Debug)]
pub struct SupervisedFrame {
    pub feature_names: Vec<String>,
    pub rows: Vec<FeatureRow>,
}

impl SupervisedFrame {
    /// Indices of latest-week rows for primary locations: the forecast
    /// frontier.
    pub fn test_rows(&self) -> Vec<usize> {
        let Some(max_date) = self
            .rows
            .iter()
            .filter(|r| r.source == Source::Mchub)
            .map(|r| r.wk_end_date)
            .max()
        else {
            return Vec::new();
        };
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.source == Source::Mchub && r.wk_end_date == max_date)
            .map(|(i, _)| i)
            .collect()
    }

    /// Indices of rows with an observed target, pooled across all sources.
    pub fn train_rows(&self) -> Vec<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.delta_target.is_some())
            .map(|(i, _)| i)
            .collect()
    }
}

fn feature_names(incl_level_feats: bool) -> Vec<String> {
    let mut names = Vec::new();
    if incl_level_feats {
        for lag in 0..=2 {
            names.push(format!("inc_trans_cs_lag{lag}"));
        }
    }
    names.push("delta_lag0".to_string());
    names.push("delta_lag1".to_string());
    names.push("season_week".to_string());
    names.push("log_pop".to_string());
    names.push("horizon".to_string());
    names
}

/// Builds the supervised frame from the transformed observations.
///
/// Features are taken at date offsets rather than row offsets, so reporting
/// gaps surface as missing (NaN) lags instead of silently misaligned ones.
/// Rows outside the in-season window are excluded.
pub fn create_features_and_targets(
    frame: &TransformedFrame,
    crosswalk: &Crosswalk,
    incl_level_feats: bool,
    max_horizon: u32,
) -> SupervisedFrame {
    let names = feature_names(incl_level_feats);

    // Per-series lookup of normalized values by week.
    let mut series: HashMap<(Source, &str), HashMap<NaiveDate, f64>> = HashMap::new();
    for row in &frame.rows {
        series
            .entry((row.obs.source, row.obs.location.as_str()))
            .or_default()
            .insert(row.obs.wk_end_date, row.inc_trans_cs);
    }

    let mut rows = Vec::new();
    for t in &frame.rows {
        let obs = &t.obs;
        if !(SEASON_WEEK_RANGE.0..=SEASON_WEEK_RANGE.1).contains(&obs.season_week) {
            continue;
        }
        let by_date = &series[&(obs.source, obs.location.as_str())];

        let at = |weeks_back: i64| -> f64 {
            by_date
                .get(&(obs.wk_end_date - Duration::weeks(weeks_back)))
                .copied()
                .unwrap_or(f64::NAN)
        };
        let lag0 = t.inc_trans_cs;
        let lag1 = at(1);
        let lag2 = at(2);

        // Population only exists for crosswalked (primary) locations; NaN
        // elsewhere and the trees route it like any other missing value.
        let log_pop = crosswalk
            .population(&obs.location)
            .filter(|p| *p > 0.0)
            .map(f64::ln)
            .unwrap_or(f64::NAN);

        for horizon in 1..=max_horizon {
            let mut features = Vec::with_capacity(names.len());
            if incl_level_feats {
                features.extend([lag0, lag1, lag2]);
            }
            features.push(lag0 - lag1);
            features.push(lag1 - lag2);
            features.push(obs.season_week as f64);
            features.push(log_pop);
            features.push(horizon as f64);

            let delta_target = by_date
                .get(&(obs.wk_end_date + Duration::weeks(horizon as i64)))
                .map(|future| future - lag0);

            rows.push(FeatureRow {
                source: obs.source,
                location: obs.location.clone(),
                wk_end_date: obs.wk_end_date,
                season: obs.season.clone(),
                season_week: obs.season_week,
                inc_trans_cs: lag0,
                horizon,
                features,
                delta_target,
            });
        }
    }

    SupervisedFrame {
        feature_names: names,
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PowerTransform;
    use crate::sources::Observation;
    use crate::transforms::apply_scale_center_transform;

    fn weekly_obs(location: &str, n: usize, inc: impl Fn(usize) -> f64) -> Vec<Observation> {
        let start = NaiveDate::from_ymd_opt(2025, 1, 4).unwrap();
        (0..n)
            .map(|i| {
                let date = start + Duration::weeks(i as i64);
                Observation {
                    source: Source::Mchub,
                    location: location.to_string(),
                    geo_type: "state".to_string(),
                    wk_end_date: date,
                    season: crate::epiweek::date_to_season(date),
                    season_week: crate::epiweek::date_to_season_week(date),
                    inc: inc(i),
                }
            })
            .collect()
    }

    fn empty_crosswalk() -> Crosswalk {
        Crosswalk::from_rows(Vec::new())
    }

    #[test]
    fn test_targets_align_by_date() {
        let obs = weekly_obs("co", 30, |i| i as f64 * 0.1);
        let frame = apply_scale_center_transform(obs, PowerTransform::Identity);
        let sup = create_features_and_targets(&frame, &empty_crosswalk(), true, 2);

        for row in sup.rows.iter().filter(|r| r.delta_target.is_some()) {
            // Identity transform keeps weekly increments uniform, so the
            // delta over h weeks is h times the one-week step.
            let step = row.delta_target.unwrap() / row.horizon as f64;
            let one_week: Vec<f64> = sup
                .rows
                .iter()
                .filter(|r| r.horizon == 1 && r.delta_target.is_some())
                .map(|r| r.delta_target.unwrap())
                .collect();
            assert!((step - one_week[0]).abs() < 1e-9);
        }
    }

    #[test]
    fn test_frontier_rows_have_no_target() {
        let obs = weekly_obs("co", 30, |_| 1.0);
        let frame = apply_scale_center_transform(obs, PowerTransform::FourthRoot);
        let sup = create_features_and_targets(&frame, &empty_crosswalk(), true, 4);

        let test = sup.test_rows();
        assert_eq!(test.len(), 4);
        assert!(test.iter().all(|&i| sup.rows[i].delta_target.is_none()));
        let horizons: Vec<u32> = test.iter().map(|&i| sup.rows[i].horizon).collect();
        assert_eq!(horizons, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_level_feature_toggle_changes_width() {
        let obs = weekly_obs("co", 10, |_| 1.0);
        let frame = apply_scale_center_transform(obs, PowerTransform::FourthRoot);
        let with_levels = create_features_and_targets(&frame, &empty_crosswalk(), true, 1);
        let without = create_features_and_targets(&frame, &empty_crosswalk(), false, 1);
        assert_eq!(with_levels.feature_names.len(), without.feature_names.len() + 3);
        for row in &without.rows {
            assert_eq!(row.features.len(), without.feature_names.len());
        }
    }

    #[test]
    fn test_gap_produces_nan_lag_not_misalignment() {
        let mut obs = weekly_obs("co", 10, |i| i as f64);
        // Remove one interior week.
        obs.remove(5);
        let frame = apply_scale_center_transform(obs, PowerTransform::Identity);
        let sup = create_features_and_targets(&frame, &empty_crosswalk(), true, 1);

        let gap_row = sup
            .rows
            .iter()
            .find(|r| r.wk_end_date == NaiveDate::from_ymd_opt(2025, 2, 15).unwrap())
            .unwrap();
        // lag1 (the removed week) is missing.
        assert!(gap_row.features[1].is_nan());
    }
}
