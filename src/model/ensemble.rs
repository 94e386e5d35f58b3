//! Bagged quantile ensemble.
//!
//! Each bag subsamples whole seasons from the training rows, fits one
//! boosted model per quantile level, and the ensemble prediction is the
//! mean across bags. Seeding derives from the reference date so a rerun
//! for the same date reproduces the same forecasts.

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::config::{ModelConfig, QUANTILE_LEVELS};
use crate::features::FeatureRow;

use super::gbm::{GbmParams, QuantileGbm};

/// Deterministic seed for a reference date: the unix timestamp of its
/// midnight, so distinct dates get distinct but reproducible streams.
pub fn seed_for_ref_date(ref_date: NaiveDate) -> u64 {
    ref_date
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default() as u64
}

/// Predictions for the test rows, one inner vector per row holding a value
/// per quantile level in `QUANTILE_LEVELS` order.
pub fn fit_and_predict(
    x: &[Vec<f64>],
    y: &[f64],
    train_rows: &[usize],
    test_rows: &[usize],
    seasons: &[String],
    config: &ModelConfig,
    seed: u64,
) -> Vec<Vec<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);

    // Draw every per-model seed up front so the stream consumed from the
    // root rng does not depend on fitting order.
    let n_levels = QUANTILE_LEVELS.len();
    let model_seeds: Vec<Vec<u64>> = (0..config.num_bags)
        .map(|_| (0..n_levels).map(|_| rng.gen_range(0..100_000_000)).collect())
        .collect();

    // Sorted unique seasons make the subsampling independent of row order.
    let unique_seasons: Vec<&str> = {
        let mut s: Vec<&str> = train_rows.iter().map(|&r| seasons[r].as_str()).collect();
        s.sort_unstable();
        s.dedup();
        s
    };

    let params = GbmParams::default();

    let mut sums = vec![vec![0.0; n_levels]; test_rows.len()];
    for (bag, seeds) in model_seeds.iter().enumerate() {
        let bag_rows = sample_bag_rows(
            train_rows,
            seasons,
            &unique_seasons,
            config.bag_frac_samples,
            &mut rng,
        );
        info!(
            bag,
            rows = bag_rows.len(),
            total = train_rows.len(),
            "fitting bag"
        );
        for (level_idx, ((tau, _), &model_seed)) in
            QUANTILE_LEVELS.iter().zip(seeds).enumerate()
        {
            let model = QuantileGbm::fit(x, y, &bag_rows, *tau, params, model_seed);
            for (row_idx, &r) in test_rows.iter().enumerate() {
                sums[row_idx][level_idx] += model.predict(&x[r]);
            }
        }
    }

    let n_bags = config.num_bags as f64;
    sums.iter()
        .map(|row| row.iter().map(|s| s / n_bags).collect())
        .collect()
}

/// Season-blocked subsample: pick a fraction of the seasons without
/// replacement and keep every training row belonging to a picked season.
fn sample_bag_rows(
    train_rows: &[usize],
    seasons: &[String],
    unique_seasons: &[&str],
    frac: f64,
    rng: &mut StdRng,
) -> Vec<usize> {
    if unique_seasons.is_empty() {
        return train_rows.to_vec();
    }
    let k = ((unique_seasons.len() as f64 * frac).round() as usize)
        .clamp(1, unique_seasons.len());
    let picked: std::collections::HashSet<&str> = unique_seasons
        .choose_multiple(rng, k)
        .copied()
        .collect();
    let rows: Vec<usize> = train_rows
        .iter()
        .copied()
        .filter(|&r| picked.contains(seasons[r].as_str()))
        .collect();
    if rows.is_empty() {
        train_rows.to_vec()
    } else {
        rows
    }
}

/// Maps `FeatureRow`s onto the matrix interface, either as one joint fit
/// over every series or, when configured, one independent fit per forecast
/// location trained only on that location's rows. Each per-location fit
/// reuses the same seed, so a location's forecast does not change when
/// other locations are added or removed.
pub fn predict_feature_rows(
    feature_rows: &[FeatureRow],
    train: &[usize],
    test: &[usize],
    config: &ModelConfig,
    seed: u64,
) -> Vec<Vec<f64>> {
    let x: Vec<Vec<f64>> = feature_rows.iter().map(|r| r.features.clone()).collect();
    let y: Vec<f64> = feature_rows
        .iter()
        .map(|r| r.delta_target.unwrap_or(f64::NAN))
        .collect();
    let seasons: Vec<String> = feature_rows.iter().map(|r| r.season.clone()).collect();

    if !config.fit_locations_separately {
        return fit_and_predict(&x, &y, train, test, &seasons, config, seed);
    }

    let mut out = vec![Vec::new(); test.len()];
    let locations: Vec<&str> = {
        let mut s: Vec<&str> = test.iter().map(|&r| feature_rows[r].location.as_str()).collect();
        s.sort_unstable();
        s.dedup();
        s
    };
    for location in locations {
        let loc_train: Vec<usize> = train
            .iter()
            .copied()
            .filter(|&r| feature_rows[r].location == location)
            .collect();
        let loc_test: Vec<(usize, usize)> = test
            .iter()
            .enumerate()
            .filter(|&(_, &r)| feature_rows[r].location == location)
            .map(|(pos, &r)| (pos, r))
            .collect();
        let loc_test_rows: Vec<usize> = loc_test.iter().map(|&(_, r)| r).collect();

        let preds = fit_and_predict(&x, &y, &loc_train, &loc_test_rows, &seasons, config, seed);
        for ((pos, _), pred) in loc_test.into_iter().zip(preds) {
            out[pos] = pred;
        }
    }
    out
}
