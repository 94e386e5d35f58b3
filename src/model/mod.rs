//! The forecasting model: boosted quantile trees, bagged over seasons,
//! orchestrated end to end from data loading to the written hub file.

pub mod ensemble;
pub mod gbm;
pub mod tree;
mod util;

use anyhow::{bail, Context, Result};
use chrono::Days;
use std::path::PathBuf;
use tracing::info;

use crate::config::{ModelConfig, RunConfig, QUANTILE_LEVELS};
use crate::features::create_features_and_targets;
use crate::fetch::HttpClient;
use crate::locations::Crosswalk;
use crate::output::{write_forecast_file, ForecastRow};
use crate::sources::{load_all_data, Source, TargetMode};
use crate::transforms::{apply_scale_center_transform, inverse_transform};

/// A configured model variant, ready to produce one forecast file per run.
#[derive(Debug)]
pub struct GbqrModel {
    pub config: ModelConfig,
}

impl GbqrModel {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }

    /// Runs the full pipeline for one reference date and returns the path of
    /// the written forecast file.
    #[tracing::instrument(skip_all, fields(model = %self.config.model_name, ref_date = %run.ref_date))]
    pub async fn run<C: HttpClient>(
        &self,
        client: &C,
        run: &RunConfig,
        mode: TargetMode,
    ) -> Result<PathBuf> {
        let crosswalk = Crosswalk::load(&run.hub_root)?;
        let rows = load_all_data(client, &self.config, run, &crosswalk, mode).await?;

        // Every crosswalked location with any primary data must appear in the
        // output; the completeness gate checks against this set rather than
        // whatever survived the pipeline.
        let expected_locations: Vec<String> = crosswalk
            .locations()
            .into_iter()
            .filter(|loc| {
                rows.iter()
                    .any(|r| r.source == Source::Mchub && &r.location == loc)
            })
            .collect();

        let frame = apply_scale_center_transform(rows, self.config.power_transform);
        let sup = create_features_and_targets(
            &frame,
            &crosswalk,
            self.config.incl_level_feats,
            run.max_horizon,
        );

        let train = sup.train_rows();
        let test = sup.test_rows();
        if train.is_empty() {
            bail!("no training rows with observed targets");
        }
        if test.is_empty() {
            bail!("no forecastable rows at the latest primary data week");
        }
        info!(
            train = train.len(),
            test = test.len(),
            features = sup.feature_names.len(),
            "Supervised frame assembled"
        );

        let seed = ensemble::seed_for_ref_date(run.ref_date);
        let preds = ensemble::predict_feature_rows(&sup.rows, &train, &test, &self.config, seed);

        // Emitted horizons are determined by the frontier week, shared by all
        // test rows.
        let last_data_week = sup.rows[test[0]].wk_end_date;
        let expected_horizons: Vec<i64> = (1..=run.max_horizon)
            .map(|h| {
                let ted = last_data_week + chrono::Duration::weeks(h as i64);
                (ted - run.ref_date).num_days() / 7
            })
            .collect();

        let mut forecast_rows = Vec::with_capacity(test.len() * QUANTILE_LEVELS.len());
        for (&row_idx, level_preds) in test.iter().zip(&preds) {
            let row = &sup.rows[row_idx];
            let factors = frame
                .factors
                .get(&(Source::Mchub, row.location.clone()))
                .copied()
                .with_context(|| format!("no transform factors for {}", row.location))?;

            let target_end_date = row
                .wk_end_date
                .checked_add_days(Days::new(7 * row.horizon as u64))
                .context("target end date out of range")?;
            // The emitted horizon is relative to the reference date, not the
            // last data week, so a publishing lag shifts it below the model
            // horizon rather than mislabeling the week.
            let out_horizon = (target_end_date - run.ref_date).num_days() / 7;
            let target = if row.location == "nyc" {
                "ILI ED visits pct"
            } else {
                "Flu ED visits pct"
            };

            for ((_, label), delta_hat) in QUANTILE_LEVELS.iter().zip(level_preds) {
                let cs_hat = row.inc_trans_cs + delta_hat;
                let value = inverse_transform(cs_hat, factors, self.config.power_transform);
                forecast_rows.push(ForecastRow::quantile(
                    run.ref_date,
                    &row.location,
                    out_horizon,
                    target,
                    target_end_date,
                    label,
                    value,
                ));
            }
        }

        write_forecast_file(
            run,
            &self.config.model_name,
            &expected_locations,
            &expected_horizons,
            forecast_rows,
        )
    }
}
