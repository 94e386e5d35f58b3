//! Gradient boosting under the pinball (quantile) loss.
//!
//! Each round fits a tree to the pinball subgradients, then re-fits leaf
//! outputs as the target quantile of the in-leaf residuals, shrunk by the
//! learning rate. With a fixed seed the fit is fully deterministic.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::tree::{RegressionTree, TreeParams};
use super::util::quantile;

#[derive(Debug, Clone, Copy)]
pub struct GbmParams {
    pub n_rounds: usize,
    pub learning_rate: f64,
    /// Fraction of features considered per tree; 1.0 uses all of them.
    pub colsample: f64,
    pub tree: TreeParams,
}

impl Default for GbmParams {
    fn default() -> Self {
        Self {
            n_rounds: 100,
            learning_rate: 0.1,
            colsample: 1.0,
            tree: TreeParams::default(),
        }
    }
}

/// A boosted quantile-regression model for one quantile level.
#[derive(Debug)]
pub struct QuantileGbm {
    base_score: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
}

impl QuantileGbm {
    /// Fits a model for quantile level `tau` on the rows in `rows`.
    ///
    /// Degenerate training data (constant target, or too few rows to split)
    /// yields a constant model rather than an error.
    pub fn fit(
        x: &[Vec<f64>],
        y: &[f64],
        rows: &[usize],
        tau: f64,
        params: GbmParams,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let n_features = rows.first().map(|&r| x[r].len()).unwrap_or(0);
        let all_features: Vec<usize> = (0..n_features).collect();

        let y_rows: Vec<f64> = rows.iter().map(|&r| y[r]).collect();
        let base_score = quantile(&y_rows, tau);

        let mut preds: Vec<f64> = vec![base_score; rows.len()];
        let mut trees = Vec::new();

        for _ in 0..params.n_rounds {
            // Pinball subgradient: tau above the current prediction,
            // tau - 1 below it.
            let grad_by_row: Vec<f64> = rows
                .iter()
                .zip(&preds)
                .map(|(&r, &p)| {
                    if y[r] > p {
                        tau
                    } else if y[r] < p {
                        tau - 1.0
                    } else {
                        0.0
                    }
                })
                .collect();
            if grad_by_row.iter().all(|g| *g == 0.0) {
                break;
            }

            // Scatter gradients into a full-length buffer so the tree can
            // index by the original row ids.
            let mut grad = vec![0.0; x.len()];
            for (&r, g) in rows.iter().zip(&grad_by_row) {
                grad[r] = *g;
            }

            let features = sample_features(&all_features, params.colsample, &mut rng);

            // Residual lookup for leaf re-fitting.
            let mut residual = vec![0.0; x.len()];
            for (i, &r) in rows.iter().enumerate() {
                residual[r] = y[r] - preds[i];
            }
            let leaf_value = |leaf_rows: &[usize]| -> f64 {
                let res: Vec<f64> = leaf_rows.iter().map(|&r| residual[r]).collect();
                quantile(&res, tau)
            };

            let tree = RegressionTree::fit(x, &grad, rows, &features, params.tree, &leaf_value);
            for (i, &r) in rows.iter().enumerate() {
                preds[i] += params.learning_rate * tree.predict_row(&x[r]);
            }
            let stump = tree.is_stump();
            trees.push(tree);
            if stump {
                // No structure left to exploit; further rounds would only
                // repeat the same constant correction.
                break;
            }
        }

        Self {
            base_score,
            learning_rate: params.learning_rate,
            trees,
        }
    }

    pub fn predict(&self, features: &[f64]) -> f64 {
        self.base_score
            + self
                .trees
                .iter()
                .map(|t| self.learning_rate * t.predict_row(features))
                .sum::<f64>()
    }
}

fn sample_features(all: &[usize], colsample: f64, rng: &mut StdRng) -> Vec<usize> {
    if colsample >= 1.0 || all.len() <= 1 {
        return all.to_vec();
    }
    let k = ((all.len() as f64 * colsample).ceil() as usize).clamp(1, all.len());
    let mut picked: Vec<usize> = all.choose_multiple(rng, k).copied().collect();
    picked.sort_unstable();
    picked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fit_simple(y: &[f64], tau: f64) -> QuantileGbm {
        let x: Vec<Vec<f64>> = (0..y.len()).map(|i| vec![i as f64]).collect();
        let rows: Vec<usize> = (0..y.len()).collect();
        let params = GbmParams {
            tree: TreeParams {
                min_samples_leaf: 5,
                ..TreeParams::default()
            },
            ..GbmParams::default()
        };
        QuantileGbm::fit(&x, y, &rows, tau, params, 7)
    }

    #[test]
    fn test_constant_target_predicts_constant() {
        let y = vec![2.5; 40];
        let model = fit_simple(&y, 0.5);
        assert!((model.predict(&[3.0]) - 2.5).abs() < 1e-9);
        assert!((model.predict(&[999.0]) - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_median_tracks_step_function() {
        let y: Vec<f64> = (0..200).map(|i| if i < 100 { 0.0 } else { 10.0 }).collect();
        let model = fit_simple(&y, 0.5);
        assert!(model.predict(&[20.0]).abs() < 1.0);
        assert!((model.predict(&[180.0]) - 10.0).abs() < 1.0);
    }

    #[test]
    fn test_quantiles_order_on_noisy_data() {
        // Deterministic pseudo-noise, spread around 5.0.
        let y: Vec<f64> = (0..300)
            .map(|i| 5.0 + ((i * 37 % 100) as f64 / 100.0 - 0.5) * 4.0)
            .collect();
        let x = vec![10.0];
        let lo = fit_simple(&y, 0.1).predict(&x);
        let mid = fit_simple(&y, 0.5).predict(&x);
        let hi = fit_simple(&y, 0.9).predict(&x);
        assert!(lo <= mid + 1e-9);
        assert!(mid <= hi + 1e-9);
        assert!(lo < hi);
    }

    #[test]
    fn test_deterministic_given_seed() {
        let y: Vec<f64> = (0..100).map(|i| (i % 7) as f64).collect();
        let x: Vec<Vec<f64>> = (0..y.len()).map(|i| vec![i as f64, (i % 3) as f64]).collect();
        let rows: Vec<usize> = (0..y.len()).collect();
        let params = GbmParams {
            colsample: 0.5,
            tree: TreeParams {
                min_samples_leaf: 5,
                ..TreeParams::default()
            },
            ..GbmParams::default()
        };
        let a = QuantileGbm::fit(&x, &y, &rows, 0.5, params, 42).predict(&[50.0, 1.0]);
        let b = QuantileGbm::fit(&x, &y, &rows, 0.5, params, 42).predict(&[50.0, 1.0]);
        assert_eq!(a, b);
    }
}
