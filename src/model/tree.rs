//! Binary regression tree used as the boosting base learner.
//!
//! Splits maximize variance reduction of the boosting gradients. Missing
//! feature values (NaN) always route to the right child, so rows with short
//! lag history or unknown population still receive predictions.

/// Tree growth limits.
#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: u32,
    pub min_samples_leaf: usize,
    /// Cap on candidate thresholds per feature; above it, candidates are
    /// quantile-spaced over the observed values.
    pub max_thresholds: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 5,
            min_samples_leaf: 20,
            max_thresholds: 32,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A fitted regression tree over row-major feature vectors.
#[derive(Debug, Clone)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl RegressionTree {
    /// Fits a tree to `grad` over the rows in `rows`, restricted to the
    /// feature indices in `features`. `leaf_value` maps the row set of a
    /// finished leaf to its output (the boosting layer supplies a residual
    /// quantile there).
    pub fn fit(
        x: &[Vec<f64>],
        grad: &[f64],
        rows: &[usize],
        features: &[usize],
        params: TreeParams,
        leaf_value: &dyn Fn(&[usize]) -> f64,
    ) -> Self {
        let mut tree = RegressionTree { nodes: Vec::new() };
        tree.grow(x, grad, rows, features, params, leaf_value, 0);
        tree
    }

    fn grow(
        &mut self,
        x: &[Vec<f64>],
        grad: &[f64],
        rows: &[usize],
        features: &[usize],
        params: TreeParams,
        leaf_value: &dyn Fn(&[usize]) -> f64,
        depth: u32,
    ) -> usize {
        let split = if depth >= params.max_depth || rows.len() < 2 * params.min_samples_leaf {
            None
        } else {
            best_split(x, grad, rows, features, params)
        };

        match split {
            None => {
                self.nodes.push(Node::Leaf {
                    value: leaf_value(rows),
                });
                self.nodes.len() - 1
            }
            Some(s) => {
                let (left_rows, right_rows) = partition(x, rows, s.feature, s.threshold);
                let left = self.grow(x, grad, &left_rows, features, params, leaf_value, depth + 1);
                let right = self.grow(x, grad, &right_rows, features, params, leaf_value, depth + 1);
                self.nodes.push(Node::Split {
                    feature: s.feature,
                    threshold: s.threshold,
                    left,
                    right,
                });
                self.nodes.len() - 1
            }
        }
    }

    pub fn predict_row(&self, features: &[f64]) -> f64 {
        // The root is pushed last.
        let mut idx = self.nodes.len() - 1;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let v = features[*feature];
                    // NaN comparisons are false, sending missing values right.
                    idx = if v < *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Whether the tree is a single leaf (no useful split was found).
    pub fn is_stump(&self) -> bool {
        self.nodes.len() == 1
    }
}

fn partition(x: &[Vec<f64>], rows: &[usize], feature: usize, threshold: f64) -> (Vec<usize>, Vec<usize>) {
    let mut left = Vec::new();
    let mut right = Vec::new();
    for &r in rows {
        if x[r][feature] < threshold {
            left.push(r);
        } else {
            right.push(r);
        }
    }
    (left, right)
}

fn best_split(
    x: &[Vec<f64>],
    grad: &[f64],
    rows: &[usize],
    features: &[usize],
    params: TreeParams,
) -> Option<BestSplit> {
    let total_sum: f64 = rows.iter().map(|&r| grad[r]).sum();
    let total_sq: f64 = rows.iter().map(|&r| grad[r] * grad[r]).sum();
    let n = rows.len() as f64;
    let parent_sse = total_sq - total_sum * total_sum / n;

    let mut best: Option<BestSplit> = None;

    for &f in features {
        // Rows with a present value, sorted by it; NaN rows stay on the
        // right side of every candidate split.
        let mut present: Vec<(f64, f64)> = rows
            .iter()
            .filter_map(|&r| {
                let v = x[r][f];
                if v.is_nan() { None } else { Some((v, grad[r])) }
            })
            .collect();
        if present.len() < 2 {
            continue;
        }
        present.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let nan_count = rows.len() - present.len();
        let candidates = candidate_thresholds(&present, params.max_thresholds);

        let mut i = 0;
        let mut left_n = 0usize;
        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        for threshold in candidates {
            while i < present.len() && present[i].0 < threshold {
                left_n += 1;
                left_sum += present[i].1;
                left_sq += present[i].1 * present[i].1;
                i += 1;
            }
            let right_n = present.len() - left_n + nan_count;
            if left_n < params.min_samples_leaf || right_n < params.min_samples_leaf {
                continue;
            }

            // Right side is everything not strictly below the threshold,
            // NaN rows included.
            let right_sum = total_sum - left_sum;
            let right_sq = total_sq - left_sq;
            let sse_left = left_sq - left_sum * left_sum / left_n as f64;
            let sse_right = right_sq - right_sum * right_sum / right_n as f64;
            let gain = parent_sse - sse_left - sse_right;

            if gain > 1e-12 && best.as_ref().is_none_or(|b| gain > b.gain) {
                best = Some(BestSplit {
                    feature: f,
                    threshold,
                    gain,
                });
            }
        }
    }

    best
}

/// Candidate thresholds between distinct observed values, thinned to at most
/// `max_thresholds` evenly spaced picks.
fn candidate_thresholds(sorted: &[(f64, f64)], max_thresholds: usize) -> Vec<f64> {
    let mut cuts = Vec::new();
    for pair in sorted.windows(2) {
        if pair[1].0 > pair[0].0 {
            cuts.push((pair[0].0 + pair[1].0) / 2.0);
        }
    }
    if cuts.len() <= max_thresholds {
        return cuts;
    }
    let step = cuts.len() as f64 / max_thresholds as f64;
    (0..max_thresholds)
        .map(|k| cuts[(k as f64 * step) as usize])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::util::mean;

    fn leaf_mean<'a>(grad: &'a [f64]) -> impl Fn(&[usize]) -> f64 + 'a {
        move |rows: &[usize]| mean(&rows.iter().map(|&r| grad[r]).collect::<Vec<_>>())
    }

    #[test]
    fn test_constant_target_yields_stump() {
        let x: Vec<Vec<f64>> = (0..50).map(|i| vec![i as f64]).collect();
        let grad = vec![1.5; 50];
        let rows: Vec<usize> = (0..50).collect();
        let tree = RegressionTree::fit(
            &x,
            &grad,
            &rows,
            &[0],
            TreeParams::default(),
            &leaf_mean(&grad),
        );
        assert!(tree.is_stump());
        assert_eq!(tree.predict_row(&[123.0]), 1.5);
    }

    #[test]
    fn test_recovers_step_function() {
        let x: Vec<Vec<f64>> = (0..100).map(|i| vec![i as f64]).collect();
        let grad: Vec<f64> = (0..100).map(|i| if i < 50 { -1.0 } else { 1.0 }).collect();
        let rows: Vec<usize> = (0..100).collect();
        let params = TreeParams {
            max_depth: 2,
            min_samples_leaf: 5,
            max_thresholds: 128,
        };
        let tree = RegressionTree::fit(&x, &grad, &rows, &[0], params, &leaf_mean(&grad));
        assert_eq!(tree.predict_row(&[10.0]), -1.0);
        assert_eq!(tree.predict_row(&[90.0]), 1.0);
    }

    #[test]
    fn test_nan_routes_right() {
        let x: Vec<Vec<f64>> = (0..100).map(|i| vec![i as f64]).collect();
        let grad: Vec<f64> = (0..100).map(|i| if i < 50 { -1.0 } else { 1.0 }).collect();
        let rows: Vec<usize> = (0..100).collect();
        let params = TreeParams {
            max_depth: 1,
            min_samples_leaf: 5,
            max_thresholds: 128,
        };
        let tree = RegressionTree::fit(&x, &grad, &rows, &[0], params, &leaf_mean(&grad));
        // A missing feature value lands in the right (>= threshold) leaf.
        assert_eq!(tree.predict_row(&[f64::NAN]), tree.predict_row(&[99.0]));
    }

    #[test]
    fn test_min_samples_leaf_respected() {
        // Ten rows with min leaf of 8 cannot split.
        let x: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let grad: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let rows: Vec<usize> = (0..10).collect();
        let params = TreeParams {
            max_depth: 3,
            min_samples_leaf: 8,
            max_thresholds: 32,
        };
        let tree = RegressionTree::fit(&x, &grad, &rows, &[0], params, &leaf_mean(&grad));
        assert!(tree.is_stump());
    }
}
