//! Variance-stabilizing transform and per-location normalization.
//!
//! Pipeline: fourth-root power transform, then per-(source, location) scale
//! by the 95th percentile of in-season values, then centering by the mean of
//! the scaled in-season values. The inverse undoes centering and scaling
//! before the power inverse, clamping at zero.

use std::collections::HashMap;

use crate::config::PowerTransform;
use crate::sources::{Observation, Source};

/// Season weeks contributing to scale/center factors. Shoulder weeks carry
/// mostly noise and would drag the factors toward zero.
const FACTOR_WEEK_RANGE: (u32, u32) = (10, 45);

/// Shift keeping zero-valued weeks finite under the root, and flooring the
/// scale divisor away from zero for near-constant series.
const SHIFT: f64 = 0.01;

/// Normalization constants for one `(source, location)` series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformFactors {
    pub scale: f64,
    pub center: f64,
}

/// An observation with its transformed and normalized values.
#[derive(Debug, Clone)]
pub struct TransformedObs {
    pub obs: Observation,
    /// Power-transformed incidence.
    pub inc_trans: f64,
    /// Scaled and centered transformed incidence, the modeling scale.
    pub inc_trans_cs: f64,
}

/// Transformed observations plus the factors needed to invert them.
#[derive(Debug)]
pub struct TransformedFrame {
    pub rows: Vec<TransformedObs>,
    pub factors: HashMap<(Source, String), TransformFactors>,
}

pub fn power_transform(inc: f64, power: PowerTransform) -> f64 {
    match power {
        PowerTransform::FourthRoot => (inc + SHIFT).powf(0.25),
        PowerTransform::Identity => inc + SHIFT,
    }
}

pub fn inverse_power_transform(inc_trans: f64, power: PowerTransform) -> f64 {
    match power {
        PowerTransform::FourthRoot => inc_trans.max(0.0).powi(4) - SHIFT,
        PowerTransform::Identity => inc_trans - SHIFT,
    }
}

/// Inverts the full chain for one normalized value: un-center, un-scale,
/// inverse power transform, clamp at zero.
pub fn inverse_transform(inc_trans_cs: f64, factors: TransformFactors, power: PowerTransform) -> f64 {
    let inc_trans = (inc_trans_cs + factors.center) * (factors.scale + SHIFT);
    inverse_power_transform(inc_trans, power).max(0.0)
}

fn in_factor_window(season_week: u32) -> bool {
    (FACTOR_WEEK_RANGE.0..=FACTOR_WEEK_RANGE.1).contains(&season_week)
}

/// Linear-interpolated quantile of an unsorted sample.
fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = q * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            let frac = pos - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Applies the power transform and per-series scale/center normalization to
/// the pooled frame.
pub fn apply_scale_center_transform(
    rows: Vec<Observation>,
    power: PowerTransform,
) -> TransformedFrame {
    // Group transformed values by (source, location); the factor window
    // prefers in-season weeks, falling back to the whole series for groups
    // observed only off-season.
    let mut trans: Vec<f64> = Vec::with_capacity(rows.len());
    let mut groups: HashMap<(Source, String), Vec<usize>> = HashMap::new();
    for (i, obs) in rows.iter().enumerate() {
        trans.push(power_transform(obs.inc, power));
        groups
            .entry((obs.source, obs.location.clone()))
            .or_default()
            .push(i);
    }

    let mut factors = HashMap::new();
    for (key, indices) in &groups {
        let in_season: Vec<f64> = indices
            .iter()
            .filter(|&&i| in_factor_window(rows[i].season_week))
            .map(|&i| trans[i])
            .collect();
        let all: Vec<f64> = indices.iter().map(|&i| trans[i]).collect();
        let window = if in_season.is_empty() { &all } else { &in_season };

        let scale = quantile(window, 0.95);
        let scaled: Vec<f64> = window.iter().map(|t| t / (scale + SHIFT)).collect();
        let center = mean(&scaled);

        factors.insert(key.clone(), TransformFactors { scale, center });
    }

    let transformed = rows
        .into_iter()
        .enumerate()
        .map(|(i, obs)| {
            let f = factors[&(obs.source, obs.location.clone())];
            let inc_trans = trans[i];
            let inc_trans_cs = inc_trans / (f.scale + SHIFT) - f.center;
            TransformedObs {
                obs,
                inc_trans,
                inc_trans_cs,
            }
        })
        .collect();

    TransformedFrame {
        rows: transformed,
        factors,
    }
}
