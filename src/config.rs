//! Model and run configuration.
//!
//! The six published model variants differ only in which supplementary
//! sources they blend in and which seasons they drop, so they are presets
//! over one [`ModelConfig`] rather than separate entry points.

use chrono::NaiveDate;
use clap::ValueEnum;
use std::path::PathBuf;

/// The nine hub-required quantile levels, paired with the exact string labels
/// the submission format expects for `output_type_id`.
pub const QUANTILE_LEVELS: [(f64, &str); 9] = [
    (0.025, "0.025"),
    (0.05, "0.05"),
    (0.10, "0.1"),
    (0.25, "0.25"),
    (0.50, "0.5"),
    (0.75, "0.75"),
    (0.90, "0.9"),
    (0.95, "0.95"),
    (0.975, "0.975"),
];

/// Variance-stabilizing transform applied to incidence before modeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerTransform {
    /// `(x + 0.01)^(1/4)`, the production setting for percentage series.
    FourthRoot,
    /// Shift only, no root. Used for diagnostics.
    Identity,
}

/// Published model variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Variant {
    /// Primary hub series only.
    Gbqr,
    /// Primary + ILINet.
    GbqrIlinet,
    /// Primary + FluSurv-NET.
    GbqrFlusurv,
    /// Primary + NHSN.
    GbqrNhsn,
    /// Primary + extra NSSP locations.
    GbqrNssp,
    /// Primary + all four supplementary sources.
    GbqrAll,
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Output-file naming component, e.g. "gbqr_nssp".
    pub model_name: String,

    // Supplementary sources; the primary hub series is always loaded.
    pub use_ilinet: bool,
    pub use_flusurvnet: bool,
    pub use_nhsn: bool,
    pub use_nssp_extra: bool,

    pub num_bags: usize,
    /// Fraction of training seasons sampled into each bag.
    pub bag_frac_samples: f64,

    /// Include level (lagged value) features alongside difference features.
    pub incl_level_feats: bool,
    pub power_transform: PowerTransform,

    /// Fit one ensemble per forecast location instead of pooling all series
    /// into a joint fit.
    pub fit_locations_separately: bool,

    /// Seasons excluded from training entirely, before scale/center factors
    /// are computed.
    pub drop_seasons: Vec<String>,
}

impl ModelConfig {
    fn base(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            use_ilinet: false,
            use_flusurvnet: false,
            use_nhsn: false,
            use_nssp_extra: false,
            num_bags: 100,
            bag_frac_samples: 0.7,
            incl_level_feats: true,
            power_transform: PowerTransform::FourthRoot,
            fit_locations_separately: false,
            drop_seasons: vec!["2020/21".into(), "2021/22".into()],
        }
    }

    /// Reduced-bagging mode for fast iteration. Identical algorithm path,
    /// only `num_bags` changes.
    pub fn with_short_run(mut self) -> Self {
        self.num_bags = (self.num_bags / 10).max(1);
        self
    }
}

impl Variant {
    pub fn model_config(self) -> ModelConfig {
        match self {
            Variant::Gbqr => ModelConfig::base("gbqr"),
            Variant::GbqrIlinet => ModelConfig {
                use_ilinet: true,
                ..ModelConfig::base("gbqr_ilinet")
            },
            Variant::GbqrFlusurv => ModelConfig {
                use_flusurvnet: true,
                ..ModelConfig::base("gbqr_flusurv")
            },
            Variant::GbqrNhsn => ModelConfig {
                use_nhsn: true,
                ..ModelConfig::base("gbqr_nhsn")
            },
            Variant::GbqrNssp => ModelConfig {
                use_nssp_extra: true,
                // NSSP history includes seasons with known reporting problems
                // plus the pandemic years; all are excluded.
                drop_seasons: [
                    "1997/98", "1998/99", "1999/00", "2000/01", "2001/02", "2002/03", "2008/09",
                    "2009/10", "2020/21", "2021/22", "2022/23",
                ]
                .iter()
                .map(|s| s.to_string())
                .collect(),
                ..ModelConfig::base("gbqr_nssp")
            },
            Variant::GbqrAll => ModelConfig {
                use_ilinet: true,
                use_flusurvnet: true,
                use_nhsn: true,
                use_nssp_extra: true,
                ..ModelConfig::base("gbqr_all")
            },
        }
    }
}

/// Runtime configuration for one forecast run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// The Saturday anchoring the forecast; also the as-of cutoff for
    /// versioned runs.
    pub ref_date: NaiveDate,
    /// Root of the hub checkout (crosswalk and local target-data cache).
    pub hub_root: PathBuf,
    /// Directory predictions are written beneath.
    pub output_root: PathBuf,
    /// Maximum forecast horizon in weeks.
    pub max_horizon: u32,
    /// Token for the GitHub commits API on versioned runs; never sent to any
    /// other host.
    pub github_token: Option<String>,
}

impl RunConfig {
    pub fn new(ref_date: NaiveDate, hub_root: PathBuf, output_root: PathBuf) -> Self {
        Self {
            ref_date,
            hub_root,
            output_root,
            max_horizon: 4,
            github_token: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantile_levels_sorted_and_labeled() {
        for pair in QUANTILE_LEVELS.windows(2) {
            assert!(pair[0].0 < pair[1].0);
        }
        assert_eq!(QUANTILE_LEVELS[2].1, "0.1");
        assert_eq!(QUANTILE_LEVELS[4].1, "0.5");
    }

    #[test]
    fn test_short_run_reduces_bags_only() {
        let full = Variant::GbqrNssp.model_config();
        let short = Variant::GbqrNssp.model_config().with_short_run();
        assert_eq!(full.num_bags, 100);
        assert_eq!(short.num_bags, 10);
        assert_eq!(full.drop_seasons, short.drop_seasons);
        assert_eq!(full.bag_frac_samples, short.bag_frac_samples);
    }

    #[test]
    fn test_variant_source_toggles() {
        assert!(!Variant::Gbqr.model_config().use_nssp_extra);
        assert!(Variant::GbqrNssp.model_config().use_nssp_extra);
        let all = Variant::GbqrAll.model_config();
        assert!(all.use_ilinet && all.use_flusurvnet && all.use_nhsn && all.use_nssp_extra);
    }
}
