//! Append-only revision log with point-in-time queries.
//!
//! Every versioned source funnels through this table so that operational
//! ("as of now") and retrospective ("as of some past Saturday") runs resolve
//! revisions through the same code path.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::warn;

#[derive(Debug, Clone)]
struct Revision {
    as_of: NaiveDate,
    value: f64,
    /// Ingestion order, used to break ties between revisions that share an
    /// as-of date: the most recently ingested record wins.
    seq: u64,
}

/// One resolved observation from a point-in-time query.
#[derive(Debug, Clone, PartialEq)]
pub struct PointInTime {
    pub location: String,
    pub date: NaiveDate,
    pub value: f64,
    pub as_of: NaiveDate,
}

/// Revisions keyed by `(location, observation date)`.
#[derive(Debug, Default)]
pub struct VersionedTable {
    revisions: BTreeMap<(String, NaiveDate), Vec<Revision>>,
    next_seq: u64,
}

impl VersionedTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one revision. An observation cannot be known before it
    /// occurred; rows violating `as_of >= date` are dropped with a warning.
    pub fn insert(&mut self, location: &str, date: NaiveDate, as_of: NaiveDate, value: f64) {
        if as_of < date {
            warn!(location, %date, %as_of, "Dropping revision with as_of before observation date");
            return;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.revisions
            .entry((location.to_string(), date))
            .or_default()
            .push(Revision { as_of, value, seq });
    }

    /// Resolves each `(location, date)` to its most recent revision with
    /// `as_of <= cutoff` (or the most recent revision overall when `cutoff`
    /// is `None`). Keys with no qualifying revision are omitted.
    pub fn snapshot(&self, cutoff: Option<NaiveDate>) -> Vec<PointInTime> {
        let mut out = Vec::new();
        for ((location, date), revs) in &self.revisions {
            let best = revs
                .iter()
                .filter(|r| cutoff.is_none_or(|c| r.as_of <= c))
                .max_by_key(|r| (r.as_of, r.seq));
            if let Some(rev) = best {
                out.push(PointInTime {
                    location: location.clone(),
                    date: *date,
                    value: rev.value,
                    as_of: rev.as_of,
                });
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_snapshot_picks_latest_revision_within_cutoff() {
        let mut table = VersionedTable::new();
        table.insert("co", d(2025, 11, 1), d(2025, 11, 3), 1.2);
        table.insert("co", d(2025, 11, 1), d(2025, 11, 10), 1.5);
        table.insert("co", d(2025, 11, 1), d(2025, 11, 17), 1.4);

        let snap = table.snapshot(Some(d(2025, 11, 12)));
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].value, 1.5);
        assert_eq!(snap[0].as_of, d(2025, 11, 10));

        // No cutoff resolves to the final revision.
        let snap = table.snapshot(None);
        assert_eq!(snap[0].value, 1.4);
    }

    #[test]
    fn test_as_of_monotonicity() {
        let mut table = VersionedTable::new();
        table.insert("ga", d(2025, 10, 4), d(2025, 10, 6), 0.8);
        table.insert("ga", d(2025, 10, 4), d(2025, 10, 20), 0.9);

        let early = table.snapshot(Some(d(2025, 10, 10)));
        let late = table.snapshot(Some(d(2025, 10, 25)));
        assert!(late[0].as_of >= early[0].as_of);
    }

    #[test]
    fn test_tie_broken_by_ingestion_order() {
        let mut table = VersionedTable::new();
        table.insert("tx", d(2025, 11, 8), d(2025, 11, 10), 2.0);
        table.insert("tx", d(2025, 11, 8), d(2025, 11, 10), 2.5);

        let snap = table.snapshot(None);
        assert_eq!(snap[0].value, 2.5);
    }

    #[test]
    fn test_rejects_as_of_before_date() {
        let mut table = VersionedTable::new();
        table.insert("me", d(2025, 11, 8), d(2025, 11, 1), 3.0);
        assert!(table.is_empty());
    }

    #[test]
    fn test_key_with_no_qualifying_revision_is_omitted() {
        let mut table = VersionedTable::new();
        table.insert("md", d(2025, 11, 8), d(2025, 11, 10), 1.0);
        assert!(table.snapshot(Some(d(2025, 11, 9))).is_empty());
    }
}
