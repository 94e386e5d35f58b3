//! MMWR epidemiological week arithmetic.
//!
//! Surveillance seasons run from epiweek 40 of one year through epiweek 39 of
//! the next, so season week 1 is epiweek 40 and season week 13 is epiweek 52.

use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// An MMWR epidemiological week (year, week). Weeks run Sunday through
/// Saturday; week 1 is the first week of the year containing at least four
/// days of January.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Epiweek {
    pub year: i32,
    pub week: u32,
}

/// First day (Sunday) of MMWR week 1 for the given year.
fn start_of_epiyear(year: i32) -> NaiveDate {
    // Callers only pass years adjacent to a valid date's year, so the
    // from_ymd lookups cannot fail for any representable input.
    let jan_one = NaiveDate::from_ymd_opt(year, 1, 1).unwrap();
    let dow = jan_one.weekday().num_days_from_sunday() as i64;
    if dow <= 3 {
        // Jan 1 falls Sun..Wed: its week has >= 4 January days.
        jan_one - Duration::days(dow)
    } else {
        jan_one + Duration::days(7 - dow)
    }
}

/// Converts a calendar date to its MMWR epiweek.
pub fn date_to_epiweek(date: NaiveDate) -> Epiweek {
    let mut year = date.year();
    let mut start = start_of_epiyear(year);

    if date < start {
        year -= 1;
        start = start_of_epiyear(year);
    } else {
        let next_start = start_of_epiyear(year + 1);
        if date >= next_start {
            year += 1;
            start = next_start;
        }
    }

    let week = ((date - start).num_days() / 7 + 1) as u32;
    Epiweek { year, week }
}

/// Season label for a date, e.g. 2023-12-02 -> "2023/24".
pub fn date_to_season(date: NaiveDate) -> String {
    let ew = date_to_epiweek(date);
    let start_year = if ew.week >= 40 { ew.year } else { ew.year - 1 };
    format!("{}/{:02}", start_year, (start_year + 1) % 100)
}

/// Week number within the season (1..=52): epiweek 40 is season week 1,
/// epiweek 1 is season week 14.
pub fn date_to_season_week(date: NaiveDate) -> u32 {
    let ew = date_to_epiweek(date);
    if ew.week >= 40 { ew.week - 39 } else { ew.week + 13 }
}

/// The Saturday on or after `date`; forecast reference dates always fall on
/// the Saturday closing the current epiweek.
pub fn next_saturday(date: NaiveDate) -> NaiveDate {
    let days_ahead = (Weekday::Sat.num_days_from_sunday() + 7
        - date.weekday().num_days_from_sunday())
        % 7;
    date + Duration::days(days_ahead as i64)
}
