//! The precomputed calendar dimension.
//!
//! Generated once over a fixed range covering all historical and near-future
//! dates, read-only thereafter. The calendar never participates in type-2
//! versioning.

use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::clean::date_key;

// ─── DateRow ─────────────────────────────────────────────────────────────────

/// One calendar day keyed by integer `yyyymmdd`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRow {
  pub date_key:        i32,
  pub full_date:       NaiveDate,
  /// 1 = Sunday … 7 = Saturday, matching the source warehouse convention.
  pub day_of_week:     u8,
  pub day_name:        &'static str,
  pub day_of_month:    u8,
  pub day_of_year:     u16,
  pub week_of_year:    u8,
  pub month_number:    u8,
  pub month_name:      &'static str,
  pub quarter:         u8,
  pub quarter_name:    String,
  pub year:            i32,
  pub is_weekend:      bool,
  /// No holiday feed is wired in; the flag exists for downstream overlays.
  pub is_holiday:      bool,
  /// April-start fiscal calendar labelled by its end year.
  pub fiscal_year:     i32,
  pub fiscal_quarter:  u8,
  pub is_business_day: bool,
}

const DAY_NAMES: [&str; 7] =
  ["Sunday", "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday"];

const MONTH_NAMES: [&str; 12] = [
  "January", "February", "March", "April", "May", "June", "July", "August",
  "September", "October", "November", "December",
];

impl DateRow {
  pub fn for_date(date: NaiveDate) -> Self {
    let dow_from_sunday = date.weekday().num_days_from_sunday() as u8; // 0 = Sunday
    let month = date.month() as u8;
    let quarter = (month - 1) / 3 + 1;
    let is_weekend = matches!(date.weekday(), Weekday::Sat | Weekday::Sun);

    // Fiscal year runs April to March and is labelled by the calendar year
    // it ends in; Jan-Mar belong to the fiscal year that started the
    // previous April.
    let fiscal_year = if month <= 3 { date.year() } else { date.year() + 1 };
    let fiscal_quarter = match month {
      1..=3 => quarter + 1,
      4..=6 => 1,
      7..=9 => 2,
      _ => 3,
    };

    Self {
      date_key: date_key(date),
      full_date: date,
      day_of_week: dow_from_sunday + 1,
      day_name: DAY_NAMES[dow_from_sunday as usize],
      day_of_month: date.day() as u8,
      day_of_year: date.ordinal() as u16,
      week_of_year: date.iso_week().week() as u8,
      month_number: month,
      month_name: MONTH_NAMES[(month - 1) as usize],
      quarter,
      quarter_name: format!("Q{quarter}"),
      year: date.year(),
      is_weekend,
      is_holiday: false,
      fiscal_year,
      fiscal_quarter,
      is_business_day: !is_weekend,
    }
  }
}

/// Generate the dense calendar for `[start, end]` inclusive.
pub fn build_calendar(start: NaiveDate, end: NaiveDate) -> Vec<DateRow> {
  let mut rows = Vec::new();
  let mut date = start;
  while date <= end {
    rows.push(DateRow::for_date(date));
    date = match date.checked_add_days(Days::new(1)) {
      Some(next) => next,
      None => break,
    };
  }
  rows
}

#[cfg(test)]
mod tests {
  use super::*;

  fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
  }

  #[test]
  fn date_key_and_names() {
    let row = DateRow::for_date(day(2010, 12, 1));
    assert_eq!(row.date_key, 20101201);
    assert_eq!(row.day_name, "Wednesday");
    assert_eq!(row.day_of_week, 4);
    assert_eq!(row.month_name, "December");
    assert_eq!(row.quarter, 4);
    assert_eq!(row.quarter_name, "Q4");
    assert!(!row.is_weekend);
    assert!(row.is_business_day);
  }

  #[test]
  fn weekends_are_not_business_days() {
    let saturday = DateRow::for_date(day(2010, 12, 4));
    assert_eq!(saturday.day_of_week, 7);
    assert!(saturday.is_weekend);
    assert!(!saturday.is_business_day);

    let sunday = DateRow::for_date(day(2010, 12, 5));
    assert_eq!(sunday.day_of_week, 1);
    assert!(sunday.is_weekend);
  }

  #[test]
  fn fiscal_calendar_starts_in_april() {
    // December 2010 sits in Q3 of the fiscal year ending 2011.
    let december = DateRow::for_date(day(2010, 12, 1));
    assert_eq!(december.fiscal_year, 2011);
    assert_eq!(december.fiscal_quarter, 3);

    // February belongs to the fiscal year that started the previous April.
    let february = DateRow::for_date(day(2011, 2, 15));
    assert_eq!(february.fiscal_year, 2011);
    assert_eq!(february.fiscal_quarter, 2);

    let april = DateRow::for_date(day(2011, 4, 1));
    assert_eq!(april.fiscal_year, 2012);
    assert_eq!(april.fiscal_quarter, 1);
  }

  #[test]
  fn build_calendar_is_dense_and_inclusive() {
    let rows = build_calendar(day(2010, 12, 30), day(2011, 1, 2));
    assert_eq!(rows.len(), 4);
    assert_eq!(rows.first().unwrap().date_key, 20101230);
    assert_eq!(rows.last().unwrap().date_key, 20110102);
  }
}
