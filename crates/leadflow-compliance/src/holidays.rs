// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Self-computing holiday calendar.
//!
//! Federal holidays are derived per year from weekday arithmetic and fixed
//! dates. Fixed-date holidays block both the actual date and the observed
//! weekday (Saturday observed Friday, Sunday observed Monday). Strict
//! jurisdictions additionally block Good Friday and the day after
//! Thanksgiving.

use std::collections::HashSet;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::Serialize;

/// One blocked calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Holiday {
    pub date: NaiveDate,
    pub name: &'static str,
    /// `true` when `date` is a weekday substitute for a weekend holiday.
    pub observed: bool,
}

/// The `n`th (1-based) `weekday` of a month.
pub fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u8) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, n)
}

/// The last `weekday` of a month.
pub fn last_weekday(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    let last = first_of_next.pred_opt()?;
    let back = (7 + last.weekday().num_days_from_monday() - weekday.num_days_from_monday()) % 7;
    Some(last - Duration::days(i64::from(back)))
}

/// Gregorian Easter Sunday (anonymous Gregorian algorithm).
pub fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}

/// Weekday a weekend holiday is observed on. Weekdays are unchanged.
pub fn observed(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date - Duration::days(1),
        Weekday::Sun => date + Duration::days(1),
        _ => date,
    }
}

fn fixed(out: &mut Vec<Holiday>, year: i32, month: u32, day: u32, name: &'static str) {
    let Some(date) = NaiveDate::from_ymd_opt(year, month, day) else {
        return;
    };
    out.push(Holiday {
        date,
        name,
        observed: false,
    });
    let shifted = observed(date);
    if shifted != date && shifted.year() == year {
        out.push(Holiday {
            date: shifted,
            name,
            observed: true,
        });
    }
}

fn floating(out: &mut Vec<Holiday>, date: Option<NaiveDate>, name: &'static str) {
    if let Some(date) = date {
        out.push(Holiday {
            date,
            name,
            observed: false,
        });
    }
}

/// Federal holidays blocked during `year`, sorted by date.
///
/// Includes December 31 when the following New Year's Day falls on a Saturday.
pub fn federal_holidays(year: i32) -> Vec<Holiday> {
    let mut out = Vec::with_capacity(16);
    fixed(&mut out, year, 1, 1, "New Year's Day");
    floating(&mut out, nth_weekday(year, 1, Weekday::Mon, 3), "Martin Luther King Jr. Day");
    floating(&mut out, nth_weekday(year, 2, Weekday::Mon, 3), "Washington's Birthday");
    floating(&mut out, last_weekday(year, 5, Weekday::Mon), "Memorial Day");
    fixed(&mut out, year, 6, 19, "Juneteenth");
    fixed(&mut out, year, 7, 4, "Independence Day");
    floating(&mut out, nth_weekday(year, 9, Weekday::Mon, 1), "Labor Day");
    floating(&mut out, nth_weekday(year, 10, Weekday::Mon, 2), "Columbus Day");
    fixed(&mut out, year, 11, 11, "Veterans Day");
    floating(&mut out, thanksgiving(year), "Thanksgiving Day");
    fixed(&mut out, year, 12, 25, "Christmas Day");

    if let Some(next_new_year) = NaiveDate::from_ymd_opt(year + 1, 1, 1) {
        if next_new_year.weekday() == Weekday::Sat {
            out.push(Holiday {
                date: next_new_year - Duration::days(1),
                name: "New Year's Day",
                observed: true,
            });
        }
    }

    out.sort();
    out
}

fn thanksgiving(year: i32) -> Option<NaiveDate> {
    nth_weekday(year, 11, Weekday::Thu, 4)
}

/// Extra holidays blocked in strict jurisdictions during `year`.
pub fn strict_holidays(year: i32) -> Vec<Holiday> {
    let mut out = Vec::with_capacity(2);
    floating(
        &mut out,
        easter_sunday(year).map(|easter| easter - Duration::days(2)),
        "Good Friday",
    );
    floating(
        &mut out,
        thanksgiving(year).map(|t| t + Duration::days(1)),
        "Day after Thanksgiving",
    );
    out
}

/// Holiday lookup aware of which jurisdictions are strict.
#[derive(Debug, Clone)]
pub struct HolidayCalendar {
    strict_states: HashSet<String>,
}

impl HolidayCalendar {
    pub fn new<I, S>(strict_states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            strict_states: strict_states
                .into_iter()
                .map(|s| s.as_ref().trim().to_ascii_uppercase())
                .collect(),
        }
    }

    pub fn is_strict(&self, state_code: Option<&str>) -> bool {
        state_code
            .map(|code| self.strict_states.contains(&code.trim().to_ascii_uppercase()))
            .unwrap_or(false)
    }

    /// Every holiday blocked in `year` for a jurisdiction, sorted by date.
    pub fn holidays(&self, year: i32, state_code: Option<&str>) -> Vec<Holiday> {
        let mut all = federal_holidays(year);
        if self.is_strict(state_code) {
            all.extend(strict_holidays(year));
            all.sort();
        }
        all
    }

    /// The holiday blocking `date` in a jurisdiction, if any.
    pub fn holiday_on(&self, date: NaiveDate, state_code: Option<&str>) -> Option<Holiday> {
        self.holidays(date.year(), state_code)
            .into_iter()
            .find(|h| h.date == date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn dates(holidays: &[Holiday]) -> Vec<NaiveDate> {
        holidays.iter().map(|h| h.date).collect()
    }

    #[test]
    fn easter_known_years() {
        assert_eq!(easter_sunday(2024), Some(d(2024, 3, 31)));
        assert_eq!(easter_sunday(2025), Some(d(2025, 4, 20)));
        assert_eq!(easter_sunday(2026), Some(d(2026, 4, 5)));
        assert_eq!(easter_sunday(2038), Some(d(2038, 4, 25)));
    }

    #[test]
    fn weekday_arithmetic() {
        assert_eq!(nth_weekday(2026, 1, Weekday::Mon, 3), Some(d(2026, 1, 19)));
        assert_eq!(last_weekday(2026, 5, Weekday::Mon), Some(d(2026, 5, 25)));
        assert_eq!(last_weekday(2026, 12, Weekday::Thu), Some(d(2026, 12, 31)));
        assert_eq!(thanksgiving(2026), Some(d(2026, 11, 26)));
    }

    #[test]
    fn federal_2026() {
        let holidays = federal_holidays(2026);
        assert_eq!(
            dates(&holidays),
            vec![
                d(2026, 1, 1),
                d(2026, 1, 19),
                d(2026, 2, 16),
                d(2026, 5, 25),
                d(2026, 6, 19),
                d(2026, 7, 3),
                d(2026, 7, 4),
                d(2026, 9, 7),
                d(2026, 10, 12),
                d(2026, 11, 11),
                d(2026, 11, 26),
                d(2026, 12, 25),
            ]
        );
        let july3 = holidays.iter().find(|h| h.date == d(2026, 7, 3)).unwrap();
        assert!(july3.observed);
        assert_eq!(july3.name, "Independence Day");
    }

    #[test]
    fn sunday_holiday_observed_monday() {
        // July 4, 2021 was a Sunday.
        let holidays = federal_holidays(2021);
        assert!(holidays.iter().any(|h| h.date == d(2021, 7, 5) && h.observed));
    }

    #[test]
    fn saturday_new_year_observed_in_previous_year() {
        // January 1, 2022 was a Saturday.
        let calendar = HolidayCalendar::new(Vec::<String>::new());
        let observed = calendar.holiday_on(d(2021, 12, 31), Some("TX")).unwrap();
        assert_eq!(observed.name, "New Year's Day");
        assert!(observed.observed);
        assert!(calendar.holiday_on(d(2022, 1, 1), Some("TX")).is_some());
        // Christmas 2021 (Saturday) is also observed on Friday the 24th.
        assert!(calendar.holiday_on(d(2021, 12, 24), None).is_some());
    }

    #[test]
    fn strict_states_add_good_friday_and_black_friday() {
        let calendar = HolidayCalendar::new(["FL", "ok"]);
        assert!(calendar.is_strict(Some("fl")));
        assert!(calendar.is_strict(Some("OK")));
        assert!(!calendar.is_strict(Some("TX")));
        assert!(!calendar.is_strict(None));

        let good_friday = d(2026, 4, 3);
        assert_eq!(
            calendar.holiday_on(good_friday, Some("FL")).map(|h| h.name),
            Some("Good Friday")
        );
        assert!(calendar.holiday_on(good_friday, Some("TX")).is_none());
        assert!(calendar.holiday_on(d(2026, 11, 27), Some("OK")).is_some());
        assert!(calendar.holiday_on(d(2026, 11, 27), Some("CA")).is_none());
    }

    #[test]
    fn ordinary_day_is_not_a_holiday() {
        let calendar = HolidayCalendar::new(["FL"]);
        assert!(calendar.holiday_on(d(2026, 3, 10), Some("FL")).is_none());
    }
}
