//! Rebalance schedule: frequency codes evaluated against a business-day calendar.
//!
//! Deterministic, pure logic. No IO, no wall-clock.
//!
//! | code            | meaning                                   |
//! |-----------------|-------------------------------------------|
//! | unset, 0, 1     | every evaluation date                     |
//! | 2               | last business day of the (Mon–Sun) week   |
//! | 3               | last business day of the month            |
//! | 4               | last business day of a quarter            |
//! | 5               | last business day of the year             |
//! | 101 ..= 123     | the (code − 100)th business day of month  |

use chrono::{Datelike, Days, NaiveDate};
use rbk_host::Calendar;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RebalanceFrequency {
    Daily,
    WeekEnd,
    MonthEnd,
    QuarterEnd,
    YearEnd,
    /// 1-based business-day index within the month.
    NthBusinessDay(u32),
}

impl RebalanceFrequency {
    /// Decode a configured frequency code. Unknown codes fall back to daily.
    pub fn from_code(code: Option<f64>) -> Self {
        let Some(c) = code.filter(|c| c.is_finite()) else {
            return RebalanceFrequency::Daily;
        };
        match c.round() as i64 {
            0 | 1 => RebalanceFrequency::Daily,
            2 => RebalanceFrequency::WeekEnd,
            3 => RebalanceFrequency::MonthEnd,
            4 => RebalanceFrequency::QuarterEnd,
            5 => RebalanceFrequency::YearEnd,
            n @ 101..=123 => RebalanceFrequency::NthBusinessDay((n - 100) as u32),
            other => {
                tracing::warn!(code = other, "unknown rebalancing frequency; rebalancing daily");
                RebalanceFrequency::Daily
            }
        }
    }

    pub fn is_due<C: Calendar + ?Sized>(&self, calendar: &C, date: NaiveDate) -> bool {
        match self {
            RebalanceFrequency::Daily => true,
            RebalanceFrequency::WeekEnd => is_last_business_day_of_week(calendar, date),
            RebalanceFrequency::MonthEnd => is_last_business_day_of_month(calendar, date),
            RebalanceFrequency::QuarterEnd => {
                date.month() % 3 == 0 && is_last_business_day_of_month(calendar, date)
            }
            RebalanceFrequency::YearEnd => date.month() == 12 && is_last_business_day_of_month(calendar, date),
            RebalanceFrequency::NthBusinessDay(n) => business_day_of_month(calendar, date) == Some(*n),
        }
    }
}

fn following_days(date: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    (1..).map_while(move |i| date.checked_add_days(Days::new(i)))
}

fn is_last_business_day_of_week<C: Calendar + ?Sized>(calendar: &C, date: NaiveDate) -> bool {
    if !calendar.is_business_day(date) {
        return false;
    }
    let remaining = 6 - date.weekday().num_days_from_monday() as usize;
    !following_days(date)
        .take(remaining)
        .any(|d| calendar.is_business_day(d))
}

fn is_last_business_day_of_month<C: Calendar + ?Sized>(calendar: &C, date: NaiveDate) -> bool {
    if !calendar.is_business_day(date) {
        return false;
    }
    !following_days(date)
        .take_while(|d| d.month() == date.month())
        .any(|d| calendar.is_business_day(d))
}

/// 1-based index of `date` among the month's business days; `None` if
/// `date` is not a business day.
fn business_day_of_month<C: Calendar + ?Sized>(calendar: &C, date: NaiveDate) -> Option<u32> {
    if !calendar.is_business_day(date) {
        return None;
    }
    let count = (1..=date.day())
        .filter_map(|day| date.with_day(day))
        .filter(|d| calendar.is_business_day(*d))
        .count();
    Some(count as u32)
}
