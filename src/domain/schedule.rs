//! Recurrence patterns and lazy trigger-date cursors.
//!
//! A [`Schedule`] couples an anchor date with a [`Recurrence`] and an optional
//! repetition limit. Trigger dates are produced one at a time by
//! [`Schedule::next_due`]; nothing is materialised up front, so unbounded
//! patterns cost nothing until the simulation pulls from them.

use chrono::{Datelike, Days, Months, NaiveDate, Weekday};
use std::fmt;
use std::str::FromStr;

/// Closed set of recurrence codes accepted in a rule file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Recurrence {
    /// Fires once, on the anchor date.
    OneShot,
    /// `D`: every calendar day.
    Daily,
    /// `B`: every weekday.
    BusinessDaily,
    /// `W-MON` .. `W-SUN` (`W` alone means Sunday).
    Weekly(Weekday),
    /// `MS`: first calendar day of each month.
    MonthStart,
    /// `ME`: last calendar day of each month.
    MonthEnd,
    /// `BMS`: first weekday of each month.
    BusinessMonthStart,
    /// `BME`: last weekday of each month.
    BusinessMonthEnd,
    /// `QS`: first day of January, April, July and October.
    QuarterStart,
    /// `QE`: last day of March, June, September and December.
    QuarterEnd,
    /// `YS`: January 1st.
    YearStart,
    /// `YE`: December 31st.
    YearEnd,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown recurrence code '{0}'")]
pub struct UnknownRecurrence(pub String);

impl FromStr for Recurrence {
    type Err = UnknownRecurrence;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        let recurrence = match code.to_uppercase().as_str() {
            "D" => Recurrence::Daily,
            "B" => Recurrence::BusinessDaily,
            "W" | "W-SUN" => Recurrence::Weekly(Weekday::Sun),
            "W-MON" => Recurrence::Weekly(Weekday::Mon),
            "W-TUE" => Recurrence::Weekly(Weekday::Tue),
            "W-WED" => Recurrence::Weekly(Weekday::Wed),
            "W-THU" => Recurrence::Weekly(Weekday::Thu),
            "W-FRI" => Recurrence::Weekly(Weekday::Fri),
            "W-SAT" => Recurrence::Weekly(Weekday::Sat),
            "MS" => Recurrence::MonthStart,
            "ME" | "M" => Recurrence::MonthEnd,
            "BMS" => Recurrence::BusinessMonthStart,
            "BME" | "BM" => Recurrence::BusinessMonthEnd,
            "QS" => Recurrence::QuarterStart,
            "QE" | "Q" => Recurrence::QuarterEnd,
            "YS" | "AS" => Recurrence::YearStart,
            "YE" | "Y" | "A" => Recurrence::YearEnd,
            _ => return Err(UnknownRecurrence(code.to_string())),
        };
        Ok(recurrence)
    }
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recurrence::OneShot => write!(f, "once"),
            Recurrence::Daily => write!(f, "D"),
            Recurrence::BusinessDaily => write!(f, "B"),
            Recurrence::Weekly(day) => write!(f, "W-{}", weekday_code(*day)),
            Recurrence::MonthStart => write!(f, "MS"),
            Recurrence::MonthEnd => write!(f, "ME"),
            Recurrence::BusinessMonthStart => write!(f, "BMS"),
            Recurrence::BusinessMonthEnd => write!(f, "BME"),
            Recurrence::QuarterStart => write!(f, "QS"),
            Recurrence::QuarterEnd => write!(f, "QE"),
            Recurrence::YearStart => write!(f, "YS"),
            Recurrence::YearEnd => write!(f, "YE"),
        }
    }
}

fn weekday_code(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MON",
        Weekday::Tue => "TUE",
        Weekday::Wed => "WED",
        Weekday::Thu => "THU",
        Weekday::Fri => "FRI",
        Weekday::Sat => "SAT",
        Weekday::Sun => "SUN",
    }
}

fn is_weekday(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn last_of_month(date: NaiveDate) -> NaiveDate {
    first_of_month(date)
        .checked_add_months(Months::new(1))
        .and_then(|d| d.pred_opt())
        .unwrap_or(date)
}

fn first_weekday_of_month(date: NaiveDate) -> NaiveDate {
    let mut day = first_of_month(date);
    while !is_weekday(day) {
        day = day.succ_opt().unwrap_or(day);
    }
    day
}

fn last_weekday_of_month(date: NaiveDate) -> NaiveDate {
    let mut day = last_of_month(date);
    while !is_weekday(day) {
        day = day.pred_opt().unwrap_or(day);
    }
    day
}

impl Recurrence {
    /// Smallest date on or after `since` that satisfies this recurrence.
    ///
    /// `OneShot` has no rule of its own; it is resolved against the anchor by
    /// [`Schedule::next_due`], so this returns `since` for it.
    pub fn next_on_or_after(self, since: NaiveDate) -> Option<NaiveDate> {
        match self {
            Recurrence::OneShot | Recurrence::Daily => Some(since),
            Recurrence::BusinessDaily => {
                let mut day = since;
                while !is_weekday(day) {
                    day = day.succ_opt()?;
                }
                Some(day)
            }
            Recurrence::Weekly(target) => {
                let ahead = (7 + target.num_days_from_monday()
                    - since.weekday().num_days_from_monday())
                    % 7;
                since.checked_add_days(Days::new(u64::from(ahead)))
            }
            Recurrence::MonthStart
            | Recurrence::MonthEnd
            | Recurrence::BusinessMonthStart
            | Recurrence::BusinessMonthEnd
            | Recurrence::QuarterStart
            | Recurrence::QuarterEnd
            | Recurrence::YearStart
            | Recurrence::YearEnd => {
                // At most a year and a month of candidates need checking.
                let mut month = first_of_month(since);
                for _ in 0..14 {
                    if let Some(candidate) = self.candidate_in_month(month) {
                        if candidate >= since {
                            return Some(candidate);
                        }
                    }
                    month = month.checked_add_months(Months::new(1))?;
                }
                None
            }
        }
    }

    /// Trigger date inside the month starting at `month`, if that month has one.
    fn candidate_in_month(self, month: NaiveDate) -> Option<NaiveDate> {
        let m = month.month();
        match self {
            Recurrence::MonthStart => Some(month),
            Recurrence::MonthEnd => Some(last_of_month(month)),
            Recurrence::BusinessMonthStart => Some(first_weekday_of_month(month)),
            Recurrence::BusinessMonthEnd => Some(last_weekday_of_month(month)),
            Recurrence::QuarterStart if m % 3 == 1 => Some(month),
            Recurrence::QuarterEnd if m % 3 == 0 => Some(last_of_month(month)),
            Recurrence::YearStart if m == 1 => Some(month),
            Recurrence::YearEnd if m == 12 => Some(last_of_month(month)),
            _ => None,
        }
    }
}

/// When a directive fires: anchor date, recurrence and optional repeat limit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Schedule {
    pub anchor: NaiveDate,
    pub recurrence: Recurrence,
    pub count: Option<u32>,
}

impl Schedule {
    pub fn once(anchor: NaiveDate) -> Self {
        Schedule {
            anchor,
            recurrence: Recurrence::OneShot,
            count: None,
        }
    }

    pub fn every(anchor: NaiveDate, recurrence: Recurrence) -> Self {
        Schedule {
            anchor,
            recurrence,
            count: None,
        }
    }

    /// Next trigger on or after `since`, ignoring the repeat limit.
    pub fn next_due(&self, since: NaiveDate) -> Option<NaiveDate> {
        match self.recurrence {
            Recurrence::OneShot => (self.anchor >= since).then_some(self.anchor),
            recurrence => recurrence.next_on_or_after(since.max(self.anchor)),
        }
    }

    /// Restartable lazy stream of trigger dates from `since` onward.
    pub fn occurrences(&self, since: NaiveDate) -> ScheduleCursor {
        ScheduleCursor::new(*self, since)
    }
}

/// Pull-based cursor over a schedule's trigger dates.
///
/// The cursor holds the next pending date; callers `peek` to see whether it is
/// due and `advance` only after consuming it.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleCursor {
    schedule: Schedule,
    pending: Option<NaiveDate>,
    remaining: Option<u32>,
}

impl ScheduleCursor {
    pub fn new(schedule: Schedule, since: NaiveDate) -> Self {
        let mut cursor = ScheduleCursor {
            schedule,
            pending: None,
            remaining: schedule.count,
        };
        match schedule.count {
            Some(0) => {}
            None => cursor.pending = schedule.next_due(since),
            Some(_) => {
                // Counted dates are fixed from the anchor; those before `since`
                // still use up the count.
                cursor.pending = schedule.next_due(schedule.anchor);
                while cursor.pending.is_some_and(|d| d < since) {
                    cursor.advance();
                }
            }
        }
        cursor
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn peek(&self) -> Option<NaiveDate> {
        self.pending
    }

    pub fn is_due(&self, date: NaiveDate) -> bool {
        self.pending == Some(date)
    }

    pub fn is_exhausted(&self) -> bool {
        self.pending.is_none()
    }

    /// Consume the pending date and move to the following trigger.
    pub fn advance(&mut self) {
        let Some(current) = self.pending else {
            return;
        };
        if let Some(left) = self.remaining.as_mut() {
            *left = left.saturating_sub(1);
            if *left == 0 {
                self.pending = None;
                return;
            }
        }
        self.pending = current
            .succ_opt()
            .and_then(|next| self.schedule.next_due(next));
    }
}

impl Iterator for ScheduleCursor {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        let current = self.pending?;
        self.advance();
        Some(current)
    }
}
