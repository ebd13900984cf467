//! Weekly reminder timetable
//!
//! A timetable is an ordered list of rules, each matching a set of days, an
//! hour range and one exact minute. Evaluation is a pure function of the wall
//! clock: the first matching rule wins.

use std::fmt;
use std::ops::RangeInclusive;

use chrono::{Datelike, Timelike};
use thiserror::Error;

/// Day index of the weekly rest day (Sunday)
pub const REST_DAY: u32 = 0;

pub const WEEKLY_MESSAGE: &str = "Weekly check-in: take a few minutes to review your week.";
pub const MORNING_MESSAGE: &str = "Good morning! Plan your day and set your focus.";
pub const HOURLY_MESSAGE: &str = "Hourly check-in: what have you been working on?";

/// Errors building a timetable
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimetableError {
    /// A day, hour or minute is out of range
    #[error("rule '{rule}': {reason}")]
    InvalidRule { rule: String, reason: String },

    /// Two rules fire in the same minute of the week
    #[error("rules '{first}' and '{second}' both fire at {at}")]
    Overlap {
        first: String,
        second: String,
        at: WeekTime,
    },
}

/// A minute of the week: day 0-6 (0 = Sunday), hour 0-23, minute 0-59
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WeekTime {
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
}

impl WeekTime {
    /// Returns `None` if any component is out of range
    pub fn new(day: u32, hour: u32, minute: u32) -> Option<Self> {
        (day < 7 && hour < 24 && minute < 60).then_some(Self { day, hour, minute })
    }

    /// Extracts the week minute from any chrono date-time
    pub fn from_datetime<T: Datelike + Timelike>(t: &T) -> Self {
        Self {
            day: t.weekday().num_days_from_sunday(),
            hour: t.hour(),
            minute: t.minute(),
        }
    }

    /// Every minute of the week, in order
    fn all() -> impl Iterator<Item = WeekTime> {
        (0..7).flat_map(|day| {
            (0..24).flat_map(move |hour| (0..60).map(move |minute| WeekTime { day, hour, minute }))
        })
    }
}

impl fmt::Display for WeekTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const DAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
        let day = DAYS.get(self.day as usize).copied().unwrap_or("???");
        write!(f, "{} {:02}:{:02}", day, self.hour, self.minute)
    }
}

/// Which days a rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaySelector {
    Only(u32),
    Except(u32),
}

impl DaySelector {
    fn matches(&self, day: u32) -> bool {
        match *self {
            Self::Only(d) => day == d,
            Self::Except(d) => day != d,
        }
    }
}

/// One timetable entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub name: String,
    pub days: DaySelector,
    pub hours: RangeInclusive<u32>,
    /// Exact minute the rule fires at
    pub minute: u32,
    pub message: String,
}

impl Rule {
    pub fn new(
        name: impl Into<String>,
        days: DaySelector,
        hours: RangeInclusive<u32>,
        minute: u32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            days,
            hours,
            minute,
            message: message.into(),
        }
    }

    pub fn matches(&self, t: WeekTime) -> bool {
        self.days.matches(t.day) && self.hours.contains(&t.hour) && t.minute == self.minute
    }

    fn validate(&self) -> Result<(), TimetableError> {
        let invalid = |reason: String| TimetableError::InvalidRule {
            rule: self.name.clone(),
            reason,
        };
        let (DaySelector::Only(day) | DaySelector::Except(day)) = self.days;
        if day > 6 {
            return Err(invalid(format!("day {} is outside 0..=6", day)));
        }
        if self.hours.is_empty() || *self.hours.end() > 23 {
            return Err(invalid(format!(
                "hours {:?} must be a non-empty subrange of 0..=23",
                self.hours
            )));
        }
        if self.minute > 59 {
            return Err(invalid(format!("minute {} is outside 0..=59", self.minute)));
        }
        Ok(())
    }
}

/// Ordered, non-overlapping set of rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timetable {
    rules: Vec<Rule>,
}

impl Timetable {
    /// Validates every rule and checks that no two rules share a minute
    pub fn new(rules: Vec<Rule>) -> Result<Self, TimetableError> {
        for rule in &rules {
            rule.validate()?;
        }

        for t in WeekTime::all() {
            let mut matching = rules.iter().filter(|r| r.matches(t));
            if let (Some(first), Some(second)) = (matching.next(), matching.next()) {
                return Err(TimetableError::Overlap {
                    first: first.name.clone(),
                    second: second.name.clone(),
                    at: t,
                });
            }
        }

        Ok(Self { rules })
    }

    /// The fixed weekly schedule: a Sunday-noon review, a weekday 08:00
    /// morning message, and half-past check-ins from 08:30 to 21:30 on
    /// every day but Sunday
    pub fn standard() -> Self {
        Self {
            rules: vec![
                Rule::new("weekly", DaySelector::Only(REST_DAY), 12..=12, 0, WEEKLY_MESSAGE),
                Rule::new("morning", DaySelector::Except(REST_DAY), 8..=8, 0, MORNING_MESSAGE),
                Rule::new("hourly", DaySelector::Except(REST_DAY), 8..=21, 30, HOURLY_MESSAGE),
            ],
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// First rule due at `t`, in priority order
    pub fn evaluate(&self, t: WeekTime) -> Option<&Rule> {
        self.rules.iter().find(|r| r.matches(t))
    }

    /// Index of the first rule due at `t`
    pub(crate) fn position(&self, t: WeekTime) -> Option<usize> {
        self.rules.iter().position(|r| r.matches(t))
    }
}

impl Default for Timetable {
    fn default() -> Self {
        Self::standard()
    }
}
