//! Reminder scheduling
//!
//! A fixed weekly timetable evaluated on every wake-up. At most one reminder
//! is produced per wake-up; it is shown with a fresh tag so the platform does
//! not merge it with an earlier unread one.

mod scheduler;
mod service;
mod timetable;

pub use scheduler::{
    Clock, ClockError, ConsoleNotifier, Notification, NotificationAction, Notifier, Reminder,
    ReminderScheduler, ReminderService, SystemClock,
};
pub use service::{try_recv, ReminderHandle};
pub use timetable::{
    DaySelector, Rule, Timetable, TimetableError, WeekTime, HOURLY_MESSAGE, MORNING_MESSAGE,
    REST_DAY, WEEKLY_MESSAGE,
};
