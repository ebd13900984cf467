//! Turns wake-ups into reminder notifications
//!
//! The timetable only matches exact minutes, so the wake-up cadence has to be
//! finer than a minute. That means several wake-ups can land in the same minute;
//! a per-rule watermark of the last minute fired keeps each firing to one
//! notification. A wake-up that never arrives is not caught up.

use std::collections::HashMap;
use std::io::{self, Write};

use chrono::{Local, NaiveDateTime, Timelike};
use thiserror::Error;
use tracing::{info, warn};

use super::timetable::{Timetable, WeekTime};
use crate::config::ReminderConfig;

/// Reading the wall clock failed
#[derive(Debug, Error)]
#[error("clock unavailable: {0}")]
pub struct ClockError(pub String);

/// Source of local wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> Result<NaiveDateTime, ClockError>;
}

/// The system's local time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Result<NaiveDateTime, ClockError> {
        Ok(Local::now().naive_local())
    }
}

/// A rule that is due now
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    pub rule: String,
    pub message: String,
}

/// Button shown on a notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

/// A user-visible reminder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    /// Unique per firing so the platform never collapses two reminders
    pub tag: String,
    pub require_interaction: bool,
    pub actions: Vec<NotificationAction>,
}

impl Notification {
    pub fn for_reminder(config: &ReminderConfig, reminder: &Reminder) -> Self {
        Self {
            title: config.title.clone(),
            body: reminder.message.clone(),
            tag: format!("reminder-{}", ulid::Ulid::new()),
            require_interaction: config.require_interaction,
            actions: vec![
                NotificationAction {
                    action: "open".to_string(),
                    title: "Open log".to_string(),
                },
                NotificationAction {
                    action: "dismiss".to_string(),
                    title: "Dismiss".to_string(),
                },
            ],
        }
    }
}

/// Displays notifications to the user
pub trait Notifier: Send + Sync {
    fn show(&self, notification: &Notification) -> io::Result<()>;
}

/// Prints notifications to stdout
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn show(&self, notification: &Notification) -> io::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "[{}] {}", notification.title, notification.body)?;
        out.flush()
    }
}

/// Timetable plus the last minute each rule fired in
#[derive(Debug, Clone, Default)]
pub struct ReminderScheduler {
    timetable: Timetable,
    last_fired: HashMap<usize, NaiveDateTime>,
}

impl ReminderScheduler {
    pub fn new(timetable: Timetable) -> Self {
        Self {
            timetable,
            last_fired: HashMap::new(),
        }
    }

    /// Pure timetable lookup; no watermark involved
    pub fn evaluate(&self, now: &NaiveDateTime) -> Option<Reminder> {
        self.timetable
            .evaluate(WeekTime::from_datetime(now))
            .map(|rule| Reminder {
                rule: rule.name.clone(),
                message: rule.message.clone(),
            })
    }

    /// Returns the due reminder unless the same rule already fired this minute
    pub fn poll(&mut self, now: &NaiveDateTime) -> Option<Reminder> {
        let index = self.timetable.position(WeekTime::from_datetime(now))?;
        let minute = truncate_to_minute(now);

        if self.last_fired.get(&index) == Some(&minute) {
            return None;
        }
        self.last_fired.insert(index, minute);

        let rule = &self.timetable.rules()[index];
        Some(Reminder {
            rule: rule.name.clone(),
            message: rule.message.clone(),
        })
    }
}

fn truncate_to_minute(t: &NaiveDateTime) -> NaiveDateTime {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(*t)
}

/// One wake-up's worth of work: read the clock, poll, notify
pub struct ReminderService {
    scheduler: ReminderScheduler,
    clock: Box<dyn Clock>,
    notifier: Box<dyn Notifier>,
    config: ReminderConfig,
}

impl ReminderService {
    pub fn new(
        scheduler: ReminderScheduler,
        clock: Box<dyn Clock>,
        notifier: Box<dyn Notifier>,
        config: ReminderConfig,
    ) -> Self {
        Self {
            scheduler,
            clock,
            notifier,
            config,
        }
    }

    /// Handles one wake-up
    ///
    /// A clock failure means no reminder this time; the next wake-up starts
    /// over. A notifier failure is logged and the notification still returned.
    pub fn tick(&mut self) -> Option<Notification> {
        let now = match self.clock.now() {
            Ok(now) => now,
            Err(e) => {
                warn!(error = %e, "skipping reminder check");
                return None;
            }
        };

        let reminder = self.scheduler.poll(&now)?;
        let notification = Notification::for_reminder(&self.config, &reminder);
        info!(rule = %reminder.rule, tag = %notification.tag, "reminder due");

        if let Err(e) = self.notifier.show(&notification) {
            warn!(error = %e, "failed to show notification");
        }
        Some(notification)
    }
}
