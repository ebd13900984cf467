//! Offline Worker Library
//!
//! A client-side offline layer: intercepted requests are answered
//! stale-while-revalidate from a versioned store, and a weekly timetable turns
//! periodic wake-ups into reminders.

pub mod cli;
pub mod config;
pub mod lifecycle;
pub mod network;
pub mod reminder;
pub mod store;
pub mod strategy;

#[cfg(test)]
pub(crate) mod testing;
