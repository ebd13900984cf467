//! Command-line interface parsing for offline-worker
//!
//! Each subcommand is one inbound signal for the worker: an intercepted
//! request, a lifecycle hook, a control message, or a reminder wake-up.

use std::path::PathBuf;

use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use reqwest::Method;
use thiserror::Error;

use crate::config::DEFAULT_CONFIG_PATH;
use crate::network::Destination;

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// The --at value is not a recognised local date-time
    #[error("Invalid time: '{0}'. Expected YYYY-MM-DDTHH:MM[:SS]")]
    InvalidTime(String),

    /// The HTTP method contains characters that are not allowed
    #[error("Invalid method: '{0}'")]
    InvalidMethod(String),

    #[error("{0}")]
    InvalidDestination(String),
}

/// offline-worker - serve cached responses offline and raise timed reminders
#[derive(Parser, Debug)]
#[command(name = "offline-worker")]
#[command(about = "Offline request cache and weekly reminder scheduler")]
#[command(version)]
pub struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Keep the store in memory instead of on disk
    #[arg(long, global = true)]
    pub memory: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Handle one request through the cache strategy
    Fetch {
        /// Absolute URL, or a path resolved against the configured origin
        url: String,

        #[arg(short = 'X', long, default_value = "GET", value_parser = parse_method_arg)]
        method: Method,

        /// Request destination (document, script, style, image, font, manifest)
        #[arg(short, long, default_value = "empty", value_parser = parse_destination_arg)]
        destination: Destination,
    },

    /// Precache the static asset set for the configured version
    Install,

    /// Activate the installed version and delete stale partitions
    Activate,

    /// Force-activate a waiting update
    SkipWaiting,

    /// List partitions in the store
    Partitions,

    /// Delete the live partitions
    Purge,

    /// Check the reminder timetable
    ///
    /// Examples:
    ///   offline-worker remind                          # check now
    ///   offline-worker remind --at 2026-10-18T12:00    # check a given time
    ///   offline-worker remind --watch                  # keep checking until Ctrl-C
    Remind {
        /// Local time to evaluate instead of now
        #[arg(long, value_parser = parse_at_arg, conflicts_with = "watch")]
        at: Option<NaiveDateTime>,

        /// Run the periodic wake-up loop
        #[arg(long)]
        watch: bool,
    },
}

/// Parses a local date-time given on the command line
///
/// # Arguments
/// * `s` - e.g. `2026-10-18T12:00`, `2026-10-18 12:00:30`
pub fn parse_at_arg(s: &str) -> Result<NaiveDateTime, CliError> {
    const FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];
    FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .ok_or_else(|| CliError::InvalidTime(s.to_string()))
}

pub fn parse_method_arg(s: &str) -> Result<Method, CliError> {
    Method::from_bytes(s.to_ascii_uppercase().as_bytes())
        .map_err(|_| CliError::InvalidMethod(s.to_string()))
}

pub fn parse_destination_arg(s: &str) -> Result<Destination, CliError> {
    s.parse().map_err(CliError::InvalidDestination)
}
