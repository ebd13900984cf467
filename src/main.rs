//! offline-worker - stale-while-revalidate request cache and reminder scheduler
//!
//! Thin adapter that turns command-line invocations into worker events:
//! intercepted requests, lifecycle hooks, control messages and reminder
//! wake-ups.

use std::error::Error;
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use chrono::NaiveDateTime;
use clap::Parser;
use reqwest::Method;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use offline_worker::cli::{Cli, Command};
use offline_worker::config::Config;
use offline_worker::lifecycle::{ControlMessage, Lifecycle};
use offline_worker::network::{Destination, HttpNetwork, Network, Request};
use offline_worker::reminder::{
    Clock, ConsoleNotifier, Notification, Notifier, ReminderHandle, ReminderScheduler,
    ReminderService, SystemClock, WeekTime,
};
use offline_worker::store::{DiskStore, MemoryStore, PartitionName, Store};
use offline_worker::strategy::{FetchStrategy, Handled};

type BoxError = Box<dyn Error>;

/// Logs go to stderr so stdout carries only command output
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), BoxError> {
    let config = Arc::new(Config::load(&cli.config)?);

    match cli.command {
        Command::Remind { at, watch } => {
            if watch {
                watch_reminders(&config).await
            } else {
                remind_once(&config, at)
            }
        }
        Command::Fetch {
            url,
            method,
            destination,
        } => fetch(&config, cli.memory, &url, method, destination).await,
        Command::Install => {
            let (store, network) = open(&config, cli.memory)?;
            let mut lifecycle = Lifecycle::resume(config.clone(), store, network).await?;
            let count = lifecycle.install().await?;
            println!("installed {} ({} assets), {}", config.version, count, lifecycle.state());
            Ok(())
        }
        Command::Activate => {
            let (store, network) = open(&config, cli.memory)?;
            let mut lifecycle = Lifecycle::resume(config.clone(), store, network).await?;
            let removed = lifecycle.activate().await?;
            print_removed(&removed);
            println!("{} {}", config.version, lifecycle.state());
            Ok(())
        }
        Command::SkipWaiting => {
            let (store, network) = open(&config, cli.memory)?;
            let mut lifecycle = Lifecycle::resume(config.clone(), store, network).await?;
            lifecycle.handle_message(ControlMessage::SkipWaiting).await?;
            println!("{} {}", config.version, lifecycle.state());
            Ok(())
        }
        Command::Partitions => {
            let (store, _) = open(&config, cli.memory)?;
            let live = PartitionName::live(&config.version).map(|p| p.to_string());
            for name in store.list_partitions().await? {
                let marker = if live.contains(&name) { "*" } else { " " };
                println!("{} {}", marker, name);
            }
            Ok(())
        }
        Command::Purge => {
            let (store, network) = open(&config, cli.memory)?;
            let mut lifecycle = Lifecycle::new(config.clone(), store, network);
            let removed = lifecycle.teardown().await?;
            print_removed(&removed);
            Ok(())
        }
    }
}

fn open(config: &Config, memory: bool) -> Result<(Arc<dyn Store>, Arc<dyn Network>), BoxError> {
    let store: Arc<dyn Store> = if memory {
        Arc::new(MemoryStore::new())
    } else {
        let root = config
            .store_root()
            .ok_or("cannot determine a store directory; set `store_dir` in the config")?;
        Arc::new(DiskStore::new(root))
    };
    let network = HttpNetwork::new(config.origin_url()?, config.network_timeout())?;
    Ok((store, Arc::new(network)))
}

async fn fetch(
    config: &Config,
    memory: bool,
    url: &str,
    method: Method,
    destination: Destination,
) -> Result<(), BoxError> {
    let (store, network) = open(config, memory)?;
    let request = Request::new(method, config.resolve(url)?).with_destination(destination);
    let engine = FetchStrategy::new(config, store, network.clone())?;

    let (response, source) = match engine.handle(&request).await {
        Handled::Respond { response, source } => (response, source.to_string()),
        // Not ours to handle: the platform would send it as-is
        Handled::Passthrough => (network.fetch(&request).await?, "passthrough".to_string()),
    };

    // Write-backs and refreshes must land before the process exits
    engine.settle().await;

    let mut out = io::stdout().lock();
    writeln!(out, "{} ({})", response.status, source)?;
    out.write_all(&response.body)?;
    if !response.body.ends_with(b"\n") {
        writeln!(out)?;
    }
    Ok(())
}

fn remind_once(config: &Config, at: Option<NaiveDateTime>) -> Result<(), BoxError> {
    let now = match at {
        Some(at) => at,
        None => match SystemClock.now() {
            Ok(now) => now,
            Err(e) => {
                tracing::warn!(error = %e, "skipping reminder check");
                println!("No reminder due");
                return Ok(());
            }
        },
    };

    let scheduler = ReminderScheduler::default();
    match scheduler.evaluate(&now) {
        Some(reminder) => {
            let notification = Notification::for_reminder(&config.reminders, &reminder);
            ConsoleNotifier.show(&notification)?;
        }
        None => println!("No reminder due at {}", WeekTime::from_datetime(&now)),
    }
    Ok(())
}

async fn watch_reminders(config: &Config) -> Result<(), BoxError> {
    let service = ReminderService::new(
        ReminderScheduler::default(),
        Box::new(SystemClock),
        Box::new(ConsoleNotifier),
        config.reminders.clone(),
    );
    let mut handle = ReminderHandle::spawn(service, config.wake_interval());
    info!(interval_secs = config.reminders.wake_interval_secs, "watching reminder timetable");

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            Some(notification) = handle.receiver.recv() => {
                debug!(tag = %notification.tag, body = %notification.body, "reminder raised");
            }
        }
    }
    handle.shutdown().await;
    Ok(())
}

fn print_removed(removed: &[String]) {
    for name in removed {
        println!("deleted {}", name);
    }
}
