//! Periodic wake-up loop
//!
//! Spawns a tokio task that ticks the reminder service on a fixed interval and
//! forwards every notification it raises over a channel.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::scheduler::{Notification, ReminderService};

/// Handle for controlling the background reminder loop
pub struct ReminderHandle {
    /// Notifications raised by the loop
    pub receiver: mpsc::Receiver<Notification>,
    /// Signals the loop to stop
    shutdown_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl ReminderHandle {
    /// Spawns the wake-up loop
    ///
    /// # Arguments
    /// * `service` - The service to tick on each wake-up
    /// * `interval` - Time between wake-ups; must be shorter than a minute
    ///
    /// # Returns
    /// A ReminderHandle that receives notifications via the `receiver` channel
    pub fn spawn(mut service: ReminderService, interval: Duration) -> Self {
        let (msg_tx, msg_rx) = mpsc::channel(32);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // A late wake-up must not be replayed as a burst
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Some(notification) = service.tick() {
                            // The notifier already showed it; the channel is a copy
                            if let Err(e) = msg_tx.try_send(notification) {
                                warn!(error = %e, "reminder channel full, copy dropped");
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("reminder loop stopping");
                        break;
                    }
                }
            }
        });

        Self {
            receiver: msg_rx,
            shutdown_tx,
            task,
        }
    }

    /// Stops the loop and waits for it to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }
}

/// Checks for a pending notification without blocking
pub fn try_recv(handle: &mut ReminderHandle) -> Option<Notification> {
    handle.receiver.try_recv().ok()
}
