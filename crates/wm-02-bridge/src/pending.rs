//! # Pending Command Store
//!
//! Maps command ids to callers awaiting a response. An entry lives for
//! exactly one round trip: it is removed on the first settlement
//! (response, timeout, or sweep) and every later settlement attempt is a
//! no-op. Abandoned callers (dropped futures) are reaped by the periodic
//! sweep so nothing leaks.

use dashmap::DashMap;
use serde_json::Value;
use shared_types::{error_codes, CommandId, WireError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// The settled result of one command.
#[derive(Debug)]
pub struct CommandOutcome {
    /// The command this outcome belongs to.
    pub command_id: CommandId,
    /// Remote result or remote/timeout error.
    pub result: Result<Value, WireError>,
    /// Time from registration to settlement.
    pub elapsed: Duration,
}

struct PendingCommand {
    sender: oneshot::Sender<CommandOutcome>,
    created_at: Instant,
    operation: String,
    timeout: Duration,
}

/// Settlement counters, exposed for diagnostics.
#[derive(Debug, Default)]
pub struct PendingStats {
    pub registered: AtomicU64,
    pub completed: AtomicU64,
    pub timed_out: AtomicU64,
    pub cancelled: AtomicU64,
}

/// Point-in-time view of the stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingSnapshot {
    pub registered: u64,
    pub completed: u64,
    pub timed_out: u64,
    pub cancelled: u64,
    pub pending_now: usize,
}

/// The store of in-flight commands.
pub struct PendingCommandStore {
    pending: DashMap<CommandId, PendingCommand>,
    stats: Arc<PendingStats>,
}

impl PendingCommandStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
            stats: Arc::new(PendingStats::default()),
        }
    }

    /// Register a command and get the receiver its outcome will arrive on.
    pub fn register(
        &self,
        command_id: CommandId,
        operation: &str,
        timeout: Duration,
    ) -> oneshot::Receiver<CommandOutcome> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            command_id,
            PendingCommand {
                sender: tx,
                created_at: Instant::now(),
                operation: operation.to_string(),
                timeout,
            },
        );
        self.stats.registered.fetch_add(1, Ordering::Relaxed);

        debug!(command = %command_id, operation, "Registered pending command");
        rx
    }

    /// Settle a command with a result.
    ///
    /// Returns false when the command is unknown or already settled; the
    /// response is then a late arrival and is dropped.
    pub fn complete(&self, command_id: CommandId, result: Result<Value, WireError>) -> bool {
        let Some((_, command)) = self.pending.remove(&command_id) else {
            debug!(command = %command_id, "Response for unknown or settled command dropped");
            return false;
        };

        let elapsed = command.created_at.elapsed();
        let outcome = CommandOutcome {
            command_id,
            result,
            elapsed,
        };

        if command.sender.send(outcome).is_ok() {
            self.stats.completed.fetch_add(1, Ordering::Relaxed);
            debug!(
                command = %command_id,
                operation = %command.operation,
                elapsed_ms = elapsed.as_millis(),
                "Settled pending command"
            );
            true
        } else {
            // The caller dropped its future; the entry is freed regardless.
            self.stats.cancelled.fetch_add(1, Ordering::Relaxed);
            debug!(command = %command_id, "Caller gone, settlement discarded");
            false
        }
    }

    /// Mark a command inert after its caller-side timeout fired.
    ///
    /// Any response arriving later finds no entry and is dropped.
    pub fn expire(&self, command_id: &CommandId) -> bool {
        if self.pending.remove(command_id).is_some() {
            self.stats.timed_out.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Drop a command without an outcome (caller gave up).
    pub fn cancel(&self, command_id: &CommandId) -> bool {
        if self.pending.remove(command_id).is_some() {
            self.stats.cancelled.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Settle every command older than its timeout with a timeout error.
    ///
    /// Returns the number of commands reaped.
    pub fn remove_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<(CommandId, String, Duration)> = self
            .pending
            .iter()
            .filter(|entry| now.duration_since(entry.created_at) > entry.timeout)
            .map(|entry| (*entry.key(), entry.operation.clone(), entry.timeout))
            .collect();

        for (command_id, operation, timeout) in &expired {
            warn!(
                command = %command_id,
                %operation,
                timeout_ms = timeout.as_millis(),
                "Expiring pending command"
            );
            if let Some((_, command)) = self.pending.remove(command_id) {
                self.stats.timed_out.fetch_add(1, Ordering::Relaxed);
                let _ = command.sender.send(CommandOutcome {
                    command_id: *command_id,
                    result: Err(WireError::new(
                        error_codes::TIMEOUT,
                        format!("'{operation}' timed out after {}ms", timeout.as_millis()),
                    )),
                    elapsed: command.created_at.elapsed(),
                });
            }
        }

        expired.len()
    }

    /// Whether a command is still awaiting settlement.
    #[must_use]
    pub fn is_pending(&self, command_id: &CommandId) -> bool {
        self.pending.contains_key(command_id)
    }

    /// Number of in-flight commands.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Current counters.
    #[must_use]
    pub fn snapshot(&self) -> PendingSnapshot {
        PendingSnapshot {
            registered: self.stats.registered.load(Ordering::Relaxed),
            completed: self.stats.completed.load(Ordering::Relaxed),
            timed_out: self.stats.timed_out.load(Ordering::Relaxed),
            cancelled: self.stats.cancelled.load(Ordering::Relaxed),
            pending_now: self.pending.len(),
        }
    }
}

impl Default for PendingCommandStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Background task settling commands whose callers vanished.
pub async fn sweep_task(store: Arc<PendingCommandStore>, interval: Duration) {
    let mut sweep = tokio::time::interval(interval);
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        sweep.tick().await;
        let reaped = store.remove_expired();
        if reaped > 0 {
            debug!(reaped, "Swept expired pending commands");
        }
    }
}
