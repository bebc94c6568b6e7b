//! Per-instance retirement state table
//!
//! The queues and triggers are what actually drive an instance through its power cycle; the
//! ledger mirrors that progress explicitly so a process can tell which instances are already
//! in flight and so tests can check that no instance is stopped or started twice in one cycle.
//!
//! ```text
//!   (untracked | Started) ──► Detected ──┬──► PendingStop ──► PendingStart ──► Started
//!                                        └──────────────────► PendingStart
//! ```
//!
//! A rejected transition never blocks a stage; callers log it and carry on.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetirementStage {
    /// Retirement signal seen, nothing queued yet
    Detected,
    /// Stop deferred to the stop queue
    PendingStop,
    /// Stopped; start queued
    PendingStart,
    /// Restarted; cycle complete
    Started,
}

impl RetirementStage {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, RetirementStage::PendingStop | RetirementStage::PendingStart)
    }
}

impl fmt::Display for RetirementStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RetirementStage::Detected => "detected",
            RetirementStage::PendingStop => "pending-stop",
            RetirementStage::PendingStart => "pending-start",
            RetirementStage::Started => "started",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub instance_id: String,
    pub stage: RetirementStage,
    pub entered_at: DateTime<Utc>,
    pub cycle_started_at: DateTime<Utc>,
    /// Successful stops recorded in this cycle
    pub stops: u32,
    /// Successful starts recorded in this cycle
    pub starts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("instance {instance_id}: illegal transition {} -> {to}", stage_name(.from))]
pub struct IllegalTransition {
    pub instance_id: String,
    pub from: Option<RetirementStage>,
    pub to: RetirementStage,
}

fn stage_name(stage: &Option<RetirementStage>) -> String {
    stage
        .map(|s| s.to_string())
        .unwrap_or_else(|| "untracked".to_string())
}

pub struct RetirementLedger {
    entries: Arc<RwLock<HashMap<String, LedgerEntry>>>,
}

impl RetirementLedger {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::with_capacity(16))),
        }
    }

    fn allowed(from: Option<RetirementStage>, to: RetirementStage) -> bool {
        use RetirementStage::*;
        match to {
            Detected => matches!(from, None | Some(Started) | Some(Detected)),
            PendingStop => matches!(from, Some(Detected)),
            PendingStart => matches!(from, None | Some(Detected) | Some(PendingStop)),
            Started => matches!(from, None | Some(PendingStart)),
        }
    }

    /// Move `instance_id` to `to`, returning the updated entry
    pub async fn transition(
        &self,
        instance_id: &str,
        to: RetirementStage,
        at: DateTime<Utc>,
    ) -> Result<LedgerEntry, IllegalTransition> {
        let mut entries = self.entries.write().await;
        let from = entries.get(instance_id).map(|entry| entry.stage);

        if !Self::allowed(from, to) {
            return Err(IllegalTransition {
                instance_id: instance_id.to_string(),
                from,
                to,
            });
        }

        let new_cycle = matches!(from, None | Some(RetirementStage::Started));
        let entry = entries
            .entry(instance_id.to_string())
            .or_insert_with(|| LedgerEntry {
                instance_id: instance_id.to_string(),
                stage: to,
                entered_at: at,
                cycle_started_at: at,
                stops: 0,
                starts: 0,
            });

        if new_cycle {
            entry.cycle_started_at = at;
            entry.stops = 0;
            entry.starts = 0;
        }
        entry.stage = to;
        entry.entered_at = at;
        match to {
            RetirementStage::PendingStart => entry.stops += 1,
            RetirementStage::Started => entry.starts += 1,
            _ => {}
        }

        debug!("Ledger: {} {} -> {}", instance_id, stage_name(&from), to);
        Ok(entry.clone())
    }

    /// Put an in-flight instance back to `Detected` after its hand-off broke off, so the
    /// next scan picks it up again. Counters are kept. Returns the stage it left.
    pub async fn release(&self, instance_id: &str, at: DateTime<Utc>) -> Option<RetirementStage> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(instance_id)
            .filter(|entry| entry.stage.is_in_flight())?;

        let from = entry.stage;
        entry.stage = RetirementStage::Detected;
        entry.entered_at = at;
        info!("Ledger: {} released from {} to be re-detected", instance_id, from);
        Some(from)
    }

    pub async fn stage_of(&self, instance_id: &str) -> Option<RetirementStage> {
        let entries = self.entries.read().await;
        entries.get(instance_id).map(|entry| entry.stage)
    }

    #[inline]
    pub async fn is_in_flight(&self, instance_id: &str) -> bool {
        self.stage_of(instance_id)
            .await
            .is_some_and(|stage| stage.is_in_flight())
    }

    pub async fn entry(&self, instance_id: &str) -> Option<LedgerEntry> {
        let entries = self.entries.read().await;
        entries.get(instance_id).cloned()
    }

    pub async fn entries(&self) -> Vec<LedgerEntry> {
        let entries = self.entries.read().await;
        entries.values().cloned().collect()
    }

    /// Drop entries that have not moved for `max_hours`
    pub async fn cleanup_stale(&self, max_hours: i64, now: DateTime<Utc>) -> u32 {
        let mut entries = self.entries.write().await;
        let cutoff = now - Duration::hours(max_hours);
        let initial_count = entries.len();

        entries.retain(|instance_id, entry| {
            let keep = entry.entered_at > cutoff;
            if !keep && entry.stage.is_in_flight() {
                warn!(
                    "Dropping stale ledger entry for {} (stuck in {} since {})",
                    instance_id,
                    entry.stage,
                    entry.entered_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
            keep
        });

        let cleaned = initial_count - entries.len();
        if cleaned > 0 {
            info!("Cleaned up {} ledger entries older than {}h", cleaned, max_hours);
        }
        cleaned as u32
    }
}

impl Clone for RetirementLedger {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl Default for RetirementLedger {
    fn default() -> Self {
        Self::new()
    }
}
