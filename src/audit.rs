//! Append-only JSONL journal of swap attempts
//!
//! One line per attempt. The journal is write-only: nothing reads it back,
//! and a failed write is logged and otherwise ignored.

use crate::engine::{Mode, SwapOutcome, SwapRequest};
use crate::tokens::{Asset, TokenAmount};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Buy,
    Sell,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Buy => write!(f, "buy"),
            Direction::Sell => write!(f, "sell"),
        }
    }
}

/// Entry in the trade journal
#[derive(Debug, Serialize)]
struct JournalEntry {
    timestamp: DateTime<Utc>,
    cycle: u64,
    mode: Mode,
    direction: Direction,
    asset_in: Asset,
    asset_out: Asset,
    amount_in: TokenAmount,
    min_amount_out: TokenAmount,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    amount_out: Option<TokenAmount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl JournalEntry {
    fn new(
        cycle: u64,
        mode: Mode,
        direction: Direction,
        request: &SwapRequest,
        outcome: &SwapOutcome,
    ) -> Self {
        let (amount_out, tx_hash, error) = match outcome {
            SwapOutcome::Confirmed {
                amount_out,
                tx_hash,
                ..
            } => (Some(*amount_out), Some(tx_hash.to_string()), None),
            SwapOutcome::Reverted { reason }
            | SwapOutcome::TransportFailure { reason }
            | SwapOutcome::Rejected { reason } => (None, None, Some(reason.clone())),
            SwapOutcome::InsufficientBalance {
                required,
                available,
            } => (
                None,
                None,
                Some(format!("required {}, available {}", required, available)),
            ),
        };

        Self {
            timestamp: Utc::now(),
            cycle,
            mode,
            direction,
            asset_in: request.asset_in,
            asset_out: request.asset_out,
            amount_in: request.amount_in,
            min_amount_out: request.min_amount_out,
            outcome: outcome.kind(),
            amount_out,
            tx_hash,
            error,
        }
    }
}

/// Writer for journal entries
struct JournalWriter {
    path: PathBuf,
}

impl JournalWriter {
    fn write(&self, entry: &JournalEntry) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let json = serde_json::to_string(entry)?;
        writeln!(file, "{}", json)?;
        Ok(())
    }
}

pub struct TradeJournal {
    writer: Mutex<JournalWriter>,
}

impl TradeJournal {
    /// # Arguments
    /// * `path` - Journal file (JSONL), created on first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            writer: Mutex::new(JournalWriter { path: path.into() }),
        }
    }

    pub async fn record(
        &self,
        cycle: u64,
        mode: Mode,
        direction: Direction,
        request: &SwapRequest,
        outcome: &SwapOutcome,
    ) {
        let entry = JournalEntry::new(cycle, mode, direction, request, outcome);
        let writer = self.writer.lock().await;
        if let Err(e) = writer.write(&entry) {
            tracing::warn!(path = %writer.path.display(), error = %e, "Failed to write trade journal entry");
        }
    }
}

impl std::fmt::Debug for TradeJournal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradeJournal").finish_non_exhaustive()
    }
}

/// Journal at `path`, if one is configured
pub fn open(path: Option<&str>) -> Option<TradeJournal> {
    path.map(|p| TradeJournal::new(Path::new(p)))
}
