#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalMode {
    /// Join barriers wait for every operand with no deadline.
    Strict,
    /// Join barriers give up once the policy deadline passes.
    Hardened,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalPolicy {
    pub mode: EvalMode,
    pub deadline: Option<Duration>,
    pub record_row_defects: bool,
}

impl EvalPolicy {
    #[must_use]
    pub fn strict() -> Self {
        Self {
            mode: EvalMode::Strict,
            deadline: None,
            record_row_defects: true,
        }
    }

    #[must_use]
    pub fn hardened(deadline: Duration) -> Self {
        Self {
            mode: EvalMode::Hardened,
            deadline: Some(deadline),
            record_row_defects: true,
        }
    }

    #[must_use]
    pub fn without_row_defects(mut self) -> Self {
        self.record_row_defects = false;
        self
    }

    /// Absolute deadline for an evaluation starting at `start`. Strict mode
    /// never has one, whatever `deadline` holds.
    #[must_use]
    pub fn deadline_from(&self, start: Instant) -> Option<Instant> {
        match self.mode {
            EvalMode::Strict => None,
            EvalMode::Hardened => self.deadline.map(|d| start + d),
        }
    }
}

impl Default for EvalPolicy {
    fn default() -> Self {
        Self::strict()
    }
}

/// Shared flag telling operand workers to stop early. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn check(&self) -> Result<(), RuntimeError> {
        if self.is_cancelled() {
            Err(RuntimeError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("evaluation cancelled")]
    Cancelled,
}

/// A data problem found while ingesting or evaluating. Coordinates are the
/// column and row indices of the offending cell when known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Defect {
    pub column: Option<u32>,
    pub row: Option<u32>,
    pub message: String,
    pub keys: BTreeMap<String, String>,
}

impl Defect {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            column: None,
            row: None,
            message: message.into(),
            keys: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn at(mut self, column: u32, row: u32) -> Self {
        self.column = Some(column);
        self.row = Some(row);
        self
    }

    #[must_use]
    pub fn at_row(mut self, row: u32) -> Self {
        self.row = Some(row);
        self
    }

    #[must_use]
    pub fn with_key(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.keys.insert(name.into(), value.into());
        self
    }
}

#[derive(Debug)]
struct CollectorState {
    records: Vec<Defect>,
    enabled: bool,
}

/// Caller-owned sink for defects. Safe to share between operand workers.
#[derive(Debug)]
pub struct DefectCollector {
    state: Mutex<CollectorState>,
}

impl Default for DefectCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl DefectCollector {
    pub const BASE_HEADERS: [&'static str; 3] = ["Column", "Row", "Message"];

    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CollectorState {
                records: Vec::new(),
                enabled: true,
            }),
        }
    }

    /// Record a defect. Once disabled the collector drops it, tracing it when
    /// the `tracing` feature is on.
    pub fn log(&self, defect: Defect) {
        let mut state = self.state.lock();
        #[cfg(feature = "tracing")]
        {
            if state.enabled {
                tracing::debug!(
                    column = ?defect.column,
                    row = ?defect.row,
                    message = %defect.message,
                    "defect recorded"
                );
            } else {
                tracing::warn!(
                    column = ?defect.column,
                    row = ?defect.row,
                    "defect: {}",
                    defect.message
                );
            }
        }
        if state.enabled {
            state.records.push(defect);
        }
    }

    pub fn disable(&self) {
        self.state.lock().enabled = false;
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.state.lock().records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    #[must_use]
    pub fn records(&self) -> Vec<Defect> {
        self.state.lock().records.clone()
    }

    /// Tabular report: a header row (`Column`, `Row`, `Message`, then every
    /// key name in first-seen order) followed by one row per defect.
    /// Coordinates are shifted by `offset` so callers can report 1-based
    /// positions relative to their source file.
    #[must_use]
    pub fn report(&self, offset: u32) -> Vec<Vec<String>> {
        let state = self.state.lock();
        let mut headers: Vec<String> = Self::BASE_HEADERS.iter().map(|h| (*h).to_owned()).collect();
        for defect in &state.records {
            for key in defect.keys.keys() {
                if !headers.contains(key) {
                    headers.push(key.clone());
                }
            }
        }

        let coordinate = |v: Option<u32>| {
            v.map(|v| (u64::from(v) + u64::from(offset)).to_string())
                .unwrap_or_default()
        };

        let mut rows = Vec::with_capacity(state.records.len() + 1);
        for defect in &state.records {
            let mut row = vec![String::new(); headers.len()];
            row[0] = coordinate(defect.column);
            row[1] = coordinate(defect.row);
            row[2] = defect.message.clone();
            for (key, value) in &defect.keys {
                if let Some(slot) = headers.iter().position(|h| h == key) {
                    row[slot] = value.clone();
                }
            }
            rows.push(row);
        }
        rows.insert(0, headers);
        rows
    }
}
