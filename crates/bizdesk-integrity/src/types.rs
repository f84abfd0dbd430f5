//! Shared enums for scans and repairs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Entity holding the denormalized stock aggregate.
pub const PRODUCT_ENTITY: &str = "Product";

/// Entity holding per-location stock rows.
pub const STOCK_LEVEL_ENTITY: &str = "StockLevel";

/// Kind of integrity issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// Child record pointing at a parent that does not exist.
    Orphan,
    /// `Product.stock_quantity` disagrees with its `StockLevel` rows.
    StockMismatch,
    /// Several `StockLevel` rows share one product+warehouse key.
    Duplicate,
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Orphan => write!(f, "orphan"),
            Self::StockMismatch => write!(f, "stock_mismatch"),
            Self::Duplicate => write!(f, "duplicate"),
        }
    }
}

impl FromStr for FindingKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "orphan" => Ok(Self::Orphan),
            "stock_mismatch" => Ok(Self::StockMismatch),
            "duplicate" => Ok(Self::Duplicate),
            other => Err(format!("unknown finding kind: {other}")),
        }
    }
}

/// Kind of repair action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Delete one record.
    DeleteRecord,
    /// Rewrite `Product.stock_quantity` from stock levels.
    ResyncAggregate,
    /// Remove a duplicate `StockLevel` row.
    MergeDuplicate,
}

impl ActionType {
    /// Key prefix used in action keys.
    #[must_use]
    pub fn key_prefix(&self) -> &'static str {
        match self {
            Self::DeleteRecord => "delete",
            Self::ResyncAggregate => "resync",
            Self::MergeDuplicate => "merge",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeleteRecord => write!(f, "delete_record"),
            Self::ResyncAggregate => write!(f, "resync_aggregate"),
            Self::MergeDuplicate => write!(f, "merge_duplicate"),
        }
    }
}

impl FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "delete_record" => Ok(Self::DeleteRecord),
            "resync_aggregate" => Ok(Self::ResyncAggregate),
            "merge_duplicate" => Ok(Self::MergeDuplicate),
            other => Err(format!("unknown action type: {other}")),
        }
    }
}

/// Outcome of one repair action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    /// The mutation was applied (or would be, in a dry run).
    Succeeded,
    /// The record was already gone; counts as success.
    AlreadyAbsent,
    /// The mutation failed.
    Failed,
}

impl ActionOutcome {
    /// Whether the outcome counts as a success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded | Self::AlreadyAbsent)
    }
}

impl fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::AlreadyAbsent => write!(f, "already_absent"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Completion status of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    /// Every entity loaded and every rule was evaluated.
    Completed,
    /// Some entity fetches failed; their rules ran against zero records.
    Partial,
    /// The scan deadline hit before loading finished; some rules were skipped.
    TimedOut,
}

impl ScanStatus {
    /// Whether every rule saw complete data.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Partial => write!(f, "partial"),
            Self::TimedOut => write!(f, "timed_out"),
        }
    }
}

impl FromStr for ScanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(Self::Completed),
            "partial" => Ok(Self::Partial),
            "timed_out" => Ok(Self::TimedOut),
            other => Err(format!("unknown scan status: {other}")),
        }
    }
}
