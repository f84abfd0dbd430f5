//! bizdesk Core Library
//!
//! Shared types for bizdesk crates.
//!
//! # Modules
//!
//! - [`ids`] - Strongly typed identifiers (TenantId, ScanRunId, RepairRunId)
//!
//! # Example
//!
//! ```
//! use bizdesk_core::{ScanRunId, TenantId};
//!
//! let tenant: TenantId = "org-acme".parse().unwrap();
//! let run = ScanRunId::new();
//! assert_eq!(tenant.as_str(), "org-acme");
//! assert_ne!(run, ScanRunId::new());
//! ```

pub mod ids;

pub use ids::{ParseIdError, RepairRunId, ScanRunId, TenantId};
