//! Terminal output helpers

mod printer;
pub mod table;

use clap::ValueEnum;

pub use printer::{
    outcome_tag, print_field, print_info, print_section, print_status, print_success,
    print_warning,
};
pub use table::{format_quantity, render_table, truncate};

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable tables
    #[default]
    Table,
    /// Pretty-printed JSON document
    Json,
    /// One row per offending record
    Csv,
}
