//! Display formatting for terminal output
//!
//! Plain-text tables and summaries for archives, restores, update runs and
//! modules. Everything returns a `String`; printing is left to the CLI.

pub mod backup;
pub mod report;

pub use backup::{format_age, format_archive_list, format_inspection, format_size};
pub use report::{
    format_module_list, format_module_outcomes, format_restore_report, format_trim,
    format_update_run,
};
