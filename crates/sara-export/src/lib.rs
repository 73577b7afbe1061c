//! Exporter that fills the official grading template from a SARA module snapshot.
//!
//! The encoder works in three phases:
//!
//! 1. [`order::plan`] orders every entity kind and runs every structural check (capacities,
//!    duplicate instrument names, instruments without RA). Nothing is written before it passes.
//! 2. The reset pass and table writers compute cell values and commit them through the
//!    [`SafeWriter`], the only write path into the template. It refuses formula cells and merged
//!    non-anchor cells.
//! 3. The template package rewrites only the patched worksheets and asks the spreadsheet
//!    application to recompute on open; [`export::export_to_path`] persists the result atomically.
//!
//! [`fetch::SaraClient`] retrieves the snapshot and its evaluation reports, and the `sara-export`
//! binary ties everything together.

pub mod cli;
pub mod config;
pub mod distribute;
mod error;
pub mod export;
pub mod fetch;
pub mod grades;
pub mod layout;
pub mod model;
pub mod numeric;
pub mod order;
pub mod persist;
pub mod reset;
pub mod reuse;
pub mod tables;
pub mod writer;

pub use error::ExportError;
pub use export::{encode, export_to_path, EncodedWorkbook, ExportSummary};
pub use fetch::{FetchError, SaraClient};
pub use layout::{EntityKind, TemplateLayout};
pub use model::{ExportInput, ModuleSnapshot};
pub use reuse::{check_snapshot_reuse, select_template, ReuseDecision};
pub use writer::{SafeWriter, WriteOutcome, WriteStats};
