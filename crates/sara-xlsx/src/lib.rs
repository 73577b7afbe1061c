//! Template workbook access for the SARA exporter.
//!
//! The crate exposes two halves of one round trip:
//!
//! - [`TemplatePackage::read_worksheet`]: a read model of a worksheet's cached values, formulas and
//!   merged regions, used to decide which cells are safe to write.
//! - [`TemplatePackage::write_with_patches`]: a streaming rewrite of the patched worksheets'
//!   `<sheetData>` that raw-copies every untouched ZIP entry, plus the [`RecalcPolicy`] edits that
//!   make the spreadsheet application recompute template formulas on open.

pub mod openxml;
mod package;
pub mod patch;
mod recalc_policy;
pub mod shared_strings;
mod sheet_metadata;
pub mod worksheet;
mod zip_util;

pub use package::{TemplatePackage, XlsxError};
pub use patch::{patch_worksheet_xml, SheetPatches};
pub use recalc_policy::RecalcPolicy;
pub use sheet_metadata::{parse_workbook_sheets, WorkbookSheetInfo};
pub use worksheet::{parse_worksheet_xml, CellEntry, Worksheet};
