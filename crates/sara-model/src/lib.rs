//! `sara-model` holds the small spreadsheet vocabulary shared by the template package layer and
//! the exporter: A1 addressing plus the scalar cell values the official template uses.

mod address;
mod value;

pub use address::{AddressError, CellRef, Range, EXCEL_MAX_COLS, EXCEL_MAX_ROWS};
pub use value::CellValue;
