use core::fmt;

use serde::{Deserialize, Serialize};

/// Number of rows in an Excel worksheet.
pub const EXCEL_MAX_ROWS: u32 = 1_048_576;

/// Number of columns in an Excel worksheet (`A..=XFD`).
pub const EXCEL_MAX_COLS: u32 = 16_384;

/// Why an A1 reference or range could not be parsed.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("{0:?} is not an A1 cell reference")]
    Malformed(String),
    #[error("{0:?} lies outside the worksheet grid")]
    OutOfGrid(String),
}

/// A single cell of a worksheet.
///
/// Rows and columns are 0-based (`row = 0`, `col = 0` is `A1`). Ordering is row-major, the order
/// cells appear in `<sheetData>`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    #[inline]
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// The cell at the 1-based row/column numbers shown by the spreadsheet application.
    ///
    /// `None` for `0` or for coordinates beyond the grid.
    pub const fn from_one_based(row: u32, col: u32) -> Option<Self> {
        if row == 0 || col == 0 || row > EXCEL_MAX_ROWS || col > EXCEL_MAX_COLS {
            return None;
        }
        Some(Self::new(row - 1, col - 1))
    }

    pub fn to_a1(self) -> String {
        let mut letters = Vec::new();
        let mut n = self.col + 1;
        while n > 0 {
            letters.push(b'A' + ((n - 1) % 26) as u8);
            n = (n - 1) / 26;
        }
        letters.reverse();
        format!("{}{}", String::from_utf8_lossy(&letters), self.row + 1)
    }

    /// Parse `B7` style references; `$` anchors are ignored.
    pub fn from_a1(a1: &str) -> Result<Self, AddressError> {
        let malformed = || AddressError::Malformed(a1.to_string());
        let s: String = a1.trim().chars().filter(|c| *c != '$').collect();
        let split = s.find(|c: char| !c.is_ascii_alphabetic()).ok_or_else(malformed)?;
        let (letters, digits) = s.split_at(split);
        if letters.is_empty() || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }

        // Saturate so overlong inputs fall out of the grid check instead of wrapping.
        let col = letters.bytes().fold(0u32, |acc, b| {
            acc.saturating_mul(26)
                .saturating_add(u32::from(b.to_ascii_uppercase() - b'A') + 1)
        });
        let row: u32 = digits.parse().unwrap_or(u32::MAX);
        Self::from_one_based(row, col).ok_or_else(|| AddressError::OutOfGrid(a1.to_string()))
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1())
    }
}

/// An inclusive rectangle of cells, normalized so `start` is the top-left corner.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: CellRef,
    pub end: CellRef,
}

impl Range {
    pub const fn new(a: CellRef, b: CellRef) -> Self {
        let (top, bottom) = if a.row <= b.row { (a.row, b.row) } else { (b.row, a.row) };
        let (left, right) = if a.col <= b.col { (a.col, b.col) } else { (b.col, a.col) };
        Self {
            start: CellRef::new(top, left),
            end: CellRef::new(bottom, right),
        }
    }

    #[inline]
    pub const fn contains(&self, cell: CellRef) -> bool {
        cell.row >= self.start.row
            && cell.row <= self.end.row
            && cell.col >= self.start.col
            && cell.col <= self.end.col
    }

    /// Parse `A1:B2`, or a lone `C3` as a one-cell range.
    pub fn from_a1(a1: &str) -> Result<Self, AddressError> {
        let (a, b) = a1.split_once(':').unwrap_or((a1, a1));
        Ok(Range::new(CellRef::from_a1(a)?, CellRef::from_a1(b)?))
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}:{}", self.start, self.end)
        }
    }
}
