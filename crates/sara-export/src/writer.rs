use std::collections::BTreeMap;

use sara_model::{CellRef, CellValue};
use sara_xlsx::{SheetPatches, Worksheet};

/// What happened to a single write request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// Blank written to a cell nothing ever populated.
    NothingToClear,
    /// The template cell holds a formula.
    SkippedFormula,
    /// The cell is covered by a merged region anchored elsewhere.
    SkippedMerged,
    SkippedOutOfGrid,
    SkippedUnknownSheet,
}

/// Protected writes silently refused during one export.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub written: usize,
    pub skipped_formula: usize,
    pub skipped_merged: usize,
    pub skipped_other: usize,
}

/// The single write primitive over the template's worksheets.
///
/// Writes are buffered as patches per sheet; the template's own read model is never modified, so
/// [`SafeWriter::read`] sees pending values first and falls back to the template's cached values.
#[derive(Debug)]
pub struct SafeWriter {
    sheets: BTreeMap<String, Worksheet>,
    pending: BTreeMap<String, SheetPatches>,
    stats: WriteStats,
}

impl SafeWriter {
    pub fn new(sheets: impl IntoIterator<Item = Worksheet>) -> Self {
        Self {
            sheets: sheets
                .into_iter()
                .map(|ws| (ws.name().to_string(), ws))
                .collect(),
            pending: BTreeMap::new(),
            stats: WriteStats::default(),
        }
    }

    /// Write `value` at the 1-based (`row`, `col`) of `sheet`.
    ///
    /// Never fails: cells covered by a merge they do not anchor, template formula cells, and
    /// coordinates outside the grid are left untouched and reported through the outcome.
    pub fn write(
        &mut self,
        sheet: &str,
        row: u32,
        col: u32,
        value: impl Into<CellValue>,
    ) -> WriteOutcome {
        let outcome = self.write_inner(sheet, row, col, value.into());
        match outcome {
            WriteOutcome::Written | WriteOutcome::NothingToClear => self.stats.written += 1,
            WriteOutcome::SkippedFormula => self.stats.skipped_formula += 1,
            WriteOutcome::SkippedMerged => self.stats.skipped_merged += 1,
            WriteOutcome::SkippedOutOfGrid | WriteOutcome::SkippedUnknownSheet => {
                self.stats.skipped_other += 1
            }
        }
        outcome
    }

    fn write_inner(&mut self, sheet: &str, row: u32, col: u32, value: CellValue) -> WriteOutcome {
        let Some(ws) = self.sheets.get(sheet) else {
            return WriteOutcome::SkippedUnknownSheet;
        };
        let Some(cell) = CellRef::from_one_based(row, col) else {
            return WriteOutcome::SkippedOutOfGrid;
        };
        if ws
            .merge_containing(cell)
            .is_some_and(|merge| merge.start != cell)
        {
            return WriteOutcome::SkippedMerged;
        }
        if ws.has_formula(cell) {
            return WriteOutcome::SkippedFormula;
        }

        let template_populated = !ws.value(cell).is_empty();
        let pending = self.pending.entry(sheet.to_string()).or_default();
        if value.is_empty() && !template_populated {
            // Nothing to clear in the template; only an earlier write may need undoing.
            return match pending.remove(&cell) {
                Some(_) => WriteOutcome::Written,
                None => WriteOutcome::NothingToClear,
            };
        }
        pending.insert(cell, value);
        WriteOutcome::Written
    }

    /// Current value at the 1-based (`row`, `col`): the pending write if any, else the template's.
    pub fn read(&self, sheet: &str, row: u32, col: u32) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        let Some(cell) = CellRef::from_one_based(row, col) else {
            return &EMPTY;
        };
        if let Some(value) = self.pending.get(sheet).and_then(|p| p.get(&cell)) {
            return value;
        }
        self.sheets.get(sheet).map_or(&EMPTY, |ws| ws.value(cell))
    }

    pub fn stats(&self) -> WriteStats {
        self.stats
    }

    pub fn patches(&self) -> &BTreeMap<String, SheetPatches> {
        &self.pending
    }

    pub fn into_patches(self) -> BTreeMap<String, SheetPatches> {
        self.pending
    }
}
