//! Re-export on top of a previously exported workbook.
//!
//! A workbook produced by an earlier export keeps any RA distribution an operator edited by hand.
//! It replaces the blank template only when its structure still matches the module snapshot.

use std::path::Path;

use rust_decimal::Decimal;
use sara_model::{CellRef, CellValue};
use sara_xlsx::{TemplatePackage, Worksheet, XlsxError};

use crate::layout::TemplateLayout;
use crate::model::ModuleSnapshot;
use crate::numeric::cell_decimal;

/// Structure of the `Datos Iniciales` sheet of an exported workbook.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkbookFingerprint {
    pub module_name: String,
    /// RA rows with a positive weight.
    pub ras: usize,
    /// UT rows with a positive RA-share sum.
    pub uts: usize,
    /// Instrument rows with a unit and a positive RA-distribution sum.
    pub instruments: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReuseDecision {
    Reuse,
    Reject(String),
}

fn value_at(ws: &Worksheet, row: u32, col: u32) -> &CellValue {
    static EMPTY: CellValue = CellValue::Empty;
    CellRef::from_one_based(row, col).map_or(&EMPTY, |cell| ws.value(cell))
}

fn share_sum(ws: &Worksheet, layout: &TemplateLayout, row: u32) -> Decimal {
    (0..layout.ra_share_cols() as usize)
        .map(|idx| cell_decimal(value_at(ws, row, layout.ra_share_col(idx))))
        .sum()
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

pub fn fingerprint(package: &TemplatePackage, layout: &TemplateLayout) -> Result<WorkbookFingerprint, XlsxError> {
    let d = &layout.datos;
    let ws = package.read_worksheet(d.sheet)?;
    let cap = &layout.capacity;

    let module_name = match value_at(&ws, d.module_name_row, d.module_name_col) {
        CellValue::String(s) => s.clone(),
        CellValue::Number(n) => n.to_string(),
        _ => String::new(),
    };
    let ras = (0..cap.ras as u32)
        .filter(|i| cell_decimal(value_at(&ws, d.ra_start_row + i, d.ra_weight_col)) > Decimal::ZERO)
        .count();
    let uts = (0..cap.uts as u32)
        .filter(|i| share_sum(&ws, layout, d.ut_start_row + i) > Decimal::ZERO)
        .count();
    let instruments = (0..cap.instruments as u32)
        .map(|i| d.instrument_start_row + i)
        .filter(|row| !value_at(&ws, *row, d.instrument_ut_col).is_blank())
        .filter(|row| share_sum(&ws, layout, *row) > Decimal::ZERO)
        .count();

    Ok(WorkbookFingerprint { module_name, ras, uts, instruments })
}

/// Decide whether `package` (an earlier export) can stand in for the blank template.
pub fn check_snapshot_reuse(
    package: &TemplatePackage,
    snapshot: &ModuleSnapshot,
    layout: &TemplateLayout,
) -> ReuseDecision {
    let expected_name = normalize(snapshot.module_name.as_deref().unwrap_or_default());
    if expected_name.is_empty() {
        return ReuseDecision::Reject("module has no name to compare".to_string());
    }
    let found = match fingerprint(package, layout) {
        Ok(found) => found,
        Err(err) => return ReuseDecision::Reject(format!("unreadable workbook: {err}")),
    };

    if normalize(&found.module_name) != expected_name {
        return ReuseDecision::Reject(format!(
            "module name {:?} does not match {:?}",
            found.module_name.trim(),
            snapshot.module_name.as_deref().unwrap_or_default()
        ));
    }
    let expected = (snapshot.ras.len(), snapshot.uts.len(), snapshot.instruments.len());
    let actual = (found.ras, found.uts, found.instruments);
    if actual != expected {
        return ReuseDecision::Reject(format!(
            "structure RAs/UTs/instrumentos {}/{}/{} does not match {}/{}/{}",
            actual.0, actual.1, actual.2, expected.0, expected.1, expected.2
        ));
    }
    ReuseDecision::Reuse
}

/// Open the template to fill: the earlier export at `snapshot_path` when compatible, the blank
/// template otherwise.
pub fn select_template(
    template_path: &Path,
    snapshot_path: Option<&Path>,
    snapshot: &ModuleSnapshot,
    layout: &TemplateLayout,
) -> Result<TemplatePackage, XlsxError> {
    if let Some(path) = snapshot_path {
        match TemplatePackage::open(path) {
            Ok(package) => match check_snapshot_reuse(&package, snapshot, layout) {
                ReuseDecision::Reuse => {
                    log::info!("reusing previous export {}", path.display());
                    return Ok(package);
                }
                ReuseDecision::Reject(reason) => {
                    log::warn!("not reusing {}: {reason}; using the blank template", path.display());
                }
            },
            Err(err) => {
                log::warn!("cannot open previous export {}: {err}; using the blank template", path.display());
            }
        }
    }
    TemplatePackage::open(template_path)
}
