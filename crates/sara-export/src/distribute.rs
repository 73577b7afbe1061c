use rust_decimal::Decimal;
use sara_model::CellValue;

use crate::layout::TemplateLayout;
use crate::numeric::{cell_decimal, round_half_up, to_cell, FRACTION_PLACES};
use crate::writer::SafeWriter;

/// State of an instrument row's per-RA share columns before this export touches them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RowDistribution {
    /// Every share cell is blank.
    Absent,
    /// Some share cells hold values, none strictly positive.
    Zero,
    /// At least one share is strictly positive: an operator distributed the weight by hand.
    Positive,
}

impl RowDistribution {
    pub fn is_manual_override(self) -> bool {
        self == RowDistribution::Positive
    }
}

pub fn classify_row(writer: &SafeWriter, layout: &TemplateLayout, row: u32) -> RowDistribution {
    let sheet = layout.datos.sheet;
    let mut state = RowDistribution::Absent;
    for idx in 0..layout.ra_share_cols() as usize {
        let value = writer.read(sheet, row, layout.ra_share_col(idx));
        if value.is_blank() {
            continue;
        }
        if cell_decimal(value) > Decimal::ZERO {
            return RowDistribution::Positive;
        }
        state = RowDistribution::Zero;
    }
    state
}

/// Equal share of an instrument's weight fraction per linked RA.
///
/// No remainder correction: the shares may not sum exactly to the weight fraction.
pub fn equal_share(weight_percent: Option<Decimal>, linked: usize) -> Decimal {
    if linked == 0 {
        return Decimal::ZERO;
    }
    let fraction = weight_percent.unwrap_or_default() / Decimal::ONE_HUNDRED;
    round_half_up(fraction / Decimal::from(linked), FRACTION_PLACES)
}

/// Fill the share columns of the instrument row `row`, unless it carries a manual override.
///
/// `linked` are RA positions (0-based, RA order). Returns the row's state as found.
pub fn allocate(
    writer: &mut SafeWriter,
    layout: &TemplateLayout,
    row: u32,
    weight_percent: Option<Decimal>,
    linked: &[usize],
) -> RowDistribution {
    let state = classify_row(writer, layout, row);
    if state.is_manual_override() {
        log::debug!("keeping manual RA distribution in row {row}");
        return state;
    }

    let sheet = layout.datos.sheet;
    for idx in 0..layout.ra_share_cols() as usize {
        writer.write(sheet, row, layout.ra_share_col(idx), CellValue::Number(0.0));
    }
    let share = to_cell(equal_share(weight_percent, linked.len()));
    for &idx in linked {
        writer.write(sheet, row, layout.ra_share_col(idx), share.clone());
    }
    state
}
