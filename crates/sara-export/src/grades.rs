use std::collections::BTreeMap;

use rust_decimal::Decimal;
use sara_model::CellValue;

use crate::layout::TemplateLayout;
use crate::model::Grade;
use crate::numeric::{cell_decimal, optional_number, to_cell, GRADE_PLACES};
use crate::writer::SafeWriter;

/// One student's grade for one instrument, normalised for the grid.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GradePayload {
    pub primary: Option<Decimal>,
    /// Exercise index (1-based) -> grade.
    pub exercises: BTreeMap<u32, Decimal>,
}

impl GradePayload {
    /// Keep exercise values with an index in `1..=exercise_count` and a numeric grade.
    pub fn from_grade(grade: &Grade, exercise_count: u32) -> Self {
        let exercises = grade
            .exercise_grades
            .iter()
            .filter_map(|ex| {
                let index = ex.exercise_index.as_integer()?;
                let index = u32::try_from(index).ok().filter(|i| (1..=exercise_count).contains(i))?;
                let value = optional_number(ex.grade_value.value(), GRADE_PLACES)?;
                Some((index, value))
            })
            .collect();
        Self {
            primary: optional_number(grade.grade_value.value(), GRADE_PLACES),
            exercises,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_none() && self.exercises.is_empty()
    }
}

/// Write `payload` into the block starting at `block_col` on student row `row` of Actividades.
///
/// Exercise values win over the primary value for the sub-columns. Without exercise values the
/// primary value is spread over the sub-columns whose row-4 weight is positive (all of them when
/// none is). An empty payload touches nothing.
pub fn write_grade_block(
    writer: &mut SafeWriter,
    layout: &TemplateLayout,
    row: u32,
    block_col: u32,
    payload: &GradePayload,
) {
    if payload.is_empty() {
        return;
    }
    let act = &layout.actividades;
    let exercise_count = layout.exercises_per_block();

    if !payload.exercises.is_empty() {
        for index in 1..=exercise_count {
            let value = payload
                .exercises
                .get(&index)
                .map_or(CellValue::Empty, |v| to_cell(*v));
            writer.write(act.sheet, row, act.exercise_col(block_col, index), value);
        }
    } else if let Some(primary) = payload.primary {
        let weighted: Vec<u32> = (1..=exercise_count)
            .filter(|index| {
                let weight = writer.read(act.sheet, act.exercise_weight_row, act.exercise_col(block_col, *index));
                cell_decimal(weight) > Decimal::ZERO
            })
            .collect();
        for index in 1..=exercise_count {
            let targeted = weighted.is_empty() || weighted.contains(&index);
            let value = if targeted { to_cell(primary) } else { CellValue::Empty };
            writer.write(act.sheet, row, act.exercise_col(block_col, index), value);
        }
    }

    if let Some(primary) = payload.primary {
        writer.write(act.sheet, row, block_col, to_cell(primary));
    }
}
