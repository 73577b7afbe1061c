use sara_model::CellValue;

use crate::layout::TemplateLayout;
use crate::writer::SafeWriter;

/// Blank every student-dependent range over the full student capacity.
///
/// Covers the Actividades name column and all instrument blocks, and the Evaluaciones name column
/// with the report columns of `max(1, highest_period)` period blocks, capped at the last block that
/// fits the grid. Formula and merged cells in those ranges are skipped by the writer.
pub fn reset_student_ranges(writer: &mut SafeWriter, layout: &TemplateLayout, highest_period: u32) {
    let act = &layout.actividades;
    let eval = &layout.evaluaciones;
    let students = layout.capacity.students;
    let last_block_col = act.block_col(act.block_count as usize);

    for idx in 0..students {
        let row = act.student_row(idx);
        writer.write(act.sheet, row, act.student_name_col, CellValue::Empty);
        for col in act.block_first_col..last_block_col {
            writer.write(act.sheet, row, col, CellValue::Empty);
        }
    }

    let periods = highest_period.max(1).min(eval.max_period());
    for idx in 0..students {
        let row = eval.student_row(idx);
        writer.write(eval.sheet, row, eval.student_name_col, CellValue::Empty);
        for period in 1..=periods {
            let Some(offset) = eval.period_offset(period) else {
                break;
            };
            for col in [eval.numeric_grade_col, eval.suggested_grade_col, eval.failed_col] {
                writer.write(eval.sheet, row, col + offset, CellValue::Empty);
            }
        }
    }
    log::debug!("reset student ranges for {students} rows and {periods} period block(s)");
}
