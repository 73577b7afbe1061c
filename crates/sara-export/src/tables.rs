//! Writers for the structural tables and per-student values of the template.
//!
//! Every function takes an [`ExportPlan`] that already passed validation, so none of them fail;
//! refused writes (formulas, merges) are accounted for by the [`SafeWriter`].

use std::collections::{BTreeMap, HashMap};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sara_model::CellValue;

use crate::distribute::allocate;
use crate::grades::{write_grade_block, GradePayload};
use crate::layout::TemplateLayout;
use crate::model::{EvaluationReport, Grade, OutcomeUnitLink};
use crate::numeric::{number_or_zero, optional_number, percent_fraction, student_code_value, to_cell, WEIGHT_PLACES};
use crate::order::ExportPlan;
use crate::writer::SafeWriter;

fn text_or_empty(text: &str) -> CellValue {
    if text.is_empty() {
        CellValue::Empty
    } else {
        CellValue::String(text.to_string())
    }
}

fn row_at(start: u32, index: usize) -> u32 {
    start + index as u32
}

pub fn write_module_header(writer: &mut SafeWriter, layout: &TemplateLayout, module_name: Option<&str>) {
    let d = &layout.datos;
    writer.write(
        d.sheet,
        d.module_name_row,
        d.module_name_col,
        text_or_empty(module_name.unwrap_or_default()),
    );
}

/// RA table: code, name and weight as a fraction of 1.
pub fn write_ra_table(writer: &mut SafeWriter, layout: &TemplateLayout, plan: &ExportPlan<'_>) {
    let d = &layout.datos;
    for (idx, ra) in plan.ras.iter().enumerate() {
        let row = row_at(d.ra_start_row, idx);
        writer.write(d.sheet, row, d.ra_code_col, text_or_empty(&ra.code));
        writer.write(d.sheet, row, d.ra_name_col, text_or_empty(&ra.name));
        writer.write(d.sheet, row, d.ra_weight_col, to_cell(percent_fraction(ra.weight_percent.value())));
    }
}

/// UT table: names, then each unit's RA-share row zeroed and filled from its links.
///
/// Links to a unit or RA outside the plan are ignored.
pub fn write_ut_table(
    writer: &mut SafeWriter,
    layout: &TemplateLayout,
    plan: &ExportPlan<'_>,
    links: &[OutcomeUnitLink],
) {
    let d = &layout.datos;
    let mut links_by_unit: HashMap<i64, Vec<&OutcomeUnitLink>> = HashMap::new();
    for link in links {
        links_by_unit.entry(link.ut_id).or_default().push(link);
    }

    for (idx, ut) in plan.uts.iter().enumerate() {
        let row = row_at(d.ut_start_row, idx);
        writer.write(d.sheet, row, d.ut_name_col, text_or_empty(&ut.name));
        for ra_idx in 0..layout.ra_share_cols() as usize {
            writer.write(d.sheet, row, layout.ra_share_col(ra_idx), CellValue::Number(0.0));
        }
        for link in links_by_unit.get(&ut.id).into_iter().flatten() {
            let Some(&ra_idx) = plan.ra_index.get(&link.ra_id) else {
                log::warn!("ignoring link of unit {} to unknown RA {}", ut.id, link.ra_id);
                continue;
            };
            writer.write(
                d.sheet,
                row,
                layout.ra_share_col(ra_idx),
                to_cell(percent_fraction(link.percent.value())),
            );
        }
    }
}

/// Instrument table: name, RA distribution, owning unit and its period.
///
/// Returns how many rows kept a manual distribution.
pub fn write_instrument_table(writer: &mut SafeWriter, layout: &TemplateLayout, plan: &ExportPlan<'_>) -> usize {
    let d = &layout.datos;
    let mut overrides = 0;
    for (idx, ins) in plan.instruments.iter().enumerate() {
        let row = row_at(d.instrument_start_row, idx);
        writer.write(d.sheet, row, d.instrument_name_col, text_or_empty(&ins.name));

        let linked = plan.linked_ra_positions(ins);
        if allocate(writer, layout, row, ins.weight_percent.value(), &linked).is_manual_override() {
            overrides += 1;
        }

        let unit = plan.unit_of(ins);
        let unit_name = unit.map(|ut| text_or_empty(&ut.name)).unwrap_or_default();
        let period = unit
            .and_then(|ut| ut.evaluation_period.value())
            .map(to_cell)
            .unwrap_or_default();
        writer.write(d.sheet, row, d.instrument_ut_col, unit_name);
        writer.write(d.sheet, row, d.instrument_period_col, period);
    }
    overrides
}

/// Roster on Datos Iniciales plus the student name column of Actividades and Evaluaciones.
pub fn write_roster(writer: &mut SafeWriter, layout: &TemplateLayout, plan: &ExportPlan<'_>) {
    let d = &layout.datos;
    let act = &layout.actividades;
    let eval = &layout.evaluaciones;
    for (idx, student) in plan.students.iter().enumerate() {
        let name = text_or_empty(&student.full_name);
        let row = row_at(d.student_start_row, idx);
        writer.write(d.sheet, row, d.student_code_col, student_code_value(&student.student_code));
        writer.write(d.sheet, row, d.student_name_col, name.clone());
        writer.write(act.sheet, act.student_row(idx), act.student_name_col, name.clone());
        writer.write(eval.sheet, eval.student_row(idx), eval.student_name_col, name);
    }
}

/// Actividades block headers: the instrument name (only into an empty name cell) and the exercise
/// weights of row 4.
pub fn write_activity_headers(writer: &mut SafeWriter, layout: &TemplateLayout, plan: &ExportPlan<'_>) {
    let act = &layout.actividades;
    let exercise_count = layout.exercises_per_block();
    for (idx, ins) in plan.instruments.iter().enumerate() {
        let block_col = act.block_col(idx);
        let name_col = act.name_col(block_col);
        if writer.read(act.sheet, act.name_row, name_col).is_blank() {
            writer.write(act.sheet, act.name_row, name_col, text_or_empty(&ins.name));
        }

        for weight in &ins.exercise_weights {
            let Some(index) = weight
                .exercise_index
                .as_integer()
                .and_then(|i| u32::try_from(i).ok())
                .filter(|i| (1..=exercise_count).contains(i))
            else {
                continue;
            };
            let Some(value) = optional_number(weight.weight_percent.value(), WEIGHT_PLACES) else {
                continue;
            };
            writer.write(act.sheet, act.exercise_weight_row, act.exercise_col(block_col, index), to_cell(value));
        }
    }
}

/// Grade blocks of every (student, instrument) pair that has a grade.
pub fn write_activity_grades(
    writer: &mut SafeWriter,
    layout: &TemplateLayout,
    plan: &ExportPlan<'_>,
    grades: &[Grade],
) {
    let act = &layout.actividades;
    let exercise_count = layout.exercises_per_block();
    let by_pair: HashMap<(i64, i64), &Grade> = grades
        .iter()
        .map(|g| ((g.student_id, g.instrument_id), g))
        .collect();

    for (s_idx, student) in plan.students.iter().enumerate() {
        let row = act.student_row(s_idx);
        for (i_idx, ins) in plan.instruments.iter().enumerate() {
            let Some(grade) = by_pair.get(&(student.id, ins.id)) else {
                continue;
            };
            let payload = GradePayload::from_grade(grade, exercise_count);
            write_grade_block(writer, layout, row, act.block_col(i_idx), &payload);
        }
    }
}

/// Bulletin grade written to the template: 1 when the report's value is absent or 0, otherwise
/// the value truncated.
pub fn suggested_grade(value: Option<Decimal>) -> Decimal {
    match value {
        Some(v) if !v.is_zero() => v.trunc(),
        _ => Decimal::ONE,
    }
}

/// Evaluaciones: each period's numeric grade, suggested bulletin grade and failed flag.
///
/// Returns the number of periods whose report was written.
pub fn write_evaluation_reports(
    writer: &mut SafeWriter,
    layout: &TemplateLayout,
    plan: &ExportPlan<'_>,
    reports: &BTreeMap<u32, EvaluationReport>,
) -> usize {
    let eval = &layout.evaluaciones;
    let mut written = 0;
    for &period in &plan.periods {
        let Some(report) = reports.get(&period) else {
            log::warn!("no evaluation report for period {period}");
            continue;
        };
        let Some(offset) = eval.period_offset(period).filter(|_| period <= eval.max_period()) else {
            log::warn!("evaluation period {period} has no block in the template");
            continue;
        };
        written += 1;
        let rows = report.by_student();
        for (idx, student) in plan.students.iter().enumerate() {
            let Some(report_row) = rows.get(&student.id) else {
                continue;
            };
            let row = eval.student_row(idx);
            let numeric = number_or_zero(report_row.numeric_grade.value(), WEIGHT_PLACES);
            let suggested = suggested_grade(report_row.suggested_bulletin_grade.value());
            let failed = if report_row.all_ras_passed.unwrap_or(false) { 0.0 } else { 1.0 };

            writer.write(eval.sheet, row, eval.numeric_grade_col + offset, to_cell(numeric));
            writer.write(
                eval.sheet,
                row,
                eval.suggested_grade_col + offset,
                CellValue::Number(suggested.to_f64().unwrap_or(1.0)),
            );
            writer.write(eval.sheet, row, eval.failed_col + offset, CellValue::Number(failed));
        }
    }
    written
}
