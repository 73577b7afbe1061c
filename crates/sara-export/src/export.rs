use std::fmt;
use std::path::Path;

use sara_xlsx::{RecalcPolicy, TemplatePackage};

use crate::layout::TemplateLayout;
use crate::model::ExportInput;
use crate::order::plan;
use crate::persist::atomic_write_bytes;
use crate::reset::reset_student_ranges;
use crate::tables::{
    write_activity_grades, write_activity_headers, write_evaluation_reports, write_instrument_table,
    write_module_header, write_ra_table, write_roster, write_ut_table,
};
use crate::writer::{SafeWriter, WriteStats};
use crate::ExportError;

/// Entity counts of one export, printed as the CLI's summary line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub ras: usize,
    pub uts: usize,
    pub instruments: usize,
    pub students: usize,
    /// Periods whose evaluation report was written.
    pub evaluations: usize,
    /// Instrument rows whose manual RA distribution was kept.
    pub manual_distributions: usize,
}

impl fmt::Display for ExportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RAs:{} UTs:{} instrumentos:{} alumnos:{} evaluaciones:{}",
            self.ras, self.uts, self.instruments, self.students, self.evaluations
        )
    }
}

#[derive(Clone, Debug)]
pub struct EncodedWorkbook {
    pub bytes: Vec<u8>,
    pub summary: ExportSummary,
    pub stats: WriteStats,
}

/// Fill `template` with `input` and serialise the result.
///
/// All structural checks run before the first cell is written; on error nothing is produced.
pub fn encode(
    template: &TemplatePackage,
    input: &ExportInput,
    layout: &TemplateLayout,
) -> Result<EncodedWorkbook, ExportError> {
    let snapshot = &input.snapshot;
    let plan = plan(snapshot, layout)?;

    let mut sheets = Vec::with_capacity(layout.sheet_names().len());
    for name in layout.sheet_names() {
        if template.worksheet_part(name).is_none() {
            return Err(ExportError::MissingTemplateSheet(name.to_string()));
        }
        sheets.push(template.read_worksheet(name)?);
    }
    if !snapshot.activities.is_empty() {
        log::debug!("snapshot lists {} activities", snapshot.activities.len());
    }

    let mut writer = SafeWriter::new(sheets);
    reset_student_ranges(&mut writer, layout, plan.max_period());

    write_module_header(&mut writer, layout, snapshot.module_name.as_deref());
    write_ra_table(&mut writer, layout, &plan);
    write_ut_table(&mut writer, layout, &plan, &snapshot.ut_ra_links);
    let manual_distributions = write_instrument_table(&mut writer, layout, &plan);
    write_roster(&mut writer, layout, &plan);
    write_activity_headers(&mut writer, layout, &plan);
    write_activity_grades(&mut writer, layout, &plan, &snapshot.grades);
    let evaluations = write_evaluation_reports(&mut writer, layout, &plan, &input.reports);

    let summary = ExportSummary {
        ras: plan.ras.len(),
        uts: plan.uts.len(),
        instruments: plan.instruments.len(),
        students: plan.students.len(),
        evaluations,
        manual_distributions,
    };
    let stats = writer.stats();
    if manual_distributions > 0 {
        log::info!("kept {manual_distributions} manual RA distribution row(s)");
    }
    log::debug!(
        "{} cell writes, skipped {} formula, {} merged and {} other target(s)",
        stats.written,
        stats.skipped_formula,
        stats.skipped_merged,
        stats.skipped_other
    );

    let bytes = template.write_with_patches(&writer.into_patches(), RecalcPolicy::default())?;
    log::info!("filled template: {summary}");
    Ok(EncodedWorkbook { bytes, summary, stats })
}

/// [`encode`] and persist the workbook atomically at `output`.
pub fn export_to_path(
    template: &TemplatePackage,
    input: &ExportInput,
    layout: &TemplateLayout,
    output: &Path,
) -> Result<ExportSummary, ExportError> {
    let encoded = encode(template, input, layout)?;
    atomic_write_bytes(output, &encoded.bytes).map_err(|source| ExportError::Persist {
        path: output.display().to_string(),
        source,
    })?;
    log::info!("wrote {}", output.display());
    Ok(encoded.summary)
}
