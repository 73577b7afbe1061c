//! Coordinates of the official grading template.
//!
//! Rows and columns are 1-based, exactly as printed in the spreadsheet application, so the
//! constants can be checked against the template by eye.

use sara_model::EXCEL_MAX_COLS;

/// Sheet `Datos Iniciales`: module header, RA/UT tables, instrument table and roster.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DatosLayout {
    pub sheet: &'static str,
    pub module_name_row: u32,
    pub module_name_col: u32,
    pub ra_start_row: u32,
    pub ra_code_col: u32,
    pub ra_name_col: u32,
    pub ra_weight_col: u32,
    pub ut_start_row: u32,
    pub ut_name_col: u32,
    /// First of the per-RA share columns, used by both the UT and the instrument tables.
    pub ra_share_first_col: u32,
    pub instrument_start_row: u32,
    pub instrument_name_col: u32,
    pub instrument_ut_col: u32,
    pub instrument_period_col: u32,
    pub student_start_row: u32,
    pub student_code_col: u32,
    pub student_name_col: u32,
}

/// Sheet `Actividades`: one block of columns per instrument, one row per student.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActividadesLayout {
    pub sheet: &'static str,
    pub student_start_row: u32,
    pub student_name_col: u32,
    pub block_first_col: u32,
    /// Primary grade column plus the exercise sub-columns.
    pub block_width: u32,
    pub block_count: u32,
    pub name_row: u32,
    /// Offset of the instrument name cell from the block's first column.
    pub name_col_offset: u32,
    pub exercise_weight_row: u32,
}

/// Sheet `Evaluaciones`: one block of columns per evaluation period.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EvaluacionesLayout {
    pub sheet: &'static str,
    pub student_start_row: u32,
    pub student_name_col: u32,
    pub numeric_grade_col: u32,
    pub suggested_grade_col: u32,
    pub failed_col: u32,
    pub block_width: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capacity {
    pub ras: usize,
    pub uts: usize,
    pub instruments: usize,
    pub students: usize,
}

/// Entity kinds with a capacity in the template, named with the template's own labels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Ras,
    Uts,
    Instruments,
    Students,
}

impl EntityKind {
    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Ras => "RAs",
            EntityKind::Uts => "UTs",
            EntityKind::Instruments => "Instrumentos",
            EntityKind::Students => "Alumnos",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// The full coordinate system of a template layout version.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TemplateLayout {
    pub datos: DatosLayout,
    pub actividades: ActividadesLayout,
    pub evaluaciones: EvaluacionesLayout,
    pub capacity: Capacity,
}

impl TemplateLayout {
    /// The layout of the official template currently in use.
    pub const OFFICIAL: Self = Self {
        datos: DatosLayout {
            sheet: "Datos Iniciales",
            module_name_row: 3,
            module_name_col: 2,
            ra_start_row: 9,
            ra_code_col: 1,
            ra_name_col: 2,
            ra_weight_col: 3,
            ut_start_row: 9,
            ut_name_col: 5,
            ra_share_first_col: 6,
            instrument_start_row: 35,
            instrument_name_col: 5,
            instrument_ut_col: 16,
            instrument_period_col: 17,
            student_start_row: 9,
            student_code_col: 19,
            student_name_col: 20,
        },
        actividades: ActividadesLayout {
            sheet: "Actividades",
            student_start_row: 6,
            student_name_col: 2,
            block_first_col: 3,
            block_width: 11,
            block_count: 30,
            name_row: 1,
            name_col_offset: 4,
            exercise_weight_row: 4,
        },
        evaluaciones: EvaluacionesLayout {
            sheet: "Evaluaciones",
            student_start_row: 5,
            student_name_col: 2,
            numeric_grade_col: 18,
            suggested_grade_col: 20,
            failed_col: 31,
            block_width: 15,
        },
        capacity: Capacity {
            ras: 10,
            uts: 20,
            instruments: 30,
            students: 45,
        },
    };

    pub fn capacity_of(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Ras => self.capacity.ras,
            EntityKind::Uts => self.capacity.uts,
            EntityKind::Instruments => self.capacity.instruments,
            EntityKind::Students => self.capacity.students,
        }
    }

    /// Sheets the encoder writes to; all must exist in the template.
    pub fn sheet_names(&self) -> [&'static str; 3] {
        [self.datos.sheet, self.actividades.sheet, self.evaluaciones.sheet]
    }

    /// Number of per-RA share columns (one per RA the template can hold).
    pub fn ra_share_cols(&self) -> u32 {
        self.capacity.ras as u32
    }

    /// Share column of the RA at `ra_index` (0-based RA order).
    pub fn ra_share_col(&self, ra_index: usize) -> u32 {
        self.datos.ra_share_first_col + ra_index as u32
    }

    /// Exercise sub-columns per instrument block.
    pub fn exercises_per_block(&self) -> u32 {
        self.actividades.block_width - 1
    }
}

impl Default for TemplateLayout {
    fn default() -> Self {
        Self::OFFICIAL
    }
}

impl ActividadesLayout {
    /// First (primary grade) column of instrument block `block` (0-based).
    pub fn block_col(&self, block: usize) -> u32 {
        self.block_first_col + block as u32 * self.block_width
    }

    /// Column of exercise `exercise` (1-based) inside the block starting at `block_col`.
    pub fn exercise_col(&self, block_col: u32, exercise: u32) -> u32 {
        block_col + exercise
    }

    pub fn name_col(&self, block_col: u32) -> u32 {
        block_col + self.name_col_offset
    }

    pub fn student_row(&self, index: usize) -> u32 {
        self.student_start_row + index as u32
    }
}

impl EvaluacionesLayout {
    /// Column shift of period `period` (1-based) relative to period 1.
    ///
    /// `None` when the shift does not fit a column number.
    pub fn period_offset(&self, period: u32) -> Option<u32> {
        period.saturating_sub(1).checked_mul(self.block_width)
    }

    /// Highest period whose report columns still fit the sheet grid.
    pub fn max_period(&self) -> u32 {
        let last_col = self.numeric_grade_col.max(self.suggested_grade_col).max(self.failed_col);
        match EXCEL_MAX_COLS.checked_sub(last_col) {
            Some(room) if self.block_width > 0 => room / self.block_width + 1,
            Some(_) => 1,
            None => 0,
        }
    }

    pub fn student_row(&self, index: usize) -> u32 {
        self.student_start_row + index as u32
    }
}
