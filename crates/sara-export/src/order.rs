use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::layout::{EntityKind, TemplateLayout};
use crate::model::{Instrument, LearningOutcome, ModuleSnapshot, Student, TeachingUnit};
use crate::ExportError;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Segment {
    Text(String),
    /// Digit run compared as an integer of any length: shorter (after stripping leading zeros)
    /// is smaller, equal lengths compare digit by digit.
    Number { len: usize, digits: String },
}

/// Sort key that orders embedded digit runs numerically (`RA2 < RA3 < RA10`).
///
/// The key alternates text and digit runs and always starts with a (possibly empty) text run, so
/// segments at the same position are always of the same kind. Text compares case-insensitively.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NaturalKey(Vec<Segment>);

impl Ord for NaturalKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for NaturalKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub fn natural_key(text: &str) -> NaturalKey {
    let mut segments = Vec::new();
    let mut text_run = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if !c.is_ascii_digit() {
            text_run.extend(c.to_lowercase());
            continue;
        }
        segments.push(Segment::Text(std::mem::take(&mut text_run)));
        let mut run = String::from(c);
        while let Some(d) = chars.next_if(char::is_ascii_digit) {
            run.push(d);
        }
        let digits = run.trim_start_matches('0');
        let digits = if digits.is_empty() { "0" } else { digits };
        segments.push(Segment::Number {
            len: digits.len(),
            digits: digits.to_string(),
        });
    }
    segments.push(Segment::Text(text_run));
    NaturalKey(segments)
}

/// Iteration order of every entity kind, produced after all structural checks passed.
#[derive(Clone, Debug)]
pub struct ExportPlan<'a> {
    pub ras: Vec<&'a LearningOutcome>,
    pub uts: Vec<&'a TeachingUnit>,
    pub instruments: Vec<&'a Instrument>,
    pub students: Vec<&'a Student>,
    pub periods: Vec<u32>,
    /// RA id -> 0-based position in `ras`.
    pub ra_index: HashMap<i64, usize>,
    /// UT id -> unit.
    pub ut_by_id: HashMap<i64, &'a TeachingUnit>,
}

impl<'a> ExportPlan<'a> {
    /// Positions (in RA order) of the instrument's linked RAs that exist in the snapshot.
    ///
    /// Duplicate links count once.
    pub fn linked_ra_positions(&self, instrument: &Instrument) -> Vec<usize> {
        let mut seen = HashSet::new();
        instrument
            .ra_ids
            .iter()
            .filter_map(|id| self.ra_index.get(id).copied())
            .filter(|idx| seen.insert(*idx))
            .collect()
    }

    pub fn unit_of(&self, instrument: &Instrument) -> Option<&'a TeachingUnit> {
        instrument.ut_id.and_then(|id| self.ut_by_id.get(&id).copied())
    }

    pub fn max_period(&self) -> u32 {
        self.periods.last().copied().unwrap_or(0)
    }
}

fn check_capacity(kind: EntityKind, count: usize, layout: &TemplateLayout) -> Result<(), ExportError> {
    let max = layout.capacity_of(kind);
    if count > max {
        return Err(ExportError::CapacityExceeded { kind, count, max });
    }
    Ok(())
}

fn check_periods(snapshot: &ModuleSnapshot, layout: &TemplateLayout) -> Result<(), ExportError> {
    let max = layout.evaluaciones.max_period();
    for ut in &snapshot.uts {
        if let Some(period) = ut.period().filter(|p| *p > max) {
            return Err(ExportError::PeriodOutOfRange {
                unit: ut.name.clone(),
                period,
                max,
            });
        }
    }
    Ok(())
}

/// Order every entity kind and run all structural checks.
///
/// Nothing is written by this step, so any error leaves no output behind.
pub fn plan<'a>(snapshot: &'a ModuleSnapshot, layout: &TemplateLayout) -> Result<ExportPlan<'a>, ExportError> {
    check_capacity(EntityKind::Ras, snapshot.ras.len(), layout)?;
    check_capacity(EntityKind::Uts, snapshot.uts.len(), layout)?;
    check_capacity(EntityKind::Instruments, snapshot.instruments.len(), layout)?;
    check_capacity(EntityKind::Students, snapshot.students.len(), layout)?;
    check_periods(snapshot, layout)?;

    let mut ras: Vec<&LearningOutcome> = snapshot.ras.iter().collect();
    ras.sort_by_cached_key(|ra| natural_key(&ra.code));
    let mut students: Vec<&Student> = snapshot.students.iter().collect();
    students.sort_by_cached_key(|s| natural_key(&s.student_code));
    let uts: Vec<&TeachingUnit> = snapshot.uts.iter().collect();

    let ra_index: HashMap<i64, usize> = ras.iter().enumerate().map(|(idx, ra)| (ra.id, idx)).collect();
    let ut_position: HashMap<i64, usize> = uts.iter().enumerate().map(|(idx, ut)| (ut.id, idx)).collect();
    let ut_by_id: HashMap<i64, &TeachingUnit> = uts.iter().map(|ut| (ut.id, *ut)).collect();

    let mut instruments: Vec<&Instrument> = snapshot.instruments.iter().collect();
    // Unknown units sort after every known one.
    instruments.sort_by_key(|ins| {
        (
            ins.ut_id
                .and_then(|id| ut_position.get(&id).copied())
                .unwrap_or(usize::MAX),
            ins.activity_id.unwrap_or(0),
            ins.id,
        )
    });

    let mut seen_names: HashSet<String> = HashSet::new();
    for ins in &instruments {
        if !seen_names.insert(ins.name.trim().to_lowercase()) {
            return Err(ExportError::DuplicateInstrumentName {
                name: ins.name.clone(),
            });
        }
    }

    let plan = ExportPlan {
        ras,
        uts,
        instruments,
        students,
        periods: snapshot.evaluation_periods(),
        ra_index,
        ut_by_id,
    };

    for ins in &plan.instruments {
        if plan.linked_ra_positions(ins).is_empty() {
            return Err(ExportError::UnlinkedInstrument {
                name: ins.name.clone(),
            });
        }
    }

    Ok(plan)
}
