//! Module snapshot and evaluation reports as served by the SARA backend.
//!
//! Field names follow the backend's camelCase JSON. Identifiers are required; every numeric
//! payload field is a [`WireNumber`] so malformed values degrade to "absent" instead of failing
//! the whole document.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};

use crate::numeric::parse_decimal;

/// A backend number that may be missing, `null`, a JSON number or a numeric string.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WireNumber(pub Option<Decimal>);

impl WireNumber {
    pub fn value(self) -> Option<Decimal> {
        self.0
    }

    /// The value as a whole number, if it is one.
    pub fn as_integer(self) -> Option<i64> {
        self.0.filter(|d| d.fract().is_zero()).and_then(|d| d.to_i64())
    }
}

impl From<Decimal> for WireNumber {
    fn from(value: Decimal) -> Self {
        Self(Some(value))
    }
}

impl From<i64> for WireNumber {
    fn from(value: i64) -> Self {
        Self(Some(Decimal::from(value)))
    }
}

impl<'de> Deserialize<'de> for WireNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        let parsed = match &raw {
            serde_json::Value::Number(n) => parse_decimal(&n.to_string()),
            serde_json::Value::String(s) => parse_decimal(s),
            _ => None,
        };
        if parsed.is_none() && !raw.is_null() {
            log::warn!("ignoring non-numeric value {raw}");
        }
        Ok(Self(parsed))
    }
}

/// Text fields occasionally arrive as numbers (student codes); accept both, `null` as empty.
fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSnapshot {
    #[serde(default)]
    pub module_id: Option<i64>,
    #[serde(default)]
    pub module_name: Option<String>,
    #[serde(default)]
    pub academic_year: Option<String>,
    #[serde(default)]
    pub teacher_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub ras: Vec<LearningOutcome>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub uts: Vec<TeachingUnit>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub ut_ra_links: Vec<OutcomeUnitLink>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub activities: Vec<Activity>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub instruments: Vec<Instrument>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub students: Vec<Student>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub grades: Vec<Grade>,
}

impl ModuleSnapshot {
    /// Sorted distinct positive evaluation periods of the teaching units.
    pub fn evaluation_periods(&self) -> Vec<u32> {
        self.uts
            .iter()
            .filter_map(TeachingUnit::period)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// RA: a learning outcome.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningOutcome {
    pub id: i64,
    #[serde(default, deserialize_with = "lenient_text")]
    pub code: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: String,
    #[serde(default)]
    pub weight_percent: WireNumber,
}

/// UT: a teaching unit.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeachingUnit {
    pub id: i64,
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: String,
    #[serde(default)]
    pub evaluation_period: WireNumber,
}

impl TeachingUnit {
    pub fn period(&self) -> Option<u32> {
        self.evaluation_period
            .as_integer()
            .filter(|p| *p > 0)
            .and_then(|p| u32::try_from(p).ok())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeUnitLink {
    pub ut_id: i64,
    pub ra_id: i64,
    #[serde(default)]
    pub percent: WireNumber,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: i64,
    #[serde(default)]
    pub ut_id: Option<i64>,
    #[serde(default)]
    pub evaluation_period: WireNumber,
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instrument {
    pub id: i64,
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: String,
    #[serde(default)]
    pub ut_id: Option<i64>,
    #[serde(default)]
    pub activity_id: Option<i64>,
    #[serde(default)]
    pub weight_percent: WireNumber,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub ra_ids: Vec<i64>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub exercise_weights: Vec<ExerciseWeight>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseWeight {
    #[serde(default)]
    pub exercise_index: WireNumber,
    #[serde(default)]
    pub weight_percent: WireNumber,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: i64,
    #[serde(default, deserialize_with = "lenient_text")]
    pub student_code: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub full_name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub student_id: i64,
    pub instrument_id: i64,
    #[serde(default)]
    pub grade_value: WireNumber,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub exercise_grades: Vec<ExerciseGrade>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseGrade {
    #[serde(default)]
    pub exercise_index: WireNumber,
    #[serde(default)]
    pub grade_value: WireNumber,
}

/// Evaluation report of one period.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationReport {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub students: Vec<ReportRow>,
}

impl EvaluationReport {
    /// Rows keyed by student; a later row for the same student replaces an earlier one.
    pub fn by_student(&self) -> BTreeMap<i64, &ReportRow> {
        self.students.iter().map(|row| (row.student_id, row)).collect()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    pub student_id: i64,
    #[serde(default)]
    pub numeric_grade: WireNumber,
    #[serde(default)]
    pub suggested_bulletin_grade: WireNumber,
    #[serde(default, rename = "allRAsPassed", alias = "allRasPassed")]
    pub all_ras_passed: Option<bool>,
}

/// Everything the encoder consumes, assembled before any cell is written.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExportInput {
    pub snapshot: ModuleSnapshot,
    /// Evaluation report per period.
    pub reports: BTreeMap<u32, EvaluationReport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::str::FromStr;

    #[test]
    fn decodes_backend_preview() {
        let json = r#"{
            "moduleId": 7,
            "moduleName": "Sistemas Informáticos",
            "ras": [{"id": 1, "code": "RA1", "name": "Instala", "weightPercent": 30.5}],
            "uts": [{"id": 10, "name": "UT1", "evaluationPeriod": 1}, {"id": 11, "name": "UT2", "evaluationPeriod": null}],
            "utRaLinks": [{"id": 99, "utId": 10, "raId": 1, "percent": "40,5"}],
            "activities": null,
            "instruments": [{"id": 5, "name": "Examen", "utId": 10, "activityId": 3, "weightPercent": "30%", "raIds": [1]}],
            "students": [{"id": 2, "studentCode": 1234, "fullName": "Ana"}],
            "grades": [{"id": 8, "studentId": 2, "instrumentId": 5, "gradeValue": "abc",
                        "exerciseGrades": [{"exerciseIndex": 1, "gradeValue": 7.25}]}]
        }"#;
        let snapshot: ModuleSnapshot = serde_json::from_str(json).unwrap();

        assert_eq!(snapshot.module_name.as_deref(), Some("Sistemas Informáticos"));
        assert_eq!(snapshot.ras[0].weight_percent.value(), Some(Decimal::from_str("30.5").unwrap()));
        assert_eq!(snapshot.ut_ra_links[0].percent.value(), Some(Decimal::from_str("40.5").unwrap()));
        assert_eq!(snapshot.instruments[0].weight_percent.value(), Some(Decimal::from(30)));
        assert!(snapshot.instruments[0].exercise_weights.is_empty());
        assert_eq!(snapshot.students[0].student_code, "1234");
        assert_eq!(snapshot.grades[0].grade_value.value(), None);
        assert_eq!(snapshot.grades[0].exercise_grades[0].exercise_index.as_integer(), Some(1));
        assert_eq!(snapshot.evaluation_periods(), vec![1]);
    }

    #[test]
    fn missing_identifier_is_an_error() {
        let err = serde_json::from_str::<Student>(r#"{"studentCode": "A1"}"#).unwrap_err();
        assert!(err.to_string().contains("id"), "{err}");
    }

    #[test]
    fn decodes_evaluation_report() {
        let report: EvaluationReport = serde_json::from_str(
            r#"{"students": [{"studentId": 2, "numericGrade": 6.12345, "suggestedBulletinGrade": 6, "allRAsPassed": true},
                             {"studentId": 3, "numericGrade": null}]}"#,
        )
        .unwrap();
        let rows = report.by_student();
        assert_eq!(rows[&2].all_ras_passed, Some(true));
        assert_eq!(rows[&3].numeric_grade.value(), None);
        assert_eq!(rows[&3].all_ras_passed, None);
    }

    #[test]
    fn periods_are_sorted_distinct_and_positive() {
        let snapshot = ModuleSnapshot {
            uts: [3, 1, 0, 3, -2, 2]
                .into_iter()
                .enumerate()
                .map(|(i, p)| TeachingUnit {
                    id: i as i64,
                    name: format!("UT{i}"),
                    evaluation_period: WireNumber::from(p),
                })
                .collect(),
            ..ModuleSnapshot::default()
        };
        assert_eq!(snapshot.evaluation_periods(), vec![1, 2, 3]);
    }
}
