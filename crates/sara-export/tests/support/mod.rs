#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};

use sara_export::model::{EvaluationReport, ExportInput, ModuleSnapshot};
use sara_model::{CellRef, CellValue};
use sara_xlsx::TemplatePackage;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const DATOS: &str = "Datos Iniciales";
pub const ACTIVIDADES: &str = "Actividades";
pub const EVALUACIONES: &str = "Evaluaciones";

#[derive(Debug, Clone)]
struct SheetFixture {
    name: String,
    cells: BTreeMap<CellRef, String>,
    merges: Vec<String>,
}

/// In-memory stand-in for the official template: the three sheets, header text in the shared
/// string table, a few formulas and merged headers, and a calc chain.
#[derive(Debug, Clone)]
pub struct TemplateFixture {
    sheets: Vec<SheetFixture>,
    shared_strings: Vec<String>,
}

impl TemplateFixture {
    /// Three empty sheets.
    pub fn blank() -> Self {
        Self {
            sheets: [DATOS, ACTIVIDADES, EVALUACIONES]
                .iter()
                .map(|name| SheetFixture {
                    name: name.to_string(),
                    cells: BTreeMap::new(),
                    merges: Vec::new(),
                })
                .collect(),
            shared_strings: Vec::new(),
        }
    }

    /// The layout of the official template with its protected cells.
    pub fn official() -> Self {
        Self::blank()
            .text(DATOS, "A1", "Datos iniciales del módulo")
            .merge(DATOS, "A1:T1")
            .text(DATOS, "A3", "Módulo")
            .text(DATOS, "A8", "Código RA")
            .formula(DATOS, "D9", "C9*100", 0.0)
            .text(ACTIVIDADES, "C3", "Nota")
            .merge(ACTIVIDADES, "G1:K1")
            .formula(ACTIVIDADES, "C6", "AVERAGE(D6:M6)", 0.0)
            .text(EVALUACIONES, "R3", "1ª Evaluación")
            .merge(EVALUACIONES, "R3:AE3")
            .formula(EVALUACIONES, "S5", "R5*10", 0.0)
    }

    pub fn without_sheet(mut self, name: &str) -> Self {
        self.sheets.retain(|s| s.name != name);
        self
    }

    fn put(mut self, sheet: &str, a1: &str, xml: impl FnOnce(&str, &mut Vec<String>) -> String) -> Self {
        let cell = CellRef::from_a1(a1).unwrap();
        let body = xml(a1, &mut self.shared_strings);
        let sheet = self.sheets.iter_mut().find(|s| s.name == sheet).unwrap();
        sheet.cells.insert(cell, body);
        self
    }

    pub fn number(self, sheet: &str, a1: &str, value: f64) -> Self {
        self.put(sheet, a1, |r, _| format!(r#"<c r="{r}"><v>{value}</v></c>"#))
    }

    pub fn text(self, sheet: &str, a1: &str, text: &str) -> Self {
        self.put(sheet, a1, |r, sst| {
            sst.push(text.to_string());
            format!(r#"<c r="{r}" t="s"><v>{}</v></c>"#, sst.len() - 1)
        })
    }

    pub fn formula(self, sheet: &str, a1: &str, formula: &str, cached: f64) -> Self {
        self.put(sheet, a1, |r, _| format!(r#"<c r="{r}" s="2"><f>{formula}</f><v>{cached}</v></c>"#))
    }

    pub fn merge(mut self, sheet: &str, range: &str) -> Self {
        let sheet = self.sheets.iter_mut().find(|s| s.name == sheet).unwrap();
        sheet.merges.push(range.to_string());
        self
    }

    fn worksheet_xml(sheet: &SheetFixture) -> String {
        let mut rows: BTreeMap<u32, String> = BTreeMap::new();
        for (cell, xml) in &sheet.cells {
            rows.entry(cell.row + 1).or_default().push_str(xml);
        }
        let mut out = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><dimension ref="A1"/><sheetData>"#,
        );
        for (row, cells) in rows {
            out.push_str(&format!(r#"<row r="{row}">{cells}</row>"#));
        }
        out.push_str("</sheetData>");
        if !sheet.merges.is_empty() {
            out.push_str(&format!(r#"<mergeCells count="{}">"#, sheet.merges.len()));
            for m in &sheet.merges {
                out.push_str(&format!(r#"<mergeCell ref="{m}"/>"#));
            }
            out.push_str("</mergeCells>");
        }
        out.push_str(r#"<pageMargins left="0.7" right="0.7" top="0.75" bottom="0.75" header="0.3" footer="0.3"/></worksheet>"#);
        out
    }

    pub fn build(&self) -> Vec<u8> {
        let mut content_types = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/><Override PartName="/xl/calcChain.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.calcChain+xml"/>"#,
        );
        let mut workbook = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>"#,
        );
        let mut rels = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId100" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/><Relationship Id="rId101" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain" Target="calcChain.xml"/>"#,
        );
        for (idx, sheet) in self.sheets.iter().enumerate() {
            let n = idx + 1;
            content_types.push_str(&format!(
                r#"<Override PartName="/xl/worksheets/sheet{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
            ));
            workbook.push_str(&format!(r#"<sheet name="{}" sheetId="{n}" r:id="rId{n}"/>"#, sheet.name));
            rels.push_str(&format!(
                r#"<Relationship Id="rId{n}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{n}.xml"/>"#
            ));
        }
        content_types.push_str("</Types>");
        workbook.push_str(r#"</sheets><calcPr calcId="191029"/></workbook>"#);
        rels.push_str("</Relationships>");

        let mut sst = format!(
            r#"<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="{0}" uniqueCount="{0}">"#,
            self.shared_strings.len()
        );
        for s in &self.shared_strings {
            sst.push_str(&format!("<si><t>{s}</t></si>"));
        }
        sst.push_str("</sst>");

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);
        let mut put = |name: &str, bytes: &[u8]| {
            zip.start_file(name, options).unwrap();
            zip.write_all(bytes).unwrap();
        };
        put("[Content_Types].xml", content_types.as_bytes());
        put(
            "_rels/.rels",
            br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#,
        );
        put("xl/workbook.xml", workbook.as_bytes());
        put("xl/_rels/workbook.xml.rels", rels.as_bytes());
        for (idx, sheet) in self.sheets.iter().enumerate() {
            put(&format!("xl/worksheets/sheet{}.xml", idx + 1), Self::worksheet_xml(sheet).as_bytes());
        }
        put("xl/sharedStrings.xml", sst.as_bytes());
        put(
            "xl/calcChain.xml",
            br#"<calcChain xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><c r="D9" i="1"/><c r="C6" i="2"/><c r="S5" i="3"/></calcChain>"#,
        );
        put("docProps/app.xml", b"<Properties><Application>Microsoft Excel</Application></Properties>");
        zip.finish().unwrap().into_inner()
    }

    pub fn package(&self) -> TemplatePackage {
        TemplatePackage::from_bytes(self.build()).unwrap()
    }
}

/// A module with RA codes out of natural order, two periods and every grade payload shape.
pub const SAMPLE_PREVIEW: &str = r#"{
    "moduleId": 12,
    "moduleName": "Sistemas Informáticos",
    "academicYear": "2025-2026",
    "teacherName": "Marta Díaz",
    "ras": [
        {"id": 1, "code": "RA10", "name": "Seguridad", "weightPercent": 20},
        {"id": 2, "code": "RA2", "name": "Redes", "weightPercent": 30},
        {"id": 3, "code": "RA1", "name": "Instalación", "weightPercent": 50}
    ],
    "uts": [
        {"id": 10, "name": "UT1 Hardware", "evaluationPeriod": 1},
        {"id": 11, "name": "UT2 Redes", "evaluationPeriod": 2}
    ],
    "utRaLinks": [
        {"utId": 10, "raId": 3, "percent": 60},
        {"utId": 10, "raId": 2, "percent": 40},
        {"utId": 11, "raId": 1, "percent": 100}
    ],
    "activities": [
        {"id": 1, "utId": 10, "evaluationPeriod": 1, "name": "Teoría"},
        {"id": 2, "utId": 10, "evaluationPeriod": 1, "name": "Práctica"}
    ],
    "instruments": [
        {"id": 100, "name": "Examen UT1", "utId": 10, "activityId": 1, "weightPercent": 30, "raIds": [1, 2, 3],
         "exerciseWeights": [{"exerciseIndex": 1, "weightPercent": 0.5}, {"exerciseIndex": 2, "weightPercent": 0.5}]},
        {"id": 101, "name": "Práctica redes", "utId": 11, "activityId": 2, "weightPercent": 40, "raIds": [1]},
        {"id": 102, "name": "Cuestionario", "utId": 10, "activityId": 2, "weightPercent": "30%", "raIds": [2, 3]}
    ],
    "students": [
        {"id": 1, "studentCode": "A003", "fullName": "Carlos Ruiz"},
        {"id": 2, "studentCode": "A001", "fullName": "Ana López"},
        {"id": 3, "studentCode": "A010", "fullName": "Beatriz Gil"}
    ],
    "grades": [
        {"studentId": 2, "instrumentId": 100, "gradeValue": 7.456},
        {"studentId": 1, "instrumentId": 102, "gradeValue": null,
         "exerciseGrades": [{"exerciseIndex": 1, "gradeValue": 8}, {"exerciseIndex": 3, "gradeValue": 6.5}]},
        {"studentId": 3, "instrumentId": 101, "gradeValue": 5}
    ]
}"#;

pub const SAMPLE_REPORT_1: &str = r#"{"students": [
    {"studentId": 2, "numericGrade": 7.12345, "suggestedBulletinGrade": 7, "allRAsPassed": true},
    {"studentId": 1, "numericGrade": 4.2, "suggestedBulletinGrade": 0, "allRAsPassed": false}
]}"#;

pub const SAMPLE_REPORT_2: &str = r#"{"students": [
    {"studentId": 3, "numericGrade": null, "allRAsPassed": false}
]}"#;

pub fn sample_snapshot() -> ModuleSnapshot {
    serde_json::from_str(SAMPLE_PREVIEW).unwrap()
}

pub fn sample_input() -> ExportInput {
    let report = |json: &str| serde_json::from_str::<EvaluationReport>(json).unwrap();
    ExportInput {
        snapshot: sample_snapshot(),
        reports: BTreeMap::from([(1, report(SAMPLE_REPORT_1)), (2, report(SAMPLE_REPORT_2))]),
    }
}

/// Cell value of `a1` on `sheet` in a written workbook.
pub fn cell(package: &TemplatePackage, sheet: &str, a1: &str) -> CellValue {
    package
        .read_worksheet(sheet)
        .unwrap()
        .value(CellRef::from_a1(a1).unwrap())
        .clone()
}

pub fn num(package: &TemplatePackage, sheet: &str, a1: &str) -> Option<f64> {
    cell(package, sheet, a1).as_number()
}

pub fn text(package: &TemplatePackage, sheet: &str, a1: &str) -> Option<String> {
    cell(package, sheet, a1).as_str().map(str::to_string)
}

/// Every non-empty cell value of every sheet, keyed by sheet and A1 reference.
pub fn populated_values(package: &TemplatePackage) -> BTreeMap<(String, String), CellValue> {
    let mut out = BTreeMap::new();
    for sheet in [DATOS, ACTIVIDADES, EVALUACIONES] {
        let ws = package.read_worksheet(sheet).unwrap();
        for (cell, entry) in ws.cells() {
            if !entry.value.is_empty() {
                out.insert((sheet.to_string(), cell.to_a1()), entry.value.clone());
            }
        }
    }
    out
}

/// Every part of a package, inflated.
pub fn unzip(bytes: &[u8]) -> BTreeMap<String, Vec<u8>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut parts = BTreeMap::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).unwrap();
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).unwrap();
        parts.insert(file.name().to_string(), buf);
    }
    parts
}
