mod support;

use std::collections::{BTreeMap, BTreeSet};

use pretty_assertions::assert_eq;
use sara_model::{CellRef, CellValue};
use sara_xlsx::{RecalcPolicy, SheetPatches, TemplatePackage, XlsxError};

use support::{part_text, unzip, TemplateBuilder};

fn at(a1: &str) -> CellRef {
    CellRef::from_a1(a1).unwrap()
}

fn template() -> Vec<u8> {
    TemplateBuilder::new()
        .shared_strings(&["Módulo", "RA1"])
        .sheet(
            "Datos Iniciales",
            r#"<sheetData><row r="3"><c r="A3" t="s"><v>0</v></c><c r="B3" s="4"/></row><row r="9"><c r="A9" t="s"><v>1</v></c><c r="D9"><f>C9*100</f><v>0</v></c></row></sheetData><mergeCells count="1"><mergeCell ref="B3:D3"/></mergeCells>"#,
        )
        .sheet(
            "Actividades",
            r#"<sheetData><row r="6"><c r="B6"><v>1</v></c></row></sheetData>"#,
        )
        .part("docProps/app.xml", b"<Properties/>")
        .build()
}

#[test]
fn reads_sheets_values_formulas_and_merges() {
    let pkg = TemplatePackage::from_bytes(template()).unwrap();
    assert_eq!(
        pkg.sheet_names().collect::<Vec<_>>(),
        vec!["Datos Iniciales", "Actividades"]
    );
    assert_eq!(pkg.worksheet_part("Actividades"), Some("xl/worksheets/sheet2.xml"));

    let ws = pkg.read_worksheet("Datos Iniciales").unwrap();
    assert_eq!(ws.value(at("A3")), &CellValue::String("Módulo".into()));
    assert_eq!(ws.value(at("A9")), &CellValue::String("RA1".into()));
    assert!(ws.has_formula(at("D9")));
    assert_eq!(ws.merge_containing(at("C3")).map(|r| r.start), Some(at("B3")));

    let err = pkg.read_worksheet("Evaluaciones").unwrap_err();
    assert!(matches!(err, XlsxError::MissingSheet(name) if name == "Evaluaciones"));
}

#[test]
fn write_changes_only_patched_sheets_and_calc_metadata() {
    let original = template();
    let pkg = TemplatePackage::from_bytes(original.clone()).unwrap();

    let mut sheet: SheetPatches = BTreeMap::new();
    sheet.insert(at("B3"), CellValue::String("Sistemas Informáticos".into()));
    sheet.insert(at("C9"), CellValue::Number(0.3));
    let patches = BTreeMap::from([("Datos Iniciales".to_string(), sheet)]);

    let written = pkg.write_with_patches(&patches, RecalcPolicy::default()).unwrap();

    let before = unzip(&original);
    let after = unzip(&written);
    let changed: BTreeSet<&str> = before
        .iter()
        .filter(|(name, bytes)| after.get(*name) != Some(*bytes))
        .map(|(name, _)| name.as_str())
        .collect();
    assert_eq!(
        changed,
        BTreeSet::from([
            "[Content_Types].xml",
            "xl/_rels/workbook.xml.rels",
            "xl/calcChain.xml",
            "xl/workbook.xml",
            "xl/worksheets/sheet1.xml",
        ])
    );
    assert!(!after.contains_key("xl/calcChain.xml"));
    assert!(part_text(&written, "xl/workbook.xml").contains(r#"fullCalcOnLoad="1""#));
    assert!(!part_text(&written, "[Content_Types].xml").contains("calcChain"));

    let reread = TemplatePackage::from_bytes(written).unwrap();
    let ws = reread.read_worksheet("Datos Iniciales").unwrap();
    assert_eq!(ws.value(at("B3")), &CellValue::String("Sistemas Informáticos".into()));
    assert_eq!(ws.value(at("C9")), &CellValue::Number(0.3));
    assert_eq!(ws.cell(at("D9")).and_then(|c| c.formula.as_deref()), Some("C9*100"));
    assert_eq!(ws.merges().len(), 1);
}

#[test]
fn preserve_policy_keeps_calc_chain() {
    let pkg = TemplatePackage::from_bytes(template()).unwrap();
    let written = pkg
        .write_with_patches(&BTreeMap::new(), RecalcPolicy::PRESERVE)
        .unwrap();
    assert_eq!(unzip(&written), unzip(pkg.as_bytes()));
    // Nothing to change: the template bytes come back as they are.
    assert!(written == pkg.as_bytes());

    let empty_sheet = BTreeMap::from([("Actividades".to_string(), SheetPatches::new())]);
    let written = pkg.write_with_patches(&empty_sheet, RecalcPolicy::PRESERVE).unwrap();
    assert!(written == pkg.as_bytes());
}

#[test]
fn patching_unknown_sheet_fails() {
    let pkg = TemplatePackage::from_bytes(template()).unwrap();
    let patches = BTreeMap::from([(
        "Evaluaciones".to_string(),
        SheetPatches::from([(at("R5"), CellValue::Number(1.0))]),
    )]);
    let err = pkg.write_with_patches(&patches, RecalcPolicy::default()).unwrap_err();
    assert!(matches!(err, XlsxError::MissingSheet(_)));
}

#[test]
fn opens_template_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plantilla.xlsx");
    std::fs::write(&path, template()).unwrap();

    let pkg = TemplatePackage::open(&path).unwrap();
    assert_eq!(pkg.sheet_names().count(), 2);
    assert!(TemplatePackage::open(dir.path().join("missing.xlsx")).is_err());
}
