use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use std::path::Path;

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::openxml::{parse_relationships, resolve_target, REL_TYPE_SHARED_STRINGS, REL_TYPE_WORKSHEET};
use crate::patch::{patch_worksheet_xml, SheetPatches};
use crate::recalc_policy::{
    content_types_remove_calc_chain, workbook_rels_remove_calc_chain,
    workbook_xml_force_full_calc_on_load, RecalcPolicy,
};
use crate::shared_strings::parse_shared_strings_xml;
use crate::sheet_metadata::parse_workbook_sheets;
use crate::worksheet::{parse_worksheet_xml, Worksheet};
use crate::zip_util::{find_zip_entry_name, read_zip_part, read_zip_part_optional_with_limit, zip_part_names_equivalent, DEFAULT_MAX_ZIP_PART_BYTES};

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const CALC_CHAIN_PART: &str = "xl/calcChain.xml";

#[derive(Debug, thiserror::Error)]
pub enum XlsxError {
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("xml attribute error: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
    #[error("missing required attribute: {0}")]
    MissingAttr(&'static str),
    #[error("missing xlsx part: {0}")]
    MissingPart(String),
    #[error("workbook has no worksheet named {0:?}")]
    MissingSheet(String),
    #[error("invalid xlsx: {0}")]
    Invalid(String),
    #[error("invalid cell reference: {0}")]
    InvalidCellRef(String),
    #[error(
        "xlsx package part is too large to load safely: {part} is {size} bytes (max {max} bytes)"
    )]
    PartTooLarge { part: String, size: u64, max: u64 },
    #[error("invalid sheetId value")]
    InvalidSheetId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct SheetEntry {
    name: String,
    part: String,
}

/// A template workbook held as its original ZIP bytes.
///
/// Reading never mutates the package; [`TemplatePackage::write_with_patches`] produces a new
/// package in which only patched worksheets (and the calculation metadata selected by the
/// [`RecalcPolicy`]) differ. Every other part is raw-copied without recompression.
#[derive(Clone, Debug)]
pub struct TemplatePackage {
    bytes: Vec<u8>,
    sheets: Vec<SheetEntry>,
    shared_strings: Vec<String>,
}

impl TemplatePackage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, XlsxError> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_bytes(bytes)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, XlsxError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes.as_slice()))?;

        let workbook_xml = read_zip_part(&mut archive, WORKBOOK_PART)?;
        let sheet_infos = parse_workbook_sheets(&workbook_xml)?;
        let rels = match read_zip_part_optional_with_limit(
            &mut archive,
            WORKBOOK_RELS_PART,
            DEFAULT_MAX_ZIP_PART_BYTES,
        )? {
            Some(xml) => parse_relationships(&xml)?,
            None => Vec::new(),
        };

        let mut sheets = Vec::with_capacity(sheet_infos.len());
        for info in sheet_infos {
            let Some(rel) = rels
                .iter()
                .find(|rel| rel.id == info.rel_id && rel.type_uri == REL_TYPE_WORKSHEET && !rel.is_external())
            else {
                // Chartsheets and dialog sheets have no `<sheetData>`.
                log::debug!("skipping non-worksheet sheet {:?}", info.name);
                continue;
            };
            sheets.push(SheetEntry {
                name: info.name,
                part: resolve_target(WORKBOOK_PART, &rel.target),
            });
        }

        let shared_strings = match rels
            .iter()
            .find(|rel| rel.type_uri == REL_TYPE_SHARED_STRINGS && !rel.is_external())
        {
            Some(rel) => {
                let part = resolve_target(WORKBOOK_PART, &rel.target);
                match read_zip_part_optional_with_limit(&mut archive, &part, DEFAULT_MAX_ZIP_PART_BYTES)? {
                    Some(xml) => parse_shared_strings_xml(&xml)?,
                    None => Vec::new(),
                }
            }
            None => Vec::new(),
        };

        Ok(Self {
            bytes,
            sheets,
            shared_strings,
        })
    }

    /// Original package bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Worksheet names in workbook order.
    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.iter().map(|sheet| sheet.name.as_str())
    }

    /// ZIP part name backing worksheet `name`.
    pub fn worksheet_part(&self, name: &str) -> Option<&str> {
        self.sheets
            .iter()
            .find(|sheet| sheet.name == name)
            .map(|sheet| sheet.part.as_str())
    }

    pub fn read_worksheet(&self, name: &str) -> Result<Worksheet, XlsxError> {
        let part = self
            .worksheet_part(name)
            .ok_or_else(|| XlsxError::MissingSheet(name.to_string()))?;
        let mut archive = ZipArchive::new(Cursor::new(self.bytes.as_slice()))?;
        let xml = read_zip_part(&mut archive, part)?;
        parse_worksheet_xml(name, part, &xml, &self.shared_strings)
    }

    /// Write a new package with `patches` (keyed by worksheet name) applied.
    pub fn write_with_patches(
        &self,
        patches: &BTreeMap<String, SheetPatches>,
        policy: RecalcPolicy,
    ) -> Result<Vec<u8>, XlsxError> {
        let mut archive = ZipArchive::new(Cursor::new(self.bytes.as_slice()))?;

        // Entry name -> replacement bytes.
        let mut rewritten: BTreeMap<String, Vec<u8>> = BTreeMap::new();
        for (sheet, sheet_patches) in patches {
            let part = self
                .worksheet_part(sheet)
                .ok_or_else(|| XlsxError::MissingSheet(sheet.clone()))?;
            if sheet_patches.is_empty() {
                continue;
            }
            let entry = find_zip_entry_name(&archive, part)
                .ok_or_else(|| XlsxError::MissingPart(part.to_string()))?;
            let xml = read_zip_part(&mut archive, &entry)?;
            rewritten.insert(entry, patch_worksheet_xml(&xml, sheet_patches)?);
            log::debug!("patched {} cells in {sheet:?} ({part})", sheet_patches.len());
        }

        if rewritten.is_empty() && policy.is_noop() {
            return Ok(self.bytes.clone());
        }

        if policy.force_full_calc_on_load {
            if let Some(entry) = find_zip_entry_name(&archive, WORKBOOK_PART) {
                let xml = read_zip_part(&mut archive, &entry)?;
                rewritten.insert(entry, workbook_xml_force_full_calc_on_load(&xml)?);
            }
        }
        if policy.drop_calc_chain {
            if let Some(entry) = find_zip_entry_name(&archive, WORKBOOK_RELS_PART) {
                let xml = read_zip_part(&mut archive, &entry)?;
                rewritten.insert(entry, workbook_rels_remove_calc_chain(&xml)?);
            }
            if let Some(entry) = find_zip_entry_name(&archive, CONTENT_TYPES_PART) {
                let xml = read_zip_part(&mut archive, &entry)?;
                rewritten.insert(entry, content_types_remove_calc_chain(&xml)?);
            }
        }

        let mut zip = ZipWriter::new(Cursor::new(Vec::with_capacity(self.bytes.len())));
        let options = FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);

        for i in 0..archive.len() {
            let file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();

            if policy.drop_calc_chain && zip_part_names_equivalent(&name, CALC_CHAIN_PART) {
                continue;
            }

            if let Some(bytes) = rewritten.get(&name) {
                zip.start_file(name.clone(), options)?;
                zip.write_all(bytes)?;
            } else {
                zip.raw_copy_file(file)?;
            }
        }

        Ok(zip.finish()?.into_inner())
    }
}
