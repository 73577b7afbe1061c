use std::collections::BTreeMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use sara_model::{CellRef, CellValue, Range};

use crate::openxml::local_name;
use crate::shared_strings::read_visible_text;
use crate::XlsxError;

/// A cell as stored in the template's worksheet XML.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CellEntry {
    /// Cached value (`<v>` / inline string), decoded according to the cell `t` attribute.
    pub value: CellValue,
    /// Formula text from `<f>`, without a leading `=`.
    ///
    /// Shared-formula children (`<f t="shared" si="0"/>`) carry an empty string: they are still
    /// formula cells even though the text lives on the anchor cell.
    pub formula: Option<String>,
}

impl CellEntry {
    pub fn has_formula(&self) -> bool {
        self.formula.is_some()
    }
}

/// Read-only view of one worksheet part: its populated cells and merged regions.
#[derive(Clone, Debug, Default)]
pub struct Worksheet {
    name: String,
    part: String,
    cells: BTreeMap<CellRef, CellEntry>,
    merges: Vec<Range>,
}

impl Worksheet {
    /// Worksheet (tab) name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// ZIP part name (e.g. `xl/worksheets/sheet1.xml`).
    pub fn part(&self) -> &str {
        &self.part
    }

    pub fn cell(&self, cell: CellRef) -> Option<&CellEntry> {
        self.cells.get(&cell)
    }

    /// Cached value of `cell`, [`CellValue::Empty`] when the template has no such cell.
    pub fn value(&self, cell: CellRef) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.cells.get(&cell).map_or(&EMPTY, |entry| &entry.value)
    }

    pub fn has_formula(&self, cell: CellRef) -> bool {
        self.cells.get(&cell).is_some_and(CellEntry::has_formula)
    }

    /// The merged region covering `cell`, if any.
    pub fn merge_containing(&self, cell: CellRef) -> Option<Range> {
        self.merges.iter().copied().find(|range| range.contains(cell))
    }

    pub fn merges(&self) -> &[Range] {
        &self.merges
    }

    pub fn cells(&self) -> impl Iterator<Item = (CellRef, &CellEntry)> {
        self.cells.iter().map(|(cell, entry)| (*cell, entry))
    }

    pub fn formula_count(&self) -> usize {
        self.cells.values().filter(|entry| entry.has_formula()).count()
    }
}

struct PendingCell {
    cell: CellRef,
    cell_type: Option<String>,
    formula: Option<String>,
    raw_value: Option<String>,
    inline_text: Option<String>,
}

/// Parse worksheet XML into a [`Worksheet`].
///
/// `shared_strings` resolves `t="s"` cells; an out-of-range index decodes as an empty string rather
/// than failing, matching how Excel repairs such files.
pub fn parse_worksheet_xml(
    name: &str,
    part: &str,
    xml: &[u8],
    shared_strings: &[String],
) -> Result<Worksheet, XlsxError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);

    let mut buf = Vec::new();
    let mut cells = BTreeMap::new();
    let mut merges = Vec::new();

    let mut current_row: u32 = 0;
    let mut seen_row = false;
    let mut next_col: u32 = 0;
    let mut pending: Option<PendingCell> = None;
    let mut in_v = false;
    let mut in_f = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(e) | Event::Empty(e) if local_name(e.name().as_ref()) == b"row" => {
                current_row = match attr(&e, b"r")? {
                    Some(r) => r
                        .trim()
                        .parse::<u32>()
                        .ok()
                        .filter(|r| *r > 0)
                        .map(|r| r - 1)
                        .ok_or_else(|| XlsxError::InvalidCellRef(format!("row {r}")))?,
                    None if seen_row => current_row + 1,
                    None => 0,
                };
                seen_row = true;
                next_col = 0;
            }
            Event::Start(e) if local_name(e.name().as_ref()) == b"c" => {
                pending = Some(start_cell(&e, current_row, next_col)?);
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"c" => {
                let cell = start_cell(&e, current_row, next_col)?;
                next_col = cell.cell.col + 1;
                // Style-only placeholders carry no value or formula; keep them so callers can see
                // the template declared the cell.
                cells.insert(cell.cell, CellEntry::default());
            }
            Event::Start(e) if pending.is_some() && local_name(e.name().as_ref()) == b"f" => {
                if let Some(cell) = pending.as_mut() {
                    cell.formula = Some(String::new());
                }
                in_f = true;
            }
            Event::Empty(e) if pending.is_some() && local_name(e.name().as_ref()) == b"f" => {
                if let Some(cell) = pending.as_mut() {
                    cell.formula = Some(String::new());
                }
            }
            Event::Start(e) if pending.is_some() && local_name(e.name().as_ref()) == b"v" => {
                in_v = true;
            }
            Event::Start(e) if pending.is_some() && local_name(e.name().as_ref()) == b"is" => {
                let text = read_visible_text(&mut reader)?;
                if let Some(cell) = pending.as_mut() {
                    cell.inline_text = Some(text);
                }
            }
            Event::Text(t) if in_v || in_f => {
                let text = t.unescape()?;
                if let Some(cell) = pending.as_mut() {
                    let slot = if in_v {
                        cell.raw_value.get_or_insert_with(String::new)
                    } else {
                        cell.formula.get_or_insert_with(String::new)
                    };
                    slot.push_str(&text);
                }
            }
            Event::End(e) => match local_name(e.name().as_ref()) {
                b"v" => in_v = false,
                b"f" => in_f = false,
                b"c" => {
                    if let Some(cell) = pending.take() {
                        next_col = cell.cell.col + 1;
                        let at = cell.cell;
                        cells.insert(at, finish_cell(cell, shared_strings));
                    }
                }
                _ => {}
            },
            Event::Start(e) | Event::Empty(e) if local_name(e.name().as_ref()) == b"mergeCell" => {
                if let Some(reference) = attr(&e, b"ref")? {
                    let range = Range::from_a1(&reference)
                        .map_err(|_| XlsxError::InvalidCellRef(reference.clone()))?;
                    merges.push(range);
                }
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(Worksheet {
        name: name.to_string(),
        part: part.to_string(),
        cells,
        merges,
    })
}

fn start_cell(e: &BytesStart<'_>, row: u32, next_col: u32) -> Result<PendingCell, XlsxError> {
    let cell = match attr(e, b"r")? {
        Some(r) => CellRef::from_a1(&r).map_err(|_| XlsxError::InvalidCellRef(r.clone()))?,
        None => CellRef::new(row, next_col),
    };
    Ok(PendingCell {
        cell,
        cell_type: attr(e, b"t")?,
        formula: None,
        raw_value: None,
        inline_text: None,
    })
}

fn finish_cell(cell: PendingCell, shared_strings: &[String]) -> CellEntry {
    let formula = cell
        .formula
        .map(|f| f.trim().trim_start_matches('=').to_string());
    let raw = cell.raw_value;
    let value = match cell.cell_type.as_deref() {
        Some("s") => raw
            .as_deref()
            .and_then(|idx| idx.trim().parse::<usize>().ok())
            .map(|idx| CellValue::String(shared_strings.get(idx).cloned().unwrap_or_default()))
            .unwrap_or_default(),
        Some("inlineStr") => cell.inline_text.map(CellValue::String).unwrap_or_default(),
        Some("str") | Some("d") => raw.map(CellValue::String).unwrap_or_default(),
        Some("b") => raw
            .map(|v| CellValue::Boolean(v.trim() == "1" || v.trim().eq_ignore_ascii_case("true")))
            .unwrap_or_default(),
        Some("e") => raw.map(CellValue::Error).unwrap_or_default(),
        _ => match raw.as_deref().map(str::trim) {
            None | Some("") => CellValue::Empty,
            Some(v) => v.parse::<f64>().map_or_else(
                |_| CellValue::String(v.to_string()),
                CellValue::Number,
            ),
        },
    };
    CellEntry { value, formula }
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, XlsxError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}
