use std::collections::BTreeMap;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use sara_model::{CellRef, CellValue};

use crate::openxml::local_name;
use crate::XlsxError;

/// Cell values to write into one worksheet, keyed by cell.
///
/// A [`CellValue::Empty`] entry blanks the cell while keeping its style (`s`) attribute.
pub type SheetPatches = BTreeMap<CellRef, CellValue>;

struct RowState {
    row_0: u32,
    pending: Vec<(u32, CellValue)>,
    next_idx: usize,
    /// Column of a following `<c>` without `r`.
    next_col: u32,
}

#[derive(Clone, Copy)]
struct Bounds {
    min_row: u32,
    min_col: u32,
    max_row: u32,
    max_col: u32,
}

/// Rewrite a worksheet part so that every cell in `patches` holds its new value.
///
/// Only `<sheetData>` (plus `<dimension>` and row `spans`, which must cover the patched cells) is
/// rewritten; every other element and attribute streams through unchanged. Existing cells keep
/// their attributes (style, etc.) but lose their previous content, including any `<f>`; callers
/// that must keep formulas exclude those cells from `patches`. Missing rows and cells are inserted
/// in row-major order as SpreadsheetML requires.
pub fn patch_worksheet_xml(xml: &[u8], patches: &SheetPatches) -> Result<Vec<u8>, XlsxError> {
    if patches.is_empty() {
        return Ok(xml.to_vec());
    }

    let bounds = bounds_for_patches(patches);
    let mut patches_by_row: BTreeMap<u32, Vec<(u32, CellValue)>> = BTreeMap::new();
    for (cell, value) in patches {
        patches_by_row
            .entry(cell.row + 1)
            .or_default()
            .push((cell.col, value.clone()));
    }

    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + patches.len() * 32));

    let mut buf = Vec::new();
    let mut in_sheet_data = false;
    let mut saw_sheet_data = false;
    let mut prefix: Option<String> = None;
    let mut row_state: Option<RowState> = None;
    let mut in_cell = false;
    // Rows without `r` follow the previous row, as in the worksheet reader.
    let mut last_row_1: u32 = 0;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Eof => break,

            Event::Start(ref e) | Event::Empty(ref e)
                if local_name(e.name().as_ref()) == b"dimension" =>
            {
                let updated = updated_dimension_element(e, bounds)?;
                if matches!(event, Event::Start(_)) {
                    writer.write_event(Event::Start(updated))?;
                } else {
                    writer.write_event(Event::Empty(updated))?;
                }
            }

            Event::Start(ref e) if local_name(e.name().as_ref()) == b"sheetData" => {
                saw_sheet_data = true;
                in_sheet_data = true;
                prefix = element_prefix(e.name().as_ref());
                writer.write_event(Event::Start(e.to_owned()))?;
            }
            Event::Empty(ref e) if local_name(e.name().as_ref()) == b"sheetData" => {
                saw_sheet_data = true;
                prefix = element_prefix(e.name().as_ref());
                // Expand `<sheetData/>` into `<sheetData>...</sheetData>`.
                let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                writer.write_event(Event::Start(e.to_owned()))?;
                write_pending_rows(&mut writer, &mut patches_by_row, prefix.as_deref(), None)?;
                writer.write_event(Event::End(BytesEnd::new(tag)))?;
            }
            Event::End(ref e) if local_name(e.name().as_ref()) == b"sheetData" => {
                write_pending_rows(&mut writer, &mut patches_by_row, prefix.as_deref(), None)?;
                in_sheet_data = false;
                writer.write_event(Event::End(e.to_owned()))?;
            }

            Event::Start(ref e) if in_sheet_data && local_name(e.name().as_ref()) == b"row" => {
                let row_1 = parse_row_number(e)?.unwrap_or(last_row_1 + 1);
                last_row_1 = row_1;
                let e = &with_ref(e, &row_1.to_string())?;
                in_cell = false;
                write_pending_rows(&mut writer, &mut patches_by_row, prefix.as_deref(), Some(row_1))?;
                if let Some(pending) = patches_by_row.remove(&row_1) {
                    writer.write_event(Event::Start(updated_row_element(e, &pending)?))?;
                    row_state = Some(RowState {
                        row_0: row_1 - 1,
                        pending,
                        next_idx: 0,
                        next_col: 0,
                    });
                } else {
                    writer.write_event(Event::Start(e.to_owned()))?;
                }
            }
            Event::Empty(ref e) if in_sheet_data && local_name(e.name().as_ref()) == b"row" => {
                let row_1 = parse_row_number(e)?.unwrap_or(last_row_1 + 1);
                last_row_1 = row_1;
                let e = &with_ref(e, &row_1.to_string())?;
                write_pending_rows(&mut writer, &mut patches_by_row, prefix.as_deref(), Some(row_1))?;
                if let Some(pending) = patches_by_row.remove(&row_1) {
                    // Expand `<row/>` into `<row>...</row>`.
                    let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    writer.write_event(Event::Start(updated_row_element(e, &pending)?))?;
                    for (col_0, value) in &pending {
                        write_cell(&mut writer, prefix.as_deref(), CellRef::new(row_1 - 1, *col_0), value, None)?;
                    }
                    writer.write_event(Event::End(BytesEnd::new(tag)))?;
                } else {
                    writer.write_event(Event::Empty(e.to_owned()))?;
                }
            }
            Event::End(ref e) if in_sheet_data && local_name(e.name().as_ref()) == b"row" => {
                if let Some(state) = row_state.take() {
                    write_remaining_cells(&mut writer, prefix.as_deref(), &state)?;
                }
                in_cell = false;
                writer.write_event(Event::End(e.to_owned()))?;
            }

            Event::Start(ref e) | Event::Empty(ref e)
                if row_state.is_some() && local_name(e.name().as_ref()) == b"c" =>
            {
                let is_empty = matches!(event, Event::Empty(_));
                let state = row_state.as_mut().ok_or_else(|| {
                    XlsxError::Invalid("cell outside of <row>".to_string())
                })?;
                let cell = parse_cell_ref(e)?.unwrap_or(CellRef::new(state.row_0, state.next_col));
                state.next_col = cell.col + 1;
                // Inserted cells carry `r`, so a kept cell must too to keep its position.
                let e = &with_ref(e, &cell.to_a1())?;
                write_pending_before(&mut writer, prefix.as_deref(), state, cell.col)?;

                let patch = match state.pending.get(state.next_idx) {
                    Some((col_0, value)) if *col_0 == cell.col => {
                        state.next_idx += 1;
                        Some(value.clone())
                    }
                    _ => None,
                };
                match patch {
                    Some(value) => {
                        if !is_empty {
                            skip_cell_children(&mut reader)?;
                        }
                        write_cell(&mut writer, prefix.as_deref(), cell, &value, Some(e))?;
                    }
                    None if is_empty => writer.write_event(Event::Empty(e.to_owned()))?,
                    None => {
                        in_cell = true;
                        writer.write_event(Event::Start(e.to_owned()))?;
                    }
                }
            }
            Event::End(ref e) if in_cell && local_name(e.name().as_ref()) == b"c" => {
                in_cell = false;
                writer.write_event(Event::End(e.to_owned()))?;
            }
            // Cells must precede any non-cell row children (e.g. `extLst`).
            Event::Start(ref e) | Event::Empty(ref e) if row_state.is_some() && !in_cell => {
                if let Some(state) = row_state.as_mut() {
                    write_remaining_cells(&mut writer, prefix.as_deref(), state)?;
                    state.next_idx = state.pending.len();
                }
                if matches!(event, Event::Start(_)) {
                    writer.write_event(Event::Start(e.to_owned()))?;
                } else {
                    writer.write_event(Event::Empty(e.to_owned()))?;
                }
            }

            ev => writer.write_event(ev)?,
        }
        buf.clear();
    }

    if !saw_sheet_data {
        return Err(XlsxError::Invalid(
            "worksheet xml is missing required <sheetData> section".to_string(),
        ));
    }

    Ok(writer.into_inner())
}

fn write_pending_rows<W: std::io::Write>(
    writer: &mut Writer<W>,
    patches_by_row: &mut BTreeMap<u32, Vec<(u32, CellValue)>>,
    prefix: Option<&str>,
    before_row_1: Option<u32>,
) -> Result<(), XlsxError> {
    while let Some((&row_1, _)) = patches_by_row.first_key_value() {
        if before_row_1.is_some_and(|limit| row_1 >= limit) {
            break;
        }
        let cells = patches_by_row.remove(&row_1).unwrap_or_default();
        let row_tag = prefixed_tag(prefix, "row");
        let mut row = BytesStart::new(row_tag.as_str());
        row.push_attribute(("r", row_1.to_string().as_str()));
        writer.write_event(Event::Start(row))?;
        for (col_0, value) in &cells {
            write_cell(writer, prefix, CellRef::new(row_1 - 1, *col_0), value, None)?;
        }
        writer.write_event(Event::End(BytesEnd::new(row_tag.as_str())))?;
    }
    Ok(())
}

fn write_pending_before<W: std::io::Write>(
    writer: &mut Writer<W>,
    prefix: Option<&str>,
    state: &mut RowState,
    col_0: u32,
) -> Result<(), XlsxError> {
    while let Some((pending_col, value)) = state.pending.get(state.next_idx) {
        if *pending_col >= col_0 {
            break;
        }
        write_cell(writer, prefix, CellRef::new(state.row_0, *pending_col), value, None)?;
        state.next_idx += 1;
    }
    Ok(())
}

fn write_remaining_cells<W: std::io::Write>(
    writer: &mut Writer<W>,
    prefix: Option<&str>,
    state: &RowState,
) -> Result<(), XlsxError> {
    for (col_0, value) in state.pending.iter().skip(state.next_idx) {
        write_cell(writer, prefix, CellRef::new(state.row_0, *col_0), value, None)?;
    }
    Ok(())
}

fn skip_cell_children<R: std::io::BufRead>(reader: &mut Reader<R>) -> Result<(), XlsxError> {
    let mut buf = Vec::new();
    let mut depth: usize = 1;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
            Event::Eof => {
                return Err(XlsxError::Invalid(
                    "unexpected end of worksheet inside <c>".to_string(),
                ))
            }
            _ => {}
        }
        buf.clear();
    }
}

fn write_cell<W: std::io::Write>(
    writer: &mut Writer<W>,
    prefix: Option<&str>,
    cell: CellRef,
    value: &CellValue,
    existing: Option<&BytesStart<'_>>,
) -> Result<(), XlsxError> {
    let c_tag = prefixed_tag(prefix, "c");
    let mut start = BytesStart::new(c_tag.as_str());
    start.push_attribute(("r", cell.to_a1().as_str()));
    if let Some(existing) = existing {
        for attr in existing.attributes() {
            let attr = attr?;
            // `cm`/`vm` point at cell/value metadata that no longer applies to a plain value.
            if matches!(attr.key.as_ref(), b"r" | b"t" | b"cm" | b"vm") {
                continue;
            }
            start.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
        }
    }

    let v_tag = prefixed_tag(prefix, "v");
    match value {
        CellValue::Empty => {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }
        CellValue::Number(n) if n.is_finite() => {
            writer.write_event(Event::Start(start))?;
            write_text_element(writer, &v_tag, &n.to_string(), false)?;
        }
        CellValue::Number(_) => {
            start.push_attribute(("t", "e"));
            writer.write_event(Event::Start(start))?;
            write_text_element(writer, &v_tag, "#NUM!", false)?;
        }
        CellValue::Boolean(b) => {
            start.push_attribute(("t", "b"));
            writer.write_event(Event::Start(start))?;
            write_text_element(writer, &v_tag, if *b { "1" } else { "0" }, false)?;
        }
        CellValue::Error(e) => {
            start.push_attribute(("t", "e"));
            writer.write_event(Event::Start(start))?;
            write_text_element(writer, &v_tag, e, false)?;
        }
        CellValue::String(s) => {
            start.push_attribute(("t", "inlineStr"));
            writer.write_event(Event::Start(start))?;
            let is_tag = prefixed_tag(prefix, "is");
            writer.write_event(Event::Start(BytesStart::new(is_tag.as_str())))?;
            let preserve = s.starts_with(char::is_whitespace) || s.ends_with(char::is_whitespace);
            write_text_element(writer, &prefixed_tag(prefix, "t"), s, preserve)?;
            writer.write_event(Event::End(BytesEnd::new(is_tag.as_str())))?;
        }
    }
    writer.write_event(Event::End(BytesEnd::new(c_tag.as_str())))?;
    Ok(())
}

fn write_text_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    tag: &str,
    text: &str,
    preserve_space: bool,
) -> Result<(), XlsxError> {
    let mut start = BytesStart::new(tag);
    if preserve_space {
        start.push_attribute(("xml:space", "preserve"));
    }
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

/// 1-based row number from `r`, `None` when the row omits it.
fn parse_row_number(e: &BytesStart<'_>) -> Result<Option<u32>, XlsxError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == b"r" {
            let v = attr.unescape_value()?;
            return v
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|r| *r > 0)
                .map(Some)
                .ok_or_else(|| XlsxError::InvalidCellRef(format!("row {v}")));
        }
    }
    Ok(None)
}

fn parse_cell_ref(e: &BytesStart<'_>) -> Result<Option<CellRef>, XlsxError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == b"r" {
            let v = attr.unescape_value()?;
            return CellRef::from_a1(&v)
                .map(Some)
                .map_err(|_| XlsxError::InvalidCellRef(v.into_owned()));
        }
    }
    Ok(None)
}

/// `e` with an `r` attribute, adding `r` when the element omits it.
fn with_ref(e: &BytesStart<'_>, r: &str) -> Result<BytesStart<'static>, XlsxError> {
    let mut owned = e.to_owned();
    for attr in e.attributes() {
        if attr?.key.as_ref() == b"r" {
            return Ok(owned);
        }
    }
    owned.push_attribute(("r", r));
    Ok(owned)
}

fn updated_row_element(
    e: &BytesStart<'_>,
    pending: &[(u32, CellValue)],
) -> Result<BytesStart<'static>, XlsxError> {
    let min_col_1 = pending.iter().map(|(c, _)| c + 1).min().unwrap_or(1);
    let max_col_1 = pending.iter().map(|(c, _)| c + 1).max().unwrap_or(1);

    let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut row = BytesStart::new(tag);
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == b"spans" {
            let spans = attr.unescape_value()?;
            let widened = match spans.split_once(':') {
                Some((a, b)) => match (a.trim().parse::<u32>(), b.trim().parse::<u32>()) {
                    (Ok(a), Ok(b)) => format!("{}:{}", a.min(min_col_1), b.max(max_col_1)),
                    _ => spans.into_owned(),
                },
                None => spans.into_owned(),
            };
            row.push_attribute(("spans", widened.as_str()));
        } else {
            row.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
        }
    }
    Ok(row)
}

fn bounds_for_patches(patches: &SheetPatches) -> Bounds {
    let mut bounds = Bounds {
        min_row: u32::MAX,
        min_col: u32::MAX,
        max_row: 0,
        max_col: 0,
    };
    for cell in patches.keys() {
        bounds.min_row = bounds.min_row.min(cell.row);
        bounds.min_col = bounds.min_col.min(cell.col);
        bounds.max_row = bounds.max_row.max(cell.row);
        bounds.max_col = bounds.max_col.max(cell.col);
    }
    bounds
}

fn updated_dimension_element(
    e: &BytesStart<'_>,
    bounds: Bounds,
) -> Result<BytesStart<'static>, XlsxError> {
    let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut dimension = BytesStart::new(tag);
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() != b"ref" {
            dimension.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
            continue;
        }
        let existing = attr.unescape_value()?;
        let mut merged = bounds;
        if let Ok(range) = sara_model::Range::from_a1(&existing) {
            merged.min_row = merged.min_row.min(range.start.row);
            merged.min_col = merged.min_col.min(range.start.col);
            merged.max_row = merged.max_row.max(range.end.row);
            merged.max_col = merged.max_col.max(range.end.col);
        }
        let range = sara_model::Range::new(
            CellRef::new(merged.min_row, merged.min_col),
            CellRef::new(merged.max_row, merged.max_col),
        );
        dimension.push_attribute(("ref", range.to_string().as_str()));
    }
    Ok(dimension)
}

fn element_prefix(name: &[u8]) -> Option<String> {
    let idx = name.iter().position(|b| *b == b':')?;
    std::str::from_utf8(&name[..idx]).ok().map(str::to_string)
}

fn prefixed_tag(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}:{local}"),
        None => local.to_string(),
    }
}
