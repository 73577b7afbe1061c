use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::openxml::local_name;
use crate::XlsxError;

pub(crate) const CALC_CHAIN_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain";

/// How the writer makes Excel recompute template formulas after input cells change.
///
/// The cached `<v>` values of formula cells reflect the template's original inputs. Dropping the
/// calc chain and requesting a full calculation on load makes Excel (and LibreOffice) recompute
/// every formula when the file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecalcPolicy {
    /// Set `<calcPr fullCalcOnLoad="1"/>` in `xl/workbook.xml`.
    pub force_full_calc_on_load: bool,
    /// Remove `xl/calcChain.xml` together with its relationship and content-type override.
    pub drop_calc_chain: bool,
}

impl RecalcPolicy {
    /// Leave calculation metadata untouched.
    pub const PRESERVE: Self = Self {
        force_full_calc_on_load: false,
        drop_calc_chain: false,
    };

    pub fn is_noop(&self) -> bool {
        !self.force_full_calc_on_load && !self.drop_calc_chain
    }
}

impl Default for RecalcPolicy {
    fn default() -> Self {
        Self {
            force_full_calc_on_load: true,
            drop_calc_chain: true,
        }
    }
}

pub(crate) fn workbook_xml_force_full_calc_on_load(workbook_xml: &[u8]) -> Result<Vec<u8>, XlsxError> {
    let mut reader = Reader::from_reader(workbook_xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(workbook_xml.len() + 64));

    let mut buf = Vec::new();
    let mut saw_calc_pr = false;
    let mut depth: usize = 0;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Start(ref e) if local_name(e.name().as_ref()) == b"calcPr" => {
                saw_calc_pr = true;
                depth += 1;
                writer.write_event(Event::Start(patched_calc_pr(e)?))?;
            }
            Event::Empty(ref e) if local_name(e.name().as_ref()) == b"calcPr" => {
                saw_calc_pr = true;
                writer.write_event(Event::Empty(patched_calc_pr(e)?))?;
            }
            Event::Start(ref e) => {
                depth += 1;
                writer.write_event(Event::Start(e.to_owned()))?;
            }
            Event::End(ref e) => {
                depth = depth.saturating_sub(1);
                // `calcPr` follows `definedNames` and precedes the optional trailing elements; the
                // end of `<workbook>` is always a valid place when the template has none.
                if depth == 0 && local_name(e.name().as_ref()) == b"workbook" && !saw_calc_pr {
                    let mut calc_pr = BytesStart::new(prefixed_like(e.name().as_ref(), "calcPr"));
                    calc_pr.push_attribute(("fullCalcOnLoad", "1"));
                    writer.write_event(Event::Empty(calc_pr))?;
                }
                writer.write_event(Event::End(e.to_owned()))?;
            }
            Event::Eof => break,
            other => writer.write_event(other)?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

fn patched_calc_pr(e: &BytesStart<'_>) -> Result<BytesStart<'static>, XlsxError> {
    let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut calc_pr = BytesStart::new(tag);
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == b"fullCalcOnLoad" {
            continue;
        }
        calc_pr.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
    }
    calc_pr.push_attribute(("fullCalcOnLoad", "1"));
    Ok(calc_pr)
}

fn prefixed_like(name: &[u8], local: &str) -> String {
    match name.iter().position(|b| *b == b':') {
        Some(idx) => format!("{}:{local}", String::from_utf8_lossy(&name[..idx])),
        None => local.to_string(),
    }
}

pub(crate) fn workbook_rels_remove_calc_chain(rels_xml: &[u8]) -> Result<Vec<u8>, XlsxError> {
    remove_elements(rels_xml, b"Relationship", relationship_is_calc_chain)
}

pub(crate) fn content_types_remove_calc_chain(ct_xml: &[u8]) -> Result<Vec<u8>, XlsxError> {
    remove_elements(ct_xml, b"Override", override_part_name_is_calc_chain)
}

fn remove_elements(
    xml: &[u8],
    element: &[u8],
    should_remove: fn(&BytesStart<'_>) -> Result<bool, XlsxError>,
) -> Result<Vec<u8>, XlsxError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));

    let mut buf = Vec::new();
    let mut skipping = false;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Eof => break,
            Event::Start(ref e) if local_name(e.name().as_ref()) == element => {
                if should_remove(e)? {
                    skipping = true;
                } else {
                    writer.write_event(Event::Start(e.to_owned()))?;
                }
            }
            Event::Empty(ref e) if local_name(e.name().as_ref()) == element => {
                if !should_remove(e)? {
                    writer.write_event(Event::Empty(e.to_owned()))?;
                }
            }
            Event::End(ref e) if skipping && local_name(e.name().as_ref()) == element => {
                skipping = false;
            }
            _ if skipping => {}
            ev => writer.write_event(ev)?,
        }
        buf.clear();
    }

    Ok(writer.into_inner())
}

fn relationship_is_calc_chain(e: &BytesStart<'_>) -> Result<bool, XlsxError> {
    let mut rel_type: Option<String> = None;
    let mut target: Option<String> = None;
    for attr in e.attributes() {
        let attr = attr?;
        let value = attr.unescape_value()?.into_owned();
        match attr.key.as_ref() {
            b"Type" => rel_type = Some(value),
            b"Target" => target = Some(value),
            _ => {}
        }
    }

    if rel_type.as_deref() == Some(CALC_CHAIN_REL_TYPE) {
        return Ok(true);
    }
    Ok(target.as_deref().is_some_and(|t| t.ends_with("calcChain.xml")))
}

fn override_part_name_is_calc_chain(e: &BytesStart<'_>) -> Result<bool, XlsxError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == b"PartName" {
            let value = attr.unescape_value()?;
            return Ok(value.as_ref().ends_with("calcChain.xml"));
        }
    }
    Ok(false)
}
