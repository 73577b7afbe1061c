use std::io::BufRead;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::openxml::local_name;
use crate::XlsxError;

/// Parse `xl/sharedStrings.xml` into the plain display text of each `<si>` item.
///
/// Rich-text runs are flattened; phonetic (`<rPh>`) runs are not part of the displayed string and
/// are skipped.
pub fn parse_shared_strings_xml(xml: &[u8]) -> Result<Vec<String>, XlsxError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);

    let mut buf = Vec::new();
    let mut items = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if local_name(e.name().as_ref()) == b"si" => {
                items.push(read_visible_text(&mut reader)?);
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"si" => items.push(String::new()),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(items)
}

/// Read the text content of a string item container (`<si>` or a cell's `<is>`), consuming events
/// up to and including the container's end tag.
pub(crate) fn read_visible_text<R: BufRead>(reader: &mut Reader<R>) -> Result<String, XlsxError> {
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut depth: usize = 1;
    let mut in_t = false;
    let mut skip_depth: Option<usize> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                depth += 1;
                let name = local_name(e.name().as_ref()).to_vec();
                if skip_depth.is_none() && name == b"rPh" {
                    skip_depth = Some(depth);
                } else if skip_depth.is_none() && name == b"t" {
                    in_t = true;
                }
            }
            Event::End(_) => {
                if skip_depth == Some(depth) {
                    skip_depth = None;
                }
                in_t = false;
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            Event::Text(t) if in_t => out.push_str(&t.unescape()?),
            Event::CData(t) if in_t => out.push_str(&String::from_utf8_lossy(&t)),
            Event::Eof => {
                return Err(XlsxError::Invalid(
                    "unexpected end of document inside string item".to_string(),
                ))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}
