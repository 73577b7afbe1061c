use std::io::{Read, Seek};

use zip::ZipArchive;

use crate::XlsxError;

/// Default maximum uncompressed size permitted for any single ZIP part inflated into memory.
///
/// Guards against ZIP bombs and forged `uncompressed_size` metadata.
pub(crate) const DEFAULT_MAX_ZIP_PART_BYTES: u64 = 64 * 1024 * 1024; // 64MiB

/// Normalize a ZIP entry name for case- and separator-insensitive comparison.
///
/// - percent-decodes valid `%xx` sequences
/// - strips leading `/` or `\` separators
/// - normalizes `\` to `/`
/// - ASCII-lowercases
fn normalized_part_name(name: &str) -> Vec<u8> {
    fn hex_val(b: u8) -> Option<u8> {
        match b {
            b'0'..=b'9' => Some(b - b'0'),
            b'a'..=b'f' => Some(b - b'a' + 10),
            b'A'..=b'F' => Some(b - b'A' + 10),
            _ => None,
        }
    }

    let mut bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut in_leading_separators = true;
    while let Some(&b) = bytes.first() {
        let decoded = match (b, bytes.get(1).copied().and_then(hex_val), bytes.get(2).copied().and_then(hex_val)) {
            (b'%', Some(hi), Some(lo)) => {
                bytes = &bytes[3..];
                (hi << 4) | lo
            }
            _ => {
                bytes = &bytes[1..];
                b
            }
        };

        if in_leading_separators && matches!(decoded, b'/' | b'\\') {
            continue;
        }
        in_leading_separators = false;
        out.push(if decoded == b'\\' {
            b'/'
        } else {
            decoded.to_ascii_lowercase()
        });
    }
    out
}

pub(crate) fn zip_part_names_equivalent(a: &str, b: &str) -> bool {
    normalized_part_name(a) == normalized_part_name(b)
}

/// Resolve the actual ZIP entry name for a canonical OPC part name.
///
/// Exact matches win over equivalent spellings (`XL\Workbook.xml`, `/xl/workbook.xml`).
pub(crate) fn find_zip_entry_name<R: Read + Seek>(
    archive: &ZipArchive<R>,
    part_name: &str,
) -> Option<String> {
    if archive.index_for_name(part_name).is_some() {
        return Some(part_name.to_string());
    }
    archive
        .file_names()
        .find(|name| zip_part_names_equivalent(name, part_name))
        .map(str::to_string)
}

/// Read a ZIP part into memory, failing if it inflates beyond `max_bytes`.
///
/// Returns `Ok(None)` when the part does not exist.
pub(crate) fn read_zip_part_optional_with_limit<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    part_name: &str,
    max_bytes: u64,
) -> Result<Option<Vec<u8>>, XlsxError> {
    let Some(entry_name) = find_zip_entry_name(archive, part_name) else {
        return Ok(None);
    };
    let file = archive.by_name(&entry_name)?;
    if file.size() > max_bytes {
        return Err(XlsxError::PartTooLarge {
            part: part_name.to_string(),
            size: file.size(),
            max: max_bytes,
        });
    }

    // Do not trust the header; cap the actual inflated stream as well.
    let mut buf = Vec::with_capacity(file.size() as usize);
    file.take(max_bytes + 1).read_to_end(&mut buf)?;
    if buf.len() as u64 > max_bytes {
        return Err(XlsxError::PartTooLarge {
            part: part_name.to_string(),
            size: buf.len() as u64,
            max: max_bytes,
        });
    }
    Ok(Some(buf))
}

pub(crate) fn read_zip_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    part_name: &str,
) -> Result<Vec<u8>, XlsxError> {
    read_zip_part_optional_with_limit(archive, part_name, DEFAULT_MAX_ZIP_PART_BYTES)?
        .ok_or_else(|| XlsxError::MissingPart(part_name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::{Cursor, Write};

    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let cursor = Cursor::new(Vec::new());
        let mut zip = ZipWriter::new(cursor);
        let options =
            FileOptions::<()>::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, bytes) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(bytes).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn equivalent_handles_case_separators_and_percent_encoding() {
        assert!(zip_part_names_equivalent("XL\\Workbook.xml", "xl/workbook.xml"));
        assert!(zip_part_names_equivalent("/xl/workbook.xml", "xl/workbook.xml"));
        assert!(zip_part_names_equivalent(
            "xl/worksheets/sheet 1.xml",
            "xl/worksheets/sheet%201.xml"
        ));
        assert!(!zip_part_names_equivalent("xl/worksheets/sheet1.xml", "xl/worksheets/sheet2.xml"));
    }

    #[test]
    fn read_part_prefers_exact_name() {
        let bytes = build_zip(&[
            ("XL\\Workbook.xml", b"equivalent"),
            ("xl/workbook.xml", b"exact"),
        ]);
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let part = read_zip_part(&mut archive, "xl/workbook.xml").unwrap();
        assert_eq!(part, b"exact");
    }

    #[test]
    fn read_part_falls_back_to_equivalent_name() {
        let bytes = build_zip(&[("/xl/workbook.xml", b"with_slash")]);
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let part = read_zip_part(&mut archive, "xl/workbook.xml").unwrap();
        assert_eq!(part, b"with_slash");
    }

    #[test]
    fn read_part_enforces_limit() {
        let bytes = build_zip(&[("a.txt", b"hello world")]); // 11 bytes
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();

        assert!(read_zip_part_optional_with_limit(&mut archive, "a.txt", 11)
            .unwrap()
            .is_some());
        let err = read_zip_part_optional_with_limit(&mut archive, "a.txt", 10).unwrap_err();
        match err {
            XlsxError::PartTooLarge { part, max, .. } => {
                assert_eq!(part, "a.txt");
                assert_eq!(max, 10);
            }
            other => panic!("expected PartTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn missing_part_is_reported() {
        let bytes = build_zip(&[("a.txt", b"x")]);
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert!(matches!(
            read_zip_part(&mut archive, "xl/workbook.xml"),
            Err(XlsxError::MissingPart(_))
        ));
    }
}
