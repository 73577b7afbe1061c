use sara_xlsx::XlsxError;

use crate::layout::EntityKind;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("{kind}: {count} supera el maximo soportado por la plantilla ({max})")]
    CapacityExceeded {
        kind: EntityKind,
        count: usize,
        max: usize,
    },
    #[error("duplicate instrument name {name:?} (names are compared trimmed and case-insensitively)")]
    DuplicateInstrumentName { name: String },
    #[error("instrument {name:?} is not linked to any RA of the module")]
    UnlinkedInstrument { name: String },
    #[error("UT {unit:?} has evaluation period {period}; the template holds periods 1 to {max}")]
    PeriodOutOfRange { unit: String, period: u32, max: u32 },
    #[error("template has no worksheet named {0:?}")]
    MissingTemplateSheet(String),
    #[error(transparent)]
    Package(#[from] XlsxError),
    #[error("failed to write {path}: {source}")]
    Persist {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
