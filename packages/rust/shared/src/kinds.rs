//! File-kind registry and content classification.
//!
//! One static table keyed by [`FileKind`] holds the content-type substrings,
//! file extensions, and magic-byte prefixes for every document family the
//! converter understands. Classification applies three fallback strategies
//! in priority order: claimed content-type, the `text/plain` fallback, then
//! magic bytes.

use tracing::debug;

/// Document families the converter understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Html,
    Text,
    Pdf,
    Word,
    Excel,
    Powerpoint,
}

/// Registry entry for one document family.
#[derive(Debug)]
pub struct KindSpec {
    pub kind: FileKind,
    /// Substrings matched case-insensitively against claimed content-types.
    pub content_types: &'static [&'static str],
    /// Known file extensions, preferred first.
    pub extensions: &'static [&'static str],
    /// Leading byte signatures.
    pub magic_numbers: &'static [&'static [u8]],
}

/// OLE2 compound-document header (legacy doc/xls/ppt).
const OLE2_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0];
/// ZIP local-file header (OOXML docx/xlsx/pptx).
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Number of leading bytes inspected for magic-number checks.
const MAGIC_WINDOW: usize = 32;

/// The registry. Entries are ordered to match the [`FileKind`] discriminants
/// so [`FileKind::spec`] can index directly.
pub static REGISTRY: &[KindSpec] = &[
    KindSpec {
        kind: FileKind::Html,
        content_types: &["text/html", "application/xhtml+xml"],
        extensions: &[".html", ".htm", ".xhtml"],
        magic_numbers: &[b"<!DOCTYPE html>", b"<html", b"<?xml"],
    },
    KindSpec {
        kind: FileKind::Text,
        content_types: &["text/plain", "text/txt"],
        extensions: &[".txt"],
        magic_numbers: &[],
    },
    KindSpec {
        kind: FileKind::Pdf,
        content_types: &[
            "application/pdf",
            "application/x-pdf",
            "application/acrobat",
            "application/vnd.pdf",
        ],
        extensions: &[".pdf"],
        magic_numbers: &[b"%PDF"],
    },
    KindSpec {
        kind: FileKind::Word,
        content_types: &[
            "application/msword",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "application/vnd.ms-word",
            "application/vnd.ms-word.document.macroenabled.12",
        ],
        extensions: &[".doc", ".docx"],
        magic_numbers: &[OLE2_MAGIC, ZIP_MAGIC],
    },
    KindSpec {
        kind: FileKind::Excel,
        content_types: &[
            "application/vnd.ms-excel",
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            "application/vnd.ms-excel.sheet.macroenabled.12",
        ],
        extensions: &[".xls", ".xlsx"],
        magic_numbers: &[OLE2_MAGIC, ZIP_MAGIC],
    },
    KindSpec {
        kind: FileKind::Powerpoint,
        content_types: &[
            "application/vnd.ms-powerpoint",
            "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            "application/vnd.ms-powerpoint.presentation.macroenabled.12",
        ],
        extensions: &[".ppt", ".pptx"],
        magic_numbers: &[OLE2_MAGIC, ZIP_MAGIC],
    },
];

impl FileKind {
    /// All kinds, in registry order.
    pub fn all() -> impl Iterator<Item = FileKind> {
        REGISTRY.iter().map(|spec| spec.kind)
    }

    /// The registry entry for this kind.
    pub fn spec(self) -> &'static KindSpec {
        &REGISTRY[self as usize]
    }
}

/// Decide which document family `content` belongs to.
///
/// Resolution order: claimed content-type against the registry, the
/// `text/plain` fallback, then magic bytes over the first 32 bytes.
/// Returns `None` when nothing matches.
pub fn classify(content: &[u8], claimed_content_type: Option<&str>) -> Option<FileKind> {
    if let Some(claimed) = claimed_content_type {
        let claimed = claimed.to_ascii_lowercase();

        for spec in REGISTRY {
            if spec.content_types.iter().any(|ct| claimed.contains(ct)) {
                debug!(kind = ?spec.kind, content_type = %claimed, "classified by content-type");
                return Some(spec.kind);
            }
        }

        // Fallback for servers that decorate text/plain beyond the registry
        // entries (charset suffixes and the like).
        if claimed.contains("text/plain") {
            debug!(content_type = %claimed, "classified as text by text/plain fallback");
            return Some(FileKind::Text);
        }
    }

    let head = &content[..content.len().min(MAGIC_WINDOW)];
    for spec in REGISTRY {
        if spec.magic_numbers.iter().any(|magic| head.starts_with(magic)) {
            debug!(kind = ?spec.kind, "classified by magic bytes");
            return Some(spec.kind);
        }
    }

    debug!("content matched no known kind");
    None
}

/// Resolve the concrete artifact extension for content whose container
/// header is shared across Office families.
///
/// OLE2 and ZIP headers are ambiguous between Word/Excel/PowerPoint; the
/// claimed content-type substring picks the sibling. Returns `None` when
/// the header or content-type gives no answer; callers fall back to the
/// kind's preferred extension.
pub fn resolve_extension(content: &[u8], claimed_content_type: Option<&str>) -> Option<&'static str> {
    let claimed = claimed_content_type?.to_ascii_lowercase();

    if content.starts_with(ZIP_MAGIC) {
        if claimed.contains("wordprocessingml") {
            return Some(".docx");
        }
        if claimed.contains("spreadsheetml") {
            return Some(".xlsx");
        }
        if claimed.contains("presentationml") {
            return Some(".pptx");
        }
    } else if content.starts_with(OLE2_MAGIC) {
        if claimed.contains("msword") {
            return Some(".doc");
        }
        if claimed.contains("ms-excel") {
            return Some(".xls");
        }
        if claimed.contains("ms-powerpoint") {
            return Some(".ppt");
        }
    }

    None
}

/// Whether a claimed content-type belongs to any known kind.
///
/// Used by the fetcher to decide if a remote resource is worth downloading;
/// an unknown content-type is an expected skip, not an error.
pub fn is_known_content_type(content_type: &str) -> bool {
    let ct = content_type.to_ascii_lowercase();
    REGISTRY
        .iter()
        .any(|spec| spec.content_types.iter().any(|known| ct.contains(known)))
}
