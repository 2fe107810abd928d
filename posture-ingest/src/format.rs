use posture_extract::MediaKind;

use crate::error::IngestError;

/// How many leading bytes to sniff for an XML root-element marker.
const SNIFF_LIMIT: usize = 8 * 1024;

/// The recognized upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// Nmap XML (`<nmaprun>` marker).
    NmapXml,
    /// Nessus export wrapped in XML (`<NessusClientData>` marker).
    NessusXml,
    /// Native `.nessus` export.
    NessusNative,
    /// Generic vulnerability-scanner XML (OpenVAS-style fallback).
    OpenVasXml,
    /// No structured grammar; goes through the AI extraction adapter.
    AiExtractable(MediaKind),
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp"];
const DOCUMENT_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "xls", "xlsx", "csv", "ppt", "pptx", "txt", "rtf", "md",
];

/// Classify a submitted file by extension and content signature.
pub fn detect_format(file_name: &str, content: &[u8]) -> Result<FileFormat, IngestError> {
    let extension = file_extension(file_name);

    match extension.as_str() {
        "xml" => Ok(sniff_xml(content)),
        "nessus" => Ok(FileFormat::NessusNative),
        ext if IMAGE_EXTENSIONS.contains(&ext) => Ok(FileFormat::AiExtractable(MediaKind::Image)),
        ext if DOCUMENT_EXTENSIONS.contains(&ext) => Ok(FileFormat::AiExtractable(MediaKind::Text)),
        _ => Err(IngestError::UnsupportedFormat(file_name.to_string())),
    }
}

/// Lowercased extension without the dot; empty when there is none.
pub fn file_extension(file_name: &str) -> String {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default()
}

fn sniff_xml(content: &[u8]) -> FileFormat {
    let head = &content[..content.len().min(SNIFF_LIMIT)];
    let head = String::from_utf8_lossy(head);
    if head.contains("<nmaprun") {
        FileFormat::NmapXml
    } else if head.contains("<NessusClientData") {
        FileFormat::NessusXml
    } else {
        FileFormat::OpenVasXml
    }
}
