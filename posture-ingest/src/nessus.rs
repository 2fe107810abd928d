//! Nessus decoder, covering both the native `.nessus` export and the same
//! report wrapped in scanner XML. Severity-0 report items are informational
//! noise and are skipped outright; items whose host cannot be resolved
//! against already-ingested assets are dropped and counted.

use posture_types::{Asset, Severity, VulnerabilityDraft};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::IngestError;

/// A vulnerability draft already linked to the asset it was reported on.
#[derive(Debug, Clone)]
pub struct ResolvedVuln {
    pub asset_id: String,
    pub draft: VulnerabilityDraft,
}

/// Output of a vulnerability-scanner decode pass.
#[derive(Debug, Default)]
pub struct DecodedVulns {
    pub resolved: Vec<ResolvedVuln>,
    /// Items whose host matched no ingested asset (documented limitation:
    /// dropped, not upgraded to a synthetic asset).
    pub dropped_unmatched: usize,
    /// Severity-0 / absent-severity items.
    pub skipped_informational: usize,
}

#[derive(Default)]
struct ItemAcc {
    plugin_id: String,
    severity: i64,
    plugin_name: Option<String>,
    svc_name: Option<String>,
    description: Option<String>,
    solution: Option<String>,
    cvss_score: Option<f64>,
    cvss_vector: Option<String>,
    cve: Option<String>,
}

/// Which child element's text we are currently inside.
#[derive(Clone, Copy, PartialEq)]
enum TextField {
    Description,
    Solution,
    CvssScore,
    CvssVector,
    Cve,
}

/// Decode a Nessus report, resolving each item's host against `assets`.
pub fn decode_nessus(content: &str, assets: &[Asset]) -> Result<DecodedVulns, IngestError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut out = DecodedVulns::default();
    let mut current_host: Option<String> = None;
    let mut item: Option<ItemAcc> = None;
    let mut field: Option<TextField> = None;

    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(e) => match e.name().as_ref() {
                b"ReportHost" => current_host = attr(&e, b"name")?,
                b"ReportItem" => match item_from_attrs(&e)? {
                    Some(acc) => item = Some(acc),
                    None => out.skipped_informational += 1,
                },
                b"description" if item.is_some() => field = Some(TextField::Description),
                b"solution" if item.is_some() => field = Some(TextField::Solution),
                b"cvss_base_score" if item.is_some() => field = Some(TextField::CvssScore),
                b"cvss_vector" if item.is_some() => field = Some(TextField::CvssVector),
                b"cve" if item.is_some() => field = Some(TextField::Cve),
                _ => {}
            },
            // Self-closing <ReportItem .../> carries everything in attributes
            Event::Empty(e) => {
                if e.name().as_ref() == b"ReportItem" {
                    match item_from_attrs(&e)? {
                        Some(acc) => finish_item(acc, current_host.as_deref(), assets, &mut out),
                        None => out.skipped_informational += 1,
                    }
                }
            }
            Event::Text(t) => {
                if let (Some(acc), Some(f)) = (item.as_mut(), field) {
                    let text = t.unescape().map_err(malformed)?.into_owned();
                    capture_text(acc, f, text);
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"ReportItem" => {
                    if let Some(acc) = item.take() {
                        finish_item(acc, current_host.as_deref(), assets, &mut out);
                    }
                    field = None;
                }
                b"ReportHost" => current_host = None,
                b"description" | b"solution" | b"cvss_base_score" | b"cvss_vector" | b"cve" => {
                    field = None;
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(out)
}

/// Returns `None` for items that should be skipped (severity 0 or absent).
fn item_from_attrs(e: &BytesStart<'_>) -> Result<Option<ItemAcc>, IngestError> {
    let severity = attr(e, b"severity")?
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(0);
    let plugin_id = attr(e, b"pluginID")?.unwrap_or_default();
    if severity <= 0 || plugin_id.is_empty() {
        return Ok(None);
    }
    Ok(Some(ItemAcc {
        plugin_id,
        severity,
        plugin_name: attr(e, b"pluginName")?,
        svc_name: attr(e, b"svc_name")?,
        ..ItemAcc::default()
    }))
}

fn capture_text(acc: &mut ItemAcc, field: TextField, text: String) {
    match field {
        TextField::Description => acc.description = Some(text),
        TextField::Solution => acc.solution = Some(text),
        TextField::CvssScore => acc.cvss_score = text.parse().ok(),
        TextField::CvssVector => acc.cvss_vector = Some(text),
        // A report item may carry several <cve> entries; keep the first.
        TextField::Cve => {
            if acc.cve.is_none() {
                acc.cve = Some(text);
            }
        }
    }
}

fn finish_item(acc: ItemAcc, host: Option<&str>, assets: &[Asset], out: &mut DecodedVulns) {
    let host = host.unwrap_or("");
    let Some(asset) = assets.iter().find(|a| a.matches_host(host)) else {
        out.dropped_unmatched += 1;
        return;
    };

    let cve_id = match acc.cve {
        Some(cve) if !cve.trim().is_empty() => cve,
        _ => format!("NESSUS-{}", acc.plugin_id),
    };
    out.resolved.push(ResolvedVuln {
        asset_id: asset.id.clone(),
        draft: VulnerabilityDraft {
            cve_id: Some(cve_id),
            title: acc
                .plugin_name
                .unwrap_or_else(|| "Unknown Vulnerability".to_string()),
            description: acc.description.unwrap_or_default(),
            severity: Some(Severity::from_scanner_level(acc.severity).to_string()),
            cvss_score: acc.cvss_score,
            cvss_vector: acc.cvss_vector,
            status: None,
            source: Some("Nessus Scanner".to_string()),
            component: Some(acc.svc_name.unwrap_or_else(|| "Unknown".to_string())),
            solution: acc.solution,
        },
    });
}

pub(crate) fn attr(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, IngestError> {
    for attribute in e.attributes() {
        let attribute = attribute.map_err(malformed)?;
        if attribute.key.as_ref() == key {
            let value = attribute.unescape_value().map_err(malformed)?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn malformed(e: impl std::fmt::Display) -> IngestError {
    IngestError::MalformedInput {
        format: "nessus",
        message: e.to_string(),
    }
}
