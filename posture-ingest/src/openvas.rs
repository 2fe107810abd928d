//! Generic vulnerability-scanner XML fallback, shaped after OpenVAS report
//! results. Severity here is the report's CVSS float rather than a 0-4
//! integer; non-positive severities are informational and skipped.

use posture_types::{Asset, Severity, VulnerabilityDraft};
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::IngestError;
use crate::nessus::{attr, DecodedVulns, ResolvedVuln};

#[derive(Default)]
struct ResultAcc {
    title: Option<String>,
    host: Option<String>,
    severity: Option<f64>,
    description: Option<String>,
    solution: Option<String>,
    nvt_oid: Option<String>,
    cve: Option<String>,
}

#[derive(Clone, Copy, PartialEq)]
enum TextField {
    Name,
    Host,
    Severity,
    Description,
    Solution,
    Cve,
}

/// Decode OpenVAS-style results, resolving each against `assets`.
pub fn decode_openvas(content: &str, assets: &[Asset]) -> Result<DecodedVulns, IngestError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut out = DecodedVulns::default();
    let mut result: Option<ResultAcc> = None;
    let mut field: Option<TextField> = None;
    // <nvt> nests its own <name>; don't let it clobber the result title.
    let mut in_nvt = false;

    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(e) => match e.name().as_ref() {
                b"result" => result = Some(ResultAcc::default()),
                b"nvt" => {
                    if let Some(acc) = result.as_mut() {
                        in_nvt = true;
                        acc.nvt_oid = attr(&e, b"oid")?;
                    }
                }
                b"name" if result.is_some() && !in_nvt => field = Some(TextField::Name),
                b"host" if result.is_some() => field = Some(TextField::Host),
                b"severity" if result.is_some() => field = Some(TextField::Severity),
                b"description" if result.is_some() => field = Some(TextField::Description),
                b"solution" if result.is_some() => field = Some(TextField::Solution),
                b"cve" if result.is_some() => field = Some(TextField::Cve),
                _ => {}
            },
            Event::Empty(e) => {
                if e.name().as_ref() == b"nvt" {
                    if let Some(acc) = result.as_mut() {
                        acc.nvt_oid = attr(&e, b"oid")?;
                    }
                }
            }
            Event::Text(t) => {
                if let (Some(acc), Some(f)) = (result.as_mut(), field) {
                    let text = t.unescape().map_err(malformed)?.into_owned();
                    capture_text(acc, f, text);
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"result" => {
                    if let Some(acc) = result.take() {
                        finish_result(acc, assets, &mut out);
                    }
                    field = None;
                    in_nvt = false;
                }
                b"nvt" => in_nvt = false,
                b"name" | b"host" | b"severity" | b"description" | b"solution" | b"cve" => {
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

fn capture_text(acc: &mut ResultAcc, field: TextField, text: String) {
    match field {
        TextField::Name => acc.title = Some(text),
        TextField::Host => acc.host = Some(text),
        TextField::Severity => acc.severity = text.parse().ok(),
        TextField::Description => acc.description = Some(text),
        TextField::Solution => acc.solution = Some(text),
        TextField::Cve => {
            if acc.cve.is_none() {
                acc.cve = Some(text);
            }
        }
    }
}

fn finish_result(acc: ResultAcc, assets: &[Asset], out: &mut DecodedVulns) {
    let severity = acc.severity.unwrap_or(0.0);
    if severity <= 0.0 {
        out.skipped_informational += 1;
        return;
    }

    let host = acc.host.as_deref().unwrap_or("");
    let Some(asset) = assets.iter().find(|a| a.matches_host(host)) else {
        out.dropped_unmatched += 1;
        return;
    };

    let cve_id = match acc.cve {
        Some(cve) if !cve.trim().is_empty() && cve.trim() != "NOCVE" => cve,
        _ => format!(
            "OPENVAS-{}",
            acc.nvt_oid.unwrap_or_else(|| "unknown".to_string())
        ),
    };
    out.resolved.push(ResolvedVuln {
        asset_id: asset.id.clone(),
        draft: VulnerabilityDraft {
            cve_id: Some(cve_id),
            title: acc
                .title
                .unwrap_or_else(|| "Unknown Vulnerability".to_string()),
            description: acc.description.unwrap_or_default(),
            severity: Some(Severity::from_cvss(severity).to_string()),
            cvss_score: Some(severity.clamp(0.0, 10.0)),
            cvss_vector: None,
            status: None,
            source: Some("OpenVAS Scanner".to_string()),
            component: None,
            solution: acc.solution,
        },
    });
}

fn malformed(e: impl std::fmt::Display) -> IngestError {
    IngestError::MalformedInput {
        format: "openvas-xml",
        message: e.to_string(),
    }
}
