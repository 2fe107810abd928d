//! Draft records — unvalidated, partially-normalized entities produced by a
//! decoder or the AI extraction step, prior to commit.
//!
//! Field names follow the extraction service's JSON contract; every field
//! the service may omit carries a serde default so a sparse payload still
//! deserializes into a usable draft.

use serde::{Deserialize, Serialize};

/// Asset draft. Structured decoders fill most fields; extraction output may
/// leave almost everything blank.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub asset_type: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub ports: Vec<u16>,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub operating_system: Option<String>,
    #[serde(default)]
    pub criticality: Option<i64>,
    #[serde(default)]
    pub exposure_score: Option<f64>,
}

/// Vulnerability draft, not yet linked to an asset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VulnerabilityDraft {
    #[serde(default)]
    pub cve_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub cvss_score: Option<f64>,
    #[serde(default)]
    pub cvss_vector: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub component: Option<String>,
    #[serde(default)]
    pub solution: Option<String>,
}

/// Pentest finding draft.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FindingDraft {
    #[serde(default)]
    pub finding_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub risk_rating: Option<String>,
    #[serde(default)]
    pub affected_assets: Vec<String>,
    #[serde(default)]
    pub evidence: Option<String>,
    #[serde(default)]
    pub recommendation: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub tester: Option<String>,
}

/// Counts and confidence reported by the extraction service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionSummary {
    #[serde(default, rename = "assetsFound")]
    pub assets_found: u64,
    #[serde(default, rename = "vulnerabilitiesFound")]
    pub vulnerabilities_found: u64,
    #[serde(default, rename = "pentestFindingsFound")]
    pub pentest_findings_found: u64,
    #[serde(default, rename = "criticalVulns")]
    pub critical_vulns: u64,
    #[serde(default, rename = "highVulns")]
    pub high_vulns: u64,
    /// 0-100; how clear and complete the source data was.
    #[serde(default)]
    pub confidence: f64,
}

/// The full extraction response envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionPayload {
    #[serde(default)]
    pub assets: Vec<AssetDraft>,
    #[serde(default)]
    pub vulnerabilities: Vec<VulnerabilityDraft>,
    #[serde(default, rename = "pentestFindings")]
    pub pentest_findings: Vec<FindingDraft>,
    #[serde(default)]
    pub summary: ExtractionSummary,
}
