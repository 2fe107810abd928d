use crate::severity::Severity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Root aggregate. Every other entity is scoped by `organization_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub created_at: i64,
}

/// Classification of a discovered asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetType {
    Server,
    Database,
    Network,
    Workstation,
    Web,
    Application,
    Cloud,
    Mobile,
    IoT,
}

impl AssetType {
    /// Parse an asset-type label leniently. Extraction output is untrusted,
    /// so unknown labels fall back to `Workstation` rather than failing.
    pub fn parse_loose(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "server" => AssetType::Server,
            "database" => AssetType::Database,
            "network" => AssetType::Network,
            "workstation" => AssetType::Workstation,
            "web" => AssetType::Web,
            "application" => AssetType::Application,
            "cloud" => AssetType::Cloud,
            "mobile" => AssetType::Mobile,
            "iot" => AssetType::IoT,
            _ => AssetType::Workstation,
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetType::Server => write!(f, "Server"),
            AssetType::Database => write!(f, "Database"),
            AssetType::Network => write!(f, "Network"),
            AssetType::Workstation => write!(f, "Workstation"),
            AssetType::Web => write!(f, "Web"),
            AssetType::Application => write!(f, "Application"),
            AssetType::Cloud => write!(f, "Cloud"),
            AssetType::Mobile => write!(f, "Mobile"),
            AssetType::IoT => write!(f, "IoT"),
        }
    }
}

/// A discovered asset (host, service endpoint, device).
///
/// `criticality` and `exposure_score` are always produced by the heuristic
/// classifier or clamped on the way in — never stored verbatim from
/// untrusted extraction output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub ip_address: String,
    pub asset_type: AssetType,
    pub ports: Vec<u16>,
    pub services: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operating_system: Option<String>,
    /// 1-5, higher is more important to the organization.
    pub criticality: u8,
    /// 0-100, higher is more reachable/attackable.
    pub exposure_score: f64,
    pub last_scanned: i64,
    pub created_at: i64,
}

impl Asset {
    /// Case-insensitive match of a scanner host identifier against this
    /// asset's IP or hostname.
    pub fn matches_host(&self, host: &str) -> bool {
        if self.ip_address.eq_ignore_ascii_case(host) {
            return true;
        }
        match &self.hostname {
            Some(h) => h.eq_ignore_ascii_case(host),
            None => false,
        }
    }
}

/// Lifecycle state of a vulnerability. Mutated only by case management,
/// never by the ingestion pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VulnStatus {
    Open,
    InProgress,
    Resolved,
}

impl VulnStatus {
    pub fn parse_loose(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "in progress" | "in_progress" | "inprogress" => VulnStatus::InProgress,
            "resolved" | "closed" | "fixed" => VulnStatus::Resolved,
            _ => VulnStatus::Open,
        }
    }
}

impl fmt::Display for VulnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VulnStatus::Open => write!(f, "Open"),
            VulnStatus::InProgress => write!(f, "In Progress"),
            VulnStatus::Resolved => write!(f, "Resolved"),
        }
    }
}

/// A vulnerability tied to exactly one asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vulnerability {
    pub id: String,
    pub asset_id: String,
    /// External identifier, or a synthesized `<SOURCE>-<pluginId>` placeholder.
    pub cve_id: String,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub cvss_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cvss_vector: Option<String>,
    pub status: VulnStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
    pub discovered_at: i64,
}

/// A penetration-test finding, scoped to the organization rather than a
/// single asset. `affected_assets` holds free-text references, not keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PentestFinding {
    pub id: String,
    pub organization_id: String,
    pub finding_id: String,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_rating: Option<String>,
    pub affected_assets: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
    pub status: VulnStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tester: Option<String>,
    /// Groups findings into logical test runs.
    pub test_date: i64,
}

/// Immutable, append-only risk score snapshot for an organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskScoreSnapshot {
    pub id: String,
    pub organization_id: String,
    pub overall_score: i64,
    pub attack_surface_score: f64,
    pub vulnerability_score: f64,
    pub pentest_score: f64,
    pub calculated_date: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_type_loose_parse() {
        assert_eq!(AssetType::parse_loose("Server"), AssetType::Server);
        assert_eq!(AssetType::parse_loose("IOT"), AssetType::IoT);
        assert_eq!(AssetType::parse_loose("mainframe"), AssetType::Workstation);
    }

    #[test]
    fn matches_host_case_insensitive() {
        let asset = Asset {
            id: "a1".into(),
            organization_id: "o1".into(),
            name: "web01".into(),
            hostname: Some("Web01.Example.Com".into()),
            ip_address: "10.0.0.5".into(),
            asset_type: AssetType::Server,
            ports: vec![80],
            services: vec!["http".into()],
            operating_system: None,
            criticality: 3,
            exposure_score: 50.0,
            last_scanned: 0,
            created_at: 0,
        };
        assert!(asset.matches_host("10.0.0.5"));
        assert!(asset.matches_host("web01.example.com"));
        assert!(!asset.matches_host("10.0.0.6"));
    }

    #[test]
    fn vuln_status_display_roundtrip() {
        assert_eq!(
            VulnStatus::parse_loose(&VulnStatus::InProgress.to_string()),
            VulnStatus::InProgress
        );
        assert_eq!(VulnStatus::parse_loose("whatever"), VulnStatus::Open);
    }

    #[test]
    fn asset_optional_fields_skipped_in_json() {
        let asset = Asset {
            id: "a1".into(),
            organization_id: "o1".into(),
            name: "db01".into(),
            hostname: None,
            ip_address: "10.0.0.9".into(),
            asset_type: AssetType::Database,
            ports: vec![],
            services: vec![],
            operating_system: None,
            criticality: 4,
            exposure_score: 0.0,
            last_scanned: 0,
            created_at: 0,
        };
        let json = serde_json::to_string(&asset).unwrap();
        assert!(!json.contains("hostname"));
        assert!(!json.contains("operating_system"));
    }
}
