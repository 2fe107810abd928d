pub mod draft;
pub mod entity;
pub mod severity;

pub use draft::{AssetDraft, ExtractionPayload, ExtractionSummary, FindingDraft, VulnerabilityDraft};
pub use entity::{
    Asset, AssetType, Organization, PentestFinding, RiskScoreSnapshot, VulnStatus, Vulnerability,
};
pub use severity::Severity;
