//! Normalizer/Writer: commits draft records to the canonical store.
//!
//! Structured drafts get their type/criticality/exposure recomputed by the
//! classifier; extraction drafts are clamped, never trusted verbatim.
//! Commits are append-only — repeated ingestion of the same host creates
//! new rows rather than upserting.

use posture_db::{NewAsset, NewFinding, NewVulnerability, SecurityStore};
use posture_types::{
    Asset, AssetDraft, AssetType, FindingDraft, Severity, VulnStatus, VulnerabilityDraft,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::classify::classify;
use crate::error::IngestError;
use crate::nessus::ResolvedVuln;

/// Where a batch of drafts came from; decides how much to trust it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftOrigin {
    /// Produced by a structured decoder from scanner output.
    Structured,
    /// Produced by the AI extraction service.
    Extracted,
}

/// Commit asset drafts, returning the created assets in draft order.
pub fn commit_asset_drafts(
    store: &SecurityStore,
    organization_id: &str,
    drafts: Vec<AssetDraft>,
    origin: DraftOrigin,
    now: i64,
) -> Result<Vec<Asset>, IngestError> {
    let mut created = Vec::with_capacity(drafts.len());
    for draft in drafts {
        let name = if draft.name.trim().is_empty() {
            draft
                .hostname
                .clone()
                .unwrap_or_else(|| "unknown-asset".to_string())
        } else {
            draft.name.clone()
        };

        let mut ports = draft.ports.clone();
        ports.sort_unstable();
        ports.dedup();

        let (asset_type, criticality, exposure_score) = match origin {
            DraftOrigin::Structured => {
                let c = classify(&draft.services, &ports);
                (c.asset_type, c.criticality, c.exposure_score)
            }
            DraftOrigin::Extracted => (
                AssetType::parse_loose(draft.asset_type.as_deref().unwrap_or("")),
                draft.criticality.unwrap_or(3).clamp(1, 5) as u8,
                draft.exposure_score.unwrap_or(50.0).clamp(0.0, 100.0),
            ),
        };

        let ip_address = match draft.ip_address {
            Some(ip) if !ip.trim().is_empty() => ip,
            // Keep the row rather than reject it: attached vulnerabilities
            // need something to reference.
            _ => placeholder_ip(&name),
        };

        let asset = store.create_asset(NewAsset {
            organization_id: organization_id.to_string(),
            name: name.clone(),
            hostname: draft.hostname.or(Some(name)),
            ip_address,
            asset_type,
            ports,
            services: draft.services,
            operating_system: draft
                .operating_system
                .or_else(|| Some("Unknown".to_string())),
            criticality,
            exposure_score,
            last_scanned: now,
        })?;
        created.push(asset);
    }
    debug!(organization_id, count = created.len(), "committed asset drafts");
    Ok(created)
}

/// Commit vulnerability drafts that a structured decoder already resolved
/// to asset ids.
pub fn commit_resolved_vulns(
    store: &SecurityStore,
    resolved: Vec<ResolvedVuln>,
    now: i64,
) -> Result<usize, IngestError> {
    let count = resolved.len();
    for ResolvedVuln { asset_id, draft } in resolved {
        let severity = Severity::parse_loose(draft.severity.as_deref().unwrap_or(""));
        store.create_vulnerability(NewVulnerability {
            asset_id,
            cve_id: draft
                .cve_id
                .unwrap_or_else(|| format!("SCAN-{}", Uuid::new_v4())),
            title: draft.title,
            description: draft.description,
            severity,
            cvss_score: draft.cvss_score.unwrap_or(0.0).clamp(0.0, 10.0),
            cvss_vector: draft.cvss_vector,
            status: VulnStatus::Open,
            source: draft.source,
            component: draft.component,
            solution: draft.solution,
            discovered_at: now,
        })?;
    }
    Ok(count)
}

/// Commit extraction-produced vulnerability drafts, linking each to an
/// asset by substring-matching its `component` against asset names. No
/// match falls back to the organization's first asset (imprecise; a
/// string-distance matcher would do better — see DESIGN.md). Returns
/// (created, dropped).
pub fn commit_extracted_vulns(
    store: &SecurityStore,
    organization_id: &str,
    drafts: Vec<VulnerabilityDraft>,
    now: i64,
) -> Result<(usize, usize), IngestError> {
    let assets = store.assets_for_org(organization_id)?;
    if assets.is_empty() {
        let dropped = drafts.len();
        if dropped > 0 {
            warn!(
                organization_id,
                dropped, "no assets to attach extracted vulnerabilities to"
            );
        }
        return Ok((0, dropped));
    }

    let mut created = 0;
    for draft in drafts {
        let asset = match draft.component.as_deref() {
            Some(component) if !component.trim().is_empty() => {
                let needle = component.to_lowercase();
                assets
                    .iter()
                    .find(|a| a.name.to_lowercase().contains(&needle))
                    .unwrap_or(&assets[0])
            }
            _ => &assets[0],
        };

        let severity = Severity::parse_loose(draft.severity.as_deref().unwrap_or(""));
        let cvss_score = draft
            .cvss_score
            .unwrap_or_else(|| severity.default_cvss())
            .clamp(0.0, 10.0);

        store.create_vulnerability(NewVulnerability {
            asset_id: asset.id.clone(),
            cve_id: match draft.cve_id {
                Some(cve) if !cve.trim().is_empty() => cve,
                _ => format!("AI-{}", Uuid::new_v4()),
            },
            title: if draft.title.trim().is_empty() {
                "Unknown Vulnerability".to_string()
            } else {
                draft.title
            },
            description: draft.description,
            severity,
            cvss_score,
            cvss_vector: draft.cvss_vector,
            status: VulnStatus::parse_loose(draft.status.as_deref().unwrap_or("")),
            source: draft.source.or_else(|| Some("AI Analysis".to_string())),
            component: draft.component.or_else(|| Some("Unknown".to_string())),
            solution: draft
                .solution
                .or_else(|| Some("Review and remediate as needed".to_string())),
            discovered_at: now,
        })?;
        created += 1;
    }
    Ok((created, 0))
}

/// Commit pentest finding drafts for an organization.
pub fn commit_finding_drafts(
    store: &SecurityStore,
    organization_id: &str,
    drafts: Vec<FindingDraft>,
    now: i64,
) -> Result<usize, IngestError> {
    let count = drafts.len();
    for draft in drafts {
        store.create_pentest_finding(NewFinding {
            organization_id: organization_id.to_string(),
            finding_id: match draft.finding_id {
                Some(id) if !id.trim().is_empty() => id,
                _ => format!("AI-PT-{}", Uuid::new_v4()),
            },
            title: draft.title,
            description: draft.description,
            severity: Severity::parse_loose(draft.severity.as_deref().unwrap_or("")),
            risk_rating: draft.risk_rating,
            affected_assets: draft.affected_assets,
            evidence: draft
                .evidence
                .or_else(|| Some("Extracted from uploaded document".to_string())),
            recommendation: draft.recommendation,
            status: VulnStatus::parse_loose(draft.status.as_deref().unwrap_or("")),
            tester: draft.tester.or_else(|| Some("AI Analysis".to_string())),
            test_date: now,
        })?;
    }
    Ok(count)
}

/// Deterministic placeholder address for drafts that arrived without one.
/// Derived from an FNV-1a fold of the asset name so the same name always
/// lands on the same address.
pub fn placeholder_ip(name: &str) -> String {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = FNV_OFFSET;
    for byte in name.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    format!("192.168.{}.{}", (hash >> 8) & 0xff, hash & 0xff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use posture_db::SecurityStore;

    fn store_with_org() -> (SecurityStore, String) {
        let store = SecurityStore::open_in_memory().unwrap();
        let org = store.create_organization("Acme", 0).unwrap();
        (store, org.id)
    }

    #[test]
    fn structured_drafts_are_reclassified() {
        let (store, org) = store_with_org();
        let drafts = vec![AssetDraft {
            name: "web01".into(),
            ip_address: Some("10.0.0.5".into()),
            hostname: Some("web01".into()),
            ports: vec![443, 80, 22, 80],
            services: vec!["http".into(), "https".into(), "ssh".into()],
            // Whatever the draft claims is ignored on the structured path
            criticality: Some(99),
            exposure_score: Some(9000.0),
            ..AssetDraft::default()
        }];

        let created =
            commit_asset_drafts(&store, &org, drafts, DraftOrigin::Structured, 1_700_000_000)
                .unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].criticality, 4);
        assert_eq!(created[0].exposure_score, 50.0);
        assert_eq!(created[0].ports, vec![22, 80, 443]);
    }

    #[test]
    fn extracted_drafts_are_clamped_not_trusted() {
        let (store, org) = store_with_org();
        let drafts = vec![AssetDraft {
            name: "crm-app".into(),
            asset_type: Some("Application".into()),
            criticality: Some(42),
            exposure_score: Some(-10.0),
            ..AssetDraft::default()
        }];

        let created =
            commit_asset_drafts(&store, &org, drafts, DraftOrigin::Extracted, 0).unwrap();
        assert_eq!(created[0].asset_type, AssetType::Application);
        assert_eq!(created[0].criticality, 5);
        assert_eq!(created[0].exposure_score, 0.0);
    }

    #[test]
    fn missing_ip_gets_deterministic_placeholder() {
        let (store, org) = store_with_org();
        let drafts = vec![AssetDraft {
            name: "mystery-box".into(),
            ..AssetDraft::default()
        }];
        let created =
            commit_asset_drafts(&store, &org, drafts, DraftOrigin::Extracted, 0).unwrap();

        assert_eq!(created[0].ip_address, placeholder_ip("mystery-box"));
        assert_eq!(placeholder_ip("mystery-box"), placeholder_ip("mystery-box"));
        assert!(created[0].ip_address.starts_with("192.168."));
    }

    #[test]
    fn component_substring_match_with_first_asset_fallback() {
        let (store, org) = store_with_org();
        let drafts = vec![
            AssetDraft {
                name: "backup-server".into(),
                ip_address: Some("10.0.0.9".into()),
                ..AssetDraft::default()
            },
            AssetDraft {
                name: "Payments API".into(),
                ip_address: Some("10.0.0.10".into()),
                ..AssetDraft::default()
            },
        ];
        commit_asset_drafts(&store, &org, drafts, DraftOrigin::Extracted, 0).unwrap();

        let vulns = vec![
            VulnerabilityDraft {
                title: "SQL injection".into(),
                component: Some("payments".into()),
                severity: Some("High".into()),
                ..VulnerabilityDraft::default()
            },
            VulnerabilityDraft {
                title: "Orphan issue".into(),
                component: Some("does-not-exist".into()),
                severity: Some("Low".into()),
                ..VulnerabilityDraft::default()
            },
        ];
        let (created, dropped) = commit_extracted_vulns(&store, &org, vulns, 0).unwrap();
        assert_eq!((created, dropped), (2, 0));

        let stored = store.vulnerabilities_for_org(&org).unwrap();
        let sqli = stored.iter().find(|v| v.title == "SQL injection").unwrap();
        let orphan = stored.iter().find(|v| v.title == "Orphan issue").unwrap();

        let assets = store.assets_for_org(&org).unwrap();
        let payments = assets.iter().find(|a| a.name == "Payments API").unwrap();
        let first = &assets[0];
        assert_eq!(sqli.asset_id, payments.id);
        // assets_for_org is newest-first, matching the order the original
        // fallback saw
        assert_eq!(orphan.asset_id, first.id);
    }

    #[test]
    fn extracted_vulns_without_assets_are_dropped() {
        let (store, org) = store_with_org();
        let vulns = vec![VulnerabilityDraft {
            title: "Floating finding".into(),
            ..VulnerabilityDraft::default()
        }];
        let (created, dropped) = commit_extracted_vulns(&store, &org, vulns, 0).unwrap();
        assert_eq!((created, dropped), (0, 1));
        assert!(store.vulnerabilities_for_org(&org).unwrap().is_empty());
    }

    #[test]
    fn missing_cvss_defaults_by_severity() {
        let (store, org) = store_with_org();
        commit_asset_drafts(
            &store,
            &org,
            vec![AssetDraft {
                name: "app01".into(),
                ip_address: Some("10.0.0.2".into()),
                ..AssetDraft::default()
            }],
            DraftOrigin::Extracted,
            0,
        )
        .unwrap();

        let vulns = vec![VulnerabilityDraft {
            title: "No score given".into(),
            severity: Some("Critical".into()),
            ..VulnerabilityDraft::default()
        }];
        commit_extracted_vulns(&store, &org, vulns, 0).unwrap();

        let stored = store.vulnerabilities_for_org(&org).unwrap();
        assert_eq!(stored[0].cvss_score, 9.5);
        assert!(stored[0].cve_id.starts_with("AI-"));
    }

    #[test]
    fn finding_defaults_applied() {
        let (store, org) = store_with_org();
        let findings = vec![FindingDraft {
            title: "Tailgating possible".into(),
            severity: Some("Medium".into()),
            affected_assets: vec!["HQ entrance".into()],
            ..FindingDraft::default()
        }];
        commit_finding_drafts(&store, &org, findings, 1_700_000_000).unwrap();

        let stored = store.pentest_findings_for_org(&org).unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].finding_id.starts_with("AI-PT-"));
        assert_eq!(
            stored[0].evidence.as_deref(),
            Some("Extracted from uploaded document")
        );
        assert_eq!(stored[0].tester.as_deref(), Some("AI Analysis"));
        assert_eq!(stored[0].test_date, 1_700_000_000);
    }
}
