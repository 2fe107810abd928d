//! Risk scoring engine.
//!
//! Three sub-scores (attack surface, vulnerability, pentest) combine into a
//! weighted overall score. Pure computation over the canonical store,
//! triggered on demand — never automatically on ingestion. Reads tolerate a
//! partially-updated store: the result is a point-in-time snapshot, not a
//! transactional join.

use posture_db::{DbError, SecurityStore};
use posture_types::{Asset, PentestFinding, RiskScoreSnapshot, Severity, Vulnerability};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ScoreError {
    #[error("persistence error: {0}")]
    Db(#[from] DbError),
}

/// Counts backing the score, for display alongside it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RiskBreakdown {
    pub critical_vulns: usize,
    pub high_vulns: usize,
    pub medium_vulns: usize,
    pub low_vulns: usize,
    pub total_assets: usize,
    /// Assets with exposure above 50.
    pub exposed_assets: usize,
}

/// A computed (not yet persisted) risk score.
#[derive(Debug, Clone, Serialize)]
pub struct RiskReport {
    pub overall_score: i64,
    pub attack_surface_score: f64,
    pub vulnerability_score: f64,
    pub pentest_score: f64,
    pub breakdown: RiskBreakdown,
}

const ATTACK_SURFACE_WEIGHT: f64 = 0.30;
const VULNERABILITY_WEIGHT: f64 = 0.40;
const PENTEST_WEIGHT: f64 = 0.30;

/// Score when an organization has no pentest findings at all: "untested"
/// rather than "no risk", so deliberately below the no-vulnerability 100.
const UNTESTED_PENTEST_SCORE: f64 = 75.0;

/// Higher asset exposure pulls the score down; no assets is the best case.
pub fn attack_surface_score(assets: &[Asset]) -> f64 {
    if assets.is_empty() {
        return 100.0;
    }
    let avg_exposure =
        assets.iter().map(|a| a.exposure_score).sum::<f64>() / assets.len() as f64;
    (100.0 - avg_exposure).clamp(0.0, 100.0)
}

/// Severity-weighted score over vulnerabilities. `Info` entries are treated
/// as absent from the distribution — excluded from both the weighted sum
/// and the count.
pub fn vulnerability_score(vulns: &[Vulnerability]) -> f64 {
    weighted_severity_score(vulns.iter().map(|v| v.severity), 100.0)
}

/// Same weighted formula over pentest findings; an untested organization
/// scores the fixed default instead of a perfect 100.
pub fn pentest_score(findings: &[PentestFinding]) -> f64 {
    weighted_severity_score(findings.iter().map(|f| f.severity), UNTESTED_PENTEST_SCORE)
}

fn weighted_severity_score(severities: impl Iterator<Item = Severity>, empty_score: f64) -> f64 {
    let scored: Vec<Severity> = severities.filter(|s| *s != Severity::Info).collect();
    if scored.is_empty() {
        return empty_score;
    }
    let weighted_sum: u32 = scored.iter().map(|s| s.weight()).sum();
    let max_possible = scored.len() as f64 * 10.0;
    (100.0 - (weighted_sum as f64 / max_possible) * 100.0).clamp(0.0, 100.0)
}

/// Weighted combination, rounded to an integer in [0, 100].
pub fn overall_score(attack_surface: f64, vulnerability: f64, pentest: f64) -> i64 {
    let combined = attack_surface * ATTACK_SURFACE_WEIGHT
        + vulnerability * VULNERABILITY_WEIGHT
        + pentest * PENTEST_WEIGHT;
    combined.round().clamp(0.0, 100.0) as i64
}

/// Compute the full risk report for an organization.
pub fn calculate(store: &SecurityStore, organization_id: &str) -> Result<RiskReport, ScoreError> {
    let assets = store.assets_for_org(organization_id)?;
    let vulns = store.vulnerabilities_for_org(organization_id)?;
    let findings = store.pentest_findings_for_org(organization_id)?;

    let attack_surface = attack_surface_score(&assets);
    let vulnerability = vulnerability_score(&vulns);
    let pentest = pentest_score(&findings);

    let report = RiskReport {
        overall_score: overall_score(attack_surface, vulnerability, pentest),
        attack_surface_score: attack_surface,
        vulnerability_score: vulnerability,
        pentest_score: pentest,
        breakdown: breakdown(&assets, &vulns),
    };
    debug!(
        organization_id,
        overall = report.overall_score,
        "risk score calculated"
    );
    Ok(report)
}

/// Compute and persist a fresh immutable snapshot.
pub fn calculate_and_save(
    store: &SecurityStore,
    organization_id: &str,
    calculated_date: i64,
) -> Result<(RiskReport, RiskScoreSnapshot), ScoreError> {
    let report = calculate(store, organization_id)?;
    let snapshot = store.insert_risk_snapshot(
        organization_id,
        report.overall_score,
        report.attack_surface_score,
        report.vulnerability_score,
        report.pentest_score,
        calculated_date,
    )?;
    Ok((report, snapshot))
}

fn breakdown(assets: &[Asset], vulns: &[Vulnerability]) -> RiskBreakdown {
    let count = |severity: Severity| vulns.iter().filter(|v| v.severity == severity).count();
    RiskBreakdown {
        critical_vulns: count(Severity::Critical),
        high_vulns: count(Severity::High),
        medium_vulns: count(Severity::Medium),
        low_vulns: count(Severity::Low),
        total_assets: assets.len(),
        exposed_assets: assets.iter().filter(|a| a.exposure_score > 50.0).count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use posture_types::{AssetType, VulnStatus};

    fn asset(exposure: f64) -> Asset {
        Asset {
            id: "a".into(),
            organization_id: "o".into(),
            name: "asset".into(),
            hostname: None,
            ip_address: "10.0.0.1".into(),
            asset_type: AssetType::Server,
            ports: vec![],
            services: vec![],
            operating_system: None,
            criticality: 3,
            exposure_score: exposure,
            last_scanned: 0,
            created_at: 0,
        }
    }

    fn vuln(severity: Severity) -> Vulnerability {
        Vulnerability {
            id: "v".into(),
            asset_id: "a".into(),
            cve_id: "CVE-0000-0000".into(),
            title: "t".into(),
            description: String::new(),
            severity,
            cvss_score: severity.default_cvss(),
            cvss_vector: None,
            status: VulnStatus::Open,
            source: None,
            component: None,
            solution: None,
            discovered_at: 0,
        }
    }

    fn finding(severity: Severity) -> PentestFinding {
        PentestFinding {
            id: "f".into(),
            organization_id: "o".into(),
            finding_id: "PT-1".into(),
            title: "t".into(),
            description: String::new(),
            severity,
            risk_rating: None,
            affected_assets: vec![],
            evidence: None,
            recommendation: None,
            status: VulnStatus::Open,
            tester: None,
            test_date: 0,
        }
    }

    #[test]
    fn empty_inputs_use_documented_defaults() {
        assert_eq!(attack_surface_score(&[]), 100.0);
        assert_eq!(vulnerability_score(&[]), 100.0);
        assert_eq!(pentest_score(&[]), 75.0);
    }

    #[test]
    fn attack_surface_inverts_average_exposure() {
        let assets = vec![asset(40.0), asset(60.0)];
        assert_eq!(attack_surface_score(&assets), 50.0);
        assert_eq!(attack_surface_score(&[asset(100.0)]), 0.0);
    }

    #[test]
    fn vulnerability_score_weighted() {
        // One critical out of one: 100 - (10 / 10) * 100 = 0
        assert_eq!(vulnerability_score(&[vuln(Severity::Critical)]), 0.0);
        // One low out of one: 100 - (1 / 10) * 100 = 90
        assert_eq!(vulnerability_score(&[vuln(Severity::Low)]), 90.0);
        // Critical + high + medium + low: 100 - (18 / 40) * 100 = 55
        let mixed = vec![
            vuln(Severity::Critical),
            vuln(Severity::High),
            vuln(Severity::Medium),
            vuln(Severity::Low),
        ];
        assert_eq!(vulnerability_score(&mixed), 55.0);
    }

    #[test]
    fn info_vulns_are_absent_from_the_distribution() {
        let only_info = vec![vuln(Severity::Info), vuln(Severity::Info)];
        assert_eq!(vulnerability_score(&only_info), 100.0);

        // Info must not dilute the count either
        let with_info = vec![vuln(Severity::Critical), vuln(Severity::Info)];
        assert_eq!(vulnerability_score(&with_info), 0.0);
    }

    #[test]
    fn pentest_score_same_formula_different_default() {
        assert_eq!(pentest_score(&[finding(Severity::Low)]), 90.0);
        assert_eq!(pentest_score(&[finding(Severity::Info)]), 75.0);
    }

    #[test]
    fn overall_is_an_integer_in_range_for_any_valid_subscores() {
        for a in [0.0, 33.3, 50.0, 99.9, 100.0] {
            for v in [0.0, 12.5, 100.0] {
                for p in [0.0, 75.0, 100.0] {
                    let overall = overall_score(a, v, p);
                    assert!((0..=100).contains(&overall), "({a},{v},{p}) -> {overall}");
                }
            }
        }
        assert_eq!(overall_score(100.0, 100.0, 100.0), 100);
        assert_eq!(overall_score(0.0, 0.0, 0.0), 0);
        // 0.3*80 + 0.4*50 + 0.3*75 = 66.5 -> 67
        assert_eq!(overall_score(80.0, 50.0, 75.0), 67);
    }

    #[test]
    fn calculate_and_save_appends_a_snapshot() {
        let store = SecurityStore::open_in_memory().unwrap();
        let org = store.create_organization("Acme", 0).unwrap();

        let (report, snapshot) = calculate_and_save(&store, &org.id, 1_700_000_000).unwrap();
        // No assets, no vulns, no findings
        assert_eq!(report.attack_surface_score, 100.0);
        assert_eq!(report.vulnerability_score, 100.0);
        assert_eq!(report.pentest_score, 75.0);
        assert_eq!(report.overall_score, 93); // 30 + 40 + 22.5 = 92.5 -> 93
        assert_eq!(snapshot.overall_score, 93);

        let history = store.risk_history(&org.id, 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].calculated_date, 1_700_000_000);
    }

    #[test]
    fn breakdown_counts_severities_and_exposure() {
        let assets = vec![asset(80.0), asset(20.0)];
        let vulns = vec![
            vuln(Severity::Critical),
            vuln(Severity::High),
            vuln(Severity::High),
            vuln(Severity::Info),
        ];
        let b = breakdown(&assets, &vulns);
        assert_eq!(b.critical_vulns, 1);
        assert_eq!(b.high_vulns, 2);
        assert_eq!(b.medium_vulns, 0);
        assert_eq!(b.total_assets, 2);
        assert_eq!(b.exposed_assets, 1);
    }
}
