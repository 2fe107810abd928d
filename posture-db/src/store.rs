use std::path::{Path, PathBuf};

use posture_types::{
    Asset, AssetType, Organization, PentestFinding, RiskScoreSnapshot, Severity, VulnStatus,
    Vulnerability,
};
use rusqlite::{params, Connection};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbError;
use crate::schema;

/// The canonical store: normalized security entities in SQLite, scoped by
/// organization. Any backend exposing these operations would satisfy the
/// pipeline; SQLite keeps the deployment a single file.
pub struct SecurityStore {
    conn: Connection,
}

/// Insert parameters for an asset (id is generated on insert).
#[derive(Debug, Clone)]
pub struct NewAsset {
    pub organization_id: String,
    pub name: String,
    pub hostname: Option<String>,
    pub ip_address: String,
    pub asset_type: AssetType,
    pub ports: Vec<u16>,
    pub services: Vec<String>,
    pub operating_system: Option<String>,
    pub criticality: u8,
    pub exposure_score: f64,
    pub last_scanned: i64,
}

/// Insert parameters for a vulnerability.
#[derive(Debug, Clone)]
pub struct NewVulnerability {
    pub asset_id: String,
    pub cve_id: String,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub cvss_score: f64,
    pub cvss_vector: Option<String>,
    pub status: VulnStatus,
    pub source: Option<String>,
    pub component: Option<String>,
    pub solution: Option<String>,
    pub discovered_at: i64,
}

/// Insert parameters for a pentest finding.
#[derive(Debug, Clone)]
pub struct NewFinding {
    pub organization_id: String,
    pub finding_id: String,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub risk_rating: Option<String>,
    pub affected_assets: Vec<String>,
    pub evidence: Option<String>,
    pub recommendation: Option<String>,
    pub status: VulnStatus,
    pub tester: Option<String>,
    pub test_date: i64,
}

fn default_db_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".posture").join("posture.db")
}

impl SecurityStore {
    /// Open (or create) the database at the default location.
    pub fn open_default() -> Result<Self, DbError> {
        let path = default_db_path();
        Self::open(&path)
    }

    /// Open a database at a specific path.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DbError::Other(format!(
                    "failed to create db directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        debug!(path = %path.display(), "security store opened");
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    // -----------------------------------------------------------------------
    // Organizations
    // -----------------------------------------------------------------------

    pub fn create_organization(&self, name: &str, created_at: i64) -> Result<Organization, DbError> {
        let org = Organization {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            created_at,
        };
        self.conn.execute(
            "INSERT INTO organizations (id, name, created_at) VALUES (?1, ?2, ?3)",
            params![org.id, org.name, org.created_at],
        )?;
        Ok(org)
    }

    pub fn get_organization(&self, id: &str) -> Result<Option<Organization>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, created_at FROM organizations WHERE id = ?1")?;
        let mut rows = stmt.query(params![id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Organization {
                id: row.get(0)?,
                name: row.get(1)?,
                created_at: row.get(2)?,
            }))
        } else {
            Ok(None)
        }
    }

    pub fn find_organization_by_name(&self, name: &str) -> Result<Option<Organization>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, created_at FROM organizations WHERE name = ?1 ORDER BY created_at LIMIT 1",
        )?;
        let mut rows = stmt.query(params![name])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Organization {
                id: row.get(0)?,
                name: row.get(1)?,
                created_at: row.get(2)?,
            }))
        } else {
            Ok(None)
        }
    }

    pub fn list_organizations(&self) -> Result<Vec<Organization>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, created_at FROM organizations ORDER BY created_at")?;
        let rows = stmt.query_map([], |row| {
            Ok(Organization {
                id: row.get(0)?,
                name: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?;
        let mut orgs = Vec::new();
        for row in rows {
            orgs.push(row?);
        }
        Ok(orgs)
    }

    // -----------------------------------------------------------------------
    // Assets
    // -----------------------------------------------------------------------

    pub fn create_asset(&self, new: NewAsset) -> Result<Asset, DbError> {
        let asset = Asset {
            id: Uuid::new_v4().to_string(),
            organization_id: new.organization_id,
            name: new.name,
            hostname: new.hostname,
            ip_address: new.ip_address,
            asset_type: new.asset_type,
            ports: new.ports,
            services: new.services,
            operating_system: new.operating_system,
            criticality: new.criticality,
            exposure_score: new.exposure_score,
            last_scanned: new.last_scanned,
            created_at: new.last_scanned,
        };
        self.conn.execute(
            "INSERT INTO assets (id, organization_id, name, hostname, ip_address, asset_type, \
             ports, services, operating_system, criticality, exposure_score, last_scanned, \
             created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                asset.id,
                asset.organization_id,
                asset.name,
                asset.hostname,
                asset.ip_address,
                asset.asset_type.to_string(),
                serde_json::to_string(&asset.ports)?,
                serde_json::to_string(&asset.services)?,
                asset.operating_system,
                asset.criticality as i64,
                asset.exposure_score,
                asset.last_scanned,
                asset.created_at,
            ],
        )?;
        Ok(asset)
    }

    /// All assets for an organization, most recently created first.
    pub fn assets_for_org(&self, organization_id: &str) -> Result<Vec<Asset>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, organization_id, name, hostname, ip_address, asset_type, ports, \
             services, operating_system, criticality, exposure_score, last_scanned, created_at \
             FROM assets WHERE organization_id = ?1 ORDER BY created_at DESC, rowid DESC",
        )?;
        let rows = stmt.query_map(params![organization_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, Option<String>>(8)?,
                row.get::<_, i64>(9)?,
                row.get::<_, f64>(10)?,
                row.get::<_, i64>(11)?,
                row.get::<_, i64>(12)?,
            ))
        })?;

        let mut assets = Vec::new();
        for row in rows {
            let (
                id,
                organization_id,
                name,
                hostname,
                ip_address,
                asset_type,
                ports_json,
                services_json,
                operating_system,
                criticality,
                exposure_score,
                last_scanned,
                created_at,
            ) = row?;
            assets.push(Asset {
                id,
                organization_id,
                name,
                hostname,
                ip_address,
                asset_type: AssetType::parse_loose(&asset_type),
                ports: serde_json::from_str(&ports_json)?,
                services: serde_json::from_str(&services_json)?,
                operating_system,
                criticality: criticality.clamp(1, 5) as u8,
                exposure_score,
                last_scanned,
                created_at,
            });
        }
        Ok(assets)
    }

    /// Out-of-band exposure update (used by re-scoring collaborators, not by
    /// the ingestion pipeline).
    pub fn update_asset_exposure(&self, asset_id: &str, exposure_score: f64) -> Result<(), DbError> {
        let updated = self.conn.execute(
            "UPDATE assets SET exposure_score = ?1 WHERE id = ?2",
            params![exposure_score, asset_id],
        )?;
        if updated == 0 {
            return Err(DbError::NotFound(format!("asset {asset_id}")));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Vulnerabilities
    // -----------------------------------------------------------------------

    pub fn create_vulnerability(&self, new: NewVulnerability) -> Result<Vulnerability, DbError> {
        let vuln = Vulnerability {
            id: Uuid::new_v4().to_string(),
            asset_id: new.asset_id,
            cve_id: new.cve_id,
            title: new.title,
            description: new.description,
            severity: new.severity,
            cvss_score: new.cvss_score,
            cvss_vector: new.cvss_vector,
            status: new.status,
            source: new.source,
            component: new.component,
            solution: new.solution,
            discovered_at: new.discovered_at,
        };
        self.conn.execute(
            "INSERT INTO vulnerabilities (id, asset_id, cve_id, title, description, severity, \
             cvss_score, cvss_vector, status, source, component, solution, discovered_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                vuln.id,
                vuln.asset_id,
                vuln.cve_id,
                vuln.title,
                vuln.description,
                vuln.severity.to_string(),
                vuln.cvss_score,
                vuln.cvss_vector,
                vuln.status.to_string(),
                vuln.source,
                vuln.component,
                vuln.solution,
                vuln.discovered_at,
            ],
        )?;
        Ok(vuln)
    }

    /// All vulnerabilities for an organization (joined through assets),
    /// highest CVSS first.
    pub fn vulnerabilities_for_org(&self, organization_id: &str) -> Result<Vec<Vulnerability>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT v.id, v.asset_id, v.cve_id, v.title, v.description, v.severity, \
             v.cvss_score, v.cvss_vector, v.status, v.source, v.component, v.solution, \
             v.discovered_at \
             FROM vulnerabilities v \
             INNER JOIN assets a ON v.asset_id = a.id \
             WHERE a.organization_id = ?1 ORDER BY v.cvss_score DESC",
        )?;
        let rows = stmt.query_map(params![organization_id], |row| {
            Ok(Vulnerability {
                id: row.get(0)?,
                asset_id: row.get(1)?,
                cve_id: row.get(2)?,
                title: row.get(3)?,
                description: row.get(4)?,
                severity: Severity::parse_loose(&row.get::<_, String>(5)?),
                cvss_score: row.get(6)?,
                cvss_vector: row.get(7)?,
                status: VulnStatus::parse_loose(&row.get::<_, String>(8)?),
                source: row.get(9)?,
                component: row.get(10)?,
                solution: row.get(11)?,
                discovered_at: row.get(12)?,
            })
        })?;
        let mut vulns = Vec::new();
        for row in rows {
            vulns.push(row?);
        }
        Ok(vulns)
    }

    /// Case-management status transition. The ingestion pipeline never calls
    /// this; it exists for the external collaborator that owns triage.
    pub fn update_vulnerability_status(&self, vuln_id: &str, status: VulnStatus) -> Result<(), DbError> {
        let updated = self.conn.execute(
            "UPDATE vulnerabilities SET status = ?1 WHERE id = ?2",
            params![status.to_string(), vuln_id],
        )?;
        if updated == 0 {
            return Err(DbError::NotFound(format!("vulnerability {vuln_id}")));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Pentest findings
    // -----------------------------------------------------------------------

    pub fn create_pentest_finding(&self, new: NewFinding) -> Result<PentestFinding, DbError> {
        let finding = PentestFinding {
            id: Uuid::new_v4().to_string(),
            organization_id: new.organization_id,
            finding_id: new.finding_id,
            title: new.title,
            description: new.description,
            severity: new.severity,
            risk_rating: new.risk_rating,
            affected_assets: new.affected_assets,
            evidence: new.evidence,
            recommendation: new.recommendation,
            status: new.status,
            tester: new.tester,
            test_date: new.test_date,
        };
        self.conn.execute(
            "INSERT INTO pentest_findings (id, organization_id, finding_id, title, description, \
             severity, risk_rating, affected_assets, evidence, recommendation, status, tester, \
             test_date) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                finding.id,
                finding.organization_id,
                finding.finding_id,
                finding.title,
                finding.description,
                finding.severity.to_string(),
                finding.risk_rating,
                serde_json::to_string(&finding.affected_assets)?,
                finding.evidence,
                finding.recommendation,
                finding.status.to_string(),
                finding.tester,
                finding.test_date,
            ],
        )?;
        Ok(finding)
    }

    /// All findings for an organization, most recent test first.
    pub fn pentest_findings_for_org(&self, organization_id: &str) -> Result<Vec<PentestFinding>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, organization_id, finding_id, title, description, severity, risk_rating, \
             affected_assets, evidence, recommendation, status, tester, test_date \
             FROM pentest_findings WHERE organization_id = ?1 ORDER BY test_date DESC",
        )?;
        let rows = stmt.query_map(params![organization_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, Option<String>>(8)?,
                row.get::<_, Option<String>>(9)?,
                row.get::<_, String>(10)?,
                row.get::<_, Option<String>>(11)?,
                row.get::<_, i64>(12)?,
            ))
        })?;

        let mut findings = Vec::new();
        for row in rows {
            let (
                id,
                organization_id,
                finding_id,
                title,
                description,
                severity,
                risk_rating,
                affected_json,
                evidence,
                recommendation,
                status,
                tester,
                test_date,
            ) = row?;
            findings.push(PentestFinding {
                id,
                organization_id,
                finding_id,
                title,
                description,
                severity: Severity::parse_loose(&severity),
                risk_rating,
                affected_assets: serde_json::from_str(&affected_json)?,
                evidence,
                recommendation,
                status: VulnStatus::parse_loose(&status),
                tester,
                test_date,
            });
        }
        Ok(findings)
    }

    // -----------------------------------------------------------------------
    // Risk score snapshots
    // -----------------------------------------------------------------------

    /// Append a fresh snapshot. Existing rows are never touched; history is
    /// the ordered sequence of inserts.
    #[allow(clippy::too_many_arguments)]
    pub fn insert_risk_snapshot(
        &self,
        organization_id: &str,
        overall_score: i64,
        attack_surface_score: f64,
        vulnerability_score: f64,
        pentest_score: f64,
        calculated_date: i64,
    ) -> Result<RiskScoreSnapshot, DbError> {
        let snapshot = RiskScoreSnapshot {
            id: Uuid::new_v4().to_string(),
            organization_id: organization_id.to_string(),
            overall_score,
            attack_surface_score,
            vulnerability_score,
            pentest_score,
            calculated_date,
        };
        self.conn.execute(
            "INSERT INTO risk_scores (id, organization_id, overall_score, attack_surface_score, \
             vulnerability_score, pentest_score, calculated_date) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                snapshot.id,
                snapshot.organization_id,
                snapshot.overall_score,
                snapshot.attack_surface_score,
                snapshot.vulnerability_score,
                snapshot.pentest_score,
                snapshot.calculated_date,
            ],
        )?;
        Ok(snapshot)
    }

    /// Snapshot history, most recent first.
    pub fn risk_history(&self, organization_id: &str, limit: usize) -> Result<Vec<RiskScoreSnapshot>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, organization_id, overall_score, attack_surface_score, \
             vulnerability_score, pentest_score, calculated_date \
             FROM risk_scores WHERE organization_id = ?1 \
             ORDER BY calculated_date DESC, rowid DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![organization_id, limit as i64], |row| {
            Ok(RiskScoreSnapshot {
                id: row.get(0)?,
                organization_id: row.get(1)?,
                overall_score: row.get(2)?,
                attack_surface_score: row.get(3)?,
                vulnerability_score: row.get(4)?,
                pentest_score: row.get(5)?,
                calculated_date: row.get(6)?,
            })
        })?;
        let mut snapshots = Vec::new();
        for row in rows {
            snapshots.push(row?);
        }
        Ok(snapshots)
    }
}
