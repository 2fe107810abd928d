use crate::error::DbError;

const SCHEMA_SQL: &str = r#"
-- Root aggregate: everything below is scoped by organization_id
CREATE TABLE IF NOT EXISTS organizations (
    id         TEXT PRIMARY KEY,
    name       TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

-- Discovered assets (ports/services stored as JSON arrays)
CREATE TABLE IF NOT EXISTS assets (
    id               TEXT PRIMARY KEY,
    organization_id  TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
    name             TEXT NOT NULL,
    hostname         TEXT,
    ip_address       TEXT NOT NULL,
    asset_type       TEXT NOT NULL,
    ports            TEXT NOT NULL,
    services         TEXT NOT NULL,
    operating_system TEXT,
    criticality      INTEGER NOT NULL,
    exposure_score   REAL NOT NULL,
    last_scanned     INTEGER NOT NULL,
    created_at       INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_assets_org ON assets(organization_id);
CREATE INDEX IF NOT EXISTS idx_assets_ip ON assets(ip_address);

-- Vulnerabilities reference exactly one asset
CREATE TABLE IF NOT EXISTS vulnerabilities (
    id            TEXT PRIMARY KEY,
    asset_id      TEXT NOT NULL REFERENCES assets(id) ON DELETE CASCADE,
    cve_id        TEXT NOT NULL,
    title         TEXT NOT NULL,
    description   TEXT NOT NULL,
    severity      TEXT NOT NULL,
    cvss_score    REAL NOT NULL,
    cvss_vector   TEXT,
    status        TEXT NOT NULL,
    source        TEXT,
    component     TEXT,
    solution      TEXT,
    discovered_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_vulns_asset ON vulnerabilities(asset_id);

-- Pentest findings are organization-scoped; affected_assets is free text (JSON array)
CREATE TABLE IF NOT EXISTS pentest_findings (
    id              TEXT PRIMARY KEY,
    organization_id TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
    finding_id      TEXT NOT NULL,
    title           TEXT NOT NULL,
    description     TEXT NOT NULL,
    severity        TEXT NOT NULL,
    risk_rating     TEXT,
    affected_assets TEXT NOT NULL,
    evidence        TEXT,
    recommendation  TEXT,
    status          TEXT NOT NULL,
    tester          TEXT,
    test_date       INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_findings_org ON pentest_findings(organization_id);

-- Risk score history: append-only, one row per calculation
CREATE TABLE IF NOT EXISTS risk_scores (
    id                   TEXT PRIMARY KEY,
    organization_id      TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
    overall_score        INTEGER NOT NULL,
    attack_surface_score REAL NOT NULL,
    vulnerability_score  REAL NOT NULL,
    pentest_score        REAL NOT NULL,
    calculated_date      INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_risk_org_date ON risk_scores(organization_id, calculated_date);
"#;

/// Create all tables and indexes if they don't exist.
pub fn initialize(conn: &rusqlite::Connection) -> Result<(), DbError> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
