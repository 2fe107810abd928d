//! Heuristic asset classification from open ports and announced services.
//!
//! Pure and side-effect-free: the same `(services, ports)` always produce
//! the same classification, so the pipeline can recompute it on every
//! re-scan and tests can pin exact values.

use posture_types::AssetType;

/// Ports that draw the bulk of opportunistic attacks.
const COMMONLY_ATTACKED_PORTS: &[u16] = &[21, 23, 80, 443, 3389, 5900];

const DATABASE_TOKENS: &[&str] = &["database", "mysql", "postgres"];
const WEB_TOKENS: &[&str] = &["http", "web"];
const REMOTE_SHELL_TOKENS: &[&str] = &["ssh", "telnet"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub asset_type: AssetType,
    /// 1-5 inclusive.
    pub criticality: u8,
    /// 0-100 inclusive.
    pub exposure_score: f64,
}

/// Classify an asset from its service names and open ports.
pub fn classify(services: &[String], ports: &[u16]) -> Classification {
    Classification {
        asset_type: asset_type(services),
        criticality: criticality(services, ports),
        exposure_score: exposure_score(services, ports),
    }
}

/// Database detection takes precedence over web detection, which takes
/// precedence over remote-shell detection.
fn asset_type(services: &[String]) -> AssetType {
    if has_any_token(services, DATABASE_TOKENS) {
        AssetType::Database
    } else if has_any_token(services, WEB_TOKENS) {
        AssetType::Server
    } else if has_any_token(services, REMOTE_SHELL_TOKENS) {
        AssetType::Server
    } else {
        AssetType::Workstation
    }
}

/// Additive and monotonic: 1 base, +2 web, +3 database, +1 ssh port, cap 5.
fn criticality(services: &[String], ports: &[u16]) -> u8 {
    let mut criticality: u8 = 1;
    if has_any_token(services, &["http"]) {
        criticality += 2;
    }
    if has_any_token(services, DATABASE_TOKENS) {
        criticality += 3;
    }
    if ports.contains(&22) {
        criticality += 1;
    }
    criticality.min(5)
}

/// +15 per commonly-attacked open port, +20 flat for any http service,
/// +25 flat for exposed remote desktop/VNC; clamped to [0, 100].
fn exposure_score(services: &[String], ports: &[u16]) -> f64 {
    let mut exposure = 0.0;

    let attacked = ports
        .iter()
        .filter(|p| COMMONLY_ATTACKED_PORTS.contains(p))
        .count();
    exposure += attacked as f64 * 15.0;

    if has_any_token(services, &["http"]) {
        exposure += 20.0;
    }
    if ports.contains(&3389) || ports.contains(&5900) {
        exposure += 25.0;
    }

    exposure.clamp(0.0, 100.0)
}

fn has_any_token(services: &[String], tokens: &[&str]) -> bool {
    services.iter().any(|service| {
        let service = service.to_lowercase();
        tokens.iter().any(|token| service.contains(token))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn svc(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn web_host_exact_classification() {
        // One host exposing 80/443/22 with http/https/ssh:
        // criticality 1 + 2 (http) + 1 (port 22) = 4
        // exposure 15*2 (80, 443) + 20 (http) = 50
        let c = classify(&svc(&["http", "https", "ssh"]), &[80, 443, 22]);
        assert_eq!(c.asset_type, AssetType::Server);
        assert_eq!(c.criticality, 4);
        assert_eq!(c.exposure_score, 50.0);
    }

    #[test]
    fn database_takes_precedence_over_web() {
        let c = classify(&svc(&["http", "mysql"]), &[80, 3306]);
        assert_eq!(c.asset_type, AssetType::Database);
        // 1 + 2 (http) + 3 (mysql) = 6, capped at 5
        assert_eq!(c.criticality, 5);
    }

    #[test]
    fn remote_shell_only_is_a_server() {
        let c = classify(&svc(&["ssh"]), &[22]);
        assert_eq!(c.asset_type, AssetType::Server);
        assert_eq!(c.criticality, 2);
        assert_eq!(c.exposure_score, 0.0);
    }

    #[test]
    fn bare_host_is_a_workstation() {
        let c = classify(&[], &[]);
        assert_eq!(c.asset_type, AssetType::Workstation);
        assert_eq!(c.criticality, 1);
        assert_eq!(c.exposure_score, 0.0);
    }

    #[test]
    fn remote_desktop_bumps_exposure() {
        // 3389 is both commonly attacked (+15) and remote desktop (+25)
        let c = classify(&[], &[3389]);
        assert_eq!(c.exposure_score, 40.0);
    }

    #[test]
    fn exposure_clamped_at_100() {
        let c = classify(&svc(&["http"]), COMMONLY_ATTACKED_PORTS);
        // 6*15 + 20 + 25 = 135 before the clamp
        assert_eq!(c.exposure_score, 100.0);
    }

    #[test]
    fn ranges_hold_for_arbitrary_inputs() {
        let service_pool = ["http", "mysql", "ssh", "smtp", "database", "telnet", "dns"];
        let port_pool: Vec<u16> = vec![21, 22, 23, 25, 80, 443, 3306, 3389, 5900, 8080];
        for service_count in 0..service_pool.len() {
            for port_count in 0..port_pool.len() {
                let services = svc(&service_pool[..service_count]);
                let ports = &port_pool[..port_count];
                let c = classify(&services, ports);
                assert!((1..=5).contains(&c.criticality));
                assert!((0.0..=100.0).contains(&c.exposure_score));
            }
        }
    }
}
