use anyhow::{bail, Context, Result};
use posture_db::SecurityStore;
use tracing::info;

/// Demo/fallback state, injected at startup. The pipeline below the CLI is
/// demo-agnostic and operates purely against whatever store it is given.
#[derive(Debug, Clone)]
pub struct DemoModeConfig {
    pub enabled: bool,
    pub organization_name: String,
}

impl DemoModeConfig {
    pub fn from_flag(enabled: bool) -> Self {
        Self {
            enabled,
            organization_name: "Demo Organization".to_string(),
        }
    }
}

/// Resolve which organization a command targets: an explicit `--org` id, or
/// the (seeded-on-demand) demo organization.
pub fn resolve_organization(
    store: &SecurityStore,
    explicit: Option<&str>,
    demo: &DemoModeConfig,
    now: i64,
) -> Result<String> {
    if let Some(id) = explicit {
        let org = store
            .get_organization(id)
            .context("failed to look up organization")?;
        return match org {
            Some(org) => Ok(org.id),
            None => bail!("organization '{id}' does not exist"),
        };
    }

    if demo.enabled {
        if let Some(org) = store.find_organization_by_name(&demo.organization_name)? {
            return Ok(org.id);
        }
        let org = store.create_organization(&demo.organization_name, now)?;
        info!(id = %org.id, "seeded demo organization");
        return Ok(org.id);
    }

    bail!("no organization specified (use --org <ID> or --demo)")
}
