mod args;
mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::Parser;
use tokio::sync::Mutex;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use args::{Args, Command, OrgCommand};
use config::{resolve_organization, DemoModeConfig};
use posture_db::SecurityStore;
use posture_extract::{ExtractError, ExtractionClient, ExtractionRequest, Extractor};
use posture_ingest::{
    CancellationToken, FileStatus, IngestFile, IngestPipeline, PipelineConfig,
};
use posture_types::ExtractionPayload;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    let store = open_store(args.db_path.clone())?;
    let demo = DemoModeConfig::from_flag(args.demo);

    match args.command {
        Command::Org(org_command) => run_org(&store, org_command),
        Command::Ingest {
            org,
            files,
            concurrency,
            extract_url,
            extract_timeout,
            json,
        } => {
            run_ingest(
                store,
                &demo,
                org.as_deref(),
                files,
                concurrency,
                extract_url,
                extract_timeout,
                json,
            )
            .await
        }
        Command::Score { org, save, json } => run_score(&store, &demo, org.as_deref(), save, json),
        Command::History { org, limit } => run_history(&store, &demo, org.as_deref(), limit),
    }
}

fn open_store(path: Option<PathBuf>) -> Result<SecurityStore> {
    match path {
        Some(path) => SecurityStore::open(&path)
            .with_context(|| format!("failed to open database at {}", path.display())),
        None => SecurityStore::open_default().context("failed to open default database"),
    }
}

fn run_org(store: &SecurityStore, command: OrgCommand) -> Result<()> {
    match command {
        OrgCommand::Create { name } => {
            let org = store.create_organization(&name, now_unix())?;
            println!("Created organization '{}' ({})", org.name, org.id);
        }
        OrgCommand::List => {
            let orgs = store.list_organizations()?;
            if orgs.is_empty() {
                println!("No organizations. Create one with: posture org create --name <NAME>");
            }
            for org in orgs {
                println!("{}  {}", org.id, org.name);
            }
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_ingest(
    store: SecurityStore,
    demo: &DemoModeConfig,
    org: Option<&str>,
    files: Vec<PathBuf>,
    concurrency: usize,
    extract_url: Option<String>,
    extract_timeout: u64,
    json: bool,
) -> Result<()> {
    let organization_id = resolve_organization(&store, org, demo, now_unix())?;

    let mut batch = Vec::with_capacity(files.len());
    for path in &files {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        batch.push(IngestFile { name, bytes });
    }

    let extractor = build_extractor(extract_url, extract_timeout)?;
    let pipeline = IngestPipeline::new(
        Arc::new(Mutex::new(store)),
        extractor,
        PipelineConfig {
            concurrency: concurrency.max(1),
        },
    );

    // Ctrl-C aborts in-flight files; already-committed rows stay in place.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("cancellation requested, aborting in-flight files");
                cancel.cancel();
            }
        });
    }

    let reports = pipeline.run(&organization_id, batch, cancel).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            match report.status {
                FileStatus::Completed => {
                    let mut line = format!(
                        "{}: ok — {} assets, {} vulnerabilities, {} findings",
                        report.file_name,
                        report.assets_created,
                        report.vulnerabilities_created,
                        report.findings_created
                    );
                    if report.dropped_items > 0 {
                        line.push_str(&format!(" ({} dropped)", report.dropped_items));
                    }
                    if let Some(confidence) = report.confidence {
                        line.push_str(&format!(" [confidence {confidence:.0}%]"));
                    }
                    println!("{line}");
                }
                FileStatus::Failed => {
                    println!(
                        "{}: FAILED — {}",
                        report.file_name,
                        report.error.as_deref().unwrap_or("unknown error")
                    );
                }
                FileStatus::Cancelled => println!("{}: cancelled", report.file_name),
            }
        }
    }

    if reports.iter().all(|r| r.status == FileStatus::Failed) {
        bail!("all files failed to ingest");
    }
    Ok(())
}

fn build_extractor(url: Option<String>, timeout_secs: u64) -> Result<Arc<dyn Extractor>> {
    let url = url.or_else(|| std::env::var("POSTURE_EXTRACT_URL").ok());
    match url {
        Some(url) => {
            let client = ExtractionClient::new(url, Duration::from_secs(timeout_secs))
                .context("failed to build extraction client")?;
            Ok(Arc::new(client))
        }
        // Structured files still work; AI-extractable files fail per-file.
        None => Ok(Arc::new(UnconfiguredExtractor)),
    }
}

/// Stand-in when no extraction endpoint is configured.
struct UnconfiguredExtractor;

#[async_trait]
impl Extractor for UnconfiguredExtractor {
    async fn extract(&self, _request: ExtractionRequest) -> Result<ExtractionPayload, ExtractError> {
        Err(ExtractError::NotConfigured)
    }
}

fn run_score(
    store: &SecurityStore,
    demo: &DemoModeConfig,
    org: Option<&str>,
    save: bool,
    json: bool,
) -> Result<()> {
    let organization_id = resolve_organization(store, org, demo, now_unix())?;

    let report = if save {
        let (report, _snapshot) =
            posture_score::calculate_and_save(store, &organization_id, now_unix())?;
        report
    } else {
        posture_score::calculate(store, &organization_id)?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Overall risk score: {}", report.overall_score);
    println!("  Attack surface: {:.1}", report.attack_surface_score);
    println!("  Vulnerability:  {:.1}", report.vulnerability_score);
    println!("  Pentest:        {:.1}", report.pentest_score);
    let b = &report.breakdown;
    println!(
        "  {} assets ({} exposed); vulns: {} critical / {} high / {} medium / {} low",
        b.total_assets, b.exposed_assets, b.critical_vulns, b.high_vulns, b.medium_vulns, b.low_vulns
    );
    if save {
        println!("Snapshot saved.");
    }
    Ok(())
}

fn run_history(
    store: &SecurityStore,
    demo: &DemoModeConfig,
    org: Option<&str>,
    limit: usize,
) -> Result<()> {
    let organization_id = resolve_organization(store, org, demo, now_unix())?;
    let history = store.risk_history(&organization_id, limit)?;

    if history.is_empty() {
        println!("No snapshots yet. Run: posture score --save");
        return Ok(());
    }
    for snapshot in history {
        println!(
            "{}  overall {:>3}  (surface {:.1} / vuln {:.1} / pentest {:.1})",
            snapshot.calculated_date,
            snapshot.overall_score,
            snapshot.attack_surface_score,
            snapshot.vulnerability_score,
            snapshot.pentest_score
        );
    }
    Ok(())
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
