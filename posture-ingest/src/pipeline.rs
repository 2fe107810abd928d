//! Bounded-concurrency ingestion over a batch of uploaded files.
//!
//! One worker per file, capped at the configured limit — extraction calls
//! are the critical path and may be rate-limited upstream. Per-file
//! failures are isolated; a bad file never aborts its siblings. All writes
//! for one organization serialize on a per-organization mutex so the
//! writer's fallback matching stays deterministic under concurrency.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use posture_db::SecurityStore;
use posture_extract::{ExtractionRequest, Extractor};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::IngestError;
use crate::format::{detect_format, file_extension, FileFormat};
use crate::nessus::decode_nessus;
use crate::nmap::decode_nmap_xml;
use crate::openvas::decode_openvas;
use crate::writer::{
    commit_asset_drafts, commit_extracted_vulns, commit_finding_drafts, commit_resolved_vulns,
    DraftOrigin,
};

/// A file submitted for ingestion.
#[derive(Debug, Clone)]
pub struct IngestFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum files processed concurrently.
    pub concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

/// Outcome of one file in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Completed,
    Failed,
    Cancelled,
}

/// Per-file ingestion report.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub file_name: String,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub assets_created: usize,
    pub vulnerabilities_created: usize,
    pub findings_created: usize,
    /// Items lost to host-resolution or missing-asset fallbacks.
    pub dropped_items: usize,
    /// Extraction confidence (0-100); only present for AI-processed files.
    /// Low values should be flagged for manual review.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl FileReport {
    fn empty(file_name: String, status: FileStatus) -> Self {
        Self {
            file_name,
            status,
            error: None,
            assets_created: 0,
            vulnerabilities_created: 0,
            findings_created: 0,
            dropped_items: 0,
            confidence: None,
        }
    }

    fn failed(file_name: String, error: &IngestError) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::empty(file_name, FileStatus::Failed)
        }
    }
}

type OrgLocks = Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>;

/// The ingestion pipeline. Cheap to clone per batch; holds the store, the
/// extraction capability, and the per-organization write locks.
pub struct IngestPipeline {
    store: Arc<Mutex<SecurityStore>>,
    extractor: Arc<dyn Extractor>,
    org_locks: OrgLocks,
    concurrency: usize,
}

impl IngestPipeline {
    pub fn new(
        store: Arc<Mutex<SecurityStore>>,
        extractor: Arc<dyn Extractor>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            extractor,
            org_locks: Arc::new(Mutex::new(HashMap::new())),
            concurrency: config.concurrency.max(1),
        }
    }

    /// Process a batch of files for one organization. Reports come back in
    /// submission order regardless of completion order.
    pub async fn run(
        &self,
        organization_id: &str,
        files: Vec<IngestFile>,
        cancel: CancellationToken,
    ) -> Vec<FileReport> {
        let names: Vec<String> = files.iter().map(|f| f.name.clone()).collect();
        let mut reports: Vec<Option<FileReport>> = names.iter().map(|_| None).collect();
        let mut tasks: JoinSet<(usize, FileReport)> = JoinSet::new();

        for (index, file) in files.into_iter().enumerate() {
            while tasks.len() >= self.concurrency {
                collect_one(&mut tasks, &mut reports).await;
            }

            let store = self.store.clone();
            let extractor = self.extractor.clone();
            let org_locks = self.org_locks.clone();
            let organization_id = organization_id.to_string();
            let cancel = cancel.clone();

            tasks.spawn(async move {
                let file_name = file.name.clone();
                let report = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        FileReport::empty(file_name, FileStatus::Cancelled)
                    }
                    report = process_file(store, extractor, org_locks, organization_id, file) => report,
                };
                (index, report)
            });
        }

        while !tasks.is_empty() {
            collect_one(&mut tasks, &mut reports).await;
        }

        reports
            .into_iter()
            .zip(names)
            .map(|(report, name)| {
                report.unwrap_or_else(|| {
                    FileReport {
                        error: Some("ingestion task aborted".to_string()),
                        ..FileReport::empty(name, FileStatus::Failed)
                    }
                })
            })
            .collect()
    }
}

async fn collect_one(
    tasks: &mut JoinSet<(usize, FileReport)>,
    reports: &mut [Option<FileReport>],
) {
    match tasks.join_next().await {
        Some(Ok((index, report))) => reports[index] = Some(report),
        Some(Err(e)) => warn!(error = %e, "ingestion task panicked"),
        None => {}
    }
}

async fn process_file(
    store: Arc<Mutex<SecurityStore>>,
    extractor: Arc<dyn Extractor>,
    org_locks: OrgLocks,
    organization_id: String,
    file: IngestFile,
) -> FileReport {
    let file_name = file.name.clone();
    match ingest_file(store, extractor, org_locks, &organization_id, file).await {
        Ok(report) => {
            info!(
                file = %report.file_name,
                assets = report.assets_created,
                vulnerabilities = report.vulnerabilities_created,
                findings = report.findings_created,
                "file ingested"
            );
            report
        }
        Err(e) => {
            warn!(file = %file_name, error = %e, "file ingestion failed");
            FileReport::failed(file_name, &e)
        }
    }
}

async fn ingest_file(
    store: Arc<Mutex<SecurityStore>>,
    extractor: Arc<dyn Extractor>,
    org_locks: OrgLocks,
    organization_id: &str,
    file: IngestFile,
) -> Result<FileReport, IngestError> {
    let format = detect_format(&file.name, &file.bytes)?;
    let now = now_unix();
    let mut report = FileReport::empty(file.name.clone(), FileStatus::Completed);

    match format {
        FileFormat::NmapXml => {
            let content = String::from_utf8_lossy(&file.bytes).into_owned();
            let drafts = decode_nmap_xml(&content)?;
            let _org = lock_org(&org_locks, organization_id).await;
            let store = store.lock().await;
            let created =
                commit_asset_drafts(&store, organization_id, drafts, DraftOrigin::Structured, now)?;
            report.assets_created = created.len();
        }
        FileFormat::NessusXml | FileFormat::NessusNative | FileFormat::OpenVasXml => {
            let content = String::from_utf8_lossy(&file.bytes).into_owned();
            let _org = lock_org(&org_locks, organization_id).await;
            let store = store.lock().await;
            let assets = store.assets_for_org(organization_id)?;
            let decoded = if format == FileFormat::OpenVasXml {
                decode_openvas(&content, &assets)?
            } else {
                decode_nessus(&content, &assets)?
            };
            report.dropped_items = decoded.dropped_unmatched;
            report.vulnerabilities_created = commit_resolved_vulns(&store, decoded.resolved, now)?;
        }
        FileFormat::AiExtractable(kind) => {
            let extension = file_extension(&file.name);
            let request = ExtractionRequest::from_bytes(kind, &extension, &file.bytes);
            // The extraction call happens before any lock or write: a
            // failure here must leave zero rows behind for this file.
            let payload = extractor.extract(request).await?;
            report.confidence = Some(payload.summary.confidence);

            let _org = lock_org(&org_locks, organization_id).await;
            let store = store.lock().await;
            let created = commit_asset_drafts(
                &store,
                organization_id,
                payload.assets,
                DraftOrigin::Extracted,
                now,
            )?;
            report.assets_created = created.len();
            let (vulns, dropped) =
                commit_extracted_vulns(&store, organization_id, payload.vulnerabilities, now)?;
            report.vulnerabilities_created = vulns;
            report.dropped_items = dropped;
            report.findings_created =
                commit_finding_drafts(&store, organization_id, payload.pentest_findings, now)?;
        }
    }

    Ok(report)
}

async fn lock_org(locks: &OrgLocks, organization_id: &str) -> OwnedMutexGuard<()> {
    let lock = {
        let mut map = locks.lock().await;
        map.entry(organization_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    };
    lock.lock_owned().await
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use posture_extract::ExtractError;
    use posture_types::ExtractionPayload;

    struct StubExtractor {
        payload: ExtractionPayload,
    }

    #[async_trait]
    impl Extractor for StubExtractor {
        async fn extract(
            &self,
            _request: ExtractionRequest,
        ) -> Result<ExtractionPayload, ExtractError> {
            Ok(self.payload.clone())
        }
    }

    struct FailingExtractor;

    #[async_trait]
    impl Extractor for FailingExtractor {
        async fn extract(
            &self,
            _request: ExtractionRequest,
        ) -> Result<ExtractionPayload, ExtractError> {
            Err(ExtractError::Service {
                status: 504,
                message: "upstream timeout".into(),
            })
        }
    }

    fn new_pipeline(extractor: Arc<dyn Extractor>) -> (IngestPipeline, Arc<Mutex<SecurityStore>>, String) {
        let store = SecurityStore::open_in_memory().unwrap();
        let org = store.create_organization("Acme", 0).unwrap();
        let store = Arc::new(Mutex::new(store));
        let pipeline = IngestPipeline::new(store.clone(), extractor, PipelineConfig::default());
        (pipeline, store, org.id)
    }

    const NMAP: &str = r#"<nmaprun><host>
        <address addr="10.0.0.5" addrtype="ipv4"/>
        <hostnames><hostname name="web01"/></hostnames>
        <ports><port protocol="tcp" portid="80"><state state="open"/><service name="http"/></port></ports>
        </host></nmaprun>"#;

    const NESSUS: &str = r#"<NessusClientData_v2><Report><ReportHost name="10.0.0.5">
        <ReportItem pluginID="11213" severity="2" pluginName="HTTP TRACE Enabled"/>
        </ReportHost></Report></NessusClientData_v2>"#;

    fn file(name: &str, content: &str) -> IngestFile {
        IngestFile {
            name: name.into(),
            bytes: content.as_bytes().to_vec(),
        }
    }

    #[tokio::test]
    async fn structured_flow_links_vulns_to_scanned_assets() {
        let (pipeline, store, org) = new_pipeline(Arc::new(FailingExtractor));
        let cancel = CancellationToken::new();

        let reports = pipeline
            .run(&org, vec![file("scan.xml", NMAP)], cancel.clone())
            .await;
        assert_eq!(reports[0].status, FileStatus::Completed);
        assert_eq!(reports[0].assets_created, 1);

        let reports = pipeline
            .run(&org, vec![file("vulns.nessus", NESSUS)], cancel)
            .await;
        assert_eq!(reports[0].status, FileStatus::Completed);
        assert_eq!(reports[0].vulnerabilities_created, 1);

        let store = store.lock().await;
        assert_eq!(store.vulnerabilities_for_org(&org).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn extraction_failure_commits_nothing_for_that_file() {
        let (pipeline, store, org) = new_pipeline(Arc::new(FailingExtractor));

        let reports = pipeline
            .run(
                &org,
                vec![file("report.docx", "binary junk")],
                CancellationToken::new(),
            )
            .await;

        assert_eq!(reports[0].status, FileStatus::Failed);
        let error = reports[0].error.as_deref().unwrap();
        assert!(error.contains("extraction failed"), "{error}");

        let store = store.lock().await;
        assert!(store.assets_for_org(&org).unwrap().is_empty());
        assert!(store.vulnerabilities_for_org(&org).unwrap().is_empty());
    }

    #[tokio::test]
    async fn ai_file_routes_through_extractor_and_reports_confidence() {
        let payload: ExtractionPayload = serde_json::from_value(serde_json::json!({
            "assets": [{"name": "crm-app", "type": "Application", "ip_address": "10.1.1.1"}],
            "vulnerabilities": [{"title": "Outdated framework", "severity": "High", "component": "crm"}],
            "pentestFindings": [{"title": "Phishing success", "severity": "Medium"}],
            "summary": {"confidence": 72}
        }))
        .unwrap();
        let (pipeline, store, org) = new_pipeline(Arc::new(StubExtractor { payload }));

        let reports = pipeline
            .run(
                &org,
                vec![file("assessment.pdf", "%PDF-1.7 ...")],
                CancellationToken::new(),
            )
            .await;

        let report = &reports[0];
        assert_eq!(report.status, FileStatus::Completed);
        assert_eq!(report.assets_created, 1);
        assert_eq!(report.vulnerabilities_created, 1);
        assert_eq!(report.findings_created, 1);
        assert_eq!(report.confidence, Some(72.0));

        let store = store.lock().await;
        assert_eq!(store.pentest_findings_for_org(&org).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn bad_file_does_not_abort_siblings() {
        let (pipeline, _store, org) = new_pipeline(Arc::new(FailingExtractor));

        let reports = pipeline
            .run(
                &org,
                vec![file("malware.exe", "MZ"), file("scan.xml", NMAP)],
                CancellationToken::new(),
            )
            .await;

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].status, FileStatus::Failed);
        assert!(reports[0]
            .error
            .as_deref()
            .unwrap()
            .contains("unsupported file format"));
        assert_eq!(reports[1].status, FileStatus::Completed);
        assert_eq!(reports[1].assets_created, 1);
    }

    #[tokio::test]
    async fn cancelled_batch_reports_cancellation() {
        let (pipeline, store, org) = new_pipeline(Arc::new(FailingExtractor));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let reports = pipeline
            .run(&org, vec![file("scan.xml", NMAP)], cancel)
            .await;
        assert_eq!(reports[0].status, FileStatus::Cancelled);

        let store = store.lock().await;
        assert!(store.assets_for_org(&org).unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_xml_is_a_per_file_failure() {
        let (pipeline, _store, org) = new_pipeline(Arc::new(FailingExtractor));
        let reports = pipeline
            .run(
                &org,
                vec![file("broken.xml", "<nmaprun><host><address addr=")],
                CancellationToken::new(),
            )
            .await;
        assert_eq!(reports[0].status, FileStatus::Failed);
        assert!(reports[0].error.as_deref().unwrap().contains("malformed"));
    }
}
