//! Scheduler client: submit through a transport, record the mapping, reconcile status.

use crate::script::JobScriptGenerator;
use crate::Scheduler;
use async_trait::async_trait;
use hpc_types::{
    JobStatus, JobTransport, MappingStore, NativeJobState, ProgressRecord, ProgressState,
    ProgressStore, SchedulerError, TaskSpec, TaskStatusReport,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex};

pub const DEFAULT_RESULT_URL_PREFIX: &str = "/api/v1/analysis/result";

pub struct SchedulerClient {
    scripts: JobScriptGenerator,
    transport: Arc<dyn JobTransport>,
    mappings: Arc<dyn MappingStore>,
    progress: Arc<dyn ProgressStore>,
    result_url_prefix: String,
    in_flight: StdMutex<HashSet<String>>,
}

impl SchedulerClient {
    pub fn new(
        scripts: JobScriptGenerator,
        transport: Arc<dyn JobTransport>,
        mappings: Arc<dyn MappingStore>,
        progress: Arc<dyn ProgressStore>,
    ) -> Self {
        Self {
            scripts,
            transport,
            mappings,
            progress,
            result_url_prefix: DEFAULT_RESULT_URL_PREFIX.to_string(),
            in_flight: StdMutex::new(HashSet::new()),
        }
    }

    pub fn with_result_url_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.result_url_prefix = prefix.into();
        self
    }

    pub fn scripts(&self) -> &JobScriptGenerator {
        &self.scripts
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    fn result_reference(&self, task_id: &str) -> String {
        format!("{}/{}", self.result_url_prefix.trim_end_matches('/'), task_id)
    }

    /// Status poll that surfaces every failure as a typed error. An unmapped task is
    /// still a normal report (`unknown`, `task_not_found`).
    pub async fn query_status(&self, task_id: &str) -> Result<TaskStatusReport, SchedulerError> {
        let Some(job_id) = self.mappings.get(task_id).await? else {
            return Ok(TaskStatusReport::not_found(task_id));
        };
        let native = self.transport.query(&job_id).await?;
        let record = self.progress.read(task_id).await?;
        let (status, progress, error) = reconcile(native.as_ref(), record.as_ref());
        tracing::debug!(
            task_id = %task_id,
            job_id = %job_id,
            native = ?native.as_ref().map(|n| n.status.as_str()),
            status = %status,
            progress,
            "status reconciled"
        );
        Ok(TaskStatusReport {
            task_id: task_id.to_string(),
            status,
            progress,
            result_reference: (status == JobStatus::Completed)
                .then(|| self.result_reference(task_id)),
            error,
            error_kind: None,
        })
    }

    /// Reserve `task_id` for one submission at a time. The mapping check, the remote
    /// submit and the mapping write all happen under the claim.
    fn claim(&self, task_id: &str) -> Option<SubmitClaim<'_>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !in_flight.insert(task_id.to_string()) {
            return None;
        }
        Some(SubmitClaim {
            in_flight: &self.in_flight,
            task_id: task_id.to_string(),
        })
    }

    async fn last_known_progress(&self, task_id: &str) -> f64 {
        match self.progress.read(task_id).await {
            Ok(Some(record)) => record.progress,
            _ => 0.0,
        }
    }
}

/// Combine the scheduler's view with the worker's progress record.
///
/// The record is the only source of progress. Scheduler failure/cancellation wins
/// over the record; a terminal record wins over every other scheduler state. A native
/// state outside the table stays `Unknown` even when the worker has reported progress.
/// The scheduler's error text is preferred, the record's is the fallback.
pub(crate) fn reconcile(
    native: Option<&NativeJobState>,
    record: Option<&ProgressRecord>,
) -> (JobStatus, f64, Option<String>) {
    let scheduler = native.map(NativeJobState::normalized);
    let record_progress = record.map(|r| r.progress).unwrap_or(0.0);
    let error = native
        .and_then(|n| n.error.clone())
        .or_else(|| record.and_then(|r| r.error.clone()));

    if let Some(s @ (JobStatus::Failed | JobStatus::Cancelled)) = scheduler {
        return (s, record_progress, error);
    }
    match record.map(|r| r.status) {
        Some(ProgressState::Completed) => return (JobStatus::Completed, 1.0, error),
        Some(ProgressState::Failed) => return (JobStatus::Failed, record_progress, error),
        _ => {}
    }
    let status = match (scheduler, record) {
        (Some(JobStatus::Completed), _) => return (JobStatus::Completed, 1.0, error),
        (Some(JobStatus::Running), _) => JobStatus::Running,
        (Some(JobStatus::Pending), None) => JobStatus::Pending,
        // The worker only writes once the job has started.
        (Some(JobStatus::Pending), Some(_)) => JobStatus::Running,
        (Some(_), _) => JobStatus::Unknown,
        // No live view: the record is all we have.
        (None, Some(_)) => JobStatus::Running,
        (None, None) => JobStatus::Unknown,
    };
    (status, record_progress, error)
}

/// Marks a task id as being submitted; released on drop.
struct SubmitClaim<'a> {
    in_flight: &'a StdMutex<HashSet<String>>,
    task_id: String,
}

impl Drop for SubmitClaim<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.task_id);
    }
}

#[async_trait]
impl Scheduler for SchedulerClient {
    async fn submit(&self, task: &TaskSpec) -> Result<String, SchedulerError> {
        let job = self.scripts.job_request(task)?;
        let _claim = self
            .claim(&task.task_id)
            .ok_or_else(|| SchedulerError::InProgress(task.task_id.clone()))?;
        if let Some(job_id) = self.mappings.get(&task.task_id).await? {
            return Err(SchedulerError::AlreadySubmitted {
                task_id: task.task_id.clone(),
                job_id,
            });
        }
        let job_id = self.transport.submit(&job).await.map_err(|e| {
            tracing::error!(task_id = %task.task_id, transport = self.transport.name(), error = %e, "job submission failed");
            SchedulerError::from(e)
        })?;
        if let Err(e) = self.mappings.put(&task.task_id, &job_id).await {
            tracing::error!(
                task_id = %task.task_id,
                job_id = %job_id,
                error = %e,
                "job submitted but mapping not persisted; job is orphaned"
            );
            return Err(e.into());
        }
        tracing::info!(
            task_id = %task.task_id,
            job_id = %job_id,
            user = %task.user,
            transport = self.transport.name(),
            "analysis job submitted"
        );
        Ok(job_id)
    }

    async fn get_status(&self, task_id: &str) -> TaskStatusReport {
        match self.query_status(task_id).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(task_id = %task_id, error = %e, "status query degraded");
                let progress = self.last_known_progress(task_id).await;
                TaskStatusReport::degraded(task_id, e.kind(), e.to_string(), progress)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::ScriptConfig;
    use hpc_mapping::InMemoryMappingStore;
    use hpc_progress::{InMemoryProgressStore, ProgressReporter};
    use hpc_transport::MockTransport;
    use hpc_types::{ErrorKind, JobRequest, MappingStoreError, TransportError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use serde_json::json;

    struct Fixture {
        transport: Arc<MockTransport>,
        mappings: Arc<InMemoryMappingStore>,
        progress: Arc<InMemoryProgressStore>,
        client: SchedulerClient,
    }

    fn fixture() -> Fixture {
        let transport = Arc::new(MockTransport::new());
        let mappings = Arc::new(InMemoryMappingStore::new());
        let progress = Arc::new(InMemoryProgressStore::new());
        let client = SchedulerClient::new(
            JobScriptGenerator::new(ScriptConfig::default()),
            transport.clone(),
            mappings.clone(),
            progress.clone(),
        );
        Fixture {
            transport,
            mappings,
            progress,
            client,
        }
    }

    fn task(task_id: &str) -> TaskSpec {
        TaskSpec::new(task_id, "alice", json!({"analysis_type": "single_cell"}), "d1")
    }

    fn native(status: &str, error: Option<&str>) -> NativeJobState {
        NativeJobState {
            status: status.to_string(),
            error: error.map(String::from),
        }
    }

    fn record(progress: f64, status: ProgressState) -> ProgressRecord {
        ProgressRecord::new("t1", progress, status, 1_700_000_000.0)
    }

    #[tokio::test]
    async fn submit_records_mapping_before_returning() {
        let f = fixture();
        let job_id = f.client.submit(&task("t1")).await.unwrap();
        assert_eq!(job_id, "1000");
        assert_eq!(
            f.mappings.get("t1").await.unwrap().as_deref(),
            Some("1000")
        );
        let report = f.client.get_status("t1").await;
        assert_ne!(report.status, JobStatus::Unknown);
        assert_eq!(report.status, JobStatus::Pending);
        let submitted = f.transport.submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].name, "bio_analysis_t1");
        assert!(submitted[0].script.contains("--task_id t1"));
    }

    #[tokio::test]
    async fn unrecognized_native_state_is_unknown_without_result() {
        let f = fixture();
        f.client.submit(&task("t1")).await.unwrap();
        f.transport.set_status("WEIRD_STATE", None);
        let report = f.client.get_status("t1").await;
        assert_eq!(report.status, JobStatus::Unknown);
        assert_eq!(report.progress, 0.0);
        assert!(report.result_reference.is_none());
        assert!(report.error.is_none());
    }

    #[tokio::test]
    async fn unrecognized_native_state_stays_unknown_after_worker_start() {
        let f = fixture();
        f.client.submit(&task("t1")).await.unwrap();
        let reporter = ProgressReporter::new(f.progress.clone(), "t1");
        reporter.start().await.unwrap();
        for state in ["WEIRD_STATE", "TIMEOUT", "NODE_FAIL", "OUT_OF_MEMORY"] {
            f.transport.set_status(state, None);
            let report = f.client.get_status("t1").await;
            assert_eq!(report.status, JobStatus::Unknown, "native {}", state);
            assert_eq!(report.progress, 0.0);
            assert!(report.result_reference.is_none());
        }
    }

    #[tokio::test]
    async fn scheduler_error_text_is_forwarded_for_live_jobs() {
        let f = fixture();
        f.client.submit(&task("t1")).await.unwrap();
        f.transport.set_status("RUNNING", Some("node gpu07 degraded"));
        let report = f.client.get_status("t1").await;
        assert_eq!(report.status, JobStatus::Running);
        assert_eq!(report.error.as_deref(), Some("node gpu07 degraded"));
        assert!(report.error_kind.is_none());
    }

    struct SlowTransport {
        submissions: AtomicUsize,
    }

    #[async_trait]
    impl JobTransport for SlowTransport {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn submit(&self, _job: &JobRequest) -> Result<String, TransportError> {
            let n = self.submissions.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            Ok(format!("job-{}", n))
        }

        async fn query(&self, _job_id: &str) -> Result<Option<NativeJobState>, TransportError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn concurrent_submissions_of_one_task_create_one_job() {
        let transport = Arc::new(SlowTransport {
            submissions: AtomicUsize::new(0),
        });
        let mappings = Arc::new(InMemoryMappingStore::new());
        let client = SchedulerClient::new(
            JobScriptGenerator::new(ScriptConfig::default()),
            transport.clone(),
            mappings.clone(),
            Arc::new(InMemoryProgressStore::new()),
        );
        let t = task("t1");
        let (a, b) = tokio::join!(client.submit(&t), client.submit(&t));

        let (ok, err) = match (a, b) {
            (Ok(id), Err(e)) | (Err(e), Ok(id)) => (id, e),
            other => panic!("expected exactly one success, got {:?}", other),
        };
        assert_eq!(err.kind(), ErrorKind::AlreadySubmitted);
        assert_eq!(transport.submissions.load(Ordering::SeqCst), 1);
        assert_eq!(mappings.get("t1").await.unwrap(), Some(ok));

        // The claim is released once the submission finishes.
        assert!(matches!(
            client.submit(&t).await,
            Err(SchedulerError::AlreadySubmitted { .. })
        ));
    }

    #[tokio::test]
    async fn unmapped_task_is_unknown_and_never_queries() {
        let f = fixture();
        let report = f.client.get_status("nonexistent").await;
        assert_eq!(report.status, JobStatus::Unknown);
        assert_eq!(report.progress, 0.0);
        assert!(report.error.as_deref().is_some_and(|e| !e.is_empty()));
        assert_eq!(report.error_kind, Some(ErrorKind::TaskNotFound));
        assert_eq!(f.transport.query_count(), 0);
    }

    #[tokio::test]
    async fn completed_job_carries_result_reference() {
        let f = fixture();
        f.client.submit(&task("t1")).await.unwrap();
        f.transport.set_status("COMPLETED", None);
        let report = f.client.get_status("t1").await;
        assert_eq!(report.status, JobStatus::Completed);
        assert_eq!(report.progress, 1.0);
        assert_eq!(
            report.result_reference.as_deref(),
            Some("/api/v1/analysis/result/t1")
        );

        let f = fixture();
        let client = f.client.with_result_url_prefix("https://portal.example/results/");
        client.submit(&task("t2")).await.unwrap();
        f.transport.set_status("COMPLETED", None);
        assert_eq!(
            client.get_status("t2").await.result_reference.as_deref(),
            Some("https://portal.example/results/t2")
        );
    }

    #[tokio::test]
    async fn running_progress_comes_from_worker_record() {
        let f = fixture();
        f.client.submit(&task("t1")).await.unwrap();
        f.transport.set_status("RUNNING", None);
        assert_eq!(f.client.get_status("t1").await.progress, 0.0);

        let reporter = ProgressReporter::new(f.progress.clone(), "t1");
        reporter.start().await.unwrap();
        reporter.advance(0.4).await.unwrap();
        let report = f.client.get_status("t1").await;
        assert_eq!(report.status, JobStatus::Running);
        assert_eq!(report.progress, 0.4);
        assert!(report.result_reference.is_none());
    }

    #[tokio::test]
    async fn worker_failure_is_reported_after_job_leaves_queue() {
        let f = fixture();
        f.client.submit(&task("t1")).await.unwrap();
        let reporter = ProgressReporter::new(f.progress.clone(), "t1");
        reporter.start().await.unwrap();
        reporter.advance(0.3).await.unwrap();
        reporter.fail("clustering diverged").await.unwrap();
        f.transport.set_no_view();
        let report = f.client.get_status("t1").await;
        assert_eq!(report.status, JobStatus::Failed);
        assert_eq!(report.progress, 0.3);
        assert_eq!(report.error.as_deref(), Some("clustering diverged"));
    }

    #[tokio::test]
    async fn authentication_failure_is_degraded_with_last_progress() {
        let f = fixture();
        f.client.submit(&task("t1")).await.unwrap();
        let reporter = ProgressReporter::new(f.progress.clone(), "t1");
        reporter.advance(0.25).await.unwrap();
        f.transport.fail_authentication(true);
        let report = f.client.get_status("t1").await;
        assert_eq!(report.status, JobStatus::Error);
        assert_eq!(report.error_kind, Some(ErrorKind::Authentication));
        assert_eq!(report.progress, 0.25);
        assert!(report.error.is_some());

        f.transport.fail_authentication(false);
        f.transport.fail_queries(true);
        let report = f.client.get_status("t1").await;
        assert_eq!(report.error_kind, Some(ErrorKind::StatusQuery));
        assert!(matches!(
            f.client.query_status("t1").await,
            Err(SchedulerError::StatusQuery(_))
        ));
    }

    #[tokio::test]
    async fn submission_failures_are_typed_and_leave_no_mapping() {
        let f = fixture();
        f.transport.fail_authentication(true);
        assert!(matches!(
            f.client.submit(&task("t1")).await,
            Err(SchedulerError::Authentication(_))
        ));
        f.transport.fail_authentication(false);
        f.transport.fail_submissions(true);
        assert!(matches!(
            f.client.submit(&task("t1")).await,
            Err(SchedulerError::Submission(_))
        ));
        assert_eq!(f.mappings.len().await, 0);
    }

    #[tokio::test]
    async fn invalid_task_is_rejected_before_submission() {
        let f = fixture();
        let mut t = task("t1");
        t.user = "../etc".to_string();
        assert!(matches!(
            f.client.submit(&t).await,
            Err(SchedulerError::Validation(_))
        ));
        assert!(f.transport.submitted().is_empty());
    }

    #[tokio::test]
    async fn second_submission_of_a_task_is_refused() {
        let f = fixture();
        f.client.submit(&task("t1")).await.unwrap();
        let err = f.client.submit(&task("t1")).await.unwrap_err();
        assert!(
            matches!(&err, SchedulerError::AlreadySubmitted { job_id, .. } if job_id == "1000")
        );
        assert_eq!(err.kind(), ErrorKind::AlreadySubmitted);
        assert_eq!(f.transport.submitted().len(), 1);
    }

    struct BrokenMappings;

    #[async_trait]
    impl MappingStore for BrokenMappings {
        async fn put(&self, _task_id: &str, _job_id: &str) -> Result<(), MappingStoreError> {
            Err(MappingStoreError::Other("disk full".to_string()))
        }

        async fn get(&self, _task_id: &str) -> Result<Option<String>, MappingStoreError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn mapping_failure_after_remote_success_is_reported() {
        let transport = Arc::new(MockTransport::new());
        let client = SchedulerClient::new(
            JobScriptGenerator::new(ScriptConfig::default()),
            transport.clone(),
            Arc::new(BrokenMappings),
            Arc::new(InMemoryProgressStore::new()),
        );
        let err = client.submit(&task("t1")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MappingPersistence);
        assert_eq!(transport.submitted().len(), 1);
    }

    #[test]
    fn reconcile_rules() {
        let running = record(0.6, ProgressState::Running);
        let done = record(1.0, ProgressState::Completed);
        let failed = record(0.2, ProgressState::Failed).with_error("oom");

        let cases: Vec<(Option<NativeJobState>, Option<&ProgressRecord>, JobStatus, f64)> = vec![
            (Some(native("PENDING", None)), None, JobStatus::Pending, 0.0),
            (Some(native("PENDING", None)), Some(&running), JobStatus::Running, 0.6),
            (Some(native("RUNNING", None)), None, JobStatus::Running, 0.0),
            (Some(native("RUNNING", None)), Some(&done), JobStatus::Completed, 1.0),
            (Some(native("RUNNING", None)), Some(&failed), JobStatus::Failed, 0.2),
            (Some(native("COMPLETED", None)), None, JobStatus::Completed, 1.0),
            (Some(native("COMPLETED", None)), Some(&running), JobStatus::Completed, 1.0),
            (Some(native("CANCELLED by 42", None)), Some(&running), JobStatus::Cancelled, 0.6),
            (Some(native("FAILED", None)), Some(&done), JobStatus::Failed, 1.0),
            (None, None, JobStatus::Unknown, 0.0),
            (None, Some(&running), JobStatus::Running, 0.6),
            (None, Some(&done), JobStatus::Completed, 1.0),
            (Some(native("WEIRD_STATE", None)), Some(&running), JobStatus::Unknown, 0.6),
            (Some(native("NODE_FAIL", None)), Some(&running), JobStatus::Unknown, 0.6),
            (Some(native("TIMEOUT", None)), None, JobStatus::Unknown, 0.0),
        ];
        for (n, r, status, progress) in cases {
            let got = reconcile(n.as_ref(), r);
            assert_eq!((got.0, got.1), (status, progress), "native={:?} record={:?}", n, r);
        }
    }

    #[test]
    fn scheduler_error_takes_precedence_over_record_error() {
        let failed = record(0.2, ProgressState::Failed).with_error("oom");
        let (_, _, error) = reconcile(Some(&native("FAILED", Some("node lost"))), Some(&failed));
        assert_eq!(error.as_deref(), Some("node lost"));
        let (_, _, error) = reconcile(Some(&native("FAILED", None)), Some(&failed));
        assert_eq!(error.as_deref(), Some("oom"));
        let (status, _, error) =
            reconcile(Some(&native("COMPLETED", Some("exited with warnings"))), None);
        assert_eq!(status, JobStatus::Completed);
        assert_eq!(error.as_deref(), Some("exited with warnings"));
    }
}
