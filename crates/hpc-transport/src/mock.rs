//! Scripted transport for tests: no network, no subprocesses.

use hpc_types::{JobRequest, JobTransport, NativeJobState, TransportError};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Transport whose submissions succeed with sequential job ids and whose status
/// answers are set by the test.
pub struct MockTransport {
    next_id: AtomicU64,
    state: Mutex<Option<NativeJobState>>,
    fail_submit: AtomicBool,
    fail_auth: AtomicBool,
    fail_query: AtomicBool,
    queries: AtomicUsize,
    submitted: Mutex<Vec<JobRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1000),
            state: Mutex::new(Some(NativeJobState {
                status: "PENDING".to_string(),
                error: None,
            })),
            fail_submit: AtomicBool::new(false),
            fail_auth: AtomicBool::new(false),
            fail_query: AtomicBool::new(false),
            queries: AtomicUsize::new(0),
            submitted: Mutex::new(Vec::new()),
        }
    }

    /// Native status returned by subsequent queries.
    pub fn set_status(&self, status: &str, error: Option<&str>) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = Some(NativeJobState {
            status: status.to_string(),
            error: error.map(String::from),
        });
    }

    /// Subsequent queries report no live view of the job.
    pub fn set_no_view(&self) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn fail_submissions(&self, fail: bool) {
        self.fail_submit.store(fail, Ordering::SeqCst);
    }

    pub fn fail_authentication(&self, fail: bool) {
        self.fail_auth.store(fail, Ordering::SeqCst);
    }

    pub fn fail_queries(&self, fail: bool) {
        self.fail_query.store(fail, Ordering::SeqCst);
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn submitted(&self) -> Vec<JobRequest> {
        self.submitted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl JobTransport for MockTransport {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn submit(&self, job: &JobRequest) -> Result<String, TransportError> {
        if self.fail_auth.load(Ordering::SeqCst) {
            return Err(TransportError::Authentication("mock login rejected".to_string()));
        }
        if self.fail_submit.load(Ordering::SeqCst) {
            return Err(TransportError::Submission("mock queue rejected job".to_string()));
        }
        self.submitted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(job.clone());
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst).to_string())
    }

    async fn query(&self, _job_id: &str) -> Result<Option<NativeJobState>, TransportError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_auth.load(Ordering::SeqCst) {
            return Err(TransportError::Authentication("mock login rejected".to_string()));
        }
        if self.fail_query.load(Ordering::SeqCst) {
            return Err(TransportError::StatusQuery("mock scheduler timed out".to_string()));
        }
        Ok(self.state.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }
}
