//! Local batch command transport: write the script to scratch and run the cluster's
//! submission tool (`sbatch` by default) as a subprocess.

use hpc_types::{validate_identifier, JobRequest, JobTransport, NativeJobState, TransportError};
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

/// Placeholder substituted with the job id in the status command.
const JOB_ID_PLACEHOLDER: &str = "{job_id}";

#[derive(Debug, Clone)]
pub struct LocalCommandConfig {
    /// Program and leading arguments; the script path is appended.
    pub submit_command: Vec<String>,
    /// Program and arguments printing the native state of `{job_id}`. `None` disables polling.
    pub status_command: Option<Vec<String>>,
    /// Where rendered scripts are written before submission.
    pub scratch_dir: PathBuf,
    /// Upper bound for every subprocess.
    pub timeout: Duration,
}

impl Default for LocalCommandConfig {
    fn default() -> Self {
        Self {
            submit_command: vec!["sbatch".to_string()],
            status_command: Some(
                ["squeue", "-h", "-o", "%T", "-j", JOB_ID_PLACEHOLDER]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            ),
            scratch_dir: std::env::temp_dir().join("hpc-jobs"),
            timeout: Duration::from_secs(30),
        }
    }
}

pub struct LocalCommandTransport {
    config: LocalCommandConfig,
}

impl LocalCommandTransport {
    pub fn new(config: LocalCommandConfig) -> Self {
        Self { config }
    }

    pub fn script_path(&self, task_id: &str) -> PathBuf {
        self.config.scratch_dir.join(format!("bio_{}.sh", task_id))
    }

    async fn write_script(&self, path: &Path, script: &str) -> std::io::Result<()> {
        hpc_types::write_atomic(path, script.as_bytes()).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await?;
        }
        Ok(())
    }

    async fn run(&self, argv: &[String]) -> Result<Output, String> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| "empty command".to_string())?;
        let mut cmd = Command::new(program);
        cmd.args(args).kill_on_drop(true);
        match tokio::time::timeout(self.config.timeout, cmd.output()).await {
            Ok(Ok(out)) => Ok(out),
            Ok(Err(e)) => Err(format!("failed to run {}: {}", program, e)),
            Err(_) => Err(format!(
                "{} timed out after {}s",
                program,
                self.config.timeout.as_secs()
            )),
        }
    }
}

/// Job id from the submission tool's output: last whitespace token of the first
/// non-empty line (`Submitted batch job 12345` -> `12345`).
pub fn parse_job_id(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .and_then(|l| l.split_whitespace().last())
        .map(String::from)
}

#[async_trait::async_trait]
impl JobTransport for LocalCommandTransport {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn submit(&self, job: &JobRequest) -> Result<String, TransportError> {
        validate_identifier("task_id", &job.task_id)
            .map_err(|e| TransportError::Submission(e.to_string()))?;
        let script_path = self.script_path(&job.task_id);
        self.write_script(&script_path, &job.script)
            .await
            .map_err(|e| {
                TransportError::Submission(format!(
                    "cannot write script {}: {}",
                    script_path.display(),
                    e
                ))
            })?;

        let mut argv = self.config.submit_command.clone();
        argv.push(script_path.to_string_lossy().into_owned());
        let out = self.run(&argv).await.map_err(TransportError::Submission)?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
            tracing::error!(task_id = %job.task_id, code = ?out.status.code(), stderr = %stderr, "submission command failed");
            return Err(TransportError::Submission(format!(
                "{} exited with {}: {}",
                argv[0], out.status, stderr
            )));
        }
        let stdout = String::from_utf8_lossy(&out.stdout);
        let job_id = parse_job_id(&stdout).ok_or_else(|| {
            TransportError::Submission(format!("no job id in output of {}", argv[0]))
        })?;
        tracing::info!(task_id = %job.task_id, job_id = %job_id, script = %script_path.display(), "job submitted via local command");
        Ok(job_id)
    }

    async fn query(&self, job_id: &str) -> Result<Option<NativeJobState>, TransportError> {
        let Some(template) = &self.config.status_command else {
            return Ok(None);
        };
        // `sbatch --parsable` prints `12345;cluster`; squeue only takes the numeric part.
        let native_id = job_id.split(';').next().unwrap_or(job_id);
        let argv: Vec<String> = template
            .iter()
            .map(|a| a.replace(JOB_ID_PLACEHOLDER, native_id))
            .collect();
        let out = self.run(&argv).await.map_err(TransportError::StatusQuery)?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
            // squeue forgets jobs shortly after they finish.
            if stderr.contains("Invalid job id") {
                return Ok(None);
            }
            return Err(TransportError::StatusQuery(format!(
                "{} exited with {}: {}",
                argv[0], out.status, stderr
            )));
        }
        let stdout = String::from_utf8_lossy(&out.stdout);
        Ok(stdout
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(|status| NativeJobState {
                status: status.to_string(),
                error: None,
            }))
    }
}
