//! Batch script rendering. Pure templating: the directory creation and plan file write
//! happen inside the generated script, never here.

use hpc_types::{validate_identifier, JobRequest, ResourceRequest, TaskSpec, ValidationError};
use std::fmt::Write as _;

/// Heredoc terminator for the plan file. Pretty-printed JSON never has a bare
/// identifier on its own line, so it cannot collide with plan content.
const PLAN_EOF: &str = "ANALYSIS_PLAN_EOF";

#[derive(Debug, Clone)]
pub struct ScriptConfig {
    /// Queue / partition jobs are submitted to.
    pub queue: String,
    pub resources: ResourceRequest,
    /// Inputs live at `{data_root}/{user}/{data_id}`.
    pub data_root: String,
    /// Outputs go to `{result_root}/{user}/{task_id}`.
    pub result_root: String,
    /// Directory for the scheduler's stdout/stderr files.
    pub log_dir: String,
    pub conda_activate: String,
    /// Conda environment to activate before the worker runs; `None` skips activation.
    pub conda_env: Option<String>,
    /// Analysis entry point; receives the four worker arguments.
    pub worker_command: String,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            queue: "gpu".to_string(),
            resources: ResourceRequest::default(),
            data_root: "/data".to_string(),
            result_root: "/results".to_string(),
            log_dir: "logs".to_string(),
            conda_activate: "/opt/conda/bin/activate".to_string(),
            conda_env: Some("bio-llm".to_string()),
            worker_command: "python /app/analysis/run_analysis.py".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobScriptGenerator {
    config: ScriptConfig,
}

impl JobScriptGenerator {
    pub fn new(config: ScriptConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScriptConfig {
        &self.config
    }

    pub fn data_path(&self, user: &str, data_id: &str) -> String {
        format!("{}/{}/{}", self.config.data_root.trim_end_matches('/'), user, data_id)
    }

    pub fn output_path(&self, user: &str, task_id: &str) -> String {
        format!("{}/{}/{}", self.config.result_root.trim_end_matches('/'), user, task_id)
    }

    pub fn plan_file(&self, user: &str, task_id: &str) -> String {
        format!("{}/analysis_plan.json", self.output_path(user, task_id))
    }

    fn validate(task: &TaskSpec) -> Result<(), ValidationError> {
        validate_identifier("user", &task.user)?;
        validate_identifier("task_id", &task.task_id)?;
        validate_identifier("data_id", &task.data_id)?;
        Ok(())
    }

    /// Render the full batch script for `task`.
    pub fn render(&self, task: &TaskSpec) -> Result<String, ValidationError> {
        Self::validate(task)?;
        let c = &self.config;
        let r = &c.resources;
        let plan = serde_json::to_string_pretty(&task.analysis_plan)
            .map_err(|e| ValidationError::Plan(e.to_string()))?;
        let log_dir = c.log_dir.trim_end_matches('/');

        let mut s = String::new();
        // Writing into a String cannot fail.
        let _ = writeln!(s, "#!/bin/bash");
        let _ = writeln!(s, "#SBATCH --job-name=bio_{}", task.task_id);
        let _ = writeln!(s, "#SBATCH --partition={}", c.queue);
        let _ = writeln!(s, "#SBATCH --output={}/bio_{}.out", log_dir, task.task_id);
        let _ = writeln!(s, "#SBATCH --error={}/bio_{}.err", log_dir, task.task_id);
        let _ = writeln!(s, "#SBATCH --nodes={}", r.nodes);
        let _ = writeln!(s, "#SBATCH --ntasks-per-node=1");
        if r.gpus_per_node > 0 {
            let _ = writeln!(s, "#SBATCH --gres=gpu:{}", r.gpus_per_node);
        }
        let _ = writeln!(s, "#SBATCH --time={}", r.time_limit);
        let _ = writeln!(s, "#SBATCH --mem={}", r.memory);
        let _ = writeln!(s);
        let _ = writeln!(s, "set -eo pipefail");
        let _ = writeln!(s);
        if let Some(env) = &c.conda_env {
            let _ = writeln!(s, "source {} {}", c.conda_activate, env);
            let _ = writeln!(s);
        }
        let _ = writeln!(s, "DATA_PATH=\"{}\"", self.data_path(&task.user, &task.data_id));
        let _ = writeln!(s, "OUTPUT_PATH=\"{}\"", self.output_path(&task.user, &task.task_id));
        let _ = writeln!(s, "PLAN_FILE=\"$OUTPUT_PATH/analysis_plan.json\"");
        let _ = writeln!(s, "mkdir -p \"$OUTPUT_PATH\"");
        let _ = writeln!(s);
        let _ = writeln!(s, "cat > \"$PLAN_FILE\" << '{}'", PLAN_EOF);
        let _ = writeln!(s, "{}", plan);
        let _ = writeln!(s, "{}", PLAN_EOF);
        let _ = writeln!(s);
        let _ = writeln!(s, "{} \\", c.worker_command);
        let _ = writeln!(s, "    --task_id {} \\", task.task_id);
        let _ = writeln!(s, "    --data_path \"$DATA_PATH\" \\");
        let _ = writeln!(s, "    --output_path \"$OUTPUT_PATH\" \\");
        let _ = writeln!(s, "    --config \"$PLAN_FILE\"");
        let _ = writeln!(s);
        let _ = writeln!(s, "echo \"analysis finished, results in $OUTPUT_PATH\"");
        Ok(s)
    }

    /// Render `task` and wrap it with the submission metadata the transports need.
    pub fn job_request(&self, task: &TaskSpec) -> Result<JobRequest, ValidationError> {
        let script = self.render(task)?;
        Ok(JobRequest {
            task_id: task.task_id.clone(),
            name: format!("bio_analysis_{}", task.task_id),
            script,
            queue: self.config.queue.clone(),
            resources: self.config.resources.clone(),
        })
    }
}
