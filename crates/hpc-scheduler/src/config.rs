//! Environment configuration and wiring of the scheduler client.

use crate::client::{SchedulerClient, DEFAULT_RESULT_URL_PREFIX};
use crate::script::{JobScriptGenerator, ScriptConfig};
use hpc_mapping::{JsonFileMappingStore, MappingStore};
use hpc_progress::{FileProgressStore, ProgressStore};
use hpc_transport::{HttpTransport, HttpTransportConfig, JobTransport, LocalCommandConfig, LocalCommandTransport};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid {var}={value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("{0}")]
    Unsupported(String),
    #[error("cannot build scheduler client: {0}")]
    Build(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Http,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingBackend {
    Json,
    Sqlite,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub transport: TransportKind,
    /// Present when `transport` is `Http`.
    pub http: Option<HttpTransportConfig>,
    pub local: LocalCommandConfig,
    pub script: ScriptConfig,
    pub mapping_backend: MappingBackend,
    pub mapping_path: PathBuf,
    pub progress_dir: PathBuf,
    pub result_url_prefix: String,
}

fn parse_num<T: std::str::FromStr>(
    var: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(v) => v.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value: v.clone(),
            reason: e.to_string(),
        }),
    }
}

fn split_command(value: &str) -> Vec<String> {
    value.split_whitespace().map(String::from).collect()
}

impl SchedulerConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Read configuration through `lookup`; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());

        let transport = match get("HPC_TRANSPORT").as_deref().map(str::trim) {
            None | Some("http") => TransportKind::Http,
            Some("local") => TransportKind::Local,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "HPC_TRANSPORT",
                    value: other.to_string(),
                    reason: "expected http or local".to_string(),
                })
            }
        };
        let request_timeout =
            Duration::from_secs(parse_num("HPC_REQUEST_TIMEOUT_SECS", get("HPC_REQUEST_TIMEOUT_SECS"), 30u64)?);
        let token_ttl =
            Duration::from_secs(parse_num("HPC_TOKEN_TTL_SECS", get("HPC_TOKEN_TTL_SECS"), 86_400u64)?);

        let http = match transport {
            TransportKind::Http => Some(HttpTransportConfig {
                base_url: get("HPC_SCHEDULER_URL")
                    .unwrap_or_else(|| "http://localhost:9000".to_string()),
                username: get("HPC_USERNAME").ok_or(ConfigError::Missing("HPC_USERNAME"))?,
                password: get("HPC_PASSWORD").ok_or(ConfigError::Missing("HPC_PASSWORD"))?,
                token_ttl,
                request_timeout,
            }),
            TransportKind::Local => None,
        };

        let mut local = LocalCommandConfig {
            timeout: request_timeout,
            ..LocalCommandConfig::default()
        };
        if let Some(cmd) = get("HPC_SUBMIT_COMMAND") {
            local.submit_command = split_command(&cmd);
        }
        if let Some(cmd) = get("HPC_STATUS_COMMAND") {
            local.status_command = match cmd.trim() {
                "none" | "off" => None,
                _ => Some(split_command(&cmd)),
            };
        }
        if let Some(dir) = get("HPC_SCRATCH_DIR") {
            local.scratch_dir = PathBuf::from(dir);
        }

        let defaults = ScriptConfig::default();
        let resources = hpc_types::ResourceRequest {
            nodes: parse_num("HPC_NODES", get("HPC_NODES"), defaults.resources.nodes)?,
            gpus_per_node: parse_num(
                "HPC_GPUS_PER_NODE",
                get("HPC_GPUS_PER_NODE"),
                defaults.resources.gpus_per_node,
            )?,
            memory: get("HPC_MEMORY").unwrap_or(defaults.resources.memory),
            time_limit: get("HPC_TIME_LIMIT").unwrap_or(defaults.resources.time_limit),
        };
        if resources.nodes == 0 {
            return Err(ConfigError::Invalid {
                var: "HPC_NODES",
                value: "0".to_string(),
                reason: "at least one node is required".to_string(),
            });
        }
        let conda_env = match lookup("HPC_CONDA_ENV") {
            // Explicitly empty disables activation.
            Some(v) if v.trim().is_empty() => None,
            Some(v) => Some(v),
            None => defaults.conda_env,
        };
        let script = ScriptConfig {
            queue: get("HPC_QUEUE").unwrap_or(defaults.queue),
            resources,
            data_root: get("DATA_STORAGE_PATH").unwrap_or(defaults.data_root),
            result_root: get("RESULT_STORAGE_PATH").unwrap_or(defaults.result_root),
            log_dir: get("HPC_LOG_DIR").unwrap_or(defaults.log_dir),
            conda_activate: defaults.conda_activate,
            conda_env,
            worker_command: get("HPC_WORKER_COMMAND").unwrap_or(defaults.worker_command),
        };

        let mapping_backend = match get("HPC_MAPPING_BACKEND").as_deref().map(str::trim) {
            None | Some("json") => MappingBackend::Json,
            Some("sqlite") => MappingBackend::Sqlite,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "HPC_MAPPING_BACKEND",
                    value: other.to_string(),
                    reason: "expected json or sqlite".to_string(),
                })
            }
        };
        let mapping_path = get("HPC_MAPPING_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| match mapping_backend {
                MappingBackend::Json => PathBuf::from("task_mappings.json"),
                MappingBackend::Sqlite => PathBuf::from("task_mappings.db"),
            });

        Ok(Self {
            transport,
            http,
            local,
            script,
            mapping_backend,
            mapping_path,
            progress_dir: get("HPC_PROGRESS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("progress")),
            result_url_prefix: get("HPC_RESULT_URL_PREFIX")
                .unwrap_or_else(|| DEFAULT_RESULT_URL_PREFIX.to_string()),
        })
    }

    fn build_transport(&self) -> Result<Arc<dyn JobTransport>, ConfigError> {
        match self.transport {
            TransportKind::Http => {
                let cfg = self
                    .http
                    .clone()
                    .ok_or(ConfigError::Missing("HPC_SCHEDULER_URL"))?;
                let transport =
                    HttpTransport::new(cfg).map_err(|e| ConfigError::Build(e.to_string()))?;
                Ok(Arc::new(transport))
            }
            TransportKind::Local => {
                if self.local.submit_command.is_empty() {
                    return Err(ConfigError::Missing("HPC_SUBMIT_COMMAND"));
                }
                Ok(Arc::new(LocalCommandTransport::new(self.local.clone())))
            }
        }
    }

    fn build_mappings(&self) -> Result<Arc<dyn MappingStore>, ConfigError> {
        match self.mapping_backend {
            MappingBackend::Json => Ok(Arc::new(JsonFileMappingStore::new(&self.mapping_path))),
            #[cfg(feature = "sqlite")]
            MappingBackend::Sqlite => {
                let store = hpc_mapping::SqliteMappingStore::new(&self.mapping_path)
                    .map_err(|e| ConfigError::Build(e.to_string()))?;
                Ok(Arc::new(store))
            }
            #[cfg(not(feature = "sqlite"))]
            MappingBackend::Sqlite => Err(ConfigError::Unsupported(
                "HPC_MAPPING_BACKEND=sqlite requires the sqlite feature".to_string(),
            )),
        }
    }

    /// Wire transport, stores and script generator into a ready client.
    pub fn build_client(&self) -> Result<SchedulerClient, ConfigError> {
        let transport = self.build_transport()?;
        let mappings = self.build_mappings()?;
        let progress: Arc<dyn ProgressStore> = Arc::new(FileProgressStore::new(&self.progress_dir));
        tracing::info!(
            transport = transport.name(),
            mapping = %self.mapping_path.display(),
            progress_dir = %self.progress_dir.display(),
            queue = %self.script.queue,
            "scheduler client configured"
        );
        Ok(SchedulerClient::new(
            JobScriptGenerator::new(self.script.clone()),
            transport,
            mappings,
            progress,
        )
        .with_result_url_prefix(self.result_url_prefix.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn http_defaults_need_credentials() {
        let err = SchedulerConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("HPC_USERNAME")));

        let cfg = SchedulerConfig::from_lookup(lookup(&[
            ("HPC_USERNAME", "svc"),
            ("HPC_PASSWORD", "secret"),
        ]))
        .unwrap();
        assert_eq!(cfg.transport, TransportKind::Http);
        let http = cfg.http.unwrap();
        assert_eq!(http.base_url, "http://localhost:9000");
        assert_eq!(http.token_ttl, Duration::from_secs(86_400));
        assert_eq!(cfg.script.queue, "gpu");
        assert_eq!(cfg.script.resources.memory, "64G");
        assert_eq!(cfg.mapping_backend, MappingBackend::Json);
        assert_eq!(cfg.mapping_path, PathBuf::from("task_mappings.json"));
        assert_eq!(cfg.progress_dir, PathBuf::from("progress"));
        assert_eq!(cfg.result_url_prefix, "/api/v1/analysis/result");
    }

    #[test]
    fn local_transport_reads_commands_and_resources() {
        let cfg = SchedulerConfig::from_lookup(lookup(&[
            ("HPC_TRANSPORT", "local"),
            ("HPC_SUBMIT_COMMAND", "sbatch --parsable"),
            ("HPC_STATUS_COMMAND", "none"),
            ("HPC_SCRATCH_DIR", "/scratch/jobs"),
            ("HPC_QUEUE", "a100"),
            ("HPC_NODES", "2"),
            ("HPC_GPUS_PER_NODE", "0"),
            ("HPC_REQUEST_TIMEOUT_SECS", "5"),
            ("HPC_CONDA_ENV", ""),
            ("RESULT_STORAGE_PATH", "/shared/results"),
        ]))
        .unwrap();
        assert_eq!(cfg.transport, TransportKind::Local);
        assert!(cfg.http.is_none());
        assert_eq!(cfg.local.submit_command, vec!["sbatch", "--parsable"]);
        assert!(cfg.local.status_command.is_none());
        assert_eq!(cfg.local.scratch_dir, PathBuf::from("/scratch/jobs"));
        assert_eq!(cfg.local.timeout, Duration::from_secs(5));
        assert_eq!(cfg.script.queue, "a100");
        assert_eq!(cfg.script.resources.nodes, 2);
        assert_eq!(cfg.script.resources.gpus_per_node, 0);
        assert!(cfg.script.conda_env.is_none());
        assert_eq!(cfg.script.result_root, "/shared/results");
    }

    #[test]
    fn malformed_values_are_errors() {
        let err = SchedulerConfig::from_lookup(lookup(&[
            ("HPC_TRANSPORT", "local"),
            ("HPC_NODES", "two"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "HPC_NODES", .. }));

        let err = SchedulerConfig::from_lookup(lookup(&[("HPC_TRANSPORT", "ssh")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "HPC_TRANSPORT", .. }));

        let err = SchedulerConfig::from_lookup(lookup(&[
            ("HPC_TRANSPORT", "local"),
            ("HPC_MAPPING_BACKEND", "redis"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "HPC_MAPPING_BACKEND", .. }));
    }

    #[tokio::test]
    async fn builds_a_local_client() {
        let dir = tempfile::tempdir().unwrap();
        let mapping = dir.path().join("map.json");
        let progress = dir.path().join("progress");
        let cfg = SchedulerConfig::from_lookup(lookup(&[
            ("HPC_TRANSPORT", "local"),
            ("HPC_MAPPING_PATH", mapping.to_str().unwrap()),
            ("HPC_PROGRESS_DIR", progress.to_str().unwrap()),
        ]))
        .unwrap();
        let client = cfg.build_client().unwrap();
        assert_eq!(client.transport_name(), "local");
        let report = crate::Scheduler::get_status(&client, "never-submitted").await;
        assert_eq!(report.status, hpc_types::JobStatus::Unknown);
    }
}
