use std::{path::Path, time::Duration};

use anyhow::Context;
use comarca_core::{OrchestratorConfig, RecurringJob, ScrapeType};
use serde::Deserialize;

/// Server configuration, loaded from an optional `comarca.toml` with env
/// and CLI overrides applied on top by `main`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub orchestrator: OrchestratorSection,
    #[serde(default)]
    pub logs: LogsSection,
    #[serde(default)]
    pub schedules: Vec<ScheduleSection>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrchestratorSection {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_executions: usize,
    #[serde(default = "default_execution_timeout_secs")]
    pub execution_timeout_secs: u64,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            max_concurrent_executions: default_max_concurrent(),
            execution_timeout_secs: default_execution_timeout_secs(),
        }
    }
}

impl OrchestratorSection {
    pub fn to_core(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_concurrent_executions: self.max_concurrent_executions,
            execution_timeout: Duration::from_secs(self.execution_timeout_secs),
            ..OrchestratorConfig::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogsSection {
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    #[serde(default = "default_retention_grace_secs")]
    pub retention_grace_secs: u64,
}

impl Default for LogsSection {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
            retention_grace_secs: default_retention_grace_secs(),
        }
    }
}

/// One recurring scrape definition from configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleSection {
    pub name: String,
    pub cron: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    pub scrape_type: ScrapeType,
    pub targets: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl ScheduleSection {
    pub fn to_recurring(&self) -> RecurringJob {
        RecurringJob {
            name: self.name.clone(),
            cron_expr: self.cron.clone(),
            timezone: self.timezone.clone(),
            scrape_type: self.scrape_type,
            targets: self.targets.clone(),
            enabled: self.enabled,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8790
}

fn default_max_concurrent() -> usize {
    4
}

fn default_execution_timeout_secs() -> u64 {
    300
}

fn default_buffer_capacity() -> usize {
    1024
}

fn default_retention_grace_secs() -> u64 {
    120
}

fn default_timezone() -> String {
    "America/Sao_Paulo".to_string()
}

fn default_enabled() -> bool {
    true
}

impl Config {
    /// Loads from `path` when it exists; defaults otherwise.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))
    }
}
