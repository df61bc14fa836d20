//! Configuration tree for the taskmill daemon.
//!
//! Loaded hierarchically by `infrastructure::config` (defaults, YAML files,
//! `TASKMILL_*` environment, CLI flags) and validated after merging.

use serde::{Deserialize, Serialize};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Maximum number of concurrent workflow executors (1-100).
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Queue poll interval in seconds.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Graceful shutdown budget for in-flight executors, in seconds.
    #[serde(default = "default_graceful_timeout_secs")]
    pub graceful_timeout_secs: u64,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// HTTP API configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Workflow phase timeouts and retry bounds.
    #[serde(default)]
    pub workflow: WorkflowConfig,

    /// Retry policy for transient store failures in the executor.
    #[serde(default)]
    pub store_retry: StoreRetryConfig,

    /// Registered agents, keyed by the names the workflow table uses.
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
}

const fn default_max_concurrent() -> usize {
    5
}

const fn default_poll_interval_secs() -> u64 {
    1
}

const fn default_graceful_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            poll_interval_secs: default_poll_interval_secs(),
            graceful_timeout_secs: default_graceful_timeout_secs(),
            database: DatabaseConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            workflow: WorkflowConfig::default(),
            store_retry: StoreRetryConfig::default(),
            agents: vec![],
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to the `SQLite` database file.
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".taskmill/taskmill.db".to_string()
}

const fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// HTTP API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    8700
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port() }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty.
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Optional directory for a daily-rolled JSON log file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: default_log_format(), dir: None }
    }
}

/// Workflow phase timeouts (seconds) and retry bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkflowConfig {
    /// Re-entries into CODE_IMPL allowed before the workflow fails.
    #[serde(default = "default_max_code_impl_retries")]
    pub max_code_impl_retries: u32,

    #[serde(default = "default_test_gen_timeout")]
    pub e2e_test_gen_timeout_secs: u64,

    #[serde(default = "default_code_impl_timeout")]
    pub code_impl_timeout_secs: u64,

    #[serde(default = "default_review_timeout")]
    pub review_timeout_secs: u64,

    #[serde(default = "default_deploy_timeout")]
    pub deploy_timeout_secs: u64,

    #[serde(default = "default_validate_timeout")]
    pub e2e_validate_timeout_secs: u64,
}

const fn default_max_code_impl_retries() -> u32 {
    3
}

const fn default_test_gen_timeout() -> u64 {
    300
}

const fn default_code_impl_timeout() -> u64 {
    1800
}

const fn default_review_timeout() -> u64 {
    600
}

const fn default_deploy_timeout() -> u64 {
    900
}

const fn default_validate_timeout() -> u64 {
    600
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_code_impl_retries: default_max_code_impl_retries(),
            e2e_test_gen_timeout_secs: default_test_gen_timeout(),
            code_impl_timeout_secs: default_code_impl_timeout(),
            review_timeout_secs: default_review_timeout(),
            deploy_timeout_secs: default_deploy_timeout(),
            e2e_validate_timeout_secs: default_validate_timeout(),
        }
    }
}

/// Bounded exponential backoff for transient store failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StoreRetryConfig {
    #[serde(default = "default_store_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_store_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_store_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_store_max_retries() -> u32 {
    3
}

const fn default_store_initial_backoff_ms() -> u64 {
    100
}

const fn default_store_max_backoff_ms() -> u64 {
    2_000
}

impl Default for StoreRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_store_max_retries(),
            initial_backoff_ms: default_store_initial_backoff_ms(),
            max_backoff_ms: default_store_max_backoff_ms(),
        }
    }
}

/// One registered agent: a subprocess shim invoked per phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AgentConfig {
    /// Registry name (`test-generator`, `coder`, `reviewer`, `deployer`).
    pub name: String,

    /// Executable to spawn.
    pub command: String,

    /// Arguments passed to the command.
    #[serde(default)]
    pub args: Vec<String>,

    /// Overrides the phase timeout when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}
