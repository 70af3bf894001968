//! Client configuration.
//!
//! Parsed from JSON with per-field defaults. Loading the document from disk
//! is left to the caller.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::ConfigError;
use crate::model::{Backend, BackendTarget};
use crate::observability::LogFormat;
use crate::resilience::{BackoffGenerator, BreakerConfig, RetryAfterMode, RetryPolicy};
use crate::transport::AuthScheme;

/// Everything needed to build a client for one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Backend protocol.
    pub backend: Backend,
    /// Base URL of the backend API.
    pub base_url: String,
    /// Project, `owner/repo` or project key.
    #[serde(default)]
    pub project: Option<String>,
    /// Overrides the backend's default auth scheme.
    #[serde(default)]
    pub auth: Option<AuthScheme>,
    /// Retry, breaker and cache settings.
    #[serde(default)]
    pub policy: ClientPolicy,
    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
    /// Filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

/// Resilience settings, in milliseconds where a duration is meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientPolicy {
    /// Total attempts per operation, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Budget across all attempts and waits.
    #[serde(default = "default_max_elapsed_ms")]
    pub max_elapsed_ms: u64,
    /// Cap on one attempt; `0` means only the elapsed budget applies.
    #[serde(default = "default_per_attempt_timeout_ms")]
    pub per_attempt_timeout_ms: u64,
    /// Retryable failures that open the circuit.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Window the failure counter covers.
    #[serde(default = "default_failure_window_ms")]
    pub failure_window_ms: u64,
    /// First open period.
    #[serde(default = "default_open_duration_ms")]
    pub open_duration_ms: u64,
    /// Longest open period after repeated failed probes.
    #[serde(default = "default_max_open_duration_ms")]
    pub max_open_duration_ms: u64,
    /// Delay before the second attempt.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Ceiling of the computed delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// How `Retry-After` combines with the computed delay.
    #[serde(default)]
    pub retry_after: RetryAfterMode,
    /// How long a created item is remembered per idempotency key.
    #[serde(default = "default_dedup_ttl_ms")]
    pub dedup_ttl_ms: u64,
    /// Items requested per listing page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_log_filter() -> String {
    "workbridge=info".to_string()
}

fn default_max_attempts() -> u32 {
    4
}

fn default_max_elapsed_ms() -> u64 {
    60_000
}

fn default_per_attempt_timeout_ms() -> u64 {
    30_000
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_failure_window_ms() -> u64 {
    60_000
}

fn default_open_duration_ms() -> u64 {
    30_000
}

fn default_max_open_duration_ms() -> u64 {
    300_000
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_dedup_ttl_ms() -> u64 {
    24 * 60 * 60 * 1000
}

fn default_page_size() -> u32 {
    100
}

impl Default for ClientPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            max_elapsed_ms: default_max_elapsed_ms(),
            per_attempt_timeout_ms: default_per_attempt_timeout_ms(),
            failure_threshold: default_failure_threshold(),
            failure_window_ms: default_failure_window_ms(),
            open_duration_ms: default_open_duration_ms(),
            max_open_duration_ms: default_max_open_duration_ms(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            retry_after: RetryAfterMode::default(),
            dedup_ttl_ms: default_dedup_ttl_ms(),
            page_size: default_page_size(),
        }
    }
}

impl ClientPolicy {
    /// Attempt and elapsed limits.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            max_elapsed: Duration::from_millis(self.max_elapsed_ms),
            per_attempt_timeout: (self.per_attempt_timeout_ms > 0)
                .then(|| Duration::from_millis(self.per_attempt_timeout_ms)),
        }
    }

    /// Circuit breaker settings.
    #[must_use]
    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold,
            failure_window: Duration::from_millis(self.failure_window_ms),
            open_duration: Duration::from_millis(self.open_duration_ms),
            max_open_duration: Duration::from_millis(self.max_open_duration_ms),
        }
    }

    /// An entropy-seeded backoff generator.
    #[must_use]
    pub fn backoff(&self) -> BackoffGenerator {
        BackoffGenerator::new(
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
        .with_retry_after_mode(self.retry_after)
    }

    /// Dedup cache lifetime.
    #[must_use]
    pub fn dedup_ttl(&self) -> Duration {
        Duration::from_millis(self.dedup_ttl_ms)
    }

    fn check(&self, report: &mut ValidationReport) {
        if self.max_attempts == 0 {
            report.error("policy.max_attempts must be at least 1");
        }
        if self.max_elapsed_ms == 0 {
            report.error("policy.max_elapsed_ms must be greater than 0");
        }
        if self.failure_threshold == 0 {
            report.error("policy.failure_threshold must be at least 1");
        }
        if self.page_size == 0 {
            report.error("policy.page_size must be at least 1");
        }
        if self.base_delay_ms > self.max_delay_ms {
            report.error(format!(
                "policy.base_delay_ms ({}) exceeds policy.max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            ));
        }
        if self.open_duration_ms > self.max_open_duration_ms {
            report.error(format!(
                "policy.open_duration_ms ({}) exceeds policy.max_open_duration_ms ({})",
                self.open_duration_ms, self.max_open_duration_ms
            ));
        }
        if self.per_attempt_timeout_ms > self.max_elapsed_ms {
            report.warning(format!(
                "policy.per_attempt_timeout_ms ({}) is larger than policy.max_elapsed_ms ({}); \
                 attempts are capped by the elapsed budget",
                self.per_attempt_timeout_ms, self.max_elapsed_ms
            ));
        }
        if self.max_delay_ms >= self.max_elapsed_ms {
            report.warning(format!(
                "policy.max_delay_ms ({}) leaves no room for a retry within policy.max_elapsed_ms ({})",
                self.max_delay_ms, self.max_elapsed_ms
            ));
        }
    }
}

/// Errors and warnings found by [`ClientConfig::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Problems that make the configuration unusable.
    pub errors: Vec<String>,
    /// Suspicious settings that still work.
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// Returns true when there are no errors.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Converts errors into a [`ConfigError`]; warnings are dropped.
    pub fn into_result(self) -> Result<(), ConfigError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::invalid(self.errors))
        }
    }

    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

impl ClientConfig {
    /// Creates a config with default policy.
    #[must_use]
    pub fn new(backend: Backend, base_url: impl Into<String>) -> Self {
        Self {
            backend,
            base_url: base_url.into(),
            project: None,
            auth: None,
            policy: ClientPolicy::default(),
            log_format: LogFormat::default(),
            log_filter: default_log_filter(),
        }
    }

    /// Sets the project scope.
    #[must_use]
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Sets the policy.
    #[must_use]
    pub fn with_policy(mut self, policy: ClientPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Parses a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parses and validates a JSON document.
    pub fn load(json: &str) -> Result<Self, ConfigError> {
        let config = Self::from_json_str(json)?;
        let report = config.validate();
        for warning in &report.warnings {
            tracing::warn!(warning = %warning, "Configuration warning");
        }
        report.into_result()?;
        Ok(config)
    }

    /// Checks the configuration without failing fast.
    #[must_use]
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();

        let url = self.base_url.trim();
        if url.is_empty() {
            report.error("base_url is required");
        } else if !(url.starts_with("https://") || url.starts_with("http://")) {
            report.error(format!("base_url '{url}' must use http or https"));
        } else if url.starts_with("http://") {
            report.warning(format!("base_url '{url}' is not encrypted"));
        }

        let has_project = self.project.as_deref().is_some_and(|p| !p.trim().is_empty());
        match self.backend {
            Backend::GitHub => {
                if !has_project {
                    report.error("github target needs a project of the form owner/repo");
                } else if self.project.as_deref().is_some_and(|p| !p.contains('/')) {
                    report.error("github project must be of the form owner/repo");
                }
            }
            Backend::AzureDevops if !has_project => {
                report.warning("azure_devops target has no project; every call will be rejected");
            }
            Backend::Jira if !has_project => {
                report.warning("jira target has no project; listing spans all projects and create fails");
            }
            Backend::AzureDevops | Backend::Jira => {}
        }

        self.policy.check(&mut report);
        report
    }

    /// The target described by this config.
    #[must_use]
    pub fn target(&self) -> BackendTarget {
        BackendTarget {
            backend: self.backend,
            base_url: self.base_url.trim().to_string(),
            project: self.project.clone(),
        }
    }

    /// The auth scheme in effect.
    #[must_use]
    pub fn auth_scheme(&self) -> AuthScheme {
        self.auth
            .clone()
            .unwrap_or_else(|| AuthScheme::default_for(self.backend))
    }

    /// Installs the global tracing subscriber described by this config.
    pub fn init_tracing(&self) -> anyhow::Result<()> {
        crate::observability::init_tracing(self.log_format, &self.log_filter)
    }
}
