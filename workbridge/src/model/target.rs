//! Where a client sends its calls.

use serde::{Deserialize, Serialize};

use super::item::Backend;

/// One backend endpoint and the project the client works in.
///
/// `project` is the Azure DevOps project, the GitHub `owner/repo`, or the
/// Jira project key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BackendTarget {
    /// Backend protocol.
    pub backend: Backend,
    /// Base URL, e.g. `https://dev.azure.com/org` or `https://api.github.com`.
    pub base_url: String,
    /// Project scope.
    #[serde(default)]
    pub project: Option<String>,
}

impl BackendTarget {
    /// Creates a target without a project.
    #[must_use]
    pub fn new(backend: Backend, base_url: impl Into<String>) -> Self {
        Self {
            backend,
            base_url: base_url.into(),
            project: None,
        }
    }

    /// Sets the project scope.
    #[must_use]
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Identifier used to key per-target state such as circuit breakers.
    #[must_use]
    pub fn target_id(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        match &self.project {
            Some(project) => format!("{}:{base}/{project}", self.backend),
            None => format!("{}:{base}", self.backend),
        }
    }
}
