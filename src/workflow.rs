//! Collaborator contracts: workflow serialization and the unified
//! credential store. Both are injected so the host application can plug in
//! its own implementations; a JSON serializer is provided as the default.

use crate::errors::{GitSyncError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

/// Name of the primary workflow file when no environment is active.
pub const WORKFLOW_FILE: &str = "workflow.json";
/// Name of the generated repository README.
pub const README_FILE: &str = "README.md";

/// Returns the primary workflow filename for an optional environment scope,
/// e.g. `workflow-staging.json`.
pub fn workflow_filename(env: Option<&str>) -> String {
    match env {
        Some(env) => format!("workflow-{env}.json"),
        None => WORKFLOW_FILE.to_string(),
    }
}

/// Serializes workflow definitions to repository files and back.
pub trait WorkflowSerializer: Send + Sync {
    /// Render a workflow into its on-disk file set. Always contains the
    /// primary workflow file plus a generated README.
    fn workflow_to_files(
        &self,
        workflow: &Value,
        env: Option<&str>,
    ) -> Result<BTreeMap<String, String>>;

    /// Reconstruct a (partial) workflow from repository files.
    fn files_to_workflow(&self, files: &BTreeMap<String, String>) -> Result<Value>;
}

/// Default serializer: pretty-printed JSON plus a short generated README.
pub struct JsonWorkflowSerializer;

impl WorkflowSerializer for JsonWorkflowSerializer {
    fn workflow_to_files(
        &self,
        workflow: &Value,
        env: Option<&str>,
    ) -> Result<BTreeMap<String, String>> {
        let mut files = BTreeMap::new();
        let json = serde_json::to_string_pretty(workflow)?;
        files.insert(workflow_filename(env), json);

        let name = workflow
            .get("name")
            .and_then(|n| n.as_str())
            .unwrap_or("Workflow");
        let mut readme = format!("# {name}\n\nThis repository tracks a workflow definition.\n");
        if let Some(env) = env {
            readme.push_str(&format!("\nEnvironment: `{env}`\n"));
        }
        files.insert(README_FILE.to_string(), readme);

        Ok(files)
    }

    fn files_to_workflow(&self, files: &BTreeMap<String, String>) -> Result<Value> {
        // Prefer the unscoped file, fall back to any environment-scoped one.
        let content = files
            .get(WORKFLOW_FILE)
            .or_else(|| {
                files
                    .iter()
                    .find(|(name, _)| is_workflow_file(name))
                    .map(|(_, content)| content)
            })
            .ok_or_else(|| GitSyncError::validation("No workflow file found in repository"))?;

        let workflow: Value = serde_json::from_str(content)?;
        Ok(workflow)
    }
}

/// True for `workflow.json` and `workflow-<env>.json`.
pub fn is_workflow_file(name: &str) -> bool {
    name == WORKFLOW_FILE || (name.starts_with("workflow-") && name.ends_with(".json"))
}

/// Extracts the environment scope from `workflow-<env>.json`, if any.
pub fn workflow_file_env(name: &str) -> Option<&str> {
    name.strip_prefix("workflow-")?.strip_suffix(".json")
}

/// Decrypted view of a credential held by the unified credential store.
#[derive(Debug, Clone)]
pub struct ResolvedCredential {
    /// Credential type string, e.g. `githubPAT` or `gitlabOAuth2`.
    pub credential_type: String,
    pub data: CredentialData,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct CredentialData {
    pub token: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

/// Read access to the unified credential store.
#[async_trait]
pub trait CredentialService: Send + Sync {
    async fn get_credential(
        &self,
        credential_id: &str,
        user_id: &str,
    ) -> Result<Option<ResolvedCredential>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serializer_emits_primary_and_readme() {
        let serializer = JsonWorkflowSerializer;
        let workflow = json!({"name": "Invoice pipeline", "nodes": []});

        let files = serializer.workflow_to_files(&workflow, None).unwrap();
        assert!(files.contains_key("workflow.json"));
        assert!(files.contains_key("README.md"));
        assert!(files["README.md"].contains("Invoice pipeline"));

        let scoped = serializer.workflow_to_files(&workflow, Some("staging")).unwrap();
        assert!(scoped.contains_key("workflow-staging.json"));
    }

    #[test]
    fn test_files_round_trip() {
        let serializer = JsonWorkflowSerializer;
        let workflow = json!({"name": "wf", "nodes": [{"id": 1}]});

        let files = serializer.workflow_to_files(&workflow, None).unwrap();
        let restored = serializer.files_to_workflow(&files).unwrap();
        assert_eq!(restored, workflow);
    }

    #[test]
    fn test_files_to_workflow_prefers_env_file_when_unscoped_absent() {
        let serializer = JsonWorkflowSerializer;
        let mut files = BTreeMap::new();
        files.insert("workflow-production.json".to_string(), "{\"a\":1}".to_string());
        files.insert("README.md".to_string(), "readme".to_string());

        let restored = serializer.files_to_workflow(&files).unwrap();
        assert_eq!(restored, json!({"a": 1}));
    }

    #[test]
    fn test_workflow_file_helpers() {
        assert!(is_workflow_file("workflow.json"));
        assert!(is_workflow_file("workflow-dev.json"));
        assert!(!is_workflow_file("README.md"));
        assert_eq!(workflow_file_env("workflow-dev.json"), Some("dev"));
        assert_eq!(workflow_file_env("workflow.json"), None);
    }
}
