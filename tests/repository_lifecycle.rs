//! Public-API tests for the repository lifecycle and change detection.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;
use workflow_git_sync::workflow::{CredentialData, CredentialService, ResolvedCredential};
use workflow_git_sync::{ConnectOptions, GitSyncError, GitSyncService, GitSyncSettings, Result};

struct FixedCredentials {
    credentials: HashMap<String, ResolvedCredential>,
}

impl FixedCredentials {
    fn with_github_pat() -> Self {
        let mut credentials = HashMap::new();
        credentials.insert(
            "cred-1".to_string(),
            ResolvedCredential {
                credential_type: "githubPAT".to_string(),
                data: CredentialData {
                    token: Some("ghp_testtoken".to_string()),
                    access_token: None,
                    refresh_token: None,
                },
                expires_at: None,
            },
        );
        Self { credentials }
    }
}

#[async_trait]
impl CredentialService for FixedCredentials {
    async fn get_credential(
        &self,
        credential_id: &str,
        _user_id: &str,
    ) -> Result<Option<ResolvedCredential>> {
        Ok(self.credentials.get(credential_id).cloned())
    }
}

fn service(temp_dir: &TempDir) -> GitSyncService {
    let settings = GitSyncSettings::new(temp_dir.path(), "0123456789abcdef0123456789abcdef");
    GitSyncService::new(settings, Arc::new(FixedCredentials::with_github_pat())).unwrap()
}

#[tokio::test]
async fn test_lifecycle_init_info_disconnect() {
    let temp_dir = TempDir::new().unwrap();
    let service = service(&temp_dir);

    assert!(service.repository_info("wf-1", "user-1").is_none());

    let config = service.init("wf-1", "user-1").await.unwrap();
    assert!(!config.connected);
    assert!(config.local_path.join(".git").exists());

    let err = service.init("wf-1", "user-1").await.unwrap_err();
    assert!(err.to_string().contains("already initialized"));

    let config = service.disconnect("wf-1", "user-1").await.unwrap();
    assert!(!config.connected);
    assert!(config.local_path.exists());
}

#[tokio::test]
async fn test_state_survives_service_restart() {
    let temp_dir = TempDir::new().unwrap();
    {
        let service = service(&temp_dir);
        service.init("wf-1", "user-1").await.unwrap();
    }

    let service = service(&temp_dir);
    let config = service.repository_info("wf-1", "user-1").unwrap();
    assert_eq!(config.workflow_id, "wf-1");
    assert_eq!(config.branch, "main");
}

#[tokio::test]
async fn test_detect_changes_reflects_in_memory_workflow() {
    let temp_dir = TempDir::new().unwrap();
    let service = service(&temp_dir);
    service.init("wf-1", "user-1").await.unwrap();

    let workflow = json!({"name": "wf", "nodes": [{"id": "start"}]});
    let changes = service
        .detect_changes("wf-1", "user-1", Some(&workflow), None)
        .await
        .unwrap();
    assert!(changes.iter().any(|c| c.path == "workflow.json"));
}

#[tokio::test]
async fn test_connect_rejects_malformed_urls() {
    let temp_dir = TempDir::new().unwrap();
    let service = service(&temp_dir);

    for url in ["", "github.com/acme/flows", "http://github.com/acme/flows.git"] {
        let err = service
            .connect(
                "wf-1",
                "user-1",
                ConnectOptions {
                    repository_url: url.to_string(),
                    branch: None,
                    credential_id: "cred-1".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GitSyncError::Validation(_)), "url: {url:?}");
    }
    // Nothing was created by the rejected attempts
    assert!(service.repository_info("wf-1", "user-1").is_none());
}

#[tokio::test]
async fn test_operations_on_unknown_workflow_fail_cleanly() {
    let temp_dir = TempDir::new().unwrap();
    let service = service(&temp_dir);

    assert!(matches!(
        service.disconnect("ghost", "user-1").await.unwrap_err(),
        GitSyncError::NotFound(_)
    ));
    assert!(service
        .detect_changes("ghost", "user-1", None, None)
        .await
        .is_err());
    assert!(service.list_branches("ghost", "user-1").await.is_err());
}
