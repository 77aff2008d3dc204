//! End-to-end credential lifecycle tests against a mocked OAuth provider.

use workflow_git_sync::credentials::{
    CredentialKind, CredentialManager, GitCredential, GitProvider,
};
use workflow_git_sync::settings::{GitSyncSettings, OAuthProviderSettings};
use tempfile::TempDir;

const TEST_KEY: &str = "0123456789abcdef0123456789abcdef";

fn settings_with_gitlab(temp_dir: &TempDir, token_url: &str) -> GitSyncSettings {
    let mut settings = GitSyncSettings::new(temp_dir.path(), TEST_KEY);
    settings.oauth.gitlab = Some(OAuthProviderSettings {
        client_id: "client-id".into(),
        client_secret: "client-secret".into(),
        redirect_uri: Some("https://app.example.com/oauth/callback".into()),
        authorize_url: None,
        token_url: Some(token_url.into()),
    });
    settings
}

#[tokio::test]
async fn test_oauth_flow_exchange_store_and_reload() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/oauth/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"access_token":"glpat-access","refresh_token":"glpat-refresh","expires_in":7200,"token_type":"bearer"}"#,
        )
        .create_async()
        .await;

    let temp_dir = TempDir::new().unwrap();
    let settings = settings_with_gitlab(&temp_dir, &format!("{}/oauth/token", server.url()));
    let manager = CredentialManager::new(&settings).unwrap();

    let initiation = manager
        .initiate_oauth_flow(GitProvider::Gitlab, Some("user-1"), Some("wf-1"))
        .unwrap();
    assert!(initiation.auth_url.contains("client-id"));
    assert!(initiation.auth_url.contains(&initiation.state));

    let credential = manager
        .complete_oauth_flow(GitProvider::Gitlab, "auth-code", &initiation.state)
        .await
        .unwrap();
    mock.assert_async().await;
    assert_eq!(credential.kind, CredentialKind::Oauth);
    assert_eq!(credential.token, "glpat-access");
    assert_eq!(credential.refresh_token.as_deref(), Some("glpat-refresh"));
    assert!(credential.expires_at.is_some());

    manager
        .store_credentials("user-1", "wf-1", &credential)
        .unwrap();

    // A fresh manager over the same data directory decrypts the same token
    let reloaded_manager = CredentialManager::new(&settings).unwrap();
    let reloaded = reloaded_manager
        .get_credentials("user-1", "wf-1")
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.token, "glpat-access");
    assert_eq!(reloaded.provider, GitProvider::Gitlab);
}

#[tokio::test]
async fn test_oauth_state_is_single_use_and_provider_bound() {
    let server = mockito::Server::new_async().await;
    let temp_dir = TempDir::new().unwrap();
    let settings = settings_with_gitlab(&temp_dir, &format!("{}/oauth/token", server.url()));
    let manager = CredentialManager::new(&settings).unwrap();

    let initiation = manager
        .initiate_oauth_flow(GitProvider::Gitlab, Some("user-1"), None)
        .unwrap();

    // Completing against the wrong provider fails and consumes the state
    assert!(manager
        .complete_oauth_flow(GitProvider::Github, "auth-code", &initiation.state)
        .await
        .is_err());
    assert!(manager
        .complete_oauth_flow(GitProvider::Gitlab, "auth-code", &initiation.state)
        .await
        .is_err());
}

#[test]
fn test_tokens_never_hit_disk_in_plaintext() {
    let temp_dir = TempDir::new().unwrap();
    let settings = GitSyncSettings::new(temp_dir.path(), TEST_KEY);
    let manager = CredentialManager::new(&settings).unwrap();

    let credential = GitCredential {
        kind: CredentialKind::PersonalAccessToken,
        provider: GitProvider::Github,
        token: "ghp_supersecret".into(),
        refresh_token: None,
        expires_at: None,
    };
    manager
        .store_credentials("user-1", "wf-1", &credential)
        .unwrap();

    let raw = std::fs::read_to_string(temp_dir.path().join("credentials.json")).unwrap();
    assert!(!raw.contains("ghp_supersecret"));

    assert!(manager.has_credentials("user-1", "wf-1"));
    assert!(manager.delete_credentials("user-1", "wf-1").unwrap());
    assert!(!manager.has_credentials("user-1", "wf-1"));
}
