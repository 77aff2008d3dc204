//! Credential lifecycle: encryption at rest, OAuth flows with CSRF
//! protection, token refresh, and per-workflow credential storage.

pub mod crypto;
pub mod oauth;

pub use crypto::TokenCipher;
pub use oauth::{
    CredentialKind, GitCredential, GitProvider, OAuthClient, OAuthInitiation, OAuthState,
    OAuthStateStore,
};

use crate::errors::{GitSyncError, Result};
use crate::settings::GitSyncSettings;
use crate::workflow::ResolvedCredential;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Basic-auth username/password pair for git transport operations.
///
/// Decided once when a credential is resolved; the git layer never inspects
/// token shapes itself.
#[derive(Debug, Clone)]
pub struct AuthScheme {
    pub username: String,
    pub secret: String,
}

impl AuthScheme {
    /// Derive the transport auth convention for a provider/token pair.
    ///
    /// GitHub fine-grained PATs (`github_pat_` prefix) go as both username
    /// and password; classic PATs (`ghp_`) and anything unrecognized use the
    /// `x-access-token` convention.
    pub fn for_token(provider: GitProvider, token: &str) -> Self {
        let (username, secret) = match provider {
            GitProvider::Gitlab => ("oauth2".to_string(), token.to_string()),
            GitProvider::Bitbucket => ("x-token-auth".to_string(), token.to_string()),
            GitProvider::Github => {
                if token.starts_with("github_pat_") {
                    (token.to_string(), token.to_string())
                } else {
                    ("x-access-token".to_string(), token.to_string())
                }
            }
        };
        Self { username, secret }
    }
}

/// Extract the provider and raw token from a unified-credential-store record.
///
/// Type strings ending in `PAT` are personal access tokens carrying `token`;
/// everything else is OAuth carrying `access_token`.
pub fn resolve_remote_credential(resolved: &ResolvedCredential) -> Result<(GitProvider, String)> {
    let provider = GitProvider::from_credential_type(&resolved.credential_type);
    let is_pat = resolved.credential_type.ends_with("PAT");

    let token = if is_pat {
        resolved
            .data
            .token
            .clone()
            .or_else(|| resolved.data.access_token.clone())
    } else {
        resolved
            .data
            .access_token
            .clone()
            .or_else(|| resolved.data.token.clone())
    };

    match token {
        Some(token) if !token.is_empty() => Ok((provider, token)),
        _ => Err(GitSyncError::auth(format!(
            "Credential of type {} contains no token",
            resolved.credential_type
        ))),
    }
}

/// Encrypted on-disk credential record.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCredentialRecord {
    kind: CredentialKind,
    provider: GitProvider,
    token: String,
    refresh_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

fn record_key(user_id: &str, workflow_id: &str) -> String {
    format!("{user_id}/{workflow_id}")
}

/// Manages Git credentials: OAuth flows, encryption, and storage keyed by
/// `(user_id, workflow_id)`.
pub struct CredentialManager {
    cipher: TokenCipher,
    oauth: OAuthClient,
    states: Arc<OAuthStateStore>,
    path: PathBuf,
    records: Mutex<HashMap<String, StoredCredentialRecord>>,
}

impl CredentialManager {
    pub fn new(settings: &GitSyncSettings) -> Result<Self> {
        let cipher = TokenCipher::new(&settings.encryption_key)?;
        let oauth = OAuthClient::new(settings.oauth.clone())?;

        let path = settings.data_dir.join("credentials.json");
        let records = if path.exists() {
            let content = fs::read_to_string(&path)
                .map_err(|e| GitSyncError::config(format!("Failed to read credentials: {e}")))?;
            serde_json::from_str(&content)
                .map_err(|e| GitSyncError::config(format!("Failed to parse credentials: {e}")))?
        } else {
            HashMap::new()
        };

        Ok(Self {
            cipher,
            oauth,
            states: Arc::new(OAuthStateStore::new()),
            path,
            records: Mutex::new(records),
        })
    }

    /// The CSRF state store, for wiring up the background sweeper.
    pub fn state_store(&self) -> &Arc<OAuthStateStore> {
        &self.states
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        self.cipher.encrypt(plaintext)
    }

    pub fn decrypt(&self, stored: &str) -> Result<String> {
        self.cipher.decrypt(stored)
    }

    /// Start an OAuth authorization flow: returns the provider authorize URL
    /// and the CSRF state to validate on callback.
    pub fn initiate_oauth_flow(
        &self,
        provider: GitProvider,
        user_id: Option<&str>,
        workflow_id: Option<&str>,
    ) -> Result<OAuthInitiation> {
        let state = oauth::random_state();
        let auth_url = self.oauth.authorize_url(provider, &state)?;

        self.states.insert(
            state.clone(),
            OAuthState {
                provider,
                user_id: user_id.map(str::to_string),
                workflow_id: workflow_id.map(str::to_string),
                created_at: Utc::now(),
            },
        );

        info!("Initiated OAuth flow with {provider}");
        Ok(OAuthInitiation { auth_url, state })
    }

    /// Single-use CSRF state validation; see [`OAuthStateStore::take`].
    pub fn validate_oauth_state(&self, state: &str) -> Option<OAuthState> {
        self.states.take(state)
    }

    /// Complete an OAuth flow: validates the CSRF state and exchanges the
    /// authorization code for tokens.
    pub async fn complete_oauth_flow(
        &self,
        provider: GitProvider,
        code: &str,
        state: &str,
    ) -> Result<GitCredential> {
        let stored = self
            .validate_oauth_state(state)
            .ok_or_else(|| GitSyncError::auth("Invalid or expired OAuth state"))?;
        if stored.provider != provider {
            return Err(GitSyncError::auth("OAuth state belongs to another provider"));
        }

        self.oauth.exchange_code(provider, code).await
    }

    pub async fn refresh_oauth_token(
        &self,
        provider: GitProvider,
        refresh_token: &str,
    ) -> Result<GitCredential> {
        self.oauth.refresh_token(provider, refresh_token).await
    }

    /// Store a credential (upsert), encrypting token material at rest.
    pub fn store_credentials(
        &self,
        user_id: &str,
        workflow_id: &str,
        credential: &GitCredential,
    ) -> Result<()> {
        let record = StoredCredentialRecord {
            kind: credential.kind,
            provider: credential.provider,
            token: self.cipher.encrypt(&credential.token)?,
            refresh_token: credential
                .refresh_token
                .as_deref()
                .map(|t| self.cipher.encrypt(t))
                .transpose()?,
            expires_at: credential.expires_at,
        };

        let snapshot = {
            let mut records = self.records.lock().unwrap();
            records.insert(record_key(user_id, workflow_id), record);
            records.clone()
        };
        self.persist(&snapshot)?;
        info!("Stored {} credential for workflow {workflow_id}", credential.provider);
        Ok(())
    }

    /// Fetch and decrypt a stored credential. An expired token is reported
    /// as absent so the caller re-authenticates instead of using stale data.
    pub fn get_credentials(
        &self,
        user_id: &str,
        workflow_id: &str,
    ) -> Result<Option<GitCredential>> {
        let record = {
            let records = self.records.lock().unwrap();
            records.get(&record_key(user_id, workflow_id)).cloned()
        };
        let Some(record) = record else {
            return Ok(None);
        };

        let credential = GitCredential {
            kind: record.kind,
            provider: record.provider,
            token: self.cipher.decrypt(&record.token)?,
            refresh_token: record
                .refresh_token
                .as_deref()
                .map(|t| self.cipher.decrypt(t))
                .transpose()?,
            expires_at: record.expires_at,
        };

        if credential.is_expired(Utc::now()) {
            return Ok(None);
        }
        Ok(Some(credential))
    }

    pub fn delete_credentials(&self, user_id: &str, workflow_id: &str) -> Result<bool> {
        let (removed, snapshot) = {
            let mut records = self.records.lock().unwrap();
            let removed = records.remove(&record_key(user_id, workflow_id)).is_some();
            (removed, records.clone())
        };
        if removed {
            self.persist(&snapshot)?;
            info!("Deleted credential for workflow {workflow_id}");
        }
        Ok(removed)
    }

    pub fn has_credentials(&self, user_id: &str, workflow_id: &str) -> bool {
        self.records
            .lock()
            .unwrap()
            .contains_key(&record_key(user_id, workflow_id))
    }

    fn persist(&self, records: &HashMap<String, StoredCredentialRecord>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                GitSyncError::config(format!("Failed to create credentials directory: {e}"))
            })?;
        }

        let content = serde_json::to_string_pretty(records)
            .map_err(|e| GitSyncError::config(format!("Failed to serialize credentials: {e}")))?;

        // Write to temporary file first, then rename for atomic write
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, content)
            .map_err(|e| GitSyncError::config(format!("Failed to write credentials: {e}")))?;
        fs::rename(&temp_path, &self.path)
            .map_err(|e| GitSyncError::config(format!("Failed to finalize credentials: {e}")))?;

        Ok(())
    }
}
