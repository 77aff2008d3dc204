//! OAuth authorization-code flow against GitHub/GitLab/Bitbucket, plus the
//! single-use CSRF state store with its background sweeper.

use crate::errors::{GitSyncError, Result};
use crate::settings::{OAuthProviderSettings, OAuthSettings};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::RngCore;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Entries older than this are rejected and evicted.
pub const STATE_TTL: Duration = Duration::from_secs(10 * 60);
/// How often the background sweeper evicts unconsumed entries.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Supported Git hosting providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GitProvider {
    Github,
    Gitlab,
    Bitbucket,
}

impl GitProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            GitProvider::Github => "github",
            GitProvider::Gitlab => "gitlab",
            GitProvider::Bitbucket => "bitbucket",
        }
    }

    /// Fixed credential-type → provider table. Unmapped types default to
    /// GitHub.
    pub fn from_credential_type(credential_type: &str) -> Self {
        match credential_type {
            "githubOAuth2" | "githubPAT" => GitProvider::Github,
            "gitlabOAuth2" | "gitlabPAT" => GitProvider::Gitlab,
            "bitbucketOAuth2" | "bitbucketPAT" => GitProvider::Bitbucket,
            _ => GitProvider::Github,
        }
    }

    fn default_authorize_url(&self) -> &'static str {
        match self {
            GitProvider::Github => "https://github.com/login/oauth/authorize",
            GitProvider::Gitlab => "https://gitlab.com/oauth/authorize",
            GitProvider::Bitbucket => "https://bitbucket.org/site/oauth2/authorize",
        }
    }

    fn default_token_url(&self) -> &'static str {
        match self {
            GitProvider::Github => "https://github.com/login/oauth/access_token",
            GitProvider::Gitlab => "https://gitlab.com/oauth/token",
            GitProvider::Bitbucket => "https://bitbucket.org/site/oauth2/access_token",
        }
    }
}

impl fmt::Display for GitProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credential kind as consumed by the git layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    PersonalAccessToken,
    Oauth,
}

/// Decrypted Git credential.
#[derive(Debug, Clone)]
pub struct GitCredential {
    pub kind: CredentialKind,
    pub provider: GitProvider,
    pub token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl GitCredential {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// CSRF handshake record, keyed by the random `state` value.
#[derive(Debug, Clone)]
pub struct OAuthState {
    pub provider: GitProvider,
    pub user_id: Option<String>,
    pub workflow_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// TTL-aware single-use store for OAuth CSRF states.
///
/// Injected rather than process-global so it can be swapped for a durable
/// backend and exercised in tests without timers. Entries are consumed
/// atomically on lookup; the sweeper only catches states that were never
/// redeemed.
#[derive(Default)]
pub struct OAuthStateStore {
    entries: Mutex<HashMap<String, OAuthState>>,
}

impl OAuthStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, state: String, record: OAuthState) {
        self.entries.lock().unwrap().insert(state, record);
    }

    fn ttl() -> ChronoDuration {
        ChronoDuration::seconds(STATE_TTL.as_secs() as i64)
    }

    /// Single-use lookup: the entry is removed whether or not the TTL check
    /// passes. Returns `None` for unknown or expired states.
    pub fn take(&self, state: &str) -> Option<OAuthState> {
        let record = self.entries.lock().unwrap().remove(state)?;
        let age = Utc::now().signed_duration_since(record.created_at);
        if age > Self::ttl() {
            debug!("Rejected expired OAuth state");
            return None;
        }
        Some(record)
    }

    /// Evict entries older than the TTL. Returns the number evicted.
    pub fn sweep(&self) -> usize {
        let cutoff = Utc::now() - Self::ttl();
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, record| record.created_at >= cutoff);
        before - entries.len()
    }

    /// Spawn the periodic sweep task. The task runs until the handle is
    /// aborted or the store is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else { break };
                let evicted = store.sweep();
                if evicted > 0 {
                    debug!("Evicted {evicted} stale OAuth state(s)");
                }
            }
        })
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

/// Result of starting an OAuth flow.
#[derive(Debug, Clone)]
pub struct OAuthInitiation {
    pub auth_url: String,
    pub state: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Client for the provider OAuth endpoints.
pub struct OAuthClient {
    client: Client,
    settings: OAuthSettings,
}

impl OAuthClient {
    pub fn new(settings: OAuthSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GitSyncError::config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, settings })
    }

    fn provider_settings(&self, provider: GitProvider) -> Result<&OAuthProviderSettings> {
        let settings = match provider {
            GitProvider::Github => self.settings.github.as_ref(),
            GitProvider::Gitlab => self.settings.gitlab.as_ref(),
            GitProvider::Bitbucket => self.settings.bitbucket.as_ref(),
        };
        settings.ok_or_else(|| {
            GitSyncError::config(format!("No OAuth client configured for {provider}"))
        })
    }

    /// Build the provider authorization URL for a fresh `state` value.
    pub fn authorize_url(&self, provider: GitProvider, state: &str) -> Result<String> {
        let settings = self.provider_settings(provider)?;
        if settings.client_id.is_empty() {
            return Err(GitSyncError::config(format!(
                "No OAuth client id configured for {provider}"
            )));
        }

        let base = settings
            .authorize_url
            .as_deref()
            .unwrap_or_else(|| provider.default_authorize_url());
        let mut url = Url::parse(base)?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &settings.client_id);
            query.append_pair("state", state);
            match provider {
                GitProvider::Github => {
                    query.append_pair("scope", "repo");
                }
                GitProvider::Gitlab => {
                    query.append_pair("response_type", "code");
                    query.append_pair("scope", "api");
                    if let Some(redirect) = &settings.redirect_uri {
                        query.append_pair("redirect_uri", redirect);
                    }
                }
                GitProvider::Bitbucket => {
                    query.append_pair("response_type", "code");
                }
            }
        }

        Ok(url.into())
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(&self, provider: GitProvider, code: &str) -> Result<GitCredential> {
        let settings = self.provider_settings(provider)?;
        let token_url = settings
            .token_url
            .as_deref()
            .unwrap_or_else(|| provider.default_token_url());
        debug!("Exchanging OAuth code with {provider}");

        let request = match provider {
            GitProvider::Github => {
                let mut params = vec![
                    ("client_id", settings.client_id.as_str()),
                    ("client_secret", settings.client_secret.as_str()),
                    ("code", code),
                ];
                if let Some(redirect) = &settings.redirect_uri {
                    params.push(("redirect_uri", redirect));
                }
                self.client
                    .post(token_url)
                    .header(reqwest::header::ACCEPT, "application/json")
                    .form(&params)
            }
            GitProvider::Gitlab => {
                let mut params = vec![
                    ("client_id", settings.client_id.as_str()),
                    ("client_secret", settings.client_secret.as_str()),
                    ("code", code),
                    ("grant_type", "authorization_code"),
                ];
                if let Some(redirect) = &settings.redirect_uri {
                    params.push(("redirect_uri", redirect));
                }
                self.client.post(token_url).form(&params)
            }
            GitProvider::Bitbucket => self
                .client
                .post(token_url)
                .basic_auth(&settings.client_id, Some(&settings.client_secret))
                .form(&[("grant_type", "authorization_code"), ("code", code)]),
        };

        let credential = self
            .token_request(provider, request, CredentialKind::Oauth, None)
            .await?;
        info!("Completed OAuth token exchange with {provider}");
        Ok(credential)
    }

    /// Exchange a refresh token for a fresh access token.
    ///
    /// GitHub OAuth apps issue non-expiring tokens with no refresh grant, so
    /// a GitHub refresh fails immediately.
    pub async fn refresh_token(
        &self,
        provider: GitProvider,
        refresh_token: &str,
    ) -> Result<GitCredential> {
        if provider == GitProvider::Github {
            return Err(GitSyncError::auth(
                "GitHub OAuth tokens cannot be refreshed; re-authorize to obtain a new token",
            ));
        }

        let settings = self.provider_settings(provider)?;
        let token_url = settings
            .token_url
            .as_deref()
            .unwrap_or_else(|| provider.default_token_url());
        debug!("Refreshing OAuth token with {provider}");

        let request = match provider {
            GitProvider::Gitlab => self.client.post(token_url).form(&[
                ("client_id", settings.client_id.as_str()),
                ("client_secret", settings.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ]),
            GitProvider::Bitbucket => self
                .client
                .post(token_url)
                .basic_auth(&settings.client_id, Some(&settings.client_secret))
                .form(&[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token),
                ]),
            GitProvider::Github => unreachable!(),
        };

        self.token_request(
            provider,
            request,
            CredentialKind::Oauth,
            Some(refresh_token),
        )
        .await
    }

    async fn token_request(
        &self,
        provider: GitProvider,
        request: reqwest::RequestBuilder,
        kind: CredentialKind,
        previous_refresh_token: Option<&str>,
    ) -> Result<GitCredential> {
        let response = request
            .send()
            .await
            .map_err(|e| GitSyncError::network(format!("{provider} token request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GitSyncError::network(format!("{provider} token response unreadable: {e}")))?;

        if !status.is_success() {
            return Err(GitSyncError::provider_api(
                provider.as_str(),
                status.as_u16(),
                body,
            ));
        }

        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            GitSyncError::auth(format!("{provider} returned an unparseable token response: {e}"))
        })?;

        if let Some(error) = parsed.error {
            let detail = parsed.error_description.unwrap_or_default();
            return Err(GitSyncError::auth(format!(
                "{provider} rejected the token request: {error} {detail}"
            )));
        }

        let token = parsed.access_token.ok_or_else(|| {
            GitSyncError::auth(format!("{provider} returned no access token"))
        })?;

        if parsed.refresh_token.is_none() && previous_refresh_token.is_some() {
            warn!("{provider} omitted a new refresh token, keeping the previous one");
        }

        Ok(GitCredential {
            kind,
            provider,
            token,
            refresh_token: parsed
                .refresh_token
                .or_else(|| previous_refresh_token.map(str::to_string)),
            expires_at: parsed
                .expires_in
                .map(|secs| Utc::now() + ChronoDuration::seconds(secs)),
        })
    }
}

/// 32 random bytes, hex encoded, for CSRF states.
pub fn random_state() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
