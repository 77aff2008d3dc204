use crate::errors::{GitSyncError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level settings for the git sync subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitSyncSettings {
    /// Directory for subsystem state (config rows, stored credentials).
    pub data_dir: PathBuf,
    /// Directory under which per-workflow working copies live.
    pub repos_dir: PathBuf,
    /// Symmetric key for credential encryption at rest.
    /// Either 64 hex characters (32 raw bytes) or any string of at least
    /// 32 characters, of which the first 32 bytes are used.
    pub encryption_key: String,
    pub oauth: OAuthSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OAuthSettings {
    pub github: Option<OAuthProviderSettings>,
    pub gitlab: Option<OAuthProviderSettings>,
    pub bitbucket: Option<OAuthProviderSettings>,
}

/// Per-provider OAuth application settings.
///
/// `authorize_url` / `token_url` default to the provider's public endpoints
/// and only need to be set for self-hosted instances (or tests).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthProviderSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: Option<String>,
    pub authorize_url: Option<String>,
    pub token_url: Option<String>,
}

impl GitSyncSettings {
    pub fn new<P: Into<PathBuf>>(data_dir: P, encryption_key: impl Into<String>) -> Self {
        let data_dir = data_dir.into();
        let repos_dir = data_dir.join("repositories");
        Self {
            data_dir,
            repos_dir,
            encryption_key: encryption_key.into(),
            oauth: OAuthSettings::default(),
        }
    }

    /// Load settings from a JSON file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| GitSyncError::config(format!("Failed to read settings: {e}")))?;
        serde_json::from_str(&content)
            .map_err(|e| GitSyncError::config(format!("Failed to parse settings: {e}")))
    }

    /// Save settings to a JSON file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                GitSyncError::config(format!("Failed to create settings directory: {e}"))
            })?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| GitSyncError::config(format!("Failed to serialize settings: {e}")))?;

        // Write to temporary file first, then rename for atomic write
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, content)
            .map_err(|e| GitSyncError::config(format!("Failed to write settings: {e}")))?;
        fs::rename(&temp_path, path)
            .map_err(|e| GitSyncError::config(format!("Failed to finalize settings: {e}")))?;

        Ok(())
    }
}
