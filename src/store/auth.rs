// src/store/auth.rs
//! Service-account credentials for Firestore. Token minting and refresh are
//! handled by `google-cloud-auth`; this module loads the key file and hands
//! out `Authorization` header values.

use anyhow::{anyhow, bail, Context, Result};
use google_cloud_auth::{
    credentials::CredentialsFile, project::Config, token::DefaultTokenSourceProvider,
};
use google_cloud_token::{TokenSource, TokenSourceProvider};
use std::{fmt, path::Path, sync::Arc};
use tracing::debug;

pub const DATASTORE_SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/cloud-platform",
    "https://www.googleapis.com/auth/datastore",
];

/// A service account with a cached, self-refreshing token source.
pub struct ServiceAccount {
    project_id: String,
    client_email: String,
    tokens: Arc<dyn TokenSource>,
}

impl fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .finish_non_exhaustive()
    }
}

impl ServiceAccount {
    /// Load a downloaded key file. The private key is checked here; no token
    /// is fetched until the first request.
    pub async fn from_file(path: &Path) -> Result<Self> {
        let creds = read_credentials(path).await?;
        let (project_id, client_email) = service_account_identity(&creds)
            .with_context(|| format!("checking service account key {}", path.display()))?;

        let config = Config::default().with_scopes(&DATASTORE_SCOPES);
        let provider = DefaultTokenSourceProvider::new_with_credentials(config, Box::new(creds))
            .await
            .with_context(|| format!("building token source from {}", path.display()))?;

        Ok(Self {
            project_id,
            client_email,
            tokens: provider.token_source(),
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    /// `Bearer <token>`, refreshed by the token source when it nears expiry.
    pub async fn authorization(&self) -> Result<String> {
        let header = self
            .tokens
            .token()
            .await
            .map_err(|e| anyhow!("fetching access token for {}: {}", self.client_email, e))?;
        debug!(client = %self.client_email, "got access token");
        Ok(header)
    }
}

async fn read_credentials(path: &Path) -> Result<CredentialsFile> {
    if !path.is_file() {
        bail!("service account key {} not found", path.display());
    }
    CredentialsFile::new_from_file(path.to_string_lossy().to_string())
        .await
        .with_context(|| format!("parsing service account key {}", path.display()))
}

/// Project id and client email of a service-account key; other credential
/// kinds are rejected.
fn service_account_identity(creds: &CredentialsFile) -> Result<(String, String)> {
    if creds.tp != "service_account" {
        bail!("expected a service_account key, got `{}`", creds.tp);
    }
    let project_id = creds
        .project_id
        .clone()
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| anyhow!("service account key has no project_id"))?;
    let client_email = creds
        .client_email
        .clone()
        .ok_or_else(|| anyhow!("service account key has no client_email"))?;
    Ok((project_id, client_email))
}
