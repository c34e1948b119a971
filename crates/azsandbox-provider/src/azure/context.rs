//! Shared Azure credentials context
//!
//! Holds one HTTP client and a per-scope bearer token cache so the
//! management and storage calls share credentials.

use crate::config::AzureConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Scope for Azure Resource Manager calls
pub const MANAGEMENT_SCOPE: &str = "https://management.azure.com/.default";

/// Scope for blob storage calls
pub const STORAGE_SCOPE: &str = "https://storage.azure.com/.default";

const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";
const DEFAULT_MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";

/// Tokens are refreshed this long before they expire
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(300);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Shared Azure context for creating clients.
#[derive(Clone)]
pub struct AzureContext {
    http: reqwest::Client,
    config: Arc<AzureConfig>,
    authority: String,
    management_endpoint: String,
    tokens: Arc<Mutex<HashMap<String, CachedToken>>>,
}

impl AzureContext {
    pub fn new(config: AzureConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            config: Arc::new(config),
            authority: DEFAULT_AUTHORITY.to_string(),
            management_endpoint: DEFAULT_MANAGEMENT_ENDPOINT.to_string(),
            tokens: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Point the context at other endpoints (sovereign clouds)
    pub fn with_endpoints(
        mut self,
        authority: impl Into<String>,
        management_endpoint: impl Into<String>,
    ) -> Self {
        self.authority = authority.into();
        self.management_endpoint = management_endpoint.into();
        self
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn subscription_id(&self) -> &str {
        &self.config.subscription_id
    }

    pub fn management_endpoint(&self) -> &str {
        &self.management_endpoint
    }

    /// Bearer token for `scope`, fetched through the client-credentials flow
    /// and cached until shortly before expiry.
    pub async fn token(&self, scope: &str) -> Result<String> {
        let mut tokens = self.tokens.lock().await;
        if let Some(cached) = tokens.get(scope) {
            if Instant::now() < cached.refresh_at {
                return Ok(cached.value.clone());
            }
        }

        debug!(scope, "Requesting access token");
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority.trim_end_matches('/'),
            self.config.tenant_id
        );
        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("scope", scope),
            ])
            .send()
            .await
            .context("Failed to request access token")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Token request for {} failed with {}: {}", scope, status, body);
        }

        let token: TokenResponse = response
            .json()
            .await
            .context("Failed to parse token response")?;

        let lifetime = Duration::from_secs(token.expires_in);
        tokens.insert(
            scope.to_string(),
            CachedToken {
                value: token.access_token.clone(),
                refresh_at: Instant::now() + lifetime.saturating_sub(TOKEN_REFRESH_MARGIN),
            },
        );

        Ok(token.access_token)
    }
}

impl std::fmt::Debug for AzureContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureContext")
            .field("subscription_id", &self.config.subscription_id)
            .field("region", &self.config.region)
            .field("management_endpoint", &self.management_endpoint)
            .finish_non_exhaustive()
    }
}
