use crate::config::TenantConfig;
use crate::error::{Result, SweepError};
use async_trait::async_trait;
use oauth2::{
    basic::BasicClient, reqwest::async_http_client, AuthUrl, ClientId, ClientSecret, Scope,
    TokenResponse, TokenUrl,
};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

pub const MICROSOFT_AUTHORITY: &str = "https://login.microsoftonline.com";
pub const GRAPH_RESOURCE: &str = "https://graph.microsoft.com";

/// Tokens are refreshed this long before they actually expire
const EXPIRY_MARGIN: Duration = Duration::from_secs(120);

/// Source of bearer tokens for a resource (`https://graph.microsoft.com`,
/// `https://contoso.sharepoint.com`, ...)
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token_for(&self, resource: &str) -> Result<String>;
}

/// Scope string requested for a resource
pub fn default_scope(resource: &str) -> String {
    format!("{}/.default", resource.trim_end_matches('/'))
}

/// App-only tokens through the OAuth2 client credentials grant
///
/// Tokens are cached per resource until shortly before expiry; a Graph token is
/// never handed out for a SharePoint call or the other way round.
pub struct ClientCredentials {
    tenant_id: String,
    client_id: String,
    client_secret: String,
    authority: String,
    cache: RwLock<HashMap<String, (String, Instant)>>,
}

impl ClientCredentials {
    pub fn new(tenant_id: &str, client_id: &str, client_secret: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            authority: MICROSOFT_AUTHORITY.to_string(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_tenant(tenant: &TenantConfig) -> Result<Self> {
        let secret = tenant.client_secret.as_deref().ok_or_else(|| {
            SweepError::AuthError(format!(
                "Tenant '{}' has no client secret configured",
                tenant.name
            ))
        })?;
        Ok(Self::new(&tenant.tenant_id, &tenant.client_id, secret))
    }

    /// Override the identity provider base URL
    pub fn with_authority(mut self, authority: &str) -> Self {
        self.authority = authority.trim_end_matches('/').to_string();
        self
    }

    async fn request_token(&self, resource: &str) -> Result<(String, Instant)> {
        let auth_url = AuthUrl::new(format!(
            "{}/{}/oauth2/v2.0/authorize",
            self.authority, self.tenant_id
        ))
        .map_err(|e| SweepError::AuthError(format!("Invalid auth URL: {}", e)))?;

        let token_url = TokenUrl::new(format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority, self.tenant_id
        ))
        .map_err(|e| SweepError::AuthError(format!("Invalid token URL: {}", e)))?;

        let client = BasicClient::new(
            ClientId::new(self.client_id.clone()),
            Some(ClientSecret::new(self.client_secret.clone())),
            auth_url,
            Some(token_url),
        );

        let token = client
            .exchange_client_credentials()
            .add_scope(Scope::new(default_scope(resource)))
            .request_async(async_http_client)
            .await
            .map_err(|e| {
                SweepError::AuthError(format!("Client credentials exchange failed: {}", e))
            })?;

        let lifetime = token.expires_in().unwrap_or(Duration::from_secs(3600));
        let expires_at = Instant::now() + lifetime.saturating_sub(EXPIRY_MARGIN);

        Ok((token.access_token().secret().clone(), expires_at))
    }
}

#[async_trait]
impl TokenSource for ClientCredentials {
    async fn token_for(&self, resource: &str) -> Result<String> {
        {
            let cache = self.cache.read().await;
            if let Some((token, expires_at)) = cache.get(resource) {
                if *expires_at > Instant::now() {
                    return Ok(token.clone());
                }
            }
        }

        tracing::debug!(resource, "Requesting app-only token");
        let (token, expires_at) = self.request_token(resource).await?;

        self.cache
            .write()
            .await
            .insert(resource.to_string(), (token.clone(), expires_at));

        Ok(token)
    }
}

/// Pre-issued bearer tokens, one for Graph and optionally one for SharePoint
pub struct StaticToken {
    graph_token: String,
    site_token: Option<String>,
}

impl StaticToken {
    pub fn new(graph_token: String, site_token: Option<String>) -> Self {
        Self {
            graph_token,
            site_token,
        }
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token_for(&self, resource: &str) -> Result<String> {
        if resource.trim_end_matches('/') == GRAPH_RESOURCE {
            return Ok(self.graph_token.clone());
        }
        Ok(self
            .site_token
            .clone()
            .unwrap_or_else(|| self.graph_token.clone()))
    }
}
