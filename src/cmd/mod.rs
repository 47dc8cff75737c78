//! Command implementations behind the `permsweep` CLI

pub mod lookup;
pub mod progress;
pub mod prompts;
pub mod report;
pub mod sites;
pub mod sweep;
pub mod tenant;

use crate::config::{ConfigManager, SweepDefaults};
use crate::error::Result;
use crate::graph::auth::{ClientCredentials, StaticToken, TokenSource};
use crate::graph::http_client;
use crate::graph::sharepoint::SharePointTenant;
use std::sync::Arc;
use std::time::Duration;

/// Bearer token for Graph, bypassing the configured client credentials
pub const ACCESS_TOKEN_ENV: &str = "PERMSWEEP_ACCESS_TOKEN";

/// Bearer token for SharePoint REST; falls back to the Graph token
pub const SITE_TOKEN_ENV: &str = "PERMSWEEP_SITE_TOKEN";

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

/// An authenticated tenant plus the defaults that apply to it
pub struct Session {
    pub tenant: SharePointTenant,
    pub defaults: SweepDefaults,
    /// Tenant name, or a note that an environment token is in use
    pub label: String,
}

fn env_token(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Pick the token source: environment tokens win over the named or active tenant
pub fn token_source(
    config_manager: &ConfigManager,
    tenant_name: Option<&str>,
) -> Result<(Arc<dyn TokenSource>, String)> {
    if let Some(token) = env_token(ACCESS_TOKEN_ENV) {
        tracing::debug!("Using bearer token from {}", ACCESS_TOKEN_ENV);
        let tokens = StaticToken::new(token, env_token(SITE_TOKEN_ENV));
        return Ok((Arc::new(tokens), format!("${}", ACCESS_TOKEN_ENV)));
    }

    let tenant = config_manager.resolve_tenant(tenant_name)?;
    let tokens = ClientCredentials::from_tenant(&tenant)?;
    Ok((Arc::new(tokens), tenant.name))
}

pub fn open_session(tenant_name: Option<&str>) -> Result<Session> {
    let config_manager = ConfigManager::new()?;
    let config = config_manager.load_config()?;
    let (tokens, label) = token_source(&config_manager, tenant_name)?;

    let http = http_client(Duration::from_secs(config.sweep.request_timeout_secs.max(1)))?;

    Ok(Session {
        tenant: SharePointTenant::new(http, tokens),
        defaults: config.sweep,
        label,
    })
}
