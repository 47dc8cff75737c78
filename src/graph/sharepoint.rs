//! SharePoint integration for the permission sweep
//!
//! Site collections are listed through Graph (`sites/getAllSites`). Permissions are read
//! and changed through each site's REST API (`{site}/_api/web/...`) with a token issued
//! for the site's host.

use crate::error::{Result, SweepError};
use crate::graph::auth::{TokenSource, GRAPH_RESOURCE};
use crate::graph::{GraphClient, PaginatedResponse, RetryPolicy, GRAPH_API_BASE};
use crate::sweep::model::SiteDescriptor;
use crate::sweep::provider::{
    Principal, PrincipalKind, RoleBinding, SiteGroup, SitePage, SiteSession, TenantSession,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// First page of the tenant-wide site list
pub const SITE_LIST_ENDPOINT: &str =
    "sites/getAllSites?$select=id,webUrl,displayName,name,isPersonalSite&$top=200";

const PERSONAL_SITE_MARKER: &str = "-my.sharepoint.com/personal/";

/// SharePoint site information
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub web_url: Option<String>,
    #[serde(default)]
    pub is_personal_site: Option<bool>,
}

impl Site {
    /// Sites without a web URL cannot be probed and are dropped
    pub fn into_descriptor(self) -> Option<SiteDescriptor> {
        let url = self.web_url.filter(|u| !u.is_empty())?;
        let personal = self.is_personal_site.unwrap_or(false) || is_personal_url(&url);
        let display_name = self
            .display_name
            .or(self.name)
            .unwrap_or_else(|| url.clone());
        Some(SiteDescriptor::new(&url, &display_name, personal))
    }
}

/// OneDrive sites live under `{tenant}-my.sharepoint.com/personal/`
pub fn is_personal_url(url: &str) -> bool {
    url.to_ascii_lowercase().contains(PERSONAL_SITE_MARKER)
}

/// Token resource for a site: its scheme and host
pub fn site_resource(site_url: &str) -> Result<String> {
    let parsed = reqwest::Url::parse(site_url)
        .map_err(|e| SweepError::InvalidConfig(format!("Invalid site URL '{}': {}", site_url, e)))?;
    if parsed.host_str().is_none() {
        return Err(SweepError::InvalidConfig(format!(
            "Site URL '{}' has no host",
            site_url
        )));
    }
    Ok(parsed.origin().ascii_serialization())
}

// ============================================================================
// SharePoint REST shapes (odata=nometadata)
// ============================================================================

/// SP.User / SP.Principal as returned by `siteusers`, group `users` and role assignment `Member`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SpPrincipal {
    pub id: i64,
    #[serde(default)]
    pub login_name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_principal_name: Option<String>,
    #[serde(default)]
    pub principal_type: i32,
    #[serde(default)]
    pub aad_object_id: Option<SpUserIdInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SpUserIdInfo {
    #[serde(default)]
    pub name_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SpGroup {
    pub id: i64,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SpRoleDefinition {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SpRoleAssignment {
    pub principal_id: i64,
    pub member: SpPrincipal,
    #[serde(default)]
    pub role_definition_bindings: Vec<SpRoleDefinition>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl From<SpPrincipal> for Principal {
    fn from(sp: SpPrincipal) -> Self {
        let kind = match sp.principal_type {
            1 => PrincipalKind::User,
            4 => PrincipalKind::SecurityGroup,
            8 => PrincipalKind::SharePointGroup,
            _ => PrincipalKind::Other,
        };
        Principal {
            id: sp.id,
            login_name: sp.login_name,
            title: sp.title,
            email: non_empty(sp.email),
            user_principal_name: non_empty(sp.user_principal_name),
            object_id: non_empty(sp.aad_object_id.and_then(|o| o.name_id)),
            kind,
        }
    }
}

impl From<SpRoleAssignment> for RoleBinding {
    fn from(sp: SpRoleAssignment) -> Self {
        let mut principal = Principal::from(sp.member);
        if principal.id == 0 {
            principal.id = sp.principal_id;
        }
        RoleBinding {
            principal,
            role_names: sp
                .role_definition_bindings
                .into_iter()
                .map(|r| r.name)
                .collect(),
        }
    }
}

// ============================================================================
// Tenant and site sessions
// ============================================================================

/// Tenant session backed by Graph for listing and SharePoint REST for each site
pub struct SharePointTenant {
    http: Client,
    tokens: Arc<dyn TokenSource>,
    graph_base: String,
    retry: RetryPolicy,
}

impl SharePointTenant {
    pub fn new(http: Client, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            http,
            tokens,
            graph_base: GRAPH_API_BASE.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_graph_base(mut self, graph_base: &str) -> Self {
        self.graph_base = graph_base.trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Graph client with a current token
    pub async fn graph(&self) -> Result<GraphClient> {
        let token = self.tokens.token_for(GRAPH_RESOURCE).await?;
        Ok(GraphClient::new(self.http.clone(), token)
            .with_base_url(&self.graph_base)
            .with_retry_policy(self.retry))
    }

    /// Open a site by URL without going through the site list
    pub async fn connect(&self, site_url: &str) -> Result<SharePointSite> {
        let resource = site_resource(site_url)?;
        let token = self.tokens.token_for(&resource).await?;
        let rest = GraphClient::for_site(self.http.clone(), token, site_url)
            .with_retry_policy(self.retry);

        // cheapest call that fails for deleted, locked or forbidden sites
        let web: SpWeb = rest.get("web?$select=Title,Url").await?;
        tracing::debug!(site = site_url, title = %web.title, "Connected to site");

        Ok(SharePointSite { rest })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SpWeb {
    #[serde(default)]
    title: String,
}

#[async_trait]
impl TenantSession for SharePointTenant {
    async fn list_sites_page(&self, next_link: Option<&str>) -> Result<SitePage> {
        let graph = self.graph().await?;
        let page: PaginatedResponse<Site> = graph.get(next_link.unwrap_or(SITE_LIST_ENDPOINT)).await?;

        let listed = page.value.len();
        let sites: Vec<SiteDescriptor> = page
            .value
            .into_iter()
            .filter_map(Site::into_descriptor)
            .collect();
        if sites.len() < listed {
            tracing::debug!(skipped = listed - sites.len(), "Skipped sites without a web URL");
        }

        Ok(SitePage {
            sites,
            next_link: page.next_link,
        })
    }

    async fn open_site(&self, site: &SiteDescriptor) -> Result<Box<dyn SiteSession>> {
        Ok(Box::new(self.connect(&site.url).await?))
    }
}

/// Site-scoped REST session; its token is valid for this site's host only
pub struct SharePointSite {
    rest: GraphClient,
}

impl SharePointSite {
    async fn principals(&self, endpoint: &str) -> Result<Vec<Principal>> {
        let users: Vec<SpPrincipal> = self.rest.get_all_pages(endpoint).await?;
        Ok(users.into_iter().map(Principal::from).collect())
    }
}

#[async_trait]
impl SiteSession for SharePointSite {
    async fn site_users(&self) -> Result<Vec<Principal>> {
        self.principals("web/siteusers").await
    }

    async fn site_groups(&self) -> Result<Vec<SiteGroup>> {
        let groups: Vec<SpGroup> = self
            .rest
            .get_all_pages("web/sitegroups?$select=Id,Title")
            .await?;
        Ok(groups
            .into_iter()
            .map(|g| SiteGroup {
                id: g.id,
                title: g.title,
            })
            .collect())
    }

    async fn group_members(&self, group: &SiteGroup) -> Result<Vec<Principal>> {
        self.principals(&format!("web/sitegroups/getbyid({})/users", group.id))
            .await
    }

    async fn site_admins(&self) -> Result<Vec<Principal>> {
        self.principals("web/siteusers?$filter=IsSiteAdmin%20eq%20true")
            .await
    }

    async fn role_assignments(&self) -> Result<Vec<RoleBinding>> {
        let assignments: Vec<SpRoleAssignment> = self
            .rest
            .get_all_pages("web/roleassignments?$expand=Member,RoleDefinitionBindings")
            .await?;
        Ok(assignments.into_iter().map(RoleBinding::from).collect())
    }

    async fn remove_group_member(&self, group_id: i64, principal_id: i64) -> Result<()> {
        self.rest
            .post_action(
                &format!(
                    "web/sitegroups/getbyid({})/users/removebyid({})",
                    group_id, principal_id
                ),
                None,
                &[],
            )
            .await
    }

    async fn demote_site_admin(&self, principal_id: i64) -> Result<()> {
        let body = serde_json::json!({ "IsSiteAdmin": false });
        self.rest
            .post_action(
                &format!("web/getuserbyid({})", principal_id),
                Some(&body),
                &[("X-HTTP-Method", "MERGE"), ("IF-MATCH", "*")],
            )
            .await
    }

    async fn revoke_role_binding(&self, principal_id: i64) -> Result<()> {
        self.rest
            .post_action(
                &format!("web/roleassignments/getbyprincipalid({})", principal_id),
                None,
                &[("X-HTTP-Method", "DELETE"), ("IF-MATCH", "*")],
            )
            .await
    }
}
