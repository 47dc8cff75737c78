//! Provider seam: what a sweep needs from the tenant and from one site.
//!
//! The SharePoint implementation lives in `graph::sharepoint`; tests use an in-memory tenant.

use crate::error::Result;
use crate::sweep::model::SiteDescriptor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrincipalKind {
    User,
    SecurityGroup,
    SharePointGroup,
    Other,
}

/// A user or group as seen by one site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    /// Site-local principal id
    pub id: i64,
    pub login_name: String,
    pub title: String,
    pub email: Option<String>,
    pub user_principal_name: Option<String>,
    pub object_id: Option<String>,
    pub kind: PrincipalKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteGroup {
    pub id: i64,
    pub title: String,
}

/// A role binding on the site root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleBinding {
    pub principal: Principal,
    pub role_names: Vec<String>,
}

/// One page of the tenant's site list
#[derive(Debug, Clone, Default)]
pub struct SitePage {
    pub sites: Vec<SiteDescriptor>,
    pub next_link: Option<String>,
}

/// Tenant-scoped handle: lists sites and hands out site-scoped sessions.
///
/// Shared read-only by every worker of a sweep.
#[async_trait]
pub trait TenantSession: Send + Sync {
    /// Fetch one page of site collections; `None` requests the first page
    async fn list_sites_page(&self, next_link: Option<&str>) -> Result<SitePage>;

    /// Open a session scoped to one site. Dropped when the probe of that site ends.
    async fn open_site(&self, site: &SiteDescriptor) -> Result<Box<dyn SiteSession>>;
}

/// Permission queries and removals against a single site collection
#[async_trait]
pub trait SiteSession: Send + Sync {
    async fn site_users(&self) -> Result<Vec<Principal>>;

    async fn site_groups(&self) -> Result<Vec<SiteGroup>>;

    async fn group_members(&self, group: &SiteGroup) -> Result<Vec<Principal>>;

    async fn site_admins(&self) -> Result<Vec<Principal>>;

    async fn role_assignments(&self) -> Result<Vec<RoleBinding>>;

    async fn remove_group_member(&self, group_id: i64, principal_id: i64) -> Result<()>;

    async fn demote_site_admin(&self, principal_id: i64) -> Result<()>;

    /// Remove every role binding the principal holds on the site root
    async fn revoke_role_binding(&self, principal_id: i64) -> Result<()>;
}
