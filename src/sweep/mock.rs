//! In-memory tenant for sweep tests, with failure injection and concurrency instrumentation.

use crate::error::{Result, SweepError};
use crate::sweep::model::SiteDescriptor;
use crate::sweep::provider::{
    Principal, PrincipalKind, RoleBinding, SiteGroup, SitePage, SiteSession, TenantSession,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TENANT_HOST: &str = "https://contoso.sharepoint.com";

pub fn site_url(name: &str) -> String {
    format!("{}/sites/{}", TENANT_HOST, name)
}

pub fn login(upn: &str) -> String {
    format!("i:0#.f|membership|{}", upn)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    SiteUsers,
    SiteGroups,
    SiteAdmins,
    RoleAssignments,
}

#[derive(Default)]
struct MockSite {
    open_failure: Option<u16>,
    panic_on_open: bool,
    users: Vec<Principal>,
    groups: Vec<(SiteGroup, Vec<i64>)>,
    admins: Vec<i64>,
    bindings: Vec<(i64, Vec<String>)>,
    failing_steps: Vec<Step>,
    fail_removals: bool,
    next_id: i64,
}

impl MockSite {
    fn user_id(&mut self, upn: &str) -> i64 {
        let login = login(upn);
        if let Some(user) = self.users.iter().find(|u| u.login_name == login) {
            return user.id;
        }
        self.next_id += 1;
        let id = self.next_id;
        self.users.push(Principal {
            id,
            login_name: login,
            title: upn.to_string(),
            email: Some(upn.to_string()),
            user_principal_name: Some(upn.to_string()),
            object_id: None,
            kind: PrincipalKind::User,
        });
        id
    }

    fn group_id(&mut self, title: &str) -> i64 {
        if let Some((group, _)) = self.groups.iter().find(|(g, _)| g.title == title) {
            return group.id;
        }
        let id = 100 + self.groups.len() as i64;
        self.groups.push((
            SiteGroup {
                id,
                title: title.to_string(),
            },
            Vec::new(),
        ));
        id
    }

    fn principal(&self, id: i64) -> Option<Principal> {
        if let Some(user) = self.users.iter().find(|u| u.id == id) {
            return Some(user.clone());
        }
        self.groups
            .iter()
            .find(|(g, _)| g.id == id)
            .map(|(g, _)| Principal {
                id: g.id,
                login_name: g.title.clone(),
                title: g.title.clone(),
                email: None,
                user_principal_name: None,
                object_id: None,
                kind: PrincipalKind::SharePointGroup,
            })
    }

    fn check(&self, step: Step) -> Result<()> {
        if self.failing_steps.contains(&step) {
            return Err(SweepError::ApiError {
                status: 500,
                message: format!("{:?} unavailable", step),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
struct TenantState {
    sites: HashMap<String, MockSite>,
    removal_calls: Vec<String>,
}

pub struct MockTenant {
    listing: Vec<SiteDescriptor>,
    page_size: usize,
    failing_page: Option<usize>,
    probe_delay: Duration,
    state: Arc<Mutex<TenantState>>,
    pages_fetched: AtomicUsize,
    sites_opened: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl Default for MockTenant {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTenant {
    pub fn new() -> Self {
        Self {
            listing: Vec::new(),
            page_size: 100,
            failing_page: None,
            probe_delay: Duration::ZERO,
            state: Arc::new(Mutex::new(TenantState::default())),
            pages_fetched: AtomicUsize::new(0),
            sites_opened: Arc::new(AtomicUsize::new(0)),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn site_mut<R>(&self, name: &str, f: impl FnOnce(&mut MockSite) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        let site = state.sites.entry(site_url(name)).or_default();
        f(site)
    }

    pub fn with_sites(mut self, names: &[&str]) -> Self {
        for name in names {
            self.listing
                .push(SiteDescriptor::new(&site_url(name), name, false));
            self.site_mut(name, |_| ());
        }
        self
    }

    pub fn with_personal_site(mut self, owner: &str) -> Self {
        let url = format!(
            "https://contoso-my.sharepoint.com/personal/{}_contoso_com",
            owner
        );
        self.listing.push(SiteDescriptor::new(&url, owner, true));
        self.state
            .lock()
            .unwrap()
            .sites
            .entry(url)
            .or_default();
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Fail the page with this zero-based index
    pub fn fail_page(mut self, index: usize) -> Self {
        self.failing_page = Some(index);
        self
    }

    pub fn with_probe_delay(mut self, delay: Duration) -> Self {
        self.probe_delay = delay;
        self
    }

    /// Add a site user without any permission
    pub fn with_user(self, site: &str, upn: &str) -> Self {
        self.site_mut(site, |s| {
            s.user_id(upn);
        });
        self
    }

    pub fn with_group_member(self, site: &str, group: &str, upn: &str) -> Self {
        self.site_mut(site, |s| {
            let uid = s.user_id(upn);
            let gid = s.group_id(group);
            if let Some((_, members)) = s.groups.iter_mut().find(|(g, _)| g.id == gid) {
                members.push(uid);
            }
        });
        self
    }

    pub fn with_site_admin(self, site: &str, upn: &str) -> Self {
        self.site_mut(site, |s| {
            let uid = s.user_id(upn);
            s.admins.push(uid);
        });
        self
    }

    pub fn with_direct_role(self, site: &str, upn: &str, role: &str) -> Self {
        self.site_mut(site, |s| {
            let uid = s.user_id(upn);
            s.bindings.push((uid, vec![role.to_string()]));
        });
        self
    }

    pub fn with_group_role(self, site: &str, group: &str, role: &str) -> Self {
        self.site_mut(site, |s| {
            let gid = s.group_id(group);
            s.bindings.push((gid, vec![role.to_string()]));
        });
        self
    }

    /// Make opening the site fail with the given HTTP status
    pub fn fail_open(self, site: &str, status: u16) -> Self {
        self.site_mut(site, |s| s.open_failure = Some(status));
        self
    }

    /// Make the task that opens the site panic
    pub fn panic_on_open(self, site: &str) -> Self {
        self.site_mut(site, |s| s.panic_on_open = true);
        self
    }

    pub fn fail_step(self, site: &str, step: Step) -> Self {
        self.site_mut(site, |s| s.failing_steps.push(step));
        self
    }

    pub fn fail_removals(self, site: &str) -> Self {
        self.site_mut(site, |s| s.fail_removals = true);
        self
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched.load(Ordering::SeqCst)
    }

    pub fn sites_opened(&self) -> usize {
        self.sites_opened.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_probes(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn removal_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().removal_calls.clone()
    }
}

#[async_trait]
impl TenantSession for MockTenant {
    async fn list_sites_page(&self, next_link: Option<&str>) -> Result<SitePage> {
        let index: usize = match next_link {
            None => 0,
            Some(link) => link
                .rsplit('=')
                .next()
                .and_then(|n| n.parse().ok())
                .ok_or_else(|| SweepError::ApiError {
                    status: 400,
                    message: format!("bad nextLink {}", link),
                })?,
        };
        self.pages_fetched.fetch_add(1, Ordering::SeqCst);

        if self.failing_page == Some(index) {
            return Err(SweepError::ApiError {
                status: 503,
                message: "site listing unavailable".into(),
            });
        }

        let start = index * self.page_size;
        let end = (start + self.page_size).min(self.listing.len());
        let sites = self.listing.get(start..end).unwrap_or_default().to_vec();
        let next_link = (end < self.listing.len())
            .then(|| format!("https://graph.mock/sites?page={}", index + 1));

        Ok(SitePage { sites, next_link })
    }

    async fn open_site(&self, site: &SiteDescriptor) -> Result<Box<dyn SiteSession>> {
        self.sites_opened.fetch_add(1, Ordering::SeqCst);

        let (open_failure, panics) = {
            let state = self.state.lock().unwrap();
            state
                .sites
                .get(&site.url)
                .map(|s| (s.open_failure, s.panic_on_open))
                .unwrap_or((Some(404), false))
        };
        if panics {
            panic!("mock tenant panicked opening {}", site.url);
        }
        if let Some(status) = open_failure {
            return Err(SweepError::ApiError {
                status,
                message: match status {
                    403 => "access denied".into(),
                    404 => "site not found".into(),
                    429 => "too many requests".into(),
                    _ => "service unavailable".into(),
                },
            });
        }

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        Ok(Box::new(MockSiteSession {
            url: site.url.clone(),
            state: self.state.clone(),
            active: self.active.clone(),
            delay: self.probe_delay,
        }))
    }
}

struct MockSiteSession {
    url: String,
    state: Arc<Mutex<TenantState>>,
    active: Arc<AtomicUsize>,
    delay: Duration,
}

impl Drop for MockSiteSession {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockSiteSession {
    fn with_site<R>(&self, f: impl FnOnce(&mut MockSite) -> Result<R>) -> Result<R> {
        let mut state = self.state.lock().unwrap();
        let site = state
            .sites
            .get_mut(&self.url)
            .ok_or_else(|| SweepError::ApiError {
                status: 404,
                message: "site not found".into(),
            })?;
        f(site)
    }

    fn removal(&self, call: String, f: impl FnOnce(&mut MockSite)) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.removal_calls.push(call);
        let site = state.sites.get_mut(&self.url).ok_or(SweepError::ApiError {
            status: 404,
            message: "site not found".into(),
        })?;
        if site.fail_removals {
            return Err(SweepError::ApiError {
                status: 409,
                message: "save conflict".into(),
            });
        }
        f(site);
        Ok(())
    }
}

#[async_trait]
impl SiteSession for MockSiteSession {
    async fn site_users(&self) -> Result<Vec<Principal>> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.with_site(|s| {
            s.check(Step::SiteUsers)?;
            Ok(s.users.clone())
        })
    }

    async fn site_groups(&self) -> Result<Vec<SiteGroup>> {
        self.with_site(|s| {
            s.check(Step::SiteGroups)?;
            Ok(s.groups.iter().map(|(g, _)| g.clone()).collect())
        })
    }

    async fn group_members(&self, group: &SiteGroup) -> Result<Vec<Principal>> {
        self.with_site(|s| {
            let members = s
                .groups
                .iter()
                .find(|(g, _)| g.id == group.id)
                .map(|(_, m)| m.clone())
                .unwrap_or_default();
            Ok(members.into_iter().filter_map(|id| s.principal(id)).collect())
        })
    }

    async fn site_admins(&self) -> Result<Vec<Principal>> {
        self.with_site(|s| {
            s.check(Step::SiteAdmins)?;
            Ok(s.admins.iter().filter_map(|id| s.principal(*id)).collect())
        })
    }

    async fn role_assignments(&self) -> Result<Vec<RoleBinding>> {
        self.with_site(|s| {
            s.check(Step::RoleAssignments)?;
            Ok(s.bindings
                .iter()
                .filter_map(|(id, roles)| {
                    s.principal(*id).map(|principal| RoleBinding {
                        principal,
                        role_names: roles.clone(),
                    })
                })
                .collect())
        })
    }

    async fn remove_group_member(&self, group_id: i64, principal_id: i64) -> Result<()> {
        self.removal(
            format!("{} remove-group-member {} {}", self.url, group_id, principal_id),
            |s| {
                if let Some((_, members)) = s.groups.iter_mut().find(|(g, _)| g.id == group_id) {
                    members.retain(|m| *m != principal_id);
                }
            },
        )
    }

    async fn demote_site_admin(&self, principal_id: i64) -> Result<()> {
        self.removal(
            format!("{} demote-site-admin {}", self.url, principal_id),
            |s| s.admins.retain(|a| *a != principal_id),
        )
    }

    async fn revoke_role_binding(&self, principal_id: i64) -> Result<()> {
        self.removal(
            format!("{} revoke-role-binding {}", self.url, principal_id),
            |s| s.bindings.retain(|(id, _)| *id != principal_id),
        )
    }
}
