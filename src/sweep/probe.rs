//! Per-site permission probe.

use crate::sweep::identity::IdentityMatcher;
use crate::sweep::model::{MatchKind, PermissionMatch, SiteDescriptor, SiteError, SiteOutcome};
use crate::sweep::provider::{PrincipalKind, SiteSession, TenantSession};
use serde::Serialize;
use std::fmt;

/// Role SharePoint grants automatically when an item below the site is shared
pub const LIMITED_ACCESS_ROLE: &str = "Limited Access";

pub const SITE_ADMIN_ROLE: &str = "Site Collection Administrator";

#[derive(Debug, Clone, Copy, Default)]
pub struct ProbeOptions {
    pub remove_on_match: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ProbeStep {
    Connect,
    SiteUsers,
    SiteGroups,
    GroupMembers(String),
    SiteAdmins,
    RoleAssignments,
}

impl fmt::Display for ProbeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeStep::Connect => write!(f, "connect"),
            ProbeStep::SiteUsers => write!(f, "site users"),
            ProbeStep::SiteGroups => write!(f, "site groups"),
            ProbeStep::GroupMembers(group) => write!(f, "members of '{}'", group),
            ProbeStep::SiteAdmins => write!(f, "site admins"),
            ProbeStep::RoleAssignments => write!(f, "role assignments"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeFailure {
    pub step: ProbeStep,
    pub message: String,
    pub unreachable: bool,
}

/// Tagged outcome of one probe
#[derive(Debug, Clone)]
pub enum ProbeOutcome {
    NoMatch,
    Matches(Vec<PermissionMatch>),
    Error(String),
}

/// Everything learned about one site
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub site: SiteDescriptor,
    pub matches: Vec<PermissionMatch>,
    pub failures: Vec<ProbeFailure>,
    /// Whether the target is in the site user list; `None` if that could not be determined
    pub user_present: Option<bool>,
}

impl ProbeReport {
    fn new(site: &SiteDescriptor) -> Self {
        Self {
            site: site.clone(),
            matches: Vec::new(),
            failures: Vec::new(),
            user_present: None,
        }
    }

    fn fail(&mut self, step: ProbeStep, error: &crate::error::SweepError, unreachable: bool) {
        tracing::debug!(site = %self.site.url, step = %step, error = %error, "Probe step failed");
        self.failures.push(ProbeFailure {
            step,
            message: error.to_string(),
            unreachable,
        });
    }

    pub fn outcome(&self) -> SiteOutcome {
        if !self.matches.is_empty() {
            SiteOutcome::Matched
        } else if !self.failures.is_empty() {
            SiteOutcome::Inconclusive
        } else {
            SiteOutcome::Clean
        }
    }

    /// Collapse the report into its tag. Partial failures on a matched site are dropped;
    /// use [`ProbeReport::site_error`] to keep them.
    pub fn into_outcome(self) -> ProbeOutcome {
        if !self.matches.is_empty() {
            ProbeOutcome::Matches(self.matches)
        } else if let Some(error) = self.site_error() {
            ProbeOutcome::Error(error.message)
        } else {
            ProbeOutcome::NoMatch
        }
    }

    /// One error entry summarising every failed step, if any
    pub fn site_error(&self) -> Option<SiteError> {
        if self.failures.is_empty() {
            return None;
        }
        let message = self
            .failures
            .iter()
            .map(|f| format!("{}: {}", f.step, f.message))
            .collect::<Vec<_>>()
            .join("; ");
        Some(SiteError {
            site: self.site.clone(),
            message,
            unreachable: self.failures.iter().any(|f| f.unreachable),
        })
    }
}

/// Probe one site for permissions held by the target.
///
/// Never fails: a site that cannot be opened, or a step that errors, is recorded in
/// `failures` and the remaining steps still run.
pub async fn probe_site(
    tenant: &dyn TenantSession,
    site: &SiteDescriptor,
    target: &IdentityMatcher,
    options: &ProbeOptions,
) -> ProbeReport {
    let mut report = ProbeReport::new(site);

    let session = match tenant.open_site(site).await {
        Ok(session) => session,
        Err(e) => {
            let unreachable = e.is_site_unreachable();
            report.fail(ProbeStep::Connect, &e, unreachable);
            return report;
        }
    };

    discover(session.as_ref(), target, &mut report).await;

    if options.remove_on_match && !report.matches.is_empty() {
        remove_matches(session.as_ref(), &mut report.matches).await;
    }

    tracing::debug!(
        site = %site.url,
        matches = report.matches.len(),
        failures = report.failures.len(),
        "Probe finished"
    );
    report
}

async fn discover(session: &dyn SiteSession, target: &IdentityMatcher, report: &mut ProbeReport) {
    let heuristic = target.is_heuristic();
    let site = report.site.clone();
    let new_match = |kind: MatchKind, name: String, login: &str, id: i64| PermissionMatch {
        site: site.clone(),
        match_kind: kind,
        group_or_role_name: name,
        principal_login_name: login.to_string(),
        principal_id: id,
        group_id: None,
        via_group: None,
        needs_confirmation: heuristic,
        removed: false,
        removal_error: None,
    };

    match session.site_users().await {
        Ok(users) => report.user_present = Some(users.iter().any(|u| target.matches(u))),
        Err(e) => report.fail(ProbeStep::SiteUsers, &e, false),
    }

    // (group id, group title, target login) for every membership found
    let mut member_of: Vec<(i64, String, String)> = Vec::new();

    if report.user_present != Some(false) {
        match session.site_groups().await {
            Ok(groups) => {
                for group in &groups {
                    let members = match session.group_members(group).await {
                        Ok(members) => members,
                        Err(e) => {
                            report.fail(ProbeStep::GroupMembers(group.title.clone()), &e, false);
                            continue;
                        }
                    };
                    for member in members.iter().filter(|m| target.matches(m)) {
                        let mut m = new_match(
                            MatchKind::GroupMember,
                            group.title.clone(),
                            &member.login_name,
                            member.id,
                        );
                        m.group_id = Some(group.id);
                        report.matches.push(m);
                        member_of.push((group.id, group.title.clone(), member.login_name.clone()));
                    }
                }
            }
            Err(e) => report.fail(ProbeStep::SiteGroups, &e, false),
        }
    }

    match session.site_admins().await {
        Ok(admins) => {
            for admin in admins.iter().filter(|a| target.matches(a)) {
                report.matches.push(new_match(
                    MatchKind::SiteAdmin,
                    SITE_ADMIN_ROLE.to_string(),
                    &admin.login_name,
                    admin.id,
                ));
            }
        }
        Err(e) => report.fail(ProbeStep::SiteAdmins, &e, false),
    }

    match session.role_assignments().await {
        Ok(bindings) => {
            for binding in bindings {
                let roles: Vec<&str> = binding
                    .role_names
                    .iter()
                    .map(String::as_str)
                    .filter(|r| !r.eq_ignore_ascii_case(LIMITED_ACCESS_ROLE))
                    .collect();
                if roles.is_empty() {
                    continue;
                }
                let roles = roles.join(", ");
                let principal = &binding.principal;

                if target.matches(principal) {
                    report.matches.push(new_match(
                        MatchKind::DirectRoleAssignment,
                        roles,
                        &principal.login_name,
                        principal.id,
                    ));
                } else if principal.kind == PrincipalKind::SharePointGroup {
                    for (_, title, login) in member_of.iter().filter(|(gid, _, _)| *gid == principal.id) {
                        let mut m = new_match(
                            MatchKind::DirectRoleAssignment,
                            roles.clone(),
                            login,
                            principal.id,
                        );
                        m.group_id = Some(principal.id);
                        m.via_group = Some(title.clone());
                        report.matches.push(m);
                    }
                }
            }
        }
        Err(e) => report.fail(ProbeStep::RoleAssignments, &e, false),
    }
}

fn removal_rank(kind: MatchKind) -> u8 {
    match kind {
        MatchKind::GroupMember => 0,
        MatchKind::DirectRoleAssignment => 1,
        MatchKind::SiteAdmin => 2,
    }
}

/// Remove each match with the call for its kind, recording success or failure on the match.
///
/// Group memberships go first, then direct bindings, admin demotion last so the session keeps
/// working if the target is the account the token belongs to. Bindings held through a group are
/// left alone; removing the membership clears them.
pub async fn remove_matches(session: &dyn SiteSession, matches: &mut [PermissionMatch]) {
    let mut order: Vec<usize> = (0..matches.len())
        .filter(|&i| matches[i].is_removable())
        .collect();
    order.sort_by_key(|&i| removal_rank(matches[i].match_kind));

    for i in order {
        let m = &mut matches[i];
        let outcome = match m.match_kind {
            MatchKind::GroupMember => match m.group_id {
                Some(group_id) => session.remove_group_member(group_id, m.principal_id).await,
                None => Err(crate::error::SweepError::InvalidConfig(
                    "group membership without group id".into(),
                )),
            },
            MatchKind::SiteAdmin => session.demote_site_admin(m.principal_id).await,
            MatchKind::DirectRoleAssignment => session.revoke_role_binding(m.principal_id).await,
        };

        match &outcome {
            Ok(()) => tracing::info!(
                site = %m.site.url,
                kind = m.match_kind.as_str(),
                name = %m.group_or_role_name,
                principal = %m.principal_login_name,
                "Removed permission"
            ),
            Err(e) => tracing::warn!(
                site = %m.site.url,
                kind = m.match_kind.as_str(),
                principal = %m.principal_login_name,
                error = %e,
                "Removal failed"
            ),
        }
        m.record_removal(outcome.map_err(|e| e.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sweep::identity::MatchStrategy;
    use crate::sweep::mock::{login, site_url, MockTenant, Step};

    const JANE: &str = "jane@contoso.com";

    fn site(name: &str) -> SiteDescriptor {
        SiteDescriptor::new(&site_url(name), name, false)
    }

    async fn probe(tenant: &MockTenant, name: &str, remove: bool) -> ProbeReport {
        probe_site(
            tenant,
            &site(name),
            &IdentityMatcher::exact(JANE),
            &ProbeOptions {
                remove_on_match: remove,
            },
        )
        .await
    }

    #[tokio::test]
    async fn test_clean_site() {
        let tenant = MockTenant::new()
            .with_sites(&["hr"])
            .with_group_member("hr", "HR Members", "bob@contoso.com");

        let report = probe(&tenant, "hr", false).await;
        assert_eq!(report.outcome(), SiteOutcome::Clean);
        assert_eq!(report.user_present, Some(false));
        assert!(matches!(report.into_outcome(), ProbeOutcome::NoMatch));
    }

    #[tokio::test]
    async fn test_group_admin_and_direct_role() {
        let tenant = MockTenant::new()
            .with_sites(&["hr"])
            .with_group_member("hr", "HR Owners", JANE)
            .with_site_admin("hr", JANE)
            .with_direct_role("hr", JANE, "Edit");

        let report = probe(&tenant, "hr", false).await;
        assert_eq!(report.outcome(), SiteOutcome::Matched);

        let kinds: Vec<MatchKind> = report.matches.iter().map(|m| m.match_kind).collect();
        assert_eq!(
            kinds,
            vec![
                MatchKind::GroupMember,
                MatchKind::SiteAdmin,
                MatchKind::DirectRoleAssignment
            ]
        );
        assert_eq!(report.matches[0].group_or_role_name, "HR Owners");
        assert_eq!(report.matches[0].principal_login_name, login(JANE));
        assert_eq!(report.matches[2].group_or_role_name, "Edit");
        assert!(report.matches.iter().all(|m| !m.removed));
    }

    #[tokio::test]
    async fn test_binding_via_group_is_reported_not_revoked() {
        let tenant = MockTenant::new()
            .with_sites(&["hr"])
            .with_group_member("hr", "HR Owners", JANE)
            .with_group_role("hr", "HR Owners", "Full Control");

        let report = probe(&tenant, "hr", true).await;
        let via: Vec<&PermissionMatch> = report
            .matches
            .iter()
            .filter(|m| m.via_group.is_some())
            .collect();
        assert_eq!(via.len(), 1);
        assert_eq!(via[0].match_kind, MatchKind::DirectRoleAssignment);
        assert_eq!(via[0].via_group.as_deref(), Some("HR Owners"));
        assert!(!via[0].removed);
        assert!(via[0].removal_error.is_none());

        let calls = tenant.removal_calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].contains("remove-group-member"));
    }

    #[tokio::test]
    async fn test_limited_access_binding_ignored() {
        let tenant = MockTenant::new()
            .with_sites(&["hr"])
            .with_direct_role("hr", JANE, LIMITED_ACCESS_ROLE);

        let report = probe(&tenant, "hr", false).await;
        assert_eq!(report.outcome(), SiteOutcome::Clean);
    }

    #[tokio::test]
    async fn test_unreachable_site_is_error() {
        let tenant = MockTenant::new().with_sites(&["hr"]).fail_open("hr", 403);

        let report = probe(&tenant, "hr", false).await;
        assert_eq!(report.outcome(), SiteOutcome::Inconclusive);
        let error = report.site_error().unwrap();
        assert!(error.unreachable);
        assert!(error.message.starts_with("connect: HTTP 403"));
        assert!(matches!(report.into_outcome(), ProbeOutcome::Error(_)));
    }

    #[tokio::test]
    async fn test_transient_connect_failure_is_not_unreachable() {
        let tenant = MockTenant::new().with_sites(&["hr"]).fail_open("hr", 503);

        let report = probe(&tenant, "hr", false).await;
        assert_eq!(report.outcome(), SiteOutcome::Inconclusive);
        assert!(!report.failures[0].unreachable);

        let error = report.site_error().unwrap();
        assert!(!error.unreachable);
        assert!(error.message.starts_with("connect: HTTP 503"));
    }

    #[tokio::test]
    async fn test_step_failure_keeps_partial_matches() {
        let tenant = MockTenant::new()
            .with_sites(&["hr"])
            .with_site_admin("hr", JANE)
            .fail_step("hr", Step::RoleAssignments);

        let report = probe(&tenant, "hr", false).await;
        assert_eq!(report.outcome(), SiteOutcome::Matched);
        assert_eq!(report.matches.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].step, ProbeStep::RoleAssignments);

        let error = report.site_error().unwrap();
        assert!(!error.unreachable);
    }

    #[tokio::test]
    async fn test_unknown_presence_still_checks_groups() {
        let tenant = MockTenant::new()
            .with_sites(&["hr"])
            .with_group_member("hr", "HR Members", JANE)
            .fail_step("hr", Step::SiteUsers);

        let report = probe(&tenant, "hr", false).await;
        assert_eq!(report.user_present, None);
        assert_eq!(report.matches.len(), 1);
        assert_eq!(report.matches[0].match_kind, MatchKind::GroupMember);
        assert_eq!(report.outcome(), SiteOutcome::Matched);
    }

    #[tokio::test]
    async fn test_removal_order_and_success() {
        let tenant = MockTenant::new()
            .with_sites(&["hr"])
            .with_site_admin("hr", JANE)
            .with_direct_role("hr", JANE, "Edit")
            .with_group_member("hr", "HR Members", JANE);

        let report = probe(&tenant, "hr", true).await;
        assert!(report.matches.iter().all(|m| m.removed));

        let calls = tenant.removal_calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[0].contains("remove-group-member"));
        assert!(calls[1].contains("revoke-role-binding"));
        assert!(calls[2].contains("demote-site-admin"));

        let again = probe(&tenant, "hr", false).await;
        assert!(again.matches.is_empty());
    }

    #[tokio::test]
    async fn test_failed_removal_recorded() {
        let tenant = MockTenant::new()
            .with_sites(&["hr"])
            .with_site_admin("hr", JANE)
            .fail_removals("hr");

        let report = probe(&tenant, "hr", true).await;
        assert_eq!(report.matches.len(), 1);
        assert!(!report.matches[0].removed);
        assert_eq!(
            report.matches[0].removal_error.as_deref(),
            Some("HTTP 409: save conflict")
        );
    }

    #[tokio::test]
    async fn test_substring_matches_need_confirmation() {
        let tenant = MockTenant::new()
            .with_sites(&["hr"])
            .with_site_admin("hr", "jane.doe.old@contoso.com");

        let report = probe_site(
            &tenant,
            &site("hr"),
            &IdentityMatcher::new(MatchStrategy::Substring, ["jane.doe"]),
            &ProbeOptions::default(),
        )
        .await;
        assert_eq!(report.matches.len(), 1);
        assert!(report.matches[0].needs_confirmation);
    }
}
