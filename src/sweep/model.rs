//! Records produced by a sweep: site descriptors, permission matches and the final result.

use crate::sweep::identity::MatchStrategy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One site collection as listed by the enumerator
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteDescriptor {
    pub url: String,
    pub display_name: String,
    pub is_personal_site: bool,
}

impl SiteDescriptor {
    pub fn new(url: &str, display_name: &str, is_personal_site: bool) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            display_name: display_name.to_string(),
            is_personal_site,
        }
    }
}

/// How the target identity holds access on a site
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MatchKind {
    GroupMember,
    SiteAdmin,
    DirectRoleAssignment,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::GroupMember => "Group member",
            MatchKind::SiteAdmin => "Site admin",
            MatchKind::DirectRoleAssignment => "Role assignment",
        }
    }
}

/// A permission held by the target identity on one site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionMatch {
    pub site: SiteDescriptor,
    pub match_kind: MatchKind,
    /// Group title for group memberships, role names for role assignments
    pub group_or_role_name: String,
    pub principal_login_name: String,
    /// Site-local id of the principal the removal call targets
    pub principal_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<i64>,
    /// Set when a role binding is held by a site group the target belongs to.
    /// Such bindings are cleared by removing the group membership, never revoked directly.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub via_group: Option<String>,
    /// Found by the substring heuristic; an operator must confirm the identity
    pub needs_confirmation: bool,
    pub removed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removal_error: Option<String>,
}

impl PermissionMatch {
    /// Whether a removal call can target this match on its own
    pub fn is_removable(&self) -> bool {
        self.via_group.is_none()
    }

    pub(crate) fn record_removal(&mut self, outcome: std::result::Result<(), String>) {
        match outcome {
            Ok(()) => {
                self.removed = true;
                self.removal_error = None;
            }
            Err(message) => {
                self.removed = false;
                self.removal_error = Some(message);
            }
        }
    }

    fn sort_key(&self) -> (&str, MatchKind, &str, &str) {
        (
            &self.site.url,
            self.match_kind,
            &self.group_or_role_name,
            &self.principal_login_name,
        )
    }
}

/// A site whose probe failed wholly or partially
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteError {
    pub site: SiteDescriptor,
    pub message: String,
    /// The site could not be opened at all (deleted, locked, access denied)
    pub unreachable: bool,
}

/// Per-site classification shown to operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SiteOutcome {
    /// No match and no error
    Clean,
    /// At least one match, possibly with partial errors
    Matched,
    /// Errors and no match; coverage incomplete
    Inconclusive,
}

/// Why the coordinator stopped dispatching sites
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "reason", content = "detail")]
pub enum StopReason {
    Exhausted,
    SiteCap,
    Cancelled,
    /// The site list failed after some sites were already dispatched
    EnumerationFailed(String),
    /// This many workers died; sites they had not finished are listed in `errors`
    WorkerFailed(usize),
}

/// Final artifact of a sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepResult {
    pub targets: Vec<String>,
    pub strategy: MatchStrategy,
    pub removal_enabled: bool,
    pub started_at: DateTime<Utc>,
    /// Sites probed conclusively (clean or matched)
    pub sites_scanned: usize,
    pub sites_with_match: usize,
    pub sites_inconclusive: usize,
    pub matches: Vec<PermissionMatch>,
    pub errors: Vec<SiteError>,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
    pub stop_reason: StopReason,
}

impl SweepResult {
    /// Sort matches and errors by site URL so reports are stable across runs
    pub(crate) fn finalize(&mut self) {
        self.matches.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        self.errors.sort_by(|a, b| a.site.url.cmp(&b.site.url));
    }

    pub fn removed_count(&self) -> usize {
        self.matches.iter().filter(|m| m.removed).count()
    }

    pub fn removal_failures(&self) -> usize {
        self.matches
            .iter()
            .filter(|m| m.removal_error.is_some())
            .count()
    }

    pub fn needs_confirmation(&self) -> usize {
        self.matches.iter().filter(|m| m.needs_confirmation).count()
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}
