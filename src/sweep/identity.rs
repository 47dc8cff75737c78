//! Target identity matching.
//!
//! SharePoint reports principals by claims login name (`i:0#.f|membership|jane@contoso.com`),
//! display title, email and UPN. Which of those identify "the" target is a policy choice,
//! so the predicate is explicit and selectable.

use crate::sweep::provider::{Principal, PrincipalKind};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MatchStrategy {
    /// Login name, UPN or email equal to the target (case-insensitive)
    Exact,
    /// Entra object id of the user or group
    ObjectId,
    /// Target appears anywhere in login name, title, UPN or email; requires confirmation
    Substring,
}

impl MatchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStrategy::Exact => "exact",
            MatchStrategy::ObjectId => "object-id",
            MatchStrategy::Substring => "substring",
        }
    }
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Predicate deciding whether a principal is (one of) the target identities
#[derive(Debug, Clone)]
pub struct IdentityMatcher {
    strategy: MatchStrategy,
    needles: Vec<String>,
}

impl IdentityMatcher {
    pub fn new<I, S>(strategy: MatchStrategy, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut needles: Vec<String> = targets
            .into_iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        needles.sort();
        needles.dedup();
        Self { strategy, needles }
    }

    pub fn exact(target: &str) -> Self {
        Self::new(MatchStrategy::Exact, [target])
    }

    pub fn strategy(&self) -> MatchStrategy {
        self.strategy
    }

    pub fn targets(&self) -> &[String] {
        &self.needles
    }

    pub fn is_empty(&self) -> bool {
        self.needles.is_empty()
    }

    /// Matches from this strategy must be confirmed by an operator
    pub fn is_heuristic(&self) -> bool {
        self.strategy == MatchStrategy::Substring
    }

    pub fn matches(&self, principal: &Principal) -> bool {
        // SharePoint groups are containers, handled through membership
        if principal.kind == PrincipalKind::SharePointGroup {
            return false;
        }

        self.needles
            .iter()
            .any(|needle| self.matches_one(principal, needle))
    }

    fn matches_one(&self, principal: &Principal, needle: &str) -> bool {
        let login = principal.login_name.to_lowercase();
        let claim = claim_value(&login);

        match self.strategy {
            MatchStrategy::Exact => {
                login == needle
                    || claim == needle
                    || eq_opt(&principal.email, needle)
                    || eq_opt(&principal.user_principal_name, needle)
            }
            MatchStrategy::ObjectId => {
                eq_opt(&principal.object_id, needle)
                    || claim == needle
                    // group owner claims carry an `_o` suffix
                    || claim.strip_suffix("_o") == Some(needle)
            }
            MatchStrategy::Substring => {
                login.contains(needle)
                    || principal.title.to_lowercase().contains(needle)
                    || contains_opt(&principal.email, needle)
                    || contains_opt(&principal.user_principal_name, needle)
            }
        }
    }
}

/// The identifying part of a claims login name: text after the last `|`
pub fn claim_value(login_name: &str) -> &str {
    login_name.rsplit('|').next().unwrap_or(login_name)
}

fn eq_opt(value: &Option<String>, needle: &str) -> bool {
    value
        .as_deref()
        .is_some_and(|v| !v.is_empty() && v.eq_ignore_ascii_case(needle))
}

fn contains_opt(value: &Option<String>, needle: &str) -> bool {
    value
        .as_deref()
        .is_some_and(|v| v.to_lowercase().contains(needle))
}
