//! Resolve people to user principal names through Graph `/users`

use crate::error::Result;
use crate::graph::GraphClient;
use serde::{Deserialize, Serialize};
use std::fmt;

const USER_SELECT: &str = "userPrincipalName,displayName,givenName,surname,mail,id";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub surname: Option<String>,
    #[serde(default)]
    pub user_principal_name: Option<String>,
    #[serde(default)]
    pub mail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonName {
    pub first: String,
    pub last: String,
}

impl PersonName {
    pub fn new(first: &str, last: &str) -> Self {
        Self {
            first: first.trim().to_string(),
            last: last.trim().to_string(),
        }
    }

    /// "First Last"; everything after the first word is the surname
    pub fn parse(full: &str) -> Option<Self> {
        let (first, last) = full.trim().split_once(char::is_whitespace)?;
        let last = last.trim();
        if first.is_empty() || last.is_empty() {
            return None;
        }
        Some(Self::new(first, last))
    }

    /// Table row such as `|Jane |Van Heel |`
    pub fn from_pipe_line(line: &str) -> Option<Self> {
        let mut parts = line.split('|').map(str::trim).filter(|p| !p.is_empty());
        let first = parts.next()?;
        let last = parts.next()?;
        Some(Self::new(first, last))
    }
}

impl fmt::Display for PersonName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.first, self.last)
    }
}

/// Names from a file: pipe-delimited rows or plain "First Last" lines. Unparseable lines are skipped.
pub fn parse_name_list(content: &str) -> Vec<PersonName> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|line| {
            if line.contains('|') {
                PersonName::from_pipe_line(line)
            } else {
                PersonName::parse(line)
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LookupStatus {
    Found,
    Multiple,
    NotFound,
}

impl LookupStatus {
    pub fn from_count(count: usize) -> Self {
        match count {
            0 => LookupStatus::NotFound,
            1 => LookupStatus::Found,
            _ => LookupStatus::Multiple,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupResult {
    pub name: PersonName,
    pub status: LookupStatus,
    pub users: Vec<User>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Escape a literal for an OData string
pub fn escape_odata(value: &str) -> String {
    value.replace('\'', "''")
}

pub fn name_filter(name: &PersonName) -> String {
    format!(
        "givenName eq '{}' and surname eq '{}'",
        escape_odata(&name.first),
        escape_odata(&name.last)
    )
}

pub async fn search_by_name(client: &GraphClient, name: &PersonName) -> Result<Vec<User>> {
    let endpoint = format!(
        "users?$filter={}&$select={}",
        urlencoding::encode(&name_filter(name)),
        USER_SELECT
    );
    client.get_all_pages(&endpoint).await
}

/// Look up every name in order. A failed search is reported as not found with its error.
pub async fn lookup_names(client: &GraphClient, names: &[PersonName]) -> Vec<LookupResult> {
    let mut results = Vec::with_capacity(names.len());

    for name in names {
        tracing::debug!(name = %name, "Searching user");
        let result = match search_by_name(client, name).await {
            Ok(users) => LookupResult {
                name: name.clone(),
                status: LookupStatus::from_count(users.len()),
                users,
                error: None,
            },
            Err(e) => {
                tracing::warn!(name = %name, error = %e, "User search failed");
                LookupResult {
                    name: name.clone(),
                    status: LookupStatus::NotFound,
                    users: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        };
        results.push(result);
    }

    results
}
