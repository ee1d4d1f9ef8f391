use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::Secret;
use crate::config::DEFAULT_GRAPH_SCOPE;

/// Sorted, de-duplicated set of OAuth scopes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeSet(Vec<String>);

impl ScopeSet {
    pub fn new<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut scopes: Vec<String> = scopes
            .into_iter()
            .map(Into::into)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        scopes.sort();
        scopes.dedup();
        ScopeSet(scopes)
    }

    pub fn graph_default() -> Self {
        ScopeSet::new([DEFAULT_GRAPH_SCOPE])
    }

    /// Space-separated form used by the token endpoint.
    pub fn to_form_value(&self) -> String {
        self.0.join(" ")
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for ScopeSet {
    fn default() -> Self {
        ScopeSet::graph_default()
    }
}

/// An issued access token. Entries are replaced, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenEntry {
    access_token: Secret,
    expires_at: DateTime<Utc>,
    scopes: ScopeSet,
    authority: String,
}

impl TokenEntry {
    pub fn new(
        access_token: Secret,
        expires_at: DateTime<Utc>,
        scopes: ScopeSet,
        authority: impl Into<String>,
    ) -> Self {
        Self {
            access_token,
            expires_at,
            scopes,
            authority: authority.into(),
        }
    }

    pub fn access_token(&self) -> &str {
        self.access_token.expose()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn scopes(&self) -> &ScopeSet {
        &self.scopes
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn is_usable(&self, safety_margin: Duration) -> bool {
        self.is_usable_at(Utc::now(), safety_margin)
    }

    pub fn is_usable_at(&self, now: DateTime<Utc>, safety_margin: Duration) -> bool {
        now < self.expires_at - safety_margin
    }
}
