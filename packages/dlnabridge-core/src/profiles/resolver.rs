//! Maps a requesting client to its capability profile.
//!
//! Rules are evaluated in order and the first match wins; clients matching
//! no rule get the baseline profile. The resolver is immutable after
//! construction, so lookups need no locking.

use std::sync::Arc;

use axum::http::HeaderMap;
use regex::Regex;

use super::builtin;
use super::model::DeviceProfile;

/// How a rule compares a header value.
#[derive(Debug, Clone)]
pub enum MatchKind {
    /// Exact, case-sensitive match.
    Equals(String),
    /// Case-insensitive substring match.
    Substring(String),
    Regex(Regex),
}

impl MatchKind {
    fn is_match(&self, value: &str) -> bool {
        match self {
            Self::Equals(expected) => value == expected,
            Self::Substring(needle) => value
                .to_ascii_lowercase()
                .contains(&needle.to_ascii_lowercase()),
            Self::Regex(re) => re.is_match(value),
        }
    }
}

/// A single (header pattern, profile) pair.
#[derive(Debug, Clone)]
pub struct ProfileRule {
    header: String,
    kind: MatchKind,
    profile: Arc<DeviceProfile>,
}

impl ProfileRule {
    pub fn new(header: impl Into<String>, kind: MatchKind, profile: Arc<DeviceProfile>) -> Self {
        Self {
            header: header.into(),
            kind,
            profile,
        }
    }

    /// Rule matching the `User-Agent` header.
    pub fn user_agent(kind: MatchKind, profile: Arc<DeviceProfile>) -> Self {
        Self::new("User-Agent", kind, profile)
    }

    #[must_use]
    pub fn profile(&self) -> &Arc<DeviceProfile> {
        &self.profile
    }

    fn matches(&self, headers: &HeaderMap) -> bool {
        headers
            .get(self.header.as_str())
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| self.kind.is_match(v))
    }
}

/// Ordered rule list plus a fallback profile.
pub struct ProfileResolver {
    rules: Vec<ProfileRule>,
    default_profile: Arc<DeviceProfile>,
}

impl ProfileResolver {
    pub fn new(rules: Vec<ProfileRule>, default_profile: DeviceProfile) -> Self {
        Self {
            rules,
            default_profile: Arc::new(default_profile),
        }
    }

    /// Resolver seeded with the built-in renderer profiles.
    #[must_use]
    pub fn with_builtin_profiles() -> Self {
        Self::new(builtin::builtin_rules(), builtin::baseline())
    }

    /// Returns the profile for the client that sent `headers`.
    #[must_use]
    pub fn resolve(&self, headers: &HeaderMap) -> Arc<DeviceProfile> {
        match self.rules.iter().find(|rule| rule.matches(headers)) {
            Some(rule) => {
                log::debug!("[Profiles] Matched '{}'", rule.profile.name);
                rule.profile.clone()
            }
            None => self.default_profile.clone(),
        }
    }

    #[must_use]
    pub fn default_profile(&self) -> Arc<DeviceProfile> {
        self.default_profile.clone()
    }
}
