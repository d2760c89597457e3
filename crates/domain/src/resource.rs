//! REST resources exposed by the target API and the tags tasks carry.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{DomainError, DomainResult};

/// A top-level REST collection of the scoring platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    /// `/users`
    Users,
    /// `/staff`
    Staff,
    /// `/teams`
    Teams,
    /// `/groups`
    Groups,
    /// `/scores` (read-only)
    Scores,
    /// `/scorecards` (read-only)
    Scorecards,
    /// `/integrations`
    Integrations,
}

impl Resource {
    /// Every resource, in catalogue order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Users,
            Self::Staff,
            Self::Teams,
            Self::Groups,
            Self::Scores,
            Self::Scorecards,
            Self::Integrations,
        ]
    }

    /// Lower-case resource name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Staff => "staff",
            Self::Teams => "teams",
            Self::Groups => "groups",
            Self::Scores => "scores",
            Self::Scorecards => "scorecards",
            Self::Integrations => "integrations",
        }
    }

    /// Collection path relative to the API host.
    #[must_use]
    pub fn path(self) -> String {
        format!("/{}", self.as_str())
    }

    /// Path of a single item.
    #[must_use]
    pub fn item_path(self, id: &str) -> String {
        format!("/{}/{id}", self.as_str())
    }

    /// Scores and scorecards cannot be written through the API.
    #[must_use]
    pub const fn is_read_only(self) -> bool {
        matches!(self, Self::Scores | Self::Scorecards)
    }

    /// Id used for by-id requests until a real one has been seen.
    #[must_use]
    pub const fn default_id(self) -> &'static str {
        match self {
            Self::Users => "100",
            _ => "1",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resource {
    type Err = DomainError;

    fn from_str(s: &str) -> DomainResult<Self> {
        let needle = s.trim().trim_start_matches('/').to_lowercase();
        Self::all()
            .iter()
            .copied()
            .find(|r| r.as_str() == needle)
            .ok_or_else(|| DomainError::UnknownResource(s.to_string()))
    }
}

/// Coarse classification of a task, used to filter scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskTag {
    /// GET requests
    Read,
    /// POST requests that create data
    Create,
    /// PUT requests
    Update,
    /// DELETE requests
    Delete,
}

impl TaskTag {
    /// Lower-case tag name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for TaskTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskTag {
    type Err = DomainError;

    /// Accepts both the tag names and their HTTP verbs (`get`, `post`, `put`).
    fn from_str(s: &str) -> DomainResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "read" | "get" => Ok(Self::Read),
            "create" | "post" => Ok(Self::Create),
            "update" | "put" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            _ => Err(DomainError::UnknownTag(s.to_string())),
        }
    }
}
