//! Schedule lifecycle states and post targets.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a scheduled post.
///
/// `Posted` is terminal. `Failed` is terminal until a manual retry moves the
/// schedule back to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Pending,
    Posted,
    Failed,
}

impl ScheduleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Posted => "posted",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown schedule status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for ScheduleStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "posted" => Ok(Self::Posted),
            "failed" => Ok(Self::Failed),
            other => Err(UnknownStatus(other.to_owned())),
        }
    }
}

/// Kind of destination a post is published to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Page,
    Group,
    Profile,
    #[serde(untagged)]
    Other(String),
}

impl TargetType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Page => "page",
            Self::Group => "group",
            Self::Profile => "profile",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for TargetType {
    fn from(s: &str) -> Self {
        match s {
            "page" => Self::Page,
            "group" => Self::Group,
            "profile" => Self::Profile,
            other => Self::Other(other.to_owned()),
        }
    }
}
