//! Principal tiers and permission levels.
//!
//! Tiers form a small closed ordered set used both for grant lookup and for
//! escalation checks. Permissions order `none < own_only/assigned_only <
//! read_only < full`; `own_only` and `assigned_only` are incomparable
//! siblings below `read_only`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Ordered principal tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Master,
    Senior,
    HrFinance,
    Mid,
    External,
}

impl Tier {
    /// All tiers, highest first. Used for cache invalidation fan-out and
    /// default grant seeding.
    pub const ALL: [Self; 5] = [
        Self::Master,
        Self::Senior,
        Self::HrFinance,
        Self::Mid,
        Self::External,
    ];

    /// Ordering rank: master 4, senior 3, hr_finance 2, mid 1, external 0.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Master => 4,
            Self::Senior => 3,
            Self::HrFinance => 2,
            Self::Mid => 1,
            Self::External => 0,
        }
    }

    /// True for the two lowest tiers (mid, external).
    #[must_use]
    pub const fn is_low_tier(self) -> bool {
        matches!(self, Self::Mid | Self::External)
    }

    /// Tier name as stored in grant rows and cache keys.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Master => "master",
            Self::Senior => "senior",
            Self::HrFinance => "hr_finance",
            Self::Mid => "mid",
            Self::External => "external",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = UnknownTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "master" => Ok(Self::Master),
            "senior" => Ok(Self::Senior),
            "hr_finance" => Ok(Self::HrFinance),
            "mid" => Ok(Self::Mid),
            "external" => Ok(Self::External),
            other => Err(UnknownTier(other.to_string())),
        }
    }
}

/// Error for tier strings outside the closed set.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown tier: {0}")]
pub struct UnknownTier(pub String);

/// Stored permission type for a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    None,
    OwnOnly,
    AssignedOnly,
    ReadOnly,
    Full,
}

impl Permission {
    /// Comparison level. `own_only` and `assigned_only` share a level; both
    /// sit below `read_only`.
    #[must_use]
    pub const fn level(self) -> u8 {
        match self {
            Self::None => 0,
            Self::OwnOnly | Self::AssignedOnly => 1,
            Self::ReadOnly => 2,
            Self::Full => 3,
        }
    }

    /// Five-step scale used by the escalation check and audit
    /// classification, where the sibling permissions are distinct steps.
    #[must_use]
    pub const fn audit_level(self) -> u8 {
        match self {
            Self::None => 0,
            Self::OwnOnly => 1,
            Self::AssignedOnly => 2,
            Self::ReadOnly => 3,
            Self::Full => 4,
        }
    }

    /// The more restrictive of two permissions by comparison level.
    #[must_use]
    pub const fn min(self, other: Self) -> Self {
        if self.level() <= other.level() {
            self
        } else {
            other
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::OwnOnly => "own_only",
            Self::AssignedOnly => "assigned_only",
            Self::ReadOnly => "read_only",
            Self::Full => "full",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = UnknownPermission;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "own_only" => Ok(Self::OwnOnly),
            "assigned_only" => Ok(Self::AssignedOnly),
            "read_only" => Ok(Self::ReadOnly),
            "full" => Ok(Self::Full),
            other => Err(UnknownPermission(other.to_string())),
        }
    }
}

/// Error for permission strings outside the closed set.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown permission type: {0}")]
pub struct UnknownPermission(pub String);
