// src/roles.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Minimum level for the management tier ("staff").
pub const STAFF_LEVEL: i64 = 80;

/// Minimum level for senior moderation duties (reviewing, examining).
pub const SENIOR_LEVEL: i64 = 40;

/// The closed set of staff roles, ordered by rank.
///
/// The level table is fixed at deploy time. Two roles may share a level
/// (management and junior_management are both 80); the hierarchy compares
/// levels, never identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    TopManagement,
    Management,
    JuniorManagement,
    ModerationTeam,
    SeniorModerator,
    Moderator,
    TrialModerator,
    Supporter,
}

/// A role identifier outside the enumerated set.
///
/// Treated as a hard authorization denial by the callers, never a crash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown role '{}'", self.0)
    }
}

impl std::error::Error for UnknownRole {}

impl Role {
    pub const ALL: [Role; 8] = [
        Role::TopManagement,
        Role::Management,
        Role::JuniorManagement,
        Role::ModerationTeam,
        Role::SeniorModerator,
        Role::Moderator,
        Role::TrialModerator,
        Role::Supporter,
    ];

    /// Numeric rank of the role. Total over the enum; the closed set makes
    /// `UnknownRole` a parse-time concern, not a lookup-time one.
    pub fn level(self) -> i64 {
        match self {
            Role::TopManagement => 100,
            Role::Management => 80,
            Role::JuniorManagement => 80,
            Role::ModerationTeam => 60,
            Role::SeniorModerator => 40,
            Role::Moderator => 30,
            Role::TrialModerator => 20,
            Role::Supporter => 10,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::TopManagement => "top_management",
            Role::Management => "management",
            Role::JuniorManagement => "junior_management",
            Role::ModerationTeam => "moderation_team",
            Role::SeniorModerator => "senior_moderator",
            Role::Moderator => "moderator",
            Role::TrialModerator => "trial_moderator",
            Role::Supporter => "supporter",
        }
    }

    pub fn has_minimum_level(self, threshold: i64) -> bool {
        self.level() >= threshold
    }

    /// Management tier: may administer actors and review personnel requests.
    pub fn is_staff(self) -> bool {
        self.has_minimum_level(STAFF_LEVEL)
    }

    /// Senior moderation tier and up: may examine candidates and review
    /// day-to-day requests.
    pub fn is_senior_or_above(self) -> bool {
        self.has_minimum_level(SENIOR_LEVEL)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_stable_and_thresholds_nest() {
        for role in Role::ALL {
            assert_eq!(role.level(), role.level());
            if role.is_staff() {
                assert!(role.level() >= STAFF_LEVEL);
                // Staff is a subset of senior-or-above.
                assert!(role.is_senior_or_above());
            }
            if role.is_senior_or_above() {
                assert!(role.level() >= SENIOR_LEVEL);
            }
        }
    }

    #[test]
    fn management_and_junior_management_share_a_level() {
        assert_eq!(Role::Management.level(), Role::JuniorManagement.level());
        assert_eq!(Role::Management.level(), 80);
    }

    #[test]
    fn wire_names_round_trip() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn unknown_identifier_is_rejected() {
        let err = "community_manager".parse::<Role>().unwrap_err();
        assert_eq!(err, UnknownRole("community_manager".to_string()));
        // Substring tricks must not resolve either.
        assert!("moderator ".parse::<Role>().is_err());
        assert!("Moderator".parse::<Role>().is_err());
    }

    #[test]
    fn serde_uses_snake_case_identifiers() {
        let json = serde_json::to_string(&Role::SeniorModerator).unwrap();
        assert_eq!(json, "\"senior_moderator\"");
        let back: Role = serde_json::from_str("\"trial_moderator\"").unwrap();
        assert_eq!(back, Role::TrialModerator);
    }
}
