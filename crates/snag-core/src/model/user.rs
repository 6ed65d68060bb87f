use super::{ParseEnumError, normalize};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The three fixed roles. Role is the only source of truth for what a user
/// may do; there is no secondary group membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Manager,
    Engineer,
    Observer,
}

impl Role {
    pub const ALL: [Self; 3] = [Self::Manager, Self::Engineer, Self::Observer];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manager => "manager",
            Self::Engineer => "engineer",
            Self::Observer => "observer",
        }
    }

    /// Observers are read-only everywhere.
    #[must_use]
    pub const fn is_read_only(self) -> bool {
        matches!(self, Self::Observer)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "manager" => Ok(Self::Manager),
            "engineer" => Ok(Self::Engineer),
            "observer" => Ok(Self::Observer),
            _ => Err(ParseEnumError {
                expected: "role",
                got: s.to_string(),
            }),
        }
    }
}

/// An authenticated identity as seen by the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub role: Role,
    pub created_at_us: i64,
}

/// Input for registering a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub email: Option<String>,
    pub role: Role,
}

#[cfg(test)]
mod tests {
    use super::Role;
    use std::str::FromStr;

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!(Role::from_str(" Manager ").unwrap(), Role::Manager);
        assert_eq!(Role::from_str("ENGINEER").unwrap(), Role::Engineer);
        assert!(Role::from_str("admin").is_err());
    }

    #[test]
    fn role_json_is_lowercase() {
        assert_eq!(
            serde_json::to_string(&Role::Observer).unwrap(),
            "\"observer\""
        );
    }

    #[test]
    fn only_observer_is_read_only() {
        let read_only: Vec<Role> = Role::ALL
            .into_iter()
            .filter(|role| role.is_read_only())
            .collect();
        assert_eq!(read_only, vec![Role::Observer]);
    }
}
