//! Authorization guard.
//!
//! Every decision here is a pure function of the acting user's [`Role`],
//! their [`Relation`] to a defect, and the requested [`Operation`]. Storage
//! lookups (membership, performer) happen in the tracker before these
//! functions are called.
//!
//! | operation | manager | engineer              | observer |
//! |-----------|---------|-----------------------|----------|
//! | read      | yes     | member or performer   | member   |
//! | comment   | yes     | member or performer   | no       |
//! | write     | yes     | performer             | no       |
//! | assign    | yes     | no                    | no       |
//! | delete    | yes     | no                    | no       |
//!
//! Status changes are not covered by `write`; they go through
//! [`crate::workflow`].

use crate::error::{Error, Result};
use crate::model::ParseEnumError;
use crate::model::defect::Defect;
use crate::model::user::{Role, User};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Something an actor wants to do to a defect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Read,
    Write,
    Assign,
    Comment,
    Delete,
}

impl Operation {
    pub const ALL: [Self; 5] = [
        Self::Read,
        Self::Write,
        Self::Assign,
        Self::Comment,
        Self::Delete,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Assign => "assign",
            Self::Comment => "comment",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match crate::model::normalize(s).as_str() {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "assign" => Ok(Self::Assign),
            "comment" => Ok(Self::Comment),
            "delete" => Ok(Self::Delete),
            _ => Err(ParseEnumError {
                expected: "operation",
                got: s.to_string(),
            }),
        }
    }
}

/// How an actor relates to one defect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Relation {
    /// The actor is a member of the defect's project.
    pub is_member: bool,
    /// The actor is the defect's performer.
    pub is_performer: bool,
}

impl Relation {
    #[must_use]
    pub fn of(actor: &User, defect: &Defect, is_member: bool) -> Self {
        Self {
            is_member,
            is_performer: defect.performer_id == Some(actor.id),
        }
    }
}

/// Decide whether `role` with `relation` may perform `op`.
#[must_use]
pub const fn authorize(role: Role, relation: Relation, op: Operation) -> bool {
    match role {
        Role::Manager => true,
        Role::Engineer => match op {
            Operation::Read | Operation::Comment => relation.is_member || relation.is_performer,
            Operation::Write => relation.is_performer,
            Operation::Assign | Operation::Delete => false,
        },
        Role::Observer => matches!(op, Operation::Read) && relation.is_member,
    }
}

/// [`authorize`], turned into a [`Error::PermissionDenied`] on refusal.
///
/// # Errors
///
/// Returns [`Error::PermissionDenied`] naming the actor, operation and
/// defect.
pub fn require(actor: &User, defect: &Defect, relation: Relation, op: Operation) -> Result<()> {
    if authorize(actor.role, relation, op) {
        Ok(())
    } else {
        Err(Error::denied(format!(
            "{} '{}' may not {op} defect {}",
            actor.role, actor.username, defect.id
        )))
    }
}

/// The performer invariant: observers can never perform a defect. This
/// constrains the value being written, independent of who writes it.
///
/// # Errors
///
/// Returns [`Error::InvariantViolation`] when `candidate` is an observer.
pub fn can_assign_performer(candidate: &User) -> Result<()> {
    if candidate.role == Role::Observer {
        return Err(Error::invariant(format!(
            "observer '{}' cannot be assigned as performer",
            candidate.username
        )));
    }
    Ok(())
}

/// Any non-observer may report a defect.
///
/// # Errors
///
/// Returns [`Error::PermissionDenied`] for observers.
pub fn can_create_defect(actor: &User) -> Result<()> {
    if actor.role.is_read_only() {
        return Err(Error::denied(format!(
            "observer '{}' cannot report defects",
            actor.username
        )));
    }
    Ok(())
}

/// Project, stage and user administration is reserved for managers.
///
/// # Errors
///
/// Returns [`Error::PermissionDenied`] for non-managers.
pub fn require_manager(actor: &User, action: &str) -> Result<()> {
    if actor.role == Role::Manager {
        Ok(())
    } else {
        Err(Error::denied(format!(
            "only managers may {action} ({} '{}')",
            actor.role, actor.username
        )))
    }
}

/// Narrowing applied to defect collections before any other filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListScope {
    /// Every defect in every project.
    All,
    /// Defects in projects `user_id` is a member of, plus (when
    /// `include_performed`) defects `user_id` performs anywhere.
    Visible { user_id: i64, include_performed: bool },
}

impl ListScope {
    /// Whether a defect with the given relation falls inside this scope.
    #[must_use]
    pub const fn admits(self, relation: Relation) -> bool {
        match self {
            Self::All => true,
            Self::Visible {
                include_performed, ..
            } => relation.is_member || (include_performed && relation.is_performer),
        }
    }
}

/// The list scope for `actor`. Consistent with [`Operation::Read`].
#[must_use]
pub const fn list_scope(actor: &User) -> ListScope {
    match actor.role {
        Role::Manager => ListScope::All,
        Role::Engineer => ListScope::Visible {
            user_id: actor.id,
            include_performed: true,
        },
        Role::Observer => ListScope::Visible {
            user_id: actor.id,
            include_performed: false,
        },
    }
}
