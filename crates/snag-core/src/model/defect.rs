use super::{ParseEnumError, normalize};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Defect severity as set by the reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub const ALL: [Self; 3] = [Self::Low, Self::Medium, Self::High];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// The five lifecycle states of a defect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    New,
    InProgress,
    Review,
    Closed,
    Cancelled,
}

impl Status {
    pub const ALL: [Self; 5] = [
        Self::New,
        Self::InProgress,
        Self::Review,
        Self::Closed,
        Self::Cancelled,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::InProgress => "in_progress",
            Self::Review => "review",
            Self::Closed => "closed",
            Self::Cancelled => "cancelled",
        }
    }

    /// States reachable in one step.
    ///
    /// - `new -> in_progress | cancelled`
    /// - `in_progress -> review | cancelled`
    /// - `review -> closed`
    /// - `closed`, `cancelled`: terminal
    #[must_use]
    pub const fn allowed_targets(self) -> &'static [Self] {
        match self {
            Self::New => &[Self::InProgress, Self::Cancelled],
            Self::InProgress => &[Self::Review, Self::Cancelled],
            Self::Review => &[Self::Closed],
            Self::Closed | Self::Cancelled => &[],
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        self.allowed_targets().is_empty()
    }

    /// Validate a structural transition from `self` to `target`.
    ///
    /// Re-entering the current state is not a transition; callers treat it
    /// as a no-op before asking.
    pub fn can_transition_to(self, target: Self) -> Result<(), InvalidTransition> {
        if self.allowed_targets().contains(&target) {
            Ok(())
        } else {
            Err(InvalidTransition {
                from: self,
                to: target,
                reason: if self.is_terminal() {
                    "defect is in a terminal state"
                } else {
                    "transition not allowed by lifecycle rules"
                },
            })
        }
    }
}

/// Error returned when a state transition is invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: Status,
    pub to: Status,
    pub reason: &'static str,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cannot move defect from {} to {}: {}",
            self.from, self.to, self.reason
        )
    }
}

impl std::error::Error for InvalidTransition {}

/// A tracked defect. `status` is only ever written by the transition
/// engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Defect {
    pub id: i64,
    pub project_id: i64,
    pub stage_id: Option<i64>,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub status: Status,
    pub performer_id: Option<i64>,
    pub deadline: Option<NaiveDate>,
    pub created_at_us: i64,
    pub updated_at_us: i64,
}

/// Input for reporting a new defect. New defects always start in
/// [`Status::New`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewDefect {
    pub project_id: i64,
    pub stage_id: Option<i64>,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub performer_id: Option<i64>,
    pub deadline: Option<NaiveDate>,
}

/// Partial edit of the non-status fields of a defect.
///
/// `None` leaves a field untouched; for nullable fields `Some(None)` clears
/// the value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefectPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub stage_id: Option<Option<i64>>,
    pub performer_id: Option<Option<i64>>,
    pub deadline: Option<Option<NaiveDate>>,
}

impl DefectPatch {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.stage_id.is_none()
            && self.performer_id.is_none()
            && self.deadline.is_none()
    }

    #[must_use]
    pub const fn touches_performer(&self) -> bool {
        self.performer_id.is_some()
    }
}

/// An uploaded file linked to a defect. The reference is opaque to the
/// core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: i64,
    pub defect_id: i64,
    pub file_ref: String,
    pub uploaded_at_us: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub defect_id: i64,
    pub author_id: i64,
    pub body: String,
    pub created_at_us: i64,
}

/// One row of the append-only status audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub id: i64,
    pub defect_id: i64,
    pub old_status: Status,
    pub new_status: Status,
    pub changed_by: Option<i64>,
    pub changed_at_us: i64,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(ParseEnumError {
                expected: "priority",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for Status {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "new" => Ok(Self::New),
            "in_progress" => Ok(Self::InProgress),
            "review" => Ok(Self::Review),
            "closed" => Ok(Self::Closed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(ParseEnumError {
                expected: "status",
                got: s.to_string(),
            }),
        }
    }
}
