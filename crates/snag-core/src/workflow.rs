//! Status transition rules.
//!
//! [`plan_transition`] is the pure half of the transition engine: given the
//! defect's current status, the requested status, the acting user and the
//! defect's performer, it decides whether anything should happen. The
//! tracker applies the plan (history row plus status write) inside a single
//! immediate transaction; see [`crate::tracker::Tracker::change_status`].
//!
//! Evaluation order:
//! 1. requesting the current status is a no-op for every actor,
//! 2. the transition table ([`Status::allowed_targets`]),
//! 3. closing is only possible from `review`,
//! 4. the role sub-policy ([`check_role_policy`]).

use crate::error::{Error, Result};
use crate::model::defect::{InvalidTransition, Status};
use crate::model::user::{Role, User};
use tracing::debug;

/// The only transitions an engineer may perform, and only on defects they
/// perform.
pub const ENGINEER_TRANSITIONS: [(Status, Status); 2] = [
    (Status::New, Status::InProgress),
    (Status::InProgress, Status::Review),
];

/// Outcome of a successful transition check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPlan {
    /// The defect already has the requested status. Nothing is written.
    Unchanged,
    /// Write one history row and move the defect from `from` to `to`.
    Apply { from: Status, to: Status },
}

impl TransitionPlan {
    #[must_use]
    pub const fn is_noop(self) -> bool {
        matches!(self, Self::Unchanged)
    }
}

/// Decide whether `actor` may move a defect from `current` to `target`.
///
/// # Errors
///
/// - [`Error::InvalidTransition`] when the table forbids the move or a close
///   is attempted from anywhere but `review`.
/// - [`Error::PermissionDenied`] when the role sub-policy forbids it.
pub fn plan_transition(
    current: Status,
    target: Status,
    actor: &User,
    performer_id: Option<i64>,
) -> Result<TransitionPlan> {
    if current == target {
        debug!(status = %current, actor = actor.id, "status unchanged; no-op");
        return Ok(TransitionPlan::Unchanged);
    }

    current.can_transition_to(target)?;
    ensure_close_from_review(current, target)?;
    check_role_policy(current, target, actor, performer_id)?;

    Ok(TransitionPlan::Apply {
        from: current,
        to: target,
    })
}

/// Closing requires the defect to be in `review`, whatever the table says.
///
/// # Errors
///
/// Returns [`Error::InvalidTransition`] for a close from any other status.
pub fn ensure_close_from_review(current: Status, target: Status) -> Result<()> {
    if target == Status::Closed && current != Status::Review {
        return Err(InvalidTransition {
            from: current,
            to: target,
            reason: "a defect can only be closed from review",
        }
        .into());
    }
    Ok(())
}

/// Role gate applied to structurally valid transitions.
///
/// # Errors
///
/// Returns [`Error::PermissionDenied`] when the actor's role or relation to
/// the defect does not allow the move.
pub fn check_role_policy(
    current: Status,
    target: Status,
    actor: &User,
    performer_id: Option<i64>,
) -> Result<()> {
    match actor.role {
        Role::Manager => Ok(()),
        Role::Engineer => {
            if performer_id != Some(actor.id) {
                return Err(Error::denied(format!(
                    "engineer '{}' can only change the status of defects they perform",
                    actor.username
                )));
            }
            if ENGINEER_TRANSITIONS.contains(&(current, target)) {
                Ok(())
            } else {
                Err(Error::denied(format!(
                    "engineers may not move a defect from {current} to {target}"
                )))
            }
        }
        Role::Observer => Err(Error::denied(format!(
            "observer '{}' cannot change defect status",
            actor.username
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::{TransitionPlan, plan_transition};
    use crate::error::{Error, ErrorCode};
    use crate::model::defect::Status;
    use crate::model::user::{Role, User};

    fn user(id: i64, role: Role) -> User {
        User {
            id,
            username: format!("{role}-{id}"),
            email: None,
            role,
            created_at_us: 0,
        }
    }

    #[test]
    fn manager_moves_new_to_in_progress() {
        let plan = plan_transition(Status::New, Status::InProgress, &user(1, Role::Manager), None)
            .unwrap();
        assert_eq!(
            plan,
            TransitionPlan::Apply {
                from: Status::New,
                to: Status::InProgress
            }
        );
    }

    #[test]
    fn same_status_is_noop_for_every_role() {
        for role in Role::ALL {
            for status in Status::ALL {
                let plan = plan_transition(status, status, &user(9, role), None).unwrap();
                assert!(plan.is_noop(), "{role} {status}");
            }
        }
    }

    #[test]
    fn close_outside_review_is_invalid_for_managers() {
        for current in [Status::New, Status::InProgress, Status::Cancelled] {
            let err = plan_transition(current, Status::Closed, &user(1, Role::Manager), None)
                .unwrap_err();
            assert_eq!(err.code(), ErrorCode::InvalidTransition, "{current}");
        }
    }

    #[test]
    fn table_is_checked_before_role_policy() {
        // An observer asking for a structurally impossible move sees the
        // structural error first.
        let err = plan_transition(Status::New, Status::Review, &user(3, Role::Observer), None)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition(_)));
    }

    #[test]
    fn engineer_limited_to_own_defects() {
        let engineer = user(2, Role::Engineer);
        let err = plan_transition(Status::InProgress, Status::Review, &engineer, Some(5))
            .unwrap_err();
        assert!(matches!(err, Error::PermissionDenied(_)));

        let err =
            plan_transition(Status::New, Status::InProgress, &engineer, None).unwrap_err();
        assert!(matches!(err, Error::PermissionDenied(_)));
    }

    #[test]
    fn engineer_limited_to_two_transitions() {
        let engineer = user(2, Role::Engineer);
        assert!(plan_transition(Status::New, Status::InProgress, &engineer, Some(2)).is_ok());
        assert!(plan_transition(Status::InProgress, Status::Review, &engineer, Some(2)).is_ok());

        for (from, to) in [
            (Status::New, Status::Cancelled),
            (Status::InProgress, Status::Cancelled),
            (Status::Review, Status::Closed),
        ] {
            let err = plan_transition(from, to, &engineer, Some(2)).unwrap_err();
            assert!(matches!(err, Error::PermissionDenied(_)), "{from} -> {to}");
        }
    }

    #[test]
    fn observer_never_changes_status() {
        let observer = user(3, Role::Observer);
        let err = plan_transition(Status::New, Status::InProgress, &observer, Some(3))
            .unwrap_err();
        assert!(matches!(err, Error::PermissionDenied(_)));
    }
}
