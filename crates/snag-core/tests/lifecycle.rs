//! Defect lifecycle tests against an in-memory tracker.
//!
//! Covers the status engine, the authorization guard, performer rules,
//! scoped listing, and cascade behaviour through the public `Tracker` API.

use snag_core::access::Operation;
use snag_core::db::query::DefectFilter;
use snag_core::model::defect::{DefectPatch, NewDefect, Status};
use snag_core::model::project::NewProject;
use snag_core::model::user::{NewUser, Role, User};
use snag_core::workflow::TransitionPlan;
use snag_core::{Error, ErrorCode, Tracker};

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

struct Site {
    tracker: Tracker,
    manager: User,
    /// Member of `tower`, performer of `defect`.
    e1: User,
    /// Member of `tower`, not the performer.
    e2: User,
    /// Not a member of anything.
    e3: User,
    /// Member of `tower`.
    observer: User,
    tower: i64,
    defect: i64,
}

fn site() -> Site {
    let mut tracker = Tracker::open_in_memory().expect("open tracker");
    let manager = tracker.bootstrap_manager("mia", None).expect("bootstrap");

    let mut add = |name: &str, role: Role| {
        tracker
            .create_user(
                manager.id,
                &NewUser {
                    username: name.to_string(),
                    email: None,
                    role,
                },
            )
            .expect("create user")
    };
    let e1 = add("eli", Role::Engineer);
    let e2 = add("eve", Role::Engineer);
    let e3 = add("ezra", Role::Engineer);
    let observer = add("oz", Role::Observer);

    let tower = tracker
        .create_project(
            manager.id,
            &NewProject {
                title: "Tower A".to_string(),
                ..NewProject::default()
            },
        )
        .expect("create project")
        .id;
    for member in [&e1, &e2, &observer] {
        tracker
            .add_member(manager.id, tower, member.id)
            .expect("add member");
    }

    let defect = tracker
        .create_defect(
            manager.id,
            &NewDefect {
                project_id: tower,
                title: "Cracked slab on level 3".to_string(),
                performer_id: Some(e1.id),
                ..NewDefect::default()
            },
        )
        .expect("create defect")
        .id;

    Site {
        tracker,
        manager,
        e1,
        e2,
        e3,
        observer,
        tower,
        defect,
    }
}

fn history_pairs(site: &Site, defect: i64) -> Vec<(Status, Status)> {
    site.tracker
        .history(site.manager.id, defect)
        .expect("history")
        .into_iter()
        .map(|change| (change.old_status, change.new_status))
        .collect()
}

// ---------------------------------------------------------------------------
// Status engine
// ---------------------------------------------------------------------------

#[test]
fn manager_starts_work_with_one_history_row() {
    let mut s = site();
    let defect = s
        .tracker
        .change_status(s.defect, Status::InProgress, s.manager.id)
        .unwrap();
    assert_eq!(defect.status, Status::InProgress);

    let history = s.tracker.history(s.manager.id, s.defect).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].old_status, Status::New);
    assert_eq!(history[0].new_status, Status::InProgress);
    assert_eq!(history[0].changed_by, Some(s.manager.id));
}

#[test]
fn transition_reports_the_plan_it_applied() {
    let mut s = site();
    let (defect, plan) = s
        .tracker
        .transition(s.defect, Status::InProgress, s.manager.id)
        .unwrap();
    assert_eq!(defect.status, Status::InProgress);
    assert_eq!(
        plan,
        TransitionPlan::Apply {
            from: Status::New,
            to: Status::InProgress,
        }
    );

    let (again, plan) = s
        .tracker
        .transition(s.defect, Status::InProgress, s.e1.id)
        .unwrap();
    assert_eq!(plan, TransitionPlan::Unchanged);
    assert_eq!(again, defect);
    assert_eq!(history_pairs(&s, s.defect).len(), 1);
}

#[test]
fn same_status_is_a_noop_for_any_actor() {
    let mut s = site();
    let before = s.tracker.defect(s.manager.id, s.defect).unwrap();
    for actor in [&s.manager, &s.e1, &s.e2, &s.e3, &s.observer] {
        let after = s
            .tracker
            .change_status(s.defect, Status::New, actor.id)
            .unwrap();
        assert_eq!(after, before, "{}", actor.username);
    }
    assert!(history_pairs(&s, s.defect).is_empty());
}

#[test]
fn non_performer_engineer_cannot_submit_for_review() {
    let mut s = site();
    s.tracker
        .change_status(s.defect, Status::InProgress, s.manager.id)
        .unwrap();

    let err = s
        .tracker
        .change_status(s.defect, Status::Review, s.e2.id)
        .unwrap_err();
    assert!(matches!(err, Error::PermissionDenied(_)), "{err}");

    let defect = s.tracker.defect(s.manager.id, s.defect).unwrap();
    assert_eq!(defect.status, Status::InProgress);
    assert_eq!(history_pairs(&s, s.defect).len(), 1);
}

#[test]
fn close_outside_review_is_invalid_for_every_role() {
    let mut s = site();
    let actors = [
        s.manager.clone(),
        s.e1.clone(),
        s.e2.clone(),
        s.observer.clone(),
    ];

    for actor in &actors {
        let err = s
            .tracker
            .change_status(s.defect, Status::Closed, actor.id)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidTransition, "{}", actor.username);
    }

    s.tracker
        .change_status(s.defect, Status::InProgress, s.manager.id)
        .unwrap();
    for actor in &actors {
        let err = s
            .tracker
            .change_status(s.defect, Status::Closed, actor.id)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidTransition, "{}", actor.username);
    }
}

#[test]
fn full_lifecycle_records_three_ordered_rows() {
    let mut s = site();
    s.tracker
        .change_status(s.defect, Status::InProgress, s.manager.id)
        .unwrap();
    s.tracker
        .change_status(s.defect, Status::Review, s.e1.id)
        .unwrap();
    let closed = s
        .tracker
        .change_status(s.defect, Status::Closed, s.manager.id)
        .unwrap();
    assert_eq!(closed.status, Status::Closed);

    assert_eq!(
        history_pairs(&s, s.defect),
        vec![
            (Status::New, Status::InProgress),
            (Status::InProgress, Status::Review),
            (Status::Review, Status::Closed),
        ]
    );
    let changed_by: Vec<_> = s
        .tracker
        .history(s.manager.id, s.defect)
        .unwrap()
        .into_iter()
        .map(|c| c.changed_by)
        .collect();
    assert_eq!(
        changed_by,
        vec![Some(s.manager.id), Some(s.e1.id), Some(s.manager.id)]
    );
}

#[test]
fn terminal_states_reject_further_moves() {
    let mut s = site();
    s.tracker
        .change_status(s.defect, Status::Cancelled, s.manager.id)
        .unwrap();
    for target in [Status::New, Status::InProgress, Status::Review, Status::Closed] {
        let err = s
            .tracker
            .change_status(s.defect, target, s.manager.id)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition(_)), "{target}");
    }
}

#[test]
fn outsider_engineer_is_denied_any_status_change() {
    let mut s = site();
    for target in [Status::InProgress, Status::Cancelled] {
        let err = s
            .tracker
            .change_status(s.defect, target, s.e3.id)
            .unwrap_err();
        assert!(matches!(err, Error::PermissionDenied(_)), "{target}");
    }
}

#[test]
fn performer_engineer_cannot_cancel() {
    let mut s = site();
    let err = s
        .tracker
        .change_status(s.defect, Status::Cancelled, s.e1.id)
        .unwrap_err();
    assert!(matches!(err, Error::PermissionDenied(_)));
}

#[test]
fn observer_cannot_change_status() {
    let mut s = site();
    let err = s
        .tracker
        .change_status(s.defect, Status::InProgress, s.observer.id)
        .unwrap_err();
    assert!(matches!(err, Error::PermissionDenied(_)));
}

#[test]
fn unknown_ids_are_not_found() {
    let mut s = site();
    let err = s
        .tracker
        .change_status(9_999, Status::InProgress, s.manager.id)
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);

    let err = s
        .tracker
        .change_status(s.defect, Status::InProgress, 9_999)
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);

    assert!(s.tracker.authorize(9_999, s.defect, Operation::Read).is_err());
}

// ---------------------------------------------------------------------------
// Guard
// ---------------------------------------------------------------------------

#[test]
fn authorize_reflects_roles_and_relations() {
    let s = site();
    let check = |actor: &User, op| s.tracker.authorize(actor.id, s.defect, op).unwrap();

    assert!(check(&s.manager, Operation::Delete));
    assert!(check(&s.e1, Operation::Write));
    assert!(!check(&s.e1, Operation::Assign));
    assert!(check(&s.e2, Operation::Read));
    assert!(!check(&s.e2, Operation::Write));
    assert!(!check(&s.e3, Operation::Read));
    assert!(check(&s.observer, Operation::Read));
    assert!(!check(&s.observer, Operation::Comment));
}

#[test]
fn reading_requires_visibility() {
    let s = site();
    let err = s.tracker.defect(s.e3.id, s.defect).unwrap_err();
    assert!(matches!(err, Error::PermissionDenied(_)));
    assert!(s.tracker.comments(s.e3.id, s.defect).is_err());
    assert!(s.tracker.defect(s.observer.id, s.defect).is_ok());
}

#[test]
fn project_reads_are_limited_to_members_and_managers() {
    let mut s = site();
    s.tracker
        .create_stage(s.manager.id, s.tower, "Foundations", "")
        .unwrap();

    let err = s.tracker.project(s.e3.id, s.tower).unwrap_err();
    assert!(matches!(err, Error::PermissionDenied(_)), "{err}");
    let err = s.tracker.members(s.e3.id, s.tower).unwrap_err();
    assert_eq!(err.code(), ErrorCode::PermissionDenied);
    let err = s.tracker.stages(s.e3.id, s.tower).unwrap_err();
    assert_eq!(err.code(), ErrorCode::PermissionDenied);

    for reader in [&s.manager, &s.observer] {
        assert_eq!(s.tracker.project(reader.id, s.tower).unwrap().title, "Tower A");
        assert_eq!(s.tracker.members(reader.id, s.tower).unwrap().len(), 3);
        assert_eq!(s.tracker.stages(reader.id, s.tower).unwrap().len(), 1);
    }

    let err = s.tracker.stages(s.manager.id, 999).unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[test]
fn performer_outside_the_project_sees_its_defect_location() {
    let mut s = site();
    let stage = s
        .tracker
        .create_stage(s.manager.id, s.tower, "Foundations", "")
        .unwrap();
    let defect = s
        .tracker
        .create_defect(
            s.manager.id,
            &NewDefect {
                project_id: s.tower,
                title: "Honeycombing in pile cap".to_string(),
                stage_id: Some(stage.id),
                performer_id: Some(s.e3.id),
                ..NewDefect::default()
            },
        )
        .unwrap();

    let (project, located) = s.tracker.defect_location(s.e3.id, defect.id).unwrap();
    assert_eq!(project.id, s.tower);
    assert_eq!(located.map(|st| st.id), Some(stage.id));
    assert!(s.tracker.project(s.e3.id, s.tower).is_err());

    let err = s.tracker.defect_location(s.e2.id, 999).unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
}

// ---------------------------------------------------------------------------
// Creation and updates
// ---------------------------------------------------------------------------

#[test]
fn observer_performer_is_rejected_and_nothing_persists() {
    let mut s = site();
    let before = s
        .tracker
        .list_defects(s.manager.id, &DefectFilter::default())
        .unwrap()
        .total;

    let err = s
        .tracker
        .create_defect(
            s.manager.id,
            &NewDefect {
                project_id: s.tower,
                title: "Water ingress".to_string(),
                performer_id: Some(s.observer.id),
                ..NewDefect::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, Error::InvariantViolation(_)), "{err}");

    let after = s
        .tracker
        .list_defects(s.manager.id, &DefectFilter::default())
        .unwrap()
        .total;
    assert_eq!(before, after);
}

#[test]
fn creation_rules() {
    let mut s = site();

    let err = s
        .tracker
        .create_defect(
            s.observer.id,
            &NewDefect {
                project_id: s.tower,
                title: "Seen it".to_string(),
                ..NewDefect::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, Error::PermissionDenied(_)));

    let err = s
        .tracker
        .create_defect(
            s.e1.id,
            &NewDefect {
                project_id: s.tower,
                title: "Mine".to_string(),
                performer_id: Some(s.e1.id),
                ..NewDefect::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, Error::PermissionDenied(_)));

    let err = s
        .tracker
        .create_defect(
            s.e1.id,
            &NewDefect {
                project_id: s.tower,
                title: "   ".to_string(),
                ..NewDefect::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, Error::InvariantViolation(_)));

    let created = s
        .tracker
        .create_defect(
            s.e1.id,
            &NewDefect {
                project_id: s.tower,
                title: "  Loose railing ".to_string(),
                ..NewDefect::default()
            },
        )
        .unwrap();
    assert_eq!(created.title, "Loose railing");
    assert_eq!(created.status, Status::New);
    assert_eq!(created.performer_id, None);
}

#[test]
fn stage_must_belong_to_the_defect_project() {
    let mut s = site();
    let bridge = s
        .tracker
        .create_project(
            s.manager.id,
            &NewProject {
                title: "Bridge".to_string(),
                ..NewProject::default()
            },
        )
        .unwrap()
        .id;
    let foreign_stage = s
        .tracker
        .create_stage(s.manager.id, bridge, "Foundations", "")
        .unwrap();

    let err = s
        .tracker
        .create_defect(
            s.manager.id,
            &NewDefect {
                project_id: s.tower,
                stage_id: Some(foreign_stage.id),
                title: "Misplaced".to_string(),
                ..NewDefect::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, Error::InvariantViolation(_)));

    let patch = DefectPatch {
        stage_id: Some(Some(foreign_stage.id)),
        ..DefectPatch::default()
    };
    let err = s
        .tracker
        .update_defect(s.manager.id, s.defect, &patch)
        .unwrap_err();
    assert!(matches!(err, Error::InvariantViolation(_)));
}

#[test]
fn performer_updates_fields_but_cannot_reassign() {
    let mut s = site();
    let patch = DefectPatch {
        title: Some("Cracked slab, level 3 east".to_string()),
        ..DefectPatch::default()
    };
    let updated = s.tracker.update_defect(s.e1.id, s.defect, &patch).unwrap();
    assert_eq!(updated.title, "Cracked slab, level 3 east");

    let reassign = DefectPatch {
        performer_id: Some(Some(s.e2.id)),
        ..DefectPatch::default()
    };
    let err = s
        .tracker
        .update_defect(s.e1.id, s.defect, &reassign)
        .unwrap_err();
    assert!(matches!(err, Error::PermissionDenied(_)));

    let err = s
        .tracker
        .update_defect(s.e2.id, s.defect, &patch)
        .unwrap_err();
    assert!(matches!(err, Error::PermissionDenied(_)));
}

#[test]
fn reassigning_to_observer_is_an_invariant_violation() {
    let mut s = site();
    let patch = DefectPatch {
        performer_id: Some(Some(s.observer.id)),
        ..DefectPatch::default()
    };
    let err = s
        .tracker
        .update_defect(s.manager.id, s.defect, &patch)
        .unwrap_err();
    assert!(matches!(err, Error::InvariantViolation(_)));

    let defect = s.tracker.defect(s.manager.id, s.defect).unwrap();
    assert_eq!(defect.performer_id, Some(s.e1.id));
}

#[test]
fn empty_patch_leaves_updated_at_alone() {
    let mut s = site();
    let before = s.tracker.defect(s.manager.id, s.defect).unwrap();
    let after = s
        .tracker
        .update_defect(s.manager.id, s.defect, &DefectPatch::default())
        .unwrap();
    assert_eq!(before.updated_at_us, after.updated_at_us);
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

#[test]
fn engineer_listing_is_membership_plus_performed() {
    let mut s = site();
    let bridge = s
        .tracker
        .create_project(
            s.manager.id,
            &NewProject {
                title: "Bridge".to_string(),
                ..NewProject::default()
            },
        )
        .unwrap()
        .id;
    let performed_elsewhere = s
        .tracker
        .create_defect(
            s.manager.id,
            &NewDefect {
                project_id: bridge,
                title: "Rusty bolt".to_string(),
                performer_id: Some(s.e1.id),
                ..NewDefect::default()
            },
        )
        .unwrap()
        .id;
    let hidden = s
        .tracker
        .create_defect(
            s.manager.id,
            &NewDefect {
                project_id: bridge,
                title: "Paint peeling".to_string(),
                ..NewDefect::default()
            },
        )
        .unwrap()
        .id;

    let ids = |actor: i64| -> Vec<i64> {
        let mut ids: Vec<i64> = s
            .tracker
            .list_defects(actor, &DefectFilter::default())
            .unwrap()
            .defects
            .iter()
            .map(|d| d.id)
            .collect();
        ids.sort_unstable();
        ids
    };

    assert_eq!(ids(s.e1.id), vec![s.defect, performed_elsewhere]);
    assert_eq!(ids(s.e2.id), vec![s.defect]);
    assert!(ids(s.e3.id).is_empty());
    assert_eq!(ids(s.observer.id), vec![s.defect]);
    assert_eq!(ids(s.manager.id), vec![s.defect, performed_elsewhere, hidden]);
}

#[test]
fn scoped_summary_matches_visible_defects() {
    let mut s = site();
    s.tracker
        .change_status(s.defect, Status::InProgress, s.manager.id)
        .unwrap();
    let summary = s.tracker.summary(s.e3.id).unwrap();
    assert_eq!(summary.total, 0);

    let summary = s.tracker.summary(s.e2.id).unwrap();
    assert_eq!(summary.total, 1);
    assert_eq!(summary.by_status[&Status::InProgress], 1);

    let report = s.tracker.performer_report(s.manager.id, s.e1.id).unwrap();
    assert_eq!(report.total, 1);
}

// ---------------------------------------------------------------------------
// Comments, attachments, cascades
// ---------------------------------------------------------------------------

#[test]
fn comment_and_attachment_permissions() {
    let mut s = site();
    s.tracker
        .add_comment(s.e2.id, s.defect, "Checked on site, crack is 2mm")
        .unwrap();
    let err = s
        .tracker
        .add_comment(s.observer.id, s.defect, "me too")
        .unwrap_err();
    assert!(matches!(err, Error::PermissionDenied(_)));

    s.tracker
        .add_attachment(s.e1.id, s.defect, "photos/slab-l3.jpg")
        .unwrap();
    let err = s
        .tracker
        .add_attachment(s.e2.id, s.defect, "photos/other.jpg")
        .unwrap_err();
    assert!(matches!(err, Error::PermissionDenied(_)));

    assert_eq!(s.tracker.comments(s.observer.id, s.defect).unwrap().len(), 1);
    assert_eq!(s.tracker.attachments(s.observer.id, s.defect).unwrap().len(), 1);
}

#[test]
fn deleting_a_stage_keeps_its_defects() {
    let mut s = site();
    let stage = s
        .tracker
        .create_stage(s.manager.id, s.tower, "Structure", "Frame and slabs")
        .unwrap();
    let patch = DefectPatch {
        stage_id: Some(Some(stage.id)),
        ..DefectPatch::default()
    };
    s.tracker.update_defect(s.manager.id, s.defect, &patch).unwrap();

    s.tracker.delete_stage(s.manager.id, stage.id).unwrap();
    let defect = s.tracker.defect(s.manager.id, s.defect).unwrap();
    assert_eq!(defect.stage_id, None);
}

#[test]
fn deleting_a_defect_removes_its_children() {
    let mut s = site();
    s.tracker
        .change_status(s.defect, Status::InProgress, s.manager.id)
        .unwrap();
    s.tracker.add_comment(s.manager.id, s.defect, "note").unwrap();
    s.tracker
        .add_attachment(s.manager.id, s.defect, "plan.pdf")
        .unwrap();

    let err = s.tracker.delete_defect(s.e1.id, s.defect).unwrap_err();
    assert!(matches!(err, Error::PermissionDenied(_)));

    s.tracker.delete_defect(s.manager.id, s.defect).unwrap();
    let conn = s.tracker.connection();
    for table in ["comments", "attachments", "status_history"] {
        let rows: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 0, "{table}");
    }
}

#[test]
fn project_administration_is_manager_only() {
    let mut s = site();
    let err = s
        .tracker
        .create_project(
            s.e1.id,
            &NewProject {
                title: "Rogue".to_string(),
                ..NewProject::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, Error::PermissionDenied(_)));
    assert!(s.tracker.add_member(s.e1.id, s.tower, s.e3.id).is_err());
    assert!(s.tracker.create_stage(s.e1.id, s.tower, "S", "").is_err());

    let closed = s.tracker.close_project(s.manager.id, s.tower).unwrap();
    assert_eq!(closed.status.as_str(), "closed");

    s.tracker.delete_project(s.manager.id, s.tower).unwrap();
    let err = s.tracker.defect(s.manager.id, s.defect).unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[test]
fn bootstrap_only_works_once() {
    let mut s = site();
    let err = s.tracker.bootstrap_manager("mallory", None).unwrap_err();
    assert!(matches!(err, Error::PermissionDenied(_)));

    let err = s
        .tracker
        .create_user(
            s.manager.id,
            &NewUser {
                username: "eli".to_string(),
                email: None,
                role: Role::Engineer,
            },
        )
        .unwrap_err();
    assert!(matches!(err, Error::InvariantViolation(_)));
}

#[test]
fn duplicate_email_is_an_invariant_violation() {
    let mut tracker = Tracker::open_in_memory().unwrap();
    let manager = tracker.bootstrap_manager("mia", Some("a@x.io")).unwrap();

    let err = tracker
        .create_user(
            manager.id,
            &NewUser {
                username: "eli".to_string(),
                email: Some(" a@x.io ".to_string()),
                role: Role::Engineer,
            },
        )
        .unwrap_err();
    assert!(matches!(err, Error::InvariantViolation(_)), "{err}");
    assert_eq!(err.code(), ErrorCode::InvariantViolation);
    assert_eq!(tracker.users().unwrap().len(), 1);
}
