//! Aggregate defect counts.
//!
//! Every report counts only defects inside the caller's [`ListScope`], so an
//! observer's numbers never include projects they cannot read.

use crate::access::ListScope;
use crate::db::query::{self, DefectFilter, GroupColumn};
use crate::error::Result;
use crate::model::defect::{Priority, Status};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::BTreeMap;

/// Counts keyed by every status, zero-filled.
pub type StatusCounts = BTreeMap<Status, usize>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub by_status: StatusCounts,
    pub by_priority: BTreeMap<Priority, usize>,
    /// Defects not in a terminal status.
    pub open: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectReport {
    pub project_id: i64,
    pub total: usize,
    pub by_status: StatusCounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PerformerReport {
    pub performer_id: i64,
    pub total: usize,
    pub by_status: StatusCounts,
}

/// Totals across everything in `scope`.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn summary(conn: &Connection, scope: ListScope) -> Result<Summary> {
    let filter = DefectFilter::default();
    let by_status = status_counts(conn, scope, &filter)?;

    let mut by_priority: BTreeMap<Priority, usize> =
        Priority::ALL.iter().map(|p| (*p, 0)).collect();
    for (key, count) in query::defect_counts_by(conn, scope, &filter, GroupColumn::Priority)? {
        *by_priority.entry(key.parse()?).or_default() += count;
    }

    let total = by_status.values().sum();
    let open = by_status
        .iter()
        .filter(|(status, _)| !status.is_terminal())
        .map(|(_, count)| count)
        .sum();

    Ok(Summary {
        total,
        by_status,
        by_priority,
        open,
    })
}

/// Status breakdown for one project.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn by_project(conn: &Connection, scope: ListScope, project_id: i64) -> Result<ProjectReport> {
    let filter = DefectFilter {
        project_id: Some(project_id),
        ..DefectFilter::default()
    };
    let by_status = status_counts(conn, scope, &filter)?;
    Ok(ProjectReport {
        project_id,
        total: by_status.values().sum(),
        by_status,
    })
}

/// Status breakdown for one performer's workload.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn by_performer(
    conn: &Connection,
    scope: ListScope,
    performer_id: i64,
) -> Result<PerformerReport> {
    let filter = DefectFilter {
        performer_id: Some(performer_id),
        ..DefectFilter::default()
    };
    let by_status = status_counts(conn, scope, &filter)?;
    Ok(PerformerReport {
        performer_id,
        total: by_status.values().sum(),
        by_status,
    })
}

fn status_counts(
    conn: &Connection,
    scope: ListScope,
    filter: &DefectFilter,
) -> Result<StatusCounts> {
    let mut counts: StatusCounts = Status::ALL.iter().map(|s| (*s, 0)).collect();
    for (key, count) in query::defect_counts_by(conn, scope, filter, GroupColumn::Status)? {
        *counts.entry(key.parse()?).or_default() += count;
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn seeded() -> Connection {
        let conn = db::open_in_memory().expect("open db");
        conn.execute_batch(
            "INSERT INTO users (user_id, username, role, created_at_us) VALUES
                (1, 'mia', 'manager', 1),
                (2, 'eli', 'engineer', 1),
                (3, 'oz', 'observer', 1);
             INSERT INTO projects (project_id, title, created_at_us) VALUES
                (10, 'Tower A', 1),
                (20, 'Bridge', 1);
             INSERT INTO project_members (project_id, user_id, added_at_us) VALUES (10, 3, 1);
             INSERT INTO defects (project_id, title, priority, status, performer_id,
                                  created_at_us, updated_at_us) VALUES
                (10, 'a', 'high', 'new', 2, 1, 1),
                (10, 'b', 'low', 'closed', 2, 1, 1),
                (20, 'c', 'high', 'review', 2, 1, 1),
                (20, 'd', 'medium', 'cancelled', NULL, 1, 1);",
        )
        .expect("seed");
        conn
    }

    #[test]
    fn summary_counts_everything_for_managers() {
        let conn = seeded();
        let summary = summary(&conn, ListScope::All).unwrap();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.open, 2);
        assert_eq!(summary.by_status[&Status::New], 1);
        assert_eq!(summary.by_status[&Status::InProgress], 0);
        assert_eq!(summary.by_priority[&Priority::High], 2);
        assert_eq!(summary.by_priority[&Priority::Medium], 1);
    }

    #[test]
    fn summary_respects_scope() {
        let conn = seeded();
        let scope = ListScope::Visible {
            user_id: 3,
            include_performed: false,
        };
        let summary = summary(&conn, scope).unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.by_status[&Status::Review], 0);
    }

    #[test]
    fn project_and_performer_reports() {
        let conn = seeded();
        let project = by_project(&conn, ListScope::All, 20).unwrap();
        assert_eq!(project.total, 2);
        assert_eq!(project.by_status[&Status::Cancelled], 1);

        let performer = by_performer(&conn, ListScope::All, 2).unwrap();
        assert_eq!(performer.total, 3);
        assert_eq!(performer.by_status[&Status::Closed], 1);
    }
}
