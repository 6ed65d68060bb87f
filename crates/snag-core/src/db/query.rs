//! `SQLite` query helpers for the tracker database.
//!
//! Typed read access for every record kind plus the composable defect
//! listing used by the CLI and reports. All functions take a shared
//! `&Connection` (a `Transaction` derefs to one) and return typed structs,
//! never raw rows.

use crate::access::ListScope;
use crate::error::Result;
use crate::model::ParseEnumError;
use crate::model::defect::{Attachment, Comment, Defect, Priority, Status, StatusChange};
use crate::model::project::{Project, Stage};
use crate::model::user::User;
use chrono::NaiveDate;
use rusqlite::types::{ToSql, Type};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::str::FromStr;

const DATE_FORMAT: &str = "%Y-%m-%d";

const DEFECT_COLUMNS: &str = "d.defect_id, d.project_id, d.stage_id, d.title, d.description, \
     d.priority, d.status, d.performer_id, d.deadline, d.created_at_us, d.updated_at_us";

// ---------------------------------------------------------------------------
// Sorting
// ---------------------------------------------------------------------------

/// Sort order for defect listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Most recently reported first.
    #[default]
    CreatedDesc,
    /// Oldest first.
    CreatedAsc,
    /// Most recently updated first.
    UpdatedDesc,
    /// Earliest deadline first; defects without a deadline last.
    Deadline,
    /// high > medium > low, then newest first.
    Priority,
}

impl SortOrder {
    const fn sql_clause(self) -> &'static str {
        match self {
            Self::CreatedDesc => "ORDER BY d.created_at_us DESC, d.defect_id DESC",
            Self::CreatedAsc => "ORDER BY d.created_at_us ASC, d.defect_id ASC",
            Self::UpdatedDesc => "ORDER BY d.updated_at_us DESC, d.defect_id DESC",
            Self::Deadline => "ORDER BY d.deadline IS NULL, d.deadline ASC, d.defect_id ASC",
            Self::Priority => {
                "ORDER BY CASE d.priority \
                 WHEN 'high' THEN 0 \
                 WHEN 'medium' THEN 1 \
                 WHEN 'low' THEN 2 \
                 END ASC, d.created_at_us DESC, d.defect_id DESC"
            }
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreatedDesc => f.write_str("created_desc"),
            Self::CreatedAsc => f.write_str("created_asc"),
            Self::UpdatedDesc => f.write_str("updated_desc"),
            Self::Deadline => f.write_str("deadline"),
            Self::Priority => f.write_str("priority"),
        }
    }
}

impl FromStr for SortOrder {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "created_desc" | "created-desc" | "newest" => Ok(Self::CreatedDesc),
            "created_asc" | "created-asc" | "oldest" => Ok(Self::CreatedAsc),
            "updated_desc" | "updated-desc" | "recent" => Ok(Self::UpdatedDesc),
            "deadline" | "due" => Ok(Self::Deadline),
            "priority" => Ok(Self::Priority),
            _ => Err(ParseEnumError {
                expected: "sort order",
                got: s.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Filter criteria for defect listings.
///
/// All fields are optional and combined with AND semantics, after the
/// caller's [`ListScope`] has narrowed the candidate set.
#[derive(Debug, Clone, Default)]
pub struct DefectFilter {
    pub project_id: Option<i64>,
    pub stage_id: Option<i64>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub performer_id: Option<i64>,
    /// Case-insensitive substring of title or description.
    pub search: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub sort: SortOrder,
}

struct WhereClause {
    sql: String,
    params: Vec<Box<dyn ToSql>>,
}

impl WhereClause {
    fn build(scope: ListScope, filter: &DefectFilter) -> Self {
        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let ListScope::Visible {
            user_id,
            include_performed,
        } = scope
        {
            params.push(Box::new(user_id));
            let n = params.len();
            if include_performed {
                conditions.push(format!(
                    "(d.project_id IN \
                     (SELECT project_id FROM project_members WHERE user_id = ?{n}) \
                     OR d.performer_id = ?{n})"
                ));
            } else {
                conditions.push(format!(
                    "d.project_id IN (SELECT project_id FROM project_members WHERE user_id = ?{n})"
                ));
            }
        }

        if let Some(project_id) = filter.project_id {
            params.push(Box::new(project_id));
            conditions.push(format!("d.project_id = ?{}", params.len()));
        }

        if let Some(stage_id) = filter.stage_id {
            params.push(Box::new(stage_id));
            conditions.push(format!("d.stage_id = ?{}", params.len()));
        }

        if let Some(status) = filter.status {
            params.push(Box::new(status.as_str()));
            conditions.push(format!("d.status = ?{}", params.len()));
        }

        if let Some(priority) = filter.priority {
            params.push(Box::new(priority.as_str()));
            conditions.push(format!("d.priority = ?{}", params.len()));
        }

        if let Some(performer_id) = filter.performer_id {
            params.push(Box::new(performer_id));
            conditions.push(format!("d.performer_id = ?{}", params.len()));
        }

        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            params.push(Box::new(format!("%{}%", escape_like(search))));
            let n = params.len();
            conditions.push(format!(
                "(d.title LIKE ?{n} ESCAPE '\\' OR d.description LIKE ?{n} ESCAPE '\\')"
            ));
        }

        let sql = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        Self { sql, params }
    }

    fn params(&self) -> Vec<&dyn ToSql> {
        self.params.iter().map(AsRef::as_ref).collect()
    }
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

// ---------------------------------------------------------------------------
// Row decoding
// ---------------------------------------------------------------------------

fn enum_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = ParseEnumError>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

fn date_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|text| {
        NaiveDate::parse_from_str(&text, DATE_FORMAT).map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
        })
    })
    .transpose()
}

/// Render a date the way it is stored.
#[must_use]
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        role: enum_col(row, 3)?,
        created_at_us: row.get(4)?,
    })
}

fn row_to_project(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        status: enum_col(row, 3)?,
        start_date: date_col(row, 4)?,
        end_date: date_col(row, 5)?,
        created_at_us: row.get(6)?,
    })
}

fn row_to_stage(row: &Row<'_>) -> rusqlite::Result<Stage> {
    Ok(Stage {
        id: row.get(0)?,
        project_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
    })
}

fn row_to_defect(row: &Row<'_>) -> rusqlite::Result<Defect> {
    Ok(Defect {
        id: row.get(0)?,
        project_id: row.get(1)?,
        stage_id: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        priority: enum_col(row, 5)?,
        status: enum_col(row, 6)?,
        performer_id: row.get(7)?,
        deadline: date_col(row, 8)?,
        created_at_us: row.get(9)?,
        updated_at_us: row.get(10)?,
    })
}

fn collect<T>(rows: impl Iterator<Item = rusqlite::Result<T>>) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// Fetch a user by id.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn get_user(conn: &Connection, user_id: i64) -> Result<Option<User>> {
    Ok(conn
        .query_row(
            "SELECT user_id, username, email, role, created_at_us FROM users WHERE user_id = ?1",
            params![user_id],
            row_to_user,
        )
        .optional()?)
}

/// Fetch a user by exact username.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn get_user_by_username(conn: &Connection, username: &str) -> Result<Option<User>> {
    Ok(conn
        .query_row(
            "SELECT user_id, username, email, role, created_at_us FROM users WHERE username = ?1",
            params![username],
            row_to_user,
        )
        .optional()?)
}

/// Whether any user already has `email`.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn email_in_use(conn: &Connection, email: &str) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
        params![email],
        |row| row.get(0),
    )?)
}

/// All users ordered by id.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn list_users(conn: &Connection) -> Result<Vec<User>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, username, email, role, created_at_us FROM users ORDER BY user_id",
    )?;
    let rows = stmt.query_map([], row_to_user)?;
    collect(rows)
}

// ---------------------------------------------------------------------------
// Projects and stages
// ---------------------------------------------------------------------------

/// Fetch a project by id.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn get_project(conn: &Connection, project_id: i64) -> Result<Option<Project>> {
    Ok(conn
        .query_row(
            "SELECT project_id, title, description, status, start_date, end_date, created_at_us \
             FROM projects WHERE project_id = ?1",
            params![project_id],
            row_to_project,
        )
        .optional()?)
}

/// Projects visible under `scope`: all for managers, member projects for
/// everybody else.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn list_projects(conn: &Connection, scope: ListScope) -> Result<Vec<Project>> {
    let base = "SELECT p.project_id, p.title, p.description, p.status, p.start_date, \
                p.end_date, p.created_at_us FROM projects p";
    match scope {
        ListScope::All => {
            let mut stmt = conn.prepare(&format!("{base} ORDER BY p.project_id"))?;
            let rows = stmt.query_map([], row_to_project)?;
            collect(rows)
        }
        ListScope::Visible { user_id, .. } => {
            let mut stmt = conn.prepare(&format!(
                "{base} INNER JOIN project_members m ON m.project_id = p.project_id \
                 WHERE m.user_id = ?1 ORDER BY p.project_id"
            ))?;
            let rows = stmt.query_map(params![user_id], row_to_project)?;
            collect(rows)
        }
    }
}

/// Whether `user_id` is a member of `project_id`.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn is_member(conn: &Connection, project_id: i64, user_id: i64) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM project_members WHERE project_id = ?1 AND user_id = ?2)",
        params![project_id, user_id],
        |row| row.get(0),
    )?)
}

/// Members of a project ordered by user id.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn project_members(conn: &Connection, project_id: i64) -> Result<Vec<User>> {
    let mut stmt = conn.prepare(
        "SELECT u.user_id, u.username, u.email, u.role, u.created_at_us \
         FROM users u INNER JOIN project_members m ON m.user_id = u.user_id \
         WHERE m.project_id = ?1 ORDER BY u.user_id",
    )?;
    let rows = stmt.query_map(params![project_id], row_to_user)?;
    collect(rows)
}

/// Fetch a stage by id.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn get_stage(conn: &Connection, stage_id: i64) -> Result<Option<Stage>> {
    Ok(conn
        .query_row(
            "SELECT stage_id, project_id, title, description FROM stages WHERE stage_id = ?1",
            params![stage_id],
            row_to_stage,
        )
        .optional()?)
}

/// Stages of a project ordered by id.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn list_stages(conn: &Connection, project_id: i64) -> Result<Vec<Stage>> {
    let mut stmt = conn.prepare(
        "SELECT stage_id, project_id, title, description FROM stages \
         WHERE project_id = ?1 ORDER BY stage_id",
    )?;
    let rows = stmt.query_map(params![project_id], row_to_stage)?;
    collect(rows)
}

// ---------------------------------------------------------------------------
// Defects
// ---------------------------------------------------------------------------

/// Fetch a single defect by id.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn get_defect(conn: &Connection, defect_id: i64) -> Result<Option<Defect>> {
    let sql = format!("SELECT {DEFECT_COLUMNS} FROM defects d WHERE d.defect_id = ?1");
    Ok(conn
        .query_row(&sql, params![defect_id], row_to_defect)
        .optional()?)
}

/// List defects inside `scope` matching `filter`.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn list_defects(
    conn: &Connection,
    scope: ListScope,
    filter: &DefectFilter,
) -> Result<Vec<Defect>> {
    let clause = WhereClause::build(scope, filter);

    let mut sql = format!(
        "SELECT {DEFECT_COLUMNS} FROM defects d{} {}",
        clause.sql,
        filter.sort.sql_clause()
    );
    match (filter.limit, filter.offset) {
        (Some(limit), Some(offset)) => {
            let _ = write!(sql, " LIMIT {limit} OFFSET {offset}");
        }
        (Some(limit), None) => {
            let _ = write!(sql, " LIMIT {limit}");
        }
        (None, Some(offset)) => {
            let _ = write!(sql, " LIMIT -1 OFFSET {offset}");
        }
        (None, None) => {}
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(clause.params()), row_to_defect)?;
    collect(rows)
}

/// Count defects inside `scope` matching `filter`, ignoring pagination.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn count_defects(conn: &Connection, scope: ListScope, filter: &DefectFilter) -> Result<usize> {
    let clause = WhereClause::build(scope, filter);
    let sql = format!("SELECT COUNT(*) FROM defects d{}", clause.sql);
    let count: i64 = conn.query_row(&sql, params_from_iter(clause.params()), |row| row.get(0))?;
    Ok(usize::try_from(count).unwrap_or(usize::MAX))
}

/// Group defects inside `scope` matching `filter` by `column` (`status` or
/// `priority`) and count them.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn defect_counts_by(
    conn: &Connection,
    scope: ListScope,
    filter: &DefectFilter,
    column: GroupColumn,
) -> Result<BTreeMap<String, usize>> {
    let clause = WhereClause::build(scope, filter);
    let column = column.as_sql();
    let sql = format!(
        "SELECT d.{column}, COUNT(*) FROM defects d{} GROUP BY d.{column}",
        clause.sql
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(clause.params()), |row| {
        let key: String = row.get(0)?;
        let count: i64 = row.get(1)?;
        Ok((key, usize::try_from(count).unwrap_or(usize::MAX)))
    })?;

    let mut counts = BTreeMap::new();
    for row in rows {
        let (key, count) = row?;
        counts.insert(key, count);
    }
    Ok(counts)
}

/// Columns that aggregate queries may group by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupColumn {
    Status,
    Priority,
}

impl GroupColumn {
    const fn as_sql(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Priority => "priority",
        }
    }
}

// ---------------------------------------------------------------------------
// Defect children
// ---------------------------------------------------------------------------

/// Comments on a defect, oldest first.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn list_comments(conn: &Connection, defect_id: i64) -> Result<Vec<Comment>> {
    let mut stmt = conn.prepare(
        "SELECT comment_id, defect_id, author_id, body, created_at_us FROM comments \
         WHERE defect_id = ?1 ORDER BY created_at_us ASC, comment_id ASC",
    )?;
    let rows = stmt.query_map(params![defect_id], |row| {
        Ok(Comment {
            id: row.get(0)?,
            defect_id: row.get(1)?,
            author_id: row.get(2)?,
            body: row.get(3)?,
            created_at_us: row.get(4)?,
        })
    })?;
    collect(rows)
}

/// Attachments of a defect, oldest first.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn list_attachments(conn: &Connection, defect_id: i64) -> Result<Vec<Attachment>> {
    let mut stmt = conn.prepare(
        "SELECT attachment_id, defect_id, file_ref, uploaded_at_us FROM attachments \
         WHERE defect_id = ?1 ORDER BY attachment_id ASC",
    )?;
    let rows = stmt.query_map(params![defect_id], |row| {
        Ok(Attachment {
            id: row.get(0)?,
            defect_id: row.get(1)?,
            file_ref: row.get(2)?,
            uploaded_at_us: row.get(3)?,
        })
    })?;
    collect(rows)
}

/// Status history of a defect in the order the transitions happened.
///
/// # Errors
///
/// Returns an error if the database query fails.
pub fn status_history(conn: &Connection, defect_id: i64) -> Result<Vec<StatusChange>> {
    let mut stmt = conn.prepare(
        "SELECT change_id, defect_id, old_status, new_status, changed_by, changed_at_us \
         FROM status_history WHERE defect_id = ?1 ORDER BY change_id ASC",
    )?;
    let rows = stmt.query_map(params![defect_id], |row| {
        Ok(StatusChange {
            id: row.get(0)?,
            defect_id: row.get(1)?,
            old_status: enum_col(row, 2)?,
            new_status: enum_col(row, 3)?,
            changed_by: row.get(4)?,
            changed_at_us: row.get(5)?,
        })
    })?;
    collect(rows)
}
