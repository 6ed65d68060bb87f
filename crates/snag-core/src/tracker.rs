//! The tracker: every operation collaborators may invoke, backed by SQLite.
//!
//! Each mutating operation resolves its ids, consults the guard in
//! [`crate::access`], and writes inside one transaction. Status changes use
//! an immediate transaction so that reading the current status, validating
//! the move, appending history and writing the new status happen while the
//! database write lock is held.

use crate::access::{self, Operation, Relation};
use crate::db::{self, query};
use crate::error::{Entity, Error, Result};
use crate::model::defect::{
    Attachment, Comment, Defect, DefectPatch, NewDefect, Status, StatusChange,
};
use crate::model::now_us;
use crate::model::project::{NewProject, Project, ProjectStatus, Stage};
use crate::model::user::{NewUser, Role, User};
use crate::stats::{self, PerformerReport, ProjectReport, Summary};
use crate::workflow::{self, TransitionPlan};
use rusqlite::{Connection, TransactionBehavior, params};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// A page of defects plus the unpaginated match count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefectPage {
    pub defects: Vec<Defect>,
    pub total: usize,
}

pub struct Tracker {
    conn: Connection,
}

impl Tracker {
    /// Open the tracker database at `path`, creating and migrating it when
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: &Path, busy_timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            conn: db::open_db(path, busy_timeout)?,
        })
    }

    /// Open a throwaway in-memory tracker.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        Ok(Self {
            conn: db::open_in_memory()?,
        })
    }

    /// Borrow the underlying connection for read-only queries.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    // -----------------------------------------------------------------------
    // Identity
    // -----------------------------------------------------------------------

    /// Create the first manager of an empty tracker.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PermissionDenied`] once any user exists.
    pub fn bootstrap_manager(&mut self, username: &str, email: Option<&str>) -> Result<User> {
        let tx = self.conn.transaction()?;
        let existing: i64 = tx.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        if existing > 0 {
            return Err(Error::denied(
                "tracker already has users; ask a manager to add accounts",
            ));
        }
        let user = insert_user(
            &tx,
            &NewUser {
                username: username.to_string(),
                email: email.map(str::to_string),
                role: Role::Manager,
            },
        )?;
        tx.commit()?;
        info!(user = user.id, username = %user.username, "bootstrapped first manager");
        Ok(user)
    }

    /// Register a user. Managers only.
    ///
    /// # Errors
    ///
    /// - [`Error::PermissionDenied`] for non-managers.
    /// - [`Error::InvariantViolation`] for blank or taken usernames.
    pub fn create_user(&mut self, actor_id: i64, new: &NewUser) -> Result<User> {
        let tx = self.conn.transaction()?;
        let actor = require_user(&tx, actor_id)?;
        access::require_manager(&actor, "create users")?;
        let user = insert_user(&tx, new)?;
        tx.commit()?;
        info!(actor = actor.id, user = user.id, role = %user.role, "created user");
        Ok(user)
    }

    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when no user has this id.
    pub fn user(&self, user_id: i64) -> Result<User> {
        require_user(&self.conn, user_id)
    }

    /// # Errors
    ///
    /// Returns [`Error::NotFoundByKey`] when no user has this username.
    pub fn user_by_username(&self, username: &str) -> Result<User> {
        query::get_user_by_username(&self.conn, username)?.ok_or_else(|| Error::NotFoundByKey {
            entity: Entity::User,
            key: username.to_string(),
        })
    }

    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn users(&self) -> Result<Vec<User>> {
        query::list_users(&self.conn)
    }

    // -----------------------------------------------------------------------
    // Projects, membership and stages
    // -----------------------------------------------------------------------

    /// Create a project. Managers only.
    ///
    /// # Errors
    ///
    /// - [`Error::PermissionDenied`] for non-managers.
    /// - [`Error::InvariantViolation`] for a blank title or an end date
    ///   before the start date.
    pub fn create_project(&mut self, actor_id: i64, new: &NewProject) -> Result<Project> {
        let tx = self.conn.transaction()?;
        let actor = require_user(&tx, actor_id)?;
        access::require_manager(&actor, "create projects")?;

        let title = non_blank(&new.title, "project title")?;
        if let (Some(start), Some(end)) = (new.start_date, new.end_date) {
            if end < start {
                return Err(Error::invariant(format!(
                    "project end date {end} is before start date {start}"
                )));
            }
        }

        tx.execute(
            "INSERT INTO projects (title, description, status, start_date, end_date, created_at_us)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                title,
                new.description,
                ProjectStatus::Active.as_str(),
                new.start_date.map(query::format_date),
                new.end_date.map(query::format_date),
                now_us(),
            ],
        )?;
        let project = require_project(&tx, tx.last_insert_rowid())?;
        tx.commit()?;
        info!(actor = actor.id, project = project.id, "created project");
        Ok(project)
    }

    /// Mark a project closed. Managers only.
    ///
    /// # Errors
    ///
    /// [`Error::PermissionDenied`] for non-managers, [`Error::NotFound`] for
    /// unknown ids.
    pub fn close_project(&mut self, actor_id: i64, project_id: i64) -> Result<Project> {
        let tx = self.conn.transaction()?;
        let actor = require_user(&tx, actor_id)?;
        access::require_manager(&actor, "close projects")?;
        require_project(&tx, project_id)?;
        tx.execute(
            "UPDATE projects SET status = ?1 WHERE project_id = ?2",
            params![ProjectStatus::Closed.as_str(), project_id],
        )?;
        let project = require_project(&tx, project_id)?;
        tx.commit()?;
        info!(actor = actor.id, project = project_id, "closed project");
        Ok(project)
    }

    /// Delete a project with its stages and defects. Managers only.
    ///
    /// # Errors
    ///
    /// [`Error::PermissionDenied`] for non-managers, [`Error::NotFound`] for
    /// unknown ids.
    pub fn delete_project(&mut self, actor_id: i64, project_id: i64) -> Result<()> {
        let tx = self.conn.transaction()?;
        let actor = require_user(&tx, actor_id)?;
        access::require_manager(&actor, "delete projects")?;
        require_project(&tx, project_id)?;
        tx.execute(
            "DELETE FROM projects WHERE project_id = ?1",
            params![project_id],
        )?;
        tx.commit()?;
        info!(actor = actor.id, project = project_id, "deleted project");
        Ok(())
    }

    /// A project the actor can see: managers see every project, everyone
    /// else only projects they belong to.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for unknown ids, [`Error::PermissionDenied`] for a
    /// non-member.
    pub fn project(&self, actor_id: i64, project_id: i64) -> Result<Project> {
        visible_project(&self.conn, actor_id, project_id)
    }

    /// Projects the actor can see: all for managers, member projects
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown actor.
    pub fn projects(&self, actor_id: i64) -> Result<Vec<Project>> {
        let actor = require_user(&self.conn, actor_id)?;
        query::list_projects(&self.conn, access::list_scope(&actor))
    }

    /// Add a user to a project's member set. Adding an existing member is a
    /// no-op. Managers only.
    ///
    /// # Errors
    ///
    /// [`Error::PermissionDenied`] for non-managers, [`Error::NotFound`] for
    /// unknown ids.
    pub fn add_member(&mut self, actor_id: i64, project_id: i64, user_id: i64) -> Result<()> {
        let tx = self.conn.transaction()?;
        let actor = require_user(&tx, actor_id)?;
        access::require_manager(&actor, "manage project members")?;
        require_project(&tx, project_id)?;
        require_user(&tx, user_id)?;
        tx.execute(
            "INSERT OR IGNORE INTO project_members (project_id, user_id, added_at_us)
             VALUES (?1, ?2, ?3)",
            params![project_id, user_id, now_us()],
        )?;
        tx.commit()?;
        info!(actor = actor.id, project = project_id, user = user_id, "added member");
        Ok(())
    }

    /// Remove a user from a project's member set. Managers only.
    ///
    /// # Errors
    ///
    /// [`Error::PermissionDenied`] for non-managers, [`Error::NotFound`] for
    /// unknown ids.
    pub fn remove_member(&mut self, actor_id: i64, project_id: i64, user_id: i64) -> Result<()> {
        let tx = self.conn.transaction()?;
        let actor = require_user(&tx, actor_id)?;
        access::require_manager(&actor, "manage project members")?;
        require_project(&tx, project_id)?;
        require_user(&tx, user_id)?;
        tx.execute(
            "DELETE FROM project_members WHERE project_id = ?1 AND user_id = ?2",
            params![project_id, user_id],
        )?;
        tx.commit()?;
        info!(actor = actor.id, project = project_id, user = user_id, "removed member");
        Ok(())
    }

    /// Members of a project the actor can see.
    ///
    /// # Errors
    ///
    /// As for [`Self::project`].
    pub fn members(&self, actor_id: i64, project_id: i64) -> Result<Vec<User>> {
        visible_project(&self.conn, actor_id, project_id)?;
        query::project_members(&self.conn, project_id)
    }

    /// Add a stage to a project. Managers only.
    ///
    /// # Errors
    ///
    /// [`Error::PermissionDenied`] for non-managers, [`Error::NotFound`] for
    /// an unknown project, [`Error::InvariantViolation`] for a blank title.
    pub fn create_stage(
        &mut self,
        actor_id: i64,
        project_id: i64,
        title: &str,
        description: &str,
    ) -> Result<Stage> {
        let tx = self.conn.transaction()?;
        let actor = require_user(&tx, actor_id)?;
        access::require_manager(&actor, "create stages")?;
        require_project(&tx, project_id)?;
        let title = non_blank(title, "stage title")?;
        tx.execute(
            "INSERT INTO stages (project_id, title, description) VALUES (?1, ?2, ?3)",
            params![project_id, title, description],
        )?;
        let stage = require_stage(&tx, tx.last_insert_rowid())?;
        tx.commit()?;
        info!(actor = actor.id, project = project_id, stage = stage.id, "created stage");
        Ok(stage)
    }

    /// Delete a stage. Defects in the stage keep existing with no stage.
    /// Managers only.
    ///
    /// # Errors
    ///
    /// [`Error::PermissionDenied`] for non-managers, [`Error::NotFound`] for
    /// unknown ids.
    pub fn delete_stage(&mut self, actor_id: i64, stage_id: i64) -> Result<()> {
        let tx = self.conn.transaction()?;
        let actor = require_user(&tx, actor_id)?;
        access::require_manager(&actor, "delete stages")?;
        require_stage(&tx, stage_id)?;
        tx.execute("DELETE FROM stages WHERE stage_id = ?1", params![stage_id])?;
        tx.commit()?;
        info!(actor = actor.id, stage = stage_id, "deleted stage");
        Ok(())
    }

    /// Stages of a project the actor can see.
    ///
    /// # Errors
    ///
    /// As for [`Self::project`].
    pub fn stages(&self, actor_id: i64, project_id: i64) -> Result<Vec<Stage>> {
        visible_project(&self.conn, actor_id, project_id)?;
        query::list_stages(&self.conn, project_id)
    }

    // -----------------------------------------------------------------------
    // Defects
    // -----------------------------------------------------------------------

    /// Report a new defect. It starts in [`Status::New`].
    ///
    /// # Errors
    ///
    /// - [`Error::PermissionDenied`] for observers, or engineers naming a
    ///   performer.
    /// - [`Error::NotFound`] for unknown project, stage or performer ids.
    /// - [`Error::InvariantViolation`] for a blank title, a stage from
    ///   another project, or an observer performer.
    pub fn create_defect(&mut self, actor_id: i64, new: &NewDefect) -> Result<Defect> {
        let tx = self.conn.transaction()?;
        let actor = require_user(&tx, actor_id)?;
        access::can_create_defect(&actor)?;

        let title = non_blank(&new.title, "defect title")?;
        let project = require_project(&tx, new.project_id)?;
        if let Some(stage_id) = new.stage_id {
            ensure_stage_in_project(&tx, stage_id, project.id)?;
        }
        if let Some(performer_id) = new.performer_id {
            if !access::authorize(actor.role, Relation::default(), Operation::Assign) {
                return Err(Error::denied(format!(
                    "{} '{}' may not assign a performer",
                    actor.role, actor.username
                )));
            }
            let performer = require_user(&tx, performer_id)?;
            access::can_assign_performer(&performer)?;
        }

        let now = now_us();
        tx.execute(
            "INSERT INTO defects (project_id, stage_id, title, description, priority, status,
                                  performer_id, deadline, created_at_us, updated_at_us)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
            params![
                project.id,
                new.stage_id,
                title,
                new.description,
                new.priority.as_str(),
                Status::New.as_str(),
                new.performer_id,
                new.deadline.map(query::format_date),
                now,
            ],
        )?;
        let defect = require_defect(&tx, tx.last_insert_rowid())?;
        tx.commit()?;
        info!(
            actor = actor.id,
            defect = defect.id,
            project = defect.project_id,
            "reported defect"
        );
        Ok(defect)
    }

    /// Edit the non-status fields of a defect.
    ///
    /// Requires `write`; changing the performer also requires `assign` and
    /// re-checks the performer invariant. An empty patch changes nothing.
    ///
    /// # Errors
    ///
    /// [`Error::PermissionDenied`], [`Error::NotFound`] or
    /// [`Error::InvariantViolation`] as for creation.
    pub fn update_defect(
        &mut self,
        actor_id: i64,
        defect_id: i64,
        patch: &DefectPatch,
    ) -> Result<Defect> {
        let tx = self.conn.transaction()?;
        let actor = require_user(&tx, actor_id)?;
        let current = require_defect(&tx, defect_id)?;
        let relation = relation_to(&tx, &actor, &current)?;
        access::require(&actor, &current, relation, Operation::Write)?;

        if patch.is_empty() {
            return Ok(current);
        }

        let mut next = current.clone();
        if let Some(title) = &patch.title {
            next.title = non_blank(title, "defect title")?.to_string();
        }
        if let Some(description) = &patch.description {
            next.description.clone_from(description);
        }
        if let Some(priority) = patch.priority {
            next.priority = priority;
        }
        if let Some(stage_id) = patch.stage_id {
            if let Some(stage_id) = stage_id {
                ensure_stage_in_project(&tx, stage_id, current.project_id)?;
            }
            next.stage_id = stage_id;
        }
        if let Some(performer_id) = patch.performer_id {
            access::require(&actor, &current, relation, Operation::Assign)?;
            if let Some(performer_id) = performer_id {
                let performer = require_user(&tx, performer_id)?;
                access::can_assign_performer(&performer)?;
            }
            next.performer_id = performer_id;
        }
        if let Some(deadline) = patch.deadline {
            next.deadline = deadline;
        }

        tx.execute(
            "UPDATE defects SET title = ?1, description = ?2, priority = ?3, stage_id = ?4,
                                performer_id = ?5, deadline = ?6, updated_at_us = ?7
             WHERE defect_id = ?8",
            params![
                next.title,
                next.description,
                next.priority.as_str(),
                next.stage_id,
                next.performer_id,
                next.deadline.map(query::format_date),
                now_us(),
                defect_id,
            ],
        )?;
        let updated = require_defect(&tx, defect_id)?;
        tx.commit()?;
        info!(actor = actor.id, defect = defect_id, "updated defect");
        Ok(updated)
    }

    /// Hard-delete a defect with its attachments, comments and history.
    /// Managers only.
    ///
    /// # Errors
    ///
    /// [`Error::PermissionDenied`] for non-managers, [`Error::NotFound`] for
    /// unknown ids.
    pub fn delete_defect(&mut self, actor_id: i64, defect_id: i64) -> Result<()> {
        let tx = self.conn.transaction()?;
        let actor = require_user(&tx, actor_id)?;
        let defect = require_defect(&tx, defect_id)?;
        let relation = relation_to(&tx, &actor, &defect)?;
        access::require(&actor, &defect, relation, Operation::Delete)?;
        tx.execute("DELETE FROM defects WHERE defect_id = ?1", params![defect_id])?;
        tx.commit()?;
        info!(actor = actor.id, defect = defect_id, "deleted defect");
        Ok(())
    }

    /// Move a defect to `new_status` on behalf of `actor_id`.
    ///
    /// Requesting the current status returns the defect unchanged without
    /// writing history. Otherwise one history row is appended and the
    /// status and update timestamp are written in the same immediate
    /// transaction; a concurrent caller waits for the lock and then
    /// validates against the committed status.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] for unknown defect or actor ids.
    /// - [`Error::InvalidTransition`] when the lifecycle forbids the move.
    /// - [`Error::PermissionDenied`] when the actor's role forbids it.
    pub fn change_status(
        &mut self,
        defect_id: i64,
        new_status: Status,
        actor_id: i64,
    ) -> Result<Defect> {
        self.transition(defect_id, new_status, actor_id)
            .map(|(defect, _)| defect)
    }

    /// [`Self::change_status`], also returning the plan that was applied.
    ///
    /// The plan is decided under the same write lock as the update, so
    /// [`TransitionPlan::Apply`] carries the status the defect really left.
    ///
    /// # Errors
    ///
    /// As for [`Self::change_status`].
    pub fn transition(
        &mut self,
        defect_id: i64,
        new_status: Status,
        actor_id: i64,
    ) -> Result<(Defect, TransitionPlan)> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let actor = require_user(&tx, actor_id)?;
        let defect = require_defect(&tx, defect_id)?;

        let plan = workflow::plan_transition(defect.status, new_status, &actor, defect.performer_id)
            .inspect_err(|err| {
                warn!(
                    actor = actor.id,
                    defect = defect_id,
                    from = %defect.status,
                    to = %new_status,
                    code = %err.code(),
                    "status change rejected: {err}"
                );
            })?;

        let TransitionPlan::Apply { from, to } = plan else {
            return Ok((defect, plan));
        };

        let now = now_us();
        tx.execute(
            "INSERT INTO status_history
                 (defect_id, old_status, new_status, changed_by, changed_at_us)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![defect_id, from.as_str(), to.as_str(), actor.id, now],
        )?;
        tx.execute(
            "UPDATE defects SET status = ?1, updated_at_us = ?2 WHERE defect_id = ?3",
            params![to.as_str(), now, defect_id],
        )?;
        let updated = require_defect(&tx, defect_id)?;
        tx.commit()?;

        info!(
            actor = actor.id,
            defect = defect_id,
            from = %from,
            to = %to,
            "changed defect status"
        );
        Ok((updated, plan))
    }

    /// Whether `actor_id` may perform `op` on `defect_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when either id does not resolve.
    pub fn authorize(&self, actor_id: i64, defect_id: i64, op: Operation) -> Result<bool> {
        let actor = require_user(&self.conn, actor_id)?;
        let defect = require_defect(&self.conn, defect_id)?;
        let relation = relation_to(&self.conn, &actor, &defect)?;
        Ok(access::authorize(actor.role, relation, op))
    }

    /// Fetch a defect the actor may read.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for unknown ids, [`Error::PermissionDenied`] when
    /// the actor may not read it.
    pub fn defect(&self, actor_id: i64, defect_id: i64) -> Result<Defect> {
        let (_, defect) = self.readable(actor_id, defect_id)?;
        Ok(defect)
    }

    /// The project and stage a readable defect sits in. Performers outside
    /// the project's member set see these through the defect only.
    ///
    /// # Errors
    ///
    /// As for [`Self::defect`].
    pub fn defect_location(
        &self,
        actor_id: i64,
        defect_id: i64,
    ) -> Result<(Project, Option<Stage>)> {
        let (_, defect) = self.readable(actor_id, defect_id)?;
        let project = require_project(&self.conn, defect.project_id)?;
        let stage = defect
            .stage_id
            .map(|stage_id| require_stage(&self.conn, stage_id))
            .transpose()?;
        Ok((project, stage))
    }

    /// List the defects visible to the actor, narrowed by `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown actor.
    pub fn list_defects(&self, actor_id: i64, filter: &query::DefectFilter) -> Result<DefectPage> {
        let actor = require_user(&self.conn, actor_id)?;
        let scope = access::list_scope(&actor);
        Ok(DefectPage {
            defects: query::list_defects(&self.conn, scope, filter)?,
            total: query::count_defects(&self.conn, scope, filter)?,
        })
    }

    // -----------------------------------------------------------------------
    // Comments, attachments and history
    // -----------------------------------------------------------------------

    /// Append a comment.
    ///
    /// # Errors
    ///
    /// [`Error::PermissionDenied`] when the actor may not comment,
    /// [`Error::InvariantViolation`] for a blank body.
    pub fn add_comment(&mut self, actor_id: i64, defect_id: i64, body: &str) -> Result<Comment> {
        let tx = self.conn.transaction()?;
        let actor = require_user(&tx, actor_id)?;
        let defect = require_defect(&tx, defect_id)?;
        let relation = relation_to(&tx, &actor, &defect)?;
        access::require(&actor, &defect, relation, Operation::Comment)?;
        non_blank(body, "comment body")?;

        let now = now_us();
        tx.execute(
            "INSERT INTO comments (defect_id, author_id, body, created_at_us)
             VALUES (?1, ?2, ?3, ?4)",
            params![defect_id, actor.id, body, now],
        )?;
        let comment = Comment {
            id: tx.last_insert_rowid(),
            defect_id,
            author_id: actor.id,
            body: body.to_string(),
            created_at_us: now,
        };
        tx.commit()?;
        info!(actor = actor.id, defect = defect_id, comment = comment.id, "added comment");
        Ok(comment)
    }

    /// # Errors
    ///
    /// [`Error::NotFound`] or [`Error::PermissionDenied`] as for [`Self::defect`].
    pub fn comments(&self, actor_id: i64, defect_id: i64) -> Result<Vec<Comment>> {
        self.readable(actor_id, defect_id)?;
        query::list_comments(&self.conn, defect_id)
    }

    /// Record an attachment. Requires write access to the defect.
    ///
    /// # Errors
    ///
    /// [`Error::PermissionDenied`] without write access,
    /// [`Error::InvariantViolation`] for a blank file reference.
    pub fn add_attachment(
        &mut self,
        actor_id: i64,
        defect_id: i64,
        file_ref: &str,
    ) -> Result<Attachment> {
        let tx = self.conn.transaction()?;
        let actor = require_user(&tx, actor_id)?;
        let defect = require_defect(&tx, defect_id)?;
        let relation = relation_to(&tx, &actor, &defect)?;
        access::require(&actor, &defect, relation, Operation::Write)?;
        let file_ref = non_blank(file_ref, "attachment file reference")?;

        let now = now_us();
        tx.execute(
            "INSERT INTO attachments (defect_id, file_ref, uploaded_at_us) VALUES (?1, ?2, ?3)",
            params![defect_id, file_ref, now],
        )?;
        let attachment = Attachment {
            id: tx.last_insert_rowid(),
            defect_id,
            file_ref: file_ref.to_string(),
            uploaded_at_us: now,
        };
        tx.commit()?;
        info!(
            actor = actor.id,
            defect = defect_id,
            attachment = attachment.id,
            "added attachment"
        );
        Ok(attachment)
    }

    /// # Errors
    ///
    /// [`Error::NotFound`] or [`Error::PermissionDenied`] as for [`Self::defect`].
    pub fn attachments(&self, actor_id: i64, defect_id: i64) -> Result<Vec<Attachment>> {
        self.readable(actor_id, defect_id)?;
        query::list_attachments(&self.conn, defect_id)
    }

    /// Status transitions of a defect, oldest first.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] or [`Error::PermissionDenied`] as for [`Self::defect`].
    pub fn history(&self, actor_id: i64, defect_id: i64) -> Result<Vec<StatusChange>> {
        self.readable(actor_id, defect_id)?;
        query::status_history(&self.conn, defect_id)
    }

    // -----------------------------------------------------------------------
    // Reports
    // -----------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown actor.
    pub fn summary(&self, actor_id: i64) -> Result<Summary> {
        let actor = require_user(&self.conn, actor_id)?;
        stats::summary(&self.conn, access::list_scope(&actor))
    }

    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown actor or project.
    pub fn project_report(&self, actor_id: i64, project_id: i64) -> Result<ProjectReport> {
        let actor = require_user(&self.conn, actor_id)?;
        require_project(&self.conn, project_id)?;
        stats::by_project(&self.conn, access::list_scope(&actor), project_id)
    }

    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown actor or performer.
    pub fn performer_report(&self, actor_id: i64, performer_id: i64) -> Result<PerformerReport> {
        let actor = require_user(&self.conn, actor_id)?;
        require_user(&self.conn, performer_id)?;
        stats::by_performer(&self.conn, access::list_scope(&actor), performer_id)
    }

    fn readable(&self, actor_id: i64, defect_id: i64) -> Result<(User, Defect)> {
        let actor = require_user(&self.conn, actor_id)?;
        let defect = require_defect(&self.conn, defect_id)?;
        let relation = relation_to(&self.conn, &actor, &defect)?;
        access::require(&actor, &defect, relation, Operation::Read)?;
        Ok((actor, defect))
    }
}

fn insert_user(conn: &Connection, new: &NewUser) -> Result<User> {
    let username = non_blank(&new.username, "username")?;
    if query::get_user_by_username(conn, username)?.is_some() {
        return Err(Error::invariant(format!("username '{username}' is taken")));
    }
    let email = new
        .email
        .as_deref()
        .map(str::trim)
        .filter(|email| !email.is_empty());
    if let Some(email) = email {
        if query::email_in_use(conn, email)? {
            return Err(Error::invariant(format!("email '{email}' is taken")));
        }
    }

    conn.execute(
        "INSERT INTO users (username, email, role, created_at_us) VALUES (?1, ?2, ?3, ?4)",
        params![username, email, new.role.as_str(), now_us()],
    )?;
    require_user(conn, conn.last_insert_rowid())
}

fn require_user(conn: &Connection, user_id: i64) -> Result<User> {
    query::get_user(conn, user_id)?.ok_or_else(|| Error::not_found(Entity::User, user_id))
}

fn require_project(conn: &Connection, project_id: i64) -> Result<Project> {
    query::get_project(conn, project_id)?
        .ok_or_else(|| Error::not_found(Entity::Project, project_id))
}

fn require_stage(conn: &Connection, stage_id: i64) -> Result<Stage> {
    query::get_stage(conn, stage_id)?.ok_or_else(|| Error::not_found(Entity::Stage, stage_id))
}

fn require_defect(conn: &Connection, defect_id: i64) -> Result<Defect> {
    query::get_defect(conn, defect_id)?
        .ok_or_else(|| Error::not_found(Entity::Defect, defect_id))
}

fn visible_project(conn: &Connection, actor_id: i64, project_id: i64) -> Result<Project> {
    let actor = require_user(conn, actor_id)?;
    let project = require_project(conn, project_id)?;
    if actor.role != Role::Manager && !query::is_member(conn, project_id, actor.id)? {
        return Err(Error::denied(format!(
            "{} is not a member of project {project_id}",
            actor.username
        )));
    }
    Ok(project)
}

fn ensure_stage_in_project(conn: &Connection, stage_id: i64, project_id: i64) -> Result<()> {
    let stage = require_stage(conn, stage_id)?;
    if stage.project_id != project_id {
        return Err(Error::invariant(format!(
            "stage {stage_id} belongs to project {}, not project {project_id}",
            stage.project_id
        )));
    }
    Ok(())
}

fn relation_to(conn: &Connection, actor: &User, defect: &Defect) -> Result<Relation> {
    let is_member = query::is_member(conn, defect.project_id, actor.id)?;
    Ok(Relation::of(actor, defect, is_member))
}

fn non_blank<'a>(value: &'a str, field: &str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(Error::invariant(format!("{field} must not be empty")))
    } else {
        Ok(trimmed)
    }
}
