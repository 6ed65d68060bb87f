//! Subcommand handlers.
//!
//! Each handler takes its parsed args plus a [`Context`] (or, for `init`,
//! the project root) and returns `anyhow::Result<()>`. Failures are rendered
//! once, by `main`, from the error's code.

pub mod assign;
pub mod attach;
pub mod comment;
pub mod completions;
pub mod create;
pub mod delete;
pub mod history;
pub mod init;
pub mod list;
pub mod project;
pub mod show;
pub mod stage;
pub mod stats;
pub mod status;
pub mod update;
pub mod user;

use crate::actor;
use crate::output::{CliError, OutputMode};
use anyhow::Result;
use snag_core::ErrorCode;
use snag_core::Tracker;
use snag_core::config::{self, ProjectConfig, UserConfig};
use snag_core::model::user::User;
use std::path::Path;
use tracing::debug;

/// Flags shared by every subcommand.
pub struct Globals<'a> {
    pub actor_flag: Option<&'a str>,
    pub output: OutputMode,
    pub user_config: &'a UserConfig,
}

/// An opened tracker plus everything a handler needs to act on it.
pub struct Context {
    pub tracker: Tracker,
    pub config: ProjectConfig,
    pub output: OutputMode,
    actor_flag: Option<String>,
    default_actor: Option<String>,
}

impl Context {
    /// Locate `.snag/` above `project_root`, load its config and open the
    /// database.
    ///
    /// # Errors
    ///
    /// `E1001` outside a tracker, `E1002` for a malformed config, `E5001`
    /// when the database cannot be opened.
    pub fn open(project_root: &Path, globals: &Globals<'_>) -> Result<Self> {
        let snag_dir = config::find_snag_dir(project_root).ok_or_else(|| {
            CliError::coded(
                ErrorCode::NotInitialized,
                "not a snag tracker: .snag directory not found",
            )
        })?;
        let project = config::load_project_config(&snag_dir)
            .map_err(|err| CliError::coded(ErrorCode::ConfigParseError, format!("{err:#}")))?;

        let db_path = project.database.resolve_path(&snag_dir);
        let tracker = open_tracker(&db_path, &project)?;
        debug!(db = %db_path.display(), "opened tracker");

        Ok(Self {
            tracker,
            config: project,
            output: globals.output,
            actor_flag: globals.actor_flag.map(str::to_string),
            default_actor: globals.user_config.default_actor.clone(),
        })
    }

    /// The registered user this invocation acts as.
    ///
    /// # Errors
    ///
    /// `E1003` when no identity resolves, `E2001` when it names no user.
    pub fn actor(&self) -> Result<User> {
        let name = actor::require_actor(self.actor_flag.as_deref(), self.default_actor.as_deref())?;
        Ok(self.tracker.user_by_username(&name)?)
    }

    /// Look up a user id by username.
    ///
    /// # Errors
    ///
    /// `E2001` when the username is unknown.
    pub fn user_id(&self, username: &str) -> Result<i64> {
        Ok(self.tracker.user_by_username(username)?.id)
    }
}

pub(crate) fn open_tracker(db_path: &Path, project: &ProjectConfig) -> Result<Tracker> {
    Tracker::open(db_path, project.database.busy_timeout()).map_err(|err| {
        CliError::coded(
            ErrorCode::StorageFailure,
            format!("open database {}: {err:#}", db_path.display()),
        )
        .into()
    })
}
