//! `snag project` — project administration and membership.

use crate::cmd::Context;
use crate::output::{pretty_kv, render};
use crate::validate;
use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;
use snag_core::model::project::NewProject;

#[derive(Args, Debug)]
pub struct ProjectArgs {
    #[command(subcommand)]
    pub command: ProjectCommand,
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    #[command(
        about = "Create a project (managers only)",
        after_help = "EXAMPLES:\n    snag project add \"Tower A\" --start 2026-03-01 --end 2027-06-30"
    )]
    Add(ProjectAddArgs),

    #[command(about = "List projects visible to you")]
    List,

    #[command(about = "Mark a project closed (managers only)")]
    Close {
        /// Project id.
        id: i64,
    },

    #[command(about = "Delete a project with its stages and defects (managers only)")]
    Delete {
        /// Project id.
        id: i64,
    },

    #[command(about = "Manage project membership")]
    Member {
        #[command(subcommand)]
        command: MemberCommand,
    },
}

#[derive(Args, Debug)]
pub struct ProjectAddArgs {
    pub title: String,

    #[arg(long, default_value = "")]
    pub description: String,

    /// Start date (YYYY-MM-DD).
    #[arg(long)]
    pub start: Option<String>,

    /// Planned end date (YYYY-MM-DD).
    #[arg(long)]
    pub end: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum MemberCommand {
    #[command(
        about = "Add a user to a project",
        after_help = "EXAMPLES:\n    snag project member add 1 eli"
    )]
    Add { project: i64, username: String },

    #[command(about = "Remove a user from a project")]
    Remove { project: i64, username: String },

    #[command(about = "List project members")]
    List { project: i64 },
}

#[derive(Debug, Serialize)]
struct MemberChange<'a> {
    ok: bool,
    project_id: i64,
    username: &'a str,
    action: &'static str,
}

pub fn run_project(args: &ProjectArgs, ctx: &mut Context) -> Result<()> {
    match &args.command {
        ProjectCommand::Add(add) => run_add(add, ctx),
        ProjectCommand::List => run_list(ctx),
        ProjectCommand::Close { id } => {
            let actor = ctx.actor()?;
            let project = ctx.tracker.close_project(actor.id, *id)?;
            render(ctx.output, &project, |p, w| {
                writeln!(w, "✓ Closed project #{} '{}'", p.id, p.title)
            })
        }
        ProjectCommand::Delete { id } => {
            let actor = ctx.actor()?;
            ctx.tracker.delete_project(actor.id, *id)?;
            let payload = serde_json::json!({ "ok": true, "deleted_project": id });
            render(ctx.output, &payload, |_, w| {
                writeln!(w, "✓ Deleted project #{id}")
            })
        }
        ProjectCommand::Member { command } => run_member(command, ctx),
    }
}

fn run_add(args: &ProjectAddArgs, ctx: &mut Context) -> Result<()> {
    validate::validate_title(&args.title).map_err(|e| e.to_cli_error())?;
    let start_date = args
        .start
        .as_deref()
        .map(|s| validate::parse_date("start", s))
        .transpose()
        .map_err(|e| e.to_cli_error())?;
    let end_date = args
        .end
        .as_deref()
        .map(|s| validate::parse_date("end", s))
        .transpose()
        .map_err(|e| e.to_cli_error())?;

    let actor = ctx.actor()?;
    let project = ctx.tracker.create_project(
        actor.id,
        &NewProject {
            title: args.title.clone(),
            description: args.description.clone(),
            start_date,
            end_date,
        },
    )?;

    render(ctx.output, &project, |p, w| {
        writeln!(w, "✓ Created project #{} '{}'", p.id, p.title)
    })
}

fn run_list(ctx: &Context) -> Result<()> {
    let actor = ctx.actor()?;
    let projects = ctx.tracker.projects(actor.id)?;
    render(ctx.output, &projects, |projects, w| {
        if projects.is_empty() {
            return writeln!(w, "No projects visible.");
        }
        for p in projects {
            let dates = match (p.start_date, p.end_date) {
                (Some(start), Some(end)) => format!("{start} .. {end}"),
                (Some(start), None) => format!("{start} .."),
                (None, Some(end)) => format!(".. {end}"),
                (None, None) => String::new(),
            };
            writeln!(w, "{:<5} {:<7} {:<32} {}", p.id, p.status, p.title, dates)?;
        }
        Ok(())
    })
}

fn run_member(command: &MemberCommand, ctx: &mut Context) -> Result<()> {
    let actor = ctx.actor()?;
    match command {
        MemberCommand::Add { project, username } => {
            let user_id = ctx.user_id(username)?;
            ctx.tracker.add_member(actor.id, *project, user_id)?;
            let payload = MemberChange {
                ok: true,
                project_id: *project,
                username,
                action: "added",
            };
            render(ctx.output, &payload, |p, w| {
                writeln!(w, "✓ {} {} to project #{}", p.action, p.username, p.project_id)
            })
        }
        MemberCommand::Remove { project, username } => {
            let user_id = ctx.user_id(username)?;
            ctx.tracker.remove_member(actor.id, *project, user_id)?;
            let payload = MemberChange {
                ok: true,
                project_id: *project,
                username,
                action: "removed",
            };
            render(ctx.output, &payload, |p, w| {
                writeln!(w, "✓ {} {} from project #{}", p.action, p.username, p.project_id)
            })
        }
        MemberCommand::List { project } => {
            let project = ctx.tracker.project(actor.id, *project)?;
            let members = ctx.tracker.members(actor.id, project.id)?;
            render(ctx.output, &members, |members, w| {
                pretty_kv(w, "project", format!("#{} {}", project.id, project.title))?;
                for m in members {
                    writeln!(w, "  {:<20} {}", m.username, m.role)?;
                }
                Ok(())
            })
        }
    }
}
