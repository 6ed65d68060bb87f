//! `snag create` — report a new defect.

use crate::cmd::Context;
use crate::output::render;
use crate::validate;
use anyhow::Result;
use clap::Args;
use snag_core::model::defect::{NewDefect, Priority};

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Project the defect belongs to.
    #[arg(long, short)]
    pub project: i64,

    /// Short summary.
    #[arg(long, short)]
    pub title: String,

    #[arg(long, short, default_value = "")]
    pub description: String,

    /// low, medium or high.
    #[arg(long, default_value = "medium")]
    pub priority: Priority,

    /// Stage id within the project.
    #[arg(long)]
    pub stage: Option<i64>,

    /// Username of the performer (managers only).
    #[arg(long)]
    pub performer: Option<String>,

    /// Due date (YYYY-MM-DD).
    #[arg(long)]
    pub deadline: Option<String>,
}

pub fn run_create(args: &CreateArgs, ctx: &mut Context) -> Result<()> {
    validate::validate_title(&args.title).map_err(|e| e.to_cli_error())?;
    let deadline = args
        .deadline
        .as_deref()
        .map(|s| validate::parse_date("deadline", s))
        .transpose()
        .map_err(|e| e.to_cli_error())?;

    let actor = ctx.actor()?;
    let performer_id = args
        .performer
        .as_deref()
        .map(|name| ctx.user_id(name))
        .transpose()?;

    let defect = ctx.tracker.create_defect(
        actor.id,
        &NewDefect {
            project_id: args.project,
            stage_id: args.stage,
            title: args.title.clone(),
            description: args.description.clone(),
            priority: args.priority,
            performer_id,
            deadline,
        },
    )?;

    render(ctx.output, &defect, |d, w| {
        writeln!(w, "✓ Reported defect #{} '{}' [{}]", d.id, d.title, d.priority)
    })
}
