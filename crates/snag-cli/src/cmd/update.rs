//! `snag update` — edit a defect's descriptive fields.
//!
//! Status changes go through `snag status`, performer changes through
//! `snag assign`.

use crate::cmd::Context;
use crate::output::render;
use crate::validate;
use anyhow::Result;
use clap::Args;
use snag_core::model::defect::{DefectPatch, Priority};

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Defect id.
    pub id: i64,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long)]
    pub priority: Option<Priority>,

    /// Move the defect to this stage of its project.
    #[arg(long, conflicts_with = "clear_stage")]
    pub stage: Option<i64>,

    /// Detach the defect from its stage.
    #[arg(long)]
    pub clear_stage: bool,

    /// Due date (YYYY-MM-DD).
    #[arg(long, conflicts_with = "clear_deadline")]
    pub deadline: Option<String>,

    #[arg(long)]
    pub clear_deadline: bool,
}

fn build_patch(args: &UpdateArgs) -> Result<DefectPatch> {
    if let Some(title) = &args.title {
        validate::validate_title(title).map_err(|e| e.to_cli_error())?;
    }

    let deadline = if args.clear_deadline {
        Some(None)
    } else {
        args.deadline
            .as_deref()
            .map(|s| validate::parse_date("deadline", s).map(Some))
            .transpose()
            .map_err(|e| e.to_cli_error())?
    };

    let stage_id = if args.clear_stage {
        Some(None)
    } else {
        args.stage.map(Some)
    };

    Ok(DefectPatch {
        title: args.title.clone(),
        description: args.description.clone(),
        priority: args.priority,
        stage_id,
        performer_id: None,
        deadline,
    })
}

pub fn run_update(args: &UpdateArgs, ctx: &mut Context) -> Result<()> {
    let patch = build_patch(args)?;
    let actor = ctx.actor()?;
    let defect = ctx.tracker.update_defect(actor.id, args.id, &patch)?;

    render(ctx.output, &defect, |d, w| {
        if patch.is_empty() {
            writeln!(w, "Nothing to change on defect #{}", d.id)
        } else {
            writeln!(w, "✓ Updated defect #{} '{}'", d.id, d.title)
        }
    })
}
