//! `snag stage` — project phases that group defects.

use crate::cmd::Context;
use crate::output::render;
use crate::validate;
use anyhow::Result;
use clap::{Args, Subcommand};

#[derive(Args, Debug)]
pub struct StageArgs {
    #[command(subcommand)]
    pub command: StageCommand,
}

#[derive(Subcommand, Debug)]
pub enum StageCommand {
    #[command(
        about = "Add a stage to a project (managers only)",
        after_help = "EXAMPLES:\n    snag stage add 1 \"Structure\" --description \"Frame and slabs\""
    )]
    Add {
        project: i64,
        title: String,
        #[arg(long, default_value = "")]
        description: String,
    },

    #[command(about = "List a project's stages")]
    List { project: i64 },

    #[command(about = "Delete a stage; its defects keep existing without one (managers only)")]
    Delete { id: i64 },
}

pub fn run_stage(args: &StageArgs, ctx: &mut Context) -> Result<()> {
    let actor = ctx.actor()?;
    match &args.command {
        StageCommand::Add {
            project,
            title,
            description,
        } => {
            validate::validate_title(title).map_err(|e| e.to_cli_error())?;
            let stage = ctx
                .tracker
                .create_stage(actor.id, *project, title, description)?;
            render(ctx.output, &stage, |s, w| {
                writeln!(w, "✓ Added stage #{} '{}' to project #{}", s.id, s.title, s.project_id)
            })
        }
        StageCommand::List { project } => {
            let stages = ctx.tracker.stages(actor.id, *project)?;
            render(ctx.output, &stages, |stages, w| {
                for s in stages {
                    writeln!(w, "{:<5} {:<24} {}", s.id, s.title, s.description)?;
                }
                Ok(())
            })
        }
        StageCommand::Delete { id } => {
            ctx.tracker.delete_stage(actor.id, *id)?;
            let payload = serde_json::json!({ "ok": true, "deleted_stage": id });
            render(ctx.output, &payload, |_, w| writeln!(w, "✓ Deleted stage #{id}"))
        }
    }
}
