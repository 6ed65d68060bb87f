//! `snag delete` — remove a defect with its comments, attachments and
//! history (managers only).

use crate::cmd::Context;
use crate::output::render;
use anyhow::Result;
use clap::Args;

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Defect id.
    pub id: i64,
}

pub fn run_delete(args: &DeleteArgs, ctx: &mut Context) -> Result<()> {
    let actor = ctx.actor()?;
    ctx.tracker.delete_defect(actor.id, args.id)?;

    let payload = serde_json::json!({ "ok": true, "deleted_defect": args.id });
    render(ctx.output, &payload, |_, w| writeln!(w, "✓ Deleted defect #{}", args.id))
}
