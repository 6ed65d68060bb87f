//! `snag comment` — discussion on a defect.

use crate::cmd::Context;
use crate::output::{format_ts, render};
use crate::validate;
use anyhow::Result;
use clap::Args;

#[derive(Args, Debug)]
pub struct CommentArgs {
    /// Defect id.
    pub id: i64,

    /// Comment text.
    pub body: String,
}

pub fn run_comment(args: &CommentArgs, ctx: &mut Context) -> Result<()> {
    validate::validate_comment_body(&args.body).map_err(|e| e.to_cli_error())?;
    let actor = ctx.actor()?;
    let comment = ctx.tracker.add_comment(actor.id, args.id, &args.body)?;

    render(ctx.output, &comment, |c, w| {
        writeln!(
            w,
            "✓ Comment #{} on defect #{} at {}",
            c.id,
            c.defect_id,
            format_ts(c.created_at_us)
        )
    })
}
