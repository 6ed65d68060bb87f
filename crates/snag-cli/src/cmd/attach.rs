//! `snag attach` — link a file reference to a defect.

use crate::cmd::Context;
use crate::output::render;
use crate::validate;
use anyhow::Result;
use clap::Args;

#[derive(Args, Debug)]
pub struct AttachArgs {
    /// Defect id.
    pub id: i64,

    /// Path or URL of the uploaded file. Stored as given.
    pub file_ref: String,
}

pub fn run_attach(args: &AttachArgs, ctx: &mut Context) -> Result<()> {
    validate::validate_file_ref(&args.file_ref).map_err(|e| e.to_cli_error())?;
    let actor = ctx.actor()?;
    let attachment = ctx.tracker.add_attachment(actor.id, args.id, &args.file_ref)?;

    render(ctx.output, &attachment, |a, w| {
        writeln!(w, "✓ Attached {} to defect #{}", a.file_ref, a.defect_id)
    })
}
