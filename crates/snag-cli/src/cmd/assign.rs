//! `snag assign` — set or clear a defect's performer.

use crate::cmd::Context;
use crate::output::render;
use anyhow::Result;
use clap::Args;
use serde::Serialize;
use snag_core::model::defect::DefectPatch;

#[derive(Args, Debug)]
pub struct AssignArgs {
    /// Defect id.
    pub id: i64,

    /// Username of the new performer.
    #[arg(required_unless_present = "unassign", conflicts_with = "unassign")]
    pub performer: Option<String>,

    /// Remove the current performer.
    #[arg(long)]
    pub unassign: bool,
}

#[derive(Debug, Serialize)]
struct AssignOutput {
    ok: bool,
    id: i64,
    performer: Option<String>,
}

pub fn run_assign(args: &AssignArgs, ctx: &mut Context) -> Result<()> {
    let actor = ctx.actor()?;
    let performer_id = match &args.performer {
        Some(name) if !args.unassign => Some(ctx.user_id(name)?),
        _ => None,
    };

    let patch = DefectPatch {
        performer_id: Some(performer_id),
        ..DefectPatch::default()
    };
    let defect = ctx.tracker.update_defect(actor.id, args.id, &patch)?;

    let payload = AssignOutput {
        ok: true,
        id: defect.id,
        performer: args.performer.clone().filter(|_| performer_id.is_some()),
    };
    render(ctx.output, &payload, |p, w| match &p.performer {
        Some(name) => writeln!(w, "✓ Defect #{} assigned to {name}", p.id),
        None => writeln!(w, "✓ Defect #{} unassigned", p.id),
    })
}
