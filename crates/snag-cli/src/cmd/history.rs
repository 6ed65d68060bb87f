//! `snag history` — the status audit trail of one defect.

use crate::cmd::Context;
use crate::output::{format_ts, render};
use anyhow::Result;
use clap::Args;
use serde::Serialize;
use snag_core::model::defect::Status;

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Defect id.
    pub id: i64,
}

#[derive(Debug, Serialize)]
struct HistoryRow {
    old_status: Status,
    new_status: Status,
    changed_by: Option<String>,
    changed_at_us: i64,
}

pub fn run_history(args: &HistoryArgs, ctx: &Context) -> Result<()> {
    let actor = ctx.actor()?;
    let changes = ctx.tracker.history(actor.id, args.id)?;

    let mut rows = Vec::with_capacity(changes.len());
    for change in changes {
        // A deleted user leaves a null author behind.
        let changed_by = match change.changed_by {
            Some(id) => Some(ctx.tracker.user(id)?.username),
            None => None,
        };
        rows.push(HistoryRow {
            old_status: change.old_status,
            new_status: change.new_status,
            changed_by,
            changed_at_us: change.changed_at_us,
        });
    }

    render(ctx.output, &rows, |rows, w| {
        if rows.is_empty() {
            return writeln!(w, "No status changes for defect #{}", args.id);
        }
        for r in rows {
            writeln!(
                w,
                "{}  {:<11} -> {:<11} {}",
                format_ts(r.changed_at_us),
                r.old_status,
                r.new_status,
                r.changed_by.as_deref().unwrap_or("-")
            )?;
        }
        Ok(())
    })
}
