//! `snag stats` — defect counts for everything you can see.

use crate::cmd::Context;
use crate::output::{pretty_kv, pretty_rule, pretty_section, render_mode};
use anyhow::Result;
use clap::Args;
use snag_core::stats::StatusCounts;
use std::io::{self, Write};

#[derive(Args, Debug)]
pub struct StatsArgs {
    /// Counts for one project.
    #[arg(long, conflicts_with = "performer")]
    pub project: Option<i64>,

    /// Counts for one performer (username).
    #[arg(long)]
    pub performer: Option<String>,
}

pub fn run_stats(args: &StatsArgs, ctx: &Context) -> Result<()> {
    let actor = ctx.actor()?;

    if let Some(project_id) = args.project {
        let report = ctx.tracker.project_report(actor.id, project_id)?;
        let heading = format!("Project #{project_id}");
        return render_mode(
            ctx.output,
            &report,
            |r, w| write_counts(w, r.total, &r.by_status),
            |r, w| {
                pretty_section(w, &heading)?;
                write_counts(w, r.total, &r.by_status)?;
                pretty_rule(w)
            },
        );
    }

    if let Some(name) = &args.performer {
        let performer_id = ctx.user_id(name)?;
        let report = ctx.tracker.performer_report(actor.id, performer_id)?;
        let heading = format!("Performer {name}");
        return render_mode(
            ctx.output,
            &report,
            |r, w| write_counts(w, r.total, &r.by_status),
            |r, w| {
                pretty_section(w, &heading)?;
                write_counts(w, r.total, &r.by_status)?;
                pretty_rule(w)
            },
        );
    }

    let summary = ctx.tracker.summary(actor.id)?;
    render_mode(
        ctx.output,
        &summary,
        |s, w| {
            write_counts(w, s.total, &s.by_status)?;
            writeln!(w, "open\t{}", s.open)
        },
        |s, w| {
            pretty_section(w, "Defects")?;
            pretty_kv(w, "total", s.total.to_string())?;
            pretty_kv(w, "open", s.open.to_string())?;
            writeln!(w)?;
            pretty_section(w, "By status")?;
            for (status, count) in &s.by_status {
                pretty_kv(w, status.as_str(), count.to_string())?;
            }
            writeln!(w)?;
            pretty_section(w, "By priority")?;
            for (priority, count) in &s.by_priority {
                pretty_kv(w, priority.as_str(), count.to_string())?;
            }
            pretty_rule(w)
        },
    )
}

fn write_counts(w: &mut dyn Write, total: usize, by_status: &StatusCounts) -> io::Result<()> {
    writeln!(w, "total\t{total}")?;
    for (status, count) in by_status {
        writeln!(w, "{status}\t{count}")?;
    }
    Ok(())
}
