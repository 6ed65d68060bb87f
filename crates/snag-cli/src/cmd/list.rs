//! `snag list` — defects visible to the acting user.

use crate::cmd::Context;
use crate::output::{pretty_rule, pretty_section, render_mode};
use anyhow::Result;
use clap::Args;
use serde::Serialize;
use snag_core::db::query::{DefectFilter, SortOrder};
use snag_core::model::defect::{Defect, Priority, Status};
use std::io::{self, Write};

#[derive(Args, Debug, Default)]
pub struct ListArgs {
    #[arg(long)]
    pub project: Option<i64>,

    #[arg(long)]
    pub stage: Option<i64>,

    #[arg(long)]
    pub status: Option<Status>,

    #[arg(long)]
    pub priority: Option<Priority>,

    /// Only defects performed by this username.
    #[arg(long, conflicts_with = "mine")]
    pub performer: Option<String>,

    /// Only defects you perform.
    #[arg(long)]
    pub mine: bool,

    /// Case-insensitive text in title or description.
    #[arg(long, short)]
    pub search: Option<String>,

    /// created_desc, created_asc, updated_desc, deadline or priority.
    #[arg(long, default_value = "created_desc")]
    pub sort: SortOrder,

    /// Maximum rows (defaults to `[list] default_limit`).
    #[arg(long)]
    pub limit: Option<u32>,

    #[arg(long)]
    pub offset: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ListOutput {
    defects: Vec<Defect>,
    total: usize,
    shown: usize,
}

pub fn run_list(args: &ListArgs, ctx: &Context) -> Result<()> {
    let actor = ctx.actor()?;
    let performer_id = if args.mine {
        Some(actor.id)
    } else {
        args.performer
            .as_deref()
            .map(|name| ctx.user_id(name))
            .transpose()?
    };

    let filter = DefectFilter {
        project_id: args.project,
        stage_id: args.stage,
        status: args.status,
        priority: args.priority,
        performer_id,
        search: args.search.clone(),
        limit: Some(args.limit.unwrap_or(ctx.config.list.default_limit)),
        offset: args.offset,
        sort: args.sort,
    };
    let page = ctx.tracker.list_defects(actor.id, &filter)?;

    let payload = ListOutput {
        shown: page.defects.len(),
        total: page.total,
        defects: page.defects,
    };
    render_mode(ctx.output, &payload, write_rows, |p, w| {
        pretty_section(w, &format!("Defects ({} of {})", p.shown, p.total))?;
        write_rows(p, w)?;
        pretty_rule(w)
    })
}

fn write_rows(p: &ListOutput, w: &mut dyn Write) -> io::Result<()> {
    for d in &p.defects {
        let deadline = d.deadline.map(|date| date.to_string()).unwrap_or_default();
        writeln!(
            w,
            "{:<5} {:<5} {:<11} {:<6} {:<10} {}",
            d.id, d.project_id, d.status, d.priority, deadline, d.title
        )?;
    }
    Ok(())
}
