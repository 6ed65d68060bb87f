//! `snag show` — one defect with its comments, attachments and history.

use crate::cmd::Context;
use crate::output::{format_ts, pretty_kv, pretty_section, render};
use anyhow::Result;
use clap::Args;
use serde::Serialize;
use snag_core::Tracker;
use snag_core::model::defect::{Attachment, Comment, Defect, StatusChange};
use std::collections::BTreeMap;

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Defect id.
    pub id: i64,
}

#[derive(Debug, Serialize)]
struct ShowOutput {
    #[serde(flatten)]
    defect: Defect,
    project: String,
    stage: Option<String>,
    performer: Option<String>,
    comments: Vec<Comment>,
    attachments: Vec<Attachment>,
    history: Vec<StatusChange>,
    /// user id -> username for every id above.
    users: BTreeMap<i64, String>,
}

pub fn run_show(args: &ShowArgs, ctx: &Context) -> Result<()> {
    let actor = ctx.actor()?;
    let tracker = &ctx.tracker;

    let defect = tracker.defect(actor.id, args.id)?;
    let comments = tracker.comments(actor.id, args.id)?;
    let attachments = tracker.attachments(actor.id, args.id)?;
    let history = tracker.history(actor.id, args.id)?;

    let (project, stage) = tracker.defect_location(actor.id, args.id)?;
    let project = project.title;
    let stage = stage.map(|s| s.title);

    let user_ids = defect
        .performer_id
        .into_iter()
        .chain(comments.iter().map(|c| c.author_id))
        .chain(history.iter().filter_map(|h| h.changed_by));
    let users = usernames(tracker, user_ids)?;
    let performer = defect.performer_id.and_then(|id| users.get(&id).cloned());

    let payload = ShowOutput {
        defect,
        project,
        stage,
        performer,
        comments,
        attachments,
        history,
        users,
    };

    render(ctx.output, &payload, |p, w| {
        let name = |id: i64| p.users.get(&id).map_or("?", String::as_str);
        let d = &p.defect;

        pretty_section(w, &format!("#{} {}", d.id, d.title))?;
        pretty_kv(w, "status", d.status.as_str())?;
        pretty_kv(w, "priority", d.priority.as_str())?;
        pretty_kv(w, "project", format!("#{} {}", d.project_id, p.project))?;
        pretty_kv(w, "stage", p.stage.as_deref().unwrap_or("-"))?;
        pretty_kv(w, "performer", p.performer.as_deref().unwrap_or("-"))?;
        pretty_kv(
            w,
            "deadline",
            d.deadline.map_or_else(|| "-".to_string(), |date| date.to_string()),
        )?;
        pretty_kv(w, "created", format_ts(d.created_at_us))?;
        pretty_kv(w, "updated", format_ts(d.updated_at_us))?;
        if !d.description.is_empty() {
            writeln!(w)?;
            writeln!(w, "{}", d.description)?;
        }

        if !p.attachments.is_empty() {
            writeln!(w)?;
            pretty_section(w, "Attachments")?;
            for a in &p.attachments {
                writeln!(w, "  {}  {}", format_ts(a.uploaded_at_us), a.file_ref)?;
            }
        }

        if !p.comments.is_empty() {
            writeln!(w)?;
            pretty_section(w, "Comments")?;
            for c in &p.comments {
                writeln!(w, "  {} {}:", format_ts(c.created_at_us), name(c.author_id))?;
                writeln!(w, "    {}", c.body)?;
            }
        }

        if !p.history.is_empty() {
            writeln!(w)?;
            pretty_section(w, "History")?;
            for h in &p.history {
                let by = h.changed_by.map_or("(deleted user)", name);
                writeln!(
                    w,
                    "  {}  {} -> {}  by {by}",
                    format_ts(h.changed_at_us),
                    h.old_status,
                    h.new_status
                )?;
            }
        }
        Ok(())
    })
}

fn usernames(
    tracker: &Tracker,
    ids: impl Iterator<Item = i64>,
) -> Result<BTreeMap<i64, String>> {
    let mut names = BTreeMap::new();
    for id in ids {
        if let std::collections::btree_map::Entry::Vacant(slot) = names.entry(id) {
            slot.insert(tracker.user(id)?.username);
        }
    }
    Ok(names)
}
