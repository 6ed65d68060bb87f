//! `snag status` — move a defect through its lifecycle.
//!
//! ```text
//! new -> in_progress -> review -> closed
//!   \__________\______-> cancelled
//! ```

use crate::cmd::Context;
use crate::output::render;
use anyhow::Result;
use clap::Args;
use serde::Serialize;
use snag_core::model::defect::{Defect, Status};
use snag_core::workflow::TransitionPlan;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Defect id.
    pub id: i64,

    /// Target status: new, in_progress, review, closed or cancelled.
    pub status: String,
}

#[derive(Debug, Serialize)]
struct StatusOutput {
    ok: bool,
    id: i64,
    previous_status: Status,
    new_status: Status,
    changed: bool,
    actor: String,
}

pub fn run_status(args: &StatusArgs, ctx: &mut Context) -> Result<()> {
    let target: Status = args.status.parse().map_err(snag_core::Error::from)?;
    let actor = ctx.actor()?;

    let (defect, plan) = ctx.tracker.transition(args.id, target, actor.id)?;
    let payload = status_output(&defect, plan, actor.username);
    render(ctx.output, &payload, |p, w| {
        if p.changed {
            writeln!(w, "✓ Defect #{}: {} -> {}", p.id, p.previous_status, p.new_status)
        } else {
            writeln!(w, "Defect #{} already {}", p.id, p.new_status)
        }
    })
}

fn status_output(defect: &Defect, plan: TransitionPlan, actor: String) -> StatusOutput {
    let previous_status = match plan {
        TransitionPlan::Apply { from, .. } => from,
        TransitionPlan::Unchanged => defect.status,
    };
    StatusOutput {
        ok: true,
        id: defect.id,
        previous_status,
        new_status: defect.status,
        changed: !plan.is_noop(),
        actor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defect(status: Status) -> Defect {
        Defect {
            id: 4,
            project_id: 1,
            stage_id: None,
            title: "Loose railing".to_string(),
            description: String::new(),
            priority: snag_core::model::defect::Priority::Medium,
            status,
            performer_id: None,
            deadline: None,
            created_at_us: 0,
            updated_at_us: 0,
        }
    }

    #[test]
    fn applied_plan_reports_the_status_left() {
        let plan = TransitionPlan::Apply {
            from: Status::New,
            to: Status::InProgress,
        };
        let out = status_output(&defect(Status::InProgress), plan, "eli".to_string());
        assert!(out.changed);
        assert_eq!(out.previous_status, Status::New);
        assert_eq!(out.new_status, Status::InProgress);
    }

    #[test]
    fn unchanged_plan_is_not_reported_as_a_change() {
        let out = status_output(
            &defect(Status::InProgress),
            TransitionPlan::Unchanged,
            "eli".to_string(),
        );
        assert!(!out.changed);
        assert_eq!(out.previous_status, Status::InProgress);
    }
}
