//! `snag user` — register and list accounts.

use crate::cmd::Context;
use crate::output::{format_ts, render};
use crate::validate;
use anyhow::Result;
use clap::{Args, Subcommand};
use snag_core::model::user::{NewUser, Role};

#[derive(Args, Debug)]
pub struct UserArgs {
    #[command(subcommand)]
    pub command: UserCommand,
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    #[command(
        about = "Register a user (managers only)",
        after_help = "EXAMPLES:\n    snag user add eli --role engineer\n    snag user add oz --role observer --email oz@example.com"
    )]
    Add(UserAddArgs),

    #[command(about = "List registered users")]
    List,
}

#[derive(Args, Debug)]
pub struct UserAddArgs {
    /// Login name.
    pub username: String,

    /// manager, engineer or observer.
    #[arg(long, default_value = "engineer")]
    pub role: Role,

    #[arg(long)]
    pub email: Option<String>,
}

pub fn run_user(args: &UserArgs, ctx: &mut Context) -> Result<()> {
    match &args.command {
        UserCommand::Add(add) => run_add(add, ctx),
        UserCommand::List => run_list(ctx),
    }
}

fn run_add(args: &UserAddArgs, ctx: &mut Context) -> Result<()> {
    validate::validate_username(&args.username).map_err(|e| e.to_cli_error())?;
    let actor = ctx.actor()?;
    let user = ctx.tracker.create_user(
        actor.id,
        &NewUser {
            username: args.username.clone(),
            email: args.email.clone(),
            role: args.role,
        },
    )?;

    render(ctx.output, &user, |u, w| {
        writeln!(w, "✓ Added {} '{}' (#{})", u.role, u.username, u.id)
    })
}

fn run_list(ctx: &Context) -> Result<()> {
    ctx.actor()?;
    let users = ctx.tracker.users()?;
    render(ctx.output, &users, |users, w| {
        for u in users {
            writeln!(
                w,
                "{:<5} {:<20} {:<9} {:<28} {}",
                u.id,
                u.username,
                u.role,
                u.email.as_deref().unwrap_or("-"),
                format_ts(u.created_at_us)
            )?;
        }
        Ok(())
    })
}
