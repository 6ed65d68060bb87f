#![forbid(unsafe_code)]

mod actor;
mod cmd;
mod output;
mod validate;

use clap::{CommandFactory, Parser, Subcommand};
use cmd::{Context, Globals};
use output::{CliError, OutputMode};
use snag_core::ErrorCode;
use snag_core::config::{self, UserConfig};
use std::env;
use std::path::Path;
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "snag: defect tracker for construction projects",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Act as this user (overrides SNAG_USER).
    #[arg(long = "as", global = true, value_name = "USERNAME")]
    as_user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn actor_flag(&self) -> Option<&str> {
        self.as_user.as_deref()
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Setup",
        about = "Initialize a tracker",
        long_about = "Create .snag/ in the current directory with a database and its first manager.",
        after_help = "EXAMPLES:\n    # Start a tracker administered by mia\n    snag init --admin mia\n\n    # Throw away an existing database\n    snag init --admin mia --force"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Manage users",
        after_help = "EXAMPLES:\n    snag --as mia user add eli --role engineer\n    snag user list"
    )]
    User(cmd::user::UserArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Manage projects and their members",
        after_help = "EXAMPLES:\n    snag --as mia project add \"Tower A\"\n    snag --as mia project member add 1 eli"
    )]
    Project(cmd::project::ProjectArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Manage project stages",
        after_help = "EXAMPLES:\n    snag --as mia stage add 1 Foundations\n    snag stage list 1"
    )]
    Stage(cmd::stage::StageArgs),

    #[command(
        next_help_heading = "Defects",
        about = "Report a defect",
        long_about = "Report a new defect in a project. It starts in status new.",
        after_help = "EXAMPLES:\n    # Report a defect\n    snag create -p 1 -t \"Cracked slab on level 3\" --priority high\n\n    # Report and assign (managers only)\n    snag create -p 1 -t \"Loose railing\" --performer eli --deadline 2026-11-30"
    )]
    Create(cmd::create::CreateArgs),

    #[command(
        next_help_heading = "Defects",
        about = "Edit a defect's title, description, priority, stage or deadline",
        after_help = "EXAMPLES:\n    snag update 7 --priority high\n    snag update 7 --clear-deadline"
    )]
    Update(cmd::update::UpdateArgs),

    #[command(
        next_help_heading = "Defects",
        about = "Assign or unassign a performer (managers only)",
        after_help = "EXAMPLES:\n    snag assign 7 eli\n    snag assign 7 --unassign"
    )]
    Assign(cmd::assign::AssignArgs),

    #[command(
        next_help_heading = "Defects",
        about = "Change a defect's status",
        long_about = "Move a defect along new -> in_progress -> review -> closed, or cancel it.",
        after_help = "EXAMPLES:\n    # Start work\n    snag status 7 in_progress\n\n    # Hand over for review\n    snag status 7 review"
    )]
    Status(cmd::status::StatusArgs),

    #[command(
        next_help_heading = "Defects",
        about = "Comment on a defect",
        after_help = "EXAMPLES:\n    snag comment 7 \"Needs structural engineer sign-off\""
    )]
    Comment(cmd::comment::CommentArgs),

    #[command(
        next_help_heading = "Defects",
        about = "Attach a file reference to a defect",
        after_help = "EXAMPLES:\n    snag attach 7 photos/level3-slab.jpg"
    )]
    Attach(cmd::attach::AttachArgs),

    #[command(
        next_help_heading = "Defects",
        about = "Delete a defect (managers only)"
    )]
    Delete(cmd::delete::DeleteArgs),

    #[command(
        next_help_heading = "Read",
        about = "List defects",
        long_about = "List defects you can see, with optional filters and sort order.",
        after_help = "EXAMPLES:\n    # Open high-priority work in project 1\n    snag list --project 1 --priority high --status in_progress\n\n    # What am I performing?\n    snag list --mine\n\n    # Emit machine-readable output\n    snag list --json"
    )]
    List(cmd::list::ListArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show one defect",
        long_about = "Show a defect with its comments, attachments and status history.",
        after_help = "EXAMPLES:\n    snag show 7\n    snag show 7 --json"
    )]
    Show(cmd::show::ShowArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show a defect's status history"
    )]
    History(cmd::history::HistoryArgs),

    #[command(
        next_help_heading = "Read",
        about = "Defect counts",
        after_help = "EXAMPLES:\n    snag stats\n    snag stats --project 1\n    snag stats --performer eli"
    )]
    Stats(cmd::stats::StatsArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Generate shell completions",
        after_help = "EXAMPLES:\n    snag completions bash > ~/.local/share/bash-completion/completions/snag"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("SNAG_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "snag=debug,info"
        } else {
            "snag=info,warn"
        })
    });

    let format = env::var("SNAG_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    // stdout carries command output; logs go to stderr.
    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn run(
    cli: &Cli,
    output: OutputMode,
    user_config: &UserConfig,
    project_root: &Path,
) -> anyhow::Result<()> {
    let globals = Globals {
        actor_flag: cli.actor_flag(),
        output,
        user_config,
    };
    let open = || Context::open(project_root, &globals);

    match &cli.command {
        Commands::Init(args) => cmd::init::run_init(args, output, project_root),
        Commands::Completions(args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command)
        }
        Commands::User(args) => cmd::user::run_user(args, &mut open()?),
        Commands::Project(args) => cmd::project::run_project(args, &mut open()?),
        Commands::Stage(args) => cmd::stage::run_stage(args, &mut open()?),
        Commands::Create(args) => cmd::create::run_create(args, &mut open()?),
        Commands::Update(args) => cmd::update::run_update(args, &mut open()?),
        Commands::Assign(args) => cmd::assign::run_assign(args, &mut open()?),
        Commands::Status(args) => cmd::status::run_status(args, &mut open()?),
        Commands::Comment(args) => cmd::comment::run_comment(args, &mut open()?),
        Commands::Attach(args) => cmd::attach::run_attach(args, &mut open()?),
        Commands::Delete(args) => cmd::delete::run_delete(args, &mut open()?),
        Commands::List(args) => cmd::list::run_list(args, &open()?),
        Commands::Show(args) => cmd::show::run_show(args, &open()?),
        Commands::History(args) => cmd::history::run_history(args, &open()?),
        Commands::Stats(args) => cmd::stats::run_stats(args, &open()?),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let early_mode = if cli.json { OutputMode::Json } else { OutputMode::Text };
    let user_config = match config::load_user_config() {
        Ok(user_config) => user_config,
        Err(err) => {
            let error = CliError::coded(ErrorCode::ConfigParseError, format!("{err:#}"));
            if output::render_error(early_mode, &error).is_err() {
                eprintln!("{error}");
            }
            return ExitCode::FAILURE;
        }
    };
    let output = OutputMode::from_name(&config::output_mode(cli.json, &user_config));

    let result = env::current_dir()
        .map_err(anyhow::Error::from)
        .and_then(|root| run(&cli, output, &user_config, &root));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            debug!(error = %format!("{err:#}"), "command failed");
            let error = CliError::from_anyhow(&err);
            if output::render_error(output, &error).is_err() {
                eprintln!("{error}");
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_flag_after_subcommand() {
        let cli = Cli::parse_from(["snag", "list", "--json"]);
        assert!(cli.json);
    }

    #[test]
    fn as_flag_is_global() {
        let cli = Cli::parse_from(["snag", "status", "7", "review", "--as", "eli"]);
        assert_eq!(cli.actor_flag(), Some("eli"));

        let cli = Cli::parse_from(["snag", "--as", "mia", "delete", "7"]);
        assert_eq!(cli.actor_flag(), Some("mia"));
    }

    #[test]
    fn actor_flag_none_by_default() {
        let cli = Cli::parse_from(["snag", "list"]);
        assert!(cli.actor_flag().is_none());
    }

    #[test]
    fn completions_subcommand_parses() {
        let cli = Cli::parse_from(["snag", "completions", "bash"]);
        assert!(matches!(
            cli.command,
            Commands::Completions(cmd::completions::CompletionsArgs {
                shell: clap_complete::Shell::Bash,
            })
        ));
    }

    #[test]
    fn all_subcommands_listed() {
        let subcommands = [
            vec!["snag", "init", "--admin", "mia"],
            vec!["snag", "user", "add", "eli", "--role", "engineer"],
            vec!["snag", "user", "list"],
            vec!["snag", "project", "add", "Tower A"],
            vec!["snag", "project", "list"],
            vec!["snag", "project", "close", "1"],
            vec!["snag", "project", "delete", "1"],
            vec!["snag", "project", "member", "add", "1", "eli"],
            vec!["snag", "project", "member", "remove", "1", "eli"],
            vec!["snag", "project", "member", "list", "1"],
            vec!["snag", "stage", "add", "1", "Foundations"],
            vec!["snag", "stage", "list", "1"],
            vec!["snag", "stage", "delete", "1"],
            vec!["snag", "create", "-p", "1", "-t", "x"],
            vec!["snag", "update", "1", "--title", "y"],
            vec!["snag", "assign", "1", "eli"],
            vec!["snag", "assign", "1", "--unassign"],
            vec!["snag", "status", "1", "in_progress"],
            vec!["snag", "comment", "1", "hello"],
            vec!["snag", "attach", "1", "photo.jpg"],
            vec!["snag", "delete", "1"],
            vec!["snag", "list"],
            vec!["snag", "show", "1"],
            vec!["snag", "history", "1"],
            vec!["snag", "stats"],
            vec!["snag", "completions", "zsh"],
        ];
        for args in &subcommands {
            let result = Cli::try_parse_from(args.iter());
            assert!(result.is_ok(), "failed to parse {args:?}: {:?}", result.err());
        }
    }

    #[test]
    fn assign_needs_a_performer_or_unassign() {
        assert!(Cli::try_parse_from(["snag", "assign", "1"]).is_err());
        assert!(Cli::try_parse_from(["snag", "assign", "1", "eli", "--unassign"]).is_err());
    }

    #[test]
    fn list_rejects_unknown_status() {
        assert!(Cli::try_parse_from(["snag", "list", "--status", "done"]).is_err());
    }

    #[test]
    fn stats_project_and_performer_conflict() {
        assert!(
            Cli::try_parse_from(["snag", "stats", "--project", "1", "--performer", "eli"]).is_err()
        );
    }
}
