use crate::cmd::open_tracker;
use crate::output::{CliError, OutputMode, pretty_kv, render};
use crate::validate;
use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use snag_core::ErrorCode;
use snag_core::config::{ProjectConfig, SNAG_DIR};
use snag_core::model::user::User;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Username of the first manager account.
    #[arg(long)]
    pub admin: String,

    /// Email for the first manager account.
    #[arg(long)]
    pub email: Option<String>,

    /// Discard an existing `.snag/` database and start over.
    #[arg(long)]
    pub force: bool,
}

const DB_FILE_SUFFIXES: [&str; 3] = ["", "-wal", "-shm"];

#[derive(Debug, Serialize)]
struct InitOutput {
    ok: bool,
    snag_dir: PathBuf,
    database: PathBuf,
    admin: User,
}

/// Execute `snag init`. Creates the tracker skeleton:
///
/// ```text
/// .snag/
///   config.toml   (default project config)
///   .gitignore    (database files)
///   snag.db       (migrated, with the first manager)
/// ```
///
/// # Errors
///
/// Returns an error if `.snag/` already exists and `--force` is not set,
/// or if any filesystem or database operation fails.
pub fn run_init(args: &InitArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    validate::validate_username(&args.admin).map_err(|e| e.to_cli_error())?;

    let snag_dir = project_root.join(SNAG_DIR);
    let config_path = snag_dir.join("config.toml");

    if snag_dir.exists() && !args.force {
        return Err(CliError::coded(
            ErrorCode::AlreadyInitialized,
            format!("{} already exists", snag_dir.display()),
        )
        .into());
    }

    std::fs::create_dir_all(&snag_dir)
        .with_context(|| format!("Failed to create {}", snag_dir.display()))?;

    let config = if config_path.exists() {
        snag_core::config::load_project_config(&snag_dir)
            .map_err(|err| CliError::coded(ErrorCode::ConfigParseError, format!("{err:#}")))?
    } else {
        let config = ProjectConfig::default();
        let body = toml::to_string_pretty(&config).context("Failed to render default config")?;
        std::fs::write(&config_path, body)
            .with_context(|| format!("Failed to write config: {}", config_path.display()))?;
        config
    };

    let db_path = config.database.resolve_path(&snag_dir);
    if let Some(body) = gitignore_for(&db_path, &snag_dir) {
        let gitignore_path = snag_dir.join(".gitignore");
        std::fs::write(&gitignore_path, body)
            .with_context(|| format!("Failed to write {}", gitignore_path.display()))?;
    }
    if args.force {
        remove_database_files(&db_path)?;
    }

    let mut tracker = open_tracker(&db_path, &config)?;
    let admin = tracker.bootstrap_manager(&args.admin, args.email.as_deref())?;
    info!(db = %db_path.display(), admin = %admin.username, "initialized tracker");

    let payload = InitOutput {
        ok: true,
        snag_dir,
        database: db_path,
        admin,
    };
    render(output, &payload, |p, w| {
        writeln!(w, "✓ Initialized {}", p.snag_dir.display())?;
        pretty_kv(w, "database", p.database.display().to_string())?;
        pretty_kv(w, "manager", &p.admin.username)?;
        writeln!(w)?;
        writeln!(w, "Next steps:")?;
        writeln!(w, "  export SNAG_USER={}", p.admin.username)?;
        writeln!(w, "  snag project add \"Tower A\"")?;
        writeln!(w, "  snag user add eli --role engineer")
    })
}

/// `.gitignore` entries for the database and its WAL side files, relative to
/// `.snag/`. `None` when the database lives outside `.snag/`.
fn gitignore_for(db_path: &Path, snag_dir: &Path) -> Option<String> {
    let relative = db_path.strip_prefix(snag_dir).ok()?;
    let entry = relative
        .components()
        .map(|part| part.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    if entry.is_empty() {
        return None;
    }
    Some(
        DB_FILE_SUFFIXES
            .iter()
            .map(|suffix| format!("{entry}{suffix}\n"))
            .collect(),
    )
}

fn remove_database_files(db_path: &Path) -> Result<()> {
    for suffix in DB_FILE_SUFFIXES {
        let mut name = db_path.as_os_str().to_os_string();
        name.push(suffix);
        let path = PathBuf::from(name);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use snag_core::config::load_project_config;
    use snag_core::model::user::Role;

    fn args(admin: &str, force: bool) -> InitArgs {
        InitArgs {
            admin: admin.to_string(),
            email: None,
            force,
        }
    }

    #[test]
    fn init_creates_skeleton_and_manager() {
        let dir = tempfile::tempdir().unwrap();
        run_init(&args("mia", false), OutputMode::Json, dir.path()).unwrap();

        let snag_dir = dir.path().join(SNAG_DIR);
        assert!(snag_dir.join("config.toml").is_file());
        assert!(snag_dir.join(".gitignore").is_file());
        assert!(snag_dir.join("snag.db").is_file());

        let config = load_project_config(&snag_dir).unwrap();
        let tracker = open_tracker(&config.database.resolve_path(&snag_dir), &config).unwrap();
        let users = tracker.users().unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].role, Role::Manager);
    }

    #[test]
    fn second_init_requires_force() {
        let dir = tempfile::tempdir().unwrap();
        run_init(&args("mia", false), OutputMode::Json, dir.path()).unwrap();

        let err = run_init(&args("mia", false), OutputMode::Json, dir.path()).unwrap_err();
        assert_eq!(CliError::from_anyhow(&err).error_code, "E1005");

        run_init(&args("max", true), OutputMode::Json, dir.path()).unwrap();
        let snag_dir = dir.path().join(SNAG_DIR);
        let config = load_project_config(&snag_dir).unwrap();
        let tracker = open_tracker(&config.database.resolve_path(&snag_dir), &config).unwrap();
        let users = tracker.users().unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].username, "max");
    }

    #[test]
    fn gitignore_follows_the_configured_database_path() {
        let dir = tempfile::tempdir().unwrap();
        let snag_dir = dir.path().join(SNAG_DIR);
        std::fs::create_dir_all(&snag_dir).unwrap();
        std::fs::write(
            snag_dir.join("config.toml"),
            "[database]\npath = \"data/site.sqlite\"\n",
        )
        .unwrap();

        run_init(&args("mia", true), OutputMode::Json, dir.path()).unwrap();

        let ignored = std::fs::read_to_string(snag_dir.join(".gitignore")).unwrap();
        assert_eq!(
            ignored,
            "data/site.sqlite\ndata/site.sqlite-wal\ndata/site.sqlite-shm\n"
        );
        assert!(snag_dir.join("data/site.sqlite").is_file());
        assert!(!snag_dir.join("snag.db").exists());
    }

    #[test]
    fn database_outside_snag_dir_is_not_ignored_there() {
        let snag_dir = Path::new("/work/.snag");
        assert_eq!(gitignore_for(Path::new("/var/lib/snag.db"), snag_dir), None);
        assert_eq!(
            gitignore_for(&snag_dir.join("snag.db"), snag_dir).as_deref(),
            Some("snag.db\nsnag.db-wal\nsnag.db-shm\n")
        );
    }

    #[test]
    fn invalid_admin_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_init(&args("not ok", false), OutputMode::Json, dir.path()).unwrap_err();
        assert_eq!(CliError::from_anyhow(&err).error_code, "E1004");
        assert!(!dir.path().join(SNAG_DIR).exists());
    }
}
