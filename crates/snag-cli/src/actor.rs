//! Acting-user resolution for CLI commands.
//!
//! The resolution chain: `--as` flag > `SNAG_USER` env > `default_actor` in
//! the user config > `USER` env (TTY only). The resolved name must belong to
//! a registered user; the tracker then decides what that user may do.

use crate::output::CliError;
use snag_core::ErrorCode;
use std::env;

/// Environment reader trait for dependency injection in tests.
trait EnvReader {
    fn get(&self, key: &str) -> Option<String>;
    fn is_tty(&self) -> bool;
}

struct RealEnv;

impl EnvReader for RealEnv {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok().filter(|v| !v.is_empty())
    }

    fn is_tty(&self) -> bool {
        use std::io::IsTerminal;
        std::io::stdin().is_terminal()
    }
}

fn resolve_actor_with(
    cli_flag: Option<&str>,
    default_actor: Option<&str>,
    env: &dyn EnvReader,
) -> Option<String> {
    if let Some(name) = cli_flag.filter(|name| !name.is_empty()) {
        return Some(name.to_string());
    }

    if let Some(name) = env.get("SNAG_USER") {
        return Some(name);
    }

    if let Some(name) = default_actor.filter(|name| !name.is_empty()) {
        return Some(name.to_string());
    }

    // USER only identifies a person at an interactive terminal.
    if env.is_tty() {
        return env.get("USER");
    }

    None
}

/// Resolve the acting username, or `None` when nothing identifies one.
pub fn resolve_actor(cli_flag: Option<&str>, default_actor: Option<&str>) -> Option<String> {
    resolve_actor_with(cli_flag, default_actor, &RealEnv)
}

/// Resolve the acting username, failing with `E1003` when absent.
pub fn require_actor(
    cli_flag: Option<&str>,
    default_actor: Option<&str>,
) -> Result<String, CliError> {
    resolve_actor(cli_flag, default_actor).ok_or_else(|| {
        CliError::coded(
            ErrorCode::MissingActor,
            "an acting user is required for this command",
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MockEnv {
        vars: HashMap<String, String>,
        tty: bool,
    }

    impl MockEnv {
        fn new() -> Self {
            Self {
                vars: HashMap::new(),
                tty: false,
            }
        }

        fn var(mut self, key: &str, val: &str) -> Self {
            self.vars.insert(key.to_string(), val.to_string());
            self
        }

        fn tty(mut self) -> Self {
            self.tty = true;
            self
        }
    }

    impl EnvReader for MockEnv {
        fn get(&self, key: &str) -> Option<String> {
            self.vars.get(key).filter(|v| !v.is_empty()).cloned()
        }

        fn is_tty(&self) -> bool {
            self.tty
        }
    }

    #[test]
    fn flag_takes_priority() {
        let env = MockEnv::new().var("SNAG_USER", "env-user").tty();
        assert_eq!(
            resolve_actor_with(Some("mia"), Some("cfg"), &env).as_deref(),
            Some("mia")
        );
    }

    #[test]
    fn env_beats_config_default() {
        let env = MockEnv::new().var("SNAG_USER", "eli");
        assert_eq!(
            resolve_actor_with(None, Some("cfg"), &env).as_deref(),
            Some("eli")
        );
    }

    #[test]
    fn config_default_beats_user_env() {
        let env = MockEnv::new().var("USER", "root").tty();
        assert_eq!(
            resolve_actor_with(None, Some("oz"), &env).as_deref(),
            Some("oz")
        );
    }

    #[test]
    fn empty_values_are_ignored() {
        let env = MockEnv::new().var("SNAG_USER", "");
        assert_eq!(resolve_actor_with(Some(""), Some(""), &env), None);
    }

    #[test]
    fn user_env_only_in_tty() {
        let env = MockEnv::new().var("USER", "bob");
        assert_eq!(resolve_actor_with(None, None, &env), None);

        let env = MockEnv::new().var("USER", "bob").tty();
        assert_eq!(resolve_actor_with(None, None, &env).as_deref(), Some("bob"));
    }

    #[test]
    fn require_actor_succeeds_with_flag() {
        assert_eq!(require_actor(Some("mia"), None).unwrap(), "mia");
    }
}
