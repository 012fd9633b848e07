//! Lectern - headless offline sync for interactive textbook content.
//!
//! Keeps a local copy of chapters, glossary and quizzes up to date so the
//! reader works without a network connection.

mod commands;
mod logging;

use anyhow::Result;
use tracing::info;

use lectern_core::config::Config;

use commands::Services;

const USAGE: &str = "\
Usage: lectern <command>

Commands:
  sync     Download all content, glossary and quizzes once
  run      Stay running: sync every 6 hours and whenever the network returns
  status   Show connectivity and when each category was last synced
  clear    Cancel syncing and delete all cached data
  config   Write the current settings to the config file for editing
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Sync,
    Run,
    Status,
    Clear,
    Config,
}

impl Command {
    fn parse(arg: Option<&str>) -> Option<Self> {
        match arg {
            None | Some("status") => Some(Command::Status),
            Some("sync") => Some(Command::Sync),
            Some("run") => Some(Command::Run),
            Some("clear") => Some(Command::Clear),
            Some("config") => Some(Command::Config),
            _ => None,
        }
    }

    /// Console log level when `RUST_LOG` is unset.
    fn default_log_level(self) -> &'static str {
        match self {
            Command::Run => "info",
            _ => "warn",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().collect();
    let Some(command) = Command::parse(args.get(1).map(String::as_str)) else {
        eprint!("{}", USAGE);
        std::process::exit(2);
    };

    let config = Config::load()?;
    let cache_dir = config.cache_dir()?;
    let log_root = config.log_to_file.then_some(cache_dir.as_path());
    let _log_guard = logging::init_tracing(command.default_log_level(), log_root)?;
    info!(?command, api = %config.api_base_url, "Lectern starting");

    if command == Command::Config {
        return commands::write_config(&config);
    }

    let services = Services::build(config, cache_dir).await?;
    match command {
        Command::Sync => commands::sync(&services).await,
        Command::Run => commands::run(&services).await,
        Command::Status => commands::status(&services).await,
        Command::Clear => commands::clear(&services).await,
        // Written above, before any service is opened.
        Command::Config => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse(None), Some(Command::Status));
        assert_eq!(Command::parse(Some("sync")), Some(Command::Sync));
        assert_eq!(Command::parse(Some("run")), Some(Command::Run));
        assert_eq!(Command::parse(Some("clear")), Some(Command::Clear));
        assert_eq!(Command::parse(Some("config")), Some(Command::Config));
        assert_eq!(Command::parse(Some("--help")), None);
    }

    #[test]
    fn test_daemon_logs_more() {
        assert_eq!(Command::Run.default_log_level(), "info");
        assert_eq!(Command::Sync.default_log_level(), "warn");
    }
}
