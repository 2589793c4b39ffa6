//! Command-line surface for `astral`.

use std::path::PathBuf;

use astral_core::QueueKind;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "astral", version, about = "Astral offline worker: pre-cache, inspect and sync", long_about = None)]
pub struct Cli {
    /// Origin the worker serves, e.g. <https://astral.example>
    #[arg(long, env = "ASTRAL_ORIGIN")]
    pub origin: Option<String>,

    /// SQLite database holding caches and sync queues
    #[arg(long, env = "ASTRAL_DB_PATH")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pre-cache the critical crisis resources
    Install,
    /// Install, then activate: drop stale caches and repair critical entries
    Activate,
    /// Replay queued background-sync requests
    Sync {
        /// Only replay this queue
        #[arg(long)]
        queue: Option<QueueArg>,
    },
    /// Show caches, missing critical resources and pending queue entries
    Status,
    /// Check text for crisis phrases (presence-only keyword match)
    Detect {
        /// Text to scan
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum QueueArg {
    Crisis,
    General,
}

impl From<QueueArg> for QueueKind {
    fn from(arg: QueueArg) -> Self {
        match arg {
            QueueArg::Crisis => QueueKind::Crisis,
            QueueArg::General => QueueKind::General,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_sync_queue() {
        let cli = Cli::try_parse_from(["astral", "sync", "--queue", "crisis"]).unwrap();
        match cli.command {
            Commands::Sync { queue } => assert_eq!(queue.map(QueueKind::from), Some(QueueKind::Crisis)),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn detect_joins_words() {
        let cli = Cli::try_parse_from(["astral", "detect", "I", "can't", "go", "on"]).unwrap();
        match cli.command {
            Commands::Detect { text } => assert_eq!(text.join(" "), "I can't go on"),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn detect_requires_text() {
        assert!(Cli::try_parse_from(["astral", "detect"]).is_err());
    }
}
