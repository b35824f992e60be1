//! These structs provide the CLI interface for the translyzer CLI.

use clap::{Parser, Subcommand};
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::error;
use tracing_subscriber::filter::LevelFilter;

/// translyzer: Combine bank statements and look into your spending.
///
/// Upload one or more statement CSV files, edit or re-categorize transactions, and summarize
/// your expenses. Edits, category consolidation and statistics are carried out by separate worker
/// processes that watch the mailbox files named in `$TRANSLYZER_HOME/config.json`.
#[derive(Debug, Parser, Clone)]
pub struct Args {
    #[clap(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    pub fn new(common: Common, command: Command) -> Self {
        Self { common, command }
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create the data directory and a default configuration file.
    ///
    /// The configuration names the mailbox files that the worker processes watch. By default
    /// they live in `$TRANSLYZER_HOME/channels`.
    Init,
    /// Start the interactive menu.
    ///
    /// Any files given here are uploaded before the menu starts. Type `help` at the prompt for
    /// the list of commands and `x` to exit.
    Shell(FilesArgs),
    /// Print total expenses and expenses per category. No worker process is needed.
    Summary(FilesArgs),
    /// Ask the statistics worker for the highest, lowest and average expense.
    Stats(FilesArgs),
}

/// Arguments common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct Common {
    /// The logging verbosity. One of, from least to most verbose:
    /// off, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG.
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,

    /// The directory where translyzer configuration and mailboxes are held. Defaults to
    /// ~/translyzer
    #[arg(long, env = "TRANSLYZER_HOME", default_value_t = default_translyzer_home())]
    translyzer_home: DisplayPath,
}

impl Common {
    pub fn new(log_level: LevelFilter, translyzer_home: PathBuf) -> Self {
        Self {
            log_level,
            translyzer_home: translyzer_home.into(),
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn translyzer_home(&self) -> &DisplayPath {
        &self.translyzer_home
    }
}

/// (Not shown): Statement files for `shell`, `summary` and `stats`.
#[derive(Debug, Parser, Clone)]
pub struct FilesArgs {
    /// Bank statement CSV files, combined in the order given.
    files: Vec<PathBuf>,
}

impl FilesArgs {
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self { files }
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

fn default_translyzer_home() -> DisplayPath {
    DisplayPath(match dirs::home_dir() {
        Some(home) => home.join("translyzer"),
        None => {
            error!(
                "There was an error when trying to get your home directory. You can get around \
                this by providing --translyzer-home or TRANSLYZER_HOME instead of relying on the \
                default translyzer home directory. If you continue using the program right now, \
                you may have problems!",
            );
            PathBuf::from("translyzer")
        }
    })
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DisplayPath(PathBuf);

impl From<PathBuf> for DisplayPath {
    fn from(value: PathBuf) -> Self {
        DisplayPath(value)
    }
}

impl Deref for DisplayPath {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for DisplayPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Display for DisplayPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_string_lossy())
    }
}

impl FromStr for DisplayPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(PathBuf::from(s)))
    }
}

impl DisplayPath {
    pub fn new(path: PathBuf) -> Self {
        Self(path)
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_shell_with_files() {
        let args = Args::try_parse_from([
            "translyzer",
            "--log-level",
            "debug",
            "--translyzer-home",
            "/tmp/th",
            "shell",
            "a.csv",
            "b.csv",
        ])
        .unwrap();
        assert_eq!(args.common().log_level(), LevelFilter::DEBUG);
        assert_eq!(args.common().translyzer_home().path(), Path::new("/tmp/th"));
        let Command::Shell(files) = args.command() else {
            panic!("expected the shell command");
        };
        assert_eq!(
            files.files(),
            &[PathBuf::from("a.csv"), PathBuf::from("b.csv")]
        );
    }

    #[test]
    fn test_parse_init() {
        let args = Args::try_parse_from(["translyzer", "init"]).unwrap();
        assert!(matches!(args.command(), Command::Init));
        assert_eq!(args.common().log_level(), LevelFilter::INFO);
    }
}
