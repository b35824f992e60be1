//! Configuration file handling for Translyzer.
//!
//! The configuration file is stored at `$TRANSLYZER_HOME/config.json`. It names the mailbox files
//! that worker processes watch and controls how long the program waits for them.

use crate::protocol::{ChannelMode, Timing};
use crate::{utils, Result};
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_NAME: &str = "translyzer";
const CONFIG_VERSION: u8 = 1;
const CONFIG_JSON: &str = "config.json";
const CHANNELS: &str = "channels";
const EDIT_JSON: &str = "edit.json";
const CONSOLIDATE_JSON: &str = "consolidate.json";
const STATISTIC_TXT: &str = "statistic.txt";
const DUMP_CSV: &str = "transactions.csv";
const POLL_INTERVAL_MS: u64 = 500;
const SCALAR_WAIT_MS: u64 = 2000;

/// The `Config` object represents the configuration of the app. You instantiate it by providing
/// the path to `$TRANSLYZER_HOME` and from there it loads `$TRANSLYZER_HOME/config.json`. Paths in
/// the file may be relative, in which case they are resolved against the home directory.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    config_path: PathBuf,
    config_file: ConfigFile,
}

impl Config {
    /// Creates the home directory, if needed, and writes a `config.json` with default settings.
    /// An existing `config.json` is left alone and loaded instead.
    pub async fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let maybe_relative = dir.into();
        utils::make_dir(&maybe_relative)
            .await
            .context("Unable to create the translyzer home directory")?;
        let root = utils::canonicalize(&maybe_relative).await?;

        let config_path = root.join(CONFIG_JSON);
        if config_path.is_file() {
            return Self::load(root).await;
        }
        let config_file = ConfigFile::default();
        config_file.save(&config_path).await?;
        utils::make_dir(&root.join(CHANNELS)).await?;

        Ok(Self {
            root,
            config_path,
            config_file,
        })
    }

    /// This will
    /// - validate that the home directory and the config file exist
    /// - load and validate the config file
    /// - return the loaded configuration object
    pub async fn load(home: impl Into<PathBuf>) -> Result<Self> {
        let maybe_relative = home.into();
        if !maybe_relative.is_dir() {
            bail!(
                "Translyzer home '{}' is missing, run 'translyzer init' to create it",
                maybe_relative.display()
            )
        }
        let root = utils::canonicalize(&maybe_relative).await?;

        let config_path = root.join(CONFIG_JSON);
        if !config_path.is_file() {
            bail!("The config file is missing '{}'", config_path.display())
        }
        let config_file = ConfigFile::load(&config_path).await?;

        Ok(Self {
            root,
            config_path,
            config_file,
        })
    }

    /// Builds a configuration in memory, without reading or writing `config.json`.
    pub fn new(root: impl Into<PathBuf>, channels: ChannelsConfig) -> Self {
        let root = root.into();
        Self {
            config_path: root.join(CONFIG_JSON),
            root,
            config_file: ConfigFile {
                channels,
                ..ConfigFile::default()
            },
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn mode(&self) -> ChannelMode {
        self.config_file.channels.mode
    }

    pub fn timing(&self) -> Timing {
        self.config_file.channels.timing()
    }

    /// The mailbox for single-field edits.
    pub fn edit_path(&self) -> PathBuf {
        self.resolve(&self.config_file.channels.edit)
    }

    /// The mailbox for category consolidation.
    pub fn consolidate_path(&self) -> PathBuf {
        self.resolve(&self.config_file.channels.consolidate)
    }

    /// The opcode/answer mailbox for statistics.
    pub fn statistic_path(&self) -> PathBuf {
        self.resolve(&self.config_file.channels.statistic)
    }

    /// Where the table is dumped as CSV before each statistic is requested.
    pub fn dump_path(&self) -> PathBuf {
        self.resolve(&self.config_file.channels.dump)
    }

    /// Returns `p` unchanged if it is absolute, otherwise joins it to the home directory.
    fn resolve(&self, p: &Path) -> PathBuf {
        if p.is_absolute() {
            return p.to_path_buf();
        }
        self.root.join(p)
    }
}

/// Represents the serialization and deserialization format of the configuration file.
///
/// Example configuration:
/// ```json
/// {
///   "app_name": "translyzer",
///   "config_version": 1,
///   "channels": {
///     "mode": "legacy",
///     "edit": "channels/edit.json",
///     "consolidate": "channels/consolidate.json",
///     "statistic": "channels/statistic.txt",
///     "dump": "channels/transactions.csv",
///     "poll_interval_ms": 500,
///     "scalar_wait_ms": 2000,
///     "deadline_ms": null
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
struct ConfigFile {
    /// Application name, should always be "translyzer"
    app_name: String,

    /// Configuration file version
    config_version: u8,

    /// Mailbox locations and timing. Missing fields take their defaults.
    #[serde(default)]
    channels: ChannelsConfig,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            channels: ChannelsConfig::default(),
        }
    }
}

impl ConfigFile {
    /// Loads a ConfigFile from the specified path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or is not a translyzer config.
    async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = utils::read(path).await?;

        let config: ConfigFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file at {}", path.display()))?;

        anyhow::ensure!(
            config.app_name == APP_NAME,
            "Invalid app_name in config file: expected '{}', got '{}'",
            APP_NAME,
            config.app_name
        );

        Ok(config)
    }

    async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let p = path.as_ref();
        let data = serde_json::to_string_pretty(self).context("Unable to serialize config")?;
        utils::write(p, data)
            .await
            .context("Unable to write config file")
    }
}

/// The `channels` section of `config.json`.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct ChannelsConfig {
    pub mode: ChannelMode,
    pub edit: PathBuf,
    pub consolidate: PathBuf,
    pub statistic: PathBuf,
    pub dump: PathBuf,
    pub poll_interval_ms: u64,
    pub scalar_wait_ms: u64,
    /// `None` waits for workers forever.
    pub deadline_ms: Option<u64>,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        let dir = PathBuf::from(CHANNELS);
        Self {
            mode: ChannelMode::Legacy,
            edit: dir.join(EDIT_JSON),
            consolidate: dir.join(CONSOLIDATE_JSON),
            statistic: dir.join(STATISTIC_TXT),
            dump: dir.join(DUMP_CSV),
            poll_interval_ms: POLL_INTERVAL_MS,
            scalar_wait_ms: SCALAR_WAIT_MS,
            deadline_ms: None,
        }
    }
}

impl ChannelsConfig {
    pub fn timing(&self) -> Timing {
        Timing {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            scalar_wait: Duration::from_millis(self.scalar_wait_ms),
            deadline: self.deadline_ms.map(Duration::from_millis),
        }
    }
}
