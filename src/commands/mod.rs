//! Command handlers for the translyzer CLI.
//!
//! This module contains implementations for all CLI subcommands.

mod init;
mod shell;
mod stats;
mod summary;

use crate::import::import_csv;
use crate::uploads::Uploads;
use crate::Result;
use serde::Serialize;
use std::fmt::Debug;
use std::path::PathBuf;
use tracing::{debug, info};

pub use init::init;
pub use shell::{shell, SessionEnd};
pub use stats::{stats, StatisticAnswer};
pub use summary::{summary, ExpenseSummary};

/// The output type for a command. This allows the command to return a consistent message and,
/// optionally, structured data.
#[derive(Debug, Clone, Serialize)]
pub struct Out<T>
where
    T: Serialize + Clone + Debug,
{
    /// A message that can be printed to the user regarding the outcome of the command execution.
    message: String,

    /// Any structured data that needs to be output from the call.
    structure: Option<T>,
}

impl<T, S> From<S> for Out<T>
where
    T: Debug + Clone + Serialize,
    S: Into<String>,
{
    fn from(value: S) -> Self {
        Out::new_message(value)
    }
}

impl<T> Out<T>
where
    T: Serialize + Clone + Debug,
{
    /// Create a new `Out` object that has `Some(structure)`.
    pub fn new<S>(message: S, structure: T) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            structure: Some(structure),
        }
    }

    /// Create a new `Out` object that has `None` for `structure`.
    pub fn new_message<S>(message: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            structure: None,
        }
    }

    /// Get the `message`.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the structured data stored in `structure`.
    pub fn structure(&self) -> Option<&T> {
        self.structure.as_ref()
    }

    /// Print the message to `info!` and the structured data (if it exists) as JSON to `debug!`.
    pub fn print(&self) {
        info!("{}", self.message);
        if let Some(structure) = self.structure() {
            if let Ok(json) = serde_json::to_string_pretty(structure) {
                debug!("Command output:\n\n{json}\n\n");
            }
        }
    }
}

/// Imports each file in order onto a fresh upload stack.
async fn upload_all(files: &[PathBuf]) -> Result<Uploads> {
    let mut uploads = Uploads::new();
    for path in files {
        let table = import_csv(path).await?;
        uploads.append(path.clone(), table);
    }
    Ok(uploads)
}
