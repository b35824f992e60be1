use crate::model::RowId;
use std::path::PathBuf;
use std::time::Duration;

pub type Error = anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// Conditions that arise while talking to a worker over a mailbox, or while applying an
/// operation to the transaction table.
///
/// `Decode` and `UnexpectedType` are expected while polling and are retried internally. They are
/// only ever returned from a single read attempt, never from a blocking read.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The mailbox content is empty, truncated or otherwise not an envelope.
    #[error("Unable to decode envelope: {0}")]
    Decode(String),

    /// The mailbox holds a well-formed envelope, but not of the kind being waited for.
    #[error("Expected a '{expected}' envelope but found '{found}'")]
    UnexpectedType {
        expected: &'static str,
        found: String,
    },

    /// No usable response appeared before the configured deadline.
    #[error("Timed out after {waited:?} waiting for a response in '{}'", path.display())]
    Timeout { path: PathBuf, waited: Duration },

    /// The referenced row does not exist in the table.
    #[error("Transaction {0} does not exist")]
    NotFound(RowId),
}
