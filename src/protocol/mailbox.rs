use crate::error::ProtocolError;
use crate::{utils, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::trace;

/// How a mailbox file is published and read.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelMode {
    /// Writes truncate the file in place, so a reader can observe a half-written payload. Scalar
    /// answers are read once after a fixed wait. Compatible with existing workers.
    #[default]
    Legacy,
    /// Writes go to a temporary sibling that is renamed over the mailbox, so a reader only ever
    /// sees a complete payload. Scalar answers are polled for instead of read once.
    Hardened,
}

serde_plain::derive_display_from_serialize!(ChannelMode);
serde_plain::derive_fromstr_from_deserialize!(ChannelMode);

/// Delays used by the channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Sleep before each read attempt while waiting for an envelope.
    pub poll_interval: Duration,
    /// The single fixed wait between sending an opcode and reading the answer (legacy mode).
    pub scalar_wait: Duration,
    /// Give up after this long. `None` waits forever.
    pub deadline: Option<Duration>,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            scalar_wait: Duration::from_millis(2000),
            deadline: None,
        }
    }
}

/// A file that holds at most one message: whatever bytes are currently in it.
///
/// There is no framing, no locking and no correlation between a request and its answer. A
/// response left over from a previous round trip is indistinguishable from a fresh one, and in
/// legacy mode a reader can race a writer and see a partial payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    path: PathBuf,
    mode: ChannelMode,
}

impl Mailbox {
    pub fn new(path: impl Into<PathBuf>, mode: ChannelMode) -> Self {
        Self {
            path: path.into(),
            mode,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> ChannelMode {
        self.mode
    }

    /// Replaces the full content of the mailbox, creating its directory if needed.
    pub async fn put(&self, contents: impl AsRef<[u8]>) -> Result<()> {
        utils::make_parent_dir(&self.path).await?;
        match self.mode {
            ChannelMode::Legacy => utils::write(&self.path, contents).await,
            ChannelMode::Hardened => {
                let staging = self.staging_path();
                utils::write(&staging, contents).await?;
                utils::rename(&staging, &self.path).await
            }
        }
    }

    /// Reads the current content without consuming it. `None` if the file does not exist.
    pub async fn peek(&self) -> Result<Option<Vec<u8>>> {
        let contents = utils::read_if_exists(&self.path).await?;
        trace!(
            "Read {} bytes from {}",
            contents.as_ref().map(|c| c.len()).unwrap_or_default(),
            self.path.display()
        );
        Ok(contents)
    }

    /// A unique file next to the mailbox. Same directory, so the rename cannot cross devices.
    fn staging_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.path
            .with_file_name(format!(".{name}.{}.tmp", uuid::Uuid::new_v4().simple()))
    }
}

/// Runs `wait` to completion, or until `deadline` elapses if there is one.
pub(crate) async fn with_deadline<T, F>(path: &Path, deadline: Option<Duration>, wait: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let Some(deadline) = deadline else {
        return wait.await;
    };
    match tokio::time::timeout(deadline, wait).await {
        Ok(result) => result,
        Err(_) => Err(ProtocolError::Timeout {
            path: path.to_path_buf(),
            waited: deadline,
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_replaces_content() {
        let dir = TempDir::new().unwrap();
        let mailbox = Mailbox::new(dir.path().join("nested").join("box.json"), ChannelMode::Legacy);
        assert!(mailbox.peek().await.unwrap().is_none());

        mailbox.put("a much longer first message").await.unwrap();
        mailbox.put("short").await.unwrap();
        assert_eq!(mailbox.peek().await.unwrap().unwrap(), b"short");
    }

    #[tokio::test]
    async fn test_hardened_put_leaves_no_staging_files() {
        let dir = TempDir::new().unwrap();
        let mailbox = Mailbox::new(dir.path().join("box.json"), ChannelMode::Hardened);
        mailbox.put("first").await.unwrap();
        mailbox.put("second").await.unwrap();
        assert_eq!(mailbox.peek().await.unwrap().unwrap(), b"second");

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![String::from("box.json")]);
    }

    #[tokio::test]
    async fn test_put_into_unwritable_location_fails() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "not a directory").unwrap();
        let mailbox = Mailbox::new(blocker.join("box.json"), ChannelMode::Legacy);
        assert!(mailbox.put("x").await.is_err());
    }

    #[tokio::test]
    async fn test_with_deadline() {
        let path = Path::new("box.json");
        let done = with_deadline(path, Some(Duration::from_secs(5)), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(done, 7);

        let never = std::future::pending::<Result<()>>();
        let err = with_deadline(path, Some(Duration::from_millis(20)), never)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProtocolError>(),
            Some(ProtocolError::Timeout { .. })
        ));
    }

    #[test]
    fn test_mode_text() {
        assert_eq!(ChannelMode::Hardened.to_string(), "hardened");
        assert_eq!("legacy".parse::<ChannelMode>().unwrap(), ChannelMode::Legacy);
    }
}
