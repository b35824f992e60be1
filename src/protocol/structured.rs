use crate::error::ProtocolError;
use crate::model::Table;
use crate::protocol::envelope::{decode, encode, Envelope, EnvelopeKind, Request};
use crate::protocol::mailbox::{with_deadline, Mailbox, Timing};
use crate::protocol::Channel;
use crate::Result;
use async_trait::async_trait;
use tracing::{debug, trace};

/// A mailbox carrying JSON envelopes. The request is written to the same file the response is
/// expected in, so the caller first reads back its own request, sees the wrong `Type`, and keeps
/// waiting until a worker replaces it.
#[derive(Debug, Clone)]
pub struct StructuredChannel {
    mailbox: Mailbox,
    timing: Timing,
}

impl StructuredChannel {
    pub fn new(mailbox: Mailbox, timing: Timing) -> Self {
        Self { mailbox, timing }
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    /// Encodes `envelope` and replaces the mailbox content with it.
    pub async fn write(&self, envelope: &Envelope) -> Result<()> {
        let bytes = encode(envelope)?;
        debug!(
            "Writing {} envelope ({} bytes) to {}",
            envelope.kind(),
            bytes.len(),
            self.mailbox.path().display()
        );
        self.mailbox.put(bytes).await
    }

    /// A single read attempt. A missing, malformed or mismatched envelope is returned as a
    /// `ProtocolError::Decode` or `ProtocolError::UnexpectedType` inside the `anyhow` error.
    pub async fn read_once(&self, expected: EnvelopeKind) -> Result<Envelope> {
        let bytes = self
            .mailbox
            .peek()
            .await?
            .ok_or_else(|| ProtocolError::Decode(String::from("the mailbox does not exist")))?;
        let envelope = decode(&bytes)?;
        if envelope.kind() != expected {
            return Err(ProtocolError::UnexpectedType {
                expected: expected.as_str(),
                found: envelope.kind().to_string(),
            }
            .into());
        }
        Ok(envelope)
    }

    /// Sleeps, then tries to read an envelope of the `expected` kind, over and over until one
    /// appears. Without a deadline this waits forever. Filesystem errors other than a missing
    /// file end the wait.
    pub async fn read_blocking(&self, expected: EnvelopeKind) -> Result<Envelope> {
        with_deadline(self.mailbox.path(), self.timing.deadline, async {
            let mut attempt: u64 = 0;
            loop {
                tokio::time::sleep(self.timing.poll_interval).await;
                attempt += 1;
                match self.read_once(expected).await {
                    Ok(envelope) => {
                        debug!(
                            "Received {expected} from {} after {attempt} attempt(s)",
                            self.mailbox.path().display()
                        );
                        return Ok(envelope);
                    }
                    Err(e) => match e.downcast_ref::<ProtocolError>() {
                        Some(ProtocolError::Decode(_) | ProtocolError::UnexpectedType { .. }) => {
                            trace!("Attempt {attempt}: not ready: {e}");
                        }
                        _ => return Err(e),
                    },
                }
            }
        })
        .await
    }
}

#[async_trait]
impl Channel for StructuredChannel {
    type Request = Request;
    type Response = Table;

    fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    async fn send_and_await(&self, request: &Request) -> Result<Table> {
        // TODO: avoid cloning the snapshot by letting `Envelope` borrow its table.
        self.write(&Envelope::Request(request.clone())).await?;
        match self.read_blocking(EnvelopeKind::Response).await? {
            Envelope::Response(data) => Ok(data),
            Envelope::Request(_) => unreachable!("read_blocking only returns the expected kind"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Cell, RowId, TransactionColumn};
    use crate::protocol::{ChannelMode, Operation};
    use std::time::Duration;
    use tempfile::TempDir;

    fn timing() -> Timing {
        Timing {
            poll_interval: Duration::from_millis(5),
            scalar_wait: Duration::from_millis(50),
            deadline: None,
        }
    }

    fn channel(dir: &TempDir, mode: ChannelMode) -> StructuredChannel {
        StructuredChannel::new(Mailbox::new(dir.path().join("edit.json"), mode), timing())
    }

    fn request() -> Request {
        Request {
            operation: Operation::Edit {
                id: RowId::new(0),
                column: TransactionColumn::Category,
                value: "Rent".into(),
            },
            data: Table::transactions(),
        }
    }

    #[tokio::test]
    async fn test_read_once_reports_state() {
        let dir = TempDir::new().unwrap();
        let channel = channel(&dir, ChannelMode::Legacy);

        let err = channel.read_once(EnvelopeKind::Response).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProtocolError>(),
            Some(ProtocolError::Decode(_))
        ));

        channel.write(&Envelope::Request(request())).await.unwrap();
        let err = channel.read_once(EnvelopeKind::Response).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProtocolError>(),
            Some(ProtocolError::UnexpectedType { .. })
        ));

        let found = channel.read_once(EnvelopeKind::Request).await.unwrap();
        assert_eq!(found, Envelope::Request(request()));
    }

    #[tokio::test]
    async fn test_read_blocking_skips_garbage_and_wrong_type() {
        let dir = TempDir::new().unwrap();
        let channel = channel(&dir, ChannelMode::Legacy);
        let path = channel.mailbox().path().to_path_buf();
        channel.write(&Envelope::Request(request())).await.unwrap();

        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(40)).await;
            std::fs::write(&path, r#"{"Type": "Response", "Da"#).unwrap();
            tokio::time::sleep(Duration::from_millis(40)).await;
            std::fs::write(&path, r#"{"Type": "Response", "Data": {"Amount": {"0": -5}}}"#)
                .unwrap();
        });

        let envelope = channel.read_blocking(EnvelopeKind::Response).await.unwrap();
        writer.await.unwrap();
        let Envelope::Response(data) = envelope else {
            panic!("expected a response");
        };
        assert_eq!(data.cell(RowId::new(0), "Amount").unwrap().to_string(), "-5");
    }

    #[tokio::test]
    async fn test_read_blocking_does_not_return_on_mismatched_type() {
        let dir = TempDir::new().unwrap();
        let mut timing = timing();
        timing.deadline = Some(Duration::from_millis(100));
        let channel = StructuredChannel::new(
            Mailbox::new(dir.path().join("edit.json"), ChannelMode::Legacy),
            timing,
        );
        channel.write(&Envelope::Request(request())).await.unwrap();

        let err = channel
            .read_blocking(EnvelopeKind::Response)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProtocolError>(),
            Some(ProtocolError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_send_and_await_round_trip() {
        for mode in [ChannelMode::Legacy, ChannelMode::Hardened] {
            let dir = TempDir::new().unwrap();
            let channel = channel(&dir, mode);
            let worker_channel = channel.clone();
            let worker = tokio::spawn(async move {
                let Envelope::Request(request) = worker_channel
                    .read_blocking(EnvelopeKind::Request)
                    .await
                    .unwrap()
                else {
                    panic!("expected a request");
                };
                let mut data = request.data;
                data.push_row(vec![Cell::default(); 6]).unwrap();
                worker_channel
                    .write(&Envelope::Response(data))
                    .await
                    .unwrap();
            });

            let response = channel.send_and_await(&request()).await.unwrap();
            worker.await.unwrap();
            assert_eq!(response.len(), 1);
        }
    }
}
