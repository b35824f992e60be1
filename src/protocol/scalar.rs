use crate::protocol::mailbox::{with_deadline, ChannelMode, Mailbox, Timing};
use crate::protocol::Channel;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

/// The statistics a worker can compute over the expenses in the table dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statistic {
    /// The largest expense, i.e. the most negative amount.
    Highest,
    /// The smallest expense, i.e. the negative amount closest to zero.
    Lowest,
    /// The mean of all expenses.
    Average,
}

impl Statistic {
    /// In the order they are requested.
    pub const ALL: [Statistic; 3] = [Statistic::Highest, Statistic::Lowest, Statistic::Average];

    pub fn opcode(&self) -> u8 {
        match self {
            Statistic::Highest => 1,
            Statistic::Lowest => 2,
            Statistic::Average => 3,
        }
    }

    pub fn from_opcode(opcode: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.opcode() == opcode)
    }
}

serde_plain::derive_display_from_serialize!(Statistic);
serde_plain::derive_fromstr_from_deserialize!(Statistic);

/// A mailbox that carries one line of text each way: an opcode out, an answer back.
///
/// In legacy mode the answer is read exactly once, after a fixed wait. A worker slower than that
/// wait produces an empty or stale answer (often the opcode itself), and nothing detects it.
#[derive(Debug, Clone)]
pub struct ScalarChannel {
    mailbox: Mailbox,
    timing: Timing,
}

impl ScalarChannel {
    pub fn new(mailbox: Mailbox, timing: Timing) -> Self {
        Self { mailbox, timing }
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    /// Replaces the mailbox content with the decimal text of the opcode.
    pub async fn send_opcode(&self, statistic: Statistic) -> Result<()> {
        debug!(
            "Requesting the {statistic} expense (opcode {}) via {}",
            statistic.opcode(),
            self.mailbox.path().display()
        );
        self.mailbox.put(statistic.opcode().to_string()).await
    }

    /// Reads back the answer to `sent`, unvalidated, without its line terminator.
    pub async fn receive_line(&self, sent: Statistic) -> Result<String> {
        match self.mailbox.mode() {
            ChannelMode::Legacy => {
                tokio::time::sleep(self.timing.scalar_wait).await;
                let line = self.first_line().await?.unwrap_or_default();
                if line.trim() == sent.opcode().to_string() {
                    warn!(
                        "The worker did not answer within {:?}; the mailbox still holds the request",
                        self.timing.scalar_wait
                    );
                }
                Ok(line)
            }
            ChannelMode::Hardened => {
                with_deadline(self.mailbox.path(), self.timing.deadline, async {
                    loop {
                        tokio::time::sleep(self.timing.poll_interval).await;
                        match self.first_line().await? {
                            Some(line) if is_answer(&line, sent) => return Ok(line),
                            other => trace!("No answer yet: {other:?}"),
                        }
                    }
                })
                .await
            }
        }
    }

    async fn first_line(&self) -> Result<Option<String>> {
        Ok(self.mailbox.peek().await?.map(|bytes| {
            String::from_utf8_lossy(&bytes)
                .lines()
                .next()
                .unwrap_or_default()
                .to_string()
        }))
    }
}

/// Whether `line` looks like an answer rather than the request still sitting in the mailbox.
/// An answer that is literally equal to the opcode cannot be told apart, and is waited out.
fn is_answer(line: &str, sent: Statistic) -> bool {
    let line = line.trim();
    !line.is_empty() && line != sent.opcode().to_string()
}

#[async_trait]
impl Channel for ScalarChannel {
    type Request = Statistic;
    type Response = String;

    fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    async fn send_and_await(&self, request: &Statistic) -> Result<String> {
        self.send_opcode(*request).await?;
        self.receive_line(*request).await
    }
}
