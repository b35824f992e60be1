//! The file-backed request/response protocol spoken with worker processes.
//!
//! Two wire formats share one shape: a [`Channel`] writes a request into a mailbox file and waits
//! for the answer to appear in it.
//!
//! - [`StructuredChannel`] carries JSON [`Envelope`]s with a full table snapshot (edits and
//!   category consolidation).
//! - [`ScalarChannel`] carries a single [`Statistic`] opcode out and a single line of text back.
//!
//! Only one round trip is ever in flight. There is no locking and no request id: a response that
//! was never consumed can be mistaken for the answer to the next request.

mod envelope;
mod mailbox;
mod scalar;
mod structured;

pub use envelope::{decode, encode, Envelope, EnvelopeKind, Operation, Request};
pub use mailbox::{ChannelMode, Mailbox, Timing};
pub use scalar::{ScalarChannel, Statistic};
pub use structured::StructuredChannel;

use crate::Result;
use async_trait::async_trait;

/// Delegates one request to a worker and waits for its response.
///
/// Dropping the returned future abandons the wait; the worker is not told.
#[async_trait]
pub trait Channel: Send + Sync {
    type Request: Send + Sync;
    type Response: Send;

    /// The file the channel talks through.
    fn mailbox(&self) -> &Mailbox;

    /// Writes `request` and waits until the matching response can be read.
    async fn send_and_await(&self, request: &Self::Request) -> Result<Self::Response>;
}
