use serde::{Deserialize, Serialize};

/// Discriminates the two operations the host accepts on a channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EnvelopeKind {
    /// Submit an application command; acknowledged with an [`Ack`].
    ClientCommand,
    /// Long-poll for completed results; answered with a [`PollBatch`].
    PollBlocking,
}

/// Outer message sent on a channel. The payload bytes are an encoded
/// [`crate::ClientRequest`] or [`PollArgs`] depending on `kind`; the
/// envelope itself is agnostic to their schemas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub kind: EnvelopeKind,
    pub payload: Vec<u8>,
}

/// Acknowledgement for a submitted command.
///
/// `queue_id` identifies the server-side result queue for this client
/// session and is fixed for the session's lifetime; `id` correlates the
/// command with its eventual [`CommandResult`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ack {
    pub queue_id: u64,
    pub id: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ResponseCode {
    Ok,
    Error,
}

/// Immediate response on a channel, paired 1:1 with the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireResponse {
    pub code: ResponseCode,
    pub error: Option<String>,
    /// Encoded [`Ack`] or [`PollBatch`] on success, empty on error.
    pub body: Vec<u8>,
}

impl WireResponse {
    pub fn ok(body: Vec<u8>) -> Self {
        Self {
            code: ResponseCode::Ok,
            error: None,
            body,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            code: ResponseCode::Error,
            error: Some(message.into()),
            body: Vec::new(),
        }
    }
}

/// Arguments of a blocking poll. The server holds the request open up to
/// `timeout_ms` waiting for at least one completed result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollArgs {
    pub queue_id: u64,
    pub timeout_ms: u64,
}

/// Completed result of one previously acknowledged command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub command_id: u64,
    pub code: ResponseCode,
    pub error: Option<String>,
    /// Encoded [`crate::ClientReply`].
    pub body: Vec<u8>,
}

/// Batch of completed results drained by one poll.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PollBatch {
    pub results: Vec<CommandResult>,
}
