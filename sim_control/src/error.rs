use thiserror::Error;

/// Failure taxonomy for client operations.
///
/// `Timeout` is recoverable and always distinguishable from the fatal
/// variants so callers can choose between retry and abort.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport could not be established within the retry budget, or an
    /// established stream failed mid-message. Fatal to the owning channel.
    #[error("connection failed: {0}")]
    Connection(String),

    /// A bounded wait expired.
    #[error("operation timed out")]
    Timeout,

    /// A message failed envelope or schema decode, or the reply did not
    /// match the request kind. Fatal for that call; never silently retried.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server delivered two results for the same request id. A
    /// server-contract violation, surfaced rather than swallowed.
    #[error("duplicate result for request {0}")]
    DuplicateKey(u64),

    /// The channel pump has exited; no further requests can be paired.
    #[error("channel closed")]
    Closed,

    /// The server reported a command failure.
    #[error("server error: {0}")]
    Server(String),
}

impl From<sim_wire::WireError> for ClientError {
    fn from(err: sim_wire::WireError) -> Self {
        ClientError::Protocol(err.to_string())
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Connection(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::Connection(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

impl ClientError {
    /// True for the recoverable timeout case.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout)
    }
}
