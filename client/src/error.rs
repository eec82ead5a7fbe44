use transport::{DecodeError, Status, TransportError, WaitTimedOut};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("server unavailable")]
    Unavailable,
    #[error("timed out waiting for the server")]
    Timeout,
    #[error("rpc failed: {0}")]
    Rpc(Status),
    #[error("bad response: {0}")]
    Decode(#[from] DecodeError),
    #[error("response carried no message")]
    MissingResponse,
}

impl From<TransportError> for ClientError {
    fn from(_: TransportError) -> Self {
        ClientError::Unavailable
    }
}

impl From<WaitTimedOut> for ClientError {
    fn from(_: WaitTimedOut) -> Self {
        ClientError::Timeout
    }
}
