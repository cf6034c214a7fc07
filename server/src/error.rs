use podium_proto::WireError;
use std::io;
use thiserror::Error;

/// errors that can end a client session or the whole service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("wire decode error: {0}")]
    Wire(#[from] WireError),

    #[error("frame length {length} is shorter than its own prefix")]
    FrameLength { length: u16 },

    #[error("first message was not a handshake")]
    HandshakeRequired,

    #[error("handshake repeated after the session was established")]
    RepeatedHandshake,

    #[error("client requested unsupported protocol version {client}")]
    ProtocolVersion { client: u32 },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ServiceError {
    /// recoverable errors end the session; the supervisor keeps the rating
    /// data and goes back to accepting. anything else terminates the
    /// service.
    pub fn is_recoverable(&self) -> bool {
        match self {
            ServiceError::Io(_)
            | ServiceError::Wire(_)
            | ServiceError::FrameLength { .. }
            | ServiceError::HandshakeRequired
            | ServiceError::RepeatedHandshake
            | ServiceError::ProtocolVersion { .. } => true,
            ServiceError::Config(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_faults_are_recoverable() {
        assert!(ServiceError::Io(io::Error::from(io::ErrorKind::UnexpectedEof)).is_recoverable());
        assert!(ServiceError::Wire(WireError::Underflow).is_recoverable());
        assert!(ServiceError::ProtocolVersion { client: 2 }.is_recoverable());
        assert!(ServiceError::HandshakeRequired.is_recoverable());
    }

    #[test]
    fn test_config_fault_is_fatal() {
        assert!(!ServiceError::Config("bad".into()).is_recoverable());
    }
}
