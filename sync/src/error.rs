//! Crate-level error type.

use crate::channel::ChannelError;
use crate::client::ClientError;

/// Errors raised while wiring channels and backends together.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Channel configuration or transport error.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// REST client error.
    #[error("client error: {0}")]
    Client(#[from] ClientError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_from_channel() {
        let err: SyncError = ChannelError::InvalidConfig("heartbeat must be positive".to_string()).into();
        assert!(matches!(err, SyncError::Channel(_)));
        assert!(err.to_string().starts_with("channel error: "));
    }

    #[test]
    fn test_error_from_client() {
        let err: SyncError = ClientError::Unauthorized.into();
        assert_eq!(err.to_string(), "client error: unauthorized");
    }
}
