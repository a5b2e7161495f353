use std::time::Duration;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The subscription or connection is gone.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Publishing data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding or accepting relay connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The broker did not confirm the subscription in time.
    #[error("subscription to room {room} timed out after {after:?}")]
    SubscribeTimeout { room: String, after: Duration },

    /// The broker refused or broke the subscription handshake.
    #[error("subscription failed: {0}")]
    SubscribeFailed(String),

    /// The transport was shut down.
    #[error("transport shut down")]
    Shutdown,
}

impl TransportError {
    /// Wraps any displayable failure as a `SendFailed` I/O error.
    pub(crate) fn send_failed(reason: impl std::fmt::Display) -> Self {
        Self::SendFailed(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            reason.to_string(),
        ))
    }
}
