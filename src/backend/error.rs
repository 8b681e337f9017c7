use thiserror::Error;

/// Errors raised by the gateway, application and join collaborators.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("gateway backend closed")]
    Closed,

    #[error("send tx-packet error: {0}")]
    Send(String),

    #[error("application-server error: {0}")]
    Application(String),

    #[error("join-server error: {0}")]
    Join(String),
}
