use thiserror::Error;

use crate::backend::BackendError;
use crate::lorawan::PhyError;
use crate::maccommand::MacCommandError;
use crate::region::RegionError;
use crate::storage::StorageError;

/// Result type alias for network-server operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for one pipeline run.
///
/// The first error aborts the remaining stages. `Replay` is logged at
/// debug level and never surfaced; `Transient` errors are retryable by
/// the caller (on the downlink path they trigger the fall-through to the
/// next candidate frame); `Fatal` errors bubble to the consumer loop and
/// are logged without killing the loop.
#[derive(Error, Debug)]
pub enum Error {
    /// The caller violated a contract (bad FPort, oversize payload, ...)
    #[error("bad argument: {0}")]
    BadArgument(String),

    /// No session, or no pending MAC-command for a received answer
    #[error("{0}")]
    NotFound(String),

    /// The frame-counter or MIC rejects the frame; dropped silently
    #[error("replayed frame: {0}")]
    Replay(String),

    /// Missing RX info, device not yet activated
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// Store or backend I/O failed; retryable
    #[error("transient error: {0}")]
    Transient(String),

    /// Band-plan misconfiguration or a decoder bug
    #[error("fatal: {0}")]
    Fatal(String),

    /// Session store error
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// PHY payload codec error
    #[error(transparent)]
    Phy(#[from] PhyError),

    /// MAC-command reconciliation error
    #[error(transparent)]
    MacCommand(#[from] MacCommandError),

    /// Gateway / application / join collaborator error
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Band-plan lookup error
    #[error(transparent)]
    Region(#[from] RegionError),
}

/// gRPC status codes the error taxonomy maps onto at the RPC boundary.
///
/// The gRPC transport itself is an external collaborator; only the
/// mapping is part of the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcCode {
    InvalidArgument,
    FailedPrecondition,
    Internal,
    AlreadyExists,
    NotFound,
    Unavailable,
    Unknown,
}

impl Error {
    /// Map the error onto the RPC status-code taxonomy.
    pub fn rpc_code(&self) -> RpcCode {
        match self {
            Error::BadArgument(_) => RpcCode::InvalidArgument,
            Error::NotFound(_) => RpcCode::NotFound,
            // FCnt/MIC mismatches surface as not-found at the boundary
            Error::Replay(_) => RpcCode::NotFound,
            Error::PreconditionFailed(_) => RpcCode::FailedPrecondition,
            Error::Transient(_) => RpcCode::Unavailable,
            Error::Fatal(_) => RpcCode::Internal,
            Error::Storage(err) => match err {
                StorageError::NotFound(_) => RpcCode::NotFound,
                StorageError::AlreadyExists(_) => RpcCode::AlreadyExists,
                StorageError::Encoding(_) => RpcCode::Internal,
                StorageError::Io(_) | StorageError::LockTimeout(_) => RpcCode::Unavailable,
            },
            Error::Phy(_) => RpcCode::InvalidArgument,
            Error::MacCommand(err) => match err {
                MacCommandError::NoPendingCommand => RpcCode::NotFound,
                MacCommandError::PendingCidMismatch { .. } => RpcCode::Internal,
                MacCommandError::UnexpectedPayload(_) => RpcCode::InvalidArgument,
            },
            Error::Backend(_) => RpcCode::Unavailable,
            // unknown data-rate and friends are server-side bugs
            Error::Region(_) => RpcCode::Internal,
        }
    }

    /// True when the error should be dropped silently (debug log + counter).
    pub fn is_silent(&self) -> bool {
        matches!(self, Error::Replay(_))
    }
}
