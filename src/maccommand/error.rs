use thiserror::Error;

use crate::lorawan::Cid;

/// MAC-command reconciliation errors.
#[derive(Error, Debug)]
pub enum MacCommandError {
    /// An answer arrived for which no request is pending.
    #[error("expected pending mac-command")]
    NoPendingCommand,

    #[error("pending mac-command block has cid {pending:?}, expected {expected:?}")]
    PendingCidMismatch { pending: Cid, expected: Cid },

    #[error("unexpected payload for cid {0:?}")]
    UnexpectedPayload(Cid),
}
