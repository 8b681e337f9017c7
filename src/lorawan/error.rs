use thiserror::Error;

/// PHY payload codec errors.
#[derive(Error, Debug)]
pub enum PhyError {
    #[error("phy payload too short: {got} byte(s)")]
    TooShort { got: usize },

    #[error("unknown mac-command cid {0:#04x} for this direction")]
    UnknownCid(u8),

    #[error("mac-command payload for cid {cid:#04x} is truncated")]
    TruncatedMacCommand { cid: u8 },

    #[error("expected a {expected} payload")]
    UnexpectedPayload { expected: &'static str },

    #[error("fopts must not exceed 15 bytes, got {0}")]
    FOptsTooLong(usize),

    #[error("invalid mic")]
    InvalidMic,

    #[error("unknown rejoin-request type {0}")]
    UnknownRejoinType(u8),
}
