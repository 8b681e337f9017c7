mod error;
pub use error::MacCommandError;
mod handle;
pub use handle::{
    handle, request_device_status, AdrEvaluator, NoopAdrEvaluator, DEVICE_INITIATED_CIDS,
};
