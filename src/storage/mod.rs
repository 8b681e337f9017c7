mod error;
pub use error::StorageError;
mod store;
pub use store::{acquire_lock, MemoryStore, Store};
mod session;
pub use session::{
    delete_device_session, get_device_session, get_device_sessions_for_dev_addr,
    save_device_session, DeviceGatewayRxInfo, DeviceSession, MacCommandBlock, UplinkHistory,
};
mod downlink_frames;
pub use downlink_frames::{
    clear_downlink_frames, pop_downlink_frame, save_downlink_frames, DownlinkFrames,
};
