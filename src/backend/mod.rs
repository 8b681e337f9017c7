mod error;
pub use error::BackendError;
mod gateway;
pub use gateway::{
    DownlinkFrame, DownlinkTiming, DownlinkTxAck, DownlinkTxInfo, GatewayBackend, GatewayId,
    Modulation, UplinkFrame, UplinkRxInfo, UplinkTxInfo,
};
mod application;
pub use application::{
    ApplicationBackend, DeviceStatusEvent, ProprietaryUplinkEvent, UplinkEvent,
};
mod join;
pub use join::{JoinAnswer, JoinBackend, JoinRequestContext};
