mod error;
pub use error::PhyError;
mod types;
pub use types::{Aes128Key, Cid, DevAddr, DevEui, DeviceClass, MType, Major};
pub mod crypto;
pub use crypto::Direction;
pub mod maccommands;
pub use maccommands::{
    LinkAdrAnsPayload, LinkAdrReqPayload, MacCommand, NewChannelReqPayload,
    PingSlotChannelReqPayload, RxParamSetupReqPayload, encode_mac_commands, parse_mac_commands,
};
pub mod phy;
pub use phy::{FCtrl, Fhdr, JoinRequestPayload, MacPayload, Mhdr, Payload, PhyPayload,
    RejoinRequestPayload};
