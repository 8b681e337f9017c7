mod collect;
pub use collect::collect_and_call_once;
pub mod data;
pub mod join;
pub mod proprietary;
pub mod rejoin;
pub(crate) mod server;
pub use server::NetworkServer;

use std::fmt;

use rand::RngCore;

use crate::backend::{UplinkRxInfo, UplinkTxInfo};
use crate::lorawan::PhyPayload;

/// Per-task context: a random id correlating every log line of one
/// pipeline run, copied into the downlink id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Context {
    pub id: [u8; 16],
}

impl Context {
    pub fn new() -> Self {
        let mut id = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut id);
        Context { id }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.id))
    }
}

/// One logical uplink after deduplication: the decoded PHY payload, the
/// RX metadata of every receiving gateway and the canonical TX info
/// taken from the best one.
#[derive(Debug, Clone, PartialEq)]
pub struct RxPacket {
    pub phy: PhyPayload,
    /// The raw PHY payload bytes as transmitted, MIC included.
    pub payload_bytes: Vec<u8>,
    pub tx_info: UplinkTxInfo,
    /// Sorted best gateway first (SNR, then RSSI, then gateway id).
    pub rx_info_set: Vec<UplinkRxInfo>,
    /// Uplink data-rate index in the active band plan.
    pub dr: u8,
}
