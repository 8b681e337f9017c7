//! Wire frames exchanged with the gateway backend, and the backend
//! contract itself.
//!
//! The field shapes are fixed by the gateway protocol and must be
//! preserved bit-compatibly across backend implementations: 8-byte
//! gateway ids, frequencies in Hz as `u32`, the data-rate as a tagged
//! LoRa/FSK union and the timing as a tagged
//! immediately/delay/GPS-epoch union.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::error::BackendError;

/// 8-byte gateway identifier.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct GatewayId(pub [u8; 8]);

impl fmt::Display for GatewayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Modulation parameters, a LoRa/FSK tagged union.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Modulation {
    Lora {
        spreading_factor: u8,
        bandwidth: u32,
        polarization_inversion: bool,
    },
    Fsk {
        bitrate: u32,
    },
}

/// TX metadata of a received uplink, identical across all gateway
/// copies of the same transmission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UplinkTxInfo {
    /// Frequency in Hz.
    pub frequency: u32,
    pub modulation: Modulation,
}

/// Per-gateway reception metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UplinkRxInfo {
    pub gateway_id: GatewayId,
    pub rssi: i32,
    pub lora_snr: f64,
    pub board: u32,
    pub antenna: u32,
    /// Opaque gateway timing context, echoed back in the downlink.
    pub context: Vec<u8>,
}

/// One gateway's copy of an uplink transmission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UplinkFrame {
    pub phy_payload: Vec<u8>,
    pub tx_info: UplinkTxInfo,
    pub rx_info: UplinkRxInfo,
}

/// Downlink transmission timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownlinkTiming {
    Immediately,
    Delay { delay: Duration },
    GpsEpoch { time_since_gps_epoch: Duration },
}

/// Transmission parameters of a downlink frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownlinkTxInfo {
    pub gateway_id: GatewayId,
    /// Frequency in Hz.
    pub frequency: u32,
    /// TX power in dBm.
    pub power: i32,
    pub modulation: Modulation,
    pub board: u32,
    pub antenna: u32,
    /// The gateway context of the uplink this downlink answers.
    pub context: Vec<u8>,
    pub timing: DownlinkTiming,
}

/// One downlink candidate handed to a gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownlinkFrame {
    pub phy_payload: Vec<u8>,
    pub tx_info: DownlinkTxInfo,
    /// Random 16-bit token matching the gateway's TX acknowledgement.
    pub token: u16,
    /// Copied from the uplink context id, for log correlation.
    pub downlink_id: [u8; 16],
}

/// Gateway acknowledgement for an emitted downlink frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownlinkTxAck {
    pub gateway_id: GatewayId,
    pub token: u16,
    /// Empty on success, else one of the scheduler rejection codes.
    pub error: String,
    pub downlink_id: [u8; 16],
}

/// The pluggable gateway transport.
///
/// Implementations own the two inbound channels; the consumers take
/// each receiver exactly once. `close` drops the senders, which ends
/// both consumer loops.
#[async_trait]
pub trait GatewayBackend: Send + Sync {
    fn take_uplink_frames(&self) -> Option<mpsc::Receiver<UplinkFrame>>;

    fn take_downlink_tx_acks(&self) -> Option<mpsc::Receiver<DownlinkTxAck>>;

    async fn send_tx_packet(&self, frame: DownlinkFrame) -> Result<(), BackendError>;

    async fn close(&self);
}
