use async_trait::async_trait;

use super::error::BackendError;
use super::gateway::{UplinkRxInfo, UplinkTxInfo};
use crate::lorawan::{DevAddr, DevEui};

/// Application payload handed to the application server after a
/// successful data uplink.
#[derive(Debug, Clone, PartialEq)]
pub struct UplinkEvent {
    pub dev_eui: DevEui,
    pub dev_addr: DevAddr,
    pub f_port: u8,
    pub f_cnt: u32,
    pub confirmed: bool,
    pub dr: u8,
    /// Frequency in Hz.
    pub frequency: u32,
    pub data: Vec<u8>,
    pub rx_info: Vec<UplinkRxInfo>,
}

/// Raw proprietary frame forwarded with its RX metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ProprietaryUplinkEvent {
    pub phy_payload: Vec<u8>,
    pub tx_info: UplinkTxInfo,
    pub rx_info: Vec<UplinkRxInfo>,
}

/// Battery and link-margin report from a DevStatusAns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStatusEvent {
    pub dev_eui: DevEui,
    /// 0 = external power, 1-254 = level, 255 = unknown.
    pub battery: u8,
    /// Demodulation margin in dB.
    pub margin: i8,
}

/// The application-server collaborator. Delivery is at-least-once.
#[async_trait]
pub trait ApplicationBackend: Send + Sync {
    async fn handle_uplink_data(&self, event: UplinkEvent) -> Result<(), BackendError>;

    async fn handle_proprietary_uplink(
        &self,
        event: ProprietaryUplinkEvent,
    ) -> Result<(), BackendError>;

    async fn handle_device_status(&self, event: DeviceStatusEvent) -> Result<(), BackendError>;
}
