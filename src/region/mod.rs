//! Band-plan tables, consumed as a pure lookup by the uplink pipeline
//! and the downlink scheduler.

use std::time::Duration;

use thiserror::Error;

mod eu868;
pub use eu868::Eu868;

/// Band-plan lookup errors.
#[derive(Error, Debug)]
pub enum RegionError {
    #[error("unknown data-rate index {0}")]
    UnknownDataRate(u8),

    #[error("no data-rate index for the given modulation parameters")]
    UnknownDataRateParams,

    #[error("frequency {0} Hz is outside the band")]
    InvalidFrequency(u32),
}

/// One uplink channel of the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Channel {
    pub frequency: u32,
    pub min_dr: u8,
    pub max_dr: u8,
}

/// Modulation parameters behind a data-rate index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataRate {
    Lora { spreading_factor: u8, bandwidth: u32 },
    Fsk { bitrate: u32 },
}

/// Receive-window defaults of the plan.
#[derive(Debug, Clone, Copy)]
pub struct BandDefaults {
    pub rx1_delay: Duration,
    pub rx2_delay: Duration,
    pub join_accept_delay1: Duration,
    pub join_accept_delay2: Duration,
    pub rx2_frequency: u32,
    pub rx2_data_rate: u8,
}

/// Regional channel / data-rate / power tables.
pub trait Region: Send + Sync {
    fn name(&self) -> &'static str;

    /// The plan's fixed uplink channels, indexed from zero.
    fn uplink_channels(&self) -> &[Channel];

    fn data_rate(&self, index: u8) -> Result<DataRate, RegionError>;

    /// Reverse lookup: modulation parameters to data-rate index.
    fn data_rate_index(&self, dr: &DataRate) -> Result<u8, RegionError>;

    /// RX1 downlink data-rate for an uplink data-rate and offset.
    fn rx1_data_rate(&self, uplink_dr: u8, rx1_dr_offset: u8) -> Result<u8, RegionError>;

    /// RX1 downlink frequency for an uplink frequency.
    fn rx1_frequency(&self, uplink_frequency: u32) -> Result<u32, RegionError>;

    fn defaults(&self) -> BandDefaults;

    /// Regulatory downlink TX power in dBm for the given frequency.
    fn downlink_tx_power(&self, frequency: u32) -> i32;

    /// Demodulation-floor SNR in dB for the data-rate; link margins are
    /// measured against it.
    fn demodulation_floor(&self, dr: u8) -> f64;

    /// Maximum MACPayload size in bytes at the data-rate.
    fn max_mac_payload(&self, dr: u8) -> usize;

    /// Channel indices enabled for a fresh device-session.
    fn default_enabled_channels(&self) -> Vec<usize> {
        (0..self.uplink_channels().len()).collect()
    }
}
