use std::time::Duration;

use crate::constants::{
    DEDUPLICATION_DELAY_DEFAULT, DEVICE_SESSION_TTL_DEFAULT, DOWNLINK_FRAMES_TTL_DEFAULT,
    MAX_FCNT_GAP_DEFAULT,
};
use crate::error::Error;

/// Receive-window selection for scheduled downlinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxWindow {
    /// Build both candidates: RX1 first, RX2 as fall-through.
    Both,
    /// RX1 only.
    Rx1,
    /// RX2 only.
    Rx2,
}

impl Default for RxWindow {
    fn default() -> Self {
        RxWindow::Both
    }
}

/// Network-server configuration, injected once at construction and
/// treated as immutable for the process lifetime.
#[derive(Debug, Clone)]
pub struct Config {
    /// Window during which gateway copies of one uplink are merged into
    /// one logical reception.
    pub deduplication_delay: Duration,
    /// Which receive windows the downlink scheduler may use.
    pub rx_window: RxWindow,
    /// Downlink TX power in dBm; -1 selects the band-plan default for
    /// the downlink frequency.
    pub downlink_tx_power: i32,
    /// Extra delay before a class-C data downlink is emitted.
    pub get_downlink_data_delay: Duration,
    /// Device-session expiry after inactivity.
    pub device_session_ttl: Duration,
    /// How long the remaining downlink candidates stay available to the
    /// TX-ack fall-through.
    pub downlink_frames_ttl: Duration,
    /// Maximum forward frame-counter gap accepted when reassembling the
    /// 32-bit counter from its 16-bit wire value.
    pub max_fcnt_gap: u32,
    /// Interval between periodic DevStatusReq polls; zero disables them.
    pub device_status_req_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            deduplication_delay: DEDUPLICATION_DELAY_DEFAULT,
            rx_window: RxWindow::Both,
            downlink_tx_power: -1,
            get_downlink_data_delay: Duration::from_millis(100),
            device_session_ttl: DEVICE_SESSION_TTL_DEFAULT,
            downlink_frames_ttl: DOWNLINK_FRAMES_TTL_DEFAULT,
            max_fcnt_gap: MAX_FCNT_GAP_DEFAULT,
            device_status_req_interval: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), Error> {
        if self.deduplication_delay.is_zero() {
            return Err(Error::BadArgument(
                "deduplication-delay must be greater than zero".into(),
            ));
        }
        if self.device_session_ttl.is_zero() {
            return Err(Error::BadArgument(
                "device-session-ttl must be greater than zero".into(),
            ));
        }
        if self.max_fcnt_gap == 0 {
            return Err(Error::BadArgument(
                "max-fcnt-gap must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
        assert_eq!(
            Config::default().deduplication_delay,
            Duration::from_millis(200)
        );
    }

    #[test]
    fn zero_dedup_delay_is_rejected() {
        let config = Config {
            deduplication_delay: Duration::ZERO,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
