use std::time::Duration;

use super::{BandDefaults, Channel, DataRate, Region, RegionError};

const CHANNELS: [Channel; 3] = [
    Channel {
        frequency: 868_100_000,
        min_dr: 0,
        max_dr: 5,
    },
    Channel {
        frequency: 868_300_000,
        min_dr: 0,
        max_dr: 5,
    },
    Channel {
        frequency: 868_500_000,
        min_dr: 0,
        max_dr: 5,
    },
];

const DATA_RATES: [DataRate; 8] = [
    DataRate::Lora {
        spreading_factor: 12,
        bandwidth: 125_000,
    },
    DataRate::Lora {
        spreading_factor: 11,
        bandwidth: 125_000,
    },
    DataRate::Lora {
        spreading_factor: 10,
        bandwidth: 125_000,
    },
    DataRate::Lora {
        spreading_factor: 9,
        bandwidth: 125_000,
    },
    DataRate::Lora {
        spreading_factor: 8,
        bandwidth: 125_000,
    },
    DataRate::Lora {
        spreading_factor: 7,
        bandwidth: 125_000,
    },
    DataRate::Lora {
        spreading_factor: 7,
        bandwidth: 250_000,
    },
    DataRate::Fsk { bitrate: 50_000 },
];

// Repeater-compatible maximum MACPayload sizes per data-rate.
const MAX_MAC_PAYLOAD: [usize; 8] = [59, 59, 59, 123, 230, 230, 230, 230];

/// The EU 863-870 MHz band plan.
#[derive(Debug, Clone, Copy, Default)]
pub struct Eu868;

impl Region for Eu868 {
    fn name(&self) -> &'static str {
        "EU868"
    }

    fn uplink_channels(&self) -> &[Channel] {
        &CHANNELS
    }

    fn data_rate(&self, index: u8) -> Result<DataRate, RegionError> {
        DATA_RATES
            .get(index as usize)
            .copied()
            .ok_or(RegionError::UnknownDataRate(index))
    }

    fn data_rate_index(&self, dr: &DataRate) -> Result<u8, RegionError> {
        DATA_RATES
            .iter()
            .position(|d| d == dr)
            .map(|i| i as u8)
            .ok_or(RegionError::UnknownDataRateParams)
    }

    fn rx1_data_rate(&self, uplink_dr: u8, rx1_dr_offset: u8) -> Result<u8, RegionError> {
        if uplink_dr as usize >= DATA_RATES.len() {
            return Err(RegionError::UnknownDataRate(uplink_dr));
        }
        Ok(uplink_dr.saturating_sub(rx1_dr_offset))
    }

    fn rx1_frequency(&self, uplink_frequency: u32) -> Result<u32, RegionError> {
        // EU868 answers on the uplink frequency.
        if !(863_000_000..=870_000_000).contains(&uplink_frequency) {
            return Err(RegionError::InvalidFrequency(uplink_frequency));
        }
        Ok(uplink_frequency)
    }

    fn defaults(&self) -> BandDefaults {
        BandDefaults {
            rx1_delay: Duration::from_secs(1),
            rx2_delay: Duration::from_secs(2),
            join_accept_delay1: Duration::from_secs(5),
            join_accept_delay2: Duration::from_secs(6),
            rx2_frequency: 869_525_000,
            rx2_data_rate: 0,
        }
    }

    fn downlink_tx_power(&self, frequency: u32) -> i32 {
        // The 869.4-869.65 MHz sub-band allows 500 mW ERP.
        if (869_400_000..=869_650_000).contains(&frequency) {
            27
        } else {
            14
        }
    }

    fn demodulation_floor(&self, dr: u8) -> f64 {
        match DATA_RATES.get(dr as usize) {
            Some(DataRate::Lora {
                spreading_factor, ..
            }) => match spreading_factor {
                7 => -7.5,
                8 => -10.0,
                9 => -12.5,
                10 => -15.0,
                11 => -17.5,
                _ => -20.0,
            },
            _ => 0.0,
        }
    }

    fn max_mac_payload(&self, dr: u8) -> usize {
        MAX_MAC_PAYLOAD.get(dr as usize).copied().unwrap_or(59)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rx1_mirrors_the_uplink_frequency() {
        assert_eq!(Eu868.rx1_frequency(868_100_000).unwrap(), 868_100_000);
        assert!(Eu868.rx1_frequency(915_000_000).is_err());
    }

    #[test]
    fn rx1_data_rate_applies_the_offset_with_a_floor() {
        assert_eq!(Eu868.rx1_data_rate(5, 0).unwrap(), 5);
        assert_eq!(Eu868.rx1_data_rate(5, 2).unwrap(), 3);
        assert_eq!(Eu868.rx1_data_rate(1, 5).unwrap(), 0);
        assert!(Eu868.rx1_data_rate(8, 0).is_err());
    }

    #[test]
    fn data_rate_table_round_trips() {
        for i in 0..8u8 {
            let dr = Eu868.data_rate(i).unwrap();
            assert_eq!(Eu868.data_rate_index(&dr).unwrap(), i);
        }
        assert!(Eu868.data_rate(8).is_err());
    }

    #[test]
    fn high_power_sub_band_gets_27_dbm() {
        assert_eq!(Eu868.downlink_tx_power(869_525_000), 27);
        assert_eq!(Eu868.downlink_tx_power(868_100_000), 14);
    }
}
