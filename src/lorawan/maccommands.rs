//! MAC-command payloads and the FOpts byte-stream codec.
//!
//! Request and answer share one CID byte; which payload a byte
//! introduces depends on the transfer direction, so parsing takes an
//! `uplink` flag.

use serde::{Deserialize, Serialize};

use super::error::PhyError;
use super::types::Cid;

/// LinkADRReq: data-rate / TX-power / channel-mask change request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkAdrReqPayload {
    pub data_rate: u8,
    pub tx_power: u8,
    pub ch_mask: [bool; 16],
    pub ch_mask_cntl: u8,
    pub nb_rep: u8,
}

/// LinkADRAns acknowledgement bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkAdrAnsPayload {
    pub channel_mask_ack: bool,
    pub data_rate_ack: bool,
    pub power_ack: bool,
}

/// RXParamSetupReq: RX1 data-rate offset, RX2 data-rate and frequency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RxParamSetupReqPayload {
    pub rx1_dr_offset: u8,
    pub rx2_data_rate: u8,
    /// RX2 frequency in Hz.
    pub frequency: u32,
}

/// NewChannelReq: create or modify an extra uplink channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewChannelReqPayload {
    pub ch_index: u8,
    /// Channel frequency in Hz.
    pub frequency: u32,
    pub max_dr: u8,
    pub min_dr: u8,
}

/// PingSlotChannelReq: class-B ping-slot frequency and data-rate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingSlotChannelReqPayload {
    /// Ping-slot frequency in Hz.
    pub frequency: u32,
    pub dr: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MacCommand {
    ResetInd { minor: u8 },
    ResetConf { minor: u8 },
    LinkCheckReq,
    LinkCheckAns { margin: u8, gateway_count: u8 },
    LinkAdrReq(LinkAdrReqPayload),
    LinkAdrAns(LinkAdrAnsPayload),
    DutyCycleReq { max_duty_cycle: u8 },
    DutyCycleAns,
    RxParamSetupReq(RxParamSetupReqPayload),
    RxParamSetupAns {
        channel_ack: bool,
        rx2_data_rate_ack: bool,
        rx1_dr_offset_ack: bool,
    },
    DevStatusReq,
    DevStatusAns { battery: u8, margin: i8 },
    NewChannelReq(NewChannelReqPayload),
    NewChannelAns {
        channel_frequency_ok: bool,
        data_rate_range_ok: bool,
    },
    RxTimingSetupReq { delay: u8 },
    RxTimingSetupAns,
    RekeyInd { minor: u8 },
    RekeyConf { minor: u8 },
    DeviceTimeReq,
    DeviceTimeAns {
        /// Seconds since the GPS epoch.
        seconds: u32,
        /// Fractional second in 1/256 s steps.
        fractions: u8,
    },
    RejoinParamSetupReq { max_time_n: u8, max_count_n: u8 },
    RejoinParamSetupAns { time_ok: bool },
    PingSlotInfoReq { periodicity: u8 },
    PingSlotInfoAns,
    PingSlotChannelReq(PingSlotChannelReqPayload),
    PingSlotChannelAns {
        data_rate_ok: bool,
        channel_frequency_ok: bool,
    },
    DeviceModeInd { class: u8 },
    DeviceModeConf { class: u8 },
}

impl MacCommand {
    pub fn cid(&self) -> Cid {
        match self {
            MacCommand::ResetInd { .. } | MacCommand::ResetConf { .. } => Cid::ResetInd,
            MacCommand::LinkCheckReq | MacCommand::LinkCheckAns { .. } => Cid::LinkCheck,
            MacCommand::LinkAdrReq(_) | MacCommand::LinkAdrAns(_) => Cid::LinkAdr,
            MacCommand::DutyCycleReq { .. } | MacCommand::DutyCycleAns => Cid::DutyCycle,
            MacCommand::RxParamSetupReq(_) | MacCommand::RxParamSetupAns { .. } => {
                Cid::RxParamSetup
            }
            MacCommand::DevStatusReq | MacCommand::DevStatusAns { .. } => Cid::DevStatus,
            MacCommand::NewChannelReq(_) | MacCommand::NewChannelAns { .. } => Cid::NewChannel,
            MacCommand::RxTimingSetupReq { .. } | MacCommand::RxTimingSetupAns => {
                Cid::RxTimingSetup
            }
            MacCommand::RekeyInd { .. } | MacCommand::RekeyConf { .. } => Cid::RekeyInd,
            MacCommand::DeviceTimeReq | MacCommand::DeviceTimeAns { .. } => Cid::DeviceTime,
            MacCommand::RejoinParamSetupReq { .. } | MacCommand::RejoinParamSetupAns { .. } => {
                Cid::RejoinParamSetup
            }
            MacCommand::PingSlotInfoReq { .. } | MacCommand::PingSlotInfoAns => Cid::PingSlotInfo,
            MacCommand::PingSlotChannelReq(_) | MacCommand::PingSlotChannelAns { .. } => {
                Cid::PingSlotChannel
            }
            MacCommand::DeviceModeInd { .. } | MacCommand::DeviceModeConf { .. } => Cid::DeviceMode,
        }
    }

    /// True for server-initiated requests that expect a device answer
    /// (and therefore become pending once emitted).
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            MacCommand::LinkAdrReq(_)
                | MacCommand::DutyCycleReq { .. }
                | MacCommand::RxParamSetupReq(_)
                | MacCommand::DevStatusReq
                | MacCommand::NewChannelReq(_)
                | MacCommand::RxTimingSetupReq { .. }
                | MacCommand::RejoinParamSetupReq { .. }
                | MacCommand::PingSlotChannelReq(_)
        )
    }

    /// Encode the command as cid byte plus payload bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut b = vec![self.cid().byte()];
        match self {
            MacCommand::ResetInd { minor }
            | MacCommand::ResetConf { minor }
            | MacCommand::RekeyInd { minor }
            | MacCommand::RekeyConf { minor } => b.push(minor & 0x0f),
            MacCommand::LinkCheckReq
            | MacCommand::DutyCycleAns
            | MacCommand::DevStatusReq
            | MacCommand::RxTimingSetupAns
            | MacCommand::DeviceTimeReq
            | MacCommand::PingSlotInfoAns => {}
            MacCommand::LinkCheckAns {
                margin,
                gateway_count,
            } => {
                b.push(*margin);
                b.push(*gateway_count);
            }
            MacCommand::LinkAdrReq(pl) => {
                b.push((pl.data_rate << 4) | (pl.tx_power & 0x0f));
                let mut mask: u16 = 0;
                for (i, set) in pl.ch_mask.iter().enumerate() {
                    if *set {
                        mask |= 1 << i;
                    }
                }
                b.extend_from_slice(&mask.to_le_bytes());
                b.push((pl.ch_mask_cntl << 4) | (pl.nb_rep & 0x0f));
            }
            MacCommand::LinkAdrAns(pl) => {
                let mut status = 0u8;
                if pl.channel_mask_ack {
                    status |= 0x01;
                }
                if pl.data_rate_ack {
                    status |= 0x02;
                }
                if pl.power_ack {
                    status |= 0x04;
                }
                b.push(status);
            }
            MacCommand::DutyCycleReq { max_duty_cycle } => b.push(max_duty_cycle & 0x0f),
            MacCommand::RxParamSetupReq(pl) => {
                b.push((pl.rx1_dr_offset << 4) | (pl.rx2_data_rate & 0x0f));
                b.extend_from_slice(&encode_frequency(pl.frequency));
            }
            MacCommand::RxParamSetupAns {
                channel_ack,
                rx2_data_rate_ack,
                rx1_dr_offset_ack,
            } => {
                let mut status = 0u8;
                if *channel_ack {
                    status |= 0x01;
                }
                if *rx2_data_rate_ack {
                    status |= 0x02;
                }
                if *rx1_dr_offset_ack {
                    status |= 0x04;
                }
                b.push(status);
            }
            MacCommand::DevStatusAns { battery, margin } => {
                b.push(*battery);
                b.push((*margin as u8) & 0x3f);
            }
            MacCommand::NewChannelReq(pl) => {
                b.push(pl.ch_index);
                b.extend_from_slice(&encode_frequency(pl.frequency));
                b.push((pl.max_dr << 4) | (pl.min_dr & 0x0f));
            }
            MacCommand::NewChannelAns {
                channel_frequency_ok,
                data_rate_range_ok,
            } => {
                let mut status = 0u8;
                if *channel_frequency_ok {
                    status |= 0x01;
                }
                if *data_rate_range_ok {
                    status |= 0x02;
                }
                b.push(status);
            }
            MacCommand::RxTimingSetupReq { delay } => b.push(delay & 0x0f),
            MacCommand::DeviceTimeAns { seconds, fractions } => {
                b.extend_from_slice(&seconds.to_le_bytes());
                b.push(*fractions);
            }
            MacCommand::RejoinParamSetupReq {
                max_time_n,
                max_count_n,
            } => b.push((max_time_n << 4) | (max_count_n & 0x0f)),
            MacCommand::RejoinParamSetupAns { time_ok } => b.push(u8::from(*time_ok)),
            MacCommand::PingSlotInfoReq { periodicity } => b.push(periodicity & 0x07),
            MacCommand::PingSlotChannelReq(pl) => {
                b.extend_from_slice(&encode_frequency(pl.frequency));
                b.push(pl.dr & 0x0f);
            }
            MacCommand::PingSlotChannelAns {
                data_rate_ok,
                channel_frequency_ok,
            } => {
                let mut status = 0u8;
                if *channel_frequency_ok {
                    status |= 0x01;
                }
                if *data_rate_ok {
                    status |= 0x02;
                }
                b.push(status);
            }
            MacCommand::DeviceModeInd { class } | MacCommand::DeviceModeConf { class } => {
                b.push(*class)
            }
        }
        b
    }
}

/// Payload length for a CID in the given direction.
fn payload_len(cid: Cid, uplink: bool) -> usize {
    match (cid, uplink) {
        (Cid::ResetInd, _) => 1,
        (Cid::LinkCheck, true) => 0,
        (Cid::LinkCheck, false) => 2,
        (Cid::LinkAdr, true) => 1,
        (Cid::LinkAdr, false) => 4,
        (Cid::DutyCycle, true) => 0,
        (Cid::DutyCycle, false) => 1,
        (Cid::RxParamSetup, true) => 1,
        (Cid::RxParamSetup, false) => 4,
        (Cid::DevStatus, true) => 2,
        (Cid::DevStatus, false) => 0,
        (Cid::NewChannel, true) => 1,
        (Cid::NewChannel, false) => 5,
        (Cid::RxTimingSetup, true) => 0,
        (Cid::RxTimingSetup, false) => 1,
        (Cid::RekeyInd, _) => 1,
        (Cid::DeviceTime, true) => 0,
        (Cid::DeviceTime, false) => 5,
        (Cid::RejoinParamSetup, _) => 1,
        (Cid::PingSlotInfo, true) => 1,
        (Cid::PingSlotInfo, false) => 0,
        (Cid::PingSlotChannel, true) => 1,
        (Cid::PingSlotChannel, false) => 4,
        (Cid::DeviceMode, _) => 1,
    }
}

fn decode_one(cid: Cid, uplink: bool, p: &[u8]) -> MacCommand {
    match (cid, uplink) {
        (Cid::ResetInd, true) => MacCommand::ResetInd { minor: p[0] & 0x0f },
        (Cid::ResetInd, false) => MacCommand::ResetConf { minor: p[0] & 0x0f },
        (Cid::LinkCheck, true) => MacCommand::LinkCheckReq,
        (Cid::LinkCheck, false) => MacCommand::LinkCheckAns {
            margin: p[0],
            gateway_count: p[1],
        },
        (Cid::LinkAdr, true) => MacCommand::LinkAdrAns(LinkAdrAnsPayload {
            channel_mask_ack: p[0] & 0x01 != 0,
            data_rate_ack: p[0] & 0x02 != 0,
            power_ack: p[0] & 0x04 != 0,
        }),
        (Cid::LinkAdr, false) => {
            let mask = u16::from_le_bytes([p[1], p[2]]);
            let mut ch_mask = [false; 16];
            for (i, slot) in ch_mask.iter_mut().enumerate() {
                *slot = mask & (1 << i) != 0;
            }
            MacCommand::LinkAdrReq(LinkAdrReqPayload {
                data_rate: p[0] >> 4,
                tx_power: p[0] & 0x0f,
                ch_mask,
                ch_mask_cntl: p[3] >> 4,
                nb_rep: p[3] & 0x0f,
            })
        }
        (Cid::DutyCycle, true) => MacCommand::DutyCycleAns,
        (Cid::DutyCycle, false) => MacCommand::DutyCycleReq {
            max_duty_cycle: p[0] & 0x0f,
        },
        (Cid::RxParamSetup, true) => MacCommand::RxParamSetupAns {
            channel_ack: p[0] & 0x01 != 0,
            rx2_data_rate_ack: p[0] & 0x02 != 0,
            rx1_dr_offset_ack: p[0] & 0x04 != 0,
        },
        (Cid::RxParamSetup, false) => MacCommand::RxParamSetupReq(RxParamSetupReqPayload {
            rx1_dr_offset: p[0] >> 4,
            rx2_data_rate: p[0] & 0x0f,
            frequency: decode_frequency([p[1], p[2], p[3]]),
        }),
        (Cid::DevStatus, true) => MacCommand::DevStatusAns {
            battery: p[0],
            margin: sign_extend_margin(p[1]),
        },
        (Cid::DevStatus, false) => MacCommand::DevStatusReq,
        (Cid::NewChannel, true) => MacCommand::NewChannelAns {
            channel_frequency_ok: p[0] & 0x01 != 0,
            data_rate_range_ok: p[0] & 0x02 != 0,
        },
        (Cid::NewChannel, false) => MacCommand::NewChannelReq(NewChannelReqPayload {
            ch_index: p[0],
            frequency: decode_frequency([p[1], p[2], p[3]]),
            max_dr: p[4] >> 4,
            min_dr: p[4] & 0x0f,
        }),
        (Cid::RxTimingSetup, true) => MacCommand::RxTimingSetupAns,
        (Cid::RxTimingSetup, false) => MacCommand::RxTimingSetupReq { delay: p[0] & 0x0f },
        (Cid::RekeyInd, true) => MacCommand::RekeyInd { minor: p[0] & 0x0f },
        (Cid::RekeyInd, false) => MacCommand::RekeyConf { minor: p[0] & 0x0f },
        (Cid::DeviceTime, true) => MacCommand::DeviceTimeReq,
        (Cid::DeviceTime, false) => MacCommand::DeviceTimeAns {
            seconds: u32::from_le_bytes([p[0], p[1], p[2], p[3]]),
            fractions: p[4],
        },
        (Cid::RejoinParamSetup, true) => MacCommand::RejoinParamSetupAns {
            time_ok: p[0] & 0x01 != 0,
        },
        (Cid::RejoinParamSetup, false) => MacCommand::RejoinParamSetupReq {
            max_time_n: p[0] >> 4,
            max_count_n: p[0] & 0x0f,
        },
        (Cid::PingSlotInfo, true) => MacCommand::PingSlotInfoReq {
            periodicity: p[0] & 0x07,
        },
        (Cid::PingSlotInfo, false) => MacCommand::PingSlotInfoAns,
        (Cid::PingSlotChannel, true) => MacCommand::PingSlotChannelAns {
            channel_frequency_ok: p[0] & 0x01 != 0,
            data_rate_ok: p[0] & 0x02 != 0,
        },
        (Cid::PingSlotChannel, false) => MacCommand::PingSlotChannelReq(PingSlotChannelReqPayload {
            frequency: decode_frequency([p[0], p[1], p[2]]),
            dr: p[3] & 0x0f,
        }),
        (Cid::DeviceMode, true) => MacCommand::DeviceModeInd { class: p[0] },
        (Cid::DeviceMode, false) => MacCommand::DeviceModeConf { class: p[0] },
    }
}

/// Parse a MAC-command byte stream (FOpts or FPort-0 FRMPayload).
pub fn parse_mac_commands(uplink: bool, bytes: &[u8]) -> Result<Vec<MacCommand>, PhyError> {
    let mut commands = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let cid = Cid::from_byte(bytes[i]).ok_or(PhyError::UnknownCid(bytes[i]))?;
        i += 1;
        let len = payload_len(cid, uplink);
        if bytes.len() < i + len {
            return Err(PhyError::TruncatedMacCommand { cid: cid.byte() });
        }
        commands.push(decode_one(cid, uplink, &bytes[i..i + len]));
        i += len;
    }
    Ok(commands)
}

/// Encode a slice of MAC commands back into one byte stream.
pub fn encode_mac_commands(commands: &[MacCommand]) -> Vec<u8> {
    let mut out = Vec::new();
    for c in commands {
        out.extend_from_slice(&c.to_bytes());
    }
    out
}

// Frequencies travel as 24-bit little-endian multiples of 100 Hz.
fn encode_frequency(freq_hz: u32) -> [u8; 3] {
    let v = freq_hz / 100;
    [v as u8, (v >> 8) as u8, (v >> 16) as u8]
}

fn decode_frequency(b: [u8; 3]) -> u32 {
    (u32::from(b[0]) | u32::from(b[1]) << 8 | u32::from(b[2]) << 16) * 100
}

// DevStatusAns margin is a 6-bit signed value (-32..31).
fn sign_extend_margin(raw: u8) -> i8 {
    let v = raw & 0x3f;
    if v & 0x20 != 0 {
        (v as i8) - 64
    } else {
        v as i8
    }
}
