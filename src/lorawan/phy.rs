//! PHY payload codec: MHDR, frame header, join/rejoin layouts and the
//! data-frame MIC.
//!
//! Multi-byte fields travel little-endian on the wire; EUIs and device
//! addresses are kept big-endian in memory so they render in their
//! conventional hex order, and are reversed at the wire boundary.

use super::crypto::{self, Direction};
use super::error::PhyError;
use super::types::{Aes128Key, DevAddr, DevEui, MType, Major};

const MIC_LEN: usize = 4;
const MAX_FOPTS: usize = 15;

/// MAC header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mhdr {
    pub mtype: MType,
    pub major: Major,
}

impl Mhdr {
    pub fn from_byte(b: u8) -> Self {
        Mhdr {
            mtype: MType::from_bits(b >> 5),
            major: Major::LoRaWANR1,
        }
    }

    pub fn to_byte(self) -> u8 {
        ((self.mtype as u8) << 5) | (self.major as u8)
    }
}

/// Frame-control byte. `f_pending` doubles as the class-B flag on
/// uplinks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FCtrl {
    pub adr: bool,
    pub adr_ack_req: bool,
    pub ack: bool,
    pub f_pending: bool,
}

impl FCtrl {
    fn from_byte(b: u8) -> (Self, usize) {
        (
            FCtrl {
                adr: b & 0x80 != 0,
                adr_ack_req: b & 0x40 != 0,
                ack: b & 0x20 != 0,
                f_pending: b & 0x10 != 0,
            },
            (b & 0x0f) as usize,
        )
    }

    fn to_byte(self, f_opts_len: usize) -> u8 {
        let mut b = f_opts_len as u8 & 0x0f;
        if self.adr {
            b |= 0x80;
        }
        if self.adr_ack_req {
            b |= 0x40;
        }
        if self.ack {
            b |= 0x20;
        }
        if self.f_pending {
            b |= 0x10;
        }
        b
    }
}

/// Frame header of a data message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fhdr {
    pub dev_addr: DevAddr,
    pub f_ctrl: FCtrl,
    /// Truncated 16-bit frame-counter as received on the wire.
    pub f_cnt: u16,
    /// Raw FOpts bytes (MAC commands, unencrypted in 1.0.x).
    pub f_opts: Vec<u8>,
}

/// MACPayload of a data message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MacPayload {
    pub fhdr: Fhdr,
    pub f_port: Option<u8>,
    pub frm_payload: Vec<u8>,
}

/// Join-request payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinRequestPayload {
    pub join_eui: [u8; 8],
    pub dev_eui: DevEui,
    pub dev_nonce: u16,
}

/// Rejoin-request payload; types 0 and 2 carry a NetID, type 1 a
/// JoinEUI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RejoinRequestPayload {
    pub rejoin_type: u8,
    pub net_id: Option<[u8; 3]>,
    pub join_eui: Option<[u8; 8]>,
    pub dev_eui: DevEui,
    pub rj_count: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Mac(MacPayload),
    JoinRequest(JoinRequestPayload),
    RejoinRequest(RejoinRequestPayload),
    /// Join-accept and proprietary frames pass through opaquely.
    Raw(Vec<u8>),
}

/// A parsed PHY payload.
#[derive(Debug, Clone, PartialEq)]
pub struct PhyPayload {
    pub mhdr: Mhdr,
    pub payload: Payload,
    pub mic: [u8; 4],
}

impl PhyPayload {
    /// Parse a raw PHY payload as received from a gateway.
    pub fn from_bytes(b: &[u8]) -> Result<Self, PhyError> {
        if b.len() < 1 + MIC_LEN {
            return Err(PhyError::TooShort { got: b.len() });
        }
        let mhdr = Mhdr::from_byte(b[0]);
        let mut mic = [0u8; 4];
        mic.copy_from_slice(&b[b.len() - MIC_LEN..]);
        let body = &b[1..b.len() - MIC_LEN];

        let payload = match mhdr.mtype {
            MType::JoinRequest => Payload::JoinRequest(parse_join_request(body)?),
            MType::RejoinRequest => Payload::RejoinRequest(parse_rejoin_request(body)?),
            MType::UnconfirmedDataUp
            | MType::ConfirmedDataUp
            | MType::UnconfirmedDataDown
            | MType::ConfirmedDataDown => Payload::Mac(parse_mac_payload(body)?),
            MType::JoinAccept | MType::Proprietary => Payload::Raw(body.to_vec()),
        };

        Ok(PhyPayload { mhdr, payload, mic })
    }

    /// Serialize, including the stored MIC.
    pub fn to_bytes(&self) -> Result<Vec<u8>, PhyError> {
        let mut out = self.bytes_without_mic()?;
        out.extend_from_slice(&self.mic);
        Ok(out)
    }

    fn bytes_without_mic(&self) -> Result<Vec<u8>, PhyError> {
        let mut out = vec![self.mhdr.to_byte()];
        match &self.payload {
            Payload::Mac(mac) => {
                if mac.fhdr.f_opts.len() > MAX_FOPTS {
                    return Err(PhyError::FOptsTooLong(mac.fhdr.f_opts.len()));
                }
                out.extend(mac.fhdr.dev_addr.as_bytes().iter().rev());
                out.push(mac.fhdr.f_ctrl.to_byte(mac.fhdr.f_opts.len()));
                out.extend_from_slice(&mac.fhdr.f_cnt.to_le_bytes());
                out.extend_from_slice(&mac.fhdr.f_opts);
                if let Some(port) = mac.f_port {
                    out.push(port);
                    out.extend_from_slice(&mac.frm_payload);
                }
            }
            Payload::JoinRequest(jr) => {
                out.extend(jr.join_eui.iter().rev());
                out.extend(jr.dev_eui.as_bytes().iter().rev());
                out.extend_from_slice(&jr.dev_nonce.to_le_bytes());
            }
            Payload::RejoinRequest(rr) => {
                out.push(rr.rejoin_type);
                if let Some(net_id) = rr.net_id {
                    out.extend(net_id.iter().rev());
                }
                if let Some(join_eui) = rr.join_eui {
                    out.extend(join_eui.iter().rev());
                }
                out.extend(rr.dev_eui.as_bytes().iter().rev());
                out.extend_from_slice(&rr.rj_count.to_le_bytes());
            }
            Payload::Raw(raw) => out.extend_from_slice(raw),
        }
        Ok(out)
    }

    /// Compute and store the data-frame MIC.
    pub fn set_data_mic(
        &mut self,
        key: &Aes128Key,
        dir: Direction,
        full_fcnt: u32,
    ) -> Result<(), PhyError> {
        let mac = match &self.payload {
            Payload::Mac(mac) => mac,
            _ => return Err(PhyError::UnexpectedPayload { expected: "mac" }),
        };
        let dev_addr = mac.fhdr.dev_addr;
        let msg = self.bytes_without_mic()?;
        self.mic = crypto::compute_data_mic(key, dir, dev_addr, full_fcnt, &msg);
        Ok(())
    }
}

/// Validate the MIC of a raw uplink data frame against the 32-bit
/// extended frame-counter.
pub fn validate_uplink_data_mic(
    key: &Aes128Key,
    dev_addr: DevAddr,
    full_fcnt: u32,
    raw_phy: &[u8],
) -> bool {
    if raw_phy.len() < 1 + MIC_LEN {
        return false;
    }
    let (msg, mic) = raw_phy.split_at(raw_phy.len() - MIC_LEN);
    crypto::compute_data_mic(key, Direction::Up, dev_addr, full_fcnt, msg) == mic
}

fn parse_mac_payload(b: &[u8]) -> Result<MacPayload, PhyError> {
    if b.len() < 7 {
        return Err(PhyError::TooShort { got: b.len() + 5 });
    }
    let dev_addr = DevAddr([b[3], b[2], b[1], b[0]]);
    let (f_ctrl, f_opts_len) = FCtrl::from_byte(b[4]);
    let f_cnt = u16::from_le_bytes([b[5], b[6]]);
    if b.len() < 7 + f_opts_len {
        return Err(PhyError::TooShort { got: b.len() + 5 });
    }
    let f_opts = b[7..7 + f_opts_len].to_vec();

    let rest = &b[7 + f_opts_len..];
    let (f_port, frm_payload) = if rest.is_empty() {
        (None, Vec::new())
    } else {
        (Some(rest[0]), rest[1..].to_vec())
    };

    Ok(MacPayload {
        fhdr: Fhdr {
            dev_addr,
            f_ctrl,
            f_cnt,
            f_opts,
        },
        f_port,
        frm_payload,
    })
}

fn parse_join_request(b: &[u8]) -> Result<JoinRequestPayload, PhyError> {
    if b.len() != 18 {
        return Err(PhyError::TooShort { got: b.len() + 5 });
    }
    let mut join_eui = [0u8; 8];
    let mut dev_eui = [0u8; 8];
    for i in 0..8 {
        join_eui[i] = b[7 - i];
        dev_eui[i] = b[15 - i];
    }
    Ok(JoinRequestPayload {
        join_eui,
        dev_eui: DevEui(dev_eui),
        dev_nonce: u16::from_le_bytes([b[16], b[17]]),
    })
}

fn parse_rejoin_request(b: &[u8]) -> Result<RejoinRequestPayload, PhyError> {
    if b.is_empty() {
        return Err(PhyError::TooShort { got: 5 });
    }
    match b[0] {
        t @ (0 | 2) => {
            if b.len() != 14 {
                return Err(PhyError::TooShort { got: b.len() + 5 });
            }
            let net_id = [b[3], b[2], b[1]];
            let mut dev_eui = [0u8; 8];
            for i in 0..8 {
                dev_eui[i] = b[11 - i];
            }
            Ok(RejoinRequestPayload {
                rejoin_type: t,
                net_id: Some(net_id),
                join_eui: None,
                dev_eui: DevEui(dev_eui),
                rj_count: u16::from_le_bytes([b[12], b[13]]),
            })
        }
        1 => {
            if b.len() != 19 {
                return Err(PhyError::TooShort { got: b.len() + 5 });
            }
            let mut join_eui = [0u8; 8];
            let mut dev_eui = [0u8; 8];
            for i in 0..8 {
                join_eui[i] = b[8 - i];
                dev_eui[i] = b[16 - i];
            }
            Ok(RejoinRequestPayload {
                rejoin_type: 1,
                net_id: None,
                join_eui: Some(join_eui),
                dev_eui: DevEui(dev_eui),
                rj_count: u16::from_le_bytes([b[17], b[18]]),
            })
        }
        t => Err(PhyError::UnknownRejoinType(t)),
    }
}
