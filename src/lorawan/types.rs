use std::fmt;

use serde::{Deserialize, Serialize};

/// 8-byte device identifier, stable for the lifetime of the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DevEui(pub [u8; 8]);

impl DevEui {
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl fmt::Display for DevEui {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// 4-byte short device address assigned at join, not globally unique.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DevAddr(pub [u8; 4]);

impl DevAddr {
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for DevAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// 128-bit AES key (session keys, application key).
#[derive(Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aes128Key(pub [u8; 16]);

impl Aes128Key {
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

// Keys are deliberately not rendered in Debug/log output.
impl fmt::Debug for Aes128Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Aes128Key(****)")
    }
}

/// Message type carried in the MHDR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MType {
    JoinRequest = 0b000,
    JoinAccept = 0b001,
    UnconfirmedDataUp = 0b010,
    UnconfirmedDataDown = 0b011,
    ConfirmedDataUp = 0b100,
    ConfirmedDataDown = 0b101,
    RejoinRequest = 0b110,
    Proprietary = 0b111,
}

impl MType {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0b000 => MType::JoinRequest,
            0b001 => MType::JoinAccept,
            0b010 => MType::UnconfirmedDataUp,
            0b011 => MType::UnconfirmedDataDown,
            0b100 => MType::ConfirmedDataUp,
            0b101 => MType::ConfirmedDataDown,
            0b110 => MType::RejoinRequest,
            _ => MType::Proprietary,
        }
    }
}

/// LoRaWAN major version bits in the MHDR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Major {
    LoRaWANR1 = 0b00,
}

/// MAC-command identifier byte.
///
/// Request and answer share one identifier; the transfer direction
/// disambiguates which payload the byte introduces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Cid {
    ResetInd = 0x01,
    LinkCheck = 0x02,
    LinkAdr = 0x03,
    DutyCycle = 0x04,
    RxParamSetup = 0x05,
    DevStatus = 0x06,
    NewChannel = 0x07,
    RxTimingSetup = 0x08,
    RekeyInd = 0x0b,
    DeviceTime = 0x0d,
    RejoinParamSetup = 0x0f,
    PingSlotInfo = 0x10,
    PingSlotChannel = 0x11,
    DeviceMode = 0x20,
}

impl Cid {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Cid::ResetInd),
            0x02 => Some(Cid::LinkCheck),
            0x03 => Some(Cid::LinkAdr),
            0x04 => Some(Cid::DutyCycle),
            0x05 => Some(Cid::RxParamSetup),
            0x06 => Some(Cid::DevStatus),
            0x07 => Some(Cid::NewChannel),
            0x08 => Some(Cid::RxTimingSetup),
            0x0b => Some(Cid::RekeyInd),
            0x0d => Some(Cid::DeviceTime),
            0x0f => Some(Cid::RejoinParamSetup),
            0x10 => Some(Cid::PingSlotInfo),
            0x11 => Some(Cid::PingSlotChannel),
            0x20 => Some(Cid::DeviceMode),
            _ => None,
        }
    }

    pub fn byte(&self) -> u8 {
        *self as u8
    }
}

/// Class of operation of an end-device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceClass {
    A,
    B,
    C,
}

impl Default for DeviceClass {
    fn default() -> Self {
        DeviceClass::A
    }
}
