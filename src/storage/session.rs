//! The per-device session: the central mutable entity of the network
//! server, leased by value into the uplink pipeline and written back at
//! the end of a run.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use log::debug;
use serde::{Deserialize, Serialize};

use super::error::StorageError;
use super::store::Store;
use crate::backend::GatewayId;
use crate::constants::{DEVICE_SESSION_KEY_PREFIX, DEV_ADDR_KEY_PREFIX, UPLINK_HISTORY_SIZE};
use crate::lorawan::{Aes128Key, Cid, DevAddr, DevEui, DeviceClass, MacCommand};
use crate::region::Channel;

/// Ordered MAC commands sharing one command identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacCommandBlock {
    pub cid: Cid,
    pub commands: Vec<MacCommand>,
}

impl MacCommandBlock {
    pub fn new(cid: Cid, commands: Vec<MacCommand>) -> Self {
        Self { cid, commands }
    }

    /// Encoded size in bytes, CID bytes included.
    pub fn size(&self) -> usize {
        self.commands.iter().map(|c| c.to_bytes().len()).sum()
    }
}

/// Reception metadata of one gateway for the device's last uplink.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceGatewayRxInfo {
    pub gateway_id: GatewayId,
    pub rssi: i32,
    pub lora_snr: f64,
    pub board: u32,
    pub antenna: u32,
    pub context: Vec<u8>,
}

/// One entry of the bounded ADR history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UplinkHistory {
    pub f_cnt: u32,
    pub max_snr: f64,
    pub tx_power_index: u8,
    pub gateway_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceSession {
    pub dev_eui: DevEui,
    pub dev_addr: DevAddr,
    pub nwk_s_key: Aes128Key,
    pub app_s_key: Option<Aes128Key>,

    /// Next expected uplink frame-counter.
    pub fcnt_up: u32,
    pub fcnt_down: u32,

    pub enabled_uplink_channels: Vec<usize>,
    /// Channels added through NewChannelReq, by channel index.
    pub extra_uplink_channels: HashMap<usize, Channel>,
    pub dr: u8,
    pub tx_power_index: u8,
    pub min_supported_tx_power_index: u8,
    pub max_supported_tx_power_index: u8,
    pub nb_trans: u8,

    pub rx1_dr_offset: u8,
    pub rx2_dr: u8,
    pub rx2_frequency: u32,
    /// RXTimingSetup delay in seconds (0 reads as 1).
    pub rx_delay: u8,

    pub ping_slot_frequency: u32,
    pub ping_slot_dr: u8,
    pub device_class: DeviceClass,

    /// At most one pending MAC-command block per command identifier.
    pub pending_mac_commands: HashMap<Cid, MacCommandBlock>,

    pub last_rx_info_set: Vec<DeviceGatewayRxInfo>,
    pub last_device_status_requested: Option<SystemTime>,
    pub last_device_status_battery: Option<u8>,
    pub last_device_status_margin: Option<i8>,

    pub uplink_history: Vec<UplinkHistory>,
}

impl DeviceSession {
    /// Reassemble the 32-bit frame-counter from its 16-bit wire value,
    /// using the stored upper bits. Wraps through zero at 2^32.
    pub fn extended_fcnt_up(&self, truncated: u16) -> u32 {
        let expected = self.fcnt_up;
        let full = (expected & 0xffff_0000) | u32::from(truncated);
        if full < expected {
            full.wrapping_add(0x1_0000)
        } else {
            full
        }
    }

    /// Append one uplink to the bounded ADR history. A retransmission
    /// of the same counter only refreshes the recorded SNR.
    pub fn append_uplink_history(&mut self, entry: UplinkHistory) {
        if let Some(last) = self.uplink_history.last_mut() {
            if last.f_cnt == entry.f_cnt {
                if entry.max_snr > last.max_snr {
                    *last = entry;
                }
                return;
            }
        }
        self.uplink_history.push(entry);
        if self.uplink_history.len() > UPLINK_HISTORY_SIZE {
            let excess = self.uplink_history.len() - UPLINK_HISTORY_SIZE;
            self.uplink_history.drain(..excess);
        }
    }

    pub fn pending_mac_command(&self, cid: Cid) -> Option<&MacCommandBlock> {
        self.pending_mac_commands.get(&cid)
    }

    /// Store the block as pending, replacing any previous one for the
    /// same identifier.
    pub fn set_pending_mac_command(&mut self, block: MacCommandBlock) {
        self.pending_mac_commands.insert(block.cid, block);
    }

    pub fn clear_pending_mac_command(&mut self, cid: Cid) {
        self.pending_mac_commands.remove(&cid);
    }
}

fn session_key(dev_eui: DevEui) -> String {
    format!("{}{}", DEVICE_SESSION_KEY_PREFIX, dev_eui)
}

fn dev_addr_key(dev_addr: DevAddr) -> String {
    format!("{}{}", DEV_ADDR_KEY_PREFIX, dev_addr)
}

/// Persist the session and register its DevEUI under the DevAddr set.
pub async fn save_device_session(
    store: &dyn Store,
    ds: &DeviceSession,
    ttl: Duration,
) -> Result<(), StorageError> {
    let encoded = rmp_serde::to_vec(ds)?;
    store.put(&session_key(ds.dev_eui), encoded, ttl).await?;
    store
        .set_add(&dev_addr_key(ds.dev_addr), ds.dev_eui.0.to_vec(), ttl)
        .await?;
    debug!(
        "storage: device-session saved (dev_eui: {}, dev_addr: {})",
        ds.dev_eui, ds.dev_addr
    );
    Ok(())
}

pub async fn get_device_session(
    store: &dyn Store,
    dev_eui: DevEui,
) -> Result<DeviceSession, StorageError> {
    match store.get(&session_key(dev_eui)).await? {
        Some(raw) => Ok(rmp_serde::from_slice(&raw)?),
        None => Err(StorageError::NotFound(format!(
            "device-session {}",
            dev_eui
        ))),
    }
}

/// All sessions currently claiming the short address. Several devices
/// may share one DevAddr; the caller elects the owner by MIC.
pub async fn get_device_sessions_for_dev_addr(
    store: &dyn Store,
    dev_addr: DevAddr,
) -> Result<Vec<DeviceSession>, StorageError> {
    let mut sessions = Vec::new();
    for member in store.set_members(&dev_addr_key(dev_addr)).await? {
        if member.len() != 8 {
            continue;
        }
        let mut eui = [0u8; 8];
        eui.copy_from_slice(&member);
        match get_device_session(store, DevEui(eui)).await {
            Ok(ds) if ds.dev_addr == dev_addr => sessions.push(ds),
            // expired or re-addressed since it was registered
            Ok(_) | Err(StorageError::NotFound(_)) => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(sessions)
}

pub async fn delete_device_session(
    store: &dyn Store,
    dev_eui: DevEui,
) -> Result<(), StorageError> {
    store.del(&session_key(dev_eui)).await
}
