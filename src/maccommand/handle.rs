//! Reconciliation of received MAC commands against the device-session:
//! answers settle their pending requests, device-initiated requests get
//! their answers built here.

use std::collections::BTreeSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{debug, info, warn};

use super::error::MacCommandError;
use crate::constants::{GPS_EPOCH_OFFSET_SECS, GPS_LEAP_SECONDS};
use crate::lorawan::{Cid, LinkAdrReqPayload, MacCommand};
use crate::region::{Channel, Region};
use crate::storage::{DeviceSession, MacCommandBlock};
use crate::uplink::RxPacket;

/// Commands a device may send without a pending server request.
pub const DEVICE_INITIATED_CIDS: [Cid; 6] = [
    Cid::DeviceTime,
    Cid::LinkCheck,
    Cid::DeviceMode,
    Cid::ResetInd,
    Cid::RekeyInd,
    Cid::RejoinParamSetup,
];

/// Pluggable ADR policy. The engine records the uplink history the
/// evaluator needs; the algorithm itself is an input.
pub trait AdrEvaluator: Send + Sync {
    /// A LinkADRReq block to queue for the device, or `None` when the
    /// current data-rate and power are considered optimal.
    fn evaluate(&self, ds: &DeviceSession, region: &dyn Region) -> Option<MacCommandBlock>;
}

/// Default evaluator: never requests a change.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAdrEvaluator;

impl AdrEvaluator for NoopAdrEvaluator {
    fn evaluate(&self, _ds: &DeviceSession, _region: &dyn Region) -> Option<MacCommandBlock> {
        None
    }
}

/// Reconcile one received MAC-command block with the session.
///
/// `pending` is the server request the block answers, if any. On a
/// successful reconciliation the pending block for the identifier is
/// removed from the session; `NoPendingCommand` leaves the session
/// untouched. Returned blocks are answers to device-initiated requests
/// received in this uplink.
pub fn handle(
    ds: &mut DeviceSession,
    answer: &MacCommandBlock,
    pending: Option<&MacCommandBlock>,
    rx: &RxPacket,
    region: &dyn Region,
) -> Result<Vec<MacCommandBlock>, MacCommandError> {
    if let Some(p) = pending {
        if p.cid != answer.cid {
            return Err(MacCommandError::PendingCidMismatch {
                pending: p.cid,
                expected: answer.cid,
            });
        }
    } else if !DEVICE_INITIATED_CIDS.contains(&answer.cid) {
        return Err(MacCommandError::NoPendingCommand);
    }

    let responses = match answer.cid {
        Cid::LinkAdr => handle_link_adr_ans(ds, answer, pending)?,
        Cid::PingSlotChannel => handle_ping_slot_channel_ans(ds, answer, pending)?,
        Cid::RxParamSetup => handle_rx_param_setup_ans(ds, answer, pending)?,
        Cid::NewChannel => handle_new_channel_ans(ds, answer, pending)?,
        Cid::RxTimingSetup => handle_rx_timing_setup_ans(ds, answer, pending)?,
        Cid::DevStatus => handle_dev_status_ans(ds, answer)?,
        Cid::DeviceTime => handle_device_time_req(ds),
        Cid::LinkCheck => handle_link_check_req(ds, rx, region),
        Cid::ResetInd | Cid::RekeyInd | Cid::DeviceMode | Cid::RejoinParamSetup => {
            // 1.1 indications are accepted unsolicited and recorded in
            // the logs only.
            debug!(
                "maccommand: unsolicited {:?} acknowledged without state change (dev_eui: {})",
                answer.cid, ds.dev_eui
            );
            Vec::new()
        }
        other => {
            warn!(
                "maccommand: no handler for cid {:?} (dev_eui: {})",
                other, ds.dev_eui
            );
            Vec::new()
        }
    };

    if pending.is_some() {
        ds.clear_pending_mac_command(answer.cid);
    }
    Ok(responses)
}

/// Queue a DevStatusReq when the polling interval elapsed. The caller
/// marks the block pending once it is actually emitted.
pub fn request_device_status(ds: &mut DeviceSession, interval: Duration) -> Option<MacCommandBlock> {
    if interval.is_zero() {
        return None;
    }
    let now = SystemTime::now();
    if let Some(last) = ds.last_device_status_requested {
        if now.duration_since(last).unwrap_or(Duration::ZERO) < interval {
            return None;
        }
    }
    ds.last_device_status_requested = Some(now);
    Some(MacCommandBlock::new(
        Cid::DevStatus,
        vec![MacCommand::DevStatusReq],
    ))
}

fn handle_link_adr_ans(
    ds: &mut DeviceSession,
    answer: &MacCommandBlock,
    pending: Option<&MacCommandBlock>,
) -> Result<Vec<MacCommandBlock>, MacCommandError> {
    let pending = pending.ok_or(MacCommandError::NoPendingCommand)?;
    let reqs: Vec<&LinkAdrReqPayload> = pending
        .commands
        .iter()
        .filter_map(|c| match c {
            MacCommand::LinkAdrReq(pl) => Some(pl),
            _ => None,
        })
        .collect();
    let last_req = *reqs.last().ok_or(MacCommandError::UnexpectedPayload(Cid::LinkAdr))?;
    let ans = answer
        .commands
        .iter()
        .find_map(|c| match c {
            MacCommand::LinkAdrAns(pl) => Some(*pl),
            _ => None,
        })
        .ok_or(MacCommandError::UnexpectedPayload(Cid::LinkAdr))?;

    if ans.channel_mask_ack && ans.data_rate_ack && ans.power_ack {
        ds.enabled_uplink_channels = apply_ch_masks(&ds.enabled_uplink_channels, &reqs);
        ds.dr = last_req.data_rate;
        ds.tx_power_index = last_req.tx_power;
        if last_req.nb_rep > 0 {
            ds.nb_trans = last_req.nb_rep;
        }
        info!(
            "maccommand: link-adr request acknowledged (dev_eui: {}, dr: {}, tx_power: {}, channels: {:?})",
            ds.dev_eui, ds.dr, ds.tx_power_index, ds.enabled_uplink_channels
        );
    } else if !ans.power_ack {
        // The device rejected the requested power index; narrow the
        // supported range so the ADR evaluator stops proposing it.
        if last_req.tx_power == 0 {
            ds.tx_power_index = 1;
            ds.min_supported_tx_power_index = 1;
        } else {
            ds.max_supported_tx_power_index = last_req.tx_power - 1;
        }
        warn!(
            "maccommand: link-adr power nack (dev_eui: {}, requested_tx_power: {})",
            ds.dev_eui, last_req.tx_power
        );
    } else {
        warn!(
            "maccommand: link-adr nack (dev_eui: {}, ch_mask_ack: {}, dr_ack: {})",
            ds.dev_eui, ans.channel_mask_ack, ans.data_rate_ack
        );
    }
    Ok(Vec::new())
}

// Channel-mask blocks address 16 channels each; bits inside an
// addressed block both enable and disable, channels outside stay.
fn apply_ch_masks(current: &[usize], reqs: &[&LinkAdrReqPayload]) -> Vec<usize> {
    let mut enabled: BTreeSet<usize> = current.iter().copied().collect();
    for req in reqs {
        let base = req.ch_mask_cntl as usize * 16;
        for (i, set) in req.ch_mask.iter().enumerate() {
            let index = base + i;
            if *set {
                enabled.insert(index);
            } else {
                enabled.remove(&index);
            }
        }
    }
    enabled.into_iter().collect()
}

fn handle_ping_slot_channel_ans(
    ds: &mut DeviceSession,
    answer: &MacCommandBlock,
    pending: Option<&MacCommandBlock>,
) -> Result<Vec<MacCommandBlock>, MacCommandError> {
    let pending = pending.ok_or(MacCommandError::NoPendingCommand)?;
    let req = pending
        .commands
        .iter()
        .find_map(|c| match c {
            MacCommand::PingSlotChannelReq(pl) => Some(*pl),
            _ => None,
        })
        .ok_or(MacCommandError::UnexpectedPayload(Cid::PingSlotChannel))?;
    let (data_rate_ok, channel_frequency_ok) = answer
        .commands
        .iter()
        .find_map(|c| match c {
            MacCommand::PingSlotChannelAns {
                data_rate_ok,
                channel_frequency_ok,
            } => Some((*data_rate_ok, *channel_frequency_ok)),
            _ => None,
        })
        .ok_or(MacCommandError::UnexpectedPayload(Cid::PingSlotChannel))?;

    // Both fields or neither; a half-applied ping-slot would desync
    // the class-B schedule.
    if data_rate_ok && channel_frequency_ok {
        ds.ping_slot_frequency = req.frequency;
        ds.ping_slot_dr = req.dr;
        info!(
            "maccommand: ping-slot channel acknowledged (dev_eui: {}, frequency: {}, dr: {})",
            ds.dev_eui, req.frequency, req.dr
        );
    } else {
        warn!(
            "maccommand: ping-slot channel nack (dev_eui: {}, dr_ok: {}, freq_ok: {})",
            ds.dev_eui, data_rate_ok, channel_frequency_ok
        );
    }
    Ok(Vec::new())
}

fn handle_rx_param_setup_ans(
    ds: &mut DeviceSession,
    answer: &MacCommandBlock,
    pending: Option<&MacCommandBlock>,
) -> Result<Vec<MacCommandBlock>, MacCommandError> {
    let pending = pending.ok_or(MacCommandError::NoPendingCommand)?;
    let req = pending
        .commands
        .iter()
        .find_map(|c| match c {
            MacCommand::RxParamSetupReq(pl) => Some(*pl),
            _ => None,
        })
        .ok_or(MacCommandError::UnexpectedPayload(Cid::RxParamSetup))?;
    let (channel_ack, rx2_dr_ack, rx1_offset_ack) = answer
        .commands
        .iter()
        .find_map(|c| match c {
            MacCommand::RxParamSetupAns {
                channel_ack,
                rx2_data_rate_ack,
                rx1_dr_offset_ack,
            } => Some((*channel_ack, *rx2_data_rate_ack, *rx1_dr_offset_ack)),
            _ => None,
        })
        .ok_or(MacCommandError::UnexpectedPayload(Cid::RxParamSetup))?;

    if channel_ack && rx2_dr_ack && rx1_offset_ack {
        ds.rx1_dr_offset = req.rx1_dr_offset;
        ds.rx2_dr = req.rx2_data_rate;
        ds.rx2_frequency = req.frequency;
        info!(
            "maccommand: rx-param setup acknowledged (dev_eui: {}, rx1_dr_offset: {}, rx2_dr: {}, rx2_frequency: {})",
            ds.dev_eui, req.rx1_dr_offset, req.rx2_data_rate, req.frequency
        );
    } else {
        warn!(
            "maccommand: rx-param setup nack (dev_eui: {}, channel_ack: {}, rx2_dr_ack: {}, rx1_offset_ack: {})",
            ds.dev_eui, channel_ack, rx2_dr_ack, rx1_offset_ack
        );
    }
    Ok(Vec::new())
}

fn handle_new_channel_ans(
    ds: &mut DeviceSession,
    answer: &MacCommandBlock,
    pending: Option<&MacCommandBlock>,
) -> Result<Vec<MacCommandBlock>, MacCommandError> {
    let pending = pending.ok_or(MacCommandError::NoPendingCommand)?;
    let reqs = pending.commands.iter().filter_map(|c| match c {
        MacCommand::NewChannelReq(pl) => Some(*pl),
        _ => None,
    });
    let answers = answer.commands.iter().filter_map(|c| match c {
        MacCommand::NewChannelAns {
            channel_frequency_ok,
            data_rate_range_ok,
        } => Some((*channel_frequency_ok, *data_rate_range_ok)),
        _ => None,
    });

    // Requests and answers pair up by position within their blocks.
    for (req, (freq_ok, dr_ok)) in reqs.zip(answers) {
        if freq_ok && dr_ok {
            let index = req.ch_index as usize;
            ds.extra_uplink_channels.insert(
                index,
                Channel {
                    frequency: req.frequency,
                    min_dr: req.min_dr,
                    max_dr: req.max_dr,
                },
            );
            if !ds.enabled_uplink_channels.contains(&index) {
                ds.enabled_uplink_channels.push(index);
                ds.enabled_uplink_channels.sort_unstable();
            }
            info!(
                "maccommand: new channel acknowledged (dev_eui: {}, ch_index: {}, frequency: {})",
                ds.dev_eui, req.ch_index, req.frequency
            );
        } else {
            warn!(
                "maccommand: new channel nack (dev_eui: {}, ch_index: {}, freq_ok: {}, dr_ok: {})",
                ds.dev_eui, req.ch_index, freq_ok, dr_ok
            );
        }
    }
    Ok(Vec::new())
}

fn handle_rx_timing_setup_ans(
    ds: &mut DeviceSession,
    _answer: &MacCommandBlock,
    pending: Option<&MacCommandBlock>,
) -> Result<Vec<MacCommandBlock>, MacCommandError> {
    let pending = pending.ok_or(MacCommandError::NoPendingCommand)?;
    let delay = pending
        .commands
        .iter()
        .find_map(|c| match c {
            MacCommand::RxTimingSetupReq { delay } => Some(*delay),
            _ => None,
        })
        .ok_or(MacCommandError::UnexpectedPayload(Cid::RxTimingSetup))?;
    ds.rx_delay = delay;
    info!(
        "maccommand: rx-timing setup acknowledged (dev_eui: {}, delay: {})",
        ds.dev_eui, delay
    );
    Ok(Vec::new())
}

fn handle_dev_status_ans(
    ds: &mut DeviceSession,
    answer: &MacCommandBlock,
) -> Result<Vec<MacCommandBlock>, MacCommandError> {
    let (battery, margin) = answer
        .commands
        .iter()
        .find_map(|c| match c {
            MacCommand::DevStatusAns { battery, margin } => Some((*battery, *margin)),
            _ => None,
        })
        .ok_or(MacCommandError::UnexpectedPayload(Cid::DevStatus))?;
    ds.last_device_status_battery = Some(battery);
    ds.last_device_status_margin = Some(margin);
    info!(
        "maccommand: device-status received (dev_eui: {}, battery: {}, margin: {})",
        ds.dev_eui, battery, margin
    );
    Ok(Vec::new())
}

fn handle_device_time_req(ds: &DeviceSession) -> Vec<MacCommandBlock> {
    let since_unix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    let seconds = since_unix
        .as_secs()
        .saturating_sub(GPS_EPOCH_OFFSET_SECS)
        .saturating_add(GPS_LEAP_SECONDS) as u32;
    let fractions = (u64::from(since_unix.subsec_nanos()) * 256 / 1_000_000_000) as u8;

    debug!(
        "maccommand: answering device-time request (dev_eui: {}, gps_seconds: {})",
        ds.dev_eui, seconds
    );
    vec![MacCommandBlock::new(
        Cid::DeviceTime,
        vec![MacCommand::DeviceTimeAns { seconds, fractions }],
    )]
}

fn handle_link_check_req(
    ds: &DeviceSession,
    rx: &RxPacket,
    region: &dyn Region,
) -> Vec<MacCommandBlock> {
    let best_snr = rx
        .rx_info_set
        .iter()
        .map(|i| i.lora_snr)
        .fold(f64::MIN, f64::max);
    let floor = region.demodulation_floor(rx.dr);
    let margin = (best_snr - floor).max(0.0) as u8;
    let gateway_count = rx.rx_info_set.len().min(255) as u8;

    debug!(
        "maccommand: answering link-check request (dev_eui: {}, margin: {}, gateways: {})",
        ds.dev_eui, margin, gateway_count
    );
    vec![MacCommandBlock::new(
        Cid::LinkCheck,
        vec![MacCommand::LinkCheckAns {
            margin,
            gateway_count,
        }],
    )]
}
