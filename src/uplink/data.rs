//! Pipeline for Unconfirmed/ConfirmedDataUp frames: session election by
//! MIC, frame-counter validation, FRMPayload handling, MAC-command
//! reconciliation, application delivery and the downlink response.

use std::time::Duration;

use log::{debug, info, warn};

use super::server::ServerContext;
use super::{Context, RxPacket};
use crate::backend::{DeviceStatusEvent, UplinkEvent};
use crate::constants::DEVICE_SESSION_KEY_PREFIX;
use crate::downlink;
use crate::error::Error;
use crate::lorawan::crypto::{encrypt_frm_payload, Direction};
use crate::lorawan::phy::validate_uplink_data_mic;
use crate::lorawan::{parse_mac_commands, Cid, MType, MacCommand, MacPayload, Payload};
use crate::maccommand;
use crate::storage::{
    self, acquire_lock, DeviceGatewayRxInfo, DeviceSession, MacCommandBlock, UplinkHistory,
};

pub async fn handle(srv: &ServerContext, ctx: &Context, rx: RxPacket) -> Result<(), Error> {
    let mac = match &rx.phy.payload {
        Payload::Mac(mac) => mac.clone(),
        _ => return Err(Error::BadArgument("expected a mac payload".into())),
    };
    let dev_addr = mac.fhdr.dev_addr;

    // Short addresses are not unique; the session whose keys produce a
    // valid MIC owns the frame.
    let sessions =
        storage::get_device_sessions_for_dev_addr(srv.store.as_ref(), dev_addr).await?;
    if sessions.is_empty() {
        return Err(Error::NotFound(format!(
            "no device-session for dev_addr {}",
            dev_addr
        )));
    }
    let dev_eui = match elect_session(&sessions, &mac, &rx.payload_bytes) {
        Some(ds) => ds.dev_eui,
        None => {
            return Err(Error::Replay(format!(
                "mic does not match any device-session for dev_addr {}",
                dev_addr
            )))
        }
    };

    // Overlapping uplinks from one device serialize on the session
    // lock; the session is re-read inside it.
    let lock_key = format!("{}{}:lock", DEVICE_SESSION_KEY_PREFIX, dev_eui);
    acquire_lock(
        srv.store.as_ref(),
        &lock_key,
        Duration::from_secs(3),
        Duration::from_secs(1),
    )
    .await?;
    let result = handle_locked(srv, ctx, &rx, &mac, dev_eui).await;
    let _ = srv.store.del(&lock_key).await;
    result
}

fn elect_session<'a>(
    sessions: &'a [DeviceSession],
    mac: &MacPayload,
    payload_bytes: &[u8],
) -> Option<&'a DeviceSession> {
    sessions.iter().find(|ds| {
        let full = ds.extended_fcnt_up(mac.fhdr.f_cnt);
        validate_uplink_data_mic(&ds.nwk_s_key, ds.dev_addr, full, payload_bytes)
    })
}

async fn handle_locked(
    srv: &ServerContext,
    ctx: &Context,
    rx: &RxPacket,
    mac: &MacPayload,
    dev_eui: crate::lorawan::DevEui,
) -> Result<(), Error> {
    let mut ds = storage::get_device_session(srv.store.as_ref(), dev_eui).await?;

    // re-validate under the lock; a concurrent run may have advanced
    // the counter
    let full_fcnt = ds.extended_fcnt_up(mac.fhdr.f_cnt);
    if !validate_uplink_data_mic(&ds.nwk_s_key, ds.dev_addr, full_fcnt, &rx.payload_bytes) {
        return Err(Error::Replay(format!(
            "mic does not match device-session {} under lock",
            ds.dev_eui
        )));
    }
    let gap = full_fcnt.wrapping_sub(ds.fcnt_up);
    if gap > srv.config.max_fcnt_gap {
        return Err(Error::Replay(format!(
            "frame-counter {} outside the accepted window (expected >= {}, max gap {})",
            full_fcnt, ds.fcnt_up, srv.config.max_fcnt_gap
        )));
    }

    let confirmed = rx.phy.mhdr.mtype == MType::ConfirmedDataUp;
    let (mac_commands, app_payload) = decode_frm_payload(&ds, mac, full_fcnt);

    // reconcile every received MAC-command block; a failing block is
    // logged and must not abort the rest of the uplink
    let mut response_blocks: Vec<MacCommandBlock> = Vec::new();
    let mut saw_device_status = false;
    for block in group_mac_commands(mac_commands) {
        if block.cid == Cid::DevStatus {
            saw_device_status = true;
        }
        let pending = ds.pending_mac_command(block.cid).cloned();
        match maccommand::handle(&mut ds, &block, pending.as_ref(), rx, srv.region.as_ref()) {
            Ok(responses) => response_blocks.extend(responses),
            Err(err) => warn!(
                "uplink: handle mac-command block error (ctx_id: {}, dev_eui: {}, cid: {:?}): {}",
                ctx, ds.dev_eui, block.cid, err
            ),
        }
    }

    // the uplink is accepted from here on
    ds.fcnt_up = full_fcnt.wrapping_add(1);
    let max_snr = rx
        .rx_info_set
        .iter()
        .map(|i| i.lora_snr)
        .fold(f64::MIN, f64::max);
    ds.append_uplink_history(UplinkHistory {
        f_cnt: full_fcnt,
        max_snr,
        tx_power_index: ds.tx_power_index,
        gateway_count: rx.rx_info_set.len(),
    });
    ds.last_rx_info_set = rx
        .rx_info_set
        .iter()
        .map(|i| DeviceGatewayRxInfo {
            gateway_id: i.gateway_id,
            rssi: i.rssi,
            lora_snr: i.lora_snr,
            board: i.board,
            antenna: i.antenna,
            context: i.context.clone(),
        })
        .collect();

    if saw_device_status {
        forward_device_status(srv, ctx, &ds).await;
    }

    if let Some((f_port, data)) = app_payload {
        let event = UplinkEvent {
            dev_eui: ds.dev_eui,
            dev_addr: ds.dev_addr,
            f_port,
            f_cnt: full_fcnt,
            confirmed,
            dr: rx.dr,
            frequency: rx.tx_info.frequency,
            data,
            rx_info: rx.rx_info_set.clone(),
        };
        if let Err(err) = srv.application.handle_uplink_data(event).await {
            // the frame still counts against the frame-counter
            warn!(
                "uplink: application delivery error (ctx_id: {}, dev_eui: {}): {}",
                ctx, ds.dev_eui, err
            );
        }
    }

    // server-initiated requests ride along with the device answers
    if let Some(block) =
        maccommand::request_device_status(&mut ds, srv.config.device_status_req_interval)
    {
        response_blocks.push(block);
    }
    if let Some(block) = srv.adr.evaluate(&ds, srv.region.as_ref()) {
        response_blocks.push(block);
    }

    if let Err(err) = downlink::data::handle_response(srv, ctx, &mut ds, rx, confirmed, response_blocks).await
    {
        warn!(
            "uplink: schedule downlink response error (ctx_id: {}, dev_eui: {}): {}",
            ctx, ds.dev_eui, err
        );
    }

    storage::save_device_session(srv.store.as_ref(), &ds, srv.config.device_session_ttl).await?;
    info!(
        "uplink: data frame processed (ctx_id: {}, dev_eui: {}, f_cnt: {}, confirmed: {})",
        ctx, ds.dev_eui, full_fcnt, confirmed
    );
    Ok(())
}

/// Split the frame into MAC commands and the application payload.
/// FPort 0 carries encrypted MAC commands; FPort > 0 carries
/// application data with optional FOpts MAC commands in the header.
fn decode_frm_payload(
    ds: &DeviceSession,
    mac: &MacPayload,
    full_fcnt: u32,
) -> (Vec<MacCommand>, Option<(u8, Vec<u8>)>) {
    let mut mac_bytes: Option<Vec<u8>> = None;
    let mut app_payload = None;

    match mac.f_port {
        Some(0) => {
            if !mac.fhdr.f_opts.is_empty() {
                warn!(
                    "uplink: fopts are not allowed next to an fport-0 frm-payload (dev_eui: {})",
                    ds.dev_eui
                );
            }
            mac_bytes = Some(encrypt_frm_payload(
                &ds.nwk_s_key,
                Direction::Up,
                ds.dev_addr,
                full_fcnt,
                &mac.frm_payload,
            ));
        }
        Some(f_port) => {
            let data = match &ds.app_s_key {
                Some(key) => encrypt_frm_payload(
                    key,
                    Direction::Up,
                    ds.dev_addr,
                    full_fcnt,
                    &mac.frm_payload,
                ),
                // without the application key the payload is forwarded
                // as received
                None => mac.frm_payload.clone(),
            };
            app_payload = Some((f_port, data));
            if !mac.fhdr.f_opts.is_empty() {
                mac_bytes = Some(mac.fhdr.f_opts.clone());
            }
        }
        None => {
            if !mac.fhdr.f_opts.is_empty() {
                mac_bytes = Some(mac.fhdr.f_opts.clone());
            }
        }
    }

    let mac_commands = match mac_bytes {
        Some(bytes) => match parse_mac_commands(true, &bytes) {
            Ok(commands) => commands,
            // the payload is still delivered; no MAC downlink is built
            Err(err) => {
                warn!(
                    "uplink: parse mac-commands error (dev_eui: {}): {}",
                    ds.dev_eui, err
                );
                Vec::new()
            }
        },
        None => Vec::new(),
    };
    (mac_commands, app_payload)
}

/// Group a parsed command stream into per-CID blocks, preserving order.
fn group_mac_commands(commands: Vec<MacCommand>) -> Vec<MacCommandBlock> {
    let mut blocks: Vec<MacCommandBlock> = Vec::new();
    for command in commands {
        match blocks.last_mut() {
            Some(block) if block.cid == command.cid() => block.commands.push(command),
            _ => blocks.push(MacCommandBlock::new(command.cid(), vec![command])),
        }
    }
    blocks
}

async fn forward_device_status(srv: &ServerContext, ctx: &Context, ds: &DeviceSession) {
    let (battery, margin) = match (ds.last_device_status_battery, ds.last_device_status_margin) {
        (Some(battery), Some(margin)) => (battery, margin),
        _ => return,
    };
    let event = DeviceStatusEvent {
        dev_eui: ds.dev_eui,
        battery,
        margin,
    };
    if let Err(err) = srv.application.handle_device_status(event).await {
        warn!(
            "uplink: forward device-status error (ctx_id: {}, dev_eui: {}): {}",
            ctx, ds.dev_eui, err
        );
    } else {
        debug!(
            "uplink: device-status forwarded (ctx_id: {}, dev_eui: {})",
            ctx, ds.dev_eui
        );
    }
}
