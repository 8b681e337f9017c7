//! Downlink response to a data uplink: builds the RX1/RX2 candidate
//! frames up-front, because a concentrator rejection of RX1 leaves no
//! time to recompute anything.

use std::time::Duration;

use log::warn;

use super::{build_tx_info, send_and_save};
use crate::config::RxWindow;
use crate::constants::MAX_FOPTS_LEN;
use crate::error::Error;
use crate::lorawan::crypto::{encrypt_frm_payload, Direction};
use crate::lorawan::{
    encode_mac_commands, FCtrl, Fhdr, MType, MacPayload, Major, Mhdr, Payload, PhyPayload,
};
use crate::storage::{DeviceSession, MacCommandBlock};
use crate::uplink::server::ServerContext;
use crate::uplink::{Context, RxPacket};
use crate::backend::DownlinkFrame;

/// Build and emit the downlink answering one uplink. Nothing is sent
/// when the uplink was unconfirmed and no MAC blocks are queued.
pub async fn handle_response(
    srv: &ServerContext,
    ctx: &Context,
    ds: &mut DeviceSession,
    rx: &RxPacket,
    ack: bool,
    blocks: Vec<MacCommandBlock>,
) -> Result<(), Error> {
    if !ack && blocks.is_empty() {
        return Ok(());
    }

    let gateway = ds
        .last_rx_info_set
        .first()
        .cloned()
        .ok_or_else(|| Error::PreconditionFailed("no recent rx info".into()))?;

    let rx1_dr = srv.region.rx1_data_rate(rx.dr, ds.rx1_dr_offset)?;
    let defaults = srv.region.defaults();
    let rx2_frequency = if ds.rx2_frequency > 0 {
        ds.rx2_frequency
    } else {
        defaults.rx2_frequency
    };

    // keep the MAC blocks within the tighter of the two windows
    let budget = srv
        .region
        .max_mac_payload(rx1_dr.min(ds.rx2_dr))
        .saturating_sub(8);
    let mut kept: Vec<MacCommandBlock> = Vec::new();
    let mut total = 0;
    for block in blocks {
        let size = block.size();
        if total + size <= budget {
            total += size;
            kept.push(block);
        } else {
            warn!(
                "downlink: mac-command block does not fit the payload budget (ctx_id: {}, dev_eui: {}, cid: {:?})",
                ctx, ds.dev_eui, block.cid
            );
        }
    }
    if !ack && kept.is_empty() {
        return Ok(());
    }

    // emitted requests become pending until the device answers
    for block in &kept {
        if block.commands.iter().any(|c| c.is_request()) {
            ds.set_pending_mac_command(block.clone());
        }
    }

    let mac_bytes: Vec<u8> = kept
        .iter()
        .flat_map(|b| encode_mac_commands(&b.commands))
        .collect();
    let (f_opts, f_port, frm_payload) = if mac_bytes.is_empty() {
        (Vec::new(), None, Vec::new())
    } else if mac_bytes.len() <= MAX_FOPTS_LEN {
        (mac_bytes, None, Vec::new())
    } else {
        let encrypted = encrypt_frm_payload(
            &ds.nwk_s_key,
            Direction::Down,
            ds.dev_addr,
            ds.fcnt_down,
            &mac_bytes,
        );
        (Vec::new(), Some(0), encrypted)
    };

    let mut phy = PhyPayload {
        mhdr: Mhdr {
            mtype: MType::UnconfirmedDataDown,
            major: Major::LoRaWANR1,
        },
        payload: Payload::Mac(MacPayload {
            fhdr: Fhdr {
                dev_addr: ds.dev_addr,
                f_ctrl: FCtrl {
                    ack,
                    ..FCtrl::default()
                },
                f_cnt: ds.fcnt_down as u16,
                f_opts,
            },
            f_port,
            frm_payload,
        }),
        mic: [0; 4],
    };
    phy.set_data_mic(&ds.nwk_s_key, Direction::Down, ds.fcnt_down)?;
    let phy_payload = phy.to_bytes()?;

    let rx1_delay = if ds.rx_delay > 0 {
        Duration::from_secs(u64::from(ds.rx_delay))
    } else {
        defaults.rx1_delay
    };

    let mut frames = Vec::new();
    if matches!(srv.config.rx_window, RxWindow::Both | RxWindow::Rx1) {
        frames.push(DownlinkFrame {
            phy_payload: phy_payload.clone(),
            tx_info: build_tx_info(
                srv,
                &gateway,
                srv.region.rx1_frequency(rx.tx_info.frequency)?,
                rx1_dr,
                rx1_delay,
            )?,
            token: 0,
            downlink_id: [0; 16],
        });
    }
    if matches!(srv.config.rx_window, RxWindow::Both | RxWindow::Rx2) {
        frames.push(DownlinkFrame {
            phy_payload,
            tx_info: build_tx_info(
                srv,
                &gateway,
                rx2_frequency,
                ds.rx2_dr,
                // RX2 opens one second after RX1
                rx1_delay + Duration::from_secs(1),
            )?,
            token: 0,
            downlink_id: [0; 16],
        });
    }

    ds.fcnt_down = ds.fcnt_down.wrapping_add(1);
    send_and_save(srv, ctx, ds.dev_eui, frames).await
}
