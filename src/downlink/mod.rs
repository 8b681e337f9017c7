pub mod ack;
pub mod data;
pub mod join;

use std::time::Duration;

use log::info;
use rand::Rng;

use crate::backend::{DownlinkFrame, DownlinkTiming, DownlinkTxInfo, Modulation};
use crate::error::Error;
use crate::lorawan::DevEui;
use crate::region::DataRate;
use crate::storage::{save_downlink_frames, DeviceGatewayRxInfo};
use crate::uplink::Context;

use crate::uplink::server::ServerContext;

/// Transmission parameters for one receive-window candidate.
pub(crate) fn build_tx_info(
    srv: &ServerContext,
    gateway: &DeviceGatewayRxInfo,
    frequency: u32,
    dr_index: u8,
    delay: Duration,
) -> Result<DownlinkTxInfo, Error> {
    let dr = srv.region.data_rate(dr_index)?;
    let power = if srv.config.downlink_tx_power >= 0 {
        srv.config.downlink_tx_power
    } else {
        srv.region.downlink_tx_power(frequency)
    };
    Ok(DownlinkTxInfo {
        gateway_id: gateway.gateway_id,
        frequency,
        power,
        modulation: to_modulation(dr),
        board: gateway.board,
        antenna: gateway.antenna,
        context: gateway.context.clone(),
        timing: DownlinkTiming::Delay { delay },
    })
}

fn to_modulation(dr: DataRate) -> Modulation {
    match dr {
        DataRate::Lora {
            spreading_factor,
            bandwidth,
        } => Modulation::Lora {
            spreading_factor,
            bandwidth,
            // downlinks are transmitted with inverted polarity
            polarization_inversion: true,
        },
        DataRate::Fsk { bitrate } => Modulation::Fsk { bitrate },
    }
}

/// Emit the first candidate and persist the rest for the TX-ack
/// fall-through. One token is drawn for the whole set so the
/// acknowledgement matches whichever candidate ends up on air.
pub(crate) async fn send_and_save(
    srv: &ServerContext,
    ctx: &Context,
    dev_eui: DevEui,
    mut frames: Vec<DownlinkFrame>,
) -> Result<(), Error> {
    if frames.is_empty() {
        return Ok(());
    }
    let token: u16 = rand::thread_rng().gen();
    for frame in &mut frames {
        frame.token = token;
        frame.downlink_id = ctx.id;
    }

    let first = frames.remove(0);
    let gateway_id = first.tx_info.gateway_id;
    let frequency = first.tx_info.frequency;

    // persist the fall-through candidates before the first emission;
    // the gateway's rejection can arrive arbitrarily fast
    if !frames.is_empty() {
        save_downlink_frames(
            srv.store.as_ref(),
            dev_eui,
            token,
            frames,
            srv.config.downlink_frames_ttl,
        )
        .await?;
    }
    srv.gateway.send_tx_packet(first).await?;

    info!(
        "downlink: frame sent (ctx_id: {}, dev_eui: {}, gateway_id: {}, token: {}, frequency: {})",
        ctx, dev_eui, gateway_id, token, frequency
    );
    Ok(())
}
