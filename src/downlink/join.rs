//! Join-accept scheduling: the same RX1/RX2 candidate set as a data
//! downlink, with the join-specific delays and the join-server's
//! ready-made PHY payload.

use super::{build_tx_info, send_and_save};
use crate::backend::DownlinkFrame;
use crate::config::RxWindow;
use crate::error::Error;
use crate::storage::{DeviceGatewayRxInfo, DeviceSession};
use crate::uplink::server::ServerContext;
use crate::uplink::{Context, RxPacket};

pub async fn handle(
    srv: &ServerContext,
    ctx: &Context,
    ds: &DeviceSession,
    rx: &RxPacket,
    join_accept: Vec<u8>,
) -> Result<(), Error> {
    let gateway = rx
        .rx_info_set
        .first()
        .map(|i| DeviceGatewayRxInfo {
            gateway_id: i.gateway_id,
            rssi: i.rssi,
            lora_snr: i.lora_snr,
            board: i.board,
            antenna: i.antenna,
            context: i.context.clone(),
        })
        .ok_or_else(|| Error::PreconditionFailed("no recent rx info".into()))?;

    let defaults = srv.region.defaults();
    let mut frames = Vec::new();
    if matches!(srv.config.rx_window, RxWindow::Both | RxWindow::Rx1) {
        frames.push(DownlinkFrame {
            phy_payload: join_accept.clone(),
            tx_info: build_tx_info(
                srv,
                &gateway,
                srv.region.rx1_frequency(rx.tx_info.frequency)?,
                srv.region.rx1_data_rate(rx.dr, 0)?,
                defaults.join_accept_delay1,
            )?,
            token: 0,
            downlink_id: [0; 16],
        });
    }
    if matches!(srv.config.rx_window, RxWindow::Both | RxWindow::Rx2) {
        frames.push(DownlinkFrame {
            phy_payload: join_accept,
            tx_info: build_tx_info(
                srv,
                &gateway,
                defaults.rx2_frequency,
                defaults.rx2_data_rate,
                defaults.join_accept_delay2,
            )?,
            token: 0,
            downlink_id: [0; 16],
        });
    }

    send_and_save(srv, ctx, ds.dev_eui, frames).await
}
