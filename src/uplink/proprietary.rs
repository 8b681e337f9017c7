//! Proprietary frames bypass the LoRaWAN MAC layer entirely; they are
//! forwarded raw, with their RX metadata, to the application server.

use log::info;

use super::server::ServerContext;
use super::{Context, RxPacket};
use crate::backend::ProprietaryUplinkEvent;
use crate::error::Error;

pub async fn handle(srv: &ServerContext, ctx: &Context, rx: RxPacket) -> Result<(), Error> {
    srv.application
        .handle_proprietary_uplink(ProprietaryUplinkEvent {
            phy_payload: rx.payload_bytes.clone(),
            tx_info: rx.tx_info.clone(),
            rx_info: rx.rx_info_set.clone(),
        })
        .await?;

    info!(
        "uplink: proprietary frame forwarded (ctx_id: {}, gateways: {})",
        ctx,
        rx.rx_info_set.len()
    );
    Ok(())
}
