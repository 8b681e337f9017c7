//! Join-request handling. The activation cryptography lives in the
//! join-server collaborator; this pipeline validates the request,
//! assigns the device address, creates the fresh session and schedules
//! the join-accept.

use log::info;
use rand::RngCore;

use super::server::ServerContext;
use super::{Context, RxPacket};
use crate::backend::JoinRequestContext;
use crate::constants::DEV_NONCE_KEY_PREFIX;
use crate::downlink;
use crate::error::Error;
use crate::lorawan::{DevAddr, Payload};
use crate::storage::{self, DeviceGatewayRxInfo, DeviceSession};

pub async fn handle(srv: &ServerContext, ctx: &Context, rx: RxPacket) -> Result<(), Error> {
    let jr = match &rx.phy.payload {
        Payload::JoinRequest(jr) => *jr,
        _ => return Err(Error::BadArgument("expected a join-request payload".into())),
    };

    // a replayed dev-nonce must never re-key the device
    let nonce_key = format!("{}{}", DEV_NONCE_KEY_PREFIX, jr.dev_eui);
    let newly = srv
        .store
        .set_add(
            &nonce_key,
            jr.dev_nonce.to_le_bytes().to_vec(),
            srv.config.device_session_ttl,
        )
        .await?;
    if !newly {
        return Err(Error::Replay(format!(
            "dev-nonce {} already used (dev_eui: {})",
            jr.dev_nonce, jr.dev_eui
        )));
    }

    let dev_addr = random_dev_addr();
    let answer = srv
        .join
        .join_request(JoinRequestContext {
            join_eui: jr.join_eui,
            dev_eui: jr.dev_eui,
            dev_nonce: jr.dev_nonce,
            dev_addr,
            phy_payload: rx.payload_bytes.clone(),
        })
        .await?;

    let ds = new_session(srv, jr.dev_eui, dev_addr, &answer, &rx);
    storage::save_device_session(srv.store.as_ref(), &ds, srv.config.device_session_ttl).await?;
    info!(
        "uplink: device activated (ctx_id: {}, dev_eui: {}, dev_addr: {})",
        ctx, ds.dev_eui, ds.dev_addr
    );

    downlink::join::handle(srv, ctx, &ds, &rx, answer.phy_payload).await
}

pub(crate) fn new_session(
    srv: &ServerContext,
    dev_eui: crate::lorawan::DevEui,
    dev_addr: DevAddr,
    answer: &crate::backend::JoinAnswer,
    rx: &RxPacket,
) -> DeviceSession {
    let defaults = srv.region.defaults();
    DeviceSession {
        dev_eui,
        dev_addr,
        nwk_s_key: answer.nwk_s_key,
        app_s_key: answer.app_s_key,
        enabled_uplink_channels: srv.region.default_enabled_channels(),
        rx2_dr: defaults.rx2_data_rate,
        rx2_frequency: defaults.rx2_frequency,
        last_rx_info_set: rx
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
            .collect(),
        ..DeviceSession::default()
    }
}

pub(crate) fn random_dev_addr() -> DevAddr {
    let mut addr = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut addr);
    DevAddr(addr)
}
