//! Rejoin-request handling: a device re-keys (types 0 and 2) or
//! restores a lost session (type 1) through the join server, exactly
//! like a join but with the rejoin-counter as nonce.

use log::info;

use super::server::ServerContext;
use super::{join, Context, RxPacket};
use crate::backend::JoinRequestContext;
use crate::constants::DEV_NONCE_KEY_PREFIX;
use crate::downlink;
use crate::error::Error;
use crate::lorawan::Payload;
use crate::storage;

pub async fn handle(srv: &ServerContext, ctx: &Context, rx: RxPacket) -> Result<(), Error> {
    let rr = match &rx.phy.payload {
        Payload::RejoinRequest(rr) => *rr,
        _ => {
            return Err(Error::BadArgument(
                "expected a rejoin-request payload".into(),
            ))
        }
    };

    // the rejoin-counter must not repeat within a session lifetime
    let nonce_key = format!("{}{}", DEV_NONCE_KEY_PREFIX, rr.dev_eui);
    let mut member = vec![b'r', rr.rejoin_type];
    member.extend_from_slice(&rr.rj_count.to_le_bytes());
    let newly = srv
        .store
        .set_add(&nonce_key, member, srv.config.device_session_ttl)
        .await?;
    if !newly {
        return Err(Error::Replay(format!(
            "rejoin-count {} already used (dev_eui: {}, type: {})",
            rr.rj_count, rr.dev_eui, rr.rejoin_type
        )));
    }

    let dev_addr = join::random_dev_addr();
    let answer = srv
        .join
        .join_request(JoinRequestContext {
            join_eui: rr.join_eui.unwrap_or_default(),
            dev_eui: rr.dev_eui,
            dev_nonce: rr.rj_count,
            dev_addr,
            phy_payload: rx.payload_bytes.clone(),
        })
        .await?;

    let ds = join::new_session(srv, rr.dev_eui, dev_addr, &answer, &rx);
    storage::save_device_session(srv.store.as_ref(), &ds, srv.config.device_session_ttl).await?;
    info!(
        "uplink: device re-activated (ctx_id: {}, dev_eui: {}, dev_addr: {}, rejoin_type: {})",
        ctx, ds.dev_eui, ds.dev_addr, rr.rejoin_type
    );

    downlink::join::handle(srv, ctx, &ds, &rx, answer.phy_payload).await
}
