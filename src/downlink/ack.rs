//! Downlink TX-acknowledgement handling: confirm the emission or fall
//! through to the next prepared candidate.

use log::{debug, info, warn};

use crate::backend::DownlinkTxAck;
use crate::constants::RETRYABLE_TX_ACK_ERRORS;
use crate::error::Error;
use crate::storage::{clear_downlink_frames, pop_downlink_frame};
use crate::uplink::server::ServerContext;

pub async fn handle(srv: &ServerContext, ack: &DownlinkTxAck) -> Result<(), Error> {
    if ack.error.is_empty() {
        match clear_downlink_frames(srv.store.as_ref(), ack.token).await? {
            Some(dev_eui) => info!(
                "downlink: tx acknowledged (gateway_id: {}, token: {}, dev_eui: {})",
                ack.gateway_id, ack.token, dev_eui
            ),
            None => debug!(
                "downlink: tx acknowledged for unknown token (gateway_id: {}, token: {})",
                ack.gateway_id, ack.token
            ),
        }
        return Ok(());
    }

    if RETRYABLE_TX_ACK_ERRORS.contains(&ack.error.as_str()) {
        match pop_downlink_frame(srv.store.as_ref(), ack.token, srv.config.downlink_frames_ttl)
            .await?
        {
            Some((dev_eui, frame)) => {
                warn!(
                    "downlink: tx rejected, sending next candidate (gateway_id: {}, token: {}, dev_eui: {}, error: {})",
                    ack.gateway_id, ack.token, dev_eui, ack.error
                );
                srv.gateway.send_tx_packet(frame).await?;
            }
            None => warn!(
                "downlink: tx rejected and no candidates remain (gateway_id: {}, token: {}, error: {})",
                ack.gateway_id, ack.token, ack.error
            ),
        }
        return Ok(());
    }

    // anything else is final for this downlink
    clear_downlink_frames(srv.store.as_ref(), ack.token).await?;
    Err(Error::Fatal(format!(
        "downlink rejected by gateway {}: {}",
        ack.gateway_id, ack.error
    )))
}
