//! Cross-gateway deduplication: merges the gateway copies of one
//! transmission into a single pipeline run.

use std::cmp::Ordering;
use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use sha2::{Digest, Sha256};

use crate::backend::{Modulation, UplinkFrame, UplinkRxInfo};
use crate::constants::DEDUP_KEY_PREFIX;
use crate::error::Error;
use crate::lorawan::PhyPayload;
use crate::region::{DataRate, Region};
use crate::storage::Store;
use crate::uplink::RxPacket;

/// Register a gateway copy of an uplink and guarantee that exactly one
/// `f` invocation happens per fingerprint per deduplication window.
///
/// The first arrival creates the shared set and claims the collection
/// lock; the claimant sleeps out the window, assembles the merged
/// [`RxPacket`] and runs the callback. Later copies only append to the
/// set. The set outlives the window so a late duplicate cannot trigger
/// a second completion.
pub async fn collect_and_call_once<F, Fut>(
    store: &dyn Store,
    region: &dyn Region,
    deduplication_delay: Duration,
    frame: UplinkFrame,
    f: F,
) -> Result<(), Error>
where
    F: FnOnce(RxPacket) -> Fut,
    Fut: Future<Output = Result<(), Error>>,
{
    if frame.phy_payload.is_empty() {
        return Err(Error::BadArgument("empty phy payload".into()));
    }

    let fingerprint = hex::encode(Sha256::digest(&frame.phy_payload));
    let key = format!("{}{}", DEDUP_KEY_PREFIX, fingerprint);
    let lock_key = format!("{}:lock", key);
    // window plus margin, so late duplicates still land in the set
    let ttl = deduplication_delay * 2;

    let member = rmp_serde::to_vec(&frame)
        .map_err(|err| Error::Fatal(format!("encode uplink frame error: {}", err)))?;
    store.set_add(&key, member, ttl).await?;

    if !store.lock(&lock_key, ttl).await? {
        debug!(
            "uplink: frame already collected (fingerprint: {}, gateway_id: {})",
            fingerprint, frame.rx_info.gateway_id
        );
        return Ok(());
    }

    tokio::time::sleep(deduplication_delay).await;

    let members = store.set_members(&key).await?;
    let mut frames = Vec::with_capacity(members.len());
    for raw in members {
        match rmp_serde::from_slice::<UplinkFrame>(&raw) {
            Ok(frame) => frames.push(frame),
            Err(err) => warn!(
                "uplink: discarding undecodable deduplication-set member (fingerprint: {}): {}",
                fingerprint, err
            ),
        }
    }
    if frames.is_empty() {
        return Err(Error::Transient(format!(
            "deduplication set {} expired before collection",
            fingerprint
        )));
    }

    let rx_packet = assemble_rx_packet(region, frames)?;
    f(rx_packet).await
}

fn assemble_rx_packet(region: &dyn Region, mut frames: Vec<UplinkFrame>) -> Result<RxPacket, Error> {
    frames.sort_by(|a, b| compare_rx_info(&a.rx_info, &b.rx_info));
    // one entry per distinct gateway, best copy wins
    let mut seen = Vec::with_capacity(frames.len());
    frames.retain(|f| {
        if seen.contains(&f.rx_info.gateway_id) {
            false
        } else {
            seen.push(f.rx_info.gateway_id);
            true
        }
    });

    let best = frames.remove(0);
    let phy = PhyPayload::from_bytes(&best.phy_payload)?;
    let dr = region.data_rate_index(&data_rate_from_modulation(&best.tx_info.modulation))?;

    let mut rx_info_set = vec![best.rx_info];
    rx_info_set.extend(frames.into_iter().map(|f| f.rx_info));

    Ok(RxPacket {
        phy,
        payload_bytes: best.phy_payload,
        tx_info: best.tx_info,
        rx_info_set,
        dr,
    })
}

/// Best gateway first: highest SNR, then highest RSSI, then the
/// lexicographically smallest gateway id.
pub(crate) fn compare_rx_info(a: &UplinkRxInfo, b: &UplinkRxInfo) -> Ordering {
    b.lora_snr
        .partial_cmp(&a.lora_snr)
        .unwrap_or(Ordering::Equal)
        .then(b.rssi.cmp(&a.rssi))
        .then(a.gateway_id.cmp(&b.gateway_id))
}

fn data_rate_from_modulation(modulation: &Modulation) -> DataRate {
    match modulation {
        Modulation::Lora {
            spreading_factor,
            bandwidth,
            ..
        } => DataRate::Lora {
            spreading_factor: *spreading_factor,
            bandwidth: *bandwidth,
        },
        Modulation::Fsk { bitrate } => DataRate::Fsk { bitrate: *bitrate },
    }
}
