//! Remaining downlink candidates, saved between the first transmission
//! attempt and the gateway's TX acknowledgement so the fall-through can
//! emit the next frame without recomputing anything.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::StorageError;
use super::store::Store;
use crate::backend::DownlinkFrame;
use crate::constants::DOWNLINK_KEY_PREFIX;
use crate::lorawan::DevEui;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownlinkFrames {
    pub dev_eui: DevEui,
    pub token: u16,
    pub frames: Vec<DownlinkFrame>,
}

fn frames_key(dev_eui: DevEui, token: u16) -> String {
    format!("{}{}:{}", DOWNLINK_KEY_PREFIX, dev_eui, token)
}

// The TX acknowledgement only carries the token; this pointer entry
// resolves it back to the (DevEUI, token) key.
fn token_key(token: u16) -> String {
    format!("{}token:{}", DOWNLINK_KEY_PREFIX, token)
}

/// Persist the not-yet-attempted candidates of one downlink set.
pub async fn save_downlink_frames(
    store: &dyn Store,
    dev_eui: DevEui,
    token: u16,
    frames: Vec<DownlinkFrame>,
    ttl: Duration,
) -> Result<(), StorageError> {
    let envelope = DownlinkFrames {
        dev_eui,
        token,
        frames,
    };
    let encoded = rmp_serde::to_vec(&envelope)?;
    store.put(&frames_key(dev_eui, token), encoded, ttl).await?;
    store
        .put(&token_key(token), dev_eui.0.to_vec(), ttl)
        .await?;
    Ok(())
}

/// Pop the next saved candidate for the token, re-persisting the rest.
/// Returns `None` when nothing remains.
pub async fn pop_downlink_frame(
    store: &dyn Store,
    token: u16,
    ttl: Duration,
) -> Result<Option<(DevEui, DownlinkFrame)>, StorageError> {
    let dev_eui = match lookup_dev_eui(store, token).await? {
        Some(eui) => eui,
        None => return Ok(None),
    };

    let key = frames_key(dev_eui, token);
    let mut envelope: DownlinkFrames = match store.get(&key).await? {
        Some(raw) => rmp_serde::from_slice(&raw)?,
        None => return Ok(None),
    };
    if envelope.frames.is_empty() {
        clear_downlink_frames(store, token).await?;
        return Ok(None);
    }

    let frame = envelope.frames.remove(0);
    if envelope.frames.is_empty() {
        clear_downlink_frames(store, token).await?;
    } else {
        let encoded = rmp_serde::to_vec(&envelope)?;
        store.put(&key, encoded, ttl).await?;
    }
    Ok(Some((dev_eui, frame)))
}

/// Drop the saved candidates for the token. Returns the owning DevEUI
/// when the entry still existed.
pub async fn clear_downlink_frames(
    store: &dyn Store,
    token: u16,
) -> Result<Option<DevEui>, StorageError> {
    let dev_eui = match lookup_dev_eui(store, token).await? {
        Some(eui) => eui,
        None => return Ok(None),
    };
    store.del(&frames_key(dev_eui, token)).await?;
    store.del(&token_key(token)).await?;
    Ok(Some(dev_eui))
}

async fn lookup_dev_eui(store: &dyn Store, token: u16) -> Result<Option<DevEui>, StorageError> {
    match store.get(&token_key(token)).await? {
        Some(raw) if raw.len() == 8 => {
            let mut eui = [0u8; 8];
            eui.copy_from_slice(&raw);
            Ok(Some(DevEui(eui)))
        }
        Some(_) => Err(StorageError::Encoding(
            "downlink token pointer has an invalid length".into(),
        )),
        None => Ok(None),
    }
}
