use std::time::Duration;

/// Prefix shared by every key the network server persists.
pub const KEY_PREFIX: &str = "lora:ns:";

/// Key namespace for device-sessions, keyed by hex DevEUI.
pub const DEVICE_SESSION_KEY_PREFIX: &str = "lora:ns:device-session:";
/// Key namespace for the DevAddr -> DevEUI set, keyed by hex DevAddr.
pub const DEV_ADDR_KEY_PREFIX: &str = "lora:ns:devaddr:";
/// Key namespace for de-duplication sets, keyed by uplink fingerprint.
pub const DEDUP_KEY_PREFIX: &str = "lora:ns:dedup:";
/// Key namespace for saved downlink candidate frames.
pub const DOWNLINK_KEY_PREFIX: &str = "lora:ns:downlink:";
/// Key namespace for used OTAA device-nonces, keyed by hex DevEUI.
pub const DEV_NONCE_KEY_PREFIX: &str = "lora:ns:devnonce:";

/// Default window during which gateway copies of one uplink are merged.
pub const DEDUPLICATION_DELAY_DEFAULT: Duration = Duration::from_millis(200);

/// Default device-session expiry after inactivity.
pub const DEVICE_SESSION_TTL_DEFAULT: Duration = Duration::from_secs(31 * 24 * 60 * 60);

/// Default time the remaining downlink candidates stay retrievable for
/// the TX-ack fall-through.
pub const DOWNLINK_FRAMES_TTL_DEFAULT: Duration = Duration::from_secs(10);

/// Default maximum forward gap when extending a 16-bit frame-counter to
/// its 32-bit value.
pub const MAX_FCNT_GAP_DEFAULT: u32 = 16_384;

/// Maximum number of MAC-command bytes that fit in the FOpts field.
pub const MAX_FOPTS_LEN: usize = 15;

/// Number of uplinks kept in the per-device ADR history.
pub const UPLINK_HISTORY_SIZE: usize = 20;

/// Seconds between the Unix epoch and the GPS epoch (1980-01-06).
pub const GPS_EPOCH_OFFSET_SECS: u64 = 315_964_800;

/// Unix-to-GPS leap-second correction (GPS time does not observe leap
/// seconds; 18 have accumulated since 1980).
pub const GPS_LEAP_SECONDS: u64 = 18;

/// Gateway scheduler rejections that trigger the fall-through to the next
/// saved downlink candidate.
pub const RETRYABLE_TX_ACK_ERRORS: [&str; 7] = [
    "TOO_LATE",
    "TOO_EARLY",
    "COLLISION_PACKET",
    "COLLISION_BEACON",
    "TX_FREQ",
    "TX_POWER",
    "GPS_UNLOCKED",
];
