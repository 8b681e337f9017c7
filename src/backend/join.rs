use async_trait::async_trait;

use super::error::BackendError;
use crate::lorawan::{Aes128Key, DevAddr, DevEui};

/// Join / rejoin request forwarded to the join server. The network
/// server assigns the device address; the join server performs the
/// activation cryptography and builds the join-accept.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinRequestContext {
    pub join_eui: [u8; 8],
    pub dev_eui: DevEui,
    pub dev_nonce: u16,
    pub dev_addr: DevAddr,
    /// Raw join-request PHY payload, MIC included.
    pub phy_payload: Vec<u8>,
}

/// Join-server response: the encrypted join-accept plus the session
/// keys derived for this activation.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinAnswer {
    /// Complete join-accept PHY payload, ready for transmission.
    pub phy_payload: Vec<u8>,
    pub nwk_s_key: Aes128Key,
    pub app_s_key: Option<Aes128Key>,
}

/// The join-server collaborator.
#[async_trait]
pub trait JoinBackend: Send + Sync {
    async fn join_request(&self, req: JoinRequestContext) -> Result<JoinAnswer, BackendError>;
}
