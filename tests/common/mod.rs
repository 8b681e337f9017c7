//! Shared fixtures: mock gateway/application/join backends and PHY
//! frame builders used by the integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use lorans::backend::{
    ApplicationBackend, BackendError, DeviceStatusEvent, DownlinkFrame, DownlinkTxAck,
    GatewayBackend, GatewayId, JoinAnswer, JoinBackend, JoinRequestContext, Modulation,
    ProprietaryUplinkEvent, UplinkEvent, UplinkFrame, UplinkRxInfo, UplinkTxInfo,
};
use lorans::lorawan::crypto::Direction;
use lorans::lorawan::phy::{FCtrl, Fhdr, MacPayload, Mhdr, Payload, PhyPayload};
use lorans::lorawan::{Aes128Key, DevAddr, DevEui, MType, Major};
use lorans::region::Eu868;
use lorans::storage::DeviceSession;
use lorans::{Config, MemoryStore, NetworkServer};

pub struct MockGateway {
    uplink_tx: Mutex<Option<mpsc::Sender<UplinkFrame>>>,
    ack_tx: Mutex<Option<mpsc::Sender<DownlinkTxAck>>>,
    uplink_rx: Mutex<Option<mpsc::Receiver<UplinkFrame>>>,
    ack_rx: Mutex<Option<mpsc::Receiver<DownlinkTxAck>>>,
    sent_tx: mpsc::UnboundedSender<DownlinkFrame>,
}

impl MockGateway {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<DownlinkFrame>) {
        let (uplink_tx, uplink_rx) = mpsc::channel(16);
        let (ack_tx, ack_rx) = mpsc::channel(16);
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                uplink_tx: Mutex::new(Some(uplink_tx)),
                ack_tx: Mutex::new(Some(ack_tx)),
                uplink_rx: Mutex::new(Some(uplink_rx)),
                ack_rx: Mutex::new(Some(ack_rx)),
                sent_tx,
            }),
            sent_rx,
        )
    }

    pub async fn forward_uplink(&self, frame: UplinkFrame) {
        let tx = self.uplink_tx.lock().unwrap().clone();
        tx.expect("gateway closed").send(frame).await.unwrap();
    }

    pub async fn forward_tx_ack(&self, ack: DownlinkTxAck) {
        let tx = self.ack_tx.lock().unwrap().clone();
        tx.expect("gateway closed").send(ack).await.unwrap();
    }
}

#[async_trait]
impl GatewayBackend for MockGateway {
    fn take_uplink_frames(&self) -> Option<mpsc::Receiver<UplinkFrame>> {
        self.uplink_rx.lock().unwrap().take()
    }

    fn take_downlink_tx_acks(&self) -> Option<mpsc::Receiver<DownlinkTxAck>> {
        self.ack_rx.lock().unwrap().take()
    }

    async fn send_tx_packet(&self, frame: DownlinkFrame) -> Result<(), BackendError> {
        self.sent_tx
            .send(frame)
            .map_err(|_| BackendError::Send("sent-frame receiver dropped".into()))
    }

    async fn close(&self) {
        self.uplink_tx.lock().unwrap().take();
        self.ack_tx.lock().unwrap().take();
    }
}

pub struct MockApplication {
    uplink_tx: mpsc::UnboundedSender<UplinkEvent>,
    status_tx: mpsc::UnboundedSender<DeviceStatusEvent>,
    proprietary_tx: mpsc::UnboundedSender<ProprietaryUplinkEvent>,
}

pub struct MockApplicationEvents {
    pub uplinks: mpsc::UnboundedReceiver<UplinkEvent>,
    pub statuses: mpsc::UnboundedReceiver<DeviceStatusEvent>,
    pub proprietary: mpsc::UnboundedReceiver<ProprietaryUplinkEvent>,
}

impl MockApplication {
    pub fn new() -> (Arc<Self>, MockApplicationEvents) {
        let (uplink_tx, uplinks) = mpsc::unbounded_channel();
        let (status_tx, statuses) = mpsc::unbounded_channel();
        let (proprietary_tx, proprietary) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                uplink_tx,
                status_tx,
                proprietary_tx,
            }),
            MockApplicationEvents {
                uplinks,
                statuses,
                proprietary,
            },
        )
    }
}

#[async_trait]
impl ApplicationBackend for MockApplication {
    async fn handle_uplink_data(&self, event: UplinkEvent) -> Result<(), BackendError> {
        self.uplink_tx
            .send(event)
            .map_err(|_| BackendError::Application("receiver dropped".into()))
    }

    async fn handle_proprietary_uplink(
        &self,
        event: ProprietaryUplinkEvent,
    ) -> Result<(), BackendError> {
        self.proprietary_tx
            .send(event)
            .map_err(|_| BackendError::Application("receiver dropped".into()))
    }

    async fn handle_device_status(&self, event: DeviceStatusEvent) -> Result<(), BackendError> {
        self.status_tx
            .send(event)
            .map_err(|_| BackendError::Application("receiver dropped".into()))
    }
}

pub struct MockJoinServer {
    pub nwk_s_key: Aes128Key,
    pub join_accept: Vec<u8>,
    request_tx: mpsc::UnboundedSender<JoinRequestContext>,
}

impl MockJoinServer {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<JoinRequestContext>) {
        let (request_tx, requests) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                nwk_s_key: Aes128Key([0x42; 16]),
                join_accept: vec![0x20; 17],
                request_tx,
            }),
            requests,
        )
    }
}

#[async_trait]
impl JoinBackend for MockJoinServer {
    async fn join_request(&self, req: JoinRequestContext) -> Result<JoinAnswer, BackendError> {
        self.request_tx
            .send(req)
            .map_err(|_| BackendError::Join("receiver dropped".into()))?;
        Ok(JoinAnswer {
            phy_payload: self.join_accept.clone(),
            nwk_s_key: self.nwk_s_key,
            app_s_key: None,
        })
    }
}

pub struct Harness {
    pub server: NetworkServer,
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<MockGateway>,
    pub sent: mpsc::UnboundedReceiver<DownlinkFrame>,
    pub events: MockApplicationEvents,
    pub join_requests: mpsc::UnboundedReceiver<JoinRequestContext>,
    pub join_server: Arc<MockJoinServer>,
}

pub fn start_server(config: Config) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let (gateway, sent) = MockGateway::new();
    let (application, events) = MockApplication::new();
    let (join_server, join_requests) = MockJoinServer::new();

    let server = NetworkServer::new(
        config,
        store.clone(),
        gateway.clone(),
        application,
        join_server.clone(),
        Arc::new(Eu868),
    )
    .expect("server construction failed");
    server.start().expect("server start failed");

    Harness {
        server,
        store,
        gateway,
        sent,
        events,
        join_requests,
        join_server,
    }
}

/// Config with a short deduplication window to keep the tests fast.
/// Device-status polling is disabled so downlinks carry only what the
/// test itself provokes.
pub fn fast_config() -> Config {
    Config {
        deduplication_delay: Duration::from_millis(50),
        device_status_req_interval: Duration::ZERO,
        ..Config::default()
    }
}

pub fn test_session(dev_eui: u8, dev_addr: u8) -> DeviceSession {
    DeviceSession {
        dev_eui: DevEui([dev_eui; 8]),
        dev_addr: DevAddr([dev_addr; 4]),
        nwk_s_key: Aes128Key([0x42; 16]),
        enabled_uplink_channels: vec![0, 1, 2],
        ..DeviceSession::default()
    }
}

pub fn rx_info(gateway: u8, snr: f64, rssi: i32) -> UplinkRxInfo {
    UplinkRxInfo {
        gateway_id: GatewayId([gateway; 8]),
        rssi,
        lora_snr: snr,
        board: 0,
        antenna: 0,
        context: vec![0xde, 0xad],
    }
}

pub fn uplink_tx_info() -> UplinkTxInfo {
    UplinkTxInfo {
        frequency: 868_100_000,
        modulation: Modulation::Lora {
            // data-rate index 5 in EU868
            spreading_factor: 7,
            bandwidth: 125_000,
            polarization_inversion: false,
        },
    }
}

/// Raw data-uplink PHY payload with a valid MIC for the session.
pub fn data_phy_payload(
    ds: &DeviceSession,
    fcnt: u32,
    confirmed: bool,
    f_port: Option<u8>,
    frm_payload: Vec<u8>,
    f_opts: Vec<u8>,
) -> Vec<u8> {
    let mut phy = PhyPayload {
        mhdr: Mhdr {
            mtype: if confirmed {
                MType::ConfirmedDataUp
            } else {
                MType::UnconfirmedDataUp
            },
            major: Major::LoRaWANR1,
        },
        payload: Payload::Mac(MacPayload {
            fhdr: Fhdr {
                dev_addr: ds.dev_addr,
                f_ctrl: FCtrl::default(),
                f_cnt: fcnt as u16,
                f_opts,
            },
            f_port,
            frm_payload,
        }),
        mic: [0; 4],
    };
    phy.set_data_mic(&ds.nwk_s_key, Direction::Up, fcnt)
        .expect("mic");
    phy.to_bytes().expect("serialize")
}

pub fn uplink_frame(phy_payload: Vec<u8>, rx: UplinkRxInfo) -> UplinkFrame {
    UplinkFrame {
        phy_payload,
        tx_info: uplink_tx_info(),
        rx_info: rx,
    }
}

/// Receive with a timeout, returning `None` when nothing arrives.
pub async fn recv_timeout<T>(rx: &mut mpsc::UnboundedReceiver<T>, ms: u64) -> Option<T> {
    tokio::time::timeout(Duration::from_millis(ms), rx.recv())
        .await
        .ok()
        .flatten()
}
