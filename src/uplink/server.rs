//! The two long-lived consumers and the per-message task fan-out.

use std::sync::{Arc, Mutex};

use log::{debug, error, info};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

use super::{collect_and_call_once, data, join, proprietary, rejoin, Context};
use crate::backend::{
    ApplicationBackend, DownlinkTxAck, GatewayBackend, JoinBackend, UplinkFrame,
};
use crate::config::Config;
use crate::downlink;
use crate::error::Error;
use crate::lorawan::MType;
use crate::maccommand::{AdrEvaluator, NoopAdrEvaluator};
use crate::region::Region;
use crate::storage::Store;
use crate::uplink::RxPacket;

/// Everything a pipeline run needs, shared across tasks.
pub(crate) struct ServerContext {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub gateway: Arc<dyn GatewayBackend>,
    pub application: Arc<dyn ApplicationBackend>,
    pub join: Arc<dyn JoinBackend>,
    pub region: Arc<dyn Region>,
    pub adr: Arc<dyn AdrEvaluator>,
}

/// The network-server core: drains the gateway backend's uplink and
/// TX-ack channels and handles every message in its own task.
pub struct NetworkServer {
    ctx: Arc<ServerContext>,
    consumers: Mutex<Vec<JoinHandle<()>>>,
}

impl NetworkServer {
    pub fn new(
        config: Config,
        store: Arc<dyn Store>,
        gateway: Arc<dyn GatewayBackend>,
        application: Arc<dyn ApplicationBackend>,
        join: Arc<dyn JoinBackend>,
        region: Arc<dyn Region>,
    ) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            ctx: Arc::new(ServerContext {
                config,
                store,
                gateway,
                application,
                join,
                region,
                adr: Arc::new(NoopAdrEvaluator),
            }),
            consumers: Mutex::new(Vec::new()),
        })
    }

    /// Replace the default no-op ADR evaluator.
    pub fn with_adr_evaluator(self, adr: Arc<dyn AdrEvaluator>) -> Self {
        let ctx = &self.ctx;
        Self {
            ctx: Arc::new(ServerContext {
                config: ctx.config.clone(),
                store: ctx.store.clone(),
                gateway: ctx.gateway.clone(),
                application: ctx.application.clone(),
                join: ctx.join.clone(),
                region: ctx.region.clone(),
                adr,
            }),
            consumers: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the uplink and TX-ack consumers.
    pub fn start(&self) -> Result<(), Error> {
        let uplinks = self
            .ctx
            .gateway
            .take_uplink_frames()
            .ok_or_else(|| Error::Fatal("uplink channel already taken".into()))?;
        let acks = self
            .ctx
            .gateway
            .take_downlink_tx_acks()
            .ok_or_else(|| Error::Fatal("downlink tx-ack channel already taken".into()))?;

        let mut consumers = lock_consumers(&self.consumers);
        consumers.push(tokio::spawn(uplink_consumer(self.ctx.clone(), uplinks)));
        consumers.push(tokio::spawn(ack_consumer(self.ctx.clone(), acks)));
        info!("uplink: server started");
        Ok(())
    }

    /// Close the gateway backend and wait for every in-flight pipeline
    /// task to complete. In-flight frames finish on their own.
    pub async fn stop(&self) -> Result<(), Error> {
        self.ctx.gateway.close().await;
        info!("uplink: waiting for pending actions to complete");
        let handles: Vec<JoinHandle<()>> = lock_consumers(&self.consumers).drain(..).collect();
        for handle in handles {
            if let Err(err) = handle.await {
                error!("uplink: consumer task join error: {}", err);
            }
        }
        Ok(())
    }
}

fn lock_consumers(m: &Mutex<Vec<JoinHandle<()>>>) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

async fn uplink_consumer(srv: Arc<ServerContext>, mut frames: mpsc::Receiver<UplinkFrame>) {
    let mut tasks = JoinSet::new();
    while let Some(frame) = frames.recv().await {
        let srv = srv.clone();
        tasks.spawn(async move { handle_uplink_frame(srv, frame).await });
        while tasks.try_join_next().is_some() {}
    }
    // channel closed; hold shutdown until the spawned runs finish
    while tasks.join_next().await.is_some() {}
    debug!("uplink: frame consumer exited");
}

async fn ack_consumer(srv: Arc<ServerContext>, mut acks: mpsc::Receiver<DownlinkTxAck>) {
    let mut tasks = JoinSet::new();
    while let Some(ack) = acks.recv().await {
        let srv = srv.clone();
        tasks.spawn(async move { handle_downlink_tx_ack(srv, ack).await });
        while tasks.try_join_next().is_some() {}
    }
    while tasks.join_next().await.is_some() {}
    debug!("uplink: tx-ack consumer exited");
}

async fn handle_uplink_frame(srv: Arc<ServerContext>, frame: UplinkFrame) {
    let ctx = Context::new();
    let gateway_id = frame.rx_info.gateway_id;

    let result = collect_and_call_once(
        srv.store.as_ref(),
        srv.region.as_ref(),
        srv.config.deduplication_delay,
        frame,
        |rx| dispatch(srv.clone(), ctx, rx),
    )
    .await;

    if let Err(err) = result {
        if err.is_silent() {
            debug!(
                "uplink: frame dropped (ctx_id: {}, gateway_id: {}): {}",
                ctx, gateway_id, err
            );
        } else {
            error!(
                "uplink: processing uplink frame error (ctx_id: {}, gateway_id: {}): {}",
                ctx, gateway_id, err
            );
        }
    }
}

async fn dispatch(srv: Arc<ServerContext>, ctx: Context, rx: RxPacket) -> Result<(), Error> {
    info!(
        "uplink: frame(s) collected (ctx_id: {}, mtype: {:?}, gateways: {})",
        ctx,
        rx.phy.mhdr.mtype,
        rx.rx_info_set.len()
    );

    match rx.phy.mhdr.mtype {
        MType::JoinRequest => join::handle(&srv, &ctx, rx).await,
        MType::RejoinRequest => rejoin::handle(&srv, &ctx, rx).await,
        MType::UnconfirmedDataUp | MType::ConfirmedDataUp => data::handle(&srv, &ctx, rx).await,
        MType::Proprietary => proprietary::handle(&srv, &ctx, rx).await,
        other => {
            debug!(
                "uplink: ignoring frame with mtype {:?} (ctx_id: {})",
                other, ctx
            );
            Ok(())
        }
    }
}

async fn handle_downlink_tx_ack(srv: Arc<ServerContext>, ack: DownlinkTxAck) {
    let ctx = Context { id: ack.downlink_id };
    if let Err(err) = downlink::ack::handle(&srv, &ack).await {
        error!(
            "uplink: handle downlink tx-ack error (ctx_id: {}, gateway_id: {}, token: {}): {}",
            ctx, ack.gateway_id, ack.token, err
        );
    }
}
