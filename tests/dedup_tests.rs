//! Cross-gateway deduplication: one pipeline run per transmission, the
//! merged RX-info set, and idempotence for late duplicates.

mod common;

use std::time::Duration;

use lorans::backend::GatewayId;
use lorans::storage::save_device_session;
use lorans::Config;

use common::*;

#[tokio::test]
async fn two_gateways_one_pipeline_run() {
    let config = Config {
        deduplication_delay: Duration::from_millis(200),
        device_status_req_interval: Duration::ZERO,
        ..Config::default()
    };
    let mut h = start_server(config);

    let ds = test_session(1, 7);
    save_device_session(h.store.as_ref(), &ds, Duration::from_secs(60))
        .await
        .unwrap();

    // identical 23-byte phy payload heard by two gateways, 80 ms apart
    let phy = data_phy_payload(&ds, 0, false, Some(10), vec![0xaa; 10], vec![]);
    assert_eq!(phy.len(), 23);

    h.gateway
        .forward_uplink(uplink_frame(phy.clone(), rx_info(1, 2.0, -80)))
        .await;
    tokio::time::sleep(Duration::from_millis(80)).await;
    h.gateway
        .forward_uplink(uplink_frame(phy.clone(), rx_info(2, 7.5, -50)))
        .await;

    let event = recv_timeout(&mut h.events.uplinks, 1_000)
        .await
        .expect("one application delivery");
    assert_eq!(event.dev_eui, ds.dev_eui);
    assert_eq!(event.f_port, 10);
    assert_eq!(event.f_cnt, 0);

    // both gateways contribute one rx-info entry, best snr first
    assert_eq!(event.rx_info.len(), 2);
    assert_eq!(event.rx_info[0].gateway_id, GatewayId([2; 8]));
    assert_eq!(event.rx_info[0].lora_snr, 7.5);
    assert_eq!(event.rx_info[1].gateway_id, GatewayId([1; 8]));
    assert_eq!(event.rx_info[1].rssi, -80);

    // no second completion for the same fingerprint
    assert!(recv_timeout(&mut h.events.uplinks, 300).await.is_none());
    h.server.stop().await.unwrap();
}

#[tokio::test]
async fn replayed_frame_within_ttl_is_idempotent() {
    let mut h = start_server(fast_config());

    let ds = test_session(2, 8);
    save_device_session(h.store.as_ref(), &ds, Duration::from_secs(60))
        .await
        .unwrap();

    let phy = data_phy_payload(&ds, 0, false, Some(1), b"payload".to_vec(), vec![]);
    h.gateway
        .forward_uplink(uplink_frame(phy.clone(), rx_info(1, 5.0, -60)))
        .await;

    let event = recv_timeout(&mut h.events.uplinks, 1_000)
        .await
        .expect("first delivery");
    assert_eq!(event.f_cnt, 0);

    // the same bytes from the same gateway again, inside the dedup TTL:
    // the completed set swallows them
    h.gateway
        .forward_uplink(uplink_frame(phy.clone(), rx_info(1, 5.0, -60)))
        .await;
    assert!(recv_timeout(&mut h.events.uplinks, 300).await.is_none());

    // and no downlink was scheduled for the unconfirmed uplink either
    assert!(recv_timeout(&mut h.sent, 100).await.is_none());
    h.server.stop().await.unwrap();
}

#[tokio::test]
async fn same_gateway_twice_counts_once_in_the_rx_info_set() {
    let mut h = start_server(fast_config());

    let ds = test_session(3, 9);
    save_device_session(h.store.as_ref(), &ds, Duration::from_secs(60))
        .await
        .unwrap();

    let phy = data_phy_payload(&ds, 0, false, Some(1), vec![0x01], vec![]);
    // a gateway may forward the same reception twice within the window
    h.gateway
        .forward_uplink(uplink_frame(phy.clone(), rx_info(1, 5.0, -60)))
        .await;
    h.gateway
        .forward_uplink(uplink_frame(phy.clone(), rx_info(1, 5.0, -61)))
        .await;

    let event = recv_timeout(&mut h.events.uplinks, 1_000)
        .await
        .expect("delivery");
    assert_eq!(event.rx_info.len(), 1);
    h.server.stop().await.unwrap();
}
