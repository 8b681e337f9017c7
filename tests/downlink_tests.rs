//! RX1/RX2 candidate construction and the TX-ack fall-through.

mod common;

use std::time::Duration;

use lorans::backend::{DownlinkTiming, DownlinkTxAck, GatewayId, Modulation};
use lorans::storage::{get_device_session, pop_downlink_frame, save_device_session};

use common::*;

#[tokio::test]
async fn confirmed_uplink_gets_an_rx1_downlink_with_a_prepared_rx2() {
    let mut h = start_server(fast_config());

    let ds = test_session(1, 7);
    save_device_session(h.store.as_ref(), &ds, Duration::from_secs(60))
        .await
        .unwrap();

    let phy = data_phy_payload(&ds, 0, true, Some(1), b"ping".to_vec(), vec![]);
    h.gateway
        .forward_uplink(uplink_frame(phy, rx_info(9, 5.0, -60)))
        .await;

    let rx1 = recv_timeout(&mut h.sent, 1_000).await.expect("rx1 frame");
    // RX1 answers on the uplink frequency through the receiving gateway
    assert_eq!(rx1.tx_info.gateway_id, GatewayId([9; 8]));
    assert_eq!(rx1.tx_info.frequency, 868_100_000);
    assert_eq!(
        rx1.tx_info.modulation,
        Modulation::Lora {
            spreading_factor: 7,
            bandwidth: 125_000,
            polarization_inversion: true,
        }
    );
    assert_eq!(
        rx1.tx_info.timing,
        DownlinkTiming::Delay {
            delay: Duration::from_secs(1)
        }
    );

    // the RX2 candidate is already persisted under the same token
    let (dev_eui, rx2) = pop_downlink_frame(h.store.as_ref(), rx1.token, Duration::from_secs(5))
        .await
        .unwrap()
        .expect("rx2 candidate saved");
    assert_eq!(dev_eui, ds.dev_eui);
    assert_eq!(rx2.token, rx1.token);
    assert_eq!(rx2.tx_info.frequency, 869_525_000);
    assert_eq!(
        rx2.tx_info.timing,
        DownlinkTiming::Delay {
            delay: Duration::from_secs(2)
        }
    );
    // prepared up-front from the same payload
    assert_eq!(rx2.phy_payload, rx1.phy_payload);
    assert_eq!(rx2.downlink_id, rx1.downlink_id);

    h.server.stop().await.unwrap();
}

#[tokio::test]
async fn rx1_rejection_falls_through_to_the_saved_rx2() {
    let mut h = start_server(fast_config());

    let ds = test_session(2, 8);
    save_device_session(h.store.as_ref(), &ds, Duration::from_secs(60))
        .await
        .unwrap();

    let phy = data_phy_payload(&ds, 0, true, Some(1), b"ping".to_vec(), vec![]);
    h.gateway
        .forward_uplink(uplink_frame(phy, rx_info(1, 5.0, -60)))
        .await;
    let rx1 = recv_timeout(&mut h.sent, 1_000).await.expect("rx1 frame");

    // the concentrator rejects RX1: too late to recompute, the saved
    // RX2 frame goes out as-is
    h.gateway
        .forward_tx_ack(DownlinkTxAck {
            gateway_id: rx1.tx_info.gateway_id,
            token: rx1.token,
            error: "TOO_LATE".to_string(),
            downlink_id: rx1.downlink_id,
        })
        .await;

    let rx2 = recv_timeout(&mut h.sent, 1_000).await.expect("rx2 frame");
    assert_eq!(rx2.token, rx1.token);
    assert_eq!(rx2.tx_info.frequency, 869_525_000);
    assert_eq!(rx2.phy_payload, rx1.phy_payload);

    // a second rejection exhausts the candidate list
    h.gateway
        .forward_tx_ack(DownlinkTxAck {
            gateway_id: rx2.tx_info.gateway_id,
            token: rx2.token,
            error: "TOO_LATE".to_string(),
            downlink_id: rx2.downlink_id,
        })
        .await;
    assert!(recv_timeout(&mut h.sent, 300).await.is_none());

    h.server.stop().await.unwrap();
}

#[tokio::test]
async fn successful_rx1_ack_clears_the_rx2_candidate() {
    let mut h = start_server(fast_config());

    let ds = test_session(3, 9);
    save_device_session(h.store.as_ref(), &ds, Duration::from_secs(60))
        .await
        .unwrap();

    let phy = data_phy_payload(&ds, 0, true, Some(1), b"ping".to_vec(), vec![]);
    h.gateway
        .forward_uplink(uplink_frame(phy, rx_info(1, 5.0, -60)))
        .await;
    let rx1 = recv_timeout(&mut h.sent, 1_000).await.expect("rx1 frame");

    h.gateway
        .forward_tx_ack(DownlinkTxAck {
            gateway_id: rx1.tx_info.gateway_id,
            token: rx1.token,
            error: String::new(),
            downlink_id: rx1.downlink_id,
        })
        .await;

    // no RX2 attempt, and the saved candidate is gone
    assert!(recv_timeout(&mut h.sent, 300).await.is_none());
    assert!(
        pop_downlink_frame(h.store.as_ref(), rx1.token, Duration::from_secs(5))
            .await
            .unwrap()
            .is_none()
    );

    h.server.stop().await.unwrap();
}

#[tokio::test]
async fn downlink_ack_increments_the_frame_counter_once() {
    let mut h = start_server(fast_config());

    let ds = test_session(4, 10);
    save_device_session(h.store.as_ref(), &ds, Duration::from_secs(60))
        .await
        .unwrap();

    let phy = data_phy_payload(&ds, 0, true, Some(1), b"ping".to_vec(), vec![]);
    h.gateway
        .forward_uplink(uplink_frame(phy, rx_info(1, 5.0, -60)))
        .await;
    recv_timeout(&mut h.sent, 1_000).await.expect("rx1 frame");
    // give the pipeline time to persist the session
    tokio::time::sleep(Duration::from_millis(50)).await;

    let saved = get_device_session(h.store.as_ref(), ds.dev_eui).await.unwrap();
    assert_eq!(saved.fcnt_up, 1);
    assert_eq!(saved.fcnt_down, 1);

    h.server.stop().await.unwrap();
}
