//! Table-driven cases for the pending/answer reconciliation against
//! the device-session.

mod common;

use lorans::lorawan::phy::{Mhdr, Payload, PhyPayload};
use lorans::lorawan::{
    Cid, DevAddr, DevEui, LinkAdrAnsPayload, LinkAdrReqPayload, MType, MacCommand, Major,
    PingSlotChannelReqPayload,
};
use lorans::maccommand::{handle, DEVICE_INITIATED_CIDS};
use lorans::region::Eu868;
use lorans::storage::{DeviceSession, MacCommandBlock};
use lorans::RxPacket;

use common::{rx_info, uplink_tx_info};

fn rx_packet() -> RxPacket {
    RxPacket {
        phy: PhyPayload {
            mhdr: Mhdr {
                mtype: MType::UnconfirmedDataUp,
                major: Major::LoRaWANR1,
            },
            payload: Payload::Raw(vec![]),
            mic: [0; 4],
        },
        payload_bytes: vec![],
        tx_info: uplink_tx_info(),
        rx_info_set: vec![rx_info(1, 5.0, -60)],
        dr: 5,
    }
}

fn base_session() -> DeviceSession {
    DeviceSession {
        dev_eui: DevEui([1, 2, 3, 4, 5, 6, 7, 8]),
        dev_addr: DevAddr([1, 2, 3, 4]),
        enabled_uplink_channels: vec![0, 1],
        ..DeviceSession::default()
    }
}

fn link_adr_req(tx_power: u8) -> MacCommandBlock {
    let mut ch_mask = [false; 16];
    ch_mask[0] = true;
    ch_mask[1] = true;
    ch_mask[2] = true;
    MacCommandBlock::new(
        Cid::LinkAdr,
        vec![MacCommand::LinkAdrReq(LinkAdrReqPayload {
            data_rate: 5,
            tx_power,
            ch_mask,
            ch_mask_cntl: 0,
            nb_rep: 2,
        })],
    )
}

fn link_adr_ans(channel: bool, data_rate: bool, power: bool) -> MacCommandBlock {
    MacCommandBlock::new(
        Cid::LinkAdr,
        vec![MacCommand::LinkAdrAns(LinkAdrAnsPayload {
            channel_mask_ack: channel,
            data_rate_ack: data_rate,
            power_ack: power,
        })],
    )
}

struct Case {
    name: &'static str,
    session: DeviceSession,
    pending: Option<MacCommandBlock>,
    answer: MacCommandBlock,
    expected_session: DeviceSession,
    expected_error: Option<&'static str>,
}

fn run(cases: Vec<Case>) {
    let rx = rx_packet();
    for case in cases {
        let mut ds = case.session;
        let result = handle(&mut ds, &case.answer, case.pending.as_ref(), &rx, &Eu868);

        match (&result, case.expected_error) {
            (Err(err), Some(expected)) => {
                assert_eq!(err.to_string(), expected, "case: {}", case.name)
            }
            (Ok(responses), None) => {
                assert!(responses.is_empty(), "case: {}", case.name)
            }
            (other, _) => panic!("case {}: unexpected result {:?}", case.name, other),
        }
        assert_eq!(ds, case.expected_session, "case: {}", case.name);
    }
}

#[test]
fn link_adr_ans_transitions() {
    run(vec![
        Case {
            name: "pending request and positive ack updates tx-power, nb-trans and channels",
            session: base_session(),
            pending: Some(link_adr_req(3)),
            answer: link_adr_ans(true, true, true),
            expected_session: DeviceSession {
                enabled_uplink_channels: vec![0, 1, 2],
                tx_power_index: 3,
                nb_trans: 2,
                dr: 5,
                ..base_session()
            },
            expected_error: None,
        },
        Case {
            name: "negative tx-power ack decrements the max supported tx-power index",
            session: base_session(),
            pending: Some(link_adr_req(3)),
            answer: link_adr_ans(true, true, false),
            expected_session: DeviceSession {
                max_supported_tx_power_index: 2,
                ..base_session()
            },
            expected_error: None,
        },
        Case {
            name: "negative tx-power ack on tx-power 0 raises the supported minimum",
            session: base_session(),
            pending: Some(link_adr_req(0)),
            answer: link_adr_ans(true, true, false),
            expected_session: DeviceSession {
                tx_power_index: 1,
                min_supported_tx_power_index: 1,
                ..base_session()
            },
            expected_error: None,
        },
        Case {
            name: "nothing pending and positive ack returns an error",
            session: base_session(),
            pending: None,
            answer: link_adr_ans(true, true, true),
            expected_session: base_session(),
            expected_error: Some("expected pending mac-command"),
        },
    ]);
}

#[test]
fn ping_slot_channel_ans_transitions() {
    let session = DeviceSession {
        ping_slot_frequency: 868_100_000,
        ping_slot_dr: 3,
        ..base_session()
    };
    let pending = MacCommandBlock::new(
        Cid::PingSlotChannel,
        vec![MacCommand::PingSlotChannelReq(PingSlotChannelReqPayload {
            frequency: 868_300_000,
            dr: 4,
        })],
    );
    let answer = |data_rate_ok, channel_frequency_ok| {
        MacCommandBlock::new(
            Cid::PingSlotChannel,
            vec![MacCommand::PingSlotChannelAns {
                data_rate_ok,
                channel_frequency_ok,
            }],
        )
    };

    run(vec![
        Case {
            name: "pending request and positive ack updates frequency and data-rate",
            session: session.clone(),
            pending: Some(pending.clone()),
            answer: answer(true, true),
            expected_session: DeviceSession {
                ping_slot_frequency: 868_300_000,
                ping_slot_dr: 4,
                ..session.clone()
            },
            expected_error: None,
        },
        Case {
            name: "negative ack does not update",
            session: session.clone(),
            pending: Some(pending.clone()),
            answer: answer(false, true),
            expected_session: session.clone(),
            expected_error: None,
        },
        Case {
            name: "no pending request returns an error",
            session: session.clone(),
            pending: None,
            answer: answer(false, true),
            expected_session: session.clone(),
            expected_error: Some("expected pending mac-command"),
        },
    ]);
}

#[test]
fn rx_param_setup_ans_adopts_all_or_nothing() {
    let pending = MacCommandBlock::new(
        Cid::RxParamSetup,
        vec![MacCommand::RxParamSetupReq(
            lorans::lorawan::RxParamSetupReqPayload {
                rx1_dr_offset: 2,
                rx2_data_rate: 3,
                frequency: 869_525_000,
            },
        )],
    );
    let answer = |all: bool| {
        MacCommandBlock::new(
            Cid::RxParamSetup,
            vec![MacCommand::RxParamSetupAns {
                channel_ack: all,
                rx2_data_rate_ack: true,
                rx1_dr_offset_ack: true,
            }],
        )
    };

    run(vec![
        Case {
            name: "all acks adopt rx1-offset, rx2-dr and rx2-frequency",
            session: base_session(),
            pending: Some(pending.clone()),
            answer: answer(true),
            expected_session: DeviceSession {
                rx1_dr_offset: 2,
                rx2_dr: 3,
                rx2_frequency: 869_525_000,
                ..base_session()
            },
            expected_error: None,
        },
        Case {
            name: "a single nack leaves the session unchanged",
            session: base_session(),
            pending: Some(pending),
            answer: answer(false),
            expected_session: base_session(),
            expected_error: None,
        },
    ]);
}

#[test]
fn device_initiated_cids_are_accepted_unsolicited() {
    // the answer-side set the reconciliation protocol exempts from the
    // pending requirement
    for cid in [
        Cid::DeviceTime,
        Cid::LinkCheck,
        Cid::DeviceMode,
        Cid::ResetInd,
        Cid::RekeyInd,
        Cid::RejoinParamSetup,
    ] {
        assert!(DEVICE_INITIATED_CIDS.contains(&cid), "{:?}", cid);
    }
    assert!(!DEVICE_INITIATED_CIDS.contains(&Cid::LinkAdr));
}

#[test]
fn new_channel_ans_installs_the_extra_channel() {
    let pending = MacCommandBlock::new(
        Cid::NewChannel,
        vec![MacCommand::NewChannelReq(
            lorans::lorawan::NewChannelReqPayload {
                ch_index: 3,
                frequency: 867_100_000,
                max_dr: 5,
                min_dr: 0,
            },
        )],
    );
    let answer = MacCommandBlock::new(
        Cid::NewChannel,
        vec![MacCommand::NewChannelAns {
            channel_frequency_ok: true,
            data_rate_range_ok: true,
        }],
    );

    let mut ds = base_session();
    let rx = rx_packet();
    handle(&mut ds, &answer, Some(&pending), &rx, &Eu868).unwrap();

    assert_eq!(ds.enabled_uplink_channels, vec![0, 1, 3]);
    let channel = ds.extra_uplink_channels.get(&3).unwrap();
    assert_eq!(channel.frequency, 867_100_000);
    assert_eq!((channel.min_dr, channel.max_dr), (0, 5));
}
