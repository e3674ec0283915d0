//! API contract tests: validation, metadata, sticky requests, class
//! switching and the rejoin engine.


use lorawan_stack::config::{AbpParams, ConnectParams, StackConfig};
use lorawan_stack::event::Event;
use lorawan_stack::mac::{
    Beacon, BeaconStatus, Channel, ChannelPlan, DeviceClass, MacEventStatus, MlmeConfirm,
    MlmeIndication, MlmeIndicationType, RejoinType, RxSlot, Version,
};
use lorawan_stack::message::MsgFlags;
use lorawan_stack::stack::DeviceState;
use lorawan_stack::status::Status;
use lorawan_stack::system::{RadioEvent, StackTimer, StackWork};

use mock::{TestCallbacks, TestHarness};

fn lw11_otaa_harness() -> TestHarness {
    let mut config = StackConfig::default();
    config.version = Version::V1_1;
    let harness = TestHarness::with_config(config);
    harness.bring_up();
    harness.mac.borrow_mut().server_type = Version::V1_1;
    harness
}

fn join_otaa(harness: &TestHarness) {
    assert_eq!(harness.lorawan.connect(), Status::ConnectInProgress);
    harness.lorawan.radio_event(RadioEvent::TxDone);
    harness.pump();
    harness
        .mac
        .borrow_mut()
        .pending_confirms
        .push(MlmeConfirm::JoinAccept {
            status: MacEventStatus::Ok,
        });
    harness.rx_frame(RxSlot::Rx1);
    assert_eq!(harness.count_events(Event::Connected), 1);
}

#[test]
fn test_calls_require_initialization() {
    let harness = TestHarness::new();

    assert_eq!(harness.lorawan.connect(), Status::NotInitialized);
    assert_eq!(
        harness.lorawan.send(5, &[1], MsgFlags::UNCONFIRMED),
        Status::NotInitialized.as_i16()
    );
    let mut buf = [0u8; 4];
    assert_eq!(
        harness.lorawan.receive(5, &mut buf, MsgFlags::UNCONFIRMED),
        Status::NotInitialized.as_i16()
    );
    assert_eq!(harness.lorawan.disconnect(), Status::NotInitialized);
    assert_eq!(harness.lorawan.set_datarate(3), Status::NotInitialized);
    assert_eq!(
        harness.lorawan.set_device_class(DeviceClass::C),
        Status::NotInitialized
    );
    assert_eq!(
        harness.lorawan.add_ping_slot_info_request(1),
        Status::NotInitialized
    );
    assert_eq!(
        harness.lorawan.get_tx_metadata(),
        Err(Status::NotInitialized)
    );
}

#[test]
fn test_send_validation() {
    let harness = TestHarness::new();
    harness.bring_up();

    // initialized but no session yet
    assert_eq!(
        harness.lorawan.send(5, &[1], MsgFlags::UNCONFIRMED),
        Status::NoActiveSessions.as_i16()
    );

    harness.connect_abp();

    // reserved and illegal ports
    assert_eq!(
        harness.lorawan.send(0, &[1], MsgFlags::UNCONFIRMED),
        Status::PortInvalid.as_i16()
    );
    assert_eq!(
        harness.lorawan.send(224, &[1], MsgFlags::UNCONFIRMED),
        Status::PortInvalid.as_i16()
    );
    assert_eq!(
        harness.lorawan.send(225, &[1], MsgFlags::UNCONFIRMED),
        Status::PortInvalid.as_i16()
    );

    // flag combinations
    assert_eq!(
        harness
            .lorawan
            .send(5, &[1], MsgFlags::UNCONFIRMED | MsgFlags::CONFIRMED),
        Status::ParameterInvalid.as_i16()
    );
    assert_eq!(
        harness.lorawan.send(5, &[1], MsgFlags::MULTICAST),
        Status::ParameterInvalid.as_i16()
    );

    // empty payloads are reserved for the internal path
    assert_eq!(
        harness.lorawan.send(5, &[], MsgFlags::UNCONFIRMED),
        Status::ParameterInvalid.as_i16()
    );

    // one message in flight at a time
    assert_eq!(harness.lorawan.send(5, &[1], MsgFlags::UNCONFIRMED), 1);
    assert_eq!(
        harness.lorawan.send(5, &[2], MsgFlags::UNCONFIRMED),
        Status::WouldBlock.as_i16()
    );
}

#[test]
fn test_send_requires_joined_network() {
    let harness = TestHarness::new();
    harness.bring_up();
    harness.connect_abp();
    harness.mac.borrow_mut().joined = false;

    assert_eq!(
        harness.lorawan.send(5, &[1], MsgFlags::UNCONFIRMED),
        Status::NoNetworkJoined.as_i16()
    );
}

#[test]
fn test_confirmed_retry_count_clamp() {
    let harness = TestHarness::new();
    harness.bring_up();
    harness.connect_abp();

    assert_eq!(
        harness.lorawan.set_confirmed_msg_retries(255),
        Status::ParameterInvalid
    );
    assert_eq!(harness.lorawan.set_confirmed_msg_retries(254), Status::Ok);

    assert_eq!(harness.lorawan.send(5, &[1], MsgFlags::CONFIRMED), 1);
    let (_, _, _, retries) = *harness.mac.borrow().prepare_calls.last().unwrap();
    assert_eq!(retries, 254);
}

#[test]
fn test_receive_validate_params_preserves_message() {
    let harness = TestHarness::new();
    harness.bring_up();
    harness.connect_abp();

    harness.mac.borrow_mut().confirmation.status = MacEventStatus::Ok;
    assert_eq!(harness.lorawan.send(12, &[9], MsgFlags::UNCONFIRMED), 1);
    harness.lorawan.radio_event(RadioEvent::TxDone);
    harness.pump();
    {
        let mut mac = harness.mac.borrow_mut();
        mac.indication.is_data_recvd = true;
        mac.indication.pending = true;
        mac.indication.port = 10;
        mac.indication.data.extend_from_slice(&[1, 2, 3]).unwrap();
    }
    harness.rx_frame(RxSlot::Rx1);

    let mut buf = [0u8; 8];
    // wrong port
    assert_eq!(
        harness.lorawan.receive(11, &mut buf, MsgFlags::UNCONFIRMED),
        Status::WouldBlock.as_i16()
    );
    // wrong type
    assert_eq!(
        harness.lorawan.receive(10, &mut buf, MsgFlags::CONFIRMED),
        Status::WouldBlock.as_i16()
    );
    // still there for a matching call
    assert_eq!(
        harness.lorawan.receive(10, &mut buf, MsgFlags::UNCONFIRMED),
        3
    );
}

#[test]
fn test_receive_any_reports_port_and_flags() {
    let harness = TestHarness::new();
    harness.bring_up();
    harness.connect_abp();

    harness.mac.borrow_mut().confirmation.status = MacEventStatus::Ok;
    assert_eq!(harness.lorawan.send(12, &[9], MsgFlags::UNCONFIRMED), 1);
    harness.lorawan.radio_event(RadioEvent::TxDone);
    harness.pump();
    {
        let mut mac = harness.mac.borrow_mut();
        mac.indication.is_data_recvd = true;
        mac.indication.pending = true;
        mac.indication.port = 42;
        mac.indication.msg_type = lorawan_stack::mac::McpsType::Confirmed;
        mac.indication.data.extend_from_slice(&[7, 8]).unwrap();
    }
    harness.rx_frame(RxSlot::Rx1);

    let mut buf = [0u8; 8];
    let (read, port, flags) = harness.lorawan.receive_any(&mut buf);
    assert_eq!(read, 2);
    assert_eq!(port, 42);
    assert_eq!(flags, MsgFlags::CONFIRMED);
}

#[test]
fn test_metadata_staleness() {
    let harness = TestHarness::new();
    harness.bring_up();
    harness.connect_abp();

    assert_eq!(harness.lorawan.get_tx_metadata(), Err(Status::MetadataNotAvailable));
    assert_eq!(harness.lorawan.get_rx_metadata(), Err(Status::MetadataNotAvailable));

    {
        let mut mac = harness.mac.borrow_mut();
        mac.confirmation.status = MacEventStatus::Ok;
        mac.confirmation.channel = 2;
        mac.confirmation.data_rate = 5;
        mac.confirmation.tx_power = 14;
        mac.confirmation.tx_toa = 61;
        mac.indication.rx_datarate = 3;
        mac.indication.rssi = -80;
        mac.indication.snr = 7;
        mac.indication.channel = 1;
        mac.indication.rx_toa = 33;
    }

    assert_eq!(harness.lorawan.send(5, &[1], MsgFlags::UNCONFIRMED), 1);
    harness.lorawan.radio_event(RadioEvent::TxDone);
    harness.pump();
    harness.rx_frame(RxSlot::Rx1);

    let tx_meta = harness.lorawan.get_tx_metadata().unwrap();
    assert_eq!(tx_meta.channel, 2);
    assert_eq!(tx_meta.data_rate, 5);
    assert_eq!(tx_meta.tx_power, 14);
    assert_eq!(tx_meta.tx_toa, 61);
    // consumed, stale again
    assert_eq!(harness.lorawan.get_tx_metadata(), Err(Status::MetadataNotAvailable));

    let rx_meta = harness.lorawan.get_rx_metadata().unwrap();
    assert_eq!(rx_meta.rx_datarate, 3);
    assert_eq!(rx_meta.rssi, -80);
    assert_eq!(rx_meta.snr, 7);
    assert_eq!(harness.lorawan.get_rx_metadata(), Err(Status::MetadataNotAvailable));
}

#[test]
fn test_backoff_metadata() {
    let harness = TestHarness::new();
    harness.bring_up();

    assert_eq!(
        harness.lorawan.get_backoff_metadata(),
        Err(Status::MetadataNotAvailable)
    );
    harness.mac.borrow_mut().backoff_ms = Some(1500);
    assert_eq!(harness.lorawan.get_backoff_metadata(), Ok(1500));
}

#[test]
fn test_cancel_sending() {
    let harness = TestHarness::new();
    harness.bring_up();
    harness.connect_abp();

    assert_eq!(harness.lorawan.send(5, &[1], MsgFlags::UNCONFIRMED), 1);
    assert_eq!(harness.lorawan.device_state(), DeviceState::Sending);

    assert_eq!(harness.lorawan.cancel_sending(), Status::Ok);
    assert_eq!(harness.lorawan.device_state(), DeviceState::Idle);
    assert!(!harness.mac.borrow().tx_is_ongoing);

    // once the radio is armed the MAC refuses
    assert_eq!(harness.lorawan.send(5, &[1], MsgFlags::UNCONFIRMED), 1);
    harness.mac.borrow_mut().clear_tx_result = Status::Busy;
    assert_eq!(harness.lorawan.cancel_sending(), Status::Busy);
    assert_eq!(harness.lorawan.device_state(), DeviceState::Sending);
}

#[test]
fn test_channel_plan_round_trip() {
    let harness = TestHarness::new();
    harness.bring_up();

    let mut plan = ChannelPlan::new();
    plan.push(Channel {
        id: 1,
        frequency: 868_100_000,
        dr_min: 0,
        dr_max: 5,
    })
    .unwrap();
    plan.push(Channel {
        id: 2,
        frequency: 868_300_000,
        dr_min: 0,
        dr_max: 5,
    })
    .unwrap();

    assert_eq!(harness.lorawan.set_channel_plan(&plan), Status::Ok);
    assert_eq!(harness.lorawan.get_channel_plan().unwrap(), plan);

    assert_eq!(harness.lorawan.remove_channel(1), Status::Ok);
    let remaining = harness.lorawan.get_channel_plan().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, 2);

    assert_eq!(harness.lorawan.remove_channel_plan(), Status::Ok);
    assert!(harness.lorawan.get_channel_plan().unwrap().is_empty());
}

#[test]
fn test_datarate_and_adr_forwarding() {
    let harness = TestHarness::new();
    harness.bring_up();

    assert_eq!(harness.lorawan.set_datarate(5), Status::Ok);
    assert_eq!(harness.lorawan.enable_adaptive_datarate(), Status::Ok);
    assert_eq!(harness.lorawan.disable_adaptive_datarate(), Status::Ok);

    let mac = harness.mac.borrow();
    assert_eq!(mac.data_rates, vec![5]);
    assert_eq!(mac.adr_settings, vec![true, false]);
}

#[test]
fn test_link_check_requires_handler() {
    let harness = TestHarness::new();
    assert_eq!(harness.lorawan.initialize(), Status::Ok);
    harness.lorawan.add_app_callbacks(TestCallbacks {
        events: harness.events.clone(),
        link_checks: harness.link_checks.clone(),
        battery: 255,
        with_link_check: false,
    });

    assert_eq!(
        harness.lorawan.add_link_check_request(),
        Status::ParameterInvalid
    );
}

#[test]
fn test_link_check_sticky_request_and_response() {
    let harness = TestHarness::new();
    harness.bring_up();
    harness.connect_abp();

    assert_eq!(harness.lorawan.add_link_check_request(), Status::Ok);

    harness.mac.borrow_mut().confirmation.status = MacEventStatus::Ok;
    assert_eq!(harness.lorawan.send(5, &[1], MsgFlags::UNCONFIRMED), 1);
    assert_eq!(harness.mac.borrow().link_check_setups, 1);
    harness.lorawan.radio_event(RadioEvent::TxDone);
    harness.pump();

    harness
        .mac
        .borrow_mut()
        .pending_confirms
        .push(MlmeConfirm::LinkCheck {
            status: MacEventStatus::Ok,
            demod_margin: 20,
            nb_gateways: 2,
        });
    harness.rx_frame(RxSlot::Rx1);

    assert_eq!(*harness.link_checks.borrow(), vec![(20, 2)]);

    // removal stops the staging on later uplinks
    harness.lorawan.remove_link_check_request();
    assert_eq!(harness.lorawan.send(5, &[1], MsgFlags::UNCONFIRMED), 1);
    assert_eq!(harness.mac.borrow().link_check_setups, 1);
}

#[test]
fn test_device_time_request_and_sync() {
    let harness = TestHarness::new();
    harness.bring_up();

    assert_eq!(
        harness.lorawan.add_device_time_request(),
        Status::NoNetworkJoined
    );

    harness.connect_abp();
    assert_eq!(harness.lorawan.add_device_time_request(), Status::Ok);

    harness.mac.borrow_mut().confirmation.status = MacEventStatus::Ok;
    assert_eq!(harness.lorawan.send(5, &[1], MsgFlags::UNCONFIRMED), 1);
    assert_eq!(harness.mac.borrow().device_time_setups, 1);
    harness.lorawan.radio_event(RadioEvent::TxDone);
    harness.pump();

    // the network stamps the end of the uplink; 500 ms pass before the
    // answer is processed
    harness.clock.advance_ms(500);
    harness
        .mac
        .borrow_mut()
        .pending_confirms
        .push(MlmeConfirm::DeviceTime {
            gps_time_ms: 1_000_000,
        });
    harness.rx_frame(RxSlot::Rx1);

    assert_eq!(harness.count_events(Event::DeviceTimeSynched), 1);
    assert_eq!(harness.lorawan.get_current_gps_time(), 1_000_500);

    // the answer cleared the sticky request
    assert_eq!(harness.lorawan.send(5, &[1], MsgFlags::UNCONFIRMED), 1);
    assert_eq!(harness.mac.borrow().device_time_setups, 1);
}

#[test]
fn test_ping_slot_info_request_rules() {
    let harness = TestHarness::new();
    harness.bring_up();
    harness.connect_abp();

    assert_eq!(
        harness.lorawan.add_ping_slot_info_request(8),
        Status::ParameterInvalid
    );

    harness.mac.borrow_mut().device_class = DeviceClass::B;
    assert_eq!(harness.lorawan.add_ping_slot_info_request(3), Status::NoOp);

    harness.mac.borrow_mut().device_class = DeviceClass::A;
    assert_eq!(harness.lorawan.add_ping_slot_info_request(3), Status::Ok);

    harness.mac.borrow_mut().confirmation.status = MacEventStatus::Ok;
    assert_eq!(harness.lorawan.send(5, &[1], MsgFlags::UNCONFIRMED), 1);
    assert_eq!(harness.mac.borrow().ping_slot_reqs, 1);
    harness.lorawan.radio_event(RadioEvent::TxDone);
    harness.pump();

    harness
        .mac
        .borrow_mut()
        .pending_confirms
        .push(MlmeConfirm::PingSlotInfo);
    harness.rx_frame(RxSlot::Rx1);
    assert_eq!(harness.count_events(Event::PingSlotInfoSynched), 1);

    // confirmed: no longer staged
    assert_eq!(harness.lorawan.send(5, &[1], MsgFlags::UNCONFIRMED), 1);
    assert_eq!(harness.mac.borrow().ping_slot_reqs, 1);
}

#[test]
fn test_direct_class_switch_pre_lw11() {
    let harness = TestHarness::new();
    harness.bring_up();
    harness.connect_abp();

    // switching to the current class is a no-op
    assert_eq!(harness.lorawan.set_device_class(DeviceClass::A), Status::Ok);
    assert!(harness.mac.borrow().set_class_calls.is_empty());

    assert_eq!(harness.lorawan.set_device_class(DeviceClass::C), Status::Ok);
    assert_eq!(harness.mac.borrow().set_class_calls, vec![DeviceClass::C]);
    assert_eq!(harness.mac.borrow().device_class, DeviceClass::C);
}

#[test]
fn test_class_b_needs_beacon_lock() {
    let harness = TestHarness::new();
    harness.bring_up();
    harness.connect_abp();

    harness.mac.borrow_mut().set_class_result = Status::NoBeaconFound;
    assert_eq!(
        harness.lorawan.set_device_class(DeviceClass::B),
        Status::NoBeaconFound
    );
    assert_eq!(harness.mac.borrow().device_class, DeviceClass::A);
}

#[test]
fn test_lw11_class_switch_waits_for_device_mode_conf() {
    let mut config = StackConfig::default();
    config.version = Version::V1_1;
    config.over_the_air_activation = false;
    let harness = TestHarness::with_config(config);
    harness.bring_up();
    harness.mac.borrow_mut().server_type = Version::V1_1;
    harness.connect_abp();

    // announced, not applied
    assert_eq!(harness.lorawan.set_device_class(DeviceClass::C), Status::Ok);
    assert!(harness.mac.borrow().set_class_calls.is_empty());

    harness.mac.borrow_mut().confirmation.status = MacEventStatus::Ok;
    assert_eq!(harness.lorawan.send(5, &[1], MsgFlags::UNCONFIRMED), 1);
    assert_eq!(harness.mac.borrow().device_mode_inds, vec![DeviceClass::C]);
    harness.lorawan.radio_event(RadioEvent::TxDone);
    harness.pump();

    harness
        .mac
        .borrow_mut()
        .pending_confirms
        .push(MlmeConfirm::DeviceMode {
            class: DeviceClass::C,
        });
    harness.rx_frame(RxSlot::Rx1);

    assert_eq!(harness.count_events(Event::ClassChanged), 1);
    assert_eq!(harness.count_events(Event::ServerAcceptedClassInUse), 1);
    assert_eq!(harness.mac.borrow().set_class_calls, vec![DeviceClass::C]);
    assert_eq!(harness.mac.borrow().device_class, DeviceClass::C);
}

#[test]
fn test_lw11_class_switch_rejected_by_server() {
    let mut config = StackConfig::default();
    config.version = Version::V1_1;
    config.over_the_air_activation = false;
    let harness = TestHarness::with_config(config);
    harness.bring_up();
    harness.mac.borrow_mut().server_type = Version::V1_1;
    harness.connect_abp();

    assert_eq!(harness.lorawan.set_device_class(DeviceClass::C), Status::Ok);
    harness.mac.borrow_mut().confirmation.status = MacEventStatus::Ok;
    assert_eq!(harness.lorawan.send(5, &[1], MsgFlags::UNCONFIRMED), 1);
    harness.lorawan.radio_event(RadioEvent::TxDone);
    harness.pump();

    harness
        .mac
        .borrow_mut()
        .pending_confirms
        .push(MlmeConfirm::DeviceMode {
            class: DeviceClass::A,
        });
    harness.rx_frame(RxSlot::Rx1);

    assert_eq!(
        harness.count_events(Event::ServerDoesNotSupportClassInUse),
        1
    );
    assert_eq!(harness.count_events(Event::ClassChanged), 0);
    assert!(harness.mac.borrow().set_class_calls.is_empty());
    assert_eq!(harness.mac.borrow().device_class, DeviceClass::A);
}

#[test]
fn test_fpending_triggers_automatic_uplink() {
    let harness = TestHarness::new();
    harness.bring_up();
    harness.connect_abp();

    harness.mac.borrow_mut().confirmation.status = MacEventStatus::Ok;
    assert_eq!(harness.lorawan.send(9, &[1], MsgFlags::UNCONFIRMED), 1);
    harness.lorawan.radio_event(RadioEvent::TxDone);
    harness.pump();
    {
        let mut mac = harness.mac.borrow_mut();
        mac.indication.is_data_recvd = true;
        mac.indication.pending = true;
        mac.indication.port = 9;
        mac.indication.fpending = true;
        mac.indication.data.extend_from_slice(&[5]).unwrap();
    }
    harness.rx_frame(RxSlot::Rx1);

    // an empty confirmed uplink was generated on the same port
    let (port, len, flags, _) = *harness.mac.borrow().prepare_calls.last().unwrap();
    assert_eq!(port, 9);
    assert_eq!(len, 0);
    assert_eq!(flags, MsgFlags::CONFIRMED);

    // its completion is silent
    harness.lorawan.radio_event(RadioEvent::TxDone);
    harness.pump();
    {
        let mut mac = harness.mac.borrow_mut();
        mac.indication = lorawan_stack::mac::McpsIndication::new();
        mac.indication.is_ack_recvd = true;
    }
    harness.rx_frame(RxSlot::Rx1);
    assert_eq!(harness.count_events(Event::TxDone), 1);
    assert_eq!(harness.count_events(Event::AutomaticUplinkError), 0);
}

#[test]
fn test_fpending_without_automatic_uplink_raises_event() {
    let mut config = StackConfig::default();
    config.automatic_uplink = false;
    let harness = TestHarness::with_config(config);
    harness.bring_up();
    harness.connect_abp();

    harness.mac.borrow_mut().confirmation.status = MacEventStatus::Ok;
    assert_eq!(harness.lorawan.send(9, &[1], MsgFlags::UNCONFIRMED), 1);
    let sends_before = harness.mac.borrow().prepare_calls.len();
    harness.lorawan.radio_event(RadioEvent::TxDone);
    harness.pump();
    {
        let mut mac = harness.mac.borrow_mut();
        mac.indication.is_data_recvd = true;
        mac.indication.pending = true;
        mac.indication.port = 9;
        mac.indication.fpending = true;
        mac.indication.data.extend_from_slice(&[5]).unwrap();
    }
    harness.rx_frame(RxSlot::Rx1);

    assert_eq!(harness.count_events(Event::UplinkRequired), 1);
    assert_eq!(harness.mac.borrow().prepare_calls.len(), sends_before);
}

#[test]
fn test_mlme_schedule_uplink_indication() {
    let harness = TestHarness::new();
    harness.bring_up();
    harness.connect_abp();

    harness.mac.borrow_mut().confirmation.status = MacEventStatus::Ok;
    assert_eq!(harness.lorawan.send(9, &[1], MsgFlags::UNCONFIRMED), 1);
    harness.lorawan.radio_event(RadioEvent::TxDone);
    harness.pump();
    harness.mac.borrow_mut().mlme_indication = Some(MlmeIndication {
        indication_type: MlmeIndicationType::ScheduleUplink,
        pending: true,
    });
    harness.rx_frame(RxSlot::Rx1);

    // port 0 is reachable for the internal flush
    let (port, len, flags, _) = *harness.mac.borrow().prepare_calls.last().unwrap();
    assert_eq!(port, 0);
    assert_eq!(len, 0);
    assert_eq!(flags, MsgFlags::CONFIRMED);
}

#[test]
fn test_disconnect_preserves_counters_for_abp() {
    let harness = TestHarness::new();
    harness.bring_up();
    harness.connect_abp();

    {
        let mut mac = harness.mac.borrow_mut();
        mac.confirmation.status = MacEventStatus::Ok;
        mac.confirmation.ul_frame_counter = 5;
    }
    assert_eq!(harness.lorawan.send(5, &[1], MsgFlags::UNCONFIRMED), 1);
    harness.lorawan.radio_event(RadioEvent::TxDone);
    harness.pump();
    harness.rx_windows_timeout();
    assert_eq!(harness.lorawan.session().uplink_counter, 5);

    assert_eq!(harness.lorawan.disconnect(), Status::DeviceOff);
    harness.pump();
    assert_eq!(harness.count_events(Event::Disconnected), 1);
    assert_eq!(harness.lorawan.device_state(), DeviceState::Shutdown);

    let session = harness.lorawan.session();
    assert!(!session.active);
    assert_eq!(session.uplink_counter, 5);

    assert_eq!(
        harness.lorawan.send(5, &[1], MsgFlags::UNCONFIRMED),
        Status::NoActiveSessions.as_i16()
    );

    // reconnecting from shutdown resumes the counters
    let params = ConnectParams::Abp(AbpParams {
        dev_addr: 0x2601_1CEC,
        nwk_skey: [0x11; 16],
        app_skey: [0x22; 16],
    });
    assert_eq!(harness.lorawan.connect_with(&params), Status::Ok);
    harness.pump();
    assert_eq!(harness.count_events(Event::Connected), 2);
    assert_eq!(harness.lorawan.session().uplink_counter, 5);
}

#[test]
fn test_fresh_otaa_join_resets_counters() {
    let harness = TestHarness::new();
    harness.bring_up();
    join_otaa(&harness);

    {
        let mut mac = harness.mac.borrow_mut();
        mac.confirmation.status = MacEventStatus::Ok;
        mac.confirmation.ul_frame_counter = 7;
    }
    assert_eq!(harness.lorawan.send(5, &[1], MsgFlags::UNCONFIRMED), 1);
    harness.lorawan.radio_event(RadioEvent::TxDone);
    harness.pump();
    harness.rx_windows_timeout();
    assert_eq!(harness.lorawan.session().uplink_counter, 7);

    assert_eq!(harness.lorawan.disconnect(), Status::DeviceOff);
    harness.pump();

    assert_eq!(harness.lorawan.connect(), Status::ConnectInProgress);
    assert_eq!(harness.lorawan.session().uplink_counter, 0);
    assert_eq!(harness.lorawan.session().downlink_counter, 0);
}

#[test]
fn test_abp_lw11_stages_reset_indication() {
    let mut config = StackConfig::default();
    config.version = Version::V1_1;
    config.over_the_air_activation = false;
    let harness = TestHarness::with_config(config);
    harness.bring_up();
    harness.mac.borrow_mut().server_type = Version::V1_1;
    harness.connect_abp();

    harness.mac.borrow_mut().confirmation.status = MacEventStatus::Ok;
    assert_eq!(harness.lorawan.send(5, &[1], MsgFlags::UNCONFIRMED), 1);
    assert_eq!(harness.mac.borrow().reset_inds, 1);
    harness.lorawan.radio_event(RadioEvent::TxDone);
    harness.pump();

    harness
        .mac
        .borrow_mut()
        .pending_confirms
        .push(MlmeConfirm::Reset);
    harness.rx_frame(RxSlot::Rx1);

    // ResetConf stops the staging
    assert_eq!(harness.lorawan.send(5, &[1], MsgFlags::UNCONFIRMED), 1);
    assert_eq!(harness.mac.borrow().reset_inds, 1);
}

#[test]
fn test_lw11_rekey_staged_until_limit() {
    let harness = lw11_otaa_harness();
    harness.mac.borrow_mut().adr_ack_limit = 2;
    join_otaa(&harness);

    harness.mac.borrow_mut().confirmation.status = MacEventStatus::Ok;
    for _ in 0..2 {
        assert!(harness.transmit(5, &[1], MsgFlags::UNCONFIRMED) > 0);
        harness.rx_windows_timeout();
    }
    assert_eq!(harness.mac.borrow().rekey_inds, 2);
    assert_eq!(harness.count_events(Event::JoinFailure), 0);

    // no RekeyConf within the ADR ack limit: the session is declared dead
    assert!(harness.lorawan.send(5, &[1], MsgFlags::UNCONFIRMED) > 0);
    assert_eq!(harness.mac.borrow().rekey_inds, 2);
    harness.pump();
    assert_eq!(harness.count_events(Event::JoinFailure), 1);
}

#[test]
fn test_lw11_periodic_type1_rejoin_blocks_traffic() {
    let harness = lw11_otaa_harness();
    join_otaa(&harness);

    harness.mac.borrow_mut().confirmation.status = MacEventStatus::Ok;
    // past the type-1 send period
    harness.clock.advance_ms(3_601_000);
    assert_eq!(harness.lorawan.send(5, &[1], MsgFlags::UNCONFIRMED), 1);
    harness.lorawan.radio_event(RadioEvent::TxDone);
    harness.pump();
    harness.rx_windows_timeout();

    let rejoins = harness.mac.borrow().rejoin_calls.clone();
    assert_eq!(rejoins, vec![(RejoinType::Type1, false, 0)]);

    // user traffic is refused while the rejoin owns the TX path
    assert_eq!(
        harness.lorawan.send(5, &[2], MsgFlags::UNCONFIRMED),
        Status::Busy.as_i16()
    );

    // the rejoin cycle completes without touching the application
    harness.lorawan.radio_event(RadioEvent::TxDone);
    harness.pump();
    harness.rx_windows_timeout();
    assert_eq!(harness.count_events(Event::TxDone), 1);

    assert_eq!(harness.lorawan.send(5, &[2], MsgFlags::UNCONFIRMED), 1);
}

#[test]
fn test_lw11_type0_rejoin_on_downlink_count() {
    let harness = lw11_otaa_harness();
    harness.mac.borrow_mut().rejoin_max_count = 3;
    join_otaa(&harness);

    harness.mac.borrow_mut().confirmation.status = MacEventStatus::Ok;
    // join reception counted 1; the two window timeouts reach the limit
    assert_eq!(harness.lorawan.send(5, &[1], MsgFlags::UNCONFIRMED), 1);
    harness.lorawan.radio_event(RadioEvent::TxDone);
    harness.pump();
    harness.rx_windows_timeout();

    let rejoins = harness.mac.borrow().rejoin_calls.clone();
    assert_eq!(rejoins, vec![(RejoinType::Type0, false, 0)]);
    // the max-time timer is re-armed
    let timers = harness.queue.borrow().timers.clone();
    assert!(timers
        .iter()
        .any(|(t, p)| *t == StackTimer::RejoinType0 && *p == 3_600_000));
}

#[test]
fn test_forced_rejoin_bounded_retries() {
    let harness = lw11_otaa_harness();
    join_otaa(&harness);

    harness.mac.borrow_mut().confirmation.status = MacEventStatus::Ok;
    assert_eq!(harness.lorawan.send(5, &[1], MsgFlags::UNCONFIRMED), 1);
    harness.lorawan.radio_event(RadioEvent::TxDone);
    harness.pump();

    harness
        .mac
        .borrow_mut()
        .pending_confirms
        .push(MlmeConfirm::ForceRejoin {
            rejoin_type: RejoinType::Type1,
            datarate: 3,
            period: 0,
            max_retries: 2,
        });
    harness.rx_frame(RxSlot::Rx1);

    // type-1 is demoted to type-0 and sent immediately at the forced rate
    let forced: Vec<_> = harness
        .mac
        .borrow()
        .rejoin_calls
        .iter()
        .filter(|(_, is_forced, _)| *is_forced)
        .cloned()
        .collect();
    assert_eq!(forced, vec![(RejoinType::Type0, true, 3)]);

    // retry period is 2^0 * 32 s plus at most 32 s of jitter
    {
        let timers = harness.queue.borrow().timers.clone();
        let (_, period) = timers
            .iter()
            .find(|(t, _)| *t == StackTimer::ForcedRejoin)
            .copied()
            .unwrap();
        assert!((32_000..=64_000).contains(&period));
    }

    // max_retries 2 buys three timer-driven attempts, then the cycle ends
    for _ in 0..3 {
        harness.fire_timer(StackTimer::ForcedRejoin);
    }
    let forced_count = harness
        .mac
        .borrow()
        .rejoin_calls
        .iter()
        .filter(|(_, is_forced, _)| *is_forced)
        .count();
    assert_eq!(forced_count, 4);

    harness.fire_timer(StackTimer::ForcedRejoin);
    let timers = harness.queue.borrow().timers.clone();
    assert!(!timers.iter().any(|(t, _)| *t == StackTimer::ForcedRejoin));
    assert_eq!(
        harness
            .mac
            .borrow()
            .rejoin_calls
            .iter()
            .filter(|(_, is_forced, _)| *is_forced)
            .count(),
        4
    );
}

#[test]
fn test_beacon_acquisition_events() {
    let harness = TestHarness::new();
    harness.bring_up();
    harness.connect_abp();

    assert_eq!(harness.lorawan.get_last_rx_beacon(), Err(Status::NoBeaconFound));

    assert_eq!(harness.lorawan.enable_beacon_acquisition(), Status::Ok);
    assert_eq!(harness.mac.borrow().beacon_trials, Some(8));

    harness.lorawan.dispatch(StackWork::BeaconEvent {
        status: BeaconStatus::AcquisitionFailed,
    });
    harness.pump();
    assert_eq!(harness.count_events(Event::BeaconNotFound), 1);

    harness.mac.borrow_mut().beacon = Some(Beacon {
        time: 500_000,
        frequency: 869_525_000,
        datarate: 3,
        rssi: -100,
        snr: 2,
        gw_specific: [0; 7],
    });
    harness.lorawan.dispatch(StackWork::BeaconEvent {
        status: BeaconStatus::AcquisitionSuccess,
    });
    harness.pump();
    assert_eq!(harness.count_events(Event::BeaconFound), 1);
    assert_eq!(harness.lorawan.get_current_gps_time(), 500_000_000);
    assert_eq!(harness.lorawan.get_last_rx_beacon().unwrap().time, 500_000);
}

#[test]
fn test_class_c_confirmed_downlink_acks_automatically() {
    let harness = TestHarness::new();
    harness.bring_up();
    harness.connect_abp();

    assert_eq!(harness.lorawan.set_device_class(DeviceClass::C), Status::Ok);

    harness.mac.borrow_mut().confirmation.status = MacEventStatus::Ok;
    assert_eq!(harness.lorawan.send(5, &[1], MsgFlags::UNCONFIRMED), 1);
    harness.lorawan.radio_event(RadioEvent::TxDone);
    harness.pump();
    harness.rx_frame(RxSlot::ClassC);
    // Class C rests in the receiving state
    assert_eq!(harness.lorawan.device_state(), DeviceState::Receiving);

    {
        let mut mac = harness.mac.borrow_mut();
        mac.indication.is_data_recvd = true;
        mac.indication.pending = true;
        mac.indication.port = 6;
        mac.indication.msg_type = lorawan_stack::mac::McpsType::Confirmed;
        mac.indication.data.extend_from_slice(&[0x01]).unwrap();
    }
    harness.rx_frame(RxSlot::ClassC);

    assert_eq!(harness.count_events(Event::RxDone), 1);
    // the confirmed downlink was acknowledged with an empty uplink
    let (port, len, flags, _) = *harness.mac.borrow().prepare_calls.last().unwrap();
    assert_eq!(port, 6);
    assert_eq!(len, 0);
    assert_eq!(flags, MsgFlags::CONFIRMED);
}
