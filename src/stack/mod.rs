//! The stack controller: activation, session, transmit/receive pipelines,
//! class switching, beacons and rejoin scheduling.
//!
//! The controller is a single-threaded state machine. Radio interrupt edges
//! and user calls both funnel into it through the facade; anything that
//! cannot complete inline is posted to the event queue as a typed
//! [`StackWork`] item and finished by a later `dispatch`.

pub mod rejoin;

use bitflags::bitflags;
use log::{debug, error, info};

use crate::config::{ConnectParams, StackConfig, INVALID_PORT};
use crate::event::{AppCallbacks, Event};
use crate::gps_time::{GpsTimeMs, GpsTimeRef};
use crate::mac::{
    Beacon, BeaconStatus, ChannelPlan, DeviceClass, MacEventStatus, MacOps, MlmeConfirm,
    MlmeIndicationType, McpsType, RejoinType, RxSlot, Version, PHY_MAX_PAYLOAD,
};
use crate::message::{MsgFlags, RxMessage, TxMessage};
use crate::metadata::{RxMetadata, TxMetadata};
use crate::session::{Activation, SessionState};
use crate::status::Status;
use crate::system::{Clock, EventQueue, RadioEvent, StackTimer, StackWork};

use self::rejoin::RejoinState;

/// Reserved port for LoRaWAN compliance testing.
pub const COMPLIANCE_TESTING_PORT: u8 = 224;

const MAX_CONFIRMED_MSG_RETRIES: u8 = 255;

bitflags! {
    /// Transient condition flags; several may be set at once.
    ///
    /// `CONN_IN_PROGRESS` and `CONNECTED` are mutually exclusive by
    /// construction: the connected transition clears the former as it sets
    /// the latter.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ControlFlags: u32 {
        /// Confirmed retransmissions were exhausted without an ack.
        const RETRY_EXHAUSTED = 0x01;
        /// A downlink indication awaits delivery to the application.
        const MSG_RECVD = 0x02;
        /// A session with the network is established.
        const CONNECTED = 0x04;
        /// The session was (or is being) established over the air.
        const USING_OTAA = 0x08;
        /// The current outbound cycle has completed successfully.
        const TX_DONE = 0x10;
        /// A connection attempt is underway.
        const CONN_IN_PROGRESS = 0x20;
        /// A rejoin occupies the TX path; user traffic is refused.
        const REJOIN_IN_PROGRESS = 0x40;
    }
}

/// Externally visible device states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// `initialize` has not run yet.
    NotInitialized,
    /// At rest, ready for user requests.
    Idle,
    /// A connection request is being set up.
    Connecting,
    /// A JoinRequest is on the air.
    Joining,
    /// Waiting for the JoinAccept windows.
    AwaitingJoinAccept,
    /// Transient: a session was just established.
    Connected,
    /// An outbound message is being scheduled.
    Scheduling,
    /// An outbound message is on the air.
    Sending,
    /// A confirmed uplink awaits its acknowledgement.
    AwaitingAck,
    /// A downlink is being processed (rest state for Class C).
    Receiving,
    /// Transient: post-cycle flag evaluation.
    StatusCheck,
    /// Shut down; only re-initialisation leaves this state.
    Shutdown,
}

/// Staging area between the radio interrupt edge and deferred processing.
///
/// Ownership is exclusive: once claimed, further receptions are dropped until
/// the processor releases it.
struct RxStaging {
    buf: [u8; PHY_MAX_PAYLOAD],
    size: u16,
    rssi: i16,
    snr: i8,
    in_use: bool,
}

impl RxStaging {
    fn new() -> Self {
        Self {
            buf: [0; PHY_MAX_PAYLOAD],
            size: 0,
            rssi: 0,
            snr: 0,
            in_use: false,
        }
    }

    /// Claims the buffer for a fresh payload. False when it is still owned
    /// by an unfinished processor or the payload does not fit.
    fn try_claim(&mut self, payload: &[u8], rssi: i16, snr: i8) -> bool {
        if self.in_use || payload.len() > self.buf.len() {
            return false;
        }
        self.in_use = true;
        self.buf[..payload.len()].copy_from_slice(payload);
        self.size = payload.len() as u16;
        self.rssi = rssi;
        self.snr = snr;
        true
    }

    fn release(&mut self) {
        self.in_use = false;
    }
}

/// The LoRaWAN stack controller.
///
/// Owns the session, the message buffers and the lower MAC; driven by user
/// calls, radio edges and dispatched work items, all serialised by the
/// facade.
pub struct LoRaWANStack<M: MacOps, C: Clock, Q: EventQueue, A: AppCallbacks> {
    mac: M,
    clock: C,
    queue: Q,
    callbacks: Option<A>,
    config: StackConfig,
    state: DeviceState,
    flags: ControlFlags,
    session: SessionState,
    tx_msg: TxMessage,
    rx_msg: RxMessage,
    rx_staging: RxStaging,
    tx_metadata: TxMetadata,
    rx_metadata: RxMetadata,
    num_retry: u8,
    qos_cnt: u8,
    app_port: u8,
    link_check_requested: bool,
    reset_ind_requested: bool,
    rekey_ind_needed: bool,
    rekey_ind_counter: u8,
    device_mode_ind_needed: bool,
    new_class: DeviceClass,
    automatic_uplink_ongoing: bool,
    tx_timestamp: u64,
    rx_timestamp: u64,
    gps_time: GpsTimeRef,
    rejoin: RejoinState,
    device_time_requested: bool,
    ping_slot_info_requested: bool,
    last_beacon_rx_time: u64,
}

impl<M: MacOps, C: Clock, Q: EventQueue, A: AppCallbacks> LoRaWANStack<M, C, Q, A> {
    /// Builds an uninitialised stack over the given collaborators.
    pub fn new(mac: M, clock: C, queue: Q, config: StackConfig) -> Self {
        let mut app_port = INVALID_PORT;
        if is_port_valid(config.app_port, false) {
            app_port = config.app_port;
        } else {
            error!("configured application port {} is illegal", config.app_port);
        }

        let rejoin = RejoinState::new(config.rejoin_type1_send_period);
        let num_retry = config.confirmed_msg_retries;

        Self {
            mac,
            clock,
            queue,
            callbacks: None,
            config,
            state: DeviceState::NotInitialized,
            flags: ControlFlags::empty(),
            session: SessionState::new(),
            tx_msg: TxMessage::new(),
            rx_msg: RxMessage::new(),
            rx_staging: RxStaging::new(),
            tx_metadata: TxMetadata::new(),
            rx_metadata: RxMetadata::new(),
            num_retry,
            qos_cnt: 1,
            app_port,
            link_check_requested: false,
            reset_ind_requested: false,
            rekey_ind_needed: false,
            rekey_ind_counter: 0,
            device_mode_ind_needed: false,
            new_class: DeviceClass::A,
            automatic_uplink_ongoing: false,
            tx_timestamp: 0,
            rx_timestamp: 0,
            gps_time: GpsTimeRef::new(),
            rejoin,
            device_time_requested: false,
            ping_slot_info_requested: false,
            last_beacon_rx_time: 0,
        }
    }

    /// Brings the MAC up and moves to `Idle`.
    pub fn initialize(&mut self) -> Status {
        debug!("initializing MAC layer");
        self.state_controller(DeviceState::Idle)
    }

    /// Registers the application callback sink.
    pub fn add_app_callbacks(&mut self, callbacks: A) -> Status {
        if self.state == DeviceState::NotInitialized {
            return Status::NotInitialized;
        }
        self.callbacks = Some(callbacks);
        Status::Ok
    }

    /// Connects with the configured default activation.
    pub fn connect(&mut self) -> Status {
        if self.state == DeviceState::NotInitialized {
            return Status::NotInitialized;
        }
        if self.flags.contains(ControlFlags::CONN_IN_PROGRESS) {
            return Status::Busy;
        }
        if self.flags.contains(ControlFlags::CONNECTED) {
            return Status::AlreadyConnected;
        }

        let is_otaa = self.config.over_the_air_activation;
        let status = self.mac.prepare_join(None, is_otaa);
        if status != Status::Ok {
            return status;
        }
        self.handle_connect(is_otaa)
    }

    /// Connects with explicit parameters.
    pub fn connect_with(&mut self, params: &ConnectParams) -> Status {
        if self.state == DeviceState::NotInitialized {
            return Status::NotInitialized;
        }
        if self.flags.contains(ControlFlags::CONN_IN_PROGRESS) {
            return Status::Busy;
        }
        if self.flags.contains(ControlFlags::CONNECTED) {
            return Status::AlreadyConnected;
        }

        let is_otaa = params.is_otaa();
        let status = self.mac.prepare_join(Some(params), is_otaa);
        if status != Status::Ok {
            return status;
        }
        self.handle_connect(is_otaa)
    }

    /// Tears the stack down; `Disconnected` is emitted once shut down.
    pub fn shutdown(&mut self) -> Status {
        if self.state == DeviceState::NotInitialized {
            return Status::NotInitialized;
        }
        self.state_controller(DeviceState::Shutdown)
    }

    /// Submits an uplink. Returns the accepted byte count, or a negative
    /// [`Status`] value.
    ///
    /// `null_allowed` and `allow_port_0` exist for the internal automatic
    /// uplink path; user calls pass false for both.
    pub fn handle_tx(
        &mut self,
        port: u8,
        data: &[u8],
        flags: MsgFlags,
        null_allowed: bool,
        allow_port_0: bool,
    ) -> i16 {
        if self.state == DeviceState::NotInitialized {
            return Status::NotInitialized.as_i16();
        }

        if !null_allowed && data.is_empty() {
            return Status::ParameterInvalid.as_i16();
        }

        if self.flags.contains(ControlFlags::REJOIN_IN_PROGRESS) {
            return Status::Busy.as_i16();
        }

        // ResetInd is only used by ABP devices after connect, until a
        // ResetConf arrives
        if self.reset_ind_requested {
            self.mac.setup_reset_indication();
        } else if self.rekey_ind_needed {
            if self.rekey_ind_counter < self.mac.get_current_adr_ack_limit() {
                self.mac.setup_rekey_indication();
                self.rekey_ind_counter += 1;
            } else {
                self.rekey_ind_needed = false;
                self.send_event(Event::JoinFailure);
                self.state = DeviceState::Idle;
            }
        }

        if self.device_mode_ind_needed {
            self.mac.setup_device_mode_indication(self.new_class);
        }

        if !self.session.active {
            return Status::NoActiveSessions.as_i16();
        }

        if self.mac.tx_ongoing() {
            return Status::WouldBlock.as_i16();
        }

        // sticky requests ride along on every uplink until removed
        if self.link_check_requested {
            self.mac.setup_link_check_request();
        }
        if self.device_time_requested {
            self.mac.setup_device_time_request();
        }
        if self.ping_slot_info_requested {
            self.mac.add_ping_slot_info_req();
        }

        if let Some(callbacks) = self.callbacks.as_mut() {
            let level = callbacks.battery_level();
            self.mac.set_battery_level(level);
        }

        self.qos_cnt = 1;

        if !self.mac.nwk_joined() {
            return Status::NoNetworkJoined.as_i16();
        }

        let status = self.set_application_port(port, allow_port_0);
        if status != Status::Ok {
            error!("illegal application port definition");
            return status.as_i16();
        }

        if !flags.is_valid_for_uplink() {
            error!("invalid send flags");
            return Status::ParameterInvalid.as_i16();
        }

        self.tx_msg.stage(port, data, flags, self.num_retry);
        let len = self
            .mac
            .prepare_ongoing_tx(port, &self.tx_msg.data, flags, self.num_retry);

        let status = self.state_controller(DeviceState::Scheduling);

        // the caller gets the amount actually scheduled and handles the rest
        if status == Status::Ok {
            len
        } else {
            status.as_i16()
        }
    }

    /// Drains the buffered downlink into `data`.
    ///
    /// Returns `(bytes_copied, port, flags)`; 0 bytes means nothing left to
    /// read. With `validate_params`, a pending message whose port or type do
    /// not match is left untouched and `WouldBlock` is returned.
    pub fn handle_rx(
        &mut self,
        data: &mut [u8],
        port: u8,
        flags: MsgFlags,
        validate_params: bool,
    ) -> (i16, u8, MsgFlags) {
        if self.state == DeviceState::NotInitialized {
            return (Status::NotInitialized.as_i16(), 0, MsgFlags::empty());
        }

        if !self.session.active {
            return (Status::NoActiveSessions.as_i16(), 0, MsgFlags::empty());
        }

        if !self.rx_msg.receive_ready {
            // nothing else to read
            return (0, 0, MsgFlags::empty());
        }

        if data.is_empty() {
            return (Status::ParameterInvalid.as_i16(), 0, MsgFlags::empty());
        }

        let received_flags = MsgFlags::from_mcps_type(self.rx_msg.msg_type);
        if validate_params && (self.rx_msg.port != port || !flags.intersects(received_flags)) {
            return (Status::WouldBlock.as_i16(), 0, MsgFlags::empty());
        }

        let msg_port = self.rx_msg.port;
        let copied = self.rx_msg.read(data);
        (copied as i16, msg_port, received_flags)
    }

    /// Sets the retry budget for confirmed messages (at most 254).
    pub fn set_confirmed_msg_retry(&mut self, count: u8) -> Status {
        if self.state == DeviceState::NotInitialized {
            return Status::NotInitialized;
        }
        if count >= MAX_CONFIRMED_MSG_RETRIES {
            return Status::ParameterInvalid;
        }
        self.num_retry = count;
        Status::Ok
    }

    /// Fixes the uplink data rate.
    pub fn set_channel_data_rate(&mut self, data_rate: u8) -> Status {
        if self.state == DeviceState::NotInitialized {
            return Status::NotInitialized;
        }
        self.mac.set_channel_data_rate(data_rate)
    }

    /// Enables or disables ADR.
    pub fn enable_adaptive_datarate(&mut self, adr_enabled: bool) -> Status {
        if self.state == DeviceState::NotInitialized {
            return Status::NotInitialized;
        }
        self.mac.enable_adaptive_datarate(adr_enabled);
        Status::Ok
    }

    /// Merges channels into the active plan.
    pub fn add_channels(&mut self, plan: &ChannelPlan) -> Status {
        if self.state == DeviceState::NotInitialized {
            return Status::NotInitialized;
        }
        self.mac.add_channel_plan(plan)
    }

    /// Removes a single channel.
    pub fn remove_a_channel(&mut self, channel_id: u8) -> Status {
        if self.state == DeviceState::NotInitialized {
            return Status::NotInitialized;
        }
        self.mac.remove_single_channel(channel_id)
    }

    /// Drops every user-provided channel.
    pub fn drop_channel_list(&mut self) -> Status {
        if self.state == DeviceState::NotInitialized {
            return Status::NotInitialized;
        }
        self.mac.remove_channel_plan()
    }

    /// Copies the enabled channels into `plan`.
    pub fn get_enabled_channels(&self, plan: &mut ChannelPlan) -> Status {
        if self.state == DeviceState::NotInitialized {
            return Status::NotInitialized;
        }
        self.mac.get_channel_plan(plan)
    }

    /// Stages a LinkCheckReq on every following uplink.
    pub fn set_link_check_request(&mut self) -> Status {
        if self.state == DeviceState::NotInitialized {
            return Status::NotInitialized;
        }
        let handles_link_check = self
            .callbacks
            .as_ref()
            .map(|c| c.handles_link_check())
            .unwrap_or(false);
        if !handles_link_check {
            error!("a link check response handler must be declared first");
            return Status::ParameterInvalid;
        }
        self.link_check_requested = true;
        Status::Ok
    }

    /// Stops staging LinkCheckReq; an already queued request may still go out.
    pub fn remove_link_check_request(&mut self) {
        self.link_check_requested = false;
    }

    /// Stages a DeviceTimeReq on every following uplink.
    pub fn set_device_time_request(&mut self) -> Status {
        if self.state == DeviceState::NotInitialized {
            Status::NotInitialized
        } else if !self.mac.nwk_joined() {
            Status::NoNetworkJoined
        } else {
            self.device_time_requested = true;
            Status::Ok
        }
    }

    /// Stops staging DeviceTimeReq.
    pub fn remove_device_time_request(&mut self) {
        self.device_time_requested = false;
    }

    /// Requests ping slots of the given periodicity (Class A only).
    pub fn add_ping_slot_info_request(&mut self, periodicity: u8) -> Status {
        if self.state == DeviceState::NotInitialized {
            return Status::NotInitialized;
        }
        if periodicity > 7 {
            return Status::ParameterInvalid;
        }
        // periodicity can only change while the device runs Class A
        if self.mac.get_device_class() != DeviceClass::A {
            return Status::NoOp;
        }
        let status = self.mac.set_ping_slot_info(periodicity);
        if status == Status::Ok {
            self.ping_slot_info_requested = true;
        }
        status
    }

    /// Stops staging PingSlotInfoReq.
    pub fn remove_ping_slot_info_request(&mut self) {
        self.ping_slot_info_requested = false;
    }

    /// Requests a class switch.
    ///
    /// Under LoRaWAN 1.1 a non-B switch is announced with a DeviceModeInd on
    /// the next uplink; the class actually changes when the matching
    /// DeviceModeConf arrives.
    pub fn set_device_class(&mut self, device_class: DeviceClass) -> Status {
        if self.state == DeviceState::NotInitialized {
            return Status::NotInitialized;
        }

        if self.mac.get_device_class() == device_class {
            return Status::Ok;
        }

        if self.mac.get_server_type() == Version::V1_1 && device_class != DeviceClass::B {
            self.new_class = device_class;
            self.device_mode_ind_needed = true;
            Status::Ok
        } else {
            self.mac.set_device_class(device_class)
        }
    }

    /// Hands out the last transmission metadata, once.
    pub fn acquire_tx_metadata(&mut self) -> Result<TxMetadata, Status> {
        if self.state == DeviceState::NotInitialized {
            return Err(Status::NotInitialized);
        }
        if !self.tx_metadata.stale {
            let metadata = self.tx_metadata;
            self.tx_metadata.stale = true;
            Ok(metadata)
        } else {
            Err(Status::MetadataNotAvailable)
        }
    }

    /// Hands out the last reception metadata, once.
    pub fn acquire_rx_metadata(&mut self) -> Result<RxMetadata, Status> {
        if self.state == DeviceState::NotInitialized {
            return Err(Status::NotInitialized);
        }
        if !self.rx_metadata.stale {
            let metadata = self.rx_metadata;
            self.rx_metadata.stale = true;
            Ok(metadata)
        } else {
            Err(Status::MetadataNotAvailable)
        }
    }

    /// Milliseconds until the pending transmission leaves backoff.
    pub fn acquire_backoff_metadata(&self) -> Result<u32, Status> {
        if self.state == DeviceState::NotInitialized {
            return Err(Status::NotInitialized);
        }
        self.mac
            .backoff_time_left_ms()
            .ok_or(Status::MetadataNotAvailable)
    }

    /// Aborts the pending transmission if the radio has not been armed.
    pub fn stop_sending(&mut self) -> Status {
        if self.state == DeviceState::NotInitialized {
            return Status::NotInitialized;
        }

        let status = self.mac.clear_tx_pipe();
        if status == Status::Ok {
            self.flags.remove(ControlFlags::TX_DONE);
            self.mac.set_tx_ongoing(false);
            self.state = DeviceState::Idle;
        }
        status
    }

    /// Current GPS time in milliseconds, 0 when the network never provided
    /// one.
    pub fn get_current_gps_time(&self) -> GpsTimeMs {
        self.gps_time.get(self.clock.now_ms())
    }

    /// Stores a network-provided GPS time against the current tick.
    pub fn set_current_gps_time(&mut self, gps_time_ms: GpsTimeMs) {
        self.gps_time.set(gps_time_ms, self.clock.now_ms());
    }

    /// Starts beacon acquisition and tracking.
    pub fn enable_beacon_acquisition(&mut self) -> Status {
        if self.state == DeviceState::NotInitialized {
            return Status::NotInitialized;
        }
        self.mac
            .enable_beacon_acquisition(self.config.beacon_acquisition_nb_trials)
    }

    /// Contents of the last received beacon.
    pub fn get_last_rx_beacon(&self) -> Result<Beacon, Status> {
        if self.state == DeviceState::NotInitialized {
            return Err(Status::NotInitialized);
        }
        self.mac.get_last_rx_beacon()
    }

    /// Current device state.
    pub fn device_state(&self) -> DeviceState {
        self.state
    }

    /// Current control flags.
    pub fn control_flags(&self) -> ControlFlags {
        self.flags
    }

    /// Session bookkeeping.
    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Whether an unread downlink is buffered.
    pub fn receive_ready(&self) -> bool {
        self.rx_msg.receive_ready
    }

    /// Handles a radio interrupt edge: timestamps, stages and defers.
    pub fn radio_event(&mut self, event: RadioEvent<'_>) {
        match event {
            RadioEvent::TxDone => {
                self.tx_timestamp = self.clock.now_ms();
                self.post(StackWork::ProcessTransmission);
            }
            RadioEvent::TxTimeout => {
                self.post(StackWork::ProcessTransmissionTimeout);
            }
            RadioEvent::RxDone { payload, rssi, snr } => {
                // a second frame while the first is unprocessed is dropped
                if !self.rx_staging.try_claim(payload, rssi, snr) {
                    return;
                }
                self.rx_timestamp = self.clock.now_ms();
                self.post(StackWork::ProcessReception);
            }
            RadioEvent::RxTimeout => {
                self.post(StackWork::ProcessReceptionTimeout { is_timeout: true });
            }
            RadioEvent::RxError => {
                self.post(StackWork::ProcessReceptionTimeout { is_timeout: false });
            }
        }
    }

    /// Runs one deferred work item to completion.
    pub fn dispatch(&mut self, work: StackWork) {
        match work {
            StackWork::ProcessTransmission => self.process_transmission(),
            StackWork::ProcessTransmissionTimeout => self.process_transmission_timeout(),
            StackWork::ProcessReception => self.process_reception(),
            StackWork::ProcessReceptionTimeout { is_timeout } => {
                self.process_reception_timeout(is_timeout)
            }
            StackWork::ScheduleTransmission => {
                let status = self.state_controller(DeviceState::Scheduling);
                if status != Status::Ok {
                    debug!("deferred scheduling refused: {:?}", status);
                }
            }
            StackWork::AutomaticUplink { port } => self.send_automatic_uplink_message(port),
            StackWork::ProcessRejoin {
                rejoin_type,
                forced,
            } => self.process_rejoin(rejoin_type, forced),
            StackWork::RejoinType0 => self.process_rejoin_type0(),
            StackWork::ForcedRejoinRetry => self.forced_rejoin_retry(),
            StackWork::AckTimeout => self.post_process_tx_no_reception(),
            StackWork::SchedulingFailure => self.handle_scheduling_failure(),
            StackWork::BeaconEvent { status } => self.process_beacon_event(status),
            StackWork::DeliverEvent { event } => {
                if let Some(callbacks) = self.callbacks.as_mut() {
                    callbacks.events(event);
                }
            }
            StackWork::LinkCheckResponse {
                demod_margin,
                nb_gateways,
            } => {
                if let Some(callbacks) = self.callbacks.as_mut() {
                    callbacks.link_check_resp(demod_margin, nb_gateways);
                }
            }
        }
    }

    /*
     * Deferred processors
     */

    fn process_transmission(&mut self) {
        debug!("transmission completed");

        self.make_tx_metadata_available();

        if self.state == DeviceState::Joining {
            self.state = DeviceState::AwaitingJoinAccept;
        }

        if self.state == DeviceState::Sending
            && self.mac.get_mcps_confirmation().req_type == McpsType::Confirmed
        {
            debug!("awaiting ack");
            self.state = DeviceState::AwaitingAck;
        }

        self.mac.on_radio_tx_done(self.tx_timestamp);
    }

    fn process_transmission_timeout(&mut self) {
        // fatal for the in-flight message
        debug!("tx timeout");
        self.mac.on_radio_tx_timeout();
        self.flags.remove(ControlFlags::TX_DONE);
        if self.state == DeviceState::Joining {
            self.state = DeviceState::Idle;
            error!("join abandoned, radio failed to transmit");
            self.send_event(Event::TxTimeout);
        } else {
            let _ = self.state_controller(DeviceState::StatusCheck);
        }

        self.state_machine_run_to_completion();
    }

    fn process_reception(&mut self) {
        self.state = DeviceState::Receiving;

        self.flags.remove(ControlFlags::MSG_RECVD);
        self.flags.remove(ControlFlags::TX_DONE);
        self.flags.remove(ControlFlags::RETRY_EXHAUSTED);

        self.rejoin.type0_counter += 1;

        let joined = self.mac.nwk_joined();
        let rx_slot = self.mac.get_current_slot();

        let size = usize::from(self.rx_staging.size);
        let (rssi, snr) = (self.rx_staging.rssi, self.rx_staging.snr);
        let confirms =
            self.mac
                .on_radio_rx_done(&self.rx_staging.buf[..size], rssi, snr, self.rx_timestamp);
        for confirm in confirms {
            self.mlme_confirm_handler(confirm);
        }

        if !joined {
            self.rx_staging.release();
            return;
        }

        if self.flags.contains(ControlFlags::REJOIN_IN_PROGRESS) {
            // rejoin traffic never reaches the application
            self.flags.remove(ControlFlags::REJOIN_IN_PROGRESS);
            self.rx_staging.release();
            return;
        }

        self.make_rx_metadata_available();

        match rx_slot {
            RxSlot::Rx1 | RxSlot::Rx2 | RxSlot::ClassC => {
                self.post_process_tx_with_reception();

                if self.mac.get_mcps_indication().pending {
                    self.mac.post_process_mcps_ind();
                    self.flags.insert(ControlFlags::MSG_RECVD);
                    let _ = self.state_controller(DeviceState::StatusCheck);
                }

                // the cycle is over once the TX pipe has been released
                if !self.mac.tx_ongoing() {
                    self.state_machine_run_to_completion();
                }

                // suppress a second automatic uplink while one is in flight
                if let Some(mlme) = self.mac.get_mlme_indication() {
                    if mlme.pending && !self.automatic_uplink_ongoing {
                        debug!("MLME indication pending");
                        self.mac.post_process_mlme_ind();
                        self.mlme_indication_handler();
                    }
                }

                if self.rejoin_applicable() {
                    self.poll_rejoin();
                }
            }
            RxSlot::Beacon => {
                // beacon frames are accounted separately
            }
            RxSlot::UnicastPingSlot | RxSlot::MulticastPingSlot => {
                self.flags.insert(ControlFlags::MSG_RECVD);
                let _ = self.state_controller(DeviceState::StatusCheck);
            }
        }

        self.rx_staging.release();
    }

    fn process_reception_timeout(&mut self, is_timeout: bool) {
        self.rejoin.type0_counter += 1;

        let rx_slot = self.mac.get_current_slot();

        // a CRC-damaged frame is handled exactly like an empty window
        self.mac.on_radio_rx_timeout(is_timeout);

        if rx_slot == RxSlot::Rx2 && !self.mac.nwk_joined() {
            let _ = self.state_controller(DeviceState::Joining);
            return;
        }

        // An UNCONFIRMED message is successful once both windows have
        // elapsed. A CONFIRMED one has not been acked and is retransmitted
        // while the retry budget lasts. Class C never reaches this point:
        // its RX2 window does not time out.
        if rx_slot == RxSlot::Rx2 {
            self.post_process_tx_no_reception();

            if self.rejoin_applicable() {
                self.poll_rejoin();
            }
        }
    }

    fn post_process_tx_with_reception(&mut self) {
        if self.mac.get_mcps_confirmation().req_type == McpsType::Confirmed {
            if self.mac.get_mcps_indication().is_ack_recvd {
                self.flags.insert(ControlFlags::TX_DONE);
                self.flags.remove(ControlFlags::RETRY_EXHAUSTED);
                debug!(
                    "ack received, retries used: {}",
                    self.mac.get_mcps_confirmation().nb_retries
                );
                self.mac.post_process_mcps_req();
                self.make_tx_metadata_available();
                let _ = self.state_controller(DeviceState::StatusCheck);
            } else if !self.mac.continue_sending_process()
                && self.mac.get_current_slot() != RxSlot::Rx1
            {
                // an RX1 miss is not final, the ack may still come in RX2
                error!("confirmed retries exhausted");
                self.flags.remove(ControlFlags::TX_DONE);
                self.flags.insert(ControlFlags::RETRY_EXHAUSTED);
                self.mac.post_process_mcps_req();
                self.make_tx_metadata_available();
                let _ = self.state_controller(DeviceState::StatusCheck);
            }
        } else {
            // UNCONFIRMED with a reception: RX slots were closed by a valid
            // downlink. QoS never applies to the message that carried the
            // QoS instruction itself, hence the previous-level comparison.
            let prev_qos_level = self.mac.get_prev_qos_level();
            let qos_level = self.mac.get_qos_level();

            if qos_level > self.config.default_qos
                && self.qos_cnt < qos_level
                && prev_qos_level == qos_level
            {
                self.flags.remove(ControlFlags::TX_DONE);
                self.post(StackWork::ScheduleTransmission);
                self.qos_cnt += 1;
                info!("QOS: repeated transmission #{} queued", self.qos_cnt);
            } else {
                self.mac.post_process_mcps_req();
                self.flags.insert(ControlFlags::TX_DONE);
                self.make_tx_metadata_available();
                let _ = self.state_controller(DeviceState::StatusCheck);
            }
        }
    }

    fn post_process_tx_no_reception(&mut self) {
        if self.flags.contains(ControlFlags::REJOIN_IN_PROGRESS) {
            self.flags.remove(ControlFlags::REJOIN_IN_PROGRESS);
            self.state_machine_run_to_completion();
            return;
        }

        if self.mac.get_mcps_confirmation().req_type == McpsType::Confirmed {
            if self.mac.continue_sending_process() {
                self.flags.remove(ControlFlags::TX_DONE);
                self.flags.remove(ControlFlags::RETRY_EXHAUSTED);
                return;
            }

            error!("confirmed retries exhausted");
            self.flags.remove(ControlFlags::TX_DONE);
            self.flags.insert(ControlFlags::RETRY_EXHAUSTED);
        } else {
            self.flags.insert(ControlFlags::TX_DONE);

            let prev_qos_level = self.mac.get_prev_qos_level();
            let qos_level = self.mac.get_qos_level();

            if qos_level > self.config.default_qos
                && prev_qos_level == qos_level
                && self.qos_cnt < qos_level
            {
                self.post(StackWork::ScheduleTransmission);
                self.qos_cnt += 1;
                info!("QOS: repeated transmission #{} queued", self.qos_cnt);
                self.state_machine_run_to_completion();
                return;
            }
        }

        self.mac.post_process_mcps_req();
        self.make_tx_metadata_available();
        let _ = self.state_controller(DeviceState::StatusCheck);
        self.state_machine_run_to_completion();
    }

    fn handle_scheduling_failure(&mut self) {
        error!("failed to schedule transmission");
        let _ = self.state_controller(DeviceState::StatusCheck);
        self.state_machine_run_to_completion();
    }

    /*
     * MLME / MCPS record handlers
     */

    fn mlme_indication_handler(&mut self) {
        let Some(indication) = self.mac.get_mlme_indication() else {
            return;
        };

        match indication.indication_type {
            MlmeIndicationType::ScheduleUplink => {
                // the MAC wants an uplink out as soon as possible
                if self.config.automatic_uplink {
                    self.automatic_uplink_ongoing = true;
                    debug!("queueing empty uplink on port 0 to flush MAC answers");
                    self.post(StackWork::AutomaticUplink { port: 0 });
                } else {
                    self.send_event(Event::UplinkRequired);
                }
            }
        }
    }

    fn mlme_confirm_handler(&mut self, confirm: MlmeConfirm) {
        match confirm {
            MlmeConfirm::LinkCheck {
                status,
                demod_margin,
                nb_gateways,
            } => {
                if status == MacEventStatus::Ok {
                    let handled = self
                        .callbacks
                        .as_ref()
                        .map(|c| c.handles_link_check())
                        .unwrap_or(false);
                    if handled {
                        self.post(StackWork::LinkCheckResponse {
                            demod_margin,
                            nb_gateways,
                        });
                    }
                }
            }
            MlmeConfirm::Reset => {
                self.reset_ind_requested = false;
            }
            MlmeConfirm::Rekey => {
                self.rekey_ind_needed = false;
                self.rekey_ind_counter = 0;
            }
            MlmeConfirm::DeviceMode { class } => {
                self.device_mode_ind_needed = false;
                if class == self.new_class {
                    // the switch only takes effect on the server's confirm
                    if self.mac.set_device_class(class) == Status::Ok {
                        self.send_event(Event::ClassChanged);
                        self.send_event(Event::ServerAcceptedClassInUse);
                    }
                } else {
                    self.send_event(Event::ServerDoesNotSupportClassInUse);
                }
            }
            MlmeConfirm::JoinAccept { status } => match status {
                MacEventStatus::Ok => {
                    if self.mac.get_server_type() == Version::V1_1 {
                        self.rekey_ind_needed = true;
                        self.rekey_ind_counter = 0;
                        // forced-rejoin timers keep running: this accept may
                        // answer a type-1 rejoin addressed to a different
                        // server
                    } else {
                        self.queue.stop_timer(StackTimer::ForcedRejoin);
                        self.queue.stop_timer(StackTimer::RejoinType0);
                    }
                    let _ = self.state_controller(DeviceState::Connected);
                }
                MacEventStatus::CryptoFail => {
                    // fatal for this attempt
                    self.state = DeviceState::Idle;
                    error!("join abandoned: crypto failure");
                    self.send_event(Event::CryptoError);
                }
                _ => {
                    if self.mac.get_server_type() == Version::V1_1
                        && self.flags.contains(ControlFlags::REJOIN_IN_PROGRESS)
                    {
                        // a failed rejoin is neither retried nor reported
                        return;
                    }

                    self.state = DeviceState::AwaitingJoinAccept;
                    let _ = self.state_controller(DeviceState::Joining);
                }
            },
            MlmeConfirm::ForceRejoin {
                rejoin_type,
                datarate,
                period,
                max_retries,
            } => {
                if self.mac.get_server_type() == Version::V1_1 {
                    self.rejoin.forced.datarate = datarate;
                    self.rejoin.forced.period_ms = self.rejoin.forced_period_ms(period);
                    self.rejoin.forced.retry_count =
                        if max_retries > 0 { max_retries + 1 } else { 0 };
                    // a forced type-1 is demoted to type-0 (LW1.1 §5.13)
                    self.rejoin.forced.rejoin_type = match rejoin_type {
                        RejoinType::Type1 => RejoinType::Type0,
                        other => other,
                    };
                    self.reset_forced_rejoin();
                    let forced_type = self.rejoin.forced.rejoin_type;
                    self.process_rejoin(forced_type, true);
                    if self.rejoin.forced.retry_count > 0 {
                        self.queue
                            .start_timer(StackTimer::ForcedRejoin, self.rejoin.forced.period_ms);
                    }
                }
            }
            MlmeConfirm::PingSlotInfo => {
                if self.ping_slot_info_requested {
                    self.ping_slot_info_requested = false;
                    self.send_event(Event::PingSlotInfoSynched);
                }
            }
            MlmeConfirm::BeaconAcquisition { status } => {
                if status == MacEventStatus::Ok {
                    self.send_event(Event::BeaconFound);
                } else {
                    self.send_event(Event::BeaconNotFound);
                }
            }
            MlmeConfirm::DeviceTime { gps_time_ms } => {
                self.handle_device_time_sync(gps_time_ms);
            }
        }
    }

    fn mcps_confirm_handler(&mut self) {
        let confirmation = self.mac.get_mcps_confirmation();
        match confirmation.status {
            MacEventStatus::Ok => {
                self.session.uplink_counter = confirmation.ul_frame_counter;
                self.send_event(Event::TxDone);
            }
            MacEventStatus::TxTimeout => {
                error!("radio failed to transmit");
                self.send_event(Event::TxTimeout);
            }
            MacEventStatus::TxSchedulingError => {
                self.send_event(Event::TxSchedulingError);
            }
            MacEventStatus::CryptoFail => {
                self.send_event(Event::TxCryptoError);
            }
            _ => {
                // no ack within the retry budget
                self.send_event(Event::TxError);
            }
        }
    }

    fn mcps_indication_handler(&mut self) {
        let indication = self.mac.get_mcps_indication();
        if indication.status != MacEventStatus::Ok {
            error!("rx failed: {:?}", indication.status);
            self.send_event(Event::RxError);
            return;
        }

        self.session.downlink_counter = indication.dl_frame_counter;

        if indication.port == COMPLIANCE_TESTING_PORT && !cfg!(feature = "compliance-test") {
            // compliance traffic is invisible unless compiled in
            return;
        }

        if indication.is_data_recvd {
            debug!(
                "packet received, {} bytes, port {}",
                indication.data.len(),
                indication.port
            );
            self.rx_msg
                .store(indication.port, indication.msg_type, &indication.data);
            self.send_event(Event::RxDone);
        }

        // fPending asks for an uplink so the network can flush its queue.
        // A Class C confirmed downlink needs an ack of its own: LW1.1
        // forbids further confirmed downlinks until one is sent.
        let device_class = self.mac.get_device_class();
        if (device_class != DeviceClass::C && indication.fpending)
            || (device_class == DeviceClass::C && indication.msg_type == McpsType::Confirmed)
        {
            if self.config.automatic_uplink {
                if !self.automatic_uplink_ongoing {
                    debug!("queueing empty uplink");
                    self.automatic_uplink_ongoing = true;
                    self.post(StackWork::AutomaticUplink {
                        port: indication.port,
                    });
                }
            } else {
                self.send_event(Event::UplinkRequired);
            }
        }
    }

    fn send_automatic_uplink_message(&mut self, port: u8) {
        let ret = self.handle_tx(port, &[], MsgFlags::CONFIRMED, true, true);
        if ret == Status::WouldBlock.as_i16() {
            // user traffic got there first, give way silently
            self.automatic_uplink_ongoing = false;
        } else if ret < 0 {
            debug!("automatic uplink failed, code {}", ret);
            self.send_event(Event::AutomaticUplinkError);
        }
    }

    fn handle_device_time_sync(&mut self, gps_time_ms: GpsTimeMs) {
        self.device_time_requested = false;
        // the network stamps the end of the uplink, compensate for the time
        // spent since
        let uplink_elapsed = self.clock.now_ms().saturating_sub(self.tx_timestamp);
        self.set_current_gps_time(gps_time_ms + uplink_elapsed);
        self.send_event(Event::DeviceTimeSynched);
    }

    /*
     * Rejoin engine
     */

    fn rejoin_applicable(&self) -> bool {
        self.config.version == Version::V1_1
            && self.mac.get_server_type() == Version::V1_1
            && self.flags.contains(ControlFlags::USING_OTAA)
    }

    fn poll_rejoin(&mut self) {
        if self.flags.contains(ControlFlags::REJOIN_IN_PROGRESS) {
            return;
        }

        // a due type-1 takes precedence over type-0
        let now_s = self.clock.now_ms() / 1000;
        if self.rejoin.type1_due(now_s) {
            self.flags.insert(ControlFlags::REJOIN_IN_PROGRESS);
            self.rejoin.type1_stamp = now_s;
            self.post(StackWork::ProcessRejoin {
                rejoin_type: RejoinType::Type1,
                forced: false,
            });
            return;
        }

        let (_max_time, max_count) = self.mac.get_rejoin_parameters();
        if self.rejoin.type0_counter >= max_count {
            self.rejoin.type0_counter = 0;
            self.flags.insert(ControlFlags::REJOIN_IN_PROGRESS);
            self.post(StackWork::RejoinType0);
        }
    }

    fn process_rejoin(&mut self, rejoin_type: RejoinType, is_forced: bool) {
        if self.mac.get_server_type() != Version::V1_1 {
            return;
        }

        let _ = self
            .mac
            .rejoin(rejoin_type, is_forced, self.rejoin.forced.datarate);
        if rejoin_type == RejoinType::Type0 {
            self.queue.stop_timer(StackTimer::RejoinType0);
            self.rejoin.type0_counter = 0;
            let (max_time, _max_count) = self.mac.get_rejoin_parameters();
            self.queue
                .start_timer(StackTimer::RejoinType0, max_time.saturating_mul(1000));
        }
    }

    fn process_rejoin_type0(&mut self) {
        if self.mac.get_server_type() == Version::V1_1 {
            self.process_rejoin(RejoinType::Type0, false);
        }
    }

    fn forced_rejoin_retry(&mut self) {
        if self.mac.get_server_type() != Version::V1_1 {
            return;
        }

        if self.rejoin.forced.counter < self.rejoin.forced.retry_count {
            self.rejoin.forced.counter += 1;
            let forced_type = self.rejoin.forced.rejoin_type;
            self.process_rejoin(forced_type, true);
            self.queue
                .start_timer(StackTimer::ForcedRejoin, self.rejoin.forced.period_ms);
        } else {
            self.reset_forced_rejoin();
        }
    }

    fn reset_forced_rejoin(&mut self) {
        self.rejoin.reset_forced();
        self.queue.stop_timer(StackTimer::ForcedRejoin);
    }

    /*
     * Beacon lifecycle
     */

    fn process_beacon_event(&mut self, status: BeaconStatus) {
        match status {
            BeaconStatus::AcquisitionFailed => {
                self.mlme_confirm_handler(MlmeConfirm::BeaconAcquisition {
                    status: MacEventStatus::BeaconNotFound,
                });
            }
            BeaconStatus::AcquisitionSuccess => {
                self.last_beacon_rx_time = self.clock.now_ms();
                self.sync_gps_time_from_beacon();
                self.mlme_confirm_handler(MlmeConfirm::BeaconAcquisition {
                    status: MacEventStatus::Ok,
                });
            }
            BeaconStatus::Lock => {
                self.last_beacon_rx_time = self.clock.now_ms();
                self.sync_gps_time_from_beacon();
                self.send_event(Event::BeaconLock);
            }
            BeaconStatus::Miss => {
                self.send_event(Event::BeaconMiss);
                // beacon-less operation window elapsed: fall back to Class A
                if self.mac.get_device_class() == DeviceClass::B {
                    let no_beacon_time =
                        self.clock.now_ms().saturating_sub(self.last_beacon_rx_time);
                    if no_beacon_time / 1000 >= u64::from(self.config.class_b_beaconless_period) {
                        let _ = self.mac.set_device_class(DeviceClass::A);
                        self.send_event(Event::SwitchClassBToA);
                    }
                }
            }
        }
    }

    fn sync_gps_time_from_beacon(&mut self) {
        if let Ok(beacon) = self.mac.get_last_rx_beacon() {
            if beacon.time != 0 {
                let now = self.clock.now_ms();
                self.gps_time.set(u64::from(beacon.time) * 1000, now);
            }
        }
    }

    /*
     * State machine
     */

    fn state_controller(&mut self, new_state: DeviceState) -> Status {
        match new_state {
            DeviceState::Idle => self.process_idle_state(),
            DeviceState::Connecting => self.process_connecting_state(),
            DeviceState::Joining => self.process_joining_state(),
            DeviceState::Connected => {
                self.process_connected_state();
                Status::Ok
            }
            DeviceState::Scheduling => self.process_scheduling_state(),
            DeviceState::StatusCheck => {
                self.process_status_check_state();
                Status::Ok
            }
            DeviceState::Shutdown => self.process_shutdown_state(),
            _ => {
                // only an internal coding error targets other states
                debug_assert!(false, "unknown state target: {:?}", new_state);
                Status::ServiceUnknown
            }
        }
    }

    fn process_idle_state(&mut self) -> Status {
        if self.state == DeviceState::NotInitialized {
            self.state = DeviceState::Idle;
            return self.process_uninitialized_state();
        }

        self.state = DeviceState::Idle;
        Status::Ok
    }

    fn process_uninitialized_state(&mut self) -> Status {
        let status = self.mac.initialize();
        if status == Status::Ok {
            self.state = DeviceState::Idle;
            let _ = self
                .mac
                .set_ping_slot_info(self.config.ping_slot_periodicity);
        }

        if self.config.version == Version::V1_1 {
            self.rejoin.type1_stamp = self.clock.now_ms() / 1000;
        }

        status
    }

    fn process_connecting_state(&mut self) -> Status {
        debug_assert!(
            self.state == DeviceState::Idle || self.state == DeviceState::Shutdown,
            "connect entered from {:?}",
            self.state
        );

        self.state = DeviceState::Connecting;

        if self.flags.contains(ControlFlags::USING_OTAA) {
            return self.process_joining_state();
        }

        let status = self.mac.join(false);
        debug!("ABP connection established");
        self.process_connected_state();
        status
    }

    fn process_joining_state(&mut self) -> Status {
        if self.state == DeviceState::Connecting {
            self.state = DeviceState::Joining;
            debug!("sending join request");
            let status = self.mac.join(true);
            return if status == Status::Ok {
                Status::ConnectInProgress
            } else {
                status
            };
        }

        if self.state == DeviceState::AwaitingJoinAccept
            && self.mac.get_current_slot() != RxSlot::Rx1
        {
            self.state = DeviceState::Joining;
            if !self.mac.continue_joining_process() {
                self.flags.remove(ControlFlags::CONN_IN_PROGRESS);
                self.send_event(Event::JoinFailure);
                self.state = DeviceState::Idle;
            }
        }

        Status::Ok
    }

    fn process_connected_state(&mut self) {
        self.flags.insert(ControlFlags::CONNECTED);
        self.flags.remove(ControlFlags::CONN_IN_PROGRESS);

        if self.flags.contains(ControlFlags::USING_OTAA) {
            info!("OTAA connection established");
            self.session.activation = Activation::Otaa;
        } else {
            self.session.activation = Activation::Abp;
        }

        self.session.active = true;
        self.send_event(Event::Connected);

        self.state = DeviceState::Idle;
    }

    fn process_scheduling_state(&mut self) -> Status {
        if self.state != DeviceState::Idle
            && self.state != DeviceState::Receiving
            && self.mac.get_device_class() != DeviceClass::C
        {
            return Status::Busy;
        }

        let status = self.mac.send_ongoing_tx();
        if status == Status::Ok {
            self.flags.remove(ControlFlags::TX_DONE);
            self.mac.set_tx_ongoing(true);
            self.state = DeviceState::Sending;
        }
        status
    }

    fn process_status_check_state(&mut self) {
        if self.state == DeviceState::Sending || self.state == DeviceState::AwaitingAck {
            // Terminal evaluation of a cycle that never saw a reception:
            // successful UNCONFIRMED after RX2, CONFIRMED with the retry
            // budget spent, or a scheduling failure.
            self.flags.remove(ControlFlags::TX_DONE);
            self.mac.set_tx_ongoing(false);
            self.mac.reset_ongoing_tx();
            self.mcps_confirm_handler();
        } else if self.state == DeviceState::Receiving {
            if self
                .flags
                .intersects(ControlFlags::TX_DONE | ControlFlags::RETRY_EXHAUSTED)
            {
                self.flags.remove(ControlFlags::TX_DONE);
                self.flags.remove(ControlFlags::RETRY_EXHAUSTED);
                self.mac.set_tx_ongoing(false);
                self.mac.reset_ongoing_tx();
                // an automatic uplink completes silently
                if self.automatic_uplink_ongoing {
                    self.automatic_uplink_ongoing = false;
                } else {
                    self.mcps_confirm_handler();
                }
            }

            if self.flags.contains(ControlFlags::MSG_RECVD) {
                self.flags.remove(ControlFlags::MSG_RECVD);
                self.mcps_indication_handler();
            }
        }
    }

    fn process_shutdown_state(&mut self) -> Status {
        // channels are dropped and the radio is put to sleep underneath
        let _ = self.mac.remove_channel_plan();
        self.mac.disconnect();
        self.session.active = false;
        self.state = DeviceState::Shutdown;
        self.flags = ControlFlags::empty();
        self.send_event(Event::Disconnected);
        Status::DeviceOff
    }

    fn state_machine_run_to_completion(&mut self) {
        if self.mac.get_device_class() == DeviceClass::C {
            self.state = DeviceState::Receiving;
            return;
        }

        self.state = DeviceState::Idle;
    }

    /*
     * Helpers
     */

    fn handle_connect(&mut self, is_otaa: bool) -> Status {
        self.flags.insert(ControlFlags::CONN_IN_PROGRESS);

        if is_otaa {
            debug!("initiating OTAA");
            // a fresh join starts from zeroed counters
            self.session.reset_counters();
            self.flags.insert(ControlFlags::USING_OTAA);
        } else {
            if self.config.version == Version::V1_1 {
                self.reset_ind_requested = true;
            }
            debug!(
                "initiating ABP, up counter {}, down counter {}",
                self.session.uplink_counter, self.session.downlink_counter
            );
            self.flags.remove(ControlFlags::USING_OTAA);
        }

        self.state_controller(DeviceState::Connecting)
    }

    fn set_application_port(&mut self, port: u8, allow_port_0: bool) -> Status {
        if is_port_valid(port, allow_port_0) {
            self.app_port = port;
            Status::Ok
        } else {
            Status::PortInvalid
        }
    }

    fn make_tx_metadata_available(&mut self) {
        let confirmation = self.mac.get_mcps_confirmation();
        self.tx_metadata.stale = false;
        self.tx_metadata.channel = confirmation.channel;
        self.tx_metadata.data_rate = confirmation.data_rate;
        self.tx_metadata.tx_power = confirmation.tx_power;
        self.tx_metadata.tx_toa = confirmation.tx_toa;
        self.tx_metadata.nb_retries = confirmation.nb_retries;
    }

    fn make_rx_metadata_available(&mut self) {
        let indication = self.mac.get_mcps_indication();
        self.rx_metadata.stale = false;
        self.rx_metadata.rx_datarate = indication.rx_datarate;
        self.rx_metadata.rssi = indication.rssi;
        self.rx_metadata.snr = indication.snr;
        self.rx_metadata.channel = indication.channel;
        self.rx_metadata.rx_toa = indication.rx_toa;
    }

    fn send_event(&mut self, event: Event) {
        if self.callbacks.is_some() {
            self.post(StackWork::DeliverEvent { event });
        }
    }

    fn post(&mut self, work: StackWork) {
        if !self.queue.post(work) {
            error!("event queue full, dropping {:?}", work);
        }
    }
}

// Reserved and illegal port numbers never reach the MAC. Port 0 carries MAC
// commands and is reachable only through the internal uplink path; 224 is
// the compliance port.
fn is_port_valid(port: u8, allow_port_0: bool) -> bool {
    match port {
        0 => allow_port_0,
        COMPLIANCE_TESTING_PORT => cfg!(feature = "compliance-test"),
        225..=u8::MAX => false,
        _ => true,
    }
}
