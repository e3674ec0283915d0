//! Contract with the lower MAC layer.
//!
//! The controller never touches frames, keys, channels or the radio itself;
//! it drives a [`MacOps`] implementation that owns frame construction,
//! cryptography, duty cycle, ADR and RX window scheduling, and reads back the
//! MCPS/MLME records the MAC produces. Everything here is the seam types for
//! that conversation.

use heapless::Vec;

use crate::config::ConnectParams;
use crate::gps_time::GpsTimeMs;
use crate::message::{MsgFlags, MAX_APP_PAYLOAD_SIZE};
use crate::status::Status;

/// Largest PHY payload a region allows; sizes the receive staging buffer.
pub const PHY_MAX_PAYLOAD: usize = 255;

/// Up to this many channels in a user channel plan.
pub const MAX_CHANNELS: usize = 16;

/// Protocol versions the stack can be configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum Version {
    /// LoRaWAN 1.0.2.
    V1_0_2,
    /// LoRaWAN 1.0.3.
    V1_0_3,
    /// LoRaWAN 1.1.
    V1_1,
}

/// LoRaWAN device class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    /// RX windows only after an uplink.
    A,
    /// Beacon-synchronised ping slots.
    B,
    /// Continuous reception.
    C,
}

/// Receive window the MAC most recently armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxSlot {
    /// First window after an uplink.
    Rx1,
    /// Second window after an uplink.
    Rx2,
    /// Continuous Class C window.
    ClassC,
    /// Beacon reception window.
    Beacon,
    /// Class B unicast ping slot.
    UnicastPingSlot,
    /// Class B multicast ping slot.
    MulticastPingSlot,
}

/// MAC-layer message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpsType {
    /// Unconfirmed data.
    Unconfirmed,
    /// Confirmed data.
    Confirmed,
    /// Multicast downlink.
    Multicast,
    /// Proprietary frame.
    Proprietary,
}

/// Rejoin request flavours (LoRaWAN 1.1 §6.2.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejoinType {
    /// Periodic / count-triggered rejoin restoring context.
    Type0,
    /// Long-period rejoin reaching a possibly different join server.
    Type1,
    /// Key-refresh rejoin.
    Type2,
}

/// Outcome attached to MCPS/MLME records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacEventStatus {
    /// Operation succeeded.
    Ok,
    /// Unspecified failure.
    Error,
    /// Cryptographic processing failed.
    CryptoFail,
    /// The radio failed to transmit.
    TxTimeout,
    /// Payload did not fit the scheduled data rate.
    TxSchedulingError,
    /// The receive window elapsed.
    RxTimeout,
    /// No beacon was found.
    BeaconNotFound,
}

/// Transmission record the MAC fills when an uplink cycle settles.
#[derive(Debug, Clone, Copy)]
pub struct McpsConfirmation {
    /// Type of the message this confirms.
    pub req_type: McpsType,
    /// Outcome of the cycle.
    pub status: MacEventStatus,
    /// Channel index used.
    pub channel: u8,
    /// Data rate used.
    pub data_rate: u8,
    /// Transmit power in dBm.
    pub tx_power: i8,
    /// Time on air in milliseconds.
    pub tx_toa: u32,
    /// Retransmissions performed.
    pub nb_retries: u8,
    /// Uplink frame counter after the cycle.
    pub ul_frame_counter: u32,
}

/// Reception record the MAC fills when a downlink is decoded.
#[derive(Debug, Clone)]
pub struct McpsIndication {
    /// Outcome of the reception.
    pub status: MacEventStatus,
    /// Message type of the downlink.
    pub msg_type: McpsType,
    /// Application port.
    pub port: u8,
    /// Decrypted application payload.
    pub data: Vec<u8, MAX_APP_PAYLOAD_SIZE>,
    /// True when the downlink carried application data.
    pub is_data_recvd: bool,
    /// True when the downlink acknowledged a confirmed uplink.
    pub is_ack_recvd: bool,
    /// True when the network has more downlinks queued.
    pub fpending: bool,
    /// Downlink frame counter.
    pub dl_frame_counter: u32,
    /// Downlink data rate.
    pub rx_datarate: u8,
    /// Received signal strength in dBm.
    pub rssi: i16,
    /// Signal-to-noise ratio in dB.
    pub snr: i8,
    /// Channel index the downlink arrived on.
    pub channel: u8,
    /// Time on air in milliseconds.
    pub rx_toa: u32,
    /// True until the controller post-processes the record.
    pub pending: bool,
}

impl McpsConfirmation {
    /// A blank record for an unconfirmed request that has not run yet.
    pub fn new() -> Self {
        Self {
            req_type: McpsType::Unconfirmed,
            status: MacEventStatus::Error,
            channel: 0,
            data_rate: 0,
            tx_power: 0,
            tx_toa: 0,
            nb_retries: 0,
            ul_frame_counter: 0,
        }
    }
}

impl Default for McpsConfirmation {
    fn default() -> Self {
        Self::new()
    }
}

impl McpsIndication {
    /// A blank record with nothing pending.
    pub fn new() -> Self {
        Self {
            status: MacEventStatus::Ok,
            msg_type: McpsType::Unconfirmed,
            port: 0,
            data: Vec::new(),
            is_data_recvd: false,
            is_ack_recvd: false,
            fpending: false,
            dl_frame_counter: 0,
            rx_datarate: 0,
            rssi: 0,
            snr: 0,
            channel: 0,
            rx_toa: 0,
            pending: false,
        }
    }
}

impl Default for McpsIndication {
    fn default() -> Self {
        Self::new()
    }
}

/// Control-plane request from MAC to controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MlmeIndicationType {
    /// The network needs an uplink as soon as possible.
    ScheduleUplink,
}

/// MLME indication record.
#[derive(Debug, Clone, Copy)]
pub struct MlmeIndication {
    /// What the MAC asks for.
    pub indication_type: MlmeIndicationType,
    /// True until the controller post-processes the record.
    pub pending: bool,
}

/// Control-plane confirmations produced while a downlink is decoded.
#[derive(Debug, Clone, Copy)]
pub enum MlmeConfirm {
    /// LinkCheckAns arrived.
    LinkCheck {
        /// Outcome.
        status: MacEventStatus,
        /// Demodulation margin in dB.
        demod_margin: u8,
        /// Gateways that received the uplink.
        nb_gateways: u8,
    },
    /// ResetConf arrived (ABP, LW1.1).
    Reset,
    /// RekeyConf arrived (OTAA, LW1.1).
    Rekey,
    /// DeviceModeConf arrived.
    DeviceMode {
        /// Class the server acknowledged.
        class: DeviceClass,
    },
    /// JoinAccept processing finished.
    JoinAccept {
        /// Outcome; `CryptoFail` is fatal for the attempt.
        status: MacEventStatus,
    },
    /// ForceRejoinReq arrived.
    ForceRejoin {
        /// Rejoin type the network mandates.
        rejoin_type: RejoinType,
        /// Data rate the rejoins must use.
        datarate: u8,
        /// Retry period exponent.
        period: u8,
        /// Number of retries after the initial attempt.
        max_retries: u8,
    },
    /// PingSlotInfoAns arrived.
    PingSlotInfo,
    /// Beacon acquisition finished.
    BeaconAcquisition {
        /// `Ok` or `BeaconNotFound`.
        status: MacEventStatus,
    },
    /// DeviceTimeAns arrived.
    DeviceTime {
        /// GPS time stamped by the network at the end of the uplink.
        gps_time_ms: GpsTimeMs,
    },
}

/// MLME confirms produced by one downlink.
pub type MlmeConfirms = Vec<MlmeConfirm, 4>;

/// Beacon tracking outcomes reported by the MAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeaconStatus {
    /// Initial acquisition locked onto a beacon.
    AcquisitionSuccess,
    /// Initial acquisition gave up.
    AcquisitionFailed,
    /// A periodic beacon was demodulated.
    Lock,
    /// A periodic beacon slot passed empty.
    Miss,
}

/// Contents of the last received beacon frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Beacon {
    /// GPS epoch seconds encoded in the beacon payload.
    pub time: u32,
    /// Beacon channel frequency in Hz.
    pub frequency: u32,
    /// Beacon data rate.
    pub datarate: u8,
    /// Received signal strength in dBm.
    pub rssi: i16,
    /// Signal-to-noise ratio in dB.
    pub snr: i8,
    /// Gateway-specific part of the beacon.
    pub gw_specific: [u8; 7],
}

/// One entry of a user channel plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    /// Channel index within the region.
    pub id: u8,
    /// Centre frequency in Hz.
    pub frequency: u32,
    /// Lowest usable data rate.
    pub dr_min: u8,
    /// Highest usable data rate.
    pub dr_max: u8,
}

/// A user channel plan.
pub type ChannelPlan = Vec<Channel, MAX_CHANNELS>;

/// Operations the controller requires from the lower MAC.
///
/// Implementations own the radio, the region tables and all frame-level
/// processing. Deferred failures surface as work items
/// ([`crate::system::StackWork::SchedulingFailure`],
/// [`crate::system::StackWork::AckTimeout`]) posted by the MAC's runtime
/// glue rather than as callbacks.
pub trait MacOps {
    /// Brings the MAC to its operational state.
    fn initialize(&mut self) -> Status;

    /// Releases the session and puts the radio to sleep.
    fn disconnect(&mut self);

    /// Validates and stores connection parameters ahead of `join`.
    fn prepare_join(&mut self, params: Option<&ConnectParams>, is_otaa: bool) -> Status;

    /// Starts the join: sends a JoinRequest (OTAA) or activates the stored
    /// session (ABP).
    fn join(&mut self, is_otaa: bool) -> Status;

    /// Attempts another JoinRequest; false when the trial budget is spent.
    fn continue_joining_process(&mut self) -> bool;

    /// Sends a rejoin request of the given type.
    fn rejoin(&mut self, rejoin_type: RejoinType, is_forced: bool, datarate: u8) -> Status;

    /// Network-provided type-0 rejoin bounds: (max_time seconds, max_count).
    fn get_rejoin_parameters(&self) -> (u32, u32);

    /// Whether a network has been joined.
    fn nwk_joined(&self) -> bool;

    /// Encodes the outbound message; returns accepted byte count or a
    /// negative status.
    fn prepare_ongoing_tx(
        &mut self,
        port: u8,
        data: &[u8],
        flags: MsgFlags,
        num_retries: u8,
    ) -> i16;

    /// Schedules the prepared message for transmission.
    fn send_ongoing_tx(&mut self) -> Status;

    /// Retransmits a confirmed message; false when retries are spent.
    fn continue_sending_process(&mut self) -> bool;

    /// Aborts the pending transmission if the radio is not yet armed.
    fn clear_tx_pipe(&mut self) -> Status;

    /// Marks the TX pipe busy or free.
    fn set_tx_ongoing(&mut self, ongoing: bool);

    /// Whether a message occupies the TX pipe.
    fn tx_ongoing(&self) -> bool;

    /// Drops the prepared message state.
    fn reset_ongoing_tx(&mut self);

    /// Finalises the MCPS request after its cycle settles.
    fn post_process_mcps_req(&mut self);

    /// Radio reported end of transmission at `timestamp_ms`.
    fn on_radio_tx_done(&mut self, timestamp_ms: u64);

    /// Radio gave up transmitting.
    fn on_radio_tx_timeout(&mut self);

    /// Decodes a received frame; returns the MLME confirms it produced.
    fn on_radio_rx_done(
        &mut self,
        payload: &[u8],
        rssi: i16,
        snr: i8,
        timestamp_ms: u64,
    ) -> MlmeConfirms;

    /// The receive window closed empty; false means a corrupted frame.
    fn on_radio_rx_timeout(&mut self, is_timeout: bool);

    /// Latest transmission record.
    fn get_mcps_confirmation(&self) -> McpsConfirmation;

    /// Latest reception record.
    fn get_mcps_indication(&self) -> McpsIndication;

    /// Latest control-plane indication.
    fn get_mlme_indication(&self) -> Option<MlmeIndication>;

    /// Clears the pending bit of the reception record.
    fn post_process_mcps_ind(&mut self);

    /// Clears the pending bit of the control-plane indication.
    fn post_process_mlme_ind(&mut self);

    /// The receive window the MAC most recently serviced.
    fn get_current_slot(&self) -> RxSlot;

    /// Stages a LinkCheckReq on the next uplink.
    fn setup_link_check_request(&mut self);

    /// Stages a DeviceTimeReq on the next uplink.
    fn setup_device_time_request(&mut self);

    /// Stages a PingSlotInfoReq on the next uplink.
    fn add_ping_slot_info_req(&mut self);

    /// Validates and stores the ping slot periodicity.
    fn set_ping_slot_info(&mut self, periodicity: u8) -> Status;

    /// Stages a ResetInd on the next uplink (ABP, LW1.1).
    fn setup_reset_indication(&mut self);

    /// Stages a RekeyInd on the next uplink (OTAA, LW1.1).
    fn setup_rekey_indication(&mut self);

    /// Stages a DeviceModeInd announcing `class` on the next uplink.
    fn setup_device_mode_indication(&mut self, class: DeviceClass);

    /// Switches the operating class. Class B demands an acquired beacon
    /// (`NoBeaconFound` otherwise).
    fn set_device_class(&mut self, class: DeviceClass) -> Status;

    /// Operating class currently in effect.
    fn get_device_class(&self) -> DeviceClass;

    /// Protocol version negotiated with the network.
    fn get_server_type(&self) -> Version;

    /// ADR acknowledgement limit currently in force.
    fn get_current_adr_ack_limit(&self) -> u8;

    /// QoS level (NbTrans) currently mandated by the network.
    fn get_qos_level(&self) -> u8;

    /// QoS level in force when the previous uplink was sent.
    fn get_prev_qos_level(&self) -> u8;

    /// Latest battery level for DevStatusAns.
    fn set_battery_level(&mut self, level: u8);

    /// Merges channels into the active plan.
    fn add_channel_plan(&mut self, plan: &ChannelPlan) -> Status;

    /// Removes every user-provided channel.
    fn remove_channel_plan(&mut self) -> Status;

    /// Removes a single channel by index.
    fn remove_single_channel(&mut self, id: u8) -> Status;

    /// Copies the enabled channels into `plan`.
    fn get_channel_plan(&self, plan: &mut ChannelPlan) -> Status;

    /// Fixes the uplink data rate.
    fn set_channel_data_rate(&mut self, data_rate: u8) -> Status;

    /// Enables or disables network-driven data rate adaptation.
    fn enable_adaptive_datarate(&mut self, enable: bool);

    /// Starts beacon acquisition with the given trial budget.
    fn enable_beacon_acquisition(&mut self, nb_trials: u8) -> Status;

    /// Contents of the last received beacon.
    fn get_last_rx_beacon(&self) -> Result<Beacon, Status>;

    /// Milliseconds until the armed backoff expires, when one is armed.
    fn backoff_time_left_ms(&self) -> Option<u32>;
}
