//! User-facing interface over the stack controller.
//!
//! Every method acquires the stack mutex for the duration of exactly one
//! controller call, so an application thread and the event-queue worker can
//! share one interface value. The lock is closure-scoped; code that needs
//! several calls under a single acquisition uses [`LoRaWANInterface::with_stack`].

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::config::{ConnectParams, StackConfig};
use crate::event::AppCallbacks;
use crate::gps_time::{GpsTimeMs, TAI_GPS_OFFSET, UNIX_GPS_EPOCH_DIFF};
use crate::mac::{Beacon, ChannelPlan, DeviceClass, MacOps};
use crate::message::MsgFlags;
use crate::metadata::{RxMetadata, TxMetadata};
use crate::session::SessionState;
use crate::stack::{DeviceState, LoRaWANStack};
use crate::status::Status;
use crate::system::{Clock, EventQueue, RadioEvent, StackWork};

/// Thread-safe facade over [`LoRaWANStack`].
pub struct LoRaWANInterface<M: MacOps, C: Clock, Q: EventQueue, A: AppCallbacks> {
    stack: Mutex<CriticalSectionRawMutex, RefCell<LoRaWANStack<M, C, Q, A>>>,
}

impl<M: MacOps, C: Clock, Q: EventQueue, A: AppCallbacks> LoRaWANInterface<M, C, Q, A> {
    /// Wraps a freshly built stack.
    pub fn new(mac: M, clock: C, queue: Q, config: StackConfig) -> Self {
        Self {
            stack: Mutex::new(RefCell::new(LoRaWANStack::new(mac, clock, queue, config))),
        }
    }

    /// Runs `f` with exclusive access to the controller.
    pub fn with_stack<R>(&self, f: impl FnOnce(&mut LoRaWANStack<M, C, Q, A>) -> R) -> R {
        self.stack.lock(|stack| f(&mut stack.borrow_mut()))
    }

    /// Brings the stack to its operational state.
    pub fn initialize(&self) -> Status {
        self.with_stack(|stack| stack.initialize())
    }

    /// Registers the application callbacks.
    pub fn add_app_callbacks(&self, callbacks: A) -> Status {
        self.with_stack(|stack| stack.add_app_callbacks(callbacks))
    }

    /// Connects using the configured default activation.
    pub fn connect(&self) -> Status {
        self.with_stack(|stack| stack.connect())
    }

    /// Connects with explicit credentials.
    pub fn connect_with(&self, params: &ConnectParams) -> Status {
        self.with_stack(|stack| stack.connect_with(params))
    }

    /// Shuts the stack down; `Disconnected` follows.
    pub fn disconnect(&self) -> Status {
        self.with_stack(|stack| stack.shutdown())
    }

    /// Submits an uplink; returns accepted bytes or a negative status.
    pub fn send(&self, port: u8, data: &[u8], flags: MsgFlags) -> i16 {
        self.with_stack(|stack| stack.handle_tx(port, data, flags, false, false))
    }

    /// Reads the buffered downlink if its port and type match.
    pub fn receive(&self, port: u8, data: &mut [u8], flags: MsgFlags) -> i16 {
        self.with_stack(|stack| stack.handle_rx(data, port, flags, true).0)
    }

    /// Reads the buffered downlink regardless of port; reports the port and
    /// flags it arrived with.
    pub fn receive_any(&self, data: &mut [u8]) -> (i16, u8, MsgFlags) {
        self.with_stack(|stack| stack.handle_rx(data, 0, MsgFlags::empty(), false))
    }

    /// Fixes the uplink data rate.
    pub fn set_datarate(&self, data_rate: u8) -> Status {
        self.with_stack(|stack| stack.set_channel_data_rate(data_rate))
    }

    /// Enables network-driven data rate adaptation.
    pub fn enable_adaptive_datarate(&self) -> Status {
        self.with_stack(|stack| stack.enable_adaptive_datarate(true))
    }

    /// Disables network-driven data rate adaptation.
    pub fn disable_adaptive_datarate(&self) -> Status {
        self.with_stack(|stack| stack.enable_adaptive_datarate(false))
    }

    /// Sets the confirmed-message retry budget (at most 254).
    pub fn set_confirmed_msg_retries(&self, count: u8) -> Status {
        self.with_stack(|stack| stack.set_confirmed_msg_retry(count))
    }

    /// Merges channels into the active plan. The network may overwrite these
    /// through a CF-List right after a JoinAccept.
    pub fn set_channel_plan(&self, plan: &ChannelPlan) -> Status {
        self.with_stack(|stack| stack.add_channels(plan))
    }

    /// Copies the enabled channels out.
    pub fn get_channel_plan(&self) -> Result<ChannelPlan, Status> {
        self.with_stack(|stack| {
            let mut plan = ChannelPlan::new();
            match stack.get_enabled_channels(&mut plan) {
                Status::Ok => Ok(plan),
                status => Err(status),
            }
        })
    }

    /// Removes a single channel by index.
    pub fn remove_channel(&self, id: u8) -> Status {
        self.with_stack(|stack| stack.remove_a_channel(id))
    }

    /// Removes every user-provided channel.
    pub fn remove_channel_plan(&self) -> Status {
        self.with_stack(|stack| stack.drop_channel_list())
    }

    /// Stages a LinkCheckReq on every uplink until removed.
    pub fn add_link_check_request(&self) -> Status {
        self.with_stack(|stack| stack.set_link_check_request())
    }

    /// Stops staging LinkCheckReq.
    pub fn remove_link_check_request(&self) {
        self.with_stack(|stack| stack.remove_link_check_request())
    }

    /// Stages a DeviceTimeReq on every uplink until removed.
    pub fn add_device_time_request(&self) -> Status {
        self.with_stack(|stack| stack.set_device_time_request())
    }

    /// Stops staging DeviceTimeReq.
    pub fn remove_device_time_request(&self) {
        self.with_stack(|stack| stack.remove_device_time_request())
    }

    /// Requests ping slots with the given periodicity (Class A only).
    pub fn add_ping_slot_info_request(&self, periodicity: u8) -> Status {
        self.with_stack(|stack| stack.add_ping_slot_info_request(periodicity))
    }

    /// Stops staging PingSlotInfoReq.
    pub fn remove_ping_slot_info_request(&self) {
        self.with_stack(|stack| stack.remove_ping_slot_info_request())
    }

    /// Requests a device class switch.
    pub fn set_device_class(&self, device_class: DeviceClass) -> Status {
        self.with_stack(|stack| stack.set_device_class(device_class))
    }

    /// Last transmission metadata; consuming it marks it stale.
    pub fn get_tx_metadata(&self) -> Result<TxMetadata, Status> {
        self.with_stack(|stack| stack.acquire_tx_metadata())
    }

    /// Last reception metadata; consuming it marks it stale.
    pub fn get_rx_metadata(&self) -> Result<RxMetadata, Status> {
        self.with_stack(|stack| stack.acquire_rx_metadata())
    }

    /// Milliseconds until the pending transmission leaves backoff.
    pub fn get_backoff_metadata(&self) -> Result<u32, Status> {
        self.with_stack(|stack| stack.acquire_backoff_metadata())
    }

    /// Aborts the pending transmission if the radio is not yet armed.
    pub fn cancel_sending(&self) -> Status {
        self.with_stack(|stack| stack.stop_sending())
    }

    /// Current GPS time in milliseconds, 0 when never synchronised.
    pub fn get_current_gps_time(&self) -> GpsTimeMs {
        self.with_stack(|stack| stack.get_current_gps_time())
    }

    /// Stores a network-provided GPS time.
    pub fn set_current_gps_time(&self, gps_time_ms: GpsTimeMs) {
        self.with_stack(|stack| stack.set_current_gps_time(gps_time_ms))
    }

    /// Converts the GPS time reference to UTC seconds for the system clock.
    ///
    /// `tai_utc_diff` is the current TAI-UTC leap second count. Fails with
    /// `ServiceUnknown` until the network has provided time; request a
    /// DeviceTimeReq or beacon lock first. GPS milliseconds are rounded to
    /// the nearest second.
    pub fn set_system_time_utc(&self, tai_utc_diff: u32) -> Result<u64, Status> {
        // TAI has been at least 19 s ahead of UTC since the GPS epoch
        if u64::from(tai_utc_diff) < TAI_GPS_OFFSET {
            return Err(Status::ParameterInvalid);
        }

        let gps_time_ms = self.get_current_gps_time();
        if gps_time_ms == 0 {
            return Err(Status::ServiceUnknown);
        }

        let mut gps_seconds = gps_time_ms / 1000;
        if gps_time_ms % 1000 >= 500 {
            gps_seconds += 1;
        }

        let utc_seconds =
            UNIX_GPS_EPOCH_DIFF + (u64::from(tai_utc_diff) - TAI_GPS_OFFSET) + gps_seconds;
        Ok(utc_seconds)
    }

    /// Starts beacon acquisition and tracking.
    pub fn enable_beacon_acquisition(&self) -> Status {
        self.with_stack(|stack| stack.enable_beacon_acquisition())
    }

    /// Contents of the last received beacon.
    pub fn get_last_rx_beacon(&self) -> Result<Beacon, Status> {
        self.with_stack(|stack| stack.get_last_rx_beacon())
    }

    /// Feeds a radio interrupt edge into the stack.
    pub fn radio_event(&self, event: RadioEvent<'_>) {
        self.with_stack(|stack| stack.radio_event(event))
    }

    /// Runs one work item popped from the event queue.
    pub fn dispatch(&self, work: StackWork) {
        self.with_stack(|stack| stack.dispatch(work))
    }

    /// Current device state.
    pub fn device_state(&self) -> DeviceState {
        self.with_stack(|stack| stack.device_state())
    }

    /// Snapshot of the session bookkeeping.
    pub fn session(&self) -> SessionState {
        self.with_stack(|stack| stack.session().clone())
    }
}
