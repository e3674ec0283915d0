//! Application-facing events and callback surface.

/// Battery level value meaning "unknown" in a DevStatusAns.
pub const BATTERY_LEVEL_UNKNOWN: u8 = 255;

/// Asynchronous notifications delivered to the application.
///
/// Events are posted to the event queue and dispatched in order, so the
/// application always observes them after the stack state they describe has
/// settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A session with the network is established.
    Connected,
    /// The session was torn down by `disconnect`.
    Disconnected,
    /// The outbound message cycle finished successfully.
    TxDone,
    /// The radio failed to transmit, the in-flight message is lost.
    TxTimeout,
    /// Confirmed retries were exhausted without an acknowledgement.
    TxError,
    /// The MAC could not protect the outbound frame.
    TxCryptoError,
    /// The MAC could not schedule the outbound frame.
    TxSchedulingError,
    /// A downlink is buffered and ready for `receive`.
    RxDone,
    /// A receive window elapsed without a frame.
    RxTimeout,
    /// A frame was received but could not be processed.
    RxError,
    /// Join retries were exhausted without a JoinAccept.
    JoinFailure,
    /// The network requests an uplink as soon as possible.
    UplinkRequired,
    /// The stack failed to generate an automatic uplink.
    AutomaticUplinkError,
    /// The device class switch has taken effect.
    ClassChanged,
    /// The server confirmed the class announced in DeviceModeInd.
    ServerAcceptedClassInUse,
    /// The server rejected the class announced in DeviceModeInd.
    ServerDoesNotSupportClassInUse,
    /// DeviceTimeAns processed, the GPS time reference is fresh.
    DeviceTimeSynched,
    /// PingSlotInfoAns received, ping slot parameters are in effect.
    PingSlotInfoSynched,
    /// Beacon acquisition succeeded.
    BeaconFound,
    /// Beacon acquisition gave up.
    BeaconNotFound,
    /// A periodic beacon was demodulated.
    BeaconLock,
    /// A periodic beacon slot passed without a beacon.
    BeaconMiss,
    /// Beacon-less operation expired, the device fell back to Class A.
    SwitchClassBToA,
    /// Session-fatal cryptographic failure.
    CryptoError,
}

/// Callbacks the application hands to the stack via `add_app_callbacks`.
///
/// `events` is mandatory. `link_check_resp` has a default no-op body; an
/// application that wants LinkCheckAns data overrides it together with
/// [`AppCallbacks::handles_link_check`], which gates
/// `add_link_check_request`.
pub trait AppCallbacks {
    /// Receives every [`Event`] the stack emits.
    fn events(&mut self, event: Event);

    /// LinkCheckAns contents: demodulation margin in dB and the number of
    /// gateways that received the last uplink.
    fn link_check_resp(&mut self, _demod_margin: u8, _nb_gateways: u8) {}

    /// Whether `link_check_resp` is implemented.
    fn handles_link_check(&self) -> bool {
        false
    }

    /// Battery level reported in DevStatusAns: 0 on external power, 1..=254
    /// proportional charge, 255 unknown.
    fn battery_level(&mut self) -> u8 {
        BATTERY_LEVEL_UNKNOWN
    }
}
