//! Time and scheduling seams between the stack and its runtime.
//!
//! The stack never blocks and never owns a thread: radio interrupt edges
//! arrive as [`RadioEvent`]s, get staged, and turn into typed [`StackWork`]
//! items on the application's event queue. The queue worker hands each item
//! back through the facade's `dispatch`, which is where all heavy processing
//! runs.

use crate::event::Event;
use crate::mac::{BeaconStatus, RejoinType};

/// Monotonic time source.
pub trait Clock {
    /// Milliseconds since an arbitrary epoch; must never go backwards.
    fn now_ms(&self) -> u64;
}

/// Named timers the stack arms through the event queue.
///
/// On expiry the queue implementation must post the matching work item:
/// [`StackWork::ForcedRejoinRetry`] for `ForcedRejoin`,
/// [`StackWork::RejoinType0`] for `RejoinType0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackTimer {
    /// Retry cadence of a network-forced rejoin.
    ForcedRejoin,
    /// Max-time re-arm of the type-0 rejoin.
    RejoinType0,
}

/// Deferred work the stack posts to the event queue.
///
/// Every variant is handled by `dispatch` on the facade; the queue only
/// stores and replays them in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackWork {
    /// A radio transmission completed.
    ProcessTransmission,
    /// The radio gave up on a transmission.
    ProcessTransmissionTimeout,
    /// A staged downlink payload awaits MAC processing.
    ProcessReception,
    /// A receive window closed empty; `is_timeout` is false for CRC errors.
    ProcessReceptionTimeout {
        /// True for a plain window timeout, false for a corrupted frame.
        is_timeout: bool,
    },
    /// Re-enter scheduling for the staged outbound message.
    ScheduleTransmission,
    /// Send an empty confirmed uplink on the given port.
    AutomaticUplink {
        /// Port to use for the empty uplink.
        port: u8,
    },
    /// Issue a rejoin request.
    ProcessRejoin {
        /// Which rejoin frame to send.
        rejoin_type: RejoinType,
        /// Whether the request was network-forced.
        forced: bool,
    },
    /// The type-0 rejoin max-time elapsed.
    RejoinType0,
    /// The forced-rejoin retry timer fired.
    ForcedRejoinRetry,
    /// Class C acknowledgement window elapsed without a downlink.
    AckTimeout,
    /// The MAC failed to schedule the pending transmission.
    SchedulingFailure,
    /// Beacon tracking progressed.
    BeaconEvent {
        /// What the beacon engine observed.
        status: BeaconStatus,
    },
    /// Hand an event to the application callback.
    DeliverEvent {
        /// The event to deliver.
        event: Event,
    },
    /// Hand LinkCheckAns data to the application callback.
    LinkCheckResponse {
        /// Demodulation margin in dB.
        demod_margin: u8,
        /// Gateways that received the uplink.
        nb_gateways: u8,
    },
}

/// Deferred-call queue and named-timer service provided by the runtime.
pub trait EventQueue {
    /// Enqueues a work item; returns false when the queue is full.
    fn post(&mut self, work: StackWork) -> bool;

    /// Arms (or re-arms) a named timer.
    fn start_timer(&mut self, timer: StackTimer, period_ms: u32);

    /// Disarms a named timer; a no-op when it is not running.
    fn stop_timer(&mut self, timer: StackTimer);
}

/// Radio interrupt edges, as reported by the driver glue.
///
/// These are cheap to handle: the stack timestamps, stages the payload and
/// posts a [`StackWork`] item; nothing else runs in interrupt context.
#[derive(Debug)]
pub enum RadioEvent<'a> {
    /// Transmission completed.
    TxDone,
    /// Transmission aborted by the radio.
    TxTimeout,
    /// A frame was received.
    RxDone {
        /// Raw PHY payload.
        payload: &'a [u8],
        /// Received signal strength in dBm.
        rssi: i16,
        /// Signal-to-noise ratio in dB.
        snr: i8,
    },
    /// The receive window closed without a frame.
    RxTimeout,
    /// A frame was received but failed CRC.
    RxError,
}
