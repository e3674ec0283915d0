//! In-flight message records for the transmit and receive pipelines.

use bitflags::bitflags;
use heapless::Vec;

use crate::mac::McpsType;

/// Largest application payload the stack will carry.
pub const MAX_APP_PAYLOAD_SIZE: usize = 242;

bitflags! {
    /// Message type flags shared by `send` and `receive`.
    ///
    /// On the uplink path exactly one of `UNCONFIRMED`, `CONFIRMED` or
    /// `PROPRIETARY` must be set; `MULTICAST` only ever describes downlinks.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MsgFlags: u8 {
        /// Fire-and-forget data message.
        const UNCONFIRMED = 0x01;
        /// Data message requiring a network acknowledgement.
        const CONFIRMED = 0x02;
        /// Downlink addressed to a multicast group.
        const MULTICAST = 0x04;
        /// Proprietary frame type.
        const PROPRIETARY = 0x08;
    }
}

impl MsgFlags {
    /// The flag corresponding to a MAC-layer message type.
    pub fn from_mcps_type(msg_type: McpsType) -> Self {
        match msg_type {
            McpsType::Unconfirmed => MsgFlags::UNCONFIRMED,
            McpsType::Confirmed => MsgFlags::CONFIRMED,
            McpsType::Multicast => MsgFlags::MULTICAST,
            McpsType::Proprietary => MsgFlags::PROPRIETARY,
        }
    }

    /// Whether exactly one uplink-legal type flag is set.
    pub fn is_valid_for_uplink(self) -> bool {
        self == MsgFlags::UNCONFIRMED || self == MsgFlags::CONFIRMED || self == MsgFlags::PROPRIETARY
    }
}

/// The single outbound message the stack keeps in flight.
#[derive(Debug, Clone)]
pub struct TxMessage {
    /// Destination application port.
    pub port: u8,
    /// Owned copy of the application payload.
    pub data: Vec<u8, MAX_APP_PAYLOAD_SIZE>,
    /// Type flags the message was submitted with.
    pub flags: MsgFlags,
    /// Confirmed retransmissions still allowed.
    pub pending_retries: u8,
}

impl TxMessage {
    /// An empty, inactive record.
    pub fn new() -> Self {
        Self {
            port: 0,
            data: Vec::new(),
            flags: MsgFlags::UNCONFIRMED,
            pending_retries: 0,
        }
    }

    /// Stages a new outbound payload, truncating at the record capacity.
    /// Returns the number of bytes accepted.
    pub fn stage(&mut self, port: u8, data: &[u8], flags: MsgFlags, retries: u8) -> usize {
        let accepted = data.len().min(MAX_APP_PAYLOAD_SIZE);
        self.data.clear();
        // cannot fail, length is clamped to capacity
        let _ = self.data.extend_from_slice(&data[..accepted]);
        self.port = port;
        self.flags = flags;
        self.pending_retries = retries;
        accepted
    }
}

impl Default for TxMessage {
    fn default() -> Self {
        Self::new()
    }
}

/// The single inbound message buffered for the application, with the cursor
/// state that lets a small application buffer drain it across several
/// `receive` calls.
#[derive(Debug, Clone)]
pub struct RxMessage {
    /// Port the downlink arrived on.
    pub port: u8,
    /// MAC-layer message type of the downlink.
    pub msg_type: McpsType,
    /// Owned copy of the downlink payload.
    pub data: Vec<u8, MAX_APP_PAYLOAD_SIZE>,
    /// True while unread bytes remain.
    pub receive_ready: bool,
    /// Bytes already handed to the application.
    pub prev_read_size: usize,
    /// Bytes still to hand out; zero until the first read.
    pub pending_size: usize,
}

impl RxMessage {
    /// An empty record with nothing to read.
    pub fn new() -> Self {
        Self {
            port: 0,
            msg_type: McpsType::Unconfirmed,
            data: Vec::new(),
            receive_ready: false,
            prev_read_size: 0,
            pending_size: 0,
        }
    }

    /// Buffers a fresh downlink and resets the read cursor.
    pub fn store(&mut self, port: u8, msg_type: McpsType, data: &[u8]) {
        let accepted = data.len().min(MAX_APP_PAYLOAD_SIZE);
        self.data.clear();
        let _ = self.data.extend_from_slice(&data[..accepted]);
        self.port = port;
        self.msg_type = msg_type;
        self.prev_read_size = 0;
        self.pending_size = 0;
        self.receive_ready = true;
    }

    /// Copies the next chunk into `out`, advancing the cursor. Clears
    /// `receive_ready` exactly when the final byte is delivered.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        if self.pending_size == 0 {
            self.pending_size = self.data.len();
            self.prev_read_size = 0;
        }

        let copied;
        let mut read_complete = false;

        if self.prev_read_size == 0 && self.data.len() <= out.len() {
            copied = self.data.len();
            out[..copied].copy_from_slice(&self.data);
            read_complete = true;
        } else if self.pending_size > out.len() {
            copied = out.len();
            out.copy_from_slice(&self.data[self.prev_read_size..self.prev_read_size + copied]);
            self.pending_size -= copied;
            self.prev_read_size += copied;
        } else {
            copied = self.pending_size;
            out[..copied].copy_from_slice(&self.data[self.prev_read_size..self.prev_read_size + copied]);
            read_complete = true;
        }

        if read_complete {
            self.data.clear();
            self.pending_size = 0;
            self.prev_read_size = 0;
            self.receive_ready = false;
        }

        copied
    }
}

impl Default for RxMessage {
    fn default() -> Self {
        Self::new()
    }
}
