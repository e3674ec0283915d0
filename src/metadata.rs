//! Transmission and reception metadata, cached between user reads.
//!
//! Each record carries a `stale` marker: construction and every successful
//! read leave it stale, a completed radio operation rewrites it fresh. The
//! application therefore sees each datapoint at most once.

/// Metadata describing the most recent transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxMetadata {
    /// True when the record has already been consumed (or never written).
    pub stale: bool,
    /// Channel index the uplink went out on.
    pub channel: u8,
    /// Uplink data rate.
    pub data_rate: u8,
    /// Transmit power in dBm.
    pub tx_power: i8,
    /// Time on air of the uplink in milliseconds.
    pub tx_toa: u32,
    /// Number of retransmissions performed.
    pub nb_retries: u8,
}

impl TxMetadata {
    /// A stale record awaiting its first write.
    pub fn new() -> Self {
        Self {
            stale: true,
            channel: 0,
            data_rate: 0,
            tx_power: 0,
            tx_toa: 0,
            nb_retries: 0,
        }
    }
}

impl Default for TxMetadata {
    fn default() -> Self {
        Self::new()
    }
}

/// Metadata describing the most recent reception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxMetadata {
    /// True when the record has already been consumed (or never written).
    pub stale: bool,
    /// Downlink data rate.
    pub rx_datarate: u8,
    /// Received signal strength in dBm.
    pub rssi: i16,
    /// Signal-to-noise ratio in dB.
    pub snr: i8,
    /// Channel index the downlink arrived on.
    pub channel: u8,
    /// Time on air of the downlink in milliseconds.
    pub rx_toa: u32,
}

impl RxMetadata {
    /// A stale record awaiting its first write.
    pub fn new() -> Self {
        Self {
            stale: true,
            rx_datarate: 0,
            rssi: 0,
            snr: 0,
            channel: 0,
            rx_toa: 0,
        }
    }
}

impl Default for RxMetadata {
    fn default() -> Self {
        Self::new()
    }
}
