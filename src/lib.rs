//! LoRaWAN end-device stack controller in Rust
//!
//! This crate implements the upper layer of a LoRaWAN 1.0.2/1.0.3/1.1
//! end-device stack: activation and session management, the transmit and
//! receive pipelines, Class A/B/C switching, beacon tracking, rejoin
//! scheduling and the GPS time reference. Frame encoding, cryptography,
//! channel selection and the radio itself live below the [`mac::MacOps`]
//! seam and are provided by the integrator.
//!
//! # Features
//! - Single-threaded, timer-driven state machine; no blocking waits
//! - OTAA and ABP activation, confirmed/unconfirmed uplinks with QoS
//! - Class B beacons and ping slots, beacon-less fallback to Class A
//! - LoRaWAN 1.1 rejoin engine (periodic, count-based and network-forced)
//! - No unsafe code
//!
//! # Example
//! ```ignore
//! use lorawan_stack::{
//!     config::StackConfig,
//!     interface::LoRaWANInterface,
//!     message::MsgFlags,
//! };
//!
//! // mac, clock and queue come from the platform integration
//! let lorawan = LoRaWANInterface::new(mac, clock, queue, StackConfig::default());
//!
//! lorawan.initialize();
//! lorawan.add_app_callbacks(callbacks);
//! lorawan.connect();
//!
//! // once CONNECTED has been delivered:
//! let data = b"Hello, LoRaWAN!";
//! lorawan.send(1, data, MsgFlags::UNCONFIRMED);
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![no_std]

#[cfg(test)]
extern crate std;

/// Stack configuration and connection parameters
pub mod config;

/// Application events and callbacks
pub mod event;

/// GPS time reference
pub mod gps_time;

/// User-facing interface
pub mod interface;

/// Lower MAC contract
pub mod mac;

/// Message buffers
pub mod message;

/// Transmission and reception metadata
pub mod metadata;

/// Session bookkeeping
pub mod session;

/// The stack controller
pub mod stack;

/// Status codes
pub mod status;

/// Time, queue and radio seams
pub mod system;

pub use config::{ConnectParams, StackConfig};
pub use event::{AppCallbacks, Event};
pub use interface::LoRaWANInterface;
pub use message::MsgFlags;
pub use stack::{DeviceState, LoRaWANStack};
pub use status::Status;
