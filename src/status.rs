//! Status codes returned by the stack's user-facing operations.

/// Outcome of a stack operation.
///
/// Discriminants are stable negative values so that byte-count returning
/// calls (`send`, `receive`) can encode a failure in the same `i16` as a
/// length. `Ok` is the only non-negative code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum Status {
    /// Operation completed.
    Ok = 0,
    /// Resource is held by another operation.
    Busy = -1000,
    /// Operation cannot make progress right now, try again later.
    WouldBlock = -1001,
    /// Requested service is not available in the current configuration.
    ServiceUnknown = -1002,
    /// An argument was out of range or inconsistent.
    ParameterInvalid = -1003,
    /// Frequency not usable in the active channel plan.
    FrequencyInvalid = -1004,
    /// Data rate not usable in the active channel plan.
    DatarateInvalid = -1005,
    /// Neither frequency nor data rate were usable.
    FreqAndDrInvalid = -1006,
    /// No network has been joined yet.
    NoNetworkJoined = -1009,
    /// Payload does not fit the current data rate.
    LengthError = -1010,
    /// The stack has been shut down.
    DeviceOff = -1011,
    /// `initialize` has not been called.
    NotInitialized = -1012,
    /// Feature not supported by this build or device class.
    Unsupported = -1013,
    /// Application port is reserved or out of range.
    PortInvalid = -1015,
    /// A join request has been sent, connection is pending.
    ConnectInProgress = -1016,
    /// No session is active.
    NoActiveSessions = -1017,
    /// No fresh metadata to report.
    MetadataNotAvailable = -1023,
    /// A session is already established.
    AlreadyConnected = -1024,
    /// Request was valid but had no effect.
    NoOp = -1025,
    /// No beacon has been received.
    NoBeaconFound = -1026,
}

impl Status {
    /// The raw wire value, usable as the error half of an `i16` length return.
    pub fn as_i16(self) -> i16 {
        self as i16
    }
}

impl From<Status> for i16 {
    fn from(status: Status) -> i16 {
        status.as_i16()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_is_the_only_non_negative_code() {
        assert_eq!(Status::Ok.as_i16(), 0);
        for status in [
            Status::Busy,
            Status::WouldBlock,
            Status::ParameterInvalid,
            Status::NoNetworkJoined,
            Status::NotInitialized,
            Status::PortInvalid,
            Status::ConnectInProgress,
            Status::MetadataNotAvailable,
            Status::NoBeaconFound,
        ] {
            assert!(status.as_i16() < 0, "{:?} must encode as negative", status);
        }
    }
}
