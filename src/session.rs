//! Session bookkeeping for an activated device.

/// How the current session was activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// No activation has taken place yet.
    None,
    /// Session keys negotiated over the air (JoinRequest/JoinAccept).
    Otaa,
    /// Session keys provisioned at manufacture time.
    Abp,
}

/// Frame counters and activation state for the lifetime of a session.
///
/// Counters are not persisted: `disconnect` keeps them in memory so an ABP
/// re-connect can resume, while a fresh OTAA join resets both to zero.
#[derive(Debug, Clone)]
pub struct SessionState {
    /// How the session was established.
    pub activation: Activation,
    /// Frame counter of the last acknowledged uplink.
    pub uplink_counter: u32,
    /// Frame counter of the last processed downlink.
    pub downlink_counter: u32,
    /// Whether the session may carry traffic.
    pub active: bool,
}

impl SessionState {
    /// A session that has never been activated.
    pub fn new() -> Self {
        Self {
            activation: Activation::None,
            uplink_counter: 0,
            downlink_counter: 0,
            active: false,
        }
    }

    /// Zeroes both frame counters, as mandated for a fresh OTAA join.
    pub fn reset_counters(&mut self) {
        self.uplink_counter = 0;
        self.downlink_counter = 0;
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_reset_independently_of_activation() {
        let mut session = SessionState::new();
        session.activation = Activation::Abp;
        session.uplink_counter = 17;
        session.downlink_counter = 5;
        session.reset_counters();
        assert_eq!(session.uplink_counter, 0);
        assert_eq!(session.downlink_counter, 0);
        assert_eq!(session.activation, Activation::Abp);
    }
}
