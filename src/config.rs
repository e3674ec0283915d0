//! Stack configuration and connection parameters.

use crate::mac::Version;

/// EUI-64 identifier (8 bytes).
pub type Eui64 = [u8; 8];
/// AES-128 key (16 bytes).
pub type AesKey = [u8; 16];

/// Marker for "no application port configured yet".
pub const INVALID_PORT: u8 = 0xFF;

/// Build-time tuning knobs, surfaced as a value so a single binary can host
/// differently tuned stack instances.
#[derive(Debug, Clone)]
pub struct StackConfig {
    /// Whether a parameterless `connect` performs OTAA (true) or ABP.
    pub over_the_air_activation: bool,
    /// Default application port used until `send` overrides it.
    pub app_port: u8,
    /// Protocol version this device speaks.
    pub version: Version,
    /// Answer MAC-layer uplink requests with an empty confirmed uplink
    /// instead of raising `UplinkRequired`.
    pub automatic_uplink: bool,
    /// Default retry count for confirmed messages.
    pub confirmed_msg_retries: u8,
    /// Baseline QoS level; repetitions apply only above this.
    pub default_qos: u8,
    /// Interval between periodic type-1 rejoins, in seconds.
    pub rejoin_type1_send_period: u32,
    /// Beacon-less operation window before Class B falls back to A, seconds.
    pub class_b_beaconless_period: u32,
    /// Number of beacon acquisition attempts before giving up.
    pub beacon_acquisition_nb_trials: u8,
    /// Default ping slot periodicity (0..=7).
    pub ping_slot_periodicity: u8,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            over_the_air_activation: true,
            app_port: 15,
            version: Version::V1_0_2,
            automatic_uplink: true,
            confirmed_msg_retries: 1,
            default_qos: 1,
            rejoin_type1_send_period: 3600,
            class_b_beaconless_period: 7200,
            beacon_acquisition_nb_trials: 8,
            ping_slot_periodicity: 7,
        }
    }
}

/// Credentials for an OTAA connection.
#[derive(Debug, Clone)]
pub struct OtaaParams {
    /// Device EUI.
    pub dev_eui: Eui64,
    /// Application (join) EUI.
    pub app_eui: Eui64,
    /// Root application key.
    pub app_key: AesKey,
    /// Join attempts before `JoinFailure`.
    pub nb_trials: u8,
}

/// Pre-provisioned session material for an ABP connection.
#[derive(Debug, Clone)]
pub struct AbpParams {
    /// Device address on the network.
    pub dev_addr: u32,
    /// Network session key.
    pub nwk_skey: AesKey,
    /// Application session key.
    pub app_skey: AesKey,
}

/// Parameters for `connect_with`.
#[derive(Debug, Clone)]
pub enum ConnectParams {
    /// Over-the-air activation.
    Otaa(OtaaParams),
    /// Activation by personalisation.
    Abp(AbpParams),
}

impl ConnectParams {
    /// Whether these parameters describe an OTAA connection.
    pub fn is_otaa(&self) -> bool {
        matches!(self, ConnectParams::Otaa(_))
    }
}
