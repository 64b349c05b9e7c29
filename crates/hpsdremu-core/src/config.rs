//! Immutable radio configuration assembled at startup.

use rand::Rng;

use crate::error::{Error, Result};
use crate::hw::HardwareKind;

/// Firmware code reported in discovery replies and telemetry.
pub const FIRMWARE_VERSION: u8 = 25;

/// Mercury receiver board firmware versions (four slots).
pub const MERCURY_VERSIONS: [u8; 4] = [25, 25, 25, 25];

/// Penelope exciter board firmware version.
pub const PENNY_VERSION: u8 = 25;

/// Metis interface board firmware version.
pub const METIS_VERSION: u8 = 25;

/// Everything fixed for the lifetime of the process.
///
/// The protocol servers read this freely; only [`crate::state::RadioState`]
/// carries the host-mutable side of the radio.
#[derive(Debug, Clone)]
pub struct RadioConfig {
    /// The board the emulator impersonates.
    pub hw: HardwareKind,
    /// Ethernet MAC address reported in discovery replies.
    pub mac: [u8; 6],
    /// Test tone offset from the DDC center, in Hz.
    pub tone_hz: f64,
    /// Gaussian noise standard deviation as a fraction of full scale.
    pub noise_level: f64,
    /// Whether TX IQ is recorded during PTT and replayed on RX.
    pub echo_enabled: bool,
}

impl RadioConfig {
    /// Create a configuration with the default tone (1 kHz), noise floor
    /// (3e-6, roughly -100 dBFS) and echo mode off.
    pub fn new(hw: HardwareKind, mac: [u8; 6]) -> Self {
        Self {
            hw,
            mac,
            tone_hz: 1000.0,
            noise_level: 3e-6,
            echo_enabled: false,
        }
    }
}

/// Parse a MAC address from hex notation (`00:1c:c0:a2:22:5e`, dashes and
/// bare hex accepted).
pub fn parse_mac(s: &str) -> Result<[u8; 6]> {
    let hex: String = s.chars().filter(|c| c.is_ascii_hexdigit()).collect();
    if hex.len() != 12 {
        return Err(Error::Config(format!(
            "MAC address '{s}' must be 6 bytes (12 hex digits)"
        )));
    }
    let mut mac = [0u8; 6];
    for (i, byte) in mac.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
            .map_err(|e| Error::Config(format!("MAC address '{s}': {e}")))?;
    }
    Ok(mac)
}

/// Format a MAC address as colon-separated lowercase hex.
pub fn format_mac(mac: &[u8; 6]) -> String {
    mac.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Generate a random locally-administered unicast MAC address.
pub fn random_mac() -> [u8; 6] {
    let mut mac = [0u8; 6];
    rand::thread_rng().fill(&mut mac);
    mac[0] = (mac[0] | 0x02) & 0xFE;
    mac
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = RadioConfig::new(HardwareKind::Hermes, [0; 6]);
        assert_eq!(cfg.tone_hz, 1000.0);
        assert_eq!(cfg.noise_level, 3e-6);
        assert!(!cfg.echo_enabled);
    }

    #[test]
    fn parse_mac_colon() {
        let mac = parse_mac("00:1c:c0:a2:22:5e").unwrap();
        assert_eq!(mac, [0x00, 0x1c, 0xc0, 0xa2, 0x22, 0x5e]);
    }

    #[test]
    fn parse_mac_dashes_and_bare() {
        assert_eq!(
            parse_mac("00-1C-C0-A2-22-5E").unwrap(),
            [0x00, 0x1c, 0xc0, 0xa2, 0x22, 0x5e]
        );
        assert_eq!(
            parse_mac("001cc0a2225e").unwrap(),
            [0x00, 0x1c, 0xc0, 0xa2, 0x22, 0x5e]
        );
    }

    #[test]
    fn parse_mac_wrong_length() {
        assert!(parse_mac("00:1c:c0").is_err());
        assert!(parse_mac("00:1c:c0:a2:22:5e:ff").is_err());
    }

    #[test]
    fn format_round_trip() {
        let mac = [0x02, 0xab, 0x00, 0x10, 0xfe, 0x9c];
        assert_eq!(parse_mac(&format_mac(&mac)).unwrap(), mac);
    }

    #[test]
    fn random_mac_is_local_unicast() {
        for _ in 0..32 {
            let mac = random_mac();
            assert_eq!(mac[0] & 0x02, 0x02, "locally administered bit");
            assert_eq!(mac[0] & 0x01, 0x00, "unicast bit");
        }
    }
}
