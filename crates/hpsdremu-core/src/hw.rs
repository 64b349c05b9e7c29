//! OpenHPSDR board catalog.
//!
//! Every emulated radio identifies itself on the wire with a board code and
//! a receiver (DDC) count. The codes match the HPSDRHW enumeration used by
//! Thetis and friends, so hosts recognize the emulated hardware without any
//! special casing.

use std::fmt;
use std::str::FromStr;

/// An OpenHPSDR board model the emulator can impersonate.
///
/// Carries the two attributes hosts care about: the numeric board code sent
/// in discovery replies, and the number of DDCs (independent receive
/// channels) the board supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HardwareKind {
    /// Atlas backplane (original parallel-bus system).
    Atlas,
    /// Hermes single-board transceiver.
    Hermes,
    /// Hermes II.
    HermesII,
    /// Angelia (Anan-100D class).
    Angelia,
    /// Orion (Anan-200D class).
    Orion,
    /// Orion MkII (Anan-7000/8000 class).
    OrionMkII,
    /// Hermes-Lite 2 low-cost transceiver.
    HermesLite,
    /// Saturn (Anan G2).
    Saturn,
    /// Saturn MkII.
    SaturnMkII,
}

impl HardwareKind {
    /// The board code reported in discovery replies.
    pub fn board_code(self) -> u8 {
        match self {
            Self::Atlas => 0,
            Self::Hermes => 1,
            Self::HermesII => 2,
            Self::Angelia => 3,
            Self::Orion => 4,
            Self::OrionMkII => 5,
            Self::HermesLite => 6,
            Self::Saturn => 10,
            Self::SaturnMkII => 11,
        }
    }

    /// Maximum number of DDCs this board supports.
    pub fn max_ddcs(self) -> u8 {
        match self {
            Self::Atlas => 2,
            Self::Hermes => 4,
            Self::HermesII => 4,
            Self::Angelia => 5,
            Self::Orion => 5,
            Self::OrionMkII => 8,
            Self::HermesLite => 2,
            Self::Saturn => 10,
            Self::SaturnMkII => 10,
        }
    }

    /// Whether this board speaks the legacy Protocol 1 (Metis) framing.
    pub fn supports_protocol1(self) -> bool {
        matches!(
            self,
            Self::Atlas | Self::Hermes | Self::HermesII | Self::HermesLite
        )
    }

    /// Whether this board speaks Protocol 2 (direct Ethernet framing).
    pub fn supports_protocol2(self) -> bool {
        !matches!(self, Self::Atlas)
    }

    /// All CLI-facing board names, in catalog order.
    pub fn all_names() -> &'static [&'static str] {
        &[
            "atlas",
            "hermes",
            "hermesii",
            "angelia",
            "orion",
            "orionmkii",
            "hermeslite",
            "saturn",
            "saturnmkii",
        ]
    }
}

impl fmt::Display for HardwareKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Atlas => "Atlas",
            Self::Hermes => "Hermes",
            Self::HermesII => "HermesII",
            Self::Angelia => "Angelia",
            Self::Orion => "Orion",
            Self::OrionMkII => "OrionMkII",
            Self::HermesLite => "HermesLite",
            Self::Saturn => "Saturn",
            Self::SaturnMkII => "SaturnMkII",
        };
        write!(f, "{s}")
    }
}

/// Error returned when a string cannot be parsed into a [`HardwareKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseHardwareKindError(String);

impl fmt::Display for ParseHardwareKindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown radio '{}'. Expected one of: {}",
            self.0,
            HardwareKind::all_names().join(", ")
        )
    }
}

impl std::error::Error for ParseHardwareKindError {}

impl FromStr for HardwareKind {
    type Err = ParseHardwareKindError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "atlas" => Ok(Self::Atlas),
            "hermes" => Ok(Self::Hermes),
            "hermesii" => Ok(Self::HermesII),
            "angelia" => Ok(Self::Angelia),
            "orion" => Ok(Self::Orion),
            "orionmkii" => Ok(Self::OrionMkII),
            "hermeslite" => Ok(Self::HermesLite),
            "saturn" => Ok(Self::Saturn),
            "saturnmkii" => Ok(Self::SaturnMkII),
            _ => Err(ParseHardwareKindError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn board_codes() {
        assert_eq!(HardwareKind::Atlas.board_code(), 0);
        assert_eq!(HardwareKind::Hermes.board_code(), 1);
        assert_eq!(HardwareKind::HermesII.board_code(), 2);
        assert_eq!(HardwareKind::Angelia.board_code(), 3);
        assert_eq!(HardwareKind::Orion.board_code(), 4);
        assert_eq!(HardwareKind::OrionMkII.board_code(), 5);
        assert_eq!(HardwareKind::HermesLite.board_code(), 6);
        assert_eq!(HardwareKind::Saturn.board_code(), 10);
        assert_eq!(HardwareKind::SaturnMkII.board_code(), 11);
    }

    #[test]
    fn ddc_counts() {
        assert_eq!(HardwareKind::Atlas.max_ddcs(), 2);
        assert_eq!(HardwareKind::Hermes.max_ddcs(), 4);
        assert_eq!(HardwareKind::HermesII.max_ddcs(), 4);
        assert_eq!(HardwareKind::Angelia.max_ddcs(), 5);
        assert_eq!(HardwareKind::Orion.max_ddcs(), 5);
        assert_eq!(HardwareKind::OrionMkII.max_ddcs(), 8);
        assert_eq!(HardwareKind::HermesLite.max_ddcs(), 2);
        assert_eq!(HardwareKind::Saturn.max_ddcs(), 10);
        assert_eq!(HardwareKind::SaturnMkII.max_ddcs(), 10);
    }

    #[test]
    fn from_str_case_insensitive() {
        assert_eq!(
            "hermes".parse::<HardwareKind>().unwrap(),
            HardwareKind::Hermes
        );
        assert_eq!(
            "HermesLite".parse::<HardwareKind>().unwrap(),
            HardwareKind::HermesLite
        );
        assert_eq!(
            "SATURNMKII".parse::<HardwareKind>().unwrap(),
            HardwareKind::SaturnMkII
        );
    }

    #[test]
    fn from_str_invalid() {
        let err = "flex6600".parse::<HardwareKind>().unwrap_err();
        assert!(err.to_string().contains("unknown radio"));
        assert!(err.to_string().contains("hermeslite"));
    }

    #[test]
    fn display_round_trip() {
        for name in HardwareKind::all_names() {
            let hw: HardwareKind = name.parse().unwrap();
            let parsed: HardwareKind = hw.to_string().parse().unwrap();
            assert_eq!(hw, parsed, "round-trip failed for {name}");
        }
    }

    #[test]
    fn protocol_capability() {
        assert!(HardwareKind::Hermes.supports_protocol1());
        assert!(HardwareKind::HermesLite.supports_protocol1());
        assert!(!HardwareKind::Angelia.supports_protocol1());
        assert!(!HardwareKind::Saturn.supports_protocol1());

        assert!(HardwareKind::Angelia.supports_protocol2());
        assert!(HardwareKind::Saturn.supports_protocol2());
        assert!(!HardwareKind::Atlas.supports_protocol2());
    }
}
