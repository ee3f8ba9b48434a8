use serde::{Deserialize, Serialize};
use std::fmt;

/// Graduated restriction severity.
///
/// Higher levels block a superset of the network classes blocked by lower
/// levels, so the derived ordering is also the severity ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize, Serialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum RestrictionLevel {
    /// No restrictions
    #[default]
    None = 0,
    /// App-layer blocking only; no network change
    AppOnly = 1,
    /// Wi-Fi disabled, mobile data kept
    WifiBlocked = 2,
    /// Wi-Fi and mobile data disabled
    FullBlock = 3,
}

impl RestrictionLevel {
    pub const ALL: [RestrictionLevel; 4] = [
        Self::None,
        Self::AppOnly,
        Self::WifiBlocked,
        Self::FullBlock,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(usize::from(value)).copied()
    }

    /// Whether this level disables the Wi-Fi network class
    pub fn blocks_wifi(self) -> bool {
        self >= Self::WifiBlocked
    }

    /// Whether this level disables mobile data
    pub fn blocks_mobile_data(self) -> bool {
        self >= Self::FullBlock
    }

    /// Whether the level changes anything at the network layer
    pub fn touches_network(self) -> bool {
        self != Self::AppOnly
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::None => "no restrictions",
            Self::AppOnly => "app-level restrictions only",
            Self::WifiBlocked => "Wi-Fi disabled, mobile data enabled",
            Self::FullBlock => "Wi-Fi and mobile data disabled",
        }
    }
}

impl TryFrom<u8> for RestrictionLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_u8(value).ok_or_else(|| format!("restriction level must be 0-3 (got {})", value))
    }
}

impl From<RestrictionLevel> for u8 {
    fn from(level: RestrictionLevel) -> Self {
        level.as_u8()
    }
}

impl fmt::Display for RestrictionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "level {} ({})", self.as_u8(), self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_totally_ordered_by_severity() {
        assert!(RestrictionLevel::None < RestrictionLevel::AppOnly);
        assert!(RestrictionLevel::AppOnly < RestrictionLevel::WifiBlocked);
        assert!(RestrictionLevel::WifiBlocked < RestrictionLevel::FullBlock);
    }

    #[test]
    fn higher_levels_subsume_lower_network_blocks() {
        for level in RestrictionLevel::ALL {
            if level.blocks_mobile_data() {
                assert!(level.blocks_wifi(), "{} blocks data but not Wi-Fi", level);
            }
        }
        assert!(!RestrictionLevel::AppOnly.blocks_wifi());
        assert!(RestrictionLevel::WifiBlocked.blocks_wifi());
        assert!(!RestrictionLevel::WifiBlocked.blocks_mobile_data());
        assert!(RestrictionLevel::FullBlock.blocks_mobile_data());
    }

    #[test]
    fn from_u8_rejects_out_of_range() {
        assert_eq!(RestrictionLevel::from_u8(2), Some(RestrictionLevel::WifiBlocked));
        assert_eq!(RestrictionLevel::from_u8(4), None);
        assert!(RestrictionLevel::try_from(9).is_err());
    }

    #[test]
    fn serializes_as_ordinal() {
        let json = serde_json::to_string(&RestrictionLevel::FullBlock).unwrap();
        assert_eq!(json, "3");

        let level: RestrictionLevel = serde_json::from_str("1").unwrap();
        assert_eq!(level, RestrictionLevel::AppOnly);

        assert!(serde_json::from_str::<RestrictionLevel>("7").is_err());
    }
}
