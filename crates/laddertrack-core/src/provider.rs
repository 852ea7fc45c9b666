use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// External HTTP data sources the ladder tracker pulls from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    /// Blizzard game-data API (ladders, seasons, profiles).
    Battlenet,
    /// Aligulac esports statistics.
    Aligulac,
    /// Liquipedia wiki API.
    Liquipedia,
    /// SC2Arcade lobby and profile data.
    Sc2arcade,
    Twitch,
    Youtube,
    Discord,
    /// SC2Revealed barcode/alias database.
    Sc2revealed,
}

impl ProviderId {
    pub const ALL: [Self; 8] = [
        Self::Battlenet,
        Self::Aligulac,
        Self::Liquipedia,
        Self::Sc2arcade,
        Self::Twitch,
        Self::Youtube,
        Self::Discord,
        Self::Sc2revealed,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Battlenet => "battlenet",
            Self::Aligulac => "aligulac",
            Self::Liquipedia => "liquipedia",
            Self::Sc2arcade => "sc2arcade",
            Self::Twitch => "twitch",
            Self::Youtube => "youtube",
            Self::Discord => "discord",
            Self::Sc2revealed => "sc2revealed",
        }
    }

    /// Upper-case form used in environment variable names.
    pub fn env_prefix(self) -> String {
        format!("LADDERTRACK_{}", self.as_str().to_ascii_uppercase())
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|provider| provider.as_str() == normalized)
            .ok_or_else(|| ValidationError::InvalidProvider {
                value: normalized,
                expected: Self::ALL.map(Self::as_str).join(", "),
            })
    }
}
