//! Focus state enum as the single source of truth for server state strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether the server currently considers the user focused or distracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FocusState {
    Focusing,
    Distracted,
}

impl FocusState {
    /// Wire representation used by the state server.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Focusing => "focusing",
            Self::Distracted => "distracted",
        }
    }

    #[must_use]
    pub const fn is_focusing(self) -> bool {
        matches!(self, Self::Focusing)
    }
}

impl fmt::Display for FocusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FocusState {
    type Err = UnknownFocusState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "focusing" => Ok(Self::Focusing),
            "distracted" => Ok(Self::Distracted),
            _ => Err(UnknownFocusState(s.to_string())),
        }
    }
}

impl Serialize for FocusState {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FocusState {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Error type for focus state strings the client does not recognise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFocusState(pub String);

impl fmt::Display for UnknownFocusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown focus state: {}", self.0)
    }
}

impl std::error::Error for UnknownFocusState {}
