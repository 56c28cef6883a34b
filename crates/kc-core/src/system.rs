//! External membership systems.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// An external society membership system we synchronise against.
///
/// The string form of each variant is the stable key used in cache keys and
/// in the persisted per-profile membership maps, so it must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SyncSystem {
    /// Modern Language Association.
    Mla,
    /// Art Libraries Society of North America.
    Arlisna,
    /// Association of University Presses (Salesforce-backed).
    Up,
    /// Michigan State University (email-domain heuristic, no API).
    Msu,
}

impl SyncSystem {
    /// All systems, in the order they are configured by default.
    pub const ALL: [SyncSystem; 4] = [
        SyncSystem::Mla,
        SyncSystem::Arlisna,
        SyncSystem::Up,
        SyncSystem::Msu,
    ];

    /// The stable string key for this system.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncSystem::Mla => "MLA",
            SyncSystem::Arlisna => "ARLISNA",
            SyncSystem::Up => "UP",
            SyncSystem::Msu => "MSU",
        }
    }
}

impl Display for SyncSystem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncSystem {
    type Err = UnknownSystem;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MLA" => Ok(SyncSystem::Mla),
            "ARLISNA" => Ok(SyncSystem::Arlisna),
            "UP" => Ok(SyncSystem::Up),
            "MSU" => Ok(SyncSystem::Msu),
            _ => Err(UnknownSystem(s.to_string())),
        }
    }
}

/// Returned when parsing an unrecognised system name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown sync system: {0}")]
pub struct UnknownSystem(pub String);
