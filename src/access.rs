//! Access level lattice and the value carried by permission edges.
//!
//! Levels are totally ordered integers, increasing with privilege:
//! `NONE < READ < MGMT < ADMIN < ROOT`. All comparisons go through the
//! integer discriminant; names exist only for parsing and display.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// Permission level on a target node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Level {
    /// No access. Returned when no edge exists on any path.
    #[default]
    None = 0,
    Read = 1,
    /// Manage: create children, change non-permission attributes.
    #[serde(alias = "WRITE")]
    Mgmt = 2,
    Admin = 3,
    /// Full control. Returned unconditionally for root principals.
    Root = 4,
}

// Level name mappings; "WRITE" is a legacy alias of MGMT
const LEVELS: &[(&str, Level)] = &[
    ("NONE", Level::None),
    ("READ", Level::Read),
    ("MGMT", Level::Mgmt),
    ("WRITE", Level::Mgmt),
    ("ADMIN", Level::Admin),
    ("ROOT", Level::Root),
];

impl Level {
    pub const MIN: Level = Level::None;
    pub const MAX: Level = Level::Root;

    /// Best of two levels, used when several paths grant access.
    #[inline]
    pub fn max(self, other: Level) -> Level {
        if other > self { other } else { self }
    }

    /// `self >= required`
    #[inline]
    pub fn meets(self, required: Level) -> bool {
        self >= required
    }

    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(v: u8) -> Option<Level> {
        match v {
            0 => Some(Level::None),
            1 => Some(Level::Read),
            2 => Some(Level::Mgmt),
            3 => Some(Level::Admin),
            4 => Some(Level::Root),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Level::None => "NONE",
            Level::Read => "READ",
            Level::Mgmt => "MGMT",
            Level::Admin => "ADMIN",
            Level::Root => "ROOT",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Level {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        LEVELS
            .iter()
            .find(|(n, _)| *n == upper)
            .map(|(_, l)| *l)
            .ok_or_else(|| GraphError::InvalidArgument(format!("unknown access level '{}'", s)))
    }
}

/// Relationship of the principal to the node, independent of level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Role {
    #[default]
    Unset = 0,
    /// The edge written when the principal created the node.
    Owner = 1,
}

impl Role {
    pub fn from_u8(v: u8) -> Option<Role> {
        match v {
            0 => Some(Role::Unset),
            1 => Some(Role::Owner),
            _ => None,
        }
    }
}

/// Value of an Access edge, and the access block attached to documents on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Access {
    pub level: Level,
    #[serde(default)]
    pub role: Role,
}

impl Access {
    pub fn new(level: Level) -> Self {
        Access { level, role: Role::Unset }
    }

    pub fn owner(level: Level) -> Self {
        Access { level, role: Role::Owner }
    }

    /// Pack into a u64 for storage: level in bits 0..8, role in bits 8..16.
    #[inline]
    pub fn to_bits(self) -> u64 {
        (self.level.as_u8() as u64) | ((self.role as u8 as u64) << 8)
    }

    /// Unpack a stored value. Unknown bit patterns are corruption, not "no access".
    pub fn from_bits(bits: u64) -> Result<Self, GraphError> {
        let level = Level::from_u8((bits & 0xFF) as u8);
        let role = Role::from_u8(((bits >> 8) & 0xFF) as u8);
        match (level, role, bits >> 16) {
            (Some(level), Some(role), 0) => Ok(Access { level, role }),
            _ => Err(GraphError::StoreUnavailable(format!("corrupt access value 0x{:x}", bits))),
        }
    }
}
