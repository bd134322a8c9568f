//! Caller roles.

use serde::{Deserialize, Serialize};

/// Permission level carried in the `x-clipcast-user-role` header.
///
/// Wire format: `u8` (0 = Normal, 1 = Admin).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Normal = 0,
    Admin = 1,
}

impl UserRole {
    /// Convert from the `u8` wire value. Returns `None` for unknown values.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Normal),
            1 => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Like [`UserRole::from_u8`], but an unknown value gets no privileges.
    pub fn from_u8_or_normal(v: u8) -> Self {
        Self::from_u8(v).unwrap_or(Self::Normal)
    }
}
