//! Virtual network identifier.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 64-bit virtual network identifier, written as 16 lowercase hex digits.
///
/// # Examples
///
/// ```
/// use vnic_types::NetworkId;
///
/// let nwid: NetworkId = "8056c2e21c000001".parse().unwrap();
/// assert_eq!(nwid.as_u64(), 0x8056_c2e2_1c00_0001);
/// assert_eq!(nwid.to_string(), "8056c2e21c000001");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NetworkId(u64);

impl NetworkId {
    pub const fn new(id: u64) -> Self {
        NetworkId(id)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::LowerHex for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl FromStr for NetworkId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.len() > 16 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParseError::InvalidNetworkId(s.to_string()));
        }
        u64::from_str_radix(s, 16)
            .map(NetworkId)
            .map_err(|_| ParseError::InvalidNetworkId(s.to_string()))
    }
}

impl TryFrom<String> for NetworkId {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<NetworkId> for String {
    fn from(id: NetworkId) -> String {
        id.to_string()
    }
}
