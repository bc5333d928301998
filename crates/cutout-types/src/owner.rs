//! Requester identity used as the result cache key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Stable identifier of the requester (a chat user id).
///
/// One owner holds at most one in-flight or completed result at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub i64);

impl OwnerId {
    /// The raw numeric id.
    pub fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for OwnerId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OwnerId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(OwnerId)
    }
}
