use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock;

/// Identifier a block rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BlockTarget {
    ApiKey(Uuid),
    ClientIp(IpAddr),
}

impl BlockTarget {
    /// Stable string form used as store key and bloom member
    pub fn identifier(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for BlockTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiKey(id) => write!(f, "key:{id}"),
            Self::ClientIp(ip) => write!(f, "ip:{ip}"),
        }
    }
}

impl TryFrom<String> for BlockTarget {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if let Some(id) = value.strip_prefix("key:") {
            return id.parse().map(Self::ApiKey).map_err(|e| format!("invalid key id: {e}"));
        }
        if let Some(ip) = value.strip_prefix("ip:") {
            return ip.parse().map(Self::ClientIp).map_err(|e| format!("invalid ip: {e}"));
        }
        Err(format!("unknown block target: {value}"))
    }
}

impl From<BlockTarget> for String {
    fn from(target: BlockTarget) -> Self {
        target.to_string()
    }
}

/// Authoritative record of a blocked identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRule {
    pub target: BlockTarget,
    pub reason: String,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
}

impl BlockRule {
    /// Rule starting now and lasting `duration`
    pub fn new(target: BlockTarget, reason: impl Into<String>, now: Timestamp, duration: Duration) -> Self {
        Self {
            target,
            reason: reason.into(),
            created_at: now,
            expires_at: clock::add(now, duration),
        }
    }

    pub fn is_active(&self, now: Timestamp) -> bool {
        now < self.expires_at
    }

    /// Time left before expiry
    pub fn remaining(&self, now: Timestamp) -> Duration {
        clock::elapsed(now, self.expires_at)
    }
}
