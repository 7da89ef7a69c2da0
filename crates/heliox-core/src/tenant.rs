use std::fmt::Write;

use jiff::Timestamp;
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Prefix carried by every issued key
pub const KEY_SCHEME: &str = "hlx_";

/// Random characters after the scheme
const KEY_RANDOM_LEN: usize = 40;

/// Characters of the key kept in clear for display
const KEY_PREFIX_LEN: usize = 10;

/// Customer organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    /// `None` falls back to global default limits
    pub plan_id: Option<Uuid>,
    pub is_active: bool,
}

/// Lifecycle status of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum KeyStatus {
    #[default]
    Active,
    Disabled,
}

/// Secret credential owned by a tenant
///
/// Only the SHA-256 of the secret is held. Limit overrides are copied from
/// the plan when the key is issued; `None` defers to the plan at resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub key_hash: String,
    pub key_prefix: String,
    pub status: KeyStatus,
    pub quota_daily: Option<u64>,
    pub quota_monthly: Option<u64>,
    pub rate_limit_rps: Option<f64>,
    pub rate_limit_burst: Option<u32>,
    pub last_used_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl ApiKey {
    pub fn is_active(&self) -> bool {
        self.status == KeyStatus::Active
    }
}

/// Generate a fresh key secret
pub fn generate_api_key() -> String {
    let random: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(KEY_RANDOM_LEN)
        .map(char::from)
        .collect();
    format!("{KEY_SCHEME}{random}")
}

/// Displayable prefix of a secret
pub fn key_prefix(secret: &str) -> String {
    secret.chars().take(KEY_PREFIX_LEN).collect()
}

/// Hex SHA-256 of a secret, used as the key store index
pub fn hash_secret(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    digest.iter().fold(String::with_capacity(64), |mut hex, byte| {
        let _ = write!(hex, "{byte:02x}");
        hex
    })
}

/// Operator role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    /// Gateway operator
    Admin,
    /// Tenant owner
    Owner,
    /// Tenant member
    Member,
}

/// Action gated by role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ManageTenant,
    ManageBilling,
    ManageKeys,
    ViewUsage,
}

impl Role {
    /// Capabilities granted to this role
    pub const fn capabilities(self) -> &'static [Capability] {
        match self {
            Self::Admin | Self::Owner => &[
                Capability::ManageTenant,
                Capability::ManageBilling,
                Capability::ManageKeys,
                Capability::ViewUsage,
            ],
            Self::Member => &[Capability::ManageKeys, Capability::ViewUsage],
        }
    }

    pub fn can(self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_have_scheme_and_length() {
        let key = generate_api_key();

        assert!(key.starts_with(KEY_SCHEME));
        assert_eq!(key.len(), KEY_SCHEME.len() + KEY_RANDOM_LEN);
        assert!(key[KEY_SCHEME.len()..].chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(key, generate_api_key());
    }

    #[test]
    fn prefix_is_first_ten_chars() {
        assert_eq!(key_prefix("hlx_abcdefghijkl"), "hlx_abcdef");
        assert_eq!(key_prefix("short"), "short");
    }

    #[test]
    fn hash_is_stable_hex() {
        let hash = hash_secret("abc");
        assert_eq!(hash, "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
    }

    #[test]
    fn member_cannot_manage_billing() {
        assert!(Role::Owner.can(Capability::ManageBilling));
        assert!(Role::Member.can(Capability::ViewUsage));
        assert!(!Role::Member.can(Capability::ManageBilling));
        assert!(!Role::Member.can(Capability::ManageTenant));
    }
}
