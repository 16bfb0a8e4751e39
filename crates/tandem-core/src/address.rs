//! Node addresses.
//!
//! Address format: `[name/]key@host:port`
//!
//! - `key` is the registry key a node is served under. It doubles as the
//!   participant id inside the game state.
//! - `name` is the player's display name. It defaults to the key and does not
//!   take part in equality.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Identity of a node in a session.
///
/// Two addresses are equal when host, port and key match.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address {
    host: String,
    port: u16,
    key: String,
    user_name: String,
}

impl Address {
    /// Create a new address.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        key: impl Into<String>,
        user_name: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            key: key.into(),
            user_name: user_name.into(),
        }
    }

    /// Create an address on the loopback interface whose display name is its key.
    pub fn local(port: u16, key: impl Into<String>) -> Self {
        let key = key.into();
        Self::new("127.0.0.1", port, key.clone(), key)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The registry key; used as the participant id.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    /// The `ws://host:port` endpoint this node is served on.
    pub fn endpoint(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host && self.port == other.port && self.key == other.key
    }
}

impl Eq for Address {}

impl Hash for Address {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.port.hash(state);
        self.key.hash(state);
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.user_name != self.key {
            write!(f, "{}/", self.user_name)?;
        }
        write!(f, "{}@{}:{}", self.key, self.host, self.port)
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (named_key, endpoint) = s
            .split_once('@')
            .ok_or_else(|| AddressParseError::MissingAt(s.to_string()))?;

        let (user_name, key) = match named_key.split_once('/') {
            Some((name, key)) => (name, key),
            None => (named_key, named_key),
        };
        if key.is_empty() {
            return Err(AddressParseError::EmptyKey);
        }

        let (host, port) = endpoint
            .rsplit_once(':')
            .ok_or_else(|| AddressParseError::MissingPort(s.to_string()))?;
        if host.is_empty() {
            return Err(AddressParseError::EmptyHost);
        }
        let port = port
            .parse()
            .map_err(|_| AddressParseError::InvalidPort(port.to_string()))?;

        Ok(Self::new(host, port, key, user_name))
    }
}

impl TryFrom<String> for Address {
    type Error = AddressParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}

/// Error parsing an address string.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AddressParseError {
    #[error("address must contain '@' separator, got: {0}")]
    MissingAt(String),
    #[error("address must end in ':port', got: {0}")]
    MissingPort(String),
    #[error("invalid port: {0}")]
    InvalidPort(String),
    #[error("address key cannot be empty")]
    EmptyKey,
    #[error("address host cannot be empty")]
    EmptyHost,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain() {
        let addr: Address = "n1@127.0.0.1:9001".parse().unwrap();
        assert_eq!(addr.host(), "127.0.0.1");
        assert_eq!(addr.port(), 9001);
        assert_eq!(addr.key(), "n1");
        assert_eq!(addr.user_name(), "n1");
    }

    #[test]
    fn parse_named() {
        let addr: Address = "alice/n1@localhost:9001".parse().unwrap();
        assert_eq!(addr.key(), "n1");
        assert_eq!(addr.user_name(), "alice");
        assert_eq!(addr.to_string(), "alice/n1@localhost:9001");
    }

    #[test]
    fn equality_ignores_user_name() {
        let a = Address::new("h", 1, "k", "alice");
        let b = Address::new("h", 1, "k", "bob");
        assert_eq!(a, b);
        assert_ne!(a, Address::new("h", 2, "k", "alice"));
        assert_ne!(a, Address::new("h", 1, "j", "alice"));
    }

    #[test]
    fn rejects_malformed() {
        assert!("n1".parse::<Address>().is_err());
        assert!("n1@host".parse::<Address>().is_err());
        assert!("n1@host:port".parse::<Address>().is_err());
        assert!("@host:1".parse::<Address>().is_err());
        assert!("n1@:1".parse::<Address>().is_err());
    }

    #[test]
    fn serializes_as_string() {
        let addr = Address::new("127.0.0.1", 9001, "n1", "alice");
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"alice/n1@127.0.0.1:9001\"");
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
        assert_eq!(back.user_name(), "alice");
    }
}
