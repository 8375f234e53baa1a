use alloy::primitives::Address;
use serde::{Deserialize, Deserializer, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("content address is empty")]
    Empty,
    #[error("content address contains whitespace: {0:?}")]
    Whitespace(String),
}

/// Content-derived identifier of an immutable document.
///
/// Two fetches of the same address always yield the same document, which is
/// what makes it safe to cache documents by address forever.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ContentAddress(String);

impl ContentAddress {
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(AddressError::Empty);
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(AddressError::Whitespace(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ContentAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentAddress({})", self.0)
    }
}

// IPFS DAG-JSON encodes links as `{"/": "<cid>"}`; plain strings are accepted too.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawAddress {
    Plain(String),
    Link {
        #[serde(rename = "/")]
        target: String,
    },
}

impl<'de> Deserialize<'de> for ContentAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = match RawAddress::deserialize(deserializer)? {
            RawAddress::Plain(raw) => raw,
            RawAddress::Link { target } => target,
        };
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Stable identity of a pointer, used to scope caches, listener registries,
/// gossip topics and lookup keys. For contract-backed pointers this is the
/// checksummed contract address.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PointerId(String);

impl PointerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key under which the latest snapshot address is published.
    pub fn lookup_key(&self) -> Vec<u8> {
        self.0.as_bytes().to_vec()
    }
}

impl From<Address> for PointerId {
    fn from(address: Address) -> Self {
        Self(address.to_checksum(None))
    }
}

impl fmt::Display for PointerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
